//! Configuration file loading for CLI defaults.
//!
//! The file holds flat `key = value` lines with `#` comments. Strings are
//! double-quoted, durations are seconds (fractions allowed). Unknown keys are
//! rejected so typos do not silently fall back to defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};

use mdex_core::DownloaderConfig;

/// Values read from the configuration file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileConfig {
    pub max_retries: Option<u32>,
    pub backoff_factor: Option<Duration>,
    pub backoff_jitter: Option<Duration>,
    pub backoff_max: Option<Duration>,
    pub request_timeout: Option<Duration>,
    pub page_size: Option<usize>,
    pub language: Option<String>,
    pub concurrency: Option<usize>,
    pub chapter_concurrency: Option<usize>,
    pub save_root: Option<PathBuf>,
    pub max_title_length: Option<usize>,
    pub api_root: Option<String>,
    pub report_endpoint: Option<String>,
    pub report_timeout: Option<Duration>,
    pub data_saver: Option<bool>,
    pub include_pornographic: Option<bool>,
    pub user_agent: Option<String>,
}

impl FileConfig {
    /// Overrides `config` with every value present in the file.
    pub fn apply_to(&self, config: &mut DownloaderConfig) {
        macro_rules! set {
            ($($field:ident => $target:ident),* $(,)?) => {
                $(if let Some(value) = &self.$field {
                    config.$target = value.clone();
                })*
            };
        }
        set! {
            max_retries => max_retries,
            backoff_factor => backoff_factor,
            backoff_jitter => backoff_jitter,
            backoff_max => backoff_max,
            request_timeout => request_timeout,
            page_size => page_size,
            language => language,
            concurrency => concurrency_limit,
            chapter_concurrency => chapter_concurrency,
            save_root => save_root,
            max_title_length => max_title_length,
            api_root => api_root,
            report_endpoint => report_endpoint,
            report_timeout => report_timeout,
            data_saver => use_data_saver,
            include_pornographic => include_pornographic,
            user_agent => user_agent,
        }
    }
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub path: Option<PathBuf>,
    /// Parsed file config when a config file exists.
    pub config: Option<FileConfig>,
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/mdex-dl/config.toml`
/// 2. `$HOME/.config/mdex-dl/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("mdex-dl")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("mdex-dl")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from the default path if present.
pub fn load_default_file_config() -> Result<LoadedConfig> {
    let path = resolve_default_config_path();
    let config = match path.as_deref() {
        Some(path) if path.exists() => Some(load_file_config(path)?),
        _ => None,
    };
    Ok(LoadedConfig { path, config })
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line_no = line_index + 1;
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_no}: expected key = value");
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let context = || format!("Invalid `{key}` value on line {line_no}");

        match key {
            "max_retries" => {
                let parsed = parse_integer(value).with_context(context)?;
                cfg.max_retries =
                    Some(u32::try_from(parsed).context("max_retries out of range for u32")?);
            }
            "backoff_factor" => cfg.backoff_factor = Some(parse_seconds(value).with_context(context)?),
            "backoff_jitter" => cfg.backoff_jitter = Some(parse_seconds(value).with_context(context)?),
            "backoff_max" => cfg.backoff_max = Some(parse_seconds(value).with_context(context)?),
            "request_timeout" => {
                cfg.request_timeout = Some(parse_seconds(value).with_context(context)?);
            }
            "report_timeout" => {
                cfg.report_timeout = Some(parse_seconds(value).with_context(context)?);
            }
            "page_size" => cfg.page_size = Some(parse_usize(value).with_context(context)?),
            "concurrency" => cfg.concurrency = Some(parse_usize(value).with_context(context)?),
            "chapter_concurrency" => {
                cfg.chapter_concurrency = Some(parse_usize(value).with_context(context)?);
            }
            "max_title_length" => {
                cfg.max_title_length = Some(parse_usize(value).with_context(context)?);
            }
            "language" => cfg.language = Some(parse_string_literal(value).with_context(context)?),
            "save_root" => {
                cfg.save_root = Some(PathBuf::from(
                    parse_string_literal(value).with_context(context)?,
                ));
            }
            "api_root" => cfg.api_root = Some(parse_string_literal(value).with_context(context)?),
            "report_endpoint" => {
                cfg.report_endpoint = Some(parse_string_literal(value).with_context(context)?);
            }
            "user_agent" => {
                cfg.user_agent = Some(parse_string_literal(value).with_context(context)?);
            }
            "data_saver" => cfg.data_saver = Some(parse_boolean(value).with_context(context)?),
            "include_pornographic" => {
                cfg.include_pornographic = Some(parse_boolean(value).with_context(context)?);
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_no}");
            }
        }
    }
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

fn parse_usize(raw_value: &str) -> Result<usize> {
    let value = parse_integer(raw_value)?;
    usize::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for usize"))
}

fn parse_seconds(raw_value: &str) -> Result<Duration> {
    let value: f64 = raw_value
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("Expected a number of seconds"))?;
    Duration::try_from_secs_f64(value)
        .map_err(|_| anyhow::anyhow!("Expected a non-negative, finite number of seconds"))
}

fn parse_boolean(raw_value: &str) -> Result<bool> {
    match raw_value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => bail!("Expected 'true' or 'false'"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_partial_fields() {
        let cfg = parse_config_str(
            r#"
            # download defaults
            save_root = "/data/manga"   # inline comment
            concurrency = 8
            language = "pt-br"
            backoff_factor = 0.5
            data_saver = true
            "#,
        )
        .unwrap();

        assert_eq!(cfg.save_root, Some(PathBuf::from("/data/manga")));
        assert_eq!(cfg.concurrency, Some(8));
        assert_eq!(cfg.language.as_deref(), Some("pt-br"));
        assert_eq!(cfg.backoff_factor, Some(Duration::from_millis(500)));
        assert_eq!(cfg.data_saver, Some(true));
        assert_eq!(cfg.max_retries, None);
    }

    #[test]
    fn test_parse_config_hash_inside_string_is_kept() {
        let cfg = parse_config_str(r#"user_agent = "mdex-dl #1""#).unwrap();
        assert_eq!(cfg.user_agent.as_deref(), Some("mdex-dl #1"));
    }

    #[test]
    fn test_parse_config_rejects_unknown_key() {
        let err = parse_config_str("concurency = 4").unwrap_err();
        assert!(err.to_string().contains("Unknown configuration key: 'concurency' on line 1"));
    }

    #[test]
    fn test_parse_config_rejects_bad_values() {
        for raw in [
            "concurrency = -1",
            "language = en",
            "data_saver = yes",
            "backoff_max = -3",
            "request_timeout = soon",
            "just some words",
        ] {
            assert!(parse_config_str(raw).is_err(), "{raw} should fail");
        }
    }

    #[test]
    fn test_apply_overrides_only_present_values() {
        let cfg = parse_config_str("concurrency = 2\nmax_retries = 9\n").unwrap();
        let mut config = DownloaderConfig::default();
        cfg.apply_to(&mut config);

        assert_eq!(config.concurrency_limit, 2);
        assert_eq!(config.max_retries, 9);
        assert_eq!(config.language, DownloaderConfig::default().language);
    }

    #[test]
    fn test_out_of_range_values_fail_validation_after_apply() {
        let cfg = parse_config_str("page_size = 500").unwrap();
        let mut config = DownloaderConfig::default();
        cfg.apply_to(&mut config);
        assert!(config.validate().unwrap_err().mentions("page_size"));
    }
}
