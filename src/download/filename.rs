//! Save paths, page file naming, and atomic page writes.
//!
//! Layout: `save_root/<manga title>/<chapter label>/<page>.<ext>`, where the
//! page number is 1-based and zero-padded to the width of the page count so
//! lexicographic order equals reading order.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::debug;
use url::Url;

use super::constants::{CHAPTER_MARKER_FILE, PARTIAL_EXTENSION};
use super::error::ChapterError;
use crate::catalog::Chapter;

/// Longest chapter directory name, in characters.
const MAX_LABEL_LENGTH: usize = 120;

/// Extension used when the image URL has none.
const DEFAULT_PAGE_EXTENSION: &str = "jpg";

/// Names reserved by Windows regardless of extension.
const RESERVED_NAMES: [&str; 22] = [
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Where one chapter's pages are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveTarget {
    chapter_dir: PathBuf,
}

impl SaveTarget {
    /// Derives the chapter directory.
    ///
    /// The manga title is sanitized and capped at `max_title_length`
    /// characters. Chapters with an unknown number carry a short id suffix,
    /// since their labels are not unique within a catalog.
    #[must_use]
    pub fn new(
        save_root: &Path,
        manga_title: &str,
        chapter: &Chapter,
        max_title_length: usize,
    ) -> Self {
        let title = truncate_segment(&sanitize_path_segment(manga_title), max_title_length);
        let mut label = truncate_segment(&sanitize_path_segment(&chapter.label), MAX_LABEL_LENGTH);
        if chapter.is_unknown() {
            let short_id: String = sanitize_path_segment(chapter.id()).chars().take(8).collect();
            label = format!("{label} [{short_id}]");
        }
        Self {
            chapter_dir: save_root.join(title).join(label),
        }
    }

    /// Wraps an explicit directory.
    #[must_use]
    pub fn from_dir(chapter_dir: impl Into<PathBuf>) -> Self {
        Self {
            chapter_dir: chapter_dir.into(),
        }
    }

    /// The chapter directory.
    #[must_use]
    pub fn chapter_dir(&self) -> &Path {
        &self.chapter_dir
    }

    /// Final path of 1-based `page` out of `total`, with the extension taken from `url`.
    #[must_use]
    pub fn page_path(&self, page: usize, total: usize, url: &str) -> PathBuf {
        self.chapter_dir
            .join(page_file_name(page, total, &page_extension(url)))
    }
}

/// `<page>.<ext>` with `page` zero-padded to the digit count of `total`.
#[must_use]
pub fn page_file_name(page: usize, total: usize, extension: &str) -> String {
    let width = total.max(1).to_string().len();
    format!("{page:0width$}.{extension}")
}

/// Lowercased image extension from the URL path, `jpg` if absent or odd.
#[must_use]
pub fn page_extension(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|parsed| {
            let last = parsed.path_segments()?.next_back()?.to_string();
            let (_, ext) = last.rsplit_once('.')?;
            let valid = !ext.is_empty()
                && ext.len() <= 5
                && ext.chars().all(|c| c.is_ascii_alphanumeric());
            valid.then(|| ext.to_ascii_lowercase())
        })
        .unwrap_or_else(|| DEFAULT_PAGE_EXTENSION.to_string())
}

/// Makes `value` safe as a single path segment on every major filesystem.
///
/// Reserved characters become `_`, whitespace runs collapse to one space,
/// leading/trailing dots and spaces are trimmed, and reserved device names
/// are prefixed. An empty result becomes `_`.
#[must_use]
pub fn sanitize_path_segment(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut prev_space = false;
    for ch in value.chars() {
        let mapped = match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c if c.is_whitespace() => ' ',
            c => c,
        };
        if mapped == ' ' {
            if !prev_space {
                out.push(' ');
            }
            prev_space = true;
        } else {
            out.push(mapped);
            prev_space = false;
        }
    }

    let trimmed = out.trim_matches(|c: char| c == ' ' || c == '.');
    if trimmed.is_empty() {
        return "_".to_string();
    }

    let stem = trimmed.split('.').next().unwrap_or(trimmed);
    if RESERVED_NAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(stem))
    {
        return format!("_{trimmed}");
    }
    trimmed.to_string()
}

fn truncate_segment(value: &str, max_chars: usize) -> String {
    let truncated: String = value.chars().take(max_chars.max(1)).collect();
    let trimmed = truncated.trim_end_matches(|c: char| c == ' ' || c == '.');
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Path of the in-progress file for `path`.
#[must_use]
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".");
    name.push(PARTIAL_EXTENSION);
    path.with_file_name(name)
}

/// Writes `bytes` to `path` via a `.part` sibling and a rename.
///
/// Readers never observe a truncated page under the final name. On failure
/// the partial file is removed.
///
/// # Errors
///
/// Returns the underlying IO error.
pub async fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let partial = partial_path(path);
    let result = async {
        let mut file = tokio::fs::File::create(&partial).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&partial, path).await
    }
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(&partial).await;
    }
    result
}

/// Creates `dir` and records `chapter_id` as its owner.
///
/// A directory already owned by another chapter is a collision.
///
/// # Errors
///
/// - [`ChapterError::Collision`] if the marker names a different chapter
/// - [`ChapterError::Io`] if the directory or marker cannot be accessed
pub async fn claim_directory(dir: &Path, chapter_id: &str) -> Result<(), ChapterError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| ChapterError::io(dir, e))?;

    let marker = dir.join(CHAPTER_MARKER_FILE);
    match tokio::fs::read_to_string(&marker).await {
        Ok(existing) => {
            let existing = existing.trim();
            if existing == chapter_id {
                debug!(dir = %dir.display(), "chapter directory already claimed by this chapter");
                Ok(())
            } else {
                Err(ChapterError::Collision {
                    path: dir.to_path_buf(),
                    existing_id: existing.to_string(),
                    chapter_id: chapter_id.to_string(),
                })
            }
        }
        Err(e) if e.kind() == ErrorKind::NotFound => tokio::fs::write(&marker, chapter_id)
            .await
            .map_err(|e| ChapterError::io(&marker, e)),
        Err(e) => Err(ChapterError::io(&marker, e)),
    }
}
