//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use mdex_core::{DownloaderConfig, Selection, SelectionError};

/// Download manga chapters from MangaDex.
///
/// Chapters are saved as `<output>/<manga title>/<chapter label>/<page>.<ext>`.
/// Re-running a download only fetches pages that are missing on disk.
#[derive(Parser, Debug)]
#[command(name = "mdex-dl")]
#[command(author, version, about)]
pub struct Cli {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Search manga by title and list matching ids
    Search(SearchArgs),
    /// Download chapters of a manga
    Download(DownloadArgs),
    /// Show a random manga
    Random(RandomArgs),
}

/// Arguments of `mdex-dl random`.
#[derive(Args, Debug)]
pub struct RandomArgs {
    /// Include pornographic titles
    #[arg(long)]
    pub pornographic: bool,
}

/// Arguments of `mdex-dl search`.
#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Title to search for
    #[arg(required = true, num_args = 1..)]
    pub query: Vec<String>,

    /// Maximum number of results (1-100)
    #[arg(short = 'n', long, default_value_t = 10, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub limit: u8,

    /// Include pornographic titles
    #[arg(long)]
    pub pornographic: bool,
}

impl SearchArgs {
    /// Query words joined into one title.
    #[must_use]
    pub fn title(&self) -> String {
        self.query.join(" ")
    }
}

/// Arguments of `mdex-dl download`.
#[derive(Args, Debug)]
pub struct DownloadArgs {
    /// Manga id (UUID)
    pub manga_id: String,

    /// Catalog positions to download, e.g. `1-3,7` (default: all)
    #[arg(short, long, value_parser = parse_selection)]
    pub select: Option<Selection>,

    /// Chapter language code, matched exactly (e.g. en, pt-br)
    #[arg(short, long)]
    pub language: Option<String>,

    /// Pages downloaded at once per chapter (1-32)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=32))]
    pub concurrency: Option<u8>,

    /// Chapters downloaded at once (1-8)
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=8))]
    pub chapter_concurrency: Option<u8>,

    /// Total attempts per request, including the first (1-20)
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u8).range(1..=20))]
    pub max_retries: Option<u8>,

    /// Output directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Download compressed images
    #[arg(long)]
    pub data_saver: bool,
}

impl DownloadArgs {
    /// Overrides `config` with every flag that was given.
    pub fn apply_to(&self, config: &mut DownloaderConfig) {
        if let Some(language) = &self.language {
            config.language.clone_from(language);
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency_limit = usize::from(concurrency);
        }
        if let Some(chapters) = self.chapter_concurrency {
            config.chapter_concurrency = usize::from(chapters);
        }
        if let Some(max_retries) = self.max_retries {
            config.max_retries = u32::from(max_retries);
        }
        if let Some(output) = &self.output {
            config.save_root.clone_from(output);
        }
        if self.data_saver {
            config.use_data_saver = true;
        }
    }
}

fn parse_selection(value: &str) -> Result<Selection, SelectionError> {
    Selection::parse(value)
}
