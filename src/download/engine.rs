//! Download orchestrator for chapters with bounded page concurrency.
//!
//! This module provides the [`DownloadOrchestrator`], which downloads the
//! pages of one chapter (or of a whole catalog) using a semaphore-based
//! concurrency limit. Every page goes through the shared
//! [`RequestExecutor`], so throttling and retries apply per image host.
//!
//! # Overview
//!
//! For each chapter the orchestrator:
//! 1. Derives and claims the chapter directory ([`SaveTarget`])
//! 2. Fetches a fresh page manifest
//! 3. Downloads pages with at most `concurrency_limit` in flight, skipping
//!    pages already on disk
//! 4. Sends a fire-and-forget image report after each fetch
//! 5. Returns a [`ChapterDownload`] that is complete, partial (with the
//!    missing page numbers), or failed
//!
//! Chapters of a catalog are independent: one failing chapter never aborts
//! the others, and [`MangaReport`] collects every outcome.
//!
//! # Example
//!
//! ```no_run
//! use mdex_core::download::{DownloadOptions, DownloadOrchestrator};
//! use mdex_core::{ApiClient, build_catalog};
//!
//! # async fn example(api: ApiClient) -> Result<(), Box<dyn std::error::Error>> {
//! let manga = api.manga("a1c7c817-4e59-43b7-9365-09675a149a6f").await?;
//! let catalog = build_catalog(&api.chapter_feed(&manga.id).await?, "en");
//! let orchestrator = DownloadOrchestrator::new(api, None, DownloadOptions::default())?;
//! let report = orchestrator.download_all(&manga.title, &catalog, |_| {}).await;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use futures_util::stream::{self, StreamExt};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::error::{ChapterError, EngineError, ExecuteError};
use super::executor::RequestExecutor;
use super::filename::{SaveTarget, claim_directory, write_atomically};
use super::report::{ImageReport, ImageReporter};
use super::throttle::EndpointKey;
use super::transport::HttpRequest;
use crate::api::{ApiClient, ImageQuality, PageManifest};
use crate::catalog::Chapter;

/// Minimum allowed page concurrency.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed page concurrency.
pub const MAX_CONCURRENCY: usize = 32;

/// Default page concurrency.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Maximum allowed chapter concurrency.
pub const MAX_CHAPTER_CONCURRENCY: usize = 8;

/// Default directory downloads are saved under.
pub const DEFAULT_SAVE_ROOT: &str = "manga";

/// Default cap on the manga title directory name, in characters.
pub const DEFAULT_MAX_TITLE_LENGTH: usize = 64;

/// How and where pages are downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOptions {
    /// Root directory of the output tree.
    pub save_root: PathBuf,
    /// Pages in flight per chapter.
    pub concurrency_limit: usize,
    /// Chapters processed at once by [`DownloadOrchestrator::download_all`].
    pub chapter_concurrency: usize,
    /// Cap on the manga title directory name.
    pub max_title_length: usize,
    /// Image variant to download.
    pub quality: ImageQuality,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            save_root: PathBuf::from(DEFAULT_SAVE_ROOT),
            concurrency_limit: DEFAULT_CONCURRENCY,
            chapter_concurrency: 1,
            max_title_length: DEFAULT_MAX_TITLE_LENGTH,
            quality: ImageQuality::Data,
        }
    }
}

/// Run-wide page counters.
///
/// Uses atomic counters so concurrent page tasks can update them.
#[derive(Debug, Default)]
pub struct DownloadStats {
    downloaded: AtomicUsize,
    reused: AtomicUsize,
    failed: AtomicUsize,
    bytes: AtomicU64,
}

impl DownloadStats {
    /// Creates a new stats tracker with zero counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pages fetched and written during this run.
    #[must_use]
    pub fn downloaded(&self) -> usize {
        self.downloaded.load(Ordering::SeqCst)
    }

    /// Pages already on disk and skipped.
    #[must_use]
    pub fn reused(&self) -> usize {
        self.reused.load(Ordering::SeqCst)
    }

    /// Pages that could not be downloaded.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Bytes written during this run.
    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::SeqCst)
    }

    fn record(&self, outcome: &PageOutcome) {
        match outcome {
            PageOutcome::Saved {
                bytes,
                reused: false,
            } => {
                self.downloaded.fetch_add(1, Ordering::SeqCst);
                self.bytes.fetch_add(*bytes, Ordering::SeqCst);
            }
            PageOutcome::Saved { reused: true, .. } => {
                self.reused.fetch_add(1, Ordering::SeqCst);
            }
            PageOutcome::Failed { .. } => {
                self.failed.fetch_add(1, Ordering::SeqCst);
            }
        }
    }
}

/// Result of one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    /// The page is on disk.
    Saved {
        /// Size of the page file.
        bytes: u64,
        /// True if the file already existed and nothing was fetched.
        reused: bool,
    },
    /// The page is missing.
    Failed {
        /// Why the page could not be saved.
        cause: String,
    },
}

/// One page of a chapter download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResult {
    /// 1-based page number.
    pub page: usize,
    /// Final path of the page file.
    pub path: PathBuf,
    /// What happened.
    pub outcome: PageOutcome,
    /// Time spent on the page, including retries.
    pub elapsed: Duration,
}

impl PageResult {
    /// Returns true if the page is on disk.
    #[must_use]
    pub fn is_saved(&self) -> bool {
        matches!(self.outcome, PageOutcome::Saved { .. })
    }
}

/// Overall state of a chapter download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChapterStatus {
    /// Every page is on disk.
    Complete,
    /// Some pages are on disk; the listed 1-based pages are missing.
    Partial {
        /// Missing page numbers, ascending.
        missing: Vec<usize>,
    },
    /// Nothing could be saved.
    Failed {
        /// Why the chapter failed.
        reason: String,
    },
}

/// Outcome of downloading one chapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterDownload {
    /// Chapter id.
    pub chapter_id: String,
    /// Chapter label.
    pub label: String,
    /// Chapter directory.
    pub directory: PathBuf,
    /// Overall state.
    pub status: ChapterStatus,
    /// Per-page results (attempted pages only), ordered by page number.
    ///
    /// The status also accounts for manifest pages that were not attempted.
    pub pages: Vec<PageResult>,
}

impl ChapterDownload {
    fn failed(chapter: &Chapter, target: &SaveTarget, error: &ChapterError) -> Self {
        Self {
            chapter_id: chapter.id().to_string(),
            label: chapter.label.clone(),
            directory: target.chapter_dir().to_path_buf(),
            status: ChapterStatus::Failed {
                reason: error.to_string(),
            },
            pages: Vec::new(),
        }
    }

    /// Builds the outcome from the attempted `pages` and the state of the
    /// manifest pages that were not attempted.
    fn from_pages(
        chapter: &Chapter,
        target: &SaveTarget,
        mut pages: Vec<PageResult>,
        untouched: &UntouchedPages,
    ) -> Self {
        pages.sort_by_key(|page| page.page);
        let mut missing: Vec<usize> = pages
            .iter()
            .filter(|page| !page.is_saved())
            .map(|page| page.page)
            .chain(untouched.missing.iter().copied())
            .collect();
        missing.sort_unstable();
        let saved = pages.iter().filter(|page| page.is_saved()).count() + untouched.saved;

        let status = if missing.is_empty() {
            ChapterStatus::Complete
        } else if saved == 0 {
            let cause = pages
                .iter()
                .find_map(|page| match &page.outcome {
                    PageOutcome::Failed { cause } => Some(cause.clone()),
                    PageOutcome::Saved { .. } => None,
                })
                .unwrap_or_default();
            ChapterStatus::Failed {
                reason: format!("all {} pages failed (first error: {cause})", missing.len()),
            }
        } else {
            ChapterStatus::Partial { missing }
        };

        Self {
            chapter_id: chapter.id().to_string(),
            label: chapter.label.clone(),
            directory: target.chapter_dir().to_path_buf(),
            status,
            pages,
        }
    }

    /// Returns true if every page is on disk.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.status == ChapterStatus::Complete
    }

    /// Pages of the chapter that are not on disk.
    #[must_use]
    pub fn missing_pages(&self) -> Vec<usize> {
        match &self.status {
            ChapterStatus::Complete => Vec::new(),
            ChapterStatus::Partial { missing } => missing.clone(),
            ChapterStatus::Failed { .. } => self
                .pages
                .iter()
                .filter(|page| !page.is_saved())
                .map(|page| page.page)
                .collect(),
        }
    }

    /// Bytes written for this chapter during this call.
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.pages
            .iter()
            .map(|page| match page.outcome {
                PageOutcome::Saved {
                    bytes,
                    reused: false,
                } => bytes,
                _ => 0,
            })
            .sum()
    }
}

/// Outcome of downloading a set of chapters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MangaReport {
    /// Display title of the manga.
    pub manga_title: String,
    /// Chapter outcomes, in the order the chapters were given.
    pub chapters: Vec<ChapterDownload>,
}

impl MangaReport {
    /// Chapters with every page on disk.
    pub fn complete(&self) -> impl Iterator<Item = &ChapterDownload> {
        self.chapters.iter().filter(|c| c.is_complete())
    }

    /// Chapters with missing pages.
    pub fn partial(&self) -> impl Iterator<Item = &ChapterDownload> {
        self.chapters
            .iter()
            .filter(|c| matches!(c.status, ChapterStatus::Partial { .. }))
    }

    /// Chapters that saved nothing.
    pub fn failed(&self) -> impl Iterator<Item = &ChapterDownload> {
        self.chapters
            .iter()
            .filter(|c| matches!(c.status, ChapterStatus::Failed { .. }))
    }

    /// Returns true if every chapter is complete.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.chapters.iter().all(ChapterDownload::is_complete)
    }
}

impl fmt::Display for MangaReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}: {} complete, {} partial, {} failed",
            self.manga_title,
            self.complete().count(),
            self.partial().count(),
            self.failed().count()
        )?;
        for chapter in &self.chapters {
            match &chapter.status {
                ChapterStatus::Complete => {}
                ChapterStatus::Partial { missing } => {
                    let pages: Vec<String> = missing.iter().map(ToString::to_string).collect();
                    writeln!(
                        f,
                        "  partial  {} (missing pages {})",
                        chapter.label,
                        pages.join(", ")
                    )?;
                }
                ChapterStatus::Failed { reason } => {
                    writeln!(f, "  failed   {}: {reason}", chapter.label)?;
                }
            }
        }
        Ok(())
    }
}

/// Downloads chapters through the shared executor.
#[derive(Debug)]
pub struct DownloadOrchestrator {
    api: ApiClient,
    reporter: Option<ImageReporter>,
    options: DownloadOptions,
    /// Chapter directories claimed during this run, by chapter id.
    claims: DashMap<PathBuf, String>,
    stats: Arc<DownloadStats>,
}

impl DownloadOrchestrator {
    /// Creates an orchestrator.
    ///
    /// `reporter` is optional; without one no image reports are sent.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if a concurrency option is out of range.
    #[instrument(skip(api, reporter), fields(concurrency = options.concurrency_limit))]
    pub fn new(
        api: ApiClient,
        reporter: Option<ImageReporter>,
        options: DownloadOptions,
    ) -> Result<Self, EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&options.concurrency_limit) {
            return Err(EngineError::InvalidConcurrency {
                value: options.concurrency_limit,
                min: MIN_CONCURRENCY,
                max: MAX_CONCURRENCY,
            });
        }
        if !(1..=MAX_CHAPTER_CONCURRENCY).contains(&options.chapter_concurrency) {
            return Err(EngineError::InvalidChapterConcurrency {
                value: options.chapter_concurrency,
                min: 1,
                max: MAX_CHAPTER_CONCURRENCY,
            });
        }

        debug!("creating download orchestrator");
        Ok(Self {
            api,
            reporter,
            options,
            claims: DashMap::new(),
            stats: Arc::new(DownloadStats::new()),
        })
    }

    /// Run-wide page counters.
    #[must_use]
    pub fn stats(&self) -> &DownloadStats {
        &self.stats
    }

    /// Download options in effect.
    #[must_use]
    pub fn options(&self) -> &DownloadOptions {
        &self.options
    }

    /// Where `chapter` of `manga_title` is saved.
    #[must_use]
    pub fn save_target(&self, manga_title: &str, chapter: &Chapter) -> SaveTarget {
        SaveTarget::new(
            &self.options.save_root,
            manga_title,
            chapter,
            self.options.max_title_length,
        )
    }

    /// Downloads every page of `chapter` that is not already on disk.
    #[instrument(skip(self, chapter), fields(chapter_id = %chapter.id(), label = %chapter.label))]
    pub async fn download_chapter(&self, manga_title: &str, chapter: &Chapter) -> ChapterDownload {
        self.run_chapter(manga_title, chapter, None).await
    }

    /// Downloads only the 1-based `pages` of `chapter`, with a fresh manifest.
    #[instrument(skip(self, chapter), fields(chapter_id = %chapter.id(), label = %chapter.label))]
    pub async fn retry_pages(
        &self,
        manga_title: &str,
        chapter: &Chapter,
        pages: &[usize],
    ) -> ChapterDownload {
        self.run_chapter(manga_title, chapter, Some(pages)).await
    }

    /// Downloads `chapters` with at most `chapter_concurrency` in progress.
    ///
    /// `on_chapter_done` is called as each chapter finishes. A failing chapter
    /// never stops the others.
    #[instrument(skip(self, chapters, on_chapter_done), fields(chapters = chapters.len()))]
    pub async fn download_all<F>(
        &self,
        manga_title: &str,
        chapters: &[Chapter],
        on_chapter_done: F,
    ) -> MangaReport
    where
        F: Fn(&ChapterDownload),
    {
        info!(manga = %manga_title, "starting download");

        let on_chapter_done = &on_chapter_done;
        let results: Vec<ChapterDownload> = stream::iter(chapters)
            .map(|chapter| async move {
                let result = self.download_chapter(manga_title, chapter).await;
                on_chapter_done(&result);
                result
            })
            .buffered(self.options.chapter_concurrency)
            .collect()
            .await;

        let report = MangaReport {
            manga_title: manga_title.to_string(),
            chapters: results,
        };
        info!(
            complete = report.complete().count(),
            partial = report.partial().count(),
            failed = report.failed().count(),
            pages_downloaded = self.stats.downloaded(),
            pages_reused = self.stats.reused(),
            bytes = self.stats.bytes(),
            "download finished"
        );
        report
    }

    async fn run_chapter(
        &self,
        manga_title: &str,
        chapter: &Chapter,
        only: Option<&[usize]>,
    ) -> ChapterDownload {
        let target = self.save_target(manga_title, chapter);
        if let Err(error) = self.claim(&target, chapter.id()).await {
            warn!(error = %error, "chapter skipped");
            return ChapterDownload::failed(chapter, &target, &error);
        }

        let manifest = match self.api.page_manifest(chapter.id()).await {
            Ok(manifest) => manifest,
            Err(source) => {
                let error = ChapterError::manifest(chapter.id(), source);
                warn!(error = %error, "chapter failed");
                return ChapterDownload::failed(chapter, &target, &error);
            }
        };

        self.download_pages(chapter, &manifest, &target, only).await
    }

    /// Downloads `chapter` from an already fetched `manifest` into `target`.
    ///
    /// The caller is responsible for `target` not being shared with another chapter.
    pub async fn download(
        &self,
        chapter: &Chapter,
        manifest: &PageManifest,
        target: &SaveTarget,
    ) -> ChapterDownload {
        if let Err(error) = tokio::fs::create_dir_all(target.chapter_dir()).await {
            let error = ChapterError::io(target.chapter_dir(), error);
            return ChapterDownload::failed(chapter, target, &error);
        }
        self.download_pages(chapter, manifest, target, None).await
    }

    async fn claim(&self, target: &SaveTarget, chapter_id: &str) -> Result<(), ChapterError> {
        let dir = target.chapter_dir().to_path_buf();
        {
            let owner = self
                .claims
                .entry(dir.clone())
                .or_insert_with(|| chapter_id.to_string());
            if owner.value() != chapter_id {
                return Err(ChapterError::Collision {
                    path: dir,
                    existing_id: owner.value().clone(),
                    chapter_id: chapter_id.to_string(),
                });
            }
        }
        claim_directory(&dir, chapter_id).await
    }

    async fn download_pages(
        &self,
        chapter: &Chapter,
        manifest: &PageManifest,
        target: &SaveTarget,
        only: Option<&[usize]>,
    ) -> ChapterDownload {
        let urls = self.page_urls(chapter, manifest);
        if urls.is_empty() {
            let error = ChapterError::EmptyManifest {
                chapter_id: chapter.id().to_string(),
            };
            warn!(error = %error, "chapter failed");
            return ChapterDownload::failed(chapter, target, &error);
        }

        let total = urls.len();
        check_page_count(chapter, total);
        let wanted: Vec<usize> = match only {
            Some(pages) => {
                let mut pages = pages.to_vec();
                pages.sort_unstable();
                pages.dedup();
                pages
            }
            None => (1..=total).collect(),
        };
        let untouched = UntouchedPages::scan(target, &urls, &wanted).await;

        info!(pages = wanted.len(), total, dir = %target.chapter_dir().display(), "downloading chapter");

        let semaphore = Arc::new(Semaphore::new(self.options.concurrency_limit));
        let executor = Arc::clone(self.api.executor());
        let mut results = Vec::with_capacity(wanted.len());
        let mut handles: Vec<(usize, PathBuf, JoinHandle<PageTaskOutput>)> = Vec::new();

        for page in wanted {
            let Some(url) = page.checked_sub(1).and_then(|i| urls.get(i)).cloned() else {
                results.push(PageResult {
                    page,
                    path: target.chapter_dir().to_path_buf(),
                    outcome: PageOutcome::Failed {
                        cause: format!("page {page} is not in the manifest ({total} pages)"),
                    },
                    elapsed: Duration::ZERO,
                });
                continue;
            };
            let path = target.page_path(page, total, &url);

            // Acquire semaphore permit (waits while at the concurrency limit)
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                results.push(PageResult::failed(page, path, "page scheduler closed"));
                continue;
            };

            let task = PageTask {
                page,
                url,
                path: path.clone(),
                executor: Arc::clone(&executor),
                reporter: self.reporter.clone(),
            };
            handles.push((
                page,
                path,
                tokio::spawn(async move {
                    // Permit is released when the page finishes (RAII)
                    let _permit = permit;
                    task.run().await
                }),
            ));
        }

        let mut reports = Vec::new();
        for (page, path, handle) in handles {
            match handle.await {
                Ok(output) => {
                    results.push(output.result);
                    reports.extend(output.report);
                }
                Err(e) => {
                    warn!(page, error = %e, "page task panicked");
                    results.push(PageResult::failed(page, path, "page task aborted"));
                }
            }
        }

        for result in &results {
            self.stats.record(&result.outcome);
        }

        // Reports are fire-and-forget; drain them so none outlive the chapter.
        for report in reports {
            if let Err(e) = report.await {
                debug!(error = %e, "image report task aborted");
            }
        }

        let download = ChapterDownload::from_pages(chapter, target, results, &untouched);
        match &download.status {
            ChapterStatus::Complete => info!(bytes = download.bytes_written(), "chapter complete"),
            ChapterStatus::Partial { missing } => {
                warn!(missing = ?missing, "chapter incomplete");
            }
            ChapterStatus::Failed { reason } => warn!(reason = %reason, "chapter failed"),
        }
        download
    }

    fn page_urls(&self, chapter: &Chapter, manifest: &PageManifest) -> Vec<String> {
        let preferred = self.options.quality;
        if manifest.len(preferred) > 0 {
            return manifest.page_urls(preferred);
        }
        let fallback = match preferred {
            ImageQuality::Data => ImageQuality::DataSaver,
            ImageQuality::DataSaver => ImageQuality::Data,
        };
        if manifest.len(fallback) > 0 {
            warn!(
                chapter_id = %chapter.id(),
                wanted = preferred.path_segment(),
                using = fallback.path_segment(),
                "manifest lacks requested image variant"
            );
        }
        manifest.page_urls(fallback)
    }
}

impl PageResult {
    fn failed(page: usize, path: PathBuf, cause: impl Into<String>) -> Self {
        Self {
            page,
            path,
            outcome: PageOutcome::Failed {
                cause: cause.into(),
            },
            elapsed: Duration::ZERO,
        }
    }
}

/// Manifest pages outside a targeted retry.
#[derive(Debug, Default)]
struct UntouchedPages {
    saved: usize,
    missing: Vec<usize>,
}

impl UntouchedPages {
    /// Checks which manifest pages not in `wanted` are already on disk.
    async fn scan(target: &SaveTarget, urls: &[String], wanted: &[usize]) -> Self {
        let total = urls.len();
        let mut untouched = Self::default();
        for (index, url) in urls.iter().enumerate() {
            let page = index + 1;
            if wanted.binary_search(&page).is_ok() {
                continue;
            }
            if existing_file_size(&target.page_path(page, total, url))
                .await
                .is_some()
            {
                untouched.saved += 1;
            } else {
                untouched.missing.push(page);
            }
        }
        untouched
    }
}

/// Warns when the manifest and the chapter record disagree on the page count.
///
/// Returns true if they agree or the record does not say.
fn check_page_count(chapter: &Chapter, manifest_pages: usize) -> bool {
    let expected = usize::try_from(chapter.record.pages).unwrap_or(usize::MAX);
    if expected == 0 || expected == manifest_pages {
        return true;
    }
    warn!(
        chapter_id = %chapter.id(),
        expected,
        manifest_pages,
        "manifest page count differs from chapter record, possible missing pages"
    );
    false
}

struct PageTaskOutput {
    result: PageResult,
    report: Option<JoinHandle<()>>,
}

struct PageTask {
    page: usize,
    url: String,
    path: PathBuf,
    executor: Arc<RequestExecutor>,
    reporter: Option<ImageReporter>,
}

impl PageTask {
    async fn run(self) -> PageTaskOutput {
        let start = Instant::now();

        if let Some(bytes) = existing_file_size(&self.path).await {
            debug!(page = self.page, path = %self.path.display(), "page already on disk");
            return self.finish(PageOutcome::Saved { bytes, reused: true }, start, None);
        }

        let key = EndpointKey::image_host(&image_host(&self.url));
        let response = self
            .executor
            .execute(&key, &HttpRequest::get(self.url.as_str()))
            .await;

        match response {
            Ok(response) if response.body.is_empty() => {
                let report = ImageReport::failure(&self.url, start.elapsed());
                let handle = self.spawn_report(report);
                let cause = format!("empty image body from {}", self.url);
                self.finish(PageOutcome::Failed { cause }, start, handle)
            }
            Ok(response) => {
                let report = ImageReport::success(&response, start.elapsed());
                let handle = self.spawn_report(report);
                let outcome = match write_atomically(&self.path, &response.body).await {
                    Ok(()) => PageOutcome::Saved {
                        bytes: response.body.len() as u64,
                        reused: false,
                    },
                    Err(e) => PageOutcome::Failed {
                        cause: format!("could not write {}: {e}", self.path.display()),
                    },
                };
                self.finish(outcome, start, handle)
            }
            Err(error @ ExecuteError::Cancelled { .. }) => self.finish(
                PageOutcome::Failed {
                    cause: error.to_string(),
                },
                start,
                None,
            ),
            Err(error) => {
                let handle = self.spawn_report(ImageReport::failure(&self.url, start.elapsed()));
                self.finish(
                    PageOutcome::Failed {
                        cause: error.to_string(),
                    },
                    start,
                    handle,
                )
            }
        }
    }

    fn spawn_report(&self, report: ImageReport) -> Option<JoinHandle<()>> {
        let reporter = self.reporter.clone()?;
        Some(tokio::spawn(async move { reporter.send(report).await }))
    }

    fn finish(
        self,
        outcome: PageOutcome,
        start: Instant,
        report: Option<JoinHandle<()>>,
    ) -> PageTaskOutput {
        if let PageOutcome::Failed { cause } = &outcome {
            warn!(page = self.page, url = %self.url, error = %cause, "page failed");
        }
        PageTaskOutput {
            result: PageResult {
                page: self.page,
                path: self.path,
                outcome,
                elapsed: start.elapsed(),
            },
            report,
        }
    }
}

async fn existing_file_size(path: &Path) -> Option<u64> {
    let metadata = tokio::fs::metadata(path).await.ok()?;
    (metadata.is_file() && metadata.len() > 0).then(|| metadata.len())
}

fn image_host(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
        .unwrap_or_else(|| "unknown".to_string())
}
