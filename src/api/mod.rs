//! Remote API access: endpoints, wire models, paginated listing.
//!
//! [`ApiClient`] sends every call through a shared
//! [`RequestExecutor`], so API calls are throttled per route template and
//! retried like any other request.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use mdex_core::{ApiClient, RequestExecutor, RetryPolicy, ReqwestTransport, SystemClock, ThrottleTracker};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let tracker = Arc::new(ThrottleTracker::new(Arc::new(SystemClock)));
//! let transport = Arc::new(ReqwestTransport::new("mdex-dl")?);
//! let executor = Arc::new(RequestExecutor::new(
//!     transport,
//!     tracker,
//!     RetryPolicy::default(),
//!     Duration::from_secs(30),
//! ));
//! let api = ApiClient::new(executor, "https://api.mangadex.org")?;
//! for manga in api.search_manga("yotsuba", 10).await? {
//!     println!("{} {}", manga.id, manga.title);
//! }
//! # Ok(())
//! # }
//! ```

mod endpoint;
mod error;
mod models;
mod pagination;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument};
use url::Url;

pub use endpoint::Endpoint;
pub use error::ApiError;
pub use models::{
    AtHomeResponse, ChapterData, ChapterRecord, CollectionResponse, EntityResponse, ImageQuality,
    Manga, MangaAttributes, MangaData, PageManifest, UNTITLED, display_title,
};
pub use pagination::{MAX_PAGE_SIZE, MAX_PAGINATION_WINDOW, PaginatedLister};

use crate::download::{HttpRequest, RequestExecutor};

/// Default API root.
pub const DEFAULT_API_ROOT: &str = "https://api.mangadex.org";

/// Typed facade over the remote API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    executor: Arc<RequestExecutor>,
    api_root: Url,
    page_size: usize,
    include_pornographic: bool,
}

impl ApiClient {
    /// Creates a client rooted at `api_root`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidUrl`] if `api_root` is not an absolute URL.
    pub fn new(executor: Arc<RequestExecutor>, api_root: &str) -> Result<Self, ApiError> {
        let api_root = Url::parse(api_root).map_err(|_| ApiError::invalid_url(api_root))?;
        if api_root.cannot_be_a_base() {
            return Err(ApiError::invalid_url(api_root.as_str()));
        }
        Ok(Self {
            executor,
            api_root,
            page_size: MAX_PAGE_SIZE,
            include_pornographic: false,
        })
    }

    /// Sets the listing page size (clamped to 1..=100).
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    /// Includes `pornographic` content in searches and feeds.
    #[must_use]
    pub fn with_pornographic(mut self, include: bool) -> Self {
        self.include_pornographic = include;
        self
    }

    /// The executor every call goes through.
    #[must_use]
    pub fn executor(&self) -> &Arc<RequestExecutor> {
        &self.executor
    }

    /// Listing page size.
    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Sends `endpoint` (plus `extra` query parameters) and decodes the JSON body.
    ///
    /// # Errors
    ///
    /// - [`ApiError::Request`] if the executor gives up
    /// - [`ApiError::Remote`] if the body reports `"result": "error"`
    /// - [`ApiError::Decode`] if the body does not match `T`
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &Endpoint,
        extra: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let url = endpoint.url(&self.api_root, extra)?;
        let response = self
            .executor
            .execute(&endpoint.key(), &HttpRequest::get(url.as_str()))
            .await
            .map_err(ApiError::request)?;

        let value: serde_json::Value = response
            .json()
            .map_err(|e| ApiError::decode(url.as_str(), e))?;
        if value.get("result").and_then(serde_json::Value::as_str) == Some("error") {
            return Err(ApiError::Remote {
                url: url.to_string(),
                detail: remote_error_detail(&value),
            });
        }
        serde_json::from_value(value).map_err(|e| ApiError::decode(url.as_str(), e))
    }

    /// Searches manga by title, returning at most `max_results` matches by relevance.
    ///
    /// # Errors
    ///
    /// Propagates listing failures.
    #[instrument(skip(self))]
    pub async fn search_manga(&self, title: &str, max_results: usize) -> Result<Vec<Manga>, ApiError> {
        let endpoint = Endpoint::SearchManga {
            title: title.to_string(),
            include_pornographic: self.include_pornographic,
        };
        let records: Vec<MangaData> = PaginatedLister::new(self, self.page_size)
            .with_max_records(max_results)
            .list_all(&endpoint)
            .await?;
        Ok(records.into_iter().map(Manga::from).collect())
    }

    /// Fetches a single manga.
    ///
    /// # Errors
    ///
    /// Propagates request and decode failures.
    #[instrument(skip(self))]
    pub async fn manga(&self, id: &str) -> Result<Manga, ApiError> {
        let endpoint = Endpoint::Manga { id: id.to_string() };
        let response: EntityResponse<MangaData> = self.get_json(&endpoint, &[]).await?;
        Ok(Manga::from(response.data))
    }

    /// Fetches a manga picked at random by the service.
    ///
    /// # Errors
    ///
    /// Propagates request and decode failures.
    #[instrument(skip(self))]
    pub async fn random_manga(&self) -> Result<Manga, ApiError> {
        let endpoint = Endpoint::RandomManga {
            include_pornographic: self.include_pornographic,
        };
        let response: EntityResponse<MangaData> = self.get_json(&endpoint, &[]).await?;
        Ok(Manga::from(response.data))
    }

    /// Lists every chapter release of a manga.
    ///
    /// Releases hosted on external sites are dropped; they have no pages to fetch.
    ///
    /// # Errors
    ///
    /// Propagates listing failures.
    #[instrument(skip(self))]
    pub async fn chapter_feed(&self, manga_id: &str) -> Result<Vec<ChapterRecord>, ApiError> {
        let endpoint = Endpoint::MangaFeed {
            manga_id: manga_id.to_string(),
            include_pornographic: self.include_pornographic,
        };
        let records: Vec<ChapterData> = PaginatedLister::new(self, self.page_size)
            .list_all(&endpoint)
            .await?;

        let listed = records.len();
        let chapters: Vec<ChapterRecord> = records
            .into_iter()
            .map(ChapterRecord::from)
            .filter(|record| {
                if let Some(external) = &record.external_url {
                    debug!(chapter_id = %record.id, external = %external, "skipping externally hosted chapter");
                    return false;
                }
                true
            })
            .collect();

        info!(listed, hosted = chapters.len(), "chapter feed fetched");
        Ok(chapters)
    }

    /// Fetches a fresh page manifest for a chapter.
    ///
    /// # Errors
    ///
    /// Propagates request and decode failures.
    #[instrument(skip(self))]
    pub async fn page_manifest(&self, chapter_id: &str) -> Result<PageManifest, ApiError> {
        let endpoint = Endpoint::AtHomeServer {
            chapter_id: chapter_id.to_string(),
        };
        let response: AtHomeResponse = self.get_json(&endpoint, &[]).await?;
        Ok(PageManifest::from(response))
    }
}

fn remote_error_detail(value: &serde_json::Value) -> String {
    let details: Vec<String> = value
        .get("errors")
        .and_then(serde_json::Value::as_array)
        .map(|errors| {
            errors
                .iter()
                .map(|error| {
                    let title = error.get("title").and_then(serde_json::Value::as_str);
                    let detail = error.get("detail").and_then(serde_json::Value::as_str);
                    match (title, detail) {
                        (Some(title), Some(detail)) => format!("{title}: {detail}"),
                        (Some(text), None) | (None, Some(text)) => text.to_string(),
                        (None, None) => "unknown error".to_string(),
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    if details.is_empty() {
        "unknown error".to_string()
    } else {
        details.join("; ")
    }
}
