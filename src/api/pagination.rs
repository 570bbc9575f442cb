//! Eager collection of offset/limit paginated listings.
//!
//! The first page is requested at offset 0 and its `total` fixes the number
//! of further requests. Every page goes through the resilient executor, so a
//! page that ultimately fails fails the whole listing, and so does a listing
//! that runs dry before `total`: callers never see a partial list presented
//! as complete.

use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};

use super::ApiClient;
use super::endpoint::Endpoint;
use super::error::ApiError;
use super::models::CollectionResponse;

/// Largest `offset + limit` the service will serve.
pub const MAX_PAGINATION_WINDOW: usize = 10_000;

/// Largest page size the service accepts.
pub const MAX_PAGE_SIZE: usize = 100;

/// Walks a paginated endpoint to the end.
#[derive(Debug, Clone)]
pub struct PaginatedLister<'a> {
    client: &'a ApiClient,
    page_size: usize,
    max_records: Option<usize>,
}

impl<'a> PaginatedLister<'a> {
    /// Creates a lister requesting `page_size` records per page (clamped to 1..=100).
    #[must_use]
    pub fn new(client: &'a ApiClient, page_size: usize) -> Self {
        Self {
            client,
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
            max_records: None,
        }
    }

    /// Stops after `max` records instead of walking the whole listing.
    #[must_use]
    pub fn with_max_records(mut self, max: usize) -> Self {
        self.max_records = Some(max);
        self
    }

    /// Page size actually requested.
    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Fetches every record of `endpoint`, in the order the service returns them.
    ///
    /// # Errors
    ///
    /// - Any page request failure, after the executor's retries
    /// - [`ApiError::PaginationWindow`] if the records to fetch lie beyond
    ///   [`MAX_PAGINATION_WINDOW`]
    /// - [`ApiError::IncompleteListing`] if the pages hold fewer records than
    ///   the reported total
    #[instrument(skip(self), fields(key = %endpoint.key(), page_size = self.page_size))]
    pub async fn list_all<T: DeserializeOwned>(
        &self,
        endpoint: &Endpoint,
    ) -> Result<Vec<T>, ApiError> {
        let first: CollectionResponse<T> = self.fetch_page(endpoint, 0).await?;
        let total = first.total;
        let wanted = self.max_records.map_or(total, |max| max.min(total));

        if wanted > 0 {
            let last_offset = (wanted - 1) / self.page_size * self.page_size;
            if last_offset + self.page_size > MAX_PAGINATION_WINDOW {
                return Err(ApiError::PaginationWindow {
                    total,
                    max_window: MAX_PAGINATION_WINDOW,
                });
            }
        }

        let mut records = Vec::with_capacity(wanted);
        let mut dry = first.data.is_empty();
        records.extend(first.data);

        let mut offset = self.page_size;
        while !dry && offset < wanted && records.len() < wanted {
            let page: CollectionResponse<T> = self.fetch_page(endpoint, offset).await?;
            debug!(offset, received = page.data.len(), total, "fetched page");
            dry = page.data.is_empty();
            records.extend(page.data);
            offset += self.page_size;
        }

        if records.len() < wanted {
            warn!(received = records.len(), expected = wanted, "listing ended early");
            return Err(ApiError::IncompleteListing {
                expected: wanted,
                received: records.len(),
            });
        }
        records.truncate(wanted);
        info!(records = records.len(), total, "listing complete");
        Ok(records)
    }

    async fn fetch_page<T: DeserializeOwned>(
        &self,
        endpoint: &Endpoint,
        offset: usize,
    ) -> Result<CollectionResponse<T>, ApiError> {
        let extra = [
            ("limit", self.page_size.to_string()),
            ("offset", offset.to_string()),
        ];
        self.client.get_json(endpoint, &extra).await
    }
}
