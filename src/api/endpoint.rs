//! Remote endpoints, their throttle buckets, and URL construction.

use url::Url;

use super::error::ApiError;
use crate::download::EndpointKey;

/// Content ratings always requested.
const SAFE_CONTENT_RATINGS: [&str; 3] = ["safe", "suggestive", "erotica"];

/// A remote API call.
///
/// Each variant maps to one route template, and each template is its own
/// throttle bucket: rate limits on the feed do not block manifest fetches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `GET /manga` - title search.
    SearchManga {
        /// Free-text title query.
        title: String,
        /// Include `pornographic` in the content ratings.
        include_pornographic: bool,
    },
    /// `GET /manga/random` - one manga picked by the service.
    RandomManga {
        /// Include `pornographic` in the content ratings.
        include_pornographic: bool,
    },
    /// `GET /manga/{id}` - a single manga.
    Manga {
        /// Manga id.
        id: String,
    },
    /// `GET /manga/{id}/feed` - every chapter of a manga, oldest chapter first.
    MangaFeed {
        /// Manga id.
        manga_id: String,
        /// Include `pornographic` in the content ratings.
        include_pornographic: bool,
    },
    /// `GET /at-home/server/{chapterId}` - page manifest of a chapter.
    AtHomeServer {
        /// Chapter id.
        chapter_id: String,
    },
}

impl Endpoint {
    /// Route template, used as the throttle bucket name.
    #[must_use]
    pub fn template(&self) -> &'static str {
        match self {
            Self::SearchManga { .. } => "GET /manga",
            Self::RandomManga { .. } => "GET /manga/random",
            Self::Manga { .. } => "GET /manga/{id}",
            Self::MangaFeed { .. } => "GET /manga/{id}/feed",
            Self::AtHomeServer { .. } => "GET /at-home/server/{chapterId}",
        }
    }

    /// Throttle bucket for this endpoint.
    #[must_use]
    pub fn key(&self) -> EndpointKey {
        EndpointKey::new(self.template())
    }

    fn segments(&self) -> Vec<&str> {
        match self {
            Self::SearchManga { .. } => vec!["manga"],
            Self::RandomManga { .. } => vec!["manga", "random"],
            Self::Manga { id } => vec!["manga", id],
            Self::MangaFeed { manga_id, .. } => vec!["manga", manga_id, "feed"],
            Self::AtHomeServer { chapter_id } => vec!["at-home", "server", chapter_id],
        }
    }

    /// Fixed query parameters of this endpoint.
    #[must_use]
    pub fn query(&self) -> Vec<(String, String)> {
        let mut query = Vec::new();
        match self {
            Self::SearchManga {
                title,
                include_pornographic,
            } => {
                query.push(("title".to_string(), title.clone()));
                query.push(("order[relevance]".to_string(), "desc".to_string()));
                query.push(("hasAvailableChapters".to_string(), "true".to_string()));
                push_content_ratings(&mut query, *include_pornographic);
            }
            Self::RandomManga {
                include_pornographic,
            } => push_content_ratings(&mut query, *include_pornographic),
            Self::MangaFeed {
                include_pornographic,
                ..
            } => {
                query.push(("order[chapter]".to_string(), "asc".to_string()));
                query.push(("includeEmptyPages".to_string(), "0".to_string()));
                push_content_ratings(&mut query, *include_pornographic);
            }
            Self::Manga { .. } | Self::AtHomeServer { .. } => {}
        }
        query
    }

    /// Full URL under `api_root`, with the fixed query plus `extra` parameters.
    ///
    /// Ids are percent-encoded as path segments.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidUrl`] if `api_root` cannot carry a path.
    pub fn url(&self, api_root: &Url, extra: &[(&str, String)]) -> Result<Url, ApiError> {
        let mut url = api_root.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| ApiError::invalid_url(api_root.as_str()))?;
            segments.pop_if_empty();
            for segment in self.segments() {
                segments.push(segment);
            }
        }

        let query = self.query();
        if !query.is_empty() || !extra.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in &query {
                pairs.append_pair(name, value);
            }
            for (name, value) in extra {
                pairs.append_pair(name, value);
            }
        }
        Ok(url)
    }
}

fn push_content_ratings(query: &mut Vec<(String, String)>, include_pornographic: bool) {
    for rating in SAFE_CONTENT_RATINGS {
        query.push(("contentRating[]".to_string(), rating.to_string()));
    }
    if include_pornographic {
        query.push(("contentRating[]".to_string(), "pornographic".to_string()));
    }
}
