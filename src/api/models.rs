//! Wire models of the remote records and the domain types built from them.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Preferred title languages, in order.
const TITLE_LANGUAGES: [&str; 3] = ["en", "ja-ro", "ja"];

/// Title used when a manga carries none.
pub const UNTITLED: &str = "Untitled";

/// One page of a paginated listing.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectionResponse<T> {
    /// Records on this page.
    pub data: Vec<T>,
    /// Page size the service applied.
    #[serde(default)]
    pub limit: usize,
    /// Offset of the first record.
    #[serde(default)]
    pub offset: usize,
    /// Total number of records across all pages.
    pub total: usize,
}

/// A single-entity response.
#[derive(Debug, Clone, Deserialize)]
pub struct EntityResponse<T> {
    /// The entity.
    pub data: T,
}

/// Manga record as returned by the service.
#[derive(Debug, Clone, Deserialize)]
pub struct MangaData {
    /// Manga id.
    pub id: String,
    /// Manga attributes.
    pub attributes: MangaAttributes,
}

/// Localised manga titles.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MangaAttributes {
    /// Main title by language code.
    #[serde(default)]
    pub title: HashMap<String, String>,
    /// Alternative titles, each keyed by language code.
    #[serde(default)]
    pub alt_titles: Vec<HashMap<String, String>>,
}

/// Chapter record as returned by the feed.
#[derive(Debug, Clone, Deserialize)]
pub struct ChapterData {
    /// Chapter id.
    pub id: String,
    /// Chapter attributes.
    pub attributes: ChapterAttributes,
    /// Related entities (scanlation groups, uploader).
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

/// Chapter attributes.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterAttributes {
    /// Chapter number as published (free text, may be absent).
    #[serde(default)]
    pub chapter: Option<String>,
    /// Chapter title.
    #[serde(default)]
    pub title: Option<String>,
    /// Language code of the translation.
    #[serde(default)]
    pub translated_language: Option<String>,
    /// Set when the chapter is hosted elsewhere.
    #[serde(default)]
    pub external_url: Option<String>,
    /// Publication time.
    #[serde(default)]
    pub publish_at: Option<DateTime<Utc>>,
    /// Page count.
    #[serde(default)]
    pub pages: u32,
}

/// Reference to a related entity.
#[derive(Debug, Clone, Deserialize)]
pub struct Relationship {
    /// Related entity id.
    pub id: String,
    /// Related entity type, e.g. `scanlation_group`.
    #[serde(rename = "type")]
    pub kind: String,
}

/// Page manifest response of the at-home endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtHomeResponse {
    /// CDN base URL, valid for a limited time.
    pub base_url: String,
    /// Page file names.
    pub chapter: AtHomeChapter,
}

/// Page file names of a chapter.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtHomeChapter {
    /// Content hash used in page URLs.
    pub hash: String,
    /// Original-quality file names.
    #[serde(default)]
    pub data: Vec<String>,
    /// Compressed file names.
    #[serde(default)]
    pub data_saver: Vec<String>,
}

/// A manga, reduced to what the downloader needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manga {
    /// Manga id.
    pub id: String,
    /// Display title.
    pub title: String,
}

impl From<MangaData> for Manga {
    fn from(data: MangaData) -> Self {
        let title = display_title(&data.attributes);
        Self { id: data.id, title }
    }
}

/// A chapter release as listed by the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterRecord {
    /// Chapter id.
    pub id: String,
    /// Chapter number as published.
    pub number: Option<String>,
    /// Chapter title.
    pub title: Option<String>,
    /// Language code of the translation.
    pub language: String,
    /// Publication time (`DateTime::MAX_UTC` if unknown).
    pub published_at: DateTime<Utc>,
    /// Scanlation groups credited for the release.
    pub group_ids: Vec<String>,
    /// Page count reported by the feed.
    pub pages: u32,
    /// Set when the chapter is hosted elsewhere.
    pub external_url: Option<String>,
}

impl From<ChapterData> for ChapterRecord {
    fn from(data: ChapterData) -> Self {
        let ChapterData {
            id,
            attributes,
            relationships,
        } = data;
        let group_ids = relationships
            .into_iter()
            .filter(|rel| rel.kind == "scanlation_group")
            .map(|rel| rel.id)
            .collect();
        Self {
            id,
            number: attributes.chapter,
            title: attributes.title,
            language: attributes.translated_language.unwrap_or_default(),
            published_at: attributes.publish_at.unwrap_or(DateTime::<Utc>::MAX_UTC),
            group_ids,
            pages: attributes.pages,
            external_url: attributes.external_url,
        }
    }
}

/// Which image variant to download.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ImageQuality {
    /// Original quality.
    #[default]
    Data,
    /// Compressed images.
    DataSaver,
}

impl ImageQuality {
    /// URL path segment of the variant.
    #[must_use]
    pub fn path_segment(self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::DataSaver => "data-saver",
        }
    }
}

/// Ordered page image locations of one chapter.
///
/// Manifests expire, so one is fetched fresh for every chapter attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageManifest {
    /// CDN base URL.
    pub base_url: String,
    /// Content hash.
    pub hash: String,
    /// Original-quality file names.
    pub data: Vec<String>,
    /// Compressed file names.
    pub data_saver: Vec<String>,
}

impl From<AtHomeResponse> for PageManifest {
    fn from(response: AtHomeResponse) -> Self {
        Self {
            base_url: response.base_url,
            hash: response.chapter.hash,
            data: response.chapter.data,
            data_saver: response.chapter.data_saver,
        }
    }
}

impl PageManifest {
    /// Image URLs in page order for `quality`.
    #[must_use]
    pub fn page_urls(&self, quality: ImageQuality) -> Vec<String> {
        let files = match quality {
            ImageQuality::Data => &self.data,
            ImageQuality::DataSaver => &self.data_saver,
        };
        let base = self.base_url.trim_end_matches('/');
        files
            .iter()
            .map(|file| format!("{base}/{}/{}/{file}", quality.path_segment(), self.hash))
            .collect()
    }

    /// Number of pages in `quality`.
    #[must_use]
    pub fn len(&self, quality: ImageQuality) -> usize {
        match quality {
            ImageQuality::Data => self.data.len(),
            ImageQuality::DataSaver => self.data_saver.len(),
        }
    }

    /// Returns true if neither variant lists a page.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty() && self.data_saver.is_empty()
    }
}

/// Picks the display title: `en`, `ja-ro`, `ja`, then any title, then [`UNTITLED`].
///
/// Alternative titles are consulted for each preferred language after the main title.
#[must_use]
pub fn display_title(attributes: &MangaAttributes) -> String {
    fn usable(value: &str) -> bool {
        !value.trim().is_empty()
    }

    for language in TITLE_LANGUAGES {
        if let Some(title) = attributes.title.get(language).filter(|t| usable(t)) {
            return title.trim().to_string();
        }
        if let Some(title) = attributes
            .alt_titles
            .iter()
            .find_map(|alt| alt.get(language).filter(|t| usable(t)))
        {
            return title.trim().to_string();
        }
    }

    let mut languages: Vec<&String> = attributes.title.keys().collect();
    languages.sort();
    languages
        .into_iter()
        .filter_map(|language| attributes.title.get(language))
        .chain(attributes.alt_titles.iter().flat_map(HashMap::values))
        .find(|title| usable(title))
        .map_or_else(|| UNTITLED.to_string(), |title| title.trim().to_string())
}
