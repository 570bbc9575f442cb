//! Chapter catalog building.
//!
//! Turns raw feed records into an ordered, de-duplicated list of chapters:
//!
//! 1. Keep records whose language equals the requested one exactly.
//! 2. Parse the chapter number. Anything that is not digits with at most one
//!    decimal point (empty, `"Extra"`, `"1.2.3"`) is an *unknown* number.
//! 3. Group numbered records by numeric value (`"1"` and `"1.0"` compete).
//!    The earliest published record wins; equal timestamps fall back to the
//!    smallest id so repeated runs pick the same release.
//! 4. Every unknown-number record is its own entry.
//! 5. Sort numerically, unknowns last, ties by publish time then id.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, instrument};

use crate::api::ChapterRecord;

/// Digits with an optional single fractional part.
#[allow(clippy::expect_used)]
static CHAPTER_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]+(?:\.[0-9]+)?$").expect("chapter number regex is valid") // Static pattern, safe to panic
});

/// One downloadable chapter: the chosen release of a chapter number.
#[derive(Debug, Clone, PartialEq)]
pub struct Chapter {
    /// The release that will be downloaded.
    pub record: ChapterRecord,
    /// Parsed chapter number, `None` for unknown.
    pub number: Option<f64>,
    /// Display label, e.g. `Ch. 12.5 - The Return` or `Ch. Unknown`.
    pub label: String,
    /// Number of releases that competed for this entry (1 if none did).
    pub releases: usize,
}

impl Chapter {
    fn new(record: ChapterRecord, number: Option<f64>, releases: usize) -> Self {
        let label = chapter_label(&record, number.is_some());
        Self {
            record,
            number,
            label,
            releases,
        }
    }

    /// Chapter id of the chosen release.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.record.id
    }

    /// Returns true if the chapter number could not be parsed.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.number.is_none()
    }

    /// Sort value: the number, or `+inf` for unknown.
    #[must_use]
    pub fn sort_value(&self) -> f64 {
        self.number.unwrap_or(f64::INFINITY)
    }

    fn catalog_order(&self, other: &Self) -> Ordering {
        self.sort_value()
            .total_cmp(&other.sort_value())
            .then_with(|| release_order(&self.record, &other.record))
    }
}

/// Parses a published chapter number.
///
/// Returns `None` for empty or non-numeric strings.
#[must_use]
pub fn parse_chapter_number(raw: Option<&str>) -> Option<f64> {
    let raw = raw?.trim();
    if !CHAPTER_NUMBER.is_match(raw) {
        return None;
    }
    raw.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Builds the ordered catalog for `language`.
#[must_use]
#[instrument(skip(records), fields(records = records.len()))]
pub fn build_catalog(records: &[ChapterRecord], language: &str) -> Vec<Chapter> {
    let mut numbered: BTreeMap<NumberKey, Vec<&ChapterRecord>> = BTreeMap::new();
    let mut catalog = Vec::new();

    for record in records.iter().filter(|r| r.language == language) {
        match parse_chapter_number(record.number.as_deref()) {
            Some(number) => numbered.entry(NumberKey(number)).or_default().push(record),
            None => catalog.push(Chapter::new(record.clone(), None, 1)),
        }
    }

    for (NumberKey(number), mut releases) in numbered {
        releases.sort_by(|a, b| release_order(a, b));
        let count = releases.len();
        if count > 1 {
            debug!(number, releases = count, chosen = %releases[0].id, "resolved competing releases");
        }
        catalog.push(Chapter::new(releases[0].clone(), Some(number), count));
    }

    catalog.sort_by(Chapter::catalog_order);
    debug!(chapters = catalog.len(), language, "catalog built");
    catalog
}

fn release_order(a: &ChapterRecord, b: &ChapterRecord) -> Ordering {
    a.published_at
        .cmp(&b.published_at)
        .then_with(|| a.id.cmp(&b.id))
}

fn chapter_label(record: &ChapterRecord, numbered: bool) -> String {
    let number = match (numbered, record.number.as_deref()) {
        (true, Some(raw)) => raw.trim(),
        _ => "Unknown",
    };
    match record.title.as_deref().map(str::trim) {
        Some(title) if !title.is_empty() => format!("Ch. {number} - {title}"),
        _ => format!("Ch. {number}"),
    }
}

/// Total-ordered chapter number used as a grouping key.
#[derive(Debug, Clone, Copy)]
struct NumberKey(f64);

impl PartialEq for NumberKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for NumberKey {}

impl PartialOrd for NumberKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NumberKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}
