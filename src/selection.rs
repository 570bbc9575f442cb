//! Chapter selection expressions.
//!
//! A selection picks catalog entries by their 1-based position:
//!
//! - A chapter: `2`
//! - Several chapters: `2, 5, 8`
//! - An inclusive range: `3-8`
//! - Any mix: `1, 3, 5-8, 11-14`
//!
//! Spaces are ignored and a trailing comma is tolerated.

use std::collections::BTreeSet;
use std::str::FromStr;

use thiserror::Error;

/// Largest accepted position; keeps `1-99999999` from allocating a huge set.
const MAX_POSITION: usize = 100_000;

/// Errors produced while parsing or applying a selection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    /// Nothing was selected.
    #[error("selection cannot be blank")]
    Empty,

    /// Two commas with nothing between them.
    #[error("empty item at position {position} (two commas in a row?)")]
    EmptyItem {
        /// Character offset in the whitespace-free input.
        position: usize,
    },

    /// A character other than a digit, `-` or `,`.
    #[error("unexpected character '{found}' at position {position}")]
    UnexpectedChar {
        /// The offending character.
        found: char,
        /// Character offset in the whitespace-free input.
        position: usize,
    },

    /// A range with a missing side or more than one `-`.
    #[error("invalid range '{item}': expected START-END")]
    InvalidRange {
        /// The offending item.
        item: String,
    },

    /// A range whose start is after its end.
    #[error("invalid range '{item}': start must not exceed end")]
    DescendingRange {
        /// The offending item.
        item: String,
    },

    /// A number too large to represent.
    #[error("number '{item}' is too large")]
    Overflow {
        /// The offending item.
        item: String,
    },

    /// Position 0 (selections are 1-based).
    #[error("chapter positions start at 1")]
    Zero,

    /// A position beyond the end of the catalog.
    #[error("position {position} is out of range (catalog has {available} chapters)")]
    OutOfRange {
        /// Requested position.
        position: usize,
        /// Catalog length.
        available: usize,
    },
}

/// A parsed set of 1-based positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    positions: BTreeSet<usize>,
}

impl Selection {
    /// Parses a selection expression.
    ///
    /// # Errors
    ///
    /// Returns a [`SelectionError`] describing the first problem found.
    pub fn parse(input: &str) -> Result<Self, SelectionError> {
        let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
        let compact = compact.strip_suffix(',').unwrap_or(compact.as_str());
        if compact.is_empty() {
            return Err(SelectionError::Empty);
        }

        if let Some((position, found)) = compact
            .chars()
            .enumerate()
            .find(|(_, c)| !c.is_ascii_digit() && *c != '-' && *c != ',')
        {
            return Err(SelectionError::UnexpectedChar { found, position });
        }

        let mut positions = BTreeSet::new();
        let mut offset = 0;
        for item in compact.split(',') {
            if item.is_empty() {
                return Err(SelectionError::EmptyItem { position: offset });
            }
            match item.split_once('-') {
                None => {
                    positions.insert(parse_position(item)?);
                }
                Some((start, end)) => {
                    if start.is_empty() || end.is_empty() || end.contains('-') {
                        return Err(SelectionError::InvalidRange {
                            item: item.to_string(),
                        });
                    }
                    let (start, end) = (parse_position(start)?, parse_position(end)?);
                    if start > end {
                        return Err(SelectionError::DescendingRange {
                            item: item.to_string(),
                        });
                    }
                    positions.extend(start..=end);
                }
            }
            offset += item.len() + 1;
        }

        Ok(Self { positions })
    }

    /// Selected positions in ascending order.
    pub fn positions(&self) -> impl Iterator<Item = usize> + '_ {
        self.positions.iter().copied()
    }

    /// Number of selected positions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Returns true if nothing is selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Picks the selected entries of `items`, in catalog order.
    ///
    /// # Errors
    ///
    /// Returns [`SelectionError::OutOfRange`] if a position exceeds `items.len()`.
    pub fn apply<T: Clone>(&self, items: &[T]) -> Result<Vec<T>, SelectionError> {
        if let Some(&last) = self.positions.last() {
            if last > items.len() {
                return Err(SelectionError::OutOfRange {
                    position: last,
                    available: items.len(),
                });
            }
        }
        Ok(self
            .positions
            .iter()
            .map(|&position| items[position - 1].clone())
            .collect())
    }
}

impl FromStr for Selection {
    type Err = SelectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn parse_position(text: &str) -> Result<usize, SelectionError> {
    let value: usize = text
        .parse()
        .ok()
        .filter(|value| *value <= MAX_POSITION)
        .ok_or_else(|| SelectionError::Overflow {
            item: text.to_string(),
        })?;
    if value == 0 {
        return Err(SelectionError::Zero);
    }
    Ok(value)
}
