//! # Source list: catalogued positions driving the per-source runs
//!
//! A source list is a comma-separated text file with one source per line:
//!
//! ```text
//! # id, coord_1, coord_2, coord_3, ...
//! Source 1, 180.25, -30.5, 1.4185e9, 1
//! Source 2, 180.31, -30.4, 1.4190e9, 1
//! ```
//!
//! The first field is a unique identifier used as a suffix for all output products of
//! that source; the remaining fields are world coordinates, one per cube axis, in the
//! **native units of the cube header** (e.g. degrees for RA/Dec, Hz for frequency) and
//! in cube axis order.
//!
//! Modules
//! -----------------
//! * [`source_list_reader`] – Parsing of the text format into a [`SourceList`].
//!
//! See also
//! ------------
//! * [`crate::region::compute_region`] – Turns a [`SourceRecord`] into a pixel sub-region.
use crate::constants::{sanitize_source_id, SourceId, WorldValue};

pub mod source_list_reader;

pub use source_list_reader::{parse_source_list, read_source_list};

/// One catalogued source: identifier plus world coordinates in cube axis order.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    pub id: SourceId,
    pub coordinates: Vec<WorldValue>,
}

impl SourceRecord {
    pub fn new(id: impl Into<SourceId>, coordinates: Vec<WorldValue>) -> Self {
        SourceRecord {
            id: id.into(),
            coordinates,
        }
    }

    /// Identifier with the characters unsuitable for file names replaced.
    pub fn file_suffix(&self) -> String {
        sanitize_source_id(&self.id)
    }
}

/// Ordered, validated collection of [`SourceRecord`]s.
///
/// Invariants
/// -----------------
/// * At least one source.
/// * Every source has the same number of coordinates.
/// * Identifiers are unique, and so are their file name suffixes.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceList {
    sources: Vec<SourceRecord>,
}

impl SourceList {
    pub(crate) fn from_validated(sources: Vec<SourceRecord>) -> Self {
        SourceList { sources }
    }

    /// Number of coordinate values carried by every source.
    pub fn coordinate_count(&self) -> usize {
        self.sources
            .first()
            .map(|s| s.coordinates.len())
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SourceRecord> {
        self.sources.iter()
    }

    pub fn as_slice(&self) -> &[SourceRecord] {
        &self.sources
    }
}

impl<'a> IntoIterator for &'a SourceList {
    type Item = &'a SourceRecord;
    type IntoIter = std::slice::Iter<'a, SourceRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.sources.iter()
    }
}
