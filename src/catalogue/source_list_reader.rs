//! # Source list reader
//!
//! Parses the comma-separated source list into a validated [`SourceList`].
//!
//! ## Format
//! -----------------
//! * One source per line: `id, coord_1, coord_2, ...`.
//! * Blank lines and lines starting with `#` are ignored.
//! * Fields are whitespace-trimmed; an id containing commas may be double quoted.
//! * Coordinates are parsed as `f64` and kept in file order.
//!
//! ## Error Handling
//! -----------------
//! Every violation is reported as [`OptifindError::MalformedCatalogue`] with the
//! 1-based line number of the offending row:
//! * fewer than two fields, or an empty id,
//! * a coordinate that is not numeric,
//! * a coordinate count different from the first source,
//! * an id already used by an earlier source,
//! * an id whose file name suffix (see [`SourceRecord::file_suffix`]) is already used
//!   by an earlier source (`a b` and `a_b`),
//! * no source at all (reported on line `0`).
//!
//! Whether the coordinate count matches the cube dimensionality is checked later,
//! once the cube header has been read (see [`crate::region::compute_region`]).
use std::{collections::HashMap, fs::File, io::Read};

use ahash::RandomState;
use camino::Utf8Path;
use csv::{ReaderBuilder, StringRecord, Trim};

use crate::{
    catalogue::{SourceList, SourceRecord},
    optifind_errors::OptifindError,
};

fn malformed(line: u64, reason: impl Into<String>) -> OptifindError {
    OptifindError::MalformedCatalogue {
        line,
        reason: reason.into(),
    }
}

fn from_csv_error(err: csv::Error) -> OptifindError {
    let line = err.position().map(|p| p.line()).unwrap_or(0);
    match err.into_kind() {
        csv::ErrorKind::Io(e) => OptifindError::IoError(e),
        kind => malformed(line, format!("{kind:?}")),
    }
}

/// Turn one CSV record into a [`SourceRecord`].
///
/// Returns `Ok(None)` for rows that only carry whitespace or a comment introduced by
/// leading whitespace (the CSV comment marker only applies at column 1).
fn parse_record(record: &StringRecord, line: u64) -> Result<Option<SourceRecord>, OptifindError> {
    let first = record.get(0).unwrap_or_default();
    if first.starts_with('#') || (record.len() == 1 && first.is_empty()) {
        return Ok(None);
    }

    if record.len() < 2 {
        return Err(malformed(
            line,
            format!("expected an id and at least one coordinate, found {} field(s)", record.len()),
        ));
    }

    if first.is_empty() {
        return Err(malformed(line, "empty source id"));
    }

    let coordinates = record
        .iter()
        .enumerate()
        .skip(1)
        .map(|(idx, field)| {
            field.parse::<f64>().map_err(|_| {
                malformed(
                    line,
                    format!("coordinate {idx} of source \"{first}\" is not numeric: \"{field}\""),
                )
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(SourceRecord::new(first, coordinates)))
}

/// Parse a source list from any reader.
///
/// Arguments
/// -----------------
/// * `reader` – Text source (file, in-memory buffer, ...).
///
/// Return
/// ----------
/// * The validated [`SourceList`], in file order.
/// * [`OptifindError::MalformedCatalogue`] on the first invalid row.
pub fn parse_source_list<R: Read>(reader: R) -> Result<SourceList, OptifindError> {
    let mut csv_reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .trim(Trim::All)
        .from_reader(reader);

    let mut sources: Vec<SourceRecord> = Vec::new();
    let mut first_seen: HashMap<String, u64, RandomState> = HashMap::default();
    let mut suffix_owner: HashMap<String, (String, u64), RandomState> = HashMap::default();
    let mut n_coords: Option<usize> = None;

    for result in csv_reader.records() {
        let record = result.map_err(from_csv_error)?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        let Some(source) = parse_record(&record, line)? else {
            continue;
        };

        match n_coords {
            None => n_coords = Some(source.coordinates.len()),
            Some(n) if n != source.coordinates.len() => {
                return Err(malformed(
                    line,
                    format!(
                        "variable number of catalogue columns: expected {n} coordinate values, found {}",
                        source.coordinates.len()
                    ),
                ));
            }
            Some(_) => {}
        }

        if let Some(previous) = first_seen.get(&source.id) {
            return Err(malformed(
                line,
                format!(
                    "duplicate source id \"{}\" (first defined on line {previous})",
                    source.id
                ),
            ));
        }
        first_seen.insert(source.id.clone(), line);

        let suffix = source.file_suffix();
        if let Some((owner, previous)) = suffix_owner.get(&suffix) {
            return Err(malformed(
                line,
                format!(
                    "source ids \"{owner}\" (line {previous}) and \"{}\" both map to output name \"{suffix}\"",
                    source.id
                ),
            ));
        }
        suffix_owner.insert(suffix, (source.id.clone(), line));

        sources.push(source);
    }

    if sources.is_empty() {
        return Err(malformed(0, "no sources found in input catalogue"));
    }

    Ok(SourceList::from_validated(sources))
}

/// Read and validate the source list stored at `path`.
///
/// See also
/// ------------
/// * [`parse_source_list`] – Format and error details.
pub fn read_source_list(path: &Utf8Path) -> Result<SourceList, OptifindError> {
    let file = File::open(path)?;
    parse_source_list(file)
}
