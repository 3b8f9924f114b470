//! # Merging of the per-source catalogues
//!
//! After the batch, the plain-text catalogue of every run is read and its rows are
//! appended to one table whose columns are the **union** of the columns seen so far,
//! in first-seen order. Each row is tagged with the identifier of the source whose run
//! produced it (`source_id`, always the first column); a value missing from a narrower
//! catalogue is left empty.
//!
//! Runs that cannot contribute are reported, not treated as errors:
//!
//! | Situation | [`MergeStatus`] |
//! |---|---|
//! | non-zero exit, timeout | `RunFailed` |
//! | no catalogue on disk (e.g. no detection) | `NoOutput` |
//! | XML / SQL catalogue, or a `.txt` file that is not plain ASCII | `UnsupportedFormat` |
//! | catalogue cannot be read | `Unreadable` |
//!
//! The output is deterministic: merging the same results twice produces byte-identical
//! files.
//!
//! Modules
//! -----------------
//! * [`ascii`] – Parser of the SoFiA 2 plain-text catalogue.
use std::{collections::HashMap, fmt, fs};

use ahash::RandomState;
use camino::{Utf8Path, Utf8PathBuf};
use itertools::Itertools;
use log::{info, warn};

use crate::{
    constants::{SourceId, SOURCE_ID_COLUMN},
    optifind_errors::OptifindError,
    runner::{CatalogueFormat, RunResult},
};

pub mod ascii;

pub use ascii::AsciiCatalogue;

/// Contribution of one run to the merged catalogue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeStatus {
    Merged { rows: usize },
    RunFailed,
    NoOutput,
    UnsupportedFormat { reason: String },
    Unreadable { reason: String },
}

impl MergeStatus {
    pub fn is_merged(&self) -> bool {
        matches!(self, MergeStatus::Merged { .. })
    }
}

impl fmt::Display for MergeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeStatus::Merged { rows } => write!(f, "merged ({rows} row(s))"),
            MergeStatus::RunFailed => f.write_str("run failed"),
            MergeStatus::NoOutput => f.write_str("no output catalogue"),
            MergeStatus::UnsupportedFormat { reason } => write!(f, "not merged: {reason}"),
            MergeStatus::Unreadable { reason } => write!(f, "unreadable: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeEntry {
    pub source_id: SourceId,
    pub status: MergeStatus,
}

/// Per-run statuses of a merge and where the merged catalogue was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReport {
    pub entries: Vec<MergeEntry>,
    pub output_path: Utf8PathBuf,
    pub total_rows: usize,
}

impl MergeReport {
    pub fn merged_runs(&self) -> usize {
        self.entries.iter().filter(|e| e.status.is_merged()).count()
    }

    pub fn status_of(&self, source_id: &str) -> Option<&MergeStatus> {
        self.entries
            .iter()
            .find(|e| e.source_id == source_id)
            .map(|e| &e.status)
    }
}

/// Final merged table, written once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedCatalogue {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
    merged_runs: usize,
}

fn format_cell(value: &str) -> String {
    if value.is_empty() || value.chars().any(char::is_whitespace) {
        format!("\"{value}\"")
    } else {
        value.to_string()
    }
}

impl MergedCatalogue {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Value of `column` in row `row`.
    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        let col = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row).map(|r| r[col].as_str())
    }

    /// Render the catalogue as aligned plain text.
    pub fn to_text(&self) -> String {
        let header: Vec<String> = self.columns.iter().map(|c| format_cell(c)).collect();
        let body: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| row.iter().map(|v| format_cell(v)).collect())
            .collect();

        let widths: Vec<usize> = (0..header.len())
            .map(|i| {
                body.iter()
                    .map(|r| r[i].chars().count())
                    .chain(std::iter::once(header[i].chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let render = |prefix: &str, cells: &[String]| {
            let line = cells
                .iter()
                .zip(&widths)
                .map(|(cell, &w)| format!("{cell:<w$}"))
                .join("  ");
            format!("{prefix}{}", line.trim_end())
        };

        let mut out = String::new();
        out.push_str("# OptiFind merged catalogue\n");
        out.push_str(&format!("# Merged runs: {}\n", self.merged_runs));
        out.push_str("#\n");
        out.push_str(&render("# ", &header));
        out.push('\n');
        for row in &body {
            out.push_str(&render("  ", row));
            out.push('\n');
        }
        out
    }

    /// Write the catalogue to `path`, replacing any previous file.
    pub fn write(&self, path: &Utf8Path) -> Result<(), OptifindError> {
        fs::write(path, self.to_text())?;
        Ok(())
    }
}

/// Incremental column-union merger.
///
/// Ingest results one at a time with [`CatalogueMerger::ingest`], then call
/// [`CatalogueMerger::finish`].
#[derive(Debug, Clone)]
pub struct CatalogueMerger {
    columns: Vec<String>,
    column_index: HashMap<String, usize, RandomState>,
    rows: Vec<Vec<String>>,
    entries: Vec<MergeEntry>,
}

impl Default for CatalogueMerger {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogueMerger {
    pub fn new() -> Self {
        let mut column_index = HashMap::default();
        column_index.insert(SOURCE_ID_COLUMN.to_string(), 0);
        CatalogueMerger {
            columns: vec![SOURCE_ID_COLUMN.to_string()],
            column_index,
            rows: Vec::new(),
            entries: Vec::new(),
        }
    }

    /// Ingest the output of one run and record its [`MergeStatus`].
    pub fn ingest(&mut self, result: &RunResult) -> &MergeStatus {
        let status = self.try_ingest(result);
        match &status {
            MergeStatus::Merged { .. } | MergeStatus::RunFailed | MergeStatus::NoOutput => {}
            MergeStatus::UnsupportedFormat { reason } => {
                warn!("Catalogue of source {} not merged: {reason}", result.source_id)
            }
            MergeStatus::Unreadable { reason } => {
                warn!("Catalogue of source {} unreadable: {reason}", result.source_id)
            }
        }
        self.entries.push(MergeEntry {
            source_id: result.source_id.clone(),
            status,
        });
        // just pushed
        &self.entries[self.entries.len() - 1].status
    }

    fn try_ingest(&mut self, result: &RunResult) -> MergeStatus {
        if !result.succeeded() {
            return MergeStatus::RunFailed;
        }
        let Some(output) = &result.output_catalogue else {
            return MergeStatus::NoOutput;
        };

        if output.format != CatalogueFormat::Ascii {
            let err = OptifindError::UnsupportedFormat {
                path: output.path.to_string(),
                reason: format!("{} catalogues are not merged", output.format),
            };
            return MergeStatus::UnsupportedFormat {
                reason: err.to_string(),
            };
        }

        let bytes = match fs::read(&output.path) {
            Ok(bytes) => bytes,
            Err(e) => {
                return MergeStatus::Unreadable {
                    reason: format!("{}: {e}", output.path),
                }
            }
        };

        let catalogue = std::str::from_utf8(&bytes)
            .ok()
            .filter(|text| text.is_ascii() && !text.trim_start().starts_with("<?xml"))
            .ok_or_else(|| OptifindError::UnsupportedFormat {
                path: output.path.to_string(),
                reason: "not a plain ASCII text catalogue".into(),
            })
            .and_then(|text| AsciiCatalogue::parse(text, output.path.as_str()));

        match catalogue {
            Ok(catalogue) => self.append(&result.source_id, catalogue),
            Err(e) => MergeStatus::UnsupportedFormat {
                reason: e.to_string(),
            },
        }
    }

    fn column_slot(&mut self, name: &str) -> usize {
        if let Some(&i) = self.column_index.get(name) {
            return i;
        }
        let i = self.columns.len();
        self.columns.push(name.to_string());
        self.column_index.insert(name.to_string(), i);
        i
    }

    fn append(&mut self, source_id: &str, catalogue: AsciiCatalogue) -> MergeStatus {
        if catalogue.columns.iter().any(|c| c == SOURCE_ID_COLUMN) {
            return MergeStatus::UnsupportedFormat {
                reason: format!("catalogue already has a {SOURCE_ID_COLUMN:?} column"),
            };
        }

        let slots: Vec<usize> = catalogue
            .columns
            .iter()
            .map(|c| self.column_slot(c))
            .collect();

        let n = catalogue.rows.len();
        for fields in catalogue.rows {
            let mut row = vec![String::new(); self.columns.len()];
            row[0] = source_id.to_string();
            for (slot, value) in slots.iter().zip(fields) {
                row[*slot] = value;
            }
            self.rows.push(row);
        }
        MergeStatus::Merged { rows: n }
    }

    /// Finalise the table; shorter rows are padded with empty values.
    pub fn finish(self) -> (MergedCatalogue, Vec<MergeEntry>) {
        let width = self.columns.len();
        let rows = self
            .rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, String::new());
                row
            })
            .collect();
        let merged_runs = self.entries.iter().filter(|e| e.status.is_merged()).count();

        (
            MergedCatalogue {
                columns: self.columns,
                rows,
                merged_runs,
            },
            self.entries,
        )
    }
}

/// Merge the catalogues of `results` into `output_path`.
///
/// Arguments
/// -----------------
/// * `results` – Run results, in catalogue order.
/// * `output_path` – Destination of the merged catalogue (overwritten).
///
/// Return
/// ----------
/// * A [`MergeReport`] with one entry per result.
/// * [`OptifindError::IoError`] if the merged catalogue cannot be written.
pub fn merge<'a, I>(results: I, output_path: &Utf8Path) -> Result<MergeReport, OptifindError>
where
    I: IntoIterator<Item = &'a RunResult>,
{
    let mut merger = CatalogueMerger::new();
    for result in results {
        merger.ingest(result);
    }
    let (catalogue, entries) = merger.finish();
    catalogue.write(output_path)?;

    let report = MergeReport {
        entries,
        output_path: output_path.to_path_buf(),
        total_rows: catalogue.rows().len(),
    };
    info!(
        "Merged {} row(s) from {} run(s) into {output_path}",
        report.total_rows,
        report.merged_runs()
    );
    Ok(report)
}
