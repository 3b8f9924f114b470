//! End-of-batch summary table.
//!
//! [`BatchSummary`] joins the [`BatchReport`] of the driver with the optional
//! [`MergeReport`] and renders one row per catalogued source:
//!
//! ```text
//! ┌──────────┬───────────┬──────────────────────────┬───────────────────────────┐
//! │ Source   ┆ Status    ┆ Region                   ┆ Catalogue                 │
//! ╞══════════╪═══════════╪══════════════════════════╪═══════════════════════════╡
//! │ Source 1 ┆ exit 0    ┆ [10:50, 20:60, 0:80, 0:0] ┆ merged (2 row(s))         │
//! │ Source 2 ┆ skipped   ┆                          ┆ Source "Source 2" lies... │
//! └──────────┴───────────┴──────────────────────────┴───────────────────────────┘
//! ```
use std::fmt;

use comfy_table::{presets::UTF8_FULL, Cell, CellAlignment, ContentArrangement, Row, Table};

use crate::{
    merge::MergeReport,
    runner::{BatchReport, SourceOutcome},
};

pub struct BatchSummary<'a> {
    batch: &'a BatchReport,
    merge: Option<&'a MergeReport>,
}

impl<'a> BatchSummary<'a> {
    pub fn new(batch: &'a BatchReport, merge: Option<&'a MergeReport>) -> Self {
        BatchSummary { batch, merge }
    }

    fn catalogue_cell(&self, outcome: &SourceOutcome) -> String {
        match outcome {
            SourceOutcome::Skipped { reason, .. } => reason.clone(),
            SourceOutcome::Completed(result) => self
                .merge
                .and_then(|m| m.status_of(&result.source_id))
                .map(|status| status.to_string())
                .or_else(|| {
                    result
                        .output_catalogue
                        .as_ref()
                        .map(|c| c.path.to_string())
                })
                .unwrap_or_else(|| "-".into()),
        }
    }

    /// Render the per-source table.
    pub fn table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);

        table.set_header(vec![
            Cell::new("Source"),
            Cell::new("Status"),
            Cell::new("Region"),
            Cell::new("Time"),
            Cell::new("Catalogue"),
        ]);

        for outcome in &self.batch.outcomes {
            let (status, region, time) = match outcome {
                SourceOutcome::Completed(r) => (
                    r.status_label(),
                    r.region.to_string(),
                    format!("{:.2}s", r.elapsed.as_secs_f64()),
                ),
                SourceOutcome::Skipped { .. } => ("skipped".into(), String::new(), String::new()),
            };
            table.add_row(Row::from(vec![
                Cell::new(outcome.source_id()),
                Cell::new(status),
                Cell::new(region),
                Cell::new(time).set_alignment(CellAlignment::Right),
                Cell::new(self.catalogue_cell(outcome)),
            ]));
        }
        table
    }
}

impl fmt::Display for BatchSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.table())?;
        write!(
            f,
            "{} source(s): {} succeeded, {} failed, {} skipped",
            self.batch.outcomes.len(),
            self.batch.succeeded_count(),
            self.batch.failed_count(),
            self.batch.skipped_count()
        )?;
        if self.batch.cancelled {
            write!(f, " (interrupted)")?;
        }
        if let Some(merge) = self.merge {
            write!(
                f,
                "\nMerged {} row(s) from {} run(s) into {}",
                merge.total_rows,
                merge.merged_runs(),
                merge.output_path
            )?;
        }
        Ok(())
    }
}
