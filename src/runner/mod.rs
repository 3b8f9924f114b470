//! # Batch orchestration
//!
//! [`RunDriver`] runs the source finder once per catalogued source, sequentially, each
//! time on the sub-region of the cube surrounding the source.
//!
//! Per source, in catalogue order:
//! 1. compute the sub-region ([`compute_region`]); an out-of-bounds or collapsed region
//!    skips the source with a warning,
//! 2. derive a [`RunConfig`] from the template and write its parameter file into the
//!    work directory,
//! 3. execute the [`SourceFinder`], capturing its output,
//! 4. remove the parameter file (unless asked to keep it) and locate the output
//!    catalogue.
//!
//! A non-zero exit status is recorded and the batch continues. The batch aborts only on
//! infrastructure failures: a missing executable, a coordinate count that does not match
//! the cube, or a parameter file that cannot be written.
//!
//! Cancellation
//! -----------------
//! [`RunDriver::run_all_with_cancel`] polls a user-provided predicate before each
//! source, at most once per `POLL_INTERVAL` of wall-clock time. An interrupted batch
//! keeps the outcomes of the sources already processed and is flagged `cancelled`.
//!
//! Example
//! -----------------
//! ```rust, no_run
//! use camino::Utf8Path;
//! use optifind::{
//!     catalogue::read_source_list, cube::CubeGeometry, parameters::ParameterSet,
//!     runner::{RunDriver, RunOptions, SofiaExecutable},
//! };
//!
//! let template = ParameterSet::load(Utf8Path::new("sofia.par"))?;
//! let geometry = CubeGeometry::from_fits(template.input_cube()?)?;
//! let sources = read_source_list(Utf8Path::new("sources.csv"))?;
//! let options = RunOptions::builder()
//!     .spatial_radius(20.0)
//!     .spectral_radius(50.0)
//!     .build()?;
//!
//! let driver = RunDriver::new(template, geometry, SofiaExecutable::new("sofia"), options);
//! let report = driver.run_all(&sources)?;
//! println!("{} runs succeeded", report.succeeded_count());
//! # Ok::<(), optifind::optifind_errors::OptifindError>(())
//! ```
use std::{
    fs,
    time::{Duration, Instant},
};

use log::{debug, info, warn};

use crate::{
    catalogue::{SourceList, SourceRecord},
    constants::SourceId,
    cube::CubeGeometry,
    optifind_errors::OptifindError,
    parameters::ParameterSet,
    region::compute_region,
};

pub(crate) mod progress_bar;
pub mod run_config;
pub mod run_options;
pub mod source_finder;

use progress_bar::{fmt_dur, BatchProgress};
pub use run_config::{CatalogueFormat, OutputCatalogue, RunConfig, RunResult};
pub use run_options::{RunOptions, RunOptionsBuilder};
pub use source_finder::{SofiaExecutable, SourceFinder};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// What happened to one catalogued source.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceOutcome {
    /// The source finder ran (successfully or not).
    Completed(RunResult),
    /// No run was attempted, e.g. because the source lies outside the cube.
    Skipped { source_id: SourceId, reason: String },
}

impl SourceOutcome {
    pub fn source_id(&self) -> &str {
        match self {
            SourceOutcome::Completed(result) => &result.source_id,
            SourceOutcome::Skipped { source_id, .. } => source_id,
        }
    }

    pub fn run_result(&self) -> Option<&RunResult> {
        match self {
            SourceOutcome::Completed(result) => Some(result),
            SourceOutcome::Skipped { .. } => None,
        }
    }
}

/// Outcomes of a batch, in catalogue order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchReport {
    pub outcomes: Vec<SourceOutcome>,
    /// The batch was interrupted before processing every source.
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl BatchReport {
    /// Results of the sources the finder actually ran on, in order.
    pub fn run_results(&self) -> impl Iterator<Item = &RunResult> {
        self.outcomes.iter().filter_map(SourceOutcome::run_result)
    }

    pub fn succeeded_count(&self) -> usize {
        self.run_results().filter(|r| r.succeeded()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.run_results().filter(|r| !r.succeeded()).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.outcomes.len() - self.run_results().count()
    }
}

/// Sequential per-source driver of the external source finder.
#[derive(Debug)]
pub struct RunDriver<F: SourceFinder> {
    template: ParameterSet,
    geometry: CubeGeometry,
    finder: F,
    options: RunOptions,
}

impl<F: SourceFinder> RunDriver<F> {
    pub fn new(
        template: ParameterSet,
        geometry: CubeGeometry,
        finder: F,
        options: RunOptions,
    ) -> Self {
        RunDriver {
            template,
            geometry,
            finder,
            options,
        }
    }

    pub fn template(&self) -> &ParameterSet {
        &self.template
    }

    pub fn geometry(&self) -> &CubeGeometry {
        &self.geometry
    }

    pub fn finder(&self) -> &F {
        &self.finder
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Run the source finder on every source of `sources`.
    ///
    /// Arguments
    /// -----------------
    /// * `sources` – Validated source list.
    ///
    /// Return
    /// ----------
    /// * A [`BatchReport`] with one outcome per source, in catalogue order.
    /// * A fatal [`OptifindError`] (see [`OptifindError::is_fatal`]) if the batch cannot
    ///   continue. Outputs of runs already completed stay on disk.
    ///
    /// See also
    /// ------------
    /// * [`RunDriver::run_all_with_cancel`] – Same, with cooperative cancellation.
    pub fn run_all(&self, sources: &SourceList) -> Result<BatchReport, OptifindError> {
        self.run_all_with_cancel(sources, || false)
    }

    /// Cooperative cancellation version of [`RunDriver::run_all`]: `should_cancel` is
    /// polled before each source, at most once per `POLL_INTERVAL`.
    pub fn run_all_with_cancel<C>(
        &self,
        sources: &SourceList,
        mut should_cancel: C,
    ) -> Result<BatchReport, OptifindError>
    where
        C: FnMut() -> bool,
    {
        self.check_dimensions(sources)?;
        self.finder.preflight()?;

        info!(
            "Processing {} source(s) with {} ({})",
            sources.len(),
            self.finder.name(),
            self.options
        );

        let start = Instant::now();
        let mut report = BatchReport::default();
        let mut progress = BatchProgress::new(sources.len());
        let mut last_poll: Option<Instant> = None;

        for (index, source) in sources.iter().enumerate() {
            if last_poll.map_or(true, |t| t.elapsed() >= POLL_INTERVAL) {
                if should_cancel() {
                    warn!(
                        "Batch interrupted after {index} of {} source(s)",
                        sources.len()
                    );
                    report.cancelled = true;
                    break;
                }
                last_poll = Some(Instant::now());
            }

            progress.start(&source.id);
            let outcome = self.run_one(source, index + 1, sources.len());
            let dt = progress.finish_one();
            match outcome {
                Ok(outcome) => {
                    debug!("Source {} handled in {}", source.id, fmt_dur(dt));
                    report.outcomes.push(outcome);
                }
                Err(e) => {
                    progress.finish(true);
                    return Err(e);
                }
            }
        }

        progress.finish(report.cancelled);
        report.elapsed = start.elapsed();

        info!(
            "Batch finished in {}: {} succeeded, {} failed, {} skipped (avg {} per source over {})",
            fmt_dur(report.elapsed),
            report.succeeded_count(),
            report.failed_count(),
            report.skipped_count(),
            fmt_dur(progress.average()),
            progress.processed()
        );
        Ok(report)
    }

    /// Every source must carry one coordinate per cube axis; a mismatch is fatal.
    fn check_dimensions(&self, sources: &SourceList) -> Result<(), OptifindError> {
        let expected = self.geometry.axis_count();
        match sources.iter().find(|s| s.coordinates.len() != expected) {
            Some(source) => Err(OptifindError::DimensionMismatch {
                source_id: source.id.clone(),
                expected,
                found: source.coordinates.len(),
            }),
            None => Ok(()),
        }
    }

    fn run_one(
        &self,
        source: &SourceRecord,
        position: usize,
        total: usize,
    ) -> Result<SourceOutcome, OptifindError> {
        let region = match compute_region(
            &self.geometry,
            source,
            self.options.spatial_radius,
            self.options.spectral_radius,
        ) {
            Ok(region) => region,
            Err(e) if !e.is_fatal() => {
                warn!("Skipping source {}: {e}", source.id);
                return Ok(SourceOutcome::Skipped {
                    source_id: source.id.clone(),
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        };

        info!(
            "[{position}/{total}] Source {}: region {}",
            source.id,
            region.sofia_region(&self.geometry)
        );

        let config = RunConfig::new(
            &self.template,
            source,
            region,
            &self.geometry,
            &self.options.work_dir,
            self.options.timeout,
        );
        config.remove_previous_catalogues()?;
        config.write_parameter_file()?;

        let result = self.finder.execute(&config);

        if !self.options.keep_parameter_files {
            if let Err(e) = fs::remove_file(&config.parameter_file) {
                warn!(
                    "Could not remove parameter file {}: {e}",
                    config.parameter_file
                );
            }
        }

        let mut result = result?;
        result.output_catalogue = config.locate_output_catalogue();

        if result.timed_out {
            warn!(
                "Source finder timed out on source {} after {}",
                source.id,
                fmt_dur(result.elapsed)
            );
        } else if !result.succeeded() {
            warn!(
                "Source finder failed on source {} ({})",
                source.id,
                result.status_label()
            );
        }
        if result.output_catalogue.is_none() {
            debug!("No output catalogue found for source {}", source.id);
        }

        Ok(SourceOutcome::Completed(result))
    }
}
