//! Per-source run configuration and result.
use std::{fmt, fs, io, time::Duration};

use camino::{Utf8Path, Utf8PathBuf};
use log::debug;

use crate::{
    catalogue::SourceRecord,
    constants::{
        SourceId, CATALOGUE_SUFFIX_ASCII, CATALOGUE_SUFFIX_SQL, CATALOGUE_SUFFIX_XML,
        INPUT_REGION_KEY, OUTPUT_FILENAME_KEY, PARAMETER_FILE_EXTENSION, PARAMETER_FILE_PREFIX,
        PARAMETER_OFFSET_KEY,
    },
    cube::CubeGeometry,
    optifind_errors::OptifindError,
    parameters::ParameterSet,
    region::SubRegion,
};

/// Catalogue formats written by SoFiA 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogueFormat {
    Ascii,
    Xml,
    Sql,
}

impl CatalogueFormat {
    /// Probe order when looking for the output of a run; plain text first.
    pub const PROBE_ORDER: [CatalogueFormat; 3] =
        [CatalogueFormat::Ascii, CatalogueFormat::Xml, CatalogueFormat::Sql];

    pub fn suffix(self) -> &'static str {
        match self {
            CatalogueFormat::Ascii => CATALOGUE_SUFFIX_ASCII,
            CatalogueFormat::Xml => CATALOGUE_SUFFIX_XML,
            CatalogueFormat::Sql => CATALOGUE_SUFFIX_SQL,
        }
    }
}

impl fmt::Display for CatalogueFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CatalogueFormat::Ascii => "ASCII",
            CatalogueFormat::Xml => "XML",
            CatalogueFormat::Sql => "SQL",
        };
        f.write_str(name)
    }
}

/// Catalogue file produced by one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputCatalogue {
    pub path: Utf8PathBuf,
    pub format: CatalogueFormat,
}

/// Everything needed to run the source finder on one source.
///
/// `parameters` is an owned copy of the template with the run-specific settings
/// overridden; the template itself is never modified.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub source_id: SourceId,
    pub region: SubRegion,
    pub parameters: ParameterSet,
    /// Where the parameter file of this run is written.
    pub parameter_file: Utf8PathBuf,
    /// `output.filename` of this run (`<base>_<sanitized id>`).
    pub output_basename: String,
    pub output_directory: Utf8PathBuf,
    pub timeout: Option<Duration>,
}

impl RunConfig {
    /// Derive the configuration of one source from the shared template.
    ///
    /// Arguments
    /// -----------------
    /// * `template` – Parameter template loaded from the user's file.
    /// * `source` – The catalogued source.
    /// * `region` – Its sub-region, as computed by [`crate::region::compute_region`].
    /// * `geometry` – Cube geometry, to order the `input.region` ranges.
    /// * `work_dir` – Directory receiving the parameter file.
    /// * `timeout` – Optional limit on the run duration.
    ///
    /// Return
    /// ----------
    /// * A [`RunConfig`] whose parameters override `input.region`, `output.filename`
    ///   and `parameter.offset`.
    pub fn new(
        template: &ParameterSet,
        source: &SourceRecord,
        region: SubRegion,
        geometry: &CubeGeometry,
        work_dir: &Utf8Path,
        timeout: Option<Duration>,
    ) -> Self {
        let suffix = source.file_suffix();
        let output_basename = format!("{}_{suffix}", template.output_basename());

        let parameters = template.with_overrides([
            (INPUT_REGION_KEY, region.sofia_region(geometry)),
            (OUTPUT_FILENAME_KEY, output_basename.clone()),
            (PARAMETER_OFFSET_KEY, "true".to_string()),
        ]);

        let parameter_file = work_dir.join(format!(
            "{PARAMETER_FILE_PREFIX}{suffix}.{PARAMETER_FILE_EXTENSION}"
        ));

        RunConfig {
            source_id: source.id.clone(),
            region,
            output_directory: parameters.output_directory(),
            parameters,
            parameter_file,
            output_basename,
            timeout,
        }
    }

    /// Write the parameter file of this run.
    pub fn write_parameter_file(&self) -> Result<(), OptifindError> {
        self.parameters.serialize(&self.parameter_file)
    }

    /// Path of the catalogue SoFiA 2 writes in `format`.
    pub fn catalogue_path(&self, format: CatalogueFormat) -> Utf8PathBuf {
        self.output_directory
            .join(format!("{}{}", self.output_basename, format.suffix()))
    }

    /// Delete catalogues left at [`Self::catalogue_path`] by an earlier batch, so that
    /// [`Self::locate_output_catalogue`] only finds what the coming run writes.
    ///
    /// Return
    /// ----------
    /// * [`OptifindError::IoError`] if an existing catalogue cannot be removed.
    pub fn remove_previous_catalogues(&self) -> Result<(), OptifindError> {
        for format in CatalogueFormat::PROBE_ORDER {
            let path = self.catalogue_path(format);
            match fs::remove_file(&path) {
                Ok(()) => debug!("Removed previous {format} catalogue {path}"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// First catalogue found on disk, probing ASCII, then XML, then SQL.
    pub fn locate_output_catalogue(&self) -> Option<OutputCatalogue> {
        CatalogueFormat::PROBE_ORDER
            .into_iter()
            .map(|format| OutputCatalogue {
                path: self.catalogue_path(format),
                format,
            })
            .find(|candidate| candidate.path.is_file())
    }
}

/// Outcome of one source finder execution.
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    pub source_id: SourceId,
    pub region: SubRegion,
    /// Exit code, `None` if the process was killed (signal or timeout).
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
    pub output_catalogue: Option<OutputCatalogue>,
}

impl RunResult {
    /// Empty result for `config`, to be completed by a [`super::SourceFinder`].
    pub fn for_config(config: &RunConfig) -> Self {
        RunResult {
            source_id: config.source_id.clone(),
            region: config.region.clone(),
            exit_code: None,
            timed_out: false,
            stdout: String::new(),
            stderr: String::new(),
            elapsed: Duration::ZERO,
            output_catalogue: None,
        }
    }

    /// The process exited with code 0 within the time limit.
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out
    }

    /// Short human-readable status (`exit 0`, `exit 3`, `timed out`, `killed`).
    pub fn status_label(&self) -> String {
        match (self.timed_out, self.exit_code) {
            (true, _) => "timed out".into(),
            (false, Some(code)) => format!("exit {code}"),
            (false, None) => "killed".into(),
        }
    }
}
