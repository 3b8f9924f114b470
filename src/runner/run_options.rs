//! Options of a batch run and their validating builder.
use std::{fmt, time::Duration};

use camino::Utf8PathBuf;

use crate::optifind_errors::OptifindError;

/// Options shared by every per-source run of a batch.
///
/// Build with [`RunOptions::builder`]; [`RunOptionsBuilder::build`] validates them.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    /// Half-width of the sub-region on the spatial axes, in pixels.
    pub spatial_radius: f64,

    /// Half-width of the sub-region on the spectral (and any other) axis, in channels.
    pub spectral_radius: f64,

    /// Maximum wall-clock time of one source finder run. `None` waits indefinitely.
    pub timeout: Option<Duration>,

    /// Directory receiving the per-source parameter files.
    pub work_dir: Utf8PathBuf,

    /// Keep the per-source parameter files after each run.
    pub keep_parameter_files: bool,
}

impl RunOptions {
    pub fn builder() -> RunOptionsBuilder {
        RunOptionsBuilder::new()
    }
}

/// Builder for [`RunOptions`], with validation.
#[derive(Debug, Clone)]
pub struct RunOptionsBuilder {
    options: RunOptions,
}

impl Default for RunOptionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RunOptionsBuilder {
    /// Create a builder; both radii must be set before [`build`](Self::build).
    pub fn new() -> Self {
        Self {
            options: RunOptions {
                spatial_radius: 0.0,
                spectral_radius: 0.0,
                timeout: None,
                work_dir: Utf8PathBuf::from("."),
                keep_parameter_files: false,
            },
        }
    }

    pub fn spatial_radius(mut self, v: f64) -> Self {
        self.options.spatial_radius = v;
        self
    }
    pub fn spectral_radius(mut self, v: f64) -> Self {
        self.options.spectral_radius = v;
        self
    }
    pub fn timeout(mut self, v: Option<Duration>) -> Self {
        self.options.timeout = v;
        self
    }
    pub fn work_dir(mut self, v: impl Into<Utf8PathBuf>) -> Self {
        self.options.work_dir = v.into();
        self
    }
    pub fn keep_parameter_files(mut self, v: bool) -> Self {
        self.options.keep_parameter_files = v;
        self
    }

    #[inline]
    fn gt0(x: f64) -> bool {
        x.is_finite() && x > 0.0
    }

    /// Validate and return the options.
    ///
    /// Return
    /// ----------
    /// * The options.
    /// * [`OptifindError::InvalidRunOption`] if a radius is not a positive finite
    ///   number or the timeout is zero.
    pub fn build(self) -> Result<RunOptions, OptifindError> {
        let o = &self.options;

        if !Self::gt0(o.spatial_radius) {
            return Err(OptifindError::InvalidRunOption(format!(
                "spatial_radius must be > 0, got {}",
                o.spatial_radius
            )));
        }
        if !Self::gt0(o.spectral_radius) {
            return Err(OptifindError::InvalidRunOption(format!(
                "spectral_radius must be > 0, got {}",
                o.spectral_radius
            )));
        }
        if o.timeout.is_some_and(|t| t.is_zero()) {
            return Err(OptifindError::InvalidRunOption(
                "timeout must be > 0".into(),
            ));
        }
        if o.work_dir.as_str().is_empty() {
            return Err(OptifindError::InvalidRunOption(
                "work_dir must not be empty".into(),
            ));
        }

        Ok(self.options)
    }
}

impl fmt::Display for RunOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let timeout = self
            .timeout
            .map(|t| format!("{}s", t.as_secs_f64()))
            .unwrap_or_else(|| "none".into());

        if f.alternate() {
            writeln!(f, "Run options")?;
            writeln!(f, "-----------")?;
            writeln!(f, "  spatial_radius       = {} px", self.spatial_radius)?;
            writeln!(f, "  spectral_radius      = {} ch", self.spectral_radius)?;
            writeln!(f, "  timeout              = {timeout}")?;
            writeln!(f, "  work_dir             = {}", self.work_dir)?;
            write!(f, "  keep_parameter_files = {}", self.keep_parameter_files)
        } else {
            write!(
                f,
                "r_spat={}, r_spec={}, timeout={timeout}, work_dir={}",
                self.spatial_radius, self.spectral_radius, self.work_dir
            )
        }
    }
}
