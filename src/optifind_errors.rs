use thiserror::Error;

/// Errors raised while evaluating the world coordinate system of a cube header.
#[derive(Error, Debug, PartialEq)]
pub enum WcsError {
    #[error("Unsupported projection: {code}")]
    UnsupportedProjection { code: String },

    #[error("Non-invertible linear transformation matrix (determinant = {determinant})")]
    NonInvertibleMatrix { determinant: f64 },

    #[error("Coordinate has no valid projection: {message}")]
    InvalidCoordinate { message: String },

    #[error("Invalid WCS keyword '{keyword}': {message}")]
    InvalidKeyword { keyword: String, message: String },

    #[error("Expected {expected} coordinate values, got {found}")]
    WrongDimension { expected: usize, found: usize },
}

impl WcsError {
    pub fn unsupported_projection(code: impl Into<String>) -> Self {
        Self::UnsupportedProjection { code: code.into() }
    }

    pub fn invalid_coordinate(message: impl Into<String>) -> Self {
        Self::InvalidCoordinate {
            message: message.into(),
        }
    }

    pub fn invalid_keyword(keyword: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidKeyword {
            keyword: keyword.into(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum OptifindError {
    #[error("Malformed source catalogue (line {line}): {reason}")]
    MalformedCatalogue { line: u64, reason: String },

    #[error("Malformed parameter setting on line {line}: {content:?}")]
    TemplateParse { line: usize, content: String },

    #[error("Required parameter missing from template: {0}")]
    MissingKey(String),

    #[error(
        "Source \"{source_id}\" lies outside the cube on axis {axis} (pixel {pixel:.2}, extent {extent})"
    )]
    SourceOutOfBounds {
        source_id: String,
        axis: usize,
        pixel: f64,
        extent: usize,
    },

    #[error("Region of source \"{source_id}\" is clipped to a single pixel on axis {axis}")]
    DegenerateRegion { source_id: String, axis: usize },

    #[error("Source \"{source_id}\" has {found} coordinate values, but the cube has {expected} axes")]
    DimensionMismatch {
        source_id: String,
        expected: usize,
        found: usize,
    },

    #[error("Source finder executable not found or not executable: {0}")]
    ExecutableNotFound(String),

    #[error("Unsupported catalogue format ({path}): {reason}")]
    UnsupportedFormat { path: String, reason: String },

    #[error("Invalid FITS header: {0}")]
    FitsHeader(String),

    #[error("WCS error: {0}")]
    Wcs(#[from] WcsError),

    #[error("Failed to identify spatial and/or spectral axes of the data cube: {0}")]
    AxisIdentification(String),

    #[error("Invalid run option: {0}")]
    InvalidRunOption(String),

    #[error("Unable to perform file operation: {0}")]
    IoError(#[from] std::io::Error),
}

impl OptifindError {
    /// Whether the error aborts the whole batch.
    ///
    /// Infrastructure failures (inputs that cannot be read or parsed, a missing
    /// executable, invalid options) are fatal. Per-source failures (a position outside
    /// the cube, a collapsed region, an output catalogue that cannot be merged) are not:
    /// the source is skipped and the batch continues.
    pub fn is_fatal(&self) -> bool {
        use OptifindError::*;
        !matches!(
            self,
            SourceOutOfBounds { .. } | DegenerateRegion { .. } | UnsupportedFormat { .. }
        )
    }
}

impl PartialEq for OptifindError {
    fn eq(&self, other: &Self) -> bool {
        use OptifindError::*;
        match (self, other) {
            (
                MalformedCatalogue { line: a, reason: r },
                MalformedCatalogue { line: b, reason: s },
            ) => a == b && r == s,
            (
                TemplateParse {
                    line: a,
                    content: c,
                },
                TemplateParse {
                    line: b,
                    content: d,
                },
            ) => a == b && c == d,
            (MissingKey(a), MissingKey(b)) => a == b,
            (
                SourceOutOfBounds {
                    source_id: a,
                    axis: i,
                    ..
                },
                SourceOutOfBounds {
                    source_id: b,
                    axis: j,
                    ..
                },
            ) => a == b && i == j,
            (
                DegenerateRegion {
                    source_id: a,
                    axis: i,
                },
                DegenerateRegion {
                    source_id: b,
                    axis: j,
                },
            ) => a == b && i == j,
            (
                DimensionMismatch {
                    source_id: a,
                    expected: e1,
                    found: f1,
                },
                DimensionMismatch {
                    source_id: b,
                    expected: e2,
                    found: f2,
                },
            ) => a == b && e1 == e2 && f1 == f2,
            (ExecutableNotFound(a), ExecutableNotFound(b)) => a == b,
            (UnsupportedFormat { path: a, .. }, UnsupportedFormat { path: b, .. }) => a == b,
            (FitsHeader(a), FitsHeader(b)) => a == b,
            (Wcs(a), Wcs(b)) => a == b,
            (AxisIdentification(a), AxisIdentification(b)) => a == b,
            (InvalidRunOption(a), InvalidRunOption(b)) => a == b,

            // io::Error is not comparable: same variant is enough
            (IoError(_), IoError(_)) => true,

            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(OptifindError::MissingKey("input.data".into()).is_fatal());
        assert!(OptifindError::ExecutableNotFound("sofia".into()).is_fatal());
        assert!(!OptifindError::SourceOutOfBounds {
            source_id: "a".into(),
            axis: 0,
            pixel: -12.0,
            extent: 10,
        }
        .is_fatal());
        assert!(!OptifindError::UnsupportedFormat {
            path: "a_cat.xml".into(),
            reason: "XML catalogue".into(),
        }
        .is_fatal());
    }

    #[test]
    fn test_messages_carry_context() {
        let err = OptifindError::DimensionMismatch {
            source_id: "Source 1".into(),
            expected: 4,
            found: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("Source 1"));
        assert!(msg.contains('4'));

        let err: OptifindError = WcsError::unsupported_projection("HPX").into();
        assert!(err.to_string().contains("HPX"));
    }

    #[test]
    fn test_partial_eq_ignores_pixel_payload() {
        let a = OptifindError::SourceOutOfBounds {
            source_id: "x".into(),
            axis: 2,
            pixel: 1e9,
            extent: 10,
        };
        let b = OptifindError::SourceOutOfBounds {
            source_id: "x".into(),
            axis: 2,
            pixel: -4.0,
            extent: 10,
        };
        assert_eq!(a, b);
    }
}
