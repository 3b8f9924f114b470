//! # Sub-region of the cube around a catalogued source
//!
//! [`compute_region`] converts the world position of a [`SourceRecord`] into pixel
//! coordinates and builds an axis-aligned box of half-width `r_spat` on the two spatial
//! axes and `r_spec` on every other axis, clipped to the cube.
//!
//! Rules
//! -----------------
//! * `min = max(0, floor(p - r))` and `max = min(extent - 1, ceil(p + r))`, both
//!   inclusive and 0-based.
//! * A degenerate axis (extent 1) always gets `[0, 0]`.
//! * A source whose pixel position lies outside `[-0.5, extent - 0.5]` on any other axis
//!   is rejected with [`OptifindError::SourceOutOfBounds`]. A position that cannot be
//!   projected at all is reported the same way with a `NaN` pixel.
//! * A box that clipping reduces to a single pixel (`min == max`) on a non-degenerate
//!   axis is rejected with [`OptifindError::DegenerateRegion`].
use std::fmt;

use itertools::Itertools;
use smallvec::SmallVec;

use crate::{
    catalogue::SourceRecord,
    constants::Pixel,
    cube::CubeGeometry,
    optifind_errors::OptifindError,
};

const PIXEL_SNAP_TOLERANCE: f64 = 1e-9;

/// Inclusive pixel range along one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisBounds {
    pub min: usize,
    pub max: usize,
}

impl AxisBounds {
    pub fn width(&self) -> usize {
        self.max - self.min + 1
    }
}

impl fmt::Display for AxisBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.min, self.max)
    }
}

/// Per-axis pixel bounds of the sub-cube processed for one source.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubRegion {
    bounds: SmallVec<[AxisBounds; 4]>,
}

impl SubRegion {
    pub fn bounds(&self) -> &[AxisBounds] {
        &self.bounds
    }

    pub fn axis(&self, index: usize) -> Option<AxisBounds> {
        self.bounds.get(index).copied()
    }

    /// Number of pixels in the sub-cube.
    pub fn volume(&self) -> usize {
        self.bounds.iter().map(AxisBounds::width).product()
    }

    /// Value of the SoFiA 2 `input.region` setting:
    /// `x_min, x_max, y_min, y_max, z_min, z_max`.
    ///
    /// `x`, `y` and `z` are the longitude, latitude and spectral axes of `geometry`;
    /// without a spectral axis the `z` range is `0, 0`.
    pub fn sofia_region(&self, geometry: &CubeGeometry) -> String {
        let pick = |axis: Option<usize>| {
            axis.and_then(|i| self.axis(i))
                .unwrap_or(AxisBounds { min: 0, max: 0 })
        };
        [
            pick(Some(geometry.longitude_axis())),
            pick(Some(geometry.latitude_axis())),
            pick(geometry.spectral_axis()),
        ]
        .iter()
        .map(|b| format!("{}, {}", b.min, b.max))
        .join(", ")
    }
}

impl fmt::Display for SubRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.bounds.iter().join(", "))
    }
}

/// Compute the pixel sub-region of `source`.
///
/// Arguments
/// -----------------
/// * `geometry` – Geometry of the input cube.
/// * `source` – Catalogued source, one world coordinate per cube axis.
/// * `r_spat` – Half-width in pixels on the spatial axes (> 0).
/// * `r_spec` – Half-width in pixels on all other axes (> 0).
///
/// Return
/// ----------
/// * The clipped [`SubRegion`].
/// * [`OptifindError::DimensionMismatch`] if the coordinate count differs from the
///   number of cube axes, [`OptifindError::SourceOutOfBounds`] or
///   [`OptifindError::DegenerateRegion`] as described in the module documentation,
///   [`OptifindError::InvalidRunOption`] for a non-positive radius.
pub fn compute_region(
    geometry: &CubeGeometry,
    source: &SourceRecord,
    r_spat: f64,
    r_spec: f64,
) -> Result<SubRegion, OptifindError> {
    for (name, r) in [("spatial radius", r_spat), ("spectral radius", r_spec)] {
        if !(r.is_finite() && r > 0.0) {
            return Err(OptifindError::InvalidRunOption(format!(
                "{name} must be positive, got {r}"
            )));
        }
    }

    if source.coordinates.len() != geometry.axis_count() {
        return Err(OptifindError::DimensionMismatch {
            source_id: source.id.clone(),
            expected: geometry.axis_count(),
            found: source.coordinates.len(),
        });
    }

    let pixels: Vec<Pixel> = geometry
        .world_to_pixel(&source.coordinates)
        .map_err(|_| OptifindError::SourceOutOfBounds {
            source_id: source.id.clone(),
            axis: geometry.longitude_axis(),
            pixel: f64::NAN,
            extent: geometry.axes()[geometry.longitude_axis()].extent,
        })?;

    let bounds = geometry
        .axes()
        .iter()
        .zip(&pixels)
        .enumerate()
        .map(|(axis, (cube_axis, &p))| {
            let extent = cube_axis.extent;
            if cube_axis.is_degenerate() {
                return Ok(AxisBounds { min: 0, max: 0 });
            }

            if !p.is_finite() || p < -0.5 || p > extent as f64 - 0.5 {
                return Err(OptifindError::SourceOutOfBounds {
                    source_id: source.id.clone(),
                    axis,
                    pixel: p,
                    extent,
                });
            }

            // projection round-off must not move an integral position across a pixel edge
            let p = if (p - p.round()).abs() < PIXEL_SNAP_TOLERANCE {
                p.round()
            } else {
                p
            };
            let r = if cube_axis.kind.is_spatial() { r_spat } else { r_spec };
            let min = (p - r).floor().max(0.0) as usize;
            let max = ((p + r).ceil().min((extent - 1) as f64)).max(0.0) as usize;

            if min >= max {
                return Err(OptifindError::DegenerateRegion {
                    source_id: source.id.clone(),
                    axis,
                });
            }
            Ok(AxisBounds { min, max })
        })
        .collect::<Result<SmallVec<_>, OptifindError>>()?;

    Ok(SubRegion { bounds })
}
