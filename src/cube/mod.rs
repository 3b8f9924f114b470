//! # Data cube geometry
//!
//! Axis extents, axis roles and world ↔ pixel conversion of the input cube, built once
//! from the primary FITS header and immutable afterwards.
//!
//! Modules
//! -----------------
//! * [`fits_header`] – Primary header reader and the [`KeywordProvider`] abstraction.
//! * [`wcs`] – Linear and celestial world coordinate evaluation.
//!
//! Axis roles
//! -----------------
//! Axes are identified from `CTYPEi`:
//! * longitude: `RA`, `GLON`, `ELON`, `SLON`, `HPLN`, ...
//! * latitude: `DEC`, `GLAT`, `ELAT`, `SLAT`, `HPLT`, ...
//! * spectral: `FREQ`, `VELO`, `VRAD`, `VOPT`, `FELO`, `ZOPT`, `WAVE`, `AWAV`, `WAVN`,
//!   `ENER`, `BETA`
//! * `STOKES`, and anything else.
//!
//! A cube must have exactly one longitude and one latitude axis. When no `CTYPE`
//! identifies them, the first two axes are taken as spatial.
use camino::Utf8Path;
use itertools::Itertools;
use log::debug;

use crate::{
    constants::{Pixel, WorldValue},
    optifind_errors::OptifindError,
};

pub mod fits_header;
pub mod wcs;

pub use fits_header::{FitsHeader, KeywordMap, KeywordProvider};
pub use wcs::WorldCoordinates;

const SPECTRAL_TYPES: [&str; 11] = [
    "FREQ", "VELO", "VRAD", "VOPT", "FELO", "ZOPT", "WAVE", "AWAV", "WAVN", "ENER", "BETA",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisKind {
    Longitude,
    Latitude,
    Spectral,
    Stokes,
    Other,
}

impl AxisKind {
    /// Classify an axis from its `CTYPE` value.
    pub fn from_ctype(ctype: &str) -> Self {
        let upper = ctype.trim().to_ascii_uppercase();
        let base = upper.split('-').next().unwrap_or_default();

        if base == "RA" || base == "HPLN" || (base.len() == 4 && base.ends_with("LON")) {
            AxisKind::Longitude
        } else if base == "DEC" || base == "HPLT" || (base.len() == 4 && base.ends_with("LAT")) {
            AxisKind::Latitude
        } else if SPECTRAL_TYPES.iter().any(|t| base.starts_with(t)) {
            AxisKind::Spectral
        } else if base == "STOKES" {
            AxisKind::Stokes
        } else {
            AxisKind::Other
        }
    }

    pub fn is_spatial(self) -> bool {
        matches!(self, AxisKind::Longitude | AxisKind::Latitude)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CubeAxis {
    pub extent: usize,
    pub ctype: String,
    pub kind: AxisKind,
}

impl CubeAxis {
    /// A single-pixel axis (e.g. a Stokes axis of extent 1).
    pub fn is_degenerate(&self) -> bool {
        self.extent == 1
    }
}

/// Axes and world coordinate system of the input cube.
#[derive(Debug, Clone, PartialEq)]
pub struct CubeGeometry {
    axes: Vec<CubeAxis>,
    wcs: WorldCoordinates,
    longitude: usize,
    latitude: usize,
    spectral: Option<usize>,
}

impl CubeGeometry {
    /// Read the geometry of the FITS cube at `path` (header only).
    pub fn from_fits(path: &Utf8Path) -> Result<Self, OptifindError> {
        let header = FitsHeader::read(path)?;
        debug!("Read {} header keyword(s) from {path}", header.len());
        Self::from_header(&header)
    }

    /// Build the geometry from header keywords.
    ///
    /// Arguments
    /// -----------------
    /// * `header` – Any [`KeywordProvider`] carrying `NAXIS`, `NAXISi`, `CTYPEi` and the
    ///   WCS keywords.
    ///
    /// Return
    /// ----------
    /// * The cube geometry.
    /// * [`OptifindError::FitsHeader`] if `NAXIS`/`NAXISi` are missing or invalid,
    ///   [`OptifindError::AxisIdentification`] if the spatial axes cannot be identified
    ///   or more than one non-spatial axis has an extent above 1,
    ///   [`OptifindError::Wcs`] if the WCS keywords are unusable.
    pub fn from_header(header: &impl KeywordProvider) -> Result<Self, OptifindError> {
        let naxis = header
            .get_int("NAXIS")
            .filter(|&n| n >= 0)
            .ok_or_else(|| OptifindError::FitsHeader("NAXIS missing or invalid".into()))?
            as usize;

        if naxis < 2 {
            return Err(OptifindError::AxisIdentification(format!(
                "cube has {naxis} axis/axes, at least two are required"
            )));
        }

        let axes = (1..=naxis)
            .map(|i| {
                let extent = header
                    .get_int(&format!("NAXIS{i}"))
                    .filter(|&n| n > 0)
                    .ok_or_else(|| {
                        OptifindError::FitsHeader(format!("NAXIS{i} missing or not positive"))
                    })? as usize;
                let ctype = header
                    .get_string(&format!("CTYPE{i}"))
                    .unwrap_or_default()
                    .trim()
                    .to_string();
                let kind = AxisKind::from_ctype(&ctype);
                Ok(CubeAxis {
                    extent,
                    ctype,
                    kind,
                })
            })
            .collect::<Result<Vec<_>, OptifindError>>()?;

        Self::new(axes, WorldCoordinates::from_header(header, naxis)?)
    }

    /// Assemble a geometry from classified axes and their WCS.
    pub fn new(mut axes: Vec<CubeAxis>, wcs: WorldCoordinates) -> Result<Self, OptifindError> {
        if wcs.naxis() != axes.len() {
            return Err(OptifindError::AxisIdentification(format!(
                "WCS has {} axes but the cube has {}",
                wcs.naxis(),
                axes.len()
            )));
        }

        let positions = |kind: AxisKind, axes: &[CubeAxis]| {
            axes.iter()
                .positions(|a| a.kind == kind)
                .collect::<Vec<_>>()
        };
        let lng = positions(AxisKind::Longitude, &axes);
        let lat = positions(AxisKind::Latitude, &axes);

        let (longitude, latitude) = match (lng.as_slice(), lat.as_slice()) {
            ([x], [y]) => (*x, *y),
            ([], []) => {
                debug!("No celestial CTYPE found, using the first two axes as spatial axes");
                axes[0].kind = AxisKind::Longitude;
                axes[1].kind = AxisKind::Latitude;
                (0, 1)
            }
            _ => {
                return Err(OptifindError::AxisIdentification(format!(
                    "expected one longitude and one latitude axis, found CTYPE [{}]",
                    axes.iter().map(|a| a.ctype.as_str()).join(", ")
                )))
            }
        };

        let extra: Vec<usize> = axes
            .iter()
            .positions(|a| !a.kind.is_spatial() && !a.is_degenerate())
            .collect();
        if extra.len() > 1 {
            return Err(OptifindError::AxisIdentification(format!(
                "more than one non-spatial axis with an extent above 1: [{}]",
                extra.iter().map(|&i| axes[i].ctype.as_str()).join(", ")
            )));
        }

        let spectral = axes
            .iter()
            .position(|a| a.kind == AxisKind::Spectral)
            .or_else(|| extra.first().copied());

        Ok(CubeGeometry {
            axes,
            wcs,
            longitude,
            latitude,
            spectral,
        })
    }

    pub fn axes(&self) -> &[CubeAxis] {
        &self.axes
    }

    pub fn axis_count(&self) -> usize {
        self.axes.len()
    }

    pub fn extents(&self) -> Vec<usize> {
        self.axes.iter().map(|a| a.extent).collect()
    }

    pub fn longitude_axis(&self) -> usize {
        self.longitude
    }

    pub fn latitude_axis(&self) -> usize {
        self.latitude
    }

    /// Spectral axis, or the only non-degenerate non-spatial axis if none is labelled
    /// spectral.
    pub fn spectral_axis(&self) -> Option<usize> {
        self.spectral
    }

    /// World coordinates (cube axis order, header units) → 0-based pixels.
    pub fn world_to_pixel(&self, world: &[WorldValue]) -> Result<Vec<Pixel>, OptifindError> {
        Ok(self.wcs.world_to_pixel(world)?)
    }

    /// 0-based pixels → world coordinates.
    pub fn pixel_to_world(&self, pixel: &[Pixel]) -> Result<Vec<WorldValue>, OptifindError> {
        Ok(self.wcs.pixel_to_world(pixel)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keywords(ctypes: &[&str], extents: &[i64]) -> KeywordMap {
        let mut map = KeywordMap::new();
        map.set_int("NAXIS", ctypes.len() as i64);
        for (i, (ctype, extent)) in ctypes.iter().zip(extents).enumerate() {
            map.set_string(format!("CTYPE{}", i + 1), *ctype)
                .set_int(format!("NAXIS{}", i + 1), *extent);
        }
        map
    }

    #[test]
    fn test_axis_kind_from_ctype() {
        assert_eq!(AxisKind::from_ctype("RA---SIN"), AxisKind::Longitude);
        assert_eq!(AxisKind::from_ctype("GLAT-CAR"), AxisKind::Latitude);
        assert_eq!(AxisKind::from_ctype("dec--tan"), AxisKind::Latitude);
        assert_eq!(AxisKind::from_ctype("VELO-LSR"), AxisKind::Spectral);
        assert_eq!(AxisKind::from_ctype("FREQ"), AxisKind::Spectral);
        assert_eq!(AxisKind::from_ctype("STOKES"), AxisKind::Stokes);
        assert_eq!(AxisKind::from_ctype(""), AxisKind::Other);
    }

    #[test]
    fn test_four_axis_cube_with_stokes() {
        let map = keywords(
            &["RA---TAN", "DEC--TAN", "FREQ", "STOKES"],
            &[100, 80, 50, 1],
        );
        let geometry = CubeGeometry::from_header(&map).unwrap();
        assert_eq!(geometry.axis_count(), 4);
        assert_eq!(geometry.extents(), vec![100, 80, 50, 1]);
        assert_eq!(geometry.longitude_axis(), 0);
        assert_eq!(geometry.latitude_axis(), 1);
        assert_eq!(geometry.spectral_axis(), Some(2));
        assert!(geometry.axes()[3].is_degenerate());
    }

    #[test]
    fn test_unlabelled_axes_fall_back_to_first_two() {
        let map = keywords(&["", "", ""], &[10, 10, 10]);
        let geometry = CubeGeometry::from_header(&map).unwrap();
        assert_eq!(geometry.axes()[0].kind, AxisKind::Longitude);
        assert_eq!(geometry.axes()[1].kind, AxisKind::Latitude);
        assert_eq!(geometry.spectral_axis(), Some(2));
    }

    #[test]
    fn test_missing_latitude_axis() {
        let map = keywords(&["RA---TAN", "FREQ", "VRAD"], &[10, 10, 10]);
        assert!(matches!(
            CubeGeometry::from_header(&map),
            Err(OptifindError::AxisIdentification(_))
        ));
    }

    #[test]
    fn test_two_non_degenerate_non_spatial_axes() {
        let map = keywords(&["RA---TAN", "DEC--TAN", "FREQ", "STOKES"], &[10, 10, 10, 4]);
        assert!(matches!(
            CubeGeometry::from_header(&map),
            Err(OptifindError::AxisIdentification(_))
        ));
    }

    #[test]
    fn test_missing_naxis() {
        let map = KeywordMap::new();
        assert_eq!(
            CubeGeometry::from_header(&map).unwrap_err(),
            OptifindError::FitsHeader("NAXIS missing or invalid".into())
        );
    }
}
