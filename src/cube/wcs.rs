//! # World coordinate system of a data cube
//!
//! Implements the subset of the FITS WCS standard needed to convert catalogued world
//! positions into pixel positions of a radio data cube:
//!
//! 1. **Linear part** (all axes): intermediate coordinates `x = M · (p - r)` where `p` is
//!    the 1-based FITS pixel, `r` is `CRPIXi` and `M` is either the `CDi_j` matrix or
//!    `diag(CDELTi) · PCi_j`. `M` is built as an N×N [`nalgebra::DMatrix`] and inverted
//!    once.
//! 2. **Celestial pair** (longitude/latitude axes with a projection code): intermediate
//!    coordinates `(x, y)` are projection-plane coordinates, deprojected into native
//!    spherical coordinates `(φ, θ)` and rotated into celestial `(α, δ)`.
//! 3. **Other axes** (spectral, Stokes, ...): `world = CRVALi + x_i`. Non-linear
//!    spectral algorithms (`FREQ-F2W`, `VOPT-LOG`, ...) are evaluated linearly.
//!
//! Pixel coordinates exposed by this module are **0-based** (the centre of the first
//! pixel is `0.0`). All angles are in degrees.
//!
//! Supported projections
//! -----------------
//! `TAN`, `SIN`, `ARC`, `STG`, `ZEA` (zenithal) and `CAR` (plate carrée).
//!
//! See also
//! ------------
//! * [`crate::cube::CubeGeometry`] – Axis classification and extents.
use nalgebra::{DMatrix, DVector};

use crate::{
    constants::{Pixel, WorldValue},
    cube::{fits_header::KeywordProvider, AxisKind},
    optifind_errors::WcsError,
};

const EPS: f64 = 1e-12;

/// Map projections understood by [`WorldCoordinates`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    Tan,
    Sin,
    Arc,
    Stg,
    Zea,
    Car,
}

impl Projection {
    pub fn from_code(code: &str) -> Result<Self, WcsError> {
        match code {
            "TAN" => Ok(Projection::Tan),
            "SIN" => Ok(Projection::Sin),
            "ARC" => Ok(Projection::Arc),
            "STG" => Ok(Projection::Stg),
            "ZEA" => Ok(Projection::Zea),
            "CAR" => Ok(Projection::Car),
            other => Err(WcsError::unsupported_projection(other)),
        }
    }

    /// Native latitude of the fiducial point.
    fn theta0(self) -> f64 {
        match self {
            Projection::Car => 0.0,
            _ => 90.0,
        }
    }

    /// Native spherical `(φ, θ)` → projection plane `(x, y)`.
    fn project(self, phi: f64, theta: f64) -> Result<(f64, f64), WcsError> {
        if self == Projection::Car {
            return Ok((normalize_native_longitude(phi), theta));
        }

        let r = match self {
            Projection::Tan => {
                if theta <= 0.0 {
                    return Err(WcsError::invalid_coordinate(format!(
                        "TAN: native latitude {theta:.6} is not in the projected hemisphere"
                    )));
                }
                1.0_f64.to_degrees() / theta.to_radians().tan()
            }
            Projection::Sin => {
                if theta < 0.0 {
                    return Err(WcsError::invalid_coordinate(format!(
                        "SIN: native latitude {theta:.6} is on the far side"
                    )));
                }
                1.0_f64.to_degrees() * theta.to_radians().cos()
            }
            Projection::Arc => 90.0 - theta,
            Projection::Stg => {
                if (theta + 90.0).abs() < EPS {
                    return Err(WcsError::invalid_coordinate(
                        "STG: the antipode of the reference point has no projection",
                    ));
                }
                2.0_f64.to_degrees() * ((90.0 - theta) / 2.0).to_radians().tan()
            }
            Projection::Zea => 2.0_f64.to_degrees() * ((90.0 - theta) / 2.0).to_radians().sin(),
            Projection::Car => unreachable!("handled above"),
        };

        let (sin_phi, cos_phi) = phi.to_radians().sin_cos();
        Ok((r * sin_phi, -r * cos_phi))
    }

    /// Projection plane `(x, y)` → native spherical `(φ, θ)`.
    fn deproject(self, x: f64, y: f64) -> Result<(f64, f64), WcsError> {
        if self == Projection::Car {
            if y.abs() > 90.0 {
                return Err(WcsError::invalid_coordinate(format!(
                    "CAR: native latitude {y:.6} beyond the pole"
                )));
            }
            return Ok((x, y));
        }

        let r = x.hypot(y);
        let phi = if r == 0.0 { 0.0 } else { x.atan2(-y).to_degrees() };

        let theta = match self {
            Projection::Tan => 1.0_f64.to_degrees().atan2(r).to_degrees(),
            Projection::Sin => {
                let s = r / 1.0_f64.to_degrees();
                if s > 1.0 + EPS {
                    return Err(WcsError::invalid_coordinate("SIN: point outside the disk"));
                }
                s.min(1.0).acos().to_degrees()
            }
            Projection::Arc => {
                if r > 180.0 + EPS {
                    return Err(WcsError::invalid_coordinate("ARC: point outside the disk"));
                }
                90.0 - r
            }
            Projection::Stg => 90.0 - 2.0 * (r / 2.0_f64.to_degrees()).atan().to_degrees(),
            Projection::Zea => {
                let s = r / 2.0_f64.to_degrees();
                if s > 1.0 + EPS {
                    return Err(WcsError::invalid_coordinate("ZEA: point outside the disk"));
                }
                90.0 - 2.0 * s.min(1.0).asin().to_degrees()
            }
            Projection::Car => unreachable!("handled above"),
        };

        Ok((phi, theta))
    }
}

fn normalize_native_longitude(phi: f64) -> f64 {
    let mut p = phi % 360.0;
    if p > 180.0 {
        p -= 360.0;
    } else if p <= -180.0 {
        p += 360.0;
    }
    p
}

fn normalize_longitude(alpha: f64) -> f64 {
    let a = alpha.rem_euclid(360.0);
    if a >= 360.0 {
        0.0
    } else {
        a
    }
}

/// Rotation between native spherical and celestial coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
struct SphericalRotation {
    alpha_p: f64,
    sin_delta_p: f64,
    cos_delta_p: f64,
    phi_p: f64,
}

impl SphericalRotation {
    /// Celestial coordinates of the native pole from the reference point.
    ///
    /// Arguments
    /// -----------------
    /// * `alpha0`, `delta0` – Celestial coordinates of the reference point (`CRVAL`).
    /// * `theta0` – Native latitude of the fiducial point of the projection.
    /// * `lonpole`, `latpole` – Optional `LONPOLE` / `LATPOLE` keywords.
    fn from_crval(
        alpha0: f64,
        delta0: f64,
        theta0: f64,
        lonpole: Option<f64>,
        latpole: Option<f64>,
    ) -> Result<Self, WcsError> {
        let phi_p = lonpole.unwrap_or(if delta0 >= theta0 { 0.0 } else { 180.0 });

        let (alpha_p, delta_p) = if (theta0 - 90.0).abs() < EPS {
            (alpha0, delta0)
        } else {
            let delta_p = compute_delta_p(delta0, theta0, phi_p, latpole.unwrap_or(90.0))?;
            let alpha_p = if (delta0.abs() - 90.0).abs() < EPS {
                alpha0
            } else if (delta_p - 90.0).abs() < EPS {
                alpha0 + phi_p - 180.0
            } else if (delta_p + 90.0).abs() < EPS {
                alpha0 - phi_p
            } else {
                let (d0, dp, t0) = (
                    delta0.to_radians(),
                    delta_p.to_radians(),
                    theta0.to_radians(),
                );
                let x = (t0.sin() - dp.sin() * d0.sin()) / (dp.cos() * d0.cos());
                let y = phi_p.to_radians().sin() * t0.cos() / d0.cos();
                alpha0 - y.atan2(x).to_degrees()
            };
            (alpha_p, delta_p)
        };

        let (sin_delta_p, cos_delta_p) = delta_p.to_radians().sin_cos();
        Ok(SphericalRotation {
            alpha_p,
            sin_delta_p,
            cos_delta_p,
            phi_p,
        })
    }

    fn celestial_to_native(&self, alpha: f64, delta: f64) -> (f64, f64) {
        let (sin_d, cos_d) = delta.to_radians().sin_cos();
        let (sin_da, cos_da) = (alpha - self.alpha_p).to_radians().sin_cos();

        let sin_theta = sin_d * self.sin_delta_p + cos_d * self.cos_delta_p * cos_da;
        let theta = sin_theta.clamp(-1.0, 1.0).asin().to_degrees();

        let x = -cos_d * sin_da;
        let y = sin_d * self.cos_delta_p - cos_d * self.sin_delta_p * cos_da;
        let phi = self.phi_p + x.atan2(y).to_degrees();

        (phi, theta)
    }

    fn native_to_celestial(&self, phi: f64, theta: f64) -> (f64, f64) {
        let (sin_t, cos_t) = theta.to_radians().sin_cos();
        let (sin_dp, cos_dp) = (phi - self.phi_p).to_radians().sin_cos();

        let sin_delta = sin_t * self.sin_delta_p + cos_t * self.cos_delta_p * cos_dp;
        let delta = sin_delta.clamp(-1.0, 1.0).asin().to_degrees();

        let x = -cos_t * sin_dp;
        let y = sin_t * self.cos_delta_p - cos_t * self.sin_delta_p * cos_dp;
        let alpha = normalize_longitude(self.alpha_p + x.atan2(y).to_degrees());

        (alpha, delta)
    }
}

/// Celestial latitude of the native pole for a non-zenithal projection.
///
/// Two solutions may exist; the one closest to `latpole` is kept.
fn compute_delta_p(delta0: f64, theta0: f64, phi_p: f64, latpole: f64) -> Result<f64, WcsError> {
    let (sin_d0, _) = delta0.to_radians().sin_cos();
    let (sin_t0, cos_t0) = theta0.to_radians().sin_cos();
    let (sin_pp, cos_pp) = phi_p.to_radians().sin_cos();

    let c = cos_t0 * sin_pp;
    let denom_sq = 1.0 - c * c;
    if denom_sq.abs() < EPS {
        if sin_d0.abs() < EPS {
            return Ok(latpole);
        }
        return Err(WcsError::invalid_keyword(
            "LONPOLE",
            "no native pole latitude for this reference point",
        ));
    }

    let arg = sin_d0 / denom_sq.sqrt();
    if arg.abs() > 1.0 + EPS {
        return Err(WcsError::invalid_keyword(
            "LONPOLE",
            "no native pole latitude for this reference point",
        ));
    }

    let base = sin_t0.atan2(cos_t0 * cos_pp).to_degrees();
    let offset = arg.clamp(-1.0, 1.0).acos().to_degrees();
    let candidates = [base + offset, base - offset];

    candidates
        .into_iter()
        .filter(|d| (-90.0 - 1e-9..=90.0 + 1e-9).contains(d))
        .min_by(|a, b| (a - latpole).abs().total_cmp(&(b - latpole).abs()))
        .map(|d| d.clamp(-90.0, 90.0))
        .ok_or_else(|| {
            WcsError::invalid_keyword("LATPOLE", "native pole latitude outside [-90, 90]")
        })
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct CelestialPair {
    lng: usize,
    lat: usize,
    projection: Projection,
    rotation: SphericalRotation,
}

/// Evaluated world coordinate system of an N-dimensional cube.
#[derive(Debug, Clone, PartialEq)]
pub struct WorldCoordinates {
    crpix: DVector<f64>,
    crval: DVector<f64>,
    matrix: DMatrix<f64>,
    inverse: DMatrix<f64>,
    celestial: Option<CelestialPair>,
}

/// Projection code of a celestial `CTYPE`, e.g. `TAN` in `RA---TAN`.
pub(crate) fn projection_code(ctype: &str) -> Option<&str> {
    ctype.split('-').filter(|s| !s.is_empty()).nth(1)
}

impl WorldCoordinates {
    /// Build the WCS of an `naxis`-dimensional cube from header keywords.
    ///
    /// Arguments
    /// -----------------
    /// * `header` – Keyword source (FITS header or [`crate::cube::KeywordMap`]).
    /// * `naxis` – Number of axes of the cube.
    ///
    /// Return
    /// ----------
    /// * The evaluated WCS.
    /// * [`WcsError::NonInvertibleMatrix`] if the linear transformation is singular,
    ///   [`WcsError::UnsupportedProjection`] for an unknown celestial projection,
    ///   [`WcsError::InvalidKeyword`] for inconsistent celestial keywords.
    pub fn from_header(header: &impl KeywordProvider, naxis: usize) -> Result<Self, WcsError> {
        let crpix = DVector::from_fn(naxis, |i, _| {
            header.get_float(&format!("CRPIX{}", i + 1)).unwrap_or(0.0)
        });
        let crval = DVector::from_fn(naxis, |i, _| {
            header.get_float(&format!("CRVAL{}", i + 1)).unwrap_or(0.0)
        });

        let matrix = Self::linear_matrix(header, naxis);
        let determinant = matrix.determinant();
        let inverse = matrix
            .clone()
            .try_inverse()
            .filter(|_| determinant != 0.0 && determinant.is_finite())
            .ok_or(WcsError::NonInvertibleMatrix { determinant })?;

        let ctypes: Vec<String> = (1..=naxis)
            .map(|i| {
                header
                    .get_string(&format!("CTYPE{i}"))
                    .unwrap_or_default()
                    .trim()
                    .to_ascii_uppercase()
            })
            .collect();
        let celestial = Self::celestial_pair(header, &ctypes, &crval)?;

        Ok(WorldCoordinates {
            crpix,
            crval,
            matrix,
            inverse,
            celestial,
        })
    }

    /// `CDi_j` when any is present, otherwise `diag(CDELTi) · PCi_j`.
    fn linear_matrix(header: &impl KeywordProvider, naxis: usize) -> DMatrix<f64> {
        let cd = |i: usize, j: usize| header.get_float(&format!("CD{}_{}", i + 1, j + 1));
        let has_cd = (0..naxis).any(|i| (0..naxis).any(|j| cd(i, j).is_some()));

        if has_cd {
            DMatrix::from_fn(naxis, naxis, |i, j| cd(i, j).unwrap_or(0.0))
        } else {
            DMatrix::from_fn(naxis, naxis, |i, j| {
                let cdelt = header
                    .get_float(&format!("CDELT{}", i + 1))
                    .unwrap_or(1.0);
                let pc = header
                    .get_float(&format!("PC{}_{}", i + 1, j + 1))
                    .unwrap_or(if i == j { 1.0 } else { 0.0 });
                cdelt * pc
            })
        }
    }

    fn celestial_pair(
        header: &impl KeywordProvider,
        ctypes: &[String],
        crval: &DVector<f64>,
    ) -> Result<Option<CelestialPair>, WcsError> {
        let lng = ctypes
            .iter()
            .position(|c| AxisKind::from_ctype(c) == AxisKind::Longitude);
        let lat = ctypes
            .iter()
            .position(|c| AxisKind::from_ctype(c) == AxisKind::Latitude);
        let (Some(lng), Some(lat)) = (lng, lat) else {
            return Ok(None);
        };

        let code = match (
            projection_code(&ctypes[lng]),
            projection_code(&ctypes[lat]),
        ) {
            (None, None) => return Ok(None),
            (Some(a), Some(b)) if a == b => a,
            _ => {
                return Err(WcsError::invalid_keyword(
                    format!("CTYPE{}", lat + 1),
                    format!(
                        "projection of {:?} does not match {:?}",
                        ctypes[lat], ctypes[lng]
                    ),
                ))
            }
        };
        let projection = Projection::from_code(code)?;

        let rotation = SphericalRotation::from_crval(
            crval[lng],
            crval[lat],
            projection.theta0(),
            header.get_float("LONPOLE"),
            header.get_float("LATPOLE"),
        )?;

        Ok(Some(CelestialPair {
            lng,
            lat,
            projection,
            rotation,
        }))
    }

    pub fn naxis(&self) -> usize {
        self.crpix.len()
    }

    /// Whether the longitude/latitude axes are evaluated through a projection.
    pub fn is_celestial(&self) -> bool {
        self.celestial.is_some()
    }

    fn check_dimension(&self, len: usize) -> Result<(), WcsError> {
        if len != self.naxis() {
            return Err(WcsError::WrongDimension {
                expected: self.naxis(),
                found: len,
            });
        }
        Ok(())
    }

    /// Convert world coordinates (cube axis order, header units) to 0-based pixels.
    ///
    /// Return
    /// ----------
    /// * One fractional pixel per axis.
    /// * [`WcsError::InvalidCoordinate`] if the position cannot be projected (e.g. on
    ///   the far hemisphere of a `TAN` projection), [`WcsError::WrongDimension`] if
    ///   `world.len()` differs from the number of axes.
    pub fn world_to_pixel(&self, world: &[WorldValue]) -> Result<Vec<Pixel>, WcsError> {
        self.check_dimension(world.len())?;

        let mut intermediate = DVector::from_fn(self.naxis(), |i, _| world[i] - self.crval[i]);

        if let Some(pair) = &self.celestial {
            let (phi, theta) = pair
                .rotation
                .celestial_to_native(world[pair.lng], world[pair.lat]);
            let (x, y) = pair.projection.project(phi, theta)?;
            intermediate[pair.lng] = x;
            intermediate[pair.lat] = y;
        }

        let fits_pixel = &self.inverse * intermediate + &self.crpix;
        Ok(fits_pixel.iter().map(|p| p - 1.0).collect())
    }

    /// Convert 0-based pixels to world coordinates (cube axis order, header units).
    pub fn pixel_to_world(&self, pixel: &[Pixel]) -> Result<Vec<WorldValue>, WcsError> {
        self.check_dimension(pixel.len())?;

        let offset = DVector::from_fn(self.naxis(), |i, _| pixel[i] + 1.0 - self.crpix[i]);
        let intermediate = &self.matrix * offset;
        let mut world: Vec<WorldValue> = intermediate
            .iter()
            .zip(self.crval.iter())
            .map(|(x, v)| v + x)
            .collect();

        if let Some(pair) = &self.celestial {
            let (phi, theta) = pair
                .projection
                .deproject(intermediate[pair.lng], intermediate[pair.lat])?;
            let (alpha, delta) = pair.rotation.native_to_celestial(phi, theta);
            world[pair.lng] = alpha;
            world[pair.lat] = delta;
        }

        Ok(world)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::cube::fits_header::KeywordMap;

    fn radio_cube(projection: &str) -> KeywordMap {
        let mut map = KeywordMap::new();
        map.set_string("CTYPE1", format!("RA---{projection}"))
            .set_string("CTYPE2", format!("DEC--{projection}"))
            .set_string("CTYPE3", "FREQ")
            .set_float("CRPIX1", 51.0)
            .set_float("CRPIX2", 51.0)
            .set_float("CRPIX3", 1.0)
            .set_float("CRVAL1", 180.0)
            .set_float("CRVAL2", -30.0)
            .set_float("CRVAL3", 1.4e9)
            .set_float("CDELT1", -0.001)
            .set_float("CDELT2", 0.001)
            .set_float("CDELT3", 1.0e4);
        map
    }

    #[test]
    fn test_reference_pixel() {
        let wcs = WorldCoordinates::from_header(&radio_cube("TAN"), 3).unwrap();
        let pixel = wcs.world_to_pixel(&[180.0, -30.0, 1.4e9]).unwrap();
        assert_relative_eq!(pixel[0], 50.0, epsilon = 1e-9);
        assert_relative_eq!(pixel[1], 50.0, epsilon = 1e-9);
        assert_relative_eq!(pixel[2], 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_axis_directions() {
        let wcs = WorldCoordinates::from_header(&radio_cube("SIN"), 3).unwrap();
        // east of the reference: RA increases towards lower pixel values
        let pixel = wcs.world_to_pixel(&[180.01, -30.0, 1.4001e9]).unwrap();
        assert!(pixel[0] < 50.0);
        assert_relative_eq!(pixel[0], 50.0 - 10.0 * (30.0_f64).to_radians().cos(), epsilon = 1e-3);
        assert_relative_eq!(pixel[1], 50.0, epsilon = 1e-3);
        assert_relative_eq!(pixel[2], 10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_round_trip_all_projections() {
        for code in ["TAN", "SIN", "ARC", "STG", "ZEA", "CAR"] {
            let wcs = WorldCoordinates::from_header(&radio_cube(code), 3).unwrap();
            let pixel = [12.3, 87.6, 4.0];
            let world = wcs.pixel_to_world(&pixel).unwrap();
            let back = wcs.world_to_pixel(&world).unwrap();
            for (a, b) in pixel.iter().zip(&back) {
                assert_relative_eq!(a, b, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_cd_matrix_takes_precedence() {
        let mut map = radio_cube("TAN");
        map.set_float("CD1_1", -0.002).set_float("CD2_2", 0.002).set_float("CD3_3", 2.0e4);
        let wcs = WorldCoordinates::from_header(&map, 3).unwrap();
        let pixel = wcs.world_to_pixel(&[180.0, -29.99, 1.4002e9]).unwrap();
        assert_relative_eq!(pixel[1], 55.0, epsilon = 1e-3);
        assert_relative_eq!(pixel[2], 10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_far_side_is_rejected() {
        let wcs = WorldCoordinates::from_header(&radio_cube("TAN"), 3).unwrap();
        assert!(matches!(
            wcs.world_to_pixel(&[0.0, 30.0, 1.4e9]),
            Err(WcsError::InvalidCoordinate { .. })
        ));
    }

    #[test]
    fn test_unsupported_projection() {
        assert_eq!(
            WorldCoordinates::from_header(&radio_cube("HPX"), 3).unwrap_err(),
            WcsError::UnsupportedProjection { code: "HPX".into() }
        );
    }

    #[test]
    fn test_singular_matrix() {
        let mut map = radio_cube("TAN");
        map.set_float("CDELT3", 0.0);
        assert!(matches!(
            WorldCoordinates::from_header(&map, 3),
            Err(WcsError::NonInvertibleMatrix { .. })
        ));
    }

    #[test]
    fn test_linear_without_projection_code() {
        let mut map = KeywordMap::new();
        map.set_string("CTYPE1", "RA")
            .set_string("CTYPE2", "DEC")
            .set_float("CRPIX1", 1.0)
            .set_float("CRPIX2", 1.0)
            .set_float("CRVAL1", 10.0)
            .set_float("CRVAL2", 20.0)
            .set_float("CDELT1", 0.5)
            .set_float("CDELT2", 0.5);
        let wcs = WorldCoordinates::from_header(&map, 2).unwrap();
        assert!(!wcs.is_celestial());
        assert_eq!(wcs.world_to_pixel(&[11.0, 21.5]).unwrap(), vec![2.0, 3.0]);
    }

    #[test]
    fn test_wrong_dimension() {
        let wcs = WorldCoordinates::from_header(&radio_cube("TAN"), 3).unwrap();
        assert_eq!(
            wcs.world_to_pixel(&[1.0, 2.0]).unwrap_err(),
            WcsError::WrongDimension {
                expected: 3,
                found: 2
            }
        );
    }
}
