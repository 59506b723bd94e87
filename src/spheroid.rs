//! Reference body description: spatial reference descriptors and the oblate
//! spheroid derived from them.

use serde::{Deserialize, Serialize};

use crate::error::{CsfdError, Result};

/// Below this eccentricity the body is treated as a sphere.
const SPHERE_ECCENTRICITY: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Geographic,
    Projected,
}

/// Spatial reference descriptor attached to region and crater layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialReference {
    pub name: String,
    pub kind: ReferenceKind,
    /// Semi-major axis in metres.
    pub semi_major: f64,
    /// Semi-minor axis in metres.
    pub semi_minor: f64,
}

impl SpatialReference {
    pub fn geographic(name: impl Into<String>, semi_major: f64, semi_minor: f64) -> Self {
        Self {
            name: name.into(),
            kind: ReferenceKind::Geographic,
            semi_major,
            semi_minor,
        }
    }

    /// Fails with `ReferenceMismatch` unless both layers share name, kind and axes.
    pub fn ensure_matches(&self, craters: &SpatialReference) -> Result<()> {
        if self == craters {
            Ok(())
        } else {
            Err(CsfdError::ReferenceMismatch {
                regions: self.describe(),
                craters: craters.describe(),
            })
        }
    }

    fn describe(&self) -> String {
        format!(
            "{} ({:?}, a={} m, b={} m)",
            self.name, self.kind, self.semi_major, self.semi_minor
        )
    }
}

/// Oblate spheroid, immutable for a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Spheroid {
    pub semi_major: f64,
    pub semi_minor: f64,
    pub flattening: f64,
}

impl Spheroid {
    pub fn new(semi_major: f64, semi_minor: f64) -> Result<Self> {
        if !(semi_major.is_finite() && semi_minor.is_finite())
            || semi_major <= 0.0
            || semi_minor <= 0.0
            || semi_minor > semi_major
        {
            return Err(CsfdError::InvalidSpheroid {
                semi_major,
                semi_minor,
            });
        }
        Ok(Self {
            semi_major,
            semi_minor,
            flattening: (semi_major - semi_minor) / semi_major,
        })
    }

    pub fn sphere(radius: f64) -> Result<Self> {
        Self::new(radius, radius)
    }

    pub fn from_flattening(semi_major: f64, flattening: f64) -> Result<Self> {
        Self::new(semi_major, semi_major * (1.0 - flattening))
    }

    pub fn from_reference(reference: &SpatialReference) -> Result<Self> {
        Self::new(reference.semi_major, reference.semi_minor)
    }

    /// First eccentricity squared.
    #[inline]
    pub fn e2(&self) -> f64 {
        self.flattening * (2.0 - self.flattening)
    }

    #[inline]
    pub fn is_sphere(&self) -> bool {
        self.e2().sqrt() < SPHERE_ECCENTRICITY
    }

    /// The `q` function of the authalic latitude, `phi` in radians.
    fn authalic_q(&self, phi: f64) -> f64 {
        let sin_phi = phi.sin();
        if self.is_sphere() {
            return 2.0 * sin_phi;
        }
        let e2 = self.e2();
        let e = e2.sqrt();
        let es = e * sin_phi;
        (1.0 - e2) * (sin_phi / (1.0 - es * es) - (1.0 / (2.0 * e)) * ((1.0 - es) / (1.0 + es)).ln())
    }

    /// Radius of the sphere with the same surface area, metres.
    pub fn authalic_radius(&self) -> f64 {
        let q_p = self.authalic_q(std::f64::consts::FRAC_PI_2);
        self.semi_major * (q_p / 2.0).sqrt()
    }

    /// Geodetic to authalic latitude, radians.
    pub fn authalic_latitude(&self, phi: f64) -> f64 {
        if self.is_sphere() {
            return phi;
        }
        let q_p = self.authalic_q(std::f64::consts::FRAC_PI_2);
        (self.authalic_q(phi) / q_p).clamp(-1.0, 1.0).asin()
    }

    /// Authalic to geodetic latitude via the series expansion in `e²`, radians.
    pub fn geodetic_latitude(&self, beta: f64) -> f64 {
        if self.is_sphere() {
            return beta;
        }
        let e2 = self.e2();
        let e4 = e2 * e2;
        let e6 = e4 * e2;
        beta + (e2 / 3.0 + 31.0 * e4 / 180.0 + 517.0 * e6 / 5040.0) * (2.0 * beta).sin()
            + (23.0 * e4 / 360.0 + 251.0 * e6 / 3780.0) * (4.0 * beta).sin()
            + (761.0 * e6 / 45360.0) * (6.0 * beta).sin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn flattening_is_derived_from_axes() {
        let mars = Spheroid::new(3_396_190.0, 3_376_200.0).unwrap();
        assert_relative_eq!(mars.flattening, (3_396_190.0 - 3_376_200.0) / 3_396_190.0);
        assert!(!mars.is_sphere());
        assert!(Spheroid::sphere(1_737_400.0).unwrap().is_sphere());
    }

    #[test]
    fn invalid_axes_are_rejected() {
        assert!(Spheroid::new(0.0, 0.0).is_err());
        assert!(Spheroid::new(1.0, 2.0).is_err());
        assert!(Spheroid::new(f64::NAN, 1.0).is_err());
    }

    #[test]
    fn authalic_radius_of_sphere_is_its_radius() {
        let moon = Spheroid::sphere(1_737_400.0).unwrap();
        assert_relative_eq!(moon.authalic_radius(), 1_737_400.0);
    }

    #[test]
    fn authalic_radius_lies_between_axes() {
        let earth = Spheroid::from_flattening(6_378_137.0, 1.0 / 298.257_223_563).unwrap();
        let r = earth.authalic_radius();
        assert_relative_eq!(r, 6_371_007.18, epsilon = 0.1);
    }

    #[test]
    fn authalic_latitude_series_inverts() {
        let mars = Spheroid::new(3_396_190.0, 3_376_200.0).unwrap();
        for deg in [-89.0_f64, -45.0, -10.0, 0.0, 12.5, 60.0, 88.0] {
            let phi = deg.to_radians();
            let beta = mars.authalic_latitude(phi);
            assert_relative_eq!(mars.geodetic_latitude(beta), phi, epsilon = 1e-7);
        }
    }

    #[test]
    fn reference_mismatch_names_both_layers() {
        let a = SpatialReference::geographic("GCS_Moon_2000", 1_737_400.0, 1_737_400.0);
        let b = SpatialReference::geographic("GCS_Mars_2000", 3_396_190.0, 3_376_200.0);
        assert!(a.ensure_matches(&a.clone()).is_ok());
        let err = a.ensure_matches(&b).unwrap_err();
        assert!(err.to_string().contains("GCS_Moon_2000"));
        assert!(err.to_string().contains("GCS_Mars_2000"));
    }
}
