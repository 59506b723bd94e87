//! Vincenty direct and inverse solutions on an oblate spheroid.
//!
//! Angles are degrees at the API boundary and radians internally. Both
//! solvers iterate to a fixed tolerance and stop with
//! [`CsfdError::NonConvergence`] once the iteration cap is reached, which
//! happens for (nearly) antipodal inputs.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::config::Tuning;
use crate::error::{CsfdError, Result};
use crate::spheroid::Spheroid;

/// Stand-in for `sin σ` when the two inverse points coincide.
const SIGMA_EPSILON: f64 = 1e-10;

/// Computes the positive modulus of `x` with respect to `m`.
/// Ensures the result is always in the range `[0, m)`.
#[inline]
pub fn positive_mod(x: f64, m: f64) -> f64 {
    let r = ((x % m) + m) % m;
    if r >= m {
        r - m
    } else {
        r
    }
}

/// Normalises an azimuth to `[0, 360)` degrees.
#[inline]
pub fn normalize_azimuth(deg: f64) -> f64 {
    positive_mod(deg, 360.0)
}

/// Wraps a longitude (or longitude difference) to `[-180, 180)` degrees.
#[inline]
pub fn wrap_longitude(deg: f64) -> f64 {
    positive_mod(deg + 180.0, 360.0) - 180.0
}

/// End point of a direct solution.
///
/// `lon` is `lon1 + L` without wrapping so that consecutive points of a
/// buffered ring stay continuous in the caller's frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DirectSolution {
    pub lat: f64,
    pub lon: f64,
    /// Azimuth from the end point back to the start point.
    pub back_azimuth: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InverseSolution {
    /// Geodesic distance in metres.
    pub distance: f64,
    /// Forward azimuth at point 1.
    pub azimuth12: f64,
    /// Azimuth from point 2 back to point 1.
    pub azimuth21: f64,
}

/// Vincenty solver bound to one spheroid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeodesicSolver {
    spheroid: Spheroid,
    tolerance: f64,
    max_iterations: usize,
}

impl GeodesicSolver {
    pub fn new(spheroid: Spheroid, tuning: &Tuning) -> Self {
        Self {
            spheroid,
            tolerance: tuning.vincenty_tolerance,
            max_iterations: tuning.vincenty_max_iterations,
        }
    }

    pub fn with_limits(spheroid: Spheroid, tolerance: f64, max_iterations: usize) -> Self {
        Self {
            spheroid,
            tolerance,
            max_iterations,
        }
    }

    pub fn spheroid(&self) -> &Spheroid {
        &self.spheroid
    }

    /// Destination reached from (`lat1`, `lon1`) after `distance` metres along
    /// initial `azimuth`.
    ///
    /// # Errors
    ///
    /// `NonConvergence` if σ has not settled within the iteration cap.
    pub fn direct(&self, lat1: f64, lon1: f64, azimuth: f64, distance: f64) -> Result<DirectSolution> {
        let a = self.spheroid.semi_major;
        let f = self.spheroid.flattening;
        let b = a * (1.0 - f);

        let alpha1 = normalize_azimuth(azimuth).to_radians();
        let (sin_alpha1, cos_alpha1) = alpha1.sin_cos();

        let tan_u1 = (1.0 - f) * lat1.to_radians().tan();
        let cos_u1 = 1.0 / (1.0 + tan_u1 * tan_u1).sqrt();
        let sin_u1 = tan_u1 * cos_u1;

        let sigma1 = tan_u1.atan2(cos_alpha1);
        let sin_alpha = cos_u1 * sin_alpha1;
        let cos_sq_alpha = 1.0 - sin_alpha * sin_alpha;
        let u_sq = cos_sq_alpha * (a * a - b * b) / (b * b);
        let big_a = 1.0 + u_sq / 16384.0 * (4096.0 + u_sq * (-768.0 + u_sq * (320.0 - 175.0 * u_sq)));
        let big_b = u_sq / 1024.0 * (256.0 + u_sq * (-128.0 + u_sq * (74.0 - 47.0 * u_sq)));

        let sigma0 = distance / (b * big_a);
        let mut sigma = sigma0;
        let mut cos_2sigma_m;
        let mut iterations = 0;
        loop {
            cos_2sigma_m = (2.0 * sigma1 + sigma).cos();
            let (sin_sigma, cos_sigma) = sigma.sin_cos();
            let delta_sigma = big_b
                * sin_sigma
                * (cos_2sigma_m
                    + big_b / 4.0
                        * (cos_sigma * (-1.0 + 2.0 * cos_2sigma_m * cos_2sigma_m)
                            - big_b / 6.0
                                * cos_2sigma_m
                                * (-3.0 + 4.0 * sin_sigma * sin_sigma)
                                * (-3.0 + 4.0 * cos_2sigma_m * cos_2sigma_m)));
            let previous = sigma;
            sigma = sigma0 + delta_sigma;
            iterations += 1;
            if (sigma - previous).abs() <= self.tolerance {
                break;
            }
            if iterations >= self.max_iterations {
                return Err(CsfdError::NonConvergence {
                    solver: "vincenty direct",
                    iterations,
                });
            }
        }
        cos_2sigma_m = (2.0 * sigma1 + sigma).cos();

        let (sin_sigma, cos_sigma) = sigma.sin_cos();
        let x = sin_u1 * sin_sigma - cos_u1 * cos_sigma * cos_alpha1;
        let lat2 = (sin_u1 * cos_sigma + cos_u1 * sin_sigma * cos_alpha1)
            .atan2((1.0 - f) * (sin_alpha * sin_alpha + x * x).sqrt());
        let lambda = (sin_sigma * sin_alpha1).atan2(cos_u1 * cos_sigma - sin_u1 * sin_sigma * cos_alpha1);
        let c = f / 16.0 * cos_sq_alpha * (4.0 + f * (4.0 - 3.0 * cos_sq_alpha));
        let l = lambda
            - (1.0 - c)
                * f
                * sin_alpha
                * (sigma + c * sin_sigma * (cos_2sigma_m + c * cos_sigma * (-1.0 + 2.0 * cos_2sigma_m * cos_2sigma_m)));
        let alpha2 = sin_alpha.atan2(-x);

        Ok(DirectSolution {
            lat: lat2.to_degrees(),
            lon: lon1 + l.to_degrees(),
            back_azimuth: normalize_azimuth((alpha2 + PI).to_degrees()),
        })
    }

    /// Distance and azimuths between two points.
    ///
    /// # Errors
    ///
    /// `NonConvergence` if λ has not settled within the iteration cap or
    /// has left `[-π, π]` (antipodal points).
    pub fn inverse(&self, lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> Result<InverseSolution> {
        let a = self.spheroid.semi_major;
        let f = self.spheroid.flattening;
        let b = a * (1.0 - f);

        let l = wrap_longitude(lon2 - lon1).to_radians();
        let tan_u1 = (1.0 - f) * lat1.to_radians().tan();
        let cos_u1 = 1.0 / (1.0 + tan_u1 * tan_u1).sqrt();
        let sin_u1 = tan_u1 * cos_u1;
        let tan_u2 = (1.0 - f) * lat2.to_radians().tan();
        let cos_u2 = 1.0 / (1.0 + tan_u2 * tan_u2).sqrt();
        let sin_u2 = tan_u2 * cos_u2;

        let mut lambda = l;
        let mut iterations = 0;
        let (sin_sigma, cos_sigma, sigma, cos_sq_alpha, cos_2sigma_m, sin_lambda, cos_lambda) = loop {
            let (sin_lambda, cos_lambda) = lambda.sin_cos();
            let t = cos_u1 * sin_u2 - sin_u1 * cos_u2 * cos_lambda;
            let sin_sigma = ((cos_u2 * sin_lambda).powi(2) + t * t).sqrt();
            let cos_sigma = sin_u1 * sin_u2 + cos_u1 * cos_u2 * cos_lambda;
            let sigma = sin_sigma.atan2(cos_sigma);
            let guarded = if sin_sigma == 0.0 { SIGMA_EPSILON } else { sin_sigma };
            let sin_alpha = cos_u1 * cos_u2 * sin_lambda / guarded;
            let cos_sq_alpha = 1.0 - sin_alpha * sin_alpha;
            let cos_2sigma_m = if cos_sq_alpha != 0.0 {
                cos_sigma - 2.0 * sin_u1 * sin_u2 / cos_sq_alpha
            } else {
                0.0
            };
            let c = f / 16.0 * cos_sq_alpha * (4.0 + f * (4.0 - 3.0 * cos_sq_alpha));
            let previous = lambda;
            lambda = l
                + (1.0 - c)
                    * f
                    * sin_alpha
                    * (sigma + c * sin_sigma * (cos_2sigma_m + c * cos_sigma * (-1.0 + 2.0 * cos_2sigma_m * cos_2sigma_m)));
            iterations += 1;
            if lambda.abs() > PI {
                return Err(CsfdError::NonConvergence {
                    solver: "vincenty inverse",
                    iterations,
                });
            }
            if (lambda - previous).abs() <= self.tolerance {
                let (sin_lambda, cos_lambda) = lambda.sin_cos();
                break (sin_sigma, cos_sigma, sigma, cos_sq_alpha, cos_2sigma_m, sin_lambda, cos_lambda);
            }
            if iterations >= self.max_iterations {
                return Err(CsfdError::NonConvergence {
                    solver: "vincenty inverse",
                    iterations,
                });
            }
        };

        let u_sq = cos_sq_alpha * (a * a - b * b) / (b * b);
        let big_a = 1.0 + u_sq / 16384.0 * (4096.0 + u_sq * (-768.0 + u_sq * (320.0 - 175.0 * u_sq)));
        let big_b = u_sq / 1024.0 * (256.0 + u_sq * (-128.0 + u_sq * (74.0 - 47.0 * u_sq)));
        let delta_sigma = big_b
            * sin_sigma
            * (cos_2sigma_m
                + big_b / 4.0
                    * (cos_sigma * (-1.0 + 2.0 * cos_2sigma_m * cos_2sigma_m)
                        - big_b / 6.0
                            * cos_2sigma_m
                            * (-3.0 + 4.0 * sin_sigma * sin_sigma)
                            * (-3.0 + 4.0 * cos_2sigma_m * cos_2sigma_m)));
        let distance = b * big_a * (sigma - delta_sigma);

        let alpha1 = (cos_u2 * sin_lambda).atan2(cos_u1 * sin_u2 - sin_u1 * cos_u2 * cos_lambda);
        let alpha2 = (cos_u1 * sin_lambda).atan2(-sin_u1 * cos_u2 + cos_u1 * sin_u2 * cos_lambda);

        Ok(InverseSolution {
            distance,
            azimuth12: normalize_azimuth(alpha1.to_degrees()),
            azimuth21: normalize_azimuth(alpha2.to_degrees() + 180.0),
        })
    }

    /// Shorthand for the inverse distance in metres.
    pub fn distance(&self, lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> Result<f64> {
        Ok(self.inverse(lat1, lon1, lat2, lon2)?.distance)
    }
}
