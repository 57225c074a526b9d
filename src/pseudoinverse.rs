// src/pseudoinverse.rs

use crate::error::{Result, SvdPgmError};
use crate::factors::SvdFactors;
use log::debug;
use ndarray::Array2;

/// Σ⁺ with shape `(v.ncols(), u.ncols())`.
///
/// Diagonal entry `i` is `1/σᵢ` when `σᵢ > tolerance` and exactly `0` otherwise.
pub fn inverse_sigma(factors: &SvdFactors, tolerance: f64) -> Array2<f64> {
    let mut sigma_plus = Array2::<f64>::zeros((factors.v().ncols(), factors.u().ncols()));
    let mut truncated = 0usize;
    for (i, &s) in factors.singular_values().iter().enumerate() {
        if s > tolerance {
            sigma_plus[[i, i]] = 1.0 / s;
        } else {
            truncated += 1;
        }
    }
    if truncated > 0 {
        debug!("Pseudoinverse: {} singular value(s) <= {} treated as zero.", truncated, tolerance);
    }
    sigma_plus
}

/// Moore–Penrose pseudoinverse `V · Σ⁺ · Uᵗ`, shape C×R.
///
/// Only strictly positive singular values are inverted.
pub fn pseudoinverse(factors: &SvdFactors) -> Array2<f64> {
    let sigma_plus = inverse_sigma(factors, 0.0);
    factors.v().dot(&sigma_plus).dot(&factors.u().t())
}

/// Pseudoinverse that also zeroes singular values at or below `tolerance`.
///
/// # Errors
/// Returns `Config` if `tolerance` is negative or not finite.
pub fn pseudoinverse_with_tolerance(factors: &SvdFactors, tolerance: f64) -> Result<Array2<f64>> {
    if !tolerance.is_finite() || tolerance < 0.0 {
        return Err(SvdPgmError::Config(format!(
            "pseudoinverse tolerance must be finite and non-negative, got {}",
            tolerance
        )));
    }
    let sigma_plus = inverse_sigma(factors, tolerance);
    Ok(factors.v().dot(&sigma_plus).dot(&factors.u().t()))
}

/// LAPACK-style cut-off `max(R, C) · σ_max · ε`.
pub fn default_tolerance(factors: &SvdFactors) -> f64 {
    let sigma_max = factors.singular_values().iter().copied().fold(0.0, f64::max);
    factors.nrows().max(factors.ncols()) as f64 * sigma_max * f64::EPSILON
}
