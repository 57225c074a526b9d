// src/normalize.rs

use crate::error::{Result, SvdPgmError};
use crate::image::GrayImage;
use ndarray::ArrayView2;

/// Intensity assigned to every pixel when the matrix has zero range.
pub const DEGENERATE_INTENSITY: u8 = 0;

/// Returns `(min, max)` over all entries, or `None` for an empty matrix.
pub fn value_range(matrix: &ArrayView2<f64>) -> Option<(f64, f64)> {
    let mut entries = matrix.iter().copied();
    let first = entries.next()?;
    Some(entries.fold((first, first), |(lo, hi), x| (lo.min(x), hi.max(x))))
}

/// Linearly maps a matrix onto 8-bit intensities.
///
/// Each entry `v` becomes `round(255 * (v - min) / (max - min))`, rounding halves
/// away from zero. A constant matrix (`max == min`) maps to
/// [`DEGENERATE_INTENSITY`] everywhere instead of dividing by zero.
///
/// Offsets are taken on halved values so that `max - min` stays finite for any pair
/// of finite inputs.
///
/// # Errors
/// Returns `NonFiniteValue` if any entry is NaN or infinite, and `MalformedRaster`
/// for an empty matrix.
pub fn normalize(matrix: &ArrayView2<f64>) -> Result<GrayImage> {
    if matrix.iter().any(|v| !v.is_finite()) {
        return Err(SvdPgmError::NonFiniteValue);
    }
    let (min, max) = value_range(matrix).ok_or_else(|| {
        SvdPgmError::MalformedRaster("cannot render an empty matrix".to_string())
    })?;

    let half_min = min / 2.0;
    let half_range = max / 2.0 - half_min;
    let pixels = if half_range == 0.0 {
        matrix.mapv(|_| DEGENERATE_INTENSITY)
    } else {
        matrix.mapv(|v| (255.0 * ((v / 2.0 - half_min) / half_range)).round().clamp(0.0, 255.0) as u8)
    };
    GrayImage::new(pixels)
}
