// src/image.rs

use crate::error::{Result, SvdPgmError};
use crate::normalize::normalize;
use ndarray::{Array2, ArrayView2};

/// An 8-bit grayscale raster.
///
/// Rows correspond to the image height and columns to its width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrayImage {
    pixels: Array2<u8>,
}

impl GrayImage {
    /// Wraps a pixel grid. Both dimensions must be non-zero.
    pub fn new(pixels: Array2<u8>) -> Result<Self> {
        if pixels.nrows() == 0 || pixels.ncols() == 0 {
            return Err(SvdPgmError::MalformedRaster(format!(
                "image dimensions must be non-zero, got {}x{} (width x height)",
                pixels.ncols(),
                pixels.nrows()
            )));
        }
        Ok(Self { pixels })
    }

    /// Builds an image from row-major pixel data.
    ///
    /// # Errors
    /// Returns `MalformedRaster` if `data.len() != width * height`, a dimension is zero,
    /// or `width * height` overflows.
    pub fn from_shape_vec(width: usize, height: usize, data: Vec<u8>) -> Result<Self> {
        let expected = pixel_count(width, height)?;
        if data.len() != expected {
            return Err(SvdPgmError::MalformedRaster(format!(
                "expected {} pixels for {}x{} image, found {}",
                expected,
                width,
                height,
                data.len()
            )));
        }
        let pixels = Array2::from_shape_vec((height, width), data)
            .map_err(|e| SvdPgmError::MalformedRaster(e.to_string()))?;
        Self::new(pixels)
    }

    pub fn width(&self) -> usize {
        self.pixels.ncols()
    }

    pub fn height(&self) -> usize {
        self.pixels.nrows()
    }

    pub fn get(&self, row: usize, col: usize) -> Option<u8> {
        self.pixels.get((row, col)).copied()
    }

    pub fn pixels(&self) -> &Array2<u8> {
        &self.pixels
    }

    pub fn into_pixels(self) -> Array2<u8> {
        self.pixels
    }
}

/// `width * height`, or `MalformedRaster` if the product does not fit in `usize`.
pub fn pixel_count(width: usize, height: usize) -> Result<usize> {
    width.checked_mul(height).ok_or_else(|| {
        SvdPgmError::MalformedRaster(format!("{}x{} image has too many pixels", width, height))
    })
}

/// Widens each intensity to `f64`, preserving shape.
pub fn to_matrix(image: &GrayImage) -> Array2<f64> {
    image.pixels.mapv(f64::from)
}

/// Renders a real-valued matrix as an image by min-max scaling onto `[0, 255]`.
pub fn to_image(matrix: &ArrayView2<f64>) -> Result<GrayImage> {
    normalize(matrix)
}
