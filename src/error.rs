// src/error.rs

use std::path::PathBuf;

/// Errors produced while decomposing, reconstructing, or rendering an image.
#[derive(thiserror::Error, Debug)]
pub enum SvdPgmError {
    /// Requested rank is outside `1..=max`.
    #[error("Invalid rank k = {k}: must be between 1 and {max}")]
    InvalidRank { k: usize, max: usize },

    /// Raster header or pixel data is inconsistent with the declared dimensions.
    #[error("Malformed raster: {0}")]
    MalformedRaster(String),

    /// The PNM encoder rejected the image.
    #[error("Raster encoding failed: {0}")]
    Codec(#[from] ::image::ImageError),

    /// Underlying file read or write failed.
    #[error("I/O failure on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The decomposition provider failed or returned an incomplete result.
    #[error("Decomposition failed: {0}")]
    Decomposition(String),

    /// SVD factors violate the shape or sign contract.
    #[error("Invalid SVD factors: {0}")]
    InvalidFactors(String),

    /// A matrix handed to the normalizer contains NaN or infinity.
    #[error("Matrix contains non-finite values and cannot be rendered")]
    NonFiniteValue,

    /// A whitespace matrix dump could not be parsed.
    #[error("Malformed matrix text: {0}")]
    MalformedText(String),

    /// Pipeline configuration is unusable.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Persisting or loading cached factors failed.
    #[error("Serialization failed: {0}")]
    Serialization(String),
}

impl SvdPgmError {
    /// Wraps an `std::io::Error` together with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SvdPgmError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, SvdPgmError>;
