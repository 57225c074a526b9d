// Low-rank image approximation and pseudoinverse via SVD

#![doc = include_str!("../README.md")]

pub mod config;
pub mod dump;
pub mod error;
pub mod factors;
pub mod image;
pub mod linalg_backends;
pub mod normalize;
pub mod pgm;
pub mod pipeline;
pub mod pseudoinverse;
pub mod reconstruct;

pub use crate::config::{BatchPolicy, PipelineConfig};
pub use crate::error::{Result, SvdPgmError};
pub use crate::factors::{decompose, SvdFactors};
pub use crate::image::{to_image, to_matrix, GrayImage};
pub use crate::normalize::normalize;
pub use crate::pgm::{read_pgm, write_pgm, RasterEncoding};
pub use crate::pipeline::SvdImagePipeline;
pub use crate::pseudoinverse::pseudoinverse;
pub use crate::reconstruct::reconstruct;
