// src/config.rs

use crate::error::{Result, SvdPgmError};
use crate::pgm::RasterEncoding;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// What to do when one rank in a batch of approximations fails.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum BatchPolicy {
    /// Validate every requested rank before writing anything; stop at the first failure.
    #[default]
    FailFast,
    /// Render every valid rank and report the failures afterwards.
    BestEffort,
}

/// Settings for [`crate::pipeline::SvdImagePipeline`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory receiving every artifact. Created on demand.
    pub output_dir: PathBuf,
    /// Encoding of written rasters.
    pub encoding: RasterEncoding,
    /// Singular values at or below this are treated as zero by the pseudoinverse.
    /// `None` uses [`crate::pseudoinverse::default_tolerance`] of the factors being inverted;
    /// `Some(0.0)` inverts every strictly positive singular value.
    pub zero_tolerance: Option<f64>,
    pub batch_policy: BatchPolicy,
    /// Also render `matrix · pseudoinverse`.
    pub render_identity_check: bool,
    /// Also write every rendered matrix as whitespace-separated text next to its raster.
    pub write_text_dumps: bool,

    pub u_artifact: String,
    pub sigma_artifact: String,
    pub vt_artifact: String,
    /// Approximation artifacts are named `<prefix><k>.pgm`.
    pub approximation_prefix: String,
    pub pseudoinverse_artifact: String,
    pub identity_check_artifact: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            output_dir: PathBuf::from("."),
            encoding: RasterEncoding::Plain,
            zero_tolerance: None,
            batch_policy: BatchPolicy::FailFast,
            render_identity_check: true,
            write_text_dumps: false,
            u_artifact: "U".to_string(),
            sigma_artifact: "D".to_string(),
            vt_artifact: "VTranspose".to_string(),
            approximation_prefix: "A".to_string(),
            pseudoinverse_artifact: "Pseudoinverse".to_string(),
            identity_check_artifact: "IHat".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Loads a JSON configuration. Absent fields take their default values.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| SvdPgmError::io(path, e))?;
        let config: PipelineConfig = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| SvdPgmError::Config(format!("Failed to parse {:?}: {}", path, e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(tolerance) = self.zero_tolerance {
            if !tolerance.is_finite() || tolerance < 0.0 {
                return Err(SvdPgmError::Config(format!(
                    "zero_tolerance must be finite and non-negative, got {}",
                    tolerance
                )));
            }
        }
        let names = [
            ("u_artifact", &self.u_artifact),
            ("sigma_artifact", &self.sigma_artifact),
            ("vt_artifact", &self.vt_artifact),
            ("approximation_prefix", &self.approximation_prefix),
            ("pseudoinverse_artifact", &self.pseudoinverse_artifact),
            ("identity_check_artifact", &self.identity_check_artifact),
        ];
        for (field, name) in names {
            if name.trim().is_empty() {
                return Err(SvdPgmError::Config(format!("{} must not be empty", field)));
            }
            if name.contains('/') || name.contains('\\') {
                return Err(SvdPgmError::Config(format!(
                    "{} must be a bare file stem, got {:?}",
                    field, name
                )));
            }
        }
        Ok(())
    }

    /// Path of the raster for artifact `stem`.
    pub fn raster_path(&self, stem: &str) -> PathBuf {
        self.output_dir.join(format!("{}.pgm", stem))
    }

    /// Path of the text dump for artifact `stem`.
    pub fn text_path(&self, stem: &str) -> PathBuf {
        self.output_dir.join(format!("{}.txt", stem))
    }

    /// Artifact stem for the rank-`k` approximation, e.g. `A3`.
    pub fn approximation_stem(&self, k: usize) -> String {
        format!("{}{}", self.approximation_prefix, k)
    }
}
