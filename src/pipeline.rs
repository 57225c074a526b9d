// src/pipeline.rs

//! Sequencing of raster → matrix → SVD → {reconstruction | pseudoinverse} → raster.
//!
//! The decomposition is computed once per image and the same immutable
//! [`SvdFactors`] are handed to every renderer.

use crate::config::{BatchPolicy, PipelineConfig};
use crate::dump::write_matrix_text;
use crate::error::{Result, SvdPgmError};
use crate::factors::{decompose, energy, SvdFactors};
use crate::image::{to_image, to_matrix, GrayImage};
use crate::linalg_backends::{BackendSVD, LinAlgBackendProvider};
use crate::pgm::write_pgm;
use crate::pseudoinverse::{default_tolerance, pseudoinverse_with_tolerance};
use crate::reconstruct::reconstruct_with_error;
use log::{debug, info, warn};
use ndarray::{Array2, ArrayView2};
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

/// Paths of the three factor images.
#[derive(Debug, Clone)]
pub struct DecompositionArtifacts {
    pub u_path: PathBuf,
    pub sigma_path: PathBuf,
    pub vt_path: PathBuf,
}

/// One written rank-`k` approximation.
#[derive(Debug, Clone)]
pub struct RenderedApproximation {
    pub k: usize,
    pub path: PathBuf,
    pub matrix: Array2<f64>,
    /// `‖A - A_k‖_F` against the source matrix.
    pub frobenius_error: f64,
}

/// Outcome of a batch of approximations.
///
/// Under [`BatchPolicy::FailFast`] `failures` is always empty: the first failure is
/// returned as an error instead.
#[derive(Debug, Default)]
pub struct ApproximationReport {
    pub rendered: Vec<RenderedApproximation>,
    pub failures: Vec<(usize, SvdPgmError)>,
}

impl ApproximationReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// The pseudoinverse and, optionally, `matrix · pseudoinverse`.
#[derive(Debug, Clone)]
pub struct PseudoinverseArtifacts {
    pub pseudoinverse: Array2<f64>,
    pub path: PathBuf,
    pub identity_check: Option<(Array2<f64>, PathBuf)>,
}

#[derive(Debug)]
pub struct RunSummary {
    pub decomposition: DecompositionArtifacts,
    pub approximations: ApproximationReport,
    pub pseudoinverse: PseudoinverseArtifacts,
}

/// Renders SVD factors, low-rank approximations and the pseudoinverse of an image.
pub struct SvdImagePipeline<B: BackendSVD<f64> = LinAlgBackendProvider<f64>> {
    config: PipelineConfig,
    backend: B,
}

impl SvdImagePipeline<LinAlgBackendProvider<f64>> {
    /// Pipeline using the compile-time selected linear algebra backend.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        Self::with_backend(config, LinAlgBackendProvider::new())
    }
}

impl<B: BackendSVD<f64>> SvdImagePipeline<B> {
    pub fn with_backend(config: PipelineConfig, backend: B) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, backend })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Converts `image` to a matrix and decomposes it.
    pub fn factorize(&self, image: &GrayImage) -> Result<(Array2<f64>, SvdFactors)> {
        let start = Instant::now();
        let matrix = to_matrix(image);
        let factors = decompose(&self.backend, &matrix)?;
        info!(
            "Decomposed {}x{} image ({} singular values) in {:?}",
            image.width(),
            image.height(),
            factors.rank_limit(),
            start.elapsed()
        );
        Ok((matrix, factors))
    }

    fn write_artifact(&self, stem: &str, matrix: &ArrayView2<f64>) -> Result<PathBuf> {
        let start = Instant::now();
        let output_dir = &self.config.output_dir;
        fs::create_dir_all(output_dir).map_err(|e| SvdPgmError::io(output_dir, e))?;

        let image = to_image(matrix)?;
        let path = self.config.raster_path(stem);
        write_pgm(&path, &image, self.config.encoding)?;
        if self.config.write_text_dumps {
            write_matrix_text(self.config.text_path(stem), matrix)?;
        }
        info!("Wrote {:?} ({}x{}) in {:?}", path, image.width(), image.height(), start.elapsed());
        Ok(path)
    }

    /// Writes U, Σ and Vᵗ as images.
    pub fn render_decomposition(&self, factors: &SvdFactors) -> Result<DecompositionArtifacts> {
        let u_path = self.write_artifact(&self.config.u_artifact, &factors.u().view())?;
        let sigma_path = self.write_artifact(&self.config.sigma_artifact, &factors.sigma_matrix().view())?;
        let vt_path = self.write_artifact(&self.config.vt_artifact, &factors.vt())?;
        Ok(DecompositionArtifacts {
            u_path,
            sigma_path,
            vt_path,
        })
    }

    pub fn decompose_and_render(&self, image: &GrayImage) -> Result<DecompositionArtifacts> {
        let (_, factors) = self.factorize(image)?;
        self.render_decomposition(&factors)
    }

    /// Writes one `<prefix><k>` artifact per requested rank.
    ///
    /// Under [`BatchPolicy::FailFast`] every rank is checked before anything is written,
    /// so an invalid rank leaves no artifacts behind.
    pub fn render_approximations(
        &self,
        matrix: &Array2<f64>,
        factors: &SvdFactors,
        ks: &[usize],
    ) -> Result<ApproximationReport> {
        let policy = self.config.batch_policy;
        if policy == BatchPolicy::FailFast {
            let max = factors.rank_limit();
            if let Some(&k) = ks.iter().find(|&&k| k == 0 || k > max) {
                return Err(SvdPgmError::InvalidRank { k, max });
            }
        }

        let total_norm = energy(factors).sqrt();
        let mut report = ApproximationReport::default();
        for &k in ks {
            match self.render_approximation(matrix, factors, k) {
                Ok(rendered) => {
                    debug!(
                        "Rank {} error {:.6} (relative {:.6})",
                        k,
                        rendered.frobenius_error,
                        if total_norm > 0.0 { rendered.frobenius_error / total_norm } else { 0.0 }
                    );
                    report.rendered.push(rendered);
                }
                Err(e) if policy == BatchPolicy::BestEffort => {
                    warn!("Skipping rank {}: {}", k, e);
                    report.failures.push((k, e));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }

    fn render_approximation(&self, matrix: &Array2<f64>, factors: &SvdFactors, k: usize) -> Result<RenderedApproximation> {
        let (approximation, frobenius_error) = reconstruct_with_error(matrix, factors, k)?;
        let path = self.write_artifact(&self.config.approximation_stem(k), &approximation.view())?;
        Ok(RenderedApproximation {
            k,
            path,
            matrix: approximation,
            frobenius_error,
        })
    }

    pub fn approximate_and_render(&self, image: &GrayImage, ks: &[usize]) -> Result<ApproximationReport> {
        let (matrix, factors) = self.factorize(image)?;
        self.render_approximations(&matrix, &factors, ks)
    }

    /// Writes the pseudoinverse and, when configured, `matrix · pseudoinverse`.
    pub fn render_pseudoinverse(&self, matrix: &Array2<f64>, factors: &SvdFactors) -> Result<PseudoinverseArtifacts> {
        let tolerance = self
            .config
            .zero_tolerance
            .unwrap_or_else(|| default_tolerance(factors));
        let pseudoinverse = pseudoinverse_with_tolerance(factors, tolerance)?;
        let path = self.write_artifact(&self.config.pseudoinverse_artifact, &pseudoinverse.view())?;

        let identity_check = if self.config.render_identity_check {
            let product = matrix.dot(&pseudoinverse);
            let check_path = self.write_artifact(&self.config.identity_check_artifact, &product.view())?;
            Some((product, check_path))
        } else {
            None
        };
        Ok(PseudoinverseArtifacts {
            pseudoinverse,
            path,
            identity_check,
        })
    }

    pub fn pseudoinverse_and_render(&self, image: &GrayImage) -> Result<PseudoinverseArtifacts> {
        let (matrix, factors) = self.factorize(image)?;
        self.render_pseudoinverse(&matrix, &factors)
    }

    /// Factor images, then approximations, then the pseudoinverse, from a single decomposition.
    pub fn run_all(&self, image: &GrayImage, ks: &[usize]) -> Result<RunSummary> {
        let (matrix, factors) = self.factorize(image)?;
        self.run_with_factors(&matrix, &factors, ks)
    }

    /// Same as [`Self::run_all`] for a decomposition computed (or loaded) elsewhere.
    pub fn run_with_factors(&self, matrix: &Array2<f64>, factors: &SvdFactors, ks: &[usize]) -> Result<RunSummary> {
        if factors.nrows() != matrix.nrows() || factors.ncols() != matrix.ncols() {
            return Err(SvdPgmError::InvalidFactors(format!(
                "factors describe a {}x{} matrix but the image is {}x{}",
                factors.nrows(),
                factors.ncols(),
                matrix.nrows(),
                matrix.ncols()
            )));
        }
        let decomposition = self.render_decomposition(factors)?;
        let approximations = self.render_approximations(matrix, factors, ks)?;
        let pseudoinverse = self.render_pseudoinverse(matrix, factors)?;
        Ok(RunSummary {
            decomposition,
            approximations,
            pseudoinverse,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg_backends::SVDOutput;
    use crate::pgm::read_pgm;
    use ndarray::{array, Array1};
    use std::error::Error;
    use tempfile::tempdir;

    fn test_config(dir: &std::path::Path) -> PipelineConfig {
        PipelineConfig {
            output_dir: dir.to_path_buf(),
            ..PipelineConfig::default()
        }
    }

    fn test_image() -> GrayImage {
        GrayImage::new(array![[10u8, 200, 30], [40, 50, 160], [70, 80, 90], [250, 0, 120]]).unwrap()
    }

    struct FailingBackend;

    impl BackendSVD<f64> for FailingBackend {
        fn svd_into(&self, _matrix: Array2<f64>, _compute_u: bool, _compute_v: bool) -> std::result::Result<SVDOutput<f64>, Box<dyn Error + Send + Sync>> {
            Err("no convergence".into())
        }
    }

    /// Returns diag(3, 1) regardless of input; used to exercise the pipeline without LAPACK.
    struct FixedBackend;

    impl BackendSVD<f64> for FixedBackend {
        fn svd_into(&self, _matrix: Array2<f64>, _compute_u: bool, _compute_v: bool) -> std::result::Result<SVDOutput<f64>, Box<dyn Error + Send + Sync>> {
            Ok(SVDOutput { u: Some(Array2::eye(2)), s: Array1::from(vec![3.0, 1.0]), vt: Some(Array2::eye(2)) })
        }
    }

    /// Reports a round-off sized second singular value, as LAPACK does for a rank-1 input.
    struct RoundOffBackend;

    impl BackendSVD<f64> for RoundOffBackend {
        fn svd_into(&self, _matrix: Array2<f64>, _compute_u: bool, _compute_v: bool) -> std::result::Result<SVDOutput<f64>, Box<dyn Error + Send + Sync>> {
            Ok(SVDOutput { u: Some(Array2::eye(2)), s: Array1::from(vec![10.0, 1e-16]), vt: Some(Array2::eye(2)) })
        }
    }

    #[test]
    fn test_decomposition_artifacts_have_factor_shapes() {
        let dir = tempdir().unwrap();
        let pipeline = SvdImagePipeline::new(test_config(dir.path())).unwrap();
        let artifacts = pipeline.decompose_and_render(&test_image()).unwrap();
        let u = read_pgm(&artifacts.u_path).unwrap();
        let d = read_pgm(&artifacts.sigma_path).unwrap();
        let vt = read_pgm(&artifacts.vt_path).unwrap();
        assert_eq!((u.height(), u.width()), (4, 4));
        assert_eq!((d.height(), d.width()), (4, 3));
        assert_eq!((vt.height(), vt.width()), (3, 3));
        assert!(dir.path().join("U.pgm").exists());
        assert!(dir.path().join("D.pgm").exists());
        assert!(dir.path().join("VTranspose.pgm").exists());
    }

    #[test]
    fn test_fail_fast_writes_nothing_for_invalid_rank() {
        let dir = tempdir().unwrap();
        let pipeline = SvdImagePipeline::new(test_config(dir.path())).unwrap();
        let err = pipeline.approximate_and_render(&test_image(), &[1, 4]).unwrap_err();
        assert!(matches!(err, SvdPgmError::InvalidRank { k: 4, max: 3 }));
        assert!(!dir.path().join("A1.pgm").exists());
        assert!(!dir.path().join("A4.pgm").exists());
    }

    #[test]
    fn test_best_effort_keeps_valid_ranks() {
        let dir = tempdir().unwrap();
        let config = PipelineConfig {
            batch_policy: BatchPolicy::BestEffort,
            ..test_config(dir.path())
        };
        let pipeline = SvdImagePipeline::new(config).unwrap();
        let report = pipeline.approximate_and_render(&test_image(), &[0, 1, 2, 7]).unwrap();
        assert!(!report.is_complete());
        assert_eq!(report.rendered.iter().map(|r| r.k).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(report.failures.iter().map(|(k, _)| *k).collect::<Vec<_>>(), vec![0, 7]);
        assert!(dir.path().join("A1.pgm").exists());
        assert!(dir.path().join("A2.pgm").exists());
        assert!(!dir.path().join("A0.pgm").exists());
        assert!(report.rendered[0].frobenius_error >= report.rendered[1].frobenius_error);
    }

    #[test]
    fn test_pseudoinverse_with_identity_check_and_dumps() {
        let dir = tempdir().unwrap();
        let config = PipelineConfig {
            write_text_dumps: true,
            ..test_config(dir.path())
        };
        let pipeline = SvdImagePipeline::new(config).unwrap();
        let artifacts = pipeline.pseudoinverse_and_render(&test_image()).unwrap();
        assert_eq!(artifacts.pseudoinverse.dim(), (3, 4));
        let (product, check_path) = artifacts.identity_check.unwrap();
        assert_eq!(product.dim(), (4, 4));
        assert!(check_path.ends_with("IHat.pgm"));
        assert!(dir.path().join("Pseudoinverse.pgm").exists());
        assert!(dir.path().join("Pseudoinverse.txt").exists());
        assert!(dir.path().join("IHat.txt").exists());
    }

    #[test]
    fn test_default_tolerance_drops_round_off_singular_values() {
        let dir = tempdir().unwrap();
        let image = GrayImage::new(array![[10u8, 0], [0, 0]]).unwrap();

        let pipeline = SvdImagePipeline::with_backend(test_config(dir.path()), RoundOffBackend).unwrap();
        let artifacts = pipeline.pseudoinverse_and_render(&image).unwrap();
        assert_eq!(artifacts.pseudoinverse, array![[0.1, 0.0], [0.0, 0.0]]);

        let exact = PipelineConfig {
            zero_tolerance: Some(0.0),
            ..test_config(dir.path())
        };
        let pipeline = SvdImagePipeline::with_backend(exact, RoundOffBackend).unwrap();
        let artifacts = pipeline.pseudoinverse_and_render(&image).unwrap();
        assert!(artifacts.pseudoinverse[[1, 1]] > 1e15);
    }

    #[test]
    fn test_rank_deficient_image_has_bounded_pseudoinverse() {
        let dir = tempdir().unwrap();
        let pipeline = SvdImagePipeline::new(test_config(dir.path())).unwrap();
        // Repeated first row: rank 2.
        let image = GrayImage::new(array![[10u8, 20, 30], [10, 20, 30], [5, 1, 7]]).unwrap();
        let matrix = to_matrix(&image);
        let artifacts = pipeline.pseudoinverse_and_render(&image).unwrap();
        let p = &artifacts.pseudoinverse;

        let mpm = matrix.dot(p).dot(&matrix);
        for (x, y) in mpm.iter().zip(matrix.iter()) {
            assert!((x - y).abs() < 1e-8, "M·M⁺·M differs from M: {} vs {}", x, y);
        }
        let pmp = p.dot(&matrix).dot(p);
        for (x, y) in pmp.iter().zip(p.iter()) {
            assert!((x - y).abs() < 1e-8, "M⁺·M·M⁺ differs from M⁺: {} vs {}", x, y);
        }
        assert!(p.iter().all(|x| x.abs() < 1.0));
        assert!(read_pgm(&artifacts.path).is_ok());
    }

    #[test]
    fn test_backend_failure_is_decomposition_error() {
        let dir = tempdir().unwrap();
        let pipeline = SvdImagePipeline::with_backend(test_config(dir.path()), FailingBackend).unwrap();
        let err = pipeline.decompose_and_render(&test_image()).unwrap_err();
        assert!(matches!(err, SvdPgmError::Decomposition(_)));
    }

    #[test]
    fn test_custom_backend_drives_rendering() {
        let dir = tempdir().unwrap();
        let pipeline = SvdImagePipeline::with_backend(test_config(dir.path()), FixedBackend).unwrap();
        let image = GrayImage::new(array![[3u8, 0], [0, 1]]).unwrap();
        let report = pipeline.approximate_and_render(&image, &[1]).unwrap();
        assert_eq!(report.rendered[0].matrix, array![[3.0, 0.0], [0.0, 0.0]]);
        let rendered = read_pgm(&report.rendered[0].path).unwrap();
        assert_eq!(rendered.pixels(), &array![[255u8, 0], [0, 0]]);
    }

    #[test]
    fn test_run_with_mismatched_factors_is_rejected() {
        let dir = tempdir().unwrap();
        let pipeline = SvdImagePipeline::new(test_config(dir.path())).unwrap();
        let factors = SvdFactors::new(Array2::eye(2), Array1::from(vec![1.0, 1.0]), Array2::eye(2)).unwrap();
        let matrix = to_matrix(&test_image());
        let err = pipeline.run_with_factors(&matrix, &factors, &[1]).unwrap_err();
        assert!(matches!(err, SvdPgmError::InvalidFactors(_)));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = PipelineConfig {
            zero_tolerance: Some(f64::NAN),
            ..PipelineConfig::default()
        };
        assert!(SvdImagePipeline::new(config).is_err());
    }
}
