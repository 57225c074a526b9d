// src/factors.rs

use crate::error::{Result, SvdPgmError};
use crate::linalg_backends::BackendSVD;
use crate::reconstruct::{frobenius_norm, reconstruct_with_error};
use log::{debug, warn};
use ndarray::{Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Singular value decomposition of an R×C matrix.
///
/// Holds `u` (R×R or R×r), the singular values in descending order, and `v`
/// (C×C or C×r) such that `matrix ≈ u · Σ · vᵗ`. Values are immutable once built;
/// every consumer reads the same factors.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SvdFactors {
    /// Left singular vectors as columns.
    /// Shape: (n_rows, n_left_vectors)
    u: Array2<f64>,
    /// Non-negative singular values, largest first.
    /// Shape: (rank_limit)
    singular_values: Array1<f64>,
    /// Right singular vectors as columns (not transposed).
    /// Shape: (n_cols, n_right_vectors)
    v: Array2<f64>,
}

impl SvdFactors {
    /// Builds validated factors.
    ///
    /// Singular values that arrive out of order are re-sorted descending, and the
    /// matching columns of `u` and `v` are permuted with them.
    ///
    /// # Errors
    /// Returns `InvalidFactors` if a factor has a zero dimension, if there are more
    /// singular values than columns available in `u` or `v`, or if any singular value
    /// is negative or non-finite.
    pub fn new(u: Array2<f64>, singular_values: Array1<f64>, v: Array2<f64>) -> Result<Self> {
        if u.nrows() == 0 || v.nrows() == 0 {
            return Err(SvdPgmError::InvalidFactors(format!(
                "factor matrices must be non-empty, got U {:?} and V {:?}",
                u.dim(),
                v.dim()
            )));
        }
        let available = u.ncols().min(v.ncols());
        if singular_values.len() > available {
            return Err(SvdPgmError::InvalidFactors(format!(
                "{} singular values but only {} singular vector pairs (U {:?}, V {:?})",
                singular_values.len(),
                available,
                u.dim(),
                v.dim()
            )));
        }
        if let Some(bad) = singular_values.iter().find(|s| !s.is_finite() || **s < 0.0) {
            return Err(SvdPgmError::InvalidFactors(format!(
                "singular values must be finite and non-negative, found {}",
                bad
            )));
        }

        let is_descending = singular_values
            .windows(2)
            .into_iter()
            .all(|w| w[0] >= w[1]);
        if is_descending {
            return Ok(Self { u, singular_values, v });
        }

        debug!("Provider returned unsorted singular values; reordering {} pairs.", singular_values.len());
        let mut order: Vec<usize> = (0..singular_values.len()).collect();
        order.sort_by(|&a, &b| singular_values[b].total_cmp(&singular_values[a]));
        let sorted_values = order.iter().map(|&i| singular_values[i]).collect::<Array1<f64>>();
        let u = permute_leading_columns(&u, &order);
        let v = permute_leading_columns(&v, &order);
        Ok(Self {
            u,
            singular_values: sorted_values,
            v,
        })
    }

    /// Left singular vectors (columns).
    pub fn u(&self) -> &Array2<f64> {
        &self.u
    }

    /// Right singular vectors (columns).
    pub fn v(&self) -> &Array2<f64> {
        &self.v
    }

    /// Transposed right factor, as rendered in the `VTranspose` artifact.
    pub fn vt(&self) -> ArrayView2<'_, f64> {
        self.v.t()
    }

    pub fn singular_values(&self) -> &Array1<f64> {
        &self.singular_values
    }

    /// Row count R of the decomposed matrix.
    pub fn nrows(&self) -> usize {
        self.u.nrows()
    }

    /// Column count C of the decomposed matrix.
    pub fn ncols(&self) -> usize {
        self.v.nrows()
    }

    /// Largest rank that can be reconstructed, i.e. the number of singular values.
    pub fn rank_limit(&self) -> usize {
        self.singular_values.len()
    }

    /// The zero-padded diagonal Σ with shape `(u.ncols(), v.ncols())`.
    pub fn sigma_matrix(&self) -> Array2<f64> {
        let mut sigma = Array2::<f64>::zeros((self.u.ncols(), self.v.ncols()));
        for (i, &s) in self.singular_values.iter().enumerate() {
            sigma[[i, i]] = s;
        }
        sigma
    }

    /// Writes the factors to `path` so a decomposition can be reused across runs.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| SvdPgmError::io(path, e))?;
        let mut writer = BufWriter::new(file);
        bincode::serde::encode_into_std_write(self, &mut writer, bincode::config::standard())
            .map_err(|e| SvdPgmError::Serialization(format!("Failed to serialize SVD factors: {}", e)))?;
        writer.flush().map_err(|e| SvdPgmError::io(path, e))
    }

    /// Loads factors previously written by [`SvdFactors::save`] and re-validates them.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| SvdPgmError::io(path, e))?;
        let mut reader = BufReader::new(file);
        let raw: SvdFactors = bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())
            .map_err(|e| SvdPgmError::Serialization(format!("Failed to deserialize SVD factors: {}", e)))?;
        Self::new(raw.u, raw.singular_values, raw.v)
    }

    /// Checks that the full-rank product `U Σ Vᵗ` reproduces `matrix`.
    ///
    /// A cached decomposition of a different image with the same dimensions passes every
    /// shape check; this catches it.
    ///
    /// # Errors
    /// Returns `InvalidFactors` on a shape mismatch or when the relative Frobenius
    /// residual exceeds [`FACTOR_MATCH_TOLERANCE`].
    pub fn check_describes(&self, matrix: &Array2<f64>) -> Result<()> {
        let (_, residual) = reconstruct_with_error(matrix, self, self.rank_limit())?;
        let scale = frobenius_norm(&matrix.view()).max(1.0);
        if residual > FACTOR_MATCH_TOLERANCE * scale {
            return Err(SvdPgmError::InvalidFactors(format!(
                "factors do not reproduce the image (residual {:.3e}, norm {:.3e})",
                residual, scale
            )));
        }
        Ok(())
    }
}

/// Relative residual above which [`SvdFactors::check_describes`] rejects factors.
pub const FACTOR_MATCH_TOLERANCE: f64 = 1e-6;

/// Reorders the first `order.len()` columns; any trailing columns stay in place.
fn permute_leading_columns(matrix: &Array2<f64>, order: &[usize]) -> Array2<f64> {
    let mut out = matrix.clone();
    for (dst, &src) in order.iter().enumerate() {
        out.column_mut(dst).assign(&matrix.column(src));
    }
    out
}

/// Runs `backend` on `matrix` and packages the result as [`SvdFactors`].
///
/// # Errors
/// Returns `Decomposition` if the backend fails or omits a factor, and
/// `InvalidFactors` if the returned factors break the contract.
pub fn decompose<B: BackendSVD<f64> + ?Sized>(backend: &B, matrix: &Array2<f64>) -> Result<SvdFactors> {
    let (n_rows, n_cols) = matrix.dim();
    if n_rows == 0 || n_cols == 0 {
        return Err(SvdPgmError::Decomposition(format!(
            "cannot decompose an empty {}x{} matrix",
            n_rows, n_cols
        )));
    }
    let output = backend
        .svd_into(matrix.to_owned(), true, true)
        .map_err(|e| SvdPgmError::Decomposition(e.to_string()))?;
    let u = output
        .u
        .ok_or_else(|| SvdPgmError::Decomposition("backend did not return U".to_string()))?;
    let vt = output
        .vt
        .ok_or_else(|| SvdPgmError::Decomposition("backend did not return V^T".to_string()))?;
    if u.nrows() != n_rows || vt.ncols() != n_cols {
        return Err(SvdPgmError::Decomposition(format!(
            "factor shapes U {:?} / V^T {:?} do not match input {}x{}",
            u.dim(),
            vt.dim(),
            n_rows,
            n_cols
        )));
    }
    let v = vt.reversed_axes();

    let zero_count = output.s.iter().filter(|&&s| s == 0.0).count();
    if zero_count > 0 {
        warn!("Decomposition has {} zero singular value(s); matrix is rank deficient.", zero_count);
    }
    debug!(
        "Decomposed {}x{} matrix: U {:?}, {} singular values, V {:?}",
        n_rows,
        n_cols,
        u.dim(),
        output.s.len(),
        v.dim()
    );
    SvdFactors::new(u, output.s, v)
}

/// Sum of squared singular values, equal to the squared Frobenius norm of the source.
pub fn energy(factors: &SvdFactors) -> f64 {
    factors.singular_values().iter().map(|s| s * s).sum()
}
