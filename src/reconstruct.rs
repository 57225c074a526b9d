// src/reconstruct.rs

use crate::error::{Result, SvdPgmError};
use crate::factors::SvdFactors;
use log::trace;
use ndarray::{Array2, ArrayView2, Axis};

/// Best rank-`k` approximation from the leading `k` singular triplets.
///
/// Accumulates `σᵢ · uᵢ vᵢᵗ` for `i = 0..k`, largest singular value first. The
/// result is always `nrows × ncols` of the decomposed matrix.
///
/// # Errors
/// Returns `InvalidRank` when `k == 0` or `k` exceeds the number of singular values.
///
/// # Examples
///
/// ```
/// use ndarray::array;
/// use svd_pgm::factors::SvdFactors;
/// use svd_pgm::reconstruct::reconstruct;
///
/// let factors = SvdFactors::new(
///     ndarray::Array2::eye(2),
///     array![2.0, 0.0],
///     ndarray::Array2::eye(2),
/// ).unwrap();
/// let a1 = reconstruct(&factors, 1).unwrap();
/// assert_eq!(a1, array![[2.0, 0.0], [0.0, 0.0]]);
/// ```
pub fn reconstruct(factors: &SvdFactors, k: usize) -> Result<Array2<f64>> {
    let max = factors.rank_limit();
    if k == 0 || k > max {
        return Err(SvdPgmError::InvalidRank { k, max });
    }

    let u = factors.u();
    let v = factors.v();
    let s = factors.singular_values();
    let mut result = Array2::<f64>::zeros((factors.nrows(), factors.ncols()));

    for i in 0..k {
        let u_i = u.column(i).insert_axis(Axis(1));
        let v_i_t = v.column(i).insert_axis(Axis(0));
        // (R×1)·(1×C) outer product
        let term = u_i.dot(&v_i_t);
        result.scaled_add(s[i], &term);
        trace!("rank-{} accumulation: added term {} with sigma = {}", k, i, s[i]);
    }
    Ok(result)
}

/// Frobenius norm `sqrt(Σ x²)`.
pub fn frobenius_norm(matrix: &ArrayView2<f64>) -> f64 {
    matrix.iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// `reconstruct(factors, k)` together with `‖matrix - A_k‖_F`.
///
/// # Errors
/// `InvalidRank` as for [`reconstruct`], `InvalidFactors` if `matrix` does not have the
/// decomposed shape.
pub fn reconstruct_with_error(matrix: &Array2<f64>, factors: &SvdFactors, k: usize) -> Result<(Array2<f64>, f64)> {
    let approx = reconstruct(factors, k)?;
    if approx.dim() != matrix.dim() {
        return Err(SvdPgmError::InvalidFactors(format!(
            "factors describe a {:?} matrix but the reference is {:?}",
            approx.dim(),
            matrix.dim()
        )));
    }
    let error = frobenius_norm(&(matrix - &approx).view());
    Ok((approx, error))
}

/// `‖matrix - reconstruct(factors, k)‖_F`.
pub fn reconstruction_error(matrix: &Array2<f64>, factors: &SvdFactors, k: usize) -> Result<f64> {
    reconstruct_with_error(matrix, factors, k).map(|(_, error)| error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::decompose;
    use crate::linalg_backends::LinAlgBackendProvider;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn random_matrix(rows: usize, cols: usize, seed: u64) -> Array2<f64> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        Array2::from_shape_fn((rows, cols), |_| rng.gen_range(0.0..255.0))
    }

    #[test]
    fn test_rank_one_matrix_is_reproduced_exactly() {
        let a = array![[2.0, 0.0], [0.0, 0.0]];
        let factors = decompose(&LinAlgBackendProvider::<f64>::new(), &a).unwrap();
        let a1 = reconstruct(&factors, 1).unwrap();
        for (x, y) in a1.iter().zip(a.iter()) {
            assert_abs_diff_eq!(x, y, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_shape_is_preserved_for_every_k() {
        for &(rows, cols) in [(4, 7), (7, 4), (5, 5)].iter() {
            let a = random_matrix(rows, cols, 11);
            let factors = decompose(&LinAlgBackendProvider::<f64>::new(), &a).unwrap();
            for k in 1..=rows.min(cols) {
                assert_eq!(reconstruct(&factors, k).unwrap().dim(), (rows, cols));
            }
        }
    }

    #[test]
    fn test_error_is_non_increasing_and_vanishes_at_full_rank() {
        let a = random_matrix(6, 9, 3);
        let factors = decompose(&LinAlgBackendProvider::<f64>::new(), &a).unwrap();
        let mut previous = f64::INFINITY;
        for k in 1..=6 {
            let err = reconstruction_error(&a, &factors, k).unwrap();
            assert!(err <= previous + 1e-9, "error grew at k = {}: {} > {}", k, err, previous);
            previous = err;
        }
        assert!(previous < 1e-8 * frobenius_norm(&a.view()));
    }

    #[test]
    fn test_invalid_ranks_are_rejected() {
        let a = random_matrix(3, 5, 1);
        let factors = decompose(&LinAlgBackendProvider::<f64>::new(), &a).unwrap();
        assert!(matches!(
            reconstruct(&factors, 0),
            Err(SvdPgmError::InvalidRank { k: 0, max: 3 })
        ));
        assert!(matches!(
            reconstruct(&factors, 4),
            Err(SvdPgmError::InvalidRank { k: 4, max: 3 })
        ));
    }

    #[test]
    fn test_accumulates_largest_term_first() {
        // Two orthogonal terms; rank 1 keeps only the larger one.
        let factors = SvdFactors::new(Array2::eye(2), array![5.0, 1.0], Array2::eye(2)).unwrap();
        assert_eq!(reconstruct(&factors, 1).unwrap(), array![[5.0, 0.0], [0.0, 0.0]]);
        assert_eq!(reconstruct(&factors, 2).unwrap(), array![[5.0, 0.0], [0.0, 1.0]]);
    }

    #[test]
    fn test_reconstruct_with_error_pairs_approximation_and_residual() {
        let factors = SvdFactors::new(Array2::eye(2), array![5.0, 1.0], Array2::eye(2)).unwrap();
        let a = array![[5.0, 0.0], [0.0, 1.0]];
        let (a1, error) = reconstruct_with_error(&a, &factors, 1).unwrap();
        assert_eq!(a1, array![[5.0, 0.0], [0.0, 0.0]]);
        assert_abs_diff_eq!(error, 1.0, epsilon = 1e-15);
        assert_abs_diff_eq!(reconstruction_error(&a, &factors, 2).unwrap(), 0.0, epsilon = 1e-15);

        let wrong_shape = Array2::<f64>::zeros((3, 2));
        assert!(matches!(
            reconstruct_with_error(&wrong_shape, &factors, 1),
            Err(SvdPgmError::InvalidFactors(_))
        ));
    }
}
