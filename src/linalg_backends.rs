// src/linalg_backends.rs

use ndarray::{Array1, Array2};
use std::error::Error;
use std::marker::PhantomData;

/// Output of a Singular Value Decomposition.
///
/// `u` and `vt` are `None` when the caller did not request them.
#[derive(Debug)]
pub struct SVDOutput<F: 'static> {
    pub u: Option<Array2<F>>,
    pub s: Array1<F>,
    pub vt: Option<Array2<F>>,
}

/// Trait for Singular Value Decomposition.
///
/// Implementers return singular values in descending order and factors such that
/// `matrix ≈ u · diag(s) · vt` up to double-precision error. Full (square) or thin
/// factors are both acceptable.
pub trait BackendSVD<F: 'static + Copy + Send + Sync> {
    fn svd_into(&self, matrix: Array2<F>, compute_u: bool, compute_v: bool) -> Result<SVDOutput<F>, Box<dyn Error + Send + Sync>>;
}

// --- NdarrayLinAlgBackend: LAPACK through ndarray-linalg ---
use ndarray_linalg::SVDInto as NdLinalgSVDInto;

#[derive(Debug, Default, Copy, Clone)]
pub struct NdarrayLinAlgBackend;

fn to_dyn_error<E: Error + Send + Sync + 'static>(e: E) -> Box<dyn Error + Send + Sync> {
    Box::new(e)
}

impl BackendSVD<f64> for NdarrayLinAlgBackend {
    fn svd_into(&self, matrix: Array2<f64>, compute_u: bool, compute_v: bool) -> Result<SVDOutput<f64>, Box<dyn Error + Send + Sync>> {
        let (u, s, vt) = matrix.svd_into(compute_u, compute_v).map_err(to_dyn_error)?;
        Ok(SVDOutput { u, s, vt })
    }
}

// --- FaerLinAlgBackend: pure-Rust thin SVD ---
#[cfg(feature = "backend_faer")]
mod faer_specific_code {
    use super::{BackendSVD, SVDOutput};
    use faer::linalg::solvers::Svd as FaerSolverSvd;
    use faer::{Mat, MatRef};
    use ndarray::{Array1, Array2};
    use std::error::Error;

    fn to_dyn_error_faer(msg: String) -> Box<dyn Error + Send + Sync> {
        Box::new(std::io::Error::new(std::io::ErrorKind::Other, msg))
    }

    #[derive(Debug, Default, Copy, Clone)]
    pub struct FaerLinAlgBackend;

    fn ndarray_to_faer(array: &Array2<f64>) -> Mat<f64> {
        let (rows, cols) = array.dim();
        Mat::from_fn(rows, cols, |i, j| array[[i, j]])
    }

    fn faer_to_ndarray(mat: MatRef<'_, f64>) -> Array2<f64> {
        Array2::from_shape_fn((mat.nrows(), mat.ncols()), |(i, j)| mat[(i, j)])
    }

    impl BackendSVD<f64> for FaerLinAlgBackend {
        fn svd_into(&self, matrix: Array2<f64>, compute_u: bool, compute_v: bool) -> Result<SVDOutput<f64>, Box<dyn Error + Send + Sync>> {
            let (nrows, ncols) = matrix.dim();
            if matrix.is_empty() {
                let k_dim = nrows.min(ncols);
                return Ok(SVDOutput {
                    u: if compute_u { Some(Array2::zeros((nrows, k_dim))) } else { None },
                    s: Array1::zeros(k_dim),
                    vt: if compute_v { Some(Array2::zeros((k_dim, ncols))) } else { None },
                });
            }
            let faer_mat = ndarray_to_faer(&matrix);
            let svd_solver_instance = FaerSolverSvd::new_thin(faer_mat.as_ref())
                .map_err(|e| to_dyn_error_faer(format!("Faer SVD computation failed: {:?}", e)))?;

            let diag = svd_solver_instance.S();
            let s_ndarray = Array1::from_shape_fn(diag.dim(), |i| diag[i]);

            let u_ndarray = if compute_u {
                Some(faer_to_ndarray(svd_solver_instance.U()))
            } else { None };

            let vt_ndarray = if compute_v {
                Some(faer_to_ndarray(svd_solver_instance.V()).reversed_axes())
            } else { None };

            Ok(SVDOutput { u: u_ndarray, s: s_ndarray, vt: vt_ndarray })
        }
    }
}

#[cfg(feature = "backend_faer")]
pub use self::faer_specific_code::FaerLinAlgBackend;

/// A provider struct that dispatches to the selected linear algebra backend
/// based on compile-time feature flags.
#[derive(Debug, Default, Copy, Clone)]
pub struct LinAlgBackendProvider<F: 'static + Copy + Send + Sync> {
    _phantom: PhantomData<F>,
}

impl<F: 'static + Copy + Send + Sync> LinAlgBackendProvider<F> {
    pub fn new() -> Self {
        Self { _phantom: PhantomData }
    }
}

impl BackendSVD<f64> for LinAlgBackendProvider<f64> {
    fn svd_into(&self, matrix: Array2<f64>, compute_u: bool, compute_v: bool) -> Result<SVDOutput<f64>, Box<dyn Error + Send + Sync>> {
        #[cfg(feature = "backend_faer")]
        {
            faer_specific_code::FaerLinAlgBackend.svd_into(matrix, compute_u, compute_v)
        }
        #[cfg(not(feature = "backend_faer"))]
        {
            NdarrayLinAlgBackend.svd_into(matrix, compute_u, compute_v)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_provider_svd_reconstructs_input() {
        let a = array![[3.0, 1.0, 2.0], [0.0, 4.0, 1.0]];
        let out = LinAlgBackendProvider::<f64>::new()
            .svd_into(a.clone(), true, true)
            .unwrap();
        let u = out.u.unwrap();
        let vt = out.vt.unwrap();
        let r = out.s.len();
        let sigma = Array2::from_diag(&out.s);
        let rebuilt = u.slice(ndarray::s![.., ..r]).dot(&sigma).dot(&vt.slice(ndarray::s![..r, ..]));
        for (x, y) in rebuilt.iter().zip(a.iter()) {
            assert_abs_diff_eq!(x, y, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_provider_singular_values_descending() {
        let a = array![[1.0, 0.0], [0.0, 5.0], [0.0, 0.0]];
        let out = LinAlgBackendProvider::<f64>::new()
            .svd_into(a, false, false)
            .unwrap();
        assert_eq!(out.s.len(), 2);
        assert_abs_diff_eq!(out.s[0], 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out.s[1], 1.0, epsilon = 1e-12);
        assert!(out.u.is_none());
        assert!(out.vt.is_none());
    }
}
