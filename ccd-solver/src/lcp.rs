//! Projected Gauss-Seidel solver for linear complementarity problems.

use nalgebra::{DMatrix, DVector};

/// Solve `0 <= lambda  PERP  M lambda + q >= 0` by projected Gauss-Seidel.
///
/// Performs at most `max_iterations` sweeps; each entry is updated by the
/// projected residual rule
/// `lambda_i <- max(0, lambda_i - (M lambda + q)_i / M_ii)`.
/// Rows with a vanishing diagonal are left untouched (a regularized `M`
/// from `J A^-1 J^T` has positive diagonals for independent constraints).
///
/// Starts from `lambda_0` to support warm starting by the NCP outer loop.
///
/// # Example
///
/// ```
/// use ccd_solver::lcp_gauss_seidel;
/// use nalgebra::{dvector, DMatrix, DVector};
///
/// let m = DMatrix::identity(2, 2);
/// let q = dvector![-1.0, 2.0];
/// let lambda = lcp_gauss_seidel(&m, &q, &DVector::zeros(2), 50);
/// // The violated row is clamped up, the satisfied row stays at zero.
/// assert!((lambda[0] - 1.0).abs() < 1e-12);
/// assert_eq!(lambda[1], 0.0);
/// ```
#[must_use]
pub fn lcp_gauss_seidel(
    m: &DMatrix<f64>,
    q: &DVector<f64>,
    lambda_0: &DVector<f64>,
    max_iterations: usize,
) -> DVector<f64> {
    let n = q.len();
    debug_assert_eq!(m.nrows(), n);
    debug_assert_eq!(m.ncols(), n);

    let mut lambda = lambda_0.clone();
    for _ in 0..max_iterations {
        let mut largest_change: f64 = 0.0;
        for i in 0..n {
            let diag = m[(i, i)];
            if diag.abs() < f64::EPSILON {
                continue;
            }
            let residual = m.row(i).transpose().dot(&lambda) + q[i];
            let updated = (lambda[i] - residual / diag).max(0.0);
            largest_change = largest_change.max((updated - lambda[i]).abs());
            lambda[i] = updated;
        }
        if largest_change < 1e-14 {
            break;
        }
    }
    lambda
}
