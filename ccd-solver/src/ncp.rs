//! Nonlinear complementarity solver.
//!
//! Solves `min 1/2 x'Ax - b'x` subject to `g(x) >= 0`, `lambda >= 0`,
//! `lambda' g(x) = 0`. The unconstrained minimizer `A^-1 b` is refined by
//! alternating an inner LCP in the multipliers with the kinematic update
//! `x = A^-1 (b + J' lambda)`, re-linearizing the constraints about the
//! current iterate.

use ccd_types::{CcdError, LcpSolverKind, NcpSettings, NcpUpdate};
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::factorization::CscCholesky;
use nalgebra_sparse::CscMatrix;

use crate::lcp::lcp_gauss_seidel;
use crate::problem::ConstrainedProblem;

/// Penalty weight of the infeasibility term in the line-search merit.
const MERIT_PENALTY: f64 = 100.0;

/// Step floor of the merit line search.
const MIN_LINE_SEARCH_STEP: f64 = 1e-10;

/// Result of an NCP solve.
#[derive(Debug, Clone, PartialEq)]
pub struct NcpResults {
    /// Best primal iterate.
    pub x: DVector<f64>,
    /// Multipliers at the best iterate.
    pub lambda: DVector<f64>,
    /// True iff the stationarity + complementarity residual met tolerance.
    pub success: bool,
    /// Outer iterations performed.
    pub iterations: usize,
}

/// The NCP solver; see [`NcpSettings`] for the configuration knobs.
#[derive(Debug, Clone, Default)]
pub struct NcpSolver {
    /// Solver configuration.
    pub settings: NcpSettings,
}

impl NcpSolver {
    /// Create a solver from settings.
    #[must_use]
    pub fn new(settings: NcpSettings) -> Self {
        Self { settings }
    }

    /// Solve the complementarity problem for the quadratic energy
    /// `1/2 x'Ax - b'x` and the problem's constraint set.
    ///
    /// Iteration exhaustion is not an error: the result carries
    /// `success = false` and the best iterate, and the caller decides.
    ///
    /// # Errors
    ///
    /// [`CcdError::NotImplemented`] when the configured LCP backend is not
    /// shipped, [`CcdError::InvalidInput`] when `A` has no Cholesky
    /// factorization.
    pub fn solve_ncp(
        &self,
        a: &CscMatrix<f64>,
        b: &DVector<f64>,
        problem: &mut dyn ConstrainedProblem,
    ) -> Result<NcpResults, CcdError> {
        if self.settings.lcp_solver == LcpSolverKind::Mosek {
            return Err(CcdError::not_implemented("MOSEK LCP backend"));
        }

        let chol = CscCholesky::factor(a).map_err(|_| {
            CcdError::invalid_input("NCP system matrix is not positive definite")
        })?;

        let tol = self.settings.convergence_tolerance;
        let x_unconstrained = solve_vec(&chol, b);
        let mut x = x_unconstrained.clone();
        let mut lambda = DVector::zeros(problem.num_constraints());

        let mut best_residual = f64::INFINITY;
        let mut best = (x.clone(), lambda.clone());

        for iteration in 0..self.settings.max_iterations {
            let g = problem.eval_g(&x);
            let jac = problem.eval_jac_g(&x);
            if g.len() != lambda.len() {
                // The active candidate set changed size; restart multipliers.
                lambda = DVector::zeros(g.len());
            }

            let residual = ncp_residual(a, b, &jac, &lambda, &g, &x);
            if residual < best_residual {
                best_residual = residual;
                best = (x.clone(), lambda.clone());
            }
            if residual < tol {
                return Ok(NcpResults {
                    x,
                    lambda,
                    success: true,
                    iterations: iteration,
                });
            }

            // LCP in the multipliers: g(x(lambda)) ~ M lambda + q with
            // M = J A^-1 J'.
            let a_inv_jt = solve_mat(&chol, &jac.transpose());
            let m = &jac * &a_inv_jt;

            let (lambda_new, x_target) = match self.settings.update_type {
                NcpUpdate::Linearized => {
                    // Re-linearize about the current iterate: with
                    // x(lambda) = A^-1 (b + J' lambda),
                    // g(x(lambda)) ~ M lambda + g(x) - J (x - A^-1 b).
                    let q = &g - &jac * (&x - &x_unconstrained);
                    let lambda_new = self.solve_lcp(&m, &q, &lambda, &g);
                    let x_target = solve_vec(&chol, &(b + jac.transpose() * &lambda_new));
                    (lambda_new, x_target)
                }
                NcpUpdate::GGradient => {
                    // Incremental step along the constraint gradient at the
                    // current iterate: x += A^-1 J' alpha.
                    let alpha = self.solve_lcp(&m, &g, &DVector::zeros(g.len()), &g);
                    let x_target = &x + &a_inv_jt * &alpha;
                    ((&lambda + alpha).map(|l| l.max(0.0)), x_target)
                }
            };

            if self.settings.do_line_search {
                let merit = |x: &DVector<f64>, problem: &mut dyn ConstrainedProblem| {
                    let infeasibility: f64 = problem
                        .eval_g(x)
                        .iter()
                        .map(|gi| gi.min(0.0) * gi.min(0.0))
                        .sum();
                    0.5 * (a * x - b).norm_squared() + MERIT_PENALTY * infeasibility
                };
                let merit_now = merit(&x, problem);
                let direction = &x_target - &x;
                let mut step = 1.0;
                while step >= MIN_LINE_SEARCH_STEP {
                    let candidate = &x + &direction * step;
                    if merit(&candidate, problem) < merit_now {
                        x = candidate;
                        break;
                    }
                    step *= 0.5;
                }
                // A fully rejected step keeps x; the multiplier update
                // still changes the next linearization.
            } else {
                x = x_target;
            }
            lambda = lambda_new;
        }

        tracing::warn!(
            max_iterations = self.settings.max_iterations,
            residual = best_residual,
            "NCP solver exhausted its iteration budget"
        );
        Ok(NcpResults {
            x: best.0,
            lambda: best.1,
            success: false,
            iterations: self.settings.max_iterations,
        })
    }

    /// Run the inner LCP, optionally restricted to the active constraints.
    fn solve_lcp(
        &self,
        m: &DMatrix<f64>,
        q: &DVector<f64>,
        warm_start: &DVector<f64>,
        g: &DVector<f64>,
    ) -> DVector<f64> {
        let n = q.len();
        let sweeps = self.settings.max_iterations.max(100);

        if !self.settings.solve_for_active_cstr {
            return lcp_gauss_seidel(m, q, warm_start, sweeps);
        }

        // Active constraints: violated now, or already carrying force.
        let active: Vec<usize> = (0..n)
            .filter(|&i| g[i] <= 0.0 || warm_start[i] > 0.0)
            .collect();
        let m_active = DMatrix::from_fn(active.len(), active.len(), |r, c| {
            m[(active[r], active[c])]
        });
        let q_active = DVector::from_fn(active.len(), |r, _| q[active[r]]);
        let warm_active = DVector::from_fn(active.len(), |r, _| warm_start[active[r]]);

        let lambda_active = lcp_gauss_seidel(&m_active, &q_active, &warm_active, sweeps);
        let mut lambda = DVector::zeros(n);
        for (k, &i) in active.iter().enumerate() {
            lambda[i] = lambda_active[k];
        }
        lambda
    }
}

/// `||Ax - b - J' lambda|| + ||min(lambda, g)||`, the stationarity plus
/// complementarity residual of the KKT system.
fn ncp_residual(
    a: &CscMatrix<f64>,
    b: &DVector<f64>,
    jac: &DMatrix<f64>,
    lambda: &DVector<f64>,
    g: &DVector<f64>,
    x: &DVector<f64>,
) -> f64 {
    let stationarity = (a * x - b - jac.transpose() * lambda).norm();
    let complementarity = DVector::from_fn(g.len(), |i, _| lambda[i].min(g[i])).norm();
    stationarity + complementarity
}

fn solve_vec(chol: &CscCholesky<f64>, v: &DVector<f64>) -> DVector<f64> {
    let b = DMatrix::from_column_slice(v.len(), 1, v.as_slice());
    DVector::from_column_slice(chol.solve(&b).as_slice())
}

fn solve_mat(chol: &CscCholesky<f64>, m: &DMatrix<f64>) -> DMatrix<f64> {
    chol.solve(m)
}
