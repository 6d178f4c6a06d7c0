//! Newton's method with free-dof reduction and PSD repair.

use ccd_types::CcdError;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::factorization::CscCholesky;
use nalgebra_sparse::{CooMatrix, CscMatrix};

use crate::problem::{BarrierProblem, UnconstrainedProblem};
use crate::results::OptimizationResults;

/// Newton solver for the inner minimization.
///
/// Fixed degrees of freedom are projected out by pinning their rows and
/// columns of the system, so their Newton direction is exactly zero. When
/// the computed direction is not a descent direction the Hessian is shifted
/// towards positive definiteness by [`make_matrix_positive_definite`].
#[derive(Debug, Clone)]
pub struct NewtonSolver {
    /// Iteration budget.
    pub max_iterations: usize,
    /// Convergence tolerance on the free-dof gradient norm.
    pub absolute_tolerance: f64,
    /// Smallest backtracking step before the line search gives up.
    pub min_step_length: f64,
}

impl Default for NewtonSolver {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            absolute_tolerance: 1e-8,
            min_step_length: 1e-12,
        }
    }
}

impl NewtonSolver {
    /// Minimize an unconstrained objective.
    pub fn minimize(&self, problem: &mut dyn UnconstrainedProblem) -> OptimizationResults {
        let x0 = problem.starting_point();
        let fixed = problem.is_dof_fixed().to_vec();
        self.run(
            problem,
            x0,
            &fixed,
            &mut |p, x| p.eval_f(x),
            &mut |p, x| p.eval_grad_f(x),
            &mut |p, x| p.eval_hessian_f(x),
            &mut |_, _, _| false,
        )
    }

    /// Minimize a barrier objective: the line search additionally rejects
    /// steps whose linear trajectory collides.
    pub fn minimize_with_collision_check(
        &self,
        problem: &mut dyn BarrierProblem,
    ) -> OptimizationResults {
        let x0 = problem.starting_point();
        let fixed = problem.is_dof_fixed().to_vec();
        self.run(
            problem,
            x0,
            &fixed,
            &mut |p, x| p.eval_f(x),
            &mut |p, x| p.eval_grad_f(x),
            &mut |p, x| p.eval_hessian_f(x),
            &mut |p, from, to| p.has_collisions(from, to),
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn run<P: ?Sized>(
        &self,
        problem: &mut P,
        x0: DVector<f64>,
        is_dof_fixed: &[bool],
        eval_f: &mut dyn FnMut(&mut P, &DVector<f64>) -> f64,
        eval_grad: &mut dyn FnMut(&mut P, &DVector<f64>) -> DVector<f64>,
        eval_hessian: &mut dyn FnMut(&mut P, &DVector<f64>) -> CscMatrix<f64>,
        collides: &mut dyn FnMut(&mut P, &DVector<f64>, &DVector<f64>) -> bool,
    ) -> OptimizationResults {
        let mut x = x0;
        let mut fx = eval_f(problem, &x);

        for iteration in 0..self.max_iterations {
            let mut gradient = eval_grad(problem, &x);
            for (i, &fixed) in is_dof_fixed.iter().enumerate() {
                if fixed {
                    gradient[i] = 0.0;
                }
            }
            if gradient.norm() <= self.absolute_tolerance {
                return OptimizationResults {
                    x,
                    minf: fx,
                    success: true,
                    iterations: iteration,
                };
            }

            let hessian = eval_hessian(problem, &x);
            let Some(direction) = self.compute_free_direction(&gradient, &hessian, is_dof_fixed)
            else {
                tracing::warn!(iteration, "Newton direction solve failed");
                return OptimizationResults::failure(x, fx, iteration);
            };

            // Backtracking line search; a barrier step must also be free of
            // collisions along the whole segment.
            let mut step = 1.0;
            let mut accepted = false;
            while step >= self.min_step_length {
                let candidate = &x + &direction * step;
                let f_candidate = eval_f(problem, &candidate);
                if f_candidate < fx && !collides(problem, &x, &candidate) {
                    x = candidate;
                    fx = f_candidate;
                    accepted = true;
                    break;
                }
                step *= 0.5;
            }
            if !accepted {
                tracing::warn!(iteration, "Newton line search failed to find a step");
                return OptimizationResults::failure(x, fx, iteration);
            }
        }

        OptimizationResults::failure(x, fx, self.max_iterations)
    }

    /// Newton direction `delta = -H^-1 g` over the free degrees of freedom,
    /// repairing the Hessian when `delta` is not a descent direction.
    fn compute_free_direction(
        &self,
        gradient: &DVector<f64>,
        hessian: &CscMatrix<f64>,
        is_dof_fixed: &[bool],
    ) -> Option<DVector<f64>> {
        let pinned = pin_fixed_dofs(hessian, is_dof_fixed);

        if let Some(direction) = solve_direction(&pinned, gradient) {
            if gradient.dot(&direction) < 0.0 {
                return Some(direction);
            }
        }

        let repaired = make_matrix_positive_definite(&pinned).ok()?;
        let direction = solve_direction(&repaired, gradient)?;
        (gradient.dot(&direction) < 0.0).then_some(direction)
    }
}

/// Pin fixed dofs: zero their rows and columns and put a unit on the
/// diagonal, so the solve returns zero displacement for them.
fn pin_fixed_dofs(hessian: &CscMatrix<f64>, is_dof_fixed: &[bool]) -> CscMatrix<f64> {
    let n = hessian.nrows();
    let mut coo = CooMatrix::new(n, n);
    for (i, j, v) in hessian.triplet_iter() {
        if is_dof_fixed[i] || is_dof_fixed[j] {
            continue;
        }
        coo.push(i, j, *v);
    }
    for (i, &fixed) in is_dof_fixed.iter().enumerate() {
        if fixed {
            coo.push(i, i, 1.0);
        }
    }
    CscMatrix::from(&coo)
}

fn solve_direction(hessian: &CscMatrix<f64>, gradient: &DVector<f64>) -> Option<DVector<f64>> {
    let chol = CscCholesky::factor(hessian).ok()?;
    let rhs = DMatrix::from_column_slice(gradient.len(), 1, (-gradient).as_slice());
    Some(DVector::from_column_slice(chol.solve(&rhs).as_slice()))
}

/// Shift the diagonal of `a` until it admits a Cholesky factorization.
///
/// The multiplier is grown geometrically until factorization succeeds, then
/// refined by bisection between the last failing and first succeeding
/// values, returning the repaired matrix with the smallest tried shift.
///
/// # Errors
///
/// [`CcdError::ConvergenceFailure`] when no shift within the search range
/// makes the matrix factorizable.
pub fn make_matrix_positive_definite(a: &CscMatrix<f64>) -> Result<CscMatrix<f64>, CcdError> {
    let n = a.nrows();
    let max_diag = (0..n)
        .filter_map(|i| a.get_entry(i, i).map(|e| e.into_value().abs()))
        .fold(1e-12_f64, f64::max);

    let shifted = |mu: f64| -> CscMatrix<f64> {
        let mut coo = CooMatrix::new(n, n);
        for (i, j, v) in a.triplet_iter() {
            coo.push(i, j, *v);
        }
        for i in 0..n {
            coo.push(i, i, mu);
        }
        CscMatrix::from(&coo)
    };
    let factorizes = |mu: f64| CscCholesky::factor(&shifted(mu)).is_ok();

    let mut hi = 1e-8 * max_diag;
    let mut tries = 0;
    while !factorizes(hi) {
        hi *= 10.0;
        tries += 1;
        if tries > 18 {
            return Err(CcdError::ConvergenceFailure {
                iterations: tries,
                residual: hi,
            });
        }
    }

    let mut lo = hi / 10.0;
    for _ in 0..8 {
        let mid = 0.5 * (lo + hi);
        if factorizes(mid) {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    Ok(shifted(hi))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra::dvector;

    /// 1/2 (x - target)' D (x - target) with a fixed middle dof.
    struct Quadratic {
        target: DVector<f64>,
        diag: DVector<f64>,
        fixed: Vec<bool>,
    }

    impl UnconstrainedProblem for Quadratic {
        fn num_vars(&self) -> usize {
            self.target.len()
        }

        fn starting_point(&self) -> DVector<f64> {
            DVector::zeros(self.target.len())
        }

        fn is_dof_fixed(&self) -> &[bool] {
            &self.fixed
        }

        fn eval_f(&mut self, x: &DVector<f64>) -> f64 {
            let d = x - &self.target;
            0.5 * d.component_mul(&self.diag).dot(&d)
        }

        fn eval_grad_f(&mut self, x: &DVector<f64>) -> DVector<f64> {
            (x - &self.target).component_mul(&self.diag)
        }

        fn eval_hessian_f(&mut self, _x: &DVector<f64>) -> CscMatrix<f64> {
            let n = self.target.len();
            let mut coo = CooMatrix::new(n, n);
            for i in 0..n {
                coo.push(i, i, self.diag[i]);
            }
            CscMatrix::from(&coo)
        }
    }

    #[test]
    fn converges_on_quadratic_and_respects_fixed_dofs() {
        let mut problem = Quadratic {
            target: dvector![1.0, 2.0, -3.0],
            diag: dvector![4.0, 2.0, 1.0],
            fixed: vec![false, true, false],
        };
        let solver = NewtonSolver::default();
        let results = solver.minimize(&mut problem);
        assert!(results.success);
        assert_abs_diff_eq!(results.x[0], 1.0, epsilon = 1e-8);
        assert_abs_diff_eq!(results.x[1], 0.0, epsilon = 1e-12); // pinned
        assert_abs_diff_eq!(results.x[2], -3.0, epsilon = 1e-8);
    }

    #[test]
    fn psd_repair_recovers_an_indefinite_matrix() {
        let mut coo = CooMatrix::new(2, 2);
        coo.push(0, 0, -1.0);
        coo.push(1, 1, 2.0);
        let indefinite = CscMatrix::from(&coo);
        assert!(CscCholesky::factor(&indefinite).is_err());
        let repaired = make_matrix_positive_definite(&indefinite).unwrap();
        assert!(CscCholesky::factor(&repaired).is_ok());
    }
}
