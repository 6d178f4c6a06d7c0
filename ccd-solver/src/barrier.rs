//! Barrier-Newton outer solver.

use ccd_types::BarrierSolverSettings;

use crate::newton::NewtonSolver;
use crate::problem::BarrierProblem;
use crate::results::OptimizationResults;

/// Epsilon-continuation driving a [`BarrierProblem`].
///
/// Each epoch minimizes the barrier-augmented objective with the inner
/// Newton solver (whose line search rejects colliding steps), then decays
/// the barrier activation distance by a constant factor as long as the
/// solve converged with a strictly positive minimum distance. The
/// continuation stops at the terminal epsilon `e_b`, on a failed epoch, or
/// when the epoch budget runs out.
#[derive(Debug, Clone)]
pub struct BarrierNewtonSolver {
    /// The inner Newton solver.
    pub inner: NewtonSolver,
    /// Terminal barrier activation distance.
    pub min_epsilon: f64,
    /// Epsilon decay divisor per epoch (> 1).
    pub epsilon_decay: f64,
    /// Epoch budget.
    pub max_epochs: usize,
}

impl Default for BarrierNewtonSolver {
    fn default() -> Self {
        Self::from_settings(&BarrierSolverSettings::default())
    }
}

impl BarrierNewtonSolver {
    /// Configure from the `barrier_solver` settings block.
    #[must_use]
    pub fn from_settings(settings: &BarrierSolverSettings) -> Self {
        Self {
            inner: NewtonSolver::default(),
            min_epsilon: settings.e_b,
            epsilon_decay: settings.t_inc.max(1.0 + 1e-6),
            max_epochs: settings.max_iterations,
        }
    }

    /// Run the continuation from the problem's current epsilon.
    pub fn solve(&self, problem: &mut dyn BarrierProblem) -> OptimizationResults {
        let mut results = self.inner.minimize_with_collision_check(problem);

        for _epoch in 0..self.max_epochs {
            if !results.success {
                tracing::warn!(
                    epsilon = problem.barrier_epsilon(),
                    "barrier epoch did not converge; stopping continuation"
                );
                break;
            }
            match problem.min_distance(&results.x) {
                Some(d) if d <= 0.0 => {
                    tracing::warn!(
                        min_distance = d,
                        "non-positive minimum distance; stopping continuation"
                    );
                    break;
                }
                _ => {}
            }
            let epsilon = problem.barrier_epsilon() / self.epsilon_decay;
            if epsilon < self.min_epsilon {
                break;
            }
            problem.set_barrier_epsilon(epsilon);
            tracing::debug!(epsilon, "barrier continuation epoch");
            results = self.inner.minimize_with_collision_check(problem);
        }

        results
    }
}
