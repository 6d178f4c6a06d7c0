//! Capability traits the solvers are written against.

use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CscMatrix;

/// A smooth objective over a dof vector.
///
/// Methods take `&mut self` because realistic problems cache candidate sets
/// and scratch buffers between evaluations of the same iterate.
pub trait UnconstrainedProblem {
    /// Number of optimization variables.
    fn num_vars(&self) -> usize;

    /// The iterate the solver starts from.
    fn starting_point(&self) -> DVector<f64>;

    /// Mask of degrees of freedom that must not move.
    fn is_dof_fixed(&self) -> &[bool];

    /// Objective value.
    fn eval_f(&mut self, x: &DVector<f64>) -> f64;

    /// Objective gradient.
    fn eval_grad_f(&mut self, x: &DVector<f64>) -> DVector<f64>;

    /// Objective Hessian (sparse, symmetric).
    fn eval_hessian_f(&mut self, x: &DVector<f64>) -> CscMatrix<f64>;
}

/// Adds an inequality constraint set `g(x) >= 0` and trajectory collision
/// probing.
pub trait ConstrainedProblem: UnconstrainedProblem {
    /// Number of constraints at the current iterate (the active candidate
    /// set may change between iterates).
    fn num_constraints(&mut self) -> usize;

    /// Constraint values.
    fn eval_g(&mut self, x: &DVector<f64>) -> DVector<f64>;

    /// Constraint Jacobian, one row per constraint.
    fn eval_jac_g(&mut self, x: &DVector<f64>) -> DMatrix<f64>;

    /// Does the linear trajectory from `x_i` to `x_j` produce a collision?
    ///
    /// Backed by the narrow phase; used by line searches to reject steps
    /// that tunnel through geometry.
    fn has_collisions(&mut self, x_i: &DVector<f64>, x_j: &DVector<f64>) -> bool;
}

/// A constrained problem whose objective carries a smooth distance barrier
/// with a tunable activation distance.
pub trait BarrierProblem: ConstrainedProblem {
    /// Current barrier activation distance.
    fn barrier_epsilon(&self) -> f64;

    /// Update the barrier activation distance (continuation step).
    fn set_barrier_epsilon(&mut self, epsilon: f64);

    /// Minimum distance over the candidate pairs at `x`, `None` when there
    /// are no candidates.
    fn min_distance(&mut self, x: &DVector<f64>) -> Option<f64>;
}
