//! Optimization result records.

use nalgebra::DVector;

/// Outcome of a solve: the best iterate found, its objective value and
/// whether the termination criterion was met within the iteration budget.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationResults {
    /// Best iterate.
    pub x: DVector<f64>,
    /// Objective value at the best iterate.
    pub minf: f64,
    /// True iff the solver converged.
    pub success: bool,
    /// Iterations performed.
    pub iterations: usize,
}

impl OptimizationResults {
    /// A failed result carrying the best-so-far iterate.
    #[must_use]
    pub fn failure(x: DVector<f64>, minf: f64, iterations: usize) -> Self {
        Self {
            x,
            minf,
            success: false,
            iterations,
        }
    }
}
