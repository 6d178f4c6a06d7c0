//! Constrained optimization for collision response.
//!
//! # Architecture
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                   BarrierNewtonSolver                         |
//! |  epsilon-continuation: solve, check distances, decay epsilon |
//! +-----------------------------+--------------------------------+
//!                               |
//!                               v
//! +--------------------------------------------------------------+
//! |                       NewtonSolver                            |
//! |  free-dof reduction, PSD repair, backtracking line search    |
//! |  (collision-aware when driving a barrier problem)            |
//! +--------------------------------------------------------------+
//!
//! +--------------------------------------------------------------+
//! |                        NcpSolver                              |
//! |  min 1/2 x'Ax - b'x  s.t.  g(x) >= 0,  lambda >= 0,          |
//! |  lambda' g(x) = 0  via an inner projected Gauss-Seidel LCP   |
//! +--------------------------------------------------------------+
//! ```
//!
//! Solvers depend on capability traits ([`UnconstrainedProblem`],
//! [`ConstrainedProblem`], [`BarrierProblem`]), not on a problem class
//! hierarchy: anything that can evaluate an objective, its derivatives and
//! a constraint set can be driven by them.
//!
//! Convergence failures are results, not errors: solvers return
//! `success = false` with the best iterate found and let the outer loop
//! decide. Only structural misuse (an unimplemented LCP backend, an
//! indefinite system matrix) surfaces as [`CcdError`].

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
)]

mod barrier;
mod lcp;
mod ncp;
mod newton;
mod problem;
mod results;

pub use barrier::BarrierNewtonSolver;
pub use lcp::lcp_gauss_seidel;
pub use ncp::{NcpResults, NcpSolver};
pub use newton::{make_matrix_positive_definite, NewtonSolver};
pub use problem::{BarrierProblem, ConstrainedProblem, UnconstrainedProblem};
pub use results::OptimizationResults;

pub use ccd_types::{CcdError, LcpSolverKind, NcpSettings, NcpUpdate};
