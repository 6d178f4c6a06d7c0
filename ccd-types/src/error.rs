//! The typed failure enum of the core boundary.

use thiserror::Error;

/// Errors surfaced by the CCD and optimization core.
///
/// Ordinary "no collision" outcomes are booleans, never errors; only
/// structural failures reach this enum and terminate the current step.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CcdError {
    /// Edge direction length fell below tolerance during volume evaluation.
    #[error("degenerate edge: length {length:.3e} below tolerance {tolerance:.3e}")]
    DegenerateEdge {
        /// Measured edge length at the time of impact.
        length: f64,
        /// The degeneracy tolerance that was violated.
        tolerance: f64,
    },

    /// A code path that is deliberately not implemented.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// An inner solver exhausted its iteration budget.
    #[error("solver failed to converge after {iterations} iterations (residual {residual:.3e})")]
    ConvergenceFailure {
        /// Iterations performed before giving up.
        iterations: usize,
        /// Residual at the best iterate.
        residual: f64,
    },

    /// Malformed input rejected at the I/O boundary.
    #[error("invalid input: {reason}")]
    InvalidInput {
        /// Description of what was malformed.
        reason: String,
    },
}

impl CcdError {
    /// Create a [`CcdError::NotImplemented`].
    #[must_use]
    pub fn not_implemented(what: impl Into<String>) -> Self {
        Self::NotImplemented(what.into())
    }

    /// Create an [`CcdError::InvalidInput`].
    #[must_use]
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    /// Check if this is a degenerate-edge failure.
    #[must_use]
    pub fn is_degenerate_edge(&self) -> bool {
        matches!(self, Self::DegenerateEdge { .. })
    }

    /// Check if this is a not-implemented failure.
    #[must_use]
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, Self::NotImplemented(_))
    }
}
