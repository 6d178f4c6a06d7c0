//! Core data types for the continuous collision detection pipeline.
//!
//! This crate provides the common language between the broad phase, the
//! narrow phase, the barrier kernels and the optimizers:
//!
//! - [`Pose`] - rigid pose (translation + rotation vector), generic over the
//!   CCD scalar so trajectories can be evaluated with intervals and duals
//! - [`EdgeVertexImpact`] / [`EdgeEdgeImpact`] / [`FaceVertexImpact`] -
//!   canonical impact records
//! - [`EdgeVertexCandidate`] / [`EdgeEdgeCandidate`] / [`FaceVertexCandidate`] -
//!   broad-phase output, indices only
//! - [`DetectionMethod`] - broad-phase algorithm selection
//! - settings structs mirroring the JSON configuration layout
//! - [`CcdError`] - the typed failure enum of the core boundary
//!
//! # Design Philosophy
//!
//! These types are **pure data**: no collision detection, no optimization,
//! no I/O. Impact records are immutable once computed and step-scoped; the
//! pipeline rematerializes them on every integration attempt.

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
)]

mod candidates;
mod config;
mod error;
mod impacts;
mod pose;

pub use candidates::{EdgeEdgeCandidate, EdgeVertexCandidate, FaceVertexCandidate};
pub use config::{
    BarrierSolverSettings, DetectionMethod, DistanceBarrierSettings, LcpSolverKind, NcpSettings,
    NcpUpdate, ProblemSettings, RigidBodyProblemSettings,
};
pub use error::CcdError;
pub use impacts::{EdgeEdgeImpact, EdgeVertexImpact, FaceVertexImpact};
pub use pose::Pose;

/// Sentinel in `edge_impact_map` for an edge with no recorded impact.
pub const NO_IMPACT: isize = -1;
