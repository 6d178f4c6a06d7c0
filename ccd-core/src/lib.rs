//! Continuous collision detection and barrier pipeline.
//!
//! # Architecture
//!
//! ```text
//! integrator -> candidate pose pair
//!                      |
//!                      v
//! +-------------------------------------------------------------+
//! |  Broad phase (broad_phase)                                  |
//! |  swept AABBs -> hash grid / brute force -> candidate pairs  |
//! +-----------------------------+-------------------------------+
//!                               v
//! +-------------------------------------------------------------+
//! |  Narrow phase (narrow_phase, rigid_toi)                     |
//! |  certified interval root finding per candidate -> impacts   |
//! +-----------------------------+-------------------------------+
//!                               v
//! +-------------------------------------------------------------+
//! |  Impact processing (impacts)                                |
//! |  time sort -> EV to EE lifting -> per-edge pruning          |
//! +-----------------------------+-------------------------------+
//!                               v
//! +-------------------------------------------------------------+
//! |  Volume & barrier kernels (volume, barrier)                 |
//! |  interference volumes, distance barriers, autodiff          |
//! +-----------------------------+-------------------------------+
//!                               v
//! |  Optimization problems (problems) driven by ccd-solver      |
//! ```
//!
//! The flat pipeline (piecewise-linear vertex trajectories, 2D) is exposed
//! through [`State`]; the rigid-body pipeline (screwing trajectories)
//! through [`RigidBody`], [`RigidBodyAssembler`] and the
//! [`problems::DistanceBarrierRbProblem`].
//!
//! All result buffers are step-scoped: reconstructed from scratch on every
//! integration attempt, immutable once computed.

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
)]

mod aabb;
mod assembler;
pub mod barrier;
pub mod broad_phase;
pub mod impacts;
pub mod narrow_phase;
pub mod problems;
mod rigid_body;
pub mod rigid_toi;
mod scene;
mod state;
pub mod stepper;
pub mod volume;

pub use aabb::Aabb;
pub use assembler::RigidBodyAssembler;
pub use barrier::{DistanceBarrier, DistanceBarrierConstraint};
pub use broad_phase::{detect_collision_candidates, CandidateSet, HashGrid};
pub use rigid_body::RigidBody;
pub use rigid_toi::{detect_rigid_body_collisions, RigidBodyImpacts};
pub use scene::SceneFile;
pub use state::State;

pub use ccd_types::{
    CcdError, DetectionMethod, EdgeEdgeCandidate, EdgeEdgeImpact, EdgeVertexCandidate,
    EdgeVertexImpact, FaceVertexCandidate, FaceVertexImpact, Pose, NO_IMPACT,
};
