//! Geometric kernel for continuous collision detection.
//!
//! Signed distances, normals and containment predicates, written once and
//! instantiated over every CCD scalar ([`f64`], intervals, duals). The
//! narrow phase feeds these through the certified root finder; the barrier
//! kernels differentiate them with dual numbers.
//!
//! Distance functions are *signed but unnormalized* where only the zero set
//! matters (root finding); the clamped [`point_segment_distance`] used by
//! the barrier constraint is a true Euclidean distance.

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Generic-scalar kernels can't be const
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
)]

mod distance;
mod inside;
mod normal;

pub use distance::{
    barycentric_coordinates, cross2, cross3, line_line_signed_distance,
    point_line_signed_distance, point_plane_signed_distance, point_segment_distance,
    project_point_on_line_alpha, segment_segment_parameters,
};
pub use inside::{are_segments_intersecting, is_point_along_segment, is_point_inside_triangle};
pub use normal::{segment_normal, triangle_normal};
