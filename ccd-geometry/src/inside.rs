//! Containment predicates over interval enclosures.
//!
//! These predicates answer "is the closest-feature pair actually within the
//! primitive?" for the narrow phase. They are *possibly*-inclusive: `true`
//! whenever containment cannot be excluded on the interval, `false` only
//! when it certainly fails. The root finder prunes with them, so the
//! conservative direction is to keep.

use ccd_math::Interval;
use nalgebra::DVector;

use crate::distance::{
    barycentric_coordinates, cross3, project_point_on_line_alpha, segment_segment_parameters,
};

/// Can the projection of the point onto the edge's line fall inside the
/// segment (`alpha` possibly in `[0, 1]`)?
#[must_use]
pub fn is_point_along_segment(
    point: &DVector<Interval>,
    edge_vertex0: &DVector<Interval>,
    edge_vertex1: &DVector<Interval>,
) -> bool {
    let alpha = project_point_on_line_alpha(point, edge_vertex0, edge_vertex1);
    alpha.possibly_ge(0.0) && alpha.possibly_le(1.0)
}

/// Can two segments intersect (both line parameters possibly in `[0, 1]`)?
///
/// Parallel and collinear pairs (cross product possibly zero) are rejected;
/// those configurations are degenerate for the edge-edge distance root and
/// are covered by the adjacent edge-vertex impacts instead.
#[must_use]
pub fn are_segments_intersecting(
    edge_a_vertex0: &DVector<Interval>,
    edge_a_vertex1: &DVector<Interval>,
    edge_b_vertex0: &DVector<Interval>,
    edge_b_vertex1: &DVector<Interval>,
) -> bool {
    let r = edge_a_vertex1 - edge_a_vertex0;
    let s = edge_b_vertex1 - edge_b_vertex0;
    let r_cross_s = cross3(&r, &s);
    if r_cross_s.dot(&r_cross_s).zero_in() {
        return false;
    }

    // Parameters of the mutually closest points of the two lines; at a root
    // of the coplanarity distance these are the intersection parameters.
    let (t, u) = segment_segment_parameters(
        edge_a_vertex0,
        edge_a_vertex1,
        edge_b_vertex0,
        edge_b_vertex1,
    );
    t.possibly_ge(0.0) && t.possibly_le(1.0) && u.possibly_ge(0.0) && u.possibly_le(1.0)
}

/// Can the point lie inside the triangle (barycentric coordinates possibly
/// all non-negative and summing to at most one)?
#[must_use]
pub fn is_point_inside_triangle(
    point: &DVector<Interval>,
    face_vertex0: &DVector<Interval>,
    face_vertex1: &DVector<Interval>,
    face_vertex2: &DVector<Interval>,
) -> bool {
    // A degenerate-triangle enclosure divides by a zero-containing
    // interval, yielding the entire line for (u, v); containment is then
    // not excluded and the predicate conservatively keeps.
    let (u, v) = barycentric_coordinates(point, face_vertex0, face_vertex1, face_vertex2);
    u.possibly_ge(0.0) && v.possibly_ge(0.0) && (u + v).possibly_le(1.0)
}
