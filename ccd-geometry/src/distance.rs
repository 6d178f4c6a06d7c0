//! Signed distances and parametric projections.

use ccd_math::Scalar;
use nalgebra::DVector;

/// 2D scalar cross product `a.x * b.y - a.y * b.x`.
#[must_use]
pub fn cross2<S: Scalar>(a: &DVector<S>, b: &DVector<S>) -> S {
    debug_assert_eq!(a.len(), 2);
    debug_assert_eq!(b.len(), 2);
    a[0].clone() * b[1].clone() - a[1].clone() * b[0].clone()
}

/// 3D cross product.
#[must_use]
pub fn cross3<S: Scalar>(a: &DVector<S>, b: &DVector<S>) -> DVector<S> {
    debug_assert_eq!(a.len(), 3);
    debug_assert_eq!(b.len(), 3);
    DVector::from_vec(vec![
        a[1].clone() * b[2].clone() - a[2].clone() * b[1].clone(),
        a[2].clone() * b[0].clone() - a[0].clone() * b[2].clone(),
        a[0].clone() * b[1].clone() - a[1].clone() * b[0].clone(),
    ])
}

/// Signed distance from a point to the infinite line through an edge (2D).
///
/// Unnormalized: proportional to the true distance by the edge length, with
/// the sign of the side of the line. Zero exactly at collinearity, which is
/// all the root finder needs.
#[must_use]
pub fn point_line_signed_distance<S: Scalar>(
    point: &DVector<S>,
    edge_vertex0: &DVector<S>,
    edge_vertex1: &DVector<S>,
) -> S {
    let edge = edge_vertex1 - edge_vertex0;
    let to_point = point - edge_vertex0;
    cross2(&edge, &to_point)
}

/// Signed distance between two infinite lines (3D).
///
/// The scalar triple product `(b0 - a0) . ((a1 - a0) x (b1 - b0))`:
/// proportional to the true line-line distance, zero iff the lines are
/// coplanar (touching or crossing).
#[must_use]
pub fn line_line_signed_distance<S: Scalar>(
    edge_a_vertex0: &DVector<S>,
    edge_a_vertex1: &DVector<S>,
    edge_b_vertex0: &DVector<S>,
    edge_b_vertex1: &DVector<S>,
) -> S {
    let dir_a = edge_a_vertex1 - edge_a_vertex0;
    let dir_b = edge_b_vertex1 - edge_b_vertex0;
    let separation = edge_b_vertex0 - edge_a_vertex0;
    separation.dot(&cross3(&dir_a, &dir_b))
}

/// Signed distance from a point to the plane with the given (possibly
/// unnormalized) normal through `plane_point`.
#[must_use]
pub fn point_plane_signed_distance<S: Scalar>(
    point: &DVector<S>,
    plane_point: &DVector<S>,
    normal: &DVector<S>,
) -> S {
    (point - plane_point).dot(normal)
}

/// Parametric position of the projection of `point` onto the line through
/// the edge: `alpha = (p - e0) . e / (e . e)`.
#[must_use]
pub fn project_point_on_line_alpha<S: Scalar>(
    point: &DVector<S>,
    edge_vertex0: &DVector<S>,
    edge_vertex1: &DVector<S>,
) -> S {
    let edge = edge_vertex1 - edge_vertex0;
    let to_point = point - edge_vertex0;
    to_point.dot(&edge) / edge.dot(&edge)
}

/// Barycentric coordinates `(u, v)` of a point with respect to a triangle:
/// `p ~ f0 + u (f1 - f0) + v (f2 - f0)`.
#[must_use]
pub fn barycentric_coordinates<S: Scalar>(
    point: &DVector<S>,
    face_vertex0: &DVector<S>,
    face_vertex1: &DVector<S>,
    face_vertex2: &DVector<S>,
) -> (S, S) {
    let v0 = face_vertex1 - face_vertex0;
    let v1 = face_vertex2 - face_vertex0;
    let v2 = point - face_vertex0;
    let d00 = v0.dot(&v0);
    let d01 = v0.dot(&v1);
    let d11 = v1.dot(&v1);
    let d20 = v2.dot(&v0);
    let d21 = v2.dot(&v1);
    let denom = d00.clone() * d11.clone() - d01.square();
    let u = (d11 * d20.clone() - d01.clone() * d21.clone()) / denom.clone();
    let v = (d00 * d21 - d01 * d20) / denom;
    (u, v)
}

/// Line parameters `(t, u)` of the mutually closest points of two segments'
/// carrier lines: the closest point on line A is `a0 + t (a1 - a0)`, on
/// line B `b0 + u (b1 - b0)`. Callers guard against parallel lines.
#[must_use]
pub fn segment_segment_parameters<S: Scalar>(
    edge_a_vertex0: &DVector<S>,
    edge_a_vertex1: &DVector<S>,
    edge_b_vertex0: &DVector<S>,
    edge_b_vertex1: &DVector<S>,
) -> (S, S) {
    let r = edge_a_vertex1 - edge_a_vertex0;
    let s = edge_b_vertex1 - edge_b_vertex0;
    let separation = edge_b_vertex0 - edge_a_vertex0;
    let r_cross_s = cross3(&r, &s);
    let r_cross_s_sq = r_cross_s.dot(&r_cross_s);
    let t = cross3(&separation, &s).dot(&r_cross_s) / r_cross_s_sq.clone();
    let u = cross3(&separation, &r).dot(&r_cross_s) / r_cross_s_sq;
    (t, u)
}

/// Euclidean distance from a point to a segment (projection clamped to the
/// endpoints). Differentiable through any scalar; the clamp branches on the
/// primal value exactly like the scalar implementation would.
///
/// # Example
///
/// ```
/// use ccd_geometry::point_segment_distance;
/// use nalgebra::dvector;
///
/// let d = point_segment_distance(
///     &dvector![0.0, 2.0],
///     &dvector![-1.0, 0.0],
///     &dvector![1.0, 0.0],
/// );
/// assert!((d - 2.0_f64).abs() < 1e-12);
///
/// // Past an endpoint the projection clamps to it.
/// let d = point_segment_distance(
///     &dvector![4.0, 4.0],
///     &dvector![-1.0, 0.0],
///     &dvector![1.0, 0.0],
/// );
/// assert!((d - 5.0_f64).abs() < 1e-12);
/// ```
#[must_use]
pub fn point_segment_distance<S: Scalar>(
    point: &DVector<S>,
    edge_vertex0: &DVector<S>,
    edge_vertex1: &DVector<S>,
) -> S {
    let alpha = project_point_on_line_alpha(point, edge_vertex0, edge_vertex1);
    let alpha = if alpha.value() <= 0.0 {
        S::zero()
    } else if alpha.value() >= 1.0 {
        S::one()
    } else {
        alpha
    };
    let edge = edge_vertex1 - edge_vertex0;
    let closest = edge_vertex0 + edge * alpha;
    let diff = point - &closest;
    diff.dot(&diff).sqrt()
}
