//! Edge and face normals.

use ccd_math::Scalar;
use nalgebra::DVector;

use crate::distance::cross3;

/// Counterclockwise normal of a 2D segment.
///
/// With `normalized = false` the magnitude equals the segment length.
#[must_use]
pub fn segment_normal<S: Scalar>(
    segment_start: &DVector<S>,
    segment_end: &DVector<S>,
    normalized: bool,
) -> DVector<S> {
    let direction = segment_end - segment_start;
    let normal = DVector::from_vec(vec![-direction[1].clone(), direction[0].clone()]);
    if normalized {
        let length = normal.dot(&normal).sqrt();
        normal / length
    } else {
        normal
    }
}

/// Normal of a triangle from its vertices in order.
///
/// With `normalized = false` the magnitude equals twice the triangle area,
/// which is what the face-vertex distance function wants.
#[must_use]
pub fn triangle_normal<S: Scalar>(
    face_vertex0: &DVector<S>,
    face_vertex1: &DVector<S>,
    face_vertex2: &DVector<S>,
    normalized: bool,
) -> DVector<S> {
    let normal = cross3(
        &(face_vertex1 - face_vertex0),
        &(face_vertex2 - face_vertex0),
    );
    if normalized {
        let length = normal.dot(&normal).sqrt();
        normal / length
    } else {
        normal
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::dvector;

    #[test]
    fn segment_normal_is_perpendicular() {
        let n = segment_normal(&dvector![0.0, 0.0], &dvector![2.0, 0.0], true);
        assert_relative_eq!(n[0], 0.0);
        assert_relative_eq!(n[1], 1.0);
    }

    #[test]
    fn triangle_normal_right_hand_rule() {
        let n = triangle_normal(
            &dvector![0.0, 0.0, 0.0],
            &dvector![1.0, 0.0, 0.0],
            &dvector![0.0, 1.0, 0.0],
            false,
        );
        assert_relative_eq!(n[2], 1.0); // area 0.5, doubled
    }
}
