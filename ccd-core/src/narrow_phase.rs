//! Narrow-phase time of impact for piecewise-linear trajectories (2D).
//!
//! Two interchangeable solvers for the edge-vertex case:
//!
//! - [`compute_edge_vertex_time_of_impact`]: the certified interval path.
//!   The trajectory `x(t) = x + t u` is evaluated over interval time, the
//!   collinearity distance is fed to the certified root finder, and the
//!   conservative impact time is the lower bound of the returned enclosure.
//! - [`compute_edge_vertex_time_of_impact_quadratic`]: the closed-form
//!   path. Collinearity of point and edge is a quadratic in `t`; solving it
//!   through any [`Scalar`] makes the impact time itself differentiable,
//!   which is what the interference-volume gradients consume.
//!
//! Both must agree within the CCD tolerance (tested).

use ccd_geometry::{cross2, is_point_along_segment, point_line_signed_distance,
    project_point_on_line_alpha};
use ccd_math::{interval_root_finder, Interval, Scalar};
use ccd_types::{DetectionMethod, EdgeVertexImpact};
use nalgebra::{DMatrix, DVector};

use crate::broad_phase::{detect_collision_candidates, GroupIds};

/// Default root-finding tolerance on the time enclosure width.
pub const DEFAULT_CCD_TOLERANCE: f64 = 1e-8;

/// Coefficient threshold below which a polynomial term is treated as zero.
const COEFF_EPSILON: f64 = 1e-12;

/// Slack admitted on the `t` and `alpha` unit ranges by the closed-form
/// path, compensating rounding in the coefficient assembly.
const RANGE_EPSILON: f64 = 1e-9;

fn at_time<S: Scalar>(position: &DVector<S>, displacement: &DVector<S>, t: &S) -> DVector<S> {
    position + displacement * t.clone()
}

/// Certified interval time of impact between a moving vertex and a moving
/// edge. Returns `(toi, alpha)` with the conservative `toi` and the
/// parametric impact position, or `None` when the pair never collides.
#[must_use]
pub fn compute_edge_vertex_time_of_impact(
    vertex: &DVector<f64>,
    vertex_displacement: &DVector<f64>,
    edge_vertex0: &DVector<f64>,
    edge_vertex0_displacement: &DVector<f64>,
    edge_vertex1: &DVector<f64>,
    edge_vertex1_displacement: &DVector<f64>,
    tolerance: f64,
) -> Option<(f64, f64)> {
    let p = vertex.map(Interval::point);
    let up = vertex_displacement.map(Interval::point);
    let e0 = edge_vertex0.map(Interval::point);
    let u0 = edge_vertex0_displacement.map(Interval::point);
    let e1 = edge_vertex1.map(Interval::point);
    let u1 = edge_vertex1_displacement.map(Interval::point);

    let distance = |t: Interval| {
        point_line_signed_distance(&at_time(&p, &up, &t), &at_time(&e0, &u0, &t), &at_time(&e1, &u1, &t))
    };
    let inside = |t: Interval| {
        is_point_along_segment(&at_time(&p, &up, &t), &at_time(&e0, &u0, &t), &at_time(&e1, &u1, &t))
    };

    let enclosure = interval_root_finder(distance, inside, Interval::new(0.0, 1.0), tolerance)?;
    let toi = enclosure.lo;

    let t = Interval::point(toi);
    let alpha = project_point_on_line_alpha(
        &at_time(&p, &up, &t),
        &at_time(&e0, &u0, &t),
        &at_time(&e1, &u1, &t),
    );
    Some((toi, alpha.midpoint().clamp(0.0, 1.0)))
}

/// Closed-form time of impact from the collinearity quadratic.
///
/// Let `e(t)` be the edge direction and `r(t)` the vertex relative to the
/// edge origin; `cross(e(t), r(t)) = a t^2 + b t + c` vanishes exactly at
/// collinearity. The earliest root in `[0, 1]` whose projection parameter
/// lies in `[0, 1]` is the impact. When the cross product vanishes
/// identically (grazing, collinear motion) the impact is the earliest time
/// the projection parameter enters `[0, 1]`.
///
/// Instantiating the scalar parameter with duals makes the returned
/// `(toi, alpha)` carry derivatives with respect to any active variables
/// in the inputs.
#[must_use]
pub fn compute_edge_vertex_time_of_impact_quadratic<S: Scalar>(
    vertex: &DVector<S>,
    vertex_displacement: &DVector<S>,
    edge_vertex0: &DVector<S>,
    edge_vertex0_displacement: &DVector<S>,
    edge_vertex1: &DVector<S>,
    edge_vertex1_displacement: &DVector<S>,
) -> Option<(S, S)> {
    // e(t) = e + t ue, r(t) = r + t ur.
    let e = edge_vertex1 - edge_vertex0;
    let ue = edge_vertex1_displacement - edge_vertex0_displacement;
    let r = vertex - edge_vertex0;
    let ur = vertex_displacement - edge_vertex0_displacement;

    let c = cross2(&e, &r);
    let b = cross2(&e, &ur) + cross2(&ue, &r);
    let a = cross2(&ue, &ur);

    let alpha_at = |t: &S| -> S {
        let et = &e + &ue * t.clone();
        let rt = &r + &ur * t.clone();
        rt.dot(&et) / et.dot(&et)
    };
    let unit = |v: f64| -> bool { (-RANGE_EPSILON..=1.0 + RANGE_EPSILON).contains(&v) };

    if a.value().abs() < COEFF_EPSILON
        && b.value().abs() < COEFF_EPSILON
        && c.value().abs() < COEFF_EPSILON
    {
        // Degenerate: collinear for all t. The impact is when alpha(t)
        // crosses into [0, 1]: candidates are t = 0 and the roots of
        // alpha(t) = 0 and alpha(t) = 1.
        let mut candidates: Vec<S> = vec![S::zero()];
        // alpha(t) = 0  <=>  r(t) . e(t) = 0, a quadratic in t.
        let c0 = r.dot(&e);
        let b0 = r.dot(&ue) + ur.dot(&e);
        let a0 = ur.dot(&ue);
        candidates.extend(solve_quadratic(&a0, &b0, &c0));
        // alpha(t) = 1  <=>  r(t) . e(t) - e(t) . e(t) = 0.
        let c1 = c0.clone() - e.dot(&e);
        let b1 = b0.clone() - (e.dot(&ue) + ue.dot(&e));
        let a1 = a0.clone() - ue.dot(&ue);
        candidates.extend(solve_quadratic(&a1, &b1, &c1));

        candidates.sort_by(|x, y| {
            x.value()
                .partial_cmp(&y.value())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        for t in candidates {
            if !unit(t.value()) {
                continue;
            }
            let alpha = alpha_at(&t);
            if unit(alpha.value()) {
                return Some((t, alpha));
            }
        }
        return None;
    }

    let mut roots = solve_quadratic(&a, &b, &c);
    roots.sort_by(|x, y| {
        x.value()
            .partial_cmp(&y.value())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    for t in roots {
        if !unit(t.value()) {
            continue;
        }
        let alpha = alpha_at(&t);
        if unit(alpha.value()) {
            return Some((t, alpha));
        }
    }
    None
}

/// Broad plus narrow phase over one step: every edge-vertex candidate is
/// fed to the interval solver and the impacts are returned unsorted.
#[must_use]
pub fn detect_edge_vertex_collisions(
    vertices: &DMatrix<f64>,
    displacements: &DMatrix<f64>,
    edges: &[[usize; 2]],
    groups: GroupIds<'_>,
    method: DetectionMethod,
    tolerance: f64,
) -> Vec<EdgeVertexImpact> {
    let candidates =
        detect_collision_candidates(vertices, displacements, edges, &[], groups, method, 0.0);
    candidates
        .ev
        .iter()
        .filter_map(|candidate| {
            let [i, j] = edges[candidate.edge_index];
            let v = candidate.vertex_index;
            compute_edge_vertex_time_of_impact(
                &vertices.row(v).transpose(),
                &displacements.row(v).transpose(),
                &vertices.row(i).transpose(),
                &displacements.row(i).transpose(),
                &vertices.row(j).transpose(),
                &displacements.row(j).transpose(),
                tolerance,
            )
            .map(|(time, alpha)| EdgeVertexImpact {
                time,
                edge_index: candidate.edge_index,
                vertex_index: v,
                alpha,
            })
        })
        .collect()
}

/// Real roots of `a t^2 + b t + c = 0` through the scalar's arithmetic.
/// Order is unspecified.
///
/// Uses the cancellation-free form `q = -(b + sign(b) sqrt(b^2 - 4ac)) / 2`
/// with roots `q / a` and `c / q`. Besides the numerical stability, this
/// keeps the derivative contribution of `a` intact when its *value*
/// vanishes but it is an active autodiff variable; the naive linear
/// fallback `-c / b` would silently drop that term. A root whose primal
/// value is not finite (a genuinely linear or constant equation) is
/// rejected downstream by the unit-range check.
fn solve_quadratic<S: Scalar>(a: &S, b: &S, c: &S) -> Vec<S> {
    if a.value().abs() < COEFF_EPSILON && b.value().abs() < COEFF_EPSILON {
        return Vec::new();
    }
    let discriminant = b.square() - S::from_f64(4.0) * a.clone() * c.clone();
    if discriminant.value() < 0.0 {
        if discriminant.value() > -COEFF_EPSILON && a.value().abs() >= COEFF_EPSILON {
            // Grazing double root.
            return vec![-b.clone() / (S::from_f64(2.0) * a.clone())];
        }
        return Vec::new();
    }
    let sign_b = S::from_f64(if b.value() >= 0.0 { 1.0 } else { -1.0 });
    let q = -(b.clone() + sign_b * discriminant.sqrt()) / S::from_f64(2.0);
    vec![q.clone() / a.clone(), c.clone() / q]
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra::dvector;

    fn check_both_solvers(
        vertex: DVector<f64>,
        uv: DVector<f64>,
        e0: DVector<f64>,
        u0: DVector<f64>,
        e1: DVector<f64>,
        u1: DVector<f64>,
        expected_toi: f64,
    ) {
        let (toi, _alpha) =
            compute_edge_vertex_time_of_impact(&vertex, &uv, &e0, &u0, &e1, &u1, 1e-8)
                .expect("interval solver missed the impact");
        assert_abs_diff_eq!(toi, expected_toi, epsilon = 1e-6);

        let (toi_q, _alpha_q) =
            compute_edge_vertex_time_of_impact_quadratic(&vertex, &uv, &e0, &u0, &e1, &u1)
                .expect("closed-form solver missed the impact");
        assert_abs_diff_eq!(toi_q, expected_toi, epsilon = 1e-6);
        assert_abs_diff_eq!(toi, toi_q, epsilon = 1e-6);
    }

    #[test]
    fn perpendicular_impact() {
        // Vertex falling onto the middle of a static edge.
        check_both_solvers(
            dvector![0.0, 1.0],
            dvector![0.0, -2.0],
            dvector![-1.0, 0.0],
            dvector![0.0, 0.0],
            dvector![1.0, 0.0],
            dvector![0.0, 0.0],
            0.5,
        );
        let (_, alpha) = compute_edge_vertex_time_of_impact(
            &dvector![0.0, 1.0],
            &dvector![0.0, -2.0],
            &dvector![-1.0, 0.0],
            &dvector![0.0, 0.0],
            &dvector![1.0, 0.0],
            &dvector![0.0, 0.0],
            1e-8,
        )
        .unwrap();
        assert_abs_diff_eq!(alpha, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn tangent_impact_hits_edge_endpoint() {
        // Collinear approach along the x axis; the vertex reaches the near
        // endpoint of the edge.
        let vertex = dvector![0.5, 0.0];
        let e0 = dvector![-0.5, 0.0];
        let e1 = dvector![-1.5, 0.0];
        for (speed, expected) in [(1.0, 1.0), (2.0, 0.5), (4.0, 0.25)] {
            let (toi, alpha) = compute_edge_vertex_time_of_impact(
                &vertex,
                &dvector![-speed, 0.0],
                &e0,
                &dvector![0.0, 0.0],
                &e1,
                &dvector![0.0, 0.0],
                1e-8,
            )
            .expect("tangent impact missed");
            assert_abs_diff_eq!(toi, expected, epsilon = 1e-6);
            assert!(alpha.abs() < 1e-6 || (alpha - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn double_impact_of_rotating_edge() {
        // The edge rotates while the vertex falls through it; the first of
        // the two impacts must be reported.
        check_both_solvers(
            dvector![0.0, 0.5],
            dvector![0.0, -1.0],
            dvector![-1.0, 0.0],
            dvector![1.6730970740318298, 0.8025388419628143],
            dvector![1.0, 0.0],
            dvector![-1.616142749786377, -0.6420311331748962],
            0.4482900963,
        );
    }

    #[test]
    fn impact_symmetry_under_edge_swap() {
        let vertex = dvector![0.0, 1.0];
        let uv = dvector![0.3, -2.0];
        let (e0, u0) = (dvector![-1.0, 0.0], dvector![0.1, 0.2]);
        let (e1, u1) = (dvector![1.0, 0.0], dvector![-0.1, 0.1]);
        let (toi_a, alpha_a) =
            compute_edge_vertex_time_of_impact(&vertex, &uv, &e0, &u0, &e1, &u1, 1e-8).unwrap();
        let (toi_b, alpha_b) =
            compute_edge_vertex_time_of_impact(&vertex, &uv, &e1, &u1, &e0, &u0, 1e-8).unwrap();
        assert_abs_diff_eq!(toi_a, toi_b, epsilon = 1e-6);
        assert_abs_diff_eq!(alpha_a, 1.0 - alpha_b, epsilon = 1e-6);
    }

    #[test]
    fn no_impact_when_moving_apart() {
        let hit = compute_edge_vertex_time_of_impact(
            &dvector![0.0, 1.0],
            &dvector![0.0, 2.0],
            &dvector![-1.0, 0.0],
            &dvector![0.0, 0.0],
            &dvector![1.0, 0.0],
            &dvector![0.0, 0.0],
            1e-8,
        );
        assert!(hit.is_none());
    }

    #[test]
    fn toi_is_conservative() {
        // The reported time never overshoots the true root.
        let (toi, _) = compute_edge_vertex_time_of_impact(
            &dvector![0.0, 1.0],
            &dvector![0.0, -2.0],
            &dvector![-1.0, 0.0],
            &dvector![0.0, 0.0],
            &dvector![1.0, 0.0],
            &dvector![0.0, 0.0],
            1e-8,
        )
        .unwrap();
        assert!(toi <= 0.5);
        assert!(0.5 - toi <= 1e-7);
    }
}
