//! Narrow-phase time of impact for rigid bodies on screwing trajectories.
//!
//! Poses at `t = 0` and `t = 1` are interpolated linearly in their dof
//! vectors; the world position of a vertex under the interpolated pose is a
//! trigonometric function of `t`, evaluated over intervals so the certified
//! root finder can enclose the earliest impact. All three variants share
//! the same template: a signed distance that vanishes at contact and a
//! conservative containment predicate.

use ccd_geometry::{
    are_segments_intersecting, barycentric_coordinates, is_point_along_segment,
    is_point_inside_triangle, line_line_signed_distance, point_line_signed_distance,
    point_plane_signed_distance, project_point_on_line_alpha, segment_segment_parameters,
    triangle_normal,
};
use ccd_math::{interval_root_finder, Interval};
use ccd_types::{
    DetectionMethod, EdgeEdgeImpact, EdgeVertexImpact, FaceVertexImpact, Pose,
};
use nalgebra::DVector;

use crate::assembler::RigidBodyAssembler;
use crate::broad_phase::detect_collision_candidates;
use crate::rigid_body::RigidBody;

type PoseI = Pose<Interval>;

fn pose_at(t0: &PoseI, t1: &PoseI, t: Interval) -> PoseI {
    Pose::interpolate(t0, t1, t)
}

/// Time of impact between a vertex of `body_a` and an edge of `body_b`,
/// searching `[0, earliest_toi]` (2D).
///
/// Returns the conservative impact time, or `None` when the pair does not
/// collide within the window.
#[allow(clippy::too_many_arguments)]
#[must_use]
pub fn compute_edge_vertex_time_of_impact(
    body_a: &RigidBody,
    pose_a_t0: &Pose<f64>,
    pose_a_t1: &Pose<f64>,
    vertex_index: usize,
    body_b: &RigidBody,
    pose_b_t0: &Pose<f64>,
    pose_b_t1: &Pose<f64>,
    edge_index: usize,
    earliest_toi: f64,
    toi_tolerance: f64,
) -> Option<f64> {
    debug_assert_eq!(body_a.dim(), 2);
    debug_assert_eq!(body_b.dim(), 2);

    let a_t0 = pose_a_t0.cast::<Interval>();
    let a_t1 = pose_a_t1.cast::<Interval>();
    let b_t0 = pose_b_t0.cast::<Interval>();
    let b_t1 = pose_b_t1.cast::<Interval>();
    let [e0, e1] = body_b.edges[edge_index];

    let vertex_positions = |t: Interval| -> (DVector<Interval>, DVector<Interval>, DVector<Interval>) {
        let pose_a = pose_at(&a_t0, &a_t1, t);
        let pose_b = pose_at(&b_t0, &b_t1, t);
        (
            body_a.world_vertex(&pose_a, vertex_index),
            body_b.world_vertex(&pose_b, e0),
            body_b.world_vertex(&pose_b, e1),
        )
    };

    let distance = |t: Interval| {
        let (vertex, edge_vertex0, edge_vertex1) = vertex_positions(t);
        point_line_signed_distance(&vertex, &edge_vertex0, &edge_vertex1)
    };
    let is_inside = |t: Interval| {
        let (vertex, edge_vertex0, edge_vertex1) = vertex_positions(t);
        is_point_along_segment(&vertex, &edge_vertex0, &edge_vertex1)
    };

    interval_root_finder(
        distance,
        is_inside,
        Interval::new(0.0, earliest_toi),
        toi_tolerance,
    )
    .map(|enclosure| enclosure.lo)
}

/// Time of impact between an edge of `body_a` and an edge of `body_b` (3D).
#[allow(clippy::too_many_arguments)]
#[must_use]
pub fn compute_edge_edge_time_of_impact(
    body_a: &RigidBody,
    pose_a_t0: &Pose<f64>,
    pose_a_t1: &Pose<f64>,
    edge_a_index: usize,
    body_b: &RigidBody,
    pose_b_t0: &Pose<f64>,
    pose_b_t1: &Pose<f64>,
    edge_b_index: usize,
    earliest_toi: f64,
    toi_tolerance: f64,
) -> Option<f64> {
    debug_assert_eq!(body_a.dim(), 3);
    debug_assert_eq!(body_b.dim(), 3);

    let a_t0 = pose_a_t0.cast::<Interval>();
    let a_t1 = pose_a_t1.cast::<Interval>();
    let b_t0 = pose_b_t0.cast::<Interval>();
    let b_t1 = pose_b_t1.cast::<Interval>();
    let [a0, a1] = body_a.edges[edge_a_index];
    let [b0, b1] = body_b.edges[edge_b_index];

    let vertex_positions = |t: Interval| {
        let pose_a = pose_at(&a_t0, &a_t1, t);
        let pose_b = pose_at(&b_t0, &b_t1, t);
        (
            body_a.world_vertex(&pose_a, a0),
            body_a.world_vertex(&pose_a, a1),
            body_b.world_vertex(&pose_b, b0),
            body_b.world_vertex(&pose_b, b1),
        )
    };

    let distance = |t: Interval| {
        let (ea0, ea1, eb0, eb1) = vertex_positions(t);
        line_line_signed_distance(&ea0, &ea1, &eb0, &eb1)
    };
    let is_inside = |t: Interval| {
        let (ea0, ea1, eb0, eb1) = vertex_positions(t);
        are_segments_intersecting(&ea0, &ea1, &eb0, &eb1)
    };

    interval_root_finder(
        distance,
        is_inside,
        Interval::new(0.0, earliest_toi),
        toi_tolerance,
    )
    .map(|enclosure| enclosure.lo)
}

/// Time of impact between a vertex of `body_a` and a face of `body_b` (3D).
#[allow(clippy::too_many_arguments)]
#[must_use]
pub fn compute_face_vertex_time_of_impact(
    body_a: &RigidBody,
    pose_a_t0: &Pose<f64>,
    pose_a_t1: &Pose<f64>,
    vertex_index: usize,
    body_b: &RigidBody,
    pose_b_t0: &Pose<f64>,
    pose_b_t1: &Pose<f64>,
    face_index: usize,
    earliest_toi: f64,
    toi_tolerance: f64,
) -> Option<f64> {
    debug_assert_eq!(body_a.dim(), 3);
    debug_assert_eq!(body_b.dim(), 3);

    let a_t0 = pose_a_t0.cast::<Interval>();
    let a_t1 = pose_a_t1.cast::<Interval>();
    let b_t0 = pose_b_t0.cast::<Interval>();
    let b_t1 = pose_b_t1.cast::<Interval>();
    let [f0, f1, f2] = body_b.faces[face_index];

    let vertex_positions = |t: Interval| {
        let pose_a = pose_at(&a_t0, &a_t1, t);
        let pose_b = pose_at(&b_t0, &b_t1, t);
        (
            body_a.world_vertex(&pose_a, vertex_index),
            body_b.world_vertex(&pose_b, f0),
            body_b.world_vertex(&pose_b, f1),
            body_b.world_vertex(&pose_b, f2),
        )
    };

    let distance = |t: Interval| {
        let (vertex, fv0, fv1, fv2) = vertex_positions(t);
        let normal = triangle_normal(&fv0, &fv1, &fv2, false);
        point_plane_signed_distance(&vertex, &fv0, &normal)
    };
    let is_inside = |t: Interval| {
        let (vertex, fv0, fv1, fv2) = vertex_positions(t);
        is_point_inside_triangle(&vertex, &fv0, &fv1, &fv2)
    };

    interval_root_finder(
        distance,
        is_inside,
        Interval::new(0.0, earliest_toi),
        toi_tolerance,
    )
    .map(|enclosure| enclosure.lo)
}

/// Impacts of one rigid-body step, in global primitive indices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RigidBodyImpacts {
    /// Edge-vertex impacts (2D scenes).
    pub ev: Vec<EdgeVertexImpact>,
    /// Edge-edge impacts (3D scenes).
    pub ee: Vec<EdgeEdgeImpact>,
    /// Face-vertex impacts (3D scenes).
    pub fv: Vec<FaceVertexImpact>,
}

impl RigidBodyImpacts {
    /// True iff no impact was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ev.is_empty() && self.ee.is_empty() && self.fv.is_empty()
    }
}

/// Find all impacts of one step over the assembled scene.
///
/// The broad phase runs on the linearized sweep between the world
/// configurations at the two pose sets; every candidate then gets the
/// certified screwing-trajectory treatment, and impact parameters (edge
/// alphas, barycentric coordinates) are read off at the impact time.
#[must_use]
pub fn detect_rigid_body_collisions(
    assembler: &RigidBodyAssembler,
    poses_t0: &[Pose<f64>],
    poses_t1: &[Pose<f64>],
    method: DetectionMethod,
    toi_tolerance: f64,
) -> RigidBodyImpacts {
    let vertices_t0 = assembler.world_vertices(poses_t0);
    let vertices_t1 = assembler.world_vertices(poses_t1);
    let displacements = &vertices_t1 - &vertices_t0;
    let edges = assembler.edges();
    let faces = assembler.faces();
    let groups = assembler.vertex_group_ids();

    let candidates = detect_collision_candidates(
        &vertices_t0,
        &displacements,
        &edges,
        &faces,
        Some(&groups),
        method,
        0.0,
    );

    // World position of a global vertex at the interpolated pose.
    let position_at = |vertex: usize, time: f64| -> DVector<f64> {
        let (body, local) = assembler.global_to_local(vertex);
        let pose = Pose::interpolate(&poses_t0[body], &poses_t1[body], time);
        assembler.bodies[body].world_vertex(&pose, local)
    };

    let mut impacts = RigidBodyImpacts::default();

    for candidate in &candidates.ev {
        let [e0, e1] = edges[candidate.edge_index];
        let (vertex_body, local_vertex) = assembler.global_to_local(candidate.vertex_index);
        let (edge_body, local_edge_index) = assembler.edge_to_local(candidate.edge_index);
        let Some(time) = compute_edge_vertex_time_of_impact(
            &assembler.bodies[vertex_body],
            &poses_t0[vertex_body],
            &poses_t1[vertex_body],
            local_vertex,
            &assembler.bodies[edge_body],
            &poses_t0[edge_body],
            &poses_t1[edge_body],
            local_edge_index,
            1.0,
            toi_tolerance,
        ) else {
            continue;
        };
        let alpha = project_point_on_line_alpha(
            &position_at(candidate.vertex_index, time),
            &position_at(e0, time),
            &position_at(e1, time),
        )
        .clamp(0.0, 1.0);
        impacts.ev.push(EdgeVertexImpact {
            time,
            edge_index: candidate.edge_index,
            vertex_index: candidate.vertex_index,
            alpha,
        });
    }

    for candidate in &candidates.ee {
        let [a0, a1] = edges[candidate.edge0_index];
        let [b0, b1] = edges[candidate.edge1_index];
        let (body_a, edge_a) = assembler.edge_to_local(candidate.edge0_index);
        let (body_b, edge_b) = assembler.edge_to_local(candidate.edge1_index);
        let Some(time) = compute_edge_edge_time_of_impact(
            &assembler.bodies[body_a],
            &poses_t0[body_a],
            &poses_t1[body_a],
            edge_a,
            &assembler.bodies[body_b],
            &poses_t0[body_b],
            &poses_t1[body_b],
            edge_b,
            1.0,
            toi_tolerance,
        ) else {
            continue;
        };
        let (alpha_a, alpha_b) = segment_segment_parameters(
            &position_at(a0, time),
            &position_at(a1, time),
            &position_at(b0, time),
            &position_at(b1, time),
        );
        impacts.ee.push(EdgeEdgeImpact {
            time,
            impacted_edge_index: candidate.edge0_index,
            impacted_alpha: alpha_a.clamp(0.0, 1.0),
            impacting_edge_index: candidate.edge1_index,
            impacting_alpha: alpha_b.clamp(0.0, 1.0),
        });
    }

    for candidate in &candidates.fv {
        let [f0, f1, f2] = faces[candidate.face_index];
        let (vertex_body, local_vertex) = assembler.global_to_local(candidate.vertex_index);
        let (face_body, local_face_index) = assembler.face_to_local(candidate.face_index);
        let Some(time) = compute_face_vertex_time_of_impact(
            &assembler.bodies[vertex_body],
            &poses_t0[vertex_body],
            &poses_t1[vertex_body],
            local_vertex,
            &assembler.bodies[face_body],
            &poses_t0[face_body],
            &poses_t1[face_body],
            local_face_index,
            1.0,
            toi_tolerance,
        ) else {
            continue;
        };
        let (u, v) = barycentric_coordinates(
            &position_at(candidate.vertex_index, time),
            &position_at(f0, time),
            &position_at(f1, time),
            &position_at(f2, time),
        );
        impacts.fv.push(FaceVertexImpact {
            time,
            face_index: candidate.face_index,
            vertex_index: candidate.vertex_index,
            u: u.max(0.0),
            v: v.max(0.0),
        });
    }

    impacts
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra::{dmatrix, dvector, DMatrix};

    fn point_body_2d(x: f64, y: f64) -> RigidBody {
        RigidBody::from_points(
            dmatrix![x, y],
            Vec::new(),
            Vec::new(),
            Pose::new(dvector![x, y], dvector![0.0]),
            Pose::zero(2),
            Pose::zero(2),
            1.0,
            vec![false; 3],
            false,
            None,
        )
    }

    fn segment_body_2d() -> RigidBody {
        RigidBody::from_points(
            dmatrix![
                -1.0, 0.0;
                 1.0, 0.0
            ],
            vec![[0, 1]],
            Vec::new(),
            Pose::new(dvector![0.0, 0.0], dvector![0.0]),
            Pose::zero(2),
            Pose::zero(2),
            1.0,
            vec![false; 3],
            false,
            None,
        )
    }

    #[test]
    fn translating_vertex_hits_static_edge() {
        let vertex_body = point_body_2d(0.0, 1.0);
        let edge_body = segment_body_2d();
        let pose_v_t0 = vertex_body.pose.clone();
        let pose_v_t1 = Pose::new(dvector![0.0, -1.0], dvector![0.0]);
        let pose_e = edge_body.pose.clone();

        let toi = compute_edge_vertex_time_of_impact(
            &vertex_body,
            &pose_v_t0,
            &pose_v_t1,
            0,
            &edge_body,
            &pose_e,
            &pose_e,
            0,
            1.0,
            1e-8,
        )
        .expect("impact missed");
        assert_abs_diff_eq!(toi, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn rotating_edge_sweeps_into_vertex() {
        // The edge spins a half turn about its center; its tip passes
        // through the waiting vertex at a quarter turn.
        let vertex_body = point_body_2d(0.0, 1.0);
        let edge_body = segment_body_2d();
        let pose_v = vertex_body.pose.clone();
        let pose_e_t0 = Pose::new(dvector![0.0, 0.0], dvector![0.0]);
        let pose_e_t1 = Pose::new(dvector![0.0, 0.0], dvector![std::f64::consts::PI]);

        let toi = compute_edge_vertex_time_of_impact(
            &vertex_body,
            &pose_v,
            &pose_v,
            0,
            &edge_body,
            &pose_e_t0,
            &pose_e_t1,
            0,
            1.0,
            1e-8,
        )
        .expect("rotational impact missed");
        assert_abs_diff_eq!(toi, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn earliest_toi_window_excludes_later_impacts() {
        let vertex_body = point_body_2d(0.0, 1.0);
        let edge_body = segment_body_2d();
        let pose_v_t0 = vertex_body.pose.clone();
        let pose_v_t1 = Pose::new(dvector![0.0, -1.0], dvector![0.0]);
        let pose_e = edge_body.pose.clone();

        let hit = compute_edge_vertex_time_of_impact(
            &vertex_body,
            &pose_v_t0,
            &pose_v_t1,
            0,
            &edge_body,
            &pose_e,
            &pose_e,
            0,
            0.25,
            1e-8,
        );
        assert!(hit.is_none());
    }

    fn segment_body_3d(points: DMatrix<f64>) -> RigidBody {
        let center = points.row_sum() / points.nrows() as f64;
        RigidBody::from_points(
            points,
            vec![[0, 1]],
            Vec::new(),
            Pose::new(center.transpose(), dvector![0.0, 0.0, 0.0]),
            Pose::zero(3),
            Pose::zero(3),
            1.0,
            vec![false; 6],
            false,
            None,
        )
    }

    #[test]
    fn assembled_scene_detection_produces_global_impacts() {
        let vertex_body = point_body_2d(0.0, 1.0);
        let edge_body = segment_body_2d();
        let assembler =
            crate::assembler::RigidBodyAssembler::new(vec![edge_body, vertex_body]);

        let poses_t0 = assembler.poses();
        let mut poses_t1 = poses_t0.clone();
        poses_t1[1].position[1] = -1.0;

        let impacts = detect_rigid_body_collisions(
            &assembler,
            &poses_t0,
            &poses_t1,
            DetectionMethod::BruteForce,
            1e-8,
        );
        assert_eq!(impacts.ev.len(), 1);
        let impact = &impacts.ev[0];
        assert_eq!(impact.edge_index, 0);
        assert_eq!(impact.vertex_index, 2); // global index after the edge body
        assert_abs_diff_eq!(impact.time, 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(impact.alpha, 0.5, epsilon = 1e-6);

        // No motion, no impacts.
        let still = detect_rigid_body_collisions(
            &assembler,
            &poses_t0,
            &poses_t0,
            DetectionMethod::BruteForce,
            1e-8,
        );
        assert!(still.is_empty());
    }

    #[test]
    fn crossing_edges_collide_in_three_dimensions() {
        let edge_a = segment_body_3d(dmatrix![
            -1.0, 0.0, 1.0;
             1.0, 0.0, 1.0
        ]);
        let edge_b = segment_body_3d(dmatrix![
            0.0, -1.0, 0.0;
            0.0, 1.0, 0.0
        ]);
        let pose_a_t0 = edge_a.pose.clone();
        let pose_a_t1 = Pose::new(dvector![0.0, 0.0, -1.0], dvector![0.0, 0.0, 0.0]);
        let pose_b = edge_b.pose.clone();

        let toi = compute_edge_edge_time_of_impact(
            &edge_a,
            &pose_a_t0,
            &pose_a_t1,
            0,
            &edge_b,
            &pose_b,
            &pose_b,
            0,
            1.0,
            1e-8,
        )
        .expect("edge-edge impact missed");
        assert_abs_diff_eq!(toi, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn assembled_scene_detection_in_three_dimensions() {
        let edge_a = segment_body_3d(dmatrix![
            -1.0, 0.0, 1.0;
             1.0, 0.0, 1.0
        ]);
        let edge_b = segment_body_3d(dmatrix![
            0.0, -1.0, 0.0;
            0.0, 1.0, 0.0
        ]);
        let assembler = crate::assembler::RigidBodyAssembler::new(vec![edge_a, edge_b]);
        let poses_t0 = assembler.poses();
        let mut poses_t1 = poses_t0.clone();
        poses_t1[0].position[2] = -1.0;

        let impacts = detect_rigid_body_collisions(
            &assembler,
            &poses_t0,
            &poses_t1,
            DetectionMethod::BruteForce,
            1e-8,
        );
        assert!(impacts.fv.is_empty());
        assert_eq!(impacts.ee.len(), 1);
        let impact = &impacts.ee[0];
        assert_abs_diff_eq!(impact.time, 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(impact.impacted_alpha, 0.5, epsilon = 1e-4);
        assert_abs_diff_eq!(impact.impacting_alpha, 0.5, epsilon = 1e-4);
    }

    #[test]
    fn falling_vertex_hits_triangle_interior() {
        let vertex_body = RigidBody::from_points(
            dmatrix![0.25, 0.25, 1.0],
            Vec::new(),
            Vec::new(),
            Pose::new(dvector![0.25, 0.25, 1.0], dvector![0.0, 0.0, 0.0]),
            Pose::zero(3),
            Pose::zero(3),
            1.0,
            vec![false; 6],
            false,
            None,
        );
        let face_body = RigidBody::from_points(
            dmatrix![
                0.0, 0.0, 0.0;
                1.0, 0.0, 0.0;
                0.0, 1.0, 0.0
            ],
            vec![[0, 1], [1, 2], [2, 0]],
            vec![[0, 1, 2]],
            Pose::new(dvector![1.0 / 3.0, 1.0 / 3.0, 0.0], dvector![0.0, 0.0, 0.0]),
            Pose::zero(3),
            Pose::zero(3),
            1.0,
            vec![false; 6],
            false,
            None,
        );
        let pose_v_t0 = vertex_body.pose.clone();
        let pose_v_t1 = Pose::new(dvector![0.25, 0.25, -1.0], dvector![0.0, 0.0, 0.0]);
        let pose_f = face_body.pose.clone();

        let toi = compute_face_vertex_time_of_impact(
            &vertex_body,
            &pose_v_t0,
            &pose_v_t1,
            0,
            &face_body,
            &pose_f,
            &pose_f,
            0,
            1.0,
            1e-8,
        )
        .expect("face-vertex impact missed");
        assert_abs_diff_eq!(toi, 0.5, epsilon = 1e-6);

        // A vertex falling outside the triangle does not impact.
        let outside = RigidBody::from_points(
            dmatrix![2.0, 2.0, 1.0],
            Vec::new(),
            Vec::new(),
            Pose::new(dvector![2.0, 2.0, 1.0], dvector![0.0, 0.0, 0.0]),
            Pose::zero(3),
            Pose::zero(3),
            1.0,
            vec![false; 6],
            false,
            None,
        );
        let pose_o_t1 = Pose::new(dvector![2.0, 2.0, -1.0], dvector![0.0, 0.0, 0.0]);
        assert!(compute_face_vertex_time_of_impact(
            &outside,
            &outside.pose.clone(),
            &pose_o_t1,
            0,
            &face_body,
            &pose_f,
            &pose_f,
            0,
            1.0,
            1e-8,
        )
        .is_none());
    }
}
