//! Assembly of per-body poses into the global scene.
//!
//! The assembler owns the bodies and the offset tables mapping per-body
//! vertices, edges and faces into flat global arrays, and converts between
//! the optimization dof vector `sigma`, per-body poses, and world-space
//! vertex positions. The dof-to-pose map is diagonal (rotation dofs are
//! expressed in arc length, scaled by each body's `r_max`), so Jacobians of
//! world positions with respect to `sigma` are a per-dof rescaling of pose
//! Jacobians rather than another autodiff pass.

use ccd_math::Scalar;
use ccd_types::Pose;
use nalgebra::{DMatrix, DVector};

use crate::rigid_body::RigidBody;

/// The rigid-body assembler.
#[derive(Debug, Clone)]
pub struct RigidBodyAssembler {
    /// The bodies, in order.
    pub bodies: Vec<RigidBody>,
    vertex_offsets: Vec<usize>,
    num_vertices: usize,
    dim: usize,
}

impl RigidBodyAssembler {
    /// Assemble a scene from bodies (all of the same dimension).
    #[must_use]
    pub fn new(bodies: Vec<RigidBody>) -> Self {
        debug_assert!(!bodies.is_empty());
        let dim = bodies[0].dim();
        debug_assert!(bodies.iter().all(|b| b.dim() == dim));

        let mut vertex_offsets = Vec::with_capacity(bodies.len());
        let mut num_vertices = 0;
        for body in &bodies {
            vertex_offsets.push(num_vertices);
            num_vertices += body.num_vertices();
        }
        Self {
            bodies,
            vertex_offsets,
            num_vertices,
            dim,
        }
    }

    /// Spatial dimension.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of bodies.
    #[must_use]
    pub fn num_bodies(&self) -> usize {
        self.bodies.len()
    }

    /// Total vertex count.
    #[must_use]
    pub fn num_vertices(&self) -> usize {
        self.num_vertices
    }

    /// Pose dofs per body.
    #[must_use]
    pub fn ndof_per_body(&self) -> usize {
        Pose::<f64>::dim_to_ndof(self.dim)
    }

    /// Total dof count.
    #[must_use]
    pub fn num_dofs(&self) -> usize {
        self.num_bodies() * self.ndof_per_body()
    }

    /// Global edge list (vertex indices offset per body).
    #[must_use]
    pub fn edges(&self) -> Vec<[usize; 2]> {
        self.bodies
            .iter()
            .zip(&self.vertex_offsets)
            .flat_map(|(body, &offset)| {
                body.edges.iter().map(move |&[i, j]| [i + offset, j + offset])
            })
            .collect()
    }

    /// Global face list.
    #[must_use]
    pub fn faces(&self) -> Vec<[usize; 3]> {
        self.bodies
            .iter()
            .zip(&self.vertex_offsets)
            .flat_map(|(body, &offset)| {
                body.faces
                    .iter()
                    .map(move |&[i, j, k]| [i + offset, j + offset, k + offset])
            })
            .collect()
    }

    /// Per-vertex collision group ids (the body index when the body has no
    /// explicit group).
    #[must_use]
    pub fn vertex_group_ids(&self) -> Vec<usize> {
        let mut groups = Vec::with_capacity(self.num_vertices);
        for (body_index, body) in self.bodies.iter().enumerate() {
            let group = body.group_id.unwrap_or(body_index);
            groups.extend(std::iter::repeat(group).take(body.num_vertices()));
        }
        groups
    }

    /// Map a global vertex index to `(body_index, local_vertex_index)`.
    #[must_use]
    pub fn global_to_local(&self, vertex_index: usize) -> (usize, usize) {
        debug_assert!(vertex_index < self.num_vertices);
        let body_index = match self.vertex_offsets.binary_search(&vertex_index) {
            Ok(exact) => exact,
            Err(insertion) => insertion - 1,
        };
        (body_index, vertex_index - self.vertex_offsets[body_index])
    }

    /// Map a global edge index to `(body_index, local_edge_index)`.
    #[must_use]
    pub fn edge_to_local(&self, edge_index: usize) -> (usize, usize) {
        let mut remaining = edge_index;
        for (body_index, body) in self.bodies.iter().enumerate() {
            if remaining < body.edges.len() {
                return (body_index, remaining);
            }
            remaining -= body.edges.len();
        }
        unreachable!("edge index {edge_index} out of range");
    }

    /// Map a global face index to `(body_index, local_face_index)`.
    #[must_use]
    pub fn face_to_local(&self, face_index: usize) -> (usize, usize) {
        let mut remaining = face_index;
        for (body_index, body) in self.bodies.iter().enumerate() {
            if remaining < body.faces.len() {
                return (body_index, remaining);
            }
            remaining -= body.faces.len();
        }
        unreachable!("face index {face_index} out of range");
    }

    /// World positions of every vertex under the given per-body poses.
    #[must_use]
    pub fn world_vertices(&self, poses: &[Pose<f64>]) -> DMatrix<f64> {
        debug_assert_eq!(poses.len(), self.num_bodies());
        let mut vertices = DMatrix::zeros(self.num_vertices, self.dim);
        for ((body, pose), &offset) in self.bodies.iter().zip(poses).zip(&self.vertex_offsets) {
            let world = body.world_vertices(pose);
            for i in 0..body.num_vertices() {
                for d in 0..self.dim {
                    vertices[(offset + i, d)] = world[(i, d)];
                }
            }
        }
        vertices
    }

    /// Current poses of all bodies.
    #[must_use]
    pub fn poses(&self) -> Vec<Pose<f64>> {
        self.bodies.iter().map(|b| b.pose.clone()).collect()
    }

    /// Previous-step poses of all bodies.
    #[must_use]
    pub fn poses_t0(&self) -> Vec<Pose<f64>> {
        self.bodies.iter().map(|b| b.pose_prev.clone()).collect()
    }

    /// Diagonal of the linear dof-to-pose map: translations pass through,
    /// rotation dofs are divided by the body's `r_max` (so a unit of sigma
    /// moves a surface point about one unit of arc length).
    #[must_use]
    pub fn dof_to_pose_diagonal(&self) -> DVector<f64> {
        let ndof = self.ndof_per_body();
        let dim = self.dim;
        DVector::from_fn(self.num_dofs(), |k, _| {
            let body = &self.bodies[k / ndof];
            if k % ndof < dim || body.r_max == 0.0 {
                1.0
            } else {
                1.0 / body.r_max
            }
        })
    }

    /// Convert an optimization dof vector into per-body poses, generic so
    /// dual-number dofs flow into pose evaluation.
    #[must_use]
    pub fn dofs_to_poses<S: Scalar>(&self, sigma: &DVector<S>) -> Vec<Pose<S>> {
        debug_assert_eq!(sigma.len(), self.num_dofs());
        let scale = self.dof_to_pose_diagonal();
        let scaled = DVector::from_fn(sigma.len(), |k, _| {
            sigma[k].clone() * S::from_f64(scale[k])
        });
        Pose::dofs_to_poses(&scaled, self.dim)
    }

    /// Convert per-body poses into the optimization dof vector.
    #[must_use]
    pub fn poses_to_dofs(&self, poses: &[Pose<f64>]) -> DVector<f64> {
        let flat = Pose::poses_to_dofs(poses);
        let scale = self.dof_to_pose_diagonal();
        DVector::from_fn(flat.len(), |k, _| flat[k] / scale[k])
    }

    /// Per-dof fixed flags over all bodies.
    #[must_use]
    pub fn is_dof_fixed(&self) -> Vec<bool> {
        self.bodies
            .iter()
            .flat_map(|b| b.is_dof_fixed.iter().copied())
            .collect()
    }

    /// Diagonal of the generalized mass matrix (mass per translation dof,
    /// moment of inertia per rotation dof).
    #[must_use]
    pub fn mass_matrix_diagonal(&self) -> DVector<f64> {
        let ndof = self.ndof_per_body();
        let dim = self.dim;
        DVector::from_fn(self.num_dofs(), |k, _| {
            let body = &self.bodies[k / ndof];
            if k % ndof < dim {
                body.mass
            } else {
                body.moment_of_inertia[k % ndof - dim]
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{dmatrix, dvector};

    fn segment_body(y: f64, fixed: bool) -> RigidBody {
        RigidBody::from_points(
            dmatrix![
                -1.0, y;
                 1.0, y
            ],
            vec![[0, 1]],
            Vec::new(),
            Pose::new(dvector![0.0, y], dvector![0.0]),
            Pose::zero(2),
            Pose::zero(2),
            1.0,
            vec![fixed; 3],
            false,
            None,
        )
    }

    fn two_body_assembler() -> RigidBodyAssembler {
        RigidBodyAssembler::new(vec![segment_body(0.0, true), segment_body(1.0, false)])
    }

    #[test]
    fn offsets_and_global_connectivity() {
        let assembler = two_body_assembler();
        assert_eq!(assembler.num_vertices(), 4);
        assert_eq!(assembler.edges(), vec![[0, 1], [2, 3]]);
        assert_eq!(assembler.global_to_local(0), (0, 0));
        assert_eq!(assembler.global_to_local(2), (1, 0));
        assert_eq!(assembler.global_to_local(3), (1, 1));
        assert_eq!(assembler.vertex_group_ids(), vec![0, 0, 1, 1]);
    }

    #[test]
    fn dof_round_trip_through_the_diagonal_map() {
        let assembler = two_body_assembler();
        let poses = assembler.poses();
        let sigma = assembler.poses_to_dofs(&poses);
        let back = assembler.dofs_to_poses::<f64>(&sigma);
        for (a, b) in poses.iter().zip(&back) {
            assert_relative_eq!((&a.position - &b.position).norm(), 0.0, epsilon = 1e-12);
            assert_relative_eq!((&a.rotation - &b.rotation).norm(), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn world_vertices_follow_poses() {
        let assembler = two_body_assembler();
        let mut poses = assembler.poses();
        poses[1].position[1] = 5.0;
        let world = assembler.world_vertices(&poses);
        assert_relative_eq!(world[(2, 1)], 5.0);
        assert_relative_eq!(world[(0, 1)], 0.0);
    }
}
