//! Rigid bodies: body-space geometry plus pose state.

use ccd_math::Scalar;
use ccd_types::Pose;
use nalgebra::{DMatrix, DVector};

/// A rigid body: vertices in body space (centered on the center of mass),
/// connectivity, mass properties and the pose pair the integrator advances.
#[derive(Debug, Clone)]
pub struct RigidBody {
    /// Vertex positions in body space.
    pub vertices: DMatrix<f64>,
    /// Edges as vertex-index pairs.
    pub edges: Vec<[usize; 2]>,
    /// Faces as vertex-index triples (3D only).
    pub faces: Vec<[usize; 3]>,

    /// Current pose of the center of mass.
    pub pose: Pose<f64>,
    /// Pose at the previous time step.
    pub pose_prev: Pose<f64>,
    /// Current generalized velocity.
    pub velocity: Pose<f64>,
    /// Velocity at the previous time step.
    pub velocity_prev: Pose<f64>,
    /// External generalized force acting on the body.
    pub force: Pose<f64>,

    /// Total mass.
    pub mass: f64,
    /// Diagonal moment of inertia about the principal axes.
    pub moment_of_inertia: DVector<f64>,
    /// Largest distance from the center of mass to a vertex.
    pub r_max: f64,
    /// Mean edge length of the body's geometry.
    pub average_edge_length: f64,

    /// Per-dof fixed flags (`[position; rotation]` order).
    pub is_dof_fixed: Vec<bool>,
    /// Collision group: bodies sharing a group never collide.
    pub group_id: Option<usize>,
    /// Use edge orientation for outward normals.
    pub is_oriented: bool,
}

impl RigidBody {
    /// Build a body from world-space points, recentering them so the body
    /// frame sits at the center of mass (vertex-uniform mass model).
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn from_points(
        vertices: DMatrix<f64>,
        edges: Vec<[usize; 2]>,
        faces: Vec<[usize; 3]>,
        pose: Pose<f64>,
        velocity: Pose<f64>,
        force: Pose<f64>,
        density: f64,
        is_dof_fixed: Vec<bool>,
        is_oriented: bool,
        group_id: Option<usize>,
    ) -> Self {
        let n = vertices.nrows();
        let dim = vertices.ncols();
        debug_assert!(n > 0);
        debug_assert_eq!(is_dof_fixed.len(), Pose::<f64>::dim_to_ndof(dim));

        let center = vertices.row_sum() / n as f64;
        let mut centered = vertices;
        for i in 0..n {
            for d in 0..dim {
                centered[(i, d)] -= center[d];
            }
        }

        let vertex_mass = density;
        let mass = vertex_mass * n as f64;
        let r_max = (0..n)
            .map(|i| centered.row(i).norm())
            .fold(0.0_f64, f64::max);

        // Vertex-mass moments about the principal axes.
        let moment_of_inertia = if dim == 2 {
            DVector::from_element(
                1,
                (0..n).map(|i| vertex_mass * centered.row(i).norm_squared()).sum(),
            )
        } else {
            DVector::from_fn(3, |axis, _| {
                (0..n)
                    .map(|i| {
                        let r = centered.row(i);
                        vertex_mass * (r.norm_squared() - r[axis] * r[axis])
                    })
                    .sum()
            })
        };

        let average_edge_length = if edges.is_empty() {
            0.0
        } else {
            edges
                .iter()
                .map(|&[i, j]| (centered.row(i) - centered.row(j)).norm())
                .sum::<f64>()
                / edges.len() as f64
        };

        Self {
            vertices: centered,
            edges,
            faces,
            pose_prev: pose.clone(),
            velocity_prev: velocity.clone(),
            pose,
            velocity,
            force,
            mass,
            moment_of_inertia,
            r_max,
            average_edge_length,
            is_dof_fixed,
            group_id,
            is_oriented,
        }
    }

    /// Spatial dimension.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.vertices.ncols()
    }

    /// Degrees of freedom of the body's pose.
    #[must_use]
    pub fn ndof(&self) -> usize {
        Pose::<f64>::dim_to_ndof(self.dim())
    }

    /// Number of vertices.
    #[must_use]
    pub fn num_vertices(&self) -> usize {
        self.vertices.nrows()
    }

    /// One world-space vertex under a pose, generic in the scalar so the
    /// narrow phase can evaluate it over intervals and the barrier kernels
    /// over duals.
    #[must_use]
    pub fn world_vertex<S: Scalar>(&self, pose: &Pose<S>, vertex_index: usize) -> DVector<S> {
        let rotation = pose.construct_rotation_matrix();
        let local = self
            .vertices
            .row(vertex_index)
            .transpose()
            .map(S::from_f64);
        rotation * local + pose.position.clone()
    }

    /// All world-space vertices under a pose.
    #[must_use]
    pub fn world_vertices<S: Scalar>(&self, pose: &Pose<S>) -> DMatrix<S> {
        let rotation = pose.construct_rotation_matrix();
        let dim = self.dim();
        DMatrix::from_fn(self.num_vertices(), dim, |i, d| {
            let mut value = pose.position[d].clone();
            for k in 0..dim {
                value += rotation[(d, k)].clone() * S::from_f64(self.vertices[(i, k)]);
            }
            value
        })
    }

    /// World vertices at the previous-step pose.
    #[must_use]
    pub fn world_vertices_t0(&self) -> DMatrix<f64> {
        self.world_vertices(&self.pose_prev)
    }

    /// World vertices at the current pose.
    #[must_use]
    pub fn world_vertices_t1(&self) -> DMatrix<f64> {
        self.world_vertices(&self.pose)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{dmatrix, dvector};

    fn square_body() -> RigidBody {
        RigidBody::from_points(
            dmatrix![
                0.0, 0.0;
                2.0, 0.0;
                2.0, 2.0;
                0.0, 2.0
            ],
            vec![[0, 1], [1, 2], [2, 3], [3, 0]],
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
    fn from_points_centers_on_the_center_of_mass() {
        let body = square_body();
        assert_relative_eq!(body.vertices.row_sum().norm(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(body.r_max, 2.0_f64.sqrt());
        assert_relative_eq!(body.average_edge_length, 2.0);
        assert_relative_eq!(body.mass, 4.0);
    }

    #[test]
    fn world_vertices_compose_rotation_and_translation() {
        let body = square_body();
        let pose = Pose::new(dvector![10.0, 0.0], dvector![std::f64::consts::FRAC_PI_2]);
        // Body vertex (1, 1) rotated a quarter turn becomes (-1, 1).
        let w = body.world_vertex(&pose, 2);
        assert_relative_eq!(w[0], 9.0, epsilon = 1e-12);
        assert_relative_eq!(w[1], 1.0, epsilon = 1e-12);

        let all = body.world_vertices(&pose);
        assert_relative_eq!(all[(2, 0)], w[0], epsilon = 1e-14);
        assert_relative_eq!(all[(2, 1)], w[1], epsilon = 1e-14);
    }
}
