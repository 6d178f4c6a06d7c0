//! Optimization problems driven by the `ccd-solver` crate.
//!
//! Two consumers of the CCD primitives:
//!
//! - [`VolumeNcpProblem`]: the flat-pipeline displacement optimization.
//!   Minimizes the distance to the input displacements subject to every
//!   space-time interference volume vanishing, solved as an NCP.
//! - [`DistanceBarrierRbProblem`]: the rigid-body step. Minimizes the
//!   mass-weighted distance to the integrator's candidate pose with the
//!   distance-barrier sum added to the objective, driven by the
//!   barrier-Newton continuation.

use ccd_math::{Dual1, Dual2, Scalar};
use ccd_solver::{BarrierProblem, ConstrainedProblem, UnconstrainedProblem};
use ccd_types::{
    DetectionMethod, EdgeVertexCandidate, Pose, ProblemSettings,
};
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::{CooMatrix, CscMatrix};

use crate::assembler::RigidBodyAssembler;
use crate::barrier::DistanceBarrierConstraint;
use crate::impacts::{
    convert_edge_vertex_to_edge_edge_impacts, prune_impacts, sort_edge_vertex_impacts,
};
use crate::narrow_phase::{detect_edge_vertex_collisions, DEFAULT_CCD_TOLERANCE};
use crate::stepper::{exponential_euler_step_2d, exponential_euler_step_3d};
use crate::volume::{compute_volumes_fixed_toi, compute_volumes_gradient};

/// Flat displacement optimization: `min 1/2 |u - u0|^2` subject to
/// `-V_e(u) >= 0` for every edge, i.e. no residual interference volume.
#[derive(Debug, Clone)]
pub struct VolumeNcpProblem {
    vertices: DMatrix<f64>,
    edges: Vec<[usize; 2]>,
    u0: DVector<f64>,
    volume_epsilon: f64,
    detection_method: DetectionMethod,
    is_dof_fixed: Vec<bool>,
}

impl VolumeNcpProblem {
    /// Set up the problem for a scene and its input displacements.
    #[must_use]
    pub fn new(
        vertices: DMatrix<f64>,
        edges: Vec<[usize; 2]>,
        displacements: &DMatrix<f64>,
        volume_epsilon: f64,
        detection_method: DetectionMethod,
    ) -> Self {
        let num_dofs = vertices.nrows() * vertices.ncols();
        Self {
            is_dof_fixed: vec![false; num_dofs],
            u0: flatten(displacements),
            vertices,
            edges,
            volume_epsilon,
            detection_method,
        }
    }

    /// The identity system matrix of the quadratic energy.
    #[must_use]
    pub fn system_matrix(&self) -> CscMatrix<f64> {
        let n = self.u0.len();
        let mut coo = CooMatrix::new(n, n);
        for i in 0..n {
            coo.push(i, i, 1.0);
        }
        CscMatrix::from(&coo)
    }

    /// The linear term of the quadratic energy.
    #[must_use]
    pub fn rhs(&self) -> DVector<f64> {
        self.u0.clone()
    }

    /// Volumes and their gradient at a displacement vector.
    fn volumes_and_gradient(&self, u: &DVector<f64>) -> (DVector<f64>, DMatrix<f64>) {
        let displacements = unflatten(u, self.vertices.ncols());
        let mut ev_impacts = detect_edge_vertex_collisions(
            &self.vertices,
            &displacements,
            &self.edges,
            None,
            self.detection_method,
            DEFAULT_CCD_TOLERANCE,
        );
        sort_edge_vertex_impacts(&mut ev_impacts);
        let ee_impacts = convert_edge_vertex_to_edge_edge_impacts(&self.edges, &ev_impacts);
        let (edge_impact_map, _) = prune_impacts(&ee_impacts, self.edges.len());

        let volumes = compute_volumes_fixed_toi(
            &self.vertices,
            &displacements,
            &self.edges,
            &ee_impacts,
            &edge_impact_map,
            self.volume_epsilon,
        )
        .unwrap_or_else(|_| DVector::zeros(self.edges.len()));
        let gradient = compute_volumes_gradient(
            &self.vertices,
            &displacements,
            &self.edges,
            &ee_impacts,
            &edge_impact_map,
            self.volume_epsilon,
        )
        .unwrap_or_else(|_| DMatrix::zeros(self.u0.len(), self.edges.len()));
        (volumes, gradient)
    }
}

impl UnconstrainedProblem for VolumeNcpProblem {
    fn num_vars(&self) -> usize {
        self.u0.len()
    }

    fn starting_point(&self) -> DVector<f64> {
        self.u0.clone()
    }

    fn is_dof_fixed(&self) -> &[bool] {
        &self.is_dof_fixed
    }

    fn eval_f(&mut self, x: &DVector<f64>) -> f64 {
        0.5 * (x - &self.u0).norm_squared()
    }

    fn eval_grad_f(&mut self, x: &DVector<f64>) -> DVector<f64> {
        x - &self.u0
    }

    fn eval_hessian_f(&mut self, _x: &DVector<f64>) -> CscMatrix<f64> {
        self.system_matrix()
    }
}

impl ConstrainedProblem for VolumeNcpProblem {
    fn num_constraints(&mut self) -> usize {
        self.edges.len()
    }

    fn eval_g(&mut self, x: &DVector<f64>) -> DVector<f64> {
        let (volumes, _) = self.volumes_and_gradient(x);
        -volumes
    }

    fn eval_jac_g(&mut self, x: &DVector<f64>) -> DMatrix<f64> {
        let (_, gradient) = self.volumes_and_gradient(x);
        -gradient.transpose()
    }

    fn has_collisions(&mut self, x_i: &DVector<f64>, x_j: &DVector<f64>) -> bool {
        let dim = self.vertices.ncols();
        let positions_i = &self.vertices + unflatten(x_i, dim);
        let positions_j = &self.vertices + unflatten(x_j, dim);
        let displacements = positions_j - &positions_i;
        !detect_edge_vertex_collisions(
            &positions_i,
            &displacements,
            &self.edges,
            None,
            self.detection_method,
            DEFAULT_CCD_TOLERANCE,
        )
        .is_empty()
    }
}

/// Rigid-body barrier step problem (2D).
///
/// The objective is `1/2 (sigma - sigma_hat)' M (sigma - sigma_hat)` plus
/// the barrier sum over the active edge-vertex candidates; gradients and
/// Hessians of the barrier terms come from local `2 * ndof` dual-number
/// evaluations scattered through the body ids.
pub struct DistanceBarrierRbProblem {
    /// The assembled scene.
    pub assembler: RigidBodyAssembler,
    /// The barrier constraint.
    pub constraint: DistanceBarrierConstraint,
    /// Weight of the barrier sum in the objective.
    pub barrier_stiffness: f64,
    /// Integration timestep.
    pub timestep: f64,
    /// Gravity vector.
    pub gravity: DVector<f64>,

    sigma_hat: DVector<f64>,
    sigma_t0: DVector<f64>,
    vertices_t0: DMatrix<f64>,
    is_dof_fixed: Vec<bool>,
    mass_diagonal: DVector<f64>,
    candidates: Vec<EdgeVertexCandidate>,
}

impl DistanceBarrierRbProblem {
    /// Build the problem from an assembled scene and the settings object.
    #[must_use]
    pub fn new(assembler: RigidBodyAssembler, settings: &ProblemSettings) -> Self {
        let constraint =
            DistanceBarrierConstraint::new(settings.distance_barrier_constraint.clone());
        let gravity = if settings.rigid_body_problem.gravity.is_empty() {
            DVector::zeros(assembler.dim())
        } else {
            DVector::from_vec(settings.rigid_body_problem.gravity.clone())
        };
        let scale = assembler.dof_to_pose_diagonal();
        let mass_pose = assembler.mass_matrix_diagonal();
        let mass_diagonal =
            DVector::from_fn(mass_pose.len(), |k, _| scale[k] * scale[k] * mass_pose[k]);

        let sigma_hat = assembler.poses_to_dofs(&assembler.poses());
        let sigma_t0 = assembler.poses_to_dofs(&assembler.poses_t0());
        let vertices_t0 = assembler.world_vertices(&assembler.poses_t0());
        let is_dof_fixed = assembler.is_dof_fixed();

        Self {
            constraint,
            barrier_stiffness: settings.barrier_solver.t_init,
            timestep: settings.rigid_body_problem.timestep,
            gravity,
            sigma_hat,
            sigma_t0,
            vertices_t0,
            is_dof_fixed,
            mass_diagonal,
            candidates: Vec::new(),
            assembler,
        }
    }

    /// Advance all bodies unconstrained and return whether the candidate
    /// step needs the barrier optimization (a collision along the step or
    /// an end-of-step distance at or below the threshold).
    pub fn simulation_step(&mut self) -> bool {
        let dim = self.assembler.dim();
        for body in &mut self.assembler.bodies {
            if dim == 2 {
                exponential_euler_step_2d(body, &self.gravity, self.timestep);
            } else {
                exponential_euler_step_3d(body, &self.gravity, self.timestep);
            }
        }
        self.vertices_t0 = self.assembler.world_vertices(&self.assembler.poses_t0());
        self.sigma_hat = self.assembler.poses_to_dofs(&self.assembler.poses());
        self.sigma_t0 = self.assembler.poses_to_dofs(&self.assembler.poses_t0());

        let mut had_collision =
            self.has_collisions_between(&self.sigma_t0.clone(), &self.sigma_hat.clone());

        match self.min_distance_at(&self.sigma_hat.clone()) {
            Some(d) => {
                tracing::debug!(min_distance = d, "candidate step");
                if d <= self.constraint.settings.min_distance {
                    had_collision = true;
                }
            }
            None => tracing::debug!("candidate step has no distance candidates"),
        }
        had_collision
    }

    /// Accept an optimized dof vector as the end-of-step poses.
    pub fn take_step(&mut self, sigma: &DVector<f64>) {
        match self.min_distance_at(sigma) {
            Some(d) => tracing::debug!(min_distance = d, "final step"),
            None => tracing::debug!("final step has no distance candidates"),
        }
        let poses = self.assembler.dofs_to_poses::<f64>(sigma);
        for (body, pose) in self.assembler.bodies.iter_mut().zip(poses) {
            body.pose = pose;
        }
    }

    /// Refresh the active candidate set at `sigma`.
    fn update_active_set(&mut self, sigma: &DVector<f64>) {
        let positions = self.world_vertices_at(sigma);
        let displacements = &positions - &self.vertices_t0;
        let groups = self.assembler.vertex_group_ids();
        self.candidates = self.constraint.get_active_candidates(
            &self.vertices_t0,
            &displacements,
            &self.assembler.edges(),
            Some(&groups),
        );
    }

    fn world_vertices_at(&self, sigma: &DVector<f64>) -> DMatrix<f64> {
        let poses = self.assembler.dofs_to_poses::<f64>(sigma);
        self.assembler.world_vertices(&poses)
    }

    fn has_collisions_between(&self, sigma_i: &DVector<f64>, sigma_j: &DVector<f64>) -> bool {
        let positions_i = self.world_vertices_at(sigma_i);
        let positions_j = self.world_vertices_at(sigma_j);
        let groups = self.assembler.vertex_group_ids();
        self.constraint.has_active_collisions(
            &positions_i,
            &positions_j,
            &self.assembler.edges(),
            Some(&groups),
        )
    }

    fn min_distance_at(&self, sigma: &DVector<f64>) -> Option<f64> {
        let positions = self.world_vertices_at(sigma);
        let groups = self.assembler.vertex_group_ids();
        self.constraint
            .min_distance(&positions, &self.assembler.edges(), Some(&groups))
    }

    /// The candidate's point-segment distance through a scalar, with the
    /// vertex body's dofs in local slots `0..ndof` and the edge body's in
    /// `ndof..2 ndof`.
    fn candidate_distance<S: Scalar>(
        &self,
        sigma: &DVector<f64>,
        candidate: &EdgeVertexCandidate,
        make_var: &dyn Fn(usize, f64) -> S,
    ) -> S {
        let ndof = self.assembler.ndof_per_body();
        let dim = self.assembler.dim();
        let edges = self.assembler.edges();
        let [e0, e1] = edges[candidate.edge_index];

        let (vertex_body, local_vertex) = self.assembler.global_to_local(candidate.vertex_index);
        let (edge_body, local_e0) = self.assembler.global_to_local(e0);
        let (edge_body_check, local_e1) = self.assembler.global_to_local(e1);
        debug_assert_eq!(edge_body, edge_body_check);
        debug_assert_ne!(vertex_body, edge_body);

        let scale = self.assembler.dof_to_pose_diagonal();
        let body_pose = |body: usize, slot: usize| -> Pose<S> {
            let dof = DVector::from_fn(ndof, |k, _| {
                make_var(slot * ndof + k, sigma[body * ndof + k])
                    * S::from_f64(scale[body * ndof + k])
            });
            Pose::from_dof(&dof, dim)
        };
        let vertex_pose = body_pose(vertex_body, 0);
        let edge_pose = body_pose(edge_body, 1);

        let point = self.assembler.bodies[vertex_body].world_vertex(&vertex_pose, local_vertex);
        let edge_vertex0 = self.assembler.bodies[edge_body].world_vertex(&edge_pose, local_e0);
        let edge_vertex1 = self.assembler.bodies[edge_body].world_vertex(&edge_pose, local_e1);
        ccd_geometry::point_segment_distance(&point, &edge_vertex0, &edge_vertex1)
    }

    fn candidate_bodies(&self, candidate: &EdgeVertexCandidate) -> (usize, usize) {
        let edges = self.assembler.edges();
        let (vertex_body, _) = self.assembler.global_to_local(candidate.vertex_index);
        let (edge_body, _) = self.assembler.global_to_local(edges[candidate.edge_index][0]);
        (vertex_body, edge_body)
    }
}

impl UnconstrainedProblem for DistanceBarrierRbProblem {
    fn num_vars(&self) -> usize {
        self.assembler.num_dofs()
    }

    fn starting_point(&self) -> DVector<f64> {
        // The barrier objective needs a feasible iterate: start from the
        // previous pose, which ended the last step collision-free, and let
        // the objective pull towards the candidate pose.
        self.sigma_t0.clone()
    }

    fn is_dof_fixed(&self) -> &[bool] {
        &self.is_dof_fixed
    }

    fn eval_f(&mut self, x: &DVector<f64>) -> f64 {
        self.update_active_set(x);
        let d = x - &self.sigma_hat;
        let inertia = 0.5 * d.component_mul(&self.mass_diagonal).dot(&d);
        let barrier: f64 = self
            .candidates
            .clone()
            .iter()
            .map(|c| {
                let distance = self.candidate_distance::<f64>(x, c, &|_, v| v);
                self.constraint.distance_barrier(distance)
            })
            .sum();
        inertia + self.barrier_stiffness * barrier
    }

    fn eval_grad_f(&mut self, x: &DVector<f64>) -> DVector<f64> {
        self.update_active_set(x);
        let ndof = self.assembler.ndof_per_body();
        let d = x - &self.sigma_hat;
        let mut gradient = d.component_mul(&self.mass_diagonal);

        for candidate in self.candidates.clone() {
            let n_local = 2 * ndof;
            let distance = self.candidate_distance::<Dual1>(x, &candidate, &|slot, v| {
                Dual1::variable(slot, v, n_local)
            });
            let barrier = self.constraint.distance_barrier(distance);
            let local = barrier.gradient(n_local);
            let (vertex_body, edge_body) = self.candidate_bodies(&candidate);
            for k in 0..ndof {
                gradient[vertex_body * ndof + k] += self.barrier_stiffness * local[k];
                gradient[edge_body * ndof + k] += self.barrier_stiffness * local[ndof + k];
            }
        }
        gradient
    }

    fn eval_hessian_f(&mut self, x: &DVector<f64>) -> CscMatrix<f64> {
        self.update_active_set(x);
        let ndof = self.assembler.ndof_per_body();
        let n = self.num_vars();
        let mut coo = CooMatrix::new(n, n);
        for k in 0..n {
            coo.push(k, k, self.mass_diagonal[k]);
        }

        for candidate in self.candidates.clone() {
            let n_local = 2 * ndof;
            let distance = self.candidate_distance::<Dual2>(x, &candidate, &|slot, v| {
                Dual2::variable(slot, v, n_local)
            });
            let barrier = self.constraint.distance_barrier(distance);
            let local = barrier.hessian(n_local);
            let (vertex_body, edge_body) = self.candidate_bodies(&candidate);
            let bodies = [vertex_body, edge_body];
            for (bi, &body_i) in bodies.iter().enumerate() {
                for (bj, &body_j) in bodies.iter().enumerate() {
                    for di in 0..ndof {
                        for dj in 0..ndof {
                            let value = local[(bi * ndof + di, bj * ndof + dj)];
                            if value != 0.0 {
                                coo.push(
                                    body_i * ndof + di,
                                    body_j * ndof + dj,
                                    self.barrier_stiffness * value,
                                );
                            }
                        }
                    }
                }
            }
        }
        CscMatrix::from(&coo)
    }
}

impl ConstrainedProblem for DistanceBarrierRbProblem {
    fn num_constraints(&mut self) -> usize {
        self.candidates.len()
    }

    fn eval_g(&mut self, x: &DVector<f64>) -> DVector<f64> {
        self.update_active_set(x);
        DVector::from_fn(self.candidates.len(), |k, _| {
            let candidate = self.candidates[k];
            let distance = self.candidate_distance::<f64>(x, &candidate, &|_, v| v);
            self.constraint.distance_barrier(distance)
        })
    }

    fn eval_jac_g(&mut self, x: &DVector<f64>) -> DMatrix<f64> {
        self.update_active_set(x);
        let ndof = self.assembler.ndof_per_body();
        let mut jacobian = DMatrix::zeros(self.candidates.len(), self.num_vars());
        for (row, candidate) in self.candidates.clone().iter().enumerate() {
            let n_local = 2 * ndof;
            let distance = self.candidate_distance::<Dual1>(x, candidate, &|slot, v| {
                Dual1::variable(slot, v, n_local)
            });
            let barrier = self.constraint.distance_barrier(distance);
            let local = barrier.gradient(n_local);
            let (vertex_body, edge_body) = self.candidate_bodies(candidate);
            for k in 0..ndof {
                jacobian[(row, vertex_body * ndof + k)] = local[k];
                jacobian[(row, edge_body * ndof + k)] = local[ndof + k];
            }
        }
        jacobian
    }

    fn has_collisions(&mut self, x_i: &DVector<f64>, x_j: &DVector<f64>) -> bool {
        self.has_collisions_between(x_i, x_j)
    }
}

impl BarrierProblem for DistanceBarrierRbProblem {
    fn barrier_epsilon(&self) -> f64 {
        self.constraint.barrier_epsilon
    }

    fn set_barrier_epsilon(&mut self, epsilon: f64) {
        self.constraint.barrier_epsilon = epsilon;
    }

    fn min_distance(&mut self, x: &DVector<f64>) -> Option<f64> {
        self.min_distance_at(x)
    }
}

fn flatten(m: &DMatrix<f64>) -> DVector<f64> {
    let dim = m.ncols();
    DVector::from_fn(m.nrows() * dim, |k, _| m[(k / dim, k % dim)])
}

fn unflatten(v: &DVector<f64>, dim: usize) -> DMatrix<f64> {
    DMatrix::from_fn(v.len() / dim, dim, |i, d| v[i * dim + d])
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ccd_types::Pose;
    use nalgebra::{dmatrix, dvector};

    use crate::rigid_body::RigidBody;

    fn two_body_problem(initial_epsilon: f64) -> DistanceBarrierRbProblem {
        let floor = RigidBody::from_points(
            dmatrix![
                -2.0, 0.0;
                 2.0, 0.0
            ],
            vec![[0, 1]],
            Vec::new(),
            Pose::new(dvector![0.0, 0.0], dvector![0.0]),
            Pose::zero(2),
            Pose::zero(2),
            1.0,
            vec![true; 3],
            false,
            None,
        );
        let falling = RigidBody::from_points(
            dmatrix![
                -0.5, 1.0;
                 0.5, 1.0
            ],
            vec![[0, 1]],
            Vec::new(),
            Pose::new(dvector![0.0, 1.0], dvector![0.0]),
            Pose::new(dvector![0.0, -1.0], dvector![0.0]),
            Pose::zero(2),
            1.0,
            vec![false; 3],
            false,
            None,
        );
        let assembler = RigidBodyAssembler::new(vec![floor, falling]);
        let settings = ProblemSettings::from_json(serde_json::json!({
            "distance_barrier_constraint": {
                "min_distance": 1e-6,
                "initial_epsilon": initial_epsilon,
                "detection_method": "brute_force"
            },
            "rigid_body_problem": { "timestep": 0.1, "gravity": [0.0, 0.0] }
        }))
        .unwrap();
        DistanceBarrierRbProblem::new(assembler, &settings)
    }

    #[test]
    fn barrier_gradient_matches_finite_differences() {
        let mut problem = two_body_problem(0.5);
        // Move the falling segment close to the floor so the barrier is
        // active.
        let mut sigma = problem.starting_point();
        sigma[4] = 0.2; // y of body 1
        let gradient = problem.eval_grad_f(&sigma);

        let h = 1e-7;
        for k in 0..sigma.len() {
            let mut plus = sigma.clone();
            plus[k] += h;
            let mut minus = sigma.clone();
            minus[k] -= h;
            let fd = (problem.eval_f(&plus) - problem.eval_f(&minus)) / (2.0 * h);
            assert_abs_diff_eq!(gradient[k], fd, epsilon = 1e-4 * gradient[k].abs().max(1.0));
        }
    }

    #[test]
    fn barrier_hessian_matches_finite_differences() {
        let mut problem = two_body_problem(0.5);
        let mut sigma = problem.starting_point();
        sigma[4] = 0.2;
        let hessian = problem.eval_hessian_f(&sigma);
        let hessian = DMatrix::from(&hessian);

        let h = 1e-6;
        for k in 0..sigma.len() {
            let mut plus = sigma.clone();
            plus[k] += h;
            let mut minus = sigma.clone();
            minus[k] -= h;
            let fd = (problem.eval_grad_f(&plus) - problem.eval_grad_f(&minus)) / (2.0 * h);
            for l in 0..sigma.len() {
                assert_abs_diff_eq!(
                    hessian[(l, k)],
                    fd[l],
                    epsilon = 1e-3 * hessian[(l, k)].abs().max(1.0)
                );
            }
        }
    }

    #[test]
    fn simulation_step_flags_close_approach() {
        let mut problem = two_body_problem(0.1);
        // One explicit step: the falling body moves from y=1 to y=0.9.
        assert!(!problem.simulation_step());
        // Keep stepping until the approach is flagged.
        let mut flagged = false;
        for _ in 0..12 {
            if problem.simulation_step() {
                flagged = true;
                break;
            }
        }
        assert!(flagged, "closing approach was never flagged");
    }
}
