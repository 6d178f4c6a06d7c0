//! The flat-pipeline scene state.
//!
//! [`State`] holds the immutable geometry (vertices, edges), the mutable
//! trajectory (displacements), and the step-scoped results (impacts,
//! volumes, gradients). Results are cleared by every mutation and
//! rematerialized by [`State::run_full_pipeline`]; nothing survives a step.

use ccd_solver::{NcpSolver, OptimizationResults};
use ccd_types::{
    CcdError, DetectionMethod, DistanceBarrierSettings, EdgeEdgeImpact, EdgeVertexImpact,
    NcpSettings, NO_IMPACT,
};
use nalgebra::{DMatrix, DVector, RowDVector};

use crate::barrier::DistanceBarrierConstraint;
use crate::impacts::{
    convert_edge_vertex_to_edge_edge_impacts, prune_impacts, sort_edge_vertex_impacts,
};
use crate::narrow_phase::{detect_edge_vertex_collisions, DEFAULT_CCD_TOLERANCE};
use crate::problems::VolumeNcpProblem;
use crate::scene::SceneFile;
use crate::volume::{compute_volumes_fixed_toi, compute_volumes_gradient};

/// Scene state and the in-process API surface of the flat 2D pipeline.
#[derive(Debug, Clone)]
pub struct State {
    /// Vertex positions, `n x 2`.
    pub vertices: DMatrix<f64>,
    /// Edges as vertex-index pairs.
    pub edges: Vec<[usize; 2]>,
    /// Input displacements over the step.
    pub displacements: DMatrix<f64>,
    /// Optimized displacements (output of [`State::optimize_displacements`]).
    pub opt_displacements: DMatrix<f64>,

    /// Edge-vertex impacts of the current step, time-sorted.
    pub ev_impacts: Vec<EdgeVertexImpact>,
    /// Lifted edge-edge impacts.
    pub ee_impacts: Vec<EdgeEdgeImpact>,
    /// Earliest impact per edge ([`NO_IMPACT`] when none).
    pub edge_impact_map: Vec<isize>,
    /// Impacts that are not the earliest for any edge.
    pub num_pruned_impacts: usize,
    /// Space-time interference volume per edge.
    pub volumes: DVector<f64>,
    /// Volume gradient, `(2 n) x num_edges`.
    pub volume_grad: DMatrix<f64>,

    /// Volume time-scale parameter.
    pub volume_epsilon: f64,
    /// Broad-phase method.
    pub detection_method: DetectionMethod,
    /// NCP solver configuration for the displacement optimization.
    pub ncp_settings: NcpSettings,

    /// Canvas width the scene is rescaled into on load.
    pub canvas_width: f64,
    /// Canvas height the scene is rescaled into on load.
    pub canvas_height: f64,
}

impl Default for State {
    fn default() -> Self {
        Self {
            vertices: DMatrix::zeros(0, 2),
            edges: Vec::new(),
            displacements: DMatrix::zeros(0, 2),
            opt_displacements: DMatrix::zeros(0, 2),
            ev_impacts: Vec::new(),
            ee_impacts: Vec::new(),
            edge_impact_map: Vec::new(),
            num_pruned_impacts: 0,
            volumes: DVector::zeros(0),
            volume_grad: DMatrix::zeros(0, 0),
            volume_epsilon: 1e-3,
            detection_method: DetectionMethod::HashGrid,
            ncp_settings: NcpSettings::default(),
            canvas_width: 10.0,
            canvas_height: 10.0,
        }
    }
}

impl State {
    /// Load a scene file, rescaling it to fit the canvas.
    pub fn load_scene(&mut self, path: &std::path::Path) -> Result<(), CcdError> {
        let scene = SceneFile::read(path)?;
        self.load_scene_file(&scene);
        Ok(())
    }

    /// Load an in-memory scene, rescaling it to fit the canvas.
    pub fn load_scene_file(&mut self, scene: &SceneFile) {
        self.vertices = scene.vertices_matrix();
        self.edges = scene.edge_list();
        self.displacements = scene.displacements_matrix();
        self.fit_scene_to_canvas();
        self.reset_scene();
    }

    /// Save the scene (vertices, edges, displacements).
    pub fn save_scene(&self, path: &std::path::Path) -> Result<(), CcdError> {
        SceneFile::from_parts(&self.vertices, &self.edges, &self.displacements).write(path)
    }

    /// Clear all step-scoped results and the optimization output.
    pub fn reset_scene(&mut self) {
        self.reset_impacts();
        self.opt_displacements = DMatrix::zeros(self.vertices.nrows(), 2);
    }

    fn fit_scene_to_canvas(&mut self) {
        if self.vertices.nrows() == 0 {
            return;
        }
        let end = &self.vertices + &self.displacements;
        let mut min = [f64::INFINITY; 2];
        let mut max = [f64::NEG_INFINITY; 2];
        let mut center = [0.0; 2];
        for source in [&self.vertices, &end] {
            for i in 0..source.nrows() {
                for d in 0..2 {
                    min[d] = min[d].min(source[(i, d)]);
                    max[d] = max[d].max(source[(i, d)]);
                }
            }
        }
        for d in 0..2 {
            center[d] = 0.5 * (min[d] + max[d]);
        }
        let bbox = [max[0] - min[0], max[1] - min[1]];
        if bbox[0] > self.canvas_width || bbox[1] > self.canvas_height {
            let scale = (self.canvas_width * 0.5 / bbox[0])
                .min(self.canvas_height * 0.5 / bbox[1]);
            for i in 0..self.vertices.nrows() {
                for d in 0..2 {
                    self.vertices[(i, d)] = (self.vertices[(i, d)] - center[d]) * scale;
                    self.displacements[(i, d)] *= scale;
                }
            }
        }
    }

    /// Append a vertex (with a small default downward displacement, so new
    /// points participate in the step).
    pub fn add_vertex(&mut self, position: RowDVector<f64>) {
        let n = self.vertices.nrows();
        self.vertices = self.vertices.clone().insert_row(n, 0.0);
        self.displacements = self.displacements.clone().insert_row(n, 0.0);
        self.opt_displacements = self.opt_displacements.clone().insert_row(n, 0.0);
        for d in 0..2 {
            self.vertices[(n, d)] = position[d];
        }
        self.displacements[(n, 0)] = 0.0;
        self.displacements[(n, 1)] = -0.1;
        self.reset_impacts();
    }

    /// Append edges.
    ///
    /// # Errors
    ///
    /// [`CcdError::InvalidInput`] when an edge references a missing vertex.
    pub fn add_edges(&mut self, new_edges: &[[usize; 2]]) -> Result<(), CcdError> {
        let n = self.vertices.nrows();
        for &[i, j] in new_edges {
            if i >= n || j >= n {
                return Err(CcdError::invalid_input(format!(
                    "edge ({i}, {j}) references a missing vertex"
                )));
            }
            if i == j {
                return Err(CcdError::invalid_input(format!("degenerate edge ({i}, {j})")));
            }
            self.edges.push([i, j]);
        }
        self.reset_impacts();
        Ok(())
    }

    /// Overwrite one vertex position.
    pub fn set_vertex_position(&mut self, vertex_index: usize, position: RowDVector<f64>) {
        for d in 0..2 {
            self.vertices[(vertex_index, d)] = position[d];
        }
        self.reset_impacts();
    }

    /// Translate one vertex.
    pub fn move_vertex(&mut self, vertex_index: usize, delta: RowDVector<f64>) {
        for d in 0..2 {
            self.vertices[(vertex_index, d)] += delta[d];
        }
        self.reset_impacts();
    }

    /// Translate one vertex's displacement.
    pub fn move_displacement(&mut self, vertex_index: usize, delta: RowDVector<f64>) {
        for d in 0..2 {
            self.displacements[(vertex_index, d)] += delta[d];
        }
        self.reset_impacts();
    }

    /// Clear the step-scoped results.
    pub fn reset_impacts(&mut self) {
        let num_edges = self.edges.len();
        self.ev_impacts.clear();
        self.ee_impacts.clear();
        self.edge_impact_map = vec![NO_IMPACT; num_edges];
        self.num_pruned_impacts = 0;
        self.volumes = DVector::zeros(num_edges);
        self.volume_grad = DMatrix::zeros(self.vertices.nrows() * 2, num_edges);
    }

    /// Detect, sort, lift and prune this step's impacts.
    pub fn detect_edge_vertex_collisions(&mut self) {
        self.ev_impacts = detect_edge_vertex_collisions(
            &self.vertices,
            &self.displacements,
            &self.edges,
            None,
            self.detection_method,
            DEFAULT_CCD_TOLERANCE,
        );
        sort_edge_vertex_impacts(&mut self.ev_impacts);
        self.ee_impacts = convert_edge_vertex_to_edge_edge_impacts(&self.edges, &self.ev_impacts);
        let (map, num_pruned) = prune_impacts(&self.ee_impacts, self.edges.len());
        self.edge_impact_map = map;
        self.num_pruned_impacts = num_pruned;
    }

    /// Evaluate the interference volumes and their gradient for the
    /// recorded impacts.
    ///
    /// # Errors
    ///
    /// [`CcdError::DegenerateEdge`] from the volume kernel.
    pub fn compute_collision_volumes(&mut self) -> Result<(), CcdError> {
        self.volumes = compute_volumes_fixed_toi(
            &self.vertices,
            &self.displacements,
            &self.edges,
            &self.ee_impacts,
            &self.edge_impact_map,
            self.volume_epsilon,
        )?;
        self.volume_grad = compute_volumes_gradient(
            &self.vertices,
            &self.displacements,
            &self.edges,
            &self.ee_impacts,
            &self.edge_impact_map,
            self.volume_epsilon,
        )?;
        Ok(())
    }

    /// Detection followed by volume evaluation.
    ///
    /// # Errors
    ///
    /// [`CcdError::DegenerateEdge`] from the volume kernel.
    pub fn run_full_pipeline(&mut self) -> Result<(), CcdError> {
        self.detect_edge_vertex_collisions();
        self.compute_collision_volumes()
    }

    /// The earliest impact recorded for an edge.
    #[must_use]
    pub fn get_edge_impact(&self, edge_index: usize) -> Option<&EdgeEdgeImpact> {
        let index = self.edge_impact_map[edge_index];
        (index != NO_IMPACT).then(|| &self.ee_impacts[index as usize])
    }

    /// Optimize the displacements so that no interference volume remains,
    /// staying as close as possible to the input displacements.
    ///
    /// # Errors
    ///
    /// Solver configuration errors from [`NcpSolver::solve_ncp`].
    pub fn optimize_displacements(&mut self) -> Result<OptimizationResults, CcdError> {
        let mut problem = VolumeNcpProblem::new(
            self.vertices.clone(),
            self.edges.clone(),
            &self.displacements.clone(),
            self.volume_epsilon,
            self.detection_method,
        );
        let solver = NcpSolver::new(self.ncp_settings.clone());
        let results = solver.solve_ncp(&problem.system_matrix(), &problem.rhs(), &mut problem)?;

        self.opt_displacements =
            DMatrix::from_fn(self.vertices.nrows(), 2, |i, d| results.x[i * 2 + d]);
        Ok(OptimizationResults {
            minf: 0.5 * (&results.x - &problem.rhs()).norm_squared(),
            x: results.x,
            success: results.success,
            iterations: results.iterations,
        })
    }

    /// Does the linear trajectory between two configurations collide?
    #[must_use]
    pub fn has_collisions(&self, positions_i: &DMatrix<f64>, positions_j: &DMatrix<f64>) -> bool {
        let displacements = positions_j - positions_i;
        !detect_edge_vertex_collisions(
            positions_i,
            &displacements,
            &self.edges,
            None,
            self.detection_method,
            DEFAULT_CCD_TOLERANCE,
        )
        .is_empty()
    }

    /// Vertex positions at a time along the step.
    #[must_use]
    pub fn get_vertices_at_time(&self, time: f64) -> DMatrix<f64> {
        &self.vertices + &self.displacements * time
    }

    /// Export the solver-facing state: currently the minimum distance over
    /// all candidate pairs (`null` when the scene has no candidates).
    #[must_use]
    pub fn state_json(&self) -> serde_json::Value {
        let constraint = DistanceBarrierConstraint::new(DistanceBarrierSettings::default());
        let min_distance = constraint.min_distance(&self.vertices, &self.edges, None);
        serde_json::json!({ "min_distance": min_distance })
    }
}
