//! Settings structs mirroring the JSON configuration layout.
//!
//! The problem settings file is one nested object:
//!
//! ```json
//! {
//!     "distance_barrier_constraint": { "min_distance": 1e-10, "initial_epsilon": 0.5 },
//!     "barrier_solver": { "inner_solver": "newton_solver", "e_b": 1e-6 },
//!     "newton_solver": { "max_iterations": 100 },
//!     "ncp_solver": { "do_line_search": false },
//!     "rigid_body_problem": { "timestep": 0.01, "gravity": [0.0, -9.8] }
//! }
//! ```
//!
//! The block named by `barrier_solver.inner_solver` configures the inner
//! solver and is looked up by name.

use serde::{Deserialize, Serialize};

use crate::error::CcdError;

/// Broad-phase algorithm selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    /// Check all pairs; used by tests and low-primitive scenes.
    BruteForce,
    /// Hash grid over swept AABBs.
    #[default]
    HashGrid,
}

/// How the NCP solver updates the iterate between LCP solves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NcpUpdate {
    /// Re-linearize `g` about the current iterate each outer iteration.
    #[default]
    Linearized,
    /// Use the constraint gradient at the current iterate directly.
    GGradient,
}

/// Inner LCP solver selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LcpSolverKind {
    /// Projected Gauss-Seidel sweeps.
    #[default]
    GaussSeidel,
    /// Commercial QP solver; accepted in configuration, not shipped.
    Mosek,
}

/// Settings of the distance-barrier constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistanceBarrierSettings {
    /// Step acceptance threshold: the optimization runs whenever the
    /// candidate step ends with a distance at or below this.
    pub min_distance: f64,
    /// Barrier activation distance at the start of the continuation.
    pub initial_epsilon: f64,
    /// Broad-phase method used to harvest barrier candidates.
    pub detection_method: DetectionMethod,
}

impl Default for DistanceBarrierSettings {
    fn default() -> Self {
        Self {
            min_distance: 1e-10,
            initial_epsilon: 0.5,
            detection_method: DetectionMethod::HashGrid,
        }
    }
}

/// Settings of the barrier-Newton outer solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BarrierSolverSettings {
    /// Name of the JSON block configuring the inner solver.
    pub inner_solver: String,
    /// Terminal barrier activation distance; the continuation stops once
    /// epsilon decays below this.
    pub e_b: f64,
    /// Barrier stiffness (weight of the barrier sum in the objective).
    pub t_init: f64,
    /// Epsilon decay divisor applied after each converged epoch.
    pub t_inc: f64,
    /// Sufficient-decrease constant of the inner line search.
    pub c: f64,
    /// Outer epoch budget.
    pub max_iterations: usize,
}

impl Default for BarrierSolverSettings {
    fn default() -> Self {
        Self {
            inner_solver: "newton_solver".to_string(),
            e_b: 1e-6,
            t_init: 1.0,
            t_inc: 2.0,
            c: 0.01,
            max_iterations: 50,
        }
    }
}

/// Settings of the nonlinear complementarity solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NcpSettings {
    /// Outer iteration budget.
    pub max_iterations: usize,
    /// Termination tolerance on the stationarity + complementarity residual.
    pub convergence_tolerance: f64,
    /// Accept updates only when the merit function strictly decreases.
    pub do_line_search: bool,
    /// Restrict the inner LCP to the currently active constraints.
    pub solve_for_active_cstr: bool,
    /// Iterate update scheme.
    pub update_type: NcpUpdate,
    /// Inner LCP solver.
    pub lcp_solver: LcpSolverKind,
}

impl Default for NcpSettings {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            convergence_tolerance: 1e-6,
            do_line_search: true,
            solve_for_active_cstr: false,
            update_type: NcpUpdate::Linearized,
            lcp_solver: LcpSolverKind::GaussSeidel,
        }
    }
}

/// Settings of the rigid-body simulation problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigidBodyProblemSettings {
    /// Integration timestep.
    pub timestep: f64,
    /// Gravity vector; its length must match the scene dimension.
    pub gravity: Vec<f64>,
}

impl Default for RigidBodyProblemSettings {
    fn default() -> Self {
        Self {
            timestep: 1e-2,
            gravity: Vec::new(),
        }
    }
}

/// The full nested settings object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProblemSettings {
    /// `distance_barrier_constraint` block.
    #[serde(default)]
    pub distance_barrier_constraint: DistanceBarrierSettings,
    /// `barrier_solver` block.
    #[serde(default)]
    pub barrier_solver: BarrierSolverSettings,
    /// `rigid_body_problem` block.
    #[serde(default)]
    pub rigid_body_problem: RigidBodyProblemSettings,
    /// Remaining blocks, including the named inner solver's own block.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ProblemSettings {
    /// Parse settings from a JSON value, rejecting malformed input at the
    /// boundary.
    ///
    /// # Example
    ///
    /// ```
    /// use ccd_types::ProblemSettings;
    /// use serde_json::json;
    ///
    /// let settings = ProblemSettings::from_json(json!({
    ///     "barrier_solver": { "inner_solver": "newton_solver", "e_b": 1e-5 }
    /// })).unwrap();
    /// assert_eq!(settings.barrier_solver.e_b, 1e-5);
    /// // Unspecified blocks fall back to defaults.
    /// assert_eq!(settings.rigid_body_problem.timestep, 1e-2);
    /// ```
    pub fn from_json(value: serde_json::Value) -> Result<Self, CcdError> {
        serde_json::from_value(value).map_err(|e| CcdError::invalid_input(e.to_string()))
    }

    /// The JSON block configuring the named inner solver, if present.
    #[must_use]
    pub fn inner_solver_settings(&self) -> Option<&serde_json::Value> {
        self.extra.get(&self.barrier_solver.inner_solver)
    }

    /// The NCP solver block (`ncp_solver`), parsed when present.
    pub fn ncp_settings(&self) -> Result<NcpSettings, CcdError> {
        match self.extra.get("ncp_solver") {
            None => Ok(NcpSettings::default()),
            Some(v) => serde_json::from_value(v.clone())
                .map_err(|e| CcdError::invalid_input(e.to_string())),
        }
    }
}
