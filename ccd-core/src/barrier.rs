//! Smooth distance barriers and the distance-barrier constraint.
//!
//! The barrier
//!
//! ```text
//! phi(d; eps) = -(d - eps)^2 * ln(d / eps)   for 0 < d < eps
//!             = 0                            for d >= eps
//! ```
//!
//! is C2 at `d = eps`, strictly decreasing on `(0, eps)` and diverges as
//! `d -> 0+`, which is what lets an interior-point step never produce an
//! intersection: the objective would have to pass through infinity first.

use ccd_math::Scalar;
use ccd_types::{CcdError, DetectionMethod, DistanceBarrierSettings, EdgeVertexCandidate};
use nalgebra::{DMatrix, DVector};

use crate::broad_phase::{detect_collision_candidates, GroupIds};
use crate::narrow_phase::{detect_edge_vertex_collisions, DEFAULT_CCD_TOLERANCE};

/// The scalar barrier function and its closed-form derivatives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceBarrier {
    /// Activation distance: the barrier vanishes for `d >= epsilon`.
    pub epsilon: f64,
}

impl DistanceBarrier {
    /// Create a barrier with the given activation distance.
    ///
    /// # Example
    ///
    /// ```
    /// use ccd_core::DistanceBarrier;
    ///
    /// let barrier = DistanceBarrier::new(0.5);
    /// // No penalty at or beyond the activation distance.
    /// assert_eq!(barrier.value(0.5), 0.0);
    /// assert_eq!(barrier.value(2.0), 0.0);
    /// // Monotone growth as the distance closes.
    /// assert!(barrier.value(0.1) > barrier.value(0.2));
    /// ```
    #[must_use]
    pub fn new(epsilon: f64) -> Self {
        Self { epsilon }
    }

    /// `phi(d)`, evaluable through any scalar for autodiff consistency.
    #[must_use]
    pub fn value_of<S: Scalar>(&self, d: S) -> S {
        if d.value() >= self.epsilon {
            return S::zero();
        }
        let eps = S::from_f64(self.epsilon);
        let shifted = d.clone() - eps.clone();
        -(shifted.square()) * (d / eps).ln()
    }

    /// `phi(d)`.
    #[must_use]
    pub fn value(&self, d: f64) -> f64 {
        self.value_of(d)
    }

    /// `phi'(d)`.
    #[must_use]
    pub fn derivative(&self, d: f64) -> f64 {
        if d >= self.epsilon {
            return 0.0;
        }
        let e = self.epsilon;
        -2.0 * (d - e) * (d / e).ln() - (d - e) * (d - e) / d
    }

    /// `phi''(d)`.
    #[must_use]
    pub fn second_derivative(&self, d: f64) -> f64 {
        if d >= self.epsilon {
            return 0.0;
        }
        let e = self.epsilon;
        -2.0 * (d / e).ln() - 4.0 * (d - e) / d + (d - e) * (d - e) / (d * d)
    }
}

/// The distance-barrier constraint over edge-vertex candidate pairs.
///
/// Harvests the candidate pairs within barrier reach of the end-of-step
/// configuration, evaluates one barrier term per pair, and answers the
/// trajectory collision probe used by line searches.
#[derive(Debug, Clone)]
pub struct DistanceBarrierConstraint {
    /// Static settings.
    pub settings: DistanceBarrierSettings,
    /// Current barrier activation distance (decays over the continuation).
    pub barrier_epsilon: f64,
}

impl DistanceBarrierConstraint {
    /// Create the constraint with epsilon at its initial value.
    #[must_use]
    pub fn new(settings: DistanceBarrierSettings) -> Self {
        let barrier_epsilon = settings.initial_epsilon;
        Self {
            settings,
            barrier_epsilon,
        }
    }

    /// The barrier at the current epsilon.
    #[must_use]
    pub fn barrier(&self) -> DistanceBarrier {
        DistanceBarrier::new(self.barrier_epsilon)
    }

    /// `phi(d)` at the current epsilon, generic in the scalar.
    #[must_use]
    pub fn distance_barrier<S: Scalar>(&self, d: S) -> S {
        self.barrier().value_of(d)
    }

    /// Candidate pairs whose end-of-step distance activates the barrier.
    #[must_use]
    pub fn get_active_candidates(
        &self,
        vertices: &DMatrix<f64>,
        displacements: &DMatrix<f64>,
        edges: &[[usize; 2]],
        groups: GroupIds<'_>,
    ) -> Vec<EdgeVertexCandidate> {
        let candidates = detect_collision_candidates(
            vertices,
            displacements,
            edges,
            &[],
            groups,
            self.settings.detection_method,
            self.barrier_epsilon,
        );
        let positions = vertices + displacements;
        candidates
            .ev
            .into_iter()
            .filter(|c| {
                candidate_distance(&positions, edges, c) < self.barrier_epsilon
            })
            .collect()
    }

    /// One barrier term per candidate, evaluated at the given end-of-step
    /// positions (generic so duals flow through).
    #[must_use]
    pub fn compute_candidates_constraints<S: Scalar>(
        &self,
        positions: &DMatrix<S>,
        edges: &[[usize; 2]],
        candidates: &[EdgeVertexCandidate],
    ) -> DVector<S> {
        DVector::from_fn(candidates.len(), |k, _| {
            let c = &candidates[k];
            let [i, j] = edges[c.edge_index];
            let d = ccd_geometry::point_segment_distance(
                &positions.row(c.vertex_index).transpose(),
                &positions.row(i).transpose(),
                &positions.row(j).transpose(),
            );
            self.distance_barrier(d)
        })
    }

    /// Does the linear trajectory between two configurations collide?
    #[must_use]
    pub fn has_active_collisions(
        &self,
        positions_i: &DMatrix<f64>,
        positions_j: &DMatrix<f64>,
        edges: &[[usize; 2]],
        groups: GroupIds<'_>,
    ) -> bool {
        let displacements = positions_j - positions_i;
        !detect_edge_vertex_collisions(
            positions_i,
            &displacements,
            edges,
            groups,
            self.settings.detection_method,
            DEFAULT_CCD_TOLERANCE,
        )
        .is_empty()
    }

    /// Minimum distance over all non-adjacent edge-vertex pairs of the
    /// configuration, `None` when the scene has no such pair.
    #[must_use]
    pub fn min_distance(
        &self,
        positions: &DMatrix<f64>,
        edges: &[[usize; 2]],
        groups: GroupIds<'_>,
    ) -> Option<f64> {
        let zero = DMatrix::zeros(positions.nrows(), positions.ncols());
        let candidates = detect_collision_candidates(
            positions,
            &zero,
            edges,
            &[],
            groups,
            DetectionMethod::BruteForce,
            0.0,
        );
        candidates
            .ev
            .iter()
            .map(|c| candidate_distance(positions, edges, c))
            .min_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
    }

    /// Multi-precision constraint evaluation.
    ///
    /// # Errors
    ///
    /// Always [`CcdError::NotImplemented`]: no multi-precision scalar is
    /// wired up yet, and an explicit gap beats returning an unconditional
    /// infinity.
    pub fn compute_constraints_multiprecision(
        &self,
        _positions: &DMatrix<f64>,
        _edges: &[[usize; 2]],
    ) -> Result<DVector<f64>, CcdError> {
        Err(CcdError::not_implemented(
            "multi-precision distance-barrier constraint evaluation",
        ))
    }
}

fn candidate_distance(
    positions: &DMatrix<f64>,
    edges: &[[usize; 2]],
    candidate: &EdgeVertexCandidate,
) -> f64 {
    let [i, j] = edges[candidate.edge_index];
    ccd_geometry::point_segment_distance(
        &positions.row(candidate.vertex_index).transpose(),
        &positions.row(i).transpose(),
        &positions.row(j).transpose(),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ccd_math::{Dual1, Dual2};

    #[test]
    fn barrier_support_and_monotonicity() {
        let barrier = DistanceBarrier::new(0.5);
        assert_eq!(barrier.value(0.5), 0.0);
        assert_eq!(barrier.value(2.0), 0.0);

        let mut previous = barrier.value(0.45);
        for k in 1..40 {
            let d = 0.45 - 0.011 * f64::from(k);
            let v = barrier.value(d);
            assert!(v > previous, "phi must grow as d drops");
            previous = v;
        }
        // Logarithmic divergence towards d = 0.
        assert!(barrier.value(1e-12) > barrier.value(1e-6));
        assert!(barrier.value(1e-6) > barrier.value(1e-3));
    }

    #[test]
    fn derivatives_match_finite_differences() {
        let barrier = DistanceBarrier::new(0.37);
        let h = 1e-8;
        for d in [0.01, 0.1, 0.2, 0.3, 0.36] {
            let fd1 = (barrier.value(d + h) - barrier.value(d - h)) / (2.0 * h);
            let exact1 = barrier.derivative(d);
            assert_abs_diff_eq!(exact1, fd1, epsilon = 1e-6 * exact1.abs().max(1.0));

            let fd2 =
                (barrier.derivative(d + h) - barrier.derivative(d - h)) / (2.0 * h);
            let exact2 = barrier.second_derivative(d);
            assert_abs_diff_eq!(exact2, fd2, epsilon = 1e-6 * exact2.abs().max(1.0));
        }
    }

    #[test]
    fn barrier_is_c2_at_the_activation_distance() {
        let barrier = DistanceBarrier::new(0.25);
        let d = 0.25 - 1e-9;
        assert_abs_diff_eq!(barrier.value(d), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(barrier.derivative(d), 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(barrier.second_derivative(d), 0.0, epsilon = 1e-3);
    }

    #[test]
    fn dual_evaluation_agrees_with_closed_forms() {
        let barrier = DistanceBarrier::new(0.4);
        let d = 0.13;
        let first = barrier.value_of(Dual1::variable(0, d, 1));
        assert_abs_diff_eq!(first.value, barrier.value(d), epsilon = 1e-14);
        assert_abs_diff_eq!(first.grad[0], barrier.derivative(d), epsilon = 1e-10);

        let second = barrier.value_of(Dual2::variable(0, d, 1));
        assert_abs_diff_eq!(
            second.hess[(0, 0)],
            barrier.second_derivative(d),
            epsilon = 1e-8
        );
    }

    #[test]
    fn candidate_constraints_chain_distance_into_the_barrier() {
        use nalgebra::dmatrix;

        let settings = DistanceBarrierSettings {
            initial_epsilon: 0.5,
            detection_method: DetectionMethod::BruteForce,
            ..DistanceBarrierSettings::default()
        };
        let constraint = DistanceBarrierConstraint::new(settings);

        // A vertex hovering 0.2 above an edge, within barrier reach.
        let vertices = dmatrix![
            -1.0, 0.0;
             1.0, 0.0;
             0.0, 0.4
        ];
        let displacements = dmatrix![
            0.0, 0.0;
            0.0, 0.0;
            0.0, -0.2
        ];
        let edges = vec![[0, 1]];
        let candidates = constraint.get_active_candidates(&vertices, &displacements, &edges, None);
        assert_eq!(candidates.len(), 1);

        let positions = &vertices + &displacements;
        let g = constraint.compute_candidates_constraints(&positions, &edges, &candidates);
        assert_eq!(g.len(), 1);
        assert_abs_diff_eq!(g[0], constraint.barrier().value(0.2), epsilon = 1e-12);

        // The dual path agrees with the chain rule: dphi/dy of the vertex
        // equals phi'(d) because the distance grows one-to-one with height.
        let n_vars = positions.nrows() * 2;
        let dual_positions = DMatrix::from_fn(positions.nrows(), 2, |i, d| {
            Dual1::variable(i * 2 + d, positions[(i, d)], n_vars)
        });
        let g_dual = constraint.compute_candidates_constraints(&dual_positions, &edges, &candidates);
        assert_abs_diff_eq!(
            g_dual[0].gradient(n_vars)[5],
            constraint.barrier().derivative(0.2),
            epsilon = 1e-10
        );
    }

    #[test]
    fn multiprecision_branch_is_explicitly_unimplemented() {
        let constraint =
            DistanceBarrierConstraint::new(DistanceBarrierSettings::default());
        let err = constraint
            .compute_constraints_multiprecision(&DMatrix::zeros(0, 2), &[])
            .unwrap_err();
        assert!(err.is_not_implemented());
    }
}
