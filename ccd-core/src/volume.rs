//! Space-time interference volumes and their derivatives.
//!
//! For an edge with a recorded impact at time `toi` and edge parameter
//! `alpha`, the volume
//!
//! ```text
//! V = (1 - toi) * sqrt(eps^2 |e(toi)|^2 + (U_alpha . e(toi)_perp)^2)
//! ```
//!
//! summarizes how deep and how long the collision persists in the step:
//! it vanishes exactly at `toi = 1` and grows with the normal component of
//! the impact-point displacement `U_alpha = (1 - alpha) U_i + alpha U_j`.
//! `eps` sets the minimal-volume time scale.
//!
//! Gradients are obtained by re-running the closed-form time-of-impact and
//! the volume through first-order duals in the displacement dofs.

use ccd_math::{Dual1, Scalar};
use ccd_types::{CcdError, EdgeEdgeImpact, NO_IMPACT};
use nalgebra::{DMatrix, DVector};

use crate::narrow_phase::compute_edge_vertex_time_of_impact_quadratic;

/// Edge lengths below this raise [`CcdError::DegenerateEdge`].
pub const EDGE_LENGTH_EPSILON: f64 = 1e-10;

/// The space-time interference volume of one edge.
///
/// # Errors
///
/// [`CcdError::DegenerateEdge`] when the edge direction at the time of
/// impact is shorter than [`EDGE_LENGTH_EPSILON`].
pub fn space_time_collision_volume<S: Scalar>(
    vertex_i: &DVector<S>,
    vertex_j: &DVector<S>,
    displacement_i: &DVector<S>,
    displacement_j: &DVector<S>,
    toi: &S,
    alpha: &S,
    epsilon: f64,
) -> Result<S, CcdError> {
    // e(toi)
    let edge = (vertex_j + displacement_j * toi.clone())
        - (vertex_i + displacement_i * toi.clone());
    let edge_length_sq = edge.dot(&edge);
    let edge_length = edge_length_sq.value().sqrt();
    if edge_length < EDGE_LENGTH_EPSILON {
        return Err(CcdError::DegenerateEdge {
            length: edge_length,
            tolerance: EDGE_LENGTH_EPSILON,
        });
    }

    // U_alpha . e_perp, the normal component of the impact-point motion.
    let u_alpha = displacement_i * (S::one() - alpha.clone()) + displacement_j * alpha.clone();
    let edge_perp = DVector::from_vec(vec![-edge[1].clone(), edge[0].clone()]);
    let normal_motion = u_alpha.dot(&edge_perp);

    let volume = (S::one() - toi.clone())
        * (S::from_f64(epsilon * epsilon) * edge_length_sq + normal_motion.square()).sqrt();
    Ok(volume)
}

/// The volume of `edge_index` under `impact`, reading the edge's own alpha
/// from whichever side of the impact it is.
///
/// # Errors
///
/// [`CcdError::DegenerateEdge`] propagated from the volume kernel.
pub fn collision_volume_fixed_toi(
    vertices: &DMatrix<f64>,
    displacements: &DMatrix<f64>,
    edges: &[[usize; 2]],
    impact: &EdgeEdgeImpact,
    edge_index: usize,
    epsilon: f64,
) -> Result<f64, CcdError> {
    debug_assert!(impact.involves_edge(edge_index));
    let alpha = if impact.impacted_edge_index == edge_index {
        impact.impacted_alpha
    } else {
        impact.impacting_alpha
    };
    let [i, j] = edges[edge_index];
    space_time_collision_volume(
        &vertices.row(i).transpose(),
        &vertices.row(j).transpose(),
        &displacements.row(i).transpose(),
        &displacements.row(j).transpose(),
        &impact.time,
        &alpha,
        epsilon,
    )
}

/// Volumes for every edge with a recorded impact; zero elsewhere.
///
/// # Errors
///
/// [`CcdError::DegenerateEdge`] propagated from the volume kernel.
pub fn compute_volumes_fixed_toi(
    vertices: &DMatrix<f64>,
    displacements: &DMatrix<f64>,
    edges: &[[usize; 2]],
    ee_impacts: &[EdgeEdgeImpact],
    edge_impact_map: &[isize],
    epsilon: f64,
) -> Result<DVector<f64>, CcdError> {
    let mut volumes = DVector::zeros(edges.len());
    for (edge_index, &impact_index) in edge_impact_map.iter().enumerate() {
        if impact_index == NO_IMPACT {
            continue;
        }
        let impact = &ee_impacts[impact_index as usize];
        volumes[edge_index] = collision_volume_fixed_toi(
            vertices,
            displacements,
            edges,
            impact,
            edge_index,
            epsilon,
        )?;
    }
    Ok(volumes)
}

/// Gradient of every edge volume with respect to all displacement dofs.
///
/// Returns a `(num_vertices * dim) x num_edges` matrix (dof-major rows,
/// `[x, y]` per vertex); columns of impact-free edges are zero. The time of
/// impact and the edge parameter are differentiated through the closed-form
/// narrow phase, so the gradient sees the full dependence of the volume on
/// the displacements.
///
/// # Errors
///
/// [`CcdError::DegenerateEdge`] propagated from the volume kernel.
pub fn compute_volumes_gradient(
    vertices: &DMatrix<f64>,
    displacements: &DMatrix<f64>,
    edges: &[[usize; 2]],
    ee_impacts: &[EdgeEdgeImpact],
    edge_impact_map: &[isize],
    epsilon: f64,
) -> Result<DMatrix<f64>, CcdError> {
    let dim = vertices.ncols();
    debug_assert_eq!(dim, 2);
    let num_dofs = vertices.nrows() * dim;
    let mut gradient = DMatrix::zeros(num_dofs, edges.len());

    let dual_row = |m: &DMatrix<f64>, v: usize, active: bool| -> DVector<Dual1> {
        DVector::from_fn(dim, |d, _| {
            if active {
                Dual1::variable(v * dim + d, m[(v, d)], num_dofs)
            } else {
                Dual1::constant(m[(v, d)])
            }
        })
    };

    for (edge_index, &impact_index) in edge_impact_map.iter().enumerate() {
        if impact_index == NO_IMPACT {
            continue;
        }
        let impact = &ee_impacts[impact_index as usize];

        // The generating pair: the struck vertex is the endpoint of the
        // impacting edge selected by its alpha.
        let impacting = edges[impact.impacting_edge_index];
        let vertex_index = if impact.impacting_alpha == 0.0 {
            impacting[0]
        } else {
            impacting[1]
        };
        let [ei, ej] = edges[impact.impacted_edge_index];

        // Re-derive (toi, alpha) differentiably.
        let toi_alpha = compute_edge_vertex_time_of_impact_quadratic(
            &dual_row(vertices, vertex_index, false),
            &dual_row(displacements, vertex_index, true),
            &dual_row(vertices, ei, false),
            &dual_row(displacements, ei, true),
            &dual_row(vertices, ej, false),
            &dual_row(displacements, ej, true),
        );
        // A recorded impact can sit outside the closed-form tolerance by a
        // hair; fall back to the frozen impact parameters.
        let (toi, alpha) = toi_alpha.unwrap_or_else(|| {
            (
                Dual1::constant(impact.time),
                Dual1::constant(impact.impacted_alpha),
            )
        });

        let own_alpha = if impact.impacted_edge_index == edge_index {
            alpha
        } else {
            Dual1::constant(impact.impacting_alpha)
        };
        let [i, j] = edges[edge_index];
        let volume = space_time_collision_volume(
            &dual_row(vertices, i, false),
            &dual_row(vertices, j, false),
            &dual_row(displacements, i, true),
            &dual_row(displacements, j, true),
            &toi,
            &own_alpha,
            epsilon,
        )?;
        gradient.set_column(edge_index, &volume.gradient(num_dofs));
    }
    Ok(gradient)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra::{dmatrix, dvector};

    #[test]
    fn volume_is_nonnegative_and_zero_at_end_of_step() {
        let vi = dvector![-1.0, 0.0];
        let vj = dvector![1.0, 0.0];
        let ui = dvector![0.0, 0.1];
        let uj = dvector![0.0, -0.3];
        for toi in [0.0, 0.25, 0.5, 0.99] {
            let v =
                space_time_collision_volume(&vi, &vj, &ui, &uj, &toi, &0.5, 1e-3).unwrap();
            assert!(v >= 0.0);
        }
        let at_end =
            space_time_collision_volume(&vi, &vj, &ui, &uj, &1.0, &0.5, 1e-3).unwrap();
        assert_eq!(at_end, 0.0);
    }

    #[test]
    fn degenerate_edge_is_a_typed_failure() {
        let v = dvector![0.0, 0.0];
        let err = space_time_collision_volume(
            &v.clone(),
            &v.clone(),
            &dvector![0.0, 0.0],
            &dvector![0.0, 0.0],
            &0.5,
            &0.5,
            1e-3,
        )
        .unwrap_err();
        assert!(err.is_degenerate_edge());
    }

    #[test]
    fn gradient_matches_finite_differences() {
        // Perpendicular impact scene: vertex 2 falls onto edge (0, 1).
        let vertices = dmatrix![
            -1.0, 0.0;
             1.0, 0.0;
             0.0, 1.0;
             0.0, 2.0
        ];
        let displacements = dmatrix![
            0.0, 0.0;
            0.0, 0.0;
            0.0, -2.0;
            0.0, -2.0
        ];
        let edges = vec![[0, 1], [2, 3]];
        let epsilon = 1e-3;

        let impact = EdgeEdgeImpact {
            time: 0.5,
            impacted_edge_index: 0,
            impacted_alpha: 0.5,
            impacting_edge_index: 1,
            impacting_alpha: 0.0,
        };
        let ee_impacts = vec![impact];
        let edge_impact_map = vec![0, 0];

        let gradient = compute_volumes_gradient(
            &vertices,
            &displacements,
            &edges,
            &ee_impacts,
            &edge_impact_map,
            epsilon,
        )
        .unwrap();

        // Central finite differences through the full pipeline: perturb a
        // displacement dof, recompute the impact, recompute the volume.
        let h = 1e-7;
        let volume_of = |displacements: &DMatrix<f64>, edge_index: usize| -> f64 {
            let (toi, alpha) = crate::narrow_phase::compute_edge_vertex_time_of_impact_quadratic(
                &vertices.row(2).transpose(),
                &displacements.row(2).transpose(),
                &vertices.row(0).transpose(),
                &displacements.row(0).transpose(),
                &vertices.row(1).transpose(),
                &displacements.row(1).transpose(),
            )
            .unwrap();
            let own_alpha = if edge_index == 0 { alpha } else { 0.0 };
            let [i, j] = edges[edge_index];
            space_time_collision_volume(
                &vertices.row(i).transpose(),
                &vertices.row(j).transpose(),
                &displacements.row(i).transpose(),
                &displacements.row(j).transpose(),
                &toi,
                &own_alpha,
                epsilon,
            )
            .unwrap()
        };

        for edge_index in 0..2 {
            for dof in 0..8 {
                let (v, d) = (dof / 2, dof % 2);
                let mut plus = displacements.clone();
                plus[(v, d)] += h;
                let mut minus = displacements.clone();
                minus[(v, d)] -= h;
                let fd = (volume_of(&plus, edge_index) - volume_of(&minus, edge_index))
                    / (2.0 * h);
                assert_abs_diff_eq!(gradient[(dof, edge_index)], fd, epsilon = 1e-5);
            }
        }
    }
}
