//! Impact canonicalization: time sorting, edge-vertex lifting, pruning.

use ccd_types::{EdgeEdgeImpact, EdgeVertexImpact, NO_IMPACT};

/// Sort impacts ascending by time, ties broken lexicographically by
/// `(edge_index, vertex_index)`.
pub fn sort_edge_vertex_impacts(impacts: &mut [EdgeVertexImpact]) {
    impacts.sort_by(EdgeVertexImpact::time_ordering);
}

/// Lift edge-vertex impacts to edge-edge impacts.
///
/// Every edge containing the struck vertex yields one edge-edge impact;
/// the impacting alpha is the endpoint parameter (0 or 1) of the vertex in
/// that edge. Input order is preserved, so a time-sorted input stays
/// time-sorted.
#[must_use]
pub fn convert_edge_vertex_to_edge_edge_impacts(
    edges: &[[usize; 2]],
    ev_impacts: &[EdgeVertexImpact],
) -> Vec<EdgeEdgeImpact> {
    let mut ee_impacts = Vec::new();
    for ev in ev_impacts {
        for (e, edge) in edges.iter().enumerate() {
            let impacting_alpha = if edge[0] == ev.vertex_index {
                0.0
            } else if edge[1] == ev.vertex_index {
                1.0
            } else {
                continue;
            };
            ee_impacts.push(EdgeEdgeImpact {
                time: ev.time,
                impacted_edge_index: ev.edge_index,
                impacted_alpha: ev.alpha,
                impacting_edge_index: e,
                impacting_alpha,
            });
        }
    }
    ee_impacts
}

/// Assign to each edge the index of its earliest impact.
///
/// `ee_impacts` must be time-sorted; the map records the first impact that
/// involves each edge (either side), or [`NO_IMPACT`]. Returns the map and
/// the number of impacts that are not the earliest for any edge.
#[must_use]
pub fn prune_impacts(ee_impacts: &[EdgeEdgeImpact], num_edges: usize) -> (Vec<isize>, usize) {
    let mut edge_impact_map = vec![NO_IMPACT; num_edges];
    for (index, impact) in ee_impacts.iter().enumerate() {
        for edge in [impact.impacted_edge_index, impact.impacting_edge_index] {
            if edge_impact_map[edge] == NO_IMPACT {
                edge_impact_map[edge] = index as isize;
            }
        }
    }
    let referenced: std::collections::HashSet<isize> = edge_impact_map
        .iter()
        .copied()
        .filter(|&i| i != NO_IMPACT)
        .collect();
    let num_pruned = ee_impacts.len() - referenced.len();
    (edge_impact_map, num_pruned)
}
