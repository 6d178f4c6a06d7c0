//! Broad-phase candidate generation over swept AABBs.
//!
//! Every primitive is bounded by the axis-aligned hull of its vertices at
//! `t = 0` and `t = 1`, inflated by `inflation_radius`. The hash grid bins
//! those boxes into cells of one mean edge length (a balance between cell
//! population and cell count) and pairs up co-occupants of the right type
//! combination; the brute-force fallback checks all pairs and is used by
//! tests and low-primitive scenes.
//!
//! Candidate sets are de-duplicated with canonical ordering but **not**
//! sorted by time; the narrow phase establishes times.

use ccd_types::{
    DetectionMethod, EdgeEdgeCandidate, EdgeVertexCandidate, FaceVertexCandidate,
};
use hashbrown::HashMap;
use nalgebra::{DMatrix, DVector};

use crate::aabb::Aabb;

/// Broad-phase output: index pairs only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateSet {
    /// Edge-vertex candidates (2D).
    pub ev: Vec<EdgeVertexCandidate>,
    /// Edge-edge candidates (3D).
    pub ee: Vec<EdgeEdgeCandidate>,
    /// Face-vertex candidates (3D).
    pub fv: Vec<FaceVertexCandidate>,
}

impl CandidateSet {
    /// Total number of candidates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ev.len() + self.ee.len() + self.fv.len()
    }

    /// True iff no candidates were produced.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn canonicalize(&mut self) {
        self.ev.sort_unstable();
        self.ev.dedup();
        self.ee.sort_unstable();
        self.ee.dedup();
        self.fv.sort_unstable();
        self.fv.dedup();
    }
}

/// Per-vertex collision group: vertices carrying the same group never pair
/// up (they belong to the same body).
pub type GroupIds<'a> = Option<&'a [usize]>;

fn same_group(groups: GroupIds<'_>, a: usize, b: usize) -> bool {
    groups.is_some_and(|g| g[a] == g[b])
}

fn row(m: &DMatrix<f64>, i: usize) -> DVector<f64> {
    m.row(i).transpose()
}

fn vertex_swept_aabb(
    vertices: &DMatrix<f64>,
    displacements: &DMatrix<f64>,
    v: usize,
    inflation_radius: f64,
) -> Aabb {
    Aabb::hull(&[row(vertices, v), row(vertices, v) + row(displacements, v)])
        .inflated(inflation_radius)
}

fn edge_swept_aabb(
    vertices: &DMatrix<f64>,
    displacements: &DMatrix<f64>,
    edge: [usize; 2],
    inflation_radius: f64,
) -> Aabb {
    let corners: Vec<DVector<f64>> = edge
        .iter()
        .flat_map(|&v| [row(vertices, v), row(vertices, v) + row(displacements, v)])
        .collect();
    Aabb::hull(&corners).inflated(inflation_radius)
}

fn face_swept_aabb(
    vertices: &DMatrix<f64>,
    displacements: &DMatrix<f64>,
    face: [usize; 3],
    inflation_radius: f64,
) -> Aabb {
    let corners: Vec<DVector<f64>> = face
        .iter()
        .flat_map(|&v| [row(vertices, v), row(vertices, v) + row(displacements, v)])
        .collect();
    Aabb::hull(&corners).inflated(inflation_radius)
}

/// Spatial hash over grid cells; occupants are recorded per primitive kind.
#[derive(Debug, Default)]
pub struct HashGrid {
    cell_size: f64,
    origin: DVector<f64>,
    dim: usize,
    cells: HashMap<[i64; 3], CellOccupants>,
}

#[derive(Debug, Default)]
struct CellOccupants {
    vertices: Vec<usize>,
    edges: Vec<usize>,
    faces: Vec<usize>,
}

impl HashGrid {
    /// Create a grid over the scene's domain with the given cell size.
    ///
    /// # Example
    ///
    /// ```
    /// use ccd_core::{Aabb, HashGrid};
    /// use nalgebra::dvector;
    ///
    /// let domain = Aabb::hull(&[dvector![0.0, 0.0], dvector![4.0, 4.0]]);
    /// let mut grid = HashGrid::new(&domain, 1.0);
    /// grid.add_vertex(0, &Aabb::from_point(dvector![0.5, 0.5]));
    /// grid.add_vertex(1, &Aabb::from_point(dvector![3.5, 3.5]));
    /// assert_eq!(grid.occupied_cell_count(), 2);
    /// ```
    #[must_use]
    pub fn new(domain: &Aabb, cell_size: f64) -> Self {
        Self {
            cell_size: if cell_size > 0.0 { cell_size } else { 1.0 },
            origin: domain.min.clone(),
            dim: domain.dim(),
            cells: HashMap::new(),
        }
    }

    /// Number of cells with at least one occupant.
    #[must_use]
    pub fn occupied_cell_count(&self) -> usize {
        self.cells.len()
    }

    fn cell_span(&self, aabb: &Aabb) -> [(i64, i64); 3] {
        let mut span = [(0, 0); 3];
        for d in 0..self.dim {
            let lo = ((aabb.min[d] - self.origin[d]) / self.cell_size).floor() as i64;
            let hi = ((aabb.max[d] - self.origin[d]) / self.cell_size).floor() as i64;
            span[d] = (lo, hi);
        }
        span
    }

    fn occupy(&mut self, aabb: &Aabb, record: impl Fn(&mut CellOccupants)) {
        let span = self.cell_span(aabb);
        for x in span[0].0..=span[0].1 {
            for y in span[1].0..=span[1].1 {
                for z in span[2].0..=span[2].1 {
                    record(self.cells.entry([x, y, z]).or_default());
                }
            }
        }
    }

    /// Register a vertex under its swept box.
    pub fn add_vertex(&mut self, id: usize, aabb: &Aabb) {
        self.occupy(aabb, |cell| cell.vertices.push(id));
    }

    /// Register an edge under its swept box.
    pub fn add_edge(&mut self, id: usize, aabb: &Aabb) {
        self.occupy(aabb, |cell| cell.edges.push(id));
    }

    /// Register a face under its swept box.
    pub fn add_face(&mut self, id: usize, aabb: &Aabb) {
        self.occupy(aabb, |cell| cell.faces.push(id));
    }

    fn harvest(
        &self,
        edges: &[[usize; 2]],
        faces: &[[usize; 3]],
        groups: GroupIds<'_>,
        out: &mut CandidateSet,
    ) {
        for cell in self.cells.values() {
            for &e in &cell.edges {
                for &v in &cell.vertices {
                    if edges[e].contains(&v) || same_group(groups, edges[e][0], v) {
                        continue;
                    }
                    out.ev.push(EdgeVertexCandidate {
                        edge_index: e,
                        vertex_index: v,
                    });
                }
            }
            for (i, &ea) in cell.edges.iter().enumerate() {
                for &eb in &cell.edges[i + 1..] {
                    if ea == eb || shares_vertex(edges[ea], edges[eb]) {
                        continue;
                    }
                    if same_group(groups, edges[ea][0], edges[eb][0]) {
                        continue;
                    }
                    out.ee.push(EdgeEdgeCandidate::new(ea, eb));
                }
            }
            for &f in &cell.faces {
                for &v in &cell.vertices {
                    if faces[f].contains(&v) || same_group(groups, faces[f][0], v) {
                        continue;
                    }
                    out.fv.push(FaceVertexCandidate {
                        face_index: f,
                        vertex_index: v,
                    });
                }
            }
        }
    }
}

fn shares_vertex(a: [usize; 2], b: [usize; 2]) -> bool {
    a.contains(&b[0]) || a.contains(&b[1])
}

fn mean_edge_length(vertices: &DMatrix<f64>, edges: &[[usize; 2]]) -> f64 {
    if edges.is_empty() {
        return 0.0;
    }
    let total: f64 = edges
        .iter()
        .map(|&[i, j]| (row(vertices, i) - row(vertices, j)).norm())
        .sum();
    total / edges.len() as f64
}

/// Generate candidate pairs for one time step.
///
/// In 2D the candidate types are edge-vertex; in 3D edge-edge and
/// face-vertex. `groups` suppresses pairs within the same collision group
/// (vertices of one rigid body).
///
/// # Example
///
/// ```
/// use ccd_core::{detect_collision_candidates, DetectionMethod};
/// use nalgebra::dmatrix;
///
/// // A vertex falling onto a static edge.
/// let vertices = dmatrix![
///     -1.0, 0.0;
///      1.0, 0.0;
///      0.0, 1.0
/// ];
/// let displacements = dmatrix![
///     0.0, 0.0;
///     0.0, 0.0;
///     0.0, -2.0
/// ];
/// let edges = vec![[0, 1]];
/// let candidates = detect_collision_candidates(
///     &vertices,
///     &displacements,
///     &edges,
///     &[],
///     None,
///     DetectionMethod::HashGrid,
///     0.0,
/// );
/// assert_eq!(candidates.ev.len(), 1);
/// assert_eq!(candidates.ev[0].vertex_index, 2);
/// ```
#[must_use]
pub fn detect_collision_candidates(
    vertices: &DMatrix<f64>,
    displacements: &DMatrix<f64>,
    edges: &[[usize; 2]],
    faces: &[[usize; 3]],
    groups: GroupIds<'_>,
    method: DetectionMethod,
    inflation_radius: f64,
) -> CandidateSet {
    let mut candidates = match method {
        DetectionMethod::BruteForce => {
            detect_candidates_brute_force(vertices, edges, faces, groups)
        }
        DetectionMethod::HashGrid => detect_candidates_hash_grid(
            vertices,
            displacements,
            edges,
            faces,
            groups,
            inflation_radius,
        ),
    };
    candidates.canonicalize();
    candidates
}

/// All-pairs candidate generation (no geometric filtering beyond adjacency
/// and group rules).
fn detect_candidates_brute_force(
    vertices: &DMatrix<f64>,
    edges: &[[usize; 2]],
    faces: &[[usize; 3]],
    groups: GroupIds<'_>,
) -> CandidateSet {
    let n = vertices.nrows();
    let dim = vertices.ncols();
    let mut out = CandidateSet::default();

    if dim == 2 {
        for (e, edge) in edges.iter().enumerate() {
            for v in 0..n {
                if edge.contains(&v) || same_group(groups, edge[0], v) {
                    continue;
                }
                out.ev.push(EdgeVertexCandidate {
                    edge_index: e,
                    vertex_index: v,
                });
            }
        }
    } else {
        for ea in 0..edges.len() {
            for eb in ea + 1..edges.len() {
                if shares_vertex(edges[ea], edges[eb])
                    || same_group(groups, edges[ea][0], edges[eb][0])
                {
                    continue;
                }
                out.ee.push(EdgeEdgeCandidate::new(ea, eb));
            }
        }
        for (f, face) in faces.iter().enumerate() {
            for v in 0..n {
                if face.contains(&v) || same_group(groups, face[0], v) {
                    continue;
                }
                out.fv.push(FaceVertexCandidate {
                    face_index: f,
                    vertex_index: v,
                });
            }
        }
    }
    out
}

fn detect_candidates_hash_grid(
    vertices: &DMatrix<f64>,
    displacements: &DMatrix<f64>,
    edges: &[[usize; 2]],
    faces: &[[usize; 3]],
    groups: GroupIds<'_>,
    inflation_radius: f64,
) -> CandidateSet {
    let n = vertices.nrows();
    let dim = vertices.ncols();

    // Domain over both endpoints of every trajectory.
    let mut corners = Vec::with_capacity(2 * n);
    for v in 0..n {
        corners.push(row(vertices, v));
        corners.push(row(vertices, v) + row(displacements, v));
    }
    if corners.is_empty() {
        return CandidateSet::default();
    }
    let domain = Aabb::hull(&corners).inflated(inflation_radius);
    let mut grid = HashGrid::new(&domain, mean_edge_length(vertices, edges));

    if dim == 2 {
        for v in 0..n {
            grid.add_vertex(v, &vertex_swept_aabb(vertices, displacements, v, inflation_radius));
        }
    }
    for (e, &edge) in edges.iter().enumerate() {
        grid.add_edge(e, &edge_swept_aabb(vertices, displacements, edge, inflation_radius));
    }
    if dim == 3 {
        for v in 0..n {
            grid.add_vertex(v, &vertex_swept_aabb(vertices, displacements, v, inflation_radius));
        }
        for (f, &face) in faces.iter().enumerate() {
            grid.add_face(f, &face_swept_aabb(vertices, displacements, face, inflation_radius));
        }
    }

    let mut out = CandidateSet::default();
    grid.harvest(edges, faces, groups, &mut out);
    // Per-dimension candidate types: edge-vertex in 2D, edge-edge and
    // face-vertex in 3D.
    if dim == 2 {
        out.ee.clear();
        out.fv.clear();
    } else {
        out.ev.clear();
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use nalgebra::dmatrix;

    fn two_segments_scene() -> (DMatrix<f64>, DMatrix<f64>, Vec<[usize; 2]>) {
        // An edge on the x axis and a vertex pair falling towards it.
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
        (vertices, displacements, edges)
    }

    #[test]
    fn hash_grid_matches_brute_force() {
        let (vertices, displacements, edges) = two_segments_scene();
        let brute = detect_collision_candidates(
            &vertices,
            &displacements,
            &edges,
            &[],
            None,
            DetectionMethod::BruteForce,
            0.0,
        );
        let grid = detect_collision_candidates(
            &vertices,
            &displacements,
            &edges,
            &[],
            None,
            DetectionMethod::HashGrid,
            0.0,
        );
        // The brute force emits all pairs; the grid must only drop pairs
        // whose swept boxes never share a cell.
        for candidate in &grid.ev {
            assert!(brute.ev.contains(candidate));
        }
        // Both keep the pair that actually collides.
        let colliding = EdgeVertexCandidate {
            edge_index: 0,
            vertex_index: 2,
        };
        assert!(brute.ev.contains(&colliding));
        assert!(grid.ev.contains(&colliding));
    }

    #[test]
    fn separated_scene_produces_no_grid_candidates() {
        let vertices = dmatrix![
            0.0, 0.0;
            1.0, 0.0;
            100.0, 100.0;
            101.0, 100.0
        ];
        let displacements = DMatrix::zeros(4, 2);
        let edges = vec![[0, 1], [2, 3]];
        let grid = detect_collision_candidates(
            &vertices,
            &displacements,
            &edges,
            &[],
            None,
            DetectionMethod::HashGrid,
            0.0,
        );
        assert!(grid.is_empty());
    }

    #[test]
    fn group_filtering_suppresses_same_body_pairs() {
        let (vertices, displacements, edges) = two_segments_scene();
        let groups = vec![0, 0, 0, 0]; // everything one body
        let candidates = detect_collision_candidates(
            &vertices,
            &displacements,
            &edges,
            &[],
            Some(&groups),
            DetectionMethod::BruteForce,
            0.0,
        );
        assert!(candidates.is_empty());
    }

    #[test]
    fn three_dimensional_scenes_emit_edge_edge_and_face_vertex() {
        let vertices = dmatrix![
            0.0, 0.0, 0.0;
            1.0, 0.0, 0.0;
            0.0, 1.0, 0.0;
            0.5, 0.25, 1.0
        ];
        let displacements = {
            let mut d = DMatrix::zeros(4, 3);
            d[(3, 2)] = -2.0;
            d
        };
        let edges = vec![[0, 1], [2, 3]];
        let faces = vec![[0, 1, 2]];
        let candidates = detect_collision_candidates(
            &vertices,
            &displacements,
            &edges,
            &faces,
            None,
            DetectionMethod::BruteForce,
            0.0,
        );
        assert!(candidates.ev.is_empty());
        assert_eq!(candidates.ee, vec![EdgeEdgeCandidate::new(0, 1)]);
        assert!(candidates.fv.contains(&FaceVertexCandidate {
            face_index: 0,
            vertex_index: 3
        }));
    }
}
