//! Scene JSON I/O.
//!
//! The on-disk scene is one JSON object:
//!
//! ```json
//! {
//!     "vertices": [[x, y], ...],
//!     "edges": [[i, j], ...],
//!     "faces": [[i, j, k], ...],
//!     "displacements": [[dx, dy], ...],
//!     "rigid_bodies": { ... }
//! }
//! ```
//!
//! `faces`, `displacements` and `rigid_bodies` are optional. Malformed
//! scenes are rejected here with [`CcdError::InvalidInput`] and never reach
//! the numeric core. Values round-trip bit for bit.

use ccd_types::CcdError;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// A scene as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneFile {
    /// Vertex positions, `n x dim`.
    pub vertices: Vec<Vec<f64>>,
    /// Edges as vertex-index pairs.
    pub edges: Vec<Vec<i64>>,
    /// Faces as vertex-index triples (3D scenes).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faces: Option<Vec<Vec<i64>>>,
    /// Per-vertex displacements over the step, `n x dim`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub displacements: Option<Vec<Vec<f64>>>,
    /// Opaque rigid-body block, preserved verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rigid_bodies: Option<serde_json::Value>,
}

impl SceneFile {
    /// Parse and validate a scene from JSON text.
    ///
    /// # Example
    ///
    /// ```
    /// use ccd_core::SceneFile;
    ///
    /// let scene = SceneFile::from_json_str(r#"{
    ///     "vertices": [[0.0, 0.0], [1.0, 0.0]],
    ///     "edges": [[0, 1]]
    /// }"#).unwrap();
    /// assert_eq!(scene.dim(), 2);
    /// assert_eq!(scene.edge_list(), vec![[0, 1]]);
    ///
    /// // An edge referencing a missing vertex never reaches the core.
    /// assert!(SceneFile::from_json_str(r#"{
    ///     "vertices": [[0.0, 0.0]],
    ///     "edges": [[0, 5]]
    /// }"#).is_err());
    /// ```
    pub fn from_json_str(text: &str) -> Result<Self, CcdError> {
        let scene: Self =
            serde_json::from_str(text).map_err(|e| CcdError::invalid_input(e.to_string()))?;
        scene.validate()?;
        Ok(scene)
    }

    /// Serialize to pretty JSON.
    #[must_use]
    pub fn to_json_string(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Read and validate a scene file.
    pub fn read(path: &std::path::Path) -> Result<Self, CcdError> {
        let text =
            std::fs::read_to_string(path).map_err(|e| CcdError::invalid_input(e.to_string()))?;
        Self::from_json_str(&text)
    }

    /// Write the scene file.
    pub fn write(&self, path: &std::path::Path) -> Result<(), CcdError> {
        std::fs::write(path, self.to_json_string())
            .map_err(|e| CcdError::invalid_input(e.to_string()))
    }

    /// Build a scene from in-memory matrices.
    #[must_use]
    pub fn from_parts(
        vertices: &DMatrix<f64>,
        edges: &[[usize; 2]],
        displacements: &DMatrix<f64>,
    ) -> Self {
        let to_rows = |m: &DMatrix<f64>| -> Vec<Vec<f64>> {
            (0..m.nrows())
                .map(|i| (0..m.ncols()).map(|d| m[(i, d)]).collect())
                .collect()
        };
        Self {
            vertices: to_rows(vertices),
            edges: edges
                .iter()
                .map(|&[i, j]| vec![i as i64, j as i64])
                .collect(),
            faces: None,
            displacements: Some(to_rows(displacements)),
            rigid_bodies: None,
        }
    }

    /// Structural validation: rectangular arrays, a supported dimension,
    /// indices in range.
    pub fn validate(&self) -> Result<(), CcdError> {
        let n = self.vertices.len() as i64;
        let dim = self.vertices.first().map_or(2, Vec::len);
        if dim != 2 && dim != 3 {
            return Err(CcdError::invalid_input(format!(
                "unsupported vertex dimension {dim}"
            )));
        }
        if self.vertices.iter().any(|row| row.len() != dim) {
            return Err(CcdError::invalid_input("ragged vertex rows"));
        }

        for edge in &self.edges {
            if edge.len() != 2 {
                return Err(CcdError::invalid_input("edges must have two indices"));
            }
            if edge[0] == edge[1] {
                return Err(CcdError::invalid_input(format!(
                    "degenerate edge ({}, {})",
                    edge[0], edge[1]
                )));
            }
            if edge.iter().any(|&v| v < 0 || v >= n) {
                return Err(CcdError::invalid_input(format!(
                    "edge ({}, {}) references a missing vertex",
                    edge[0], edge[1]
                )));
            }
        }

        if let Some(faces) = &self.faces {
            for face in faces {
                if face.len() != 3 {
                    return Err(CcdError::invalid_input("faces must have three indices"));
                }
                if face.iter().any(|&v| v < 0 || v >= n) {
                    return Err(CcdError::invalid_input(
                        "face references a missing vertex",
                    ));
                }
            }
        }

        if let Some(displacements) = &self.displacements {
            if displacements.len() != self.vertices.len()
                || displacements.iter().any(|row| row.len() != dim)
            {
                return Err(CcdError::invalid_input(
                    "displacements must match the vertex array shape",
                ));
            }
        }
        Ok(())
    }

    /// Spatial dimension of the scene.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.vertices.first().map_or(2, Vec::len)
    }

    /// Vertices as an `n x dim` matrix.
    #[must_use]
    pub fn vertices_matrix(&self) -> DMatrix<f64> {
        rows_to_matrix(&self.vertices, self.dim())
    }

    /// Displacements as an `n x dim` matrix (zeros when absent).
    #[must_use]
    pub fn displacements_matrix(&self) -> DMatrix<f64> {
        match &self.displacements {
            Some(rows) => rows_to_matrix(rows, self.dim()),
            None => DMatrix::zeros(self.vertices.len(), self.dim()),
        }
    }

    /// Edges as index pairs.
    #[must_use]
    pub fn edge_list(&self) -> Vec<[usize; 2]> {
        self.edges
            .iter()
            .map(|e| [e[0] as usize, e[1] as usize])
            .collect()
    }

    /// Faces as index triples.
    #[must_use]
    pub fn face_list(&self) -> Vec<[usize; 3]> {
        self.faces
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|f| [f[0] as usize, f[1] as usize, f[2] as usize])
            .collect()
    }
}

fn rows_to_matrix(rows: &[Vec<f64>], dim: usize) -> DMatrix<f64> {
    DMatrix::from_fn(rows.len(), dim, |i, d| rows[i][d])
}
