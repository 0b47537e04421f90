//! Mesh synthesis.
//!
//! Two paths produce a [`Mesh`]: the convex hull of a reconstructed point set
//! ([`from_points`]) and a dimension-derived box ([`fallback::box_mesh`]).
//! Faces use 0-based indices in memory; [`writer`] emits them 1-based.

pub mod fallback;
pub mod hull;
pub mod normalize;
pub mod writer;

use std::path::PathBuf;

use glam::DVec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ErrorKind;
use crate::pointcloud::{PointSet, MIN_POINTS};

#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("Not enough points for a hull: found {found}, need at least {}", MIN_POINTS)]
    InsufficientPoints { found: usize },

    #[error("Degenerate geometry: {0}")]
    DegenerateGeometry(String),

    #[error("Failed to write mesh '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SynthesisError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SynthesisError::InsufficientPoints { .. } => ErrorKind::InsufficientPoints,
            SynthesisError::DegenerateGeometry(_) => ErrorKind::DegenerateGeometry,
            SynthesisError::Write { .. } => ErrorKind::ReconstructionFailed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeshKind {
    ConvexHull,
    FallbackBox,
}

impl MeshKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeshKind::ConvexHull => "convex_hull",
            MeshKind::FallbackBox => "fallback_box",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub kind: MeshKind,
    pub vertices: Vec<DVec3>,
    /// 0-based indices into `vertices`.
    pub faces: Vec<Vec<usize>>,
}

impl Mesh {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// True when every face index refers to an existing vertex.
    pub fn indices_valid(&self) -> bool {
        self.faces
            .iter()
            .flatten()
            .all(|&index| index < self.vertices.len())
    }
}

/// Normalizes the point set into `[-bound, bound]` and returns its convex hull.
pub fn from_points(points: &PointSet, bound: f64) -> Result<Mesh, SynthesisError> {
    if points.len() < MIN_POINTS {
        return Err(SynthesisError::InsufficientPoints {
            found: points.len(),
        });
    }
    let normalized = normalize::normalize(points.as_slice(), bound)?;
    hull::convex_hull(&normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_points_rejects_small_sets() {
        for count in 0..MIN_POINTS {
            let points = PointSet::new(vec![DVec3::new(count as f64, 1.0, 2.0); count]);
            let err = from_points(&points, 2.0).unwrap_err();
            assert!(matches!(err, SynthesisError::InsufficientPoints { found } if found == count));
            assert_eq!(err.kind(), ErrorKind::InsufficientPoints);
        }
    }

    #[test]
    fn test_from_points_normalizes_before_hulling() {
        let points = PointSet::from(vec![
            [100.0, 100.0, 100.0],
            [110.0, 100.0, 100.0],
            [100.0, 110.0, 100.0],
            [100.0, 100.0, 110.0],
        ]);
        let mesh = from_points(&points, 2.0).unwrap();

        assert_eq!(mesh.kind, MeshKind::ConvexHull);
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.face_count(), 4);
        let max = mesh
            .vertices
            .iter()
            .map(|v| v.abs().max_element())
            .fold(0.0_f64, f64::max);
        assert!((max - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_from_points_coplanar_is_degenerate() {
        let points = PointSet::from(vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.5, 0.5, 0.0],
        ]);
        let err = from_points(&points, 2.0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DegenerateGeometry);
    }
}
