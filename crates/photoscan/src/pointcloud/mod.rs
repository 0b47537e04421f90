//! Point cloud decoding.
//!
//! Two encodings come out of the reconstruction pipeline: the PLY point file
//! written by the exporter and the `points3D.txt` text model. Both decode into
//! a [`PointSet`]; [`decode`] picks the decoder by inspecting the leading bytes.

pub mod colmap_text;
pub mod error;
pub mod ply;

use std::path::{Path, PathBuf};

use glam::DVec3;
use tracing::{debug, warn};

use crate::sanitize;

pub use error::DecodeError;

/// Fewest points that can span a non-degenerate 3-D hull.
pub const MIN_POINTS: usize = 4;

/// Ordered 3-D coordinates recovered by reconstruction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointSet {
    points: Vec<DVec3>,
}

impl PointSet {
    pub fn new(points: Vec<DVec3>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn as_slice(&self) -> &[DVec3] {
        &self.points
    }

    pub fn into_inner(self) -> Vec<DVec3> {
        self.points
    }

    /// Fails with `InsufficientPoints` below [`MIN_POINTS`].
    pub fn ensure_usable(self) -> Result<Self, DecodeError> {
        if self.points.len() < MIN_POINTS {
            return Err(DecodeError::InsufficientPoints {
                found: self.points.len(),
                required: MIN_POINTS,
            });
        }
        Ok(self)
    }
}

impl From<Vec<[f64; 3]>> for PointSet {
    fn from(points: Vec<[f64; 3]>) -> Self {
        Self::new(points.into_iter().map(DVec3::from_array).collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointCloudFormat {
    Ply,
    ColmapText,
}

/// Chooses a decoder from the magic line: PLY files start with `ply`.
pub fn detect_format(bytes: &[u8]) -> PointCloudFormat {
    let first_line = bytes
        .split(|b| *b == b'\n')
        .next()
        .unwrap_or_default();
    let trimmed = first_line
        .strip_suffix(b"\r")
        .unwrap_or(first_line);
    if trimmed == b"ply" {
        PointCloudFormat::Ply
    } else {
        PointCloudFormat::ColmapText
    }
}

pub fn decode(bytes: &[u8]) -> Result<PointSet, DecodeError> {
    match detect_format(bytes) {
        PointCloudFormat::Ply => ply::decode(bytes),
        PointCloudFormat::ColmapText => colmap_text::decode(bytes),
    }
}

/// Decodes and applies the minimum-point validation.
pub fn decode_usable(bytes: &[u8]) -> Result<PointSet, DecodeError> {
    decode(bytes)?.ensure_usable()
}

pub fn load(path: &Path) -> Result<PointSet, DecodeError> {
    let bytes = std::fs::read(path).map_err(|e| DecodeError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    decode_usable(&bytes)
}

/// Tries each candidate file in order; the first usable point set wins.
///
/// When every candidate fails, the error from the last one is returned, except
/// that a file which decoded cleanly but had too few points takes precedence
/// over later read or parse failures.
pub fn load_first_usable(candidates: &[PathBuf]) -> Result<(PointSet, PathBuf), DecodeError> {
    let mut insufficient: Option<DecodeError> = None;
    let mut last: Option<DecodeError> = None;

    for path in candidates {
        match load(path) {
            Ok(points) => {
                debug!(
                    file = %sanitize::redact_path(path),
                    points = points.len(),
                    "Decoded point cloud"
                );
                return Ok((points, path.clone()));
            }
            Err(e) => {
                warn!(file = %sanitize::redact_path(path), "Point cloud unusable: {}", e);
                if matches!(e, DecodeError::InsufficientPoints { .. }) && insufficient.is_none() {
                    insufficient = Some(e);
                } else {
                    last = Some(e);
                }
            }
        }
    }

    Err(insufficient.or(last).unwrap_or(DecodeError::NoCandidates))
}
