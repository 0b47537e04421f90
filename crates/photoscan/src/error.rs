use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mesh::SynthesisError;
use crate::pipeline::StageError;
use crate::pointcloud::DecodeError;
use crate::store::StoreError;

/// Stable, caller-visible classification of every failure the scan core can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidMetadata,
    MissingInput,
    StageTimeout,
    StageFailed,
    MalformedPointCloud,
    InsufficientPoints,
    DegenerateGeometry,
    ReconstructionFailed,
    Cancelled,
    NotFound,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidMetadata => "invalid_metadata",
            ErrorKind::MissingInput => "missing_input",
            ErrorKind::StageTimeout => "stage_timeout",
            ErrorKind::StageFailed => "stage_failed",
            ErrorKind::MalformedPointCloud => "malformed_point_cloud",
            ErrorKind::InsufficientPoints => "insufficient_points",
            ErrorKind::DegenerateGeometry => "degenerate_geometry",
            ErrorKind::ReconstructionFailed => "reconstruction_failed",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::NotFound => "not_found",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid scan metadata: {0}")]
    InvalidMetadata(String),

    #[error("Scan job not found: {0}")]
    NotFound(String),

    #[error("Point cloud error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Mesh synthesis error: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("Pipeline stage error: {0}")]
    Stage(#[from] StageError),

    #[error("Status store error: {0}")]
    Store(#[from] StoreError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
}

impl ScanError {
    /// Stable kind for errors that have a caller-visible classification.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ScanError::InvalidMetadata(_) => Some(ErrorKind::InvalidMetadata),
            ScanError::NotFound(_) => Some(ErrorKind::NotFound),
            ScanError::Decode(e) => Some(e.kind()),
            ScanError::Synthesis(e) => Some(e.kind()),
            ScanError::Stage(e) => Some(e.kind()),
            ScanError::Config(_) | ScanError::Store(_) | ScanError::Worker(_) => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,

    #[error("Worker pool needs at least one worker")]
    NoWorkers,
}

pub type Result<T> = std::result::Result<T, ScanError>;
