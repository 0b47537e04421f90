use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use super::stage::StageKind;
use crate::error::ErrorKind;
use crate::sanitize;

#[derive(Error, Debug)]
pub enum StageError {
    #[error("Stage {stage}: required input '{path}' is missing")]
    MissingInput { stage: StageKind, path: PathBuf },

    #[error("Stage {stage} timed out after {}s", .after.as_secs())]
    Timeout { stage: StageKind, after: Duration },

    #[error("Stage {stage} failed{}: {summary}", .exit_code.map(|c| format!(" with exit code {}", c)).unwrap_or_default())]
    Failed {
        stage: StageKind,
        exit_code: Option<i32>,
        summary: String,
    },

    #[error("Stage {stage}: failed to launch tool: {source}")]
    Spawn {
        stage: StageKind,
        #[source]
        source: std::io::Error,
    },

    #[error("Stage {stage} was cancelled")]
    Cancelled { stage: StageKind },

    #[error("Stage {stage} halted: {reason}")]
    Halted { stage: StageKind, reason: String },

    #[error("Working directory error at '{path}': {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StageError::MissingInput { .. } => ErrorKind::MissingInput,
            StageError::Timeout { .. } => ErrorKind::StageTimeout,
            StageError::Failed { .. } | StageError::Spawn { .. } | StageError::Workspace { .. } => {
                ErrorKind::StageFailed
            }
            StageError::Cancelled { .. } | StageError::Halted { .. } => ErrorKind::Cancelled,
        }
    }

    /// The stage the error belongs to, if it happened inside one.
    pub fn stage(&self) -> Option<StageKind> {
        match self {
            StageError::MissingInput { stage, .. }
            | StageError::Timeout { stage, .. }
            | StageError::Failed { stage, .. }
            | StageError::Spawn { stage, .. }
            | StageError::Cancelled { stage }
            | StageError::Halted { stage, .. } => Some(*stage),
            StageError::Workspace { .. } => None,
        }
    }

    /// Text safe to store on a job record. Tool output and absolute paths
    /// stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            StageError::Failed {
                stage,
                exit_code: Some(code),
                ..
            } => format!("Stage {} failed with exit code {}", stage, code),
            StageError::Failed { stage, .. } => {
                format!("Stage {} failed without an exit code", stage)
            }
            StageError::Spawn { stage, .. } => format!("Stage {}: failed to launch tool", stage),
            StageError::Workspace { path, .. } => format!(
                "Working directory error at '{}'",
                sanitize::redact_path(path)
            ),
            other => other.to_string(),
        }
    }

    /// Cancellation and halts stop the pipeline even inside optional stages.
    pub fn is_abort(&self) -> bool {
        matches!(self, StageError::Cancelled { .. } | StageError::Halted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_message_includes_exit_code() {
        let err = StageError::Failed {
            stage: StageKind::FeatureMatching,
            exit_code: Some(1),
            summary: "no matches".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Stage feature_matching failed with exit code 1: no matches"
        );
        assert_eq!(err.kind(), ErrorKind::StageFailed);
    }

    #[test]
    fn test_failed_message_without_exit_code() {
        let err = StageError::Failed {
            stage: StageKind::SparseReconstruction,
            exit_code: None,
            summary: "killed by signal".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Stage sparse_reconstruction failed: killed by signal"
        );
    }

    #[test]
    fn test_kinds() {
        let timeout = StageError::Timeout {
            stage: StageKind::SparseReconstruction,
            after: Duration::from_secs(30),
        };
        assert_eq!(timeout.kind(), ErrorKind::StageTimeout);
        assert_eq!(timeout.to_string(), "Stage sparse_reconstruction timed out after 30s");

        let cancelled = StageError::Cancelled {
            stage: StageKind::FeatureMatching,
        };
        assert_eq!(cancelled.kind(), ErrorKind::Cancelled);
        assert!(cancelled.is_abort());
        assert!(!timeout.is_abort());
    }

    #[test]
    fn test_public_message_omits_tool_output() {
        let err = StageError::Failed {
            stage: StageKind::FeatureMatching,
            exit_code: Some(3),
            summary: "segfault in /srv/scans/job/database.db".to_string(),
        };
        assert_eq!(
            err.public_message(),
            "Stage feature_matching failed with exit code 3"
        );

        let err = StageError::Workspace {
            path: PathBuf::from("/srv/scans/job/images"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.public_message(), "Working directory error at 'images'");
    }
}
