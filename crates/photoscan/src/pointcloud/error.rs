use std::path::PathBuf;

use thiserror::Error;

use crate::error::ErrorKind;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Malformed point cloud: {0}")]
    Malformed(String),

    #[error("Not enough points for a mesh: found {found}, need at least {required}")]
    InsufficientPoints { found: usize, required: usize },

    #[error("Failed to read point cloud '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No point cloud output was produced")]
    NoCandidates,
}

impl DecodeError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        DecodeError::Malformed(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DecodeError::Malformed(_) => ErrorKind::MalformedPointCloud,
            DecodeError::InsufficientPoints { .. } => ErrorKind::InsufficientPoints,
            DecodeError::Read { .. } | DecodeError::NoCandidates => ErrorKind::MissingInput,
        }
    }
}
