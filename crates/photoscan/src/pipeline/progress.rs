use std::fmt;

use super::stage::StageKind;

/// Events emitted by the driver while it walks the stage list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    StageStarted { stage: StageKind },
    StageCompleted { stage: StageKind },
    StageFailed { stage: StageKind, error: String },
}

/// Returned by a reporter that wants the driver to stop, for example because
/// the job's record could not be advanced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressHalt {
    pub reason: String,
}

impl ProgressHalt {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ProgressHalt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent) -> Result<(), ProgressHalt>;
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) -> Result<(), ProgressHalt> {
        Ok(())
    }
}
