//! Job progress broadcaster for live status streaming.
//!
//! Events are published only after the transition they describe has been
//! persisted, so a subscriber never sees progress a restart could undo.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::ErrorKind;
use crate::worker::job::{JobStage, JobState, ScanJob};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgressEvent {
    pub job_id: String,
    pub scan_id: String,
    pub state: JobState,
    pub stage: JobStage,
    pub progress_percent: u8,
    /// Human-readable description of the current activity.
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mesh_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_fallback: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobProgressEvent {
    /// Snapshot of a job record as an event.
    pub fn from_job(job: &ScanJob) -> Self {
        Self {
            job_id: job.id.clone(),
            scan_id: job.scan_id.clone(),
            state: job.state,
            stage: job.stage,
            progress_percent: job.progress_percent,
            message: describe(job),
            timestamp: job.updated_at,
            mesh_path: job.result.as_ref().map(|r| r.mesh_path.clone()),
            used_fallback: job.result.as_ref().map(|r| r.used_fallback),
            error_kind: job.error.as_ref().map(|e| e.kind),
            error: job.error.as_ref().map(|e| e.message.clone()),
        }
    }
}

fn describe(job: &ScanJob) -> String {
    match job.state {
        JobState::Queued => "Queued for processing".to_string(),
        JobState::Running => match job.stage {
            JobStage::Initializing => "Preparing working directory".to_string(),
            JobStage::ExtractingFeatures => "Extracting features".to_string(),
            JobStage::MatchingFeatures => "Matching features".to_string(),
            JobStage::Reconstructing => "Reconstructing sparse model".to_string(),
            JobStage::RefiningModel => "Refining model".to_string(),
            JobStage::Exporting => "Exporting model".to_string(),
            JobStage::Meshing => "Building mesh".to_string(),
            other => other.label().to_string(),
        },
        JobState::Succeeded => "Reconstruction completed".to_string(),
        JobState::SucceededFallback => "Completed with fallback mesh".to_string(),
        JobState::Failed => "Processing failed".to_string(),
    }
}

/// Broadcasts job progress events for streaming.
#[derive(Clone)]
pub struct JobProgressBroadcaster {
    sender: Arc<broadcast::Sender<JobProgressEvent>>,
}

impl JobProgressBroadcaster {
    /// Creates a new job progress broadcaster with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn send(&self, event: JobProgressEvent) {
        // No active receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn publish(&self, job: &ScanJob) {
        self.send(JobProgressEvent::from_job(job));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for JobProgressBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}
