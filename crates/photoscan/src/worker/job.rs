use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use glam::DVec3;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::{ErrorKind, ScanError};
use crate::pipeline::StageKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    SucceededFallback,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::SucceededFallback => "succeeded_fallback",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::SucceededFallback | JobState::Failed
        )
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(JobState::Queued),
            "running" => Some(JobState::Running),
            "succeeded" => Some(JobState::Succeeded),
            "succeeded_fallback" => Some(JobState::SucceededFallback),
            "failed" => Some(JobState::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current activity of a job, in the order a job moves through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Queued,
    Initializing,
    ExtractingFeatures,
    MatchingFeatures,
    Reconstructing,
    RefiningModel,
    Exporting,
    Meshing,
    Completed,
    Failed,
}

impl JobStage {
    /// Progress floor reached when the stage begins.
    pub fn progress(&self) -> u8 {
        match self {
            JobStage::Queued | JobStage::Initializing => 0,
            JobStage::ExtractingFeatures => 10,
            JobStage::MatchingFeatures => 30,
            JobStage::Reconstructing => 50,
            JobStage::RefiningModel => 60,
            JobStage::Exporting => 70,
            JobStage::Meshing => 85,
            JobStage::Completed | JobStage::Failed => 100,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            JobStage::Queued => "queued",
            JobStage::Initializing => "initializing",
            JobStage::ExtractingFeatures => "extracting_features",
            JobStage::MatchingFeatures => "matching_features",
            JobStage::Reconstructing => "reconstructing",
            JobStage::RefiningModel => "refining_model",
            JobStage::Exporting => "exporting",
            JobStage::Meshing => "meshing",
            JobStage::Completed => "completed",
            JobStage::Failed => "failed",
        }
    }
}

impl From<StageKind> for JobStage {
    fn from(kind: StageKind) -> Self {
        match kind {
            StageKind::FeatureExtraction => JobStage::ExtractingFeatures,
            StageKind::FeatureMatching => JobStage::MatchingFeatures,
            StageKind::SparseReconstruction => JobStage::Reconstructing,
            StageKind::ModelRefinement => JobStage::RefiningModel,
            StageKind::PointExport | StageKind::ModelExport => JobStage::Exporting,
        }
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Physical size of the scanned object in centimeters.
///
/// Each field accepts a JSON number or a numeric string.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    #[serde(deserialize_with = "deserialize_measure")]
    pub length: f64,
    #[serde(deserialize_with = "deserialize_measure")]
    pub width: f64,
    #[serde(deserialize_with = "deserialize_measure")]
    pub height: f64,
}

fn deserialize_measure<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Measure {
        Number(f64),
        Text(String),
    }

    match Measure::deserialize(deserializer)? {
        Measure::Number(n) => Ok(n),
        Measure::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| serde::de::Error::custom(format!("'{}' is not a number", s))),
    }
}

impl Dimensions {
    pub fn new(length: f64, width: f64, height: f64) -> Self {
        Self {
            length,
            width,
            height,
        }
    }

    pub fn validate(&self) -> Result<(), ScanError> {
        for (name, value) in [
            ("length", self.length),
            ("width", self.width),
            ("height", self.height),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ScanError::InvalidMetadata(format!(
                    "dimension '{}' must be a positive number, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }

    /// Box extent in meters: x = length, y = height, z = width.
    pub fn extent_meters(&self) -> DVec3 {
        DVec3::new(self.length, self.height, self.width) / 100.0
    }
}

/// Caller-supplied scan parameters. Immutable after submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Dimensions>,
    /// Everything else the caller sent, kept verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ScanMetadata {
    pub fn with_dimensions(dimensions: Dimensions) -> Self {
        Self {
            dimensions: Some(dimensions),
            extra: serde_json::Map::new(),
        }
    }

    /// Parses and validates caller JSON. A `dimensions` object that is partial,
    /// non-numeric or non-positive is rejected; an absent or null one is not.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, ScanError> {
        let metadata: ScanMetadata = serde_json::from_value(value.clone())
            .map_err(|e| ScanError::InvalidMetadata(e.to_string()))?;
        metadata.validate()?;
        Ok(metadata)
    }

    pub fn validate(&self) -> Result<(), ScanError> {
        match &self.dimensions {
            Some(d) => d.validate(),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    pub photo_count: usize,
    pub completed_stages: Vec<StageKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub point_count: Option<usize>,
    pub vertex_count: usize,
    pub face_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    pub mesh_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub point_cloud_path: Option<PathBuf>,
    pub used_fallback: bool,
    pub stats: ScanStats,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub kind: ErrorKind,
    pub message: String,
}

impl JobError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// How a job ended.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Succeeded(ScanResult),
    Fallback(ScanResult),
    Failed(JobError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanJob {
    pub id: String,
    pub scan_id: String,
    pub state: JobState,
    pub stage: JobStage,
    pub progress_percent: u8,
    #[serde(default)]
    pub completed_stages: Vec<StageKind>,
    pub image_dir: PathBuf,
    pub metadata: ScanMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ScanResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
}

impl ScanJob {
    pub fn new(scan_id: impl Into<String>, metadata: ScanMetadata, image_dir: PathBuf) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            scan_id: scan_id.into(),
            state: JobState::Queued,
            stage: JobStage::Queued,
            progress_percent: 0,
            completed_stages: Vec::new(),
            image_dir,
            metadata,
            created_at: now,
            updated_at: now,
            completed_at: None,
            result: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Moves a queued job to `running`. Returns false for any other state.
    pub fn start(&mut self) -> bool {
        if self.state != JobState::Queued {
            return false;
        }
        self.state = JobState::Running;
        self.stage = JobStage::Initializing;
        self.touch();
        true
    }

    /// Advances a running job to `stage`. Never moves backwards: a stage
    /// earlier than the current one is ignored and false is returned.
    pub fn advance(&mut self, stage: JobStage) -> bool {
        if self.state != JobState::Running || stage < self.stage {
            return false;
        }
        self.stage = stage;
        self.progress_percent = self.progress_percent.max(stage.progress());
        self.touch();
        true
    }

    pub fn record_completed(&mut self, stage: StageKind) {
        if !self.completed_stages.contains(&stage) {
            self.completed_stages.push(stage);
            self.touch();
        }
    }

    /// Moves the job to its terminal state. Returns false if it already is
    /// terminal.
    pub fn finish(&mut self, outcome: JobOutcome) -> bool {
        if self.is_terminal() {
            return false;
        }
        let (state, stage, result, error) = match outcome {
            JobOutcome::Succeeded(result) => {
                (JobState::Succeeded, JobStage::Completed, Some(result), None)
            }
            JobOutcome::Fallback(result) => (
                JobState::SucceededFallback,
                JobStage::Completed,
                Some(result),
                None,
            ),
            JobOutcome::Failed(error) => (JobState::Failed, JobStage::Failed, None, Some(error)),
        };
        self.state = state;
        self.stage = stage;
        self.progress_percent = 100;
        self.result = result;
        self.error = error;
        self.touch();
        self.completed_at = Some(self.updated_at);
        true
    }

    pub fn status(&self) -> JobStatus {
        JobStatus {
            id: self.id.clone(),
            state: self.state,
            stage_label: self.stage.label().to_string(),
            progress_percent: self.progress_percent,
            result: self.result.clone(),
            error: self.error.clone(),
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// What a status query returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub id: String,
    pub state: JobState,
    pub stage_label: String,
    pub progress_percent: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ScanResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    pub queued: usize,
    pub running: usize,
    pub succeeded: usize,
    pub succeeded_fallback: usize,
    pub failed: usize,
}

impl JobCounts {
    pub fn add(&mut self, state: JobState) {
        self.add_many(state, 1);
    }

    pub fn add_many(&mut self, state: JobState, n: usize) {
        let slot = match state {
            JobState::Queued => &mut self.queued,
            JobState::Running => &mut self.running,
            JobState::Succeeded => &mut self.succeeded,
            JobState::SucceededFallback => &mut self.succeeded_fallback,
            JobState::Failed => &mut self.failed,
        };
        *slot += n;
    }

    pub fn total(&self) -> usize {
        self.queued + self.running + self.succeeded + self.succeeded_fallback + self.failed
    }
}
