//! The scan job state machine.
//!
//! One [`Orchestrator`] owns every job record. Workers call [`Orchestrator::run`]
//! for job ids handed to them by the dispatcher; callers submit, query and
//! cancel. Every transition goes through [`StatusStore::put_if_state`] before
//! it is published, so a cancel and a worker can race without either
//! overwriting the other's terminal state.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::dispatch::JobDispatcher;
use super::job::{
    JobCounts, JobError, JobOutcome, JobStage, JobState, JobStatus, ScanJob, ScanMetadata,
    ScanResult, ScanStats,
};
use crate::broadcast::{JobProgressBroadcaster, JobProgressEvent};
use crate::config::{Config, MeshSettings};
use crate::error::{ErrorKind, Result, ScanError};
use crate::mesh::{self, fallback, writer};
use crate::pipeline::{
    OutputLocations, ProgressEvent, ProgressHalt, ProgressReporter, ReconstructionDriver,
    StageError, Workspace,
};
use crate::pointcloud;
use crate::store::{StatusStore, StoreError};

/// Attempts a cancel makes when the job keeps changing state under it.
const CANCEL_ATTEMPTS: usize = 3;

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Parent of every job's working directory.
    pub work_root: PathBuf,
    pub mesh: MeshSettings,
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            work_root: config.work_directory.clone(),
            mesh: config.mesh.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub requeued: usize,
    pub settled: usize,
}

pub struct Orchestrator {
    store: Arc<dyn StatusStore>,
    driver: ReconstructionDriver,
    dispatcher: Arc<dyn JobDispatcher>,
    broadcaster: JobProgressBroadcaster,
    settings: OrchestratorSettings,
    running: Mutex<HashMap<String, CancellationToken>>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn StatusStore>,
        driver: ReconstructionDriver,
        dispatcher: Arc<dyn JobDispatcher>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            store,
            driver,
            dispatcher,
            broadcaster: JobProgressBroadcaster::default(),
            settings,
            running: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_broadcaster(mut self, broadcaster: JobProgressBroadcaster) -> Self {
        self.broadcaster = broadcaster;
        self
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Records a new queued job and hands it to the dispatcher.
    pub fn submit(
        &self,
        scan_id: &str,
        metadata: ScanMetadata,
        image_dir: impl Into<PathBuf>,
    ) -> Result<String> {
        metadata.validate()?;

        let job = ScanJob::new(scan_id, metadata, image_dir.into());
        self.store.insert(&job)?;
        self.broadcaster.publish(&job);
        info!(job_id = %job.id, scan_id, "Scan job submitted");

        self.dispatcher.dispatch(&job.id)?;
        Ok(job.id)
    }

    /// Like [`submit`](Self::submit), parsing caller JSON metadata first.
    pub fn submit_json(
        &self,
        scan_id: &str,
        metadata: &serde_json::Value,
        image_dir: impl Into<PathBuf>,
    ) -> Result<String> {
        let metadata = ScanMetadata::from_json(metadata)?;
        self.submit(scan_id, metadata, image_dir)
    }

    pub fn query(&self, job_id: &str) -> Result<ScanJob> {
        self.store.get(job_id).map_err(|e| match e {
            StoreError::NotFound(id) => ScanError::NotFound(id),
            other => other.into(),
        })
    }

    pub fn status(&self, job_id: &str) -> Result<JobStatus> {
        Ok(self.query(job_id)?.status())
    }

    pub fn list(&self) -> Result<Vec<ScanJob>> {
        Ok(self.store.list()?)
    }

    pub fn counts(&self) -> Result<JobCounts> {
        Ok(self.store.counts()?)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.broadcaster.subscribe()
    }

    /// Marks a queued or running job as cancelled and stops its in-flight
    /// stage. A job that already finished is returned unchanged.
    pub fn cancel(&self, job_id: &str) -> Result<ScanJob> {
        for _ in 0..CANCEL_ATTEMPTS {
            let mut job = self.query(job_id)?;
            if job.is_terminal() {
                debug!(job_id, state = %job.state, "Cancel ignored, job already finished");
                return Ok(job);
            }

            let expected = job.state;
            job.finish(JobOutcome::Failed(JobError::new(
                ErrorKind::Cancelled,
                "Cancelled by request",
            )));
            if self.persist(&job, expected)? {
                info!(job_id, "Scan job cancelled");
                if let Some(token) = self.token(job_id) {
                    token.cancel();
                }
                return Ok(job);
            }
        }
        self.query(job_id)
    }

    /// Drives a queued job to a terminal state. Jobs in any other state are
    /// returned as stored.
    pub async fn run(&self, job_id: &str) -> Result<ScanJob> {
        let span = info_span!("scan_job", job_id = %job_id);
        async {
            let job = self.query(job_id)?;
            if job.state != JobState::Queued {
                debug!(state = %job.state, "Job is not queued, skipping");
                return Ok(job);
            }

            let cancel = CancellationToken::new();
            self.lock_running().insert(job_id.to_string(), cancel.clone());
            let result = self.execute(job, &cancel).await;
            self.lock_running().remove(job_id);
            result
        }
        .instrument(span)
        .await
    }

    async fn execute(&self, mut job: ScanJob, cancel: &CancellationToken) -> Result<ScanJob> {
        job.start();
        if !self.persist(&job, JobState::Queued)? {
            return self.query(&job.id);
        }
        info!("Scan job started");

        let workspace = match Workspace::create(&self.settings.work_root, &job.id) {
            Ok(workspace) => workspace,
            Err(e) => {
                error!("Cannot create working directory: {}", e);
                let workspace = Workspace::at(Workspace::path_for(&self.settings.work_root, &job.id));
                let outcome = self.fallback(
                    &job,
                    &workspace,
                    e.public_message(),
                    ScanStats::default(),
                    None,
                );
                return self.complete(job, outcome);
            }
        };

        let photo_count = match workspace.import_photos(&job.image_dir) {
            Ok(count) => count,
            Err(e) => {
                warn!("Photo intake failed: {}", e);
                let outcome = self.fallback(
                    &job,
                    &workspace,
                    e.public_message(),
                    ScanStats::default(),
                    None,
                );
                return self.complete(job, outcome);
            }
        };
        info!(photo_count, "Photos imported");

        let reporter = JobReporter {
            orchestrator: self,
            job: Mutex::new(job),
        };
        let stages = self.driver.run_stages(&workspace, &reporter, cancel).await;
        let mut job = reporter.into_job();

        if let Some(failure) = &stages.failure {
            if failure.error.is_abort() {
                let stored = self.query(&job.id)?;
                if stored.is_terminal() {
                    return Ok(stored);
                }
            }
        }

        job.advance(JobStage::Meshing);
        if !self.persist(&job, JobState::Running)? {
            return self.query(&job.id);
        }

        let stats = ScanStats {
            photo_count,
            completed_stages: stages.completed_stages.clone(),
            ..Default::default()
        };
        let point_file = stages.outputs.point_file.clone();

        let outcome = match stages.failure {
            None => match self.mesh_from_points(&workspace, &stages.outputs) {
                Ok((mesh_path, point_count, mesh)) => {
                    info!(
                        points = point_count,
                        vertices = mesh.vertex_count(),
                        faces = mesh.face_count(),
                        "Hull mesh written"
                    );
                    JobOutcome::Succeeded(ScanResult {
                        mesh_path,
                        point_cloud_path: point_file,
                        used_fallback: false,
                        stats: ScanStats {
                            point_count: Some(point_count),
                            vertex_count: mesh.vertex_count(),
                            face_count: mesh.face_count(),
                            ..stats
                        },
                    })
                }
                Err(e) => {
                    warn!("Point-based mesh unavailable: {}", e);
                    self.fallback(&job, &workspace, e.to_string(), stats, point_file)
                }
            },
            Some(failure) => {
                warn!(stage = %failure.stage, "Reconstruction failed: {}", failure.error);
                self.fallback(&job, &workspace, failure.error.public_message(), stats, point_file)
            }
        };

        self.complete(job, outcome)
    }

    fn mesh_from_points(
        &self,
        workspace: &Workspace,
        outputs: &OutputLocations,
    ) -> Result<(PathBuf, usize, mesh::Mesh)> {
        let (points, _source) = pointcloud::load_first_usable(&outputs.candidates())?;
        let mesh = mesh::from_points(&points, self.settings.mesh.normalize_bound)?;
        let path = workspace.mesh_path();
        writer::write_mesh(&mesh, &path, self.settings.mesh.precision)?;
        Ok((path, points.len(), mesh))
    }

    /// The dimension-derived box, or a failure when there is nothing to
    /// build it from.
    fn fallback(
        &self,
        job: &ScanJob,
        workspace: &Workspace,
        reason: String,
        stats: ScanStats,
        point_cloud_path: Option<PathBuf>,
    ) -> JobOutcome {
        let Some(dimensions) = job.metadata.dimensions else {
            return JobOutcome::Failed(JobError::new(
                ErrorKind::ReconstructionFailed,
                format!(
                    "Reconstruction failed ({}) and no dimensions were supplied for a fallback mesh",
                    reason
                ),
            ));
        };
        if let Err(e) = dimensions.validate() {
            return JobOutcome::Failed(JobError::new(ErrorKind::InvalidMetadata, e.to_string()));
        }

        let mesh = fallback::box_mesh(dimensions.extent_meters());
        let path = workspace.mesh_path();
        if let Err(e) = writer::write_mesh(&mesh, &path, self.settings.mesh.precision) {
            error!("Fallback mesh could not be written: {}", e);
            return JobOutcome::Failed(JobError::new(
                ErrorKind::ReconstructionFailed,
                format!("Reconstruction failed ({}) and the fallback mesh could not be written", reason),
            ));
        }

        info!(reason = %reason, "Fallback box mesh written");
        JobOutcome::Fallback(ScanResult {
            mesh_path: path,
            point_cloud_path,
            used_fallback: true,
            stats: ScanStats {
                vertex_count: mesh.vertex_count(),
                face_count: mesh.face_count(),
                fallback_reason: Some(reason),
                ..stats
            },
        })
    }

    fn complete(&self, mut job: ScanJob, outcome: JobOutcome) -> Result<ScanJob> {
        job.finish(outcome);
        if !self.persist(&job, JobState::Running)? {
            return self.query(&job.id);
        }
        match &job.error {
            Some(error) => warn!(kind = %error.kind, "Scan job failed: {}", error.message),
            None => info!(state = %job.state, "Scan job finished"),
        }
        Ok(job)
    }

    /// Writes the record if the stored state is still `expected`, then
    /// publishes it. Returns false when the job moved on without us.
    fn persist(&self, job: &ScanJob, expected: JobState) -> Result<bool> {
        match self.store.put_if_state(job, expected) {
            Ok(()) => {
                self.broadcaster.publish(job);
                Ok(true)
            }
            Err(StoreError::StateMismatch { actual, .. }) => {
                debug!(job_id = %job.id, %expected, %actual, "Job state changed concurrently");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn lock_running(&self) -> std::sync::MutexGuard<'_, HashMap<String, CancellationToken>> {
        self.running.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn token(&self, job_id: &str) -> Option<CancellationToken> {
        self.lock_running().get(job_id).cloned()
    }

    /// Start-up pass over the store: re-dispatches queued jobs and settles
    /// jobs a crash left running through the fallback decision. Must run
    /// before any worker starts.
    pub fn recover(&self) -> Result<RecoveryReport> {
        let mut report = RecoveryReport::default();
        for job in self.store.list()? {
            match job.state {
                JobState::Queued => {
                    self.dispatcher.dispatch(&job.id)?;
                    report.requeued += 1;
                }
                JobState::Running => {
                    let workspace =
                        Workspace::at(Workspace::path_for(&self.settings.work_root, &job.id));
                    let stats = ScanStats {
                        completed_stages: job.completed_stages.clone(),
                        ..Default::default()
                    };
                    let outcome = self.fallback(
                        &job,
                        &workspace,
                        "Interrupted before completion".to_string(),
                        stats,
                        None,
                    );
                    self.complete(job, outcome)?;
                    report.settled += 1;
                }
                _ => {}
            }
        }
        if report != RecoveryReport::default() {
            info!(
                requeued = report.requeued,
                settled = report.settled,
                "Recovered scan jobs"
            );
        }
        Ok(report)
    }

    /// Removes working directories last modified at least `max_age` ago whose
    /// job is finished or unknown. Returns how many were removed.
    pub fn cleanup_workspaces(&self, max_age: Duration) -> Result<usize> {
        let root = &self.settings.work_root;
        let entries = match fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(workspace_error(root, e)),
        };

        let now = SystemTime::now();
        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let age = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok());
            match age {
                Some(age) if age >= max_age => {}
                _ => continue,
            }
            let Some(job_id) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };

            let removable = match self.store.get(&job_id) {
                Ok(job) => job.is_terminal(),
                Err(StoreError::NotFound(_)) => true,
                Err(e) => return Err(e.into()),
            };
            if removable {
                fs::remove_dir_all(&path).map_err(|e| workspace_error(&path, e))?;
                debug!(job_id = %job_id, "Removed working directory");
                removed += 1;
            }
        }

        if removed > 0 {
            info!(removed, "Cleaned up old working directories");
        }
        Ok(removed)
    }
}

fn workspace_error(path: &Path, source: std::io::Error) -> ScanError {
    StageError::Workspace {
        path: path.to_path_buf(),
        source,
    }
    .into()
}

/// Persists driver progress into the job record; halts the driver when the
/// record can no longer be advanced.
struct JobReporter<'a> {
    orchestrator: &'a Orchestrator,
    job: Mutex<ScanJob>,
}

impl JobReporter<'_> {
    fn into_job(self) -> ScanJob {
        self.job.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

impl ProgressReporter for JobReporter<'_> {
    fn report(&self, event: ProgressEvent) -> std::result::Result<(), ProgressHalt> {
        let mut job = self.job.lock().unwrap_or_else(|e| e.into_inner());
        match event {
            ProgressEvent::StageStarted { stage } => {
                if !job.advance(stage.into()) {
                    return Ok(());
                }
            }
            ProgressEvent::StageCompleted { stage } => job.record_completed(stage),
            ProgressEvent::StageFailed { .. } => return Ok(()),
        }

        match self.orchestrator.persist(&job, JobState::Running) {
            Ok(true) => Ok(()),
            Ok(false) => Err(ProgressHalt::new("job is no longer running")),
            Err(e) => Err(ProgressHalt::new(format!("cannot persist progress: {}", e))),
        }
    }
}
