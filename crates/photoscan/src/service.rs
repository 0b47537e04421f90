//! Process-level wiring: store, tool, orchestrator and worker pool.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::{validate_config, Config};
use crate::db;
use crate::error::{ConfigError, Result};
use crate::pipeline::{ColmapTool, ReconstructionDriver, ReconstructionTool};
use crate::store::{SqliteStatusStore, StatusStore};
use crate::worker::{JobQueue, Orchestrator, OrchestratorSettings, WorkerPool};

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

pub struct ScanService {
    orchestrator: Arc<Orchestrator>,
    pool: WorkerPool,
}

impl ScanService {
    /// Opens the SQLite store and runs stages with the configured program.
    pub fn start(config: &Config) -> Result<Self> {
        validate_config(config)?;
        let store = Arc::new(SqliteStatusStore::open(&database_path(config)?)?);
        let tool = Arc::new(ColmapTool::from_config(config));
        Self::start_with(config, store, tool)
    }

    /// Starts with caller-supplied collaborators. Removes expired working
    /// directories and recovers interrupted jobs before the workers start.
    pub fn start_with(
        config: &Config,
        store: Arc<dyn StatusStore>,
        tool: Arc<dyn ReconstructionTool>,
    ) -> Result<Self> {
        validate_config(config)?;

        let driver = ReconstructionDriver::from_settings(tool, &config.pipeline);
        let queue = JobQueue::new();
        let orchestrator = Arc::new(Orchestrator::new(
            store,
            driver,
            Arc::new(queue.dispatcher),
            OrchestratorSettings::from_config(config),
        ));

        if let Some(days) = config.retention_days {
            orchestrator.cleanup_workspaces(Duration::from_secs(u64::from(days) * SECONDS_PER_DAY))?;
        }
        orchestrator.recover()?;

        let pool = WorkerPool::start(Arc::clone(&orchestrator), queue.receiver, config.worker_count)?;
        info!(
            workers = config.worker_count,
            work_directory = %config.work_directory.display(),
            "Scan service started"
        );

        Ok(Self { orchestrator, pool })
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Stops taking new jobs and waits for in-flight ones to finish.
    pub fn shutdown(self) {
        self.pool.shutdown();
        self.pool.wait();
        info!("Scan service stopped");
    }
}

fn database_path(config: &Config) -> std::result::Result<PathBuf, ConfigError> {
    config
        .database_path
        .clone()
        .or_else(db::default_database_path)
        .ok_or_else(|| ConfigError::Validation {
            message: "database_path is not set and no home directory was found".to_string(),
        })
}
