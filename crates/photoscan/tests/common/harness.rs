//! Test harness for isolated orchestrator runs.
//!
//! Jobs are dispatched to a `DeferredDispatcher`, so each test decides when
//! `run` happens and can observe the store in between.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use photoscan::config::MeshSettings;
use photoscan::pipeline::{PipelineDescriptor, ReconstructionDriver};
use photoscan::store::{MemoryStatusStore, SqliteStatusStore, StatusStore};
use photoscan::worker::{
    DeferredDispatcher, Dimensions, Orchestrator, OrchestratorSettings, ScanJob, ScanMetadata,
};

use super::fake_tool::FakeTool;

pub struct TestHarness {
    temp_dir: TempDir,
    pub upload_dir: PathBuf,
    pub work_root: PathBuf,
    pub store: Arc<dyn StatusStore>,
    pub dispatcher: Arc<DeferredDispatcher>,
    pub tool: Arc<FakeTool>,
    pub orchestrator: Orchestrator,
}

impl TestHarness {
    /// Harness backed by the in-memory store.
    pub fn new(tool: FakeTool) -> Self {
        Self::build(tool, |_| Arc::new(MemoryStatusStore::new()) as Arc<dyn StatusStore>)
    }

    /// Harness backed by a SQLite file inside the temp directory.
    pub fn with_sqlite(tool: FakeTool) -> Self {
        Self::build(tool, |base| {
            let store = SqliteStatusStore::open(&base.join("db").join("jobs.db"))
                .expect("Failed to open SQLite store");
            Arc::new(store) as Arc<dyn StatusStore>
        })
    }

    fn build(tool: FakeTool, store: impl FnOnce(&Path) -> Arc<dyn StatusStore>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();
        let upload_dir = base.join("upload");
        let work_root = base.join("work");
        fs::create_dir_all(&upload_dir).expect("Failed to create upload dir");

        let store = store(base);
        let tool = Arc::new(tool);
        let dispatcher = Arc::new(DeferredDispatcher::new());
        let driver = ReconstructionDriver::new(
            tool.clone(),
            PipelineDescriptor::standard(),
            Duration::from_secs(10),
        );
        let orchestrator = Orchestrator::new(
            store.clone(),
            driver,
            dispatcher.clone(),
            OrchestratorSettings {
                work_root: work_root.clone(),
                mesh: MeshSettings::default(),
            },
        );

        Self {
            temp_dir,
            upload_dir,
            work_root,
            store,
            dispatcher,
            tool,
            orchestrator,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `count` JPEG-named files into the upload directory.
    pub fn write_photos(&self, count: usize) {
        for i in 0..count {
            fs::write(self.upload_dir.join(format!("IMG_{:04}.jpg", i)), b"\xff\xd8\xff")
                .expect("Failed to write photo");
        }
    }

    pub fn submit(&self, dimensions: Option<Dimensions>) -> String {
        let metadata = match dimensions {
            Some(d) => ScanMetadata::with_dimensions(d),
            None => ScanMetadata::default(),
        };
        self.orchestrator
            .submit("scan", metadata, &self.upload_dir)
            .expect("submit failed")
    }

    pub async fn run(&self, job_id: &str) -> ScanJob {
        self.orchestrator.run(job_id).await.expect("run failed")
    }

    /// Lines of the job's mesh file.
    pub fn mesh_lines(&self, job: &ScanJob) -> Vec<String> {
        let result = job.result.as_ref().expect("job has no result");
        fs::read_to_string(&result.mesh_path)
            .expect("Failed to read mesh")
            .lines()
            .map(str::to_string)
            .collect()
    }
}

pub fn standard_box() -> Dimensions {
    Dimensions::new(50.0, 50.0, 100.0)
}
