pub mod broadcast;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod mesh;
pub mod pipeline;
pub mod pointcloud;
pub mod sanitize;
pub mod service;
pub mod store;
pub mod worker;

pub use broadcast::{JobProgressBroadcaster, JobProgressEvent};
pub use config::{load_config, Config};
pub use error::{ConfigError, ErrorKind, Result, ScanError, WorkerError};
pub use mesh::{Mesh, MeshKind, SynthesisError};
pub use pipeline::{ColmapTool, ReconstructionDriver, ReconstructionTool, StageError, StageKind};
pub use pointcloud::{DecodeError, PointSet};
pub use service::ScanService;
pub use store::{MemoryStatusStore, SqliteStatusStore, StatusStore, StoreError};
pub use worker::{JobState, Orchestrator, ScanJob, ScanMetadata, WorkerPool};
