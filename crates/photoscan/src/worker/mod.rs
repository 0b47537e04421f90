pub mod dispatch;
pub mod job;
pub mod orchestrator;
pub mod pool;

pub use dispatch::{ChannelDispatcher, DeferredDispatcher, JobDispatcher, JobQueue};
pub use job::{
    Dimensions, JobCounts, JobError, JobOutcome, JobStage, JobState, JobStatus, ScanJob,
    ScanMetadata, ScanResult, ScanStats,
};
pub use orchestrator::{Orchestrator, OrchestratorSettings, RecoveryReport};
pub use pool::WorkerPool;
