//! External reconstruction pipeline: stage descriptor, tool invocation and
//! the driver loop that walks the stages against a job's working directory.

pub mod error;
pub mod progress;
pub mod runner;
pub mod stage;
pub mod tool;
pub mod workspace;

pub use error::StageError;
pub use progress::{NoopProgress, ProgressEvent, ProgressHalt, ProgressReporter};
pub use runner::{OutputLocations, ReconstructionDriver, StageFailure, StageResult};
pub use stage::{PipelineDescriptor, StageKind, StagePath, StageSpec};
pub use tool::{ColmapTool, ReconstructionTool, StageInvocation, ToolOutput};
pub use workspace::Workspace;
