//! Live fan-out of job transitions to in-process subscribers.

pub mod job_progress;

pub use job_progress::{JobProgressBroadcaster, JobProgressEvent};
