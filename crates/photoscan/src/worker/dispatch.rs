//! Hands submitted job ids to whatever executes them.

use std::sync::Mutex;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::error::WorkerError;

pub trait JobDispatcher: Send + Sync {
    fn dispatch(&self, job_id: &str) -> Result<(), WorkerError>;
}

/// Dispatches onto a channel drained by the [`WorkerPool`](super::WorkerPool).
#[derive(Clone)]
pub struct ChannelDispatcher {
    sender: Sender<String>,
}

impl JobDispatcher for ChannelDispatcher {
    fn dispatch(&self, job_id: &str) -> Result<(), WorkerError> {
        self.sender
            .send(job_id.to_string())
            .map_err(|_| WorkerError::ChannelClosed)
    }
}

/// The two ends of the job channel.
pub struct JobQueue {
    pub dispatcher: ChannelDispatcher,
    pub receiver: Receiver<String>,
}

impl JobQueue {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            dispatcher: ChannelDispatcher { sender },
            receiver,
        }
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Records dispatched ids so the caller decides when to run them.
#[derive(Default)]
pub struct DeferredDispatcher {
    pending: Mutex<Vec<String>>,
}

impl DeferredDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<String> {
        self.pending
            .lock()
            .map(|mut pending| std::mem::take(&mut *pending))
            .unwrap_or_default()
    }
}

impl JobDispatcher for DeferredDispatcher {
    fn dispatch(&self, job_id: &str) -> Result<(), WorkerError> {
        let mut pending = self.pending.lock().map_err(|_| WorkerError::ChannelClosed)?;
        pending.push(job_id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_dispatch() {
        let queue = JobQueue::new();
        queue.dispatcher.dispatch("a").unwrap();
        queue.dispatcher.dispatch("b").unwrap();
        assert_eq!(queue.receiver.recv().unwrap(), "a");
        assert_eq!(queue.receiver.recv().unwrap(), "b");
    }

    #[test]
    fn test_channel_closed() {
        let JobQueue {
            dispatcher,
            receiver,
        } = JobQueue::new();
        drop(receiver);
        assert!(matches!(
            dispatcher.dispatch("a"),
            Err(WorkerError::ChannelClosed)
        ));
    }

    #[test]
    fn test_deferred_take_drains() {
        let deferred = DeferredDispatcher::new();
        deferred.dispatch("x").unwrap();
        assert_eq!(deferred.take(), vec!["x".to_string()]);
        assert!(deferred.take().is_empty());
    }
}
