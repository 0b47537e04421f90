use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::{debug, error, info};

use super::orchestrator::Orchestrator;
use crate::error::WorkerError;

/// Fixed set of OS threads, each running one job at a time on its own
/// single-threaded tokio runtime.
pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    pub fn start(
        orchestrator: Arc<Orchestrator>,
        jobs: Receiver<String>,
        worker_count: usize,
    ) -> Result<Self, WorkerError> {
        if worker_count == 0 {
            return Err(WorkerError::NoWorkers);
        }
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let jobs = jobs.clone();
            let shutdown_flag = Arc::clone(&shutdown);
            let orchestrator = Arc::clone(&orchestrator);

            let handle = thread::Builder::new()
                .name(format!("photoscan-worker-{}", worker_id))
                .spawn(move || run_worker(worker_id, jobs, shutdown_flag, orchestrator))
                .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;

            workers.push(handle);
        }

        info!("Started {} workers", worker_count);

        Ok(Self { workers, shutdown })
    }

    /// Asks workers to stop once their current job finishes.
    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn wait(self) {
        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

fn run_worker(
    worker_id: usize,
    jobs: Receiver<String>,
    shutdown: Arc<AtomicBool>,
    orchestrator: Arc<Orchestrator>,
) {
    debug!("Worker {} started", worker_id);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Worker {} could not start its runtime: {}", worker_id, e);
            return;
        }
    };

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match jobs.recv_timeout(Duration::from_millis(100)) {
            Ok(job_id) => {
                debug!("Worker {} processing job {}", worker_id, job_id);
                match runtime.block_on(orchestrator.run(&job_id)) {
                    Ok(job) => debug!("Worker {} finished job {} as {}", worker_id, job_id, job.state),
                    Err(e) => error!("Worker {} failed job {}: {}", worker_id, job_id, e),
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Worker {} job channel disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}
