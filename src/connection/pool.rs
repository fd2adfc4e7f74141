//! Bounded Worker Pool
//!
//! Each parsed line is dispatched on its own Tokio task so a slow handler
//! does not hold up the read loop. A semaphore caps how many of those tasks
//! run at once; when every permit is taken, `submit` waits, which in turn
//! pauses reading.
//!
//! Completion order across tasks is not defined.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Default number of concurrent handler tasks
pub const DEFAULT_WORKERS: usize = 10;

/// A fixed-size pool of handler tasks.
#[derive(Debug)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    tasks: JoinSet<()>,
    size: usize,
}

impl WorkerPool {
    /// Creates a pool that runs at most `size` jobs at a time.
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            tasks: JoinSet::new(),
            size,
        }
    }

    /// Maximum number of concurrent jobs.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of jobs spawned and not yet reaped.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Waits for a free slot, then runs `job` on its own task.
    ///
    /// Does nothing once the pool has been shut down.
    pub async fn submit<F>(&mut self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.reap_finished();

        let permit = match Arc::clone(&self.permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                debug!("Worker pool closed, dropping job");
                return;
            }
        };

        self.tasks.spawn(async move {
            let _permit = permit;
            job.await;
        });
    }

    /// Waits until every submitted job has finished.
    pub async fn wait_idle(&mut self) {
        while let Some(result) = self.tasks.join_next().await {
            log_outcome(result);
        }
    }

    /// Cancels queued and running jobs and waits for them to unwind.
    pub async fn shutdown(&mut self) {
        self.permits.close();
        let pending = self.tasks.len();
        self.tasks.abort_all();
        self.wait_idle().await;
        debug!(cancelled = pending, "Worker pool shut down");
    }

    fn reap_finished(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            log_outcome(result);
        }
    }
}

fn log_outcome(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            warn!(error = %e, "Handler task panicked");
        }
    }
}
