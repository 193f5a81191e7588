//! Worker pool for FUSE request handlers.
//!
//! fuser delivers every request on one session thread. Callbacks that touch
//! the disk (reads of registered files, registration on release) hand a
//! closure to this pool and return, so a slow read does not hold up a
//! `readdir` or a read of `map`. The closure owns the fuser reply and
//! answers the kernel from the worker thread.
//!
//! # Design
//!
//! - Fixed number of worker threads (defaults to the CPU count)
//! - Bounded submission queue; when full, the job runs on the caller's thread
//! - A pool with zero workers runs every job inline (debug/single-threaded mode)

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Default capacity of the submission queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Work item: a request handler together with its reply.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Counters for the pool.
#[derive(Debug, Default)]
pub struct ExecutorStats {
    /// Jobs handed to a worker.
    pub jobs_submitted: AtomicU64,
    /// Jobs a worker finished.
    pub jobs_completed: AtomicU64,
    /// Jobs run on the submitting thread (no workers, full queue, or shut down).
    pub jobs_inline: AtomicU64,
}

impl ExecutorStats {
    pub fn submitted(&self) -> u64 {
        self.jobs_submitted.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> u64 {
        self.jobs_completed.load(Ordering::Relaxed)
    }

    pub fn inline(&self) -> u64 {
        self.jobs_inline.load(Ordering::Relaxed)
    }
}

/// Pool configuration.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Number of worker threads. Zero runs every job inline.
    pub workers: usize,
    /// Capacity of the submission queue.
    pub queue_capacity: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl ExecutorConfig {
    /// Configuration that runs every job on the calling thread.
    pub fn inline() -> Self {
        Self {
            workers: 0,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }
}

/// Fixed-size thread pool running request handlers.
pub struct RequestExecutor {
    submit_tx: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    stats: Arc<ExecutorStats>,
}

impl std::fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("workers", &self.workers.len())
            .field("shutdown", &self.shutdown.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl RequestExecutor {
    /// Starts the pool.
    ///
    /// A worker that fails to spawn is logged and skipped; if none start,
    /// the pool degrades to inline execution.
    pub fn new(config: &ExecutorConfig) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(ExecutorStats::default());

        if config.workers == 0 {
            debug!("Request executor running inline");
            return Self {
                submit_tx: None,
                workers: Vec::new(),
                shutdown,
                stats,
            };
        }

        let (submit_tx, submit_rx) = bounded::<Job>(config.queue_capacity.max(1));
        let mut workers = Vec::with_capacity(config.workers);

        for worker_id in 0..config.workers {
            let rx = submit_rx.clone();
            let shutdown = Arc::clone(&shutdown);
            let stats = Arc::clone(&stats);

            match thread::Builder::new()
                .name(format!("launcherfs-worker-{worker_id}"))
                .spawn(move || worker_loop(worker_id, &rx, &shutdown, &stats))
            {
                Ok(handle) => workers.push(handle),
                Err(e) => warn!(worker_id, error = %e, "Failed to spawn worker thread"),
            }
        }

        if workers.is_empty() {
            warn!("No worker threads started, running requests inline");
            return Self {
                submit_tx: None,
                workers,
                shutdown,
                stats,
            };
        }

        info!(
            threads = workers.len(),
            capacity = config.queue_capacity,
            "Request executor started"
        );

        Self {
            submit_tx: Some(submit_tx),
            workers,
            shutdown,
            stats,
        }
    }

    /// Runs `job` on a worker, or inline when that is not possible.
    pub fn execute<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let job: Job = Box::new(job);

        let Some(tx) = self.submit_tx.as_ref().filter(|_| self.is_healthy()) else {
            self.run_inline(job);
            return;
        };

        match tx.try_send(job) {
            Ok(()) => {
                self.stats.jobs_submitted.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(job)) => {
                trace!("Executor queue full, running request inline");
                self.run_inline(job);
            }
            Err(TrySendError::Disconnected(job)) => {
                warn!("Executor channel disconnected, running request inline");
                self.run_inline(job);
            }
        }
    }

    fn run_inline(&self, job: Job) {
        self.stats.jobs_inline.fetch_add(1, Ordering::Relaxed);
        job();
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn stats(&self) -> &ExecutorStats {
        &self.stats
    }

    pub fn is_healthy(&self) -> bool {
        !self.shutdown.load(Ordering::Acquire)
    }

    /// Stops accepting work, drains queued jobs and joins the workers.
    pub fn shutdown(&mut self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        // Dropping the sender lets workers finish the queue and exit
        self.submit_tx = None;
        for handle in std::mem::take(&mut self.workers) {
            let _ = handle.join();
        }
        debug!("Request executor stopped");
    }
}

impl Drop for RequestExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(worker_id: usize, rx: &Receiver<Job>, shutdown: &AtomicBool, stats: &ExecutorStats) {
    trace!(worker_id, "Worker started");
    loop {
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(job) => {
                job();
                stats.jobs_completed.fetch_add(1, Ordering::Relaxed);
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                if shutdown.load(Ordering::Acquire) && rx.is_empty() {
                    break;
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }
    trace!(worker_id, "Worker exiting");
}
