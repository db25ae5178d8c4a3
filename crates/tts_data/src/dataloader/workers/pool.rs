//! Worker pool implementation for parallel batch assembly.
//!
//! Provides a thread pool that manages worker lifecycle, task routing and
//! result collection.
//!
//! # Key features
//! - Bounded channels prevent memory bloat
//! - Per-worker task channels: the caller decides which worker gets which
//!   task, so assignment is deterministic (round-robin in the loader)
//! - Optional initialization hook run on each worker thread before its first
//!   task (used for worker reseeding)
//! - Graceful shutdown on drop

use anyhow::{anyhow, bail, Context, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::debug;

use crate::dataloader::common::thread::{SeedWorkers, WORKER_ID};

/// Thread pool for parallel data loading.
///
/// Manages worker lifecycle and communication through bounded channels:
/// - Task channels: Main thread -> Worker `i` (one channel per worker)
/// - Output channel: Workers -> Main thread (result collection)
/// - Shutdown flag: Enables graceful termination
///
/// # Type Parameters
/// - `Task`: Work items sent to workers
/// - `Output`: Results returned from workers
pub(crate) struct WorkerPool<Task, Output> {
    workers: Vec<thread::JoinHandle<()>>,
    worker_task_txs: Vec<Sender<Task>>,
    output_rx: Receiver<Output>,
    shutdown: Arc<AtomicBool>,
}

impl<Task, Output> WorkerPool<Task, Output>
where
    Task: Send + 'static,
    Output: Send + 'static,
{
    /// Spawns `num_workers` threads.
    ///
    /// Each thread records its id in [`WORKER_ID`], runs `init` (if any), then
    /// hands its task receiver to `worker_fn`.
    pub(crate) fn new<F>(
        num_workers: usize,
        buffer_size: usize,
        init: Option<SeedWorkers>,
        worker_fn: F,
    ) -> Result<Self>
    where
        F: Fn(Receiver<Task>, Sender<Output>, Arc<AtomicBool>) + Send + Sync + 'static,
    {
        if num_workers == 0 {
            bail!(
                "Cannot create WorkerPool with 0 workers. \
                Either set num_workers > 0 or use single-threaded mode."
            );
        }

        if buffer_size == 0 {
            bail!(
                "Cannot create WorkerPool with buffer_size 0. \
                Buffer size must be > 0 to prevent deadlocks."
            );
        }

        let mut worker_task_txs = Vec::with_capacity(num_workers);
        let mut task_receivers = Vec::with_capacity(num_workers);
        for _ in 0..num_workers {
            let (tx, rx) = bounded(buffer_size);
            worker_task_txs.push(tx);
            task_receivers.push(rx);
        }
        let (output_tx, output_rx) = bounded(buffer_size * num_workers);

        let shutdown = Arc::new(AtomicBool::new(false));
        let worker_fn = Arc::new(worker_fn);
        let mut workers = Vec::with_capacity(num_workers);

        for (worker_id, task_rx) in task_receivers.into_iter().enumerate() {
            let output_tx = output_tx.clone();
            let shutdown_clone = shutdown.clone();
            let worker_fn_clone = worker_fn.clone();

            let handle = thread::Builder::new()
                .name(format!("dataloader-worker-{}", worker_id))
                .spawn(move || {
                    WORKER_ID.with(|id| id.set(Some(worker_id)));
                    if let Some(hook) = init {
                        hook.init(worker_id);
                        debug!(worker_id, seed = hook.seed_for(worker_id), "Seeded worker");
                    }
                    worker_fn_clone(task_rx, output_tx, shutdown_clone);
                })
                .with_context(|| format!("Failed to spawn worker thread {}", worker_id))?;

            workers.push(handle);
        }

        debug!(num_workers, buffer_size, "Started worker pool");
        Ok(Self {
            workers,
            worker_task_txs,
            output_rx,
            shutdown,
        })
    }

    pub(crate) fn num_workers(&self) -> usize {
        self.worker_task_txs.len()
    }

    /// Routes a task to one worker. Blocks while that worker's queue is full.
    pub(crate) fn send_to(&self, worker: usize, task: Task) -> Result<()> {
        let tx = self
            .worker_task_txs
            .get(worker)
            .ok_or_else(|| anyhow!("Worker {} does not exist", worker))?;
        tx.send(task)
            .map_err(|_| anyhow!("Worker {} has shut down", worker))
    }

    pub(crate) fn recv_timeout(&self, timeout: Duration) -> Result<Output> {
        match self.output_rx.recv_timeout(timeout) {
            Ok(output) => Ok(output),
            Err(RecvTimeoutError::Timeout) => Err(anyhow!(
                "Timed out after {:?} waiting for a worker result",
                timeout
            )),
            Err(RecvTimeoutError::Disconnected) => Err(anyhow!("All workers have exited")),
        }
    }
}

impl<Task, Output> Drop for WorkerPool<Task, Output> {
    fn drop(&mut self) {
        // Signal shutdown to all workers
        self.shutdown.store(true, Ordering::Relaxed);

        // Drop all task senders to close channels
        self.worker_task_txs.clear();

        // Unblock workers stuck on a full output channel
        while self.output_rx.try_recv().is_ok() {}

        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        debug!("Worker pool shut down");
    }
}

/// Standard worker loop: process tasks until the channel closes or shutdown
/// is signalled, polling the flag every `poll` interval.
pub(crate) fn run_worker<Task, Output>(
    task_rx: &Receiver<Task>,
    output_tx: &Sender<Output>,
    shutdown: &AtomicBool,
    poll: Duration,
    mut process: impl FnMut(Task) -> Output,
) {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        match task_rx.recv_timeout(poll) {
            Ok(task) => {
                if output_tx.send(process(task)).is_err() {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}
