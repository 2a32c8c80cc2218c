// src/pool/mod.rs
// =============================================================================
// A fixed-size pool of workers draining one shared task queue.
//
// How it works:
// 1. All tasks go into a VecDeque behind a mutex
// 2. `concurrency` workers are spawned onto the tokio runtime
// 3. Each worker pops a task, runs it on its own tokio task, and sends the
//    outcome down a channel the moment it is known
// 4. Once every worker has returned, outcomes are folded into a ScanResult
//    keyed by URL, so the order workers finished in does not matter
//
// A failed task is just an error entry; it never cancels its siblings. A
// task that panics is caught at its own spawn boundary and recorded as
// TaskPanicked, so the worker that ran it keeps going and nothing it already
// finished is lost.
//
// Stopping is cooperative: tasks already running finish, queued tasks are
// left alone, counted as skipped, and their records handed back so the
// caller still has them.
//
// Rust concepts:
// - Generics with trait bounds: `run<T: Task>` works for any task type
// - Arc<Mutex<..>>: one queue shared by many workers
// - mpsc channels: workers report outcomes without sharing the result
// - JoinSet / JoinHandle: waiting on spawned tasks and catching panics
// =============================================================================

mod task;

pub use task::{plan_downloads, DownloadTask, Task, TaskOutput, TaskState, VerifyTask};

use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use crate::error::ErrorKind;
use crate::scan::ScanResult;

pub struct WorkerPool {
    concurrency: usize,
    stop: CancellationToken,
}

impl WorkerPool {
    /// Fails with PoolExhausted when `concurrency` is zero.
    pub fn new(concurrency: usize) -> Result<Self, ErrorKind> {
        if concurrency < 1 {
            return Err(ErrorKind::PoolExhausted(concurrency));
        }
        Ok(Self {
            concurrency,
            stop: CancellationToken::new(),
        })
    }

    /// Shares an existing stop flag, e.g. one wired to Ctrl-C.
    pub fn with_stop(mut self, stop: CancellationToken) -> Self {
        self.stop = stop;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    // Runs every task and returns once the queue is drained (or a stop was
    // signalled and the in-flight tasks have finished).
    pub async fn run<T: Task>(&self, domain: &str, tasks: Vec<T>) -> ScanResult {
        let total = tasks.len();
        let mut result = ScanResult::new(domain);
        if total == 0 {
            return result;
        }

        let queue: Arc<Mutex<VecDeque<T>>> = Arc::new(Mutex::new(tasks.into()));
        let workers = self.concurrency.min(total);
        debug!(domain = %domain, tasks = total, workers, state = ?TaskState::Pending, "starting worker pool");

        // Each outcome travels as (url, result) as soon as its task is done
        let (sender, mut outcomes) = mpsc::unbounded_channel();

        let mut set = JoinSet::new();
        for worker_id in 0..workers {
            let queue = Arc::clone(&queue);
            let stop = self.stop.clone();
            let sender = sender.clone();

            set.spawn(async move {
                loop {
                    if stop.is_cancelled() {
                        break;
                    }
                    // The lock guard is dropped at the end of this statement,
                    // so other workers can pop while this task runs
                    let next = queue.lock().await.pop_front();
                    let Some(task) = next else {
                        break;
                    };

                    let key = task.record().url.clone();
                    trace!(worker_id, url = %key, state = ?TaskState::Running);

                    // Run on a separate tokio task: a panic inside execute()
                    // surfaces here as a JoinError instead of killing the worker
                    let outcome = match tokio::spawn(async move { task.execute().await }).await {
                        Ok(outcome) => outcome,
                        Err(e) => Err(ErrorKind::TaskPanicked(e.to_string())),
                    };
                    let state = if outcome.is_ok() {
                        TaskState::Completed
                    } else {
                        TaskState::Failed
                    };
                    trace!(worker_id, url = %key, state = ?state);

                    // Only fails if the receiver is gone, which can't happen
                    // before every worker has been joined
                    let _ = sender.send((key, outcome));
                }
            });
        }
        // Keep only the workers' senders alive
        drop(sender);

        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "worker terminated abnormally");
            }
        }

        let mut failed = 0usize;
        while let Ok((key, outcome)) = outcomes.try_recv() {
            match outcome {
                Ok(output) => result.record_output(output),
                Err(kind) => {
                    debug!(url = %key, error = %kind, "task failed");
                    failed += 1;
                    result.record_error(key, kind);
                }
            }
        }

        // Whatever is still queued was never started
        let leftover: Vec<T> = queue.lock().await.drain(..).collect();
        let skipped = leftover.len();
        if skipped > 0 {
            info!(domain = %domain, skipped, "stop requested, queued tasks skipped");
            for task in leftover {
                result.record_skipped(task.record().clone());
            }
        }
        debug!(domain = %domain, completed = total.saturating_sub(failed + skipped), failed, skipped, "worker pool finished");

        result
    }
}
