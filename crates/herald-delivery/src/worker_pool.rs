//! Supervised pool of delivery workers.
//!
//! Shutdown is two-phase. The owner closes the queue first, so workers finish
//! what is queued and exit on their own. If that takes longer than the
//! shutdown timeout the pool cancels the workers, which fails their in-flight
//! tasks, and fails whatever is still queued.

use std::{sync::Arc, time::Duration};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    error::{DeliveryError, Result},
    queue::TaskReceiver,
    stats::StatsRecorder,
    worker::{DeliveryWorker, TaskExecutor},
};

/// Owns the worker tasks and their shared cancellation token.
pub struct WorkerPool {
    worker_count: usize,
    executor: Arc<TaskExecutor>,
    receiver: TaskReceiver,
    stats: Arc<StatsRecorder>,
    cancellation_token: CancellationToken,
    worker_handles: Vec<JoinHandle<Result<()>>>,
}

impl WorkerPool {
    /// Creates a pool; no workers run until `spawn_workers`.
    pub fn new(
        worker_count: usize,
        executor: Arc<TaskExecutor>,
        receiver: TaskReceiver,
        stats: Arc<StatsRecorder>,
    ) -> Self {
        Self {
            worker_count,
            executor,
            receiver,
            stats,
            cancellation_token: CancellationToken::new(),
            worker_handles: Vec::new(),
        }
    }

    /// Spawns the configured number of workers.
    pub fn spawn_workers(&mut self) {
        info!(worker_count = self.worker_count, "spawning delivery workers");

        for worker_id in 0..self.worker_count {
            let worker = DeliveryWorker::new(
                worker_id,
                self.executor.clone(),
                self.receiver.clone(),
                self.cancellation_token.clone(),
            );

            let handle = tokio::spawn(async move {
                let result = worker.run().await;
                if let Err(ref error) = result {
                    error!(worker_id, error = %error, "delivery worker terminated with error");
                }
                result
            });

            self.worker_handles.push(handle);
        }

        self.stats.set_active_workers(self.worker_handles.len());
    }

    /// Number of spawned workers still running.
    pub fn active_workers(&self) -> usize {
        self.worker_handles.iter().filter(|h| !h.is_finished()).count()
    }

    /// Waits for workers to drain the closed queue.
    ///
    /// # Errors
    ///
    /// Returns `ShutdownTimeout` if the workers had to be cancelled. Their
    /// in-flight tasks and any still queued tasks are failed in that case.
    /// Returns `WorkerPanic` for the first worker that panicked.
    pub async fn shutdown_graceful(mut self, timeout: Duration) -> Result<()> {
        info!(
            worker_count = self.worker_handles.len(),
            timeout_ms = timeout.as_millis(),
            "waiting for delivery workers to drain"
        );

        let handles = &mut self.worker_handles;
        let join_all = async move {
            let mut panics = Vec::new();
            for (worker_id, handle) in handles.iter_mut().enumerate() {
                if let Err(join_error) = handle.await {
                    error!(worker_id, error = %join_error, "delivery worker panicked");
                    panics.push(DeliveryError::WorkerPanic {
                        worker_id,
                        error: join_error.to_string(),
                    });
                }
            }
            panics
        };

        let result = match tokio::time::timeout(timeout, join_all).await {
            Ok(panics) if panics.is_empty() => {
                info!("worker pool drained");
                Ok(())
            },
            Ok(mut panics) => {
                warn!(panics = panics.len(), "worker pool drained with panicked workers");
                // Panicked workers may have left tasks behind.
                self.fail_remaining().await;
                Err(panics.swap_remove(0))
            },
            Err(_elapsed) => {
                error!(
                    timeout_ms = timeout.as_millis(),
                    "worker drain timed out, cancelling in-flight deliveries"
                );
                self.cancellation_token.cancel();
                for handle in self.worker_handles.drain(..) {
                    if !handle.is_finished() {
                        let _ = handle.await;
                    }
                }
                self.fail_remaining().await;
                Err(DeliveryError::ShutdownTimeout { timeout })
            },
        };

        self.worker_handles.clear();
        self.stats.set_active_workers(0);
        result
    }

    /// Fails every task still in the queue.
    pub(crate) async fn fail_remaining(&self) {
        let mut receiver = self.receiver.lock().await;
        receiver.close();

        let mut failed = 0_usize;
        while let Ok(task) = receiver.try_recv() {
            self.executor.reject(task, &DeliveryError::ShutdownRequested).await;
            failed += 1;
        }

        if failed > 0 {
            warn!(failed, "failed queued tasks left at shutdown");
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        let active = self.active_workers();
        if active > 0 && !self.cancellation_token.is_cancelled() {
            error!(
                active_workers = active,
                "worker pool dropped without shutdown, cancelling workers"
            );
            self.cancellation_token.cancel();
        }
    }
}
