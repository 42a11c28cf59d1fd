//! Delivery engine: the task queue plus the workers that drain it.

use std::{sync::Arc, time::Duration};

use herald_core::{Clock, EventHandler, NoOpEventHandler, RealClock};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    client::{ClientConfig, DeliveryClient, Transport},
    error::{DeliveryError, Result},
    integrations::IntegrationRegistry,
    queue::{ChannelQueue, TaskReceiver},
    retry::RetryPolicy,
    stats::{EngineStats, StatsRecorder},
    worker::TaskExecutor,
    worker_pool::WorkerPool,
    DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKER_COUNT,
};

/// Configuration for the delivery engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Number of concurrent delivery workers.
    pub worker_count: usize,

    /// Maximum number of queued tasks.
    pub queue_capacity: usize,

    /// Time allowed for workers to drain the queue at shutdown.
    pub shutdown_timeout: Duration,

    /// HTTP client configuration.
    pub client_config: ClientConfig,

    /// Retry policy applied to every task.
    pub retry_policy: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            shutdown_timeout: Duration::from_secs(30),
            client_config: ClientConfig::default(),
            retry_policy: RetryPolicy::default(),
        }
    }
}

/// Owns the queue and the worker pool.
///
/// Hand [`DeliveryEngine::queue`] to the dispatcher, call `start` to spawn
/// workers, and `shutdown` to drain and stop them.
pub struct DeliveryEngine {
    config: EngineConfig,
    queue: Arc<ChannelQueue>,
    receiver: TaskReceiver,
    transport: Arc<dyn Transport>,
    integrations: Arc<IntegrationRegistry>,
    clock: Arc<dyn Clock>,
    event_handler: Arc<dyn EventHandler>,
    stats: Arc<StatsRecorder>,
    worker_pool: Option<WorkerPool>,
}

impl DeliveryEngine {
    /// Creates an engine delivering over HTTP with reqwest.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if the HTTP client cannot be built.
    pub fn new(config: EngineConfig, integrations: IntegrationRegistry) -> Result<Self> {
        let client = DeliveryClient::new(config.client_config.clone())?;
        Ok(Self::with_transport(config, integrations, Arc::new(client)))
    }

    /// Creates an engine delivering through the given transport.
    pub fn with_transport(
        config: EngineConfig,
        integrations: IntegrationRegistry,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let stats = Arc::new(StatsRecorder::default());
        let (queue, receiver) = ChannelQueue::new(config.queue_capacity, stats.clone());

        Self {
            config,
            queue: Arc::new(queue),
            receiver,
            transport,
            integrations: Arc::new(integrations),
            clock: Arc::new(RealClock),
            event_handler: Arc::new(NoOpEventHandler),
            stats,
            worker_pool: None,
        }
    }

    /// Uses the given clock for backoff and timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Publishes delivery outcomes to the given handler.
    #[must_use]
    pub fn with_event_handler(mut self, event_handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = event_handler;
        self
    }

    /// The queue tasks are submitted to.
    pub fn queue(&self) -> Arc<ChannelQueue> {
        self.queue.clone()
    }

    /// The integrations tasks are delivered through.
    pub fn integrations(&self) -> Arc<IntegrationRegistry> {
        self.integrations.clone()
    }

    /// Spawns the worker pool.
    ///
    /// # Errors
    ///
    /// Returns `InternalError` if the engine is already running or was
    /// given zero workers.
    pub fn start(&mut self) -> Result<()> {
        if self.worker_pool.is_some() {
            return Err(DeliveryError::internal("delivery engine already started"));
        }
        if self.config.worker_count == 0 {
            return Err(DeliveryError::internal("delivery engine needs at least one worker"));
        }

        info!(
            worker_count = self.config.worker_count,
            queue_capacity = self.queue.capacity(),
            max_attempts = self.config.retry_policy.max_attempts,
            "starting delivery engine"
        );

        let mut pool = WorkerPool::new(
            self.config.worker_count,
            Arc::new(self.executor()),
            self.receiver.clone(),
            self.stats.clone(),
        );
        pool.spawn_workers();
        self.worker_pool = Some(pool);

        Ok(())
    }

    /// Closes the queue and waits for workers to drain it.
    ///
    /// # Errors
    ///
    /// Returns `ShutdownTimeout` if the workers had to be cancelled after
    /// `shutdown_timeout`; their in-flight and queued tasks are failed.
    /// Returns `WorkerPanic` if a worker panicked while draining.
    pub async fn shutdown(mut self) -> Result<()> {
        info!("shutting down delivery engine");
        self.queue.close();

        match self.worker_pool.take() {
            Some(pool) => pool.shutdown_graceful(self.config.shutdown_timeout).await,
            None => {
                // Never started: nothing will drain the queue.
                let pool = WorkerPool::new(
                    0,
                    Arc::new(self.executor()),
                    self.receiver.clone(),
                    self.stats.clone(),
                );
                pool.fail_remaining().await;
                Ok(())
            },
        }
    }

    /// Current engine statistics.
    pub fn stats(&self) -> EngineStats {
        self.stats.snapshot()
    }

    fn executor(&self) -> TaskExecutor {
        TaskExecutor::new(
            self.transport.clone(),
            self.integrations.clone(),
            self.config.retry_policy.clone(),
        )
        .with_clock(self.clock.clone())
        .with_event_handler(self.event_handler.clone())
        .with_stats(self.stats.clone())
    }
}
