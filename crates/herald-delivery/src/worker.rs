//! Task execution and the worker loop.
//!
//! [`TaskExecutor`] drives one [`DeliveryTask`] through its state machine:
//! resolve the target into a request, attempt, back off, and repeat until
//! the task is terminal. [`DeliveryWorker`] pulls tasks off the shared queue
//! receiver and hands each one to the executor.

use std::sync::Arc;

use herald_core::{
    models::validate_post_url, Clock, DeliveryAttemptStartedEvent, DeliveryEvent,
    DeliveryFailedEvent, DeliverySkippedEvent, DeliverySucceededEvent, DeliveryTarget,
    EventHandler, EventPayload, NoOpEventHandler, RealClock, RetryScheduledEvent,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::{
    client::{OutboundRequest, Transport},
    error::{DeliveryError, ErrorCategory, Result},
    integrations::{DeliveryOutcome, IntegrationAdapter, IntegrationRegistry, Rendered},
    queue::TaskReceiver,
    retry::RetryPolicy,
    stats::StatsRecorder,
    task::{DeliveryTask, TaskTransition},
    ATTEMPT_HEADER, EVENT_HEADER, TASK_ID_HEADER,
};

/// A target checked before its first attempt.
enum Prepared<'a> {
    /// Webhook request without the per-attempt header.
    Webhook(OutboundRequest),
    /// Integration that accepted the event.
    Integration(&'a IntegrationAdapter),
    /// Integration that declined the event.
    Skip(String),
}

/// Runs delivery tasks to completion.
#[derive(Debug, Clone)]
pub struct TaskExecutor {
    transport: Arc<dyn Transport>,
    integrations: Arc<IntegrationRegistry>,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
    event_handler: Arc<dyn EventHandler>,
    stats: Arc<StatsRecorder>,
}

impl TaskExecutor {
    /// Creates an executor with the real clock and no event handler.
    pub fn new(
        transport: Arc<dyn Transport>,
        integrations: Arc<IntegrationRegistry>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            integrations,
            policy,
            clock: Arc::new(RealClock),
            event_handler: Arc::new(NoOpEventHandler),
            stats: Arc::new(StatsRecorder::default()),
        }
    }

    /// Uses the given clock for backoff sleeps and timestamps.
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

    /// Records counters into the given recorder.
    #[must_use]
    pub fn with_stats(mut self, stats: Arc<StatsRecorder>) -> Self {
        self.stats = stats;
        self
    }

    /// Executes a task until it succeeds, fails, or is cancelled.
    ///
    /// Never returns an error: every outcome is recorded on the returned task
    /// and published to the event handler. Cancellation fails the task
    /// without further retries.
    pub async fn execute(
        &self,
        mut task: DeliveryTask,
        cancel: &CancellationToken,
    ) -> DeliveryTask {
        let span = info_span!(
            "event_delivery",
            task_id = %task.id,
            event = %task.event_name(),
            target = %task.target,
        );

        self.stats.task_started();
        self.run(&mut task, cancel).instrument(span).await;
        self.stats.task_finished();

        task
    }

    async fn run(&self, task: &mut DeliveryTask, cancel: &CancellationToken) {
        let prepared = match self.prepare(task) {
            Ok(Prepared::Skip(reason)) => {
                self.skip(task, reason).await;
                return;
            },
            Ok(prepared) => prepared,
            Err(error) => {
                warn!(
                    category = %ErrorCategory::from(&error),
                    error = %error,
                    "delivery target unusable, failing without attempt"
                );
                task.fail_without_attempt(&error);
                self.publish_failed(task, &error).await;
                return;
            },
        };

        loop {
            let attempt_number = task.begin_attempt();
            self.publish(DeliveryEvent::AttemptStarted(DeliveryAttemptStartedEvent {
                task_id: task.id,
                event_name: task.event_name().to_string(),
                target: task.target.clone(),
                attempt_number,
                started_at: self.clock.now_utc(),
            }))
            .await;

            let result = tokio::select! {
                result = self.attempt(&prepared, &task.payload, attempt_number) => Some(result),
                () = cancel.cancelled() => None,
            };
            let Some(result) = result else {
                self.abandon(task).await;
                return;
            };

            let error = match result {
                Ok(DeliveryOutcome::Skipped { reason }) => {
                    self.skip(task, reason).await;
                    return;
                },
                Ok(DeliveryOutcome::Delivered { status_code }) => {
                    info!(attempt = attempt_number, status_code, "event delivered successfully");
                    task.succeed();
                    self.stats.succeeded();
                    self.publish(DeliveryEvent::Succeeded(DeliverySucceededEvent {
                        task_id: task.id,
                        event_name: task.event_name().to_string(),
                        target: task.target.clone(),
                        response_status: status_code,
                        attempt_number,
                        delivered_at: self.clock.now_utc(),
                    }))
                    .await;
                    return;
                },
                Err(error) => error,
            };

            match task.record_failure(&error, &self.policy) {
                TaskTransition::Retry { delay } => {
                    warn!(
                        attempt = attempt_number,
                        delay_ms = delay.as_millis(),
                        category = %ErrorCategory::from(&error),
                        status_code = error.status_code(),
                        error = %error,
                        "delivery attempt failed, retry scheduled"
                    );
                    self.stats.retry_scheduled();
                    self.publish(DeliveryEvent::RetryScheduled(RetryScheduledEvent {
                        task_id: task.id,
                        event_name: task.event_name().to_string(),
                        target: task.target.clone(),
                        attempt_number,
                        delay,
                        error_message: error.to_string(),
                    }))
                    .await;

                    tokio::select! {
                        () = self.clock.sleep(delay) => {},
                        () = cancel.cancelled() => {
                            self.abandon(task).await;
                            return;
                        },
                    }
                },
                TaskTransition::Failed { reason } => {
                    error!(
                        attempt = attempt_number,
                        reason = %reason,
                        category = %ErrorCategory::from(&error),
                        status_code = error.status_code(),
                        error = %error,
                        "delivery failed permanently"
                    );
                    self.publish_failed(task, &error).await;
                    return;
                },
            }
        }
    }

    /// Fails a task that will never be executed, e.g. left in the queue at
    /// forced shutdown.
    pub(crate) async fn reject(&self, mut task: DeliveryTask, error: &DeliveryError) {
        task.fail_without_attempt(error);
        self.publish_failed(&task, error).await;
    }

    fn prepare(&self, task: &DeliveryTask) -> Result<Prepared<'_>> {
        match &task.target {
            DeliveryTarget::Webhook { post_url } => {
                validate_post_url(post_url)?;
                let request = OutboundRequest::post(post_url, task.payload.wire_body())
                    .header(EVENT_HEADER, task.event_name())
                    .header(TASK_ID_HEADER, task.id.to_string());
                Ok(Prepared::Webhook(request))
            },
            DeliveryTarget::Integration { integration } => {
                let adapter = self.integrations.get(*integration).ok_or_else(|| {
                    DeliveryError::configuration(format!(
                        "{integration} integration is not registered"
                    ))
                })?;
                // Rendered up front so config faults and skips cost no attempt.
                match adapter.render(&task.payload)? {
                    Rendered::Send(_) => Ok(Prepared::Integration(adapter)),
                    Rendered::Skip(reason) => Ok(Prepared::Skip(reason)),
                }
            },
        }
    }

    async fn attempt(
        &self,
        prepared: &Prepared<'_>,
        payload: &EventPayload,
        attempt_number: u32,
    ) -> Result<DeliveryOutcome> {
        match prepared {
            Prepared::Webhook(request) => {
                let request = request.clone().header(ATTEMPT_HEADER, attempt_number.to_string());
                let response = self.transport.post(&request).await?.error_for_status()?;
                Ok(DeliveryOutcome::Delivered { status_code: response.status_code })
            },
            Prepared::Integration(adapter) => {
                adapter.deliver(payload, self.transport.as_ref()).await
            },
            Prepared::Skip(reason) => Ok(DeliveryOutcome::Skipped { reason: reason.clone() }),
        }
    }

    async fn skip(&self, task: &mut DeliveryTask, reason: String) {
        debug!(reason = %reason, "integration skipped event");
        task.succeed();
        self.stats.skipped();
        self.publish(DeliveryEvent::Skipped(DeliverySkippedEvent {
            task_id: task.id,
            event_name: task.event_name().to_string(),
            target: task.target.clone(),
            reason,
        }))
        .await;
    }

    async fn abandon(&self, task: &mut DeliveryTask) {
        warn!(attempt = task.attempt, "delivery cancelled by shutdown");
        task.abandon();
        self.publish_failed(task, &DeliveryError::ShutdownRequested).await;
    }

    async fn publish_failed(&self, task: &DeliveryTask, error: &DeliveryError) {
        self.stats.failed();
        self.publish(DeliveryEvent::Failed(DeliveryFailedEvent {
            task_id: task.id,
            event_name: task.event_name().to_string(),
            target: task.target.clone(),
            attempts: task.attempt,
            failed_at: self.clock.now_utc(),
            error_message: error.to_string(),
            is_retryable: error.is_retryable(),
        }))
        .await;
    }

    async fn publish(&self, event: DeliveryEvent) {
        self.event_handler.handle_event(event).await;
    }
}

/// Pulls tasks from the shared receiver until the queue is drained or the
/// worker is cancelled.
#[derive(Debug)]
pub struct DeliveryWorker {
    id: usize,
    executor: Arc<TaskExecutor>,
    receiver: TaskReceiver,
    cancellation_token: CancellationToken,
}

impl DeliveryWorker {
    /// Creates a worker.
    pub fn new(
        id: usize,
        executor: Arc<TaskExecutor>,
        receiver: TaskReceiver,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self { id, executor, receiver, cancellation_token }
    }

    /// Main worker loop.
    ///
    /// Returns once the queue is closed and empty, or when cancelled.
    ///
    /// # Errors
    ///
    /// Currently never fails; task failures are recorded per task.
    pub async fn run(&self) -> Result<()> {
        debug!(worker_id = self.id, "delivery worker started");

        loop {
            if self.cancellation_token.is_cancelled() {
                info!(worker_id = self.id, "delivery worker received shutdown signal");
                break;
            }

            let next = {
                let mut receiver = tokio::select! {
                    biased;
                    () = self.cancellation_token.cancelled() => break,
                    guard = self.receiver.lock() => guard,
                };
                tokio::select! {
                    biased;
                    () = self.cancellation_token.cancelled() => break,
                    task = receiver.recv() => task,
                }
            };

            let Some(task) = next else {
                debug!(worker_id = self.id, "task queue closed and drained");
                break;
            };

            let task = self.executor.execute(task, &self.cancellation_token).await;
            debug!(
                worker_id = self.id,
                task_id = %task.id,
                state = %task.state,
                attempts = task.attempt,
                "task finished"
            );
        }

        debug!(worker_id = self.id, "delivery worker stopped");
        Ok(())
    }
}
