use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::RuntimeConfig;
use super::lifecycle::{ShutdownReason, WorkerLifecycle, WorkerState};
use super::registry::ProcessorRegistry;
use super::response::{build_envelope, preview, ResponseEnvelope};
use super::transport::{ApiResponse, TransportError, WorkflowTransport};
use super::types::{Task, TaskFailure, TaskResult};

/// Counters kept across the lifetime of one worker.
#[derive(Debug, Default)]
pub struct WorkerStats {
    polls: AtomicU64,
    tasks_succeeded: AtomicU64,
    tasks_failed: AtomicU64,
    poll_errors: AtomicU64,
    auth_failures: AtomicU64,
    submit_failures: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStatsSnapshot {
    pub polls: u64,
    pub tasks_succeeded: u64,
    pub tasks_failed: u64,
    pub poll_errors: u64,
    pub auth_failures: u64,
    pub submit_failures: u64,
}

impl WorkerStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            polls: self.polls.load(Ordering::Relaxed),
            tasks_succeeded: self.tasks_succeeded.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            poll_errors: self.poll_errors.load(Ordering::Relaxed),
            auth_failures: self.auth_failures.load(Ordering::Relaxed),
            submit_failures: self.submit_failures.load(Ordering::Relaxed),
        }
    }
}

/// What a poll response means for the loop.
#[derive(Debug)]
pub enum PollOutcome {
    Task(Box<Task>),
    NoWork,
    Unauthorized,
    Failed(String),
}

pub fn classify_poll(polled: Result<ApiResponse<Task>, TransportError>) -> PollOutcome {
    match polled {
        Err(TransportError::Unauthorized) => PollOutcome::Unauthorized,
        Err(e) => PollOutcome::Failed(e.to_string()),
        Ok(response) if !response.success => PollOutcome::Failed(
            response
                .message
                .unwrap_or_else(|| "workflow API reported failure".to_string()),
        ),
        Ok(ApiResponse { data: None, .. }) => PollOutcome::NoWork,
        Ok(ApiResponse { data: Some(task), .. }) => PollOutcome::Task(Box::new(task)),
    }
}

/// Result of a single loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Iteration {
    /// A task went through dispatch and submission.
    Processed,
    /// Wait this long before polling again.
    Sleep(Duration),
    /// Poll again straight away.
    Repoll,
    Cancelled,
}

/// Polls the workflow API, runs one task at a time and reports the outcome.
pub struct WorkflowWorker {
    transport: Arc<dyn WorkflowTransport>,
    registry: ProcessorRegistry,
    lifecycle: WorkerLifecycle,
    polling_interval: Duration,
    retry_delay: Duration,
    stats: Arc<WorkerStats>,
}

impl WorkflowWorker {
    pub fn new(
        transport: Arc<dyn WorkflowTransport>,
        registry: ProcessorRegistry,
        lifecycle: WorkerLifecycle,
        config: &RuntimeConfig,
    ) -> Self {
        Self {
            transport,
            registry,
            lifecycle,
            polling_interval: config.polling_interval(),
            retry_delay: config.retry_delay(),
            stats: Arc::new(WorkerStats::default()),
        }
    }

    pub fn with_intervals(mut self, polling_interval: Duration, retry_delay: Duration) -> Self {
        self.polling_interval = polling_interval;
        self.retry_delay = retry_delay;
        self
    }

    pub fn lifecycle(&self) -> &WorkerLifecycle {
        &self.lifecycle
    }

    pub fn stats(&self) -> Arc<WorkerStats> {
        self.stats.clone()
    }

    /// Run until stopped or cancelled.
    pub async fn run(&self) -> ShutdownReason {
        info!(
            actions = ?self.registry.actions(),
            polling_secs = self.polling_interval.as_secs_f64(),
            retry_secs = self.retry_delay.as_secs_f64(),
            "Workflow worker started"
        );

        while !self.lifecycle.is_cancelled() {
            match self.run_once().await {
                Iteration::Processed => {}
                Iteration::Repoll => tokio::task::yield_now().await,
                Iteration::Sleep(delay) => {
                    self.lifecycle.set_state(WorkerState::Sleeping);
                    if !self.lifecycle.sleep(delay).await {
                        break;
                    }
                }
                Iteration::Cancelled => break,
            }
            self.lifecycle.set_state(WorkerState::Idle);
        }

        self.lifecycle.set_state(WorkerState::Stopped);
        let reason = self.lifecycle.shutdown_reason();
        info!(?reason, stats = ?self.stats.snapshot(), "Workflow worker stopped");
        reason
    }

    /// One poll, and when a task arrives its dispatch and submission.
    pub async fn run_once(&self) -> Iteration {
        self.lifecycle.set_state(WorkerState::Polling);
        WorkerStats::bump(&self.stats.polls);

        let polled = match self.lifecycle.guard(self.transport.fetch_next()).await {
            Some(polled) => polled,
            None => return Iteration::Cancelled,
        };

        let task = match classify_poll(polled) {
            PollOutcome::Task(task) => *task,
            PollOutcome::NoWork => {
                debug!("No pending tasks");
                return Iteration::Sleep(self.polling_interval);
            }
            PollOutcome::Unauthorized => {
                WorkerStats::bump(&self.stats.auth_failures);
                error!("Server key rejected by workflow API (401); check SERVER_KEY");
                return Iteration::Repoll;
            }
            PollOutcome::Failed(reason) => {
                WorkerStats::bump(&self.stats.poll_errors);
                warn!(%reason, delay_secs = self.retry_delay.as_secs_f64(), "Polling failed, retrying later");
                return Iteration::Sleep(self.retry_delay);
            }
        };

        info!(task_id = %task.task_id, action = %task.action, "Task received");
        self.lifecycle.set_state(WorkerState::Dispatching);

        let outcome = match self.dispatch(&task).await {
            Some(outcome) => outcome,
            None => {
                warn!(task_id = %task.task_id, "Cancelled while processing; result not submitted");
                return Iteration::Cancelled;
            }
        };

        match &outcome {
            Ok(_) => WorkerStats::bump(&self.stats.tasks_succeeded),
            Err(failure) => {
                WorkerStats::bump(&self.stats.tasks_failed);
                warn!(task_id = %task.task_id, code = failure.kind.code(), error = %failure.message, "Task failed");
            }
        }

        self.lifecycle.set_state(WorkerState::Submitting);
        let envelope = build_envelope(&task, &outcome);
        debug!(task_id = %task.task_id, preview = %preview(&envelope), "Submitting response");

        if self.lifecycle.guard(self.submit(&envelope)).await.is_none() {
            return Iteration::Cancelled;
        }

        Iteration::Processed
    }

    /// Resolve and run the capability in its own task so a panic stays contained.
    /// `None` means cancellation won; the capability is aborted.
    async fn dispatch(&self, task: &Task) -> Option<Result<TaskResult, TaskFailure>> {
        let processor = match self.registry.resolve(&task.action) {
            Ok(processor) => processor,
            Err(_) => return Some(Err(TaskFailure::unknown_action(&task.action))),
        };

        let owned = task.clone();
        let mut handle = tokio::spawn(async move { processor.process(&owned).await });

        let joined = tokio::select! {
            biased;
            _ = self.lifecycle.token().cancelled() => {
                handle.abort();
                return None;
            }
            joined = &mut handle => joined,
        };

        Some(match joined {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => Err(TaskFailure::processing(&task.action, format!("{:#}", e))),
            Err(e) if e.is_panic() => Err(TaskFailure::processing(&task.action, "capability panicked")),
            Err(e) => Err(TaskFailure::processing(&task.action, e.to_string())),
        })
    }

    /// Best effort: failures are logged and counted, never retried.
    async fn submit(&self, envelope: &ResponseEnvelope) {
        match self.transport.submit(envelope).await {
            Ok(response) if response.success => {
                info!(task_id = %envelope.task_id, success = envelope.success, "Response submitted");
            }
            Ok(response) => {
                warn!(
                    task_id = %envelope.task_id,
                    message = response.message.as_deref().unwrap_or(""),
                    "Workflow API did not accept the response"
                );
            }
            Err(e) => {
                WorkerStats::bump(&self.stats.submit_failures);
                if e.is_auth() {
                    WorkerStats::bump(&self.stats.auth_failures);
                    error!(task_id = %envelope.task_id, "Server key rejected while submitting (401)");
                } else {
                    warn!(task_id = %envelope.task_id, error = %e, "Failed to submit response");
                }
            }
        }
    }
}
