use super::*;
use crate::config::RuntimeConfig;
use crate::schedule::types::{EmbeddingResult, PromptResult};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Fetch,
    Submit(String),
}

/// In-memory workflow API that replays a fixed list of poll responses.
struct ScriptedTransport {
    script: Mutex<VecDeque<Result<ApiResponse<Task>, TransportError>>>,
    fetched_at: Mutex<Vec<Instant>>,
    events: Mutex<Vec<Event>>,
    submitted: Mutex<Vec<ResponseEnvelope>>,
    // replies handed out to submit calls; accepted once empty
    submit_replies: Mutex<VecDeque<Result<ApiResponse<Value>, TransportError>>>,
    // stop the worker once the script runs out
    stop_when_exhausted: Option<WorkerLifecycle>,
}

impl ScriptedTransport {
    fn new(
        script: Vec<Result<ApiResponse<Task>, TransportError>>,
        stop_when_exhausted: Option<WorkerLifecycle>,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fetched_at: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
            submitted: Mutex::new(Vec::new()),
            submit_replies: Mutex::new(VecDeque::new()),
            stop_when_exhausted,
        })
    }

    fn reply_to_submits(&self, replies: Vec<Result<ApiResponse<Value>, TransportError>>) {
        self.submit_replies.lock().unwrap().extend(replies);
    }

    fn gaps(&self) -> Vec<Duration> {
        let fetched = self.fetched_at.lock().unwrap();
        fetched.windows(2).map(|w| w[1] - w[0]).collect()
    }

    fn submitted(&self) -> Vec<ResponseEnvelope> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorkflowTransport for ScriptedTransport {
    async fn fetch_next(&self) -> Result<ApiResponse<Task>, TransportError> {
        self.fetched_at.lock().unwrap().push(Instant::now());
        self.events.lock().unwrap().push(Event::Fetch);

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(response) => response,
            None => {
                if let Some(lifecycle) = &self.stop_when_exhausted {
                    lifecycle.stop();
                }
                Ok(no_work())
            }
        }
    }

    async fn submit(&self, envelope: &ResponseEnvelope) -> Result<ApiResponse<Value>, TransportError> {
        self.events
            .lock()
            .unwrap()
            .push(Event::Submit(envelope.task_id.clone()));
        self.submitted.lock().unwrap().push(envelope.clone());
        let reply = self.submit_replies.lock().unwrap().pop_front();
        reply.unwrap_or(Ok(ApiResponse { success: true, message: None, data: None }))
    }
}

fn no_work() -> ApiResponse<Task> {
    ApiResponse { success: true, message: None, data: None }
}

fn work(task: Task) -> Result<ApiResponse<Task>, TransportError> {
    Ok(ApiResponse { success: true, message: None, data: Some(task) })
}

fn rejected() -> Result<ApiResponse<Task>, TransportError> {
    Ok(ApiResponse {
        success: false,
        message: Some("maintenance".to_string()),
        data: None,
    })
}

struct EchoProcessor;

#[async_trait]
impl TaskProcessor for EchoProcessor {
    fn action(&self) -> TaskAction {
        TaskAction::Prompt
    }

    async fn process(&self, _task: &Task) -> Result<TaskResult> {
        Ok(TaskResult::Prompt(PromptResult::text("hi")))
    }
}

struct FailingProcessor;

#[async_trait]
impl TaskProcessor for FailingProcessor {
    fn action(&self) -> TaskAction {
        TaskAction::Summarize
    }

    async fn process(&self, _task: &Task) -> Result<TaskResult> {
        anyhow::bail!("model unavailable")
    }
}

struct PanickingProcessor;

#[async_trait]
impl TaskProcessor for PanickingProcessor {
    fn action(&self) -> TaskAction {
        TaskAction::Describe
    }

    async fn process(&self, _task: &Task) -> Result<TaskResult> {
        panic!("decoder exploded")
    }
}

struct FixedEmbedding;

#[async_trait]
impl TaskProcessor for FixedEmbedding {
    fn action(&self) -> TaskAction {
        TaskAction::Embedding
    }

    async fn process(&self, _task: &Task) -> Result<TaskResult> {
        Ok(TaskResult::Embedding(EmbeddingResult {
            embedding: vec![0.1, 0.2, 0.3],
            model: "nomic-embed-text".to_string(),
            dimensions: 3,
            tokens: 4,
        }))
    }
}

struct SlowProcessor;

#[async_trait]
impl TaskProcessor for SlowProcessor {
    fn action(&self) -> TaskAction {
        TaskAction::Transcribe
    }

    async fn process(&self, _task: &Task) -> Result<TaskResult> {
        tokio::time::sleep(Duration::from_secs(600)).await;
        Ok(TaskResult::Prompt(PromptResult::text("late")))
    }
}

fn registry() -> ProcessorRegistry {
    let embedding: Arc<dyn TaskProcessor> = Arc::new(FixedEmbedding);
    ProcessorRegistry::new()
        .with(TaskAction::Prompt, Arc::new(EchoProcessor))
        .with(TaskAction::Summarize, Arc::new(FailingProcessor))
        .with(TaskAction::Describe, Arc::new(PanickingProcessor))
        .with(TaskAction::Transcribe, Arc::new(SlowProcessor))
        .with(TaskAction::Embedding, embedding.clone())
        .with(TaskAction::Knowledge, embedding)
}

/// Worker over a script that stops the loop when exhausted.
fn scripted_worker(
    script: Vec<Result<ApiResponse<Task>, TransportError>>,
) -> (WorkflowWorker, Arc<ScriptedTransport>) {
    let lifecycle = WorkerLifecycle::new();
    let transport = ScriptedTransport::new(script, Some(lifecycle.clone()));
    let worker = WorkflowWorker::new(
        transport.clone(),
        registry(),
        lifecycle,
        &RuntimeConfig::default(),
    );
    (worker, transport)
}

#[tokio::test(start_paused = true)]
async fn test_no_work_sleeps_polling_interval_and_errors_sleep_retry_delay() {
    let (worker, transport) = scripted_worker(vec![
        Ok(no_work()),
        Err(TransportError::Server(500)),
        Err(TransportError::Network("connection refused".to_string())),
        Err(TransportError::NotFound),
        rejected(),
        Ok(no_work()),
    ]);

    assert_eq!(worker.run().await, ShutdownReason::Stopped);

    let secs: Vec<u64> = transport.gaps().iter().map(|d| d.as_secs()).collect();
    assert_eq!(secs, vec![5, 10, 10, 10, 10, 5]);
    for gap in transport.gaps() {
        assert_eq!(gap.subsec_nanos(), 0);
    }

    let stats = worker.stats().snapshot();
    assert_eq!(stats.polls, 7);
    assert_eq!(stats.poll_errors, 4);
}

#[tokio::test(start_paused = true)]
async fn test_unauthorized_repolls_without_sleeping() {
    let (worker, transport) = scripted_worker(vec![
        Err(TransportError::Unauthorized),
        Err(TransportError::Unauthorized),
        Ok(no_work()),
    ]);

    worker.run().await;

    assert_eq!(
        transport.gaps(),
        vec![Duration::ZERO, Duration::ZERO, Duration::from_secs(5)]
    );
    assert_eq!(worker.stats().snapshot().auth_failures, 2);
    assert!(transport.submitted().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_prompt_task_end_to_end_envelope() {
    let (worker, transport) = scripted_worker(vec![work(Task::new("t1", "prompt", "hello"))]);

    worker.run().await;

    let submitted = transport.submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(
        serde_json::to_value(&submitted[0]).unwrap(),
        json!({"task_id": "t1", "type": "prompt", "success": true, "data": "hi", "metadata": {}})
    );
    // a processed task is followed by an immediate poll
    assert_eq!(transport.gaps(), vec![Duration::ZERO]);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_action_is_reported_and_loop_continues() {
    let (worker, transport) = scripted_worker(vec![
        work(Task::new("t2", "foo", "whatever")),
        Ok(no_work()),
    ]);

    assert_eq!(worker.run().await, ShutdownReason::Stopped);

    let submitted = transport.submitted();
    assert_eq!(submitted.len(), 1);
    let envelope = serde_json::to_value(&submitted[0]).unwrap();
    assert_eq!(envelope["task_id"], "t2");
    assert_eq!(envelope["type"], "foo");
    assert_eq!(envelope["success"], false);
    assert_eq!(envelope["data"], Value::Null);
    assert_eq!(envelope["error"]["code"], "UNKNOWN_ACTION");
    assert_eq!(transport.fetched_at.lock().unwrap().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_failing_and_panicking_capabilities_do_not_stop_the_loop() {
    let (worker, transport) = scripted_worker(vec![
        work(Task::new("t3", "describe", "x")),
        work(Task::new("t4", "summarize", "x")),
        work(Task::new("t5", "prompt", "x")),
    ]);

    assert_eq!(worker.run().await, ShutdownReason::Stopped);

    let submitted = transport.submitted();
    assert_eq!(submitted.len(), 3);

    let panicked = submitted[0].error.as_ref().unwrap();
    assert!(!submitted[0].success);
    assert_eq!(panicked.code, "PROCESSING_ERROR");
    assert_eq!(panicked.details["action"], "describe");

    let failed = submitted[1].error.as_ref().unwrap();
    assert_eq!(failed.code, "PROCESSING_ERROR");
    assert!(failed.message.contains("model unavailable"));

    assert!(submitted[2].success);
    assert_eq!(submitted[2].data, json!("hi"));

    let stats = worker.stats().snapshot();
    assert_eq!(stats.tasks_failed, 2);
    assert_eq!(stats.tasks_succeeded, 1);
}

#[tokio::test(start_paused = true)]
async fn test_embedding_metadata_is_merged_into_envelope() {
    let mut task = Task::new("t6", "knowledge", "some words");
    task.channel_id = Some("ch1".to_string());
    task.metadata.insert("origin".to_string(), json!("upload"));
    let (worker, transport) = scripted_worker(vec![work(task)]);

    worker.run().await;

    let envelope = &transport.submitted()[0];
    assert_eq!(envelope.action, "knowledge");
    assert_eq!(envelope.channel_id.as_deref(), Some("ch1"));
    assert_eq!(envelope.data, json!([0.1f32, 0.2f32, 0.3f32]));
    assert_eq!(envelope.metadata["origin"], "upload");
    assert_eq!(envelope.metadata["dimensions"], 3);
    assert_eq!(envelope.metadata["model"], "nomic-embed-text");
    assert_eq!(envelope.metadata["tokens"], 4);
}

#[tokio::test(start_paused = true)]
async fn test_each_submission_precedes_the_next_fetch() {
    let (worker, transport) = scripted_worker(vec![
        work(Task::new("a", "prompt", "1")),
        work(Task::new("b", "summarize", "2")),
    ]);

    worker.run().await;

    assert_eq!(
        *transport.events.lock().unwrap(),
        vec![
            Event::Fetch,
            Event::Submit("a".to_string()),
            Event::Fetch,
            Event::Submit("b".to_string()),
            Event::Fetch,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_stop_interrupts_sleep_promptly() {
    let lifecycle = WorkerLifecycle::new();
    let transport = ScriptedTransport::new(Vec::new(), None);
    let worker = Arc::new(WorkflowWorker::new(
        transport.clone(),
        registry(),
        lifecycle.clone(),
        &RuntimeConfig::default(),
    ));

    let start = Instant::now();
    let handle = tokio::spawn({
        let worker = worker.clone();
        async move { worker.run().await }
    });

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(lifecycle.state(), WorkerState::Sleeping);
    lifecycle.stop();

    assert_eq!(handle.await.unwrap(), ShutdownReason::Stopped);
    assert_eq!(start.elapsed(), Duration::from_secs(2));
    assert_eq!(lifecycle.state(), WorkerState::Stopped);
    assert_eq!(transport.fetched_at.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_root_cancellation_during_processing_skips_submission() {
    let root = CancellationToken::new();
    let lifecycle = WorkerLifecycle::child_of(&root);
    let transport = ScriptedTransport::new(vec![work(Task::new("t7", "transcribe", "x"))], None);
    let worker = Arc::new(WorkflowWorker::new(
        transport.clone(),
        registry(),
        lifecycle.clone(),
        &RuntimeConfig::default(),
    ));

    let handle = tokio::spawn({
        let worker = worker.clone();
        async move { worker.run().await }
    });

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(lifecycle.state(), WorkerState::Dispatching);
    root.cancel();

    assert_eq!(handle.await.unwrap(), ShutdownReason::Cancelled);
    assert!(transport.submitted().is_empty());
    assert_eq!(worker.stats().snapshot().tasks_succeeded, 0);
}

#[tokio::test(start_paused = true)]
async fn test_custom_intervals() {
    let lifecycle = WorkerLifecycle::new();
    let transport = ScriptedTransport::new(
        vec![Ok(no_work()), Err(TransportError::Timeout)],
        Some(lifecycle.clone()),
    );
    let worker = WorkflowWorker::new(transport.clone(), registry(), lifecycle, &RuntimeConfig::default())
        .with_intervals(Duration::from_millis(250), Duration::from_secs(3));

    worker.run().await;

    assert_eq!(
        transport.gaps(),
        vec![Duration::from_millis(250), Duration::from_secs(3)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_failed_submission_is_not_retried() {
    let (worker, transport) = scripted_worker(vec![
        work(Task::new("a", "prompt", "1")),
        work(Task::new("b", "prompt", "2")),
    ]);
    transport.reply_to_submits(vec![Err(TransportError::Server(500))]);

    assert_eq!(worker.run().await, ShutdownReason::Stopped);

    assert_eq!(
        *transport.events.lock().unwrap(),
        vec![
            Event::Fetch,
            Event::Submit("a".to_string()),
            Event::Fetch,
            Event::Submit("b".to_string()),
            Event::Fetch,
        ]
    );
    // no retry delay after the failed submission
    assert_eq!(transport.gaps(), vec![Duration::ZERO, Duration::ZERO]);

    let stats = worker.stats().snapshot();
    assert_eq!(stats.submit_failures, 1);
    assert_eq!(stats.auth_failures, 0);
    assert_eq!(stats.poll_errors, 0);
}

#[tokio::test(start_paused = true)]
async fn test_unaccepted_submission_is_not_retried() {
    let (worker, transport) = scripted_worker(vec![work(Task::new("a", "prompt", "1"))]);
    transport.reply_to_submits(vec![Ok(ApiResponse {
        success: false,
        message: Some("duplicate response".to_string()),
        data: None,
    })]);

    assert_eq!(worker.run().await, ShutdownReason::Stopped);

    assert_eq!(transport.submitted().len(), 1);
    assert_eq!(
        *transport.events.lock().unwrap(),
        vec![Event::Fetch, Event::Submit("a".to_string()), Event::Fetch]
    );
    assert_eq!(transport.gaps(), vec![Duration::ZERO]);

    let stats = worker.stats().snapshot();
    assert_eq!(stats.submit_failures, 0);
    assert_eq!(stats.poll_errors, 0);
}
