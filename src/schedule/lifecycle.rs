use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[repr(u8)]
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum WorkerState {
    Idle = 0,
    Polling = 1,
    Dispatching = 2,
    Submitting = 3,
    Sleeping = 4,
    Stopped = 5,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => WorkerState::Polling,
            2 => WorkerState::Dispatching,
            3 => WorkerState::Submitting,
            4 => WorkerState::Sleeping,
            5 => WorkerState::Stopped,
            _ => WorkerState::Idle,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ShutdownReason {
    /// `stop()` was called on the lifecycle.
    Stopped,
    /// The token, or the root it was derived from, was cancelled.
    Cancelled,
}

#[derive(Debug)]
struct Inner {
    token: CancellationToken,
    stop_requested: AtomicBool,
    state: AtomicU8,
}

/// Run/stop state shared between the loop and whoever controls it.
///
/// Cloning yields another handle onto the same lifecycle.
#[derive(Debug, Clone)]
pub struct WorkerLifecycle {
    inner: Arc<Inner>,
}

impl Default for WorkerLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerLifecycle {
    pub fn new() -> Self {
        Self::with_token(CancellationToken::new())
    }

    /// Lifecycle that also ends when `root` is cancelled.
    pub fn child_of(root: &CancellationToken) -> Self {
        Self::with_token(root.child_token())
    }

    fn with_token(token: CancellationToken) -> Self {
        Self {
            inner: Arc::new(Inner {
                token,
                stop_requested: AtomicBool::new(false),
                state: AtomicU8::new(WorkerState::Idle as u8),
            }),
        }
    }

    /// Ask the loop to finish. In-flight waits are interrupted.
    pub fn stop(&self) {
        self.inner.stop_requested.store(true, Ordering::SeqCst);
        self.inner.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.inner.token
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.inner.state.load(Ordering::SeqCst))
    }

    pub(crate) fn set_state(&self, state: WorkerState) {
        self.inner.state.store(state as u8, Ordering::SeqCst);
    }

    pub fn shutdown_reason(&self) -> ShutdownReason {
        if self.inner.stop_requested.load(Ordering::SeqCst) {
            ShutdownReason::Stopped
        } else {
            ShutdownReason::Cancelled
        }
    }

    /// Sleep for `duration`; returns false if cancelled first.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.inner.token.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    /// Drive `future` unless cancellation wins the race.
    pub async fn guard<F: Future>(&self, future: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.inner.token.cancelled() => None,
            output = future => Some(output),
        }
    }
}

/// Cancel `token` when `signal` resolves. A listener that fails to install
/// leaves the token untouched and returns `false`.
pub async fn cancel_on_signal<F>(signal: F, token: CancellationToken) -> bool
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => {
            info!("Interrupt received, shutting down");
            token.cancel();
            true
        }
        Err(e) => {
            error!("Failed to listen for Ctrl-C, worker keeps running: {}", e);
            false
        }
    }
}
