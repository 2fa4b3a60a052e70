//! Operation resolution: `Submitted -> Polling -> {Succeeded, Failed}`.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::backend::GenerationBackend;
use crate::error::ErrorKind;
use crate::operation::{Operation, OperationState};
use crate::{ApiKey, Result, StudioError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// Give up once this much time has passed since polling started.
    pub max_wait: Option<Duration>,
    pub max_attempts: Option<u32>,
    /// Consecutive network failures tolerated on status checks.
    pub max_transient_errors: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_wait: Some(Duration::from_secs(600)),
            max_attempts: None,
            max_transient_errors: 2,
        }
    }
}

#[derive(Clone)]
pub struct Poller {
    backend: Arc<dyn GenerationBackend>,
    policy: PollPolicy,
}

impl Poller {
    pub fn new(backend: Arc<dyn GenerationBackend>, policy: PollPolicy) -> Self {
        Self { backend, policy }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Polls `operation` until it finishes and returns the video uri.
    pub async fn wait(
        &self,
        credential: &ApiKey,
        operation: Operation,
        cancel: &CancellationToken,
    ) -> Result<String> {
        self.wait_with(credential, operation, cancel, |_, _| {}).await
    }

    /// Like [`Poller::wait`], reporting every status check result to `on_poll`
    /// along with its 1-based attempt number.
    pub async fn wait_with<F>(
        &self,
        credential: &ApiKey,
        mut operation: Operation,
        cancel: &CancellationToken,
        mut on_poll: F,
    ) -> Result<String>
    where
        F: FnMut(u32, &Operation) + Send,
    {
        let started = Instant::now();
        let name = operation.name.clone();
        let mut attempts = 0u32;
        let mut transient_errors = 0u32;

        loop {
            match operation.state {
                OperationState::Running => {}
                OperationState::Succeeded { video_uri } => {
                    tracing::info!(operation = %name, attempts, "operation succeeded");
                    return Ok(video_uri);
                }
                OperationState::Failed(failure) => {
                    tracing::warn!(
                        operation = %name,
                        kind = %failure.kind,
                        code = ?failure.code,
                        message = %failure.message,
                        "operation failed"
                    );
                    return Err(StudioError::Operation {
                        operation: name.to_string(),
                        kind: failure.kind,
                        code: failure.code,
                        message: failure.message,
                    });
                }
            }

            if cancel.is_cancelled() {
                return Err(cancelled(&name, attempts));
            }
            if self.out_of_budget(started, attempts) {
                tracing::warn!(operation = %name, attempts, "operation polling timed out");
                return Err(StudioError::Timeout {
                    operation: name.to_string(),
                    elapsed: started.elapsed(),
                    attempts,
                });
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(cancelled(&name, attempts)),
                _ = tokio::time::sleep(self.policy.interval) => {}
            }
            if cancel.is_cancelled() {
                return Err(cancelled(&name, attempts));
            }

            attempts += 1;
            tracing::debug!(operation = %name, attempt = attempts, "checking operation status");
            match self.backend.poll_operation(credential, &name).await {
                Ok(next) => {
                    if next.name != name {
                        return Err(StudioError::InvalidResponse(format!(
                            "status check for {name} returned operation {}",
                            next.name
                        )));
                    }
                    transient_errors = 0;
                    on_poll(attempts, &next);
                    operation = next;
                }
                Err(err)
                    if err.kind() == ErrorKind::NetworkError
                        && transient_errors < self.policy.max_transient_errors =>
                {
                    transient_errors += 1;
                    tracing::warn!(
                        operation = %name,
                        attempt = attempts,
                        transient_errors,
                        error = %err,
                        "status check failed, will retry"
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn out_of_budget(&self, started: Instant, attempts: u32) -> bool {
        if let Some(max_attempts) = self.policy.max_attempts {
            if attempts >= max_attempts {
                return true;
            }
        }
        match self.policy.max_wait {
            Some(max_wait) => started.elapsed() + self.policy.interval > max_wait,
            None => false,
        }
    }
}

fn cancelled(name: &crate::operation::OperationName, attempts: u32) -> StudioError {
    tracing::info!(operation = %name, attempts, "operation polling cancelled");
    StudioError::Cancelled {
        operation: name.to_string(),
    }
}
