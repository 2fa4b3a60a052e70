use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::backend::{GenerationBackend, Submission};
use crate::error::{ErrorKind, JobFailure};
use crate::operation::Operation;
use crate::poller::{PollPolicy, Poller};
use crate::resolver::ArtifactResolver;
use crate::submit::JobSubmitter;
use crate::types::{Artifact, GenerationRequest, MediaTarget};
use crate::{ApiKey, Result, StudioError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    Submitted { operation: Operation },
    Polling { attempt: u32, operation: Operation },
    Succeeded { artifact: Artifact },
    Failed { failure: JobFailure },
}

impl JobEvent {
    pub fn status(&self) -> JobStatus {
        match self {
            Self::Submitted { .. } | Self::Polling { .. } => JobStatus::Running,
            Self::Succeeded { .. } => JobStatus::Succeeded,
            Self::Failed { .. } => JobStatus::Failed,
        }
    }

    pub fn artifact(&self) -> Option<&Artifact> {
        match self {
            Self::Succeeded { artifact } => Some(artifact),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&JobFailure> {
        match self {
            Self::Failed { failure } => Some(failure),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status() != JobStatus::Running
    }
}

/// Events of one running job. Dropping the stream cancels the job before its
/// next status check.
pub struct JobStream {
    rx: mpsc::UnboundedReceiver<JobEvent>,
    cancel: CancellationToken,
    _guard: DropGuard,
}

impl JobStream {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Stream for JobStream {
    type Item = JobEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValidation {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<ErrorKind>,
}

/// Submit, poll and resolve, composed for callers.
#[derive(Clone)]
pub struct Studio {
    backend: Arc<dyn GenerationBackend>,
    submitter: JobSubmitter,
    poller: Poller,
    resolver: ArtifactResolver,
}

impl Studio {
    pub fn new(backend: Arc<dyn GenerationBackend>, policy: PollPolicy) -> Self {
        Self {
            submitter: JobSubmitter::new(backend.clone()),
            poller: Poller::new(backend.clone(), policy),
            resolver: ArtifactResolver::new(backend.clone()),
            backend,
        }
    }

    pub fn backend(&self) -> &Arc<dyn GenerationBackend> {
        &self.backend
    }

    pub fn submitter(&self) -> &JobSubmitter {
        &self.submitter
    }

    pub fn poller(&self) -> &Poller {
        &self.poller
    }

    pub async fn generate_image(
        &self,
        credential: &ApiKey,
        request: &GenerationRequest,
    ) -> Result<Artifact> {
        if request.target != MediaTarget::Image || request.is_edit() {
            return Err(StudioError::InvalidInput(
                "generate_image expects an image request without a seed image".to_string(),
            ));
        }
        self.submit_sync(credential, request).await
    }

    pub async fn edit_image(
        &self,
        credential: &ApiKey,
        request: &GenerationRequest,
    ) -> Result<Artifact> {
        if !request.is_edit() {
            return Err(StudioError::InvalidInput(
                "image edits need a seed image".to_string(),
            ));
        }
        self.submit_sync(credential, request).await
    }

    async fn submit_sync(&self, credential: &ApiKey, request: &GenerationRequest) -> Result<Artifact> {
        match self.submitter.submit(credential, request).await? {
            Submission::Completed(artifact) => Ok(artifact),
            Submission::Pending(operation) => Err(StudioError::InvalidResponse(format!(
                "image request returned long-running operation {}",
                operation.name
            ))),
        }
    }

    /// Runs a video request to completion.
    pub async fn generate_video(
        &self,
        credential: &ApiKey,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<Artifact> {
        self.drive_video(credential, request, cancel, |_| {}).await
    }

    /// Continues `previous` with a new prompt, using the default video settings.
    pub async fn extend_video(
        &self,
        credential: &ApiKey,
        previous: &Artifact,
        prompt: impl Into<String>,
        cancel: &CancellationToken,
    ) -> Result<Artifact> {
        let request = GenerationRequest::extend(previous, prompt)?;
        self.generate_video(credential, &request, cancel).await
    }

    /// Starts `request` in the background and streams its progress.
    ///
    /// Image requests emit a single terminal event. Must be called within a
    /// tokio runtime.
    pub fn run_job(&self, credential: ApiKey, request: GenerationRequest) -> JobStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let studio = self.clone();
        let token = cancel.clone();

        tokio::spawn(async move {
            let result = match request.target {
                MediaTarget::Image => studio.submit_sync(&credential, &request).await,
                MediaTarget::Video => {
                    let events = tx.clone();
                    studio
                        .drive_video(&credential, &request, &token, move |event| {
                            let _ = events.send(event);
                        })
                        .await
                }
            };
            let last = match result {
                Ok(artifact) => JobEvent::Succeeded { artifact },
                Err(err) => JobEvent::Failed {
                    failure: JobFailure::from(&err),
                },
            };
            let _ = tx.send(last);
        });

        JobStream {
            rx,
            _guard: cancel.clone().drop_guard(),
            cancel,
        }
    }

    pub async fn validate_key(&self, credential: &ApiKey) -> Result<KeyValidation> {
        if credential.is_empty() {
            return Ok(KeyValidation {
                valid: false,
                reason: Some(ErrorKind::AuthError),
            });
        }
        match self.backend.validate_key(credential).await {
            Ok(()) => Ok(KeyValidation {
                valid: true,
                reason: None,
            }),
            Err(err) => match err.kind() {
                kind @ (ErrorKind::AuthError
                | ErrorKind::QuotaExceeded
                | ErrorKind::ModelUnavailable
                | ErrorKind::InvalidInput) => {
                    tracing::info!(kind = %kind, error = %err, "api key rejected");
                    Ok(KeyValidation {
                        valid: false,
                        reason: Some(kind),
                    })
                }
                _ => Err(err),
            },
        }
    }

    async fn drive_video<F>(
        &self,
        credential: &ApiKey,
        request: &GenerationRequest,
        cancel: &CancellationToken,
        mut emit: F,
    ) -> Result<Artifact>
    where
        F: FnMut(JobEvent) + Send,
    {
        if request.target != MediaTarget::Video {
            return Err(StudioError::InvalidInput(
                "video workflow expects a video request".to_string(),
            ));
        }
        let operation = match self.submitter.submit(credential, request).await? {
            Submission::Pending(operation) => operation,
            Submission::Completed(artifact) => return Ok(artifact),
        };
        let name = operation.name.clone();
        emit(JobEvent::Submitted {
            operation: operation.clone(),
        });

        let uri = self
            .poller
            .wait_with(credential, operation, cancel, |attempt, operation| {
                emit(JobEvent::Polling {
                    attempt,
                    operation: operation.clone(),
                })
            })
            .await?;

        if cancel.is_cancelled() {
            return Err(StudioError::Cancelled {
                operation: name.to_string(),
            });
        }
        self.resolver.resolve(credential, &uri).await
    }
}
