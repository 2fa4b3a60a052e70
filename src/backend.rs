use async_trait::async_trait;

use crate::operation::{Operation, OperationName};
use crate::types::{Artifact, GenerationRequest};
use crate::{ApiKey, Result};

/// Outcome of a single submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// Synchronous generation (images) finished in the submit call.
    Completed(Artifact),
    /// Long-running generation (videos); resolve it with the poller.
    Pending(Operation),
}

impl Submission {
    pub fn into_operation(self) -> Option<Operation> {
        match self {
            Self::Pending(operation) => Some(operation),
            Self::Completed(_) => None,
        }
    }

    pub fn into_artifact(self) -> Option<Artifact> {
        match self {
            Self::Completed(artifact) => Some(artifact),
            Self::Pending(_) => None,
        }
    }
}

/// The generation service. Every call takes the credential explicitly.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    fn provider(&self) -> &str;

    /// Resolved model id for `request`.
    fn model_for<'a>(&'a self, request: &'a GenerationRequest) -> &'a str;

    async fn submit_generation(
        &self,
        credential: &ApiKey,
        request: &GenerationRequest,
    ) -> Result<Submission>;

    async fn poll_operation(&self, credential: &ApiKey, name: &OperationName)
    -> Result<Operation>;

    async fn fetch_artifact(&self, credential: &ApiKey, uri: &str) -> Result<Artifact>;

    /// Makes the cheapest authenticated call available; `Ok` means the key works.
    async fn validate_key(&self, credential: &ApiKey) -> Result<()>;
}
