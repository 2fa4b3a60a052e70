use std::sync::Arc;

use crate::backend::GenerationBackend;
use crate::types::Artifact;
use crate::{ApiKey, Result, StudioError};

const DEFAULT_VIDEO_MIME: &str = "video/mp4";

/// Downloads a finished operation's artifact. A single attempt; failures end the job.
#[derive(Clone)]
pub struct ArtifactResolver {
    backend: Arc<dyn GenerationBackend>,
}

impl ArtifactResolver {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self { backend }
    }

    pub async fn resolve(&self, credential: &ApiKey, uri: &str) -> Result<Artifact> {
        if uri.trim().is_empty() {
            return Err(StudioError::InvalidResponse(
                "artifact uri is empty".to_string(),
            ));
        }

        tracing::debug!(uri = %redact_query(uri), "fetching artifact");
        let mut artifact = self
            .backend
            .fetch_artifact(credential, uri)
            .await
            .inspect_err(|err| {
                tracing::warn!(kind = %err.kind(), error = %err, "artifact fetch failed");
            })?;

        if artifact.data.is_empty() {
            return Err(StudioError::InvalidResponse(
                "artifact download returned an empty body".to_string(),
            ));
        }
        let mime = artifact.mime_type.trim();
        if mime.is_empty() || mime == "application/octet-stream" {
            artifact.mime_type = DEFAULT_VIDEO_MIME.to_string();
        }

        tracing::info!(
            mime_type = %artifact.mime_type,
            bytes = artifact.data.len(),
            "artifact fetched"
        );
        Ok(artifact)
    }
}

fn redact_query(uri: &str) -> &str {
    uri.split_once('?').map(|(base, _)| base).unwrap_or(uri)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_query_string() {
        assert_eq!(
            redact_query("https://host/files/a:download?alt=media&key=secret"),
            "https://host/files/a:download"
        );
        assert_eq!(redact_query("https://host/v.mp4"), "https://host/v.mp4");
    }
}
