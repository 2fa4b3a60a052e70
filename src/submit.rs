use std::sync::Arc;

use crate::backend::{GenerationBackend, Submission};
use crate::types::{GenerationRequest, models};
use crate::{ApiKey, Result, StudioError};

/// Validates requests and hands each one to the backend exactly once.
#[derive(Clone)]
pub struct JobSubmitter {
    backend: Arc<dyn GenerationBackend>,
}

impl JobSubmitter {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self { backend }
    }

    pub async fn submit(&self, credential: &ApiKey, request: &GenerationRequest) -> Result<Submission> {
        credential.ensure_present()?;
        request.validate()?;

        let model = self.backend.model_for(request);
        check_model_capabilities(model, request)?;

        tracing::info!(
            provider = self.backend.provider(),
            model,
            target = ?request.target,
            edit = request.is_edit(),
            seed_video = request.seed_video.is_some(),
            "submitting generation"
        );

        // No retry: a failed submit goes straight back to the caller.
        let submission = self
            .backend
            .submit_generation(credential, request)
            .await
            .inspect_err(|err| {
                tracing::warn!(kind = %err.kind(), error = %err, "generation submit failed");
            })?;

        match &submission {
            Submission::Completed(artifact) => tracing::info!(
                mime_type = %artifact.mime_type,
                bytes = artifact.data.len(),
                "generation completed synchronously"
            ),
            Submission::Pending(operation) => tracing::info!(
                operation = %operation.name,
                done = operation.is_done(),
                "generation started"
            ),
        }
        Ok(submission)
    }
}

fn check_model_capabilities(model: &str, request: &GenerationRequest) -> Result<()> {
    // Unknown models pass through; the service has the final say.
    let Some(info) = models::find(model) else {
        return Ok(());
    };
    if info.target != request.target {
        return Err(StudioError::InvalidInput(format!(
            "model {} cannot produce {:?} output",
            info.id, request.target
        )));
    }
    if request.seed_video.is_some() && !info.accepts_seed_video {
        return Err(StudioError::InvalidInput(format!(
            "model {} does not support video extension",
            info.id
        )));
    }
    if request.seed_image.is_some() && !info.accepts_seed_image {
        return Err(StudioError::InvalidInput(format!(
            "model {} does not accept a seed image",
            info.id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MediaPayload;

    #[test]
    fn known_models_enforce_capabilities() {
        let seed = MediaPayload::new("video/mp4", vec![1u8]);
        let request = GenerationRequest::video("more").with_seed_video(seed);
        assert!(check_model_capabilities("veo-2.0-generate-001", &request).is_ok());
        assert!(check_model_capabilities("veo-3.0-generate-preview", &request).is_err());
        assert!(check_model_capabilities("veo-next", &request).is_ok());

        let image = GenerationRequest::image("a cat");
        assert!(check_model_capabilities("veo-2.0-generate-001", &image).is_err());
    }
}
