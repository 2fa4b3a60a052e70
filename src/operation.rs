//! Long-running operation handles returned by video generation.
//!
//! The service reports operations as loosely shaped JSON. [`Operation::from_wire`]
//! decodes that payload once, at the boundary, into a tagged state so the
//! poller never has to probe optional fields.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorKind, classify_operation_error};
use crate::{Result, StudioError};

/// Opaque identifier assigned by the service, e.g. `models/veo-2.0-generate-001/operations/abc`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationName(String);

impl OperationName {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(StudioError::InvalidResponse(
                "operation name must be non-empty".to_string(),
            ));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationFailure {
    pub kind: ErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum OperationState {
    Running,
    Succeeded { video_uri: String },
    Failed(OperationFailure),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub name: OperationName,
    #[serde(flatten)]
    pub state: OperationState,
}

#[derive(Debug, Deserialize)]
struct WireOperation {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    done: Option<bool>,
    #[serde(default)]
    response: Option<Value>,
    #[serde(default)]
    error: Option<WireStatus>,
}

#[derive(Debug, Deserialize)]
struct WireStatus {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

impl Operation {
    pub fn running(name: OperationName) -> Self {
        Self {
            name,
            state: OperationState::Running,
        }
    }

    pub fn succeeded(name: OperationName, video_uri: impl Into<String>) -> Self {
        Self {
            name,
            state: OperationState::Succeeded {
                video_uri: video_uri.into(),
            },
        }
    }

    pub fn failed(name: OperationName, failure: OperationFailure) -> Self {
        Self {
            name,
            state: OperationState::Failed(failure),
        }
    }

    pub fn is_done(&self) -> bool {
        !matches!(self.state, OperationState::Running)
    }

    pub fn video_uri(&self) -> Option<&str> {
        match &self.state {
            OperationState::Succeeded { video_uri } => Some(video_uri),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&OperationFailure> {
        match &self.state {
            OperationState::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    pub fn from_wire(value: Value) -> Result<Self> {
        let wire = serde_json::from_value::<WireOperation>(value)?;
        let name = OperationName::new(wire.name.unwrap_or_default())?;

        if let Some(error) = wire.error {
            let raw = error.message.unwrap_or_default();
            let kind = classify_operation_error(error.code, error.status.as_deref(), &raw);
            let message = if raw.trim().is_empty() {
                "operation failed without a message".to_string()
            } else {
                raw
            };
            return Ok(Self::failed(
                name,
                OperationFailure {
                    kind,
                    code: error.code,
                    message,
                },
            ));
        }

        if !wire.done.unwrap_or(false) {
            return Ok(Self::running(name));
        }

        match wire.response.as_ref().and_then(find_video_uri) {
            Some(uri) => Ok(Self::succeeded(name, uri)),
            None => Ok(Self::failed(
                name,
                OperationFailure {
                    kind: ErrorKind::UpstreamMalformed,
                    code: None,
                    message: "operation completed but no video uri was found".to_string(),
                },
            )),
        }
    }
}

fn find_video_uri(response: &Value) -> Option<String> {
    // REST shape first, then the flattened SDK shape.
    let samples = response
        .get("generateVideoResponse")
        .and_then(|r| r.get("generatedSamples"))
        .or_else(|| response.get("generatedVideos"))
        .and_then(Value::as_array)?;

    samples
        .iter()
        .filter_map(|sample| sample.get("video"))
        .filter_map(|video| video.get("uri"))
        .filter_map(Value::as_str)
        .find(|uri| !uri.trim().is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NAME: &str = "models/veo-2.0-generate-001/operations/op-1";

    #[test]
    fn not_done_is_running() -> crate::Result<()> {
        let op = Operation::from_wire(json!({ "name": NAME }))?;
        assert_eq!(op.state, OperationState::Running);
        assert!(!op.is_done());

        let op = Operation::from_wire(json!({ "name": NAME, "done": false }))?;
        assert_eq!(op.name.as_str(), NAME);
        assert_eq!(op.state, OperationState::Running);
        Ok(())
    }

    #[test]
    fn rest_response_shape_succeeds() -> crate::Result<()> {
        let op = Operation::from_wire(json!({
            "name": NAME,
            "done": true,
            "response": {
                "@type": "type.googleapis.com/google.ai.generativelanguage.v1beta.PredictLongRunningResponse",
                "generateVideoResponse": {
                    "generatedSamples": [{ "video": { "uri": "https://example.test/v1beta/files/abc:download?alt=media" } }]
                }
            }
        }))?;
        assert_eq!(
            op.video_uri(),
            Some("https://example.test/v1beta/files/abc:download?alt=media")
        );
        assert!(op.failure().is_none());
        Ok(())
    }

    #[test]
    fn sdk_response_shape_succeeds() -> crate::Result<()> {
        let op = Operation::from_wire(json!({
            "name": NAME,
            "done": true,
            "response": { "generatedVideos": [{ "video": { "uri": "https://example.test/v.mp4" } }] }
        }))?;
        assert_eq!(op.video_uri(), Some("https://example.test/v.mp4"));
        Ok(())
    }

    #[test]
    fn done_without_result_or_error_is_malformed_failure() -> crate::Result<()> {
        let op = Operation::from_wire(json!({ "name": NAME, "done": true }))?;
        let failure = op.failure().expect("synthesized failure");
        assert_eq!(failure.kind, ErrorKind::UpstreamMalformed);
        assert!(op.video_uri().is_none());

        let op = Operation::from_wire(json!({
            "name": NAME,
            "done": true,
            "response": { "generateVideoResponse": { "generatedSamples": [] } }
        }))?;
        assert_eq!(
            op.failure().map(|f| f.kind),
            Some(ErrorKind::UpstreamMalformed)
        );
        Ok(())
    }

    #[test]
    fn error_wins_over_result() -> crate::Result<()> {
        let op = Operation::from_wire(json!({
            "name": NAME,
            "done": true,
            "error": { "code": 8, "message": "quota" },
            "response": { "generatedVideos": [{ "video": { "uri": "https://example.test/v.mp4" } }] }
        }))?;
        assert!(op.video_uri().is_none());
        let failure = op.failure().expect("failure");
        assert_eq!(failure.kind, ErrorKind::QuotaExceeded);
        assert_eq!(failure.code, Some(8));
        Ok(())
    }

    #[test]
    fn operation_error_message_drives_kind() -> crate::Result<()> {
        let denied = Operation::from_wire(json!({
            "name": NAME,
            "done": true,
            "error": { "code": 7, "message": "Permission denied on model veo-3.0" }
        }))?;
        let failure = denied.failure().expect("failure");
        assert_eq!(failure.kind, ErrorKind::ModelUnavailable);
        assert_eq!(failure.code, Some(7));

        let internal = Operation::from_wire(json!({
            "name": NAME,
            "done": true,
            "error": { "code": 13, "message": "Quota exceeded for aiplatform requests" }
        }))?;
        let failure = internal.failure().expect("failure");
        assert_eq!(failure.kind, ErrorKind::QuotaExceeded);
        assert_eq!(failure.message, "Quota exceeded for aiplatform requests");
        Ok(())
    }

    #[test]
    fn missing_name_is_rejected() {
        let err = Operation::from_wire(json!({ "done": false })).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UpstreamMalformed);

        let err = Operation::from_wire(json!("not an object")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UpstreamMalformed);
    }
}
