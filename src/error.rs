use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StudioError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("api error ({status}): {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("artifact download failed ({status}): {body}")]
    Download {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("failed to parse json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("operation {operation} failed: {message}")]
    Operation {
        operation: String,
        kind: ErrorKind,
        code: Option<i64>,
        message: String,
    },
    #[error("operation {operation} did not finish within {elapsed:?} ({attempts} status checks)")]
    Timeout {
        operation: String,
        elapsed: Duration,
        attempts: u32,
    },
    #[error("operation {operation} was cancelled")]
    Cancelled { operation: String },
    #[error("invalid config: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, StudioError>;

/// Failure taxonomy shared by the submitter, poller and resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    AuthError,
    QuotaExceeded,
    ModelUnavailable,
    NetworkError,
    UpstreamMalformed,
    Timeout,
    Cancelled,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::AuthError => "auth_error",
            Self::QuotaExceeded => "quota_exceeded",
            Self::ModelUnavailable => "model_unavailable",
            Self::NetworkError => "network_error",
            Self::UpstreamMalformed => "upstream_malformed",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        }
    }

    pub fn user_message(self) -> &'static str {
        match self {
            Self::InvalidInput => {
                "Invalid argument. There might be an issue with the prompt or uploaded file. Please review your input."
            }
            Self::AuthError => "The provided API key is not valid. Please check your key.",
            Self::QuotaExceeded => {
                "API quota exceeded. Please check your account status and billing in Google AI Studio."
            }
            Self::ModelUnavailable => {
                "The requested model was not found. Your API key might not have access to this model."
            }
            Self::NetworkError => {
                "Could not reach the generation service. Please check your network connection."
            }
            Self::UpstreamMalformed => {
                "The generation finished but the service did not return a usable result."
            }
            Self::Timeout => "The generation took too long and was abandoned.",
            Self::Cancelled => "The generation was cancelled.",
            Self::Unknown => "An unexpected error occurred.",
        }
    }

    /// Maps a `google.rpc.Code` to a taxonomy entry.
    pub fn from_rpc_code(code: i64) -> Self {
        match code {
            3 | 9 | 11 => Self::InvalidInput,
            4 => Self::Timeout,
            1 => Self::Cancelled,
            5 => Self::ModelUnavailable,
            7 | 16 => Self::AuthError,
            8 => Self::QuotaExceeded,
            14 => Self::NetworkError,
            _ => Self::Unknown,
        }
    }

    fn from_rpc_status(status: &str) -> Option<Self> {
        let kind = match status {
            "INVALID_ARGUMENT" | "FAILED_PRECONDITION" | "OUT_OF_RANGE" => Self::InvalidInput,
            "UNAUTHENTICATED" => Self::AuthError,
            "PERMISSION_DENIED" => Self::AuthError,
            "RESOURCE_EXHAUSTED" => Self::QuotaExceeded,
            "NOT_FOUND" => Self::ModelUnavailable,
            "UNAVAILABLE" => Self::NetworkError,
            "DEADLINE_EXCEEDED" => Self::Timeout,
            "CANCELLED" => Self::Cancelled,
            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl StudioError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) | Self::Config(_) => ErrorKind::InvalidInput,
            Self::Api { status, body } => classify_api_error(*status, body),
            Self::Download { status, .. } => classify_download_status(*status),
            Self::Http(err) => {
                if err.is_decode() {
                    ErrorKind::UpstreamMalformed
                } else {
                    ErrorKind::NetworkError
                }
            }
            Self::Io(_) => ErrorKind::Unknown,
            Self::InvalidResponse(_) | Self::Json(_) => ErrorKind::UpstreamMalformed,
            Self::Operation { kind, .. } => *kind,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// Human-readable message for the failure; unknown failures keep the raw diagnostic.
    pub fn user_message(&self) -> String {
        let kind = self.kind();
        match kind {
            ErrorKind::Unknown => format!("{} ({self})", kind.user_message()),
            _ => kind.user_message().to_string(),
        }
    }
}

/// Classifies a non-success HTTP response from the Generative Language API.
pub fn classify_api_error(status: reqwest::StatusCode, body: &str) -> ErrorKind {
    let (rpc_status, message) = parse_google_error_body(body);
    let message = message.as_deref().unwrap_or(body);
    let rpc_status = if status == reqwest::StatusCode::FORBIDDEN {
        Some("PERMISSION_DENIED")
    } else {
        rpc_status.as_deref()
    };

    if let Some(kind) = classify_message(rpc_status, message) {
        return kind;
    }
    if let Some(kind) = rpc_status.and_then(ErrorKind::from_rpc_status) {
        return kind;
    }

    match status.as_u16() {
        400 | 422 => ErrorKind::InvalidInput,
        401 => ErrorKind::AuthError,
        404 => ErrorKind::ModelUnavailable,
        408 | 504 => ErrorKind::Timeout,
        429 => ErrorKind::QuotaExceeded,
        502 | 503 => ErrorKind::NetworkError,
        _ => ErrorKind::Unknown,
    }
}

/// Classifies the `error` status of a finished long-running operation.
///
/// The message is read with the same rules as an HTTP error body, so a
/// failure lands on the same kind wherever it surfaces. The numeric code
/// only decides when the message says nothing recognisable.
pub(crate) fn classify_operation_error(
    code: Option<i64>,
    rpc_status: Option<&str>,
    message: &str,
) -> ErrorKind {
    let rpc_status = rpc_status.or_else(|| code.and_then(rpc_status_name));
    classify_message(rpc_status, message)
        .or_else(|| code.map(ErrorKind::from_rpc_code))
        .or_else(|| rpc_status.and_then(ErrorKind::from_rpc_status))
        .unwrap_or(ErrorKind::Unknown)
}

fn classify_message(rpc_status: Option<&str>, message: &str) -> Option<ErrorKind> {
    let lowered = message.to_ascii_lowercase();

    if lowered.contains("api key not valid") || lowered.contains("api_key_invalid") {
        return Some(ErrorKind::AuthError);
    }
    if lowered.contains("quota") || rpc_status == Some("RESOURCE_EXHAUSTED") {
        return Some(ErrorKind::QuotaExceeded);
    }
    if lowered.contains("model was not found") || lowered.contains("is not found for api version")
    {
        return Some(ErrorKind::ModelUnavailable);
    }
    if rpc_status == Some("PERMISSION_DENIED") {
        if lowered.contains("model") {
            return Some(ErrorKind::ModelUnavailable);
        }
        return Some(ErrorKind::AuthError);
    }
    None
}

fn rpc_status_name(code: i64) -> Option<&'static str> {
    let name = match code {
        1 => "CANCELLED",
        3 => "INVALID_ARGUMENT",
        4 => "DEADLINE_EXCEEDED",
        5 => "NOT_FOUND",
        7 => "PERMISSION_DENIED",
        8 => "RESOURCE_EXHAUSTED",
        14 => "UNAVAILABLE",
        16 => "UNAUTHENTICATED",
        _ => return None,
    };
    Some(name)
}

// A file that is gone is a bad result, not a missing model.
fn classify_download_status(status: reqwest::StatusCode) -> ErrorKind {
    match status.as_u16() {
        401 => ErrorKind::AuthError,
        403 | 404 | 410 => ErrorKind::UpstreamMalformed,
        408 | 504 => ErrorKind::Timeout,
        429 => ErrorKind::QuotaExceeded,
        502 | 503 => ErrorKind::NetworkError,
        _ => ErrorKind::Unknown,
    }
}

fn parse_google_error_body(body: &str) -> (Option<String>, Option<String>) {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return (None, None);
    };
    let error = value.get("error").unwrap_or(&value);
    let status = error
        .get("status")
        .and_then(Value::as_str)
        .map(str::to_string);
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string);
    (status, message)
}

/// Classified failure reported to job subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: ErrorKind,
    pub message: String,
    pub detail: String,
}

impl From<&StudioError> for JobFailure {
    fn from(err: &StudioError) -> Self {
        Self {
            kind: err.kind(),
            message: err.user_message(),
            detail: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn invalid_key_body_is_auth_error() {
        let body = r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(
            classify_api_error(StatusCode::BAD_REQUEST, body),
            ErrorKind::AuthError
        );
    }

    #[test]
    fn resource_exhausted_is_quota() {
        let body = r#"{"error":{"code":429,"message":"Resource has been exhausted","status":"RESOURCE_EXHAUSTED"}}"#;
        assert_eq!(
            classify_api_error(StatusCode::TOO_MANY_REQUESTS, body),
            ErrorKind::QuotaExceeded
        );
        assert_eq!(
            classify_api_error(StatusCode::TOO_MANY_REQUESTS, "slow down"),
            ErrorKind::QuotaExceeded
        );
    }

    #[test]
    fn permission_denied_splits_on_model_mention() {
        let model = r#"{"error":{"code":403,"message":"Permission denied on model veo-3.0","status":"PERMISSION_DENIED"}}"#;
        let key = r#"{"error":{"code":403,"message":"Method doesn't allow unregistered callers","status":"PERMISSION_DENIED"}}"#;
        assert_eq!(
            classify_api_error(StatusCode::FORBIDDEN, model),
            ErrorKind::ModelUnavailable
        );
        assert_eq!(
            classify_api_error(StatusCode::FORBIDDEN, key),
            ErrorKind::AuthError
        );
    }

    #[test]
    fn not_found_and_invalid_argument() {
        let missing = r#"{"error":{"code":404,"message":"models/veo-9 is not found for API version v1beta","status":"NOT_FOUND"}}"#;
        assert_eq!(
            classify_api_error(StatusCode::NOT_FOUND, missing),
            ErrorKind::ModelUnavailable
        );
        let invalid = r#"{"error":{"code":400,"message":"Invalid argument: aspectRatio","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(
            classify_api_error(StatusCode::BAD_REQUEST, invalid),
            ErrorKind::InvalidInput
        );
    }

    #[test]
    fn unclassified_status_is_unknown_with_detail() {
        let err = StudioError::Api {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: "boom".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Unknown);
        let message = err.user_message();
        assert!(message.starts_with(ErrorKind::Unknown.user_message()));
        assert!(message.contains("boom"));
    }

    #[test]
    fn known_kinds_use_fixed_message() {
        let err = StudioError::InvalidInput("prompt must be non-empty".to_string());
        assert_eq!(err.user_message(), ErrorKind::InvalidInput.user_message());

        let failure = JobFailure::from(&err);
        assert_eq!(failure.kind, ErrorKind::InvalidInput);
        assert!(failure.detail.contains("prompt must be non-empty"));
    }

    #[test]
    fn rpc_codes_map_to_kinds() {
        assert_eq!(ErrorKind::from_rpc_code(3), ErrorKind::InvalidInput);
        assert_eq!(ErrorKind::from_rpc_code(8), ErrorKind::QuotaExceeded);
        assert_eq!(ErrorKind::from_rpc_code(16), ErrorKind::AuthError);
        assert_eq!(ErrorKind::from_rpc_code(13), ErrorKind::Unknown);
    }

    #[test]
    fn operation_errors_read_the_message_first() {
        assert_eq!(
            classify_operation_error(Some(7), None, "Permission denied on model veo-3.0"),
            ErrorKind::ModelUnavailable
        );
        assert_eq!(
            classify_operation_error(Some(13), None, "Quota exceeded for aiplatform requests"),
            ErrorKind::QuotaExceeded
        );
        assert_eq!(
            classify_operation_error(Some(7), None, "Caller lacks access"),
            ErrorKind::AuthError
        );
        assert_eq!(
            classify_operation_error(Some(3), None, "Unsupported aspect ratio"),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            classify_operation_error(None, Some("UNAVAILABLE"), "backend busy"),
            ErrorKind::NetworkError
        );
        assert_eq!(classify_operation_error(None, None, ""), ErrorKind::Unknown);
    }

    #[test]
    fn operation_and_http_errors_agree() {
        let message = "Permission denied on model veo-3.0";
        let body = format!(r#"{{"error":{{"code":403,"message":"{message}"}}}}"#);
        assert_eq!(
            classify_operation_error(Some(7), None, message),
            classify_api_error(StatusCode::FORBIDDEN, &body)
        );
    }

    #[test]
    fn missing_download_is_malformed_result() {
        for status in [StatusCode::NOT_FOUND, StatusCode::FORBIDDEN, StatusCode::GONE] {
            let err = StudioError::Download {
                status,
                body: "file expired".to_string(),
            };
            assert_eq!(err.kind(), ErrorKind::UpstreamMalformed);
        }
        let busy = StudioError::Download {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: String::new(),
        };
        assert_eq!(busy.kind(), ErrorKind::NetworkError);
    }
}
