//! Image and video generation against the Google Generative Language API.
//!
//! Images come back from a single call. Videos are long-running operations:
//! [`Studio`] submits them, polls on an interval and downloads the result,
//! reporting progress as a stream of [`JobEvent`]s.

mod error;
mod secrets;

pub mod backend;
pub mod config;
pub mod operation;
pub mod poller;
pub mod providers;
pub mod resolver;
pub mod studio;
pub mod submit;
pub mod types;
pub mod utils;

pub use backend::{GenerationBackend, Submission};
pub use config::{Env, ModelDefaults, PollSettings, StudioConfig, parse_dotenv};
pub use error::{ErrorKind, JobFailure, Result, StudioError, classify_api_error};
pub use operation::{Operation, OperationFailure, OperationName, OperationState};
pub use poller::{PollPolicy, Poller};
pub use resolver::ArtifactResolver;
pub use secrets::{ApiKey, DEFAULT_API_KEY_ENV};
pub use studio::{JobEvent, JobStatus, JobStream, KeyValidation, Studio};
pub use submit::JobSubmitter;
pub use types::{
    Artifact, AspectRatio, GenerationRequest, MediaPayload, MediaTarget, Resolution,
};

#[cfg(feature = "provider-google")]
pub use providers::GoogleGenAi;
