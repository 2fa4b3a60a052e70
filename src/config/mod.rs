use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::poller::PollPolicy;
use crate::types::models::{
    DEFAULT_EDIT_MODEL, DEFAULT_IMAGE_MODEL, DEFAULT_VALIDATION_MODEL, DEFAULT_VIDEO_MODEL,
};
use crate::types::GenerationRequest;
use crate::{Result, StudioError};

mod env;

pub use env::{Env, parse_dotenv};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_image_model() -> String {
    DEFAULT_IMAGE_MODEL.to_string()
}

fn default_edit_model() -> String {
    DEFAULT_EDIT_MODEL.to_string()
}

fn default_video_model() -> String {
    DEFAULT_VIDEO_MODEL.to_string()
}

fn default_validation_model() -> String {
    DEFAULT_VALIDATION_MODEL.to_string()
}

fn default_http_timeout_secs() -> u64 {
    300
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDefaults {
    #[serde(default = "default_image_model")]
    pub image: String,
    #[serde(default = "default_edit_model")]
    pub edit: String,
    #[serde(default = "default_video_model")]
    pub video: String,
    #[serde(default = "default_validation_model")]
    pub validation: String,
}

impl Default for ModelDefaults {
    fn default() -> Self {
        Self {
            image: default_image_model(),
            edit: default_edit_model(),
            video: default_video_model(),
            validation: default_validation_model(),
        }
    }
}

impl ModelDefaults {
    /// Model for `request`: its own when set, otherwise the default for its kind.
    pub fn resolve<'a>(&'a self, request: &'a GenerationRequest) -> &'a str {
        if let Some(model) = request.model.as_deref().filter(|m| !m.trim().is_empty()) {
            return model;
        }
        match request.target {
            crate::types::MediaTarget::Video => &self.video,
            crate::types::MediaTarget::Image if request.is_edit() => &self.edit,
            crate::types::MediaTarget::Image => &self.image,
        }
    }
}

fn default_interval_secs() -> u64 {
    10
}

fn default_max_wait_secs() -> Option<u64> {
    Some(600)
}

fn default_max_transient_errors() -> u32 {
    2
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSettings {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// `0` (or `None`) polls until the operation finishes.
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default = "default_max_transient_errors")]
    pub max_transient_errors: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            max_wait_secs: default_max_wait_secs(),
            max_attempts: None,
            max_transient_errors: default_max_transient_errors(),
        }
    }
}

impl PollSettings {
    pub fn policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(self.interval_secs),
            max_wait: self
                .max_wait_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            max_attempts: self.max_attempts,
            max_transient_errors: self.max_transient_errors,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudioConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub models: ModelDefaults,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    /// Extra headers sent with every request.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub poll: PollSettings,
    /// Environment keys searched for the api key; empty means the built-in list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub api_key_env: Vec<String>,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            models: ModelDefaults::default(),
            http_timeout_secs: default_http_timeout_secs(),
            headers: BTreeMap::new(),
            poll: PollSettings::default(),
            api_key_env: Vec::new(),
        }
    }
}

impl StudioConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config = toml::from_str::<Self>(raw)
            .map_err(|err| StudioError::Config(format!("failed to parse config: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|err| {
            StudioError::Config(format!("failed to read {}: {err}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn api_key(&self, env: &Env) -> Result<crate::ApiKey> {
        let keys = self
            .api_key_env
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>();
        crate::ApiKey::from_env(env, &keys)
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(StudioError::Config("base_url must be non-empty".to_string()));
        }
        if self.poll.interval_secs == 0 {
            return Err(StudioError::Config(
                "poll.interval_secs must be at least 1".to_string(),
            ));
        }
        if self.http_timeout_secs == 0 {
            return Err(StudioError::Config(
                "http_timeout_secs must be at least 1".to_string(),
            ));
        }
        for (name, model) in [
            ("image", &self.models.image),
            ("edit", &self.models.edit),
            ("video", &self.models.video),
            ("validation", &self.models.validation),
        ] {
            if model.trim().is_empty() {
                return Err(StudioError::Config(format!(
                    "models.{name} must be non-empty"
                )));
            }
        }
        Ok(())
    }
}
