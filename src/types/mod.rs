use std::fmt;
use std::str::FromStr;

use base64::Engine as _;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{Result, StudioError};

pub mod models;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaTarget {
    Image,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "9:16")]
    Portrait,
    #[serde(rename = "4:3")]
    Standard,
    #[serde(rename = "3:4")]
    StandardPortrait,
}

impl AspectRatio {
    pub const IMAGE: &'static [AspectRatio] = &[
        Self::Square,
        Self::Landscape,
        Self::Portrait,
        Self::Standard,
        Self::StandardPortrait,
    ];
    pub const VIDEO: &'static [AspectRatio] = &[Self::Landscape, Self::Portrait, Self::Square];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Square => "1:1",
            Self::Landscape => "16:9",
            Self::Portrait => "9:16",
            Self::Standard => "4:3",
            Self::StandardPortrait => "3:4",
        }
    }

    pub fn supports(self, target: MediaTarget) -> bool {
        match target {
            MediaTarget::Image => Self::IMAGE.contains(&self),
            MediaTarget::Video => Self::VIDEO.contains(&self),
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = StudioError;

    fn from_str(s: &str) -> Result<Self> {
        Self::IMAGE
            .iter()
            .copied()
            .find(|ratio| ratio.as_str() == s.trim())
            .ok_or_else(|| StudioError::InvalidInput(format!("unsupported aspect ratio {s:?}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "720p")]
    Hd,
    #[serde(rename = "1080p")]
    FullHd,
}

impl Resolution {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hd => "720p",
            Self::FullHd => "1080p",
        }
    }
}

impl FromStr for Resolution {
    type Err = StudioError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "720p" => Ok(Self::Hd),
            "1080p" => Ok(Self::FullHd),
            other => Err(StudioError::InvalidInput(format!(
                "unsupported resolution {other:?}"
            ))),
        }
    }
}

/// Binary payload plus MIME type, used for seeds.
#[derive(Clone, PartialEq, Eq)]
pub struct MediaPayload {
    pub mime_type: String,
    pub data: Bytes,
}

impl fmt::Debug for MediaPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaPayload")
            .field("mime_type", &self.mime_type)
            .field("len", &self.data.len())
            .finish()
    }
}

impl MediaPayload {
    pub fn new(mime_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }

    pub(crate) fn validate(&self, what: &str, family: &str) -> Result<()> {
        let mime = self.mime_type.trim();
        if mime.is_empty() {
            return Err(StudioError::InvalidInput(format!(
                "{what} is missing a mime type"
            )));
        }
        if !mime.starts_with(family) {
            return Err(StudioError::InvalidInput(format!(
                "{what} must be {family}*, got {mime}"
            )));
        }
        if self.data.is_empty() {
            return Err(StudioError::InvalidInput(format!("{what} is empty")));
        }
        Ok(())
    }
}

/// One user submission. Built fresh per request and not mutated once sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub target: MediaTarget,
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub model: Option<String>,
    pub aspect_ratio: AspectRatio,
    pub resolution: Option<Resolution>,
    pub seed_image: Option<MediaPayload>,
    pub seed_video: Option<MediaPayload>,
}

impl GenerationRequest {
    pub fn image(prompt: impl Into<String>) -> Self {
        Self::new(MediaTarget::Image, prompt)
    }

    pub fn edit(prompt: impl Into<String>, image: MediaPayload) -> Self {
        Self::image(prompt).with_seed_image(image)
    }

    pub fn video(prompt: impl Into<String>) -> Self {
        let mut out = Self::new(MediaTarget::Video, prompt);
        out.aspect_ratio = AspectRatio::Landscape;
        out
    }

    /// Video request continuing `previous`.
    pub fn extend(previous: &Artifact, prompt: impl Into<String>) -> Result<Self> {
        Self::video(prompt).into_extension(previous)
    }

    /// Reuses this request's settings to continue `previous`. The image seed is
    /// dropped since a request carries at most one seed.
    pub fn into_extension(mut self, previous: &Artifact) -> Result<Self> {
        if !previous.is_video() {
            return Err(StudioError::InvalidInput(format!(
                "only video artifacts can be extended, got {}",
                previous.mime_type
            )));
        }
        self.target = MediaTarget::Video;
        self.seed_image = None;
        self.seed_video = Some(MediaPayload {
            mime_type: previous.mime_type.clone(),
            data: previous.data.clone(),
        });
        Ok(self)
    }

    fn new(target: MediaTarget, prompt: impl Into<String>) -> Self {
        Self {
            target,
            prompt: prompt.into(),
            negative_prompt: None,
            model: None,
            aspect_ratio: AspectRatio::default(),
            resolution: None,
            seed_image: None,
            seed_video: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_negative_prompt(mut self, negative_prompt: impl Into<String>) -> Self {
        self.negative_prompt = Some(negative_prompt.into());
        self
    }

    pub fn with_aspect_ratio(mut self, aspect_ratio: AspectRatio) -> Self {
        self.aspect_ratio = aspect_ratio;
        self
    }

    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = Some(resolution);
        self
    }

    pub fn with_seed_image(mut self, image: MediaPayload) -> Self {
        self.seed_image = Some(image);
        self
    }

    pub fn with_seed_video(mut self, video: MediaPayload) -> Self {
        self.seed_video = Some(video);
        self
    }

    pub fn is_edit(&self) -> bool {
        self.target == MediaTarget::Image && self.seed_image.is_some()
    }

    /// Checks everything that can be checked without the backend.
    pub fn validate(&self) -> Result<()> {
        if self.prompt.trim().is_empty() {
            return Err(StudioError::InvalidInput(
                "prompt must be non-empty".to_string(),
            ));
        }
        if let Some(model) = self.model.as_deref() {
            if model.trim().is_empty() {
                return Err(StudioError::InvalidInput(
                    "model must be non-empty when set".to_string(),
                ));
            }
        }
        if !self.aspect_ratio.supports(self.target) {
            return Err(StudioError::InvalidInput(format!(
                "aspect ratio {} is not supported for {:?} generation",
                self.aspect_ratio, self.target
            )));
        }
        if self.seed_image.is_some() && self.seed_video.is_some() {
            return Err(StudioError::InvalidInput(
                "seed image and seed video are mutually exclusive".to_string(),
            ));
        }
        if let Some(image) = self.seed_image.as_ref() {
            image.validate("seed image", "image/")?;
        }
        if let Some(video) = self.seed_video.as_ref() {
            if self.target != MediaTarget::Video {
                return Err(StudioError::InvalidInput(
                    "seed video is only valid for video generation".to_string(),
                ));
            }
            video.validate("seed video", "video/")?;
        }
        if self.resolution.is_some() && self.target != MediaTarget::Video {
            return Err(StudioError::InvalidInput(
                "resolution is only valid for video generation".to_string(),
            ));
        }
        Ok(())
    }
}

/// Produced image or video, held in memory.
#[derive(Clone, PartialEq, Eq)]
pub struct Artifact {
    pub mime_type: String,
    pub data: Bytes,
    /// Text the model returned next to the media, if any.
    pub text: Option<String>,
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Artifact")
            .field("mime_type", &self.mime_type)
            .field("len", &self.data.len())
            .field("text", &self.text)
            .finish()
    }
}

impl Artifact {
    pub fn new(mime_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
            text: None,
        }
    }

    pub fn from_base64(mime_type: impl Into<String>, encoded: &str) -> Result<Self> {
        let data = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|err| StudioError::InvalidResponse(format!("invalid base64 payload: {err}")))?;
        if data.is_empty() {
            return Err(StudioError::InvalidResponse(
                "media payload is empty".to_string(),
            ));
        }
        Ok(Self::new(mime_type, data))
    }

    pub fn is_video(&self) -> bool {
        self.mime_type.starts_with("video/")
    }

    pub fn to_data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime_type,
            base64::engine::general_purpose::STANDARD.encode(&self.data)
        )
    }

    /// File extension matching the MIME type, for saving to disk.
    pub fn file_extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/jpeg" | "image/jpg" => "jpg",
            "image/png" => "png",
            "image/webp" => "webp",
            "video/mp4" => "mp4",
            "video/webm" => "webm",
            "video/quicktime" => "mov",
            other if other.starts_with("video/") => "mp4",
            _ => "bin",
        }
    }
}
