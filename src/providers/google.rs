use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::backend::{GenerationBackend, Submission};
use crate::config::{DEFAULT_BASE_URL, ModelDefaults, StudioConfig};
use crate::operation::{Operation, OperationName};
use crate::types::{Artifact, GenerationRequest, MediaPayload, MediaTarget};
use crate::utils::http::{
    MAX_ARTIFACT_BYTES, build_http_client, send_checked_bytes, send_checked_json,
};
use crate::{ApiKey, Result, StudioError};

const API_KEY_HEADER: &str = "x-goog-api-key";
const IMAGE_MIME: &str = "image/jpeg";

/// Google Generative Language API: Imagen, Gemini image editing and Veo.
#[derive(Clone)]
pub struct GoogleGenAi {
    http: reqwest::Client,
    base_url: String,
    models: ModelDefaults,
}

impl std::fmt::Debug for GoogleGenAi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleGenAi")
            .field("base_url", &self.base_url)
            .field("models", &self.models)
            .finish()
    }
}

impl Default for GoogleGenAi {
    fn default() -> Self {
        Self::new()
    }
}

impl GoogleGenAi {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            models: ModelDefaults::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_models(mut self, models: ModelDefaults) -> Self {
        self.models = models;
        self
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn from_config(config: &StudioConfig) -> Result<Self> {
        config.validate()?;
        let http = build_http_client(config.http_timeout(), &config.headers)?;
        Ok(Self::new()
            .with_http_client(http)
            .with_base_url(config.base_url.clone())
            .with_models(config.models.clone()))
    }

    fn model_path(model: &str) -> String {
        let model = model.trim();
        if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{model}")
        }
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = Self::model_path(model);
        format!("{base}/{path}:{method}")
    }

    fn operation_url(&self, name: &OperationName) -> String {
        let base = self.base_url.trim_end_matches('/');
        format!("{base}/{}", name.as_str().trim_start_matches('/'))
    }

    fn post(&self, url: String, credential: &ApiKey) -> reqwest::RequestBuilder {
        self.http
            .post(url)
            .header(API_KEY_HEADER, credential.expose())
    }

    async fn generate_image(&self, credential: &ApiKey, request: &GenerationRequest) -> Result<Artifact> {
        let model = self.models.resolve(request);
        let url = self.model_url(model, "predict");
        let response = send_checked_json::<PredictResponse>(
            self.post(url, credential).json(&image_body(request)),
        )
        .await?;
        parse_predictions(response)
    }

    async fn edit_image(&self, credential: &ApiKey, request: &GenerationRequest) -> Result<Artifact> {
        let model = self.models.resolve(request);
        let url = self.model_url(model, "generateContent");
        let response = send_checked_json::<GenerateContentResponse>(
            self.post(url, credential).json(&edit_body(request)?),
        )
        .await?;
        parse_edit_response(response)
    }

    async fn start_video(&self, credential: &ApiKey, request: &GenerationRequest) -> Result<Operation> {
        let model = self.models.resolve(request);
        let url = self.model_url(model, "predictLongRunning");
        let value =
            send_checked_json::<Value>(self.post(url, credential).json(&video_body(request)))
                .await?;
        Operation::from_wire(value)
    }
}

#[async_trait]
impl GenerationBackend for GoogleGenAi {
    fn provider(&self) -> &str {
        "google"
    }

    fn model_for<'a>(&'a self, request: &'a GenerationRequest) -> &'a str {
        self.models.resolve(request)
    }

    async fn submit_generation(
        &self,
        credential: &ApiKey,
        request: &GenerationRequest,
    ) -> Result<Submission> {
        match request.target {
            MediaTarget::Image if request.is_edit() => self
                .edit_image(credential, request)
                .await
                .map(Submission::Completed),
            MediaTarget::Image => self
                .generate_image(credential, request)
                .await
                .map(Submission::Completed),
            MediaTarget::Video => self
                .start_video(credential, request)
                .await
                .map(Submission::Pending),
        }
    }

    async fn poll_operation(
        &self,
        credential: &ApiKey,
        name: &OperationName,
    ) -> Result<Operation> {
        let request = self
            .http
            .get(self.operation_url(name))
            .header(API_KEY_HEADER, credential.expose());
        let value = send_checked_json::<Value>(request).await?;
        Operation::from_wire(value)
    }

    async fn fetch_artifact(&self, credential: &ApiKey, uri: &str) -> Result<Artifact> {
        let request = self.http.get(uri).query(&[("key", credential.expose())]);
        let (data, content_type) = send_checked_bytes(request, MAX_ARTIFACT_BYTES)
            .await
            .map_err(download_error)?;
        Ok(Artifact::new(content_type.unwrap_or_default(), data))
    }

    async fn validate_key(&self, credential: &ApiKey) -> Result<()> {
        let url = self.model_url(&self.models.validation, "generateContent");
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": "ping" }] }],
            "generationConfig": {
                "maxOutputTokens": 1,
                "thinkingConfig": { "thinkingBudget": 0 }
            }
        });
        send_checked_json::<Value>(self.post(url, credential).json(&body)).await?;
        Ok(())
    }
}

// The download url carries the key, so transport errors drop it before surfacing.
fn download_error(err: StudioError) -> StudioError {
    match err {
        StudioError::Http(err) => StudioError::Http(err.without_url()),
        StudioError::Api { status, body } => StudioError::Download { status, body },
        other => other,
    }
}

fn inline_media(payload: &MediaPayload) -> Value {
    json!({ "bytesBase64Encoded": payload.to_base64(), "mimeType": payload.mime_type })
}

fn negative_prompt(request: &GenerationRequest) -> Option<&str> {
    request
        .negative_prompt
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn image_body(request: &GenerationRequest) -> Value {
    let mut parameters = Map::<String, Value>::new();
    parameters.insert("sampleCount".to_string(), Value::from(1));
    parameters.insert(
        "aspectRatio".to_string(),
        Value::String(request.aspect_ratio.as_str().to_string()),
    );
    parameters.insert(
        "outputOptions".to_string(),
        json!({ "mimeType": IMAGE_MIME }),
    );
    if let Some(negative) = negative_prompt(request) {
        parameters.insert(
            "negativePrompt".to_string(),
            Value::String(negative.to_string()),
        );
    }

    json!({
        "instances": [{ "prompt": request.prompt }],
        "parameters": parameters,
    })
}

fn edit_body(request: &GenerationRequest) -> Result<Value> {
    let image = request
        .seed_image
        .as_ref()
        .ok_or_else(|| StudioError::InvalidInput("image edits need a seed image".to_string()))?;
    Ok(json!({
        "contents": [{
            "role": "user",
            "parts": [
                { "inlineData": { "mimeType": image.mime_type, "data": image.to_base64() } },
                { "text": request.prompt }
            ]
        }],
        "generationConfig": { "responseModalities": ["IMAGE", "TEXT"] }
    }))
}

fn video_body(request: &GenerationRequest) -> Value {
    let mut instance = Map::<String, Value>::new();
    instance.insert("prompt".to_string(), Value::String(request.prompt.clone()));
    if let Some(image) = request.seed_image.as_ref() {
        instance.insert("image".to_string(), inline_media(image));
    }
    if let Some(video) = request.seed_video.as_ref() {
        instance.insert("video".to_string(), inline_media(video));
    }

    let mut parameters = Map::<String, Value>::new();
    parameters.insert("sampleCount".to_string(), Value::from(1));
    parameters.insert(
        "aspectRatio".to_string(),
        Value::String(request.aspect_ratio.as_str().to_string()),
    );
    if let Some(negative) = negative_prompt(request) {
        parameters.insert(
            "negativePrompt".to_string(),
            Value::String(negative.to_string()),
        );
    }
    if let Some(resolution) = request.resolution {
        parameters.insert(
            "resolution".to_string(),
            Value::String(resolution.as_str().to_string()),
        );
    }

    json!({ "instances": [instance], "parameters": parameters })
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    #[serde(default)]
    bytes_base64_encoded: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    rai_filtered_reason: Option<String>,
}

fn parse_predictions(response: PredictResponse) -> Result<Artifact> {
    let mut filtered = None;
    for prediction in response.predictions {
        if let Some(data) = prediction
            .bytes_base64_encoded
            .as_deref()
            .filter(|d| !d.trim().is_empty())
        {
            let mime = prediction
                .mime_type
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| IMAGE_MIME.to_string());
            return Artifact::from_base64(mime, data);
        }
        if prediction.rai_filtered_reason.is_some() {
            filtered = prediction.rai_filtered_reason;
        }
    }
    Err(StudioError::InvalidResponse(match filtered {
        Some(reason) => format!("image was filtered: {reason}"),
        None => "image generation returned no images".to_string(),
    }))
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Value>,
}

fn parse_edit_response(response: GenerateContentResponse) -> Result<Artifact> {
    let parts = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| content.parts)
        .unwrap_or_default();

    let mut text = String::new();
    let mut image = None;
    for part in &parts {
        if let Some(chunk) = part.get("text").and_then(Value::as_str) {
            text.push_str(chunk);
        } else if let Some(inline) = part.get("inlineData") {
            let data = inline.get("data").and_then(Value::as_str);
            let mime = inline
                .get("mimeType")
                .and_then(Value::as_str)
                .unwrap_or("image/png");
            if let Some(data) = data {
                image = Some(Artifact::from_base64(mime, data)?);
            }
        }
    }

    match image {
        Some(mut artifact) => {
            if !text.trim().is_empty() {
                artifact.text = Some(text);
            }
            Ok(artifact)
        }
        None if text.trim().is_empty() => Err(StudioError::InvalidResponse(
            "the model did not return an edited image".to_string(),
        )),
        None => Err(StudioError::InvalidResponse(format!(
            "the model did not return an edited image: {}",
            text.trim()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AspectRatio, Resolution};

    #[test]
    fn image_body_carries_ratio_and_negative_prompt() {
        let request = GenerationRequest::image("a lighthouse")
            .with_aspect_ratio(AspectRatio::Portrait)
            .with_negative_prompt("  fog ");
        let body = image_body(&request);
        assert_eq!(body["instances"][0]["prompt"], "a lighthouse");
        assert_eq!(body["parameters"]["aspectRatio"], "9:16");
        assert_eq!(body["parameters"]["sampleCount"], 1);
        assert_eq!(body["parameters"]["negativePrompt"], "fog");
        assert_eq!(body["parameters"]["outputOptions"]["mimeType"], "image/jpeg");
    }

    #[test]
    fn video_body_inlines_one_seed() {
        let request = GenerationRequest::video("waves")
            .with_seed_video(MediaPayload::new("video/mp4", vec![1u8, 2, 3]))
            .with_resolution(Resolution::FullHd);
        let body = video_body(&request);
        let instance = &body["instances"][0];
        assert_eq!(instance["video"]["mimeType"], "video/mp4");
        assert_eq!(instance["video"]["bytesBase64Encoded"], "AQID");
        assert!(instance.get("image").is_none());
        assert_eq!(body["parameters"]["aspectRatio"], "16:9");
        assert_eq!(body["parameters"]["resolution"], "1080p");
        assert!(body["parameters"].get("negativePrompt").is_none());
    }

    #[test]
    fn edit_body_puts_image_before_text() -> crate::Result<()> {
        let request =
            GenerationRequest::edit("add a hat", MediaPayload::new("image/png", vec![9u8]));
        let body = edit_body(&request)?;
        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/png");
        assert_eq!(parts[1]["text"], "add a hat");
        assert_eq!(
            body["generationConfig"]["responseModalities"],
            json!(["IMAGE", "TEXT"])
        );
        Ok(())
    }

    #[test]
    fn filtered_prediction_is_reported() {
        let response = serde_json::from_value::<PredictResponse>(json!({
            "predictions": [{ "raiFilteredReason": "unsafe content" }]
        }))
        .expect("parse");
        let err = parse_predictions(response).unwrap_err();
        assert!(err.to_string().contains("unsafe content"));
        assert_eq!(err.kind(), crate::ErrorKind::UpstreamMalformed);
    }

    #[test]
    fn edit_response_collects_text_and_image() -> crate::Result<()> {
        let response = serde_json::from_value::<GenerateContentResponse>(json!({
            "candidates": [{ "content": { "parts": [
                { "text": "Here you go" },
                { "inlineData": { "mimeType": "image/png", "data": "iVBORw==" } }
            ] } }]
        }))?;
        let artifact = parse_edit_response(response)?;
        assert_eq!(artifact.mime_type, "image/png");
        assert_eq!(artifact.text.as_deref(), Some("Here you go"));
        Ok(())
    }

    #[test]
    fn edit_response_without_image_fails() {
        let response = serde_json::from_value::<GenerateContentResponse>(json!({
            "candidates": [{ "content": { "parts": [{ "text": "I can't do that" }] } }]
        }))
        .expect("parse");
        let err = parse_edit_response(response).unwrap_err();
        assert!(err.to_string().contains("I can't do that"));
    }

    #[test]
    fn operation_url_joins_base() -> crate::Result<()> {
        let client = GoogleGenAi::new().with_base_url("http://localhost:1/v1beta/");
        let name = OperationName::new("models/veo-2.0-generate-001/operations/abc")?;
        assert_eq!(
            client.operation_url(&name),
            "http://localhost:1/v1beta/models/veo-2.0-generate-001/operations/abc"
        );
        assert_eq!(
            client.model_url("models/imagen-4.0-generate-001", "predict"),
            "http://localhost:1/v1beta/models/imagen-4.0-generate-001:predict"
        );
        Ok(())
    }
}
