use std::collections::BTreeMap;
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;

use crate::{Result, StudioError};

const MAX_ERROR_BODY_BYTES: usize = 64 * 1024;
pub(crate) const MAX_ARTIFACT_BYTES: usize = 512 * 1024 * 1024;

pub(crate) fn build_http_client(
    timeout: Duration,
    headers: &BTreeMap<String, String>,
) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().timeout(timeout);
    if !headers.is_empty() {
        builder = builder.default_headers(header_map_from_pairs(headers)?);
    }
    builder.build().map_err(StudioError::Http)
}

fn header_map_from_pairs(headers: &BTreeMap<String, String>) -> Result<HeaderMap> {
    let mut out = HeaderMap::new();
    for (name, value) in headers {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|err| {
            StudioError::Config(format!("invalid http header name {name:?}: {err}"))
        })?;
        let header_value = HeaderValue::from_str(value).map_err(|err| {
            StudioError::Config(format!("invalid http header value for {name:?}: {err}"))
        })?;
        out.insert(header_name, header_value);
    }
    Ok(out)
}

/// Reads at most `max_bytes` of the body; the flag reports a body cut short.
/// Chunks read before a transport error are returned alongside it.
async fn read_capped(
    response: reqwest::Response,
    max_bytes: usize,
) -> (Vec<u8>, bool, Option<reqwest::Error>) {
    let mut body = Vec::<u8>::new();
    let mut chunks = response.bytes_stream();
    while let Some(next) = chunks.next().await {
        let chunk = match next {
            Ok(chunk) => chunk,
            Err(err) => return (body, false, Some(err)),
        };
        let room = max_bytes.saturating_sub(body.len());
        if chunk.len() > room {
            body.extend_from_slice(&chunk[..room]);
            return (body, true, None);
        }
        body.extend_from_slice(&chunk);
    }
    (body, false, None)
}

async fn error_body(response: reqwest::Response) -> String {
    let (bytes, cut, _) = read_capped(response, MAX_ERROR_BODY_BYTES).await;
    let body = String::from_utf8_lossy(&bytes);
    match (cut, body.is_empty()) {
        (false, _) => body.into_owned(),
        (true, true) => "...(truncated)".to_string(),
        (true, false) => format!("{body}\n...(truncated)"),
    }
}

pub(crate) async fn send_checked(req: reqwest::RequestBuilder) -> Result<reqwest::Response> {
    let response = req.send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = error_body(response).await;
        return Err(StudioError::Api { status, body });
    }
    Ok(response)
}

pub(crate) async fn send_checked_json<T: DeserializeOwned>(
    req: reqwest::RequestBuilder,
) -> Result<T> {
    let response = send_checked(req).await?;
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice::<T>(&bytes)?)
}

/// Downloads a binary body, returning it with the response content type.
pub(crate) async fn send_checked_bytes(
    req: reqwest::RequestBuilder,
    max_bytes: usize,
) -> Result<(Bytes, Option<String>)> {
    let response = send_checked(req).await?;
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.split(';').next().unwrap_or(value).trim().to_string())
        .filter(|value| !value.is_empty());

    let (body, cut, err) = read_capped(response, max_bytes).await;
    if let Some(err) = err {
        return Err(StudioError::Http(err));
    }
    if cut {
        return Err(StudioError::InvalidResponse(format!(
            "response exceeded max bytes ({max_bytes})"
        )));
    }
    Ok((Bytes::from(body), content_type))
}
