//! JSON-over-HTTP generation backend.
//!
//! Sends `{ prompt, parameters, auxiliary }` to a single endpoint and treats a 2xx body
//! as the artifact bytes. Status codes are mapped onto [`OperationError`] variants so the
//! transient/permanent split is decided here, not from error text.

use crate::backend::GenerationBackend;
use crate::error::OperationError;
use crate::job::{Artifact, AuxiliaryInput, JobPayload};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

const BACKEND_HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Serialize)]
struct GenerationRequestBody<'a> {
    prompt: &'a str,
    parameters: &'a BTreeMap<String, String>,
    auxiliary: Vec<AuxiliaryBody<'a>>,
}

#[derive(Serialize)]
struct AuxiliaryBody<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    media_type: Option<&'a str>,
    data: String,
}

fn request_body<'a>(
    payload: &'a JobPayload,
    auxiliary: &'a [AuxiliaryInput],
) -> GenerationRequestBody<'a> {
    GenerationRequestBody {
        prompt: &payload.prompt,
        parameters: &payload.parameters,
        auxiliary: auxiliary
            .iter()
            .map(|input| AuxiliaryBody {
                name: &input.name,
                media_type: input.media_type.as_deref(),
                data: BASE64.encode(&input.data),
            })
            .collect(),
    }
}

/// Map a non-success status onto the error taxonomy.
pub fn classify_status(status: StatusCode, body: &str) -> OperationError {
    let detail = format!("status {}: {}", status.as_u16(), body);
    match status.as_u16() {
        429 => OperationError::RateLimited(detail),
        408 => OperationError::Timeout(detail),
        401 | 403 => OperationError::AuthFailed(detail),
        400 | 404 | 413 | 422 => OperationError::InvalidInput(detail),
        500..=599 => OperationError::Unavailable(detail),
        _ => OperationError::Rejected(detail),
    }
}

fn map_http_error(error: reqwest::Error) -> OperationError {
    if let Some(status) = error.status() {
        classify_status(status, &error.to_string())
    } else if error.is_timeout() {
        OperationError::Timeout(format!("Request timeout: {}", error))
    } else if error.is_connect() || error.is_request() {
        OperationError::Network(format!("Connection error: {}", error))
    } else {
        OperationError::Network(format!("HTTP error: {}", error))
    }
}

/// Map a `Content-Type` header value to an artifact format (`image/png` -> `png`).
fn format_from_content_type(content_type: &str) -> Option<String> {
    let mime = content_type.split(';').next()?.trim();
    let subtype = mime.split('/').nth(1)?.trim().to_ascii_lowercase();
    match subtype.as_str() {
        "" | "octet-stream" => None,
        "jpeg" => Some("jpg".to_string()),
        "svg+xml" => Some("svg".to_string()),
        other if is_safe_extension(other) => Some(other.to_string()),
        other => {
            debug!(subtype = other, "Ignoring unusable content-type subtype");
            None
        }
    }
}

/// `[a-z0-9+.-]` only, with no leading dot and no `..`, so it stays one path component.
fn is_safe_extension(candidate: &str) -> bool {
    !candidate.starts_with('.')
        && !candidate.contains("..")
        && candidate
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'+' | b'.' | b'-'))
}

pub struct HttpBackend {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpBackend {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        request_timeout: Option<Duration>,
    ) -> Result<Self, OperationError> {
        let client = Client::builder()
            .no_proxy()
            .connect_timeout(BACKEND_HTTP_CONNECT_TIMEOUT)
            .timeout(request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT))
            .build()
            .map_err(|e| OperationError::Network(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl GenerationBackend for HttpBackend {
    async fn perform(
        &self,
        payload: &JobPayload,
        auxiliary: &[AuxiliaryInput],
    ) -> Result<Artifact, OperationError> {
        let body = request_body(payload, auxiliary);
        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(map_http_error)?;
        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(classify_status(status, &error_text));
        }

        let format = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(format_from_content_type);
        let bytes = response.bytes().await.map_err(map_http_error)?;
        if bytes.is_empty() {
            return Err(OperationError::InvalidResponse(
                "Empty response body".to_string(),
            ));
        }

        debug!(
            endpoint = %self.endpoint,
            bytes = bytes.len(),
            format = ?format,
            "Backend response received"
        );

        let mut artifact = Artifact::new(bytes.to_vec());
        artifact.metadata.format = format;
        Ok(artifact)
    }

    fn name(&self) -> &str {
        "http"
    }
}
