//! Ollama Backend Implementation
//!
//! LLM backend for Ollama (local LLM server).
//!
//! # Ollama API
//!
//! - `/api/chat` - Chat completions with message history, NDJSON streaming
//! - `/api/tags` - List available models
//!
//! The chat response body is handed to [`ChunkDecoder`] unchanged; the only
//! bytes read here are the first non-empty ones, to tell an empty body apart
//! from a stream.

use std::time::Duration;

use async_trait::async_trait;
use futures::{stream, StreamExt};
use serde::Deserialize;
use tracing::{debug, info};

use super::error::BackendError;
use super::traits::{ChatRequest, LlmBackend, ModelInfo};
use crate::config::BackendSettings;
use crate::streaming::{ChunkDecoder, ChunkStream};

/// Timeout for the short metadata endpoints
const METADATA_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for health probes
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Ollama backend client
#[derive(Clone, Debug)]
pub struct OllamaBackend {
    /// Base URL without trailing slash
    base_url: String,
    /// HTTP client
    http_client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    details: Option<TagDetails>,
}

#[derive(Debug, Default, Deserialize)]
struct TagDetails {
    #[serde(default)]
    parameter_size: Option<String>,
    #[serde(default)]
    family: Option<String>,
}

/// Strip trailing slashes and check the URL has an HTTP scheme
pub fn normalize_base_url(url: &str) -> Result<String, BackendError> {
    let trimmed = url.trim().trim_end_matches('/');
    let invalid = |reason: &str| BackendError::InvalidUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    };

    let rest = trimmed
        .strip_prefix("http://")
        .or_else(|| trimmed.strip_prefix("https://"))
        .ok_or_else(|| invalid("expected an http:// or https:// URL"))?;
    if rest.is_empty() {
        return Err(invalid("missing host"));
    }

    Ok(trimmed.to_string())
}

impl OllamaBackend {
    /// Create a backend with default timeouts
    pub fn new(base_url: &str) -> Result<Self, BackendError> {
        Self::from_config(&BackendSettings {
            base_url: base_url.to_string(),
            ..BackendSettings::default()
        })
    }

    /// Create from backend settings
    pub fn from_config(settings: &BackendSettings) -> Result<Self, BackendError> {
        let base_url = normalize_base_url(&settings.base_url)?;

        let mut builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs));
        if let Some(secs) = settings.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http_client = builder.build().map_err(BackendError::Client)?;

        Ok(Self {
            base_url,
            http_client,
        })
    }

    /// The normalized base URL
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get chat endpoint URL
    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }

    /// Get tags endpoint URL
    fn tags_url(&self) -> String {
        format!("{}/api/tags", self.base_url)
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(BackendError::Status { status, body })
    }
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    fn name(&self) -> &'static str {
        "Ollama"
    }

    async fn health_check(&self) -> bool {
        self.http_client
            .get(self.tags_url())
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .is_ok_and(|response| response.status().is_success())
    }

    async fn stream_chat(&self, request: &ChatRequest) -> Result<ChunkStream, BackendError> {
        let url = self.chat_url();
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending chat request"
        );

        let response = self
            .http_client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|source| BackendError::Request {
                url: url.clone(),
                source,
            })?;
        let response = Self::check_status(response).await?;

        let mut body = response.bytes_stream();
        let first = loop {
            match body.next().await {
                Some(Ok(bytes)) if bytes.is_empty() => continue,
                Some(Ok(bytes)) => break bytes,
                Some(Err(source)) => return Err(BackendError::Request { url, source }),
                None => return Err(BackendError::EmptyBody),
            }
        };

        let upstream = stream::iter([Ok(first)]).chain(body);
        Ok(ChunkDecoder::new(upstream).into_stream())
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, BackendError> {
        let url = self.tags_url();
        let response = self
            .http_client
            .get(&url)
            .timeout(METADATA_TIMEOUT)
            .send()
            .await
            .map_err(|source| BackendError::Request {
                url: url.clone(),
                source,
            })?;
        let response = Self::check_status(response).await?;

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|source| BackendError::Request { url, source })?;

        let models: Vec<ModelInfo> = tags
            .models
            .into_iter()
            .map(|entry| {
                let details = entry.details.unwrap_or_default();
                ModelInfo {
                    name: entry.name,
                    size: entry.size,
                    parameters: details.parameter_size,
                    family: details.family,
                }
            })
            .collect();

        info!(count = models.len(), "Listed backend models");
        Ok(models)
    }
}
