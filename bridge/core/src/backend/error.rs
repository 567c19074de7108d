//! Backend transport errors.

use reqwest::StatusCode;
use thiserror::Error;

/// Failures reaching the backend before a chunk stream exists
#[derive(Debug, Error)]
pub enum BackendError {
    /// The configured base URL is not usable
    #[error("invalid backend URL {url:?}: {reason}")]
    InvalidUrl {
        /// The rejected URL
        url: String,
        /// Why it was rejected
        reason: String,
    },

    /// The HTTP client could not be built
    #[error("failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// Connecting or sending failed
    #[error("request to {url} failed: {source}")]
    Request {
        /// Endpoint that was called
        url: String,
        /// Transport error
        #[source]
        source: reqwest::Error,
    },

    /// The backend answered with a non-success status
    #[error("backend returned {status}: {body}")]
    Status {
        /// HTTP status
        status: StatusCode,
        /// Response body text
        body: String,
    },

    /// The backend answered successfully but sent nothing
    #[error("backend returned an empty response body")]
    EmptyBody,
}

impl BackendError {
    /// Text suitable for showing to the user
    ///
    /// For status errors this is the backend's own body text (Ollama answers
    /// with `{"error": "..."}`, whose message is extracted).
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Status { status, body } => {
                let message = serde_json::from_str::<serde_json::Value>(body)
                    .ok()
                    .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
                    .unwrap_or_else(|| body.trim().to_string());
                if message.is_empty() {
                    status.to_string()
                } else {
                    message
                }
            }
            other => other.to_string(),
        }
    }
}
