//! Error types for the request engine

use thiserror::Error;

/// Result alias used across the engine
pub type Result<T> = std::result::Result<T, GraphError>;

/// Every failure the engine can surface to its caller
#[derive(Debug, Error)]
pub enum GraphError {
    /// Caller input rejected before any network call
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// DNS, connect, TLS, timeout or body-read failure. Never retried here.
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// HTTP status >= 400. `body` is the raw response text, untouched.
    #[error("API request failed with status {status}")]
    Api { status: u16, body: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("request cancelled")]
    Cancelled,

    /// The external token capability could not produce a token
    #[error("authentication failed: {0}")]
    Auth(String),
}

impl GraphError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse(message.into())
    }

    /// HTTP status for `Api` errors
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for GraphError {
    fn from(error: reqwest::Error) -> Self {
        Self::Transport(error)
    }
}

/// Maximum length of error text shown to a user
const MAX_DISPLAY_LENGTH: usize = 120;

/// Format an engine error for terminal display.
///
/// For `Api` errors the Graph `error.message` field is pulled out of the
/// preserved body when present; the body itself is never echoed in full.
pub fn describe_error(error: &GraphError) -> String {
    match error {
        GraphError::Api { status, body } => {
            let detail = serde_json::from_str::<serde_json::Value>(body)
                .ok()
                .and_then(|v| {
                    v.get("error")
                        .and_then(|e| e.get("message"))
                        .and_then(|m| m.as_str())
                        .map(sanitize)
                });

            let summary = match *status {
                400 => "Invalid request. Check your parameters.",
                401 => "Authentication failed. Refresh your access token.",
                403 => "Permission denied. Check the granted scopes.",
                404 => "Resource not found.",
                409 => "Resource conflict. The resource may already exist or be in use.",
                429 => "Rate limit exceeded. Please try again later.",
                500..=599 => "Service temporarily unavailable. Please try again.",
                _ => "Request failed.",
            };

            match detail {
                Some(detail) if !detail.is_empty() => format!("{} ({})", summary, detail),
                _ => summary.to_string(),
            }
        }
        GraphError::Transport(_) => {
            "Request failed. Check your network connection and try again.".to_string()
        }
        other => sanitize(&other.to_string()),
    }
}

fn sanitize(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_graphic() || *c == ' ')
        .take(MAX_DISPLAY_LENGTH)
        .collect();

    if cleaned.len() < text.len() {
        format!("{}...", cleaned)
    } else {
        cleaned
    }
}
