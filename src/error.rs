//! Error taxonomy shared by every layer of the client.

use serde::Deserialize;
use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T, E = AscError> = std::result::Result<T, E>;

/// Maximum number of response bytes kept in a [`AscError::Transport`] snippet.
const SNIPPET_LIMIT: usize = 512;

/// Top-level client error.
#[derive(Debug, Error)]
pub enum AscError {
    /// Bad credentials or missing required configuration. Fatal.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Client-side validation failure (empty IDs, missing files, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The endpoint does not accept the requested query parameter.
    #[error("unsupported parameter: {0}")]
    UnsupportedParameter(String),

    /// A pagination cursor failed the scheme/host/path allow-list.
    #[error("invalid next URL: {0}")]
    InvalidNextUrl(String),

    /// The server rejected the request with a JSON:API error document.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Network, IO or decoding failure.
    #[error("transport error: {message}")]
    Transport {
        status: Option<u16>,
        message: String,
        snippet: Option<String>,
    },

    /// A pre-signed storage URL answered a chunk upload with a non-2xx status.
    #[error("upload chunk at offset {offset} (length {length}) failed with HTTP {status}")]
    UploadChunk { offset: u64, length: u64, status: u16 },

    /// Server-issued upload operations do not partition the source file.
    #[error("invalid upload operations: {0}")]
    InvalidUploadOperations(String),

    /// Integrity check failed after download or before commit.
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// The JWT signer itself failed.
    #[error("token signing failed: {0}")]
    Signer(String),

    /// The server returned the same `links.next` twice.
    #[error("pagination returned a repeated next URL: {0}")]
    RepeatedPaginationUrl(String),

    /// The caller's cancellation token fired.
    #[error("operation cancelled")]
    Cancelled,
}

impl AscError {
    /// Build a transport error for a failed response, keeping a bounded body snippet.
    pub fn transport_status(status: u16, body: &[u8]) -> Self {
        let snippet = snippet(body);
        let message = if snippet.is_empty() {
            format!("HTTP {status}")
        } else {
            format!("HTTP {status}: {snippet}")
        };
        AscError::Transport {
            status: Some(status),
            message,
            snippet: (!snippet.is_empty()).then_some(snippet),
        }
    }

    /// Build a transport error with no HTTP status attached.
    pub fn transport(message: impl Into<String>) -> Self {
        AscError::Transport {
            status: None,
            message: message.into(),
            snippet: None,
        }
    }

    /// Whether retrying the same request later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            AscError::Transport { status, .. } => status.is_none_or(|s| s >= 500 || s == 429),
            AscError::Signer(_) => true,
            AscError::Api(api) => api.status >= 500 || api.status == 429,
            _ => false,
        }
    }

    /// HTTP status associated with the error, when there is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            AscError::Api(api) => Some(api.status),
            AscError::Transport { status, .. } => *status,
            AscError::UploadChunk { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<std::io::Error> for AscError {
    fn from(err: std::io::Error) -> Self {
        AscError::transport(format!("I/O: {err}"))
    }
}

impl From<reqwest::Error> for AscError {
    fn from(err: reqwest::Error) -> Self {
        AscError::Transport {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
            snippet: None,
        }
    }
}

impl From<serde_json::Error> for AscError {
    fn from(err: serde_json::Error) -> Self {
        AscError::transport(format!("failed to decode response: {err}"))
    }
}

impl From<url::ParseError> for AscError {
    fn from(err: url::ParseError) -> Self {
        AscError::InvalidArgument(format!("invalid URL: {err}"))
    }
}

/// One entry of a JSON:API `errors` array.
#[derive(Debug, Clone, Default, Deserialize, serde::Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<serde_json::Value>,
}

/// `{ "errors": [...] }`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiErrorEnvelope {
    #[serde(default)]
    pub errors: Vec<ApiErrorItem>,
}

/// A request the server rejected, surfaced verbatim.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{}", self.summary())]
pub struct ApiError {
    pub status: u16,
    pub code: String,
    pub title: String,
    pub detail: String,
    pub errors: Vec<ApiErrorItem>,
}

impl ApiError {
    /// Decode an error body. Returns `None` when the body is not a JSON:API
    /// error document with at least one entry.
    pub fn from_body(status: u16, body: &[u8]) -> Option<Self> {
        let envelope: ApiErrorEnvelope = serde_json::from_slice(body).ok()?;
        let first = envelope.errors.first()?.clone();
        Some(Self {
            status,
            code: first.code,
            title: first.title,
            detail: first.detail.unwrap_or_default(),
            errors: envelope.errors,
        })
    }

    /// `401` with Apple's `NOT_AUTHORIZED` code, the signal for a stale token.
    pub fn is_not_authorized(&self) -> bool {
        let normalized: String = self
            .code
            .chars()
            .filter(|c| *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        self.status == 401 && normalized == "notauthorized"
    }

    fn summary(&self) -> String {
        let title = self.title.trim();
        let detail = self.detail.trim();
        match (title.is_empty(), detail.is_empty()) {
            (false, false) => format!("{title}: {detail}"),
            (false, true) => title.to_string(),
            (true, false) => detail.to_string(),
            (true, true) if !self.code.is_empty() => {
                format!("{} (HTTP {})", self.code, self.status)
            }
            (true, true) => format!("request failed with HTTP {}", self.status),
        }
    }
}

fn snippet(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();
    if trimmed.len() <= SNIPPET_LIMIT {
        return trimmed.to_string();
    }
    let mut end = SNIPPET_LIMIT;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &trimmed[..end])
}
