/// Errors returned by [`crate::PersistoClient`].
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("missing API key")]
    MissingApiKey,

    /// 401 or 403. Never retried.
    #[error("unauthorized ({status}): {message}")]
    Auth { status: u16, message: String },

    #[error("not found: {message}")]
    NotFound { message: String },

    /// Still 429 once the retry budget ran out.
    #[error("rate limited after {attempts} attempts")]
    RateLimited { attempts: u32, message: String },

    /// Still 5xx once the retry budget ran out.
    #[error("server error {status} after {attempts} attempts: {message}")]
    Server {
        status: u16,
        attempts: u32,
        message: String,
    },

    /// Any other non-success status, e.g. 400 for invalid input.
    #[error("request rejected ({status}): {message}")]
    Rejected {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("network error after {attempts} attempts: {source}")]
    Network {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ClientError {
    /// HTTP status behind this error, when there was a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Auth { status, .. }
            | Self::Server { status, .. }
            | Self::Rejected { status, .. } => Some(*status),
            Self::NotFound { .. } => Some(404),
            Self::RateLimited { .. } => Some(429),
            Self::MissingApiKey | Self::Network { .. } | Self::Decode(_) => None,
        }
    }
}

pub type Result<T, E = ClientError> = std::result::Result<T, E>;
