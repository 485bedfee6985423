use {
    axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    persisto_memory::MemoryError,
    serde_json::json,
    tracing::{error, warn},
};

/// Errors a handler can return; each maps to one HTTP status.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("missing or malformed Authorization header")]
    Unauthorized,

    #[error("invalid API key")]
    Forbidden,

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error("internal error: {0:#}")]
    Internal(anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Memory(e) if e.is_validation() => StatusCode::BAD_REQUEST,
            Self::Memory(MemoryError::NamespaceNotFound { .. } | MemoryError::NotFound) => {
                StatusCode::NOT_FOUND
            },
            Self::Memory(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::BadRequest(_) => "bad_request",
            Self::Memory(e) => match e {
                MemoryError::InvalidFilterKey { .. } => "invalid_filter_key",
                MemoryError::InvalidInput(_) => "invalid_input",
                MemoryError::NamespaceNotFound { .. } => "namespace_not_found",
                MemoryError::NotFound => "not_found",
                MemoryError::UpstreamUnavailable(_) => "upstream_unavailable",
                MemoryError::PartialSave { .. } => "partial_save",
            },
            Self::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "request failed");
        } else if matches!(self, Self::Forbidden) {
            warn!("rejected request with unknown API key");
        }

        let mut body = json!({
            "error": self.to_string(),
            "code": self.code(),
        });
        if let Self::Memory(MemoryError::PartialSave {
            persisted, total, ..
        }) = &self
        {
            body["persisted"] = json!(persisted);
            body["total"] = json!(total);
        }
        (status, Json(body)).into_response()
    }
}
