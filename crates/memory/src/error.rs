/// Error taxonomy surfaced by the memory service.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    /// A metadata filter key failed the `[A-Za-z0-9_]+` check.
    #[error("invalid filter key: {key:?}")]
    InvalidFilterKey { key: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The tenant has never written to this namespace.
    #[error("namespace not found: {namespace}")]
    NamespaceNotFound { namespace: String },

    #[error("no matching memory found")]
    NotFound,

    /// The embedding provider or the store failed. Not retried here.
    #[error("upstream unavailable: {0:#}")]
    UpstreamUnavailable(#[source] anyhow::Error),

    /// A multi-chunk save failed partway; `persisted` chunks remain stored.
    #[error("save failed after persisting {persisted} of {total} chunks: {source}")]
    PartialSave {
        persisted: usize,
        total: usize,
        #[source]
        source: Box<MemoryError>,
    },
}

impl MemoryError {
    pub fn upstream(err: impl Into<anyhow::Error>) -> Self {
        Self::UpstreamUnavailable(err.into())
    }

    /// Whether the caller sent something malformed (as opposed to a lookup
    /// miss or an upstream failure).
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidFilterKey { .. } | Self::InvalidInput(_))
    }
}

pub type Result<T, E = MemoryError> = std::result::Result<T, E>;
