/// Row and transient types flowing through the retrieval pipeline.
use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

use crate::filter::Metadata;

/// One stored unit of post-chunking content with its own embedding vector.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryFragment {
    pub id: String,
    pub tenant_id: String,
    pub namespace: String,
    pub content: String,
    pub metadata: Metadata,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// A nearest-neighbor candidate as returned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawHit {
    pub id: String,
    pub content: String,
    pub metadata: Metadata,
    pub created_at: Option<DateTime<Utc>>,
    /// `1 - cosine_distance`, nominally in `[0, 1]`.
    pub similarity: f64,
}

/// A hit that survived reranking, with its final blended score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedHit {
    pub id: String,
    pub content: String,
    pub metadata: Metadata,
    pub created_at: Option<DateTime<Utc>>,
    pub similarity: f64,
    pub score: f64,
}

/// Append-only audit record written on every query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryLogEntry {
    pub tenant_id: String,
    pub namespace: String,
    pub query_text: String,
    pub filters: Metadata,
    pub k: usize,
    /// Name of the resolved retrieval profile.
    pub mode: String,
    pub timestamp: DateTime<Utc>,
}

/// Default and maximum page size for query-log listings.
pub const QUERY_LOG_LIMIT: usize = 100;

/// Selection for [`crate::store::MemoryStore::list_query_log`].
#[derive(Debug, Clone)]
pub struct QueryLogFilter {
    pub namespace: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: usize,
}

impl Default for QueryLogFilter {
    fn default() -> Self {
        Self {
            namespace: None,
            start: None,
            end: None,
            limit: QUERY_LOG_LIMIT,
        }
    }
}
