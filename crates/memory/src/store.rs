/// Storage abstraction for fragments, nearest-neighbor search and the query log.
use async_trait::async_trait;

use crate::{
    filter::MetadataFilter,
    types::{MemoryFragment, QueryLogEntry, QueryLogFilter, RawHit},
};

#[async_trait]
pub trait MemoryStore: Send + Sync {
    // ---- fragments ----
    async fn insert(&self, fragment: &MemoryFragment) -> anyhow::Result<()>;

    /// Delete fragments matching every given predicate: exact `content`
    /// equality and metadata superset containment. With neither predicate the
    /// whole namespace is removed for that tenant. Returns the row count.
    async fn delete(
        &self,
        tenant: &str,
        namespace: &str,
        content: Option<&str>,
        metadata: Option<&MetadataFilter>,
    ) -> anyhow::Result<u64>;

    // ---- search ----
    /// Up to `limit` unexpired fragments closest to `query_vector`, ordered
    /// by ascending cosine distance. `similarity` is `1 - cosine_distance`.
    async fn nearest_neighbors(
        &self,
        tenant: &str,
        namespace: &str,
        query_vector: &[f32],
        filters: &MetadataFilter,
        limit: usize,
    ) -> anyhow::Result<Vec<RawHit>>;

    // ---- namespaces ----
    async fn namespace_exists(&self, tenant: &str, namespace: &str) -> anyhow::Result<bool>;
    async fn list_namespaces(&self, tenant: &str) -> anyhow::Result<Vec<String>>;

    // ---- query log ----
    async fn append_query_log(&self, entry: &QueryLogEntry) -> anyhow::Result<()>;

    /// Newest first, at most `filter.limit` entries.
    async fn list_query_log(
        &self,
        tenant: &str,
        filter: &QueryLogFilter,
    ) -> anyhow::Result<Vec<QueryLogEntry>>;
}
