/// Memory service: orchestrates chunking, embedding, storage and reranking
/// for save/query/delete/list, always scoped to one tenant.
use std::sync::Arc;

use {
    chrono::{DateTime, TimeDelta, Utc},
    tracing::{debug, info, warn},
    uuid::Uuid,
};

use crate::{
    chunker,
    config::MemoryConfig,
    embeddings::EmbeddingProvider,
    error::{MemoryError, Result},
    filter::{Metadata, MetadataFilter},
    profiles::ProfileRegistry,
    rerank::rerank,
    store::MemoryStore,
    types::{MemoryFragment, QueryLogEntry, QueryLogFilter, RankedHit},
};

/// Largest `k` a query may request.
pub const MAX_K: usize = 1_000;

pub struct MemoryService {
    store: Arc<dyn MemoryStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    profiles: Arc<ProfileRegistry>,
    max_chunk_chars: usize,
}

/// Outcome of a successful save.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveReceipt {
    /// Ids of the stored fragments, in chunk order.
    pub ids: Vec<String>,
}

impl SaveReceipt {
    pub fn fragments(&self) -> usize {
        self.ids.len()
    }
}

impl MemoryService {
    pub fn new(
        config: &MemoryConfig,
        store: Arc<dyn MemoryStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        profiles: Arc<ProfileRegistry>,
    ) -> Self {
        Self {
            store,
            embedder,
            profiles,
            max_chunk_chars: config.max_chunk_chars.max(1),
        }
    }

    pub fn profiles(&self) -> &ProfileRegistry {
        &self.profiles
    }

    pub fn embedding_model(&self) -> &str {
        self.embedder.model_name()
    }

    /// Chunk `content` and store one fragment per chunk.
    ///
    /// Chunks are embedded and inserted one at a time with no enclosing
    /// transaction. If a later chunk fails, the earlier ones stay stored and
    /// the error is [`MemoryError::PartialSave`] with the persisted count.
    pub async fn save(
        &self,
        tenant: &str,
        namespace: &str,
        content: &str,
        metadata: Metadata,
        ttl_seconds: Option<u64>,
    ) -> Result<SaveReceipt> {
        validate_scope(tenant, namespace)?;
        let ttl = ttl_seconds.map(ttl_delta).transpose()?;
        // Metadata keys follow the same rule as filter keys so every stored
        // key stays addressable by a filter.
        let metadata = MetadataFilter::new(metadata)?.as_metadata().clone();

        let chunks = chunker::chunk(content, self.max_chunk_chars);
        if chunks.is_empty() {
            return Err(MemoryError::InvalidInput("content is empty".into()));
        }
        let total = chunks.len();

        let mut ids = Vec::with_capacity(total);
        for (index, text) in chunks.into_iter().enumerate() {
            match self.save_chunk(tenant, namespace, text, &metadata, ttl).await {
                Ok(id) => ids.push(id),
                Err(e) => {
                    warn!(
                        tenant,
                        namespace,
                        chunk = index,
                        persisted = ids.len(),
                        total,
                        error = %e,
                        "save failed partway, earlier chunks remain stored"
                    );
                    if ids.is_empty() {
                        return Err(e);
                    }
                    return Err(MemoryError::PartialSave {
                        persisted: ids.len(),
                        total,
                        source: Box::new(e),
                    });
                },
            }
        }

        info!(tenant, namespace, chunks = total, ttl_seconds, "saved memory");
        Ok(SaveReceipt { ids })
    }

    async fn save_chunk(
        &self,
        tenant: &str,
        namespace: &str,
        content: String,
        metadata: &Metadata,
        ttl: Option<TimeDelta>,
    ) -> Result<String> {
        let embedding = self.embed(&content).await?;
        let created_at = Utc::now();
        let expires_at = ttl.and_then(|ttl| created_at.checked_add_signed(ttl));

        let fragment = MemoryFragment {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant.to_string(),
            namespace: namespace.to_string(),
            content,
            metadata: metadata.clone(),
            embedding,
            created_at,
            expires_at,
        };
        self.store
            .insert(&fragment)
            .await
            .map_err(MemoryError::upstream)?;
        debug!(id = %fragment.id, tenant, namespace, "inserted fragment");
        Ok(fragment.id)
    }

    /// Retrieve the most relevant live fragments for `query_text`.
    ///
    /// An unknown `mode` falls back to the "strict" profile. A namespace
    /// that exists but yields no surviving hits returns an empty list.
    pub async fn query(
        &self,
        tenant: &str,
        namespace: &str,
        query_text: &str,
        filters: Metadata,
        mode: Option<&str>,
        k: Option<usize>,
    ) -> Result<Vec<RankedHit>> {
        let filter = MetadataFilter::new(filters)?;
        validate_scope(tenant, namespace)?;
        if query_text.trim().is_empty() {
            return Err(MemoryError::InvalidInput("query is empty".into()));
        }
        if let Some(k) = k
            && k > MAX_K
        {
            return Err(MemoryError::InvalidInput(format!(
                "k must be at most {MAX_K}, got {k}"
            )));
        }

        let exists = self
            .store
            .namespace_exists(tenant, namespace)
            .await
            .map_err(MemoryError::upstream)?;
        if !exists {
            return Err(MemoryError::NamespaceNotFound {
                namespace: namespace.to_string(),
            });
        }

        let profile = self.profiles.get(mode);
        let effective_k = profile.effective_k(k);

        self.store
            .append_query_log(&QueryLogEntry {
                tenant_id: tenant.to_string(),
                namespace: namespace.to_string(),
                query_text: query_text.to_string(),
                filters: filter.as_metadata().clone(),
                k: effective_k,
                mode: profile.name.clone(),
                timestamp: Utc::now(),
            })
            .await
            .map_err(MemoryError::upstream)?;

        let query_vector = self.embed(query_text).await?;
        let limit = profile.effective_oversample(k);
        let raw = self
            .store
            .nearest_neighbors(tenant, namespace, &query_vector, &filter, limit)
            .await
            .map_err(MemoryError::upstream)?;
        let candidates = raw.len();

        let ranked = rerank(raw, &profile, Some(effective_k));
        info!(
            tenant,
            namespace,
            profile = %profile.name,
            k = effective_k,
            candidates,
            returned = ranked.len(),
            "memory query"
        );
        Ok(ranked)
    }

    /// Delete matching fragments and return how many were removed. With
    /// neither `content` nor `metadata` the whole namespace is cleared.
    pub async fn delete(
        &self,
        tenant: &str,
        namespace: &str,
        content: Option<&str>,
        metadata: Option<Metadata>,
    ) -> Result<u64> {
        validate_scope(tenant, namespace)?;
        let filter = metadata.map(MetadataFilter::new).transpose()?;

        let count = self
            .store
            .delete(tenant, namespace, content, filter.as_ref())
            .await
            .map_err(MemoryError::upstream)?;
        info!(tenant, namespace, count, "deleted memories");
        Ok(count)
    }

    pub async fn list_namespaces(&self, tenant: &str) -> Result<Vec<String>> {
        self.store
            .list_namespaces(tenant)
            .await
            .map_err(MemoryError::upstream)
    }

    /// Query-log entries, newest first, at most 100.
    pub async fn list_queries(
        &self,
        tenant: &str,
        namespace: Option<&str>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<QueryLogEntry>> {
        let filter = QueryLogFilter {
            namespace: namespace.map(str::to_string),
            start,
            end,
            ..Default::default()
        };
        self.store
            .list_query_log(tenant, &filter)
            .await
            .map_err(MemoryError::upstream)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let vector = self
            .embedder
            .embed(text)
            .await
            .map_err(MemoryError::upstream)?;
        let expected = self.embedder.dimensions();
        if vector.len() != expected {
            return Err(MemoryError::upstream(anyhow::anyhow!(
                "embedding has {} dimensions, expected {expected}",
                vector.len()
            )));
        }
        Ok(vector)
    }
}

fn validate_scope(tenant: &str, namespace: &str) -> Result<()> {
    if tenant.trim().is_empty() {
        return Err(MemoryError::InvalidInput("tenant is empty".into()));
    }
    if namespace.trim().is_empty() {
        return Err(MemoryError::InvalidInput("namespace is empty".into()));
    }
    Ok(())
}

fn ttl_delta(secs: u64) -> Result<TimeDelta> {
    if secs == 0 {
        return Err(MemoryError::InvalidInput(
            "ttl_seconds must be at least 1".into(),
        ));
    }
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .ok_or_else(|| MemoryError::InvalidInput("ttl_seconds is out of range".into()))
}
