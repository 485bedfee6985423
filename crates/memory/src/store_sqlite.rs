/// SQLite-backed memory store.
///
/// Vectors are stored as little-endian `f32` blobs. Nearest-neighbor search
/// is exact: SQL narrows candidates to one tenant+namespace, drops expired
/// rows and applies metadata filters, then cosine distance is computed here.
use std::cmp::Ordering;

use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    sqlx::{QueryBuilder, Sqlite, SqlitePool, sqlite::SqlitePoolOptions},
    tracing::{debug, warn},
};

use crate::{
    filter::{Metadata, MetadataFilter, MetadataValue},
    schema::{SQL_NOW_MS, run_migrations},
    store::MemoryStore,
    types::{MemoryFragment, QUERY_LOG_LIMIT, QueryLogEntry, QueryLogFilter, RawHit},
};

pub struct SqliteMemoryStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct CandidateRow {
    id: String,
    content: String,
    metadata: String,
    embedding: Vec<u8>,
    created_at: i64,
}

#[derive(sqlx::FromRow)]
struct QueryLogRow {
    tenant_id: String,
    namespace: String,
    query_text: String,
    filters: String,
    k: i64,
    mode: String,
    created_at: i64,
}

impl From<QueryLogRow> for QueryLogEntry {
    fn from(r: QueryLogRow) -> Self {
        Self {
            tenant_id: r.tenant_id,
            namespace: r.namespace,
            query_text: r.query_text,
            filters: parse_metadata(&r.filters),
            k: usize::try_from(r.k).unwrap_or_default(),
            mode: r.mode,
            timestamp: DateTime::from_timestamp_millis(r.created_at).unwrap_or_default(),
        }
    }
}

impl SqliteMemoryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database at `url` and run migrations.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let mut options = SqlitePoolOptions::new();
        if url.contains(":memory:") {
            // Each connection would otherwise get its own empty database.
            options = options
                .max_connections(1)
                .idle_timeout(None::<std::time::Duration>)
                .max_lifetime(None::<std::time::Duration>);
        }
        let pool = options.connect(url).await?;
        run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl MemoryStore for SqliteMemoryStore {
    async fn insert(&self, fragment: &MemoryFragment) -> anyhow::Result<()> {
        let metadata = serde_json::to_string(&fragment.metadata)?;
        sqlx::query(
            r#"INSERT INTO memories
                 (id, tenant_id, namespace, content, metadata, embedding, dims, created_at, expires_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&fragment.id)
        .bind(&fragment.tenant_id)
        .bind(&fragment.namespace)
        .bind(&fragment.content)
        .bind(metadata)
        .bind(encode_embedding(&fragment.embedding))
        .bind(fragment.embedding.len() as i64)
        .bind(fragment.created_at.timestamp_millis())
        .bind(fragment.expires_at.map(|t| t.timestamp_millis()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(
        &self,
        tenant: &str,
        namespace: &str,
        content: Option<&str>,
        metadata: Option<&MetadataFilter>,
    ) -> anyhow::Result<u64> {
        let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM memories WHERE tenant_id = ");
        qb.push_bind(tenant).push(" AND namespace = ").push_bind(namespace);
        if let Some(content) = content {
            qb.push(" AND content = ").push_bind(content);
        }
        if let Some(filter) = metadata {
            push_metadata_predicates(&mut qb, filter);
        }
        let res = qb.build().execute(&self.pool).await?;
        Ok(res.rows_affected())
    }

    async fn nearest_neighbors(
        &self,
        tenant: &str,
        namespace: &str,
        query_vector: &[f32],
        filters: &MetadataFilter,
        limit: usize,
    ) -> anyhow::Result<Vec<RawHit>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT id, content, metadata, embedding, created_at FROM memories WHERE tenant_id = ",
        );
        qb.push_bind(tenant)
            .push(" AND namespace = ")
            .push_bind(namespace)
            .push(" AND (expires_at IS NULL OR expires_at > ")
            .push(SQL_NOW_MS)
            .push(")");
        push_metadata_predicates(&mut qb, filters);

        let rows: Vec<CandidateRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        let candidates = rows.len();

        let mut hits: Vec<RawHit> = rows
            .into_iter()
            .filter_map(|row| {
                let Some(embedding) = decode_embedding(&row.embedding) else {
                    warn!(id = %row.id, "skipping fragment with corrupt embedding blob");
                    return None;
                };
                if embedding.len() != query_vector.len() {
                    warn!(
                        id = %row.id,
                        stored = embedding.len(),
                        query = query_vector.len(),
                        "skipping fragment with mismatched embedding dimension"
                    );
                    return None;
                }
                let similarity = cosine_similarity(query_vector, &embedding).unwrap_or(0.0);
                Some(RawHit {
                    id: row.id,
                    content: row.content,
                    metadata: parse_metadata(&row.metadata),
                    created_at: DateTime::<Utc>::from_timestamp_millis(row.created_at),
                    similarity,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(limit);

        debug!(tenant, namespace, candidates, returned = hits.len(), "nearest neighbors");
        Ok(hits)
    }

    async fn namespace_exists(&self, tenant: &str, namespace: &str) -> anyhow::Result<bool> {
        let found: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM memories WHERE tenant_id = ? AND namespace = ?)",
        )
        .bind(tenant)
        .bind(namespace)
        .fetch_one(&self.pool)
        .await?;
        Ok(found != 0)
    }

    async fn list_namespaces(&self, tenant: &str) -> anyhow::Result<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT namespace FROM memories WHERE tenant_id = ? ORDER BY namespace",
        )
        .bind(tenant)
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }

    async fn append_query_log(&self, entry: &QueryLogEntry) -> anyhow::Result<()> {
        let k = i64::try_from(entry.k)
            .map_err(|_| anyhow::anyhow!("query log k {} out of range", entry.k))?;
        sqlx::query(
            r#"INSERT INTO memory_queries
                 (tenant_id, namespace, query_text, filters, k, mode, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&entry.tenant_id)
        .bind(&entry.namespace)
        .bind(&entry.query_text)
        .bind(serde_json::to_string(&entry.filters)?)
        .bind(k)
        .bind(&entry.mode)
        .bind(entry.timestamp.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_query_log(
        &self,
        tenant: &str,
        filter: &QueryLogFilter,
    ) -> anyhow::Result<Vec<QueryLogEntry>> {
        let limit = filter.limit.clamp(1, QUERY_LOG_LIMIT) as i64;

        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT tenant_id, namespace, query_text, filters, k, mode, created_at \
             FROM memory_queries WHERE tenant_id = ",
        );
        qb.push_bind(tenant);
        if let Some(ns) = &filter.namespace {
            qb.push(" AND namespace = ").push_bind(ns.clone());
        }
        if let Some(start) = filter.start {
            qb.push(" AND created_at >= ").push_bind(start.timestamp_millis());
        }
        if let Some(end) = filter.end {
            qb.push(" AND created_at <= ").push_bind(end.timestamp_millis());
        }
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ").push_bind(limit);

        let rows: Vec<QueryLogRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

/// Append one `AND` clause per predicate. The JSON type is checked alongside
/// the value so `1`, `"1"` and `true` never match each other. Keys were
/// validated by [`MetadataFilter::new`]; both path and value are bound.
fn push_metadata_predicates(qb: &mut QueryBuilder<'_, Sqlite>, filter: &MetadataFilter) {
    for (key, value) in filter.iter() {
        let path = MetadataFilter::json_path(key);
        qb.push(" AND json_type(metadata, ")
            .push_bind(path.clone())
            .push(") = ");
        match value {
            MetadataValue::Bool(b) => {
                qb.push_bind(if *b { "true" } else { "false" });
            },
            MetadataValue::Integer(i) => {
                qb.push("'integer' AND json_extract(metadata, ")
                    .push_bind(path)
                    .push(") = ")
                    .push_bind(*i);
            },
            MetadataValue::Float(f) => {
                qb.push("'real' AND json_extract(metadata, ")
                    .push_bind(path)
                    .push(") = ")
                    .push_bind(*f);
            },
            MetadataValue::String(s) => {
                qb.push("'text' AND json_extract(metadata, ")
                    .push_bind(path)
                    .push(") = ")
                    .push_bind(s.clone());
            },
        }
    }
}

fn parse_metadata(raw: &str) -> Metadata {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!(error = %e, "unreadable metadata column, treating as empty");
        Metadata::new()
    })
}

fn encode_embedding(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn decode_embedding(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return None;
    }
    Some(
        blob.chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}

/// Cosine similarity (`1 - cosine_distance`). `None` for empty, mismatched
/// or zero-magnitude vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }
    let (mut dot, mut na, mut nb) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    let denom = na.sqrt() * nb.sqrt();
    if denom <= f64::EPSILON {
        return None;
    }
    Some(dot / denom)
}
