/// Database-backed API keys.
///
/// Only the SHA-256 of a key is stored. The plaintext is returned once, at
/// creation, and never again.
use {
    async_trait::async_trait,
    base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD},
    chrono::{DateTime, Utc},
    rand::RngCore,
    serde::Serialize,
    sha2::{Digest, Sha256},
    sqlx::{SqlitePool, sqlite::SqlitePoolOptions},
    tracing::info,
};

use crate::auth::TenantResolver;

const KEY_PREFIX: &str = "pk_";

/// A stored key, without its secret.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiKeyInfo {
    /// First characters of the key, for recognising it in listings.
    pub prefix: String,
    pub tenant_id: String,
    pub label: Option<String>,
    pub created_at: DateTime<Utc>,
    pub revoked: bool,
}

#[derive(sqlx::FromRow)]
struct ApiKeyRow {
    key_prefix: String,
    tenant_id: String,
    label: Option<String>,
    created_at: i64,
    revoked_at: Option<i64>,
}

impl From<ApiKeyRow> for ApiKeyInfo {
    fn from(r: ApiKeyRow) -> Self {
        Self {
            prefix: r.key_prefix,
            tenant_id: r.tenant_id,
            label: r.label,
            created_at: DateTime::from_timestamp_millis(r.created_at).unwrap_or_default(),
            revoked: r.revoked_at.is_some(),
        }
    }
}

pub struct SqliteApiKeyStore {
    pool: SqlitePool,
}

impl SqliteApiKeyStore {
    /// Wrap an existing pool and create the table if needed.
    pub async fn new(pool: SqlitePool) -> anyhow::Result<Self> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS api_keys (
                key_hash    TEXT PRIMARY KEY,
                key_prefix  TEXT NOT NULL,
                tenant_id   TEXT NOT NULL,
                label       TEXT,
                created_at  INTEGER NOT NULL,
                revoked_at  INTEGER
            )"#,
        )
        .execute(&pool)
        .await?;
        Ok(Self { pool })
    }

    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new().connect(url).await?;
        Self::new(pool).await
    }

    /// Issue a new key for `tenant` and return the plaintext.
    pub async fn create(&self, tenant: &str, label: Option<&str>) -> anyhow::Result<String> {
        if tenant.trim().is_empty() {
            anyhow::bail!("tenant id must not be empty");
        }
        let key = generate_key();
        sqlx::query(
            "INSERT INTO api_keys (key_hash, key_prefix, tenant_id, label, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(hash_key(&key))
        .bind(key_prefix(&key))
        .bind(tenant)
        .bind(label)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;
        info!(tenant, prefix = %key_prefix(&key), "created api key");
        Ok(key)
    }

    pub async fn list(&self) -> anyhow::Result<Vec<ApiKeyInfo>> {
        let rows: Vec<ApiKeyRow> = sqlx::query_as(
            "SELECT key_prefix, tenant_id, label, created_at, revoked_at \
             FROM api_keys ORDER BY created_at, key_prefix",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Revoke a key by its plaintext. Returns `false` if it was unknown or
    /// already revoked.
    pub async fn revoke(&self, key: &str) -> anyhow::Result<bool> {
        let res = sqlx::query(
            "UPDATE api_keys SET revoked_at = ? WHERE key_hash = ? AND revoked_at IS NULL",
        )
        .bind(Utc::now().timestamp_millis())
        .bind(hash_key(key))
        .execute(&self.pool)
        .await?;
        let revoked = res.rows_affected() > 0;
        if revoked {
            info!(prefix = %key_prefix(key), "revoked api key");
        }
        Ok(revoked)
    }
}

#[async_trait]
impl TenantResolver for SqliteApiKeyStore {
    async fn resolve(&self, api_key: &str) -> anyhow::Result<Option<String>> {
        let tenant: Option<String> = sqlx::query_scalar(
            "SELECT tenant_id FROM api_keys WHERE key_hash = ? AND revoked_at IS NULL",
        )
        .bind(hash_key(api_key))
        .fetch_optional(&self.pool)
        .await?;
        Ok(tenant)
    }
}

fn generate_key() -> String {
    let mut bytes = [0u8; 24];
    rand::rng().fill_bytes(&mut bytes);
    format!("{KEY_PREFIX}{}", URL_SAFE_NO_PAD.encode(bytes))
}

fn hash_key(key: &str) -> String {
    format!("{:x}", Sha256::digest(key.as_bytes()))
}

fn key_prefix(key: &str) -> String {
    key.chars().take(KEY_PREFIX.len() + 6).collect()
}
