/// SQLite schema for fragments and the query audit log.

/// Current time in epoch milliseconds, evaluated by SQLite itself. Expiry is
/// always judged by the store's clock.
pub const SQL_NOW_MS: &str = "CAST((julianday('now') - 2440587.5) * 86400000.0 AS INTEGER)";

const MIGRATIONS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS memories (
        id          TEXT PRIMARY KEY,
        tenant_id   TEXT NOT NULL,
        namespace   TEXT NOT NULL,
        content     TEXT NOT NULL,
        metadata    TEXT NOT NULL DEFAULT '{}',
        embedding   BLOB NOT NULL,
        dims        INTEGER NOT NULL,
        created_at  INTEGER NOT NULL,
        expires_at  INTEGER,
        CHECK (expires_at IS NULL OR expires_at > created_at)
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_memories_scope ON memories(tenant_id, namespace)",
    r#"CREATE TABLE IF NOT EXISTS memory_queries (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        tenant_id   TEXT NOT NULL,
        namespace   TEXT NOT NULL,
        query_text  TEXT NOT NULL,
        filters     TEXT NOT NULL DEFAULT '{}',
        k           INTEGER NOT NULL,
        mode        TEXT NOT NULL,
        created_at  INTEGER NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_memory_queries_tenant ON memory_queries(tenant_id, created_at)",
];

/// Create tables and indexes if they do not exist.
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> anyhow::Result<()> {
    for stmt in MIGRATIONS {
        sqlx::query(stmt).execute(pool).await?;
    }
    Ok(())
}
