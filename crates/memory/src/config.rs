/// Configuration for the memory subsystem.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// SQLite connection URL (`sqlite::memory:` for tests).
    pub database_url: String,
    /// Upper bound on chunk length, in characters.
    pub max_chunk_chars: usize,
}

pub const DEFAULT_MAX_CHUNK_CHARS: usize = 500;

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://persisto.db?mode=rwc".into(),
            max_chunk_chars: DEFAULT_MAX_CHUNK_CHARS,
        }
    }
}
