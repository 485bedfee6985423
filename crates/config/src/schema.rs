/// Config schema types (server, database, embeddings, memory, auth).
use std::collections::HashMap;

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Environment variable that overrides `embeddings.api_key`.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Root configuration.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistoConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub embeddings: EmbeddingsConfig,
    pub memory: MemorySection,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite connection URL.
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://persisto.db?mode=rwc".into(),
        }
    }
}

/// Which embedding backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// OpenAI-compatible `/v1/embeddings` API.
    #[default]
    OpenAi,
    /// Deterministic offline hashing, for local development.
    Hash,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingsConfig {
    pub provider: EmbeddingBackend,

    /// API key (the `OPENAI_API_KEY` env var takes precedence if set).
    #[serde(skip_serializing)]
    pub api_key: Option<Secret<String>>,

    /// Override the base URL.
    pub base_url: Option<String>,

    /// Model id; must be paired with `dimensions` when not the default.
    pub model: Option<String>,

    pub dimensions: Option<usize>,
}

impl EmbeddingsConfig {
    /// Resolve the API key from `OPENAI_API_KEY`, then the config file.
    pub fn resolve_api_key(&self) -> Option<Secret<String>> {
        self.resolve_api_key_with(|name| std::env::var(name).ok())
    }

    fn resolve_api_key_with(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Option<Secret<String>> {
        if let Some(key) = lookup(OPENAI_API_KEY_ENV).filter(|k| !k.trim().is_empty()) {
            return Some(Secret::new(key));
        }
        self.api_key
            .as_ref()
            .map(|k| k.expose_secret().trim().to_string())
            // An unresolved `${VAR}` placeholder is not a key.
            .filter(|k| !k.is_empty() && !k.starts_with("${"))
            .map(Secret::new)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySection {
    /// Upper bound on chunk length, in characters.
    pub max_chunk_chars: usize,

    /// Per-profile tuning keyed by profile name ("strict", "fuzzy", "recency").
    pub profiles: HashMap<String, ProfileTuning>,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            max_chunk_chars: 500,
            profiles: HashMap::new(),
        }
    }
}

/// Optional overrides for one retrieval profile. Unset fields keep the
/// built-in value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProfileTuning {
    pub k: Option<usize>,
    pub oversample: Option<usize>,
    pub min_sim: Option<f64>,
    pub recency_weight: Option<f64>,
    pub recency_window_secs: Option<u64>,
    /// Zero or negative disables decay.
    pub decay_half_life_days: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Static API keys: key → tenant id. Checked before the database.
    #[serde(skip_serializing)]
    pub api_keys: HashMap<String, String>,
}

impl PersistoConfig {
    /// Reject values that would make the service misbehave at runtime.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.memory.max_chunk_chars == 0 {
            anyhow::bail!("memory.max_chunk_chars must be at least 1");
        }
        for (name, tuning) in &self.memory.profiles {
            if tuning.k == Some(0) {
                anyhow::bail!("memory.profiles.{name}.k must be at least 1");
            }
            if let Some(min_sim) = tuning.min_sim
                && !(0.0..=1.0).contains(&min_sim)
            {
                anyhow::bail!("memory.profiles.{name}.min_sim must be within [0, 1]");
            }
            if let Some(weight) = tuning.recency_weight
                && weight < 0.0
            {
                anyhow::bail!("memory.profiles.{name}.recency_weight must not be negative");
            }
        }
        for (key, tenant) in &self.auth.api_keys {
            if key.trim().is_empty() || tenant.trim().is_empty() {
                anyhow::bail!("auth.api_keys entries need a non-empty key and tenant");
            }
        }
        if self.embeddings.model.is_some() != self.embeddings.dimensions.is_some()
            && self.embeddings.provider == EmbeddingBackend::OpenAi
        {
            anyhow::bail!("embeddings.model and embeddings.dimensions must be set together");
        }
        Ok(())
    }
}
