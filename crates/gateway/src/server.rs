use std::sync::Arc;

use {
    anyhow::Context,
    axum::{
        Router,
        extract::State,
        response::{IntoResponse, Json},
        routing::{delete, get, post},
    },
    persisto_config::{
        EmbeddingBackend, EmbeddingsConfig, PersistoConfig, ProfileTuning, ServerConfig,
    },
    persisto_memory::{
        MemoryService, ProfileRegistry,
        config::MemoryConfig,
        embeddings::EmbeddingProvider,
        embeddings_hash::{DEFAULT_HASH_DIMENSIONS, HashEmbeddingProvider},
        embeddings_openai::OpenAiEmbeddingProvider,
        profiles::ProfileOverride,
        store_sqlite::SqliteMemoryStore,
    },
    secrecy::ExposeSecret,
    tower_http::{
        cors::{Any, CorsLayer},
        trace::TraceLayer,
    },
    tokio::net::TcpListener,
    tracing::info,
};

use crate::{
    api_keys::SqliteApiKeyStore,
    auth::{ChainResolver, StaticKeyResolver, TenantResolver},
    routes,
    state::AppState,
};

// ── Router ───────────────────────────────────────────────────────────────────

/// Build the gateway router (shared between production startup and tests).
pub fn build_gateway_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/memory/save", post(routes::save))
        .route("/memory/query", post(routes::query))
        .route("/memory/delete", delete(routes::delete))
        .route("/memory/namespaces", get(routes::namespaces))
        .route("/memory/queries", get(routes::queries))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ── Wiring ───────────────────────────────────────────────────────────────────

/// Open the database and assemble the memory service and tenant resolver.
pub async fn build_state(config: &PersistoConfig) -> anyhow::Result<AppState> {
    let store = SqliteMemoryStore::connect(&config.database.url)
        .await
        .with_context(|| format!("failed to open database {}", config.database.url))?;
    let keys = SqliteApiKeyStore::new(store.pool().clone()).await?;

    let embedder = build_embedder(&config.embeddings)?;
    let profiles = build_profiles(config);
    let memory_config = MemoryConfig {
        database_url: config.database.url.clone(),
        max_chunk_chars: config.memory.max_chunk_chars,
    };
    let memory = MemoryService::new(
        &memory_config,
        Arc::new(store),
        embedder,
        Arc::new(profiles),
    );

    let static_keys: Arc<dyn TenantResolver> =
        Arc::new(StaticKeyResolver::new(&config.auth.api_keys));
    let db_keys: Arc<dyn TenantResolver> = Arc::new(keys);
    let resolver = ChainResolver::new(vec![static_keys, db_keys]);
    Ok(AppState::new(Arc::new(memory), Arc::new(resolver)))
}

pub fn build_embedder(config: &EmbeddingsConfig) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    match config.provider {
        EmbeddingBackend::OpenAi => {
            let key = config.resolve_api_key().context(
                "no embeddings API key: set OPENAI_API_KEY or embeddings.api_key, \
                 or use embeddings.provider = \"hash\"",
            )?;
            let mut provider = OpenAiEmbeddingProvider::new(key.expose_secret().clone());
            if let Some(url) = &config.base_url {
                provider = provider.with_base_url(url.clone());
            }
            if let (Some(model), Some(dims)) = (&config.model, config.dimensions) {
                provider = provider.with_model(model.clone(), dims);
            }
            Ok(Arc::new(provider))
        },
        EmbeddingBackend::Hash => Ok(Arc::new(HashEmbeddingProvider::new(
            config.dimensions.unwrap_or(DEFAULT_HASH_DIMENSIONS),
        ))),
    }
}

fn build_profiles(config: &PersistoConfig) -> ProfileRegistry {
    let overrides: Vec<(&str, ProfileOverride)> = config
        .memory
        .profiles
        .iter()
        .map(|(name, tuning)| (name.as_str(), profile_override(tuning)))
        .collect();
    ProfileRegistry::with_overrides(overrides.iter().map(|(name, o)| (*name, o)))
}

fn profile_override(t: &ProfileTuning) -> ProfileOverride {
    ProfileOverride {
        k: t.k,
        oversample: t.oversample,
        min_sim: t.min_sim,
        recency_weight: t.recency_weight,
        recency_window_secs: t.recency_window_secs,
        decay_half_life_days: t.decay_half_life_days,
    }
}

// ── Server startup ───────────────────────────────────────────────────────────

/// Bind `server.bind`/`server.port`. Accepts IPv4, IPv6 and host names.
pub async fn bind_listener(server: &ServerConfig) -> anyhow::Result<TcpListener> {
    TcpListener::bind((server.bind.as_str(), server.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", server.bind, server.port))
}

/// Start the gateway HTTP server and run until Ctrl-C.
pub async fn start_gateway(config: PersistoConfig) -> anyhow::Result<()> {
    let state = build_state(&config).await?;
    let model = state.memory.embedding_model().to_string();
    let profiles = state.memory.profiles().names().join(", ");
    let version = state.version.clone();

    let app = build_gateway_app(state);

    let listener = bind_listener(&config.server).await?;
    let addr = listener.local_addr()?;

    // Startup banner.
    let lines = [
        format!("persisto gateway v{version}"),
        format!("listening on {addr}"),
        format!("embeddings: {model}"),
        format!("profiles: {profiles}"),
        format!("{} static api key(s)", config.auth.api_keys.len()),
    ];
    let width = lines.iter().map(|l| l.len()).max().unwrap_or(0) + 4;
    info!("┌{}┐", "─".repeat(width));
    for line in &lines {
        info!("│  {:<w$}│", line, w = width - 2);
    }
    info!("└{}┘", "─".repeat(width));

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;
    Ok(())
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": state.version,
    }))
}
