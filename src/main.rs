//! Process entry point: load config, wire up every collaborator (storage,
//! embedding, reasoning, STT/TTS) behind the trait objects the rest of the
//! crate depends on, and serve the admin HTTP/websocket surface.
//!
//! Mirrors the reference architecture's thin-`main`-does-only-wiring shape
//! (its own binary's job is starting the IPC server and handing it
//! fully-constructed managers, not building any of them inline) — this one
//! hands a fully-constructed [`reception_core::orchestrator::Collaborators`]
//! to the axum server instead of a Unix-socket IPC loop.

use std::sync::Arc;

use reception_core::admin::{build_router, AppState};
use reception_core::cache::AudioArtifactCache;
use reception_core::config::{Config, ReasoningProvider};
use reception_core::embedding::http::HttpEmbeddingClient;
use reception_core::embedding::local::LocalHashEmbedder;
use reception_core::embedding::EmbeddingClient;
use reception_core::orchestrator::Collaborators;
use reception_core::reasoning::adapter::ReasoningAdapter;
use reception_core::reasoning::anthropic::AnthropicAdapter;
use reception_core::reasoning::openai::OpenAiCompatibleAdapter;
use reception_core::storage::postgres::PostgresStore;
use reception_core::storage::sqlite::SqliteStore;
use reception_core::storage::ReceptionStore;
use reception_core::voice::adapters::provider_stt::ProviderSttAdapter;
use reception_core::voice::adapters::provider_tts::ProviderTtsAdapter;
use reception_core::voice::adapters::silence::SilenceTtsAdapter;
use reception_core::voice::stt::SttAdapter;
use reception_core::voice::tts::TtsAdapter;
use reception_core::{clog_error, clog_info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    reception_core::logging::init_tracing();

    let config = match Config::load() {
        Ok(c) => Arc::new(c),
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    clog_info!("loaded configuration; binding admin surface on {}", config.admin_bind_addr);

    let store: Arc<dyn ReceptionStore> = match &config.database_url {
        Some(url) => {
            clog_info!("DATABASE_URL configured, using PostgreSQL storage backend");
            Arc::new(PostgresStore::connect(url).await.map_err(|e| {
                clog_error!("failed to connect to postgres storage backend: {}", e);
                e
            })?)
        }
        None => Arc::new(SqliteStore::open(&config.sqlite_path).map_err(|e| {
            clog_error!("failed to open storage backend: {}", e);
            e
        })?),
    };

    let embedder: Arc<dyn EmbeddingClient> = match &config.embedding_provider_api_key {
        Some(key) => Arc::new(HttpEmbeddingClient::new(
            config.embedding_base_url.clone(),
            key.clone(),
            config.embedding_model.clone(),
            config.emb_dim,
        )),
        None => {
            clog_info!("no embedding provider key configured, using local deterministic embedder");
            Arc::new(LocalHashEmbedder::new(config.emb_dim))
        }
    };

    let reasoning: Arc<dyn ReasoningAdapter> = match config.reasoning_provider {
        ReasoningProvider::Anthropic => Arc::new(AnthropicAdapter::new(
            config
                .reasoning_provider_api_key
                .clone()
                .expect("validated present at config load"),
        )),
        ReasoningProvider::OpenAiCompatible => Arc::new(OpenAiCompatibleAdapter::new(
            config
                .reasoning_provider_api_key
                .clone()
                .expect("validated present at config load"),
            config
                .reasoning_base_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
        )),
    };

    let stt_adapter: Arc<dyn SttAdapter> = match &config.stt_provider_api_key {
        Some(key) => Arc::new(ProviderSttAdapter::new(
            "wss://stt.reception-provider.example/v1/stream".to_string(),
            key.clone(),
        )),
        None => {
            return Err("STT_PROVIDER_API_KEY is required outside of tests".into());
        }
    };

    // A configured premium key takes priority over the default TTS provider key,
    // per the "`TTS_PREMIUM_API_KEY` present -> premium selected" rule.
    let tts_adapter: Arc<dyn TtsAdapter> = if let Some(key) = &config.tts_premium_api_key {
        Arc::new(ProviderTtsAdapter::new(
            "wss://tts.reception-provider.example/v1/premium".to_string(),
            key.clone(),
            "default".to_string(),
        ))
    } else if let Some(key) = &config.tts_provider_api_key {
        Arc::new(ProviderTtsAdapter::new(
            "wss://tts.reception-provider.example/v1/stream".to_string(),
            key.clone(),
            "default".to_string(),
        ))
    } else {
        clog_info!("no tts provider key configured, falling back to silence adapter");
        Arc::new(SilenceTtsAdapter)
    };

    let collaborators = Collaborators {
        store,
        embedder,
        reasoning,
        stt_adapter,
        tts_adapter,
        config: config.clone(),
    };

    let audio_cache = Arc::new(AudioArtifactCache::new(config.cache_max));

    let state = AppState {
        collaborators,
        audio_cache,
    };

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.admin_bind_addr).await?;
    clog_info!("admin surface listening on {}", config.admin_bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
