//! C1 — Config & Secrets.
//!
//! Loads and validates external-service credentials and tunable limits
//! once at process start, then freezes the result: [`Config`] is built
//! once in `main()`, wrapped in an `Arc`, and handed to every component by
//! reference. No component re-reads the environment after startup and no
//! component holds a bare global singleton to a provider client.
//!
//! Layering, lowest to highest priority: compiled-in defaults (`constants`)
//! < TOML file at `RECEPTION_CONFIG` (default `~/.reception/config.toml`)
//! < process environment variables. Mirrors the reference architecture's
//! own `secrets.rs` (a dotfile under the user's home directory plus env var
//! fallback), generalized to a TOML tunables file plus secrets.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::constants;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasoningProvider {
    Anthropic,
    OpenAiCompatible,
}

/// Frozen, validated runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    // Secrets
    pub telephony_account_sid: Option<String>,
    pub telephony_auth_token: Option<String>,
    pub stt_provider_api_key: Option<String>,
    pub tts_provider_api_key: Option<String>,
    pub tts_premium_api_key: Option<String>,
    pub reasoning_provider: ReasoningProvider,
    pub reasoning_provider_api_key: Option<String>,
    pub embedding_provider_api_key: Option<String>,
    pub embedding_base_url: String,
    pub embedding_model: String,
    pub reasoning_base_url: Option<String>,
    pub database_url: Option<String>,
    pub sqlite_path: PathBuf,
    pub public_base_url: String,

    // Network
    pub admin_bind_addr: String,

    // Tunables (all default to `constants::*`)
    pub emb_dim: usize,
    pub k_contacts: usize,
    pub k_emails: usize,
    pub max_tool_iters: u32,
    pub barge_in_min_chars: usize,
    pub call_idle_timeout: Duration,
    pub silence_timeout: Duration,
    pub model_turn_timeout: Duration,
    pub tool_call_timeout: Duration,
    pub shutdown_grace: Duration,
    pub cache_max: usize,
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    tunables: HashMap<String, toml::Value>,
    #[serde(default)]
    secrets: HashMap<String, String>,
    #[serde(default)]
    network: HashMap<String, String>,
}

impl Config {
    /// Load config from the TOML file (if present) and environment,
    /// validating required secrets. Fails fast with a descriptive error
    /// rather than lazily failing the first call that needs a credential.
    pub fn load() -> Result<Self, String> {
        let file_path = std::env::var("RECEPTION_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_config_path());

        let file_cfg: FileConfig = if file_path.exists() {
            let content = std::fs::read_to_string(&file_path)
                .map_err(|e| format!("failed to read {}: {}", file_path.display(), e))?;
            toml::from_str(&content)
                .map_err(|e| format!("failed to parse {}: {}", file_path.display(), e))?
        } else {
            FileConfig::default()
        };

        let env_or_file = |key: &str| -> Option<String> {
            std::env::var(key)
                .ok()
                .or_else(|| file_cfg.secrets.get(key).cloned())
        };

        let reasoning_provider_raw = env_or_file("REASONING_PROVIDER")
            .unwrap_or_else(|| "anthropic".to_string());
        let reasoning_provider = match reasoning_provider_raw.to_lowercase().as_str() {
            "anthropic" => ReasoningProvider::Anthropic,
            "openai" | "openai-compatible" => ReasoningProvider::OpenAiCompatible,
            other => return Err(format!("unknown REASONING_PROVIDER: {other}")),
        };

        let reasoning_provider_api_key = env_or_file("REASONING_PROVIDER_API_KEY");
        if reasoning_provider_api_key.is_none() {
            return Err(
                "missing required secret REASONING_PROVIDER_API_KEY".to_string(),
            );
        }

        let public_base_url = env_or_file("PUBLIC_BASE_URL")
            .ok_or_else(|| "missing required config PUBLIC_BASE_URL".to_string())?;

        let sqlite_path = env_or_file("RECEPTION_SQLITE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| default_sqlite_path());

        let admin_bind_addr = file_cfg
            .network
            .get("admin_bind_addr")
            .cloned()
            .or_else(|| std::env::var("RECEPTION_ADMIN_BIND_ADDR").ok())
            .unwrap_or_else(|| "0.0.0.0:8080".to_string());

        let tunable = |key: &str, default: u64| -> u64 {
            std::env::var(format!("RECEPTION_{}", key.to_uppercase()))
                .ok()
                .and_then(|s| s.parse().ok())
                .or_else(|| {
                    file_cfg
                        .tunables
                        .get(key)
                        .and_then(|v| v.as_integer())
                        .map(|v| v as u64)
                })
                .unwrap_or(default)
        };

        Ok(Config {
            telephony_account_sid: env_or_file("TELEPHONY_ACCOUNT_SID"),
            telephony_auth_token: env_or_file("TELEPHONY_AUTH_TOKEN"),
            stt_provider_api_key: env_or_file("STT_PROVIDER_API_KEY"),
            tts_provider_api_key: env_or_file("TTS_PROVIDER_API_KEY"),
            tts_premium_api_key: env_or_file("TTS_PREMIUM_API_KEY"),
            reasoning_provider,
            reasoning_provider_api_key,
            embedding_provider_api_key: env_or_file("EMBEDDING_PROVIDER_API_KEY"),
            embedding_base_url: env_or_file("EMBEDDING_PROVIDER_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            embedding_model: env_or_file("EMBEDDING_PROVIDER_MODEL")
                .unwrap_or_else(|| "text-embedding-3-large".to_string()),
            reasoning_base_url: env_or_file("REASONING_PROVIDER_BASE_URL"),
            database_url: env_or_file("DATABASE_URL"),
            sqlite_path,
            public_base_url,
            admin_bind_addr,
            emb_dim: tunable("emb_dim", constants::EMB_DIM as u64) as usize,
            k_contacts: tunable("k_contacts", constants::K_CONTACTS as u64) as usize,
            k_emails: tunable("k_emails", constants::K_EMAILS as u64) as usize,
            max_tool_iters: tunable("max_tool_iters", constants::MAX_TOOL_ITERS as u64) as u32,
            barge_in_min_chars: tunable(
                "barge_in_min_chars",
                constants::BARGE_IN_MIN_CHARS as u64,
            ) as usize,
            call_idle_timeout: Duration::from_secs(tunable(
                "call_idle_timeout",
                constants::CALL_IDLE_TIMEOUT_SECS,
            )),
            silence_timeout: Duration::from_secs(tunable(
                "silence_timeout",
                constants::SILENCE_TIMEOUT_SECS,
            )),
            model_turn_timeout: Duration::from_secs(tunable(
                "model_turn_timeout",
                constants::MODEL_TURN_TIMEOUT_SECS,
            )),
            tool_call_timeout: Duration::from_secs(tunable(
                "tool_call_timeout",
                constants::TOOL_CALL_TIMEOUT_SECS,
            )),
            shutdown_grace: Duration::from_secs(tunable(
                "shutdown_grace",
                constants::SHUTDOWN_GRACE_SECS,
            )),
            cache_max: tunable("cache_max", constants::CACHE_MAX as u64) as usize,
        })
    }

    /// Build a config suitable for tests: no secrets file, safe in-memory
    /// defaults, no network calls required to construct.
    #[cfg(test)]
    pub fn for_test() -> Self {
        Config {
            telephony_account_sid: None,
            telephony_auth_token: None,
            stt_provider_api_key: None,
            tts_provider_api_key: None,
            tts_premium_api_key: None,
            reasoning_provider: ReasoningProvider::Anthropic,
            reasoning_provider_api_key: Some("test-key".to_string()),
            embedding_provider_api_key: None,
            embedding_base_url: "https://example.test/v1".to_string(),
            embedding_model: "test-embedding-model".to_string(),
            reasoning_base_url: None,
            database_url: None,
            sqlite_path: PathBuf::from(":memory:"),
            public_base_url: "https://example.test".to_string(),
            admin_bind_addr: "127.0.0.1:0".to_string(),
            emb_dim: constants::EMB_DIM,
            k_contacts: constants::K_CONTACTS,
            k_emails: constants::K_EMAILS,
            max_tool_iters: constants::MAX_TOOL_ITERS,
            barge_in_min_chars: constants::BARGE_IN_MIN_CHARS,
            call_idle_timeout: Duration::from_secs(constants::CALL_IDLE_TIMEOUT_SECS),
            silence_timeout: Duration::from_secs(constants::SILENCE_TIMEOUT_SECS),
            model_turn_timeout: Duration::from_secs(constants::MODEL_TURN_TIMEOUT_SECS),
            tool_call_timeout: Duration::from_secs(constants::TOOL_CALL_TIMEOUT_SECS),
            shutdown_grace: Duration::from_secs(constants::SHUTDOWN_GRACE_SECS),
            cache_max: constants::CACHE_MAX,
        }
    }
}

fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".reception")
        .join("config.toml")
}

fn default_sqlite_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".reception")
        .join("reception.sqlite3")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values_match_constants() {
        let cfg = Config::for_test();
        assert_eq!(cfg.emb_dim, constants::EMB_DIM);
        assert_eq!(cfg.k_contacts, constants::K_CONTACTS);
        assert_eq!(cfg.max_tool_iters, constants::MAX_TOOL_ITERS);
    }
}
