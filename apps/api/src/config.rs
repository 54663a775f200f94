use anyhow::{Context, Result};

use crate::training::readiness::ReadinessGate;

const DEFAULT_DATABASE_URL: &str = "sqlite://magicbox.db";
const DEFAULT_LLAMA_API_URL: &str = "https://api.llama.com/v1";

/// Application configuration loaded from environment variables.
/// Startup fails if a required variable is missing or a value does not parse.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub llama_api_key: String,
    pub llama_api_url: String,
    pub llm_timeout_secs: u64,
    pub port: u16,
    pub rust_log: String,
    pub max_upload_bytes: usize,
    pub readiness: ReadinessGate,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let defaults = ReadinessGate::default();
        Ok(Config {
            database_url: optional_env("DATABASE_URL", DEFAULT_DATABASE_URL.to_string())?,
            llama_api_key: require_env("LLAMA_API_KEY")?,
            llama_api_url: optional_env("LLAMA_API_URL", DEFAULT_LLAMA_API_URL.to_string())?,
            llm_timeout_secs: optional_env("LLM_TIMEOUT_SECS", 120)?,
            port: optional_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            max_upload_bytes: optional_env("MAX_UPLOAD_BYTES", 20 * 1024 * 1024)?,
            readiness: ReadinessGate {
                min_documents: optional_env("TRAINING_MIN_DOCUMENTS", defaults.min_documents)?,
                min_approved: optional_env("TRAINING_MIN_APPROVED", defaults.min_approved)?,
                min_confidence: optional_env("TRAINING_MIN_CONFIDENCE", defaults.min_confidence)?,
            },
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

/// Parses `key` when set, otherwise returns `default`.
fn optional_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value: {raw}")),
        Err(_) => Ok(default),
    }
}
