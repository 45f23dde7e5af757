//! ============================================================================
//! Settings - Environment-driven configuration
//! ============================================================================
//! Every knob comes from an environment variable (a `.env` file is honored by
//! the binaries via dotenvy). All values except the API key have defaults
//! suitable for local hackathon use.
//! ============================================================================

use anyhow::{anyhow, Result};
use std::path::PathBuf;
use std::str::FromStr;

/// Runtime configuration for the coach backend
#[derive(Debug, Clone)]
pub struct Settings {
    /// API key for the OpenAI-compatible endpoint (chat + embeddings)
    pub openai_api_key: String,
    /// Base URL of the OpenAI-compatible endpoint
    pub openai_base_url: String,
    /// Chat completion model
    pub openai_model: String,
    /// Embedding model (1536 dimensions)
    pub embedding_model: String,
    /// Chunk size in characters
    pub chunk_size: usize,
    /// Chunk overlap in characters
    pub chunk_overlap: usize,
    /// Primary knowledge-base directory
    pub kb_directory: PathBuf,
    /// Secondary documents directory (used when the KB is empty)
    pub documents_directory: PathBuf,
    /// Qdrant endpoint for the vector store
    pub qdrant_url: String,
    /// Bind address for the HTTP server
    pub service_host: String,
    /// Bind port for the HTTP server
    pub service_port: u16,
    /// Conversation history database path (None = default under home)
    pub history_db_path: Option<String>,
    /// Medical guardrail toggle
    pub enable_medical_guardrails: bool,
    /// Risk score at which the assistant must recommend seeing a doctor
    pub high_risk_threshold: f32,
    /// Risk score treated as critical
    pub critical_risk_threshold: f32,
}

impl Settings {
    /// Load settings from the environment.
    /// Fails fast when `OPENAI_API_KEY` is missing or a value cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let openai_api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                anyhow!("OPENAI_API_KEY is not set. Configure it in the environment or a .env file.")
            })?;

        Ok(Self {
            openai_api_key,
            openai_base_url: env_or("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            openai_model: env_or("OPENAI_MODEL", "gpt-3.5-turbo-0125"),
            embedding_model: env_or("EMBEDDING_MODEL", "text-embedding-ada-002"),
            chunk_size: env_parse("CHUNK_SIZE", 1000)?,
            chunk_overlap: env_parse("CHUNK_OVERLAP", 200)?,
            kb_directory: PathBuf::from(env_or("KB_DIRECTORY", "./kb")),
            documents_directory: PathBuf::from(env_or("DOCUMENTS_DIRECTORY", "./documents")),
            qdrant_url: env_or("QDRANT_URL", "http://localhost:6334"),
            service_host: env_or("SERVICE_HOST", "0.0.0.0"),
            service_port: env_parse("SERVICE_PORT", 8000)?,
            history_db_path: std::env::var("COACH_DB_PATH").ok().filter(|p| !p.is_empty()),
            enable_medical_guardrails: env_parse("ENABLE_MEDICAL_GUARDRAILS", true)?,
            high_risk_threshold: env_parse("HIGH_RISK_THRESHOLD", 0.6)?,
            critical_risk_threshold: env_parse("CRITICAL_RISK_THRESHOLD", 0.8)?,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).ok().filter(|v| !v.is_empty()).unwrap_or_else(|| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.is_empty() => raw
            .parse()
            .map_err(|e| anyhow!("Invalid value for {}: {}", key, e)),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_or_default() {
        assert_eq!(env_or("COACH_TEST_UNSET_VAR", "fallback"), "fallback");
    }

    #[test]
    fn test_env_parse_default() {
        let port: u16 = env_parse("COACH_TEST_UNSET_PORT", 8000).unwrap();
        assert_eq!(port, 8000);
    }

    #[test]
    fn test_env_parse_invalid() {
        std::env::set_var("COACH_TEST_BAD_PORT", "not-a-number");
        let result: Result<u16> = env_parse("COACH_TEST_BAD_PORT", 8000);
        assert!(result.is_err());
        std::env::remove_var("COACH_TEST_BAD_PORT");
    }
}
