//! Process configuration, loaded from environment variables.
//!
//! A struct with `#[serde(default = "fn")]` fields and free-function
//! defaults, env-var-backed since this service is configured the way a
//! hosted gateway process is: through its environment.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

fn default_port() -> u16 {
    3001
}
fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_llm_provider() -> String {
    "openai".to_string()
}
fn default_llm_timeout_ms() -> u64 {
    10_000
}
fn default_tts_base_url() -> String {
    "https://api.deepgram.com/v1".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,

    /// API key for the STT provider (Deepgram-like streaming service).
    pub deepgram_api_key: String,

    /// API key for the LLM provider.
    pub llm_api_key: String,

    #[serde(default = "default_llm_model")]
    pub llm_model: String,

    #[serde(default = "default_llm_base_url")]
    pub llm_base_url: String,

    /// Sent as a custom header on outbound LLM requests. Whether the
    /// downstream provider honors it is unspecified; the core does not
    /// depend on it being respected.
    #[serde(default = "default_llm_provider")]
    pub llm_provider: String,

    #[serde(default = "default_llm_timeout_ms")]
    pub llm_timeout_ms: u64,

    #[serde(default = "default_tts_base_url")]
    pub tts_base_url: String,

    /// Secret used to verify the `auth{token}` frame's JWT. The rest of
    /// the authentication backend (login, session registry) is an
    /// external collaborator; only verification lives here.
    pub jwt_secret: String,
}

impl Config {
    /// Loads configuration from the process environment. `DEEPGRAM_API_KEY`
    /// and `LLM_API_KEY` are required; everything else falls back to its
    /// default.
    pub fn from_env() -> Result<Self> {
        let port = match std::env::var("PORT") {
            Ok(v) => v.parse().context("PORT must be a valid u16")?,
            Err(_) => default_port(),
        };
        let deepgram_api_key = std::env::var("DEEPGRAM_API_KEY")
            .context("DEEPGRAM_API_KEY must be set")?;
        let llm_api_key = std::env::var("LLM_API_KEY").context("LLM_API_KEY must be set")?;
        let llm_model = std::env::var("LLM_MODEL").unwrap_or_else(|_| default_llm_model());
        let llm_base_url =
            std::env::var("LLM_BASE_URL").unwrap_or_else(|_| default_llm_base_url());
        let llm_provider =
            std::env::var("LLM_PROVIDER").unwrap_or_else(|_| default_llm_provider());
        let llm_timeout_ms = match std::env::var("LLM_TIMEOUT_MS") {
            Ok(v) => v.parse().context("LLM_TIMEOUT_MS must be a valid u64")?,
            Err(_) => default_llm_timeout_ms(),
        };
        let tts_base_url = std::env::var("TTS_BASE_URL").unwrap_or_else(|_| default_tts_base_url());
        let jwt_secret = std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?;

        Ok(Self {
            port,
            deepgram_api_key,
            llm_api_key,
            llm_model,
            llm_base_url,
            llm_provider,
            llm_timeout_ms,
            tts_base_url,
            jwt_secret,
        })
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_millis(self.llm_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_values() {
        assert_eq!(default_port(), 3001);
        assert_eq!(default_llm_timeout_ms(), 10_000);
    }
}
