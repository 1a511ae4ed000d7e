//! TTS client: synchronous speech synthesis returning raw PCM16 bytes.
//!
//! Same request-building and status-check shape as the LLM client
//! (`providers::llm`), adapted for a binary response body instead of a
//! JSON one.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::config::Config;
use crate::error::CoreError;

const SAMPLE_RATE: u32 = 16_000;

#[async_trait]
pub trait TtsClient: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, CoreError>;
}

#[derive(Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
    encoding: &'a str,
    sample_rate: u32,
    channels: u8,
    container: &'a str,
}

pub struct HttpTtsClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpTtsClient {
    pub fn new(config: &Config, base_url: impl Into<String>) -> Self {
        Self { client: Client::new(), base_url: base_url.into(), api_key: config.llm_api_key.clone() }
    }
}

#[async_trait]
impl TtsClient for HttpTtsClient {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, CoreError> {
        let request = SynthesizeRequest {
            text,
            encoding: "linear16",
            sample_rate: SAMPLE_RATE,
            channels: 1,
            container: "none",
        };

        let response = self
            .client
            .post(format!("{}/speak", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| CoreError::ProviderUnavailable(format!("TTS request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(CoreError::ProviderUnavailable(format!("TTS API error ({status})")));
        }

        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| CoreError::ProviderUnavailable(format!("failed to read TTS body: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedTts(Vec<u8>);

    #[async_trait]
    impl TtsClient for FixedTts {
        async fn synthesize(&self, _text: &str) -> Result<Vec<u8>, CoreError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn stub_client_returns_fixed_bytes() {
        let client = FixedTts(vec![1, 2, 3, 4]);
        let bytes = client.synthesize("hello").await.unwrap();
        assert_eq!(bytes, vec![1, 2, 3, 4]);
    }
}
