//! LLM client: synchronous chat-completion request/reply with a timeout.
//!
//! POST the dialogue with a Bearer token, parse the body as a raw
//! `serde_json::Value` and navigate `choices[0].message.content`,
//! accepting either a plain string or an array of content parts. The
//! mandatory 10 s timeout wraps the call with `tokio::time::timeout`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::config::Config;
use crate::error::CoreError;
use crate::types::{Role, Turn};

const TEMPERATURE: f64 = 0.7;

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, conversation: &[Turn]) -> Result<String, CoreError>;
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    stream: bool,
}

pub struct HttpLlmClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    provider_header: String,
    timeout: Duration,
}

impl HttpLlmClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            base_url: config.llm_base_url.clone(),
            api_key: config.llm_api_key.clone(),
            model: config.llm_model.clone(),
            provider_header: config.llm_provider.clone(),
            timeout: config.llm_timeout(),
        }
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn generate(&self, conversation: &[Turn]) -> Result<String, CoreError> {
        let messages = conversation
            .iter()
            .map(|t| ChatMessage { role: t.role.as_str(), content: &t.content })
            .collect();
        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: TEMPERATURE,
            stream: false,
        };

        let call = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("LLM-Provider", &self.provider_header)
            .json(&request)
            .send();

        let response = tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| CoreError::Timeout(self.timeout))?
            .map_err(|e| CoreError::ProviderUnavailable(format!("LLM request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(CoreError::ProviderUnavailable(format!("LLM API error ({status})")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| CoreError::ProviderUnavailable(format!("failed to read LLM body: {e}")))?;

        let raw: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| CoreError::ProviderUnavailable(format!("invalid LLM response JSON: {e}")))?;

        let content_value = raw
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|arr| arr.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|msg| msg.get("content"));

        let content = match content_value {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Array(parts)) => parts
                .iter()
                .filter_map(|part| {
                    if part.get("type").and_then(|t| t.as_str()) == Some("text") {
                        part.get("text").and_then(|t| t.as_str()).map(str::to_string)
                    } else {
                        None
                    }
                })
                .collect::<Vec<_>>()
                .join(""),
            _ => String::new(),
        };

        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(CoreError::ProviderUnavailable("LLM returned empty content".into()));
        }
        Ok(trimmed.to_string())
    }
}

/// Convenience for building the single-message transcript prompt used by
/// coach hints and the end-of-call rubric request without an assistant
/// reply turn yet appended.
pub fn system_and_user(system: impl Into<String>, user: impl Into<String>) -> Vec<Turn> {
    vec![Turn { role: Role::System, content: system.into() }, Turn::user(user)]
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedLlm(String);

    #[async_trait]
    impl LlmClient for FixedLlm {
        async fn generate(&self, _conversation: &[Turn]) -> Result<String, CoreError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn stub_client_returns_fixed_reply() {
        let client = FixedLlm("Our budget is tight.".into());
        let reply = client.generate(&[Turn::system("x")]).await.unwrap();
        assert_eq!(reply, "Our budget is tight.");
    }
}
