//! Session persister: fire-and-forget write on call end. Persistence of
//! completed sessions is an external collaborator -- the core only needs
//! the narrow `save_session` interface and must never let a failure
//! surface to the client.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::CoreError;

#[derive(Debug, Clone, Serialize)]
pub struct SessionRecord {
    pub session_id: Uuid,
    /// Wall-clock time the record was written. `Session` itself only
    /// tracks monotonic offsets, so this is stamped at persistence time
    /// rather than carried from `Session`.
    pub recorded_at: DateTime<Utc>,
    pub user_id: Option<String>,
    pub scenario_id: &'static str,
    pub difficulty: &'static str,
    pub call_duration_ms: u64,
    pub turn_count: u64,
    pub interruption_count: u32,
    pub feedback: serde_json::Value,
    pub conversation_metrics: serde_json::Value,
    pub audio_metrics: serde_json::Value,
}

#[async_trait]
pub trait SessionSink: Send + Sync {
    async fn save_session(&self, record: SessionRecord) -> Result<(), CoreError>;
}

/// A sink that drops every record. Useful where no persistence backend has
/// been wired in; persistence is always best-effort and asynchronous.
pub struct NullSessionSink;

#[async_trait]
impl SessionSink for NullSessionSink {
    async fn save_session(&self, _record: SessionRecord) -> Result<(), CoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_sink_never_fails() {
        let record = SessionRecord {
            session_id: Uuid::new_v4(),
            recorded_at: Utc::now(),
            user_id: None,
            scenario_id: "price_sensitive_small_business",
            difficulty: "Intermediate",
            call_duration_ms: 0,
            turn_count: 0,
            interruption_count: 0,
            feedback: serde_json::Value::Null,
            conversation_metrics: serde_json::Value::Null,
            audio_metrics: serde_json::Value::Null,
        };
        assert!(NullSessionSink.save_session(record).await.is_ok());
    }
}
