//! Wire codec: typed JSON framing with base64 PCM16 payloads.
//!
//! Tagged `ClientMessage`/`ServerMessage` enums carrying the gateway's own
//! wire contract. Decoding never panics: a malformed frame becomes a
//! `CoreError::MalformedFrame` that the Dispatcher logs and drops.

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "auth")]
    Auth { token: String },
    #[serde(rename = "scenario.select")]
    ScenarioSelect { #[serde(rename = "scenarioId")] scenario_id: String },
    #[serde(rename = "difficulty.mode")]
    DifficultyMode { enabled: bool },
    #[serde(rename = "user.audio.start")]
    UserAudioStart { #[serde(rename = "sampleRate")] sample_rate: u32 },
    #[serde(rename = "user.audio.chunk")]
    UserAudioChunk { payload: String },
    #[serde(rename = "user.audio.end")]
    UserAudioEnd,
    #[serde(rename = "user.interrupt")]
    UserInterrupt,
    #[serde(rename = "call.end")]
    CallEnd,
    #[serde(rename = "call.reset")]
    CallReset,
    #[serde(rename = "pong")]
    Pong { timestamp: Option<u64> },
}

impl ClientMessage {
    /// Parses one inbound JSON text frame. Any deserialization failure
    /// (unknown `type`, missing fields, invalid JSON) collapses to a single
    /// `MalformedFrame` error -- the codec never panics.
    pub fn decode(raw: &str) -> Result<Self, CoreError> {
        serde_json::from_str(raw).map_err(|e| CoreError::MalformedFrame(e.to_string()))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "agent_connected")]
    AgentConnected,
    #[serde(rename = "ping")]
    Ping { timestamp: u64 },
    #[serde(rename = "difficulty.assigned")]
    DifficultyAssigned {
        level: &'static str,
        averages: DifficultyAverages,
        #[serde(rename = "autoEnabled")]
        auto_enabled: bool,
    },
    #[serde(rename = "stt.partial")]
    SttPartial { text: String },
    #[serde(rename = "stt.final")]
    SttFinal { text: String },
    #[serde(rename = "agent.text")]
    AgentText { text: String },
    #[serde(rename = "coach.hint")]
    CoachHint { text: String },
    #[serde(rename = "agent.audio.start")]
    AgentAudioStart,
    #[serde(rename = "agent.audio.chunk")]
    AgentAudioChunk {
        payload: String,
        format: &'static str,
        #[serde(rename = "sampleRate")]
        sample_rate: u32,
    },
    #[serde(rename = "agent.audio.end")]
    AgentAudioEnd,
    #[serde(rename = "agent.interrupt")]
    AgentInterrupt,
    #[serde(rename = "call.feedback")]
    CallFeedback {
        payload: serde_json::Value,
        #[serde(rename = "conversationMetrics")]
        conversation_metrics: serde_json::Value,
        #[serde(rename = "audioMetrics")]
        audio_metrics: serde_json::Value,
        #[serde(rename = "callDurationMs")]
        call_duration_ms: u64,
        #[serde(rename = "turnCount")]
        turn_count: u64,
    },
    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerMessage {
    pub fn encode(&self) -> String {
        // Every variant here is constructed from types that always
        // serialize cleanly; a failure would be a programming error.
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"type":"error","message":"internal encode failure: {e}"}}"#)
        })
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DifficultyAverages {
    pub overall_score: Option<f64>,
    pub sample_count: usize,
}

/// Decodes a base64 string into raw PCM16 LE bytes.
pub fn decode_pcm16_base64(payload: &str) -> Result<Vec<u8>, CoreError> {
    base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| CoreError::MalformedFrame(format!("invalid base64 audio payload: {e}")))
}

/// Encodes raw PCM16 LE bytes into the base64 string used on the wire.
pub fn encode_pcm16_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm16_base64_round_trips() {
        let original: Vec<u8> = (0..640u32).map(|b| (b % 256) as u8).collect();
        let encoded = encode_pcm16_base64(&original);
        let decoded = decode_pcm16_base64(&encoded).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn malformed_json_is_a_malformed_frame_error() {
        let err = ClientMessage::decode("{not json").unwrap_err();
        assert!(matches!(err, CoreError::MalformedFrame(_)));
    }

    #[test]
    fn unknown_type_is_a_malformed_frame_error() {
        let err = ClientMessage::decode(r#"{"type":"not.a.real.type"}"#).unwrap_err();
        assert!(matches!(err, CoreError::MalformedFrame(_)));
    }

    #[test]
    fn decodes_known_client_message_kinds() {
        let msg = ClientMessage::decode(r#"{"type":"auth","token":"abc"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Auth { token } if token == "abc"));

        let msg = ClientMessage::decode(r#"{"type":"user.audio.start","sampleRate":16000}"#)
            .unwrap();
        assert!(matches!(msg, ClientMessage::UserAudioStart { sample_rate: 16000 }));
    }

    #[test]
    fn server_message_uses_dotted_wire_type() {
        let json = ServerMessage::AgentAudioEnd.encode();
        assert!(json.contains(r#""type":"agent.audio.end""#));
    }

    #[test]
    fn invalid_base64_is_malformed_frame() {
        let err = decode_pcm16_base64("not-base64!!").unwrap_err();
        assert!(matches!(err, CoreError::MalformedFrame(_)));
    }
}
