//! End-of-call pipeline: metrics, strict-JSON rubric request, sentinel
//! fallback on parse failure, fire-and-forget persistence.

use std::sync::Arc;

use serde_json::json;
use tracing::warn;

use crate::metrics::conversation::{compute_conversation_metrics, ConversationMetrics};
use crate::metrics::voice::{compute_voice_metrics, VoiceMetrics, VoiceMetricsWeights};
use crate::providers::llm::{system_and_user, LlmClient};
use crate::providers::sink::{SessionRecord, SessionSink};
use crate::session::state::Session;

const REQUIRED_NUMERIC_FIELDS: &[&str] =
    &["overall_score", "objection_handling", "communication_clarity", "confidence"];
const REQUIRED_ARRAY_FIELDS: &[&str] =
    &["strengths", "weaknesses", "missed_opportunities", "actionable_suggestions"];

pub struct EndOfCallOutput {
    pub feedback: serde_json::Value,
    pub feedback_is_error: bool,
    pub conversation_metrics: ConversationMetrics,
    pub voice_metrics: VoiceMetrics,
    pub call_duration_ms: u64,
    pub turn_count: u64,
}

fn sentinel_feedback() -> serde_json::Value {
    json!({
        "error": true,
        "overall_score": 0,
        "strengths": [],
        "weaknesses": ["Feedback could not be generated for this call."],
        "objection_handling": 0,
        "communication_clarity": 0,
        "confidence": 0,
        "missed_opportunities": [],
        "actionable_suggestions": [],
    })
}

fn validate_feedback(value: &serde_json::Value) -> bool {
    let Some(obj) = value.as_object() else { return false };
    for field in REQUIRED_NUMERIC_FIELDS {
        match obj.get(*field).and_then(|v| v.as_f64()) {
            Some(n) if (0.0..=10.0).contains(&n) => {}
            _ => return false,
        }
    }
    for field in REQUIRED_ARRAY_FIELDS {
        if !matches!(obj.get(*field), Some(serde_json::Value::Array(_))) {
            return false;
        }
    }
    true
}

fn rubric_prompt(transcript: &str) -> String {
    format!(
        "Evaluate the following sales training call transcript. Respond with ONLY a JSON \
         object (no markdown, no prose) with exactly these fields: \
         overall_score (number 0-10), strengths (array of strings), weaknesses (array of \
         strings), objection_handling (number 0-10), communication_clarity (number 0-10), \
         confidence (number 0-10), missed_opportunities (array of strings), \
         actionable_suggestions (array of strings).\n\nTranscript:\n{transcript}"
    )
}

fn assemble_transcript(session: &Session) -> String {
    session
        .conversation
        .iter()
        .skip(1)
        .map(|t| format!("{}: {}", t.role.as_str(), t.content))
        .collect::<Vec<_>>()
        .join("\n")
}

pub async fn run_end_of_call_pipeline(
    session: &Session,
    llm: &Arc<dyn LlmClient>,
    sink: &Arc<dyn SessionSink>,
) -> EndOfCallOutput {
    let call_duration_ms = session.now_ms().saturating_sub(session.call_start_ms);
    let turn_count = session.turn_count();

    let conversation_metrics = compute_conversation_metrics(
        &session.conversation,
        &session.turn_timestamps,
        call_duration_ms,
        session.interruption_count,
    );

    let stt_texts: Vec<&str> = session.stt_events.iter().map(|e| e.text.as_str()).collect();
    let stt_confidences: Vec<f64> = session.stt_events.iter().filter_map(|e| e.confidence).collect();
    let voice_metrics = compute_voice_metrics(
        &session.speaking_segments,
        &stt_texts,
        &stt_confidences,
        conversation_metrics.user_word_count,
        &VoiceMetricsWeights::default(),
    );

    let transcript = assemble_transcript(session);
    let (feedback, feedback_is_error) = match llm
        .generate(&system_and_user(
            "You are a strict JSON-only sales coaching evaluator.",
            rubric_prompt(&transcript),
        ))
        .await
    {
        Ok(raw) => match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(value) if validate_feedback(&value) => (value, false),
            Ok(_) => {
                warn!("end-of-call rubric missing required fields");
                (sentinel_feedback(), true)
            }
            Err(e) => {
                warn!("end-of-call rubric was not valid JSON: {e}");
                (sentinel_feedback(), true)
            }
        },
        Err(e) => {
            warn!("end-of-call rubric LLM call failed: {e}");
            (sentinel_feedback(), true)
        }
    };

    let record = SessionRecord {
        session_id: session.session_id,
        recorded_at: chrono::Utc::now(),
        user_id: session.user_id.clone(),
        scenario_id: session.scenario.as_str(),
        difficulty: session.difficulty.as_str(),
        call_duration_ms,
        turn_count,
        interruption_count: session.interruption_count,
        feedback: feedback.clone(),
        conversation_metrics: serde_json::to_value(&conversation_metrics).unwrap_or(serde_json::Value::Null),
        audio_metrics: serde_json::to_value(&voice_metrics).unwrap_or(serde_json::Value::Null),
    };
    let sink = Arc::clone(sink);
    tokio::spawn(async move {
        if let Err(e) = sink.save_session(record).await {
            warn!("session persistence failed: {e}");
        }
    });

    EndOfCallOutput {
        feedback,
        feedback_is_error,
        conversation_metrics,
        voice_metrics,
        call_duration_ms,
        turn_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_is_rejected_by_its_own_validator_shape() {
        // The sentinel's numeric fields are valid-shaped; only `error` marks it.
        let sentinel = sentinel_feedback();
        assert!(validate_feedback(&sentinel));
        assert_eq!(sentinel["error"], serde_json::Value::Bool(true));
    }

    #[test]
    fn missing_field_fails_validation() {
        let value = json!({"overall_score": 5});
        assert!(!validate_feedback(&value));
    }

    #[test]
    fn out_of_range_score_fails_validation() {
        let value = json!({
            "overall_score": 11, "objection_handling": 5, "communication_clarity": 5,
            "confidence": 5, "strengths": [], "weaknesses": [],
            "missed_opportunities": [], "actionable_suggestions": []
        });
        assert!(!validate_feedback(&value));
    }

    #[test]
    fn well_formed_feedback_passes_validation() {
        let value = json!({
            "overall_score": 7.5, "objection_handling": 6, "communication_clarity": 8,
            "confidence": 7, "strengths": ["clear pitch"], "weaknesses": [],
            "missed_opportunities": [], "actionable_suggestions": ["ask more questions"]
        });
        assert!(validate_feedback(&value));
    }
}
