//! Dispatcher: the Session's owning task. Consumes typed client messages
//! and routes them to the subordinate components (aggregator, turn queue,
//! TTS streamer, difficulty selector, end-of-call pipeline).
//!
//! One task owns the connection: a dedicated writer task fed by an
//! `mpsc::Sender<ServerMessage>` fans out every outbound frame, a
//! dedicated reader task parses inbound frames, and the owning task's
//! `tokio::select!` loop directly awaits LLM/TTS completion as one of its
//! suspension points. Only the TTS frame-send loop runs as a separate
//! task, because that is the one place inbound `user.interrupt`/`call.end`
//! frames must keep being processed while frames are still going out.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant as TokioInstant;
use tracing::{info, warn};

use crate::codec::{decode_pcm16_base64, ClientMessage, DifficultyAverages, ServerMessage};
use crate::error::CoreError;
use crate::providers::auth::AuthVerifier;
use crate::providers::history::HistoryReader;
use crate::providers::llm::{system_and_user, LlmClient};
use crate::providers::sink::SessionSink;
use crate::providers::stt::{SttClient, SttEvent, SttStream};
use crate::providers::tts::TtsClient;
use crate::session::aggregator::Aggregator;
use crate::session::difficulty::select_difficulty;
use crate::session::end_of_call::run_end_of_call_pipeline;
use crate::session::state::{AgentAudioState, Lifecycle, MicState, Session};
use crate::session::tts_stream::{spawn_tts_streamer, TtsOutcome};
use crate::types::{ScenarioId, SpeakingSegment, SttFinalEvent};

const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(5000);
const COACH_HINT_COOLDOWN_MS: u64 = 20_000;

/// The external collaborators the core consumes through narrow
/// interfaces; immutable handles shared (via `Arc`) across every Session.
#[derive(Clone)]
pub struct Providers {
    pub auth: Arc<dyn AuthVerifier>,
    pub stt: Arc<dyn SttClient>,
    pub llm: Arc<dyn LlmClient>,
    pub tts: Arc<dyn TtsClient>,
    pub sink: Arc<dyn SessionSink>,
    pub history: Arc<dyn HistoryReader>,
}

enum TurnStepOutcome {
    TtsStarted(oneshot::Receiver<TtsOutcome>),
    Done,
}

pub async fn run_session(socket: WebSocket, providers: Providers) {
    let (mut ws_sink, ws_stream) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerMessage>(128);
    tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            if ws_sink.send(Message::Text(msg.encode().into())).await.is_err() {
                break;
            }
        }
    });

    let (client_tx, mut client_rx) = mpsc::channel::<ClientMessage>(128);
    tokio::spawn(reader_task(ws_stream, client_tx));

    let mut session = Session::new();
    info!(session_id = %session.session_id, "session connected");
    let _ = outbound_tx.send(ServerMessage::AgentConnected).await;

    let mut aggregator = Aggregator::new();
    let mut stt_stream: Option<Box<dyn SttStream>> = None;
    let mut stt_event_rx: Option<mpsc::Receiver<SttEvent>> = None;
    let mut tts_done_rx: Option<oneshot::Receiver<TtsOutcome>> = None;
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);

    loop {
        let fallback_deadline = aggregator.deadline();
        tokio::select! {
            maybe_msg = client_rx.recv() => {
                match maybe_msg {
                    Some(msg) => handle_client_message(
                        msg, &mut session, &providers, &outbound_tx, &mut aggregator,
                        &mut stt_stream, &mut stt_event_rx, &mut tts_done_rx,
                    ).await,
                    None => break,
                }
            }
            ev = recv_mpsc_opt(&mut stt_event_rx) => {
                if let Some(ev) = ev {
                    handle_stt_event(ev, &mut session, &mut aggregator, &providers, &outbound_tx, &mut tts_done_rx).await;
                }
            }
            outcome = recv_oneshot_opt(&mut tts_done_rx) => {
                if let Some(_outcome) = outcome {
                    tts_done_rx = None;
                    session.agent_audio_state = AgentAudioState::Silent;
                    session.llm_in_flight = false;
                    if let Some(next) = session.pending_transcript.take() {
                        session.llm_in_flight = true;
                        run_turn_queue(&mut session, &providers, &outbound_tx, &mut tts_done_rx, next).await;
                    }
                }
            }
            _ = sleep_until_opt(fallback_deadline) => {
                if session.mic_state == MicState::Idle {
                    if let Some(text) = aggregator.flush() {
                        enqueue_or_dispatch(&mut session, text, &providers, &outbound_tx, &mut tts_done_rx).await;
                    }
                }
            }
            _ = heartbeat.tick() => {
                let ts = session.now_ms();
                let _ = outbound_tx.send(ServerMessage::Ping { timestamp: ts }).await;
            }
        }

        if session.lifecycle == Lifecycle::Ended {
            // call.end has already run the end-of-call pipeline; nothing
            // else to do besides let the transport close drive the loop
            // out via client_rx.recv() returning None.
        }
    }
}

async fn reader_task(mut stream: futures_util::stream::SplitStream<WebSocket>, tx: mpsc::Sender<ClientMessage>) {
    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => match ClientMessage::decode(text.as_str()) {
                Ok(parsed) => {
                    if tx.send(parsed).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!("dropping malformed client frame: {e}"),
            },
            Ok(Message::Close(_)) => break,
            Err(e) => {
                warn!("websocket read error: {e}");
                break;
            }
            _ => {}
        }
    }
}

async fn recv_mpsc_opt<T>(rx: &mut Option<mpsc::Receiver<T>>) -> Option<T> {
    match rx {
        Some(r) => r.recv().await,
        None => std::future::pending().await,
    }
}

async fn recv_oneshot_opt<T>(rx: &mut Option<oneshot::Receiver<T>>) -> Option<T> {
    match rx {
        Some(r) => r.await.ok(),
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<TokioInstant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending().await,
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_client_message(
    msg: ClientMessage,
    session: &mut Session,
    providers: &Providers,
    outbound_tx: &mpsc::Sender<ServerMessage>,
    aggregator: &mut Aggregator,
    stt_stream: &mut Option<Box<dyn SttStream>>,
    stt_event_rx: &mut Option<mpsc::Receiver<SttEvent>>,
    tts_done_rx: &mut Option<oneshot::Receiver<TtsOutcome>>,
) {
    match msg {
        ClientMessage::Auth { token } => match providers.auth.verify_token(&token).await {
            Ok(user_id) => session.user_id = Some(user_id),
            Err(e) => warn!("auth rejected: {e}"),
        },
        ClientMessage::ScenarioSelect { scenario_id } => match ScenarioId::parse(&scenario_id) {
            Some(id) => session.select_scenario(id),
            None => warn!("unknown scenario id: {scenario_id}"),
        },
        ClientMessage::DifficultyMode { enabled } => {
            session.auto_difficulty = enabled;
            if !session.scenario_locked {
                let recent = fetch_recent_scores(session, providers).await;
                let resolution = select_difficulty(session.auto_difficulty, &recent);
                let _ = outbound_tx
                    .send(ServerMessage::DifficultyAssigned {
                        level: resolution.level.as_str(),
                        averages: DifficultyAverages {
                            overall_score: resolution.average_overall_score,
                            sample_count: resolution.sample_count,
                        },
                        auto_enabled: session.auto_difficulty,
                    })
                    .await;
            } else {
                let _ = outbound_tx
                    .send(ServerMessage::DifficultyAssigned {
                        level: session.difficulty.as_str(),
                        averages: DifficultyAverages::default(),
                        auto_enabled: session.auto_difficulty,
                    })
                    .await;
            }
        }
        ClientMessage::UserAudioStart { sample_rate } => {
            handle_audio_start(session, providers, sample_rate, outbound_tx, stt_stream, stt_event_rx).await;
        }
        ClientMessage::UserAudioChunk { payload } => {
            handle_audio_chunk(session, &payload, stt_stream).await;
        }
        ClientMessage::UserAudioEnd => {
            handle_audio_end(session, aggregator, stt_stream, stt_event_rx, providers, outbound_tx, tts_done_rx).await;
        }
        ClientMessage::UserInterrupt => {
            if session.record_interrupt() {
                let _ = outbound_tx.send(ServerMessage::AgentInterrupt).await;
            }
        }
        ClientMessage::CallEnd => {
            handle_call_end(session, providers, outbound_tx, stt_stream, stt_event_rx, tts_done_rx).await;
        }
        ClientMessage::CallReset => {
            // Halt any TTS streamer still running under the outgoing
            // Session's atomics before they're replaced by fresh ones --
            // otherwise a mid-stream task would keep emitting frames
            // against atomics nobody is watching anymore.
            session.call_ended.store(true, Ordering::SeqCst);
            session.reset_for_call();
            *aggregator = Aggregator::new();
            *stt_stream = None;
            *stt_event_rx = None;
            *tts_done_rx = None;
        }
        ClientMessage::Pong { timestamp } => {
            if let Some(ts) = timestamp {
                let rtt = session.now_ms().saturating_sub(ts);
                tracing::debug!("heartbeat rtt_ms={rtt}");
            }
        }
    }
}

async fn fetch_recent_scores(session: &Session, providers: &Providers) -> Vec<f64> {
    match &session.user_id {
        Some(uid) => providers.history.recent_feedback(uid, 10).await.unwrap_or_default(),
        None => Vec::new(),
    }
}

async fn handle_audio_start(
    session: &mut Session,
    providers: &Providers,
    sample_rate: u32,
    outbound_tx: &mpsc::Sender<ServerMessage>,
    stt_stream: &mut Option<Box<dyn SttStream>>,
    stt_event_rx: &mut Option<mpsc::Receiver<SttEvent>>,
) {
    session.audio_start_count += 1;
    if !session.scenario_locked {
        let recent = fetch_recent_scores(session, providers).await;
        let resolution = select_difficulty(session.auto_difficulty, &recent);
        session.difficulty = resolution.level;
        session.lock_scenario(resolution.modifier);
        let _ = outbound_tx
            .send(ServerMessage::DifficultyAssigned {
                level: resolution.level.as_str(),
                averages: DifficultyAverages {
                    overall_score: resolution.average_overall_score,
                    sample_count: resolution.sample_count,
                },
                auto_enabled: session.auto_difficulty,
            })
            .await;
    }

    session.mic_state = MicState::Capturing;
    session.speaking_segments.push(SpeakingSegment {
        start_ms: session.now_ms(),
        end_ms: None,
        samples: 0,
        sample_rate,
    });

    match providers.stt.open_stream(sample_rate).await {
        Ok((handle, rx)) => {
            *stt_stream = Some(handle);
            *stt_event_rx = Some(rx);
        }
        Err(e) => {
            let _ = outbound_tx.send(ServerMessage::Error { message: e.client_message() }).await;
        }
    }
}

async fn handle_audio_chunk(session: &mut Session, payload: &str, stt_stream: &mut Option<Box<dyn SttStream>>) {
    match decode_pcm16_base64(payload) {
        Ok(bytes) => {
            if let Some(segment) = session.speaking_segments.last_mut() {
                segment.samples += (bytes.len() / 2) as u64;
            }
            if let Some(stream) = stt_stream.as_mut() {
                if let Err(e) = stream.send_audio(&bytes).await {
                    warn!("failed forwarding audio to STT: {e}");
                }
            }
        }
        Err(e) => warn!("dropping malformed audio chunk: {e}"),
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_audio_end(
    session: &mut Session,
    aggregator: &mut Aggregator,
    stt_stream: &mut Option<Box<dyn SttStream>>,
    stt_event_rx: &mut Option<mpsc::Receiver<SttEvent>>,
    providers: &Providers,
    outbound_tx: &mpsc::Sender<ServerMessage>,
    tts_done_rx: &mut Option<oneshot::Receiver<TtsOutcome>>,
) {
    if let Some(stream) = stt_stream.as_mut() {
        stream.close().await;
    }
    *stt_stream = None;
    *stt_event_rx = None;

    if let Some(segment) = session.speaking_segments.last_mut() {
        segment.end_ms = Some(session.now_ms());
    }
    session.mic_state = MicState::Idle;

    if let Some(text) = aggregator.flush() {
        enqueue_or_dispatch(session, text, providers, outbound_tx, tts_done_rx).await;
    }
}

async fn handle_stt_event(
    event: SttEvent,
    session: &mut Session,
    aggregator: &mut Aggregator,
    providers: &Providers,
    outbound_tx: &mpsc::Sender<ServerMessage>,
    tts_done_rx: &mut Option<oneshot::Receiver<TtsOutcome>>,
) {
    match event {
        SttEvent::Partial { text } => {
            let _ = outbound_tx.send(ServerMessage::SttPartial { text }).await;
        }
        SttEvent::Final { text, confidence } => {
            let _ = outbound_tx.send(ServerMessage::SttFinal { text: text.clone() }).await;
            session
                .stt_events
                .push(SttFinalEvent { text: text.clone(), monotonic_ms: session.now_ms(), confidence });
            aggregator.on_final(&text);
        }
        SttEvent::UtteranceEnd => {
            if let Some(text) = aggregator.flush() {
                enqueue_or_dispatch(session, text, providers, outbound_tx, tts_done_rx).await;
            }
        }
    }
}

async fn enqueue_or_dispatch(
    session: &mut Session,
    text: String,
    providers: &Providers,
    outbound_tx: &mpsc::Sender<ServerMessage>,
    tts_done_rx: &mut Option<oneshot::Receiver<TtsOutcome>>,
) {
    if session.lifecycle == Lifecycle::Ended {
        return;
    }
    if session.llm_in_flight {
        match &mut session.pending_transcript {
            Some(pending) => {
                pending.push(' ');
                pending.push_str(&text);
            }
            None => session.pending_transcript = Some(text),
        }
        return;
    }
    session.llm_in_flight = true;
    run_turn_queue(session, providers, outbound_tx, tts_done_rx, text).await;
}

async fn run_turn_queue(
    session: &mut Session,
    providers: &Providers,
    outbound_tx: &mpsc::Sender<ServerMessage>,
    tts_done_rx: &mut Option<oneshot::Receiver<TtsOutcome>>,
    mut text: String,
) {
    loop {
        match process_one_turn(session, &text, providers, outbound_tx).await {
            TurnStepOutcome::TtsStarted(rx) => {
                *tts_done_rx = Some(rx);
                return;
            }
            TurnStepOutcome::Done => match session.pending_transcript.take() {
                Some(next) => text = next,
                None => {
                    session.llm_in_flight = false;
                    return;
                }
            },
        }
    }
}

async fn process_one_turn(
    session: &mut Session,
    text: &str,
    providers: &Providers,
    outbound_tx: &mpsc::Sender<ServerMessage>,
) -> TurnStepOutcome {
    session.append_user_turn(text);
    session.coach_hint_sent_for_turn = false;
    maybe_send_coach_hint(session, text, providers, outbound_tx);

    if session.lifecycle == Lifecycle::Ended {
        return TurnStepOutcome::Done;
    }

    let reply = match providers.llm.generate(&session.conversation).await {
        Ok(r) => r,
        Err(e) => {
            warn!("LLM turn failed: {e}");
            let _ = outbound_tx
                .send(ServerMessage::AgentText {
                    text: "The customer is temporarily unavailable. Please try again.".into(),
                })
                .await;
            return TurnStepOutcome::Done;
        }
    };

    if session.lifecycle == Lifecycle::Ended {
        return TurnStepOutcome::Done;
    }

    let reply = {
        let trimmed = reply.trim();
        if trimmed.is_empty() { "...".to_string() } else { trimmed.to_string() }
    };
    session.append_assistant_turn(&reply);
    let _ = outbound_tx.send(ServerMessage::AgentText { text: reply.clone() }).await;

    if session.lifecycle == Lifecycle::Ended {
        return TurnStepOutcome::Done;
    }

    match providers.tts.synthesize(&reply).await {
        Ok(pcm) => {
            session.agent_audio_state = AgentAudioState::Speaking;
            let my_epoch = session.begin_tts_epoch();
            let rx = spawn_tts_streamer(
                pcm,
                my_epoch,
                Arc::clone(&session.tts_epoch),
                Arc::clone(&session.call_ended),
                Arc::clone(&session.interrupt_notified),
                outbound_tx.clone(),
            );
            TurnStepOutcome::TtsStarted(rx)
        }
        Err(e) => {
            warn!("TTS synth failed: {e}");
            let _ = outbound_tx.send(ServerMessage::Error { message: e.client_message() }).await;
            TurnStepOutcome::Done
        }
    }
}

fn maybe_send_coach_hint(
    session: &mut Session,
    user_text: &str,
    providers: &Providers,
    outbound_tx: &mpsc::Sender<ServerMessage>,
) {
    let now = session.now_ms();
    let allowed = !session.coach_hint_sent_for_turn
        && session.last_coach_hint_ms.map_or(true, |t| now.saturating_sub(t) >= COACH_HINT_COOLDOWN_MS);
    if !allowed {
        return;
    }
    session.coach_hint_sent_for_turn = true;
    session.last_coach_hint_ms = Some(now);

    let llm = Arc::clone(&providers.llm);
    let outbound_tx = outbound_tx.clone();
    let prompt = format!(
        "In one short sentence, give the trainee a coaching tip for how they just said: \"{user_text}\""
    );
    tokio::spawn(async move {
        let messages = system_and_user("You are a terse, encouraging sales coach.", prompt);
        if let Ok(hint) = llm.generate(&messages).await {
            let _ = outbound_tx.send(ServerMessage::CoachHint { text: hint }).await;
        }
    });
}

async fn handle_call_end(
    session: &mut Session,
    providers: &Providers,
    outbound_tx: &mpsc::Sender<ServerMessage>,
    stt_stream: &mut Option<Box<dyn SttStream>>,
    stt_event_rx: &mut Option<mpsc::Receiver<SttEvent>>,
    tts_done_rx: &mut Option<oneshot::Receiver<TtsOutcome>>,
) {
    info!(session_id = %session.session_id, "call ended, running end-of-call pipeline");
    session.lifecycle = Lifecycle::Ended;
    session.call_ended.store(true, Ordering::SeqCst);

    if session.record_interrupt() {
        let _ = outbound_tx.send(ServerMessage::AgentInterrupt).await;
    }
    session.agent_audio_state = AgentAudioState::Silent;

    if let Some(stream) = stt_stream.as_mut() {
        stream.close().await;
    }
    *stt_stream = None;
    *stt_event_rx = None;
    *tts_done_rx = None;

    let output = run_end_of_call_pipeline(session, &providers.llm, &providers.sink).await;
    let _ = outbound_tx
        .send(ServerMessage::CallFeedback {
            payload: output.feedback,
            conversation_metrics: serde_json::to_value(&output.conversation_metrics)
                .unwrap_or(serde_json::Value::Null),
            audio_metrics: serde_json::to_value(&output.voice_metrics).unwrap_or(serde_json::Value::Null),
            call_duration_ms: output.call_duration_ms,
            turn_count: output.turn_count,
        })
        .await;
    let _ = output.feedback_is_error; // surfaced via payload.error, nothing further to do here
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::llm::LlmClient;
    use crate::providers::tts::TtsClient;
    use async_trait::async_trait;
    use crate::types::Turn;

    struct FixedLlm(&'static str);
    #[async_trait]
    impl LlmClient for FixedLlm {
        async fn generate(&self, _c: &[Turn]) -> Result<String, CoreError> {
            Ok(self.0.to_string())
        }
    }

    struct FixedTts;
    #[async_trait]
    impl TtsClient for FixedTts {
        async fn synthesize(&self, _t: &str) -> Result<Vec<u8>, CoreError> {
            Ok(vec![0u8; 10])
        }
    }

    #[tokio::test]
    async fn process_one_turn_starts_tts_on_success() {
        let mut session = Session::new();
        session.lock_scenario(None);
        let providers = Providers {
            auth: Arc::new(crate::providers::auth::JwtAuthVerifier::new("s")),
            stt: Arc::new(NeverSttClient),
            llm: Arc::new(FixedLlm("Our budget is tight.")),
            tts: Arc::new(FixedTts),
            sink: Arc::new(crate::providers::sink::NullSessionSink),
            history: Arc::new(crate::providers::history::EmptyHistoryReader),
        };
        let (tx, mut rx) = mpsc::channel(32);
        let outcome = process_one_turn(&mut session, "hi there", &providers, &tx).await;
        assert!(matches!(outcome, TurnStepOutcome::TtsStarted(_)));
        assert_eq!(session.conversation.len(), 3);

        let mut saw_agent_text = false;
        while let Ok(msg) = rx.try_recv() {
            if matches!(msg, ServerMessage::AgentText { .. }) {
                saw_agent_text = true;
            }
        }
        assert!(saw_agent_text);
    }

    struct NeverSttClient;
    #[async_trait]
    impl SttClient for NeverSttClient {
        async fn open_stream(
            &self,
            _sample_rate: u32,
        ) -> Result<(Box<dyn SttStream>, mpsc::Receiver<SttEvent>), CoreError> {
            Err(CoreError::ProviderUnavailable("not used in this test".into()))
        }
    }
}
