//! Session: the per-connection state private to its owning task. No
//! `Arc<Mutex<_>>` here -- the owning task is the only writer, per
//! invariant 6; the only shared mutable state is the small set of atomics
//! used for cooperative TTS cancellation (see `session::tts_stream`), which
//! a concurrently running streamer task reads without needing to touch the
//! rest of `Session`.

use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use crate::scenarios::base_persona_prompt;
use crate::types::{Difficulty, Role, ScenarioId, SpeakingSegment, SttFinalEvent, Turn, TurnTimestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicState {
    Idle,
    Capturing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentAudioState {
    Silent,
    Speaking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Open,
    Ended,
}

pub struct Session {
    /// Stable identity for this connection's lifetime, used only to
    /// correlate log lines and the persisted session record -- never
    /// reset by `call.reset` (a fresh id is assigned per connection, not
    /// per call).
    pub session_id: Uuid,
    pub user_id: Option<String>,
    pub scenario: ScenarioId,
    pub scenario_locked: bool,
    pub difficulty: Difficulty,
    pub auto_difficulty: bool,
    pub conversation: Vec<Turn>,
    pub turn_timestamps: Vec<TurnTimestamp>,
    pub speaking_segments: Vec<SpeakingSegment>,
    pub stt_events: Vec<SttFinalEvent>,
    pub interruption_count: u32,
    pub call_start_ms: u64,
    pub audio_start_count: u32,

    /// Shared with the currently running (if any) TTS streamer task. Only
    /// the owning task ever advances `tts_epoch`; the streamer only reads
    /// it and reads/writes `interrupt_notified` under a
    /// compare-and-swap to preserve the at-most-one-notification
    /// invariant even though two tasks may observe the epoch change.
    pub tts_epoch: Arc<AtomicU64>,
    pub interrupt_notified: Arc<AtomicBool>,
    pub call_ended: Arc<AtomicBool>,

    pub pending_transcript: Option<String>,
    pub llm_in_flight: bool,

    pub coach_hint_sent_for_turn: bool,
    pub last_coach_hint_ms: Option<u64>,

    pub mic_state: MicState,
    pub agent_audio_state: AgentAudioState,
    pub lifecycle: Lifecycle,

    clock_origin: Instant,
}

impl Session {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            user_id: None,
            scenario: ScenarioId::default_scenario(),
            scenario_locked: false,
            difficulty: Difficulty::Intermediate,
            auto_difficulty: true,
            conversation: Vec::new(),
            turn_timestamps: Vec::new(),
            speaking_segments: Vec::new(),
            stt_events: Vec::new(),
            interruption_count: 0,
            call_start_ms: 0,
            audio_start_count: 0,
            tts_epoch: Arc::new(AtomicU64::new(0)),
            interrupt_notified: Arc::new(AtomicBool::new(false)),
            call_ended: Arc::new(AtomicBool::new(false)),
            pending_transcript: None,
            llm_in_flight: false,
            coach_hint_sent_for_turn: false,
            last_coach_hint_ms: None,
            mic_state: MicState::Idle,
            agent_audio_state: AgentAudioState::Silent,
            lifecycle: Lifecycle::Open,
            clock_origin: Instant::now(),
        }
    }

    /// Monotonic millisecond offset from this Session's clock origin. Used
    /// for every `monotonic_ms` timestamp the data model names.
    pub fn now_ms(&self) -> u64 {
        self.clock_origin.elapsed().as_millis() as u64
    }

    /// Locks the scenario, finalizes the persona prompt (scenario addendum
    /// + role-compliance suffix + optional difficulty modifier), and seeds
    /// `conversation` with the single system turn. A no-op if already
    /// locked (invariant 1).
    pub fn lock_scenario(&mut self, difficulty_modifier: Option<&str>) {
        if self.scenario_locked {
            return;
        }
        self.scenario_locked = true;
        self.call_start_ms = self.now_ms();
        let mut prompt = base_persona_prompt(self.scenario);
        if let Some(modifier) = difficulty_modifier {
            prompt.push(' ');
            prompt.push_str(modifier);
        }
        self.conversation = vec![Turn::system(prompt)];
        self.turn_timestamps.clear();
    }

    pub fn select_scenario(&mut self, id: ScenarioId) {
        if !self.scenario_locked {
            self.scenario = id;
        }
    }

    pub fn append_user_turn(&mut self, text: &str) {
        let t = self.now_ms();
        self.conversation.push(Turn::user(text));
        self.turn_timestamps.push(TurnTimestamp { role: Role::User, monotonic_ms: t });
    }

    pub fn append_assistant_turn(&mut self, text: &str) {
        let t = self.now_ms();
        self.conversation.push(Turn::assistant(text));
        self.turn_timestamps.push(TurnTimestamp { role: Role::Assistant, monotonic_ms: t });
    }

    /// Captures `myEpoch := ++ttsEpoch` and clears `interruptNotified`
    /// before a new TTS stream begins.
    pub fn begin_tts_epoch(&mut self) -> u64 {
        let epoch = self.tts_epoch.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
        self.interrupt_notified.store(false, std::sync::atomic::Ordering::SeqCst);
        epoch
    }

    /// `user.interrupt` or an implicit interrupt (`call.end`, epoch
    /// mismatch observed by the streamer). Advances the epoch and emits
    /// at most one notification per utterance.
    pub fn record_interrupt(&mut self) -> bool {
        self.interruption_count += 1;
        self.tts_epoch.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.interrupt_notified
            .compare_exchange(
                false,
                true,
                std::sync::atomic::Ordering::SeqCst,
                std::sync::atomic::Ordering::SeqCst,
            )
            .is_ok()
    }

    /// Clears all per-call state except the transport connection and the
    /// persisted `userId`, returning to the default scenario, unlocked.
    pub fn reset_for_call(&mut self) {
        let user_id = self.user_id.take();
        let session_id = self.session_id;
        *self = Session::new();
        self.user_id = user_id;
        self.session_id = session_id;
    }

    pub fn turn_count(&self) -> u64 {
        (self.conversation.len().saturating_sub(1) / 2) as u64
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locking_scenario_seeds_single_system_turn() {
        let mut session = Session::new();
        session.lock_scenario(None);
        assert_eq!(session.conversation.len(), 1);
        assert_eq!(session.conversation[0].role, Role::System);
    }

    #[test]
    fn locking_twice_is_a_no_op() {
        let mut session = Session::new();
        session.lock_scenario(None);
        let first = session.conversation[0].content.clone();
        session.select_scenario(ScenarioId::AngryExistingCustomer);
        session.lock_scenario(Some("ignored modifier"));
        assert_eq!(session.conversation[0].content, first);
    }

    #[test]
    fn begin_tts_epoch_increments_and_clears_notified() {
        let mut session = Session::new();
        session.interrupt_notified.store(true, std::sync::atomic::Ordering::SeqCst);
        let first = session.begin_tts_epoch();
        let second = session.begin_tts_epoch();
        assert_eq!(second, first + 1);
        assert!(!session.interrupt_notified.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn record_interrupt_notifies_at_most_once() {
        let mut session = Session::new();
        assert!(session.record_interrupt());
        assert!(!session.record_interrupt());
        assert_eq!(session.interruption_count, 2);
    }

    #[test]
    fn reset_preserves_user_id_and_session_id_only() {
        let mut session = Session::new();
        let original_id = session.session_id;
        session.user_id = Some("user-1".into());
        session.lock_scenario(None);
        session.interruption_count = 3;
        session.reset_for_call();
        assert_eq!(session.user_id, Some("user-1".into()));
        assert_eq!(session.session_id, original_id);
        assert!(!session.scenario_locked);
        assert_eq!(session.interruption_count, 0);
        assert!(session.conversation.is_empty());
    }

    #[test]
    fn turn_count_floors_odd_conversation_length() {
        let mut session = Session::new();
        session.lock_scenario(None);
        session.append_user_turn("hi");
        session.append_assistant_turn("hello");
        assert_eq!(session.turn_count(), 1);
    }
}
