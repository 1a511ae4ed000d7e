//! Utterance aggregator: concatenates STT finals into a single transcript
//! per utterance, flushing on `utterance_end` or a fallback silence
//! timeout. The fallback timer is modeled as an optional deadline the
//! dispatcher's main loop awaits alongside client frames and STT events,
//! rather than a separately spawned task -- consistent with "the owning
//! task is the only writer of Session state".

use tokio::time::Instant as TokioInstant;

const FALLBACK_SILENCE_MS: u64 = 5000;

#[derive(Default)]
pub struct Aggregator {
    accumulated_transcript: String,
    deadline: Option<TokioInstant>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// STT `final{text}` with non-empty text: append with a single space
    /// separator and (re)arm the fallback timer. The timer only matters
    /// while the mic is not capturing -- the dispatcher checks that guard
    /// before honoring a fired deadline.
    pub fn on_final(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        if self.accumulated_transcript.is_empty() {
            self.accumulated_transcript.push_str(text);
        } else {
            self.accumulated_transcript.push(' ');
            self.accumulated_transcript.push_str(text);
        }
        self.deadline = Some(TokioInstant::now() + std::time::Duration::from_millis(FALLBACK_SILENCE_MS));
    }

    /// Cancels the fallback timer and returns the accumulated transcript if
    /// non-empty, clearing internal state either way. Used on
    /// `utterance_end` and on a fired fallback deadline.
    pub fn flush(&mut self) -> Option<String> {
        self.deadline = None;
        if self.accumulated_transcript.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.accumulated_transcript))
        }
    }

    pub fn deadline(&self) -> Option<TokioInstant> {
        self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_finals_are_dropped() {
        let mut agg = Aggregator::new();
        agg.on_final("   ");
        assert_eq!(agg.flush(), None);
    }

    #[test]
    fn finals_are_space_joined_and_flushed_once() {
        let mut agg = Aggregator::new();
        agg.on_final("what about");
        agg.on_final("the price");
        assert_eq!(agg.flush(), Some("what about the price".to_string()));
        assert_eq!(agg.flush(), None);
    }

    #[test]
    fn flush_clears_the_fallback_deadline() {
        let mut agg = Aggregator::new();
        agg.on_final("hi");
        assert!(agg.deadline().is_some());
        agg.flush();
        assert!(agg.deadline().is_none());
    }
}
