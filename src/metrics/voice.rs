//! Voice metrics: pure functions over speaking segments and STT events.
//!
//! The composite `confidence_score`/`vocal_clarity_score`/`energy_score`
//! deltas are heuristic: they live behind `VoiceMetricsWeights` rather than
//! being hardcoded, so the scoring heuristic can be retuned without
//! touching the rest of the pipeline.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::types::SpeakingSegment;

const HESITATION_WORDS: &[&str] = &["um", "uh", "uhh", "umm", "hmm", "hm", "er", "erm", "ah", "ahh"];

fn hesitation_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let pattern = HESITATION_WORDS.join("|");
        Regex::new(&format!(r"(?i)\b({pattern})\b")).expect("static regex")
    })
}

fn round_dp(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[derive(Debug, Clone, Copy)]
pub struct VoiceMetricsWeights {
    pub confidence_baseline: f64,
    pub confidence_high_bonus: f64,
    pub confidence_medium_bonus: f64,
    pub confidence_low_penalty: f64,
    pub clarity_baseline: f64,
    pub clarity_hesitation_penalty_major: f64,
    pub clarity_hesitation_penalty_minor: f64,
    pub clarity_ideal_pace_bonus: f64,
    pub energy_baseline: f64,
    pub energy_slow_penalty: f64,
    pub energy_fast_penalty: f64,
    pub energy_ideal_bonus: f64,
}

impl Default for VoiceMetricsWeights {
    fn default() -> Self {
        Self {
            confidence_baseline: 5.0,
            confidence_high_bonus: 3.0,
            confidence_medium_bonus: 1.5,
            confidence_low_penalty: 2.0,
            clarity_baseline: 5.0,
            clarity_hesitation_penalty_major: 2.0,
            clarity_hesitation_penalty_minor: 1.0,
            clarity_ideal_pace_bonus: 1.0,
            energy_baseline: 5.0,
            energy_slow_penalty: 1.5,
            energy_fast_penalty: 1.0,
            energy_ideal_bonus: 1.5,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VoiceMetrics {
    pub speaking_duration_ms: u64,
    pub silence_duration_ms: u64,
    pub avg_pause_ms: f64,
    pub speaking_rate_wpm: u64,
    pub pace_label: &'static str,
    pub hesitation_count: u64,
    pub hesitation_rate: f64,
    pub avg_stt_confidence: Option<f64>,
    pub confidence_score: f64,
    pub vocal_clarity_score: f64,
    pub energy_score: f64,
}

fn pace_label(rate_wpm: u64) -> &'static str {
    if rate_wpm == 0 {
        "normal"
    } else if rate_wpm < 100 {
        "very_slow"
    } else if rate_wpm < 120 {
        "slow"
    } else if rate_wpm <= 160 {
        "ideal"
    } else if rate_wpm <= 180 {
        "fast"
    } else {
        "very_fast"
    }
}

pub fn compute_voice_metrics(
    segments: &[SpeakingSegment],
    stt_final_texts: &[&str],
    stt_confidences: &[f64],
    total_user_words: u64,
    weights: &VoiceMetricsWeights,
) -> VoiceMetrics {
    let speaking_duration_ms: u64 = segments
        .iter()
        .map(|s| {
            if s.samples > 0 && s.sample_rate > 0 {
                ((s.samples as f64 / s.sample_rate as f64) * 1000.0).round() as u64
            } else {
                s.end_ms.unwrap_or(s.start_ms).saturating_sub(s.start_ms)
            }
        })
        .sum();

    let mut sorted = segments.to_vec();
    sorted.sort_by_key(|s| s.start_ms);
    let mut silence_duration_ms: u64 = 0;
    for pair in sorted.windows(2) {
        if let Some(prev_end) = pair[0].end_ms {
            let gap = pair[1].start_ms as i64 - prev_end as i64;
            if gap > 0 {
                silence_duration_ms += gap as u64;
            }
        }
    }

    let avg_pause_ms = if segments.len() < 2 {
        0.0
    } else {
        silence_duration_ms as f64 / (segments.len() - 1) as f64
    };

    let speaking_rate_wpm = if speaking_duration_ms == 0 {
        0
    } else {
        (total_user_words as f64 / (speaking_duration_ms as f64 / 60_000.0)).round() as u64
    };
    let pace_label = pace_label(speaking_rate_wpm);

    let concatenated = stt_final_texts.join(" ");
    let hesitation_count = hesitation_regex().find_iter(&concatenated).count() as u64;
    let hesitation_rate = if total_user_words == 0 {
        0.0
    } else {
        round_dp(100.0 * hesitation_count as f64 / total_user_words as f64, 1)
    };

    let positive_confidences: Vec<f64> = stt_confidences.iter().copied().filter(|c| *c > 0.0).collect();
    let avg_stt_confidence = if positive_confidences.is_empty() {
        None
    } else {
        Some(round_dp(
            positive_confidences.iter().sum::<f64>() / positive_confidences.len() as f64,
            3,
        ))
    };

    let mut confidence_score = weights.confidence_baseline;
    if let Some(c) = avg_stt_confidence {
        if c >= 0.9 {
            confidence_score += weights.confidence_high_bonus;
        } else if c >= 0.75 {
            confidence_score += weights.confidence_medium_bonus;
        } else if c < 0.5 {
            confidence_score -= weights.confidence_low_penalty;
        }
    }
    let confidence_score = round_dp(confidence_score.clamp(0.0, 10.0), 1);

    let mut vocal_clarity_score = weights.clarity_baseline;
    if hesitation_rate > 10.0 {
        vocal_clarity_score -= weights.clarity_hesitation_penalty_major;
    } else if hesitation_rate > 5.0 {
        vocal_clarity_score -= weights.clarity_hesitation_penalty_minor;
    }
    if pace_label == "ideal" {
        vocal_clarity_score += weights.clarity_ideal_pace_bonus;
    }
    let vocal_clarity_score = round_dp(vocal_clarity_score.clamp(0.0, 10.0), 1);

    let mut energy_score = weights.energy_baseline;
    match pace_label {
        "very_slow" | "slow" => energy_score -= weights.energy_slow_penalty,
        "fast" | "very_fast" => energy_score -= weights.energy_fast_penalty,
        "ideal" => energy_score += weights.energy_ideal_bonus,
        _ => {}
    }
    let energy_score = round_dp(energy_score.clamp(0.0, 10.0), 1);

    VoiceMetrics {
        speaking_duration_ms,
        silence_duration_ms,
        avg_pause_ms: round_dp(avg_pause_ms, 1),
        speaking_rate_wpm,
        pace_label,
        hesitation_count,
        hesitation_rate,
        avg_stt_confidence,
        confidence_score,
        vocal_clarity_score,
        energy_score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(start_ms: u64, end_ms: u64, samples: u64, sample_rate: u32) -> SpeakingSegment {
        SpeakingSegment { start_ms, end_ms: Some(end_ms), samples, sample_rate }
    }

    #[test]
    fn avg_pause_is_zero_with_one_segment() {
        let segments = vec![seg(0, 1000, 16000, 16000)];
        let weights = VoiceMetricsWeights::default();
        let m = compute_voice_metrics(&segments, &[], &[], 0, &weights);
        assert_eq!(m.avg_pause_ms, 0.0);
    }

    #[test]
    fn speaking_duration_from_samples_and_single_hesitation_match() {
        let segments = vec![seg(0, 5000, 80_000, 16_000)];
        let weights = VoiceMetricsWeights::default();
        let m = compute_voice_metrics(
            &segments,
            &["um how much does it cost like seriously"],
            &[0.9],
            6,
            &weights,
        );
        assert_eq!(m.speaking_duration_ms, 5000);
        assert_eq!(m.hesitation_count, 1);
        assert_eq!(m.avg_stt_confidence, Some(0.9));
    }

    #[test]
    fn pace_label_buckets() {
        assert_eq!(pace_label(0), "normal");
        assert_eq!(pace_label(90), "very_slow");
        assert_eq!(pace_label(110), "slow");
        assert_eq!(pace_label(140), "ideal");
        assert_eq!(pace_label(170), "fast");
        assert_eq!(pace_label(200), "very_fast");
    }
}
