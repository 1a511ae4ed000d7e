//! Conversation metrics: pure functions over the transcript and timing.
//! No I/O; every value here is a deterministic function of its inputs, so
//! property tests can hold the function accountable for byte-identical
//! output given identical inputs.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::types::{Role, Turn, TurnTimestamp};

/// Single-word fillers that are stripped out of the "content word" count
/// used for `talk_ratio`/`wpm`/`avg_turn_length`. The full filler
/// dictionary (including multi-word phrases) is still used verbatim for
/// `filler_word_count`, which scans raw text rather than tokens.
const SINGLE_WORD_FILLERS: &[&str] =
    &["um", "uh", "uhh", "umm", "hmm", "hm", "like", "basically", "actually", "literally", "right"];

const FILLER_PHRASES: &[&str] = &[
    "um", "uh", "uhh", "umm", "hmm", "hm", "like", "you know", "i mean", "basically", "actually",
    "literally", "sort of", "kind of", "right", "okay so", "so yeah",
];

const QUESTION_STARTERS: &[&str] = &[
    "who", "what", "when", "where", "why", "how", "is", "are", "do", "does", "did", "can", "could",
    "would", "will", "shall", "should", "have", "has", "had", "may", "might",
];

const OBJECTION_KEYWORDS: &[&str] = &[
    "too expensive", "not sure", "don't think", "concerned about", "worried about",
    "but i", "however", "problem with", "not convinced", "hesitant",
];
const PRICING_KEYWORDS: &[&str] =
    &["price", "pricing", "cost", "budget", "expensive", "cheap", "discount", "afford"];
const COMPETITOR_KEYWORDS: &[&str] = &[
    "competitor", "another vendor", "other company", "alternative", "instead of you",
    "other provider", "another provider",
];
const CLOSING_KEYWORDS: &[&str] = &[
    "sign up", "get started", "move forward", "next steps", "contract", "purchase",
    "buy now", "close the deal", "proceed", "send over the paperwork",
];
const RAPPORT_KEYWORDS: &[&str] = &[
    "thank you", "appreciate", "great question", "good point", "i understand",
    "that makes sense", "nice talking", "glad to", "pleasure",
];

fn word_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\w+").expect("static regex"))
}

fn filler_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let pattern = FILLER_PHRASES
            .iter()
            .map(|p| format!(r"\b{}\b", regex::escape(p)))
            .collect::<Vec<_>>()
            .join("|");
        Regex::new(&format!("(?i)({pattern})")).expect("static regex")
    })
}

fn keyword_hit(text_lower: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| text_lower.contains(k))
}

fn keyword_count(text_lower: &str, keywords: &[&str]) -> u64 {
    keywords.iter().map(|k| text_lower.matches(k).count() as u64).sum()
}

/// Word tokens with single-word filler noise removed; this is the "words"
/// quantity feeding `talk_ratio`, `user_words_per_minute`, and
/// `avg_turn_length`.
fn content_word_count(text: &str) -> u64 {
    word_regex()
        .find_iter(text)
        .filter(|m| !SINGLE_WORD_FILLERS.contains(&m.as_str().to_lowercase().as_str()))
        .count() as u64
}

fn round_dp(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn is_question(content: &str) -> bool {
    if content.contains('?') {
        return true;
    }
    let first_word = content
        .split_whitespace()
        .next()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase());
    matches!(first_word, Some(w) if QUESTION_STARTERS.contains(&w.as_str()))
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationMetrics {
    #[serde(skip)]
    pub user_word_count: u64,
    pub talk_ratio: f64,
    pub user_words_per_minute: u64,
    pub user_questions_asked: u64,
    pub filler_word_count: u64,
    pub filler_word_rate: f64,
    pub avg_turn_length: f64,
    pub longest_monologue: u64,
    pub customer_raised_objection: bool,
    pub customer_raised_pricing: bool,
    pub customer_raised_competitor: bool,
    pub closing_attempted: bool,
    pub rapport_count: u64,
    pub avg_response_latency_ms: f64,
    pub engagement_score: f64,
}

pub fn compute_conversation_metrics(
    conversation: &[Turn],
    turn_timestamps: &[TurnTimestamp],
    call_duration_ms: u64,
    interruption_count: u32,
) -> ConversationMetrics {
    let user_turns: Vec<&Turn> = conversation.iter().filter(|t| t.role == Role::User).collect();
    let assistant_turns: Vec<&Turn> =
        conversation.iter().filter(|t| t.role == Role::Assistant).collect();

    let user_words: u64 = user_turns.iter().map(|t| content_word_count(&t.content)).sum();
    let agent_words: u64 = assistant_turns.iter().map(|t| content_word_count(&t.content)).sum();

    let talk_ratio = if user_words + agent_words == 0 {
        0.0
    } else {
        round_dp(user_words as f64 / (user_words + agent_words) as f64, 3)
    };

    let user_words_per_minute = if call_duration_ms == 0 {
        0
    } else {
        (user_words as f64 / (call_duration_ms as f64 / 60_000.0)).round() as u64
    };

    let user_questions_asked =
        user_turns.iter().filter(|t| is_question(&t.content)).count() as u64;

    let user_text_concat =
        user_turns.iter().map(|t| t.content.as_str()).collect::<Vec<_>>().join(" ");
    let filler_word_count = filler_regex().find_iter(&user_text_concat).count() as u64;
    let filler_word_rate =
        if user_words == 0 { 0.0 } else { round_dp(100.0 * filler_word_count as f64 / user_words as f64, 1) };

    let per_turn_word_counts: Vec<u64> =
        user_turns.iter().map(|t| content_word_count(&t.content)).collect();
    let avg_turn_length = if per_turn_word_counts.is_empty() {
        0.0
    } else {
        round_dp(
            per_turn_word_counts.iter().sum::<u64>() as f64 / per_turn_word_counts.len() as f64,
            1,
        )
    };
    let longest_monologue = per_turn_word_counts.iter().copied().max().unwrap_or(0);

    let combined_lower = conversation
        .iter()
        .filter(|t| t.role != Role::System)
        .map(|t| t.content.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    let customer_raised_objection = keyword_hit(&combined_lower, OBJECTION_KEYWORDS);
    let customer_raised_pricing = keyword_hit(&combined_lower, PRICING_KEYWORDS);
    let customer_raised_competitor = keyword_hit(&combined_lower, COMPETITOR_KEYWORDS);
    let closing_attempted = keyword_hit(&combined_lower, CLOSING_KEYWORDS);
    let rapport_count = keyword_count(&combined_lower, RAPPORT_KEYWORDS);

    let mut latencies = Vec::new();
    for pair in turn_timestamps.windows(2) {
        if pair[0].role == Role::User && pair[1].role == Role::Assistant {
            let delta = pair[1].monotonic_ms as i64 - pair[0].monotonic_ms as i64;
            if delta > 0 && delta < 120_000 {
                latencies.push(delta as f64);
            }
        }
    }
    let avg_response_latency_ms = if latencies.is_empty() {
        0.0
    } else {
        round_dp(latencies.iter().sum::<f64>() / latencies.len() as f64, 1)
    };

    let question_rate = if user_turns.is_empty() {
        0.0
    } else {
        user_questions_asked as f64 / user_turns.len() as f64
    };

    let mut score: f64 = 5.0;
    if (0.35..=0.65).contains(&talk_ratio) {
        score += 1.0;
    } else if talk_ratio < 0.2 || talk_ratio > 0.8 {
        score -= 1.0;
    }
    if question_rate >= 0.25 {
        score += 1.5;
    } else if question_rate >= 0.10 {
        score += 0.75;
    }
    if rapport_count >= 3 {
        score += 1.0;
    } else if rapport_count >= 1 {
        score += 0.5;
    }
    if filler_word_rate > 5.0 {
        score -= 1.0;
    } else if filler_word_rate > 3.0 {
        score -= 0.5;
    }
    if closing_attempted {
        score += 0.5;
    }
    if (10.0..=50.0).contains(&avg_turn_length) {
        score += 0.5;
    } else if avg_turn_length > 80.0 {
        score -= 0.5;
    }
    if interruption_count > 5 {
        score -= 1.0;
    } else if interruption_count > 2 {
        score -= 0.5;
    }
    let engagement_score = round_dp(score.clamp(0.0, 10.0), 1);

    ConversationMetrics {
        user_word_count: user_words,
        talk_ratio,
        user_words_per_minute,
        user_questions_asked,
        filler_word_count,
        filler_word_rate,
        avg_turn_length,
        longest_monologue,
        customer_raised_objection,
        customer_raised_pricing,
        customer_raised_competitor,
        closing_attempted,
        rapport_count,
        avg_response_latency_ms,
        engagement_score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role as R;

    fn ts(role: R, monotonic_ms: u64) -> TurnTimestamp {
        TurnTimestamp { role, monotonic_ms }
    }

    #[test]
    fn talk_ratio_is_zero_when_no_words() {
        let conversation = vec![Turn::system("sys")];
        let m = compute_conversation_metrics(&conversation, &[], 1000, 0);
        assert_eq!(m.talk_ratio, 0.0);
        assert!(!m.talk_ratio.is_nan());
    }

    #[test]
    fn filler_stripped_talk_ratio_rounds_to_three_dp() {
        let conversation = vec![
            Turn::system("sys"),
            Turn::user("Um, how much does it cost? Like, seriously?"),
            Turn::assistant("It's $99."),
        ];
        let timestamps = vec![ts(R::User, 0), ts(R::Assistant, 2000)];
        let m = compute_conversation_metrics(&conversation, &timestamps, 60_000, 0);

        assert_eq!(m.talk_ratio, 0.667);
        assert_eq!(m.user_questions_asked, 1);
        assert_eq!(m.filler_word_count, 2);
        assert_eq!(m.avg_response_latency_ms, 2000.0);
    }

    #[test]
    fn avg_response_latency_filters_out_of_range_deltas() {
        let conversation = vec![Turn::system("sys")];
        let timestamps = vec![ts(R::User, 0), ts(R::Assistant, 200_000)];
        let m = compute_conversation_metrics(&conversation, &timestamps, 60_000, 0);
        assert_eq!(m.avg_response_latency_ms, 0.0);
    }

    #[test]
    fn high_interruption_count_lowers_engagement_score() {
        let conversation = vec![Turn::system("sys"), Turn::user("hello there how are you today")];
        let low = compute_conversation_metrics(&conversation, &[], 60_000, 0).engagement_score;
        let high = compute_conversation_metrics(&conversation, &[], 60_000, 6).engagement_score;
        assert!(high < low);
    }
}
