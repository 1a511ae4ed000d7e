//! Difficulty selector: classifies recent performance into
//! {Beginner, Intermediate, Advanced} and supplies the persona modifier
//! concatenated onto the locked scenario's system prompt.

use crate::types::Difficulty;

const BEGINNER_MAX: f64 = 5.0;
const INTERMEDIATE_MAX: f64 = 7.5;

fn modifier_text(level: Difficulty) -> &'static str {
    match level {
        Difficulty::Beginner => {
            "Be a relatively easy customer: raise only mild objections and give the trainee \
             room to recover from a weak pitch."
        }
        Difficulty::Intermediate => {
            "Be a moderately challenging customer: raise realistic objections but stay open to \
             being persuaded by a solid argument."
        }
        Difficulty::Advanced => {
            "Be a demanding, skeptical customer: push back hard, interrupt weak arguments, and \
             concede only to a genuinely strong pitch."
        }
    }
}

pub struct DifficultyResolution {
    pub level: Difficulty,
    pub modifier: Option<&'static str>,
    pub average_overall_score: Option<f64>,
    pub sample_count: usize,
}

/// `recent_scores` is the caller-truncated last N=10 `overall_score`
/// values from the history reader, oldest-to-newest order irrelevant since
/// only the mean is used.
pub fn select_difficulty(auto_enabled: bool, recent_scores: &[f64]) -> DifficultyResolution {
    if !auto_enabled {
        return DifficultyResolution {
            level: Difficulty::Intermediate,
            modifier: None,
            average_overall_score: None,
            sample_count: recent_scores.len(),
        };
    }

    if recent_scores.is_empty() {
        return DifficultyResolution {
            level: Difficulty::Intermediate,
            modifier: Some(modifier_text(Difficulty::Intermediate)),
            average_overall_score: None,
            sample_count: 0,
        };
    }

    let average = recent_scores.iter().sum::<f64>() / recent_scores.len() as f64;
    let level = if average < BEGINNER_MAX {
        Difficulty::Beginner
    } else if average <= INTERMEDIATE_MAX {
        Difficulty::Intermediate
    } else {
        Difficulty::Advanced
    };

    DifficultyResolution {
        level,
        modifier: Some(modifier_text(level)),
        average_overall_score: Some(average),
        sample_count: recent_scores.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_auto_difficulty_yields_intermediate_with_no_modifier() {
        let resolution = select_difficulty(false, &[9.0, 9.5]);
        assert_eq!(resolution.level, Difficulty::Intermediate);
        assert!(resolution.modifier.is_none());
    }

    #[test]
    fn insufficient_data_defaults_to_intermediate() {
        let resolution = select_difficulty(true, &[]);
        assert_eq!(resolution.level, Difficulty::Intermediate);
        assert!(resolution.modifier.is_some());
        assert!(resolution.average_overall_score.is_none());
    }

    #[test]
    fn thresholds_classify_recent_average() {
        assert_eq!(select_difficulty(true, &[3.0, 4.0]).level, Difficulty::Beginner);
        assert_eq!(select_difficulty(true, &[6.0, 7.0]).level, Difficulty::Intermediate);
        assert_eq!(select_difficulty(true, &[7.5]).level, Difficulty::Intermediate);
        assert_eq!(select_difficulty(true, &[8.0, 9.0]).level, Difficulty::Advanced);
    }
}
