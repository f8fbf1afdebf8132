use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

const ENCOURAGEMENT_WORDS: &[&str] = &["좋아", "잘", "훌륭"];
const DISCLOSURE_MARKER: &str = "정답은";

/// How much scaffolding a hint should carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum HintLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl HintLevel {
    /// Unknown accuracy is treated as a beginner.
    pub fn from_accuracy(accuracy: Option<f64>) -> Self {
        match accuracy {
            Some(a) if a >= 0.8 => HintLevel::Advanced,
            Some(a) if a >= 0.5 => HintLevel::Intermediate,
            _ => HintLevel::Beginner,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HintLevel::Beginner => "beginner",
            HintLevel::Intermediate => "intermediate",
            HintLevel::Advanced => "advanced",
        }
    }

    pub fn guidance(self) -> &'static str {
        match self {
            HintLevel::Beginner => {
                "Give a detailed, step-by-step hint. Name the formula the learner needs."
            }
            HintLevel::Intermediate => {
                "Give a medium hint: point at the key idea without naming every step."
            }
            HintLevel::Advanced => "Give a short nudge in one sentence.",
        }
    }
}

/// Quality signals attached to every hint response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct HintAnalysis {
    pub hint_level: HintLevel,
    /// Phrased as a question and does not disclose the answer
    pub is_socratic: bool,
    /// Length in characters
    pub hint_length: usize,
    pub contains_encouragement: bool,
    pub difficulty_appropriate: bool,
    pub is_guided_hint: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
}

impl HintAnalysis {
    pub fn analyze(hint: &str, level: HintLevel, is_guided_hint: bool) -> Self {
        let hint_length = hint.chars().count();
        let recommendation = match level {
            HintLevel::Beginner if hint_length < 20 => {
                Some("초급 학습자에게는 더 상세한 힌트가 필요합니다".to_string())
            }
            HintLevel::Advanced if hint_length > 100 => {
                Some("고급 학습자에게는 더 간결한 힌트가 적합합니다".to_string())
            }
            _ => None,
        };

        Self {
            hint_level: level,
            is_socratic: hint.contains('?') && !hint.contains(DISCLOSURE_MARKER),
            hint_length,
            contains_encouragement: ENCOURAGEMENT_WORDS.iter().any(|w| hint.contains(w)),
            difficulty_appropriate: recommendation.is_none(),
            is_guided_hint,
            recommendation,
        }
    }
}
