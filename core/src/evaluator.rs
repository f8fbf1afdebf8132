use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("valid number regex"));
static UNIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-zA-Z²³°]+").expect("valid unit regex"));

/// Tokens that mark a message as a request for help rather than an answer.
pub const HELP_TOKENS: &[&str] = &["힌트", "모르겠", "도와", "어떻게", "방법", "help", "hint"];

/// Question-topic substring mapped to words that indicate a sound approach.
const APPROACH_KEYWORDS: &[(&str, &[&str])] = &[
    ("각기둥", &["밑면", "옆면", "겉넓이", "넓이", "더하기", "+"]),
    ("원뿔", &["밑면", "옆면", "부채꼴", "반지름"]),
    ("부채꼴", &["호의길이", "반지름", "중심각", "넓이"]),
];

const WORKING_MARKERS: &[char] = &['×', '*', '='];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackType {
    HintRequest,
    HintNeeded,
    CorrectAnswer,
    AnswerRevealed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AnswerAnalysis {
    pub is_correct: bool,
    /// The learner's number equals a reference number in value but not in spelling ("72.0" vs "72").
    pub is_partial_correct: bool,
    pub has_good_approach: bool,
    pub confidence: f64,
    pub feedback_type: FeedbackType,
}

impl AnswerAnalysis {
    fn needs_hint() -> Self {
        Self {
            is_correct: false,
            is_partial_correct: false,
            has_good_approach: false,
            confidence: 0.0,
            feedback_type: FeedbackType::HintNeeded,
        }
    }

    /// Verdict recorded when the attempt budget runs out.
    pub fn revealed() -> Self {
        Self {
            feedback_type: FeedbackType::AnswerRevealed,
            ..Self::needs_hint()
        }
    }
}

pub fn is_help_request(text: &str) -> bool {
    let lowered = text.to_lowercase();
    HELP_TOKENS.iter().any(|token| lowered.contains(token))
}

pub fn contains_number(text: &str) -> bool {
    NUMBER_RE.is_match(text)
}

pub fn extract_numbers(text: &str) -> Vec<&str> {
    NUMBER_RE.find_iter(text).map(|m| m.as_str()).collect()
}

pub fn extract_units(text: &str) -> Vec<&str> {
    UNIT_RE.find_iter(text).map(|m| m.as_str()).collect()
}

/// Heuristic grader for free-text answers. Never fails: anything it cannot
/// read is treated as "needs another hint".
#[derive(Debug, Clone, Copy, Default)]
pub struct AnswerEvaluator;

impl AnswerEvaluator {
    pub fn evaluate(&self, input: &str, reference: &str, question: &str) -> AnswerAnalysis {
        if is_help_request(input) {
            return AnswerAnalysis {
                feedback_type: FeedbackType::HintRequest,
                ..AnswerAnalysis::needs_hint()
            };
        }

        let mut analysis = AnswerAnalysis::needs_hint();
        let reference_numbers = extract_numbers(reference);
        let input_numbers = extract_numbers(input);

        if reference_numbers
            .iter()
            .any(|expected| input_numbers.contains(expected))
        {
            let reference_units = extract_units(reference);
            let unit_matched = reference_units.iter().any(|unit| input.contains(unit));
            analysis.is_correct = true;
            analysis.confidence = if unit_matched { 1.0 } else { 0.9 };
            analysis.feedback_type = FeedbackType::CorrectAnswer;
            tracing::debug!(confidence = analysis.confidence, "Answer matched reference");
            return analysis;
        }

        analysis.is_partial_correct = reference_numbers.iter().any(|expected| {
            input_numbers
                .iter()
                .any(|given| numerically_equal(expected, given))
        });

        let approach_hit = APPROACH_KEYWORDS
            .iter()
            .filter(|(topic, _)| question.contains(topic))
            .any(|(_, keywords)| keywords.iter().any(|kw| input.contains(kw)));
        if approach_hit {
            analysis.has_good_approach = true;
            analysis.confidence = 0.6;
        }

        if input.contains(WORKING_MARKERS) {
            analysis.has_good_approach = true;
            analysis.confidence = analysis.confidence.max(0.4);
        }

        tracing::debug!(
            partial = analysis.is_partial_correct,
            approach = analysis.has_good_approach,
            confidence = analysis.confidence,
            "Answer did not match reference"
        );
        analysis
    }
}

fn numerically_equal(a: &str, b: &str) -> bool {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => (x - y).abs() < f64::EPSILON,
        _ => false,
    }
}
