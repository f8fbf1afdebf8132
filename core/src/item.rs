use serde::Deserialize;

use crate::error::TutorError;
use crate::evaluator::{extract_numbers, extract_units};
use crate::session::GeneratedItem;

#[derive(Debug, Deserialize)]
struct RawItem {
    #[serde(alias = "new_question_text")]
    question_text: Option<String>,
    #[serde(default)]
    correct_answer: String,
    #[serde(default)]
    explanation: String,
}

/// Parse the model's item JSON and reconcile the answer with its explanation.
pub fn parse_generated_item(raw: &str) -> Result<GeneratedItem, TutorError> {
    let parsed: RawItem = serde_json::from_str(raw.trim()).map_err(|e| {
        tracing::error!(error = %e, "Generated item is not valid JSON");
        TutorError::GenerationFailed(format!("unparseable item: {e}"))
    })?;

    let question_text = parsed
        .question_text
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| TutorError::GenerationFailed("item has no question text".to_string()))?;

    let mut item = GeneratedItem {
        question_text,
        correct_answer: parsed.correct_answer,
        explanation: parsed.explanation,
    };
    repair_answer(&mut item);
    Ok(item)
}

/// Models sometimes finish the explanation with a different value than the
/// one they put in `correct_answer`. The explanation's largest number is
/// usually the final result, so it wins.
fn repair_answer(item: &mut GeneratedItem) {
    let answer_numbers = extract_numbers(&item.correct_answer);
    let explanation_numbers = extract_numbers(&item.explanation);
    if answer_numbers.is_empty() || explanation_numbers.is_empty() {
        return;
    }
    if answer_numbers
        .iter()
        .any(|n| explanation_numbers.contains(n))
    {
        return;
    }

    let Some(largest) = explanation_numbers
        .iter()
        .filter_map(|n| n.parse::<f64>().ok().map(|v| (v, *n)))
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, text)| text)
    else {
        return;
    };
    let unit = extract_units(&item.correct_answer)
        .first()
        .copied()
        .unwrap_or_default();
    let repaired = format!("{largest}{unit}");
    tracing::warn!(
        original = %item.correct_answer,
        repaired = %repaired,
        "Corrected generated answer to match its explanation"
    );
    item.correct_answer = repaired;
}
