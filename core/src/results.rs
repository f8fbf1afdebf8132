use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::TutorError;
use crate::session::DiagnosticProfile;

/// One answered item of a diagnostic session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DiagnosticRow {
    /// 1-based position of the item within the session
    pub seq: i32,
    pub item_id: String,
    pub concept: String,
    pub is_correct: bool,
    /// The learner's accuracy on this concept, 0.0-1.0
    pub personal_accuracy: f64,
    /// Accuracy of all learners on this concept, 0.0-1.0
    pub global_accuracy: f64,
    /// personal minus global accuracy
    pub delta: f64,
}

/// Read-only source of diagnostic performance rows.
#[async_trait]
pub trait SessionResultProvider: Send + Sync {
    /// Rows for a (learner, session) pair ordered by `seq`.
    async fn get_results(
        &self,
        learner_id: &str,
        session_id: &str,
    ) -> Result<Vec<DiagnosticRow>, TutorError>;

    /// Item id of the `seq`-th question of the session.
    async fn get_item_id(
        &self,
        learner_id: &str,
        session_id: &str,
        seq: i32,
    ) -> Result<Option<String>, TutorError>;
}

/// Facts derived in code from the diagnostic rows. The model only phrases them.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct DiagnosticSummary {
    pub total_questions: usize,
    pub correct_count: usize,
    pub wrong_question_numbers: Vec<i32>,
    /// Concepts of the wrong answers, first occurrence first.
    pub weakest_concepts: Vec<String>,
    #[serde(skip)]
    pub profile: DiagnosticProfile,
}

impl DiagnosticSummary {
    pub fn from_rows(rows: &[DiagnosticRow]) -> Self {
        let mut weakest_concepts: Vec<String> = Vec::new();
        let mut concept_accuracy: BTreeMap<String, f64> = BTreeMap::new();
        let mut item_concepts = BTreeMap::new();

        for row in rows {
            item_concepts.insert(row.item_id.clone(), row.concept.clone());
            if !row.is_correct && !weakest_concepts.contains(&row.concept) {
                // The first miss carries the accuracy that made the concept weak.
                weakest_concepts.push(row.concept.clone());
                concept_accuracy.insert(row.concept.clone(), row.personal_accuracy);
            } else {
                concept_accuracy
                    .entry(row.concept.clone())
                    .or_insert(row.personal_accuracy);
            }
        }

        Self {
            total_questions: rows.len(),
            correct_count: rows.iter().filter(|row| row.is_correct).count(),
            wrong_question_numbers: rows
                .iter()
                .filter(|row| !row.is_correct)
                .map(|row| row.seq)
                .collect(),
            weakest_concepts,
            profile: DiagnosticProfile {
                concept_accuracy,
                item_concepts,
            },
        }
    }
}

/// Render rows as plain lines for prompt context.
pub fn format_rows_for_prompt(rows: &[DiagnosticRow]) -> String {
    rows.iter()
        .map(|row| {
            let verdict = if row.is_correct { "correct" } else { "wrong" };
            let direction = if row.delta >= 0.0 { "above" } else { "below" };
            format!(
                "- Q{} ({}): {}, learner accuracy {:.1}%, {:.1}%p {} average",
                row.seq,
                row.concept,
                verdict,
                row.personal_accuracy * 100.0,
                row.delta.abs() * 100.0,
                direction
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(seq: i32, concept: &str, is_correct: bool, accuracy: f64) -> DiagnosticRow {
        DiagnosticRow {
            seq,
            item_id: format!("item-{seq}"),
            concept: concept.to_string(),
            is_correct,
            personal_accuracy: accuracy,
            global_accuracy: 0.6,
            delta: accuracy - 0.6,
        }
    }

    #[test]
    fn summary_counts_and_orders_weak_concepts_by_first_miss() {
        let rows = vec![
            row(1, "prism surface area", true, 0.9),
            row(2, "sector area", false, 0.3),
            row(3, "cone volume", false, 0.4),
            row(4, "sector area", false, 0.35),
        ];
        let summary = DiagnosticSummary::from_rows(&rows);

        assert_eq!(summary.total_questions, 4);
        assert_eq!(summary.correct_count, 1);
        assert_eq!(summary.wrong_question_numbers, vec![2, 3, 4]);
        assert_eq!(
            summary.weakest_concepts,
            vec!["sector area".to_string(), "cone volume".to_string()]
        );
        assert_eq!(summary.profile.concept_accuracy.get("sector area"), Some(&0.3));
        assert_eq!(
            summary.profile.item_concepts.get("item-3").map(String::as_str),
            Some("cone volume")
        );
    }

    #[test]
    fn wrong_row_accuracy_overrides_earlier_correct_row() {
        let rows = vec![row(1, "ratios", true, 0.8), row(2, "ratios", false, 0.45)];
        let summary = DiagnosticSummary::from_rows(&rows);
        assert_eq!(summary.profile.concept_accuracy.get("ratios"), Some(&0.45));
    }

    #[test]
    fn all_correct_yields_no_weak_concepts() {
        let rows = vec![row(1, "ratios", true, 0.8)];
        let summary = DiagnosticSummary::from_rows(&rows);
        assert!(summary.weakest_concepts.is_empty());
        assert!(summary.wrong_question_numbers.is_empty());
    }

    #[test]
    fn prompt_lines_mention_direction_against_average() {
        let text = format_rows_for_prompt(&[row(2, "sector area", false, 0.3)]);
        assert!(text.contains("Q2 (sector area): wrong"));
        assert!(text.contains("30.0%p below average"));
    }
}
