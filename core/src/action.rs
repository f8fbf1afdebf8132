use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::TutorError;

/// Closed catalogue of orchestrator actions, named as on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    StartPractice,
    ContinueLearning,
    NewProblemSameConcept,
    NextConcept,
    HarderProblem,
    EasierProblem,
    TextInput,
    RevealAnswer,
    ConceptExplanation,
    ExplainConcepts,
    AskQuestions,
    ItemFeedback,
    SessionSummary,
    EndSession,
    NewDiagnosis,
}

impl Action {
    pub const ALL: [Action; 15] = [
        Action::StartPractice,
        Action::ContinueLearning,
        Action::NewProblemSameConcept,
        Action::NextConcept,
        Action::HarderProblem,
        Action::EasierProblem,
        Action::TextInput,
        Action::RevealAnswer,
        Action::ConceptExplanation,
        Action::ExplainConcepts,
        Action::AskQuestions,
        Action::ItemFeedback,
        Action::SessionSummary,
        Action::EndSession,
        Action::NewDiagnosis,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::StartPractice => "start_practice",
            Action::ContinueLearning => "continue_learning",
            Action::NewProblemSameConcept => "new_problem_same_concept",
            Action::NextConcept => "next_concept",
            Action::HarderProblem => "harder_problem",
            Action::EasierProblem => "easier_problem",
            Action::TextInput => "text_input",
            Action::RevealAnswer => "reveal_answer",
            Action::ConceptExplanation => "concept_explanation",
            Action::ExplainConcepts => "explain_concepts",
            Action::AskQuestions => "ask_questions",
            Action::ItemFeedback => "item_feedback",
            Action::SessionSummary => "session_summary",
            Action::EndSession => "end_session",
            Action::NewDiagnosis => "new_diagnosis",
        }
    }

    /// Actions still accepted once a session is completed.
    pub fn allowed_when_completed(self) -> bool {
        matches!(self, Action::SessionSummary | Action::NewDiagnosis)
    }

    /// What the learner "said" when they tapped the button instead of typing.
    pub fn default_utterance(self) -> &'static str {
        match self {
            Action::StartPractice => "연습 시작할래",
            Action::ContinueLearning => "계속할래",
            Action::NewProblemSameConcept => "다른 문제 줘",
            Action::NextConcept => "다음 개념으로 넘어갈래",
            Action::HarderProblem => "더 어려운 문제 줘",
            Action::EasierProblem => "더 쉬운 문제 줘",
            Action::TextInput => "",
            Action::RevealAnswer => "정답 알려줘",
            Action::ConceptExplanation => "개념 설명해 줘",
            Action::ExplainConcepts => "취약한 개념 설명해 줘",
            Action::AskQuestions => "질문이 있어",
            Action::ItemFeedback => "진단 문제에 대해 알려줘",
            Action::SessionSummary => "학습 요약 보여줘",
            Action::EndSession => "그만할래",
            Action::NewDiagnosis => "새 진단 테스트 볼래",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = TutorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let name = value.trim();
        Action::ALL
            .into_iter()
            .find(|action| action.as_str() == name)
            .ok_or_else(|| {
                TutorError::invalid_action(name, format!("알 수 없는 요청이에요: {name}"))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_wire_name_round_trips() {
        for action in Action::ALL {
            assert_eq!(action.as_str().parse::<Action>().ok(), Some(action));
        }
    }

    #[test]
    fn unknown_name_is_invalid_action() {
        let err = "teleport".parse::<Action>().expect_err("unknown action");
        assert!(matches!(err, TutorError::InvalidAction { ref action, .. } if action == "teleport"));
    }

    #[test]
    fn completed_sessions_only_accept_summary_and_new_diagnosis() {
        let allowed: Vec<Action> = Action::ALL
            .into_iter()
            .filter(|a| a.allowed_when_completed())
            .collect();
        assert_eq!(allowed, vec![Action::SessionSummary, Action::NewDiagnosis]);
    }
}
