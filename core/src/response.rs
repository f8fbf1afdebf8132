use serde::Serialize;
use utoipa::ToSchema;

use crate::action::Action;
use crate::evaluator::AnswerAnalysis;
use crate::hint::HintAnalysis;
use crate::intent::RequestKind;
use crate::results::DiagnosticSummary;
use crate::session::{ConversationTurn, SessionSummary, Stage};

/// One entry of the menu of next actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct QuickReply {
    pub label: String,
    pub action: Action,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl QuickReply {
    pub fn new(label: impl Into<String>, action: Action) -> Self {
        Self {
            label: label.into(),
            action,
            data: None,
        }
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }
}

/// Result of a single orchestrator action.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ActionResponse {
    pub feedback: String,
    /// Valid next actions. Empty only after `end_session`.
    pub quick_replies: Vec<QuickReply>,
    /// Text of the problem being worked on, when this response shows one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer_analysis: Option<AnswerAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint_analysis: Option<HintAnalysis>,
    /// How a diagnostic-item request was understood
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_kind: Option<RequestKind>,
    /// The current problem is closed (solved or revealed)
    pub is_completed: bool,
    pub is_answer_revealed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_summary: Option<SessionSummary>,
    pub is_session_ended: bool,
    /// The caller must create a new session identity to continue
    pub requires_new_session: bool,
    pub stage: Stage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_concept: Option<String>,
    pub conversation_history: Vec<ConversationTurn>,
}

/// Result of creating a session from diagnostic results.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StartSessionResponse {
    pub learner_id: String,
    pub session_id: String,
    pub feedback: String,
    pub diagnostic: DiagnosticSummary,
    pub quick_replies: Vec<QuickReply>,
    pub stage: Stage,
    pub conversation_history: Vec<ConversationTurn>,
}
