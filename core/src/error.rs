use serde::Serialize;
use utoipa::ToSchema;

/// Structured error response returned by the HTTP surface.
/// Carries a machine code for the client and a short learner-safe message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiError {
    /// Machine-readable error code (e.g. "validation_failed", "not_found", "invalid_action")
    pub error: String,
    /// Short description of what went wrong. Never contains internal error text.
    pub message: String,
    /// Which field caused the error (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// The value that was received (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received: Option<serde_json::Value>,
    /// Request ID for tracing and debugging
    pub request_id: String,
    /// Hint about how to recover
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_hint: Option<String>,
}

/// Error codes used across the API
pub mod codes {
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const NOT_FOUND: &str = "not_found";
    pub const NO_DIAGNOSTIC_DATA: &str = "no_diagnostic_data";
    pub const INVALID_ACTION: &str = "invalid_action";
    pub const GENERATION_FAILED: &str = "generation_failed";
    pub const INTERNAL_ERROR: &str = "internal_error";
    pub const RATE_LIMITED: &str = "rate_limited";
}

/// Failures that cross a component boundary.
///
/// The evaluator and the intent resolver never produce these; they absorb
/// malformed input and degrade to conservative defaults.
#[derive(Debug, thiserror::Error)]
pub enum TutorError {
    #[error("no active session for learner '{learner_id}' / session '{session_id}'")]
    SessionNotFound {
        learner_id: String,
        session_id: String,
    },

    #[error("content generation failed: {0}")]
    GenerationFailed(String),

    #[error("action '{action}' is not available: {reason}")]
    InvalidAction { action: String, reason: String },

    #[error("no diagnostic results for learner '{learner_id}' / session '{session_id}'")]
    NoDiagnosticData {
        learner_id: String,
        session_id: String,
    },

    #[error("diagnostic results unavailable: {0}")]
    ResultsUnavailable(String),
}

impl TutorError {
    pub fn invalid_action(action: impl Into<String>, reason: impl Into<String>) -> Self {
        TutorError::InvalidAction {
            action: action.into(),
            reason: reason.into(),
        }
    }

    /// Machine code used when this error is rendered as an `ApiError`.
    pub fn code(&self) -> &'static str {
        match self {
            TutorError::SessionNotFound { .. } => codes::NOT_FOUND,
            TutorError::GenerationFailed(_) => codes::GENERATION_FAILED,
            TutorError::InvalidAction { .. } => codes::INVALID_ACTION,
            TutorError::NoDiagnosticData { .. } => codes::NO_DIAGNOSTIC_DATA,
            TutorError::ResultsUnavailable(_) => codes::INTERNAL_ERROR,
        }
    }

    /// Message safe to show to the learner.
    pub fn user_message(&self) -> String {
        match self {
            TutorError::SessionNotFound { .. } => {
                "세션을 찾을 수 없어요. 진단 결과로 새 세션을 시작해 주세요.".to_string()
            }
            TutorError::GenerationFailed(_) => {
                "답변을 만드는 중에 문제가 생겼어요. 잠시 후 다시 시도해 주세요.".to_string()
            }
            TutorError::InvalidAction { reason, .. } => reason.clone(),
            TutorError::NoDiagnosticData { .. } => {
                "이 세션의 진단 결과를 찾을 수 없어요.".to_string()
            }
            TutorError::ResultsUnavailable(_) => {
                "진단 결과를 불러오지 못했어요. 잠시 후 다시 시도해 주세요.".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_action_surfaces_reason_as_user_message() {
        let err = TutorError::invalid_action("teleport", "알 수 없는 요청이에요: teleport");
        assert_eq!(err.code(), codes::INVALID_ACTION);
        assert_eq!(err.user_message(), "알 수 없는 요청이에요: teleport");
    }

    #[test]
    fn generation_failure_hides_internal_text() {
        let err = TutorError::GenerationFailed("upstream 429: quota exceeded".to_string());
        assert_eq!(err.code(), codes::GENERATION_FAILED);
        assert!(!err.user_message().contains("quota"));
    }
}
