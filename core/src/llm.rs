use async_trait::async_trait;

use crate::error::TutorError;
use crate::session::ConversationTurn;

/// Shape of the text the model must return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Text,
    /// A single JSON object (structured-output mode).
    JsonObject,
}

/// One stateless generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system: String,
    pub user: String,
    /// Prior turns, oldest first, placed between the system and user messages.
    pub history: Vec<ConversationTurn>,
    pub format: ResponseFormat,
}

impl GenerationRequest {
    pub fn text(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            history: Vec::new(),
            format: ResponseFormat::Text,
        }
    }

    pub fn json(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            format: ResponseFormat::JsonObject,
            ..Self::text(system, user)
        }
    }

    pub fn with_history(mut self, history: &[ConversationTurn]) -> Self {
        self.history = history.to_vec();
        self
    }
}

/// Hosted language model. Transport and quota failures surface as
/// `TutorError::GenerationFailed`.
#[async_trait]
pub trait LlmGateway: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<String, TutorError>;
}
