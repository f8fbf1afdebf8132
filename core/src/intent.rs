use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::TutorError;
use crate::llm::LlmGateway;
use crate::prompts;
use crate::session::{ConversationTurn, Stage};

/// Below this confidence a classification is treated as ambiguous.
pub const CONFIDENCE_THRESHOLD: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    AnswerAttempt,
    HintRequest,
    AnswerRequest,
    ConceptExplanation,
    EasierProblem,
    HarderProblem,
    DifferentProblem,
    DifferentConcept,
    SessionControl,
    Clarification,
    GeneralChat,
}

impl Intent {
    pub fn parse(value: &str) -> Option<Self> {
        let intent = match value.trim() {
            "answer_attempt" => Intent::AnswerAttempt,
            "hint_request" => Intent::HintRequest,
            "answer_request" => Intent::AnswerRequest,
            "concept_explanation" => Intent::ConceptExplanation,
            "easier_problem" => Intent::EasierProblem,
            "harder_problem" => Intent::HarderProblem,
            "different_problem" => Intent::DifferentProblem,
            "different_concept" => Intent::DifferentConcept,
            "session_control" => Intent::SessionControl,
            "clarification" => Intent::Clarification,
            "general_chat" => Intent::GeneralChat,
            _ => return None,
        };
        Some(intent)
    }

    /// Coarse request kind used by the diagnostic-item flow.
    pub fn request_kind(self) -> RequestKind {
        match self {
            Intent::EasierProblem | Intent::HarderProblem | Intent::DifferentProblem => {
                RequestKind::SimilarItemRequest
            }
            Intent::HintRequest => RequestKind::HintRequest,
            _ => RequestKind::FeedbackRequest,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    SimilarItemRequest,
    HintRequest,
    FeedbackRequest,
}

/// What the classifier knows about the learner's situation.
#[derive(Debug, Clone, PartialEq)]
pub struct IntentContext {
    pub stage: Stage,
    pub has_current_problem: bool,
    pub current_concept: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub intent: Intent,
    /// Clamped to 0.0-1.0
    pub confidence: f64,
    pub rationale: String,
}

/// Primary classification capability. Failures are absorbed by `IntentResolver`.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(
        &self,
        text: &str,
        context: &IntentContext,
        history: &[ConversationTurn],
    ) -> Result<Classification, TutorError>;
}

/// Classifier backed by the language model's structured output.
pub struct LlmIntentClassifier {
    gateway: Arc<dyn LlmGateway>,
}

impl LlmIntentClassifier {
    pub fn new(gateway: Arc<dyn LlmGateway>) -> Self {
        Self { gateway }
    }
}

#[derive(Debug, Deserialize)]
struct RawClassification {
    intent: Option<String>,
    confidence: Option<f64>,
    #[serde(default, alias = "rationale")]
    reasoning: String,
}

pub(crate) fn parse_classification(raw: &str) -> Result<Classification, TutorError> {
    let parsed: RawClassification = serde_json::from_str(raw.trim())
        .map_err(|e| TutorError::GenerationFailed(format!("unparseable intent: {e}")))?;
    // Unknown labels and a missing score fall to general chat at a neutral 0.5,
    // which sits under the threshold and lands on the fallback.
    let intent = parsed
        .intent
        .as_deref()
        .and_then(Intent::parse)
        .unwrap_or(Intent::GeneralChat);
    let confidence = parsed.confidence.unwrap_or(0.5).clamp(0.0, 1.0);
    Ok(Classification {
        intent,
        confidence,
        rationale: parsed.reasoning,
    })
}

#[async_trait]
impl IntentClassifier for LlmIntentClassifier {
    async fn classify(
        &self,
        text: &str,
        context: &IntentContext,
        history: &[ConversationTurn],
    ) -> Result<Classification, TutorError> {
        let request = prompts::intent(text, context).with_history(history);
        let raw = self.gateway.generate(request).await?;
        parse_classification(&raw)
    }
}

/// Why the deterministic fallback was used.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FallbackReason {
    ClassifierUnavailable,
    LowConfidence(f64),
}

/// Keyword matcher that always yields a request kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordFallback;

const LOW_CONFIDENCE_SIMILAR: &[&str] = &["문제", "유사", "비슷"];
const LOW_CONFIDENCE_HINT: &[&str] = &["힌트", "도움"];
const UNAVAILABLE_SIMILAR: &[&str] = &["비슷한 문제", "연습 문제", "유사 문항", "유사문항"];
const UNAVAILABLE_HINT: &[&str] = &["힌트", "모르겠어"];

impl KeywordFallback {
    /// A model that answered at all gets the broad keyword sets; when it could
    /// not answer only explicit phrases count.
    pub fn resolve(&self, text: &str, reason: FallbackReason) -> RequestKind {
        let lowered = text.to_lowercase();
        let (similar, hint) = match reason {
            FallbackReason::LowConfidence(_) => (LOW_CONFIDENCE_SIMILAR, LOW_CONFIDENCE_HINT),
            FallbackReason::ClassifierUnavailable => (UNAVAILABLE_SIMILAR, UNAVAILABLE_HINT),
        };
        if similar.iter().any(|kw| lowered.contains(kw)) {
            RequestKind::SimilarItemRequest
        } else if hint.iter().any(|kw| lowered.contains(kw)) {
            RequestKind::HintRequest
        } else {
            RequestKind::FeedbackRequest
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedIntent {
    Classified(Classification),
    Fallback {
        kind: RequestKind,
        reason: FallbackReason,
    },
}

impl ResolvedIntent {
    pub fn request_kind(&self) -> RequestKind {
        match self {
            ResolvedIntent::Classified(c) => c.intent.request_kind(),
            ResolvedIntent::Fallback { kind, .. } => *kind,
        }
    }
}

/// Two-tier strategy: the primary classifier, then `KeywordFallback` when
/// it fails or is unsure. Never returns an error.
pub struct IntentResolver {
    primary: Arc<dyn IntentClassifier>,
    fallback: KeywordFallback,
    threshold: f64,
}

impl IntentResolver {
    pub fn new(primary: Arc<dyn IntentClassifier>) -> Self {
        Self {
            primary,
            fallback: KeywordFallback,
            threshold: CONFIDENCE_THRESHOLD,
        }
    }

    pub async fn resolve(
        &self,
        text: &str,
        context: &IntentContext,
        history: &[ConversationTurn],
    ) -> ResolvedIntent {
        match self.primary.classify(text, context, history).await {
            Ok(classification) if classification.confidence >= self.threshold => {
                tracing::info!(
                    intent = ?classification.intent,
                    confidence = classification.confidence,
                    rationale = %classification.rationale,
                    "Classified learner message"
                );
                ResolvedIntent::Classified(classification)
            }
            Ok(classification) => {
                let reason = FallbackReason::LowConfidence(classification.confidence);
                tracing::warn!(
                    intent = ?classification.intent,
                    confidence = classification.confidence,
                    "Low-confidence intent, using keyword fallback"
                );
                ResolvedIntent::Fallback {
                    kind: self.fallback.resolve(text, reason),
                    reason,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Intent classification failed, using keyword fallback");
                let reason = FallbackReason::ClassifierUnavailable;
                ResolvedIntent::Fallback {
                    kind: self.fallback.resolve(text, reason),
                    reason,
                }
            }
        }
    }
}
