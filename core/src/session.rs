use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Sliding window for the conversation transcript kept on a session.
pub const HISTORY_LIMIT: usize = 20;

/// Identity of a tutoring session. One `LearningSession` exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub struct SessionKey {
    pub learner_id: String,
    pub session_id: String,
}

impl SessionKey {
    pub fn new(learner_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            learner_id: learner_id.into(),
            session_id: session_id.into(),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.learner_id, self.session_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Diagnosis,
    Practice,
    Completed,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Diagnosis => "diagnosis",
            Stage::Practice => "practice",
            Stage::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A practice item produced on demand by the language model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct GeneratedItem {
    #[serde(alias = "new_question_text")]
    pub question_text: String,
    pub correct_answer: String,
    pub explanation: String,
}

/// How the current problem was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProblemOutcome {
    Solved,
    Revealed,
}

/// Per-concept facts captured once from the diagnostic results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DiagnosticProfile {
    /// Learner accuracy per concept, 0.0-1.0
    pub concept_accuracy: BTreeMap<String, f64>,
    /// Concept of each diagnostic item, keyed by item id
    pub item_concepts: BTreeMap<String, String>,
}

/// Aggregated counters presented by the session-summary action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SessionSummary {
    pub total_problems_solved: u32,
    pub total_hints_used: u32,
    pub completed_concepts: Vec<String>,
    pub remaining_concepts: Vec<String>,
    pub session_duration_minutes: f64,
    pub stage: Stage,
}

/// Per-learner tutoring state. Owned by a `SessionStore`; every mutation goes
/// through the methods below so the invariants hold at each step.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LearningSession {
    learner_id: String,
    session_id: String,
    stage: Stage,
    weakest_concepts: Vec<String>,
    completed_concepts: Vec<String>,
    current_concept: Option<String>,
    current_problem: Option<GeneratedItem>,
    problem_outcome: Option<ProblemOutcome>,
    attempt_count: u32,
    conversation_history: Vec<ConversationTurn>,
    diagnostics: DiagnosticProfile,
    total_problems_solved: u32,
    total_hints_used: u32,
    started_at: DateTime<Utc>,
    last_activity_at: DateTime<Utc>,
}

impl LearningSession {
    pub fn new(
        key: SessionKey,
        weakest_concepts: Vec<String>,
        diagnostics: DiagnosticProfile,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            learner_id: key.learner_id,
            session_id: key.session_id,
            stage: Stage::Diagnosis,
            weakest_concepts,
            completed_concepts: Vec::new(),
            current_concept: None,
            current_problem: None,
            problem_outcome: None,
            attempt_count: 0,
            conversation_history: Vec::new(),
            diagnostics,
            total_problems_solved: 0,
            total_hints_used: 0,
            started_at: now,
            last_activity_at: now,
        }
    }

    pub fn key(&self) -> SessionKey {
        SessionKey::new(self.learner_id.clone(), self.session_id.clone())
    }

    pub fn learner_id(&self) -> &str {
        &self.learner_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn weakest_concepts(&self) -> &[String] {
        &self.weakest_concepts
    }

    pub fn completed_concepts(&self) -> &[String] {
        &self.completed_concepts
    }

    pub fn current_concept(&self) -> Option<&str> {
        self.current_concept.as_deref()
    }

    pub fn current_problem(&self) -> Option<&GeneratedItem> {
        self.current_problem.as_ref()
    }

    pub fn problem_outcome(&self) -> Option<ProblemOutcome> {
        self.problem_outcome
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn conversation_history(&self) -> &[ConversationTurn] {
        &self.conversation_history
    }

    pub fn total_problems_solved(&self) -> u32 {
        self.total_problems_solved
    }

    pub fn total_hints_used(&self) -> u32 {
        self.total_hints_used
    }

    pub fn last_activity_at(&self) -> DateTime<Utc> {
        self.last_activity_at
    }

    pub fn is_completed(&self) -> bool {
        self.stage == Stage::Completed
    }

    /// A problem is open while it is set and has not been solved or revealed.
    pub fn has_open_problem(&self) -> bool {
        self.current_problem.is_some() && self.problem_outcome.is_none()
    }

    pub fn accuracy_for(&self, concept: &str) -> Option<f64> {
        self.diagnostics.concept_accuracy.get(concept).copied()
    }

    pub fn concept_of_item(&self, item_id: &str) -> Option<&str> {
        self.diagnostics.item_concepts.get(item_id).map(String::as_str)
    }

    /// The most recent `limit` turns, oldest first.
    pub fn recent_history(&self, limit: usize) -> &[ConversationTurn] {
        let start = self.conversation_history.len().saturating_sub(limit);
        &self.conversation_history[start..]
    }

    /// Weak concepts not yet completed, in priority order.
    pub fn remaining_concepts(&self) -> Vec<String> {
        self.weakest_concepts
            .iter()
            .filter(|concept| !self.completed_concepts.contains(concept))
            .cloned()
            .collect()
    }

    pub fn next_concept(&self) -> Option<&str> {
        self.weakest_concepts
            .iter()
            .find(|concept| !self.completed_concepts.contains(concept))
            .map(String::as_str)
    }

    /// Replace the current problem wholesale and enter practice on `concept`.
    pub fn begin_problem(&mut self, concept: &str, item: GeneratedItem) {
        self.current_concept = Some(concept.to_string());
        self.current_problem = Some(item);
        self.problem_outcome = None;
        self.attempt_count = 0;
        self.stage = Stage::Practice;
    }

    /// Count a substantive answer attempt and return the new total.
    pub fn record_attempt(&mut self) -> u32 {
        self.attempt_count += 1;
        self.attempt_count
    }

    /// Close the current problem. A solved problem completes the current concept.
    pub fn resolve_problem(&mut self, outcome: ProblemOutcome) {
        self.total_problems_solved += 1;
        self.problem_outcome = Some(outcome);
        if outcome == ProblemOutcome::Solved {
            if let Some(concept) = self.current_concept.clone() {
                self.mark_concept_completed(&concept);
            }
        }
    }

    pub fn mark_concept_completed(&mut self, concept: &str) {
        if !self.completed_concepts.iter().any(|c| c == concept) {
            self.completed_concepts.push(concept.to_string());
        }
    }

    pub fn record_hint(&mut self) {
        self.total_hints_used += 1;
    }

    /// Append the triggering input and the generated reply, keeping the window bounded.
    pub fn push_exchange(&mut self, user_input: &str, assistant_output: &str) {
        self.conversation_history
            .push(ConversationTurn::user(user_input));
        self.conversation_history
            .push(ConversationTurn::assistant(assistant_output));
        if self.conversation_history.len() > HISTORY_LIMIT {
            let overflow = self.conversation_history.len() - HISTORY_LIMIT;
            self.conversation_history.drain(..overflow);
        }
    }

    pub fn end(&mut self) {
        self.stage = Stage::Completed;
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity_at = now;
    }

    pub fn summary(&self, now: DateTime<Utc>) -> SessionSummary {
        let seconds = now.signed_duration_since(self.started_at).num_seconds().max(0);
        let minutes = (seconds as f64 / 60.0 * 10.0).round() / 10.0;
        SessionSummary {
            total_problems_solved: self.total_problems_solved,
            total_hints_used: self.total_hints_used,
            completed_concepts: self.completed_concepts.clone(),
            remaining_concepts: self.remaining_concepts(),
            session_duration_minutes: minutes,
            stage: self.stage,
        }
    }
}
