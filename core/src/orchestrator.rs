use std::sync::Arc;
use std::sync::LazyLock;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;

use crate::action::Action;
use crate::error::TutorError;
use crate::evaluator::{AnswerAnalysis, AnswerEvaluator, contains_number, is_help_request};
use crate::hint::{HintAnalysis, HintLevel};
use crate::intent::{
    Intent, IntentContext, IntentResolver, LlmIntentClassifier, RequestKind, ResolvedIntent,
};
use crate::item::parse_generated_item;
use crate::llm::{GenerationRequest, LlmGateway};
use crate::prompts::{self, Difficulty};
use crate::response::{ActionResponse, QuickReply, StartSessionResponse};
use crate::results::{DiagnosticSummary, SessionResultProvider};
use crate::session::{LearningSession, ProblemOutcome, SessionKey, SessionSummary, Stage};
use crate::store::{SessionStore, not_found};

/// Substantive attempts allowed before the answer is revealed.
pub const MAX_ATTEMPTS: u32 = 3;

/// Turns of context sent with content generation.
const GENERATION_HISTORY: usize = 6;
/// Turns of context sent with intent classification.
const INTENT_HISTORY: usize = 4;

static QUESTION_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("valid question number regex"));

/// What a handler produced before it is bound to the committed session.
#[derive(Debug, Default)]
struct Reply {
    feedback: String,
    quick_replies: Vec<QuickReply>,
    /// Informational replies leave the transcript untouched.
    informational: bool,
    question_text: Option<String>,
    answer_analysis: Option<AnswerAnalysis>,
    hint_analysis: Option<HintAnalysis>,
    request_kind: Option<RequestKind>,
    is_completed: bool,
    is_answer_revealed: bool,
    attempt_count: Option<u32>,
    session_summary: Option<SessionSummary>,
    is_session_ended: bool,
    requires_new_session: bool,
}

impl Reply {
    fn content(feedback: String, quick_replies: Vec<QuickReply>) -> Self {
        Self {
            feedback,
            quick_replies,
            ..Self::default()
        }
    }

    fn info(feedback: impl Into<String>, quick_replies: Vec<QuickReply>) -> Self {
        Self {
            feedback: feedback.into(),
            quick_replies,
            informational: true,
            ..Self::default()
        }
    }

    fn into_response(self, session: &LearningSession) -> ActionResponse {
        ActionResponse {
            feedback: self.feedback,
            quick_replies: self.quick_replies,
            question_text: self.question_text,
            answer_analysis: self.answer_analysis,
            hint_analysis: self.hint_analysis,
            request_kind: self.request_kind,
            is_completed: self.is_completed,
            is_answer_revealed: self.is_answer_revealed,
            attempt_count: self.attempt_count,
            session_summary: self.session_summary,
            is_session_ended: self.is_session_ended,
            requires_new_session: self.requires_new_session,
            stage: session.stage(),
            current_concept: session.current_concept().map(str::to_string),
            conversation_history: session.conversation_history().to_vec(),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn open_problem_replies() -> Vec<QuickReply> {
    vec![
        QuickReply::new("개념 설명 듣기", Action::ConceptExplanation),
        QuickReply::new("더 쉬운 문제", Action::EasierProblem),
        QuickReply::new("다른 문제", Action::NewProblemSameConcept),
        QuickReply::new("정답 보기", Action::RevealAnswer),
    ]
}

fn resolved_problem_replies() -> Vec<QuickReply> {
    vec![
        QuickReply::new("비슷한 문제 더 풀기", Action::NewProblemSameConcept),
        QuickReply::new("더 어려운 문제", Action::HarderProblem),
        QuickReply::new("다음 개념으로", Action::NextConcept),
        QuickReply::new("학습 요약 보기", Action::SessionSummary),
    ]
}

fn concept_prompt_replies() -> Vec<QuickReply> {
    vec![
        QuickReply::new("질문하기", Action::AskQuestions),
        QuickReply::new("새 진단 테스트", Action::NewDiagnosis),
        QuickReply::new("학습 종료", Action::EndSession),
    ]
}

/// Menu for a session that is not currently working a problem.
fn idle_replies(session: &LearningSession) -> Vec<QuickReply> {
    if session.has_open_problem() {
        return open_problem_replies();
    }
    if session.current_problem().is_some() {
        return resolved_problem_replies();
    }
    match session.next_concept() {
        Some(concept) => vec![
            QuickReply::new(format!("'{concept}' 연습 시작"), Action::StartPractice)
                .with_data(concept),
            QuickReply::new("취약 개념 설명 듣기", Action::ExplainConcepts).with_data(concept),
            QuickReply::new("질문하기", Action::AskQuestions),
            QuickReply::new("학습 요약 보기", Action::SessionSummary),
        ],
        None => concept_prompt_replies(),
    }
}

/// The session state machine. Each action runs against a draft copy of the
/// session and is committed to the store only when every collaborator call
/// succeeded.
pub struct SessionOrchestrator {
    store: Arc<dyn SessionStore>,
    results: Arc<dyn SessionResultProvider>,
    gateway: Arc<dyn LlmGateway>,
    intents: IntentResolver,
    evaluator: AnswerEvaluator,
}

impl SessionOrchestrator {
    pub fn new(
        store: Arc<dyn SessionStore>,
        results: Arc<dyn SessionResultProvider>,
        gateway: Arc<dyn LlmGateway>,
    ) -> Self {
        let intents = IntentResolver::new(Arc::new(LlmIntentClassifier::new(gateway.clone())));
        Self {
            store,
            results,
            gateway,
            intents,
            evaluator: AnswerEvaluator,
        }
    }

    /// Swap the primary intent classifier.
    pub fn with_intent_resolver(mut self, intents: IntentResolver) -> Self {
        self.intents = intents;
        self
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Summarize the diagnostic results and open a session in the diagnosis stage.
    pub async fn start_session(
        &self,
        learner_id: &str,
        session_id: &str,
    ) -> Result<StartSessionResponse, TutorError> {
        let key = SessionKey::new(learner_id, session_id);
        if self.store.get(&key).is_some() {
            return Err(TutorError::invalid_action(
                "start_session",
                "이미 진행 중인 세션이에요. 새 진단은 새 세션으로 시작해 주세요.",
            ));
        }

        let rows = self.results.get_results(learner_id, session_id).await?;
        if rows.is_empty() {
            return Err(TutorError::NoDiagnosticData {
                learner_id: learner_id.to_string(),
                session_id: session_id.to_string(),
            });
        }
        let summary = DiagnosticSummary::from_rows(&rows);
        let feedback = self
            .generate(prompts::diagnostic_summary(&summary, &rows))
            .await?;

        self.store.create(
            key.clone(),
            summary.weakest_concepts.clone(),
            summary.profile.clone(),
        );
        let session = self.store.mutate(&key, &mut |s| {
            s.push_exchange("진단 결과 알려줘", &feedback);
        })?;

        tracing::info!(
            learner_id,
            session_id,
            weak_concepts = summary.weakest_concepts.len(),
            "Session started"
        );

        Ok(StartSessionResponse {
            learner_id: learner_id.to_string(),
            session_id: session_id.to_string(),
            feedback,
            quick_replies: idle_replies(&session),
            diagnostic: summary,
            stage: session.stage(),
            conversation_history: session.conversation_history().to_vec(),
        })
    }

    pub fn snapshot(&self, learner_id: &str, session_id: &str) -> Result<LearningSession, TutorError> {
        let key = SessionKey::new(learner_id, session_id);
        self.store.get(&key).ok_or_else(|| not_found(&key))
    }

    /// Explicitly drop a session from the store.
    pub fn evict(&self, learner_id: &str, session_id: &str) -> Result<LearningSession, TutorError> {
        let key = SessionKey::new(learner_id, session_id);
        self.store.remove(&key).ok_or_else(|| not_found(&key))
    }

    /// Reclaim completed sessions and sessions idle for longer than `idle_ttl`.
    /// Sessions for which `in_use` holds are kept until a later sweep.
    pub fn evict_stale(
        &self,
        now: DateTime<Utc>,
        idle_ttl: Duration,
        in_use: &dyn Fn(&SessionKey) -> bool,
    ) -> Vec<SessionKey> {
        self.store.evict_where(&|session| {
            (session.is_completed() || now - session.last_activity_at() > idle_ttl)
                && !in_use(&session.key())
        })
    }

    /// Run one action against a session.
    pub async fn handle_action(
        &self,
        learner_id: &str,
        session_id: &str,
        action: Action,
        data: Option<&str>,
        text: Option<&str>,
    ) -> Result<ActionResponse, TutorError> {
        let key = SessionKey::new(learner_id, session_id);
        let session = self.store.get(&key).ok_or_else(|| not_found(&key))?;

        tracing::info!(
            learner_id,
            session_id,
            action = action.as_str(),
            stage = session.stage().as_str(),
            "Handling action"
        );

        if session.is_completed() && !action.allowed_when_completed() {
            return Err(TutorError::invalid_action(
                action.as_str(),
                "이미 종료된 세션이에요. 새 진단 테스트로 다시 시작해 주세요.",
            ));
        }

        let data = non_empty(data);
        let text = non_empty(text);
        let mut draft = session;
        let reply = self.dispatch(&mut draft, action, data, text).await?;

        if !reply.informational {
            let user_turn = text.unwrap_or(action.default_utterance());
            draft.push_exchange(user_turn, &reply.feedback);
        }
        draft.touch(Utc::now());
        let committed = self.store.mutate(&key, &mut |s| *s = draft.clone())?;

        Ok(reply.into_response(&committed))
    }

    async fn dispatch(
        &self,
        s: &mut LearningSession,
        action: Action,
        data: Option<&str>,
        text: Option<&str>,
    ) -> Result<Reply, TutorError> {
        match action {
            Action::StartPractice => self.start_practice(s, data).await,
            Action::ContinueLearning => self.continue_learning(s, data).await,
            Action::NewProblemSameConcept => self.regenerate(s, data, Difficulty::Same).await,
            Action::HarderProblem => self.regenerate(s, data, Difficulty::Harder).await,
            Action::EasierProblem => self.regenerate(s, data, Difficulty::Easier).await,
            Action::NextConcept => self.next_concept(s).await,
            Action::TextInput => self.text_input(s, text).await,
            Action::RevealAnswer => Ok(self.reveal_answer(s)),
            Action::ConceptExplanation => self.explain_current_concept(s, data).await,
            Action::ExplainConcepts => self.explain_weak_concept(s, data).await,
            Action::AskQuestions => self.ask_question(s, text).await,
            Action::ItemFeedback => self.item_feedback(s, text).await,
            Action::SessionSummary => Ok(self.session_summary(s)),
            Action::EndSession => Ok(self.end_session(s)),
            Action::NewDiagnosis => Ok(self.new_diagnosis(s)),
        }
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String, TutorError> {
        self.gateway.generate(request).await.map_err(|e| {
            tracing::error!(error = %e, "Content generation failed");
            e
        })
    }

    // -- practice --------------------------------------------------------

    async fn start_practice(
        &self,
        s: &mut LearningSession,
        data: Option<&str>,
    ) -> Result<Reply, TutorError> {
        let concept = data
            .map(str::to_string)
            .or_else(|| s.next_concept().map(str::to_string));
        match concept {
            Some(concept) => self.new_problem(s, &concept, Difficulty::Same).await,
            None if s.weakest_concepts().is_empty() => Ok(ask_for_concept()),
            None => Ok(self.session_summary(s)),
        }
    }

    async fn continue_learning(
        &self,
        s: &mut LearningSession,
        data: Option<&str>,
    ) -> Result<Reply, TutorError> {
        if let Some(problem) = s.current_problem().filter(|_| s.has_open_problem()) {
            let mut reply = Reply::info(
                format!("지금 풀고 있는 문제야. 천천히 다시 풀어 봐!\n\n{}", problem.question_text),
                open_problem_replies(),
            );
            reply.question_text = Some(problem.question_text.clone());
            return Ok(reply);
        }
        match s.current_concept().map(str::to_string) {
            Some(concept) if s.current_problem().is_some() => {
                self.new_problem(s, &concept, Difficulty::Same).await
            }
            _ => self.start_practice(s, data).await,
        }
    }

    async fn regenerate(
        &self,
        s: &mut LearningSession,
        data: Option<&str>,
        difficulty: Difficulty,
    ) -> Result<Reply, TutorError> {
        let concept = s
            .current_concept()
            .or(data)
            .or_else(|| s.next_concept())
            .map(str::to_string);
        match concept {
            Some(concept) => self.new_problem(s, &concept, difficulty).await,
            None => Ok(ask_for_concept()),
        }
    }

    async fn next_concept(&self, s: &mut LearningSession) -> Result<Reply, TutorError> {
        match s.next_concept().map(str::to_string) {
            Some(concept) => self.new_problem(s, &concept, Difficulty::Same).await,
            None => Ok(self.session_summary(s)),
        }
    }

    async fn new_problem(
        &self,
        s: &mut LearningSession,
        concept: &str,
        difficulty: Difficulty,
    ) -> Result<Reply, TutorError> {
        let request = prompts::similar_item(concept, s.accuracy_for(concept), difficulty)
            .with_history(s.recent_history(GENERATION_HISTORY));
        let raw = self.generate(request).await?;
        let item = parse_generated_item(&raw)?;

        let lead = match difficulty {
            Difficulty::Same => format!("좋아! '{concept}' 개념을 연습해 볼까? 아래 문제를 풀어 봐."),
            Difficulty::Easier => format!("조금 더 쉬운 '{concept}' 문제를 준비했어."),
            Difficulty::Harder => format!("이번엔 조금 더 도전적인 '{concept}' 문제야!"),
        };
        let mut reply = Reply::content(
            format!("{lead}\n\n{}", item.question_text),
            open_problem_replies(),
        );
        reply.question_text = Some(item.question_text.clone());
        s.begin_problem(concept, item);
        Ok(reply)
    }

    async fn submit_answer(
        &self,
        s: &mut LearningSession,
        input: &str,
    ) -> Result<Reply, TutorError> {
        let Some(problem) = s.current_problem().cloned() else {
            return Ok(no_open_problem(s));
        };
        if is_help_request(input) {
            let analysis = self
                .evaluator
                .evaluate(input, &problem.correct_answer, &problem.question_text);
            let mut reply = self.problem_hint(s, input, None).await?;
            reply.attempt_count = Some(s.attempt_count());
            reply.answer_analysis = Some(analysis);
            return Ok(reply);
        }

        let attempt = s.record_attempt();
        if attempt > MAX_ATTEMPTS {
            let shown = attempt - 1;
            s.resolve_problem(ProblemOutcome::Revealed);
            let mut reply = Reply::content(
                format!(
                    "🎯 {shown}번이나 도전했네, 충분히 노력했어! 이제 정답을 알려 줄게.\n\n\
                     📍 정답: {}\n\n💡 해설:\n{}",
                    problem.correct_answer, problem.explanation
                ),
                resolved_problem_replies(),
            );
            reply.is_completed = true;
            reply.is_answer_revealed = true;
            reply.attempt_count = Some(shown);
            reply.answer_analysis = Some(AnswerAnalysis::revealed());
            return Ok(reply);
        }

        let analysis = self
            .evaluator
            .evaluate(input, &problem.correct_answer, &problem.question_text);
        if analysis.is_correct {
            s.resolve_problem(ProblemOutcome::Solved);
            let mut reply = Reply::content(
                format!(
                    "🎉 정답이야! 정말 잘했어!\n\n📍 정답: {}\n💡 {}",
                    problem.correct_answer, problem.explanation
                ),
                resolved_problem_replies(),
            );
            reply.is_completed = true;
            reply.attempt_count = Some(attempt);
            reply.answer_analysis = Some(analysis);
            return Ok(reply);
        }

        let mut reply = self.problem_hint(s, input, Some(&analysis)).await?;
        reply.attempt_count = Some(attempt);
        reply.answer_analysis = Some(analysis);
        Ok(reply)
    }

    /// Hint on the open problem: guided when the attempt was close, otherwise
    /// personalized to the concept accuracy.
    async fn problem_hint(
        &self,
        s: &mut LearningSession,
        input: &str,
        analysis: Option<&AnswerAnalysis>,
    ) -> Result<Reply, TutorError> {
        let Some(problem) = s.current_problem().cloned() else {
            return Ok(no_open_problem(s));
        };
        let concept = s.current_concept().unwrap_or_default().to_string();
        let accuracy = s.accuracy_for(&concept);
        let level = HintLevel::from_accuracy(accuracy);
        let guided = analysis.filter(|a| a.is_partial_correct || a.has_good_approach);
        let history = s.recent_history(GENERATION_HISTORY);

        let (hint, feedback) = match guided {
            Some(a) => {
                let request = prompts::guided_hint(&problem.question_text, input, a, level)
                    .with_history(history);
                let hint = self.generate(request).await?;
                let encouragement = if a.is_partial_correct {
                    "🎯 숫자는 맞았어! 답을 쓴 방식이나 단위를 확인해 봐."
                } else {
                    "👍 접근 방법이 좋아! 그 방향으로 계속 생각해 봐."
                };
                let feedback = format!("{encouragement}\n\n{hint}");
                (hint, feedback)
            }
            None => {
                let request = prompts::personalized_hint(
                    &problem.question_text,
                    input,
                    &concept,
                    accuracy,
                    level,
                )
                .with_history(history);
                let hint = self.generate(request).await?;
                (hint.clone(), hint)
            }
        };

        s.record_hint();
        let mut reply = Reply::content(feedback, open_problem_replies());
        reply.hint_analysis = Some(HintAnalysis::analyze(&hint, level, guided.is_some()));
        Ok(reply)
    }

    fn reveal_answer(&self, s: &mut LearningSession) -> Reply {
        let Some(problem) = s.current_problem().cloned().filter(|_| s.has_open_problem()) else {
            return no_open_problem(s);
        };
        let attempts = s.attempt_count();
        s.resolve_problem(ProblemOutcome::Revealed);
        let mut reply = Reply::content(
            format!(
                "📍 정답: {}\n\n💡 해설:\n{}\n\n비슷한 문제로 다시 도전해 볼까?",
                problem.correct_answer, problem.explanation
            ),
            resolved_problem_replies(),
        );
        reply.is_completed = true;
        reply.is_answer_revealed = true;
        reply.attempt_count = Some(attempts);
        reply.answer_analysis = Some(AnswerAnalysis::revealed());
        reply
    }

    // -- explanations and conversation -----------------------------------

    async fn explain_current_concept(
        &self,
        s: &mut LearningSession,
        data: Option<&str>,
    ) -> Result<Reply, TutorError> {
        let Some(concept) = s
            .current_concept()
            .or(data)
            .or_else(|| s.next_concept())
            .map(str::to_string)
        else {
            return Ok(ask_for_concept());
        };
        let question = s
            .current_problem()
            .filter(|_| s.has_open_problem())
            .map(|p| p.question_text.clone());
        let request = prompts::concept_explanation(&concept, question.as_deref())
            .with_history(s.recent_history(GENERATION_HISTORY));
        let feedback = self.generate(request).await?;
        Ok(Reply::content(feedback, idle_replies(s)))
    }

    async fn explain_weak_concept(
        &self,
        s: &mut LearningSession,
        data: Option<&str>,
    ) -> Result<Reply, TutorError> {
        let Some(concept) = data.or_else(|| s.next_concept()).map(str::to_string) else {
            return Ok(Reply::info(
                "설명할 취약 개념이 없어요. 궁금한 개념이 있으면 알려 줘!",
                concept_prompt_replies(),
            ));
        };
        let request = prompts::concept_explanation(&concept, None)
            .with_history(s.recent_history(GENERATION_HISTORY));
        let feedback = self.generate(request).await?;
        let mut replies = vec![
            QuickReply::new(format!("'{concept}' 연습 시작"), Action::StartPractice)
                .with_data(concept.as_str()),
        ];
        replies.extend(
            idle_replies(s)
                .into_iter()
                .filter(|r| r.action != Action::StartPractice && r.action != Action::ExplainConcepts),
        );
        Ok(Reply::content(feedback, replies))
    }

    async fn ask_question(
        &self,
        s: &mut LearningSession,
        text: Option<&str>,
    ) -> Result<Reply, TutorError> {
        let Some(question) = text else {
            return Ok(Reply::info(
                "진단 결과에 대해 궁금한 점을 자유롭게 물어봐!",
                idle_replies(s),
            ));
        };
        let request = prompts::diagnostic_question(question, s.weakest_concepts())
            .with_history(s.recent_history(GENERATION_HISTORY));
        let feedback = self.generate(request).await?;
        Ok(Reply::content(feedback, idle_replies(s)))
    }

    async fn clarify(&self, s: &mut LearningSession, text: &str) -> Result<Reply, TutorError> {
        let question = s
            .current_problem()
            .filter(|_| s.has_open_problem())
            .map(|p| p.question_text.clone());
        let request = prompts::clarification(text, question.as_deref())
            .with_history(s.recent_history(GENERATION_HISTORY));
        let feedback = self.generate(request).await?;
        Ok(Reply::content(feedback, idle_replies(s)))
    }

    async fn general_chat(&self, s: &mut LearningSession, text: &str) -> Result<Reply, TutorError> {
        let request = prompts::general_chat(text, s.current_concept())
            .with_history(s.recent_history(GENERATION_HISTORY));
        let feedback = self.generate(request).await?;
        Ok(Reply::content(feedback, idle_replies(s)))
    }

    // -- diagnostic items ------------------------------------------------

    async fn item_feedback(
        &self,
        s: &mut LearningSession,
        text: Option<&str>,
    ) -> Result<Reply, TutorError> {
        let Some(text) = text else {
            return Ok(Reply::info(
                "몇 번 문제가 궁금한지 알려 줘. 예: \"3번 문제 힌트 주세요\"",
                idle_replies(s),
            ));
        };

        let kind = self
            .intents
            .resolve(text, &intent_context(s), &[])
            .await
            .request_kind();

        let seq = QUESTION_NUMBER_RE
            .find(text)
            .and_then(|m| m.as_str().parse::<i32>().ok());
        let concept = match seq {
            Some(seq) => {
                let item_id = self
                    .results
                    .get_item_id(s.learner_id(), s.session_id(), seq)
                    .await?;
                match item_id.as_deref().and_then(|id| s.concept_of_item(id)) {
                    Some(concept) => concept.to_string(),
                    None => {
                        return Ok(Reply::info(
                            format!("{seq}번 문제를 찾을 수 없어요. 번호를 다시 확인해 줘."),
                            idle_replies(s),
                        ));
                    }
                }
            }
            None => {
                let fallback = match kind {
                    RequestKind::SimilarItemRequest => s.next_concept().or(s.current_concept()),
                    _ => s.current_concept().or(s.next_concept()),
                };
                match fallback {
                    Some(concept) => concept.to_string(),
                    None => return Ok(ask_for_concept()),
                }
            }
        };

        let mut reply = match kind {
            RequestKind::SimilarItemRequest => {
                self.new_problem(s, &concept, Difficulty::Same).await?
            }
            RequestKind::HintRequest => {
                let request = prompts::concept_hint(&concept, text)
                    .with_history(s.recent_history(GENERATION_HISTORY));
                let hint = self.generate(request).await?;
                s.record_hint();
                let level = HintLevel::from_accuracy(s.accuracy_for(&concept));
                let mut reply = Reply::content(hint, idle_replies(s));
                reply.hint_analysis = Some(HintAnalysis::analyze(&reply.feedback, level, false));
                reply
            }
            RequestKind::FeedbackRequest => {
                let request = prompts::item_feedback(&concept, s.accuracy_for(&concept))
                    .with_history(s.recent_history(GENERATION_HISTORY));
                let feedback = self.generate(request).await?;
                Reply::content(feedback, idle_replies(s))
            }
        };
        reply.request_kind = Some(kind);
        Ok(reply)
    }

    // -- free text -------------------------------------------------------

    async fn text_input(
        &self,
        s: &mut LearningSession,
        text: Option<&str>,
    ) -> Result<Reply, TutorError> {
        let Some(text) = text else {
            return Ok(Reply::info("메시지를 입력해 줘!", idle_replies(s)));
        };
        let resolved = self
            .intents
            .resolve(text, &intent_context(s), s.recent_history(INTENT_HISTORY))
            .await;

        match resolved {
            ResolvedIntent::Classified(classification) => match classification.intent {
                Intent::AnswerAttempt => self.answer_like(s, text).await,
                Intent::HintRequest => {
                    if s.has_open_problem() {
                        self.problem_hint(s, text, None).await
                    } else {
                        self.general_chat(s, text).await
                    }
                }
                Intent::AnswerRequest => Ok(self.reveal_answer(s)),
                Intent::ConceptExplanation => self.explain_current_concept(s, None).await,
                Intent::EasierProblem => self.regenerate(s, None, Difficulty::Easier).await,
                Intent::HarderProblem => self.regenerate(s, None, Difficulty::Harder).await,
                Intent::DifferentProblem => self.regenerate(s, None, Difficulty::Same).await,
                Intent::DifferentConcept => self.next_concept(s).await,
                Intent::SessionControl => Ok(self.session_summary(s)),
                Intent::Clarification => self.clarify(s, text).await,
                Intent::GeneralChat => self.general_chat(s, text).await,
            },
            ResolvedIntent::Fallback { kind, .. } => {
                if s.current_problem().is_some() && contains_number(text) {
                    return self.answer_like(s, text).await;
                }
                match kind {
                    RequestKind::SimilarItemRequest => {
                        self.regenerate(s, None, Difficulty::Same).await
                    }
                    RequestKind::HintRequest if s.has_open_problem() => {
                        self.problem_hint(s, text, None).await
                    }
                    _ => self.general_chat(s, text).await,
                }
            }
        }
    }

    /// Input that reads like an answer. Only numeric input on an open problem
    /// counts as an attempt.
    async fn answer_like(&self, s: &mut LearningSession, text: &str) -> Result<Reply, TutorError> {
        if !contains_number(text) {
            if s.has_open_problem() {
                return self.problem_hint(s, text, None).await;
            }
            return self.general_chat(s, text).await;
        }
        if s.has_open_problem() {
            return self.submit_answer(s, text).await;
        }
        if s.current_problem().is_some() {
            return Ok(Reply::info(
                "이 문제는 이미 끝났어. 새 문제로 이어서 해 볼까?",
                resolved_problem_replies(),
            ));
        }
        self.general_chat(s, text).await
    }

    // -- session control -------------------------------------------------

    fn session_summary(&self, s: &LearningSession) -> Reply {
        let summary = s.summary(Utc::now());
        let completed = if summary.completed_concepts.is_empty() {
            "없음".to_string()
        } else {
            summary.completed_concepts.join(", ")
        };
        let remaining = if summary.remaining_concepts.is_empty() {
            "🎉 모든 취약 개념을 완료했어!".to_string()
        } else {
            format!("📝 남은 개념: {}", summary.remaining_concepts.join(", "))
        };
        let feedback = format!(
            "🎓 오늘 학습 요약\n\n\
             ✅ 풀어본 문제: {}개\n\
             💡 사용한 힌트: {}개\n\
             📚 완료한 개념: {completed}\n\
             ⏰ 학습 시간: {}분\n\n{remaining}",
            summary.total_problems_solved, summary.total_hints_used, summary.session_duration_minutes,
        );

        let mut replies = Vec::new();
        if s.is_completed() {
            replies.push(QuickReply::new("새 진단 테스트", Action::NewDiagnosis));
        } else {
            if !summary.remaining_concepts.is_empty() {
                replies.push(QuickReply::new("남은 개념 계속 학습", Action::NextConcept));
            }
            replies.push(QuickReply::new("새 진단 테스트", Action::NewDiagnosis));
            replies.push(QuickReply::new("학습 종료", Action::EndSession));
        }

        let mut reply = Reply::content(feedback, replies);
        reply.session_summary = Some(summary);
        reply
    }

    fn end_session(&self, s: &mut LearningSession) -> Reply {
        s.end();
        let summary = s.summary(Utc::now());
        let feedback = format!(
            "👋 수고했어!\n\n오늘 {}개 문제를 풀면서 {}개 개념을 학습했네.\n\
             {}분 동안 열심히 공부한 모습이 정말 멋져! 다음에 또 만나! 🌟",
            summary.total_problems_solved,
            summary.completed_concepts.len(),
            summary.session_duration_minutes,
        );
        let mut reply = Reply::content(feedback, Vec::new());
        reply.is_session_ended = true;
        reply.session_summary = Some(summary);
        reply
    }

    fn new_diagnosis(&self, s: &LearningSession) -> Reply {
        let replies = if s.is_completed() {
            vec![QuickReply::new("학습 요약 보기", Action::SessionSummary)]
        } else {
            let mut replies = idle_replies(s);
            replies.push(QuickReply::new("학습 종료", Action::EndSession));
            replies
        };
        let mut reply = Reply::info(
            "새 진단 테스트를 보려면 새 세션으로 시작해야 해. 진단을 마친 뒤 새 세션 ID로 시작해 줘!",
            replies,
        );
        reply.requires_new_session = true;
        reply
    }
}

fn intent_context(s: &LearningSession) -> IntentContext {
    IntentContext {
        stage: s.stage(),
        has_current_problem: s.has_open_problem(),
        current_concept: s.current_concept().map(str::to_string),
    }
}

fn ask_for_concept() -> Reply {
    Reply::info(
        "어떤 개념을 연습하고 싶은지 알려 줘! 개념 이름을 함께 보내 주면 바로 문제를 만들어 줄게.",
        concept_prompt_replies(),
    )
}

fn no_open_problem(s: &LearningSession) -> Reply {
    let message = if s.stage() == Stage::Practice {
        "지금 풀고 있는 문제가 없어. 새 문제를 받아 볼까?"
    } else {
        "아직 연습 문제를 시작하지 않았어."
    };
    Reply::info(message, idle_replies(s))
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::evaluator::FeedbackType;
    use crate::results::DiagnosticRow;
    use crate::session::HISTORY_LIMIT;
    use crate::store::InMemorySessionStore;

    const LEARNER: &str = "learner-1";
    const SESSION: &str = "diag-1";

    /// Gateway that replays canned outputs in order and records every request.
    #[derive(Default)]
    struct ScriptedGateway {
        replies: Mutex<VecDeque<Result<String, String>>>,
        requests: Mutex<Vec<GenerationRequest>>,
    }

    impl ScriptedGateway {
        fn push(&self, reply: &str) {
            self.replies
                .lock()
                .expect("lock")
                .push_back(Ok(reply.to_string()));
        }

        fn fail_next(&self) {
            self.replies
                .lock()
                .expect("lock")
                .push_back(Err("quota exceeded".to_string()));
        }

        fn push_item(&self, question: &str, answer: &str, explanation: &str) {
            self.push(
                &serde_json::json!({
                    "question_text": question,
                    "correct_answer": answer,
                    "explanation": explanation,
                })
                .to_string(),
            );
        }

        fn push_intent(&self, intent: &str, confidence: f64) {
            self.push(
                &serde_json::json!({
                    "intent": intent,
                    "confidence": confidence,
                    "reasoning": "scripted",
                })
                .to_string(),
            );
        }

        fn request_count(&self) -> usize {
            self.requests.lock().expect("lock").len()
        }
    }

    #[async_trait]
    impl LlmGateway for ScriptedGateway {
        async fn generate(&self, request: GenerationRequest) -> Result<String, TutorError> {
            self.requests.lock().expect("lock").push(request);
            match self.replies.lock().expect("lock").pop_front() {
                Some(Ok(text)) => Ok(text),
                Some(Err(e)) => Err(TutorError::GenerationFailed(e)),
                None => Err(TutorError::GenerationFailed("script exhausted".to_string())),
            }
        }
    }

    struct FixedResults(Vec<DiagnosticRow>);

    #[async_trait]
    impl SessionResultProvider for FixedResults {
        async fn get_results(
            &self,
            _learner_id: &str,
            _session_id: &str,
        ) -> Result<Vec<DiagnosticRow>, TutorError> {
            Ok(self.0.clone())
        }

        async fn get_item_id(
            &self,
            _learner_id: &str,
            _session_id: &str,
            seq: i32,
        ) -> Result<Option<String>, TutorError> {
            Ok(self
                .0
                .iter()
                .find(|row| row.seq == seq)
                .map(|row| row.item_id.clone()))
        }
    }

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

    struct Harness {
        tutor: SessionOrchestrator,
        gateway: Arc<ScriptedGateway>,
    }

    impl Harness {
        fn with_rows(rows: Vec<DiagnosticRow>) -> Self {
            let gateway = Arc::new(ScriptedGateway::default());
            let tutor = SessionOrchestrator::new(
                Arc::new(InMemorySessionStore::new()),
                Arc::new(FixedResults(rows)),
                gateway.clone(),
            );
            Self { tutor, gateway }
        }

        fn fractions() -> Self {
            Self::with_rows(vec![row(1, "ratios", true, 0.9), row(2, "fractions", false, 0.3)])
        }

        async fn started(self) -> Self {
            self.gateway.push("진단 결과 요약");
            self.tutor
                .start_session(LEARNER, SESSION)
                .await
                .expect("session should start");
            self
        }

        async fn act(&self, action: Action, data: Option<&str>, text: Option<&str>) -> ActionResponse {
            self.tutor
                .handle_action(LEARNER, SESSION, action, data, text)
                .await
                .expect("action should succeed")
        }

        async fn start_problem(&self, answer: &str) -> ActionResponse {
            self.gateway
                .push_item("밑면 넓이가 12인 각기둥의 겉넓이는?", answer, "2 × 12 + 48 = 72");
            self.act(Action::StartPractice, None, None).await
        }

        async fn answer(&self, text: &str) -> ActionResponse {
            self.gateway.push_intent("answer_attempt", 0.95);
            self.gateway.push("밑면은 몇 개일까?");
            self.act(Action::TextInput, None, Some(text)).await
        }

        fn session(&self) -> LearningSession {
            self.tutor
                .snapshot(LEARNER, SESSION)
                .expect("session should exist")
        }
    }

    #[tokio::test]
    async fn start_session_computes_facts_and_records_first_exchange() {
        let h = Harness::fractions();
        h.gateway.push("진단 결과 요약");
        let started = h
            .tutor
            .start_session(LEARNER, SESSION)
            .await
            .expect("session should start");

        assert_eq!(started.diagnostic.total_questions, 2);
        assert_eq!(started.diagnostic.wrong_question_numbers, vec![2]);
        assert_eq!(started.stage, Stage::Diagnosis);
        assert_eq!(started.conversation_history.len(), 2);
        assert_eq!(started.quick_replies[0].action, Action::StartPractice);
        assert_eq!(started.quick_replies[0].data.as_deref(), Some("fractions"));
    }

    #[tokio::test]
    async fn start_session_without_rows_is_no_diagnostic_data() {
        let h = Harness::with_rows(Vec::new());
        let err = h
            .tutor
            .start_session(LEARNER, SESSION)
            .await
            .expect_err("empty results must fail");
        assert!(matches!(err, TutorError::NoDiagnosticData { .. }));
        assert!(h.tutor.store().is_empty());
    }

    #[tokio::test]
    async fn failed_summary_creates_no_session() {
        let h = Harness::fractions();
        h.gateway.fail_next();
        let err = h
            .tutor
            .start_session(LEARNER, SESSION)
            .await
            .expect_err("generation failure must surface");
        assert!(matches!(err, TutorError::GenerationFailed(_)));
        assert!(h.tutor.store().is_empty());
    }

    #[tokio::test]
    async fn restarting_existing_session_is_rejected() {
        let h = Harness::fractions().started().await;
        let err = h
            .tutor
            .start_session(LEARNER, SESSION)
            .await
            .expect_err("same identity must be rejected");
        assert!(matches!(err, TutorError::InvalidAction { .. }));
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let h = Harness::fractions();
        let err = h
            .tutor
            .handle_action(LEARNER, "nope", Action::SessionSummary, None, None)
            .await
            .expect_err("unknown key");
        assert!(matches!(err, TutorError::SessionNotFound { .. }));
    }

    #[tokio::test]
    async fn start_practice_enters_practice_on_first_weak_concept() {
        let h = Harness::fractions().started().await;
        let response = h.start_problem("72").await;

        let session = h.session();
        assert_eq!(session.stage(), Stage::Practice);
        assert_eq!(session.current_concept(), Some("fractions"));
        assert_eq!(session.attempt_count(), 0);
        assert!(response.question_text.is_some());
        assert_eq!(response.conversation_history.len(), 4);
        assert!(!response.quick_replies.is_empty());
    }

    #[tokio::test]
    async fn continue_on_open_problem_is_idempotent() {
        let h = Harness::fractions().started().await;
        h.start_problem("72").await;
        h.answer("10").await;
        let before = h.session();

        for _ in 0..3 {
            let response = h.act(Action::ContinueLearning, None, None).await;
            assert!(response.question_text.is_some());
        }

        let after = h.session();
        assert_eq!(after.attempt_count(), before.attempt_count());
        assert_eq!(after.current_problem(), before.current_problem());
        assert_eq!(
            after.conversation_history().len(),
            before.conversation_history().len()
        );
    }

    #[tokio::test]
    async fn correct_answer_completes_concept() {
        let h = Harness::fractions().started().await;
        h.start_problem("72").await;
        h.gateway.push_intent("answer_attempt", 0.95);
        let response = h.act(Action::TextInput, None, Some("내 답은 72야")).await;

        assert!(response.is_completed);
        assert!(!response.is_answer_revealed);
        let analysis = response.answer_analysis.expect("analysis attached");
        assert!(analysis.is_correct);
        assert!(analysis.confidence >= 0.9);

        let session = h.session();
        assert_eq!(session.completed_concepts(), &["fractions".to_string()]);
        assert_eq!(session.stage(), Stage::Practice);
        assert_eq!(session.total_problems_solved(), 1);
    }

    #[tokio::test]
    async fn fourth_wrong_attempt_reveals_answer() {
        let h = Harness::fractions().started().await;
        h.start_problem("72").await;

        for expected in 1..=3 {
            let response = h.answer("10").await;
            assert!(!response.is_completed);
            assert_eq!(response.attempt_count, Some(expected));
            assert!(response.hint_analysis.is_some());
        }

        h.gateway.push_intent("answer_attempt", 0.95);
        let response = h.act(Action::TextInput, None, Some("10")).await;
        assert!(response.is_completed);
        assert!(response.is_answer_revealed);
        assert_eq!(response.attempt_count, Some(3));
        assert_eq!(
            response.answer_analysis.map(|a| a.feedback_type),
            Some(FeedbackType::AnswerRevealed)
        );

        let session = h.session();
        assert!(session.completed_concepts().is_empty());
        assert_eq!(session.total_hints_used(), 3);
    }

    #[tokio::test]
    async fn numeric_input_on_resolved_problem_is_informational() {
        let h = Harness::fractions().started().await;
        h.start_problem("72").await;
        h.act(Action::RevealAnswer, None, None).await;
        let before = h.session();

        h.gateway.push_intent("answer_attempt", 0.95);
        let response = h.act(Action::TextInput, None, Some("72")).await;

        let after = h.session();
        assert!(!response.quick_replies.is_empty());
        assert_eq!(after.attempt_count(), before.attempt_count());
        assert_eq!(
            after.conversation_history().len(),
            before.conversation_history().len()
        );
    }

    #[tokio::test]
    async fn partial_answer_gets_guided_hint_with_encouragement() {
        let h = Harness::fractions().started().await;
        h.start_problem("72").await;
        let response = h.answer("72.0").await;

        assert!(response.feedback.starts_with("🎯"));
        let hint = response.hint_analysis.expect("hint analysis");
        assert!(hint.is_guided_hint);
        assert_eq!(hint.hint_level, HintLevel::Beginner);
    }

    #[tokio::test]
    async fn next_concept_with_nothing_remaining_routes_to_summary() {
        let h = Harness::fractions().started().await;
        h.start_problem("72").await;
        h.gateway.push_intent("answer_attempt", 0.95);
        h.act(Action::TextInput, None, Some("72")).await;

        let response = h.act(Action::NextConcept, None, None).await;
        let summary = response.session_summary.expect("summary path");
        assert!(summary.remaining_concepts.is_empty());
        assert_eq!(summary.completed_concepts, vec!["fractions".to_string()]);
    }

    #[tokio::test]
    async fn generation_failure_leaves_session_unchanged() {
        let h = Harness::fractions().started().await;
        h.start_problem("72").await;
        let before = h.session();

        h.gateway.push_intent("answer_attempt", 0.95);
        h.gateway.fail_next();
        let err = h
            .tutor
            .handle_action(LEARNER, SESSION, Action::TextInput, None, Some("10"))
            .await
            .expect_err("hint generation fails");
        assert!(matches!(err, TutorError::GenerationFailed(_)));

        let after = h.session();
        assert_eq!(after.attempt_count(), before.attempt_count());
        assert_eq!(after.total_hints_used(), before.total_hints_used());
        assert_eq!(
            after.conversation_history().len(),
            before.conversation_history().len()
        );
    }

    #[tokio::test]
    async fn new_problem_resets_attempts() {
        let h = Harness::fractions().started().await;
        h.start_problem("72").await;
        h.answer("10").await;
        h.answer("11").await;
        assert_eq!(h.session().attempt_count(), 2);

        h.gateway.push_item("새 문제", "5", "2 + 3 = 5");
        let response = h.act(Action::HarderProblem, None, None).await;
        assert!(response.feedback.contains("도전적인"));
        assert_eq!(h.session().attempt_count(), 0);
        assert_eq!(h.session().current_concept(), Some("fractions"));
    }

    #[tokio::test]
    async fn low_confidence_text_with_number_counts_as_attempt() {
        let h = Harness::fractions().started().await;
        h.start_problem("72").await;
        h.gateway.push_intent("general_chat", 0.4);
        h.gateway.push("몇 개의 면이 있을까?");
        let response = h.act(Action::TextInput, None, Some("음 50?")).await;
        assert_eq!(response.attempt_count, Some(1));
    }

    #[tokio::test]
    async fn classifier_failure_falls_back_to_hint_keywords() {
        let h = Harness::fractions().started().await;
        h.start_problem("72").await;
        h.gateway.fail_next();
        h.gateway.push("밑면의 모양은 어떤 도형일까?");
        let response = h.act(Action::TextInput, None, Some("힌트 주세요")).await;

        assert!(response.hint_analysis.is_some());
        assert_eq!(h.session().total_hints_used(), 1);
        assert_eq!(h.session().attempt_count(), 0);
    }

    #[tokio::test]
    async fn history_never_exceeds_limit() {
        let h = Harness::fractions().started().await;
        h.start_problem("72").await;
        for _ in 0..12 {
            h.gateway.push("개념 설명");
            let response = h.act(Action::ConceptExplanation, None, None).await;
            assert!(response.conversation_history.len() <= HISTORY_LIMIT);
        }
        assert_eq!(h.session().conversation_history().len(), HISTORY_LIMIT);
    }

    #[tokio::test]
    async fn end_session_is_terminal() {
        let h = Harness::fractions().started().await;
        let response = h.act(Action::EndSession, None, None).await;
        assert!(response.is_session_ended);
        assert!(response.quick_replies.is_empty());
        assert_eq!(response.stage, Stage::Completed);

        let err = h
            .tutor
            .handle_action(LEARNER, SESSION, Action::StartPractice, None, None)
            .await
            .expect_err("completed sessions reject practice");
        assert!(matches!(err, TutorError::InvalidAction { .. }));

        let summary = h.act(Action::SessionSummary, None, None).await;
        assert!(!summary.quick_replies.is_empty());
        assert_eq!(summary.stage, Stage::Completed);
    }

    #[tokio::test]
    async fn new_diagnosis_requires_new_session() {
        let h = Harness::fractions().started().await;
        let before = h.session();
        let response = h.act(Action::NewDiagnosis, None, None).await;
        assert!(response.requires_new_session);
        assert!(!response.quick_replies.is_empty());
        assert_eq!(h.session().stage(), before.stage());
        assert_eq!(
            h.session().conversation_history().len(),
            before.conversation_history().len()
        );
    }

    #[tokio::test]
    async fn empty_weak_concepts_prompt_for_concept_or_accept_ad_hoc() {
        let h = Harness::with_rows(vec![row(1, "ratios", true, 0.9)]).started().await;

        let prompt = h.act(Action::StartPractice, None, None).await;
        assert!(prompt.question_text.is_none());
        assert_eq!(h.session().stage(), Stage::Diagnosis);

        h.gateway.push_item("비율 문제", "3", "6 ÷ 2 = 3");
        h.act(Action::NewProblemSameConcept, Some("ratios"), None).await;
        let session = h.session();
        assert_eq!(session.current_concept(), Some("ratios"));
        assert_eq!(session.stage(), Stage::Practice);
    }

    #[tokio::test]
    async fn item_feedback_similar_request_practices_item_concept() {
        let h = Harness::with_rows(vec![
            row(1, "ratios", true, 0.9),
            row(2, "fractions", false, 0.3),
            row(3, "cone volume", false, 0.4),
        ])
        .started()
        .await;

        h.gateway.push_intent("different_problem", 0.9);
        h.gateway.push_item("원뿔 문제", "12", "4 × 3 = 12");
        let response = h
            .act(Action::ItemFeedback, None, Some("3번 문제랑 비슷한 문제 주세요"))
            .await;

        assert_eq!(response.request_kind, Some(RequestKind::SimilarItemRequest));
        assert_eq!(h.session().current_concept(), Some("cone volume"));
        assert_eq!(h.session().stage(), Stage::Practice);
    }

    #[tokio::test]
    async fn item_feedback_hint_uses_item_concept() {
        let h = Harness::fractions().started().await;
        h.gateway.push_intent("hint_request", 0.9);
        h.gateway.push("분모를 같게 만들려면 어떻게 해야 할까?");
        let response = h.act(Action::ItemFeedback, None, Some("2번 문제 힌트 주세요")).await;

        assert_eq!(response.request_kind, Some(RequestKind::HintRequest));
        assert!(response.hint_analysis.is_some());
        let requests = h.gateway.requests.lock().expect("lock");
        let last = requests.last().expect("hint request sent");
        assert!(last.user.contains("fractions"));
    }

    #[tokio::test]
    async fn item_feedback_unknown_number_is_informational() {
        let h = Harness::fractions().started().await;
        h.gateway.push_intent("hint_request", 0.9);
        let calls = h.gateway.request_count();
        let response = h.act(Action::ItemFeedback, None, Some("9번 문제 힌트")).await;
        assert!(response.feedback.contains("9번"));
        assert_eq!(h.gateway.request_count(), calls + 1);
        assert_eq!(h.session().conversation_history().len(), 2);
    }

    #[tokio::test]
    async fn evict_stale_drops_completed_and_idle_sessions() {
        let h = Harness::fractions().started().await;
        let now = Utc::now();
        assert!(h.tutor.evict_stale(now, Duration::hours(1), &|_| false).is_empty());

        h.act(Action::EndSession, None, None).await;
        let evicted = h.tutor.evict_stale(now, Duration::hours(1), &|_| false);
        assert_eq!(evicted, vec![SessionKey::new(LEARNER, SESSION)]);
        assert!(h.tutor.store().is_empty());
    }

    #[tokio::test]
    async fn evict_stale_keeps_sessions_with_a_request_in_flight() {
        let h = Harness::fractions().started().await;
        let later = Utc::now() + Duration::hours(2);
        let busy = SessionKey::new(LEARNER, SESSION);

        let evicted = h
            .tutor
            .evict_stale(later, Duration::hours(1), &|key| *key == busy);
        assert!(evicted.is_empty());
        assert_eq!(h.tutor.store().len(), 1);

        let evicted = h.tutor.evict_stale(later, Duration::hours(1), &|_| false);
        assert_eq!(evicted, vec![busy]);
    }

    #[tokio::test]
    async fn correct_fourth_submission_still_reveals() {
        let h = Harness::fractions().started().await;
        h.start_problem("72").await;
        for _ in 0..3 {
            h.answer("10").await;
        }

        h.gateway.push_intent("answer_attempt", 0.95);
        let response = h.act(Action::TextInput, None, Some("72")).await;

        assert!(response.is_completed);
        assert!(response.is_answer_revealed);
        assert_eq!(response.attempt_count, Some(3));
        assert_eq!(
            response.answer_analysis.map(|a| a.feedback_type),
            Some(FeedbackType::AnswerRevealed)
        );
        let session = h.session();
        assert!(session.completed_concepts().is_empty());
        assert_eq!(session.problem_outcome(), Some(ProblemOutcome::Revealed));
    }

    #[tokio::test]
    async fn help_and_non_numeric_answer_attempts_are_not_counted() {
        let h = Harness::fractions().started().await;
        h.start_problem("72").await;

        h.gateway.push_intent("answer_attempt", 0.9);
        h.gateway.push("밑면이 몇 개인지 먼저 세어 볼까?");
        let response = h.act(Action::TextInput, None, Some("72인데 힌트 좀")).await;
        assert_eq!(response.attempt_count, Some(0));
        assert_eq!(
            response.answer_analysis.map(|a| a.feedback_type),
            Some(FeedbackType::HintRequest)
        );
        assert!(response.hint_analysis.is_some());

        h.gateway.push_intent("answer_attempt", 0.9);
        h.gateway.push("좋아, 밑면 넓이는 얼마일까?");
        let response = h
            .act(Action::TextInput, None, Some("밑면 넓이부터 구할게"))
            .await;
        assert!(response.attempt_count.is_none());
        assert!(!response.is_completed);

        let session = h.session();
        assert_eq!(session.attempt_count(), 0);
        assert!(session.has_open_problem());
        assert_eq!(session.total_hints_used(), 2);
    }

    #[tokio::test]
    async fn failed_item_generation_leaves_problem_state_unchanged() {
        let h = Harness::fractions().started().await;
        h.gateway.fail_next();
        let err = h
            .tutor
            .handle_action(LEARNER, SESSION, Action::StartPractice, None, None)
            .await
            .expect_err("item generation fails");
        assert!(matches!(err, TutorError::GenerationFailed(_)));
        let session = h.session();
        assert_eq!(session.stage(), Stage::Diagnosis);
        assert!(session.current_concept().is_none());
        assert!(session.current_problem().is_none());

        h.start_problem("72").await;
        h.answer("10").await;
        let before = h.session();
        h.gateway.fail_next();
        h.tutor
            .handle_action(LEARNER, SESSION, Action::NextConcept, None, None)
            .await
            .expect_err("item generation fails");

        let after = h.session();
        assert_eq!(after.stage(), Stage::Practice);
        assert_eq!(after.current_concept(), before.current_concept());
        assert_eq!(after.current_problem(), before.current_problem());
        assert_eq!(after.attempt_count(), 1);
        assert_eq!(
            after.conversation_history().len(),
            before.conversation_history().len()
        );
    }
}
