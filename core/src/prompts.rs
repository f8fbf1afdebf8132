//! Prompt builders. Each returns a ready `GenerationRequest`; history is
//! attached by the caller.

use crate::evaluator::AnswerAnalysis;
use crate::hint::HintLevel;
use crate::intent::IntentContext;
use crate::llm::GenerationRequest;
use crate::results::{DiagnosticRow, DiagnosticSummary, format_rows_for_prompt};

const TUTOR_PERSONA: &str = "You are a friendly math tutor for Korean middle-school students. \
Always answer in Korean, in a warm and casual tone (반말), in at most a few short sentences.";

/// Difficulty shift requested for a regenerated item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Difficulty {
    Same,
    Easier,
    Harder,
}

impl Difficulty {
    fn instruction(self) -> &'static str {
        match self {
            Difficulty::Same => "Keep the difficulty similar to a typical textbook exercise.",
            Difficulty::Easier => {
                "Make it clearly easier than before: smaller numbers, a single step."
            }
            Difficulty::Harder => {
                "Make it more challenging than before: more steps or a less direct setup."
            }
        }
    }
}

fn accuracy_text(accuracy: Option<f64>) -> String {
    match accuracy {
        Some(a) => format!("{:.1}%", a * 100.0),
        None => "unknown".to_string(),
    }
}

pub fn diagnostic_summary(summary: &DiagnosticSummary, rows: &[DiagnosticRow]) -> GenerationRequest {
    let wrong: Vec<String> = summary
        .wrong_question_numbers
        .iter()
        .map(|n| n.to_string())
        .collect();
    let user = format!(
        "Facts (do not change or add to them):\n\
         - total questions: {}\n\
         - correct answers: {}\n\
         - wrong question numbers: {}\n\
         - concepts to review: {}\n\n\
         Per-question detail:\n{}\n\n\
         Tell the learner these results, praise the effort, name the wrong question \
         numbers and the concepts to review, then invite them to start with the first concept.",
        summary.total_questions,
        summary.correct_count,
        if wrong.is_empty() { "none".to_string() } else { wrong.join(", ") },
        if summary.weakest_concepts.is_empty() {
            "none".to_string()
        } else {
            summary.weakest_concepts.join(", ")
        },
        format_rows_for_prompt(rows),
    );
    GenerationRequest::text(
        format!("{TUTOR_PERSONA} You summarize diagnostic test results strictly from the given data."),
        user,
    )
}

pub fn intent(text: &str, context: &IntentContext) -> GenerationRequest {
    let user = format!(
        "Situation:\n\
         - stage: {}\n\
         - solving a problem: {}\n\
         - current concept: {}\n\n\
         Learner message:\n\"{}\"\n\n\
         Classify the message into exactly one intent:\n\
         1. answer_attempt: gives a number or concrete answer (\"210\", \"210cm²\", \"답은 5야\")\n\
         2. hint_request: asks for a hint or help (\"힌트 주세요\", \"어떻게 풀어요?\", \"모르겠어요\")\n\
         3. answer_request: asks for the answer directly (\"정답 알려줘\", \"답이 뭐야?\")\n\
         4. concept_explanation: asks to explain the concept (\"이 개념 설명해줘\", \"원리가 뭐야?\")\n\
         5. easier_problem: wants an easier problem (\"너무 어려워\", \"쉬운 문제 줘\")\n\
         6. harder_problem: wants a harder problem (\"더 어려운 것\", \"도전적인 문제\")\n\
         7. different_problem: wants another problem (\"다른 문제\", \"새로운 문제\")\n\
         8. different_concept: wants another concept (\"다른 개념\", \"이거 말고 다른 거\")\n\
         9. session_control: wants to stop or pause (\"그만할래\", \"나가기\", \"쉬고 싶어\")\n\
         10. clarification: asks to rephrase or clarify (\"무슨 뜻이야?\", \"다시 말해줘\")\n\
         11. general_chat: anything else (\"안녕\", \"고마워\")\n\n\
         Reply with JSON: {{\"intent\": \"...\", \"confidence\": 0.0-1.0, \"reasoning\": \"...\"}}",
        context.stage.as_str(),
        if context.has_current_problem { "yes" } else { "no" },
        context.current_concept.as_deref().unwrap_or("none"),
        text,
    );
    GenerationRequest::json(
        "You classify a learner's chat message into an intent. Reply only with a JSON object.",
        user,
    )
}

pub fn similar_item(concept: &str, accuracy: Option<f64>, difficulty: Difficulty) -> GenerationRequest {
    let user = format!(
        "Concept: '{concept}'\n\
         Learner accuracy on this concept: {}\n\n\
         Write one new practice problem for this concept suited to the learner. {}\n\
         Work the explanation step by step first, then copy its final value into \
         correct_answer. correct_answer and the explanation's final result must match.\n\n\
         Reply with JSON: {{\"question_text\": \"...\", \"correct_answer\": \"...\", \"explanation\": \"...\"}}\n\
         All text values must be in Korean.",
        accuracy_text(accuracy),
        difficulty.instruction(),
    );
    GenerationRequest::json(
        "You write new math practice problems for Korean middle-school students. \
         Reply only with a JSON object.",
        user,
    )
}

pub fn personalized_hint(
    question: &str,
    learner_input: &str,
    concept: &str,
    accuracy: Option<f64>,
    level: HintLevel,
) -> GenerationRequest {
    let system = format!(
        "{TUTOR_PERSONA} Give Socratic hints: never state the answer, lead with a question.\n\
         Concept: {concept}\n\
         Learner accuracy: {}\n\
         Hint level: {}",
        accuracy_text(accuracy),
        level.as_str(),
    );
    let user = format!(
        "Problem:\n{question}\n\nLearner message:\n\"{learner_input}\"\n\n{}",
        level.guidance()
    );
    GenerationRequest::text(system, user)
}

pub fn guided_hint(
    question: &str,
    learner_input: &str,
    analysis: &AnswerAnalysis,
    level: HintLevel,
) -> GenerationRequest {
    let observation = if analysis.is_partial_correct {
        "The number is right but written differently or missing its unit."
    } else {
        "The approach is on the right track but the result is not there yet."
    };
    let user = format!(
        "Problem:\n{question}\n\nLearner attempt:\n\"{learner_input}\"\n\n\
         Observation: {observation}\n\
         Build on what the learner did and ask one question that leads to the next step. {}",
        level.guidance()
    );
    GenerationRequest::text(
        format!("{TUTOR_PERSONA} Never state the answer."),
        user,
    )
}

/// Hint about a diagnostic item the learner pointed at.
pub fn concept_hint(concept: &str, learner_input: &str) -> GenerationRequest {
    GenerationRequest::text(
        format!("{TUTOR_PERSONA} Give Socratic hints without revealing answers."),
        format!(
            "Related concept: {concept}\nLearner message: \"{learner_input}\"\n\n\
             Do not give study strategies or long encouragement. Ask one or two short \
             questions that point at the next step."
        ),
    )
}

/// Coaching on a diagnostic item: interpret the accuracy and suggest a strategy.
pub fn item_feedback(concept: &str, accuracy: Option<f64>) -> GenerationRequest {
    GenerationRequest::text(
        format!("{TUTOR_PERSONA} You are a learning coach who interprets learner data."),
        format!(
            "Related concept: {concept}\nLearner accuracy on this concept: {}\n\n\
             Interpret this, encourage the learner, and suggest one concrete way to study it.",
            accuracy_text(accuracy)
        ),
    )
}

pub fn concept_explanation(concept: &str, question: Option<&str>) -> GenerationRequest {
    let context = question
        .map(|q| format!("\nThe learner is working on:\n{q}\n"))
        .unwrap_or_default();
    GenerationRequest::text(
        TUTOR_PERSONA,
        format!(
            "Explain the concept '{concept}' simply, with one small worked example.{context}\n\
             Do not solve the learner's current problem."
        ),
    )
}

pub fn diagnostic_question(question: &str, weakest_concepts: &[String]) -> GenerationRequest {
    let concepts = if weakest_concepts.is_empty() {
        "none".to_string()
    } else {
        weakest_concepts.join(", ")
    };
    GenerationRequest::text(
        format!("{TUTOR_PERSONA} You answer questions about the learner's diagnostic test."),
        format!(
            "Concepts the learner missed: {concepts}\n\nLearner question:\n\"{question}\"\n\n\
             Answer the question in that context."
        ),
    )
}

pub fn clarification(learner_input: &str, current_problem: Option<&str>) -> GenerationRequest {
    let context = current_problem
        .map(|q| format!("Current problem:\n{q}\n\n"))
        .unwrap_or_default();
    GenerationRequest::text(
        TUTOR_PERSONA,
        format!(
            "{context}The learner did not understand the last message: \"{learner_input}\"\n\
             Rephrase what you said more simply. Do not reveal any answer."
        ),
    )
}

pub fn general_chat(learner_input: &str, current_concept: Option<&str>) -> GenerationRequest {
    let context = current_concept
        .map(|c| format!("The learner is studying '{c}'. "))
        .unwrap_or_default();
    GenerationRequest::text(
        TUTOR_PERSONA,
        format!(
            "{context}Reply briefly to the learner's message and gently steer back to studying.\n\
             Learner message: \"{learner_input}\""
        ),
    )
}
