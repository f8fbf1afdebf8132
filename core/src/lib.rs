pub mod action;
pub mod error;
pub mod evaluator;
pub mod hint;
pub mod intent;
pub mod item;
pub mod llm;
pub mod orchestrator;
pub mod prompts;
pub mod response;
pub mod results;
pub mod session;
pub mod store;
