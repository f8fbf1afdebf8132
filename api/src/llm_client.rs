//! OpenAI-compatible chat-completions client (OpenAI or Azure OpenAI).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use socra_core::error::TutorError;
use socra_core::llm::{GenerationRequest, LlmGateway, ResponseFormat};

use crate::config::LlmConfig;

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

pub struct ChatCompletionsGateway {
    client: reqwest::Client,
    config: LlmConfig,
}

impl ChatCompletionsGateway {
    pub fn new(config: LlmConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { client, config })
    }
}

/// Messages are system, then prior turns, then the new user instruction.
fn request_body(model: &str, request: &GenerationRequest) -> Value {
    let mut messages = Vec::with_capacity(request.history.len() + 2);
    messages.push(json!({"role": "system", "content": request.system}));
    messages.extend(
        request
            .history
            .iter()
            .map(|turn| json!({"role": turn.role.as_str(), "content": turn.content})),
    );
    messages.push(json!({"role": "user", "content": request.user}));

    let format = match request.format {
        ResponseFormat::Text => "text",
        ResponseFormat::JsonObject => "json_object",
    };
    json!({
        "model": model,
        "messages": messages,
        "response_format": {"type": format},
    })
}

fn first_choice(completion: ChatCompletion) -> Result<String, TutorError> {
    completion
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| TutorError::GenerationFailed("empty completion".to_string()))
}

#[async_trait]
impl LlmGateway for ChatCompletionsGateway {
    async fn generate(&self, request: GenerationRequest) -> Result<String, TutorError> {
        let body = request_body(&self.config.model, &request);
        let mut call = self.client.post(&self.config.endpoint).json(&body);
        call = match &self.config.api_version {
            Some(version) => call
                .query(&[("api-version", version.as_str())])
                .header("api-key", &self.config.api_key),
            None => call.bearer_auth(&self.config.api_key),
        };

        let response = call.send().await.map_err(|e| {
            tracing::error!(error = %e, "LLM request failed");
            TutorError::GenerationFailed(e.to_string())
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, body = %body, "LLM returned non-success status");
            return Err(TutorError::GenerationFailed(format!("upstream status {status}")));
        }

        let completion = response.json::<ChatCompletion>().await.map_err(|e| {
            tracing::error!(error = %e, "LLM response was not a chat completion");
            TutorError::GenerationFailed(e.to_string())
        })?;
        first_choice(completion)
    }
}
