//! OpenAI-compatible chat-completions adapter — same family of provider the
//! reference architecture's `ai::adapter::ApiStyle::OpenAi` variant names,
//! written by analogy to `anthropic.rs`'s request-shaping pattern against
//! the `/v1/chat/completions` + `tool_calls` wire shape.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use super::adapter::ReasoningAdapter;
use super::types::{
    ChatMessage, ContentPart, FinishReason, Role, TextGenerationRequest, TextGenerationResponse,
    ToolCall,
};
use crate::error::ReasoningError;

const DEFAULT_MODEL: &str = "gpt-4o";
const REQUEST_TIMEOUT_SECS: u64 = 30;

pub struct OpenAiCompatibleAdapter {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiCompatibleAdapter {
    pub fn new(api_key: String, base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("reqwest client build");
        OpenAiCompatibleAdapter {
            client,
            api_key,
            base_url,
        }
    }

    fn format_messages(system: &Option<String>, messages: &[ChatMessage]) -> Vec<serde_json::Value> {
        let mut out = Vec::new();
        if let Some(sys) = system {
            out.push(json!({"role": "system", "content": sys}));
        }
        for m in messages {
            let role = match m.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::Tool => "tool",
            };
            let text: String = m
                .content
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.clone()),
                    ContentPart::ToolResult { content, .. } => Some(content.clone()),
                    ContentPart::ToolUse { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n");
            out.push(json!({"role": role, "content": text}));
        }
        out
    }
}

#[derive(Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<serde_json::Value>,
    tools: Vec<serde_json::Value>,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<OpenAiToolCall>,
}

#[derive(Deserialize)]
struct OpenAiToolCall {
    id: String,
    function: OpenAiFunctionCall,
}

#[derive(Deserialize)]
struct OpenAiFunctionCall {
    name: String,
    arguments: String,
}

#[async_trait]
impl ReasoningAdapter for OpenAiCompatibleAdapter {
    fn provider_id(&self) -> &'static str {
        "openai-compatible"
    }

    fn default_model(&self) -> &str {
        DEFAULT_MODEL
    }

    async fn generate_text(
        &self,
        request: TextGenerationRequest,
    ) -> Result<TextGenerationResponse, ReasoningError> {
        let tools: Vec<serde_json::Value> = request
            .tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.input_schema,
                    }
                })
            })
            .collect();

        let body = OpenAiRequest {
            model: request.model,
            messages: Self::format_messages(&request.system, &request.messages),
            tools,
            max_tokens: request.max_tokens,
        };

        let resp = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ReasoningError::Unavailable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ReasoningError::Unavailable(format!(
                "openai-compatible provider returned {}",
                resp.status()
            )));
        }

        let mut parsed: OpenAiResponse = resp
            .json()
            .await
            .map_err(|e| ReasoningError::Unavailable(e.to_string()))?;

        let choice = parsed
            .choices
            .pop()
            .ok_or_else(|| ReasoningError::Unavailable("empty choices array".to_string()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .into_iter()
            .map(|tc| ToolCall {
                id: tc.id,
                name: tc.function.name,
                input: serde_json::from_str(&tc.function.arguments)
                    .unwrap_or(serde_json::Value::Null),
            })
            .collect::<Vec<_>>();

        let finish_reason = match choice.finish_reason.as_deref() {
            Some("tool_calls") => FinishReason::ToolUse,
            Some("length") => FinishReason::Length,
            Some(_) => FinishReason::Stop,
            None => FinishReason::Stop,
        };

        Ok(TextGenerationResponse {
            text: choice.message.content.unwrap_or_default(),
            tool_calls,
            finish_reason,
        })
    }
}
