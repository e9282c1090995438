//! Adapted directly from the reference architecture's `ai::anthropic_adapter`:
//! same `x-api-key`/`anthropic-version` header pair, same `/v1/messages`
//! endpoint, same content-block message shaping. Narrowed to text + tool_use
//! + tool_result blocks only (the reference adapter also handles image/video
//! parts this system never sends).

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

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
const REQUEST_TIMEOUT_SECS: u64 = 30;

pub struct AnthropicAdapter {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AnthropicAdapter {
    pub fn new(api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("reqwest client build");
        AnthropicAdapter {
            client,
            api_key,
            base_url: "https://api.anthropic.com".to_string(),
        }
    }

    fn format_messages(messages: &[ChatMessage]) -> Vec<serde_json::Value> {
        messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| {
                let role = match m.role {
                    Role::User | Role::Tool => "user",
                    Role::Assistant => "assistant",
                    Role::System => unreachable!(),
                };
                let content: Vec<serde_json::Value> = m
                    .content
                    .iter()
                    .map(|part| match part {
                        ContentPart::Text { text } => json!({"type": "text", "text": text}),
                        ContentPart::ToolUse { id, name, input } => json!({
                            "type": "tool_use", "id": id, "name": name, "input": input
                        }),
                        ContentPart::ToolResult { tool_use_id, content, is_error } => json!({
                            "type": "tool_result",
                            "tool_use_id": tool_use_id,
                            "content": content,
                            "is_error": is_error,
                        }),
                    })
                    .collect();
                json!({"role": role, "content": content})
            })
            .collect()
    }
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    system: Option<String>,
    messages: Vec<serde_json::Value>,
    tools: Vec<serde_json::Value>,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContentBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: serde_json::Value },
}

#[async_trait]
impl ReasoningAdapter for AnthropicAdapter {
    fn provider_id(&self) -> &'static str {
        "anthropic"
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
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.input_schema,
                })
            })
            .collect();

        let body = AnthropicRequest {
            model: request.model,
            system: request.system,
            messages: Self::format_messages(&request.messages),
            tools,
            max_tokens: request.max_tokens,
        };

        let resp = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| ReasoningError::Unavailable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ReasoningError::Unavailable(format!(
                "anthropic returned {}",
                resp.status()
            )));
        }

        let parsed: AnthropicResponse = resp
            .json()
            .await
            .map_err(|e| ReasoningError::Unavailable(e.to_string()))?;

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for block in parsed.content {
            match block {
                AnthropicContentBlock::Text { text: t } => text.push_str(&t),
                AnthropicContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(ToolCall { id, name, input })
                }
            }
        }

        let finish_reason = match parsed.stop_reason.as_deref() {
            Some("tool_use") => FinishReason::ToolUse,
            Some("max_tokens") => FinishReason::Length,
            Some(_) => FinishReason::Stop,
            None => FinishReason::Stop,
        };

        Ok(TextGenerationResponse {
            text,
            tool_calls,
            finish_reason,
        })
    }
}
