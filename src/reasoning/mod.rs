//! C6 — Reasoning Driver: the bounded tool-calling loop that turns one
//! caller utterance plus retrieval context into one spoken reply.
//!
//! The provider-adapter split (`adapter`/`anthropic`/`openai`/`fake`) is
//! grounded directly in `ai::adapter::AIProviderAdapter` and
//! `ai::anthropic_adapter`; the loop itself — iteration budget, dedup,
//! timeout/retry, fallback-on-exhaustion — is new, built to the turn's
//! own invariant: a caller is never left without a spoken reply, no matter
//! how the model or its tools misbehave.

pub mod adapter;
pub mod anthropic;
pub mod fake;
pub mod openai;
pub mod types;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use self::adapter::ReasoningAdapter;
use self::types::{ChatMessage, ContentPart, FinishReason, Role, TextGenerationRequest, ToolSpec};
use crate::constants::{MAX_TOOL_ITERS, REASONING_RETRY_BACKOFF_MS, TOOL_CALL_TIMEOUT_SECS};
use crate::model::{Context, SpeakerType};

/// Executes one named tool call against the retrieval engine / storage and
/// returns its result serialized for the model to read back. Kept separate
/// from `ReasoningAdapter` because tool execution is local (retrieval) while
/// the adapter is remote (the model provider) — they fail independently.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    fn tool_specs(&self) -> Vec<ToolSpec>;
    async fn call_tool(&self, name: &str, input: Value) -> Result<String, String>;
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub reply: String,
    pub identified_name: Option<String>,
    pub inferred_purpose: Option<String>,
    /// Set when the model's reply includes the `[[voicemail]]` marker —
    /// its own signal that the other end sounds like an answering machine
    /// greeting rather than a live caller.
    pub voicemail: bool,
}

const FALLBACK_REPLY: &str =
    "I'm sorry, I'm having trouble reaching our systems right now. Could you repeat that, or I can take a message?";
const ITERATION_BUDGET_FALLBACK: &str =
    "I'm sorry, I'm having trouble understanding — could you repeat that?";

/// The two per-turn budgets `run_turn` enforces, threaded in from
/// [`crate::config::Config`] rather than read off `crate::constants`
/// directly — deployments can tune either without a rebuild.
#[derive(Debug, Clone, Copy)]
pub struct TurnLimits {
    pub max_tool_iters: u32,
    pub tool_call_timeout: Duration,
}

impl Default for TurnLimits {
    fn default() -> Self {
        TurnLimits {
            max_tool_iters: MAX_TOOL_ITERS,
            tool_call_timeout: Duration::from_secs(TOOL_CALL_TIMEOUT_SECS),
        }
    }
}

/// Run one bounded reasoning turn.
///
/// - At most `limits.max_tool_iters` tool round-trips before the loop gives
///   up and returns a canned fallback reply without a further model call.
/// - The same `(tool name, input)` pair is never dispatched twice in one
///   turn; a repeat request is answered locally with an "already retrieved"
///   notice instead of re-invoking the tool.
/// - Each tool call is bounded by `limits.tool_call_timeout`; each model
///   round-trip gets one transport retry after `REASONING_RETRY_BACKOFF_MS`
///   before the whole turn falls back to [`FALLBACK_REPLY`].
pub async fn run_turn(
    reasoning: &Arc<dyn ReasoningAdapter>,
    executor: &Arc<dyn ToolExecutor>,
    system_prompt: &str,
    context: &Context,
    caller_utterance: &str,
    limits: TurnLimits,
) -> TurnOutcome {
    let mut messages = vec![ChatMessage::text(
        Role::User,
        format!(
            "{}\n\nCaller said: {}",
            render_context(context),
            caller_utterance
        ),
    )];

    let tools = executor.tool_specs();
    let mut seen_calls: HashSet<(String, String)> = HashSet::new();

    for _ in 0..limits.max_tool_iters {
        let request = TextGenerationRequest {
            model: reasoning.default_model().to_string(),
            system: Some(system_prompt.to_string()),
            messages: messages.clone(),
            tools: tools.clone(),
            max_tokens: 1024,
        };

        let response = match generate_with_retry(reasoning, request).await {
            Ok(r) => r,
            Err(_) => {
                return TurnOutcome {
                    reply: FALLBACK_REPLY.to_string(),
                    identified_name: None,
                    inferred_purpose: None,
                    voicemail: false,
                }
            }
        };

        if response.finish_reason != FinishReason::ToolUse || response.tool_calls.is_empty() {
            let (identified_name, inferred_purpose, voicemail) = extract_fields(&response.text);
            return TurnOutcome {
                reply: strip_extraction_markers(&response.text),
                identified_name,
                inferred_purpose,
                voicemail,
            };
        }

        // `generate_response` is the terminal tool: its argument is the text
        // to speak, not a retrieval query, so it never reaches `ToolExecutor`.
        // A model that calls it alongside other tool calls in the same
        // response still ends the turn here — the other calls are discarded
        // rather than dispatched, since the turn is already over.
        if let Some(terminal) = response
            .tool_calls
            .iter()
            .find(|call| call.name == "generate_response")
        {
            let reply_text = terminal
                .input
                .get("reply")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let (identified_name, inferred_purpose, voicemail) = extract_fields(&reply_text);
            return TurnOutcome {
                reply: strip_extraction_markers(&reply_text),
                identified_name,
                inferred_purpose,
                voicemail,
            };
        }

        messages.push(ChatMessage {
            role: Role::Assistant,
            content: response
                .tool_calls
                .iter()
                .map(|tc| ContentPart::ToolUse {
                    id: tc.id.clone(),
                    name: tc.name.clone(),
                    input: tc.input.clone(),
                })
                .chain(if response.text.is_empty() {
                    None
                } else {
                    Some(ContentPart::Text { text: response.text.clone() })
                })
                .collect(),
        });

        let mut tool_results = Vec::new();
        for call in &response.tool_calls {
            let key = (call.name.clone(), call.input.to_string());
            let result = if seen_calls.contains(&key) {
                "already retrieved this turn; reuse the earlier result".to_string()
            } else {
                seen_calls.insert(key);
                match tokio::time::timeout(
                    limits.tool_call_timeout,
                    executor.call_tool(&call.name, call.input.clone()),
                )
                .await
                {
                    Ok(Ok(result)) => result,
                    Ok(Err(e)) => format!("tool error: {e}"),
                    Err(_) => "tool call timed out".to_string(),
                }
            };
            tool_results.push(ContentPart::ToolResult {
                tool_use_id: call.id.clone(),
                content: result,
                is_error: false,
            });
        }

        messages.push(ChatMessage {
            role: Role::Tool,
            content: tool_results,
        });
    }

    // Iteration budget exhausted without the model ever calling
    // `generate_response`: stop here rather than re-invoking the model again,
    // per the turn's own bound.
    TurnOutcome {
        reply: ITERATION_BUDGET_FALLBACK.to_string(),
        identified_name: None,
        inferred_purpose: None,
        voicemail: false,
    }
}

async fn generate_with_retry(
    reasoning: &Arc<dyn ReasoningAdapter>,
    request: TextGenerationRequest,
) -> Result<types::TextGenerationResponse, crate::error::ReasoningError> {
    match reasoning.generate_text(request.clone()).await {
        Ok(r) => Ok(r),
        Err(_) => {
            tokio::time::sleep(Duration::from_millis(REASONING_RETRY_BACKOFF_MS)).await;
            reasoning.generate_text(request).await
        }
    }
}

fn render_context(context: &Context) -> String {
    let mut out = String::new();
    if !context.transcript_tail.is_empty() {
        out.push_str("Conversation so far:\n");
        for entry in &context.transcript_tail {
            let speaker = match entry.speaker {
                SpeakerType::Caller => "Caller",
                SpeakerType::Assistant => "Assistant",
            };
            out.push_str(&format!("{}: {}\n", speaker, entry.text));
        }
    }
    if let Some(name) = &context.identified_name {
        out.push_str(&format!("Identified caller name so far: {}\n", name));
    }
    if let Some(purpose) = &context.inferred_purpose {
        out.push_str(&format!("Inferred purpose so far: {}\n", purpose));
    }
    if !context.matched_contacts.is_empty() {
        out.push_str("Known contacts that may match:\n");
        for hit in &context.matched_contacts {
            out.push_str(&format!("- {} ({})\n", hit.record.name, hit.record.notes));
        }
    }
    if !context.matched_emails.is_empty() {
        out.push_str("Related emails on file:\n");
        for hit in &context.matched_emails {
            out.push_str(&format!("- {}: {}\n", hit.record.subject, hit.record.sender));
        }
    }
    out
}

/// Pull `[[name: ...]]` / `[[purpose: ...]]` / `[[voicemail]]` markers the
/// system prompt asks the model to emit inline so the orchestrator can
/// persist them onto the call record without a second model round-trip.
/// `[[voicemail]]` is presence-only: the model includes it when the other
/// end sounds like an answering machine greeting rather than a live caller.
fn extract_fields(text: &str) -> (Option<String>, Option<String>, bool) {
    let name = extract_marker(text, "[[name:", "]]");
    let purpose = extract_marker(text, "[[purpose:", "]]");
    let voicemail = text.contains("[[voicemail]]");
    (name, purpose, voicemail)
}

fn extract_marker(text: &str, open: &str, close: &str) -> Option<String> {
    let start = text.find(open)? + open.len();
    let rest = &text[start..];
    let end = rest.find(close)?;
    let value = rest[..end].trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn strip_extraction_markers(text: &str) -> String {
    let mut out = text.replace("[[voicemail]]", "");
    for marker in ["[[name:", "[[purpose:"] {
        while let Some(start) = out.find(marker) {
            if let Some(end) = out[start..].find("]]") {
                out.replace_range(start..start + end + 2, "");
            } else {
                break;
            }
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reasoning::fake::FakeReasoningAdapter;
    use crate::reasoning::types::{FinishReason, TextGenerationResponse, ToolCall};

    struct NoopExecutor;

    #[async_trait]
    impl ToolExecutor for NoopExecutor {
        fn tool_specs(&self) -> Vec<ToolSpec> {
            vec![ToolSpec {
                name: "search_contacts".to_string(),
                description: "search contacts".to_string(),
                input_schema: serde_json::json!({"type": "object"}),
            }]
        }

        async fn call_tool(&self, _name: &str, _input: Value) -> Result<String, String> {
            Ok("no hits".to_string())
        }
    }

    #[tokio::test]
    async fn test_plain_text_reply_extracts_no_fields() {
        let adapter: Arc<dyn ReasoningAdapter> = Arc::new(FakeReasoningAdapter::new(vec![
            TextGenerationResponse {
                text: "Sure, I can help with that.".to_string(),
                tool_calls: vec![],
                finish_reason: FinishReason::Stop,
            },
        ]));
        let executor: Arc<dyn ToolExecutor> = Arc::new(NoopExecutor);
        let outcome = run_turn(
            &adapter,
            &executor,
            "system prompt",
            &Context::default(),
            "hi there",
            TurnLimits::default(),
        )
        .await;
        assert_eq!(outcome.reply, "Sure, I can help with that.");
        assert!(outcome.identified_name.is_none());
    }

    #[tokio::test]
    async fn test_extraction_markers_are_parsed_and_stripped() {
        let adapter: Arc<dyn ReasoningAdapter> = Arc::new(FakeReasoningAdapter::new(vec![
            TextGenerationResponse {
                text: "Got it, I'll pass that along. [[name: Jordan]] [[purpose: billing question]]"
                    .to_string(),
                tool_calls: vec![],
                finish_reason: FinishReason::Stop,
            },
        ]));
        let executor: Arc<dyn ToolExecutor> = Arc::new(NoopExecutor);
        let outcome = run_turn(
            &adapter,
            &executor,
            "system prompt",
            &Context::default(),
            "this is jordan calling about billing",
            TurnLimits::default(),
        )
        .await;
        assert_eq!(outcome.identified_name.as_deref(), Some("Jordan"));
        assert_eq!(outcome.inferred_purpose.as_deref(), Some("billing question"));
        assert!(!outcome.reply.contains("[["));
        assert!(!outcome.voicemail);
    }

    #[tokio::test]
    async fn test_voicemail_marker_is_parsed_and_stripped() {
        let adapter: Arc<dyn ReasoningAdapter> = Arc::new(FakeReasoningAdapter::new(vec![
            TextGenerationResponse {
                text: "Hi, you've reached Acme Dental, please leave a message. [[voicemail]]"
                    .to_string(),
                tool_calls: vec![],
                finish_reason: FinishReason::Stop,
            },
        ]));
        let executor: Arc<dyn ToolExecutor> = Arc::new(NoopExecutor);
        let outcome = run_turn(
            &adapter,
            &executor,
            "system prompt",
            &Context::default(),
            "hi, you've reached Acme Dental, please leave a message after the tone",
            TurnLimits::default(),
        )
        .await;
        assert!(outcome.voicemail);
        assert!(!outcome.reply.contains("[["));
    }

    #[tokio::test]
    async fn test_generate_response_tool_call_ends_turn_without_dispatch() {
        let adapter: Arc<dyn ReasoningAdapter> = Arc::new(FakeReasoningAdapter::new(vec![
            TextGenerationResponse {
                text: String::new(),
                tool_calls: vec![ToolCall {
                    id: "call-1".to_string(),
                    name: "generate_response".to_string(),
                    input: serde_json::json!({"reply": "Thanks, I'll pass that along."}),
                }],
                finish_reason: FinishReason::ToolUse,
            },
        ]));
        let executor: Arc<dyn ToolExecutor> = Arc::new(NoopExecutor);
        let outcome = run_turn(
            &adapter,
            &executor,
            "system prompt",
            &Context::default(),
            "please tell them I called",
            TurnLimits::default(),
        )
        .await;
        assert_eq!(outcome.reply, "Thanks, I'll pass that along.");
    }

    #[tokio::test]
    async fn test_tool_loop_dedupes_repeat_calls() {
        let tool_call = ToolCall {
            id: "call-1".to_string(),
            name: "search_contacts".to_string(),
            input: serde_json::json!({"query": "jordan"}),
        };
        let adapter: Arc<dyn ReasoningAdapter> = Arc::new(FakeReasoningAdapter::new(vec![
            TextGenerationResponse {
                text: String::new(),
                tool_calls: vec![tool_call.clone()],
                finish_reason: FinishReason::ToolUse,
            },
            TextGenerationResponse {
                text: String::new(),
                tool_calls: vec![tool_call],
                finish_reason: FinishReason::ToolUse,
            },
            TextGenerationResponse {
                text: "Here's what I found.".to_string(),
                tool_calls: vec![],
                finish_reason: FinishReason::Stop,
            },
        ]));
        let executor: Arc<dyn ToolExecutor> = Arc::new(NoopExecutor);
        let outcome = run_turn(
            &adapter,
            &executor,
            "system prompt",
            &Context::default(),
            "who is jordan",
            TurnLimits::default(),
        )
        .await;
        assert_eq!(outcome.reply, "Here's what I found.");
    }

    #[tokio::test]
    async fn test_iteration_budget_exhaustion_falls_back_without_another_model_call() {
        let responses: Vec<TextGenerationResponse> = (0..crate::constants::MAX_TOOL_ITERS)
            .map(|i| TextGenerationResponse {
                text: String::new(),
                tool_calls: vec![ToolCall {
                    id: format!("call-{i}"),
                    name: "search_contacts".to_string(),
                    input: serde_json::json!({"name": format!("caller-{i}")}),
                }],
                finish_reason: FinishReason::ToolUse,
            })
            .collect();
        let adapter: Arc<dyn ReasoningAdapter> = Arc::new(FakeReasoningAdapter::new(responses));
        let executor: Arc<dyn ToolExecutor> = Arc::new(NoopExecutor);
        let outcome = run_turn(
            &adapter,
            &executor,
            "system prompt",
            &Context::default(),
            "who is this",
            TurnLimits::default(),
        )
        .await;
        assert_eq!(outcome.reply, ITERATION_BUDGET_FALLBACK);
    }

    #[tokio::test]
    async fn test_prompt_includes_transcript_tail_ahead_of_current_utterance() {
        let fake = Arc::new(FakeReasoningAdapter::new(vec![TextGenerationResponse {
            text: "Sure, let me check on that.".to_string(),
            tool_calls: vec![],
            finish_reason: FinishReason::Stop,
        }]));
        let adapter: Arc<dyn ReasoningAdapter> = fake.clone();
        let executor: Arc<dyn ToolExecutor> = Arc::new(NoopExecutor);
        let context = Context {
            identified_name: Some("Jordan".to_string()),
            inferred_purpose: Some("billing question".to_string()),
            transcript_tail: vec![
                crate::model::TranscriptEntry {
                    speaker: SpeakerType::Assistant,
                    text: "Thanks for calling, who am I speaking with?".to_string(),
                    at: chrono::Utc::now(),
                },
                crate::model::TranscriptEntry {
                    speaker: SpeakerType::Caller,
                    text: "This is Jordan.".to_string(),
                    at: chrono::Utc::now(),
                },
            ],
            ..Context::default()
        };

        run_turn(
            &adapter,
            &executor,
            "system prompt",
            &context,
            "what is it regarding?",
            TurnLimits::default(),
        )
        .await;

        let calls = fake.calls.lock();
        let first_message = &calls[0].messages[0];
        let rendered = match &first_message.content[0] {
            ContentPart::Text { text } => text.clone(),
            other => panic!("expected a text content part, got {other:?}"),
        };
        let tail_pos = rendered
            .find("This is Jordan.")
            .expect("transcript tail should be rendered into the prompt");
        let utterance_pos = rendered
            .find("what is it regarding?")
            .expect("current utterance should be rendered into the prompt");
        assert!(
            tail_pos < utterance_pos,
            "transcript tail must precede the current utterance in the prompt"
        );
        assert!(rendered.contains("Identified caller name so far: Jordan"));
        assert!(rendered.contains("Inferred purpose so far: billing question"));
    }

    #[tokio::test]
    async fn test_exhausted_adapter_falls_back() {
        let adapter: Arc<dyn ReasoningAdapter> = Arc::new(FakeReasoningAdapter::new(vec![]));
        let executor: Arc<dyn ToolExecutor> = Arc::new(NoopExecutor);
        let outcome = run_turn(
            &adapter,
            &executor,
            "system prompt",
            &Context::default(),
            "hello",
            TurnLimits::default(),
        )
        .await;
        assert_eq!(outcome.reply, FALLBACK_REPLY);
    }
}
