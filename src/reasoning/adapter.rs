//! Narrowed from the reference architecture's `ai::adapter::AIProviderAdapter`:
//! dropped `AdapterRegistry`'s multi-provider priority routing (this system
//! is configured with exactly one `REASONING_PROVIDER` at startup, not a
//! runtime-selectable pool) and the LoRA/fine-tune capability surface
//! (irrelevant to a hosted chat-completions endpoint). What survives is the
//! single `generate_text` seam every concrete provider implements.

use async_trait::async_trait;

use super::types::{TextGenerationRequest, TextGenerationResponse};
use crate::error::ReasoningError;

#[async_trait]
pub trait ReasoningAdapter: Send + Sync {
    fn provider_id(&self) -> &'static str;
    fn default_model(&self) -> &str;

    async fn generate_text(
        &self,
        request: TextGenerationRequest,
    ) -> Result<TextGenerationResponse, ReasoningError>;
}
