//! Scripted adapter for tests, modeled on the reference architecture's
//! pattern of a deterministic stand-in adapter in its test modules (see
//! `tts_service`'s silence fallback test path): a queue of canned responses
//! consumed one per `generate_text` call, with no network I/O.

use async_trait::async_trait;
use parking_lot::Mutex;

use super::adapter::ReasoningAdapter;
use super::types::TextGenerationRequest;
use super::types::TextGenerationResponse;
use crate::error::ReasoningError;

pub struct FakeReasoningAdapter {
    scripted: Mutex<Vec<TextGenerationResponse>>,
    pub calls: Mutex<Vec<TextGenerationRequest>>,
}

impl FakeReasoningAdapter {
    pub fn new(scripted: Vec<TextGenerationResponse>) -> Self {
        FakeReasoningAdapter {
            scripted: Mutex::new(scripted),
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ReasoningAdapter for FakeReasoningAdapter {
    fn provider_id(&self) -> &'static str {
        "fake"
    }

    fn default_model(&self) -> &str {
        "fake-model"
    }

    async fn generate_text(
        &self,
        request: TextGenerationRequest,
    ) -> Result<TextGenerationResponse, ReasoningError> {
        self.calls.lock().push(request);
        let mut scripted = self.scripted.lock();
        if scripted.is_empty() {
            return Err(ReasoningError::Unavailable("fake adapter exhausted".to_string()));
        }
        Ok(scripted.remove(0))
    }
}
