//! Embedding provider client, grounded in the reference architecture's
//! `ai::adapter` request/response shape and `orm::vector`'s fixed-length
//! vector convention, narrowed to the single operation this system needs:
//! turn text into an `EMB_DIM`-length vector.

pub mod http;
pub mod local;

use async_trait::async_trait;

use crate::error::EmbeddingError;

#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Embed a batch of strings in one round trip. Implementations must
    /// reject empty/whitespace-only inputs with `EmbeddingError::InvalidInput`
    /// rather than silently returning a zero vector.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut out = self.embed(&[text.to_string()]).await?;
        Ok(out.pop().unwrap_or_default())
    }
}

pub(crate) fn validate_inputs(texts: &[String]) -> Result<(), EmbeddingError> {
    if texts.is_empty() || texts.iter().all(|t| t.trim().is_empty()) {
        return Err(EmbeddingError::InvalidInput);
    }
    Ok(())
}
