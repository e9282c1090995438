//! Deterministic local fallback embedder. Used by tests and by deployments
//! that run without a configured embedding provider key — never a
//! production substitute for a real embedding model, only a stand-in that
//! keeps `search_contacts`/`search_emails` exercisable without network
//! access. Hashes words into a fixed-length vector and L2-normalizes,
//! so near-duplicate text lands close in cosine space without learning
//! any real semantics.

use async_trait::async_trait;

use super::{validate_inputs, EmbeddingClient};
use crate::error::EmbeddingError;

pub struct LocalHashEmbedder {
    dim: usize,
}

impl LocalHashEmbedder {
    pub fn new(dim: usize) -> Self {
        LocalHashEmbedder { dim }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for word in text.to_lowercase().split_whitespace() {
            let mut hash: u64 = 1469598103934665603;
            for b in word.as_bytes() {
                hash ^= *b as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let idx = (hash as usize) % self.dim;
            v[idx] += 1.0;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in v.iter_mut() {
                *x /= norm;
            }
        }
        v
    }
}

#[async_trait]
impl EmbeddingClient for LocalHashEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        validate_inputs(texts)?;
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_similar_text_embeds_close() {
        let embedder = LocalHashEmbedder::new(64);
        let a = embedder.embed_one("call about the invoice").await.unwrap();
        let b = embedder.embed_one("call about an invoice").await.unwrap();
        let c = embedder.embed_one("completely unrelated topic here").await.unwrap();

        let dot_ab: f32 = a.iter().zip(&b).map(|(x, y)| x * y).sum();
        let dot_ac: f32 = a.iter().zip(&c).map(|(x, y)| x * y).sum();
        assert!(dot_ab > dot_ac);
    }

    #[tokio::test]
    async fn test_rejects_empty_input() {
        let embedder = LocalHashEmbedder::new(16);
        let err = embedder.embed(&[]).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::InvalidInput));
    }
}
