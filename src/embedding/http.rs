//! HTTP embedding provider, grounded in `ai::anthropic_adapter`'s reqwest
//! client-construction pattern (bearer/API-key header, JSON body, timeout).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{validate_inputs, EmbeddingClient};
use crate::error::EmbeddingError;

const REQUEST_TIMEOUT_SECS: u64 = 10;

pub struct HttpEmbeddingClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dim: usize,
}

impl HttpEmbeddingClient {
    pub fn new(base_url: String, api_key: String, model: String, dim: usize) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("reqwest client build");
        HttpEmbeddingClient {
            client,
            base_url,
            api_key,
            model,
            dim,
        }
    }
}

#[derive(Serialize)]
struct EmbedRequestBody<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponseBody {
    data: Vec<EmbedDatum>,
}

#[derive(Deserialize)]
struct EmbedDatum {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        validate_inputs(texts)?;

        let resp = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&EmbedRequestBody {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| EmbeddingError::Unavailable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(EmbeddingError::Unavailable(format!(
                "embedding provider returned {}",
                resp.status()
            )));
        }

        let body: EmbedResponseBody = resp
            .json()
            .await
            .map_err(|e| EmbeddingError::Unavailable(e.to_string()))?;

        let vectors: Vec<Vec<f32>> = body.data.into_iter().map(|d| d.embedding).collect();
        for v in &vectors {
            if v.len() != self.dim {
                return Err(EmbeddingError::Unavailable(format!(
                    "embedding provider returned dim {}, expected {}",
                    v.len(),
                    self.dim
                )));
            }
        }
        Ok(vectors)
    }
}
