//! Query embedding and vector utilities for the SQLite corpus.
//!
//! - [`QueryEmbedder`]: embeds a search query with the OpenAI embeddings
//!   API, with retry and backoff.
//! - [`vec_to_blob`] / [`blob_to_vec`]: little-endian `f32` BLOB codec
//!   matching the `chunk_vectors.embedding` column.
//! - [`cosine_similarity`]: similarity between two vectors.
//!
//! Query vectors must match `embedding.dims`; the SQLite store also checks
//! stored vectors against the query's length and model.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use std::time::Duration;

use crate::config::EmbeddingConfig;

const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

/// Embeds query strings with the configured provider.
pub struct QueryEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl QueryEmbedder {
    /// Create an embedder, or `None` when `embedding.provider = "disabled"`.
    ///
    /// # Errors
    ///
    /// Returns an error if `model` is missing or `OPENAI_API_KEY` is not set.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Option<Self>> {
        match config.provider.as_str() {
            "disabled" => Ok(None),
            "openai" => {
                let model = config.model.clone().ok_or_else(|| {
                    anyhow::anyhow!("embedding.model required for OpenAI provider")
                })?;
                let api_key = std::env::var("OPENAI_API_KEY")
                    .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
                let client = reqwest::Client::builder()
                    .timeout(Duration::from_secs(config.timeout_secs))
                    .build()?;
                Ok(Some(Self {
                    client,
                    api_key,
                    model,
                    dims: config.dims.unwrap_or(0),
                    max_retries: config.max_retries,
                }))
            }
            other => bail!("Unknown embedding provider: {}", other),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    /// Embed a single query text.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(OPENAI_EMBEDDINGS_URL)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return check_dims(parse_embedding_response(&json)?, self.dims);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(anyhow::anyhow!(
                            "OpenAI API error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    bail!("OpenAI API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Embedding failed after retries")))
    }
}

/// Extract `data[0].embedding` from an embeddings API response.
fn parse_embedding_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let embedding = json
        .get("data")
        .and_then(|d| d.get(0))
        .and_then(|item| item.get("embedding"))
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing embedding"))?;

    Ok(embedding
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}

/// Reject a vector whose length differs from the configured `dims`.
///
/// `dims == 0` means no dimension was configured.
fn check_dims(vector: Vec<f32>, dims: usize) -> Result<Vec<f32>> {
    if dims != 0 && vector.len() != dims {
        bail!("embedding has {} dims but embedding.dims is {}", vector.len(), dims);
    }
    Ok(vector)
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
