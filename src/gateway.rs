//! Embedding gateway abstraction and implementations.
//!
//! Defines the [`EmbeddingGateway`] trait and concrete implementations:
//! - **[`DisabledGateway`]**: store-only mode; yields empty vectors when embeddings are not configured.
//! - **[`OpenAiGateway`]**: calls the OpenAI embeddings API with batching, retry, and backoff.
//!
//! A gateway call takes one document's ordered section texts and returns one
//! vector per text, input order preserved, plus the batch token total. Calls
//! are assumed retry-safe for identical input; transient failures are retried
//! here with exponential backoff (1s, 2s, 4s, 8s, 16s, 32s cap), HTTP 4xx
//! other than 429 fails immediately.
//!
//! Also provides the BLOB codecs used for vector storage:
//! [`vec_to_blob`] / [`blob_to_vec`] encode embeddings as little-endian
//! `f32` bytes for SQLite.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::{Result, SyncError};

/// One gateway response: vectors in input order and the batch token total.
#[derive(Debug, Clone)]
pub struct EmbeddingBatch {
    pub vectors: Vec<Vec<f32>>,
    pub total_tokens: i64,
}

/// Trait for embedding gateways.
#[async_trait]
pub trait EmbeddingGateway: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embed a batch of texts, preserving input order in the output.
    async fn embed(&self, texts: &[String]) -> Result<EmbeddingBatch>;
}

/// Create the appropriate [`EmbeddingGateway`] based on configuration.
pub fn create_gateway(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingGateway>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledGateway)),
        "openai" => Ok(Box::new(OpenAiGateway::new(config)?)),
        other => Err(SyncError::Config(format!(
            "Unknown embedding provider: {}",
            other
        ))),
    }
}

// ============ Disabled Gateway ============

/// Store-only gateway for `embedding.provider = "disabled"`.
///
/// Sync passes still run the full reconciliation pipeline; sections are
/// persisted with empty vectors and no tokens are counted. Switching to a
/// real provider later requires a `--mode full` pass, since unchanged
/// checksums would otherwise skip re-embedding.
pub struct DisabledGateway;

#[async_trait]
impl EmbeddingGateway for DisabledGateway {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, texts: &[String]) -> Result<EmbeddingBatch> {
        Ok(EmbeddingBatch {
            vectors: texts.iter().map(|_| Vec::new()).collect(),
            total_tokens: 0,
        })
    }
}

// ============ OpenAI Gateway ============

/// Gateway calling the OpenAI `POST /v1/embeddings` endpoint.
///
/// Requires the `OPENAI_API_KEY` environment variable to be set.
pub struct OpenAiGateway {
    model: String,
    dims: usize,
    batch_size: usize,
    max_retries: u32,
    timeout_secs: u64,
}

impl OpenAiGateway {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config.model.clone().ok_or_else(|| {
            SyncError::Config("embedding.model required for OpenAI provider".to_string())
        })?;
        let dims = config.dims.ok_or_else(|| {
            SyncError::Config("embedding.dims required for OpenAI provider".to_string())
        })?;

        if std::env::var("OPENAI_API_KEY").is_err() {
            return Err(SyncError::Config(
                "OPENAI_API_KEY environment variable not set".to_string(),
            ));
        }

        Ok(Self {
            model,
            dims,
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
            timeout_secs: config.timeout_secs,
        })
    }

    /// One API request for up to `batch_size` texts, with the retry loop.
    async fn request_batch(
        &self,
        client: &reqwest::Client,
        api_key: &str,
        texts: &[String],
    ) -> Result<EmbeddingBatch> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = client
                .post("https://api.openai.com/v1/embeddings")
                .header("Authorization", format!("Bearer {}", api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| SyncError::Gateway(e.to_string()))?;
                        let batch = parse_openai_response(&json)?;
                        if batch.vectors.len() != texts.len() {
                            return Err(SyncError::Gateway(format!(
                                "OpenAI returned {} vectors for {} inputs",
                                batch.vectors.len(),
                                texts.len()
                            )));
                        }
                        return Ok(batch);
                    }

                    // Rate limited or server error: retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(SyncError::Gateway(format!(
                            "OpenAI API error {}: {}",
                            status, body_text
                        )));
                        continue;
                    }

                    // Client error (not 429): don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    return Err(SyncError::Gateway(format!(
                        "OpenAI API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(SyncError::Gateway(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| SyncError::Gateway("Embedding failed after retries".to_string())))
    }
}

#[async_trait]
impl EmbeddingGateway for OpenAiGateway {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<EmbeddingBatch> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| SyncError::Gateway("OPENAI_API_KEY not set".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| SyncError::Gateway(e.to_string()))?;

        let mut vectors = Vec::with_capacity(texts.len());
        let mut total_tokens = 0;

        for chunk in texts.chunks(self.batch_size) {
            let batch = self.request_batch(&client, &api_key, chunk).await?;
            vectors.extend(batch.vectors);
            total_tokens += batch.total_tokens;
        }

        Ok(EmbeddingBatch {
            vectors,
            total_tokens,
        })
    }
}

/// Parse the OpenAI embeddings API response JSON.
///
/// Extracts `data[].embedding` ordered by `data[].index` so the output
/// always matches input order, plus `usage.total_tokens`.
fn parse_openai_response(json: &serde_json::Value) -> Result<EmbeddingBatch> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| SyncError::Gateway("Invalid OpenAI response: missing data array".into()))?;

    let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());

    for (pos, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| {
                SyncError::Gateway("Invalid OpenAI response: missing embedding".into())
            })?;

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        indexed.push((index, vec));
    }

    indexed.sort_by_key(|(index, _)| *index);

    let total_tokens = json
        .get("usage")
        .and_then(|u| u.get("total_tokens"))
        .and_then(|t| t.as_i64())
        .unwrap_or(0);

    Ok(EmbeddingBatch {
        vectors: indexed.into_iter().map(|(_, v)| v).collect(),
        total_tokens,
    })
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        let restored = blob_to_vec(&blob);
        assert_eq!(vec, restored);
    }

    #[test]
    fn test_parse_response_reorders_by_index() {
        let json = serde_json::json!({
            "data": [
                {"index": 1, "embedding": [2.0, 2.0]},
                {"index": 0, "embedding": [1.0, 1.0]}
            ],
            "usage": {"total_tokens": 7}
        });
        let batch = parse_openai_response(&json).unwrap();
        assert_eq!(batch.vectors, vec![vec![1.0, 1.0], vec![2.0, 2.0]]);
        assert_eq!(batch.total_tokens, 7);
    }

    #[test]
    fn test_parse_response_missing_data() {
        let json = serde_json::json!({"error": "nope"});
        assert!(parse_openai_response(&json).is_err());
    }

    #[tokio::test]
    async fn test_disabled_gateway_yields_empty_vectors() {
        let gateway = DisabledGateway;
        let batch = gateway.embed(&["x".to_string(), "y".to_string()]).await.unwrap();
        assert_eq!(batch.vectors, vec![Vec::<f32>::new(), Vec::new()]);
        assert_eq!(batch.total_tokens, 0);
    }
}
