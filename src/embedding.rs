//! Embedding gateway: the only component that talks to the external
//! embedding service.
//!
//! Defines the [`EmbeddingGateway`] trait and two implementations:
//! - **[`HttpGateway`]** — calls an Ollama-compatible `POST /api/embed`
//!   endpoint with batching, bounded retries, and exponential backoff.
//! - **[`DisabledGateway`]** — returns `EmbeddingUnavailable`; used when no
//!   embedding service is configured. Prefix search keeps working.
//!
//! The vector dimension `D` is a system-wide constant fixed by
//! configuration. Every returned vector is checked against it; a mismatch
//! is an invariant violation, not a retryable fault. [`validate`] probes
//! the gateway once at startup so a misconfigured dimension is fatal
//! before any data is written.
//!
//! # Retry Strategy
//!
//! - HTTP 429 and 5xx → retry
//! - other 4xx → fail immediately
//! - network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! Also provides the vector utilities shared by the index and the query
//! log: [`vec_to_blob`], [`blob_to_vec`], [`l2_normalize`], [`l2_distance`].

use async_trait::async_trait;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::{DepotError, Result};

/// Interface to the embedding model.
#[async_trait]
pub trait EmbeddingGateway: Send + Sync {
    /// Model identifier, for logs and the query log.
    fn model_name(&self) -> &str;
    /// Vector dimensionality `D`.
    fn dims(&self) -> usize;
    /// Embed one text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    /// Embed a batch, preserving input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
    /// Liveness probe.
    async fn health(&self) -> Result<()>;
}

/// Build the configured gateway.
pub fn create_gateway(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingGateway>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledGateway)),
        "http" => Ok(Box::new(HttpGateway::new(config)?)),
        other => Err(DepotError::Internal(format!(
            "unknown embedding provider: {}",
            other
        ))),
    }
}

/// Probe the gateway once and verify the advertised dimension.
/// Called at startup of embedding-dependent processes; a mismatch is fatal.
pub async fn validate(gateway: &dyn EmbeddingGateway) -> Result<()> {
    gateway.health().await?;
    let probe = gateway.embed("dimension probe").await?;
    if probe.len() != gateway.dims() {
        return Err(DepotError::Internal(format!(
            "embedding dimension mismatch: configured {}, service returned {}",
            gateway.dims(),
            probe.len()
        )));
    }
    Ok(())
}

// ============ Disabled gateway ============

/// Gateway used when embeddings are not configured. Every call fails with
/// `EmbeddingUnavailable`.
pub struct DisabledGateway;

#[async_trait]
impl EmbeddingGateway for DisabledGateway {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(DepotError::EmbeddingUnavailable(
            "embedding provider is disabled".to_string(),
        ))
    }
    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(DepotError::EmbeddingUnavailable(
            "embedding provider is disabled".to_string(),
        ))
    }
    async fn health(&self) -> Result<()> {
        Err(DepotError::EmbeddingUnavailable(
            "embedding provider is disabled".to_string(),
        ))
    }
}

// ============ HTTP gateway ============

/// Gateway for an Ollama-compatible embedding endpoint.
pub struct HttpGateway {
    url: String,
    model: String,
    dims: usize,
    max_retries: u32,
    client: reqwest::Client,
}

impl HttpGateway {
    pub fn new(config: &EmbeddingConfig) -> Result<HttpGateway> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DepotError::Internal(format!("http client: {}", e)))?;

        Ok(HttpGateway {
            url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            dims: config.dims,
            max_retries: config.max_retries,
            client,
        })
    }

    async fn request_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err: Option<DepotError> = None;

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(format!("{}/api/embed", self.url))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await.map_err(|e| {
                            DepotError::EmbeddingUnavailable(format!("bad response body: {}", e))
                        })?;
                        let vectors = parse_embed_response(&json)?;
                        return self.check_dims(vectors, texts.len());
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let text = response.text().await.unwrap_or_default();
                        last_err = Some(DepotError::EmbeddingUnavailable(format!(
                            "embedding API error {}: {}",
                            status, text
                        )));
                        continue;
                    }

                    // Other client errors — don't retry
                    let text = response.text().await.unwrap_or_default();
                    return Err(DepotError::EmbeddingUnavailable(format!(
                        "embedding API error {}: {}",
                        status, text
                    )));
                }
                Err(e) => {
                    last_err = Some(DepotError::EmbeddingUnavailable(format!(
                        "embedding connection error (is the service running at {}?): {}",
                        self.url, e
                    )));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            DepotError::EmbeddingUnavailable("embedding failed after retries".to_string())
        }))
    }

    /// Wrong vector count or dimension is an invariant violation at the
    /// call site, never retried.
    fn check_dims(&self, vectors: Vec<Vec<f32>>, expected_count: usize) -> Result<Vec<Vec<f32>>> {
        if vectors.len() != expected_count {
            return Err(DepotError::Internal(format!(
                "embedding count mismatch: sent {}, got {}",
                expected_count,
                vectors.len()
            )));
        }
        for v in &vectors {
            if v.len() != self.dims {
                return Err(DepotError::Internal(format!(
                    "embedding dimension mismatch: expected {}, got {}",
                    self.dims,
                    v.len()
                )));
            }
        }
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingGateway for HttpGateway {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.request_embeddings(&[text.to_string()]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| DepotError::EmbeddingUnavailable("empty embedding response".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request_embeddings(texts).await
    }

    async fn health(&self) -> Result<()> {
        let resp = self
            .client
            .get(format!("{}/api/tags", self.url))
            .send()
            .await
            .map_err(|e| DepotError::EmbeddingUnavailable(format!("health check failed: {}", e)))?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(DepotError::EmbeddingUnavailable(format!(
                "health check returned {}",
                resp.status()
            )))
        }
    }
}

fn parse_embed_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            DepotError::EmbeddingUnavailable("invalid response: missing embeddings array".to_string())
        })?;

    let mut result = Vec::with_capacity(embeddings.len());
    for embedding in embeddings {
        let vec: Vec<f32> = embedding
            .as_array()
            .ok_or_else(|| {
                DepotError::EmbeddingUnavailable(
                    "invalid response: embedding is not an array".to_string(),
                )
            })?
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        result.push(vec);
    }

    Ok(result)
}

// ============ Vector utilities ============

/// Encode a float vector as little-endian f32 bytes for BLOB storage.
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

/// Scale a vector to unit L2 norm. Zero vectors are left unchanged.
///
/// Vectors are normalized at write and query time, so L2 distance ordering
/// over the index matches cosine ordering.
pub fn l2_normalize(vec: &mut [f32]) {
    let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vec.iter_mut() {
            *v /= norm;
        }
    }
}

/// Euclidean distance between two vectors. Mismatched lengths yield
/// `f32::MAX` so bad rows sink to the bottom of any ranking.
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::MAX;
    }
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}
