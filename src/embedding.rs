//! Embedding generation against a hosted embedding endpoint

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::{Config, EndpointConfig};
use crate::error::{Error, Result};

/// A capability that maps text to a fixed-length vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// The fixed output dimension of this provider
    fn dimensions(&self) -> usize;
}

/// Embedding client for an OpenAI-compatible `/embeddings` endpoint
pub struct HttpEmbeddingClient {
    endpoint: EndpointConfig,
    client: reqwest::Client,
    dimensions: usize,
}

impl HttpEmbeddingClient {
    /// Create a new embedding client from the configured endpoint
    pub fn new(config: &Config, endpoint: EndpointConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            endpoint,
            client,
            dimensions: config.embedding_dimensions,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/embeddings", self.endpoint.base_url);

        let body = serde_json::json!({
            "model": self.endpoint.model,
            "input": [text],
            "encoding_format": "float",
        });

        debug!(model = %self.endpoint.model, "Sending embedding request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.endpoint.api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(Error::embedding(format!(
                "Embedding endpoint returned {}: {}",
                status, error_body
            )));
        }

        let api_response: EmbeddingApiResponse = response
            .json()
            .await
            .map_err(|e| Error::embedding(format!("Failed to parse embedding response: {}", e)))?;

        api_response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| Error::embedding("No embedding returned"))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Degraded-mode adapter: any provider failure becomes a zero vector of the
/// provider's dimension, never an error. Callers must treat zero vectors as
/// storable placeholders, not as missing values.
pub struct ZeroFallback<P> {
    inner: P,
}

impl<P: EmbeddingProvider> ZeroFallback<P> {
    pub fn new(inner: P) -> Self {
        Self { inner }
    }

    /// Embed a text, substituting a zero vector on any failure
    pub async fn embed_or_zero(&self, text: &str) -> Vec<f32> {
        match self.inner.embed(text).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!(error = %e, "Embedding failed, storing zero vector");
                vec![0.0; self.inner.dimensions()]
            }
        }
    }

    pub fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }
}

// --- Embedding API types ---

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}
