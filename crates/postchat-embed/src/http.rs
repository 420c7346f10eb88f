//! Embedding provider speaking the `/api/embeddings` JSON protocol.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use postchat_core::config::EmbeddingSettings;
use postchat_core::traits::Embedder;
use postchat_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub struct HttpEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    id: String,
    dimension: Option<usize>,
}

impl HttpEmbedder {
    pub fn new(host: &str, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let model = model.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("embedding http client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/embeddings", host.trim_end_matches('/')),
            id: format!("http:{}", model),
            model,
            dimension: None,
        })
    }

    pub fn from_settings(settings: &EmbeddingSettings) -> Result<Self> {
        let embedder = Self::new(&settings.host, settings.model.clone(), Duration::from_secs(settings.timeout_secs))?;
        Ok(match settings.dimension {
            Some(dim) => embedder.with_dimension(dim),
            None => embedder,
        })
    }

    /// Reject vectors whose length differs from `dim`.
    pub fn with_dimension(mut self, dim: usize) -> Self {
        self.dimension = Some(dim);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn embedder_id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        self.dimension.unwrap_or(0)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let start = Instant::now();
        let request = EmbeddingRequest { model: &self.model, prompt: text };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("embedding request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!("embedding API error: {} - {}", status, error_text);
            return Err(Error::Upstream(format!("embedding API error {}: {}", status, error_text)));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("malformed embedding response: {}", e)))?;

        let vector = body.embedding.unwrap_or_default();
        if vector.is_empty() {
            return Err(Error::Upstream("embedding response carried no vector".to_string()));
        }
        if let Some(expected) = self.dimension {
            if vector.len() != expected {
                return Err(Error::Upstream(format!(
                    "embedding dimension mismatch: expected {}, got {}",
                    expected,
                    vector.len()
                )));
            }
        }

        debug!(dim = vector.len(), elapsed = ?start.elapsed(), "embedded text");
        Ok(vector)
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Option<Vec<f32>>,
}
