
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::ProviderConfig;
use crate::{RagError, Result};

/// Capability of turning an ordered batch of texts into an equally ordered
/// batch of embedding vectors. The concrete backend is chosen by
/// configuration; callers only see this trait.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single batch. Output length and order match the input.
    /// Callers compose larger workloads out of multiple calls; no batching
    /// happens inside the provider.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Client for OpenAI-compatible embedding endpoints (OpenRouter or a direct
/// provider). Stateless between calls.
#[derive(Debug, Clone)]
pub struct HttpEmbeddingClient {
    http: reqwest::Client,
    endpoint: Url,
    model: String,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

impl HttpEmbeddingClient {
    #[inline]
    pub fn new(
        endpoint: Url,
        model: String,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RagError::Network(e.to_string()))?;

        Ok(Self {
            http,
            endpoint,
            model,
            api_key,
        })
    }

    #[inline]
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let endpoint = config
            .endpoint_url()
            .map_err(|e| RagError::Config(e.to_string()))?;

        let api_key = config.resolve_api_key().ok_or_else(|| {
            RagError::Config("embedding provider API key is not set".to_string())
        })?;

        Self::new(
            endpoint,
            config.model.clone(),
            Some(api_key),
            Duration::from_secs(config.timeout_seconds),
        )
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            "Requesting embeddings for {} texts from {}",
            texts.len(),
            self.endpoint
        );

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let mut builder = self.http.post(self.endpoint.clone()).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| RagError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| RagError::Network(e.to_string()))?;

        if !(200..300).contains(&status) {
            // Surface the provider's body verbatim so the caller can tell
            // upstream quota errors from outages.
            return Err(RagError::Provider { status, body });
        }

        let parsed: EmbeddingResponse = serde_json::from_str(&body).map_err(|e| {
            RagError::Provider {
                status,
                body: format!("malformed embedding response: {}", e),
            }
        })?;

        if parsed.data.len() != texts.len() {
            return Err(RagError::Provider {
                status,
                body: format!(
                    "embedding count mismatch: sent {} inputs, received {} vectors",
                    texts.len(),
                    parsed.data.len()
                ),
            });
        }

        // The wire contract does not guarantee result order; re-sort by the
        // provider-assigned index and verify every input is accounted for.
        let mut items = parsed.data;
        items.sort_by_key(|item| item.index);

        for (position, item) in items.iter().enumerate() {
            if item.index != position {
                return Err(RagError::Provider {
                    status,
                    body: format!(
                        "embedding result for input {} is missing or duplicated",
                        position
                    ),
                });
            }
        }

        debug!("Received {} embeddings", items.len());
        Ok(items.into_iter().map(|item| item.embedding).collect())
    }
}
