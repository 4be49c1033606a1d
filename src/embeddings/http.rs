//! HTTP embedding provider
//!
//! Talks to an OpenAI-compatible `/embeddings` endpoint. A llama.cpp server,
//! the OpenAI API, and Ollama all expose this shape; the configured provider
//! only changes the default base URL. Rate limits and transient server
//! errors are retried with exponential backoff.

use super::{normalize, EmbeddingProvider, EmbeddingRecord, EmbeddingRequest};
use crate::config::{EmbeddingConfig, EmbeddingProviderKind};
use crate::error::{Result, ZmemError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

const MAX_RETRIES: usize = 3;
const BACKOFF_BASE_MS: u64 = 1000;
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Estimated characters per token for input truncation.
const CHARS_PER_TOKEN: usize = 4;

const STATE_NEW: u8 = 0;
const STATE_READY: u8 = 1;
const STATE_DISPOSED: u8 = 2;

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

/// OpenAI-compatible embedding provider.
pub struct HttpEmbeddingProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dimensions: usize,
    batch_size: usize,
    max_chars: usize,
    state: AtomicU8,
}

impl HttpEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        let base_url = config.base_url.clone().unwrap_or_else(|| {
            match config.provider {
                EmbeddingProviderKind::Llamacpp => "http://127.0.0.1:8080/v1",
                EmbeddingProviderKind::Openai => "https://api.openai.com/v1",
                EmbeddingProviderKind::Ollama => "http://127.0.0.1:11434/v1",
            }
            .to_string()
        });

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            dimensions: config.dimensions,
            batch_size: config.batch_size.max(1),
            max_chars: config.max_tokens * CHARS_PER_TOKEN,
            state: AtomicU8::new(STATE_NEW),
        }
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.state.load(Ordering::SeqCst) {
            STATE_READY => Ok(()),
            STATE_NEW => Err(ZmemError::Embedding(
                "provider not initialized".to_string(),
            )),
            _ => Err(ZmemError::Embedding("provider disposed".to_string())),
        }
    }

    /// Truncate input to the provider's token budget, on a char boundary.
    fn truncate<'a>(&self, text: &'a str) -> &'a str {
        if text.len() <= self.max_chars {
            return text;
        }
        let mut end = self.max_chars;
        while end > 0 && !text.is_char_boundary(end) {
            end -= 1;
        }
        &text[..end]
    }

    /// POST one batch, retrying rate limits and transient server errors.
    async fn request_embeddings(&self, texts: Vec<&str>) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);
        let expected = texts.len();

        let mut attempt = 0;
        loop {
            let mut request = self.client.post(&url).json(&EmbeddingsRequest {
                model: &self.model,
                input: texts.clone(),
            });
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }

            let response = request
                .send()
                .await
                .map_err(|e| ZmemError::Embedding(format!("request failed: {}", e)))?;

            let status = response.status();
            if status.is_success() {
                let body: EmbeddingsResponse = response
                    .json()
                    .await
                    .map_err(|e| ZmemError::Embedding(format!("invalid response: {}", e)))?;

                if body.data.len() != expected {
                    return Err(ZmemError::Embedding(format!(
                        "expected {} embeddings, got {}",
                        expected,
                        body.data.len()
                    )));
                }

                let mut ordered = body.data;
                ordered.sort_by_key(|d| d.index);

                let mut vectors = Vec::with_capacity(expected);
                for data in ordered {
                    if data.embedding.len() != self.dimensions {
                        return Err(ZmemError::Embedding(format!(
                            "model returned {} dimensions, expected {}",
                            data.embedding.len(),
                            self.dimensions
                        )));
                    }
                    let mut vector = data.embedding;
                    normalize(&mut vector);
                    vectors.push(vector);
                }
                return Ok(vectors);
            }

            let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            if retryable && attempt < MAX_RETRIES {
                let backoff = BACKOFF_BASE_MS * (1u64 << attempt);
                warn!(
                    "Embedding request returned {}, retrying in {}ms",
                    status, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
                attempt += 1;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(ZmemError::Embedding(format!(
                "embedding endpoint returned {}: {}",
                status,
                body.chars().take(300).collect::<String>()
            )));
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn initialize(&self) -> Result<()> {
        if self.state.load(Ordering::SeqCst) == STATE_DISPOSED {
            return Err(ZmemError::Embedding("provider disposed".to_string()));
        }
        if self.model.trim().is_empty() {
            return Err(ZmemError::Embedding(
                "embedding model is not configured".to_string(),
            ));
        }
        self.state.store(STATE_READY, Ordering::SeqCst);
        debug!(
            "Embedding provider ready: {} at {} ({} dims)",
            self.model, self.base_url, self.dimensions
        );
        Ok(())
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.ensure_ready()?;
        let mut vectors = self.request_embeddings(vec![self.truncate(text)]).await?;
        vectors
            .pop()
            .ok_or_else(|| ZmemError::Embedding("empty embedding response".to_string()))
    }

    async fn embed_batch(&self, requests: &[EmbeddingRequest]) -> Result<Vec<EmbeddingRecord>> {
        self.ensure_ready()?;

        let mut records = Vec::with_capacity(requests.len());
        for batch in requests.chunks(self.batch_size) {
            let texts: Vec<&str> = batch.iter().map(|r| self.truncate(&r.text)).collect();
            let vectors = self.request_embeddings(texts).await?;
            for (request, vector) in batch.iter().zip(vectors) {
                let dimensions = vector.len();
                records.push(EmbeddingRecord {
                    id: request.id.clone(),
                    vector,
                    dimensions,
                });
            }
        }
        Ok(records)
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/models", self.base_url);
        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        match request.send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                warn!("Embedding health check failed: {}", e);
                false
            }
        }
    }

    async fn dispose(&self) -> Result<()> {
        self.state.store(STATE_DISPOSED, Ordering::SeqCst);
        Ok(())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingConfig;

    fn provider() -> HttpEmbeddingProvider {
        HttpEmbeddingProvider::new(&EmbeddingConfig::default())
    }

    #[tokio::test]
    async fn test_embed_before_initialize_is_an_error() {
        let provider = provider();
        let result = provider.embed("hello").await;
        assert!(matches!(result, Err(ZmemError::Embedding(_))));
    }

    #[tokio::test]
    async fn test_embed_after_dispose_is_an_error() {
        let provider = provider();
        provider.initialize().await.unwrap();
        provider.dispose().await.unwrap();
        let result = provider.embed("hello").await;
        assert!(matches!(result, Err(ZmemError::Embedding(_))));
        // A disposed provider cannot be re-initialized either.
        assert!(provider.initialize().await.is_err());
    }

    #[test]
    fn test_default_base_url_tracks_provider() {
        let mut config = EmbeddingConfig::default();
        config.provider = EmbeddingProviderKind::Ollama;
        let provider = HttpEmbeddingProvider::new(&config);
        assert_eq!(provider.base_url, "http://127.0.0.1:11434/v1");

        config.base_url = Some("http://gpu-box:9000/v1/".to_string());
        let provider = HttpEmbeddingProvider::new(&config);
        assert_eq!(provider.base_url, "http://gpu-box:9000/v1");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let mut config = EmbeddingConfig::default();
        config.max_tokens = 1;
        let provider = HttpEmbeddingProvider::new(&config);
        // 4-char budget falls inside the second multibyte char.
        let text = "héllo wörld";
        let truncated = provider.truncate(text);
        assert!(truncated.len() <= 4);
        assert!(text.starts_with(truncated));
    }
}
