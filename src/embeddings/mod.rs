//! Embedding generation for vector retrieval
//!
//! The embedding-model runtime is an external collaborator reached over
//! HTTP; the engine only depends on the [`EmbeddingProvider`] trait. All
//! returned vectors are unit-length at the provider's fixed dimensions.

pub mod http;

pub use http::HttpEmbeddingProvider;

use crate::config::EmbeddingConfig;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// One text to embed, keyed by the caller's id (a chunk id during
/// ingestion).
#[derive(Debug, Clone)]
pub struct EmbeddingRequest {
    pub id: String,
    pub text: String,
}

/// One embedded text.
#[derive(Debug, Clone)]
pub struct EmbeddingRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub dimensions: usize,
}

/// Capability set of the embedding runtime.
///
/// `embed` and `embed_batch` are only valid between `initialize` and
/// `dispose`; calling them outside that window is an error. Embedding
/// failures always surface; there is no fallback to zero vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn initialize(&self) -> Result<()>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch; every requested id must be present in the result.
    async fn embed_batch(&self, requests: &[EmbeddingRequest]) -> Result<Vec<EmbeddingRecord>>;

    async fn health_check(&self) -> bool;

    async fn dispose(&self) -> Result<()>;

    fn dimensions(&self) -> usize;

    fn model_name(&self) -> &str;
}

/// Build the configured provider. All three backends speak the
/// OpenAI-compatible embeddings endpoint; the provider choice selects the
/// default base URL.
pub fn create_provider(config: &EmbeddingConfig) -> Arc<dyn EmbeddingProvider> {
    Arc::new(HttpEmbeddingProvider::new(config))
}

/// Scale a vector to unit length. Zero vectors are returned unchanged.
pub fn normalize(vector: &mut [f32]) {
    let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for x in vector.iter_mut() {
            *x /= magnitude;
        }
    }
}

/// Cosine similarity between two vectors; 0.0 for mismatched lengths or
/// zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_produces_unit_vector() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        let magnitude: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_leaves_zero_vector() {
        let mut v = vec![0.0, 0.0, 0.0];
        normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0];
        let b = vec![1.0, 0.0];
        let c = vec![0.0, 1.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&a, &c).abs() < 1e-6);
        assert_eq!(cosine_similarity(&a, &[1.0, 0.0, 0.0]), 0.0);
    }
}
