//! Shared test fixtures: a deterministic in-process embedding provider and
//! an engine builder over temporary stores.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use zmem_core::embeddings::{normalize, EmbeddingProvider, EmbeddingRecord, EmbeddingRequest};
use zmem_core::engine::MemoryEngine;
use zmem_core::error::{Result, ZmemError};
use zmem_core::storage::sqlite::MetadataStore;
use zmem_core::storage::vectors::{
    VectorCollection, VectorHit, VectorMetadata, VectorStore, VectorStoreOptions,
};
use zmem_core::config::ZmemConfig;

pub const TEST_DIMENSIONS: usize = 32;

/// Deterministic bag-of-words embedding: identical text embeds to identical
/// unit vectors, overlapping vocabularies to similar ones. No network.
pub struct MockEmbeddingProvider {
    ready: AtomicBool,
}

impl MockEmbeddingProvider {
    pub fn new() -> Self {
        Self {
            ready: AtomicBool::new(false),
        }
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; TEST_DIMENSIONS];
        for token in text
            .to_lowercase()
            .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        {
            if token.chars().count() < 2 {
                continue;
            }
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let bucket = (hasher.finish() as usize) % TEST_DIMENSIONS;
            vector[bucket] += 1.0;
        }
        normalize(&mut vector);
        vector
    }

    fn check_ready(&self) -> Result<()> {
        if self.ready.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ZmemError::Embedding("provider not initialized".to_string()))
        }
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn initialize(&self) -> Result<()> {
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.check_ready()?;
        Ok(self.vector_for(text))
    }

    async fn embed_batch(&self, requests: &[EmbeddingRequest]) -> Result<Vec<EmbeddingRecord>> {
        self.check_ready()?;
        Ok(requests
            .iter()
            .map(|r| EmbeddingRecord {
                id: r.id.clone(),
                vector: self.vector_for(&r.text),
                dimensions: TEST_DIMENSIONS,
            })
            .collect())
    }

    async fn health_check(&self) -> bool {
        true
    }

    async fn dispose(&self) -> Result<()> {
        self.ready.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn dimensions(&self) -> usize {
        TEST_DIMENSIONS
    }

    fn model_name(&self) -> &str {
        "mock-embed"
    }
}

/// A collection wrapper whose failure switches drive the compensation
/// paths in the engine.
pub struct FlakyCollection {
    inner: Arc<dyn VectorCollection>,
    pub fail_inserts: AtomicBool,
    pub fail_deletes: AtomicBool,
}

impl FlakyCollection {
    pub fn wrap(inner: Arc<dyn VectorCollection>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fail_inserts: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
        })
    }
}

impl VectorCollection for FlakyCollection {
    fn insert(&self, id: &str, vector: &[f32], metadata: &VectorMetadata) -> Result<()> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(ZmemError::Database("injected insert failure".to_string()));
        }
        self.inner.insert(id, vector, metadata)
    }

    fn query(&self, vector: &[f32], top_k: usize, filter: Option<&str>) -> Result<Vec<VectorHit>> {
        self.inner.query(vector, top_k, filter)
    }

    fn delete(&self, id: &str) -> Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(ZmemError::Database("injected delete failure".to_string()));
        }
        self.inner.delete(id)
    }

    fn close(&self) -> Result<()> {
        self.inner.close()
    }
}

/// Temporary stores shared by every engine handed out by this context, so
/// multi-workspace tests observe one database.
pub struct TestContext {
    pub store: Arc<MetadataStore>,
    pub vectors: Arc<VectorStore>,
    pub provider: Arc<MockEmbeddingProvider>,
    pub config: ZmemConfig,
    _tmp: TempDir,
}

impl TestContext {
    pub async fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(
            MetadataStore::open(&tmp.path().join("zmem.db"))
                .await
                .unwrap(),
        );
        let vectors = Arc::new(VectorStore::new(
            tmp.path().join("zvec"),
            VectorStoreOptions::with_dimensions(TEST_DIMENSIONS),
        ));
        let provider = Arc::new(MockEmbeddingProvider::new());
        provider.initialize().await.unwrap();

        let mut config = ZmemConfig::default();
        config.ai.embedding.dimensions = TEST_DIMENSIONS;

        Self {
            store,
            vectors,
            provider,
            config,
            _tmp: tmp,
        }
    }

    pub fn engine(&self, workspace: &str) -> MemoryEngine {
        MemoryEngine::with_parts(
            self.store.clone(),
            self.vectors.clone(),
            self.provider.clone(),
            self.config.clone(),
            workspace.to_string(),
        )
    }
}

/// Build a `SaveInput` from JSON, panicking on schema violations.
pub fn save_input(value: serde_json::Value) -> zmem_core::SaveInput {
    serde_json::from_value(value).unwrap()
}
