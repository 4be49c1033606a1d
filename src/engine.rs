//! The memory engine: lifecycle, retrieval, ingestion, maintenance
//!
//! One engine instance serves one workspace. It owns the metadata store,
//! the vector collections and the embedding provider, and sequences every
//! mutation through the dual-store protocol: metadata rows are committed as
//! `pending`, vectors are written, then the rows are finalised to `active`;
//! failures compensate the earlier phases so callers observe the item as
//! either fully present or fully absent.

use crate::config::{recall_metrics_enabled, RetrievalMode, ZmemConfig};
use crate::diagnostics::LatencyWindow;
use crate::embeddings::{self, EmbeddingProvider, EmbeddingRequest};
use crate::error::{Result, ZmemError};
use crate::ingest::{
    self, chunk_document, discover_files, parse_files, ChunkerOptions, IngestOptions,
    ParsedDocument, RawChunk,
};
use crate::search::{
    fuse, lexical_search, tokenize_query, FusionOptions, LexicalOptions, VectorOptions,
};
use crate::storage::sqlite::MetadataStore;
use crate::storage::vectors::{VectorMetadata, VectorStore, VectorStoreOptions};
use crate::types::{
    chunk_id, content_hash, new_memory_id, ContentChunk, IngestReport, MemoryItem, MemoryStatus,
    MemoryType, ReindexReport, SaveOutcome, Scope, SearchHit, WorkspaceStatus,
};
use chrono::Utc;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Validated input of `save`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SaveInput {
    #[serde(rename = "type")]
    pub item_type: MemoryType,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub scope: Option<Scope>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub importance: Option<f64>,
    #[serde(default)]
    pub supersedes_id: Option<String>,
}

impl SaveInput {
    fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(ZmemError::Validation("title must not be empty".to_string()));
        }
        if self.content.trim().is_empty() {
            return Err(ZmemError::Validation(
                "content must not be empty".to_string(),
            ));
        }
        if let Some(importance) = self.importance {
            if !(0.0..=1.0).contains(&importance) {
                return Err(ZmemError::Validation(format!(
                    "importance must be within [0, 1], got {}",
                    importance
                )));
            }
        }
        Ok(())
    }
}

/// Filters of `list`.
#[derive(Debug, Clone, Default)]
pub struct ListFilters {
    pub workspace: Option<String>,
    pub item_type: Option<MemoryType>,
    pub scope: Option<Scope>,
    pub status: Option<MemoryStatus>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone)]
pub struct ListPage {
    pub items: Vec<MemoryItem>,
    pub total: i64,
}

/// Options of `recall`; unset fields fall back to the configured defaults.
#[derive(Debug, Clone, Default)]
pub struct RecallOptions {
    pub mode: Option<RetrievalMode>,
    pub scopes: Option<Vec<Scope>>,
    pub types: Option<Vec<MemoryType>>,
    pub top_k: Option<usize>,
    pub include_superseded: Option<bool>,
}

/// Single-workspace memory engine over the dual stores.
pub struct MemoryEngine {
    store: Arc<MetadataStore>,
    vectors: Arc<VectorStore>,
    provider: Arc<dyn EmbeddingProvider>,
    config: ZmemConfig,
    workspace: String,
    recall_latency: Option<LatencyWindow>,
}

impl MemoryEngine {
    /// Open the stores, initialise the provider, and build an engine for
    /// `workspace`.
    pub async fn new(config: ZmemConfig, workspace: String) -> Result<Self> {
        let store = Arc::new(MetadataStore::open(&config.storage.db_path).await?);
        let vectors = Arc::new(VectorStore::new(
            config.storage.zvec_path.clone(),
            VectorStoreOptions::with_dimensions(config.ai.embedding.dimensions),
        ));
        let provider = embeddings::create_provider(&config.ai.embedding);
        provider.initialize().await?;

        Ok(Self::with_parts(store, vectors, provider, config, workspace))
    }

    /// Assemble an engine from already-built parts. Tests use this to
    /// substitute the provider or vector collections.
    pub fn with_parts(
        store: Arc<MetadataStore>,
        vectors: Arc<VectorStore>,
        provider: Arc<dyn EmbeddingProvider>,
        config: ZmemConfig,
        workspace: String,
    ) -> Self {
        let recall_latency = recall_metrics_enabled().then(LatencyWindow::new);
        Self {
            store,
            vectors,
            provider,
            config,
            workspace,
            recall_latency,
        }
    }

    pub fn workspace(&self) -> &str {
        &self.workspace
    }

    pub fn store(&self) -> &Arc<MetadataStore> {
        &self.store
    }

    pub fn vector_store(&self) -> &Arc<VectorStore> {
        &self.vectors
    }

    /// Dispose the provider, close every vector collection, and flush the
    /// metadata store. Called once on shutdown.
    pub async fn shutdown(&self) {
        if let Err(e) = self.provider.dispose().await {
            warn!("Provider dispose failed: {}", e);
        }
        self.vectors.close_all();
        self.store.close().await;
    }

    // === save ===

    /// Two-phase save: prepare (chunk + embed), commit the pending row,
    /// write vectors, finalise to active. Compensations reverse completed
    /// phases on failure.
    pub async fn save(&self, input: SaveInput) -> Result<SaveOutcome> {
        input.validate()?;

        // Supersede preconditions against the current workspace.
        let superseded_id = match &input.supersedes_id {
            Some(old_id) => {
                let old = self
                    .store
                    .get_item(old_id, &self.workspace)
                    .await?
                    .ok_or_else(|| {
                        ZmemError::NotFound(format!("supersede target {} not found", old_id))
                    })?;
                if old.status != MemoryStatus::Active {
                    return Err(ZmemError::Conflict(format!(
                        "supersede target {} is {}, expected active",
                        old_id, old.status
                    )));
                }
                Some(old.id)
            }
            None => None,
        };

        let id = new_memory_id();
        let now = Utc::now();
        let chunks = attach_chunks(&id, chunk_document(&input.content, &ChunkerOptions::default()));

        // Phase 0: embed everything before any store mutation.
        let vectors_by_chunk = self.embed_chunks(&chunks).await?;

        let item = MemoryItem {
            id: id.clone(),
            item_type: input.item_type,
            title: input.title.trim().to_string(),
            content: input.content.clone(),
            summary: input.summary.unwrap_or_default(),
            source: input.source.unwrap_or_default(),
            scope: input.scope.unwrap_or(Scope::Workspace),
            workspace: self.workspace.clone(),
            tags: input.tags,
            importance: input.importance.unwrap_or(0.5),
            status: MemoryStatus::Pending,
            supersedes_id: superseded_id.clone(),
            content_hash: content_hash(input.content.as_bytes()),
            created_at: now,
            updated_at: now,
        };

        self.commit_item(&item, &chunks, &vectors_by_chunk, superseded_id.as_deref())
            .await?;

        Ok(SaveOutcome {
            id,
            is_new: true,
            superseded_id,
        })
    }

    /// Phases 1-4 of the dual-store protocol, shared by `save` and the
    /// ingestion upsert.
    async fn commit_item(
        &self,
        item: &MemoryItem,
        chunks: &[ContentChunk],
        vectors_by_chunk: &HashMap<String, Vec<f32>>,
        superseded_id: Option<&str>,
    ) -> Result<()> {
        // Phase 1: pending row + chunks + embedding-tracking rows.
        self.store
            .insert_item(item, chunks, self.provider.model_name())
            .await?;

        // Phase 2: vector writes. Metadata carries status "active" even
        // though the row is still pending; visibility is governed by the
        // row-status filter at hydration, and this avoids a metadata
        // rewrite on finalise.
        let vector_result: Result<()> = async {
            let collection = self.vectors.collection(&item.workspace)?;
            for chunk in chunks {
                let vector = vectors_by_chunk.get(&chunk.id).ok_or_else(|| {
                    ZmemError::Embedding(format!("missing embedding for chunk {}", chunk.id))
                })?;
                collection.insert(
                    &chunk.id,
                    vector,
                    &VectorMetadata {
                        memory_id: item.id.clone(),
                        workspace: item.workspace.clone(),
                        scope: item.scope.as_str().to_string(),
                        kind: item.item_type.as_str().to_string(),
                        status: "active".to_string(),
                    },
                )?;
            }
            Ok(())
        }
        .await;

        if let Err(e) = vector_result {
            warn!("Vector write failed for {}, rolling back: {}", item.id, e);
            if let Err(rollback) = self.store.delete_item_row(&item.id).await {
                warn!("Rollback of {} failed: {}", item.id, rollback);
            }
            return Err(ZmemError::Database(format!(
                "vector write failed: {}",
                e
            )));
        }

        // Phase 3: finalise to active, archiving the superseded row.
        if let Err(e) = self.store.finalize_save(&item.id, superseded_id).await {
            warn!("Finalise failed for {}, rolling back: {}", item.id, e);
            if let Ok(collection) = self.vectors.collection(&item.workspace) {
                for chunk in chunks {
                    let _ = collection.delete(&chunk.id);
                }
            }
            if let Err(rollback) = self.store.delete_item_row(&item.id).await {
                warn!("Rollback of {} failed: {}", item.id, rollback);
            }
            return Err(ZmemError::Database(format!("finalise failed: {}", e)));
        }

        // Phase 4: reclaim the superseded item's vectors. The metadata side
        // is already consistent; a failure here still surfaces.
        if let Some(old_id) = superseded_id {
            let old_chunk_ids = self.store.chunk_ids(old_id).await?;
            let collection = self.vectors.collection(&item.workspace)?;
            for chunk_id in &old_chunk_ids {
                collection.delete(chunk_id).map_err(|e| {
                    ZmemError::Database(format!(
                        "failed to reclaim vectors of superseded {}: {}",
                        old_id, e
                    ))
                })?;
            }
            self.store.delete_chunk_embeddings(old_id).await?;
        }

        debug!("Committed item {} ({} chunks)", item.id, chunks.len());
        Ok(())
    }

    async fn embed_chunks(
        &self,
        chunks: &[ContentChunk],
    ) -> Result<HashMap<String, Vec<f32>>> {
        let requests: Vec<EmbeddingRequest> = chunks
            .iter()
            .map(|c| EmbeddingRequest {
                id: c.id.clone(),
                text: c.text.clone(),
            })
            .collect();

        let records = self.provider.embed_batch(&requests).await?;
        let mut by_id: HashMap<String, Vec<f32>> = records
            .into_iter()
            .map(|r| (r.id, r.vector))
            .collect();

        for chunk in chunks {
            if !by_id.contains_key(&chunk.id) {
                return Err(ZmemError::Embedding(format!(
                    "provider returned no embedding for chunk {}",
                    chunk.id
                )));
            }
        }
        by_id.retain(|id, _| chunks.iter().any(|c| &c.id == id));
        Ok(by_id)
    }

    // === get / list ===

    pub async fn get(&self, id: &str) -> Result<Option<MemoryItem>> {
        if id.trim().is_empty() {
            return Err(ZmemError::Validation("id must not be empty".to_string()));
        }
        self.store.get_item(id, &self.workspace).await
    }

    pub async fn list(&self, filters: ListFilters) -> Result<ListPage> {
        if filters.limit <= 0 {
            return Err(ZmemError::Validation("limit must be positive".to_string()));
        }
        if filters.offset < 0 {
            return Err(ZmemError::Validation(
                "offset must not be negative".to_string(),
            ));
        }

        let workspace = filters.workspace.as_deref().unwrap_or(&self.workspace);
        let status = filters.status.unwrap_or(MemoryStatus::Active);
        let (items, total) = self
            .store
            .list_items(
                workspace,
                filters.item_type,
                filters.scope,
                status,
                filters.limit,
                filters.offset,
            )
            .await?;
        Ok(ListPage { items, total })
    }

    // === recall ===

    pub async fn recall(&self, query: &str, options: RecallOptions) -> Result<Vec<SearchHit>> {
        if query.trim().is_empty() {
            return Err(ZmemError::Validation("query must not be blank".to_string()));
        }
        let started = Instant::now();

        let defaults = &self.config.defaults;
        let mode = options.mode.unwrap_or(defaults.retrieval_mode);
        let scopes = options
            .scopes
            .clone()
            .unwrap_or_else(|| defaults.scopes_default.clone());
        let types = options.types.clone().unwrap_or_default();
        let include_superseded = options
            .include_superseded
            .unwrap_or(defaults.retrieval.include_superseded);
        let top_k = options
            .top_k
            .unwrap_or(defaults.retrieval.rerank_top_k)
            .max(1);

        let statuses = if include_superseded {
            vec![MemoryStatus::Active, MemoryStatus::Archived]
        } else {
            vec![MemoryStatus::Active]
        };

        let lex_options = LexicalOptions {
            workspace: self.workspace.clone(),
            top_k: defaults.retrieval.top_k_lex.max(top_k),
            scopes: scopes.clone(),
            types: types.clone(),
            statuses: statuses.clone(),
        };
        let vec_options = VectorOptions {
            workspace: self.workspace.clone(),
            top_k: defaults.retrieval.top_k_vec.max(top_k),
            scopes: scopes.clone(),
            types: types.clone(),
            statuses: statuses.clone(),
        };

        let mut hits = match mode {
            RetrievalMode::Lexical => {
                lexical_search(&self.store, query, &lex_options).await?
            }
            RetrievalMode::Vector => {
                let collection = self.vectors.collection(&self.workspace)?;
                crate::search::vector_search(
                    &self.store,
                    collection.as_ref(),
                    self.provider.as_ref(),
                    query,
                    &vec_options,
                )
                .await?
            }
            RetrievalMode::Hybrid => {
                let lexical = lexical_search(&self.store, query, &lex_options).await?;
                let collection = self.vectors.collection(&self.workspace)?;
                let vector = crate::search::vector_search(
                    &self.store,
                    collection.as_ref(),
                    self.provider.as_ref(),
                    query,
                    &vec_options,
                )
                .await?;
                fuse(
                    lexical,
                    vector,
                    &FusionOptions {
                        min_score: defaults.retrieval.min_score,
                        ..FusionOptions::default()
                    },
                )
            }
        };

        // Archived rows matched by keyword are merged in regardless of the
        // retrieval mode when superseded items were requested.
        if include_superseded {
            let tokens = tokenize_query(query);
            let archived = self
                .store
                .archived_keyword_search(
                    &tokens,
                    &self.workspace,
                    &scopes,
                    &types,
                    top_k as i64,
                )
                .await?;
            let mut by_id: HashMap<String, SearchHit> =
                hits.into_iter().map(|h| (h.id.clone(), h)).collect();
            for row in archived {
                let hit = SearchHit {
                    id: row.id.clone(),
                    title: row.title,
                    score: 0.35,
                    source: "lex".to_string(),
                    snippet: row.snippet,
                    scope: row.scope,
                    item_type: row.item_type,
                    status: row.status,
                };
                match by_id.get(&row.id) {
                    Some(existing) if existing.score >= hit.score => {}
                    _ => {
                        by_id.insert(row.id.clone(), hit);
                    }
                }
            }
            hits = by_id.into_values().collect();
            hits.sort_by(|a, b| {
                b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal)
            });
        } else {
            // Prune rows shadowed by a mutual active supersedes reference.
            let hidden = self.store.hidden_active_ids(&self.workspace).await?;
            if !hidden.is_empty() {
                hits.retain(|h| !hidden.contains(&h.id));
            }
        }

        hits.truncate(top_k);

        if let Some(window) = &self.recall_latency {
            window.record(started.elapsed().as_secs_f64() * 1000.0);
        }
        Ok(hits)
    }

    // === delete ===

    /// Soft delete. Returns false for a missing or already-deleted item. If
    /// the vector-side delete fails, the prior row state is restored and a
    /// database fault surfaces.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        if id.trim().is_empty() {
            return Err(ZmemError::Validation("id must not be empty".to_string()));
        }

        let Some(item) = self.store.get_item(id, &self.workspace).await? else {
            return Ok(false);
        };
        if item.status == MemoryStatus::Deleted {
            return Ok(false);
        }

        let prior_status = item.status;
        let prior_updated_at = item.updated_at;

        self.store
            .set_status(id, MemoryStatus::Deleted, Utc::now())
            .await?;

        let vector_result: Result<()> = async {
            let collection = self.vectors.collection(&self.workspace)?;
            for chunk_id in self.store.chunk_ids(id).await? {
                collection.delete(&chunk_id)?;
            }
            Ok(())
        }
        .await;

        if let Err(e) = vector_result {
            warn!("Vector delete failed for {}, restoring status: {}", id, e);
            self.store
                .set_status(id, prior_status, prior_updated_at)
                .await?;
            return Err(ZmemError::Database(format!("vector delete failed: {}", e)));
        }

        self.store.delete_chunk_embeddings(id).await?;
        info!("Deleted item {}", id);
        Ok(true)
    }

    // === ingest ===

    /// Run the ingestion pipeline against a directory tree.
    pub async fn ingest(&self, options: &IngestOptions) -> Result<IngestReport> {
        let started = Instant::now();
        let mut report = IngestReport::default();

        let files = discover_files(&options.root, &options.patterns, &options.excludes)?;
        report.scanned = files.len();
        let seen_sources: HashSet<String> =
            files.iter().map(|f| f.rel_path.clone()).collect();

        let (parsed, parse_errors) = parse_files(files).await;
        report.errors.extend(parse_errors);

        // Change detection against the active row for each source.
        struct PendingDoc {
            source: String,
            doc: ParsedDocument,
            prior: Option<MemoryItem>,
            chunks: Vec<ContentChunk>,
            id: String,
        }

        let mut pending: Vec<PendingDoc> = Vec::new();
        for (file, doc) in parsed {
            let prior = self
                .store
                .find_active_by_source(&file.rel_path, &options.workspace)
                .await?;
            if let Some(existing) = &prior {
                if existing.content_hash == doc.content_hash {
                    report.unchanged += 1;
                    continue;
                }
            }
            let id = new_memory_id();
            let chunks = attach_chunks(&id, chunk_document(&doc.content, &ChunkerOptions::default()));
            pending.push(PendingDoc {
                source: file.rel_path,
                doc,
                prior,
                chunks,
                id,
            });
        }

        // Embed and upsert in batches of documents; a failed batch records
        // errors for its documents and the run continues.
        for batch in pending.chunks(ingest::EMBED_DOC_BATCH) {
            let requests: Vec<EmbeddingRequest> = batch
                .iter()
                .flat_map(|p| p.chunks.iter())
                .map(|c| EmbeddingRequest {
                    id: c.id.clone(),
                    text: c.text.clone(),
                })
                .collect();

            let records = match self.provider.embed_batch(&requests).await {
                Ok(records) => records,
                Err(e) => {
                    for doc in batch {
                        report
                            .errors
                            .push(format!("{}: embedding failed: {}", doc.source, e));
                    }
                    continue;
                }
            };
            let vectors_by_chunk: HashMap<String, Vec<f32>> =
                records.into_iter().map(|r| (r.id, r.vector)).collect();

            for doc in batch {
                if let Some(missing) = doc
                    .chunks
                    .iter()
                    .find(|c| !vectors_by_chunk.contains_key(&c.id))
                {
                    report.errors.push(format!(
                        "{}: no embedding returned for chunk {}",
                        doc.source, missing.id
                    ));
                    continue;
                }

                let now = Utc::now();
                let item = MemoryItem {
                    id: doc.id.clone(),
                    item_type: doc.doc.item_type,
                    title: doc.doc.title.clone(),
                    content: doc.doc.content.clone(),
                    summary: String::new(),
                    source: doc.source.clone(),
                    scope: Scope::Workspace,
                    workspace: options.workspace.clone(),
                    tags: doc.doc.tags.clone(),
                    importance: doc.doc.importance,
                    status: MemoryStatus::Pending,
                    supersedes_id: doc.prior.as_ref().map(|p| p.id.clone()),
                    content_hash: doc.doc.content_hash.clone(),
                    // A frontmatter date records when the document was
                    // authored; it wins over the ingest time.
                    created_at: doc.doc.date.unwrap_or(now),
                    updated_at: now,
                };

                match self
                    .commit_item(
                        &item,
                        &doc.chunks,
                        &vectors_by_chunk,
                        doc.prior.as_ref().map(|p| p.id.as_str()),
                    )
                    .await
                {
                    Ok(()) => {
                        if doc.prior.is_some() {
                            report.updated += 1;
                        } else {
                            report.inserted += 1;
                        }
                        report.chunks_created += doc.chunks.len();
                    }
                    Err(e) => {
                        report.errors.push(format!("{}: {}", doc.source, e));
                    }
                }
            }
        }

        // Cleanup: active file-sourced rows whose source vanished from the
        // corpus are soft-deleted. Their vectors are reclaimed on reindex.
        let removed = self
            .store
            .soft_delete_missing_sources(&options.workspace, &seen_sources)
            .await?;
        report.removed = removed.len();

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            "Ingest finished: {} scanned, {} inserted, {} updated, {} unchanged, {} removed, {} errors",
            report.scanned,
            report.inserted,
            report.updated,
            report.unchanged,
            report.removed,
            report.errors.len()
        );
        Ok(report)
    }

    // === reindex ===

    /// Rebuild chunks, embeddings and vectors for every active item from
    /// its stored content. Per-batch failures are counted and the run
    /// continues; a later reindex repairs what a failed batch left behind.
    pub async fn reindex(&self) -> Result<ReindexReport> {
        let started = Instant::now();
        let mut report = ReindexReport::default();

        let items = self.store.active_items(&self.workspace).await?;
        if items.is_empty() {
            report.duration_ms = started.elapsed().as_millis() as u64;
            return Ok(report);
        }

        let collection = self.vectors.collection(&self.workspace)?;

        for batch in items.chunks(ingest::EMBED_DOC_BATCH) {
            let rebuilt: Vec<(&MemoryItem, Vec<ContentChunk>)> = batch
                .iter()
                .map(|item| {
                    (
                        item,
                        attach_chunks(
                            &item.id,
                            chunk_document(&item.content, &ChunkerOptions::default()),
                        ),
                    )
                })
                .collect();

            let requests: Vec<EmbeddingRequest> = rebuilt
                .iter()
                .flat_map(|(_, chunks)| chunks.iter())
                .map(|c| EmbeddingRequest {
                    id: c.id.clone(),
                    text: c.text.clone(),
                })
                .collect();

            let records = match self.provider.embed_batch(&requests).await {
                Ok(records) => records,
                Err(e) => {
                    warn!("Reindex batch embedding failed: {}", e);
                    report.errors += batch.len();
                    continue;
                }
            };
            let vectors_by_chunk: HashMap<String, Vec<f32>> =
                records.into_iter().map(|r| (r.id, r.vector)).collect();

            for (item, chunks) in rebuilt {
                let result: Result<()> = async {
                    let old_chunk_ids = self.store.delete_chunks(&item.id).await?;
                    for old_id in &old_chunk_ids {
                        collection.delete(old_id)?;
                    }

                    self.store
                        .insert_chunks(&chunks, self.provider.model_name())
                        .await?;
                    for chunk in &chunks {
                        let vector = vectors_by_chunk.get(&chunk.id).ok_or_else(|| {
                            ZmemError::Embedding(format!(
                                "missing embedding for chunk {}",
                                chunk.id
                            ))
                        })?;
                        collection.insert(
                            &chunk.id,
                            vector,
                            &VectorMetadata {
                                memory_id: item.id.clone(),
                                workspace: item.workspace.clone(),
                                scope: item.scope.as_str().to_string(),
                                kind: item.item_type.as_str().to_string(),
                                status: "active".to_string(),
                            },
                        )?;
                    }
                    self.store.touch_item(&item.id).await?;
                    Ok(())
                }
                .await;

                match result {
                    Ok(()) => report.processed += 1,
                    Err(e) => {
                        warn!("Reindex failed for {}: {}", item.id, e);
                        report.errors += 1;
                    }
                }
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            "Reindex finished: {} processed, {} errors",
            report.processed, report.errors
        );
        Ok(report)
    }

    // === status ===

    pub async fn status(&self) -> Result<WorkspaceStatus> {
        self.store.workspace_status(&self.workspace).await
    }
}

/// Bind raw chunks to an item id, producing the deterministic chunk ids.
fn attach_chunks(memory_id: &str, raw: Vec<RawChunk>) -> Vec<ContentChunk> {
    raw.into_iter()
        .map(|c| ContentChunk {
            id: chunk_id(memory_id, c.seq),
            memory_id: memory_id.to_string(),
            seq: c.seq,
            pos: c.pos,
            token_count: c.token_count,
            text: c.text,
        })
        .collect()
}
