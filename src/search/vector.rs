//! Semantic retrieval over the vector collection
//!
//! Embeds the query, runs a filtered ANN lookup, and hydrates the resulting
//! chunk hits back into item-level results through the metadata store. Items
//! missing from the store or outside the requested statuses are discarded.

use crate::embeddings::EmbeddingProvider;
use crate::error::Result;
use crate::storage::filter::FilterExpr;
use crate::storage::sqlite::MetadataStore;
use crate::storage::vectors::VectorCollection;
use crate::types::{memory_id_of_chunk, MemoryStatus, MemoryType, Scope, SearchHit};
use tracing::debug;

/// Snippet length budget in bytes.
const SNIPPET_LEN: usize = 200;

#[derive(Debug, Clone)]
pub struct VectorOptions {
    pub workspace: String,
    pub top_k: usize,
    pub scopes: Vec<Scope>,
    pub types: Vec<MemoryType>,
    pub statuses: Vec<MemoryStatus>,
}

impl VectorOptions {
    pub fn new(workspace: &str) -> Self {
        Self {
            workspace: workspace.to_string(),
            top_k: 30,
            scopes: Vec::new(),
            types: Vec::new(),
            statuses: vec![MemoryStatus::Active],
        }
    }
}

/// Build the collection-side metadata filter for the requested options.
pub fn build_filter(options: &VectorOptions) -> String {
    let statuses: Vec<&str> = options.statuses.iter().map(|s| s.as_str()).collect();
    let scopes: Vec<&str> = options.scopes.iter().map(|s| s.as_str()).collect();
    let types: Vec<&str> = options.types.iter().map(|t| t.as_str()).collect();

    FilterExpr::all_of([
        Some(FilterExpr::eq("workspace", &options.workspace)),
        FilterExpr::any_of("status", statuses.iter().copied()),
        FilterExpr::any_of("scope", scopes.iter().copied()),
        FilterExpr::any_of("type", types.iter().copied()),
    ])
    .map(|f| f.render())
    .unwrap_or_default()
}

pub async fn vector_search(
    store: &MetadataStore,
    collection: &dyn VectorCollection,
    provider: &dyn EmbeddingProvider,
    query: &str,
    options: &VectorOptions,
) -> Result<Vec<SearchHit>> {
    if query.trim().is_empty() {
        return Ok(Vec::new());
    }

    let query_vector = provider.embed(query).await?;
    let filter = build_filter(options);
    let hits = collection.query(&query_vector, options.top_k, Some(&filter))?;
    debug!("ANN query returned {} chunk hits", hits.len());

    // Collapse chunk hits to items, keeping the best-scoring chunk. Hits
    // arrive score-descending, so first occurrence wins.
    let mut item_ids: Vec<String> = Vec::new();
    let mut best_score: std::collections::HashMap<String, f64> = std::collections::HashMap::new();
    for hit in &hits {
        let memory_id = memory_id_of_chunk(&hit.id).to_string();
        if !best_score.contains_key(&memory_id) {
            item_ids.push(memory_id.clone());
            best_score.insert(memory_id, hit.score);
        }
    }

    let meta = store
        .items_meta(&item_ids, &options.statuses, Some(&options.workspace))
        .await?;

    let mut results = Vec::new();
    for id in item_ids {
        let Some(item) = meta.get(&id) else {
            continue;
        };
        results.push(SearchHit {
            id: id.clone(),
            title: item.title.clone(),
            score: best_score[&id],
            source: "vec".to_string(),
            snippet: make_snippet(&item.content, query),
            scope: item.scope,
            item_type: item.item_type,
            status: item.status,
        });
    }

    results.truncate(options.top_k);
    Ok(results)
}

/// A window of roughly [`SNIPPET_LEN`] bytes around the first query word
/// (length > 2, case-insensitive) found in the content; the content head
/// otherwise.
fn make_snippet(content: &str, query: &str) -> String {
    let lowered = content.to_lowercase();
    let match_idx = query
        .to_lowercase()
        .split_whitespace()
        .filter(|w| w.chars().count() > 2)
        .find_map(|w| lowered.find(w));

    match match_idx {
        Some(idx) if idx < content.len() => {
            let start = floor_char_boundary(content, idx.saturating_sub(50));
            let end = floor_char_boundary(content, (idx + 150).min(content.len()));
            let mut snippet = String::new();
            if start > 0 {
                snippet.push('…');
            }
            snippet.push_str(content[start..end].trim());
            if end < content.len() {
                snippet.push('…');
            }
            snippet
        }
        _ => {
            let end = floor_char_boundary(content, SNIPPET_LEN.min(content.len()));
            let mut snippet = content[..end].trim().to_string();
            if end < content.len() {
                snippet.push('…');
            }
            snippet
        }
    }
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
