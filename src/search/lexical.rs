//! Lexical retrieval over the FTS index
//!
//! Runs a strict AND pass first, relaxing to OR only for multi-token
//! queries that matched nothing. Archived rows are excluded from the FTS
//! projection by the triggers, so when archived results are requested a
//! keyword LIKE fallback recovers them at a fixed score below any
//! BM25-normalised hit.

use crate::error::Result;
use crate::storage::sqlite::{LexicalFilter, MetadataStore};
use crate::types::{MemoryStatus, MemoryType, Scope, SearchHit};
use std::collections::HashMap;
use tracing::debug;

/// Fixed score for archived keyword hits; below any `1/(1+|bm25|)` score.
const ARCHIVED_SCORE: f64 = 0.35;

/// Token cap applied after normalisation.
const MAX_TOKENS: usize = 12;

#[derive(Debug, Clone)]
pub struct LexicalOptions {
    pub workspace: String,
    pub top_k: usize,
    pub scopes: Vec<Scope>,
    pub types: Vec<MemoryType>,
    pub statuses: Vec<MemoryStatus>,
}

impl LexicalOptions {
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

/// Normalise a query into match tokens: lowercase, quotes to spaces, split
/// on anything that is not a letter, digit or underscore, drop short
/// tokens, cap the count.
pub fn tokenize_query(query: &str) -> Vec<String> {
    let cleaned: String = query
        .to_lowercase()
        .chars()
        .map(|c| match c {
            '\'' | '"' | '`' | '\u{2018}' | '\u{2019}' | '\u{201c}' | '\u{201d}' => ' ',
            _ => c,
        })
        .collect();

    cleaned
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| t.chars().count() >= 2)
        .take(MAX_TOKENS)
        .map(|t| t.to_string())
        .collect()
}

/// Quote tokens into an FTS5 match expression joined by `joiner`.
fn build_match_expr(tokens: &[String], joiner: &str) -> String {
    tokens
        .iter()
        .map(|t| format!("\"{}\"", t))
        .collect::<Vec<_>>()
        .join(joiner)
}

fn bm25_to_score(rank: f64) -> f64 {
    1.0 / (1.0 + rank.abs())
}

/// Merge `extra` into `base`, deduplicating by id and keeping the higher
/// score.
fn merge_hits(base: &mut HashMap<String, SearchHit>, extra: Vec<SearchHit>) {
    for hit in extra {
        match base.get_mut(&hit.id) {
            Some(existing) if existing.score >= hit.score => {}
            _ => {
                base.insert(hit.id.clone(), hit);
            }
        }
    }
}

pub async fn lexical_search(
    store: &MetadataStore,
    query: &str,
    options: &LexicalOptions,
) -> Result<Vec<SearchHit>> {
    let tokens = tokenize_query(query);
    if tokens.is_empty() {
        return Ok(Vec::new());
    }

    let filter = LexicalFilter {
        workspace: options.workspace.clone(),
        scopes: options.scopes.clone(),
        types: options.types.clone(),
        statuses: options.statuses.clone(),
    };
    let archived_requested = options.statuses.contains(&MemoryStatus::Archived);
    let limit = options.top_k as i64;

    let strict_expr = build_match_expr(&tokens, " AND ");
    let strict = store.fts_search(&strict_expr, &filter, limit).await?;
    debug!("Strict pass matched {} rows", strict.len());

    let mut merged: HashMap<String, SearchHit> = HashMap::new();

    if !strict.is_empty() {
        merge_hits(&mut merged, rows_to_hits(strict));
    } else if tokens.len() > 1 {
        let relaxed_expr = build_match_expr(&tokens, " OR ");
        let relaxed = store.fts_search(&relaxed_expr, &filter, limit).await?;
        debug!("Relaxed pass matched {} rows", relaxed.len());
        merge_hits(&mut merged, rows_to_hits(relaxed));
    }

    if archived_requested {
        let archived = store
            .archived_keyword_search(
                &tokens,
                &options.workspace,
                &options.scopes,
                &options.types,
                limit,
            )
            .await?;
        let hits: Vec<SearchHit> = archived
            .into_iter()
            .map(|row| SearchHit {
                id: row.id,
                title: row.title,
                score: ARCHIVED_SCORE,
                source: "lex".to_string(),
                snippet: row.snippet,
                scope: row.scope,
                item_type: row.item_type,
                status: row.status,
            })
            .collect();
        merge_hits(&mut merged, hits);
    }

    let mut results: Vec<SearchHit> = merged.into_values().collect();
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results.truncate(options.top_k);
    Ok(results)
}

fn rows_to_hits(rows: Vec<crate::storage::sqlite::LexicalRow>) -> Vec<SearchHit> {
    rows.into_iter()
        .map(|row| SearchHit {
            id: row.id,
            title: row.title,
            score: bm25_to_score(row.rank),
            source: "lex".to_string(),
            snippet: row.snippet,
            scope: row.scope,
            item_type: row.item_type,
            status: row.status,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_drops_punctuation_and_short_tokens() {
        assert_eq!(
            tokenize_query("Preference for oauth2/token (beta), user's-flow"),
            vec!["preference", "for", "oauth2", "token", "beta", "user", "flow"]
        );
    }

    #[test]
    fn test_tokenize_pure_punctuation_is_empty() {
        assert!(tokenize_query("/// --- !!!").is_empty());
        assert!(tokenize_query("").is_empty());
        assert!(tokenize_query("a ! b").is_empty());
    }

    #[test]
    fn test_tokenize_caps_token_count() {
        let query = (0..30).map(|i| format!("tok{}", i)).collect::<Vec<_>>().join(" ");
        assert_eq!(tokenize_query(&query).len(), MAX_TOKENS);
    }

    #[test]
    fn test_tokenize_keeps_underscores() {
        assert_eq!(tokenize_query("snake_case_name"), vec!["snake_case_name"]);
    }

    #[test]
    fn test_match_expr_quotes_tokens() {
        let tokens = vec!["alpha".to_string(), "beta".to_string()];
        assert_eq!(build_match_expr(&tokens, " AND "), "\"alpha\" AND \"beta\"");
        assert_eq!(build_match_expr(&tokens, " OR "), "\"alpha\" OR \"beta\"");
    }

    #[test]
    fn test_bm25_score_maps_into_unit_interval() {
        // FTS5 bm25() is negative; better matches have larger magnitude.
        let strong = bm25_to_score(-4.2);
        let weak = bm25_to_score(-0.3);
        assert!(strong < weak);
        assert!(strong > 0.0 && weak <= 1.0);
    }

    #[test]
    fn test_archived_score_sits_below_bm25_scores() {
        // Any bm25 magnitude below ~1.85 normalises above the archived
        // fallback score.
        assert!(bm25_to_score(-1.0) > ARCHIVED_SCORE);
    }
}
