//! Core data types for the zmem memory engine
//!
//! This module defines the durable data model (memory items and content
//! chunks), the retrieval result types, and the run reports produced by the
//! ingestion and maintenance operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Classification of a memory item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    /// A statement of fact about the codebase or its environment
    Fact,

    /// A decision and its outcome
    Decision,

    /// A user or team preference
    Preference,

    /// Something that happened at a point in time
    Event,

    /// A goal being worked towards
    Goal,

    /// An action item
    Todo,
}

impl MemoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Fact => "fact",
            MemoryType::Decision => "decision",
            MemoryType::Preference => "preference",
            MemoryType::Event => "event",
            MemoryType::Goal => "goal",
            MemoryType::Todo => "todo",
        }
    }

    /// Parse a type string, returning `None` for unknown values.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fact" => Some(MemoryType::Fact),
            "decision" => Some(MemoryType::Decision),
            "preference" => Some(MemoryType::Preference),
            "event" => Some(MemoryType::Event),
            "goal" => Some(MemoryType::Goal),
            "todo" => Some(MemoryType::Todo),
            _ => None,
        }
    }

    /// Parse a type string from an untrusted document, defaulting unknown
    /// values to `fact`.
    pub fn parse_lossy(s: &str) -> Self {
        Self::parse(s).unwrap_or(MemoryType::Fact)
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Retrieval-filter tag carried on each item
///
/// Scopes are orthogonal to workspaces: workspaces isolate rows, scopes
/// classify rows within a workspace for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Global,
    Workspace,
    User,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Global => "global",
            Scope::Workspace => "workspace",
            Scope::User => "user",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "global" => Some(Scope::Global),
            "workspace" => Some(Scope::Workspace),
            "user" => Some(Scope::User),
            _ => None,
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle state of a memory item
///
/// Transitions: `Pending` → `Active` (save finalisation), `Active` →
/// `Archived` (superseded), any → `Deleted` (soft delete, terminal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryStatus {
    Pending,
    Active,
    Archived,
    Deleted,
}

impl MemoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryStatus::Pending => "pending",
            MemoryStatus::Active => "active",
            MemoryStatus::Archived => "archived",
            MemoryStatus::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(MemoryStatus::Pending),
            "active" => Some(MemoryStatus::Active),
            "archived" => Some(MemoryStatus::Archived),
            "deleted" => Some(MemoryStatus::Deleted),
            _ => None,
        }
    }
}

impl std::fmt::Display for MemoryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A durable unit of memory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryItem {
    /// Opaque collision-resistant identifier, unique within a workspace
    pub id: String,

    /// Classification
    #[serde(rename = "type")]
    pub item_type: MemoryType,

    /// Short human-readable title (non-empty)
    pub title: String,

    /// Full content (non-empty)
    pub content: String,

    /// Optional condensed form of the content
    pub summary: String,

    /// Origin: relative file path for ingested documents, or a tool label
    pub source: String,

    /// Retrieval-filter tag
    pub scope: Scope,

    /// Isolation unit this item belongs to
    pub workspace: String,

    /// Ordered tags
    pub tags: Vec<String>,

    /// Importance in [0, 1]
    pub importance: f64,

    /// Lifecycle state
    pub status: MemoryStatus,

    /// Item this one replaced, if any (same workspace)
    pub supersedes_id: Option<String>,

    /// SHA-256 over the raw source bytes; re-ingestion idempotency key
    pub content_hash: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A contiguous sub-span of an item's content; the unit of embedding
#[derive(Debug, Clone)]
pub struct ContentChunk {
    /// Deterministic id: `"<memory_id>_<seq>"`
    pub id: String,

    /// Owning item
    pub memory_id: String,

    /// Dense 0-based position in the item's chunk sequence
    pub seq: i64,

    /// Character offset of the chunk within the item's content
    pub pos: i64,

    /// Token count of the chunk text
    pub token_count: i64,

    /// The chunk text
    pub text: String,
}

/// A single retrieval result
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    /// Memory item id
    pub id: String,

    pub title: String,

    /// Relevance score; `(0, 1]` after fusion normalisation
    pub score: f64,

    /// Producing pathway: `"lex"`, `"vec"`, or `"hybrid"`
    pub source: String,

    /// Short excerpt around the best match
    pub snippet: String,

    pub scope: Scope,

    #[serde(rename = "type")]
    pub item_type: MemoryType,

    #[serde(skip_serializing)]
    pub status: MemoryStatus,
}

/// Outcome of a `save` call
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveOutcome {
    pub id: String,
    pub is_new: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub superseded_id: Option<String>,
}

/// Summary of an ingestion run
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub scanned: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub removed: usize,
    pub chunks_created: usize,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

/// Summary of a reindex run
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReindexReport {
    pub processed: usize,
    pub errors: usize,
    pub duration_ms: u64,
}

/// Point-in-time counts for a workspace
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceStatus {
    pub total_items: i64,
    pub total_vectors: i64,
    pub pending_embeddings: i64,
    pub last_indexed_at: Option<DateTime<Utc>>,
}

/// Create a fresh memory item id.
pub fn new_memory_id() -> String {
    Uuid::new_v4().to_string()
}

/// Deterministic chunk id for a `(memory_id, seq)` pair.
pub fn chunk_id(memory_id: &str, seq: i64) -> String {
    format!("{}_{}", memory_id, seq)
}

/// Recover the owning memory id from a chunk id by stripping the trailing
/// `_<digits>` suffix. Ids without the suffix are returned unchanged.
pub fn memory_id_of_chunk(chunk_id: &str) -> &str {
    match chunk_id.rfind('_') {
        Some(idx)
            if !chunk_id[idx + 1..].is_empty()
                && chunk_id[idx + 1..].bytes().all(|b| b.is_ascii_digit()) =>
        {
            &chunk_id[..idx]
        }
        _ => chunk_id,
    }
}

/// SHA-256 hex digest of raw document bytes.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_parse_lossy_defaults_to_fact() {
        assert_eq!(MemoryType::parse_lossy("decision"), MemoryType::Decision);
        assert_eq!(MemoryType::parse_lossy("nonsense"), MemoryType::Fact);
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            MemoryStatus::Pending,
            MemoryStatus::Active,
            MemoryStatus::Archived,
            MemoryStatus::Deleted,
        ] {
            assert_eq!(MemoryStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(MemoryStatus::parse("zombie"), None);
    }

    #[test]
    fn test_chunk_id_round_trip() {
        let mem_id = new_memory_id();
        let cid = chunk_id(&mem_id, 3);
        assert_eq!(memory_id_of_chunk(&cid), mem_id);
    }

    #[test]
    fn test_memory_id_of_chunk_without_suffix() {
        assert_eq!(memory_id_of_chunk("plain-id"), "plain-id");
        assert_eq!(memory_id_of_chunk("trailing_"), "trailing_");
        assert_eq!(memory_id_of_chunk("mixed_1a"), "mixed_1a");
    }

    #[test]
    fn test_content_hash_is_stable() {
        let a = content_hash(b"hello");
        let b = content_hash(b"hello");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, content_hash(b"hello!"));
    }
}
