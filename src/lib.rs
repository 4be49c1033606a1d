//! zmem - Local-First Hybrid Memory Engine
//!
//! A single-process memory engine for engineering workflows: ingests
//! markdown/text documents, indexes them for lexical (BM25) and dense-vector
//! retrieval, and answers hybrid queries ranked by reciprocal-rank fusion.
//! The same core serves the interactive CLI and the MCP stdio tool server
//! used by coding agents.
//!
//! # Architecture
//!
//! - **Types**: the durable data model (items, chunks) and result shapes
//! - **Storage**: the relational metadata store (SQLite, FTS5) and the
//!   per-workspace vector collections (sqlite-vec)
//! - **Embeddings**: the HTTP embedding provider behind a trait seam
//! - **Ingest**: discovery, frontmatter parsing, token-aware chunking
//! - **Search**: lexical and vector retrieval plus RRF fusion
//! - **Engine**: lifecycle state machine and the dual-store save protocol
//! - **MCP**: JSON-RPC 2.0 tool server over stdio
//!
//! # Example
//!
//! ```ignore
//! use zmem_core::{MemoryEngine, SaveInput, ZmemConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ZmemConfig::load(None)?;
//!     let engine = MemoryEngine::new(config, "default".to_string()).await?;
//!
//!     let outcome = engine.save(serde_json::from_value(serde_json::json!({
//!         "type": "decision",
//!         "title": "Use WAL mode",
//!         "content": "We enable WAL for concurrent readers."
//!     }))?).await?;
//!
//!     let hits = engine.recall("WAL", Default::default()).await?;
//!     println!("{} hits, first: {}", hits.len(), outcome.id);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod embeddings;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod mcp;
pub mod search;
pub mod storage;
pub mod types;

pub use config::{RetrievalMode, ZmemConfig};
pub use engine::{ListFilters, ListPage, MemoryEngine, RecallOptions, SaveInput};
pub use error::{Result, ZmemError};
pub use mcp::{McpServer, ToolHandler};
pub use types::{
    IngestReport, MemoryItem, MemoryStatus, MemoryType, ReindexReport, SaveOutcome, Scope,
    SearchHit, WorkspaceStatus,
};
