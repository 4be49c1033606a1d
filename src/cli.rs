//! Command-line surface
//!
//! Human-facing output goes to stdout; logs stay on stderr. Every command
//! builds an engine for the resolved workspace, runs, and shuts the engine
//! down.

use crate::config::{mcp_verbose, reindex_tool_enabled, ZmemConfig};
use crate::engine::{ListFilters, MemoryEngine, RecallOptions, SaveInput};
use crate::error::{Result, ZmemError};
use crate::ingest::IngestOptions;
use crate::mcp::{McpServer, ToolHandler};
use crate::types::{MemoryStatus, MemoryType, Scope};
use clap::Subcommand;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the MCP tool server on stdio
    Serve,

    /// Ingest documents from a workspace root
    Ingest {
        /// Root directory; defaults to the configured workspace root
        #[arg(long)]
        root: Option<PathBuf>,

        /// Include globs (repeatable); defaults to the workspace patterns
        #[arg(long = "pattern")]
        patterns: Vec<String>,

        /// Exclude globs (repeatable)
        #[arg(long = "exclude")]
        excludes: Vec<String>,
    },

    /// Store a memory
    Save {
        #[arg(long, default_value = "fact")]
        r#type: String,

        #[arg(long)]
        title: String,

        /// Content; reads stdin when omitted
        #[arg(long)]
        content: Option<String>,

        #[arg(long)]
        scope: Option<String>,

        #[arg(long = "tag")]
        tags: Vec<String>,

        #[arg(long)]
        importance: Option<f64>,

        #[arg(long)]
        supersedes: Option<String>,
    },

    /// Search memories
    Recall {
        query: String,

        /// hybrid, lexical, or vector
        #[arg(long)]
        mode: Option<String>,

        #[arg(long)]
        limit: Option<usize>,

        /// Include archived (superseded) memories
        #[arg(long)]
        include_superseded: bool,
    },

    /// Fetch one memory by id
    Get { id: String },

    /// List memories, newest first
    List {
        #[arg(long)]
        r#type: Option<String>,

        #[arg(long)]
        scope: Option<String>,

        #[arg(long)]
        status: Option<String>,

        #[arg(long, default_value_t = 20)]
        limit: i64,

        #[arg(long, default_value_t = 0)]
        offset: i64,
    },

    /// Soft-delete a memory
    Delete { id: String },

    /// Rebuild chunks and vectors for every active memory
    Reindex,

    /// Show workspace counters
    Status,
}

pub async fn run(command: Command, config: ZmemConfig, workspace: String) -> Result<()> {
    let engine = Arc::new(MemoryEngine::new(config.clone(), workspace).await?);
    let result = dispatch(command, &config, engine.clone()).await;
    engine.shutdown().await;
    result
}

async fn dispatch(command: Command, config: &ZmemConfig, engine: Arc<MemoryEngine>) -> Result<()> {
    match command {
        Command::Serve => {
            let handler = ToolHandler::new(engine.clone(), reindex_tool_enabled());
            McpServer::new(handler, mcp_verbose()).run().await
        }

        Command::Ingest {
            root,
            patterns,
            excludes,
        } => {
            let workspace = engine.workspace().to_string();
            let entry = config.workspace(&workspace);
            let root = root
                .or_else(|| entry.map(|w| w.root.clone()))
                .ok_or_else(|| {
                    ZmemError::Validation(format!(
                        "no root given and workspace {} is not configured",
                        workspace
                    ))
                })?;
            let patterns = if patterns.is_empty() {
                entry.map(|w| w.patterns.clone()).unwrap_or_default()
            } else {
                patterns
            };

            let report = engine
                .ingest(&IngestOptions {
                    workspace,
                    root,
                    patterns,
                    excludes,
                })
                .await?;

            println!(
                "scanned {}  inserted {}  updated {}  unchanged {}  removed {}  chunks {}  ({} ms)",
                report.scanned,
                report.inserted,
                report.updated,
                report.unchanged,
                report.removed,
                report.chunks_created,
                report.duration_ms
            );
            for error in &report.errors {
                println!("error: {}", error);
            }
            Ok(())
        }

        Command::Save {
            r#type,
            title,
            content,
            scope,
            tags,
            importance,
            supersedes,
        } => {
            let content = match content {
                Some(content) => content,
                None => {
                    use std::io::Read;
                    let mut buffer = String::new();
                    std::io::stdin().read_to_string(&mut buffer)?;
                    buffer
                }
            };

            let input = SaveInput {
                item_type: MemoryType::parse(&r#type)
                    .ok_or_else(|| ZmemError::Validation(format!("unknown type: {}", r#type)))?,
                title,
                content,
                summary: None,
                source: None,
                scope: scope
                    .as_deref()
                    .map(|s| {
                        Scope::parse(s).ok_or_else(|| {
                            ZmemError::Validation(format!("unknown scope: {}", s))
                        })
                    })
                    .transpose()?,
                tags,
                importance,
                supersedes_id: supersedes,
            };

            let outcome = engine.save(input).await?;
            println!("{}", outcome.id);
            if let Some(old) = outcome.superseded_id {
                println!("superseded {}", old);
            }
            Ok(())
        }

        Command::Recall {
            query,
            mode,
            limit,
            include_superseded,
        } => {
            let mode = mode
                .as_deref()
                .map(|raw| {
                    crate::config::RetrievalMode::parse(raw)
                        .ok_or_else(|| ZmemError::Validation(format!("unknown mode: {}", raw)))
                })
                .transpose()?;

            let hits = engine
                .recall(
                    &query,
                    RecallOptions {
                        mode,
                        top_k: limit,
                        include_superseded: include_superseded.then_some(true),
                        ..RecallOptions::default()
                    },
                )
                .await?;

            if hits.is_empty() {
                println!("No results.");
                return Ok(());
            }
            for (i, hit) in hits.iter().enumerate() {
                println!(
                    "{}. [{:.2}] ({}) {} ({})",
                    i + 1,
                    hit.score,
                    hit.source,
                    hit.title,
                    hit.id
                );
                println!("   {}", hit.snippet.replace('\n', " "));
            }
            Ok(())
        }

        Command::Get { id } => {
            match engine.get(&id).await? {
                Some(item) => println!("{}", serde_json::to_string_pretty(&item)?),
                None => println!("Not found."),
            }
            Ok(())
        }

        Command::List {
            r#type,
            scope,
            status,
            limit,
            offset,
        } => {
            let page = engine
                .list(ListFilters {
                    workspace: None,
                    item_type: r#type
                        .as_deref()
                        .map(|s| {
                            MemoryType::parse(s).ok_or_else(|| {
                                ZmemError::Validation(format!("unknown type: {}", s))
                            })
                        })
                        .transpose()?,
                    scope: scope
                        .as_deref()
                        .map(|s| {
                            Scope::parse(s).ok_or_else(|| {
                                ZmemError::Validation(format!("unknown scope: {}", s))
                            })
                        })
                        .transpose()?,
                    status: status
                        .as_deref()
                        .map(|s| {
                            MemoryStatus::parse(s).ok_or_else(|| {
                                ZmemError::Validation(format!("unknown status: {}", s))
                            })
                        })
                        .transpose()?,
                    limit,
                    offset,
                })
                .await?;

            for item in &page.items {
                println!(
                    "{}  [{}] {} ({}, {})",
                    item.id, item.item_type, item.title, item.scope, item.status
                );
            }
            println!("{} of {} item(s)", page.items.len(), page.total);
            Ok(())
        }

        Command::Delete { id } => {
            let deleted = engine.delete(&id).await?;
            println!("{}", if deleted { "deleted" } else { "not found" });
            Ok(())
        }

        Command::Reindex => {
            let report = engine.reindex().await?;
            println!(
                "processed {}  errors {}  ({} ms)",
                report.processed, report.errors, report.duration_ms
            );
            Ok(())
        }

        Command::Status => {
            let status = engine.status().await?;
            println!("items:              {}", status.total_items);
            println!("vectors:            {}", status.total_vectors);
            println!("pending embeddings: {}", status.pending_embeddings);
            match status.last_indexed_at {
                Some(ts) => println!("last indexed:       {}", ts.to_rfc3339()),
                None => println!("last indexed:       never"),
            }
            Ok(())
        }
    }
}
