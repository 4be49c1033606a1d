//! Memory tool implementations for the tool server
//!
//! Each tool validates its input against a declarative schema (unknown
//! fields rejected), dispatches into the engine, and maps engine errors to
//! the stable taxonomy codes. Verbose diagnostics summarise inputs by
//! length only and never echo query text.

use crate::config::RetrievalMode;
use crate::engine::{ListFilters, MemoryEngine, RecallOptions, SaveInput};
use crate::error::{Result, ZmemError};
use crate::types::{MemoryStatus, MemoryType, Scope};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Hard cap on `memory_query.limit`.
const QUERY_LIMIT_MAX: usize = 100;

/// Tool schema entry advertised by `tools/list`.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Dispatches tool calls into the engine.
pub struct ToolHandler {
    engine: Arc<MemoryEngine>,
    expose_reindex: bool,
}

fn invalid(e: serde_json::Error) -> ZmemError {
    ZmemError::Validation(format!("invalid arguments: {}", e))
}

fn parse_scopes(raw: &[String]) -> Result<Vec<Scope>> {
    raw.iter()
        .map(|s| {
            Scope::parse(s)
                .ok_or_else(|| ZmemError::Validation(format!("unknown scope: {}", s)))
        })
        .collect()
}

fn parse_types(raw: &[String]) -> Result<Vec<MemoryType>> {
    raw.iter()
        .map(|s| {
            MemoryType::parse(s)
                .ok_or_else(|| ZmemError::Validation(format!("unknown type: {}", s)))
        })
        .collect()
}

impl ToolHandler {
    pub fn new(engine: Arc<MemoryEngine>, expose_reindex: bool) -> Self {
        Self {
            engine,
            expose_reindex,
        }
    }

    pub fn list_tools(&self) -> Vec<Tool> {
        let mut tools = vec![
            Tool {
                name: "memory_query".to_string(),
                description:
                    "Search memories with hybrid (BM25 + vector) retrieval. Returns ranked results with snippets."
                        .to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "query": { "type": "string", "description": "Search query" },
                        "mode": {
                            "type": "string",
                            "enum": ["hybrid", "lexical", "vector"],
                            "description": "Retrieval mode (default hybrid)"
                        },
                        "limit": {
                            "type": "integer",
                            "minimum": 1,
                            "maximum": QUERY_LIMIT_MAX,
                            "description": "Maximum number of results"
                        },
                        "scopes": {
                            "type": "array",
                            "items": { "type": "string", "enum": ["global", "workspace", "user"] }
                        },
                        "types": {
                            "type": "array",
                            "items": { "type": "string", "enum": ["fact", "decision", "preference", "event", "goal", "todo"] }
                        },
                        "includeSuperseded": {
                            "type": "boolean",
                            "description": "Also return archived (superseded) memories"
                        }
                    },
                    "required": ["query"],
                    "additionalProperties": false
                }),
            },
            Tool {
                name: "memory_get".to_string(),
                description: "Fetch a single memory by id.".to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "id": { "type": "string", "minLength": 1 }
                    },
                    "required": ["id"],
                    "additionalProperties": false
                }),
            },
            Tool {
                name: "memory_list".to_string(),
                description: "List memories ordered by creation time, newest first.".to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "type": { "type": "string", "enum": ["fact", "decision", "preference", "event", "goal", "todo"] },
                        "scope": { "type": "string", "enum": ["global", "workspace", "user"] },
                        "status": { "type": "string", "enum": ["pending", "active", "archived", "deleted"] },
                        "limit": { "type": "integer", "minimum": 1 },
                        "offset": { "type": "integer", "minimum": 0 }
                    },
                    "additionalProperties": false
                }),
            },
            Tool {
                name: "memory_save".to_string(),
                description:
                    "Store a memory. Optionally supersede an existing active memory.".to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "type": { "type": "string", "enum": ["fact", "decision", "preference", "event", "goal", "todo"] },
                        "title": { "type": "string", "minLength": 1 },
                        "content": { "type": "string", "minLength": 1 },
                        "summary": { "type": "string" },
                        "source": { "type": "string" },
                        "scope": { "type": "string", "enum": ["global", "workspace", "user"] },
                        "tags": { "type": "array", "items": { "type": "string" } },
                        "importance": { "type": "number", "minimum": 0, "maximum": 1 },
                        "supersedesId": { "type": "string" }
                    },
                    "required": ["type", "title", "content"],
                    "additionalProperties": false
                }),
            },
            Tool {
                name: "memory_delete".to_string(),
                description: "Soft-delete a memory. Idempotent.".to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "id": { "type": "string", "minLength": 1 }
                    },
                    "required": ["id"],
                    "additionalProperties": false
                }),
            },
            Tool {
                name: "memory_status".to_string(),
                description: "Workspace counters: items, vectors, pending embeddings.".to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {},
                    "additionalProperties": false
                }),
            },
        ];

        if self.expose_reindex {
            tools.push(Tool {
                name: "memory_reindex".to_string(),
                description: "Rebuild chunks and vectors for every active memory.".to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {},
                    "additionalProperties": false
                }),
            });
        }

        tools
    }

    pub async fn execute(&self, tool_name: &str, params: Value) -> Result<Value> {
        debug!("Executing tool: {}", tool_name);

        match tool_name {
            "memory_query" => self.query(params).await,
            "memory_get" => self.get(params).await,
            "memory_list" => self.list(params).await,
            "memory_save" => self.save(params).await,
            "memory_delete" => self.delete(params).await,
            "memory_status" => self.status(params).await,
            "memory_reindex" if self.expose_reindex => self.reindex(params).await,
            _ => Err(ZmemError::Validation(format!(
                "unknown tool: {}",
                tool_name
            ))),
        }
    }

    async fn query(&self, params: Value) -> Result<Value> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase", deny_unknown_fields)]
        struct QueryParams {
            query: String,
            mode: Option<String>,
            limit: Option<usize>,
            #[serde(default)]
            scopes: Option<Vec<String>>,
            #[serde(default)]
            types: Option<Vec<String>>,
            include_superseded: Option<bool>,
        }

        let params: QueryParams = serde_json::from_value(params).map_err(invalid)?;

        if let Some(limit) = params.limit {
            if limit == 0 || limit > QUERY_LIMIT_MAX {
                return Err(ZmemError::Validation(format!(
                    "limit must be within [1, {}], got {}",
                    QUERY_LIMIT_MAX, limit
                )));
            }
        }
        let mode = match params.mode.as_deref() {
            Some(raw) => Some(RetrievalMode::parse(raw).ok_or_else(|| {
                ZmemError::Validation(format!("unknown mode: {}", raw))
            })?),
            None => None,
        };

        let options = RecallOptions {
            mode,
            scopes: params.scopes.as_deref().map(parse_scopes).transpose()?,
            types: params.types.as_deref().map(parse_types).transpose()?,
            top_k: params.limit,
            include_superseded: params.include_superseded,
        };

        let results = self.engine.recall(&params.query, options).await?;
        let count = results.len();
        Ok(serde_json::json!({
            "results": results,
            "count": count,
        }))
    }

    async fn get(&self, params: Value) -> Result<Value> {
        #[derive(Deserialize)]
        #[serde(deny_unknown_fields)]
        struct GetParams {
            id: String,
        }

        let params: GetParams = serde_json::from_value(params).map_err(invalid)?;
        let item = self.engine.get(&params.id).await?;
        Ok(serde_json::json!({ "item": item }))
    }

    async fn list(&self, params: Value) -> Result<Value> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase", deny_unknown_fields)]
        struct ListParams {
            #[serde(rename = "type")]
            item_type: Option<String>,
            scope: Option<String>,
            status: Option<String>,
            limit: Option<i64>,
            offset: Option<i64>,
        }

        let params: ListParams = serde_json::from_value(params).map_err(invalid)?;

        let filters = ListFilters {
            workspace: None,
            item_type: params
                .item_type
                .as_deref()
                .map(|s| {
                    MemoryType::parse(s)
                        .ok_or_else(|| ZmemError::Validation(format!("unknown type: {}", s)))
                })
                .transpose()?,
            scope: params
                .scope
                .as_deref()
                .map(|s| {
                    Scope::parse(s)
                        .ok_or_else(|| ZmemError::Validation(format!("unknown scope: {}", s)))
                })
                .transpose()?,
            status: params
                .status
                .as_deref()
                .map(|s| {
                    MemoryStatus::parse(s)
                        .ok_or_else(|| ZmemError::Validation(format!("unknown status: {}", s)))
                })
                .transpose()?,
            limit: params.limit.unwrap_or(20),
            offset: params.offset.unwrap_or(0),
        };

        let page = self.engine.list(filters).await?;
        Ok(serde_json::json!({
            "items": page.items,
            "total": page.total,
        }))
    }

    async fn save(&self, params: Value) -> Result<Value> {
        let input: SaveInput = serde_json::from_value(params).map_err(invalid)?;
        let outcome = self.engine.save(input).await?;
        Ok(serde_json::to_value(outcome)?)
    }

    async fn delete(&self, params: Value) -> Result<Value> {
        #[derive(Deserialize)]
        #[serde(deny_unknown_fields)]
        struct DeleteParams {
            id: String,
        }

        let params: DeleteParams = serde_json::from_value(params).map_err(invalid)?;
        let deleted = self.engine.delete(&params.id).await?;
        Ok(serde_json::json!({ "deleted": deleted }))
    }

    async fn status(&self, params: Value) -> Result<Value> {
        reject_arguments(params)?;
        let status = self.engine.status().await?;
        Ok(serde_json::to_value(status)?)
    }

    async fn reindex(&self, params: Value) -> Result<Value> {
        reject_arguments(params)?;
        let report = self.engine.reindex().await?;
        Ok(serde_json::json!({
            "processed": report.processed,
            "errors": report.errors,
            "durationMs": report.duration_ms,
        }))
    }
}

fn reject_arguments(params: Value) -> Result<()> {
    match params {
        Value::Null => Ok(()),
        Value::Object(map) if map.is_empty() => Ok(()),
        _ => Err(ZmemError::Validation(
            "tool takes no arguments".to_string(),
        )),
    }
}

/// Length-only summary of a tool call for verbose stderr diagnostics.
/// Never includes query or content text.
pub fn describe_call(tool_name: &str, params: &Value) -> String {
    let mut parts = vec![format!("tool={}", tool_name)];
    if let Some(map) = params.as_object() {
        if let Some(query) = map.get("query").and_then(|v| v.as_str()) {
            parts.push(format!("queryLen={}", query.chars().count()));
        }
        if let Some(content) = map.get("content").and_then(|v| v.as_str()) {
            parts.push(format!("contentLen={}", content.chars().count()));
        }
        if let Some(title) = map.get("title").and_then(|v| v.as_str()) {
            parts.push(format!("titleLen={}", title.chars().count()));
        }
        if let Some(limit) = map.get("limit").and_then(|v| v.as_i64()) {
            parts.push(format!("limit={}", limit));
        }
        if let Some(mode) = map.get("mode").and_then(|v| v.as_str()) {
            parts.push(format!("mode={}", mode));
        }
    }
    parts.join(" ")
}
