//! Tool server with stdio transport
//!
//! JSON-RPC 2.0 over stdin/stdout: one request per line, one response per
//! line, notifications get none. Routing produces a `Result<Value,
//! JsonRpcError>` and the response envelope is built in exactly one place.
//! All logging goes to stderr so stdout stays a clean protocol stream;
//! verbose diagnostics (enabled by environment flag) describe calls by
//! input lengths only.

use super::protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use super::tools::{describe_call, ToolHandler};
use crate::error::Result;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info};

/// Arguments of a `tools/call` request.
#[derive(Debug, Deserialize)]
struct ToolCall {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// Stdio JSON-RPC server fronting the memory tools.
pub struct McpServer {
    tools: ToolHandler,
    verbose: bool,
}

impl McpServer {
    pub fn new(tools: ToolHandler, verbose: bool) -> Self {
        Self { tools, verbose }
    }

    /// Serve until stdin reaches EOF.
    pub async fn run(&self) -> Result<()> {
        info!("Tool server listening on stdin");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = tokio::io::stdout();

        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let Some(reply) = self.handle_line(line).await else {
                continue;
            };

            let mut payload = serde_json::to_vec(&reply).unwrap_or_else(|e| {
                let fallback = JsonRpcResponse::error(
                    None,
                    JsonRpcError::internal_error(format!("serialization error: {}", e)),
                );
                serde_json::to_vec(&fallback).expect("error response serializes")
            });
            payload.push(b'\n');
            stdout.write_all(&payload).await?;
            stdout.flush().await?;
        }

        info!("Tool server shutting down");
        Ok(())
    }

    /// Handle one request line. `None` means no response goes out
    /// (notifications).
    async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                return Some(JsonRpcResponse::error(
                    None,
                    JsonRpcError::parse_error(format!("invalid JSON: {}", e)),
                ));
            }
        };

        if request.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::error(
                request.id,
                JsonRpcError::invalid_request("jsonrpc must be \"2.0\""),
            ));
        }

        if request.is_notification() {
            debug!("Ignoring notification: {}", request.method);
            return None;
        }

        let id = request.id;
        Some(match self.route(&request.method, request.params).await {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::error(id, error),
        })
    }

    async fn route(
        &self,
        method: &str,
        params: Value,
    ) -> std::result::Result<Value, JsonRpcError> {
        match method {
            "initialize" => Ok(json!({
                "protocolVersion": "2024-11-05",
                "serverInfo": {
                    "name": "zmem",
                    "version": env!("CARGO_PKG_VERSION")
                },
                "capabilities": { "tools": {} }
            })),
            "tools/list" => Ok(json!({ "tools": self.tools.list_tools() })),
            "tools/call" => self.call_tool(params).await,
            other => Err(JsonRpcError::method_not_found(other)),
        }
    }

    async fn call_tool(&self, params: Value) -> std::result::Result<Value, JsonRpcError> {
        let call: ToolCall = serde_json::from_value(params)
            .map_err(|e| JsonRpcError::invalid_params(format!("bad tool call: {}", e)))?;

        // Omitted arguments mean "no arguments", not a schema violation.
        let arguments = match call.arguments {
            Value::Null => Value::Object(serde_json::Map::new()),
            other => other,
        };

        if self.verbose {
            eprintln!("[zmem] {}", describe_call(&call.name, &arguments));
        }

        let result = self
            .tools
            .execute(&call.name, arguments)
            .await
            .map_err(|e| JsonRpcError::tool_error(e.to_string(), e.code()))?;

        let text =
            serde_json::to_string_pretty(&result).unwrap_or_else(|_| result.to_string());
        Ok(json!({ "content": [{ "type": "text", "text": text }] }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_call_params_default_arguments() {
        let call: ToolCall =
            serde_json::from_value(json!({ "name": "memory_status" })).unwrap();
        assert_eq!(call.name, "memory_status");
        assert!(call.arguments.is_null());

        let call: ToolCall = serde_json::from_value(json!({
            "name": "memory_query",
            "arguments": { "query": "x" }
        }))
        .unwrap();
        assert_eq!(call.arguments["query"], "x");

        assert!(serde_json::from_value::<ToolCall>(json!({ "arguments": {} })).is_err());
    }
}
