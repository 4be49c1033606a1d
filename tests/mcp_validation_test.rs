//! Tool-server contract tests: schema validation, limit caps, unknown-field
//! rejection, reindex gating, and length-only diagnostics.

mod common;

use common::{save_input, TestContext};
use std::sync::Arc;
use zmem_core::error::ZmemError;
use zmem_core::mcp::{describe_call, ToolHandler};

async fn handler(expose_reindex: bool) -> (ToolHandler, TestContext) {
    let ctx = TestContext::new().await;
    let engine = Arc::new(ctx.engine("w1"));
    (ToolHandler::new(engine, expose_reindex), ctx)
}

fn assert_validation(result: zmem_core::Result<serde_json::Value>) {
    match result {
        Err(e) => assert_eq!(e.code(), "VALIDATION", "unexpected error: {}", e),
        Ok(v) => panic!("expected VALIDATION error, got: {}", v),
    }
}

#[tokio::test]
async fn test_query_limit_cap() {
    let (handler, _ctx) = handler(false).await;

    let result = handler
        .execute(
            "memory_query",
            serde_json::json!({ "query": "anything", "limit": 101 }),
        )
        .await;
    assert_validation(result);

    let result = handler
        .execute(
            "memory_query",
            serde_json::json!({ "query": "anything", "limit": 0 }),
        )
        .await;
    assert_validation(result);

    let result = handler
        .execute(
            "memory_query",
            serde_json::json!({ "query": "anything", "limit": 100 }),
        )
        .await
        .unwrap();
    assert_eq!(result["count"], 0);
}

#[tokio::test]
async fn test_query_rejects_unknown_fields_and_modes() {
    let (handler, _ctx) = handler(false).await;

    let result = handler
        .execute(
            "memory_query",
            serde_json::json!({ "query": "x", "surprise": true }),
        )
        .await;
    assert_validation(result);

    let result = handler
        .execute(
            "memory_query",
            serde_json::json!({ "query": "x", "mode": "psychic" }),
        )
        .await;
    assert_validation(result);

    let result = handler
        .execute(
            "memory_query",
            serde_json::json!({ "query": "x", "scopes": ["galaxy"] }),
        )
        .await;
    assert_validation(result);
}

#[tokio::test]
async fn test_get_requires_non_empty_id() {
    let (handler, _ctx) = handler(false).await;

    let result = handler
        .execute("memory_get", serde_json::json!({ "id": "" }))
        .await;
    assert_validation(result);

    let result = handler.execute("memory_get", serde_json::json!({})).await;
    assert_validation(result);
}

#[tokio::test]
async fn test_save_requires_title() {
    let (handler, _ctx) = handler(false).await;

    let result = handler
        .execute(
            "memory_save",
            serde_json::json!({ "type": "fact", "content": "Body." }),
        )
        .await;
    assert_validation(result);

    let result = handler
        .execute(
            "memory_save",
            serde_json::json!({
                "type": "fact",
                "title": "T",
                "content": "Body.",
                "unknownField": 1
            }),
        )
        .await;
    assert_validation(result);
}

#[tokio::test]
async fn test_save_and_query_through_tools() {
    let (handler, _ctx) = handler(false).await;

    let saved = handler
        .execute(
            "memory_save",
            serde_json::json!({
                "type": "fact",
                "title": "Tooling note",
                "content": "The TOOLTOKEN goes through the tool surface."
            }),
        )
        .await
        .unwrap();
    let id = saved["id"].as_str().unwrap().to_string();
    assert_eq!(saved["isNew"], true);

    let result = handler
        .execute("memory_query", serde_json::json!({ "query": "TOOLTOKEN" }))
        .await
        .unwrap();
    assert!(result["count"].as_u64().unwrap() >= 1);
    assert_eq!(result["results"][0]["id"], id.as_str());

    let fetched = handler
        .execute("memory_get", serde_json::json!({ "id": id }))
        .await
        .unwrap();
    assert_eq!(fetched["item"]["id"], id.as_str());

    let deleted = handler
        .execute("memory_delete", serde_json::json!({ "id": id }))
        .await
        .unwrap();
    assert_eq!(deleted["deleted"], true);

    let deleted = handler
        .execute("memory_delete", serde_json::json!({ "id": id }))
        .await
        .unwrap();
    assert_eq!(deleted["deleted"], false);
}

#[tokio::test]
async fn test_reindex_tool_is_gated() {
    let (without, _ctx) = handler(false).await;
    assert!(!without
        .list_tools()
        .iter()
        .any(|t| t.name == "memory_reindex"));
    let result = without
        .execute("memory_reindex", serde_json::json!({}))
        .await;
    assert_validation(result);

    let (with, _ctx2) = handler(true).await;
    assert!(with.list_tools().iter().any(|t| t.name == "memory_reindex"));
    let result = with
        .execute("memory_reindex", serde_json::json!({}))
        .await
        .unwrap();
    assert_eq!(result["processed"], 0);
    assert_eq!(result["errors"], 0);
}

#[tokio::test]
async fn test_status_tool_reports_counters() {
    let (handler, ctx) = handler(false).await;
    let engine = ctx.engine("w1");
    engine
        .save(save_input(serde_json::json!({
            "type": "fact",
            "title": "Counted",
            "content": "Counted body."
        })))
        .await
        .unwrap();

    let status = handler
        .execute("memory_status", serde_json::json!({}))
        .await
        .unwrap();
    assert_eq!(status["totalItems"], 1);
    assert_eq!(status["totalVectors"], 1);
    assert_eq!(status["pendingEmbeddings"], 0);
}

#[tokio::test]
async fn test_unknown_tool_is_rejected() {
    let (handler, _ctx) = handler(false).await;
    let result = handler
        .execute("memory_explode", serde_json::json!({}))
        .await;
    assert!(matches!(result, Err(ZmemError::Validation(_))));
}

#[test]
fn test_verbose_diagnostics_never_echo_queries() {
    let params = serde_json::json!({
        "query": "company acquisition plans",
        "limit": 5
    });
    let line = describe_call("memory_query", &params);
    assert!(line.contains("queryLen=25"));
    assert!(line.contains("limit=5"));
    assert!(!line.contains("acquisition"));

    let params = serde_json::json!({
        "type": "fact",
        "title": "secret title",
        "content": "secret content"
    });
    let line = describe_call("memory_save", &params);
    assert!(line.contains("titleLen=12"));
    assert!(line.contains("contentLen=14"));
    assert!(!line.contains("secret"));
}
