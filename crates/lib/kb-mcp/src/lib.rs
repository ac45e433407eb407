//! MCP server implementation for kb-mcp.
//!
//! This crate exposes the knowledge-base bridge as rmcp tool handlers. Every
//! call is validated against the bridge's tool catalog before the KB CLI is
//! launched.

mod helpers;
mod tools;
pub mod server;

use std::borrow::Cow;
use std::sync::Arc;

use kb_core::bridge::KbBridge;
use kb_core::tools::Invocation;
use rmcp::{
    ErrorData,
    ServerHandler,
    handler::server::tool::ToolRouter,
    tool_handler,
};
use rmcp::model::{CallToolResult, Content, JsonObject, ServerCapabilities, ServerInfo};
use serde_json::Value;
use tracing::{debug, warn};

const SERVER_INSTRUCTIONS: &str = r"kb-mcp exposes a local knowledge base (RAG) through three tools.

Tools:
- `kb_search`: semantic search. `query` is required, `top_k` (1-20) defaults to 5.
  Returns the knowledge-base JSON document with matching snippets and their sources.
- `kb_add_note`: append `text` to the notes file. Set `ingest: true` to index it right away.
- `kb_ingest`: incremental ingest of new or changed files. Set `rebuild: true` to rebuild
  the index from scratch; this can take up to 15 minutes.

Notes:
- Results are forwarded verbatim from the knowledge-base CLI.
- Failures include the attempted command, the CLI's stderr, and common fixes.";

/// MCP server wrapper around the knowledge-base bridge.
#[derive(Clone)]
pub struct KbMcp {
    tool_router: ToolRouter<Self>,
    bridge: Arc<KbBridge>,
}

impl KbMcp {
    /// Creates a new server owning `bridge`.
    #[must_use]
    pub fn new(bridge: KbBridge) -> Self {
        Self::with_bridge(Arc::new(bridge))
    }

    /// Creates a new server using a shared bridge handle.
    ///
    /// Every routed tool advertises the description and input schema of the
    /// matching catalog entry, so clients see exactly what the bridge enforces.
    #[must_use]
    pub fn with_bridge(bridge: Arc<KbBridge>) -> Self {
        let mut tool_router = Self::tool_router_kb();
        for route in tool_router.map.values_mut() {
            let Some(entry) = bridge.catalog().get(&route.attr.name) else {
                warn!(tool = %route.attr.name, "routed tool missing from kb catalog");
                continue;
            };
            route.attr.description = Some(Cow::Borrowed(entry.spec.description));
            if let Value::Object(schema) = entry.spec.input_schema() {
                route.attr.input_schema = Arc::new(schema);
            }
        }
        Self {
            tool_router,
            bridge,
        }
    }

    /// Runs one tool call through the bridge.
    ///
    /// `arguments` is forwarded untouched; the bridge catalog is the only
    /// validator.
    pub(crate) async fn dispatch(
        &self,
        tool: &str,
        arguments: JsonObject,
    ) -> Result<CallToolResult, ErrorData> {
        debug!(tool, "kb tool call");
        let text = self
            .bridge
            .call(Invocation::new(tool, arguments))
            .await
            .map_err(helpers::map_err)?;
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }
}

#[tool_handler]
impl ServerHandler for KbMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(SERVER_INSTRUCTIONS.to_string()),
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use kb_core::config::KbConfig;
    use kb_core::tools::{KB_INGEST, KB_SEARCH};
    use rmcp::model::ErrorCode;
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    fn script_server(dir: &TempDir, body: &str) -> KbMcp {
        let path = dir.path().join("kb_cli.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write test script");
        KbMcp::new(KbBridge::new(KbConfig::new("sh", path)))
    }

    fn unreachable_server() -> KbMcp {
        KbMcp::new(KbBridge::new(KbConfig::new(
            "/nonexistent/python",
            PathBuf::from("/nonexistent/kb_cli.py"),
        )))
    }

    fn object(value: Value) -> JsonObject {
        match value {
            Value::Object(map) => map,
            other => panic!("expected an object, got {other}"),
        }
    }

    fn text_of(result: &CallToolResult) -> String {
        result
            .content
            .iter()
            .filter_map(|content| content.as_text())
            .map(|text| text.text.clone())
            .collect()
    }

    #[test]
    fn router_matches_bridge_catalog() {
        let server = KbMcp::new(KbBridge::new(KbConfig::for_root("/srv/kb")));
        let mut routed: Vec<String> = server
            .tool_router
            .list_all()
            .into_iter()
            .map(|tool| tool.name.to_string())
            .collect();
        routed.sort();

        let mut registered: Vec<String> = server
            .bridge
            .catalog()
            .names()
            .into_iter()
            .map(str::to_string)
            .collect();
        registered.sort();

        assert_eq!(routed, registered);
    }

    #[test]
    fn advertised_tools_use_catalog_descriptions_and_schemas() {
        let server = KbMcp::new(KbBridge::new(KbConfig::for_root("/srv/kb")));

        for tool in server.tool_router.list_all() {
            let entry = server
                .bridge
                .catalog()
                .get(&tool.name)
                .expect("routed tool is registered");
            assert_eq!(tool.description.as_deref(), Some(entry.spec.description));
            assert_eq!(
                Value::Object(tool.input_schema.as_ref().clone()),
                entry.spec.input_schema()
            );
            assert_eq!(tool.input_schema.get("additionalProperties"), Some(&json!(false)));
            assert!(
                !Value::Object(tool.input_schema.as_ref().clone())
                    .to_string()
                    .contains("nullable"),
                "{} schema admits null",
                tool.name
            );
        }
    }

    #[tokio::test]
    async fn search_returns_single_text_block() {
        let dir = TempDir::new().expect("tempdir");
        let server = script_server(&dir, r#"printf '  {"args": "%s"}\n' "$*""#);

        let result = server
            .dispatch(KB_SEARCH, object(json!({ "query": "foo" })))
            .await
            .expect("search should succeed");

        assert_eq!(result.content.len(), 1);
        assert_eq!(
            text_of(&result),
            r#"{"args": "search --query foo --top-k 5 --json"}"#
        );
    }

    #[tokio::test]
    async fn cli_failure_is_internal_error_with_diagnostic() {
        let dir = TempDir::new().expect("tempdir");
        let server = script_server(&dir, "echo 'index missing' >&2\nexit 1");

        let err = server
            .dispatch(KB_INGEST, object(json!({ "rebuild": true })))
            .await
            .expect_err("ingest should fail");

        assert_eq!(err.code, ErrorCode::INTERNAL_ERROR);
        assert!(err.message.contains("rebuild --json"));
        assert!(err.message.contains("index missing"));
    }

    #[tokio::test]
    async fn out_of_range_top_k_is_invalid_params() {
        let err = unreachable_server()
            .dispatch(KB_SEARCH, object(json!({ "query": "foo", "top_k": 50 })))
            .await
            .expect_err("top_k 50 should be rejected");

        assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
        assert!(err.message.contains("top_k"));
    }

    #[tokio::test]
    async fn null_arguments_are_invalid_params() {
        let server = unreachable_server();

        let cases = [
            (KB_SEARCH, json!({ "query": "foo", "top_k": null })),
            (KB_SEARCH, json!({ "query": null })),
            (KB_INGEST, json!({ "rebuild": null })),
        ];
        for (tool, arguments) in cases {
            let err = server
                .dispatch(tool, object(arguments.clone()))
                .await
                .expect_err("null should be rejected");
            assert_eq!(err.code, ErrorCode::INVALID_PARAMS, "{tool} {arguments}");
        }
    }

    #[tokio::test]
    async fn unknown_argument_is_invalid_params() {
        let err = unreachable_server()
            .dispatch(KB_INGEST, object(json!({ "full": true })))
            .await
            .expect_err("unknown property should be rejected");

        assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
        assert!(err.message.contains("full"));
    }
}
