// search-mcp-server/src/server.rs
// ============================================================================
// Module: MCP Server
// Description: Line-delimited JSON-RPC 2.0 dispatcher over stdin/stdout.
// Purpose: Serve the aggregated tool surface to one MCP client.
// Dependencies: search-mcp-core, serde_json, tokio
// ============================================================================

//! ## Overview
//! The dispatcher reads one JSON-RPC request per line from stdin and writes
//! one response per line to stdout; nothing else is ever written to stdout.
//! `initialize` loads configuration and fans out backend startup; every
//! `tools/call` runs the router pipeline. Errors are shaped uniformly: the
//! JSON-RPC code derives from the error's status, and the `data` object
//! carries the stable error code and structured details. The only fatal
//! conditions are losing stdout and failing to start the loop itself.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;

use search_mcp_core::AggregatorError;

use crate::audit::AuditActor;
use crate::audit::AuditEventType;
use crate::audit::AuditLevel;
use crate::audit::AuditRecord;
use crate::audit::AuditResult;
use crate::tools::ToolRouter;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Protocol version reported to the client.
pub const PROTOCOL_VERSION: &str = "1.0.0";
/// Server name reported to the client.
pub const SERVER_NAME: &str = "search-mcp";
/// Server version reported to the client.
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// JSON-RPC code for parse failures.
const PARSE_ERROR: i64 = -32700;
/// JSON-RPC code for unknown methods.
const METHOD_NOT_FOUND: i64 = -32601;
/// JSON-RPC code for calls before `initialize`.
const NOT_INITIALIZED: i64 = -32002;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Fatal dispatcher errors.
#[derive(Debug, Error)]
pub enum McpServerError {
    /// The client channel failed irrecoverably.
    #[error("transport failed: {0}")]
    Transport(String),
}

// ============================================================================
// SECTION: Wire Shapes
// ============================================================================

/// Incoming JSON-RPC request payload.
#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    /// JSON-RPC protocol version.
    #[allow(dead_code, reason = "decoded for shape validation only")]
    jsonrpc: Option<String>,
    /// Request identifier.
    #[serde(default)]
    id: Value,
    /// Method name.
    method: String,
    /// Optional parameters payload.
    #[serde(default)]
    params: Option<Value>,
}

/// JSON-RPC response envelope.
#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    /// JSON-RPC protocol version.
    jsonrpc: &'static str,
    /// Request identifier.
    id: Value,
    /// Successful result payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    /// Error payload when the request fails.
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

/// JSON-RPC error payload.
#[derive(Debug, Serialize)]
struct JsonRpcError {
    /// Error code.
    code: i64,
    /// Human-readable error message.
    message: String,
    /// Structured error metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

/// Tool call parameters for JSON-RPC requests.
#[derive(Debug, Deserialize)]
struct ToolCallParams {
    /// Qualified or internal tool name.
    #[serde(default)]
    name: Option<String>,
    /// Raw JSON arguments, passed through verbatim.
    #[serde(default)]
    arguments: Value,
    /// Optional API key for authenticated pipelines.
    #[serde(rename = "apiKey", default)]
    api_key: Option<String>,
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// MCP server over stdin/stdout.
pub struct McpServer {
    /// Tool router carrying the pipeline collaborators.
    router: ToolRouter,
    /// Backend configuration path, loaded on `initialize`.
    config_path: PathBuf,
    /// True once `initialize` completed.
    initialized: bool,
}

impl McpServer {
    /// Builds a server around a router and a config path.
    #[must_use]
    pub fn new(router: ToolRouter, config_path: PathBuf) -> Self {
        Self {
            router,
            config_path,
            initialized: false,
        }
    }

    /// Serves line-delimited JSON-RPC until EOF or a fatal stdout failure.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError::Transport`] when stdout can no longer be
    /// written; a best-effort shutdown runs first.
    pub async fn serve(mut self) -> Result<(), McpServerError> {
        let mut reader = BufReader::new(tokio::io::stdin()).lines();
        let mut writer = tokio::io::stdout();
        loop {
            let line = match reader.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) | Err(_) => break,
            };
            let Some(response) = self.handle_line(&line).await else {
                continue;
            };
            let mut payload = response.into_bytes();
            payload.push(b'\n');
            if writer.write_all(&payload).await.is_err() || writer.flush().await.is_err() {
                self.shutdown("stdout_failed").await;
                return Err(McpServerError::Transport("stdout write failed".to_string()));
            }
        }
        self.shutdown("client_eof").await;
        Ok(())
    }

    /// Processes one inbound line into a serialized response.
    ///
    /// Returns `None` for blank lines, which carry no request.
    pub async fn handle_line(&mut self, line: &str) -> Option<String> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        let response = match serde_json::from_str::<JsonRpcRequest>(trimmed) {
            Ok(request) => self.handle_request(request).await,
            Err(_) => error_response(json!(0), PARSE_ERROR, "Parse error", None),
        };
        Some(serde_json::to_string(&response).unwrap_or_else(|_| {
            r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32603,"message":"serialization failed"}}"#
                .to_string()
        }))
    }

    /// Dispatches one decoded request.
    async fn handle_request(&mut self, request: JsonRpcRequest) -> JsonRpcResponse {
        match request.method.as_str() {
            "initialize" => self.handle_initialize(request.id).await,
            "tools/list" => self.handle_tools_list(request.id),
            "tools/call" => self.handle_tools_call(request.id, request.params).await,
            "ping" => success_response(request.id, json!({"status": "ok"})),
            _ => error_response(request.id, METHOD_NOT_FOUND, "Method not found", None),
        }
    }

    /// Handles `initialize`: config load, backend fan-out, catalog build.
    async fn handle_initialize(&mut self, id: Value) -> JsonRpcResponse {
        if !self.initialized {
            if let Err(err) = self.router.manager().load_config(&self.config_path) {
                return shaped_error(id, &err);
            }
            let report = self.router.manager().start_all().await;
            for failure in &report.failures {
                let mut record = AuditRecord::new(
                    AuditEventType::System,
                    AuditLevel::Error,
                    AuditActor::system(),
                    "backend_start",
                    AuditResult::Failure,
                );
                record.details = Some(
                    json!({"server": failure.backend, "error": failure.error})
                        .as_object()
                        .cloned()
                        .unwrap_or_default(),
                );
                self.router.audit().record(record);
            }
            let started = AuditRecord::new(
                AuditEventType::System,
                AuditLevel::Info,
                AuditActor::system(),
                "startup",
                AuditResult::Success,
            );
            self.router.audit().record(started);
            self.initialized = true;
        }
        success_response(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": SERVER_VERSION,
                },
                "capabilities": {"tools": {}},
            }),
        )
    }

    /// Handles `tools/list` with the combined internal + aggregated catalog.
    fn handle_tools_list(&self, id: Value) -> JsonRpcResponse {
        if !self.initialized {
            return error_response(id, NOT_INITIALIZED, "Server not initialized", None);
        }
        success_response(id, json!({"tools": self.router.list_tools()}))
    }

    /// Handles `tools/call` through the router pipeline.
    async fn handle_tools_call(&self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        if !self.initialized {
            return error_response(id, NOT_INITIALIZED, "Server not initialized", None);
        }
        let params = params.unwrap_or(Value::Null);
        let call: ToolCallParams = match serde_json::from_value(params) {
            Ok(call) => call,
            Err(_) => {
                return shaped_error(id, &AggregatorError::validation("Invalid tool call params"));
            }
        };
        let Some(name) = call.name.filter(|name| !name.trim().is_empty()) else {
            return shaped_error(id, &AggregatorError::validation("Tool name is required"));
        };
        match self
            .router
            .handle_tool_call(&name, call.arguments, call.api_key.as_deref())
            .await
        {
            Ok(result) => success_response(id, result),
            Err(err) => shaped_error(id, &err),
        }
    }

    /// Emits the shutdown audit record and stops every backend.
    async fn shutdown(&self, reason: &str) {
        let mut record = AuditRecord::new(
            AuditEventType::System,
            AuditLevel::Info,
            AuditActor::system(),
            "shutdown",
            AuditResult::Success,
        );
        record.details =
            Some(json!({"reason": reason}).as_object().cloned().unwrap_or_default());
        self.router.audit().record(record);
        self.router.manager().stop_all().await;
    }
}

// ============================================================================
// SECTION: Response Shaping
// ============================================================================

fn success_response(id: Value, result: Value) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0",
        id,
        result: Some(result),
        error: None,
    }
}

fn error_response(id: Value, code: i64, message: &str, data: Option<Value>) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0",
        id,
        result: None,
        error: Some(JsonRpcError {
            code,
            message: message.to_string(),
            data,
        }),
    }
}

/// Maps a typed error onto the JSON-RPC surface.
///
/// The code derives from the HTTP-equivalent status; the `data` payload
/// carries the stable code and structured details for pattern-matching
/// clients. Stack traces never cross this boundary.
fn shaped_error(id: Value, error: &AggregatorError) -> JsonRpcResponse {
    let code = match error.status() {
        400 => -32602,
        404 => -32601,
        _ => -32000,
    };
    let data = json!({
        "code": error.code(),
        "details": error.details(),
    });
    error_response(id, code, &error.to_string(), Some(data))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
