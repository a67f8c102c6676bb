// search-mcp-server/tests/common/mod.rs
// ============================================================================
// Module: Test Fixtures
// Description: Shared fixtures for dispatcher integration tests.
// Purpose: Build a full server around a scripted mock backend.
// Dependencies: search-mcp-core, search-mcp-server, tempfile
// ============================================================================

#![allow(dead_code, reason = "each integration binary uses a subset of the fixtures")]

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;

use search_mcp_core::BackendManager;
use search_mcp_server::AuditLogger;
use search_mcp_server::AuditLoggerConfig;
use search_mcp_server::AuthManager;
use search_mcp_server::McpServer;
use search_mcp_server::RateLimiter;
use search_mcp_server::RateLimiterConfig;
use search_mcp_server::ToolRouter;
use search_mcp_server::ToolRouterConfig;

/// Minimal MCP backend: answers initialize, tools/list, tools/call, ping.
pub const MOCK_BACKEND_SCRIPT: &str = r#"#!/bin/sh
while IFS= read -r line; do
  if [ -z "$line" ]; then
    continue
  fi
  method=$(printf '%s' "$line" | sed -n 's/.*"method":"\([^"]*\)".*/\1/p')
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9]*\).*/\1/p')
  case "$method" in
    initialize)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"protocolVersion":"1.0.0","capabilities":{"tools":{}},"serverInfo":{"name":"mock","version":"1.0.0"}}}\n' "$id"
      ;;
    tools/list)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"say","description":"echoes text","inputSchema":{"type":"object","properties":{"text":{"type":"string"}},"required":["text"]}}]}}\n' "$id"
      ;;
    tools/call)
      text=$(printf '%s' "$line" | sed -n 's/.*"text":"\([^"]*\)".*/\1/p')
      printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"%s"}]}}\n' "$id" "$text"
      ;;
    ping)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"status":"ok"}}\n' "$id"
      ;;
  esac
done
"#;

/// Writes the mock backend script and a config file referencing it.
///
/// Returns the config path for `initialize`.
pub fn write_echo_config(dir: &Path) -> PathBuf {
    let script = dir.join("mock.sh");
    std::fs::write(&script, MOCK_BACKEND_SCRIPT).expect("write mock script");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(&script).expect("script metadata").permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&script, perms).expect("chmod script");
    }
    let config_path = dir.join("mcp-servers.json");
    let config = serde_json::json!({
        "mcpServers": {
            "echo": {
                "command": script.display().to_string(),
                "args": [],
            }
        }
    });
    std::fs::write(&config_path, serde_json::to_vec_pretty(&config).expect("encode config"))
        .expect("write config");
    config_path
}

/// Injected collaborators kept by tests for assertions.
pub struct ServerFixture {
    /// The server under test.
    pub server: McpServer,
    /// Audit logger shared with the router.
    pub audit: Arc<AuditLogger>,
    /// Auth manager shared with the router.
    pub auth: Arc<AuthManager>,
}

/// Builds a server around the echo config with injectable limits and auth.
pub fn build_server(
    config_path: PathBuf,
    auth: AuthManager,
    rate_limiter: RateLimiterConfig,
) -> ServerFixture {
    let audit = Arc::new(AuditLogger::in_memory(AuditLoggerConfig::default()));
    let auth = Arc::new(auth);
    let router = ToolRouter::new(ToolRouterConfig {
        manager: Arc::new(BackendManager::new()),
        auth: Arc::clone(&auth),
        rate_limiter: Arc::new(RateLimiter::new(rate_limiter)),
        audit: Arc::clone(&audit),
    });
    ServerFixture {
        server: McpServer::new(router, config_path),
        audit,
        auth,
    }
}

/// Sends one request line and decodes the response JSON.
pub async fn roundtrip(server: &mut McpServer, line: &str) -> Value {
    let raw = server.handle_line(line).await.expect("response line");
    serde_json::from_str(&raw).expect("response json")
}

/// Runs `initialize` and asserts the identity block.
pub async fn initialize(server: &mut McpServer) {
    let response = roundtrip(
        server,
        r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"1.0.0","clientInfo":{"name":"t","version":"1"}}}"#,
    )
    .await;
    assert_eq!(response["result"]["serverInfo"]["name"], serde_json::json!("search-mcp"));
}
