// search-mcp-core/tests/common/mod.rs
// ============================================================================
// Module: Test Fixtures
// Description: Shared mock backend fixtures for integration tests.
// Purpose: Spawn deterministic stdio MCP servers from shell scripts.
// Dependencies: tempfile
// ============================================================================

#![allow(dead_code, reason = "each integration binary uses a subset of the fixtures")]

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

use search_mcp_core::BackendConfig;

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

/// Backend whose tool listing includes a name carrying the reserved separator.
pub const DOTTED_TOOL_BACKEND_SCRIPT: &str = r#"#!/bin/sh
while IFS= read -r line; do
  if [ -z "$line" ]; then
    continue
  fi
  method=$(printf '%s' "$line" | sed -n 's/.*"method":"\([^"]*\)".*/\1/p')
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9]*\).*/\1/p')
  case "$method" in
    initialize)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"protocolVersion":"1.0.0","capabilities":{"tools":{}}}}\n' "$id"
      ;;
    tools/list)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"say","description":"echoes text"},{"name":"read.deep","description":"dotted name"}]}}\n' "$id"
      ;;
  esac
done
"#;

/// Backend that completes the handshake and then goes silent.
pub const SILENT_BACKEND_SCRIPT: &str = r#"#!/bin/sh
while IFS= read -r line; do
  if [ -z "$line" ]; then
    continue
  fi
  method=$(printf '%s' "$line" | sed -n 's/.*"method":"\([^"]*\)".*/\1/p')
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9]*\).*/\1/p')
  if [ "$method" = "initialize" ]; then
    printf '{"jsonrpc":"2.0","id":%s,"result":{"protocolVersion":"1.0.0","capabilities":{"tools":{}}}}\n' "$id"
  fi
done
"#;

/// Backend that answers the handshake and exits immediately afterwards.
pub const ONESHOT_BACKEND_SCRIPT: &str = r#"#!/bin/sh
IFS= read -r line
id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9]*\).*/\1/p')
printf '{"jsonrpc":"2.0","id":%s,"result":{"protocolVersion":"1.0.0","capabilities":{"tools":{}}}}\n' "$id"
exit 0
"#;

/// Writes an executable mock script into the fixture directory.
pub fn write_script(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("write mock script");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(&path).expect("script metadata").permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).expect("chmod script");
    }
    path
}

/// Builds a backend config pointing at a mock script.
pub fn backend_config(name: &str, script: &Path) -> BackendConfig {
    BackendConfig {
        name: name.to_string(),
        command: script.display().to_string(),
        args: Vec::new(),
        env: BTreeMap::new(),
        enabled: true,
    }
}
