// search-mcp-server/tests/dispatch_pipeline.rs
// ============================================================================
// Module: Dispatch Pipeline Tests
// Description: End-to-end tests over the stdio dispatcher surface.
// Purpose: Exercise routing, rate limiting, authorization, and redaction
//          with a real backend child process.
// Dependencies: search-mcp-core, search-mcp-server, tempfile, tokio
// ============================================================================

//! ## Overview
//! Every test speaks literal JSON-RPC lines to the dispatcher, backed by a
//! scripted echo backend, and asserts on the shape of the replies and the
//! audit trail they leave behind.

mod common;

use std::collections::BTreeMap;

use serde_json::Value;
use serde_json::json;

use search_mcp_server::AuditQuery;
use search_mcp_server::AuthManager;
use search_mcp_server::RateLimiterConfig;
use search_mcp_server::TierLimits;
use search_mcp_server::audit::AuditEventType;
use search_mcp_server::audit::AuditResult;

use crate::common::build_server;
use crate::common::initialize;
use crate::common::roundtrip;
use crate::common::write_echo_config;

fn strict_default_tier() -> RateLimiterConfig {
    let mut tiers = BTreeMap::new();
    tiers.insert(
        "default".to_string(),
        TierLimits {
            max_tokens: 2.0,
            refill_rate: 0.0,
        },
    );
    RateLimiterConfig {
        tiers,
        ..RateLimiterConfig::default()
    }
}

#[tokio::test]
async fn initialize_then_list_shows_internal_and_backend_tools() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut fixture = build_server(
        write_echo_config(dir.path()),
        AuthManager::disabled(),
        RateLimiterConfig::default(),
    );
    initialize(&mut fixture.server).await;

    let response =
        roundtrip(&mut fixture.server, r#"{"jsonrpc":"2.0","id":2,"method":"tools/list","params":{}}"#)
            .await;
    let tools = response["result"]["tools"].as_array().expect("tools");
    for name in ["search_tools", "list_servers", "health_check", "query_audit_logs", "echo.say"] {
        assert!(
            tools.iter().any(|tool| tool["name"] == json!(name)),
            "missing {name}"
        );
    }
    for tool in tools {
        assert_eq!(tool.as_object().expect("tool object").len(), 2);
    }
}

#[tokio::test]
async fn backend_tool_call_routes_and_returns_verbatim() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut fixture = build_server(
        write_echo_config(dir.path()),
        AuthManager::disabled(),
        RateLimiterConfig::default(),
    );
    initialize(&mut fixture.server).await;

    let response = roundtrip(
        &mut fixture.server,
        r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"echo.say","arguments":{"text":"hi"}}}"#,
    )
    .await;
    assert_eq!(response["result"], json!({"content": [{"type": "text", "text": "hi"}]}));
}

#[tokio::test]
async fn unknown_backend_yields_structured_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut fixture = build_server(
        write_echo_config(dir.path()),
        AuthManager::disabled(),
        RateLimiterConfig::default(),
    );
    initialize(&mut fixture.server).await;

    let response = roundtrip(
        &mut fixture.server,
        r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"xyz.anything","arguments":{}}}"#,
    )
    .await;
    assert_eq!(response["error"]["data"]["code"], json!("TOOL_NOT_FOUND"));
    assert!(
        response["error"]["message"]
            .as_str()
            .is_some_and(|message| message.contains("xyz"))
    );
}

#[tokio::test]
async fn third_call_hits_rate_limit_with_retry_after() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut fixture = build_server(
        write_echo_config(dir.path()),
        AuthManager::disabled(),
        strict_default_tier(),
    );
    initialize(&mut fixture.server).await;

    let call = r#"{"jsonrpc":"2.0","id":5,"method":"tools/call","params":{"name":"echo.say","arguments":{"text":"x"}}}"#;
    let first = roundtrip(&mut fixture.server, call).await;
    let second = roundtrip(&mut fixture.server, call).await;
    assert!(first.get("error").is_none());
    assert!(second.get("error").is_none());

    let third = roundtrip(&mut fixture.server, call).await;
    assert_eq!(third["error"]["data"]["code"], json!("RATE_LIMIT_EXCEEDED"));
    let retry_after = third["error"]["data"]["details"]["retryAfter"]
        .as_u64()
        .expect("retryAfter");
    assert!(retry_after > 0);
}

#[tokio::test]
async fn scoped_key_authorizes_only_matching_backends() {
    let dir = tempfile::tempdir().expect("tempdir");
    let keys_path = dir.path().join("api-keys.json");
    std::fs::write(&keys_path, r#"{"authEnabled": true, "apiKeys": []}"#).expect("seed keys");
    let auth = AuthManager::load(&keys_path, true).expect("load auth");
    let generated = auth
        .generate("scoped", vec!["tools:echo.*".to_string()], None)
        .expect("generate key");

    let mut fixture =
        build_server(write_echo_config(dir.path()), auth, RateLimiterConfig::default());
    initialize(&mut fixture.server).await;

    let allowed = roundtrip(
        &mut fixture.server,
        &format!(
            r#"{{"jsonrpc":"2.0","id":6,"method":"tools/call","params":{{"name":"echo.say","arguments":{{"text":"hi"}},"apiKey":"{}"}}}}"#,
            generated.plaintext
        ),
    )
    .await;
    assert!(allowed.get("error").is_none(), "scoped call must pass: {allowed}");

    let denied = roundtrip(
        &mut fixture.server,
        &format!(
            r#"{{"jsonrpc":"2.0","id":7,"method":"tools/call","params":{{"name":"other.say","arguments":{{}},"apiKey":"{}"}}}}"#,
            generated.plaintext
        ),
    )
    .await;
    assert_eq!(denied["error"]["data"]["code"], json!("AUTHORIZATION_ERROR"));

    let denials = fixture.audit.query(&AuditQuery {
        event_type: Some(AuditEventType::Authorization),
        ..AuditQuery::default()
    });
    assert_eq!(denials.len(), 1);
    assert_eq!(denials[0].result, AuditResult::Failure);
}

#[tokio::test]
async fn missing_key_fails_authentication_when_auth_enabled() {
    let dir = tempfile::tempdir().expect("tempdir");
    let keys_path = dir.path().join("api-keys.json");
    std::fs::write(&keys_path, r#"{"authEnabled": true, "apiKeys": []}"#).expect("seed keys");
    let auth = AuthManager::load(&keys_path, true).expect("load auth");

    let mut fixture =
        build_server(write_echo_config(dir.path()), auth, RateLimiterConfig::default());
    assert!(fixture.auth.is_enabled());
    initialize(&mut fixture.server).await;

    let response = roundtrip(
        &mut fixture.server,
        r#"{"jsonrpc":"2.0","id":8,"method":"tools/call","params":{"name":"echo.say","arguments":{}}}"#,
    )
    .await;
    assert_eq!(response["error"]["data"]["code"], json!("AUTHENTICATION_ERROR"));
}

#[tokio::test]
async fn audited_arguments_are_redacted_and_queryable() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut fixture = build_server(
        write_echo_config(dir.path()),
        AuthManager::disabled(),
        RateLimiterConfig::default(),
    );
    initialize(&mut fixture.server).await;

    let _ = roundtrip(
        &mut fixture.server,
        r#"{"jsonrpc":"2.0","id":9,"method":"tools/call","params":{"name":"echo.say","arguments":{"apiKey":"SECRET","q":"ok","text":"hi"}}}"#,
    )
    .await;

    let response = roundtrip(
        &mut fixture.server,
        r#"{"jsonrpc":"2.0","id":10,"method":"tools/call","params":{"name":"query_audit_logs","arguments":{"type":"tool_execution"}}}"#,
    )
    .await;
    let text = response["result"]["content"][0]["text"].as_str().expect("envelope text");
    let payload: Value = serde_json::from_str(text).expect("payload json");
    let events = payload["events"].as_array().expect("events");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["details"]["parameters"]["apiKey"], json!("***REDACTED***"));
    assert_eq!(events[0]["details"]["parameters"]["q"], json!("ok"));
    assert_eq!(events[0]["result"], json!("success"));
}

#[tokio::test]
async fn execute_parallel_fans_out_over_backend() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut fixture = build_server(
        write_echo_config(dir.path()),
        AuthManager::disabled(),
        RateLimiterConfig::default(),
    );
    initialize(&mut fixture.server).await;

    let response = roundtrip(
        &mut fixture.server,
        r#"{"jsonrpc":"2.0","id":11,"method":"tools/call","params":{"name":"execute_parallel","arguments":{"requests":[{"id":"a","tool":"echo.say","arguments":{"text":"one"}},{"id":"b","tool":"echo.say","arguments":{"text":"two"}}]}}}"#,
    )
    .await;
    let text = response["result"]["content"][0]["text"].as_str().expect("envelope text");
    let payload: Value = serde_json::from_str(text).expect("payload json");
    let results = payload["results"].as_array().expect("results");
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|entry| entry["success"] == json!(true)));
    assert_eq!(results[0]["id"], json!("a"));
    assert_eq!(results[1]["id"], json!("b"));
}

#[tokio::test]
async fn health_check_reports_backend_detail() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut fixture = build_server(
        write_echo_config(dir.path()),
        AuthManager::disabled(),
        RateLimiterConfig::default(),
    );
    initialize(&mut fixture.server).await;

    let response = roundtrip(
        &mut fixture.server,
        r#"{"jsonrpc":"2.0","id":12,"method":"tools/call","params":{"name":"health_check","arguments":{"detailed":true}}}"#,
    )
    .await;
    let text = response["result"]["content"][0]["text"].as_str().expect("envelope text");
    let payload: Value = serde_json::from_str(text).expect("payload json");
    assert_eq!(payload["status"], json!("healthy"));
    let checks = payload["checks"].as_array().expect("checks");
    assert!(checks.iter().any(|check| check["name"] == json!("backend:echo")));
}
