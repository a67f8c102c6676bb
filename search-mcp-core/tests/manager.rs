// search-mcp-core/tests/manager.rs
// ============================================================================
// Module: Backend Manager Tests
// Description: Integration tests for startup fan-out and routed dispatch.
// Purpose: Exercise catalog aggregation, failure containment, and routing.
// Dependencies: search-mcp-core, tempfile, tokio
// ============================================================================

//! ## Overview
//! Drives the backend manager against real child processes: parallel
//! startup with one failing backend, catalog namespacing, verbatim routing,
//! refresh stability, and full shutdown.

mod common;

use std::collections::BTreeMap;

use serde_json::json;

use search_mcp_core::AggregatorConfig;
use search_mcp_core::BackendManager;
use search_mcp_core::config::NAMESPACE_SEPARATOR;

use crate::common::DOTTED_TOOL_BACKEND_SCRIPT;
use crate::common::MOCK_BACKEND_SCRIPT;
use crate::common::backend_config;
use crate::common::write_script;

fn two_backend_config(dir: &std::path::Path) -> AggregatorConfig {
    let script = write_script(dir, "mock.sh", MOCK_BACKEND_SCRIPT);
    let mut backends = BTreeMap::new();
    backends.insert("echo".to_string(), backend_config("echo", &script));
    backends.insert(
        "broken".to_string(),
        backend_config("broken", &dir.join("missing-binary")),
    );
    AggregatorConfig {
        backends,
        ..AggregatorConfig::default()
    }
}

#[tokio::test]
async fn start_all_contains_individual_failures() {
    let dir = tempfile::tempdir().expect("tempdir");
    let manager = BackendManager::with_config(two_backend_config(dir.path()));

    let report = manager.start_all().await;
    assert_eq!(report.started, vec!["echo".to_string()]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].backend, "broken");

    let tools = manager.list_tools();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "echo.say");
    manager.stop_all().await;
}

#[tokio::test]
async fn catalog_names_are_qualified_with_one_separator() {
    let dir = tempfile::tempdir().expect("tempdir");
    let manager = BackendManager::with_config(two_backend_config(dir.path()));
    manager.start_all().await;

    for tool in manager.list_tools_full() {
        let separators =
            tool.qualified_name.matches(NAMESPACE_SEPARATOR).count();
        assert_eq!(separators, 1, "{}", tool.qualified_name);
        assert_eq!(tool.backend, "echo");
        assert_eq!(tool.raw_name, "say");
    }
    manager.stop_all().await;
}

#[tokio::test]
async fn refresh_excludes_tool_names_with_reserved_separator() {
    let dir = tempfile::tempdir().expect("tempdir");
    let script = write_script(dir.path(), "dotted.sh", DOTTED_TOOL_BACKEND_SCRIPT);
    let mut backends = BTreeMap::new();
    backends.insert("dotted".to_string(), backend_config("dotted", &script));
    let manager = BackendManager::with_config(AggregatorConfig {
        backends,
        ..AggregatorConfig::default()
    });

    let report = manager.start_all().await;
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].error.contains("read.deep"));

    let tools = manager.list_tools();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "dotted.say");
    for tool in manager.list_tools_full() {
        assert_eq!(tool.qualified_name.matches(NAMESPACE_SEPARATOR).count(), 1);
    }

    let error = manager.execute_tool("dotted.read.deep", json!({})).await.expect_err("rejected");
    assert_eq!(error.code(), "VALIDATION_ERROR");
    manager.stop_all().await;
}

#[tokio::test]
async fn execute_tool_routes_to_backend_verbatim() {
    let dir = tempfile::tempdir().expect("tempdir");
    let manager = BackendManager::with_config(two_backend_config(dir.path()));
    manager.start_all().await;

    let result = manager.execute_tool("echo.say", json!({"text": "hi"})).await.expect("routed");
    assert_eq!(result, json!({"content": [{"type": "text", "text": "hi"}]}));

    let error = manager.execute_tool("broken.say", json!({})).await.expect_err("not running");
    assert_eq!(error.code(), "TOOL_NOT_FOUND");
    manager.stop_all().await;
}

#[tokio::test]
async fn refresh_keeps_catalog_stable_without_changes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let manager = BackendManager::with_config(two_backend_config(dir.path()));
    manager.start_all().await;

    let before: Vec<String> =
        manager.list_tools().into_iter().map(|tool| tool.name).collect();
    let report = manager.refresh_tools().await;
    let after: Vec<String> =
        manager.list_tools().into_iter().map(|tool| tool.name).collect();
    assert_eq!(before, after);
    assert_eq!(report.total_tools, before.len());
    manager.stop_all().await;
}

#[tokio::test]
async fn stats_count_configured_and_running_backends() {
    let dir = tempfile::tempdir().expect("tempdir");
    let manager = BackendManager::with_config(two_backend_config(dir.path()));
    manager.start_all().await;

    let stats = manager.stats().await;
    assert_eq!(stats.total_servers, 2);
    assert_eq!(stats.running_servers, 1);
    assert_eq!(stats.total_tools, 1);
    let echo = stats.servers.iter().find(|server| server.name == "echo").expect("echo stats");
    assert!(echo.running);
    assert_eq!(echo.tool_count, 1);
    manager.stop_all().await;
}

#[tokio::test]
async fn stop_all_clears_catalog_and_clients() {
    let dir = tempfile::tempdir().expect("tempdir");
    let manager = BackendManager::with_config(two_backend_config(dir.path()));
    manager.start_all().await;
    assert!(!manager.list_tools().is_empty());

    manager.stop_all().await;
    assert!(manager.list_tools().is_empty());
    let error = manager.execute_tool("echo.say", json!({})).await.expect_err("stopped");
    assert_eq!(error.code(), "TOOL_NOT_FOUND");
}

#[tokio::test]
async fn ping_reaches_running_backend() {
    let dir = tempfile::tempdir().expect("tempdir");
    let manager = BackendManager::with_config(two_backend_config(dir.path()));
    manager.start_all().await;

    let pong = manager.ping_backend("echo").await.expect("ping");
    assert_eq!(pong["status"], json!("ok"));
    assert!(manager.ping_backend("broken").await.is_err());
    manager.stop_all().await;
}
