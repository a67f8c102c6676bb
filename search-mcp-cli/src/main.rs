// search-mcp-cli/src/main.rs
// ============================================================================
// Module: Aggregator Binary
// Description: Process entry point for the search-mcp aggregator.
// Purpose: Wire environment, collaborators, and signals around the server.
// Dependencies: search-mcp-core, search-mcp-server, tokio
// ============================================================================

//! ## Overview
//! The binary resolves configuration from the environment, constructs the
//! process-wide collaborators, and runs the stdio dispatcher until the client
//! disconnects or a termination signal arrives. Exit code is zero on
//! graceful shutdown and non-zero on initialization or transport failure.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use search_mcp_core::AggregatorConfig;
use search_mcp_core::BackendManager;
use search_mcp_server::AuditLogger;
use search_mcp_server::AuditLoggerConfig;
use search_mcp_server::AuthManager;
use search_mcp_server::McpServer;
use search_mcp_server::RateLimiter;
use search_mcp_server::RateLimiterConfig;
use search_mcp_server::ToolRouter;
use search_mcp_server::ToolRouterConfig;
use search_mcp_server::audit::AuditActor;
use search_mcp_server::audit::AuditEventType;
use search_mcp_server::audit::AuditLevel;
use search_mcp_server::audit::AuditRecord;
use search_mcp_server::audit::AuditResult;

// ============================================================================
// SECTION: Environment
// ============================================================================

/// Environment variable enabling API-key auth.
const AUTH_ENABLED_VAR: &str = "AUTH_ENABLED";
/// Environment variable overriding the key file path.
const AUTH_KEYS_FILE_VAR: &str = "AUTH_KEYS_FILE";
/// Default key file path.
const DEFAULT_AUTH_KEYS_FILE: &str = "./config/api-keys.json";
/// Environment variable overriding the audit log path.
const AUDIT_LOG_FILE_VAR: &str = "AUDIT_LOG_FILE";
/// Default audit log path.
const DEFAULT_AUDIT_LOG_FILE: &str = "./logs/audit.log";

fn env_path(var: &str, default: &str) -> PathBuf {
    env::var(var).map_or_else(|_| PathBuf::from(default), PathBuf::from)
}

fn env_flag(var: &str) -> bool {
    env::var(var).is_ok_and(|value| value.eq_ignore_ascii_case("true"))
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("search-mcp: {message}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), String> {
    let audit_path = env_path(AUDIT_LOG_FILE_VAR, DEFAULT_AUDIT_LOG_FILE);
    if let Some(parent) = audit_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let audit = Arc::new(AuditLogger::with_file(AuditLoggerConfig::default(), &audit_path));

    let keys_path = env_path(AUTH_KEYS_FILE_VAR, DEFAULT_AUTH_KEYS_FILE);
    let auth = Arc::new(
        AuthManager::load(&keys_path, env_flag(AUTH_ENABLED_VAR))
            .map_err(|err| err.to_string())?,
    );

    let rate_limiter = Arc::new(RateLimiter::new(RateLimiterConfig::default()));
    let eviction = rate_limiter.spawn_eviction();
    let retention = spawn_audit_cleanup(Arc::clone(&audit));

    let manager = Arc::new(BackendManager::new());
    let router = ToolRouter::new(ToolRouterConfig {
        manager: Arc::clone(&manager),
        auth,
        rate_limiter,
        audit: Arc::clone(&audit),
    });
    let server = McpServer::new(router, AggregatorConfig::resolve_path());

    let outcome = tokio::select! {
        outcome = server.serve() => outcome.map_err(|err| err.to_string()),
        () = terminate_signal() => {
            audit.record(signal_shutdown_record());
            manager.stop_all().await;
            Ok(())
        }
    };
    eviction.abort();
    retention.abort();
    outcome
}

/// Applies the audit retention window once an hour.
fn spawn_audit_cleanup(audit: Arc<AuditLogger>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(60 * 60));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            audit.cleanup();
        }
    })
}

/// Resolves when SIGINT or SIGTERM arrives.
async fn terminate_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::SignalKind;
        use tokio::signal::unix::signal;
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(_) => return std::future::pending().await,
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn signal_shutdown_record() -> AuditRecord {
    let mut record = AuditRecord::new(
        AuditEventType::System,
        AuditLevel::Info,
        AuditActor::system(),
        "shutdown",
        AuditResult::Success,
    );
    record.details = serde_json::json!({"reason": "signal"})
        .as_object()
        .cloned();
    record
}
