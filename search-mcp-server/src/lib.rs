// search-mcp-server/src/lib.rs
// ============================================================================
// Module: Search MCP Server
// Description: MCP-facing surface of the aggregator.
// Purpose: Expose the aggregated catalog over stdio with a guarded pipeline.
// Dependencies: search-mcp-core, tokio
// ============================================================================

//! ## Overview
//! This crate carries everything between the client channel and the core
//! aggregation layer: the stdio JSON-RPC dispatcher, API-key auth, the
//! token-bucket rate limiter, the audit logger, and the internal tool
//! adapters. All collaborators are injected into the tool router so tests
//! stay parallelizable and deterministic.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod auth;
pub mod rate_limit;
pub mod server;
pub mod tools;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AuditEvent;
pub use audit::AuditLevel;
pub use audit::AuditLogger;
pub use audit::AuditLoggerConfig;
pub use audit::AuditQuery;
pub use audit::AuditStats;
pub use auth::AuthContext;
pub use auth::AuthManager;
pub use rate_limit::RateLimiter;
pub use rate_limit::RateLimiterConfig;
pub use rate_limit::TierLimits;
pub use server::McpServer;
pub use server::McpServerError;
pub use tools::InternalTool;
pub use tools::ToolRouter;
pub use tools::ToolRouterConfig;
