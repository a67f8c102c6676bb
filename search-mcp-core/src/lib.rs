// search-mcp-core/src/lib.rs
// ============================================================================
// Module: Search MCP Core
// Description: Backend clients, catalog aggregation, and routing.
// Purpose: Provide the aggregation layer the MCP server surfaces expose.
// Dependencies: serde, serde_json, tokio
// ============================================================================

//! ## Overview
//! The core crate owns everything between the aggregator's frontend and its
//! backend child processes: configuration, the per-backend JSON-RPC client,
//! the backend manager with its namespaced catalog, catalog search, parameter
//! validation, and the shared error taxonomy. The frontend is a thin wrapper
//! over [`BackendManager`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod catalog;
pub mod client;
pub mod config;
pub mod error;
pub mod manager;
pub mod search;
pub mod validate;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use catalog::AggregatedTool;
pub use catalog::Catalog;
pub use catalog::RawToolDescriptor;
pub use catalog::ToolSummary;
pub use catalog::qualify;
pub use catalog::split_qualified;
pub use client::BackendClient;
pub use config::AggregatorConfig;
pub use config::BackendConfig;
pub use config::ConfigError;
pub use config::expand_env;
pub use error::AggregatorError;
pub use manager::BackendFailure;
pub use manager::BackendManager;
pub use manager::ManagerStats;
pub use manager::RefreshReport;
pub use manager::ServerStats;
pub use manager::StartReport;
pub use search::SearchField;
pub use search::SearchMode;
pub use search::SearchOptions;
pub use search::SearchResults;
pub use search::search_catalog;
pub use validate::ParamSpec;
pub use validate::ParamType;
pub use validate::validate_or_reject;
pub use validate::validate_params;
