// search-mcp-core/src/error.rs
// ============================================================================
// Module: Aggregator Error Taxonomy
// Description: Typed error values shared across the aggregator subsystems.
// Purpose: Map every failure to a stable code, status, and details payload.
// Dependencies: serde_json, thiserror
// ============================================================================

//! ## Overview
//! Every failure that can leave the aggregator carries a stable string code,
//! an HTTP-equivalent status, and a structured details map. The dispatcher
//! derives JSON-RPC error codes from the status; clients pattern-match on the
//! code and the deterministic message text.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

// ============================================================================
// SECTION: Error Type
// ============================================================================

/// Aggregator error taxonomy.
///
/// # Invariants
/// - Variants are stable for client-side error classification.
/// - Messages are deterministic for a given failure class.
#[derive(Debug, Error)]
pub enum AggregatorError {
    /// Qualified tool name does not resolve to a known tool or backend.
    #[error("{message}")]
    ToolNotFound {
        /// Human-readable message.
        message: String,
        /// Structured error details.
        details: Map<String, Value>,
    },
    /// Tool exists but is disabled by configuration.
    #[error("{message}")]
    ToolDisabled {
        /// Human-readable message.
        message: String,
        /// Structured error details.
        details: Map<String, Value>,
    },
    /// Backend returned an error or the wire call failed mid-flight.
    #[error("{message}")]
    ToolExecutionError {
        /// Human-readable message.
        message: String,
        /// Structured error details.
        details: Map<String, Value>,
    },
    /// Parameter or request-shape validation failed.
    #[error("{message}")]
    ValidationError {
        /// Human-readable message.
        message: String,
        /// Structured error details.
        details: Map<String, Value>,
    },
    /// Per-request timeout expired before the backend responded.
    #[error("{message}")]
    BackendTimeout {
        /// Human-readable message.
        message: String,
        /// Structured error details.
        details: Map<String, Value>,
    },
    /// Missing, invalid, expired, or disabled API key.
    #[error("{message}")]
    AuthenticationError {
        /// Human-readable message.
        message: String,
        /// Structured error details.
        details: Map<String, Value>,
    },
    /// Authenticated caller lacks the required permission.
    #[error("{message}")]
    AuthorizationError {
        /// Human-readable message.
        message: String,
        /// Structured error details.
        details: Map<String, Value>,
    },
    /// Token bucket for the caller is empty.
    #[error("{message}")]
    RateLimitExceeded {
        /// Human-readable message.
        message: String,
        /// Structured error details.
        details: Map<String, Value>,
    },
    /// Configuration load, parse, or validation failed.
    #[error("{message}")]
    ConfigurationError {
        /// Human-readable message.
        message: String,
        /// Structured error details.
        details: Map<String, Value>,
    },
    /// Backend is not running or unreachable.
    #[error("{message}")]
    BackendUnavailable {
        /// Human-readable message.
        message: String,
        /// Structured error details.
        details: Map<String, Value>,
    },
}

impl AggregatorError {
    /// Returns the stable string code for the error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::ToolNotFound { .. } => "TOOL_NOT_FOUND",
            Self::ToolDisabled { .. } => "TOOL_DISABLED",
            Self::ToolExecutionError { .. } => "TOOL_EXECUTION_ERROR",
            Self::ValidationError { .. } => "VALIDATION_ERROR",
            Self::BackendTimeout { .. } => "BACKEND_TIMEOUT",
            Self::AuthenticationError { .. } => "AUTHENTICATION_ERROR",
            Self::AuthorizationError { .. } => "AUTHORIZATION_ERROR",
            Self::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            Self::ConfigurationError { .. } => "CONFIGURATION_ERROR",
            Self::BackendUnavailable { .. } => "MCP_SERVER_ERROR",
        }
    }

    /// Returns the HTTP-equivalent status for the error.
    #[must_use]
    pub const fn status(&self) -> u16 {
        match self {
            Self::ToolNotFound { .. } => 404,
            Self::ToolDisabled { .. } | Self::AuthorizationError { .. } => 403,
            Self::ToolExecutionError { .. } | Self::ConfigurationError { .. } => 500,
            Self::ValidationError { .. } => 400,
            Self::BackendTimeout { .. } => 408,
            Self::AuthenticationError { .. } => 401,
            Self::RateLimitExceeded { .. } => 429,
            Self::BackendUnavailable { .. } => 502,
        }
    }

    /// Returns the structured details map for the error.
    #[must_use]
    pub const fn details(&self) -> &Map<String, Value> {
        match self {
            Self::ToolNotFound { details, .. }
            | Self::ToolDisabled { details, .. }
            | Self::ToolExecutionError { details, .. }
            | Self::ValidationError { details, .. }
            | Self::BackendTimeout { details, .. }
            | Self::AuthenticationError { details, .. }
            | Self::AuthorizationError { details, .. }
            | Self::RateLimitExceeded { details, .. }
            | Self::ConfigurationError { details, .. }
            | Self::BackendUnavailable { details, .. } => details,
        }
    }
}

// ============================================================================
// SECTION: Constructors
// ============================================================================

impl AggregatorError {
    /// Builds a tool-not-found error for an unknown backend.
    #[must_use]
    pub fn server_not_found(backend: &str) -> Self {
        Self::ToolNotFound {
            message: format!("MCP server not found: {backend}"),
            details: details_map(&[("server", json!(backend))]),
        }
    }

    /// Builds a tool-not-found error for an unknown qualified tool name.
    #[must_use]
    pub fn tool_not_found(qualified_name: &str) -> Self {
        Self::ToolNotFound {
            message: format!("Tool not found: {qualified_name}"),
            details: details_map(&[("tool", json!(qualified_name))]),
        }
    }

    /// Builds a validation error from a single message.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            details: Map::new(),
        }
    }

    /// Builds a validation error from an accumulated error list.
    #[must_use]
    pub fn validation_failed(errors: Vec<String>) -> Self {
        Self::ValidationError {
            message: format!("Parameter validation failed: {}", errors.join("; ")),
            details: details_map(&[("errors", json!(errors))]),
        }
    }

    /// Builds a required-parameter validation error.
    #[must_use]
    pub fn required_parameter(name: &str) -> Self {
        Self::ValidationError {
            message: format!("Required parameter missing: {name}"),
            details: details_map(&[("parameter", json!(name))]),
        }
    }

    /// Builds a rate-limit error carrying the retry delay in seconds.
    #[must_use]
    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self::RateLimitExceeded {
            message: format!("Rate limit exceeded. Retry after {retry_after_secs} seconds."),
            details: details_map(&[("retryAfter", json!(retry_after_secs))]),
        }
    }

    /// Builds a backend-timeout error for a tool call.
    #[must_use]
    pub fn backend_timeout(backend: &str, method: &str, timeout_ms: u64) -> Self {
        Self::BackendTimeout {
            message: format!("Request to MCP server timed out: {backend}"),
            details: details_map(&[
                ("server", json!(backend)),
                ("method", json!(method)),
                ("timeoutMs", json!(timeout_ms)),
            ]),
        }
    }

    /// Builds an unavailability error for a backend that is not running.
    #[must_use]
    pub fn backend_unavailable(backend: &str) -> Self {
        Self::BackendUnavailable {
            message: format!("MCP server not running: {backend}"),
            details: details_map(&[("server", json!(backend))]),
        }
    }

    /// Builds an unavailability error for a stopped backend client.
    ///
    /// Used to cancel pending requests when a client terminates; the reason
    /// key lets callers distinguish cancellation from routing failures.
    #[must_use]
    pub fn client_stopped(backend: &str) -> Self {
        Self::BackendUnavailable {
            message: format!("MCP client stopped: {backend}"),
            details: details_map(&[("server", json!(backend)), ("reason", json!("client_stopped"))]),
        }
    }

    /// Builds a startup failure error for a backend.
    #[must_use]
    pub fn backend_startup(backend: &str, reason: &str) -> Self {
        Self::BackendUnavailable {
            message: format!("MCP server failed to start: {backend}"),
            details: details_map(&[("server", json!(backend)), ("reason", json!(reason))]),
        }
    }

    /// Builds an execution error from a backend JSON-RPC error payload.
    #[must_use]
    pub fn backend_error(backend: &str, code: Option<i64>, message: &str) -> Self {
        let mut details = details_map(&[("server", json!(backend))]);
        if let Some(code) = code {
            details.insert("jsonrpcCode".to_string(), json!(code));
        }
        Self::ToolExecutionError {
            message: format!("Tool execution failed: {message}"),
            details,
        }
    }

    /// Builds a configuration error from a message.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError {
            message: message.into(),
            details: Map::new(),
        }
    }

    /// Builds an authentication error from a reason.
    #[must_use]
    pub fn unauthenticated(reason: &str) -> Self {
        Self::AuthenticationError {
            message: format!("Authentication failed: {reason}"),
            details: details_map(&[("reason", json!(reason))]),
        }
    }

    /// Builds an authorization error for a missing permission.
    #[must_use]
    pub fn unauthorized(permission: &str) -> Self {
        Self::AuthorizationError {
            message: format!("Permission denied: {permission}"),
            details: details_map(&[("permission", json!(permission))]),
        }
    }
}

/// Builds a details map from key/value pairs.
fn details_map(entries: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (key, value) in entries {
        map.insert((*key).to_string(), value.clone());
    }
    map
}

// ============================================================================
// SECTION: Tests
// ============================================================================
