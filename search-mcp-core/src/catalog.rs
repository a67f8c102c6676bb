// search-mcp-core/src/catalog.rs
// ============================================================================
// Module: Tool Catalog
// Description: Namespaced tool descriptors aggregated across backends.
// Purpose: Provide the qualified-name identity clients route against.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Backends report raw tool descriptors; the aggregator namespaces them as
//! `<backend>.<rawName>` and serves the union as a single catalog. Qualified
//! names contain exactly one separator: backend names are checked at config
//! load and raw names carrying the separator are excluded at catalog
//! ingestion.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::config::NAMESPACE_SEPARATOR;
use crate::error::AggregatorError;

// ============================================================================
// SECTION: Descriptors
// ============================================================================

/// Tool descriptor as returned by a backend `tools/list` call.
///
/// # Invariants
/// - Values are untrusted backend output; the schema is opaque JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawToolDescriptor {
    /// Tool name local to the backend.
    pub name: String,
    /// Tool description for clients.
    #[serde(default)]
    pub description: String,
    /// Opaque JSON input schema, when the backend provides one.
    #[serde(rename = "inputSchema", default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
}

/// Backend `tools/list` response payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsListResponse {
    /// Raw tool descriptors reported by the backend.
    #[serde(default)]
    pub tools: Vec<RawToolDescriptor>,
}

/// Aggregated tool descriptor under its qualified name.
#[derive(Debug, Clone, Serialize)]
pub struct AggregatedTool {
    /// Qualified name `<backend>.<rawName>`.
    #[serde(rename = "name")]
    pub qualified_name: String,
    /// Tool description for clients.
    pub description: String,
    /// Owning backend name.
    pub backend: String,
    /// Tool name local to the backend.
    #[serde(rename = "rawName")]
    pub raw_name: String,
    /// Opaque JSON input schema, when the backend provides one.
    #[serde(rename = "inputSchema", skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
}

/// Lightweight descriptor for context-economical listings.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSummary {
    /// Qualified name, or the bare name for internal tools.
    pub name: String,
    /// Tool description for clients.
    pub description: String,
}

/// Aggregated catalog keyed by qualified name.
pub type Catalog = BTreeMap<String, AggregatedTool>;

// ============================================================================
// SECTION: Qualified Names
// ============================================================================

/// Joins a backend name and raw tool name into a qualified name.
#[must_use]
pub fn qualify(backend: &str, raw_name: &str) -> String {
    format!("{backend}{NAMESPACE_SEPARATOR}{raw_name}")
}

/// Splits a qualified name at its single separator.
///
/// # Errors
///
/// Returns [`AggregatorError::ValidationError`] when the name does not
/// contain exactly one separator or either side is empty.
pub fn split_qualified(name: &str) -> Result<(&str, &str), AggregatorError> {
    if name.matches(NAMESPACE_SEPARATOR).count() != 1 {
        return Err(AggregatorError::validation(format!(
            "Tool name must be qualified as <server>{NAMESPACE_SEPARATOR}<tool>: {name}"
        )));
    }
    let (backend, raw_name) = name.split_once(NAMESPACE_SEPARATOR).ok_or_else(|| {
        AggregatorError::validation(format!(
            "Tool name must be qualified as <server>{NAMESPACE_SEPARATOR}<tool>: {name}"
        ))
    })?;
    if backend.is_empty() || raw_name.is_empty() {
        return Err(AggregatorError::validation(format!(
            "Tool name must be qualified as <server>{NAMESPACE_SEPARATOR}<tool>: {name}"
        )));
    }
    Ok((backend, raw_name))
}

impl AggregatedTool {
    /// Builds an aggregated descriptor from a backend's raw descriptor.
    #[must_use]
    pub fn from_raw(backend: &str, raw: RawToolDescriptor) -> Self {
        Self {
            qualified_name: qualify(backend, &raw.name),
            description: raw.description,
            backend: backend.to_string(),
            raw_name: raw.name,
            input_schema: raw.input_schema,
        }
    }

    /// Returns the lightweight summary for listings.
    #[must_use]
    pub fn summary(&self) -> ToolSummary {
        ToolSummary {
            name: self.qualified_name.clone(),
            description: self.description.clone(),
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn split_qualified_splits_single_separator() {
        let (backend, raw_name) = split_qualified("files.read").expect("valid name");
        assert_eq!(backend, "files");
        assert_eq!(raw_name, "read");
    }

    #[test]
    fn split_qualified_rejects_unqualified_names() {
        assert!(split_qualified("plain").is_err());
        assert!(split_qualified(".tool").is_err());
        assert!(split_qualified("server.").is_err());
    }

    #[test]
    fn split_qualified_rejects_multiple_separators() {
        let error = split_qualified("files.read.deep").expect_err("must reject");
        assert_eq!(error.code(), "VALIDATION_ERROR");
        assert!(split_qualified("a.b.c.d").is_err());
    }

    #[test]
    fn from_raw_preserves_schema_and_names() {
        let raw = RawToolDescriptor {
            name: "say".to_string(),
            description: "echoes text".to_string(),
            input_schema: Some(json!({"type": "object"})),
        };
        let tool = AggregatedTool::from_raw("echo", raw);
        assert_eq!(tool.qualified_name, "echo.say");
        assert_eq!(tool.raw_name, "say");
        assert_eq!(tool.backend, "echo");
        assert!(tool.input_schema.is_some());
    }

    #[test]
    fn summary_drops_schema() {
        let tool = AggregatedTool::from_raw(
            "echo",
            RawToolDescriptor {
                name: "say".to_string(),
                description: "echoes text".to_string(),
                input_schema: Some(json!({"type": "object"})),
            },
        );
        let payload = serde_json::to_value(tool.summary()).expect("serialize summary");
        assert_eq!(payload, json!({"name": "echo.say", "description": "echoes text"}));
    }
}
