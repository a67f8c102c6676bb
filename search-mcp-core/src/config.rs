// search-mcp-core/src/config.rs
// ============================================================================
// Module: Aggregator Configuration
// Description: Configuration loading and validation for backend MCP servers.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Backend configuration is loaded from a JSON file whose shape is a superset
//! of common MCP client configurations, so users can paste the same
//! `mcpServers` block they already have. Unknown fields are ignored; invalid
//! entries fail closed. `${VAR}` references inside `env` values are expanded
//! against the aggregator's environment at load time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::error::AggregatorError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "MCP_CONFIG_PATH";
/// Default configuration path when no override is set.
pub const DEFAULT_CONFIG_PATH: &str = "./config/mcp-servers.json";
/// Maximum configuration file size in bytes.
pub const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;
/// Reserved namespace separator; backend names must not contain it.
pub const NAMESPACE_SEPARATOR: char = '.';
/// Default per-request timeout for backend calls.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Default bound on backend spawn plus initialize.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read.
    #[error("config read failed for {path}: {reason}")]
    Io {
        /// Path that failed to load.
        path: String,
        /// Underlying I/O failure description.
        reason: String,
    },
    /// File exceeds the size limit.
    #[error("config file {path} exceeds size limit ({actual} > {limit})")]
    TooLarge {
        /// Path that failed to load.
        path: String,
        /// Observed size in bytes.
        actual: u64,
        /// Maximum allowed bytes.
        limit: u64,
    },
    /// File is not valid JSON of the expected shape.
    #[error("config parse failed for {path}: {reason}")]
    Parse {
        /// Path that failed to parse.
        path: String,
        /// Parser failure description.
        reason: String,
    },
    /// A backend entry violates a structural constraint.
    #[error("invalid backend '{name}': {reason}")]
    InvalidBackend {
        /// Backend name as written in the file.
        name: String,
        /// Constraint that was violated.
        reason: String,
    },
}

impl From<ConfigError> for AggregatorError {
    fn from(error: ConfigError) -> Self {
        Self::configuration(error.to_string())
    }
}

// ============================================================================
// SECTION: File Shapes
// ============================================================================

fn default_enabled() -> bool {
    true
}

/// On-disk backend entry under `mcpServers`.
#[derive(Debug, Clone, Deserialize)]
struct BackendConfigFile {
    command: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: BTreeMap<String, String>,
    #[serde(default = "default_enabled")]
    enabled: bool,
}

/// On-disk aggregator config file.
#[derive(Debug, Clone, Deserialize)]
struct ConfigFile {
    #[serde(rename = "mcpServers", default)]
    mcp_servers: BTreeMap<String, BackendConfigFile>,
}

// ============================================================================
// SECTION: Backend Config
// ============================================================================

/// Validated configuration for one backend MCP server.
///
/// # Invariants
/// - `name` is unique within the aggregator and never contains `.`.
/// - `env` values have `${VAR}` references already expanded.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Backend name, used as the namespace prefix.
    pub name: String,
    /// Executable to spawn.
    pub command: String,
    /// Ordered command arguments.
    pub args: Vec<String>,
    /// Environment merged over the inherited environment.
    pub env: BTreeMap<String, String>,
    /// Whether the backend participates in startup.
    pub enabled: bool,
}

/// Aggregator configuration: validated backends plus global timeouts.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Backends keyed by name.
    pub backends: BTreeMap<String, BackendConfig>,
    /// Per-request timeout for backend calls.
    pub request_timeout: Duration,
    /// Bound on backend spawn plus initialize.
    pub startup_timeout: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            backends: BTreeMap::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
        }
    }
}

impl AggregatorConfig {
    /// Resolves the config path from the environment or the default.
    #[must_use]
    pub fn resolve_path() -> PathBuf {
        env::var(CONFIG_ENV_VAR)
            .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
    }

    /// Loads and validates the configuration from disk.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file is unreadable, oversized,
    /// unparseable, or contains an invalid backend entry.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let metadata = fs::metadata(path).map_err(|err| ConfigError::Io {
            path: display.clone(),
            reason: err.to_string(),
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::TooLarge {
                path: display,
                actual: metadata.len(),
                limit: MAX_CONFIG_FILE_SIZE,
            });
        }
        let raw = fs::read_to_string(path).map_err(|err| ConfigError::Io {
            path: display.clone(),
            reason: err.to_string(),
        })?;
        let parsed: ConfigFile = serde_json::from_str(&raw).map_err(|err| ConfigError::Parse {
            path: display,
            reason: err.to_string(),
        })?;
        Self::from_file(parsed)
    }

    /// Builds a validated config from the parsed file shape.
    fn from_file(file: ConfigFile) -> Result<Self, ConfigError> {
        let mut backends = BTreeMap::new();
        for (name, entry) in file.mcp_servers {
            let backend = validate_backend(&name, entry)?;
            backends.insert(name, backend);
        }
        Ok(Self {
            backends,
            ..Self::default()
        })
    }

    /// Returns the enabled backends in name order.
    #[must_use]
    pub fn enabled_backends(&self) -> Vec<&BackendConfig> {
        self.backends.values().filter(|backend| backend.enabled).collect()
    }
}

/// Validates one backend entry and expands its environment values.
fn validate_backend(name: &str, entry: BackendConfigFile) -> Result<BackendConfig, ConfigError> {
    if name.trim().is_empty() {
        return Err(ConfigError::InvalidBackend {
            name: name.to_string(),
            reason: "name must be non-empty".to_string(),
        });
    }
    if name.contains(NAMESPACE_SEPARATOR) {
        return Err(ConfigError::InvalidBackend {
            name: name.to_string(),
            reason: format!("name must not contain '{NAMESPACE_SEPARATOR}'"),
        });
    }
    if entry.command.trim().is_empty() {
        return Err(ConfigError::InvalidBackend {
            name: name.to_string(),
            reason: "command must be non-empty".to_string(),
        });
    }
    let env = entry
        .env
        .into_iter()
        .map(|(key, value)| (key, expand_env(&value, |var| env::var(var).ok())))
        .collect();
    Ok(BackendConfig {
        name: name.to_string(),
        command: entry.command,
        args: entry.args,
        env,
        enabled: entry.enabled,
    })
}

// ============================================================================
// SECTION: Environment Expansion
// ============================================================================

/// Expands `${VAR}` references in a value using the given lookup.
///
/// References to unset variables are preserved literally so pasted client
/// configs keep working when the aggregator lacks a variable.
#[must_use]
pub fn expand_env(value: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 2..];
        if let Some(end) = tail.find('}') {
            let var = &tail[..end];
            match lookup(var) {
                Some(resolved) => out.push_str(&resolved),
                None => {
                    out.push_str("${");
                    out.push_str(var);
                    out.push('}');
                }
            }
            rest = &tail[end + 1..];
        } else {
            out.push_str("${");
            rest = tail;
        }
    }
    out.push_str(rest);
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Result<AggregatorConfig, ConfigError> {
        let file: ConfigFile = serde_json::from_str(raw).map_err(|err| ConfigError::Parse {
            path: "<inline>".to_string(),
            reason: err.to_string(),
        })?;
        AggregatorConfig::from_file(file)
    }

    #[test]
    fn load_accepts_client_config_superset() {
        let config = parse(
            r#"{
                "mcpServers": {
                    "echo": {
                        "command": "echo-server",
                        "args": ["--fast"],
                        "env": {"MODE": "test"},
                        "comment": "ignored by the aggregator"
                    }
                },
                "globalShortcut": "also ignored"
            }"#,
        )
        .expect("config should parse");
        let backend = config.backends.get("echo").expect("echo backend");
        assert_eq!(backend.command, "echo-server");
        assert_eq!(backend.args, vec!["--fast".to_string()]);
        assert!(backend.enabled);
    }

    #[test]
    fn load_rejects_name_with_separator() {
        let result = parse(r#"{"mcpServers": {"a.b": {"command": "x"}}}"#);
        assert!(matches!(result, Err(ConfigError::InvalidBackend { .. })));
    }

    #[test]
    fn load_rejects_empty_command() {
        let result = parse(r#"{"mcpServers": {"a": {"command": "  "}}}"#);
        assert!(matches!(result, Err(ConfigError::InvalidBackend { .. })));
    }

    #[test]
    fn disabled_backend_is_kept_but_filtered() {
        let config = parse(
            r#"{"mcpServers": {
                "on": {"command": "x"},
                "off": {"command": "y", "enabled": false}
            }}"#,
        )
        .expect("config should parse");
        assert_eq!(config.backends.len(), 2);
        let enabled: Vec<&str> =
            config.enabled_backends().iter().map(|backend| backend.name.as_str()).collect();
        assert_eq!(enabled, vec!["on"]);
    }

    #[test]
    fn expand_env_replaces_known_variables() {
        let expanded = expand_env("prefix-${HOME_DIR}-suffix", |var| {
            (var == "HOME_DIR").then(|| "/home/u".to_string())
        });
        assert_eq!(expanded, "prefix-/home/u-suffix");
    }

    #[test]
    fn expand_env_preserves_unknown_variables() {
        let expanded = expand_env("${MISSING}/bin", |_| None);
        assert_eq!(expanded, "${MISSING}/bin");
    }

    #[test]
    fn expand_env_handles_multiple_and_unterminated_references() {
        let expanded = expand_env("${A}:${B}:${unterminated", |var| match var {
            "A" => Some("1".to_string()),
            "B" => Some("2".to_string()),
            _ => None,
        });
        assert_eq!(expanded, "1:2:${unterminated");
    }

    #[test]
    fn resolve_path_defaults_without_override() {
        if env::var(CONFIG_ENV_VAR).is_err() {
            assert_eq!(AggregatorConfig::resolve_path(), PathBuf::from(DEFAULT_CONFIG_PATH));
        }
    }
}
