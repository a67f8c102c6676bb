// search-mcp-core/src/manager.rs
// ============================================================================
// Module: Backend Manager
// Description: Owns the backend set and the aggregated tool catalog.
// Purpose: Fan out startup, rebuild the catalog, and route tool calls.
// Dependencies: serde, tokio
// ============================================================================

//! ## Overview
//! The backend manager registers enabled backends from configuration, starts
//! them in parallel, and aggregates their tools into the namespaced catalog.
//! A failing backend never aborts the others; its tools are simply absent.
//! The catalog is rebuilt into a fresh map and swapped atomically, so readers
//! never observe a partial state.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::RwLock;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock as AsyncRwLock;
use tokio::task::JoinSet;

use crate::catalog::AggregatedTool;
use crate::catalog::Catalog;
use crate::catalog::ToolSummary;
use crate::catalog::split_qualified;
use crate::client::BackendClient;
use crate::config::AggregatorConfig;
use crate::config::NAMESPACE_SEPARATOR;
use crate::error::AggregatorError;

// ============================================================================
// SECTION: Reports
// ============================================================================

/// One backend failure surfaced during startup or refresh.
#[derive(Debug, Clone, Serialize)]
pub struct BackendFailure {
    /// Backend name.
    pub backend: String,
    /// Failure description.
    pub error: String,
}

/// Outcome of a `start_all` fan-out.
#[derive(Debug, Clone, Serialize)]
pub struct StartReport {
    /// Backends that started and initialized.
    pub started: Vec<String>,
    /// Backends that failed to start; their tools are absent.
    pub failures: Vec<BackendFailure>,
}

/// Outcome of a catalog refresh.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    /// Tools present in the rebuilt catalog.
    pub total_tools: usize,
    /// Backends whose listing failed; their tools are absent.
    pub failures: Vec<BackendFailure>,
}

/// Aggregate statistics for the manager.
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStats {
    /// Enabled backends in the configuration.
    #[serde(rename = "totalServers")]
    pub total_servers: usize,
    /// Backends currently running.
    #[serde(rename = "runningServers")]
    pub running_servers: usize,
    /// Tools in the aggregated catalog.
    #[serde(rename = "totalTools")]
    pub total_tools: usize,
    /// Per-backend statistics.
    #[serde(rename = "perServer")]
    pub servers: Vec<ServerStats>,
}

/// Statistics for one configured backend.
#[derive(Debug, Clone, Serialize)]
pub struct ServerStats {
    /// Backend name.
    pub name: String,
    /// True when the backend client is running.
    pub running: bool,
    /// Tools this backend contributes to the catalog.
    #[serde(rename = "toolCount")]
    pub tool_count: usize,
}

// ============================================================================
// SECTION: Backend Manager
// ============================================================================

/// Registry of backend clients plus the aggregated catalog.
///
/// # Invariants
/// - The catalog maps every qualified name to exactly one backend.
/// - Catalog swaps are atomic relative to readers.
pub struct BackendManager {
    /// Loaded configuration; replaced by `load_config`.
    config: Mutex<AggregatorConfig>,
    /// Live backend clients keyed by name.
    clients: AsyncRwLock<BTreeMap<String, Arc<BackendClient>>>,
    /// Aggregated catalog snapshot.
    catalog: RwLock<Arc<Catalog>>,
}

impl Default for BackendManager {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendManager {
    /// Creates an empty manager with default timeouts.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: Mutex::new(AggregatorConfig::default()),
            clients: AsyncRwLock::new(BTreeMap::new()),
            catalog: RwLock::new(Arc::new(Catalog::new())),
        }
    }

    /// Creates a manager with a pre-built configuration.
    #[must_use]
    pub fn with_config(config: AggregatorConfig) -> Self {
        Self {
            config: Mutex::new(config),
            ..Self::new()
        }
    }

    /// Loads configuration from disk, replacing any previous registration.
    ///
    /// # Errors
    ///
    /// Returns [`AggregatorError::ConfigurationError`] when loading fails.
    pub fn load_config(&self, path: &Path) -> Result<usize, AggregatorError> {
        let loaded = AggregatorConfig::load(path)?;
        let enabled = loaded.enabled_backends().len();
        if let Ok(mut config) = self.config.lock() {
            *config = loaded;
        }
        Ok(enabled)
    }

    /// Starts all enabled backends in parallel and rebuilds the catalog.
    ///
    /// Individual failures are contained: they are reported but never abort
    /// the other backends.
    pub async fn start_all(&self) -> StartReport {
        let (backends, startup_timeout, request_timeout) = {
            let config = self.config.lock().map_or_else(
                |_| AggregatorConfig::default(),
                |config| config.clone(),
            );
            (
                config.enabled_backends().into_iter().cloned().collect::<Vec<_>>(),
                config.startup_timeout,
                config.request_timeout,
            )
        };

        let mut tasks = JoinSet::new();
        for backend in backends {
            tasks.spawn(async move {
                let name = backend.name.clone();
                let outcome = BackendClient::start(&backend, startup_timeout, request_timeout).await;
                (name, outcome)
            });
        }

        let mut started = Vec::new();
        let mut failures = Vec::new();
        let mut clients = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, Ok(client))) => {
                    started.push(name.clone());
                    clients.insert(name, client);
                }
                Ok((name, Err(err))) => failures.push(BackendFailure {
                    backend: name,
                    error: err.to_string(),
                }),
                Err(err) => failures.push(BackendFailure {
                    backend: "<join>".to_string(),
                    error: err.to_string(),
                }),
            }
        }
        started.sort();

        {
            let mut registry = self.clients.write().await;
            *registry = clients;
        }
        let refresh = self.refresh_tools().await;
        failures.extend(refresh.failures);
        StartReport {
            started,
            failures,
        }
    }

    /// Stops all backends in parallel and clears the catalog.
    pub async fn stop_all(&self) {
        let drained: Vec<Arc<BackendClient>> = {
            let mut registry = self.clients.write().await;
            std::mem::take(&mut *registry).into_values().collect()
        };
        let mut tasks = JoinSet::new();
        for client in drained {
            tasks.spawn(async move {
                client.stop().await;
            });
        }
        while tasks.join_next().await.is_some() {}
        self.swap_catalog(Catalog::new());
    }

    /// Re-queries every live backend and swaps in a fresh catalog.
    ///
    /// Raw tool names carrying the namespace separator would break the
    /// qualified-name invariant and are skipped, reported as failures.
    pub async fn refresh_tools(&self) -> RefreshReport {
        let clients: Vec<Arc<BackendClient>> =
            self.clients.read().await.values().map(Arc::clone).collect();
        let mut tasks = JoinSet::new();
        for client in clients {
            if !client.is_running() {
                continue;
            }
            tasks.spawn(async move {
                let name = client.name().to_string();
                let outcome = client.list_tools().await;
                (name, outcome)
            });
        }

        let mut catalog = Catalog::new();
        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, Ok(tools))) => {
                    for raw in tools {
                        if raw.name.contains(NAMESPACE_SEPARATOR) {
                            failures.push(BackendFailure {
                                backend: name.clone(),
                                error: format!(
                                    "tool '{}' skipped: name contains reserved separator \
                                     '{NAMESPACE_SEPARATOR}'",
                                    raw.name
                                ),
                            });
                            continue;
                        }
                        let tool = AggregatedTool::from_raw(&name, raw);
                        catalog.insert(tool.qualified_name.clone(), tool);
                    }
                }
                Ok((name, Err(err))) => failures.push(BackendFailure {
                    backend: name,
                    error: err.to_string(),
                }),
                Err(err) => failures.push(BackendFailure {
                    backend: "<join>".to_string(),
                    error: err.to_string(),
                }),
            }
        }
        let total_tools = catalog.len();
        self.swap_catalog(catalog);
        RefreshReport {
            total_tools,
            failures,
        }
    }

    /// Returns lightweight summaries for every aggregated tool.
    #[must_use]
    pub fn list_tools(&self) -> Vec<ToolSummary> {
        self.catalog_snapshot().values().map(AggregatedTool::summary).collect()
    }

    /// Returns full descriptors for every aggregated tool.
    #[must_use]
    pub fn list_tools_full(&self) -> Vec<AggregatedTool> {
        self.catalog_snapshot().values().cloned().collect()
    }

    /// Returns the current catalog snapshot.
    #[must_use]
    pub fn catalog_snapshot(&self) -> Arc<Catalog> {
        self.catalog
            .read()
            .map_or_else(|_| Arc::new(Catalog::new()), |catalog| Arc::clone(&catalog))
    }

    /// Routes a qualified tool call to its backend.
    ///
    /// # Errors
    ///
    /// Returns [`AggregatorError::ValidationError`] for unqualified names,
    /// [`AggregatorError::ToolNotFound`] for unknown backends, and
    /// [`AggregatorError::BackendUnavailable`] for stopped backends.
    pub async fn execute_tool(
        &self,
        qualified_name: &str,
        arguments: Value,
    ) -> Result<Value, AggregatorError> {
        let (backend, raw_name) = split_qualified(qualified_name)?;
        let client = {
            let registry = self.clients.read().await;
            registry.get(backend).map(Arc::clone)
        }
        .ok_or_else(|| AggregatorError::server_not_found(backend))?;
        if !client.is_running() {
            return Err(AggregatorError::backend_unavailable(backend));
        }
        client.call_tool(raw_name, arguments).await
    }

    /// Sends a ping to one backend by name.
    ///
    /// # Errors
    ///
    /// Returns [`AggregatorError`] when the backend is unknown, stopped, or
    /// unresponsive.
    pub async fn ping_backend(&self, backend: &str) -> Result<Value, AggregatorError> {
        let client = {
            let registry = self.clients.read().await;
            registry.get(backend).map(Arc::clone)
        }
        .ok_or_else(|| AggregatorError::server_not_found(backend))?;
        if !client.is_running() {
            return Err(AggregatorError::backend_unavailable(backend));
        }
        client.ping().await
    }

    /// Returns aggregate and per-backend statistics.
    pub async fn stats(&self) -> ManagerStats {
        let configured: Vec<String> = {
            self.config.lock().map_or_else(
                |_| Vec::new(),
                |config| {
                    config.enabled_backends().iter().map(|backend| backend.name.clone()).collect()
                },
            )
        };
        let registry = self.clients.read().await;
        let catalog = self.catalog_snapshot();
        let mut servers = Vec::with_capacity(configured.len());
        let mut running_servers = 0;
        for name in &configured {
            let running = registry.get(name).is_some_and(|client| client.is_running());
            if running {
                running_servers += 1;
            }
            let tool_count = catalog.values().filter(|tool| tool.backend == *name).count();
            servers.push(ServerStats {
                name: name.clone(),
                running,
                tool_count,
            });
        }
        ManagerStats {
            total_servers: configured.len(),
            running_servers,
            total_tools: catalog.len(),
            servers,
        }
    }

    /// Replaces the catalog snapshot in one swap.
    fn swap_catalog(&self, catalog: Catalog) {
        if let Ok(mut current) = self.catalog.write() {
            *current = Arc::new(catalog);
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
