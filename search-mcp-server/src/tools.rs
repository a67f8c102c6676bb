// search-mcp-server/src/tools.rs
// ============================================================================
// Module: Tool Router
// Description: Request pipeline and internal tool adapters.
// Purpose: Route every tool call through rate limiting, auth, validation,
//          dispatch, and audit.
// Dependencies: search-mcp-core, serde_json, sysinfo, tokio
// ============================================================================

//! ## Overview
//! The tool router is the single path every `tools/call` takes: authenticate,
//! rate-check, authorize, validate, then dispatch either to an in-process
//! adapter or through the backend manager. Internal adapters read aggregator
//! state but never mutate backend processes. Every outcome is audited.
//!
//! ## Invariants
//! - Pipeline gates short-circuit on the first failure.
//! - Internal tools present the same listing surface as aggregated tools.
//! - Backend results pass through verbatim; internal results are wrapped in
//!   a text content envelope.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use sysinfo::System;
use tokio::task::JoinSet;
use tokio::time;

use search_mcp_core::AggregatorError;
use search_mcp_core::BackendManager;
use search_mcp_core::ParamSpec;
use search_mcp_core::ParamType;
use search_mcp_core::SearchField;
use search_mcp_core::SearchMode;
use search_mcp_core::SearchOptions;
use search_mcp_core::ToolSummary;
use search_mcp_core::search_catalog;
use search_mcp_core::validate::validate_or_reject;

use crate::audit::AuditActor;
use crate::audit::AuditErrorInfo;
use crate::audit::AuditEventType;
use crate::audit::AuditLevel;
use crate::audit::AuditLogger;
use crate::audit::AuditQuery;
use crate::audit::AuditRecord;
use crate::audit::AuditResource;
use crate::audit::AuditResult;
use crate::auth::AuthContext;
use crate::auth::AuthManager;
use crate::rate_limit::RateLimiter;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default batch width for `execute_parallel`.
const DEFAULT_MAX_CONCURRENCY: usize = 10;
/// Default per-item timeout for `execute_parallel`, in milliseconds.
const DEFAULT_PARALLEL_TIMEOUT_MS: u64 = 30_000;

// ============================================================================
// SECTION: Internal Tools
// ============================================================================

/// In-process tools registered alongside the aggregated catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InternalTool {
    /// Scored text search over the catalog.
    SearchTools,
    /// Search restricted to one backend.
    AdvancedSearch,
    /// Backend statistics.
    ListServers,
    /// Aggregated health report.
    HealthCheck,
    /// Ring-buffer audit query.
    QueryAuditLogs,
    /// Audit aggregation.
    GetAuditStats,
    /// Rate limiter snapshot.
    GetRateLimitStats,
    /// Catalog re-query across live backends.
    RefreshTools,
    /// Batched backend tool execution.
    ExecuteParallel,
}

impl InternalTool {
    /// Every internal tool, in listing order.
    pub const ALL: [Self; 9] = [
        Self::SearchTools,
        Self::AdvancedSearch,
        Self::ListServers,
        Self::HealthCheck,
        Self::QueryAuditLogs,
        Self::GetAuditStats,
        Self::GetRateLimitStats,
        Self::RefreshTools,
        Self::ExecuteParallel,
    ];

    /// Parses a tool name into an internal tool.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.name() == name)
    }

    /// Returns the tool name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::SearchTools => "search_tools",
            Self::AdvancedSearch => "advanced_search",
            Self::ListServers => "list_servers",
            Self::HealthCheck => "health_check",
            Self::QueryAuditLogs => "query_audit_logs",
            Self::GetAuditStats => "get_audit_stats",
            Self::GetRateLimitStats => "get_rate_limit_stats",
            Self::RefreshTools => "refresh_tools",
            Self::ExecuteParallel => "execute_parallel",
        }
    }

    /// Returns the listing description.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::SearchTools => "Search the aggregated tool catalog by name or description",
            Self::AdvancedSearch => "Search the catalog within a single MCP server",
            Self::ListServers => "List configured MCP servers with running state and tool counts",
            Self::HealthCheck => "Report aggregator health across backends and subsystems",
            Self::QueryAuditLogs => "Query recent audit events from the in-memory buffer",
            Self::GetAuditStats => "Aggregate audit event counts and durations",
            Self::GetRateLimitStats => "Report rate limiter buckets and tier configuration",
            Self::RefreshTools => "Re-query live backends and rebuild the tool catalog",
            Self::ExecuteParallel => "Execute multiple backend tools in bounded batches",
        }
    }

    /// Returns the parameter constraint set for validation and listings.
    #[must_use]
    pub fn parameters(self) -> Vec<ParamSpec> {
        match self {
            Self::SearchTools => vec![
                ParamSpec::required("query", ParamType::String, "search text; empty lists all"),
                ParamSpec::optional("mode", ParamType::String, "match mode")
                    .with_enum(&["partial", "prefix", "exact", "fuzzy"])
                    .with_default(json!("partial")),
                ParamSpec::optional("caseSensitive", ParamType::Boolean, "match case exactly"),
                ParamSpec::optional("searchFields", ParamType::Array, "fields to score"),
                ParamSpec::optional(
                    "includeSchema",
                    ParamType::Boolean,
                    "attach input schemas to hits",
                ),
                ParamSpec::optional("limit", ParamType::Number, "page size")
                    .with_range(1.0, 500.0)
                    .with_default(json!(50)),
                ParamSpec::optional("offset", ParamType::Number, "entries to skip")
                    .with_range(0.0, 100_000.0)
                    .with_default(json!(0)),
            ],
            Self::AdvancedSearch => vec![
                ParamSpec::optional("query", ParamType::String, "search text; empty lists all"),
                ParamSpec::optional("serverName", ParamType::String, "restrict to one server"),
                ParamSpec::optional(
                    "includeSchema",
                    ParamType::Boolean,
                    "attach input schemas to hits",
                ),
                ParamSpec::optional("limit", ParamType::Number, "page size")
                    .with_range(1.0, 500.0)
                    .with_default(json!(50)),
                ParamSpec::optional("offset", ParamType::Number, "entries to skip")
                    .with_range(0.0, 100_000.0)
                    .with_default(json!(0)),
            ],
            Self::ListServers | Self::GetRateLimitStats | Self::RefreshTools => Vec::new(),
            Self::HealthCheck => vec![ParamSpec::optional(
                "detailed",
                ParamType::Boolean,
                "probe each backend with a ping",
            )],
            Self::QueryAuditLogs => vec![
                ParamSpec::optional("startDate", ParamType::String, "inclusive RFC-3339 floor"),
                ParamSpec::optional("endDate", ParamType::String, "inclusive RFC-3339 ceiling"),
                ParamSpec::optional("type", ParamType::String, "event type").with_enum(&[
                    "authentication",
                    "authorization",
                    "tool_execution",
                    "rate_limit",
                    "configuration",
                    "system",
                ]),
                ParamSpec::optional("level", ParamType::String, "severity")
                    .with_enum(&["info", "warn", "error", "critical"]),
                ParamSpec::optional("actorId", ParamType::String, "actor identifier"),
                ParamSpec::optional("action", ParamType::String, "action label"),
                ParamSpec::optional("result", ParamType::String, "outcome")
                    .with_enum(&["success", "failure"]),
                ParamSpec::optional("limit", ParamType::Number, "page size")
                    .with_range(1.0, 1000.0)
                    .with_default(json!(100)),
                ParamSpec::optional("offset", ParamType::Number, "entries to skip")
                    .with_range(0.0, 100_000.0)
                    .with_default(json!(0)),
            ],
            Self::GetAuditStats => vec![
                ParamSpec::optional("timeWindowMs", ParamType::Number, "window in milliseconds")
                    .with_range(1.0, 90.0 * 24.0 * 3_600_000.0),
            ],
            Self::ExecuteParallel => vec![
                ParamSpec::required(
                    "requests",
                    ParamType::Array,
                    "items of {id?, tool, arguments?}",
                ),
                ParamSpec::optional("maxConcurrency", ParamType::Number, "batch width")
                    .with_range(1.0, 100.0)
                    .with_default(json!(10)),
                ParamSpec::optional("timeout", ParamType::Number, "per-item timeout in ms")
                    .with_range(1.0, 600_000.0)
                    .with_default(json!(30_000)),
                ParamSpec::optional(
                    "continueOnError",
                    ParamType::Boolean,
                    "keep scheduling after a failure",
                )
                .with_default(json!(true)),
            ],
        }
    }

    /// Returns the lightweight listing entry.
    #[must_use]
    pub fn summary(self) -> ToolSummary {
        ToolSummary {
            name: self.name().to_string(),
            description: self.description().to_string(),
        }
    }
}

// ============================================================================
// SECTION: Router
// ============================================================================

/// Collaborators injected into the tool router.
pub struct ToolRouterConfig {
    /// Backend manager owning the catalog.
    pub manager: Arc<BackendManager>,
    /// API-key validator.
    pub auth: Arc<AuthManager>,
    /// Token-bucket rate limiter.
    pub rate_limiter: Arc<RateLimiter>,
    /// Audit logger.
    pub audit: Arc<AuditLogger>,
}

/// Tool router: the single dispatch path for every tool call.
#[derive(Clone)]
pub struct ToolRouter {
    /// Backend manager owning the catalog.
    manager: Arc<BackendManager>,
    /// API-key validator.
    auth: Arc<AuthManager>,
    /// Token-bucket rate limiter.
    rate_limiter: Arc<RateLimiter>,
    /// Audit logger.
    audit: Arc<AuditLogger>,
}

impl ToolRouter {
    /// Builds a router from its collaborators.
    #[must_use]
    pub fn new(config: ToolRouterConfig) -> Self {
        Self {
            manager: config.manager,
            auth: config.auth,
            rate_limiter: config.rate_limiter,
            audit: config.audit,
        }
    }

    /// Returns the backend manager.
    #[must_use]
    pub fn manager(&self) -> &Arc<BackendManager> {
        &self.manager
    }

    /// Returns the audit logger.
    #[must_use]
    pub fn audit(&self) -> &Arc<AuditLogger> {
        &self.audit
    }

    /// Lists internal tools followed by the aggregated catalog.
    #[must_use]
    pub fn list_tools(&self) -> Vec<ToolSummary> {
        let mut tools: Vec<ToolSummary> =
            InternalTool::ALL.into_iter().map(InternalTool::summary).collect();
        tools.extend(self.manager.list_tools());
        tools
    }

    /// Runs the full pipeline for one tool call.
    ///
    /// # Errors
    ///
    /// Returns [`AggregatorError`] from whichever pipeline gate fails first,
    /// or from dispatch itself.
    pub async fn handle_tool_call(
        &self,
        name: &str,
        arguments: Value,
        api_key: Option<&str>,
    ) -> Result<Value, AggregatorError> {
        let started = Instant::now();
        if name.trim().is_empty() {
            return Err(AggregatorError::validation("Tool name is required"));
        }
        let arguments_map = arguments_object(&arguments)?;

        let auth_ctx = match self.auth.validate(api_key) {
            Ok(auth_ctx) => auth_ctx,
            Err(err) => {
                self.audit_gate_failure(AuditEventType::Authentication, name, None, &err);
                return Err(err);
            }
        };

        let decision = self.rate_limiter.check(auth_ctx.tier(), auth_ctx.identifier(), 1.0);
        if !decision.allowed {
            let retry_after = decision.retry_after_secs.unwrap_or(1);
            let err = AggregatorError::rate_limited(retry_after);
            self.audit_gate_failure(AuditEventType::RateLimit, name, Some(&auth_ctx), &err);
            return Err(err);
        }

        if self.auth.is_enabled() {
            let required = format!("tools:{name}");
            if !auth_ctx.has_permission(&required) {
                let err = AggregatorError::unauthorized(&required);
                self.audit_gate_failure(AuditEventType::Authorization, name, Some(&auth_ctx), &err);
                return Err(err);
            }
        }

        let outcome = match InternalTool::parse(name) {
            Some(tool) => self.dispatch_internal(tool, &arguments_map).await,
            None => self.manager.execute_tool(name, arguments.clone()).await,
        };
        self.audit_execution(name, &auth_ctx, &arguments_map, &outcome, started.elapsed());
        outcome
    }

    /// Validates and runs one internal adapter.
    async fn dispatch_internal(
        &self,
        tool: InternalTool,
        arguments: &Map<String, Value>,
    ) -> Result<Value, AggregatorError> {
        validate_or_reject(&tool.parameters(), arguments)?;
        let payload = match tool {
            InternalTool::SearchTools => self.run_search(arguments, None)?,
            InternalTool::AdvancedSearch => {
                let backend = arguments
                    .get("serverName")
                    .and_then(Value::as_str)
                    .map(ToString::to_string);
                self.run_search(arguments, backend)?
            }
            InternalTool::ListServers => serde_json::to_value(self.manager.stats().await)
                .unwrap_or(Value::Null),
            InternalTool::HealthCheck => {
                let detailed =
                    arguments.get("detailed").and_then(Value::as_bool).unwrap_or(false);
                serde_json::to_value(self.health_report(detailed).await).unwrap_or(Value::Null)
            }
            InternalTool::QueryAuditLogs => {
                let query: AuditQuery =
                    serde_json::from_value(Value::Object(arguments.clone())).map_err(|err| {
                        AggregatorError::validation(format!("Invalid audit query: {err}"))
                    })?;
                json!({"events": self.audit.query(&query)})
            }
            InternalTool::GetAuditStats => {
                let window = arguments.get("timeWindowMs").and_then(Value::as_u64);
                serde_json::to_value(self.audit.stats(window)).unwrap_or(Value::Null)
            }
            InternalTool::GetRateLimitStats => {
                serde_json::to_value(self.rate_limiter.stats()).unwrap_or(Value::Null)
            }
            InternalTool::RefreshTools => {
                serde_json::to_value(self.manager.refresh_tools().await).unwrap_or(Value::Null)
            }
            InternalTool::ExecuteParallel => self.run_parallel(arguments).await?,
        };
        text_envelope(&payload)
    }

    /// Runs catalog search for both search adapters.
    fn run_search(
        &self,
        arguments: &Map<String, Value>,
        backend: Option<String>,
    ) -> Result<Value, AggregatorError> {
        let query = arguments.get("query").and_then(Value::as_str).unwrap_or("");
        let mode = arguments
            .get("mode")
            .and_then(Value::as_str)
            .map_or(Ok(SearchMode::Partial), |mode| {
                serde_json::from_value(Value::String(mode.to_string()))
                    .map_err(|_| AggregatorError::validation(format!("Unknown search mode: {mode}")))
            })?;
        let fields = arguments
            .get("searchFields")
            .and_then(Value::as_array)
            .map(|fields| {
                fields
                    .iter()
                    .filter_map(|field| {
                        serde_json::from_value::<SearchField>(field.clone()).ok()
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        let options = SearchOptions {
            mode,
            case_sensitive: arguments
                .get("caseSensitive")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            fields,
            backend,
            include_schema: arguments
                .get("includeSchema")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            limit: arguments
                .get("limit")
                .and_then(Value::as_u64)
                .map_or(50, |limit| limit as usize),
            offset: arguments
                .get("offset")
                .and_then(Value::as_u64)
                .map_or(0, |offset| offset as usize),
        };
        let catalog = self.manager.catalog_snapshot();
        serde_json::to_value(search_catalog(&catalog, query, &options))
            .map_err(|_| AggregatorError::validation("search result serialization failed"))
    }

    /// Builds the aggregated health report.
    async fn health_report(&self, detailed: bool) -> HealthReport {
        let stats = self.manager.stats().await;
        let mut checks = Vec::new();

        let backend_status = if stats.total_servers == 0 || stats.running_servers == stats.total_servers
        {
            HealthStatus::Healthy
        } else if stats.running_servers == 0 {
            HealthStatus::Unhealthy
        } else {
            HealthStatus::Degraded
        };
        checks.push(HealthCheckEntry {
            name: "backends".to_string(),
            status: backend_status,
            details: json!({
                "totalServers": stats.total_servers,
                "runningServers": stats.running_servers,
                "totalTools": stats.total_tools,
            }),
        });

        let audit_stats = self.audit.stats(None);
        checks.push(HealthCheckEntry {
            name: "audit".to_string(),
            status: HealthStatus::Healthy,
            details: serde_json::to_value(&audit_stats).unwrap_or(Value::Null),
        });

        let limiter_stats = self.rate_limiter.stats();
        checks.push(HealthCheckEntry {
            name: "rate_limiter".to_string(),
            status: HealthStatus::Healthy,
            details: json!({"totalBuckets": limiter_stats.total_buckets}),
        });

        let mut sys = System::new_all();
        sys.refresh_memory();
        checks.push(HealthCheckEntry {
            name: "memory".to_string(),
            status: HealthStatus::Healthy,
            details: json!({
                "totalBytes": sys.total_memory(),
                "availableBytes": sys.available_memory(),
            }),
        });

        if detailed {
            for server in &stats.servers {
                let status = if server.running
                    && self.manager.ping_backend(&server.name).await.is_ok()
                {
                    HealthStatus::Healthy
                } else {
                    HealthStatus::Degraded
                };
                checks.push(HealthCheckEntry {
                    name: format!("backend:{}", server.name),
                    status,
                    details: json!({"toolCount": server.tool_count}),
                });
            }
        }

        let status = checks.iter().map(|check| check.status).max().unwrap_or(HealthStatus::Healthy);
        HealthReport {
            status,
            checks,
        }
    }

    /// Runs the batched parallel executor.
    async fn run_parallel(
        &self,
        arguments: &Map<String, Value>,
    ) -> Result<Value, AggregatorError> {
        let requests: Vec<ParallelRequest> = arguments
            .get("requests")
            .cloned()
            .map_or(Ok(Vec::new()), serde_json::from_value)
            .map_err(|err| {
                AggregatorError::validation(format!("Invalid parallel request list: {err}"))
            })?;
        let max_concurrency = arguments
            .get("maxConcurrency")
            .and_then(Value::as_u64)
            .map_or(DEFAULT_MAX_CONCURRENCY, |width| width.max(1) as usize);
        let timeout = Duration::from_millis(
            arguments
                .get("timeout")
                .and_then(Value::as_u64)
                .unwrap_or(DEFAULT_PARALLEL_TIMEOUT_MS),
        );
        let continue_on_error =
            arguments.get("continueOnError").and_then(Value::as_bool).unwrap_or(true);

        let mut results = Vec::with_capacity(requests.len());
        if continue_on_error {
            for batch in requests.chunks(max_concurrency) {
                let mut tasks = JoinSet::new();
                for (index, request) in batch.iter().cloned().enumerate() {
                    let manager = Arc::clone(&self.manager);
                    tasks.spawn(async move {
                        (index, run_parallel_item(&manager, request, timeout).await)
                    });
                }
                let mut batch_results: Vec<(usize, ParallelResult)> = Vec::new();
                while let Some(joined) = tasks.join_next().await {
                    if let Ok(entry) = joined {
                        batch_results.push(entry);
                    }
                }
                batch_results.sort_by_key(|(index, _)| *index);
                results.extend(batch_results.into_iter().map(|(_, result)| result));
            }
        } else {
            for request in requests {
                let result = run_parallel_item(&self.manager, request, timeout).await;
                let failed = !result.success;
                results.push(result);
                if failed {
                    break;
                }
            }
        }
        Ok(json!({"results": results}))
    }

    /// Audits a pipeline gate failure.
    fn audit_gate_failure(
        &self,
        event_type: AuditEventType,
        tool: &str,
        auth_ctx: Option<&AuthContext>,
        error: &AggregatorError,
    ) {
        let actor = auth_ctx.map_or_else(AuditActor::anonymous, |auth_ctx| {
            auth_ctx
                .api_key_id
                .as_deref()
                .map_or_else(AuditActor::anonymous, AuditActor::api_key)
        });
        let mut record = AuditRecord::new(
            event_type,
            AuditLevel::Warn,
            actor,
            "tools/call",
            AuditResult::Failure,
        );
        record.resource = Some(AuditResource {
            resource_type: "tool".to_string(),
            id: tool.to_string(),
            name: None,
        });
        record.details = Some(error.details().clone());
        record.error = Some(AuditErrorInfo {
            message: error.to_string(),
            code: Some(error.code().to_string()),
            stack: None,
        });
        self.audit.record(record);
    }

    /// Audits the terminal outcome of a dispatched call.
    fn audit_execution(
        &self,
        tool: &str,
        auth_ctx: &AuthContext,
        arguments: &Map<String, Value>,
        outcome: &Result<Value, AggregatorError>,
        elapsed: Duration,
    ) {
        let actor = auth_ctx
            .api_key_id
            .as_deref()
            .map_or_else(AuditActor::anonymous, AuditActor::api_key);
        let (level, result) = match outcome {
            Ok(_) => (AuditLevel::Info, AuditResult::Success),
            Err(_) => (AuditLevel::Error, AuditResult::Failure),
        };
        let mut record =
            AuditRecord::new(AuditEventType::ToolExecution, level, actor, "tools/call", result);
        record.resource = Some(AuditResource {
            resource_type: "tool".to_string(),
            id: tool.to_string(),
            name: None,
        });
        let mut details = Map::new();
        details.insert("tool".to_string(), json!(tool));
        details.insert("parameters".to_string(), Value::Object(arguments.clone()));
        record.details = Some(details);
        record.duration_ms = Some(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX));
        if let Err(error) = outcome {
            record.error = Some(AuditErrorInfo {
                message: error.to_string(),
                code: Some(error.code().to_string()),
                stack: None,
            });
        }
        self.audit.record(record);
    }
}

// ============================================================================
// SECTION: Parallel Execution
// ============================================================================

/// One item in an `execute_parallel` batch.
#[derive(Debug, Clone, Deserialize)]
struct ParallelRequest {
    /// Caller-supplied correlation id.
    #[serde(default)]
    id: Option<String>,
    /// Qualified tool name.
    tool: String,
    /// Tool arguments; defaults to an empty object.
    #[serde(default = "empty_object")]
    arguments: Value,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// One entry in an `execute_parallel` result list.
#[derive(Debug, Clone, Serialize)]
struct ParallelResult {
    /// Caller-supplied correlation id, echoed back.
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    /// Qualified tool name.
    #[serde(rename = "toolName")]
    tool_name: String,
    /// Whether the item succeeded.
    success: bool,
    /// Backend result on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    /// Error message on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    /// Item wall-clock time in milliseconds.
    #[serde(rename = "executionTime")]
    execution_time_ms: u64,
}

/// Runs one parallel item with its own timeout.
async fn run_parallel_item(
    manager: &Arc<BackendManager>,
    request: ParallelRequest,
    timeout: Duration,
) -> ParallelResult {
    let started = Instant::now();
    let outcome = match time::timeout(
        timeout,
        manager.execute_tool(&request.tool, request.arguments.clone()),
    )
    .await
    {
        Ok(outcome) => outcome,
        Err(_) => Err(AggregatorError::backend_timeout(
            &request.tool,
            "tools/call",
            u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        )),
    };
    let execution_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    match outcome {
        Ok(result) => ParallelResult {
            id: request.id,
            tool_name: request.tool,
            success: true,
            result: Some(result),
            error: None,
            execution_time_ms,
        },
        Err(error) => ParallelResult {
            id: request.id,
            tool_name: request.tool,
            success: false,
            result: None,
            error: Some(error.to_string()),
            execution_time_ms,
        },
    }
}

// ============================================================================
// SECTION: Health Shapes
// ============================================================================

/// Health classification; the aggregate is the worst sub-check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All checks pass.
    Healthy,
    /// At least one check warns.
    Degraded,
    /// At least one check fails.
    Unhealthy,
}

/// One named sub-check in a health report.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckEntry {
    /// Check name.
    pub name: String,
    /// Check status.
    pub status: HealthStatus,
    /// Check-specific detail payload.
    pub details: Value,
}

/// Aggregated health report.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Worst status across checks.
    pub status: HealthStatus,
    /// Individual sub-checks.
    pub checks: Vec<HealthCheckEntry>,
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Coerces tool arguments into an object map.
fn arguments_object(arguments: &Value) -> Result<Map<String, Value>, AggregatorError> {
    match arguments {
        Value::Object(map) => Ok(map.clone()),
        Value::Null => Ok(Map::new()),
        _ => Err(AggregatorError::validation("Tool arguments must be an object")),
    }
}

/// Wraps an internal tool payload in a text content envelope.
fn text_envelope(payload: &Value) -> Result<Value, AggregatorError> {
    let text = serde_json::to_string(payload)
        .map_err(|_| AggregatorError::validation("tool result serialization failed"))?;
    Ok(json!({
        "content": [{"type": "text", "text": text}],
    }))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
