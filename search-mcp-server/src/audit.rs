// search-mcp-server/src/audit.rs
// ============================================================================
// Module: Audit Logging
// Description: Structured, redacted audit events with ring and file sinks.
// Purpose: Record every request outcome without ever blocking the caller.
// Dependencies: chrono, serde, serde_json
// ============================================================================

//! ## Overview
//! Audit events are structured records written to two sinks: an in-memory
//! ring buffer that backs the query API, and an append-only JSON-lines file.
//! Sensitive keys in event details are redacted before either sink sees the
//! event. File failures degrade to stderr; they never fail the caller path
//! that produced the event.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::fs::File;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::DateTime;
use chrono::SecondsFormat;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Replacement literal for redacted values.
pub const REDACTED: &str = "***REDACTED***";
/// Key substrings whose values are always redacted.
const SENSITIVE_KEY_FRAGMENTS: [&str; 5] = ["password", "secret", "token", "apikey", "api_key"];
/// Maximum events retained in the ring buffer.
pub const DEFAULT_RING_CAPACITY: usize = 10_000;
/// Default retention window for ring-buffer cleanup.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(90 * 24 * 60 * 60);
/// Default page size for audit queries.
pub const DEFAULT_QUERY_LIMIT: usize = 100;

// ============================================================================
// SECTION: Event Shape
// ============================================================================

/// Audit event classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// API-key validation outcomes.
    Authentication,
    /// Permission check outcomes.
    Authorization,
    /// Tool dispatch outcomes.
    ToolExecution,
    /// Rate-limit denials.
    RateLimit,
    /// Configuration changes.
    Configuration,
    /// Aggregator lifecycle and internal failures.
    System,
}

impl AuditEventType {
    /// Returns the snake_case label used in stats maps.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::Authorization => "authorization",
            Self::ToolExecution => "tool_execution",
            Self::RateLimit => "rate_limit",
            Self::Configuration => "configuration",
            Self::System => "system",
        }
    }
}

/// Audit severity, ordered `info < warn < error < critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditLevel {
    /// Routine events.
    Info,
    /// Degraded but recoverable situations.
    Warn,
    /// Request-scoped failures.
    Error,
    /// Aggregator-threatening failures.
    Critical,
}

impl AuditLevel {
    /// Returns the lowercase label used in stats maps.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

/// Event outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditResult {
    /// The audited action succeeded.
    Success,
    /// The audited action failed.
    Failure,
}

impl AuditResult {
    /// Returns the lowercase label used in stats maps.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

/// Acting identity attached to an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditActor {
    /// Actor identifier; `anonymous` when unauthenticated.
    pub id: String,
    /// Actor kind, e.g. `api_key` or `system`.
    #[serde(rename = "type")]
    pub actor_type: String,
    /// Display name when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl AuditActor {
    /// Builds the anonymous actor.
    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            id: "anonymous".to_string(),
            actor_type: "anonymous".to_string(),
            name: None,
        }
    }

    /// Builds the aggregator's own system actor.
    #[must_use]
    pub fn system() -> Self {
        Self {
            id: "aggregator".to_string(),
            actor_type: "system".to_string(),
            name: None,
        }
    }

    /// Builds an API-key actor.
    #[must_use]
    pub fn api_key(id: &str) -> Self {
        Self {
            id: id.to_string(),
            actor_type: "api_key".to_string(),
            name: None,
        }
    }
}

/// Resource an event acted on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditResource {
    /// Resource kind, e.g. `tool` or `server`.
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Resource identifier.
    pub id: String,
    /// Display name when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Error attachment for failure events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditErrorInfo {
    /// Error message.
    pub message: String,
    /// Stable error code when available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Stack trace; never populated on the client surface.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

/// One accepted, redacted audit event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Monotonically unique event id.
    pub id: u64,
    /// RFC-3339 timestamp.
    pub timestamp: String,
    /// Event classification.
    #[serde(rename = "type")]
    pub event_type: AuditEventType,
    /// Event severity.
    pub level: AuditLevel,
    /// Acting identity.
    pub actor: AuditActor,
    /// Action label, e.g. `tools/call`.
    pub action: String,
    /// Resource acted on, when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<AuditResource>,
    /// Event outcome.
    pub result: AuditResult,
    /// Redacted structured details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Map<String, Value>>,
    /// Duration in milliseconds, when measured.
    #[serde(rename = "duration", skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Error attachment for failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<AuditErrorInfo>,
    /// Free-form metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

/// Event payload before the logger assigns id and timestamp.
#[derive(Debug, Clone)]
pub struct AuditRecord {
    /// Event classification.
    pub event_type: AuditEventType,
    /// Event severity.
    pub level: AuditLevel,
    /// Acting identity.
    pub actor: AuditActor,
    /// Action label.
    pub action: String,
    /// Resource acted on, when applicable.
    pub resource: Option<AuditResource>,
    /// Event outcome.
    pub result: AuditResult,
    /// Structured details; redacted before sinking.
    pub details: Option<Map<String, Value>>,
    /// Duration in milliseconds, when measured.
    pub duration_ms: Option<u64>,
    /// Error attachment for failures.
    pub error: Option<AuditErrorInfo>,
    /// Free-form metadata.
    pub metadata: Option<Map<String, Value>>,
}

impl AuditRecord {
    /// Builds a minimal record; callers fill optional fields directly.
    #[must_use]
    pub fn new(
        event_type: AuditEventType,
        level: AuditLevel,
        actor: AuditActor,
        action: &str,
        result: AuditResult,
    ) -> Self {
        Self {
            event_type,
            level,
            actor,
            action: action.to_string(),
            resource: None,
            result,
            details: None,
            duration_ms: None,
            error: None,
            metadata: None,
        }
    }
}

// ============================================================================
// SECTION: Query + Stats
// ============================================================================

/// Filter for ring-buffer queries. All fields are conjunctive.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditQuery {
    /// Inclusive RFC-3339 lower bound.
    #[serde(rename = "startDate")]
    pub start_date: Option<String>,
    /// Inclusive RFC-3339 upper bound.
    #[serde(rename = "endDate")]
    pub end_date: Option<String>,
    /// Event type filter.
    #[serde(rename = "type")]
    pub event_type: Option<AuditEventType>,
    /// Severity filter (exact match).
    pub level: Option<AuditLevel>,
    /// Actor id filter.
    #[serde(rename = "actorId")]
    pub actor_id: Option<String>,
    /// Action label filter.
    pub action: Option<String>,
    /// Outcome filter.
    pub result: Option<AuditResult>,
    /// Page size; defaults to [`DEFAULT_QUERY_LIMIT`].
    pub limit: Option<usize>,
    /// Entries skipped before the first returned event.
    pub offset: Option<usize>,
}

/// Aggregated statistics over retained events.
#[derive(Debug, Clone, Serialize)]
pub struct AuditStats {
    /// Events considered after windowing.
    pub total: usize,
    /// Counts grouped by event type.
    #[serde(rename = "byType")]
    pub by_type: BTreeMap<String, u64>,
    /// Counts grouped by severity.
    #[serde(rename = "byLevel")]
    pub by_level: BTreeMap<String, u64>,
    /// Counts grouped by outcome.
    #[serde(rename = "byResult")]
    pub by_result: BTreeMap<String, u64>,
    /// Mean duration over events that carry one.
    #[serde(rename = "averageDurationMs")]
    pub average_duration_ms: Option<f64>,
}

// ============================================================================
// SECTION: Logger
// ============================================================================

/// Audit logger configuration.
#[derive(Debug, Clone)]
pub struct AuditLoggerConfig {
    /// Minimum accepted severity.
    pub min_level: AuditLevel,
    /// Ring-buffer capacity.
    pub ring_capacity: usize,
    /// Retention window applied by `cleanup`.
    pub retention: Duration,
}

impl Default for AuditLoggerConfig {
    fn default() -> Self {
        Self {
            min_level: AuditLevel::Info,
            ring_capacity: DEFAULT_RING_CAPACITY,
            retention: DEFAULT_RETENTION,
        }
    }
}

/// Structured audit logger with ring and file sinks.
///
/// # Invariants
/// - Event ids are unique and increasing within the process lifetime.
/// - Both sinks receive every accepted event, already redacted.
pub struct AuditLogger {
    /// Logger configuration.
    config: AuditLoggerConfig,
    /// Next event id.
    next_id: AtomicU64,
    /// In-memory ring buffer of recent events.
    ring: Mutex<VecDeque<AuditEvent>>,
    /// Append-only JSON-lines file sink; `None` degrades to stderr.
    sink: Option<Mutex<File>>,
}

impl AuditLogger {
    /// Creates a logger without a file sink.
    #[must_use]
    pub fn in_memory(config: AuditLoggerConfig) -> Self {
        Self {
            config,
            next_id: AtomicU64::new(1),
            ring: Mutex::new(VecDeque::new()),
            sink: None,
        }
    }

    /// Creates a logger with an append-only file sink.
    ///
    /// A sink that cannot be opened degrades to stderr instead of failing.
    #[must_use]
    pub fn with_file(config: AuditLoggerConfig, path: &Path) -> Self {
        let sink = match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(Mutex::new(file)),
            Err(err) => {
                eprintln!("audit log open failed for {}: {err}", path.display());
                None
            }
        };
        Self {
            sink,
            ..Self::in_memory(config)
        }
    }

    /// Records an event if it passes the level filter.
    ///
    /// Returns the assigned event id, or `None` when filtered out.
    pub fn record(&self, record: AuditRecord) -> Option<u64> {
        if record.level < self.config.min_level {
            return None;
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let details = record.details.map(|mut details| {
            redact_details(&mut details);
            details
        });
        let event = AuditEvent {
            id,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            event_type: record.event_type,
            level: record.level,
            actor: record.actor,
            action: record.action,
            resource: record.resource,
            result: record.result,
            details,
            duration_ms: record.duration_ms,
            error: record.error,
            metadata: record.metadata,
        };
        self.sink_event(&event);
        if let Ok(mut ring) = self.ring.lock() {
            if ring.len() >= self.config.ring_capacity {
                ring.pop_front();
            }
            ring.push_back(event);
        }
        Some(id)
    }

    /// Returns matching events in insertion order after offset/limit.
    #[must_use]
    pub fn query(&self, query: &AuditQuery) -> Vec<AuditEvent> {
        let limit = query.limit.unwrap_or(DEFAULT_QUERY_LIMIT);
        let offset = query.offset.unwrap_or(0);
        let Ok(ring) = self.ring.lock() else {
            return Vec::new();
        };
        ring.iter()
            .filter(|event| matches_query(event, query))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Aggregates counts and mean duration over retained events.
    #[must_use]
    pub fn stats(&self, time_window_ms: Option<u64>) -> AuditStats {
        let cutoff = time_window_ms.map(|window| {
            Utc::now() - chrono::Duration::milliseconds(i64::try_from(window).unwrap_or(i64::MAX))
        });
        let Ok(ring) = self.ring.lock() else {
            return AuditStats {
                total: 0,
                by_type: BTreeMap::new(),
                by_level: BTreeMap::new(),
                by_result: BTreeMap::new(),
                average_duration_ms: None,
            };
        };
        let mut by_type = BTreeMap::new();
        let mut by_level = BTreeMap::new();
        let mut by_result = BTreeMap::new();
        let mut total = 0usize;
        let mut duration_sum = 0u64;
        let mut duration_count = 0u64;
        for event in ring.iter() {
            if let Some(cutoff) = cutoff
                && event_time(event).is_some_and(|time| time < cutoff)
            {
                continue;
            }
            total += 1;
            *by_type.entry(event.event_type.label().to_string()).or_insert(0u64) += 1;
            *by_level.entry(event.level.label().to_string()).or_insert(0u64) += 1;
            *by_result.entry(event.result.label().to_string()).or_insert(0u64) += 1;
            if let Some(duration) = event.duration_ms {
                duration_sum += duration;
                duration_count += 1;
            }
        }
        let average_duration_ms =
            (duration_count > 0).then(|| duration_sum as f64 / duration_count as f64);
        AuditStats {
            total,
            by_type,
            by_level,
            by_result,
            average_duration_ms,
        }
    }

    /// Discards ring-buffer events older than the retention window.
    ///
    /// The file sink is never truncated; rotation is an operator concern.
    pub fn cleanup(&self) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.config.retention)
                .unwrap_or_else(|_| chrono::Duration::days(90));
        self.cleanup_before(cutoff)
    }

    fn cleanup_before(&self, cutoff: DateTime<Utc>) -> usize {
        let Ok(mut ring) = self.ring.lock() else {
            return 0;
        };
        let before = ring.len();
        ring.retain(|event| event_time(event).is_none_or(|time| time >= cutoff));
        before - ring.len()
    }

    /// Writes one event line to the file sink, degrading to stderr.
    fn sink_event(&self, event: &AuditEvent) {
        let Ok(payload) = serde_json::to_string(event) else {
            return;
        };
        if let Some(sink) = &self.sink
            && let Ok(mut file) = sink.lock()
            && writeln!(file, "{payload}").is_ok()
        {
            let _ = file.flush();
            return;
        }
        eprintln!("{payload}");
    }
}

/// Parses an event timestamp back into UTC time.
fn event_time(event: &AuditEvent) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&event.timestamp).ok().map(|time| time.with_timezone(&Utc))
}

/// Applies every conjunctive filter in the query.
fn matches_query(event: &AuditEvent, query: &AuditQuery) -> bool {
    if let Some(event_type) = query.event_type
        && event.event_type != event_type
    {
        return false;
    }
    if let Some(level) = query.level
        && event.level != level
    {
        return false;
    }
    if let Some(actor_id) = &query.actor_id
        && event.actor.id != *actor_id
    {
        return false;
    }
    if let Some(action) = &query.action
        && event.action != *action
    {
        return false;
    }
    if let Some(result) = query.result
        && event.result != result
    {
        return false;
    }
    if let Some(start) = &query.start_date
        && let Ok(start) = DateTime::parse_from_rfc3339(start)
        && event_time(event).is_some_and(|time| time < start.with_timezone(&Utc))
    {
        return false;
    }
    if let Some(end) = &query.end_date
        && let Ok(end) = DateTime::parse_from_rfc3339(end)
        && event_time(event).is_some_and(|time| time > end.with_timezone(&Utc))
    {
        return false;
    }
    true
}

// ============================================================================
// SECTION: Redaction
// ============================================================================

/// Returns true when a key names sensitive material.
#[must_use]
pub fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    SENSITIVE_KEY_FRAGMENTS.iter().any(|fragment| lower.contains(fragment))
}

/// Redacts sensitive values in a details map, one nested level deep.
///
/// Configuration-change entries additionally redact `oldValue`/`newValue`
/// when the changed `key` itself names sensitive material.
pub fn redact_details(details: &mut Map<String, Value>) {
    let sensitive_change = details
        .get("key")
        .and_then(Value::as_str)
        .is_some_and(is_sensitive_key);
    for (key, value) in details.iter_mut() {
        if is_sensitive_key(key) {
            *value = Value::String(REDACTED.to_string());
            continue;
        }
        if sensitive_change && (key == "oldValue" || key == "newValue") {
            *value = Value::String(REDACTED.to_string());
            continue;
        }
        if let Value::Object(nested) = value {
            for (nested_key, nested_value) in nested.iter_mut() {
                if is_sensitive_key(nested_key) {
                    *nested_value = Value::String(REDACTED.to_string());
                }
            }
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
