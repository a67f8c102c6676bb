// search-mcp-core/src/client.rs
// ============================================================================
// Module: Backend Client
// Description: JSON-RPC multiplexer over one backend child process.
// Purpose: Own the MCP wire protocol with a single backend subprocess.
// Dependencies: serde_json, tokio
// ============================================================================

//! ## Overview
//! A backend client owns exactly one child process and is the sole speaker of
//! the wire protocol with it: line-delimited JSON-RPC over the child's stdio.
//! One writer and one reader task run independently; responses are correlated
//! back to callers through a pending-request table keyed by monotonically
//! assigned ids. Termination is absorbing: all outstanding waiters are
//! cancelled and a new client must be constructed to respawn the backend.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use serde_json::json;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::process::Child;
use tokio::process::ChildStderr;
use tokio::process::ChildStdin;
use tokio::process::ChildStdout;
use tokio::process::Command;
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::oneshot;
use tokio::time;

use crate::catalog::RawToolDescriptor;
use crate::catalog::ToolsListResponse;
use crate::config::BackendConfig;
use crate::error::AggregatorError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// JSON-RPC protocol version tag.
const JSONRPC_VERSION: &str = "2.0";
/// MCP protocol version announced to backends.
const MCP_PROTOCOL_VERSION: &str = "1.0.0";
/// Client identity announced in `initialize`.
const CLIENT_NAME: &str = "search-mcp";
/// Grace period before a stubborn child receives an OS kill.
const STOP_GRACE: Duration = Duration::from_secs(2);

// ============================================================================
// SECTION: Wire Shapes
// ============================================================================

/// Inbound JSON-RPC message from the backend.
#[derive(Debug, Deserialize)]
struct InboundMessage {
    /// Response id; absent for notifications.
    #[serde(default)]
    id: Option<Value>,
    /// Successful result payload.
    #[serde(default)]
    result: Option<Value>,
    /// Error payload when the request failed.
    #[serde(default)]
    error: Option<InboundError>,
    /// Method name; present on notifications and requests.
    #[serde(default)]
    method: Option<String>,
}

/// Inbound JSON-RPC error payload.
#[derive(Debug, Deserialize)]
struct InboundError {
    /// JSON-RPC error code.
    #[serde(default)]
    code: Option<i64>,
    /// Error message provided by the backend.
    #[serde(default)]
    message: String,
}

/// Completion channel for one pending request.
type Waiter = oneshot::Sender<Result<Value, AggregatorError>>;

/// Pending-request table shared between callers and the reader task.
type PendingTable = Arc<Mutex<HashMap<u64, Waiter>>>;

// ============================================================================
// SECTION: Backend Client
// ============================================================================

/// JSON-RPC client for one backend child process.
///
/// # Invariants
/// - Request ids are positive and strictly increasing per client.
/// - For any live id exactly one waiter exists in the pending table.
/// - Once `running` clears, it never sets again; respawn requires a new
///   client instance.
pub struct BackendClient {
    /// Backend name, used for namespacing and stderr tagging.
    name: String,
    /// Per-request timeout.
    request_timeout: Duration,
    /// Next request id.
    next_id: AtomicU64,
    /// True while the child process is believed alive.
    running: Arc<AtomicBool>,
    /// Waiters keyed by request id.
    pending: PendingTable,
    /// Child stdin writer; `None` once stopped.
    stdin: AsyncMutex<Option<ChildStdin>>,
    /// Child process handle; `None` once reaped.
    child: AsyncMutex<Option<Child>>,
}

impl BackendClient {
    /// Spawns the backend process and completes the MCP handshake.
    ///
    /// # Errors
    ///
    /// Returns [`AggregatorError::BackendUnavailable`] when the spawn fails,
    /// the child's streams are unavailable, or `initialize` does not complete
    /// within `startup_timeout`.
    pub async fn start(
        config: &BackendConfig,
        startup_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Arc<Self>, AggregatorError> {
        let mut command = Command::new(&config.command);
        command
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &config.env {
            command.env(key, value);
        }
        let mut child = command
            .spawn()
            .map_err(|err| AggregatorError::backend_startup(&config.name, &err.to_string()))?;
        let stdin = child.stdin.take().ok_or_else(|| {
            AggregatorError::backend_startup(&config.name, "child stdin unavailable")
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            AggregatorError::backend_startup(&config.name, "child stdout unavailable")
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            AggregatorError::backend_startup(&config.name, "child stderr unavailable")
        })?;

        let client = Arc::new(Self {
            name: config.name.clone(),
            request_timeout,
            next_id: AtomicU64::new(1),
            running: Arc::new(AtomicBool::new(true)),
            pending: Arc::new(Mutex::new(HashMap::new())),
            stdin: AsyncMutex::new(Some(stdin)),
            child: AsyncMutex::new(Some(child)),
        });

        tokio::spawn(read_loop(
            config.name.clone(),
            stdout,
            Arc::clone(&client.pending),
            Arc::clone(&client.running),
        ));
        tokio::spawn(forward_stderr(config.name.clone(), stderr));

        let handshake = client.request_with_timeout(
            "initialize",
            json!({
                "protocolVersion": MCP_PROTOCOL_VERSION,
                "capabilities": {"tools": {}},
                "clientInfo": {
                    "name": CLIENT_NAME,
                    "version": env!("CARGO_PKG_VERSION"),
                },
            }),
            startup_timeout,
        );
        if let Err(err) = handshake.await {
            client.stop().await;
            return Err(AggregatorError::backend_startup(&config.name, &err.to_string()));
        }
        Ok(client)
    }

    /// Returns the backend name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true while the child process is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Lists the backend's tools.
    ///
    /// # Errors
    ///
    /// Returns [`AggregatorError`] when the call fails or the payload is not
    /// a valid `tools/list` response.
    pub async fn list_tools(&self) -> Result<Vec<RawToolDescriptor>, AggregatorError> {
        let result = self.request("tools/list", json!({})).await?;
        let parsed: ToolsListResponse = serde_json::from_value(result).map_err(|err| {
            AggregatorError::backend_error(&self.name, None, &format!(
                "invalid tools/list payload: {err}"
            ))
        })?;
        Ok(parsed.tools)
    }

    /// Calls a backend tool by its unqualified name.
    ///
    /// # Errors
    ///
    /// Returns [`AggregatorError`] when the backend rejects or times out.
    pub async fn call_tool(
        &self,
        raw_name: &str,
        arguments: Value,
    ) -> Result<Value, AggregatorError> {
        self.request(
            "tools/call",
            json!({
                "name": raw_name,
                "arguments": arguments,
            }),
        )
        .await
    }

    /// Sends a protocol-level ping.
    ///
    /// # Errors
    ///
    /// Returns [`AggregatorError`] when the backend does not answer in time.
    pub async fn ping(&self) -> Result<Value, AggregatorError> {
        self.request("ping", json!({})).await
    }

    /// Stops the backend: closes stdin, reaps the child, cancels waiters.
    ///
    /// Idempotent; a second call finds nothing left to tear down.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        {
            let mut stdin = self.stdin.lock().await;
            *stdin = None;
        }
        let child = self.child.lock().await.take();
        if let Some(mut child) = child {
            if time::timeout(STOP_GRACE, child.wait()).await.is_err() {
                let _ = child.kill().await;
            }
        }
        fail_all_pending(&self.pending, || AggregatorError::client_stopped(&self.name));
    }

    /// Sends a request with the default per-request timeout.
    async fn request(&self, method: &str, params: Value) -> Result<Value, AggregatorError> {
        self.request_with_timeout(method, params, self.request_timeout).await
    }

    /// Sends a request and waits for the correlated response.
    async fn request_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, AggregatorError> {
        if !self.is_running() {
            return Err(AggregatorError::backend_unavailable(&self.name));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (sender, receiver) = oneshot::channel();
        if let Ok(mut pending) = self.pending.lock() {
            pending.insert(id, sender);
        } else {
            return Err(AggregatorError::backend_unavailable(&self.name));
        }

        let frame = json!({
            "jsonrpc": JSONRPC_VERSION,
            "id": id,
            "method": method,
            "params": params,
        });
        if let Err(err) = self.write_line(&frame).await {
            self.remove_waiter(id);
            return Err(err);
        }

        match time::timeout(timeout, receiver).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(AggregatorError::client_stopped(&self.name)),
            Err(_) => {
                self.remove_waiter(id);
                Err(AggregatorError::backend_timeout(
                    &self.name,
                    method,
                    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                ))
            }
        }
    }

    /// Writes one JSON-RPC frame as a single newline-terminated line.
    async fn write_line(&self, frame: &Value) -> Result<(), AggregatorError> {
        let mut payload = serde_json::to_vec(frame).map_err(|err| {
            AggregatorError::backend_error(&self.name, None, &format!(
                "jsonrpc serialization failed: {err}"
            ))
        })?;
        payload.push(b'\n');
        let mut stdin = self.stdin.lock().await;
        let Some(writer) = stdin.as_mut() else {
            return Err(AggregatorError::client_stopped(&self.name));
        };
        if writer.write_all(&payload).await.is_err() || writer.flush().await.is_err() {
            self.running.store(false, Ordering::SeqCst);
            return Err(AggregatorError::backend_unavailable(&self.name));
        }
        Ok(())
    }

    /// Removes a waiter so a late response for its id is dropped.
    fn remove_waiter(&self, id: u64) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(&id);
        }
    }
}

// ============================================================================
// SECTION: Reader Tasks
// ============================================================================

/// Drains the child's stdout, completing waiters line by line.
async fn read_loop(
    name: String,
    stdout: ChildStdout,
    pending: PendingTable,
    running: Arc<AtomicBool>,
) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => handle_line(&name, &line, &pending),
            Ok(None) | Err(_) => break,
        }
    }
    running.store(false, Ordering::SeqCst);
    fail_all_pending(&pending, || AggregatorError::backend_unavailable(&name));
}

/// Routes one inbound line to its waiter, or logs and discards it.
fn handle_line(name: &str, line: &str, pending: &PendingTable) {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return;
    }
    let inbound: InboundMessage = match serde_json::from_str(trimmed) {
        Ok(inbound) => inbound,
        Err(err) => {
            eprintln!("[{name}] unparseable jsonrpc line: {err}");
            return;
        }
    };
    let waiter = inbound
        .id
        .as_ref()
        .and_then(Value::as_u64)
        .and_then(|id| pending.lock().ok().and_then(|mut table| table.remove(&id)));
    match waiter {
        Some(waiter) => {
            let outcome = match inbound.error {
                Some(error) => {
                    Err(AggregatorError::backend_error(name, error.code, &error.message))
                }
                None => Ok(inbound.result.unwrap_or(Value::Null)),
            };
            let _ = waiter.send(outcome);
        }
        None => {
            if let Some(method) = inbound.method {
                eprintln!("[{name}] ignoring inbound message: {method}");
            }
        }
    }
}

/// Re-emits the child's stderr on the aggregator's stderr, tagged by name.
async fn forward_stderr(name: String, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        eprintln!("[{name}] {line}");
    }
}

/// Cancels every outstanding waiter with the supplied error.
fn fail_all_pending(pending: &PendingTable, make_error: impl Fn() -> AggregatorError) {
    let drained: Vec<Waiter> = pending
        .lock()
        .map(|mut table| table.drain().map(|(_, waiter)| waiter).collect())
        .unwrap_or_default();
    for waiter in drained {
        let _ = waiter.send(Err(make_error()));
    }
}
