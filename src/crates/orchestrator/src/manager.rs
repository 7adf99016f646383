//! The orchestrator proper: spawn, handshake, route, reconnect, close.

use crate::config::{OrchestratorConfig, WorkerSpec};
use crate::error::{OrchestratorError, Result};
use crate::progress::ProgressUpdate;
use maestro_protocol::{encode_line, methods, Frame, ProgressParams, Request};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{broadcast, Mutex};
use tokio::time::Instant;

/// One tool advertised by a worker's `tools/list`.
#[derive(Debug, Clone)]
pub struct ToolInfo {
    pub name: String,
    pub input_schema: Value,
}

/// Health summary for one worker, as reported by [`Orchestrator::status`].
#[derive(Debug, Clone)]
pub struct WorkerStatus {
    pub name: String,
    pub alive: bool,
    pub tool_count: usize,
}

/// Live connection to one worker subprocess.
struct WorkerConnection {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    tools: Vec<ToolInfo>,
}

/// Per-worker slot. The outer mutex is the serialization point: it is held
/// across the request write and the whole response read, so one in-flight
/// call owns the worker's stdout at a time.
struct WorkerSlot {
    spec: WorkerSpec,
    conn: Option<WorkerConnection>,
}

/// Process-wide manager of all agent worker subprocesses.
pub struct Orchestrator {
    config: OrchestratorConfig,
    workers: HashMap<String, Arc<Mutex<WorkerSlot>>>,
    next_id: AtomicU64,
    initialized: AtomicBool,
    progress_tx: broadcast::Sender<ProgressUpdate>,
}

impl Orchestrator {
    /// Create an orchestrator for the configured workers. No subprocesses
    /// are spawned until [`initialize`](Self::initialize).
    pub fn new(config: OrchestratorConfig) -> Self {
        let workers = config
            .workers
            .iter()
            .map(|spec| {
                (
                    spec.name.clone(),
                    Arc::new(Mutex::new(WorkerSlot {
                        spec: spec.clone(),
                        conn: None,
                    })),
                )
            })
            .collect();
        let (progress_tx, _) = broadcast::channel(config.progress_capacity);

        Self {
            config,
            workers,
            next_id: AtomicU64::new(0),
            initialized: AtomicBool::new(false),
            progress_tx,
        }
    }

    /// Subscribe to forwarded `$/progress` notifications.
    pub fn subscribe_progress(&self) -> broadcast::Receiver<ProgressUpdate> {
        self.progress_tx.subscribe()
    }

    /// Spawn and handshake every configured worker in parallel. Fails loudly
    /// listing each worker that did not come up.
    pub async fn initialize(&self) -> Result<()> {
        tracing::info!(workers = self.workers.len(), "starting worker subprocesses");

        let connects = self.workers.values().map(|slot| {
            let slot = Arc::clone(slot);
            async move {
                let mut slot = slot.lock().await;
                let name = slot.spec.name.clone();
                let result = self.connect(&mut slot).await;
                (name, result)
            }
        });

        let results = futures::future::join_all(connects).await;

        let mut failures = Vec::new();
        for (name, result) in results {
            match result {
                Ok(()) => tracing::info!(worker = %name, "worker connected"),
                Err(e) => {
                    tracing::error!(worker = %name, error = %e, "worker failed to start");
                    failures.push(format!("  - {name}: {e}"));
                }
            }
        }

        if !failures.is_empty() {
            return Err(OrchestratorError::Startup {
                failures: failures.join("\n"),
            });
        }

        self.initialized.store(true, Ordering::SeqCst);
        tracing::info!("all workers connected");
        Ok(())
    }

    /// Call one tool on one worker. See the crate docs for the ordering and
    /// timeout rules. With auto-reconnect, a transport failure respawns the
    /// worker and retries the call exactly once.
    pub async fn call(
        &self,
        server: &str,
        tool: &str,
        arguments: Value,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(OrchestratorError::NotInitialized);
        }
        let slot = self
            .workers
            .get(server)
            .ok_or_else(|| OrchestratorError::UnknownServer(server.to_string()))?;

        let timeout = timeout.unwrap_or(self.config.call_timeout);
        let mut slot = slot.lock().await;

        match self.call_locked(&mut slot, tool, arguments.clone(), timeout).await {
            Err(e) if e.is_transport() && self.config.auto_reconnect => {
                tracing::warn!(worker = %server, error = %e, "transport failure, reconnecting");
                slot.conn = None;
                self.connect(&mut slot).await?;
                tracing::info!(worker = %server, "reconnected, retrying call once");
                self.call_locked(&mut slot, tool, arguments, timeout).await
            }
            other => other,
        }
    }

    /// Dispatch a batch of calls in parallel. Calls to distinct workers
    /// proceed concurrently; calls to the same worker serialize on its slot.
    /// Results come back in input order.
    pub async fn call_multiple(
        &self,
        calls: Vec<(String, String, Value)>,
    ) -> Vec<Result<Value>> {
        tracing::info!(count = calls.len(), "dispatching parallel tool calls");
        let futures = calls
            .into_iter()
            .map(|(server, tool, args)| async move {
                self.call(&server, &tool, args, None).await
            });
        futures::future::join_all(futures).await
    }

    /// Terminate all workers: close stdin (workers exit cleanly on EOF),
    /// wait briefly, kill whatever is left.
    pub async fn close(&self) {
        tracing::info!("closing worker connections");
        self.initialized.store(false, Ordering::SeqCst);

        for (name, slot) in &self.workers {
            let mut slot = slot.lock().await;
            if let Some(mut conn) = slot.conn.take() {
                drop(conn.stdin);
                match tokio::time::timeout(Duration::from_secs(5), conn.child.wait()).await {
                    Ok(Ok(status)) => {
                        tracing::debug!(worker = %name, ?status, "worker exited")
                    }
                    Ok(Err(e)) => tracing::warn!(worker = %name, error = %e, "wait failed"),
                    Err(_) => {
                        tracing::warn!(worker = %name, "worker unresponsive, killing");
                        let _ = conn.child.start_kill();
                        let _ = conn.child.wait().await;
                    }
                }
            }
        }
    }

    /// Per-worker health summary.
    pub async fn status(&self) -> Vec<WorkerStatus> {
        let mut out = Vec::with_capacity(self.workers.len());
        for (name, slot) in &self.workers {
            let mut slot = slot.lock().await;
            let (alive, tool_count) = match slot.conn.as_mut() {
                Some(conn) => (conn.child.try_wait().ok().flatten().is_none(), conn.tools.len()),
                None => (false, 0),
            };
            out.push(WorkerStatus {
                name: name.clone(),
                alive,
                tool_count,
            });
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Cached tool catalogue for a worker.
    pub async fn tools(&self, server: &str) -> Result<Vec<ToolInfo>> {
        let slot = self
            .workers
            .get(server)
            .ok_or_else(|| OrchestratorError::UnknownServer(server.to_string()))?;
        let slot = slot.lock().await;
        Ok(slot
            .conn
            .as_ref()
            .map(|c| c.tools.clone())
            .unwrap_or_default())
    }

    fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Spawn the subprocess and run the two-step handshake.
    async fn connect(&self, slot: &mut WorkerSlot) -> Result<()> {
        let spec = &slot.spec;
        let name = spec.name.clone();

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .env_clear();
        // Explicit minimal environment: API keys and enough to execute.
        for key in &self.config.pass_env {
            if let Ok(value) = std::env::var(key) {
                command.env(key, value);
            }
        }
        if let Some(dir) = &self.config.working_dir {
            command.current_dir(dir);
        }

        let mut child = command
            .spawn()
            .map_err(|e| OrchestratorError::connection(&name, format!("spawn failed: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| OrchestratorError::connection(&name, "stdin not piped"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| OrchestratorError::connection(&name, "stdout not piped"))?;
        if let Some(stderr) = child.stderr.take() {
            spawn_stderr_logger(name.clone(), stderr);
        }

        let mut conn = WorkerConnection {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            tools: Vec::new(),
        };

        // Handshake step 1: initialize with the workspace root.
        let init_result = self
            .request(
                &name,
                &mut conn,
                methods::INITIALIZE,
                json!({ "workspace_path": self.config.workspace_path }),
                self.config.handshake_timeout,
            )
            .await;
        if let Err(e) = init_result {
            let _ = conn.child.start_kill();
            let _ = conn.child.wait().await;
            return Err(OrchestratorError::connection(
                &name,
                format!("initialize failed: {e}"),
            ));
        }

        // Handshake step 2: cache the tool catalogue.
        let tools_value = match self
            .request(
                &name,
                &mut conn,
                methods::TOOLS_LIST,
                Value::Null,
                self.config.handshake_timeout,
            )
            .await
        {
            Ok(value) => value,
            Err(e) => {
                let _ = conn.child.start_kill();
                let _ = conn.child.wait().await;
                return Err(OrchestratorError::connection(
                    &name,
                    format!("tools/list failed: {e}"),
                ));
            }
        };

        conn.tools = parse_tool_catalogue(&tools_value);
        tracing::debug!(
            worker = %name,
            tools = %conn.tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>().join(", "),
            "handshake complete"
        );

        slot.conn = Some(conn);
        Ok(())
    }

    /// One `tools/call` on an already-locked slot.
    async fn call_locked(
        &self,
        slot: &mut WorkerSlot,
        tool: &str,
        mut arguments: Value,
        timeout: Duration,
    ) -> Result<Value> {
        let name = slot.spec.name.clone();
        let conn = match slot.conn.as_mut() {
            Some(conn) => conn,
            None => {
                return Err(OrchestratorError::WorkerDead {
                    server: name,
                    code: None,
                })
            }
        };

        // A dead process is detected before the write, not by a failed read.
        if let Some(status) = conn.child.try_wait()? {
            return Err(OrchestratorError::WorkerDead {
                server: name,
                code: status.code(),
            });
        }

        if let Some(args) = arguments.as_object_mut() {
            args.entry("workspace_path".to_string())
                .or_insert_with(|| json!(self.config.workspace_path));
        }

        tracing::debug!(worker = %name, tool, timeout_s = timeout.as_secs(), "calling tool");
        self.request(
            &name,
            conn,
            methods::TOOLS_CALL,
            json!({ "name": tool, "arguments": arguments }),
            timeout,
        )
        .await
    }

    /// Write one request and read until its response arrives, forwarding
    /// progress notifications and discarding unrelated frames.
    async fn request(
        &self,
        server: &str,
        conn: &mut WorkerConnection,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value> {
        let request_id = self.next_request_id();
        let request = Request::new(request_id, method, params);
        let line = encode_line(&request)
            .map_err(|e| OrchestratorError::connection(server, format!("encode failed: {e}")))?;

        conn.stdin.write_all(line.as_bytes()).await?;
        conn.stdin.flush().await?;
        tracing::debug!(worker = %server, id = request_id, method, "request sent");

        let start = Instant::now();
        let deadline = start + timeout;
        let mut lines_read: u64 = 0;
        let mut last_elapsed_log = Duration::ZERO;

        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(OrchestratorError::Timeout {
                    server: server.to_string(),
                    elapsed_s: start.elapsed().as_secs_f64(),
                    lines_read,
                });
            }

            // Heartbeat log while a long call is in flight.
            let elapsed = start.elapsed();
            if elapsed - last_elapsed_log >= Duration::from_secs(10) {
                tracing::info!(
                    worker = %server,
                    elapsed_s = elapsed.as_secs(),
                    "worker still processing"
                );
                last_elapsed_log = elapsed;
            }

            let line_budget = self.config.read_timeout.min(deadline - now);
            let line = match tokio::time::timeout(line_budget, conn.stdout.next_line()).await {
                // Line-level quiet period; keep polling while the call
                // timeout still allows.
                Err(_) => continue,
                Ok(Err(e)) => {
                    return Err(OrchestratorError::connection(
                        server,
                        format!("read failed: {e}"),
                    ))
                }
                Ok(Ok(None)) => {
                    let code = conn.child.try_wait().ok().flatten().and_then(|s| s.code());
                    return Err(OrchestratorError::WorkerDead {
                        server: server.to_string(),
                        code,
                    });
                }
                Ok(Ok(Some(line))) => line,
            };
            lines_read += 1;

            let frame = Frame::parse(&line).map_err(|e| {
                OrchestratorError::connection(server, format!("invalid frame: {e}"))
            })?;

            match frame {
                Frame::Notification(note) if note.method == methods::PROGRESS => {
                    if let Ok(params) = serde_json::from_value::<ProgressParams>(note.params) {
                        let update =
                            ProgressUpdate::new(server, params.message, params.progress);
                        tracing::debug!(
                            worker = %server,
                            progress = update.progress,
                            "{}", update.message
                        );
                        // Broadcast send never blocks; no subscribers is fine.
                        let _ = self.progress_tx.send(update);
                    }
                }
                Frame::Notification(note) => {
                    tracing::debug!(worker = %server, method = %note.method, "notification");
                }
                Frame::Response(response) if response.id == request_id => {
                    return match response.error {
                        Some(err) => Err(OrchestratorError::Tool {
                            server: server.to_string(),
                            code: err.code,
                            message: err.message,
                        }),
                        None => Ok(response.result.unwrap_or(Value::Null)),
                    };
                }
                Frame::Response(response) => {
                    // Stale response from a timed-out predecessor, or a
                    // worker bug. Either way it is not ours.
                    tracing::warn!(
                        worker = %server,
                        got = response.id,
                        expected = request_id,
                        "discarding response with unexpected id"
                    );
                }
                Frame::Request(req) => {
                    tracing::warn!(
                        worker = %server,
                        method = %req.method,
                        "discarding unexpected request from worker"
                    );
                }
            }
        }
    }
}

/// Forward a worker's stderr lines into our logs.
fn spawn_stderr_logger(name: String, stderr: tokio::process::ChildStderr) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(worker = %name, "{line}");
        }
    });
}

fn parse_tool_catalogue(value: &Value) -> Vec<ToolInfo> {
    value
        .get("tools")
        .and_then(Value::as_array)
        .map(|tools| {
            tools
                .iter()
                .filter_map(|t| {
                    Some(ToolInfo {
                        name: t.get("name")?.as_str()?.to_string(),
                        input_schema: t.get("input_schema").cloned().unwrap_or(Value::Null),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}
