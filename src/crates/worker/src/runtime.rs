//! The worker protocol loop.

use crate::error::{Result, WorkerError};
use crate::progress::{ProgressSink, SharedWriter};
use crate::tool::{ToolContext, ToolRegistry};
use maestro_protocol::{encode_line, methods, Frame, Request, Response, RpcError};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

/// Default quiet-period timeout on stdin: if the orchestrator sends nothing
/// for this long the worker assumes it is gone and exits cleanly.
pub const DEFAULT_QUIET_TIMEOUT: Duration = Duration::from_secs(300);

/// Hosts one agent's tool registry behind the JSON-RPC line protocol.
pub struct WorkerRuntime {
    name: String,
    registry: ToolRegistry,
    workspace: Option<PathBuf>,
    quiet_timeout: Duration,
}

impl WorkerRuntime {
    pub fn new(name: impl Into<String>, registry: ToolRegistry) -> Self {
        Self {
            name: name.into(),
            registry,
            workspace: None,
            quiet_timeout: DEFAULT_QUIET_TIMEOUT,
        }
    }

    pub fn with_quiet_timeout(mut self, timeout: Duration) -> Self {
        self.quiet_timeout = timeout;
        self
    }

    /// Run the protocol loop until EOF (clean exit) or a fatal I/O error.
    ///
    /// One request is handled at a time: the next line is not read until the
    /// current dispatch has written its response.
    pub async fn run<R, W>(mut self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let writer: SharedWriter = Arc::new(Mutex::new(Box::new(writer)));
        let mut lines = BufReader::new(reader).lines();

        tracing::info!(worker = %self.name, "worker ready");

        loop {
            let line = match tokio::time::timeout(self.quiet_timeout, lines.next_line()).await {
                Err(_) => {
                    tracing::warn!(
                        worker = %self.name,
                        quiet_s = self.quiet_timeout.as_secs(),
                        "no input within quiet period, assuming orchestrator is gone"
                    );
                    break;
                }
                Ok(Err(e)) => return Err(WorkerError::Io(e)),
                Ok(Ok(None)) => {
                    tracing::info!(worker = %self.name, "stdin closed, exiting");
                    break;
                }
                Ok(Ok(Some(line))) => line,
            };

            if line.trim().is_empty() {
                continue;
            }

            let request = match Frame::parse(&line) {
                Ok(Frame::Request(request)) => request,
                Ok(Frame::Notification(note)) => {
                    tracing::debug!(worker = %self.name, method = %note.method, "notification ignored");
                    continue;
                }
                Ok(Frame::Response(_)) => {
                    tracing::warn!(worker = %self.name, "unexpected response frame on stdin");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(worker = %self.name, error = %e, "unparseable frame");
                    // No id to echo; id 0 is never allocated by the
                    // orchestrator, so this cannot be matched to a call.
                    write_response(
                        &writer,
                        Response::failure(0, RpcError::parse_error(e.to_string())),
                    )
                    .await?;
                    continue;
                }
            };

            let response = self.dispatch(request, &writer).await;
            write_response(&writer, response).await?;
        }

        Ok(())
    }

    async fn dispatch(&mut self, request: Request, writer: &SharedWriter) -> Response {
        let id = request.id;
        match request.method.as_str() {
            methods::INITIALIZE => self.handle_initialize(id, request.params),
            methods::TOOLS_LIST => Response::success(id, self.registry.catalogue()),
            methods::TOOLS_CALL => self.handle_tool_call(id, request.params, writer).await,
            methods::CANCEL => {
                // Best-effort: requests run to completion, so by the time a
                // cancel is read the in-flight call has already finished.
                tracing::debug!(worker = %self.name, "cancel acknowledged");
                Response::success(id, serde_json::json!({}))
            }
            other => Response::failure(id, RpcError::method_not_found(other)),
        }
    }

    /// `initialize` is idempotent: a repeated call with the same workspace
    /// leaves observable behavior unchanged.
    fn handle_initialize(&mut self, id: u64, params: Value) -> Response {
        match params.get("workspace_path").and_then(Value::as_str) {
            Some(path) => {
                self.workspace = Some(PathBuf::from(path));
                tracing::info!(worker = %self.name, workspace = %path, "initialized");
                Response::success(id, serde_json::json!({}))
            }
            None => Response::failure(
                id,
                RpcError::invalid_params("initialize requires workspace_path"),
            ),
        }
    }

    async fn handle_tool_call(&self, id: u64, params: Value, writer: &SharedWriter) -> Response {
        let name = match params.get("name").and_then(Value::as_str) {
            Some(name) => name.to_string(),
            None => {
                return Response::failure(id, RpcError::invalid_params("tools/call requires name"))
            }
        };
        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

        let tool = match self.registry.find(&name) {
            Some(tool) => tool,
            None => {
                return Response::failure(
                    id,
                    RpcError::invalid_params(format!("unknown tool: {name}")),
                )
            }
        };

        // Workspace from the arguments when present (the orchestrator
        // injects it), otherwise from initialize.
        let workspace_path = arguments
            .get("workspace_path")
            .and_then(Value::as_str)
            .map(PathBuf::from)
            .or_else(|| self.workspace.clone());
        let workspace_path = match workspace_path {
            Some(path) => path,
            None => {
                return Response::failure(
                    id,
                    RpcError::invalid_params("no workspace_path available"),
                )
            }
        };

        let ctx = ToolContext {
            workspace_path,
            progress: ProgressSink::new(Arc::clone(writer), self.name.clone()),
        };

        tracing::info!(worker = %self.name, tool = %name, "tool call started");
        match tool.call(arguments, &ctx).await {
            Ok(payload) => {
                let text = match serde_json::to_string(&payload) {
                    Ok(text) => text,
                    Err(e) => {
                        return Response::failure(
                            id,
                            RpcError::tool_error(format!("result serialization failed: {e}")),
                        )
                    }
                };
                tracing::info!(worker = %self.name, tool = %name, "tool call finished");
                Response::success(id, maestro_protocol::tool_text_result(text))
            }
            Err(WorkerError::InvalidParams(message)) => {
                Response::failure(id, RpcError::invalid_params(message))
            }
            Err(e) => {
                tracing::error!(worker = %self.name, tool = %name, error = %e, "tool call failed");
                Response::failure(id, RpcError::tool_error(e.to_string()))
            }
        }
    }
}

async fn write_response(writer: &SharedWriter, response: Response) -> Result<()> {
    let line = encode_line(&response)?;
    let mut writer = writer.lock().await;
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
