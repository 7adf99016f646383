use thiserror::Error;

/// Result type for orchestrator operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Errors raised while supervising workers and routing calls.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Worker connection failed (spawn, handshake, closed streams, bad
    /// frames). Transport-class: recovered by reconnect + single retry.
    #[error("worker '{server}' connection error: {message}")]
    Connection { server: String, message: String },

    /// Worker process has exited.
    #[error("worker '{server}' process has died (exit code: {code:?})")]
    WorkerDead { server: String, code: Option<i32> },

    /// Per-call wall-clock timeout expired.
    #[error("call to '{server}' timed out after {elapsed_s:.1}s (read {lines_read} lines)")]
    Timeout {
        server: String,
        elapsed_s: f64,
        lines_read: u64,
    },

    /// Worker returned a structured JSON-RPC error for the call.
    #[error("tool call on '{server}' failed ({code}): {message}")]
    Tool {
        server: String,
        code: i64,
        message: String,
    },

    /// Target worker is not part of the configured set.
    #[error("unknown worker: {0}")]
    UnknownServer(String),

    /// `initialize()` has not completed successfully.
    #[error("orchestrator not initialized")]
    NotInitialized,

    /// One or more workers failed to start.
    #[error("failed to start workers:\n{failures}")]
    Startup { failures: String },

    /// Subprocess I/O failed outside a classified path.
    #[error("worker I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl OrchestratorError {
    pub(crate) fn connection(server: &str, message: impl Into<String>) -> Self {
        Self::Connection {
            server: server.to_string(),
            message: message.into(),
        }
    }

    /// Transport-class errors are eligible for reconnect + retry.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            OrchestratorError::Connection { .. }
                | OrchestratorError::WorkerDead { .. }
                | OrchestratorError::Io(_)
        )
    }
}
