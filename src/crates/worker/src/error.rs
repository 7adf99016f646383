use thiserror::Error;

/// Result type for worker operations.
pub type Result<T> = std::result::Result<T, WorkerError>;

/// Errors raised inside a worker process.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Stream I/O failed; the runtime exits non-zero on this.
    #[error("worker I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame encoding failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] maestro_protocol::ProtocolError),

    /// Tool payload (de)serialization failed.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// LLM call failed inside an agent.
    #[error("LLM error: {0}")]
    Llm(#[from] maestro_llm::LlmError),

    /// Tool arguments failed validation. Maps to `-32602`.
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// Tool-specific failure. Maps to the `-32000` range.
    #[error("tool failed: {0}")]
    Tool(String),
}
