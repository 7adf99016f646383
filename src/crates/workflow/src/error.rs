use thiserror::Error;

/// Result type for workflow operations.
pub type Result<T> = std::result::Result<T, WorkflowError>;

/// Errors raised by the supervisor, nodes, and graph driver.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// LLM call failed (after the provider gate's retries).
    #[error("LLM error: {0}")]
    Llm(#[from] maestro_llm::LlmError),

    /// Checkpoint store failure.
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] maestro_checkpoint::CheckpointError),

    /// A tool call through the orchestrator failed.
    #[error("dispatch to '{server}' failed: {message}")]
    Dispatch { server: String, message: String },

    /// A worker returned output that does not match its contract.
    #[error("malformed result from '{server}': {message}")]
    MalformedToolResult { server: String, message: String },

    /// The supervisor model produced a command that failed schema
    /// validation or could not be parsed.
    #[error("invalid routing command: {0}")]
    InvalidCommand(String),

    /// A syntactically valid command violated a routing invariant and the
    /// retry with a constraint reminder did not resolve it.
    #[error("routing policy violation: {0}")]
    PolicyViolation(String),

    /// Configuration problem detected at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// The client cancelled the session.
    #[error("session cancelled")]
    Cancelled,
}

impl WorkflowError {
    /// A short instruction the user can act on, surfaced in failure reports
    /// and HITL prompts. Stack traces stay in the logs.
    pub fn user_guidance(&self) -> &'static str {
        match self {
            WorkflowError::Llm(maestro_llm::LlmError::Authentication(_))
            | WorkflowError::Llm(maestro_llm::LlmError::ApiKeyNotFound(_)) => {
                "check that OPENAI_API_KEY is set and valid"
            }
            WorkflowError::Llm(maestro_llm::LlmError::RateLimited { .. })
            | WorkflowError::Llm(maestro_llm::LlmError::RetriesExhausted { .. }) => {
                "the LLM provider is rate limiting; wait a moment and retry"
            }
            WorkflowError::Llm(_) => "the LLM provider failed; retry the request",
            WorkflowError::Dispatch { .. } => {
                "an agent worker failed; retrying usually recovers this"
            }
            WorkflowError::MalformedToolResult { .. } => {
                "an agent produced malformed output; retry or simplify the request"
            }
            WorkflowError::InvalidCommand(_) | WorkflowError::PolicyViolation(_) => {
                "the planner got confused; rephrase or narrow the request"
            }
            WorkflowError::Checkpoint(_) => "session persistence failed; check disk space",
            WorkflowError::Config(_) => "fix the server configuration and restart",
            WorkflowError::Cancelled => "the session was cancelled",
        }
    }
}
