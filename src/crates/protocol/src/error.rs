use thiserror::Error;

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while encoding or classifying wire frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The line was not valid JSON.
    #[error("invalid JSON frame: {0}")]
    Json(#[from] serde_json::Error),

    /// The JSON was valid but matched no frame shape (request, response,
    /// notification).
    #[error("unrecognized frame: {0}")]
    UnrecognizedFrame(String),

    /// A message serialized with an embedded newline, which would corrupt the
    /// line-delimited stream.
    #[error("message contains an embedded newline")]
    EmbeddedNewline,
}
