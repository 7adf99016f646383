//! Wire protocol between the orchestrator and agent workers.
//!
//! Workers speak JSON-RPC 2.0 over their standard streams: one message per
//! line, UTF-8, no embedded newlines. Requests flow orchestrator → worker on
//! stdin; responses and `$/progress` notifications flow worker → orchestrator
//! on stdout. Stderr is reserved for logging and never carries frames.
//!
//! The crate deliberately contains no I/O. Both sides serialize with
//! [`encode_line`] and classify inbound lines with [`Frame::parse`], which is
//! where the one rule that matters lives: a message with an `id` and no
//! `method` is a response, a message with a `method` and no `id` is a
//! notification, and a notification can therefore never be mistaken for a
//! response.
//!
//! # Wire example
//!
//! ```text
//! → {"jsonrpc":"2.0","id":7,"method":"tools/call","params":{"name":"research","arguments":{...}}}
//! ← {"jsonrpc":"2.0","method":"$/progress","params":{"message":"scanning workspace","progress":0.2}}
//! ← {"jsonrpc":"2.0","id":7,"result":{"content":[{"type":"text","text":"{...}"}]}}
//! ```

mod error;
mod message;

pub use error::{ProtocolError, Result};
pub use message::{
    encode_line, tool_text, tool_text_result, Frame, Notification, ProgressParams, Request,
    Response, RpcError,
};

/// JSON-RPC protocol version string carried by every frame.
pub const JSONRPC_VERSION: &str = "2.0";

/// Well-known method names.
pub mod methods {
    /// One-time worker setup; carries `workspace_path`. Idempotent.
    pub const INITIALIZE: &str = "initialize";
    /// Returns the worker's tool catalogue.
    pub const TOOLS_LIST: &str = "tools/list";
    /// Executes a named tool with arguments.
    pub const TOOLS_CALL: &str = "tools/call";
    /// Best-effort cancellation of the in-flight request.
    pub const CANCEL: &str = "$/cancel";
    /// Progress notification emitted by workers during a tool call.
    pub const PROGRESS: &str = "$/progress";
}

/// JSON-RPC error codes used on this wire.
pub mod codes {
    /// Invalid JSON was received.
    pub const PARSE_ERROR: i64 = -32700;
    /// The JSON sent is not a valid request object.
    pub const INVALID_REQUEST: i64 = -32600;
    /// The method does not exist.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Invalid method parameters.
    pub const INVALID_PARAMS: i64 = -32602;
    /// Start of the tool-specific failure range (`-32000..=-32099` descending).
    pub const TOOL_ERROR: i64 = -32000;
}
