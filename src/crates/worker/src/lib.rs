//! Agent worker runtime.
//!
//! A worker is one long-running subprocess hosting one agent. It reads
//! newline-delimited JSON-RPC requests on stdin, writes responses and
//! `$/progress` notifications on stdout, and logs exclusively to stderr.
//! Workers are stateless across requests except for the workspace root
//! handed over at `initialize`.
//!
//! The runtime is generic over its streams so the whole protocol loop runs
//! against in-memory pipes in tests. Requests execute one at a time: the
//! loop does not read the next line until the current tool call has
//! completed, which also realizes the "second request is buffered, not
//! started" rule.
//!
//! Agent behavior lives in [`agents`]; each agent is an [`AgentTool`] with a
//! JSON input schema, and the registry for an agent name is assembled by
//! [`agents::registry_for`].

pub mod agents;
mod error;
mod progress;
mod runtime;
mod tool;

pub use error::{Result, WorkerError};
pub use progress::ProgressSink;
pub use runtime::WorkerRuntime;
pub use tool::{AgentTool, ToolContext, ToolRegistry};
