//! Worker subprocess supervisor and call router.
//!
//! One [`Orchestrator`] per backend process owns every agent worker
//! subprocess. All tool calls go through [`Orchestrator::call`]: it writes a
//! JSON-RPC request line to the target worker's stdin and reads that
//! worker's stdout until the response with the matching id arrives,
//! forwarding `$/progress` notifications to the progress channel along the
//! way.
//!
//! Concurrency rules:
//!
//! - Calls to the **same** worker are serialized: the per-worker lock is
//!   held across the write and the entire read, so exactly one in-flight
//!   call consumes that worker's stdout at a time.
//! - Calls to **different** workers proceed in parallel;
//!   [`Orchestrator::call_multiple`] dispatches a batch concurrently and
//!   returns results in input order.
//! - Request ids come from one global counter, so a response can always be
//!   correlated to its call regardless of worker.
//!
//! A worker whose process has exited is marked dead; the next call against
//! it (with auto-reconnect enabled) respawns and re-initializes it and
//! retries the failing call once. Timeouts do not kill the worker: the
//! in-flight state is cleared and a late response is discarded by id
//! mismatch on the next call.

mod config;
mod error;
mod manager;
mod progress;

pub use config::{OrchestratorConfig, WorkerSpec};
pub use error::{OrchestratorError, Result};
pub use manager::{Orchestrator, ToolInfo, WorkerStatus};
pub use progress::ProgressUpdate;
