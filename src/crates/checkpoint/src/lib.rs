//! Session checkpoint persistence for maestro workflows.
//!
//! The workflow graph writes one immutable snapshot of the session state
//! after every node merge, keyed by `(session_id, iteration)`. Resumption
//! (after a restart or an HITL pause) loads the latest snapshot for a
//! session and re-enters the decision loop.
//!
//! Two backends implement the [`CheckpointSaver`] trait:
//!
//! - [`MemorySaver`] — in-process reference implementation used by tests and
//!   throwaway runs.
//! - [`SqliteSaver`] — a single-file embedded store (via `sqlx`) with
//!   insert-or-replace semantics per key, so snapshots survive process
//!   restarts. Writers are serialized per session by the graph; readers get
//!   a consistent row per `(session_id, iteration)`.
//!
//! Snapshots store the state as JSON so the checkpoint file stays
//! inspectable with any SQLite client.

mod checkpoint;
mod error;
mod memory;
mod sqlite;
mod traits;

pub use checkpoint::SessionCheckpoint;
pub use error::{CheckpointError, Result};
pub use memory::MemorySaver;
pub use sqlite::SqliteSaver;
pub use traits::CheckpointSaver;
