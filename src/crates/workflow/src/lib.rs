//! The maestro decision loop.
//!
//! A session starts from a natural-language goal. The LLM-driven
//! [`Supervisor`] looks at the accumulated [`WorkflowState`] and emits one
//! [`RoutingCommand`] per iteration: a state patch plus the next node. The
//! [`WorkflowGraph`] applies the patch, dispatches the named agent through
//! an [`AgentDispatch`] (the orchestrator in production, a scripted fake in
//! tests), merges the agent's result back into state, checkpoints, and
//! returns control to the supervisor. Routing to `end` terminates the
//! session; routing to `hitl` suspends it until the client supplies a
//! clarification.
//!
//! Routing invariants enforced here rather than trusted to the model:
//!
//! - After `codesmith`, the next worker is `reviewfix` until validation has
//!   passed.
//! - Confidence below the threshold, or an exhausted error budget, forces
//!   `hitl`.
//! - `end` is only honored once `response_ready` is set (the graph runs the
//!   responder itself otherwise).
//! - Routing to the same worker twice in a row requires fresh instructions.
//!
//! Everything a client observes flows through the bounded event stream:
//! node starts, forwarded worker progress, errors, and the final
//! `workflow_complete` with the formatted response.

mod command;
mod dispatch;
mod error;
mod graph;
mod nodes;
mod settings;
mod state;
mod stream;
mod supervisor;

pub use command::{AgentName, Goto, RoutingCommand};
pub use dispatch::AgentDispatch;
pub use error::{Result, WorkflowError};
pub use graph::{SessionController, SessionHandle, WorkflowGraph};
pub use settings::Settings;
pub use state::{
    ChatTurn, ErrorRecord, GeneratedFile, Issue, StatePatch, ValidationResults, WorkflowState,
};
pub use stream::WorkflowEvent;
pub use supervisor::Supervisor;
