//! The seam between the graph and the worker fleet.
//!
//! The graph never holds a global orchestrator: it is handed an
//! [`AgentDispatch`] at construction. Production wires in the real
//! [`Orchestrator`]; scenario tests wire in scripted fakes.

use crate::error::WorkflowError;
use async_trait::async_trait;
use maestro_orchestrator::{Orchestrator, OrchestratorError, ProgressUpdate};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::broadcast;

/// Dispatches tool calls to agent workers and exposes their progress
/// stream.
#[async_trait]
pub trait AgentDispatch: Send + Sync {
    /// Call one tool on one worker; returns the raw `tools/call` result
    /// envelope.
    async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, WorkflowError>;

    /// Subscribe to forwarded `$/progress` notifications.
    fn progress_events(&self) -> broadcast::Receiver<ProgressUpdate>;
}

#[async_trait]
impl AgentDispatch for Orchestrator {
    async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, WorkflowError> {
        self.call(server, tool, arguments, timeout)
            .await
            .map_err(|e| dispatch_error(server, e))
    }

    fn progress_events(&self) -> broadcast::Receiver<ProgressUpdate> {
        self.subscribe_progress()
    }
}

fn dispatch_error(server: &str, error: OrchestratorError) -> WorkflowError {
    WorkflowError::Dispatch {
        server: server.to_string(),
        message: error.to_string(),
    }
}
