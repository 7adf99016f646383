//! Lifecycle events streamed to the client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

/// Default capacity of a session's event queue. Producers await on a full
/// queue, so a slow client applies backpressure instead of losing events.
pub const EVENT_QUEUE_CAPACITY: usize = 256;

/// One event on a session's stream. Serialized with a `type` tag matching
/// the client contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// A graph node started; `updated_keys` names the state fields the
    /// preceding patch touched.
    WorkflowEvent {
        session_id: String,
        timestamp: DateTime<Utc>,
        node: String,
        updated_keys: Vec<String>,
    },

    /// Worker-level status, including forwarded `$/progress` notifications
    /// and HITL clarification prompts.
    AgentEvent {
        session_id: String,
        timestamp: DateTime<Utc>,
        server: String,
        message: String,
        progress: f64,
    },

    /// A failure was recorded. The session may still continue.
    Error {
        session_id: String,
        timestamp: DateTime<Utc>,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        agent: Option<String>,
    },

    /// Terminal event: the session is over.
    WorkflowComplete {
        session_id: String,
        timestamp: DateTime<Utc>,
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        user_response: Option<String>,
        artifacts: Value,
    },
}

impl WorkflowEvent {
    pub fn session_id(&self) -> &str {
        match self {
            WorkflowEvent::WorkflowEvent { session_id, .. }
            | WorkflowEvent::AgentEvent { session_id, .. }
            | WorkflowEvent::Error { session_id, .. }
            | WorkflowEvent::WorkflowComplete { session_id, .. } => session_id,
        }
    }
}

/// Sending half of a session's event queue.
#[derive(Clone)]
pub(crate) struct EventSender {
    session_id: String,
    tx: mpsc::Sender<WorkflowEvent>,
}

impl EventSender {
    pub fn channel(session_id: impl Into<String>) -> (Self, mpsc::Receiver<WorkflowEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        (
            Self {
                session_id: session_id.into(),
                tx,
            },
            rx,
        )
    }

    /// Push one event, waiting if the client is slow. A closed receiver
    /// means the client is gone; events are then dropped silently.
    pub async fn send(&self, event: WorkflowEvent) {
        if self.tx.send(event).await.is_err() {
            tracing::debug!(session = %self.session_id, "event receiver dropped");
        }
    }

    pub async fn node_started(&self, node: &str, updated_keys: Vec<String>) {
        self.send(WorkflowEvent::WorkflowEvent {
            session_id: self.session_id.clone(),
            timestamp: Utc::now(),
            node: node.to_string(),
            updated_keys,
        })
        .await;
    }

    pub async fn agent_status(&self, server: &str, message: &str, progress: f64) {
        self.send(WorkflowEvent::AgentEvent {
            session_id: self.session_id.clone(),
            timestamp: Utc::now(),
            server: server.to_string(),
            message: message.to_string(),
            progress,
        })
        .await;
    }

    pub async fn error(&self, message: &str, agent: Option<String>) {
        self.send(WorkflowEvent::Error {
            session_id: self.session_id.clone(),
            timestamp: Utc::now(),
            message: message.to_string(),
            agent,
        })
        .await;
    }

    pub async fn complete(&self, status: &str, user_response: Option<String>, artifacts: Value) {
        self.send(WorkflowEvent::WorkflowComplete {
            session_id: self.session_id.clone(),
            timestamp: Utc::now(),
            status: status.to_string(),
            user_response,
            artifacts,
        })
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_tags() {
        let event = WorkflowEvent::WorkflowComplete {
            session_id: "s-1".to_string(),
            timestamp: Utc::now(),
            status: "success".to_string(),
            user_response: Some("done".to_string()),
            artifacts: serde_json::json!({}),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "workflow_complete");
        assert_eq!(json["session_id"], "s-1");
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_send_after_receiver_drop_does_not_block() {
        let (sender, rx) = EventSender::channel("s-1");
        drop(rx);
        sender.agent_status("research", "working", 0.5).await;
    }
}
