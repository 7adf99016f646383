//! The WebSocket session endpoint and the health surface.

use crate::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use maestro_workflow::SessionHandle;
use serde::Deserialize;
use serde_json::{json, Value};

/// Messages a client may send on the socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientEnvelope {
    /// Begin a session for a goal.
    Start {
        goal: String,
        #[serde(default)]
        workspace_path: Option<String>,
        #[serde(default)]
        session_id: Option<String>,
    },
    /// Resolve a pending HITL clarification.
    HitlResponse { session_id: String, payload: Value },
    /// Stop a session. State is checkpointed; workers stay up.
    Cancel { session_id: String },
}

/// GET /health
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let workers: Vec<Value> = state
        .orchestrator
        .status()
        .await
        .into_iter()
        .map(|w| {
            json!({
                "name": w.name,
                "alive": w.alive,
                "tools": w.tool_count,
            })
        })
        .collect();

    Json(json!({
        "status": "ok",
        "workers": workers,
        "active_sessions": state.sessions.len(),
    }))
}

/// GET /ws
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// One turn of the socket loop: either a workflow event from the streaming
/// session or an inbound client message.
enum SocketStep {
    Event(Option<maestro_workflow::WorkflowEvent>),
    Incoming(Option<Result<Message, axum::Error>>),
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    // One streaming session per connection; control messages may also
    // target sessions owned by other connections via the registry.
    let mut current: Option<SessionHandle> = None;

    loop {
        let step = match current.as_mut() {
            Some(handle) => tokio::select! {
                event = handle.next_event() => SocketStep::Event(event),
                incoming = socket.recv() => SocketStep::Incoming(incoming),
            },
            None => SocketStep::Incoming(socket.recv().await),
        };

        match step {
            SocketStep::Event(Some(event)) => {
                let text = match serde_json::to_string(&event) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!(error = %e, "event serialization failed");
                        continue;
                    }
                };
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
                if matches!(event, maestro_workflow::WorkflowEvent::WorkflowComplete { .. }) {
                    if let Some(handle) = current.take() {
                        state.sessions.remove(handle.session_id());
                    }
                }
            }

            SocketStep::Event(None) => {
                if let Some(handle) = current.take() {
                    state.sessions.remove(handle.session_id());
                }
            }

            SocketStep::Incoming(incoming) => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "websocket receive error");
                        break;
                    }
                };
                match handle_envelope(&text, &state, current.is_some()).await {
                    Ok(Some(handle)) => current = Some(handle),
                    Ok(None) => {}
                    Err(reply) => {
                        let _ = socket.send(Message::Text(reply.to_string())).await;
                    }
                }
            }
        }
    }

    // Connection gone: a session still streaming here is paused, not
    // killed; its controller stays registered for reconnection.
    if let Some(handle) = current {
        tracing::info!(session = %handle.session_id(), "client disconnected mid-session");
    }
}

/// Apply one client envelope. `Ok(Some(handle))` means a new session now
/// streams on this connection; `Err` carries the JSON error reply.
async fn handle_envelope(
    text: &str,
    state: &AppState,
    session_streaming: bool,
) -> Result<Option<SessionHandle>, Value> {
    let envelope: ClientEnvelope = serde_json::from_str(text).map_err(|e| {
        json!({ "type": "error", "message": format!("invalid message: {e}") })
    })?;

    match envelope {
        ClientEnvelope::Start {
            goal,
            workspace_path,
            session_id,
        } => {
            if session_streaming {
                return Err(json!({
                    "type": "error",
                    "message": "a session is already streaming on this connection"
                }));
            }
            if let Some(requested) = workspace_path {
                // The workspace is fixed server-side; a mismatch is worth
                // telling the operator about.
                tracing::warn!(requested = %requested, "client-supplied workspace_path ignored");
            }

            let handle = state.graph.start_session(goal, session_id);
            state.sessions.insert(handle.controller());
            tracing::info!(session = %handle.session_id(), "session started");
            Ok(Some(handle))
        }

        ClientEnvelope::HitlResponse {
            session_id,
            payload,
        } => {
            let controller = state.sessions.get(&session_id).ok_or_else(|| {
                json!({ "type": "error", "message": format!("unknown session: {session_id}") })
            })?;
            if controller.resume_hitl(payload).await {
                Ok(None)
            } else {
                Err(json!({
                    "type": "error",
                    "message": format!("session {session_id} is not accepting input")
                }))
            }
        }

        ClientEnvelope::Cancel { session_id } => {
            let controller = state.sessions.get(&session_id).ok_or_else(|| {
                json!({ "type": "error", "message": format!("unknown session: {session_id}") })
            })?;
            controller.cancel();
            state.sessions.remove(&session_id);
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_envelope_parses() {
        let envelope: ClientEnvelope = serde_json::from_str(
            r#"{"type": "start", "goal": "build a calculator", "session_id": "s-1"}"#,
        )
        .unwrap();
        match envelope {
            ClientEnvelope::Start {
                goal, session_id, ..
            } => {
                assert_eq!(goal, "build a calculator");
                assert_eq!(session_id.as_deref(), Some("s-1"));
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn test_hitl_and_cancel_envelopes_parse() {
        let hitl: ClientEnvelope = serde_json::from_str(
            r#"{"type": "hitl_response", "session_id": "s-1", "payload": {"selection": 1}}"#,
        )
        .unwrap();
        assert!(matches!(hitl, ClientEnvelope::HitlResponse { .. }));

        let cancel: ClientEnvelope =
            serde_json::from_str(r#"{"type": "cancel", "session_id": "s-1"}"#).unwrap();
        assert!(matches!(cancel, ClientEnvelope::Cancel { .. }));
    }

    #[test]
    fn test_unknown_envelope_rejected() {
        let result: Result<ClientEnvelope, _> =
            serde_json::from_str(r#"{"type": "reboot", "session_id": "s-1"}"#);
        assert!(result.is_err());
    }
}
