//! The state-machine harness driving a session from goal to response.

use crate::command::{AgentName, Goto, RoutingCommand};
use crate::dispatch::AgentDispatch;
use crate::error::WorkflowError;
use crate::nodes;
use crate::settings::Settings;
use crate::state::{ChatTurn, ErrorRecord, StatePatch, WorkflowState};
use crate::stream::{EventSender, WorkflowEvent};
use crate::supervisor::Supervisor;
use maestro_checkpoint::{CheckpointSaver, SessionCheckpoint};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Capacity of the HITL resume queue. One pending clarification at a time
/// is the normal case; a small buffer absorbs racy double-sends.
const RESUME_QUEUE_CAPACITY: usize = 4;

/// Client-side handle for one running session.
pub struct SessionHandle {
    session_id: String,
    events: mpsc::Receiver<WorkflowEvent>,
    resume_tx: mpsc::Sender<Value>,
    cancel: CancellationToken,
}

/// Cloneable control surface for a session: resume and cancel without
/// owning the event stream. Used by server-side registries where the
/// clarification answer may arrive on a different connection.
#[derive(Clone)]
pub struct SessionController {
    session_id: String,
    resume_tx: mpsc::Sender<Value>,
    cancel: CancellationToken,
}

impl SessionController {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn resume_hitl(&self, payload: Value) -> bool {
        self.resume_tx.send(payload).await.is_ok()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// A cloneable controller for this session.
    pub fn controller(&self) -> SessionController {
        SessionController {
            session_id: self.session_id.clone(),
            resume_tx: self.resume_tx.clone(),
            cancel: self.cancel.clone(),
        }
    }

    /// Next event, or `None` once the session task has finished and the
    /// queue drained.
    pub async fn next_event(&mut self) -> Option<WorkflowEvent> {
        self.events.recv().await
    }

    /// Deliver the user's clarification to a session paused in HITL.
    pub async fn resume_hitl(&self, payload: Value) -> bool {
        self.resume_tx.send(payload).await.is_ok()
    }

    /// Cancel the session. In-flight agent calls are dropped, workers stay
    /// up, and state is checkpointed before the task exits.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// Drives supervisor decisions, node dispatches, state merges, and
/// checkpoints for every session.
#[derive(Clone)]
pub struct WorkflowGraph {
    dispatch: Arc<dyn AgentDispatch>,
    checkpointer: Arc<dyn CheckpointSaver>,
    supervisor: Arc<Supervisor>,
    settings: Settings,
}

impl WorkflowGraph {
    pub fn new(
        dispatch: Arc<dyn AgentDispatch>,
        checkpointer: Arc<dyn CheckpointSaver>,
        supervisor: Arc<Supervisor>,
        settings: Settings,
    ) -> Self {
        Self {
            dispatch,
            checkpointer,
            supervisor,
            settings,
        }
    }

    /// Start a new session for `goal`. Returns immediately; the decision
    /// loop runs on its own task and reports through the handle's events.
    pub fn start_session(&self, goal: impl Into<String>, session_id: Option<String>) -> SessionHandle {
        let session_id =
            session_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let state = WorkflowState::new(
            goal,
            self.settings.workspace_path.clone(),
            session_id.clone(),
        );
        self.spawn(state, session_id)
    }

    /// Resume a session from its most recent checkpoint, re-entering at the
    /// supervisor.
    pub async fn resume_session(&self, session_id: &str) -> crate::Result<SessionHandle> {
        let checkpoint = self
            .checkpointer
            .latest(session_id)
            .await?
            .ok_or_else(|| {
                WorkflowError::Config(format!("no checkpoint for session {session_id}"))
            })?;
        let mut state: WorkflowState = serde_json::from_value(checkpoint.state).map_err(|e| {
            WorkflowError::Config(format!("checkpoint for {session_id} does not parse: {e}"))
        })?;
        // The in-memory pause did not survive the restart; the supervisor
        // re-evaluates from the snapshot.
        state.awaiting_human = false;
        tracing::info!(session = %session_id, iteration = state.iteration, "resuming session");
        Ok(self.spawn(state, session_id.to_string()))
    }

    fn spawn(&self, state: WorkflowState, session_id: String) -> SessionHandle {
        let (events, event_rx) = EventSender::channel(session_id.clone());
        let (resume_tx, resume_rx) = mpsc::channel(RESUME_QUEUE_CAPACITY);
        let cancel = CancellationToken::new();

        let graph = self.clone();
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            graph.drive(state, events, resume_rx, task_cancel).await;
        });

        SessionHandle {
            session_id,
            events: event_rx,
            resume_tx,
            cancel,
        }
    }

    async fn drive(
        self,
        mut state: WorkflowState,
        events: EventSender,
        mut resume_rx: mpsc::Receiver<Value>,
        cancel: CancellationToken,
    ) {
        let forwarder = self.spawn_progress_forwarder(events.clone(), cancel.clone());

        let status = self
            .decision_loop(&mut state, &events, &mut resume_rx, &cancel)
            .await;

        // Always leave a snapshot behind, whatever ended the loop.
        self.checkpoint(&state).await;
        forwarder.abort();

        let artifacts = json!({
            "generated_files": state
                .generated_files
                .iter()
                .map(|f| f.path.clone())
                .collect::<Vec<_>>(),
            "architecture": state.architecture,
            "iterations": state.iteration,
        });
        events
            .complete(status, state.user_response.clone(), artifacts)
            .await;
        tracing::info!(session = %state.session_id, status, "session finished");
    }

    /// The decision loop proper. Returns the terminal status string.
    async fn decision_loop(
        &self,
        state: &mut WorkflowState,
        events: &EventSender,
        resume_rx: &mut mpsc::Receiver<Value>,
        cancel: &CancellationToken,
    ) -> &'static str {
        loop {
            if cancel.is_cancelled() {
                return "cancelled";
            }

            // Iteration budget: one responder run, then out.
            if state.iteration >= self.settings.max_iterations {
                let record = ErrorRecord::new(format!(
                    "iteration budget of {} exhausted",
                    self.settings.max_iterations
                ))
                .with_guidance("narrow the request or split it into smaller goals");
                events.error(&record.message, None).await;
                state.record_error(record);
                self.run_responder_once(state, events, cancel).await;
                return "incomplete";
            }

            // Supervisor decision. Iteration increments per decision and is
            // strictly monotonic within the session.
            events.node_started("supervisor", Vec::new()).await;
            state.iteration += 1;

            let decision = tokio::select! {
                _ = cancel.cancelled() => return "cancelled",
                decision = self.supervisor.decide(state) => decision,
            };

            let command = match decision {
                Ok(command) => command,
                Err(e) => {
                    let record = ErrorRecord::new(format!("supervisor failed: {e}"))
                        .with_guidance(e.user_guidance());
                    events.error(&record.message, None).await;
                    state.record_error(record);

                    if state.error_count >= self.settings.max_errors {
                        self.run_responder_once(state, events, cancel).await;
                        return "failed";
                    }
                    // The supervisor cannot route; ask the human instead.
                    RoutingCommand::new(Goto::Hitl).with_update(StatePatch {
                        requires_clarification: Some(true),
                        ..Default::default()
                    })
                }
            };

            let updated_keys: Vec<String> = command
                .update
                .updated_keys()
                .iter()
                .map(|k| k.to_string())
                .collect();
            state.apply(command.update);
            self.checkpoint(state).await;

            match command.goto {
                Goto::End => {
                    // The responder always gets one run before termination.
                    if !state.response_ready {
                        self.run_responder_once(state, events, cancel).await;
                    }
                    return terminal_status(state);
                }

                Goto::Hitl => {
                    events.node_started("hitl", updated_keys).await;
                    match self.hitl_pause(state, events, resume_rx, cancel).await {
                        HitlOutcome::Resumed => continue,
                        HitlOutcome::Cancelled => return "cancelled",
                        HitlOutcome::Aborted | HitlOutcome::ClientGone => {
                            self.run_responder_once(state, events, cancel).await;
                            return "failed";
                        }
                    }
                }

                Goto::Agent(agent) => {
                    events.node_started(agent.server(), updated_keys).await;
                    let result = tokio::select! {
                        _ = cancel.cancelled() => return "cancelled",
                        result = nodes::run_agent(self.dispatch.as_ref(), agent, state) => result,
                    };

                    match result {
                        Ok(patch) => state.apply(patch),
                        Err(e) => {
                            let record = ErrorRecord::new(e.to_string())
                                .with_agent(agent.server())
                                .with_guidance(e.user_guidance());
                            events
                                .error(&record.message, Some(agent.server().to_string()))
                                .await;
                            state.record_error(record);
                            state.last_agent = Some(agent);
                            // Back to the supervisor; its error-budget gate
                            // diverts to HITL once the budget is gone.
                        }
                    }
                    self.checkpoint(state).await;
                }
            }
        }
    }

    /// Suspend until the client answers the clarification request.
    async fn hitl_pause(
        &self,
        state: &mut WorkflowState,
        events: &EventSender,
        resume_rx: &mut mpsc::Receiver<Value>,
        cancel: &CancellationToken,
    ) -> HitlOutcome {
        let prompt = clarification_prompt(state);
        state.requires_clarification = true;
        state.awaiting_human = true;
        // Checkpoint before the prompt goes out: a client that reacts to
        // the event must already be able to observe the paused session.
        self.checkpoint(state).await;
        events.agent_status("hitl", &prompt, 0.0).await;

        let payload = tokio::select! {
            _ = cancel.cancelled() => return HitlOutcome::Cancelled,
            payload = resume_rx.recv() => payload,
        };

        let payload = match payload {
            Some(payload) => payload,
            None => {
                state.record_error(
                    ErrorRecord::new("clarification channel closed while awaiting input")
                        .with_guidance("reconnect and restart the session"),
                );
                return HitlOutcome::ClientGone;
            }
        };

        tracing::info!(session = %state.session_id, "HITL response received");
        state.hitl_response = Some(payload.clone());
        state.requires_clarification = false;
        state.awaiting_human = false;
        state
            .messages
            .push(ChatTurn::new("user", payload.to_string()));

        let instructions = payload
            .get("instructions")
            .and_then(Value::as_str)
            .map(String::from);
        let selection = payload.get("selection").and_then(Value::as_u64);

        match (instructions, selection) {
            (Some(instructions), _) => state.instructions = instructions,
            (None, Some(1)) => {
                state.instructions = format!(
                    "Proceed with the most likely interpretation of: {}",
                    state.goal
                );
            }
            (None, Some(3)) => return HitlOutcome::Aborted,
            _ => {
                state.instructions = format!(
                    "Continue with the original request: {}",
                    state.goal
                );
            }
        }

        // A clarified session should not bounce straight back into HITL.
        state.confidence = state.confidence.max(self.settings.confidence_threshold);
        self.checkpoint(state).await;
        HitlOutcome::Resumed
    }

    /// Run the responder exactly once, with a deterministic fallback so a
    /// failure report exists even when the responder itself fails.
    async fn run_responder_once(
        &self,
        state: &mut WorkflowState,
        events: &EventSender,
        cancel: &CancellationToken,
    ) {
        if state.response_ready || cancel.is_cancelled() {
            return;
        }
        events.node_started("responder", Vec::new()).await;

        let result = tokio::select! {
            _ = cancel.cancelled() => return,
            result = nodes::run_agent(self.dispatch.as_ref(), AgentName::Responder, state) => result,
        };

        match result {
            Ok(patch) => state.apply(patch),
            Err(e) => {
                tracing::error!(error = %e, "responder failed, using fallback report");
                state.user_response = Some(fallback_report(state));
                state.response_ready = true;
            }
        }
        self.checkpoint(state).await;
    }

    fn spawn_progress_forwarder(
        &self,
        events: EventSender,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let mut progress = self.dispatch.progress_events();
        tokio::spawn(async move {
            loop {
                let update = tokio::select! {
                    _ = cancel.cancelled() => break,
                    update = progress.recv() => update,
                };
                match update {
                    Ok(update) => {
                        events
                            .agent_status(&update.server, &update.message, update.progress)
                            .await;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "progress forwarder lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    async fn checkpoint(&self, state: &WorkflowState) {
        let snapshot = match serde_json::to_value(state) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::error!(error = %e, "state failed to serialize, skipping checkpoint");
                return;
            }
        };
        let checkpoint = SessionCheckpoint::new(&state.session_id, state.iteration, snapshot);
        if let Err(e) = self.checkpointer.put(checkpoint).await {
            tracing::warn!(session = %state.session_id, error = %e, "checkpoint write failed");
        }
    }
}

enum HitlOutcome {
    Resumed,
    Aborted,
    Cancelled,
    ClientGone,
}

fn terminal_status(state: &WorkflowState) -> &'static str {
    if state.validation_passed && state.code_complete && state.response_ready {
        "success"
    } else if state.error_count > 0 {
        "failed"
    } else {
        "incomplete"
    }
}

/// Minimal failure report used when the responder worker itself cannot
/// run. Same headings the responder produces, so clients see one format.
fn fallback_report(state: &WorkflowState) -> String {
    let mut parts = vec![
        "## Task Incomplete\n".to_string(),
        format!("**Request:** {}\n", state.goal),
    ];

    if !state.generated_files.is_empty() {
        parts.push("### Generated Files\n".to_string());
        for file in &state.generated_files {
            parts.push(format!("- `{}`", file.path));
        }
        parts.push(String::new());
    }

    if !state.errors.is_empty() {
        parts.push("### What Went Wrong\n".to_string());
        for error in &state.errors {
            parts.push(format!("- {}", error.message));
            if let Some(guidance) = &error.user_guidance {
                parts.push(format!("  - Try: {guidance}"));
            }
        }
        parts.push(String::new());
    }

    parts.push("### Next Steps\n".to_string());
    parts.push("Rephrase or narrow the request and run again.".to_string());
    parts.join("\n")
}

/// Structured clarification request: the ambiguity, numbered options, and
/// the reply format.
fn clarification_prompt(state: &WorkflowState) -> String {
    let reason = state
        .errors
        .last()
        .map(|e| e.message.clone())
        .or_else(|| state.research_request.clone())
        .unwrap_or_else(|| format!("The request \"{}\" is ambiguous.", state.goal));

    format!(
        "Clarification needed: {reason}\n\
         \n\
         Options:\n\
         1. Proceed with the most likely interpretation\n\
         2. Provide more details or constraints\n\
         3. Abort the session\n\
         \n\
         Reply with {{\"selection\": <number>}} or {{\"instructions\": \"<your guidance>\"}}."
    )
}
