//! End-to-end decision-loop scenarios driven through the event stream,
//! with a scripted supervisor model and a scripted agent fleet.

use async_trait::async_trait;
use maestro_checkpoint::{CheckpointSaver, MemorySaver};
use maestro_llm::{ChatModel, ChatRequest, ChatResponse, LlmError};
use maestro_orchestrator::ProgressUpdate;
use maestro_workflow::{
    AgentDispatch, Settings, Supervisor, WorkflowError, WorkflowEvent, WorkflowGraph,
    WorkflowState,
};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};

/// Chat model that pops one canned routing reply per call.
struct ScriptedModel {
    replies: Mutex<VecDeque<Value>>,
}

impl ScriptedModel {
    fn new(replies: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
        })
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn chat(&self, _request: ChatRequest) -> maestro_llm::Result<ChatResponse> {
        let reply = self
            .replies
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| LlmError::Provider("supervisor script exhausted".to_string()))?;
        Ok(ChatResponse {
            content: reply.to_string(),
            model: "scripted".to_string(),
            usage: None,
        })
    }
}

/// Scripted agent fleet: per-server queues of payloads (or failures), with
/// optional progress emission, and a call log.
struct FakeFleet {
    payloads: Mutex<HashMap<String, VecDeque<Result<Value, String>>>>,
    progress_tx: broadcast::Sender<ProgressUpdate>,
    calls: Mutex<Vec<String>>,
    progress_on: Option<String>,
}

impl FakeFleet {
    fn new(scripts: Vec<(&str, Vec<Result<Value, String>>)>) -> Arc<Self> {
        let (progress_tx, _) = broadcast::channel(64);
        Arc::new(Self {
            payloads: Mutex::new(
                scripts
                    .into_iter()
                    .map(|(server, queue)| (server.to_string(), queue.into()))
                    .collect(),
            ),
            progress_tx,
            calls: Mutex::new(Vec::new()),
            progress_on: Some("research".to_string()),
        })
    }

    async fn call_log(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl AgentDispatch for FakeFleet {
    async fn call_tool(
        &self,
        server: &str,
        _tool: &str,
        _arguments: Value,
        _timeout: Option<Duration>,
    ) -> Result<Value, WorkflowError> {
        self.calls.lock().await.push(server.to_string());

        if self.progress_on.as_deref() == Some(server) {
            let _ = self
                .progress_tx
                .send(ProgressUpdate::new(server, "working", 1.0));
        }

        let payload = self
            .payloads
            .lock()
            .await
            .get_mut(server)
            .and_then(|queue| queue.pop_front());

        match payload {
            Some(Ok(payload)) => Ok(maestro_protocol::tool_text_result(payload.to_string())),
            Some(Err(message)) => Err(WorkflowError::Dispatch {
                server: server.to_string(),
                message,
            }),
            None => Err(WorkflowError::Dispatch {
                server: server.to_string(),
                message: "agent script exhausted".to_string(),
            }),
        }
    }

    fn progress_events(&self) -> broadcast::Receiver<ProgressUpdate> {
        self.progress_tx.subscribe()
    }
}

fn decide(goto: &str, instructions: &str, confidence: f64) -> Value {
    json!({
        "goto": goto,
        "update": { "instructions": instructions, "confidence": confidence }
    })
}

fn design_payload() -> Value {
    json!({
        "description": "FastAPI calculator with add/subtract endpoints",
        "components": [{ "name": "api", "responsibility": "HTTP endpoints" }],
        "file_structure": ["app/main.py"],
        "technologies": [{ "name": "FastAPI", "purpose": "web framework" }],
        "patterns": ["router per resource"],
        "data_flow": "request -> endpoint -> response",
    })
}

fn codegen_payload(content: &str) -> Value {
    json!({
        "generated_files": [
            { "path": "app/main.py", "language": "python", "content": content, "lines": 12 }
        ],
        "code_complete": true,
    })
}

fn review_pass_payload() -> Value {
    json!({ "validation_passed": true, "quality_score": 0.95, "remaining_errors": [] })
}

fn responder_payload(markdown: &str) -> Value {
    json!({ "user_response": markdown })
}

struct Harness {
    graph: WorkflowGraph,
    fleet: Arc<FakeFleet>,
    saver: Arc<MemorySaver>,
}

fn harness(
    supervisor_script: Vec<Value>,
    fleet: Arc<FakeFleet>,
    settings: Settings,
) -> Harness {
    let saver = Arc::new(MemorySaver::new());
    let supervisor = Arc::new(Supervisor::new(
        ScriptedModel::new(supervisor_script),
        settings.clone(),
    ));
    let graph = WorkflowGraph::new(
        fleet.clone(),
        saver.clone() as Arc<dyn CheckpointSaver>,
        supervisor,
        settings,
    );
    Harness { graph, fleet, saver }
}

async fn collect_events(handle: &mut maestro_workflow::SessionHandle) -> Vec<WorkflowEvent> {
    let mut events = Vec::new();
    while let Some(event) = handle.next_event().await {
        events.push(event);
    }
    events
}

fn node_sequence(events: &[WorkflowEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            WorkflowEvent::WorkflowEvent { node, .. } => Some(node.clone()),
            _ => None,
        })
        .collect()
}

fn completion(events: &[WorkflowEvent]) -> (String, Option<String>) {
    match events.last().expect("stream must end with completion") {
        WorkflowEvent::WorkflowComplete {
            status,
            user_response,
            ..
        } => (status.clone(), user_response.clone()),
        other => panic!("last event is not workflow_complete: {other:?}"),
    }
}

async fn final_state(saver: &MemorySaver, session_id: &str) -> WorkflowState {
    let checkpoint = saver
        .latest(session_id)
        .await
        .unwrap()
        .expect("session must have checkpoints");
    serde_json::from_value(checkpoint.state).unwrap()
}

// Scenario A: happy path through all five agents.
#[tokio::test]
async fn test_scenario_a_happy_path() {
    let success_markdown = "## Implementation Complete\n\n### Generated Files\n- `app/main.py`";
    let fleet = FakeFleet::new(vec![
        (
            "research",
            vec![Ok(json!({ "workspace_analysis": { "file_count": 1 } }))],
        ),
        ("architect", vec![Ok(design_payload())]),
        ("codesmith", vec![Ok(codegen_payload("fastapi app"))]),
        ("reviewfix", vec![Ok(review_pass_payload())]),
        ("responder", vec![Ok(responder_payload(success_markdown))]),
    ]);
    let h = harness(
        vec![
            decide("research", "analyze the workspace", 0.9),
            decide("architect", "design the calculator", 0.9),
            decide("codesmith", "generate the code", 0.9),
            decide("reviewfix", "validate the code", 0.9),
            decide("responder", "format the final answer", 0.9),
            decide("end", "", 0.9),
        ],
        fleet,
        Settings::with_workspace("/tmp/ws"),
    );

    let mut handle = h.graph.start_session(
        "Create a FastAPI calculator with add/subtract endpoints",
        Some("scenario-a".to_string()),
    );
    let events = collect_events(&mut handle).await;

    assert_eq!(
        node_sequence(&events),
        vec![
            "supervisor",
            "research",
            "supervisor",
            "architect",
            "supervisor",
            "codesmith",
            "supervisor",
            "reviewfix",
            "supervisor",
            "responder",
        ]
    );

    // A research progress event was forwarded after the research node
    // started.
    let research_node_pos = events
        .iter()
        .position(|e| matches!(e, WorkflowEvent::WorkflowEvent { node, .. } if node == "research"))
        .unwrap();
    let progress_pos = events
        .iter()
        .position(|e| matches!(
            e,
            WorkflowEvent::AgentEvent { server, progress, .. }
                if server == "research" && *progress >= 1.0
        ))
        .expect("research progress must be forwarded");
    assert!(progress_pos > research_node_pos);

    let (status, response) = completion(&events);
    assert_eq!(status, "success");
    let response = response.unwrap();
    assert!(response.contains("Implementation Complete"));
    assert!(response.contains("Generated Files"));
    assert!(response.contains(".py"));

    let state = final_state(&h.saver, "scenario-a").await;
    assert!(state.response_ready);
    assert!(state.validation_passed);
}

// Scenario B: architect requests research, then designs on re-invocation.
#[tokio::test]
async fn test_scenario_b_architect_requests_research() {
    let fleet = FakeFleet::new(vec![
        (
            "architect",
            vec![
                Ok(json!({
                    "needs_research": true,
                    "research_request": "Verify the current FastAPI release"
                })),
                Ok(design_payload()),
            ],
        ),
        (
            "research",
            vec![Ok(json!({ "tech_verification": { "answer": "FastAPI 0.115" } }))],
        ),
        ("responder", vec![Ok(responder_payload("## Implementation Complete"))]),
    ]);
    let h = harness(
        vec![
            decide("architect", "design it", 0.9),
            decide("research", "verify FastAPI", 0.9),
            decide("architect", "redesign using the research findings", 0.9),
            decide("responder", "report", 0.9),
            decide("end", "", 0.9),
        ],
        fleet,
        Settings::with_workspace("/tmp/ws"),
    );

    let mut handle = h.graph.start_session("build it with FastAPI", Some("scenario-b".to_string()));
    let events = collect_events(&mut handle).await;

    // The architect ran twice with a research pass in between.
    assert_eq!(
        h.fleet.call_log().await,
        vec!["architect", "research", "architect", "responder"]
    );
    let (status, _) = completion(&events);
    assert_eq!(status, "incomplete"); // no code generated in this scenario

    let state = final_state(&h.saver, "scenario-b").await;
    assert!(state.architecture_complete);
    assert!(!state.needs_research);
    assert!(state.research_context.is_some());
}

// Scenario C: validation fails once, codesmith regenerates, then passes.
#[tokio::test]
async fn test_scenario_c_validation_fails_then_passes() {
    let fleet = FakeFleet::new(vec![
        (
            "codesmith",
            vec![
                Ok(codegen_payload("def add(a, b:\n    return a + b")),
                Ok(codegen_payload("def add(a, b):\n    return a + b")),
            ],
        ),
        (
            "reviewfix",
            vec![
                Ok(json!({
                    "validation_passed": false,
                    "quality_score": 0.2,
                    "remaining_errors": [
                        { "type": "SyntaxError", "message": "app/main.py: unclosed '('", "file": "app/main.py" }
                    ],
                })),
                Ok(review_pass_payload()),
            ],
        ),
        ("responder", vec![Ok(responder_payload("## Implementation Complete"))]),
    ]);
    let h = harness(
        vec![
            decide("codesmith", "generate the code", 0.9),
            decide("reviewfix", "validate", 0.9),
            decide("codesmith", "regenerate fixing the syntax error", 0.9),
            decide("reviewfix", "validate again", 0.9),
            decide("responder", "report", 0.9),
            decide("end", "", 0.9),
        ],
        fleet,
        Settings::with_workspace("/tmp/ws"),
    );

    let mut handle = h.graph.start_session("calculator", Some("scenario-c".to_string()));
    let events = collect_events(&mut handle).await;

    assert_eq!(
        node_sequence(&events),
        vec![
            "supervisor",
            "codesmith",
            "supervisor",
            "reviewfix",
            "supervisor",
            "codesmith",
            "supervisor",
            "reviewfix",
            "supervisor",
            "responder",
        ]
    );
    let (status, _) = completion(&events);
    assert_eq!(status, "success");

    let state = final_state(&h.saver, "scenario-c").await;
    assert!(state.validation_passed);
    assert!(state.issues.is_empty());
}

// Scenario D: low confidence routes to HITL; the session pauses and
// resumes on the user's selection.
#[tokio::test]
async fn test_scenario_d_low_confidence_hitl() {
    let fleet = FakeFleet::new(vec![(
        "responder",
        vec![Ok(responder_payload("## Task Incomplete"))],
    )]);
    let h = harness(
        vec![
            // The model wants architect but is unsure; the gate rewrites
            // this to hitl.
            decide("architect", "guess something", 0.2),
            decide("responder", "report", 0.9),
            decide("end", "", 0.9),
        ],
        fleet,
        Settings::with_workspace("/tmp/ws"),
    );

    let mut handle = h.graph.start_session("fix it", Some("scenario-d".to_string()));

    // Drain events until the clarification prompt appears.
    let mut saw_hitl_node = false;
    let mut clarification = None;
    while clarification.is_none() {
        match handle.next_event().await.expect("stream open") {
            WorkflowEvent::WorkflowEvent { node, .. } if node == "hitl" => saw_hitl_node = true,
            WorkflowEvent::AgentEvent {
                server, message, ..
            } if server == "hitl" => clarification = Some(message),
            _ => {}
        }
    }
    assert!(saw_hitl_node);
    let clarification = clarification.unwrap();
    assert!(clarification.contains("1."));
    assert!(clarification.contains("2."));
    assert!(clarification.contains("3."));

    // While paused, the checkpoint shows the session awaiting a human.
    let paused = final_state(&h.saver, "scenario-d").await;
    assert!(paused.awaiting_human);

    assert!(handle.resume_hitl(json!({ "selection": 1 })).await);
    let events = collect_events(&mut handle).await;
    let (status, response) = completion(&events);
    assert_eq!(status, "incomplete");
    assert!(response.unwrap().contains("Task Incomplete"));

    let state = final_state(&h.saver, "scenario-d").await;
    assert!(!state.awaiting_human);
    assert!(state.confidence >= 0.5);
    assert!(state.hitl_response.is_some());
    assert!(state.instructions.contains("most likely interpretation"));
}

// Scenario E: an agent call fails once; the error is recorded and the
// session still reaches the same outcome as the happy path.
#[tokio::test]
async fn test_scenario_e_agent_failure_recovers() {
    let fleet = FakeFleet::new(vec![
        (
            "codesmith",
            vec![
                Err("worker 'codesmith' process has died (exit code: Some(1))".to_string()),
                Ok(codegen_payload("fastapi app")),
            ],
        ),
        ("reviewfix", vec![Ok(review_pass_payload())]),
        ("responder", vec![Ok(responder_payload("## Implementation Complete"))]),
    ]);
    let h = harness(
        vec![
            decide("codesmith", "generate", 0.9),
            decide("codesmith", "retry the generation after the crash", 0.9),
            decide("reviewfix", "validate", 0.9),
            decide("responder", "report", 0.9),
            decide("end", "", 0.9),
        ],
        fleet,
        Settings::with_workspace("/tmp/ws"),
    );

    let mut handle = h.graph.start_session("calculator", Some("scenario-e".to_string()));
    let events = collect_events(&mut handle).await;

    assert!(events.iter().any(|e| matches!(
        e,
        WorkflowEvent::Error { agent: Some(agent), .. } if agent == "codesmith"
    )));
    let (status, _) = completion(&events);
    assert_eq!(status, "success");

    let state = final_state(&h.saver, "scenario-e").await;
    assert_eq!(state.error_count, 1);
    assert!(state.validation_passed);
}

// Scenario F: iteration budget exhaustion forces exactly one responder run
// and an incomplete report.
#[tokio::test]
async fn test_scenario_f_iteration_budget() {
    let incomplete_markdown = "## Task Incomplete\n\nPartial artifacts are listed above.";
    let fleet = FakeFleet::new(vec![
        (
            "architect",
            vec![
                Ok(json!({ "needs_research": true, "research_request": "a" })),
                Ok(json!({ "needs_research": true, "research_request": "b" })),
                Ok(json!({ "needs_research": true, "research_request": "c" })),
            ],
        ),
        ("responder", vec![Ok(responder_payload(incomplete_markdown))]),
    ]);
    let h = harness(
        vec![
            decide("architect", "design attempt one", 0.9),
            decide("architect", "design attempt two", 0.9),
            decide("architect", "design attempt three", 0.9),
        ],
        fleet,
        Settings::with_workspace("/tmp/ws").with_max_iterations(3),
    );

    let mut handle = h.graph.start_session("pathological goal", Some("scenario-f".to_string()));
    let events = collect_events(&mut handle).await;

    let nodes = node_sequence(&events);
    assert_eq!(
        nodes.iter().filter(|n| n.as_str() == "responder").count(),
        1
    );
    assert!(events.iter().any(|e| matches!(
        e,
        WorkflowEvent::Error { message, .. } if message.contains("iteration budget")
    )));

    let (status, response) = completion(&events);
    assert_eq!(status, "incomplete");
    assert!(response.unwrap().contains("Task Incomplete"));
}

// Cancellation: the session stops without a responder run and the state is
// checkpointed.
#[tokio::test]
async fn test_cancel_stops_session_and_checkpoints() {
    let fleet = FakeFleet::new(vec![(
        "responder",
        vec![Ok(responder_payload("## Task Incomplete"))],
    )]);
    let h = harness(
        vec![decide("architect", "guess", 0.2)],
        fleet,
        Settings::with_workspace("/tmp/ws"),
    );

    let mut handle = h.graph.start_session("fix it", Some("cancel-1".to_string()));

    // Wait for the HITL pause, then cancel instead of answering.
    loop {
        match handle.next_event().await.expect("stream open") {
            WorkflowEvent::AgentEvent { server, .. } if server == "hitl" => break,
            _ => {}
        }
    }
    handle.cancel();

    let events = collect_events(&mut handle).await;
    let (status, _) = completion(&events);
    assert_eq!(status, "cancelled");

    // No responder ran on the way out.
    assert!(h.fleet.call_log().await.is_empty());
    let state = final_state(&h.saver, "cancel-1").await;
    assert!(state.user_response.is_none());
}

// Resumption: a fresh graph continues a checkpointed session. The
// unanswered clarification survives the restart, so the resumed session
// pauses in HITL again before finishing.
#[tokio::test]
async fn test_resume_from_checkpoint() {
    let first_fleet = FakeFleet::new(vec![]);
    let h = harness(
        vec![decide("architect", "guess", 0.2)],
        first_fleet,
        Settings::with_workspace("/tmp/ws"),
    );

    let mut handle = h.graph.start_session("fix it", Some("resume-1".to_string()));
    loop {
        match handle.next_event().await.expect("stream open") {
            WorkflowEvent::AgentEvent { server, .. } if server == "hitl" => break,
            _ => {}
        }
    }
    handle.cancel();
    collect_events(&mut handle).await;

    // A new graph over the same checkpoint store, as after a restart. The
    // first decision is gated back to HITL by the pending clarification.
    let resumed_fleet = FakeFleet::new(vec![(
        "responder",
        vec![Ok(responder_payload("## Task Incomplete"))],
    )]);
    let resumed_supervisor = Arc::new(Supervisor::new(
        ScriptedModel::new(vec![
            decide("responder", "report what we have", 0.9),
            decide("responder", "report what we have", 0.9),
            decide("end", "", 0.9),
        ]),
        Settings::with_workspace("/tmp/ws"),
    ));
    let graph = WorkflowGraph::new(
        resumed_fleet,
        h.saver.clone() as Arc<dyn CheckpointSaver>,
        resumed_supervisor,
        Settings::with_workspace("/tmp/ws"),
    );

    let mut handle = graph.resume_session("resume-1").await.unwrap();
    loop {
        match handle.next_event().await.expect("stream open") {
            WorkflowEvent::AgentEvent { server, .. } if server == "hitl" => break,
            _ => {}
        }
    }
    assert!(handle.resume_hitl(json!({ "instructions": "just report" })).await);

    let events = collect_events(&mut handle).await;
    let (status, response) = completion(&events);
    assert_eq!(status, "incomplete");
    assert!(response.is_some());

    let state = final_state(&h.saver, "resume-1").await;
    assert!(state.response_ready);
    // Iterations continued past the pre-cancel count.
    assert!(state.iteration >= 2);
}
