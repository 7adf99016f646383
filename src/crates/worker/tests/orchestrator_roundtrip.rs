//! End-to-end protocol tests: a real orchestrator driving real worker
//! subprocesses (the `mock` agent of this crate's binary).

use maestro_orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorError, WorkerSpec};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;

fn mock_worker(name: &str) -> WorkerSpec {
    WorkerSpec {
        name: name.to_string(),
        program: PathBuf::from(env!("CARGO_BIN_EXE_maestro-worker")),
        args: vec!["--agent".to_string(), "mock".to_string()],
    }
}

async fn start(workers: Vec<WorkerSpec>, workspace: &std::path::Path) -> Orchestrator {
    let orchestrator = Orchestrator::new(OrchestratorConfig::new(workers, workspace));
    orchestrator.initialize().await.expect("workers must start");
    orchestrator
}

fn payload(result: &Value) -> Value {
    let text = maestro_protocol::tool_text(result).expect("text envelope");
    serde_json::from_str(text).expect("payload is JSON")
}

#[tokio::test]
async fn test_call_round_trip_injects_workspace() {
    let ws = tempfile::tempdir().unwrap();
    let orchestrator = start(vec![mock_worker("mock-a")], ws.path()).await;

    let result = orchestrator
        .call("mock-a", "echo", json!({ "value": 42 }), None)
        .await
        .unwrap();

    let payload = payload(&result);
    assert_eq!(payload["echo"]["value"], json!(42));
    // The orchestrator injected the workspace path into the arguments.
    assert_eq!(
        payload["echo"]["workspace_path"],
        json!(ws.path().to_string_lossy())
    );

    orchestrator.close().await;
}

#[tokio::test]
async fn test_progress_forwarded_before_response() {
    let ws = tempfile::tempdir().unwrap();
    let orchestrator = start(vec![mock_worker("mock-a")], ws.path()).await;
    let mut progress = orchestrator.subscribe_progress();

    orchestrator
        .call("mock-a", "echo", json!({ "progress_frames": 3 }), None)
        .await
        .unwrap();

    // The call has returned, so all three updates are already buffered:
    // progress is always delivered before the response it precedes.
    for i in 1..=3u64 {
        let update = progress.try_recv().expect("progress update buffered");
        assert_eq!(update.server, "mock-a");
        assert!(update.message.contains(&format!("{i}/3")));
        assert!(update.progress > 0.0 && update.progress <= 1.0);
    }
    assert!(progress.try_recv().is_err());

    orchestrator.close().await;
}

#[tokio::test]
async fn test_parallel_calls_to_different_workers_keep_input_order() {
    let ws = tempfile::tempdir().unwrap();
    let orchestrator = start(vec![mock_worker("mock-a"), mock_worker("mock-b")], ws.path()).await;

    let results = orchestrator
        .call_multiple(vec![
            (
                "mock-a".to_string(),
                "echo".to_string(),
                json!({ "sleep_ms": 200, "tag": "slow" }),
            ),
            (
                "mock-b".to_string(),
                "echo".to_string(),
                json!({ "tag": "fast" }),
            ),
        ])
        .await;

    assert_eq!(results.len(), 2);
    let first = payload(results[0].as_ref().unwrap());
    let second = payload(results[1].as_ref().unwrap());
    assert_eq!(first["echo"]["tag"], json!("slow"));
    assert_eq!(second["echo"]["tag"], json!("fast"));

    orchestrator.close().await;
}

#[tokio::test]
async fn test_sequential_calls_to_same_worker() {
    let ws = tempfile::tempdir().unwrap();
    let orchestrator = start(vec![mock_worker("mock-a")], ws.path()).await;

    for tag in ["first", "second"] {
        let result = orchestrator
            .call("mock-a", "echo", json!({ "tag": tag }), None)
            .await
            .unwrap();
        assert_eq!(payload(&result)["echo"]["tag"], json!(tag));
    }

    orchestrator.close().await;
}

#[tokio::test]
async fn test_call_timeout_then_worker_recovers() {
    let ws = tempfile::tempdir().unwrap();
    let orchestrator = start(vec![mock_worker("mock-a")], ws.path()).await;

    // The worker emits progress but no response within the deadline.
    let err = orchestrator
        .call(
            "mock-a",
            "echo",
            json!({ "progress_frames": 2, "sleep_ms": 1500 }),
            Some(Duration::from_millis(200)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::Timeout { .. }));

    // The next call succeeds: the stale response is discarded by id
    // mismatch, leaving no orphaned frames in the buffer.
    let result = orchestrator
        .call("mock-a", "echo", json!({ "tag": "after-timeout" }), None)
        .await
        .unwrap();
    assert_eq!(payload(&result)["echo"]["tag"], json!("after-timeout"));

    orchestrator.close().await;
}

#[tokio::test]
async fn test_worker_crash_reconnects_and_retries_once() {
    let ws = tempfile::tempdir().unwrap();
    let orchestrator = start(vec![mock_worker("mock-a")], ws.path()).await;

    let marker = ws.path().join("crash-marker");
    let result = orchestrator
        .call(
            "mock-a",
            "echo",
            json!({ "crash_once_marker": marker.to_string_lossy() }),
            None,
        )
        .await
        .unwrap();

    // First attempt crashed the worker mid-call; the orchestrator respawned
    // it and the single retry succeeded.
    assert!(marker.exists());
    assert!(payload(&result)["echo"]["crash_once_marker"].is_string());

    orchestrator.close().await;
}

#[tokio::test]
async fn test_tool_failure_maps_to_tool_error() {
    let ws = tempfile::tempdir().unwrap();
    let orchestrator = start(vec![mock_worker("mock-a")], ws.path()).await;

    let err = orchestrator
        .call("mock-a", "echo", json!({ "fail": "boom" }), None)
        .await
        .unwrap_err();
    match err {
        OrchestratorError::Tool { code, message, .. } => {
            assert_eq!(code, maestro_protocol::codes::TOOL_ERROR);
            assert!(message.contains("boom"));
        }
        other => panic!("expected tool error, got {other}"),
    }

    orchestrator.close().await;
}

#[tokio::test]
async fn test_initialize_fails_loudly_for_missing_binary() {
    let ws = tempfile::tempdir().unwrap();
    let bad = WorkerSpec {
        name: "ghost".to_string(),
        program: PathBuf::from("/nonexistent/maestro-worker"),
        args: vec![],
    };
    let orchestrator = Orchestrator::new(OrchestratorConfig::new(
        vec![mock_worker("mock-a"), bad],
        ws.path(),
    ));

    let err = orchestrator.initialize().await.unwrap_err();
    match err {
        OrchestratorError::Startup { failures } => assert!(failures.contains("ghost")),
        other => panic!("expected startup failure, got {other}"),
    }

    orchestrator.close().await;
}
