use maestro_checkpoint::{CheckpointSaver, SessionCheckpoint, SqliteSaver};
use serde_json::json;

fn sample_state(step: u64) -> serde_json::Value {
    json!({
        "goal": "Create a FastAPI calculator",
        "iteration": step,
        "errors": [],
        "confidence": 0.9,
    })
}

#[tokio::test]
async fn test_put_and_get_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let saver = SqliteSaver::open(dir.path().join("checkpoints.db"))
        .await
        .unwrap();

    let checkpoint = SessionCheckpoint::new("session-1", 3, sample_state(3));
    saver.put(checkpoint.clone()).await.unwrap();

    let loaded = saver.get("session-1", 3).await.unwrap().unwrap();
    assert_eq!(loaded.session_id, checkpoint.session_id);
    assert_eq!(loaded.iteration, checkpoint.iteration);
    assert_eq!(loaded.state, checkpoint.state);
}

#[tokio::test]
async fn test_latest_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("checkpoints.db");

    {
        let saver = SqliteSaver::open(&path).await.unwrap();
        for iteration in 0..5u64 {
            saver
                .put(SessionCheckpoint::new(
                    "session-1",
                    iteration,
                    sample_state(iteration),
                ))
                .await
                .unwrap();
        }
    }

    // Reopen the same file: snapshots must survive the "restart".
    let saver = SqliteSaver::open(&path).await.unwrap();
    let latest = saver.latest("session-1").await.unwrap().unwrap();
    assert_eq!(latest.iteration, 4);
    assert_eq!(latest.state["iteration"], json!(4));
}

#[tokio::test]
async fn test_list_ordered_and_sessions_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let saver = SqliteSaver::open(dir.path().join("checkpoints.db"))
        .await
        .unwrap();

    for iteration in [2u64, 0, 1] {
        saver
            .put(SessionCheckpoint::new("a", iteration, sample_state(iteration)))
            .await
            .unwrap();
    }
    saver
        .put(SessionCheckpoint::new("b", 9, sample_state(9)))
        .await
        .unwrap();

    let listed = saver.list("a").await.unwrap();
    let iterations: Vec<u64> = listed.iter().map(|c| c.iteration).collect();
    assert_eq!(iterations, vec![0, 1, 2]);

    assert!(saver.get("a", 9).await.unwrap().is_none());
    assert_eq!(saver.latest("b").await.unwrap().unwrap().iteration, 9);
}

#[tokio::test]
async fn test_replace_same_key_keeps_one_row() {
    let dir = tempfile::tempdir().unwrap();
    let saver = SqliteSaver::open(dir.path().join("checkpoints.db"))
        .await
        .unwrap();

    saver
        .put(SessionCheckpoint::new("s", 1, json!({"v": "old"})))
        .await
        .unwrap();
    saver
        .put(SessionCheckpoint::new("s", 1, json!({"v": "new"})))
        .await
        .unwrap();

    let listed = saver.list("s").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].state["v"], json!("new"));
}

#[tokio::test]
async fn test_missing_session_yields_none() {
    let dir = tempfile::tempdir().unwrap();
    let saver = SqliteSaver::open(dir.path().join("checkpoints.db"))
        .await
        .unwrap();

    assert!(saver.latest("ghost").await.unwrap().is_none());
    assert!(saver.list("ghost").await.unwrap().is_empty());
}
