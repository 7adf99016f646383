use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Immutable snapshot of a session's workflow state at one iteration.
///
/// The `state` payload is the JSON serialization of the workflow state; this
/// crate treats it as opaque so the storage layer carries no dependency on
/// the state's shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCheckpoint {
    pub session_id: String,
    pub iteration: u64,
    pub state: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl SessionCheckpoint {
    /// Create a snapshot stamped with the current time.
    pub fn new(session_id: impl Into<String>, iteration: u64, state: serde_json::Value) -> Self {
        Self {
            session_id: session_id.into(),
            iteration,
            state,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_checkpoint_round_trip() {
        let checkpoint = SessionCheckpoint::new("s-1", 4, json!({"goal": "build it"}));
        let encoded = serde_json::to_string(&checkpoint).unwrap();
        let decoded: SessionCheckpoint = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, checkpoint);
    }
}
