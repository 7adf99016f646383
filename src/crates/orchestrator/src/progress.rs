use serde::{Deserialize, Serialize};

/// One forwarded `$/progress` notification.
///
/// Published on the orchestrator's broadcast channel; the streaming
/// interface is the intended subscriber. `progress` is clamped to
/// `[0.0, 1.0]` before publication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// Worker that emitted the notification.
    pub server: String,
    pub message: String,
    pub progress: f64,
}

impl ProgressUpdate {
    pub fn new(server: impl Into<String>, message: impl Into<String>, progress: f64) -> Self {
        Self {
            server: server.into(),
            message: message.into(),
            progress: progress.clamp(0.0, 1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_is_clamped() {
        assert_eq!(ProgressUpdate::new("w", "m", 1.7).progress, 1.0);
        assert_eq!(ProgressUpdate::new("w", "m", -0.2).progress, 0.0);
    }
}
