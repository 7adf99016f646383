use crate::error::{Result, WorkflowError};
use std::path::PathBuf;
use std::time::Duration;

/// Immutable runtime configuration, read once at startup from the
/// environment.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Target workspace. Must exist and be writable (the server's startup
    /// guard verifies this).
    pub workspace_path: PathBuf,
    pub server_port: u16,
    /// Supervisor decisions per session before force-routing to the
    /// responder.
    pub max_iterations: u64,
    /// Error records before the session must go to HITL or terminate.
    pub max_errors: u32,
    /// Routing confidence below this forces HITL.
    pub confidence_threshold: f64,
    /// Default per-call timeout for orchestrator calls.
    pub call_timeout: Duration,
    /// Per-line read timeout on worker stdout.
    pub read_timeout: Duration,
}

impl Settings {
    /// Read settings from the environment. Only `WORKSPACE_PATH` is
    /// required; everything else has a documented default.
    pub fn from_env() -> Result<Self> {
        let workspace_path = std::env::var("WORKSPACE_PATH")
            .map_err(|_| WorkflowError::Config("WORKSPACE_PATH is not set".to_string()))?;

        Ok(Self {
            workspace_path: PathBuf::from(workspace_path),
            server_port: env_parse("SERVER_PORT", 8002)?,
            max_iterations: env_parse("MAX_ITERATIONS", 20)?,
            max_errors: env_parse("MAX_ERRORS", 3)?,
            confidence_threshold: env_parse("SUPERVISOR_CONFIDENCE_THRESHOLD", 0.5)?,
            call_timeout: Duration::from_secs(env_parse("DEFAULT_CALL_TIMEOUT_S", 120u64)?),
            read_timeout: Duration::from_secs(env_parse("READ_TIMEOUT_S", 15u64)?),
        })
    }

    /// Settings with spec defaults for a given workspace; used by tests and
    /// embedded callers.
    pub fn with_workspace(workspace_path: impl Into<PathBuf>) -> Self {
        Self {
            workspace_path: workspace_path.into(),
            server_port: 8002,
            max_iterations: 20,
            max_errors: 3,
            confidence_threshold: 0.5,
            call_timeout: Duration::from_secs(120),
            read_timeout: Duration::from_secs(15),
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: u64) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_max_errors(mut self, max_errors: u32) -> Self {
        self.max_errors = max_errors;
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .parse()
            .map_err(|_| WorkflowError::Config(format!("{key} has an invalid value: {raw}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::with_workspace("/tmp/ws");
        assert_eq!(settings.server_port, 8002);
        assert_eq!(settings.max_iterations, 20);
        assert_eq!(settings.max_errors, 3);
        assert_eq!(settings.confidence_threshold, 0.5);
        assert_eq!(settings.call_timeout, Duration::from_secs(120));
        assert_eq!(settings.read_timeout, Duration::from_secs(15));
    }
}
