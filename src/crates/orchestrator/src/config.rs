use std::path::PathBuf;
use std::time::Duration;

/// How to launch one worker subprocess.
#[derive(Debug, Clone)]
pub struct WorkerSpec {
    /// Logical worker name used for routing ("research", "codesmith", ...).
    pub name: String,
    /// Program to execute.
    pub program: PathBuf,
    /// Arguments passed to the program.
    pub args: Vec<String>,
}

impl WorkerSpec {
    /// Spec for a maestro agent worker: `<worker_bin> --agent <name>`.
    pub fn agent(name: impl Into<String>, worker_bin: impl Into<PathBuf>) -> Self {
        let name = name.into();
        Self {
            program: worker_bin.into(),
            args: vec!["--agent".to_string(), name.clone()],
            name,
        }
    }
}

/// Orchestrator construction parameters.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Workers to spawn and supervise.
    pub workers: Vec<WorkerSpec>,
    /// Workspace root injected into every `tools/call` argument set.
    pub workspace_path: PathBuf,
    /// Directory the subprocesses run in (the project root, never the
    /// workspace, which may not exist yet). `None` inherits ours.
    pub working_dir: Option<PathBuf>,
    /// Default per-call wall-clock timeout.
    pub call_timeout: Duration,
    /// Per-line read timeout while waiting on a worker's stdout.
    pub read_timeout: Duration,
    /// Timeout for each handshake step (`initialize`, `tools/list`).
    pub handshake_timeout: Duration,
    /// Respawn dead workers on the next call targeting them.
    pub auto_reconnect: bool,
    /// Capacity of the progress broadcast channel.
    pub progress_capacity: usize,
    /// Environment variables forwarded to workers. Everything else is
    /// dropped so per-session state cannot leak through the environment.
    pub pass_env: Vec<String>,
}

impl OrchestratorConfig {
    /// Config with spec defaults for the given workers and workspace.
    pub fn new(workers: Vec<WorkerSpec>, workspace_path: impl Into<PathBuf>) -> Self {
        Self {
            workers,
            workspace_path: workspace_path.into(),
            working_dir: None,
            call_timeout: Duration::from_secs(120),
            read_timeout: Duration::from_secs(15),
            handshake_timeout: Duration::from_secs(5),
            auto_reconnect: true,
            progress_capacity: 256,
            pass_env: default_pass_env(),
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_auto_reconnect(mut self, auto_reconnect: bool) -> Self {
        self.auto_reconnect = auto_reconnect;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

fn default_pass_env() -> Vec<String> {
    // API keys the agents need, plus enough to execute at all.
    ["OPENAI_API_KEY", "PERPLEXITY_API_KEY", "RUST_LOG", "PATH", "HOME"]
        .into_iter()
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_spec_arguments() {
        let spec = WorkerSpec::agent("research", "/usr/local/bin/maestro-worker");
        assert_eq!(spec.name, "research");
        assert_eq!(spec.args, vec!["--agent", "research"]);
    }

    #[test]
    fn test_config_defaults() {
        let config = OrchestratorConfig::new(vec![], "/tmp/ws");
        assert_eq!(config.call_timeout, Duration::from_secs(120));
        assert_eq!(config.read_timeout, Duration::from_secs(15));
        assert_eq!(config.handshake_timeout, Duration::from_secs(5));
        assert!(config.auto_reconnect);
        assert!(config.pass_env.iter().any(|k| k == "OPENAI_API_KEY"));
    }
}
