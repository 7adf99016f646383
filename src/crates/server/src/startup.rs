//! Startup guard, logging, and port acquisition.
//!
//! Refuses to start when the workspace or the required API key is missing,
//! and distinguishes startup failures (exit 1) from runtime failures
//! (exit 2) via [`StartupError`].

use maestro_workflow::Settings;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Marker error type: anything wrapping this exits with code 1.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct StartupError {
    message: String,
}

impl StartupError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Verify the process can actually do its job before binding anything:
/// the workspace must exist and be writable, and the critical API key must
/// be present.
pub fn guard(settings: &Settings) -> Result<(), StartupError> {
    if std::env::var("OPENAI_API_KEY").is_err() {
        return Err(StartupError::new(
            "OPENAI_API_KEY is not set; the supervisor and agents cannot run without it",
        ));
    }

    let workspace = &settings.workspace_path;
    if !workspace.is_absolute() {
        return Err(StartupError::new(format!(
            "WORKSPACE_PATH must be absolute: {}",
            workspace.display()
        )));
    }
    if !workspace.is_dir() {
        return Err(StartupError::new(format!(
            "workspace does not exist or is not a directory: {}",
            workspace.display()
        )));
    }

    // Writability probe: create and remove a marker file.
    let probe = workspace.join(".maestro-write-probe");
    std::fs::write(&probe, b"probe")
        .and_then(|_| std::fs::remove_file(&probe))
        .map_err(|e| {
            StartupError::new(format!(
                "workspace is not writable ({}): {e}",
                workspace.display()
            ))
        })?;

    Ok(())
}

/// Logs go to stderr and to one file per invocation under `.logs/`.
pub fn init_logging() -> anyhow::Result<()> {
    std::fs::create_dir_all(".logs")?;
    let log_path = format!(
        ".logs/maestro-server-{}.log",
        chrono::Utc::now().format("%Y%m%d-%H%M%S")
    );
    let log_file = std::fs::File::create(&log_path)?;

    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::registry()
        .with(EnvFilter::new(rust_log))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(std::sync::Arc::new(log_file)),
        )
        .init();

    tracing::info!(log_file = %log_path, "logging initialized");
    Ok(())
}

/// Locate the worker binary: `MAESTRO_WORKER_BIN`, or a sibling of this
/// executable.
pub fn worker_binary() -> Result<PathBuf, StartupError> {
    if let Ok(explicit) = std::env::var("MAESTRO_WORKER_BIN") {
        let path = PathBuf::from(explicit);
        if path.is_file() {
            return Ok(path);
        }
        return Err(StartupError::new(format!(
            "MAESTRO_WORKER_BIN does not exist: {}",
            path.display()
        )));
    }

    let sibling = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("maestro-worker")));
    match sibling {
        Some(path) if path.is_file() => Ok(path),
        _ => Err(StartupError::new(
            "maestro-worker binary not found; set MAESTRO_WORKER_BIN",
        )),
    }
}

/// Checkpoint database location: `MAESTRO_DB_PATH` or `.maestro/checkpoints.db`.
pub fn checkpoint_db_path() -> anyhow::Result<PathBuf> {
    let path = std::env::var("MAESTRO_DB_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(".maestro/checkpoints.db"));
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(path)
}

/// Bind the server port. A busy port gets one delayed retry (a previous
/// instance may still be letting go), then startup fails.
pub async fn bind(port: u16) -> Result<TcpListener, StartupError> {
    let addr = format!("0.0.0.0:{port}");
    match TcpListener::bind(&addr).await {
        Ok(listener) => Ok(listener),
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            tracing::warn!(port, "port busy, retrying once after a short delay");
            tokio::time::sleep(Duration::from_secs(2)).await;
            TcpListener::bind(&addr).await.map_err(|e| {
                StartupError::new(format!("port {port} still in use after retry: {e}"))
            })
        }
        Err(e) => Err(StartupError::new(format!("failed to bind {addr}: {e}"))),
    }
}
