//! The maestro host server.
//!
//! Wires the orchestrator, the checkpoint store, and the workflow graph
//! together behind a WebSocket endpoint speaking the client envelope
//! contract (`start`, `hitl_response`, `cancel` in; the workflow event
//! stream out). Exit codes: 0 clean shutdown, 1 startup failure, 2 fatal
//! runtime error.

mod sessions;
mod startup;
mod ws;

use maestro_checkpoint::{CheckpointSaver, SqliteSaver};
use maestro_llm::{GatedChatModel, OpenAiClient, RateLimiter};
use maestro_orchestrator::{Orchestrator, OrchestratorConfig, WorkerSpec};
use maestro_workflow::{Settings, Supervisor, WorkflowGraph};
use sessions::SessionRegistry;
use startup::StartupError;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub graph: WorkflowGraph,
    pub orchestrator: Arc<Orchestrator>,
    pub sessions: SessionRegistry,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => {
            tracing::info!("clean shutdown");
            ExitCode::SUCCESS
        }
        Err(e) if e.is::<StartupError>() => {
            eprintln!("startup failed: {e}");
            ExitCode::from(1)
        }
        Err(e) => {
            eprintln!("fatal runtime error: {e}");
            ExitCode::from(2)
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let settings = Settings::from_env().map_err(|e| StartupError::new(e.to_string()))?;
    startup::init_logging()?;
    startup::guard(&settings)?;

    // One worker subprocess per agent.
    let worker_bin = startup::worker_binary()?;
    let workers: Vec<WorkerSpec> = maestro_workflow::AgentName::ALL
        .iter()
        .map(|agent| WorkerSpec::agent(agent.server(), worker_bin.clone()))
        .collect();
    let orchestrator_config = OrchestratorConfig::new(workers, settings.workspace_path.clone())
        .with_call_timeout(settings.call_timeout)
        .with_read_timeout(settings.read_timeout);
    let orchestrator = Arc::new(Orchestrator::new(orchestrator_config));
    orchestrator
        .initialize()
        .await
        .map_err(|e| StartupError::new(format!("worker startup failed: {e}")))?;

    let checkpointer: Arc<dyn CheckpointSaver> = Arc::new(
        SqliteSaver::open(startup::checkpoint_db_path()?)
            .await
            .map_err(|e| StartupError::new(format!("checkpoint store failed: {e}")))?,
    );

    let model = OpenAiClient::from_env()
        .map_err(|e| StartupError::new(format!("LLM client failed: {e}")))?;
    let supervisor = Arc::new(Supervisor::new(
        Arc::new(GatedChatModel::new(Arc::new(model), RateLimiter::default())),
        settings.clone(),
    ));

    let graph = WorkflowGraph::new(
        orchestrator.clone(),
        checkpointer,
        supervisor,
        settings.clone(),
    );

    let state = AppState {
        graph,
        orchestrator: orchestrator.clone(),
        sessions: SessionRegistry::new(),
    };

    let app = axum::Router::new()
        .route("/health", axum::routing::get(ws::health_handler))
        .route("/ws", axum::routing::get(ws::ws_handler))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state);

    let listener = startup::bind(settings.server_port).await?;
    tracing::info!(port = settings.server_port, "maestro server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    orchestrator.close().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutdown signal received");
}
