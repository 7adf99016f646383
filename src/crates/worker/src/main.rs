//! The maestro agent worker binary.
//!
//! One subprocess hosts one agent: `maestro-worker --agent research`.
//! Protocol frames go over stdin/stdout; all logging goes to stderr so it
//! never corrupts the frame stream. Exit code 0 on clean EOF, non-zero on
//! fatal errors.

use clap::Parser;
use maestro_llm::{ChatModel, GatedChatModel, OpenAiClient, PerplexityClient, RateLimiter, WebSearch};
use maestro_worker::agents;
use maestro_worker::WorkerRuntime;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "maestro-worker", about = "maestro agent worker subprocess")]
struct Args {
    /// Agent to host: research, architect, codesmith, reviewfix, responder,
    /// or mock (test only).
    #[arg(long)]
    agent: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Stdout carries protocol frames; logs must go to stderr.
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(rust_log)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(&args.agent).await {
        tracing::error!(agent = %args.agent, error = %e, "worker failed");
        std::process::exit(1);
    }
}

async fn run(agent: &str) -> maestro_worker::Result<()> {
    let model: Option<Arc<dyn ChatModel>> = if agents::agent_needs_model(agent) {
        let client = OpenAiClient::from_env()?;
        let gated = GatedChatModel::new(Arc::new(client), RateLimiter::default());
        Some(Arc::new(gated))
    } else {
        None
    };

    let web: Option<Arc<dyn WebSearch>> = match PerplexityClient::from_env() {
        Some(client) => Some(Arc::new(client)),
        None => {
            if agent == "research" {
                tracing::info!("PERPLEXITY_API_KEY not set, research runs without web search");
            }
            None
        }
    };

    let registry = agents::registry_for(agent, model, web)?;
    let runtime = WorkerRuntime::new(agent, registry);
    runtime.run(tokio::io::stdin(), tokio::io::stdout()).await
}
