//! The five maestro agents, plus the scripted mock agent used by the
//! protocol test suites.
//!
//! Each agent exposes exactly one tool. The research, architect, codesmith,
//! and reviewfix agents drive a [`ChatModel`]; the responder is
//! deterministic so failure reports can always be produced, and the mock
//! agent exists only to exercise the wire protocol.

mod architect;
mod codesmith;
mod mock;
mod research;
mod responder;
mod reviewfix;

pub use architect::ArchitectTool;
pub use codesmith::CodesmithTool;
pub use mock::MockTool;
pub use research::ResearchTool;
pub use responder::ResponderTool;
pub use reviewfix::ReviewFixTool;

use crate::error::{Result, WorkerError};
use crate::tool::ToolRegistry;
use maestro_llm::{ChatMessage, ChatModel, ChatRequest, WebSearch};
use serde_json::Value;
use std::sync::Arc;

/// All worker agent names, in routing order.
pub const AGENT_NAMES: &[&str] = &["research", "architect", "codesmith", "reviewfix", "responder"];

/// Whether an agent needs a chat model (and therefore an API key).
pub fn agent_needs_model(agent: &str) -> bool {
    matches!(agent, "research" | "architect" | "codesmith" | "reviewfix")
}

/// Build the tool registry for one agent name.
pub fn registry_for(
    agent: &str,
    model: Option<Arc<dyn ChatModel>>,
    web: Option<Arc<dyn WebSearch>>,
) -> Result<ToolRegistry> {
    let require_model = || {
        model
            .clone()
            .ok_or_else(|| WorkerError::InvalidParams(format!("agent '{agent}' needs a chat model")))
    };

    let registry = match agent {
        "research" => {
            ToolRegistry::new().register(Box::new(ResearchTool::new(require_model()?, web)))
        }
        "architect" => ToolRegistry::new().register(Box::new(ArchitectTool::new(require_model()?))),
        "codesmith" => ToolRegistry::new().register(Box::new(CodesmithTool::new(require_model()?))),
        "reviewfix" => ToolRegistry::new().register(Box::new(ReviewFixTool::new(require_model()?))),
        "responder" => ToolRegistry::new().register(Box::new(ResponderTool)),
        "mock" => ToolRegistry::new().register(Box::new(MockTool)),
        other => {
            return Err(WorkerError::InvalidParams(format!(
                "unknown agent: {other}"
            )))
        }
    };
    Ok(registry)
}

/// Run a JSON-mode chat and parse the reply as a JSON object.
pub(crate) async fn chat_json(
    model: &Arc<dyn ChatModel>,
    system: &str,
    user: &str,
) -> Result<Value> {
    let request = ChatRequest::new(vec![ChatMessage::system(system), ChatMessage::user(user)])
        .with_temperature(0.2)
        .with_json_mode();
    let response = model.chat(request).await?;
    parse_json_content(&response.content)
}

/// Parse model output as JSON, tolerating markdown code fences.
pub(crate) fn parse_json_content(content: &str) -> Result<Value> {
    let trimmed = content.trim();
    let stripped = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|s| s.trim_end_matches("```").trim())
        .unwrap_or(trimmed);
    serde_json::from_str(stripped)
        .map_err(|e| WorkerError::Tool(format!("model returned malformed JSON: {e}")))
}

/// Extract a required string argument.
pub(crate) fn required_str<'a>(arguments: &'a Value, key: &str) -> Result<&'a str> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| WorkerError::InvalidParams(format!("missing argument: {key}")))
}
