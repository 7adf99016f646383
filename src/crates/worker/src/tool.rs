use crate::error::Result;
use crate::progress::ProgressSink;
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;

/// Execution context handed to a tool call.
pub struct ToolContext {
    /// Workspace root. From the call arguments when present, otherwise from
    /// `initialize`.
    pub workspace_path: PathBuf,
    /// Sink for `$/progress` notifications correlated to this call.
    pub progress: ProgressSink,
}

/// One capability exposed by an agent over `tools/call`.
#[async_trait]
pub trait AgentTool: Send + Sync {
    /// Tool name as it appears in the catalogue.
    fn name(&self) -> &str;

    /// One-line human description for the catalogue.
    fn description(&self) -> &str;

    /// JSON Schema for the tool's arguments.
    fn input_schema(&self) -> Value;

    /// Execute the tool. The returned value is the tool-specific payload;
    /// the runtime serializes it into the `content[0].text` envelope.
    async fn call(&self, arguments: Value, ctx: &ToolContext) -> Result<Value>;
}

/// The set of tools one worker serves.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Box<dyn AgentTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, tool: Box<dyn AgentTool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn find(&self, name: &str) -> Option<&dyn AgentTool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    /// `tools/list` payload. Pure: repeated calls yield the same catalogue.
    pub fn catalogue(&self) -> Value {
        let tools: Vec<Value> = self
            .tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "name": t.name(),
                    "description": t.description(),
                    "input_schema": t.input_schema(),
                })
            })
            .collect();
        serde_json::json!({ "tools": tools })
    }
}
