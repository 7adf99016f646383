//! Codesmith agent: generates project files from the architecture and
//! writes them into the workspace.

use crate::agents::{chat_json, required_str};
use crate::error::{Result, WorkerError};
use crate::tool::{AgentTool, ToolContext};
use async_trait::async_trait;
use maestro_llm::ChatModel;
use serde_json::{json, Value};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

const CODESMITH_SYSTEM_PROMPT: &str = "\
You are an expert programmer. Generate the complete files for the requested \
system following the given architecture. Reply with one JSON object:
  {\"files\": [{\"path\": string, \"language\": string, \"content\": string}]}
Paths are relative to the project root. Every file must be complete and \
runnable; no placeholders, no elisions.";

/// The `generate` tool.
pub struct CodesmithTool {
    model: Arc<dyn ChatModel>,
}

impl CodesmithTool {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl AgentTool for CodesmithTool {
    fn name(&self) -> &str {
        "generate"
    }

    fn description(&self) -> &str {
        "Generate code files from an architecture and write them to the workspace"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "instructions": { "type": "string" },
                "architecture": { "type": "object" },
                "workspace_path": { "type": "string" }
            },
            "required": ["instructions"]
        })
    }

    async fn call(&self, arguments: Value, ctx: &ToolContext) -> Result<Value> {
        let instructions = required_str(&arguments, "instructions")?;
        let architecture = arguments.get("architecture").cloned().unwrap_or(Value::Null);

        ctx.progress.emit("generating code", 0.2).await?;

        let user_prompt = format!(
            "Instructions:\n{instructions}\n\nArchitecture:\n{}",
            serde_json::to_string_pretty(&architecture)?
        );
        let output = chat_json(&self.model, CODESMITH_SYSTEM_PROMPT, &user_prompt).await?;

        let files = output
            .get("files")
            .and_then(Value::as_array)
            .ok_or_else(|| WorkerError::Tool("model returned no files array".to_string()))?;
        if files.is_empty() {
            return Err(WorkerError::Tool("model generated zero files".to_string()));
        }

        let mut generated_files = Vec::with_capacity(files.len());
        for (index, file) in files.iter().enumerate() {
            let path = file
                .get("path")
                .and_then(Value::as_str)
                .ok_or_else(|| WorkerError::Tool("generated file missing path".to_string()))?;
            let content = file
                .get("content")
                .and_then(Value::as_str)
                .ok_or_else(|| WorkerError::Tool("generated file missing content".to_string()))?;
            let language = file
                .get("language")
                .and_then(Value::as_str)
                .unwrap_or_else(|| language_from_path(path));

            let target = resolve_in_workspace(&ctx.workspace_path, path)?;
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&target, content)?;

            let fraction = 0.2 + 0.7 * ((index + 1) as f64 / files.len() as f64);
            ctx.progress.emit(format!("wrote {path}"), fraction).await?;

            generated_files.push(json!({
                "path": path,
                "language": language,
                "content": content,
                "lines": content.lines().count(),
            }));
        }

        ctx.progress.emit("code generation complete", 1.0).await?;
        Ok(json!({
            "generated_files": generated_files,
            "code_complete": true,
        }))
    }
}

/// Join a model-provided relative path to the workspace, rejecting absolute
/// paths and upward traversal.
fn resolve_in_workspace(workspace: &Path, relative: &str) -> Result<PathBuf> {
    let candidate = Path::new(relative);
    if candidate.is_absolute() {
        return Err(WorkerError::InvalidParams(format!(
            "generated path must be relative: {relative}"
        )));
    }
    if candidate
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(WorkerError::InvalidParams(format!(
            "generated path escapes the workspace: {relative}"
        )));
    }
    Ok(workspace.join(candidate))
}

fn language_from_path(path: &str) -> &'static str {
    match Path::new(path).extension().and_then(|e| e.to_str()) {
        Some("py") => "python",
        Some("rs") => "rust",
        Some("js") => "javascript",
        Some("ts") => "typescript",
        Some("md") => "markdown",
        Some("toml") => "toml",
        Some("json") => "json",
        Some("txt") => "text",
        _ => "text",
    }
}
