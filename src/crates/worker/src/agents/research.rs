//! Research agent: workspace inventory plus optional web lookups.

use crate::agents::{chat_json, required_str};
use crate::error::Result;
use crate::tool::{AgentTool, ToolContext};
use async_trait::async_trait;
use maestro_llm::{ChatModel, WebSearch};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use walkdir::WalkDir;

const MAX_LISTED_FILES: usize = 50;
const MAX_SCANNED_FILES: usize = 200;
const MANIFESTS: &[&str] = &[
    "requirements.txt",
    "pyproject.toml",
    "package.json",
    "Cargo.toml",
];

/// The `research` tool. Never user-facing: it fills `research_context` for
/// the architect and reviewfix agents.
pub struct ResearchTool {
    model: Arc<dyn ChatModel>,
    web: Option<Arc<dyn WebSearch>>,
}

impl ResearchTool {
    pub fn new(model: Arc<dyn ChatModel>, web: Option<Arc<dyn WebSearch>>) -> Self {
        Self { model, web }
    }
}

#[async_trait]
impl AgentTool for ResearchTool {
    fn name(&self) -> &str {
        "research"
    }

    fn description(&self) -> &str {
        "Analyze the workspace and verify technologies via web search"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "instructions": { "type": "string" },
                "workspace_path": { "type": "string" },
                "error_info": { "type": "object" }
            },
            "required": ["instructions"]
        })
    }

    async fn call(&self, arguments: Value, ctx: &ToolContext) -> Result<Value> {
        let instructions = required_str(&arguments, "instructions")?;

        ctx.progress.emit("analyzing workspace", 0.1).await?;
        let workspace_analysis = analyze_workspace(&ctx.workspace_path);

        let tech_verification = match &self.web {
            Some(web) => {
                ctx.progress.emit("verifying technologies online", 0.5).await?;
                let query = format!(
                    "Current stable versions and best practices for: {instructions}"
                );
                match web.search(&query).await {
                    Ok(result) => json!({
                        "query": query,
                        "answer": result.answer,
                        "citations": result.citations,
                    }),
                    Err(e) => {
                        tracing::warn!(error = %e, "web search failed, continuing without it");
                        json!({ "unavailable": true, "reason": e.to_string() })
                    }
                }
            }
            None => json!({
                "unavailable": true,
                "reason": "no web search provider configured",
            }),
        };

        let error_analysis = match arguments.get("error_info").filter(|v| !v.is_null()) {
            Some(error_info) => {
                ctx.progress.emit("analyzing reported errors", 0.8).await?;
                let analysis = chat_json(
                    &self.model,
                    "You analyze build and validation errors for a code-generation \
                     pipeline. Reply with a JSON object: \
                     {\"summary\": string, \"likely_cause\": string, \"suggested_fix\": string}.",
                    &serde_json::to_string(error_info)?,
                )
                .await?;
                Some(analysis)
            }
            None => None,
        };

        ctx.progress.emit("research complete", 1.0).await?;

        let mut result = json!({
            "workspace_analysis": workspace_analysis,
            "tech_verification": tech_verification,
        });
        if let Some(analysis) = error_analysis {
            result["error_analysis"] = analysis;
        }
        Ok(result)
    }
}

/// File inventory of the workspace: counts, a bounded listing, and the
/// contents of well-known dependency manifests.
fn analyze_workspace(workspace: &Path) -> Value {
    let mut files = Vec::new();
    let mut file_count = 0usize;
    let mut manifests = serde_json::Map::new();

    let walker = WalkDir::new(workspace)
        .max_depth(4)
        .into_iter()
        .filter_entry(|e| !is_ignored(e.file_name().to_str().unwrap_or_default()));

    for entry in walker.flatten() {
        if !entry.file_type().is_file() {
            continue;
        }
        file_count += 1;
        if file_count > MAX_SCANNED_FILES {
            break;
        }

        let rel = entry
            .path()
            .strip_prefix(workspace)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .to_string();

        let file_name = entry.file_name().to_string_lossy();
        if MANIFESTS.contains(&file_name.as_ref()) {
            if let Ok(content) = std::fs::read_to_string(entry.path()) {
                let truncated: String = content.chars().take(2000).collect();
                manifests.insert(rel.clone(), Value::String(truncated));
            }
        }

        if files.len() < MAX_LISTED_FILES {
            files.push(rel);
        }
    }

    json!({
        "file_count": file_count,
        "files": files,
        "manifests": manifests,
        "empty": file_count == 0,
    })
}

fn is_ignored(name: &str) -> bool {
    matches!(
        name,
        ".git" | "node_modules" | "target" | "venv" | ".venv" | "__pycache__" | ".logs"
    )
}
