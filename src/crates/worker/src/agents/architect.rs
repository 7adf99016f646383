//! Architect agent: turns instructions plus research context into a system
//! design, or asks for research when it has nothing to ground the design on.

use crate::agents::{chat_json, required_str};
use crate::error::{Result, WorkerError};
use crate::tool::{AgentTool, ToolContext};
use async_trait::async_trait;
use maestro_llm::ChatModel;
use serde_json::{json, Value};
use std::sync::Arc;

const ARCHITECT_SYSTEM_PROMPT: &str = "\
You are a senior software architect. Design the system requested by the \
instructions, grounded in the provided research context. Reply with one JSON \
object with exactly these keys:
  description: string summary of the design
  components: array of {name, responsibility}
  file_structure: array of relative file paths to create
  technologies: array of {name, version?, purpose}
  patterns: array of strings (design patterns applied)
  data_flow: string describing how data moves through the system
Keep the design as small as the instructions allow.";

/// The `design` tool.
pub struct ArchitectTool {
    model: Arc<dyn ChatModel>,
}

impl ArchitectTool {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl AgentTool for ArchitectTool {
    fn name(&self) -> &str {
        "design"
    }

    fn description(&self) -> &str {
        "Produce an architecture for the requested system"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "instructions": { "type": "string" },
                "research_context": { "type": "object" },
                "workspace_path": { "type": "string" }
            },
            "required": ["instructions"]
        })
    }

    async fn call(&self, arguments: Value, ctx: &ToolContext) -> Result<Value> {
        let instructions = required_str(&arguments, "instructions")?;

        // No grounding yet: hand control back and name the question instead
        // of designing blind.
        let research_context = arguments.get("research_context").filter(|v| {
            v.as_object().map(|o| !o.is_empty()).unwrap_or(false)
        });
        let research_context = match research_context {
            Some(context) => context,
            None => {
                tracing::info!("no research context available, requesting research");
                return Ok(json!({
                    "needs_research": true,
                    "research_request": format!(
                        "Verify current versions and recommended project layout for: {instructions}"
                    ),
                }));
            }
        };

        ctx.progress.emit("designing architecture", 0.3).await?;

        let user_prompt = format!(
            "Instructions:\n{instructions}\n\nResearch context:\n{}",
            serde_json::to_string_pretty(research_context)?
        );
        let design = chat_json(&self.model, ARCHITECT_SYSTEM_PROMPT, &user_prompt).await?;
        validate_design(&design)?;

        ctx.progress.emit("architecture ready", 1.0).await?;
        Ok(design)
    }
}

fn validate_design(design: &Value) -> Result<()> {
    const REQUIRED: &[&str] = &[
        "description",
        "components",
        "file_structure",
        "technologies",
        "patterns",
        "data_flow",
    ];
    let missing: Vec<&str> = REQUIRED
        .iter()
        .copied()
        .filter(|key| design.get(key).is_none())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(WorkerError::Tool(format!(
            "architecture missing required keys: {}",
            missing.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_design_accepts_complete_mapping() {
        let design = json!({
            "description": "a calculator API",
            "components": [],
            "file_structure": ["main.py"],
            "technologies": [],
            "patterns": [],
            "data_flow": "request -> handler -> response",
        });
        assert!(validate_design(&design).is_ok());
    }

    #[test]
    fn test_validate_design_names_missing_keys() {
        let design = json!({ "description": "incomplete" });
        let err = validate_design(&design).unwrap_err();
        assert!(err.to_string().contains("data_flow"));
    }
}
