//! Agent node adapters.
//!
//! A node extracts the arguments its worker needs from state, calls the
//! tool through the dispatch, validates the returned JSON against the
//! worker's contract, and converts it into a [`StatePatch`]. Nodes never
//! decide routing.

use crate::command::AgentName;
use crate::dispatch::AgentDispatch;
use crate::error::WorkflowError;
use crate::state::{GeneratedFile, Issue, StatePatch, ValidationResults, WorkflowState};
use serde::Deserialize;
use serde_json::{json, Value};

/// Run one agent node: dispatch, validate, patch.
pub(crate) async fn run_agent(
    dispatch: &dyn AgentDispatch,
    agent: AgentName,
    state: &WorkflowState,
) -> Result<StatePatch, WorkflowError> {
    let arguments = build_arguments(agent, state);
    let envelope = dispatch
        .call_tool(agent.server(), agent.tool(), arguments, None)
        .await?;
    let payload = decode_payload(agent.server(), &envelope)?;
    let mut patch = patch_from_payload(agent, payload)?;
    patch.last_agent = Some(agent);
    Ok(patch)
}

/// Arguments for each worker, per its tool contract.
fn build_arguments(agent: AgentName, state: &WorkflowState) -> Value {
    let instructions = if state.instructions.is_empty() {
        state.user_query.clone()
    } else {
        state.instructions.clone()
    };

    match agent {
        AgentName::Research => {
            let mut args = json!({
                "instructions": state
                    .research_request
                    .clone()
                    .unwrap_or(instructions),
            });
            if let Some(error) = state.errors.last() {
                args["error_info"] = json!(error);
            }
            args
        }
        AgentName::Architect => json!({
            "instructions": instructions,
            "research_context": state.research_context,
        }),
        AgentName::Codesmith => json!({
            "instructions": instructions,
            "architecture": state.architecture,
        }),
        AgentName::Reviewfix => json!({
            "instructions": instructions,
            "generated_files": state.generated_files,
            "validation_errors": state.issues,
            "iteration": state.iteration,
        }),
        AgentName::Responder => {
            let status = if state.validation_passed && state.code_complete {
                "success"
            } else if state.error_count > 0 {
                "failed"
            } else {
                "incomplete"
            };
            json!({
                "workflow_result": state.result_summary(),
                "status": status,
            })
        }
    }
}

/// Pull the JSON payload out of the `content[0].text` envelope.
fn decode_payload(server: &str, envelope: &Value) -> Result<Value, WorkflowError> {
    let text = maestro_protocol::tool_text(envelope).ok_or_else(|| {
        WorkflowError::MalformedToolResult {
            server: server.to_string(),
            message: "result missing content[0].text".to_string(),
        }
    })?;
    serde_json::from_str(text).map_err(|e| WorkflowError::MalformedToolResult {
        server: server.to_string(),
        message: format!("payload is not valid JSON: {e}"),
    })
}

fn malformed(agent: AgentName, error: impl std::fmt::Display) -> WorkflowError {
    WorkflowError::MalformedToolResult {
        server: agent.server().to_string(),
        message: error.to_string(),
    }
}

/// Architect output: either a full design or a research request.
#[derive(Deserialize)]
#[serde(untagged)]
enum DesignOutput {
    NeedsResearch {
        needs_research: bool,
        research_request: String,
    },
    Architecture(Value),
}

#[derive(Deserialize)]
struct CodegenOutput {
    generated_files: Vec<GeneratedFile>,
    #[serde(default)]
    code_complete: bool,
}

#[derive(Deserialize)]
struct ReviewOutput {
    validation_passed: bool,
    #[serde(default)]
    quality_score: Option<f64>,
    #[serde(default)]
    fixed_files: Vec<GeneratedFile>,
    #[serde(default)]
    remaining_errors: Vec<Issue>,
    #[serde(default)]
    suggestions: Value,
    #[serde(default)]
    checks: Value,
    #[serde(default)]
    needs_research: bool,
    #[serde(default)]
    research_request: Option<String>,
}

#[derive(Deserialize)]
struct ResponderOutput {
    user_response: String,
}

/// Validate the payload against the agent's contract and convert it into a
/// state patch.
fn patch_from_payload(agent: AgentName, payload: Value) -> Result<StatePatch, WorkflowError> {
    match agent {
        AgentName::Research => {
            if !payload.is_object() {
                return Err(malformed(agent, "research payload must be an object"));
            }
            Ok(StatePatch {
                research_context: Some(payload),
                needs_research: Some(false),
                ..Default::default()
            })
        }

        AgentName::Architect => {
            let output: DesignOutput =
                serde_json::from_value(payload).map_err(|e| malformed(agent, e))?;
            match output {
                DesignOutput::NeedsResearch {
                    needs_research,
                    research_request,
                } => Ok(StatePatch {
                    needs_research: Some(needs_research),
                    research_request: Some(research_request),
                    ..Default::default()
                }),
                DesignOutput::Architecture(design) => {
                    const REQUIRED: &[&str] = &["description", "components", "file_structure"];
                    for key in REQUIRED {
                        if design.get(key).is_none() {
                            return Err(malformed(
                                agent,
                                format!("architecture missing key: {key}"),
                            ));
                        }
                    }
                    Ok(StatePatch {
                        architecture: Some(design),
                        architecture_complete: Some(true),
                        needs_research: Some(false),
                        ..Default::default()
                    })
                }
            }
        }

        AgentName::Codesmith => {
            let output: CodegenOutput =
                serde_json::from_value(payload).map_err(|e| malformed(agent, e))?;
            if output.generated_files.is_empty() {
                return Err(malformed(agent, "codesmith produced no files"));
            }
            Ok(StatePatch {
                generated_files: output.generated_files,
                code_complete: Some(output.code_complete),
                ..Default::default()
            })
        }

        AgentName::Reviewfix => {
            let output: ReviewOutput =
                serde_json::from_value(payload).map_err(|e| malformed(agent, e))?;
            let results = ValidationResults {
                passed: output.validation_passed,
                quality_score: output.quality_score.unwrap_or(0.0),
                checks: output.checks,
                issues: output.remaining_errors.clone(),
                suggestions: output.suggestions,
            };
            Ok(StatePatch {
                validation_passed: Some(output.validation_passed),
                validation_results: Some(results),
                issues: Some(output.remaining_errors),
                generated_files: output.fixed_files,
                needs_research: Some(output.needs_research),
                research_request: output.research_request,
                ..Default::default()
            })
        }

        AgentName::Responder => {
            let output: ResponderOutput =
                serde_json::from_value(payload).map_err(|e| malformed(agent, e))?;
            Ok(StatePatch {
                user_response: Some(output.user_response),
                response_ready: Some(true),
                ..Default::default()
            })
        }
    }
}
