//! The LLM-driven router.
//!
//! The supervisor is the only component that decides routing. Each decision
//! is one JSON-mode chat completion validated twice: against a JSON Schema
//! (shape), then against the routing invariants (policy). Policy violations
//! get one retry with a constraint reminder; confidence and error-budget
//! gates are enforced by rewriting the command rather than trusting the
//! model to comply.

use crate::command::{AgentName, Goto, RoutingCommand};
use crate::error::{Result, WorkflowError};
use crate::settings::Settings;
use crate::state::{ErrorRecord, StatePatch, WorkflowState};
use jsonschema::JSONSchema;
use maestro_llm::{ChatMessage, ChatModel, ChatRequest};
use serde_json::{json, Value};
use std::sync::Arc;

/// Shape-retries on top of the policy retry.
const MAX_COMMAND_ATTEMPTS: u32 = 3;

const SYSTEM_PROMPT: &str = "\
You are the supervisor of a multi-agent development workflow. You decide \
which worker runs next and with what instructions. Reply with one JSON \
object: {\"goto\": <target>, \"update\": {\"instructions\": string, \
\"confidence\": number, ...}}.

Targets:
- research: analyzes the workspace and verifies technologies. Support agent, never user-facing.
- architect: designs the system. Needs research context; may request research.
- codesmith: generates code files from the architecture.
- reviewfix: validates and fixes generated code.
- responder: formats the final answer for the user.
- hitl: asks the human for clarification.
- end: terminates the session.

Rules:
1. After codesmith runs, reviewfix MUST run next, until validation has passed.
2. Set update.confidence in [0,1] on every decision. If you are not \
confident about the routing (below the configured threshold), go to hitl.
3. Only go to end when response_ready is true; route to responder first.
4. If needs_research is set, route to research with the research_request.
5. Routing to the same worker twice in a row requires NEW instructions \
explaining what to do differently.
6. Give each worker one clear instruction in update.instructions.";

fn command_schema() -> Value {
    json!({
        "type": "object",
        "required": ["goto"],
        "properties": {
            "goto": {
                "type": "string",
                "enum": ["research", "architect", "codesmith", "reviewfix",
                         "responder", "hitl", "end"]
            },
            "update": { "type": "object" }
        }
    })
}

/// LLM router over the workflow state.
pub struct Supervisor {
    model: Arc<dyn ChatModel>,
    settings: Settings,
    schema: JSONSchema,
}

impl Supervisor {
    pub fn new(model: Arc<dyn ChatModel>, settings: Settings) -> Self {
        let schema_value = command_schema();
        let schema = JSONSchema::compile(&schema_value)
            .unwrap_or_else(|e| unreachable!("routing command schema is static: {e}"));
        Self {
            model,
            settings,
            schema,
        }
    }

    /// Decide the next node. The returned command has already passed shape
    /// and policy validation; gates (confidence, error budget) may have
    /// rewritten its target.
    pub async fn decide(&self, state: &WorkflowState) -> Result<RoutingCommand> {
        let mut reminder: Option<String> = None;

        for attempt in 1..=MAX_COMMAND_ATTEMPTS {
            let raw = self.complete(state, reminder.as_deref()).await?;

            let command = match self.parse_command(&raw) {
                Ok(command) => command,
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "supervisor returned invalid command");
                    reminder = Some(format!(
                        "Your previous reply was invalid: {e}. Reply with exactly \
                         {{\"goto\": ..., \"update\": {{...}}}}."
                    ));
                    continue;
                }
            };

            match self.enforce_policy(state, command) {
                Ok(command) => return Ok(command),
                Err(violation) => {
                    tracing::warn!(attempt, %violation, "routing command violated policy");
                    if attempt >= MAX_COMMAND_ATTEMPTS {
                        return Err(WorkflowError::PolicyViolation(violation));
                    }
                    reminder = Some(format!(
                        "Your previous routing violated a rule: {violation}. \
                         Choose a target that satisfies every rule."
                    ));
                }
            }
        }

        Err(WorkflowError::InvalidCommand(format!(
            "no valid routing command after {MAX_COMMAND_ATTEMPTS} attempts"
        )))
    }

    async fn complete(&self, state: &WorkflowState, reminder: Option<&str>) -> Result<Value> {
        let mut messages = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(summarize_state(state, &self.settings)),
        ];
        if let Some(reminder) = reminder {
            messages.push(ChatMessage::user(reminder.to_string()));
        }

        let request = ChatRequest::new(messages)
            .with_temperature(0.1)
            .with_json_mode();
        let response = self.model.chat(request).await?;

        serde_json::from_str(&response.content)
            .map_err(|e| WorkflowError::InvalidCommand(format!("not valid JSON: {e}")))
    }

    fn parse_command(&self, raw: &Value) -> std::result::Result<RoutingCommand, String> {
        if let Err(errors) = self.schema.validate(raw) {
            let details: Vec<String> = errors.map(|e| e.to_string()).collect();
            return Err(details.join("; "));
        }
        serde_json::from_value(raw.clone()).map_err(|e| e.to_string())
    }

    /// Enforce routing invariants: gates rewrite the command, structural
    /// violations reject it so a retry can fix it.
    fn enforce_policy(
        &self,
        state: &WorkflowState,
        mut command: RoutingCommand,
    ) -> std::result::Result<RoutingCommand, String> {
        let confidence = command.update.confidence.unwrap_or(state.confidence);
        let response_ready = command
            .update
            .response_ready
            .unwrap_or(state.response_ready);

        // Rule 1: codesmith output is never trusted unreviewed. A codesmith
        // run that failed outright left nothing to review, so the gate is
        // on produced code, not on the attempt.
        if state.last_agent == Some(AgentName::Codesmith)
            && state.code_complete
            && !state.validation_passed
        {
            match command.goto {
                Goto::Agent(AgentName::Reviewfix) | Goto::Hitl => {}
                other => {
                    return Err(format!(
                        "after codesmith the next worker must be reviewfix, not {other}"
                    ))
                }
            }
        }

        // end is gated on a formatted response existing.
        if command.goto == Goto::End && !response_ready {
            return Err("goto=end requires response_ready".to_string());
        }

        // Self-invocation needs fresh instructions; a rejection falls back
        // to end so the graph can run the responder and terminate.
        if let Goto::Agent(agent) = command.goto {
            if state.last_agent == Some(agent) {
                let fresh = command
                    .update
                    .instructions
                    .as_deref()
                    .map(|i| !i.is_empty() && i != state.instructions)
                    .unwrap_or(false);
                if fresh {
                    command.update.is_self_invocation = Some(true);
                } else {
                    tracing::warn!(
                        agent = %agent,
                        "self-invocation without new instructions, falling back to end"
                    );
                    let mut update = StatePatch::default();
                    update.errors.push(
                        ErrorRecord::new(format!(
                            "supervisor repeated {agent} without new instructions"
                        ))
                        .with_guidance("rephrase or narrow the request"),
                    );
                    return Ok(RoutingCommand::new(Goto::End).with_update(update));
                }
            } else if command.update.is_self_invocation.is_none() {
                command.update.is_self_invocation = Some(false);
            }
        }

        // Confidence / error-budget / pending-clarification gates rewrite
        // rather than reject: the human sees the session either way.
        let budget_exhausted = state.error_count >= self.settings.max_errors;
        let low_confidence = confidence < self.settings.confidence_threshold;
        let clarification_pending = command
            .update
            .requires_clarification
            .unwrap_or(state.requires_clarification);
        if (low_confidence || budget_exhausted || clarification_pending)
            && command.goto != Goto::Hitl
        {
            tracing::info!(
                confidence,
                errors = state.error_count,
                original = %command.goto,
                "gating decision to hitl"
            );
            let mut update = command.update;
            update.requires_clarification = Some(true);
            if low_confidence && update.instructions.is_none() {
                update.instructions =
                    Some("The request is ambiguous; ask the user to clarify.".to_string());
            }
            return Ok(RoutingCommand::new(Goto::Hitl).with_update(update));
        }

        Ok(command)
    }
}

/// Compact state summary for the user prompt: presence of artifacts, not
/// their contents.
fn summarize_state(state: &WorkflowState, settings: &Settings) -> String {
    let recent_messages: Vec<String> = state
        .messages
        .iter()
        .rev()
        .take(3)
        .rev()
        .map(|m| {
            let content: String = m.content.chars().take(200).collect();
            format!("  {}: {content}", m.role)
        })
        .collect();

    let issues: Vec<String> = state
        .issues
        .iter()
        .take(5)
        .map(|i| format!("  - [{}] {}", i.kind, i.message))
        .collect();

    format!(
        "Goal: {goal}\n\
         Iteration: {iteration} of {max_iterations}\n\
         Last worker: {last_agent}\n\
         Confidence threshold: {threshold}\n\
         Artifacts: research_context={has_research}, architecture_complete={arch}, \
         code_complete={code}, validation_passed={valid}, response_ready={ready}\n\
         needs_research: {needs_research}{research_request}\n\
         Errors: {error_count} (budget {max_errors})\n\
         Open issues ({issue_count}):\n{issues}\n\
         Recent messages:\n{messages}\n\
         Current instructions: {instructions}\n\
         HITL response: {hitl}",
        goal = state.goal,
        iteration = state.iteration,
        max_iterations = settings.max_iterations,
        last_agent = state
            .last_agent
            .map(|a| a.server().to_string())
            .unwrap_or_else(|| "none".to_string()),
        threshold = settings.confidence_threshold,
        has_research = state.research_context.is_some(),
        arch = state.architecture_complete,
        code = state.code_complete,
        valid = state.validation_passed,
        ready = state.response_ready,
        needs_research = state.needs_research,
        research_request = state
            .research_request
            .as_deref()
            .map(|r| format!(" ({r})"))
            .unwrap_or_default(),
        error_count = state.error_count,
        max_errors = settings.max_errors,
        issue_count = state.issues.len(),
        issues = if issues.is_empty() {
            "  none".to_string()
        } else {
            issues.join("\n")
        },
        messages = if recent_messages.is_empty() {
            "  none".to_string()
        } else {
            recent_messages.join("\n")
        },
        instructions = if state.instructions.is_empty() {
            "none"
        } else {
            &state.instructions
        },
        hitl = state
            .hitl_response
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_else(|| "none".to_string()),
    )
}
