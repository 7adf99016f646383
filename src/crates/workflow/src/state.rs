//! Shared workflow state and its update discipline.
//!
//! One [`WorkflowState`] exists per session. Only the graph mutates it, and
//! only through [`WorkflowState::apply`]: routing commands and node results
//! are both expressed as a [`StatePatch`]. Patches overwrite field-wise,
//! except `messages` and `errors`, which append, and `generated_files`,
//! which appends new paths and replaces re-generated ones.

use crate::command::AgentName;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

/// One conversational turn kept in state for supervisor context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// One generated (or fixed) file. `path` is relative to the workspace root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedFile {
    pub path: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub lines: u64,
}

/// A defect reported by validation or review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix: Option<String>,
}

/// Outcome of a reviewfix pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ValidationResults {
    pub passed: bool,
    #[serde(default)]
    pub quality_score: f64,
    #[serde(default)]
    pub checks: Value,
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub suggestions: Value,
}

/// One recorded failure. Guidance is user-facing; the full error stays in
/// the logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_guidance: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ErrorRecord {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            agent: None,
            user_guidance: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    pub fn with_guidance(mut self, guidance: impl Into<String>) -> Self {
        self.user_guidance = Some(guidance.into());
        self
    }
}

/// The per-session record every component reads and the graph alone writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    /// Original user request. Immutable after creation.
    pub goal: String,
    /// Rendered form of the goal used in prompts.
    pub user_query: String,
    /// Absolute path to the target workspace. Immutable.
    pub workspace_path: PathBuf,
    /// Opaque session identifier. Immutable.
    pub session_id: String,

    #[serde(default)]
    pub messages: Vec<ChatTurn>,
    /// Instructions the supervisor is giving the next worker. Overwritten
    /// each routing step.
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub last_agent: Option<AgentName>,
    /// Supervisor decisions taken so far. Strictly monotonic.
    #[serde(default)]
    pub iteration: u64,
    #[serde(default)]
    pub is_self_invocation: bool,

    #[serde(default)]
    pub research_context: Option<Value>,
    #[serde(default)]
    pub needs_research: bool,
    #[serde(default)]
    pub research_request: Option<String>,

    #[serde(default)]
    pub architecture: Option<Value>,
    #[serde(default)]
    pub architecture_complete: bool,

    #[serde(default)]
    pub generated_files: Vec<GeneratedFile>,
    #[serde(default)]
    pub code_complete: bool,

    #[serde(default)]
    pub validation_results: Option<ValidationResults>,
    #[serde(default)]
    pub validation_passed: bool,
    #[serde(default)]
    pub issues: Vec<Issue>,

    #[serde(default)]
    pub user_response: Option<String>,
    /// Terminal gate: set only after the responder has run.
    #[serde(default)]
    pub response_ready: bool,

    #[serde(default)]
    pub errors: Vec<ErrorRecord>,
    #[serde(default)]
    pub error_count: u32,

    /// Supervisor's routing confidence, in `[0.0, 1.0]`.
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub requires_clarification: bool,
    #[serde(default)]
    pub hitl_response: Option<Value>,
    /// The graph pauses while this is set.
    #[serde(default)]
    pub awaiting_human: bool,
}

fn default_confidence() -> f64 {
    1.0
}

impl WorkflowState {
    /// Fresh state for a new session.
    pub fn new(
        goal: impl Into<String>,
        workspace_path: impl Into<PathBuf>,
        session_id: impl Into<String>,
    ) -> Self {
        let goal = goal.into();
        Self {
            user_query: goal.clone(),
            goal,
            workspace_path: workspace_path.into(),
            session_id: session_id.into(),
            messages: Vec::new(),
            instructions: String::new(),
            last_agent: None,
            iteration: 0,
            is_self_invocation: false,
            research_context: None,
            needs_research: false,
            research_request: None,
            architecture: None,
            architecture_complete: false,
            generated_files: Vec::new(),
            code_complete: false,
            validation_results: None,
            validation_passed: false,
            issues: Vec::new(),
            user_response: None,
            response_ready: false,
            errors: Vec::new(),
            error_count: 0,
            confidence: default_confidence(),
            requires_clarification: false,
            hitl_response: None,
            awaiting_human: false,
        }
    }

    /// Apply a patch: overwrite set fields, append `messages` and `errors`,
    /// merge `generated_files` by path.
    pub fn apply(&mut self, patch: StatePatch) {
        self.messages.extend(patch.messages);

        for file in patch.generated_files {
            match self.generated_files.iter_mut().find(|f| f.path == file.path) {
                Some(existing) => *existing = file,
                None => self.generated_files.push(file),
            }
        }

        for error in patch.errors {
            self.errors.push(error);
        }
        self.error_count = self.errors.len() as u32;

        macro_rules! overwrite {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = patch.$field {
                    self.$field = value;
                })*
            };
        }
        overwrite!(
            instructions,
            is_self_invocation,
            needs_research,
            architecture_complete,
            code_complete,
            validation_passed,
            issues,
            response_ready,
            requires_clarification,
            awaiting_human,
        );

        // Option-typed fields: the patch sets a new value, never clears.
        if let Some(value) = patch.last_agent {
            self.last_agent = Some(value);
        }
        if let Some(value) = patch.research_context {
            self.research_context = Some(value);
        }
        if let Some(value) = patch.research_request {
            self.research_request = Some(value);
        }
        if let Some(value) = patch.architecture {
            self.architecture = Some(value);
        }
        if let Some(value) = patch.validation_results {
            self.validation_results = Some(value);
        }
        if let Some(value) = patch.user_response {
            self.user_response = Some(value);
        }
        if let Some(value) = patch.hitl_response {
            self.hitl_response = Some(value);
        }
        if let Some(value) = patch.confidence {
            self.confidence = value.clamp(0.0, 1.0);
        }
    }

    /// Record one failure and keep the error counter in sync.
    pub fn record_error(&mut self, error: ErrorRecord) {
        self.errors.push(error);
        self.error_count = self.errors.len() as u32;
    }

    /// Summary handed to the responder as `workflow_result`.
    pub fn result_summary(&self) -> Value {
        serde_json::json!({
            "goal": self.goal,
            "architecture": self.architecture,
            "generated_files": self.generated_files,
            "validation_results": self.validation_results,
            "issues": self.issues,
            "errors": self.errors,
            "iterations": self.iteration,
        })
    }
}

/// Partial state update. All fields optional; list fields follow the append
/// semantics documented on [`WorkflowState::apply`]. Unknown keys from the
/// supervisor model are ignored on deserialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StatePatch {
    pub instructions: Option<String>,
    pub messages: Vec<ChatTurn>,
    pub last_agent: Option<AgentName>,
    pub is_self_invocation: Option<bool>,
    pub research_context: Option<Value>,
    pub needs_research: Option<bool>,
    pub research_request: Option<String>,
    pub architecture: Option<Value>,
    pub architecture_complete: Option<bool>,
    pub generated_files: Vec<GeneratedFile>,
    pub code_complete: Option<bool>,
    pub validation_results: Option<ValidationResults>,
    pub validation_passed: Option<bool>,
    pub issues: Option<Vec<Issue>>,
    pub user_response: Option<String>,
    pub response_ready: Option<bool>,
    pub errors: Vec<ErrorRecord>,
    pub confidence: Option<f64>,
    pub requires_clarification: Option<bool>,
    pub hitl_response: Option<Value>,
    pub awaiting_human: Option<bool>,
}

impl StatePatch {
    /// Names of the fields this patch touches, for `workflow_event`
    /// payloads.
    pub fn updated_keys(&self) -> Vec<&'static str> {
        let mut keys = Vec::new();
        macro_rules! track_option {
            ($($field:ident),* $(,)?) => {
                $(if self.$field.is_some() {
                    keys.push(stringify!($field));
                })*
            };
        }
        track_option!(
            instructions,
            last_agent,
            is_self_invocation,
            research_context,
            needs_research,
            research_request,
            architecture,
            architecture_complete,
            code_complete,
            validation_results,
            validation_passed,
            issues,
            user_response,
            response_ready,
            confidence,
            requires_clarification,
            hitl_response,
            awaiting_human,
        );
        if !self.messages.is_empty() {
            keys.push("messages");
        }
        if !self.generated_files.is_empty() {
            keys.push("generated_files");
        }
        if !self.errors.is_empty() {
            keys.push("errors");
        }
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_apply_overwrites_scalars() {
        let mut state = WorkflowState::new("goal", "/tmp/ws", "s-1");
        state.apply(StatePatch {
            instructions: Some("design the API".to_string()),
            confidence: Some(0.7),
            ..Default::default()
        });
        assert_eq!(state.instructions, "design the API");
        assert_eq!(state.confidence, 0.7);
    }

    #[test]
    fn test_apply_appends_messages_and_errors() {
        let mut state = WorkflowState::new("goal", "/tmp/ws", "s-1");
        state.apply(StatePatch {
            messages: vec![ChatTurn::new("user", "hello")],
            errors: vec![ErrorRecord::new("first failure")],
            ..Default::default()
        });
        state.apply(StatePatch {
            messages: vec![ChatTurn::new("assistant", "hi")],
            errors: vec![ErrorRecord::new("second failure")],
            ..Default::default()
        });

        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.errors.len(), 2);
        assert_eq!(state.error_count, 2);
    }

    #[test]
    fn test_generated_files_merge_by_path() {
        let mut state = WorkflowState::new("goal", "/tmp/ws", "s-1");
        let original = GeneratedFile {
            path: "main.py".to_string(),
            language: "python".to_string(),
            content: "broken".to_string(),
            lines: 1,
        };
        let fixed = GeneratedFile {
            content: "fixed".to_string(),
            ..original.clone()
        };
        let extra = GeneratedFile {
            path: "test_main.py".to_string(),
            language: "python".to_string(),
            content: "tests".to_string(),
            lines: 1,
        };

        state.apply(StatePatch {
            generated_files: vec![original],
            ..Default::default()
        });
        state.apply(StatePatch {
            generated_files: vec![fixed, extra],
            ..Default::default()
        });

        assert_eq!(state.generated_files.len(), 2);
        assert_eq!(state.generated_files[0].content, "fixed");
        assert_eq!(state.generated_files[1].path, "test_main.py");
    }

    #[test]
    fn test_confidence_is_clamped() {
        let mut state = WorkflowState::new("goal", "/tmp/ws", "s-1");
        state.apply(StatePatch {
            confidence: Some(3.5),
            ..Default::default()
        });
        assert_eq!(state.confidence, 1.0);
    }

    #[test]
    fn test_patch_ignores_unknown_keys() {
        let patch: StatePatch = serde_json::from_value(json!({
            "instructions": "go",
            "made_up_field": { "whatever": 1 },
        }))
        .unwrap();
        assert_eq!(patch.instructions.as_deref(), Some("go"));
    }

    #[test]
    fn test_updated_keys_tracks_touched_fields() {
        let patch = StatePatch {
            instructions: Some("x".to_string()),
            code_complete: Some(true),
            errors: vec![ErrorRecord::new("boom")],
            ..Default::default()
        };
        let keys = patch.updated_keys();
        assert!(keys.contains(&"instructions"));
        assert!(keys.contains(&"code_complete"));
        assert!(keys.contains(&"errors"));
        assert!(!keys.contains(&"messages"));
    }

    #[test]
    fn test_state_serde_round_trip() {
        let mut state = WorkflowState::new("build it", "/tmp/ws", "s-9");
        state.apply(StatePatch {
            instructions: Some("generate".to_string()),
            generated_files: vec![GeneratedFile {
                path: "app.py".to_string(),
                language: "python".to_string(),
                content: "print()".to_string(),
                lines: 1,
            }],
            validation_results: Some(ValidationResults {
                passed: true,
                quality_score: 0.9,
                ..Default::default()
            }),
            errors: vec![ErrorRecord::new("transient").with_agent("codesmith")],
            ..Default::default()
        });

        let encoded = serde_json::to_value(&state).unwrap();
        let decoded: WorkflowState = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, state);
    }
}
