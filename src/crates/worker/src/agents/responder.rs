//! Responder agent: formats the final markdown answer for the client.
//!
//! Deliberately deterministic (no model call): every failure path in the
//! graph relies on the responder producing a report, so it must not itself
//! be able to fail on a provider error.

use crate::error::Result;
use crate::tool::{AgentTool, ToolContext};
use async_trait::async_trait;
use serde_json::{json, Value};

/// The `format_response` tool.
pub struct ResponderTool;

#[async_trait]
impl AgentTool for ResponderTool {
    fn name(&self) -> &str {
        "format_response"
    }

    fn description(&self) -> &str {
        "Format the workflow outcome as a markdown response"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "workflow_result": { "type": "object" },
                "status": { "type": "string", "enum": ["success", "incomplete", "failed"] }
            },
            "required": ["workflow_result", "status"]
        })
    }

    async fn call(&self, arguments: Value, _ctx: &ToolContext) -> Result<Value> {
        let result = arguments.get("workflow_result").cloned().unwrap_or(json!({}));
        let status = arguments
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("incomplete");

        let user_response = format_markdown(&result, status);
        Ok(json!({ "user_response": user_response }))
    }
}

fn format_markdown(result: &Value, status: &str) -> String {
    let mut parts: Vec<String> = Vec::new();

    match status {
        "success" => parts.push("## Implementation Complete\n".to_string()),
        _ => parts.push("## Task Incomplete\n".to_string()),
    }

    if let Some(goal) = result.get("goal").and_then(Value::as_str) {
        parts.push(format!("**Request:** {goal}\n"));
    }

    if let Some(architecture) = result.get("architecture").filter(|v| v.is_object()) {
        parts.push("### System Architecture\n".to_string());
        if let Some(description) = architecture.get("description").and_then(Value::as_str) {
            parts.push(format!("{description}\n"));
        }
        if let Some(technologies) = architecture.get("technologies").and_then(Value::as_array) {
            let names: Vec<String> = technologies
                .iter()
                .filter_map(|t| {
                    t.get("name")
                        .and_then(Value::as_str)
                        .map(String::from)
                        .or_else(|| t.as_str().map(String::from))
                })
                .collect();
            if !names.is_empty() {
                parts.push(format!("**Technologies:** {}\n", names.join(", ")));
            }
        }
    }

    if let Some(files) = result.get("generated_files").and_then(Value::as_array) {
        if !files.is_empty() {
            parts.push("### Generated Files\n".to_string());
            for file in files {
                let path = file.get("path").and_then(Value::as_str).unwrap_or("?");
                let lines = file.get("lines").and_then(Value::as_u64).unwrap_or(0);
                let language = file.get("language").and_then(Value::as_str).unwrap_or("");
                parts.push(format!("- `{path}` ({language}, {lines} lines)"));
            }
            parts.push(String::new());
        }
    }

    if let Some(validation) = result.get("validation_results").filter(|v| v.is_object()) {
        parts.push("### Validation Results\n".to_string());
        let passed = validation
            .get("passed")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        parts.push(format!(
            "- Status: {}",
            if passed { "passed" } else { "failed" }
        ));
        if let Some(score) = validation.get("quality_score").and_then(Value::as_f64) {
            parts.push(format!("- Quality score: {score:.2}"));
        }
        parts.push(String::new());
    }

    if let Some(issues) = result.get("issues").and_then(Value::as_array) {
        if !issues.is_empty() {
            parts.push("### Issues to Note\n".to_string());
            for issue in issues {
                let kind = issue.get("type").and_then(Value::as_str).unwrap_or("Issue");
                let message = issue.get("message").and_then(Value::as_str).unwrap_or("");
                parts.push(format!("- **{kind}**: {message}"));
            }
            parts.push(String::new());
        }
    }

    if let Some(errors) = result.get("errors").and_then(Value::as_array) {
        if !errors.is_empty() && status != "success" {
            parts.push("### What Went Wrong\n".to_string());
            for error in errors {
                let message = error
                    .get("message")
                    .and_then(Value::as_str)
                    .or_else(|| error.as_str())
                    .unwrap_or("unknown error");
                parts.push(format!("- {message}"));
                if let Some(guidance) = error.get("user_guidance").and_then(Value::as_str) {
                    parts.push(format!("  - Try: {guidance}"));
                }
            }
            parts.push(String::new());
        }
    }

    if status != "success" {
        parts.push("### Next Steps\n".to_string());
        parts.push(
            "Partial artifacts above are kept in the workspace. Rephrase or narrow the \
             request and run again to continue from here."
                .to_string(),
        );
    }

    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_report_headings() {
        let result = json!({
            "goal": "Create a FastAPI calculator",
            "generated_files": [
                { "path": "app/main.py", "language": "python", "lines": 42 }
            ],
            "validation_results": { "passed": true, "quality_score": 0.95 },
        });
        let markdown = format_markdown(&result, "success");
        assert!(markdown.contains("## Implementation Complete"));
        assert!(markdown.contains("### Generated Files"));
        assert!(markdown.contains("`app/main.py`"));
        assert!(!markdown.contains("Task Incomplete"));
    }

    #[test]
    fn test_failure_report_headings_and_guidance() {
        let result = json!({
            "errors": [
                { "message": "iteration budget exhausted", "user_guidance": "narrow the request" }
            ],
        });
        let markdown = format_markdown(&result, "incomplete");
        assert!(markdown.contains("## Task Incomplete"));
        assert!(markdown.contains("### What Went Wrong"));
        assert!(markdown.contains("narrow the request"));
        assert!(markdown.contains("### Next Steps"));
    }
}
