//! ReviewFix agent: deterministic static checks, an LLM review pass, and
//! inline fixes written back to the workspace.
//!
//! Invoked after every codesmith run (the supervisor enforces this). Returns
//! either a verdict with optional fixed files, or a research request when
//! the same errors keep surviving fix attempts.

use crate::agents::{chat_json, parse_json_content};
use crate::error::{Result, WorkerError};
use crate::tool::{AgentTool, ToolContext};
use async_trait::async_trait;
use maestro_llm::{ChatMessage, ChatModel, ChatRequest};
use serde_json::{json, Value};
use std::sync::Arc;

const REVIEW_SYSTEM_PROMPT: &str = "\
You review generated code for correctness. Given the files and any prior \
validation errors, reply with one JSON object:
  {\"passed\": bool, \"quality_score\": number between 0 and 1,
   \"issues\": [{\"type\": string, \"message\": string, \"file\": string, \"line\": number?}],
   \"suggestions\": [string]}
Report only real defects (syntax errors, missing imports, broken logic), \
not style preferences.";

const FIX_SYSTEM_PROMPT: &str = "\
You fix defects in one source file. Reply with one JSON object: \
{\"content\": string} containing the complete corrected file. Change only \
what the listed issues require.";

/// Iterations of fixing after which persistent errors become a research
/// request instead of another blind fix attempt.
const RESEARCH_AFTER_ITERATIONS: u64 = 3;

/// The `review_and_fix` tool.
pub struct ReviewFixTool {
    model: Arc<dyn ChatModel>,
}

impl ReviewFixTool {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl AgentTool for ReviewFixTool {
    fn name(&self) -> &str {
        "review_and_fix"
    }

    fn description(&self) -> &str {
        "Validate generated files and fix defects in place"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "instructions": { "type": "string" },
                "generated_files": { "type": "array" },
                "validation_errors": { "type": "array" },
                "workspace_path": { "type": "string" },
                "iteration": { "type": "integer" }
            },
            "required": ["generated_files"]
        })
    }

    async fn call(&self, arguments: Value, ctx: &ToolContext) -> Result<Value> {
        let files = arguments
            .get("generated_files")
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| {
                WorkerError::InvalidParams("review_and_fix requires generated_files".to_string())
            })?;
        let iteration = arguments
            .get("iteration")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let validation_errors = arguments
            .get("validation_errors")
            .cloned()
            .unwrap_or(Value::Null);

        ctx.progress.emit("running static checks", 0.2).await?;
        let mut issues = static_issues(&files);

        ctx.progress.emit("reviewing with model", 0.4).await?;
        let review = self.llm_review(&files, &validation_errors).await;
        let (quality_score, suggestions) = match review {
            Ok(review) => {
                if let Some(model_issues) = review.get("issues").and_then(Value::as_array) {
                    issues.extend(model_issues.iter().cloned());
                }
                (
                    review
                        .get("quality_score")
                        .and_then(Value::as_f64)
                        .unwrap_or(0.8),
                    review.get("suggestions").cloned().unwrap_or(json!([])),
                )
            }
            Err(e) => {
                // Static checks still stand on their own.
                tracing::warn!(error = %e, "model review failed, using static checks only");
                (0.5, json!([]))
            }
        };

        if issues.is_empty() {
            ctx.progress.emit("validation passed", 1.0).await?;
            return Ok(json!({
                "validation_passed": true,
                "quality_score": quality_score,
                "remaining_errors": [],
                "issues": [],
                "suggestions": suggestions,
                "fix_summary": "no issues found",
                "checks": { "static": "passed", "review": "passed" },
            }));
        }

        ctx.progress
            .emit(format!("fixing {} issue(s)", issues.len()), 0.6)
            .await?;
        let (fixed_files, remaining) = self.fix_files(&files, &issues, ctx).await?;

        let validation_passed = remaining.is_empty();
        let fix_summary = format!(
            "{} issue(s) found, {} file(s) rewritten, {} issue(s) remaining",
            issues.len(),
            fixed_files.len(),
            remaining.len()
        );

        // Persistent failures stop being a fixing problem and become a
        // knowledge problem.
        if !validation_passed && iteration >= RESEARCH_AFTER_ITERATIONS {
            let summary: Vec<String> = remaining
                .iter()
                .filter_map(|i| i.get("message").and_then(Value::as_str))
                .map(String::from)
                .collect();
            ctx.progress.emit("requesting research for persistent errors", 1.0).await?;
            return Ok(json!({
                "validation_passed": false,
                "needs_research": true,
                "research_request": format!(
                    "How to resolve these persistent errors: {}",
                    summary.join("; ")
                ),
                "remaining_errors": remaining,
                "issues": remaining,
                "quality_score": quality_score,
                "fix_summary": fix_summary,
            }));
        }

        ctx.progress.emit("review complete", 1.0).await?;
        Ok(json!({
            "validation_passed": validation_passed,
            "quality_score": if validation_passed { quality_score } else { quality_score.min(0.4) },
            "fixed_files": fixed_files,
            "remaining_errors": remaining,
            "issues": remaining,
            "suggestions": suggestions,
            "fix_summary": fix_summary,
            "checks": { "static": if validation_passed { "passed" } else { "failed" } },
        }))
    }
}

impl ReviewFixTool {
    async fn llm_review(&self, files: &[Value], validation_errors: &Value) -> Result<Value> {
        let mut sections = Vec::with_capacity(files.len());
        for file in files {
            let path = file.get("path").and_then(Value::as_str).unwrap_or("?");
            let content = file.get("content").and_then(Value::as_str).unwrap_or("");
            let truncated: String = content.chars().take(4000).collect();
            sections.push(format!("=== {path} ===\n{truncated}"));
        }
        let user_prompt = format!(
            "Prior validation errors:\n{}\n\nFiles:\n{}",
            serde_json::to_string(validation_errors)?,
            sections.join("\n\n")
        );
        chat_json(&self.model, REVIEW_SYSTEM_PROMPT, &user_prompt).await
    }

    /// Rewrite each file that has issues; returns the fixed files and the
    /// issues still present after the rewrite.
    async fn fix_files(
        &self,
        files: &[Value],
        issues: &[Value],
        ctx: &ToolContext,
    ) -> Result<(Vec<Value>, Vec<Value>)> {
        let mut fixed_files = Vec::new();
        let mut remaining: Vec<Value> = Vec::new();

        for file in files {
            let path = match file.get("path").and_then(Value::as_str) {
                Some(path) => path,
                None => continue,
            };
            let file_issues: Vec<&Value> = issues
                .iter()
                .filter(|i| i.get("file").and_then(Value::as_str) == Some(path))
                .collect();
            if file_issues.is_empty() {
                continue;
            }

            let content = file.get("content").and_then(Value::as_str).unwrap_or("");
            let language = file.get("language").and_then(Value::as_str).unwrap_or("text");
            let issue_list = serde_json::to_string(&file_issues)?;

            let request = ChatRequest::new(vec![
                ChatMessage::system(FIX_SYSTEM_PROMPT),
                ChatMessage::user(format!(
                    "File: {path}\nIssues: {issue_list}\n\n{content}"
                )),
            ])
            .with_temperature(0.0)
            .with_json_mode();

            let fixed_content = match self.model.chat(request).await {
                Ok(response) => parse_json_content(&response.content)
                    .ok()
                    .and_then(|v| v.get("content").and_then(Value::as_str).map(String::from)),
                Err(e) => {
                    tracing::warn!(file = %path, error = %e, "fix attempt failed");
                    None
                }
            };

            match fixed_content {
                Some(new_content) => {
                    let target = ctx.workspace_path.join(path);
                    if let Some(parent) = target.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&target, &new_content)?;

                    let recheck = check_file(path, language, &new_content);
                    if recheck.is_empty() {
                        fixed_files.push(json!({
                            "path": path,
                            "language": language,
                            "content": new_content,
                            "lines": new_content.lines().count(),
                        }));
                    } else {
                        remaining.extend(recheck);
                    }
                }
                None => remaining.extend(file_issues.into_iter().cloned()),
            }
        }

        // Issues not attributable to a known file cannot be fixed inline.
        let known_paths: Vec<&str> = files
            .iter()
            .filter_map(|f| f.get("path").and_then(Value::as_str))
            .collect();
        remaining.extend(
            issues
                .iter()
                .filter(|i| {
                    !i.get("file")
                        .and_then(Value::as_str)
                        .map(|f| known_paths.contains(&f))
                        .unwrap_or(false)
                })
                .cloned(),
        );

        Ok((fixed_files, remaining))
    }
}

/// Deterministic checks over every generated file.
fn static_issues(files: &[Value]) -> Vec<Value> {
    let mut issues = Vec::new();
    for file in files {
        let path = file.get("path").and_then(Value::as_str).unwrap_or("?");
        let language = file.get("language").and_then(Value::as_str).unwrap_or("text");
        let content = file.get("content").and_then(Value::as_str).unwrap_or("");
        issues.extend(check_file(path, language, content));
    }
    issues
}

/// Checks for one file: emptiness, placeholder markers, and (for code
/// files) a bracket-balance scan that catches truncated output.
fn check_file(path: &str, language: &str, content: &str) -> Vec<Value> {
    let mut issues = Vec::new();

    if content.trim().is_empty() {
        issues.push(json!({
            "type": "EmptyFile",
            "message": format!("{path} is empty"),
            "file": path,
        }));
        return issues;
    }

    for (line_no, line) in content.lines().enumerate() {
        let lowered = line.to_lowercase();
        if lowered.contains("your code here")
            || lowered.contains("implementation goes here")
            || line.contains("<placeholder>")
        {
            issues.push(json!({
                "type": "Placeholder",
                "message": format!("{path}:{} contains placeholder text", line_no + 1),
                "file": path,
                "line": line_no + 1,
            }));
        }
    }

    if matches!(language, "python" | "rust" | "javascript" | "typescript" | "json") {
        if let Some(message) = unbalanced_delimiters(content) {
            issues.push(json!({
                "type": "SyntaxError",
                "message": format!("{path}: {message}"),
                "file": path,
            }));
        }
    }

    issues
}

/// Naive delimiter balance scan, string-literal aware enough for generated
/// code. Reports the first imbalance found.
fn unbalanced_delimiters(content: &str) -> Option<String> {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string: Option<char> = None;
    let mut escaped = false;

    for ch in content.chars() {
        if let Some(quote) = in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == quote {
                in_string = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => in_string = Some(ch),
            '(' | '[' | '{' => stack.push(ch),
            ')' | ']' | '}' => {
                let expected = match ch {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                if stack.pop() != Some(expected) {
                    return Some(format!("unmatched '{ch}'"));
                }
            }
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Some(format!("unclosed '{open}'"));
    }
    None
}
