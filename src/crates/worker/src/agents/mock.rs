//! Scripted agent for protocol tests.
//!
//! The `echo` tool's behavior is driven entirely by its arguments, so the
//! orchestrator test suite can provoke progress frames, slow responses,
//! structured failures, and mid-call crashes from outside the process:
//!
//! - `progress_frames`: emit N `$/progress` notifications before replying
//! - `sleep_ms`: wait before replying
//! - `fail`: return a tool error with this message
//! - `exit_code`: terminate the process mid-call with this code
//! - `crash_once_marker`: crash with code 7 only if the marker file does
//!   not exist yet (created before crashing), so a retry succeeds
//!
//! Anything else is echoed back as `{ "echo": <arguments> }`.

use crate::error::{Result, WorkerError};
use crate::tool::{AgentTool, ToolContext};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

pub struct MockTool;

#[async_trait]
impl AgentTool for MockTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Scripted behaviors for protocol tests"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "progress_frames": { "type": "integer" },
                "sleep_ms": { "type": "integer" },
                "fail": { "type": "string" },
                "exit_code": { "type": "integer" },
                "crash_once_marker": { "type": "string" }
            }
        })
    }

    async fn call(&self, arguments: Value, ctx: &ToolContext) -> Result<Value> {
        if let Some(marker) = arguments.get("crash_once_marker").and_then(Value::as_str) {
            if !std::path::Path::new(marker).exists() {
                std::fs::write(marker, b"crashed")?;
                tracing::warn!("mock: crashing once as scripted");
                std::process::exit(7);
            }
        }

        if let Some(code) = arguments.get("exit_code").and_then(Value::as_i64) {
            tracing::warn!(code, "mock: exiting as scripted");
            std::process::exit(code as i32);
        }

        if let Some(frames) = arguments.get("progress_frames").and_then(Value::as_u64) {
            for i in 0..frames {
                let fraction = (i + 1) as f64 / frames as f64;
                ctx.progress
                    .emit(format!("mock progress {}/{frames}", i + 1), fraction)
                    .await?;
            }
        }

        if let Some(ms) = arguments.get("sleep_ms").and_then(Value::as_u64) {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }

        if let Some(message) = arguments.get("fail").and_then(Value::as_str) {
            return Err(WorkerError::Tool(message.to_string()));
        }

        Ok(json!({ "echo": arguments }))
    }
}
