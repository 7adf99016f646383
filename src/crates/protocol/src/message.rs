//! Frame types and line codec.

use crate::error::{ProtocolError, Result};
use crate::{codes, JSONRPC_VERSION};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A JSON-RPC request. Always carries a numeric id; the orchestrator
/// allocates ids from a single global counter so they are unique across
/// workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

impl Request {
    /// Create a request with the given id, method, and params.
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC response, carrying either `result` or `error` and echoing the
/// request id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    /// Successful response for `id`.
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Failed response for `id`.
    pub fn failure(id: u64, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Whether the response carries a result rather than an error.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Structured error object inside a failed [`Response`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(codes::PARSE_ERROR, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(codes::INVALID_REQUEST, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(codes::METHOD_NOT_FOUND, format!("method not found: {method}"))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(codes::INVALID_PARAMS, message)
    }

    /// Tool-specific failure in the `-32000..=-32099` range.
    pub fn tool_error(message: impl Into<String>) -> Self {
        Self::new(codes::TOOL_ERROR, message)
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rpc error {}: {}", self.code, self.message)
    }
}

/// A JSON-RPC notification. Has a `method` and **no id**; workers use it for
/// `$/progress` frames during a tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

impl Notification {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }

    /// Build a `$/progress` notification.
    pub fn progress(params: &ProgressParams) -> Self {
        Self::new(
            crate::methods::PROGRESS,
            serde_json::to_value(params).unwrap_or(Value::Null),
        )
    }
}

/// Payload of a `$/progress` notification. `progress` is clamped to
/// `[0.0, 1.0]` by the emitting side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressParams {
    pub message: String,
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
}

/// Classified inbound frame.
///
/// Classification is by shape, not by method name: `id` without `method` is a
/// response, `method` without `id` is a notification, both together is a
/// request. Anything else is rejected.
#[derive(Debug, Clone)]
pub enum Frame {
    Request(Request),
    Response(Response),
    Notification(Notification),
}

impl Frame {
    /// Parse and classify one line from the wire.
    pub fn parse(line: &str) -> Result<Frame> {
        let value: Value = serde_json::from_str(line.trim())?;
        let obj = value
            .as_object()
            .ok_or_else(|| ProtocolError::UnrecognizedFrame("not a JSON object".to_string()))?;

        let has_id = obj.get("id").map(|v| !v.is_null()).unwrap_or(false);
        let has_method = obj.contains_key("method");

        match (has_id, has_method) {
            (true, false) => Ok(Frame::Response(serde_json::from_value(value)?)),
            (false, true) => Ok(Frame::Notification(serde_json::from_value(value)?)),
            (true, true) => Ok(Frame::Request(serde_json::from_value(value)?)),
            (false, false) => Err(ProtocolError::UnrecognizedFrame(
                "message has neither id nor method".to_string(),
            )),
        }
    }
}

/// Serialize a message to a single newline-terminated line.
///
/// Fails if the serialized form would itself contain a newline (it never
/// does for `serde_json`, but the invariant is cheap to state).
pub fn encode_line<T: Serialize>(message: &T) -> Result<String> {
    let mut line = serde_json::to_string(message)?;
    if line.contains('\n') {
        return Err(ProtocolError::EmbeddedNewline);
    }
    line.push('\n');
    Ok(line)
}

/// Build the standard `tools/call` result envelope around a JSON-serialized
/// tool payload: `{"content": [{"type": "text", "text": <json>}]}`.
pub fn tool_text_result(text: impl Into<String>) -> Value {
    serde_json::json!({
        "content": [{ "type": "text", "text": text.into() }]
    })
}

/// Extract the `content[0].text` string from a `tools/call` result.
pub fn tool_text(result: &Value) -> Option<&str> {
    result
        .get("content")?
        .as_array()?
        .first()?
        .get("text")?
        .as_str()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_round_trip() {
        let req = Request::new(3, crate::methods::TOOLS_LIST, Value::Null);
        let line = encode_line(&req).unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);

        match Frame::parse(&line).unwrap() {
            Frame::Request(parsed) => {
                assert_eq!(parsed.id, 3);
                assert_eq!(parsed.method, "tools/list");
            }
            other => panic!("expected request, got {other:?}"),
        }
    }

    #[test]
    fn test_response_classified_by_id_without_method() {
        let line = r#"{"jsonrpc":"2.0","id":9,"result":{"ok":true}}"#;
        match Frame::parse(line).unwrap() {
            Frame::Response(resp) => {
                assert_eq!(resp.id, 9);
                assert!(resp.is_success());
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn test_progress_notification_is_not_a_response() {
        let note = Notification::progress(&ProgressParams {
            message: "halfway".to_string(),
            progress: 0.5,
            server: Some("research".to_string()),
        });
        let line = encode_line(&note).unwrap();

        match Frame::parse(&line).unwrap() {
            Frame::Notification(n) => {
                assert_eq!(n.method, "$/progress");
                assert_eq!(n.params["progress"], json!(0.5));
            }
            other => panic!("progress frame misclassified as {other:?}"),
        }
    }

    #[test]
    fn test_null_id_is_treated_as_absent() {
        let line = r#"{"jsonrpc":"2.0","id":null,"method":"$/progress","params":{}}"#;
        assert!(matches!(
            Frame::parse(line).unwrap(),
            Frame::Notification(_)
        ));
    }

    #[test]
    fn test_error_response_round_trip() {
        let resp = Response::failure(12, RpcError::method_not_found("tools/run"));
        let line = encode_line(&resp).unwrap();
        match Frame::parse(&line).unwrap() {
            Frame::Response(parsed) => {
                assert!(!parsed.is_success());
                let err = parsed.error.unwrap();
                assert_eq!(err.code, crate::codes::METHOD_NOT_FOUND);
                assert!(err.message.contains("tools/run"));
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn test_unrecognized_frames_rejected() {
        assert!(Frame::parse("[1,2,3]").is_err());
        assert!(Frame::parse(r#"{"jsonrpc":"2.0"}"#).is_err());
        assert!(Frame::parse("not json at all").is_err());
    }

    #[test]
    fn test_tool_text_envelope() {
        let payload = r#"{"code_complete":true}"#;
        let envelope = tool_text_result(payload);
        assert_eq!(tool_text(&envelope), Some(payload));
        assert_eq!(envelope["content"][0]["type"], json!("text"));
    }
}
