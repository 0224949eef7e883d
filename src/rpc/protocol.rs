//! JSON-RPC 2.0 wire types for the stdio transport.
//!
//! One request per line on stdin, one response per line on stdout.
//! Protocol-level failures use the standard JSON-RPC codes and never carry
//! a domain envelope.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::Value;

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

/// Frames larger than this are rejected with `-32600 Invalid Request`
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    /// Absent id marks a notification; notifications get no response
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct ToolCallParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Box<RawValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    /// Success response splicing an already-serialized result object.
    ///
    /// This is how precomputed `initialize`/`tools/list` bytes get the
    /// request id stamped without re-serializing the payload.
    pub fn success_raw(id: Value, result_json: String) -> Self {
        match RawValue::from_string(result_json) {
            Ok(raw) => Self { jsonrpc: "2.0", id, result: Some(raw), error: None },
            Err(e) => Self::failure(id, INTERNAL_ERROR, format!("result serialization: {}", e)),
        }
    }

    pub fn success_value(id: Value, result: &impl Serialize) -> Self {
        match serde_json::to_string(result) {
            Ok(json) => Self::success_raw(id, json),
            Err(e) => Self::failure(id, INTERNAL_ERROR, format!("result serialization: {}", e)),
        }
    }

    pub fn failure(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(RpcError { code, message: message.into(), data: None }),
        }
    }

    /// Serialize to one output line (without the trailing newline)
    pub fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                "{{\"jsonrpc\":\"2.0\",\"id\":null,\"error\":{{\"code\":{},\"message\":\"response serialization: {}\"}}}}",
                INTERNAL_ERROR, e
            )
        })
    }
}
