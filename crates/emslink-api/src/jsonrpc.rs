//! JSON-RPC 2.0 envelopes as they travel over the WebSocket.
//!
//! Outgoing messages are built from [`JsonRpcRequest`] and
//! [`JsonRpcNotification`]. Incoming text frames are classified by
//! [`Frame::parse`] into responses (correlated by `id`), notifications
//! (pushes without `id`) and server-initiated requests.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::Error;

pub const JSONRPC_VERSION: &str = "2.0";

// ── Outgoing ─────────────────────────────────────────────────────────

/// A request that expects a correlated response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Uuid,
    pub method: String,
    /// The backend rejects requests without a params object, so this
    /// is always present (an empty object when there is nothing to send).
    #[serde(default = "empty_params")]
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn new(id: Uuid, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id,
            method: method.into(),
            params: normalize_params(params),
        }
    }

    /// Build a request from any serializable params value.
    pub fn with_params<P: Serialize>(
        id: Uuid,
        method: impl Into<String>,
        params: &P,
    ) -> Result<Self, Error> {
        Ok(Self::new(id, method, serde_json::to_value(params)?))
    }

    pub fn to_text(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A one-way message; no response is expected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    pub method: String,
    #[serde(default = "empty_params")]
    pub params: Value,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            method: method.into(),
            params: normalize_params(params),
        }
    }

    pub fn to_text(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }
}

// ── Incoming ─────────────────────────────────────────────────────────

/// The `error` member of a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// A response correlated to an earlier request by `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRpcResponse {
    /// The echoed identifier, verbatim. Non-string ids are rendered
    /// with their JSON text so they can still be compared.
    pub id: String,
    pub outcome: Result<Value, JsonRpcError>,
}

/// A request initiated by the remote side.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingRequest {
    pub id: String,
    pub method: String,
    pub params: Value,
}

/// A classified inbound text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Response(JsonRpcResponse),
    Notification(JsonRpcNotification),
    Request(IncomingRequest),
}

/// Every member any envelope may carry; classification happens after parsing.
#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

impl Frame {
    /// Parse and classify a text frame.
    ///
    /// - `method` + `id` is a request from the remote side
    /// - `method` without `id` is a notification
    /// - `id` without `method` is a response; an `error` member wins over `result`
    pub fn parse(text: &str) -> Result<Self, Error> {
        let raw: RawFrame = serde_json::from_str(text).map_err(|e| Error::InvalidFrame {
            message: e.to_string(),
            body: text.to_owned(),
        })?;

        let id = raw.id.filter(|v| !v.is_null()).map(|v| match v {
            Value::String(s) => s,
            other => other.to_string(),
        });

        match (id, raw.method) {
            (Some(id), Some(method)) => Ok(Self::Request(IncomingRequest {
                id,
                method,
                params: raw.params.unwrap_or_else(empty_params),
            })),
            (None, Some(method)) => Ok(Self::Notification(JsonRpcNotification {
                jsonrpc: JSONRPC_VERSION.into(),
                method,
                params: raw.params.unwrap_or_else(empty_params),
            })),
            (Some(id), None) => {
                let outcome = match raw.error {
                    Some(error) => Err(error),
                    None => Ok(raw.result.unwrap_or(Value::Null)),
                };
                Ok(Self::Response(JsonRpcResponse { id, outcome }))
            }
            (None, None) => Err(Error::InvalidFrame {
                message: "frame has neither id nor method".into(),
                body: text.to_owned(),
            }),
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

fn default_version() -> String {
    JSONRPC_VERSION.into()
}

fn empty_params() -> Value {
    Value::Object(serde_json::Map::new())
}

fn normalize_params(params: Value) -> Value {
    if params.is_null() { empty_params() } else { params }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn request_serializes_with_version_and_params() {
        let id = Uuid::new_v4();
        let req = JsonRpcRequest::new(id, "getEdges", Value::Null);
        let value: Value = serde_json::from_str(&req.to_text().unwrap()).unwrap();

        assert_eq!(
            value,
            json!({ "jsonrpc": "2.0", "id": id.to_string(), "method": "getEdges", "params": {} })
        );
    }

    #[test]
    fn classifies_success_response() {
        let frame = Frame::parse(r#"{"jsonrpc":"2.0","id":"r1","result":{"ok":true}}"#).unwrap();
        assert_eq!(
            frame,
            Frame::Response(JsonRpcResponse {
                id: "r1".into(),
                outcome: Ok(json!({ "ok": true })),
            })
        );
    }

    #[test]
    fn classifies_error_response() {
        let text = r#"{"jsonrpc":"2.0","id":"r2","error":{"code":1003,"message":"denied"}}"#;
        let Frame::Response(resp) = Frame::parse(text).unwrap() else {
            panic!("expected response");
        };
        let err = resp.outcome.unwrap_err();
        assert_eq!(err.code, 1003);
        assert_eq!(err.message, "denied");
        assert_eq!(err.to_string(), "[1003] denied");
    }

    #[test]
    fn null_result_is_still_a_success() {
        let Frame::Response(resp) = Frame::parse(r#"{"id":"r3","result":null}"#).unwrap() else {
            panic!("expected response");
        };
        assert_eq!(resp.outcome, Ok(Value::Null));
    }

    #[test]
    fn numeric_ids_are_stringified() {
        let Frame::Response(resp) = Frame::parse(r#"{"id":42,"result":{}}"#).unwrap() else {
            panic!("expected response");
        };
        assert_eq!(resp.id, "42");
    }

    #[test]
    fn classifies_notification() {
        let text = r#"{"jsonrpc":"2.0","method":"edgesStatusUpdate","params":{"edges":[]}}"#;
        let Frame::Notification(n) = Frame::parse(text).unwrap() else {
            panic!("expected notification");
        };
        assert_eq!(n.method, "edgesStatusUpdate");
        assert_eq!(n.params, json!({ "edges": [] }));
    }

    #[test]
    fn classifies_incoming_request() {
        let text = r#"{"jsonrpc":"2.0","id":"x","method":"ping"}"#;
        let Frame::Request(r) = Frame::parse(text).unwrap() else {
            panic!("expected request");
        };
        assert_eq!(r.method, "ping");
        assert_eq!(r.params, json!({}));
    }

    #[test]
    fn rejects_frames_without_id_or_method() {
        let err = Frame::parse(r#"{"jsonrpc":"2.0","result":{}}"#).unwrap_err();
        assert!(matches!(err, Error::InvalidFrame { .. }));
    }

    #[test]
    fn rejects_non_json() {
        let err = Frame::parse("not json at all").unwrap_err();
        let Error::InvalidFrame { body, .. } = err else {
            panic!("expected InvalidFrame");
        };
        assert_eq!(body, "not json at all");
    }
}
