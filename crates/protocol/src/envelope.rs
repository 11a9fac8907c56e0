//! Gateway wire frames.
//!
//! Every message on the socket is one JSON text frame tagged by `type`:
//! `req` (client to gateway), `res` (reply to a request) or `event`
//! (unsolicited push).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single frame, discriminated by its `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
    Req(RequestFrame),
    Res(ResponseFrame),
    Event(EventFrame),
}

impl Frame {
    /// Parses a text frame. Unknown `type` values are an error.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Serializes the frame to its wire form.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Request frame: `{ "type": "req", "id", "method", "params" }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFrame {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl RequestFrame {
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: Value) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

/// Structured error carried by a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorShape {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Response frame: `{ "type": "res", "id", "ok", "payload" | "error" }`.
///
/// `error` is kept as raw JSON: gateways in the wild send either the
/// `{code, message, details}` object (with a string or numeric code) or a
/// bare string, and a frame must never be dropped because of that shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub id: String,
    #[serde(default)]
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl ResponseFrame {
    /// Builds a successful response.
    pub fn ok(id: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            ok: true,
            payload: Some(payload),
            error: None,
        }
    }

    /// Builds a failed response with a structured error.
    pub fn err(id: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        let shape = ErrorShape {
            code: code.into(),
            message: message.into(),
            details: None,
        };
        Self {
            id: id.into(),
            ok: false,
            payload: None,
            error: serde_json::to_value(shape).ok(),
        }
    }

    /// Human-readable error message, defaulting to `"request failed"`.
    pub fn error_message(&self) -> String {
        match &self.error {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Object(map)) => map
                .get("message")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .unwrap_or("request failed")
                .to_string(),
            _ => "request failed".to_string(),
        }
    }

    /// Error code as a string, whether the gateway sent a string or a number.
    pub fn error_code(&self) -> Option<String> {
        let code = self.error.as_ref()?.as_object()?.get("code")?;
        match code {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Event frame: `{ "type": "event", "event", "payload"?, "seq"? }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

impl EventFrame {
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload: Some(payload),
            seq: None,
        }
    }
}
