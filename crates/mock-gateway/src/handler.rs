//! Responder trait: how the mock gateway answers requests.

use serde_json::Value;

/// Reply the mock gateway sends for a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// `ok: true` with the given payload.
    Ok(Value),
    /// `ok: false` with a structured error.
    Err { code: String, message: String },
    /// Never answer; the request stays pending on the client.
    Silent,
}

impl Reply {
    pub fn err(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Err {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Answers non-`connect` requests.
///
/// The default implementation answers every method with an empty object.
pub trait Responder: Send + Sync + 'static {
    fn respond(&self, method: &str, params: &Value) -> Reply {
        let _ = (method, params);
        Reply::Ok(Value::Object(Default::default()))
    }
}

/// Answers every request with an empty object.
pub struct EmptyResponder;

impl Responder for EmptyResponder {}

impl<F> Responder for F
where
    F: Fn(&str, &Value) -> Reply + Send + Sync + 'static,
{
    fn respond(&self, method: &str, params: &Value) -> Reply {
        self(method, params)
    }
}
