//! Typed classification of gateway push events.
//!
//! [`GatewayEvent::classify`] is total: every [`EventFrame`] maps to exactly
//! one variant, and a known event name with an unusable payload becomes
//! [`GatewayEvent::Ignored`] instead of an error.

use serde_json::{Map, Value};

use crate::constants::event_names;
use crate::envelope::EventFrame;
use crate::messages::content_text;

/// Phase of a streamed chat or thinking fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Delta,
    Final,
}

impl StreamState {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "delta" => Some(Self::Delta),
            "final" => Some(Self::Final),
            _ => None,
        }
    }
}

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

impl ChatRole {
    /// Parses a wire role. Anything unrecognised is treated as the assistant.
    pub fn parse(s: &str) -> Self {
        match s {
            "user" => Self::User,
            "system" => Self::System,
            _ => Self::Assistant,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

/// Lifecycle phase of a tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolState {
    Start,
    Done,
    Error,
}

impl ToolState {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "start" => Some(Self::Start),
            "done" => Some(Self::Done),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Streaming chat fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatEvent {
    pub run_id: String,
    pub role: ChatRole,
    pub text: String,
    pub state: StreamState,
    pub session_key: Option<String>,
}

/// Tool call lifecycle update.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolEvent {
    pub tool_call_id: String,
    pub tool_name: Option<String>,
    pub args: Option<String>,
    pub output: Option<String>,
    pub state: ToolState,
    pub run_id: Option<String>,
}

/// Streaming reasoning fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct ThinkingEvent {
    pub text: String,
    pub state: StreamState,
    pub run_id: Option<String>,
}

/// A classified push event.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    /// `connect.challenge` with a string nonce.
    Challenge { nonce: String },
    Chat(ChatEvent),
    Tool(ToolEvent),
    Thinking(ThinkingEvent),
    /// Any event without dedicated handling, forwarded unmodified.
    Other(EventFrame),
    /// Known event name whose payload could not be used.
    Ignored { event: String },
}

impl GatewayEvent {
    pub fn classify(frame: EventFrame) -> Self {
        let parsed = match frame.event.as_str() {
            event_names::CONNECT_CHALLENGE => parse_challenge(frame.payload.as_ref()),
            event_names::CHAT => parse_chat(frame.payload.as_ref()).map(Self::Chat),
            event_names::TOOL => parse_tool(frame.payload.as_ref()).map(Self::Tool),
            event_names::THINKING => parse_thinking(frame.payload.as_ref()).map(Self::Thinking),
            _ => return Self::Other(frame),
        };
        parsed.unwrap_or(Self::Ignored { event: frame.event })
    }

    /// Event name this variant was classified from.
    pub fn name(&self) -> &str {
        match self {
            Self::Challenge { .. } => event_names::CONNECT_CHALLENGE,
            Self::Chat(_) => event_names::CHAT,
            Self::Tool(_) => event_names::TOOL,
            Self::Thinking(_) => event_names::THINKING,
            Self::Other(frame) => &frame.event,
            Self::Ignored { event } => event,
        }
    }
}

fn str_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str)
}

/// Strings pass through; any other non-null value is rendered as JSON.
fn text_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn parse_challenge(payload: Option<&Value>) -> Option<GatewayEvent> {
    let nonce = payload?.as_object()?.get("nonce")?.as_str()?;
    Some(GatewayEvent::Challenge {
        nonce: nonce.to_string(),
    })
}

fn parse_chat(payload: Option<&Value>) -> Option<ChatEvent> {
    let obj = payload?.as_object()?;
    let run_id = str_field(obj, "runId")?;
    let state = StreamState::parse(str_field(obj, "state")?)?;
    let message = obj.get("message")?.as_object()?;
    let role = ChatRole::parse(str_field(message, "role").unwrap_or("assistant"));
    let text = message.get("content").map(content_text).unwrap_or_default();
    Some(ChatEvent {
        run_id: run_id.to_string(),
        role,
        text,
        state,
        session_key: str_field(obj, "sessionKey").map(str::to_string),
    })
}

fn parse_tool(payload: Option<&Value>) -> Option<ToolEvent> {
    let obj = payload?.as_object()?;
    let tool_call_id = str_field(obj, "toolCallId").filter(|id| !id.is_empty())?;
    let state = ToolState::parse(str_field(obj, "state")?)?;
    Some(ToolEvent {
        tool_call_id: tool_call_id.to_string(),
        tool_name: str_field(obj, "toolName").map(str::to_string),
        args: text_field(obj, "args"),
        output: text_field(obj, "output"),
        state,
        run_id: str_field(obj, "runId").map(str::to_string),
    })
}

fn parse_thinking(payload: Option<&Value>) -> Option<ThinkingEvent> {
    let obj = payload?.as_object()?;
    let text = str_field(obj, "text").filter(|t| !t.is_empty())?;
    let state = StreamState::parse(str_field(obj, "state")?)?;
    Some(ThinkingEvent {
        text: text.to_string(),
        state,
        run_id: str_field(obj, "runId").map(str::to_string),
    })
}
