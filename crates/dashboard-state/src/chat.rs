//! Chat transcript and the stream reducers that fold push events into it.
//!
//! All methods are synchronous; the store calls them under its write lock.

use clawdeck_protocol::messages::HistoryMessage;
use clawdeck_protocol::types::ChatAttachment;
use clawdeck_protocol::{ChatEvent, ChatRole, StreamState, ThinkingEvent, ToolEvent, ToolState};

/// Tool name used when a `tool` start event carries none.
const UNKNOWN_TOOL: &str = "unknown";

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// One message in the transcript.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    pub timestamp_ms: i64,
    /// Run that produced the message; `None` for local and history messages.
    pub run_id: Option<String>,
    pub attachments: Vec<ChatAttachment>,
}

impl ChatMessage {
    fn streamed(event: &ChatEvent) -> Self {
        Self {
            role: event.role,
            content: event.text.clone(),
            timestamp_ms: now_ms(),
            run_id: Some(event.run_id.clone()),
            attachments: Vec::new(),
        }
    }

    fn from_history(entry: &HistoryMessage) -> Self {
        // Stored messages are either the user's or the agent's.
        let role = if entry.role.as_deref() == Some("user") {
            ChatRole::User
        } else {
            ChatRole::Assistant
        };
        Self {
            role,
            content: entry.text(),
            timestamp_ms: entry.timestamp.filter(|ts| *ts > 0).unwrap_or_else(now_ms),
            run_id: None,
            attachments: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolStatus {
    Running,
    Done,
    Error,
}

impl ToolStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Done => "done",
            Self::Error => "error",
        }
    }
}

/// A tool invocation of the current run.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub args: Option<String>,
    pub status: ToolStatus,
    pub output: Option<String>,
    pub started_at_ms: i64,
}

/// Chat view state for the selected session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatState {
    /// Selected session; `None` until chosen or defaulted from the hello.
    pub session_key: Option<String>,
    pub messages: Vec<ChatMessage>,
    /// A reply (or history load) is in progress.
    pub loading: bool,
    /// Attachments queued for the next outgoing message.
    pub attachments: Vec<ChatAttachment>,
    /// Tool calls of the current run, in start order.
    pub tools: Vec<ToolCall>,
    /// Accumulated reasoning text of the current run.
    pub thinking: String,
}

impl ChatState {
    /// Folds a streamed chat fragment into the transcript.
    ///
    /// A `delta` appends to the message with the same run id (or starts a
    /// new one). A `final` replaces the content verbatim, creating the
    /// message if no delta preceded it, and clears the thinking buffer.
    pub fn apply_chat(&mut self, event: &ChatEvent) {
        let existing = self
            .messages
            .iter_mut()
            .find(|m| m.run_id.as_deref() == Some(event.run_id.as_str()));

        match event.state {
            StreamState::Delta => {
                match existing {
                    Some(message) => message.content.push_str(&event.text),
                    None => self.messages.push(ChatMessage::streamed(event)),
                }
                self.loading = true;
            }
            StreamState::Final => {
                match existing {
                    Some(message) => message.content.clone_from(&event.text),
                    None => self.messages.push(ChatMessage::streamed(event)),
                }
                self.loading = false;
                self.thinking.clear();
            }
        }
    }

    /// Tracks a tool call. `done`/`error` for an unknown id is a no-op.
    pub fn apply_tool(&mut self, event: &ToolEvent) {
        match event.state {
            ToolState::Start => self.tools.push(ToolCall {
                id: event.tool_call_id.clone(),
                name: event
                    .tool_name
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_TOOL.to_string()),
                args: event.args.clone(),
                status: ToolStatus::Running,
                output: None,
                started_at_ms: now_ms(),
            }),
            ToolState::Done | ToolState::Error => {
                let Some(tool) = self.tools.iter_mut().find(|t| t.id == event.tool_call_id) else {
                    tracing::trace!(id = %event.tool_call_id, "tool update for unknown call");
                    return;
                };
                tool.output.clone_from(&event.output);
                tool.status = if event.state == ToolState::Error {
                    ToolStatus::Error
                } else {
                    ToolStatus::Done
                };
            }
        }
    }

    pub fn apply_thinking(&mut self, event: &ThinkingEvent) {
        match event.state {
            StreamState::Delta => self.thinking.push_str(&event.text),
            StreamState::Final => self.thinking.clear(),
        }
    }

    /// Appends the user's outgoing message and resets per-run state.
    ///
    /// Returns the attachments to send: the explicit ones if given,
    /// otherwise the queued ones. The queue is cleared either way.
    pub fn begin_send(
        &mut self,
        text: &str,
        attachments: Option<Vec<ChatAttachment>>,
    ) -> Vec<ChatAttachment> {
        let queued = std::mem::take(&mut self.attachments);
        let outgoing = attachments.unwrap_or(queued);
        self.messages.push(ChatMessage {
            role: ChatRole::User,
            content: text.to_string(),
            timestamp_ms: now_ms(),
            run_id: None,
            attachments: outgoing.clone(),
        });
        self.loading = true;
        self.tools.clear();
        self.thinking.clear();
        outgoing
    }

    /// Selects a session and empties the transcript ahead of a history load.
    pub fn select_session(&mut self, key: &str) {
        self.session_key = Some(key.to_string());
        self.messages.clear();
        self.loading = true;
    }

    /// Replaces the transcript with stored history.
    pub fn load_history(&mut self, history: &[HistoryMessage]) {
        self.messages = history.iter().map(ChatMessage::from_history).collect();
        self.loading = false;
    }

    /// Clears messages, queued attachments, tools, and thinking.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.attachments.clear();
        self.tools.clear();
        self.thinking.clear();
    }

    pub fn add_attachment(&mut self, attachment: ChatAttachment) {
        self.attachments.push(attachment);
    }

    /// Removes every queued attachment with the given id.
    pub fn remove_attachment(&mut self, id: &str) {
        self.attachments.retain(|a| a.id != id);
    }

    pub fn clear_attachments(&mut self) {
        self.attachments.clear();
    }
}
