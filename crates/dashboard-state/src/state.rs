//! Snapshot of everything the front end renders.
//!
//! [`DashboardState`] is a plain value: connection events are folded in with
//! [`apply`](DashboardState::apply) and domain snapshots are replaced
//! wholesale by the store. All methods are synchronous.

use std::collections::HashMap;

use tracing::{debug, trace, warn};

use clawdeck_gateway::{ConnectionEvent, ConnectionStatus};
use clawdeck_protocol::{EventFrame, GatewayEvent};
use clawdeck_protocol::constants::DEFAULT_MAIN_SESSION_KEY;
use clawdeck_protocol::messages::HelloOk;
use clawdeck_protocol::types::{
    AgentsListResult, ChannelsStatusSnapshot, ConfigSnapshot, CronJob, CronRunLogEntry,
    CronStatus, SessionsListResult, SkillStatusReport,
};

use crate::chat::ChatState;
use crate::diagnostics::{DiagnosticKind, DiagnosticLog};
use crate::settings::Settings;

#[derive(Debug, Clone)]
pub struct DashboardState {
    pub status: ConnectionStatus,
    /// Last transport or handshake error, cleared by the next hello.
    pub error: Option<String>,
    pub hello: Option<HelloOk>,
    /// Reconnect attempts since the last hello.
    pub reconnect_attempts: u32,

    pub cron_jobs: Vec<CronJob>,
    pub cron_status: Option<CronStatus>,
    pub cron_runs: Vec<CronRunLogEntry>,
    /// Job the run log belongs to.
    pub cron_runs_job_id: Option<String>,

    pub config: Option<ConfigSnapshot>,
    pub config_loading: bool,

    pub agents: Option<AgentsListResult>,
    pub channels: Option<ChannelsStatusSnapshot>,
    pub sessions: Option<SessionsListResult>,
    pub skills: Option<SkillStatusReport>,

    pub chat: ChatState,
    pub settings: Settings,

    /// Count of unhandled push events by name.
    pub other_events: HashMap<String, u64>,
    /// Most recent unhandled push event for each name.
    pub last_events: HashMap<String, EventFrame>,
    pub diagnostics: DiagnosticLog,
}

impl Default for DashboardState {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

impl DashboardState {
    pub fn new(settings: Settings) -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            error: None,
            hello: None,
            reconnect_attempts: 0,
            cron_jobs: Vec::new(),
            cron_status: None,
            cron_runs: Vec::new(),
            cron_runs_job_id: None,
            config: None,
            config_loading: false,
            agents: None,
            channels: None,
            sessions: None,
            skills: None,
            chat: ChatState::default(),
            settings,
            other_events: HashMap::new(),
            last_events: HashMap::new(),
            diagnostics: DiagnosticLog::default(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    /// Selected chat session, or the default main session.
    pub fn session_key(&self) -> &str {
        self.chat
            .session_key
            .as_deref()
            .unwrap_or(DEFAULT_MAIN_SESSION_KEY)
    }

    /// Folds one connection event into the state.
    pub fn apply(&mut self, event: &ConnectionEvent) {
        match event {
            ConnectionEvent::StateChanged(status) => self.on_status(*status),
            ConnectionEvent::Hello(hello) => self.on_hello(hello),
            ConnectionEvent::Closed { code, reason } => {
                self.status = ConnectionStatus::Disconnected;
                self.diagnostics
                    .record(DiagnosticKind::Closed, "", format!("closed ({code}): {reason}"));
            }
            ConnectionEvent::Error(message) => {
                self.status = ConnectionStatus::Error;
                self.error = Some(message.clone());
                self.diagnostics
                    .record(DiagnosticKind::Transport, "", message.clone());
            }
            ConnectionEvent::Reconnecting { attempt, .. } => {
                self.reconnect_attempts = *attempt;
            }
            ConnectionEvent::Event(event) => self.on_push(event),
        }
    }

    fn on_status(&mut self, status: ConnectionStatus) {
        match status {
            // Connected is only trusted once the hello arrives.
            ConnectionStatus::Connected => {}
            ConnectionStatus::Connecting => {
                // Keep an error visible until the next attempt actually succeeds.
                if self.status != ConnectionStatus::Error {
                    self.status = ConnectionStatus::Connecting;
                }
            }
            other => self.status = other,
        }
    }

    fn on_hello(&mut self, hello: &HelloOk) {
        self.status = ConnectionStatus::Connected;
        self.error = None;
        self.reconnect_attempts = 0;
        if self.chat.session_key.is_none() {
            self.chat.session_key = Some(hello.main_session_key().to_string());
        }
        debug!(protocol = hello.protocol, "hello applied");
        self.hello = Some(hello.clone());
    }

    fn on_push(&mut self, event: &GatewayEvent) {
        match event {
            GatewayEvent::Chat(chat) => self.chat.apply_chat(chat),
            GatewayEvent::Tool(tool) => self.chat.apply_tool(tool),
            GatewayEvent::Thinking(thinking) => self.chat.apply_thinking(thinking),
            GatewayEvent::Other(frame) => {
                *self.other_events.entry(frame.event.clone()).or_default() += 1;
                self.last_events.insert(frame.event.clone(), frame.clone());
                trace!(event = %frame.event, "unhandled push event");
            }
            GatewayEvent::Ignored { event } => {
                debug!(event = %event, "ignored malformed push event");
            }
            GatewayEvent::Challenge { .. } => {}
        }
    }

    /// Records a failed request.
    pub fn record_request_failure(&mut self, method: &str, message: &str) {
        warn!(method, "request failed: {message}");
        self.diagnostics
            .record(DiagnosticKind::Request, method, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clawdeck_protocol::{ChatEvent, ChatRole, StreamState};
    use serde_json::json;

    fn hello(main_key: Option<&str>) -> HelloOk {
        let mut value = json!({"type": "hello-ok", "protocol": 3});
        if let Some(key) = main_key {
            value["snapshot"] = json!({"sessionDefaults": {"mainSessionKey": key}});
        }
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn hello_connects_and_defaults_session() {
        let mut state = DashboardState::default();
        state.apply(&ConnectionEvent::Error("refused".into()));
        assert_eq!(state.status, ConnectionStatus::Error);

        state.apply(&ConnectionEvent::Hello(hello(Some("agent:ops:main"))));
        assert!(state.is_connected());
        assert!(state.error.is_none());
        assert_eq!(state.session_key(), "agent:ops:main");
        assert!(state.hello.is_some());
    }

    #[test]
    fn hello_keeps_selected_session() {
        let mut state = DashboardState::default();
        state.chat.session_key = Some("mine".into());
        state.apply(&ConnectionEvent::Hello(hello(Some("agent:ops:main"))));
        assert_eq!(state.session_key(), "mine");
    }

    #[test]
    fn hello_without_defaults_uses_main_key() {
        let mut state = DashboardState::default();
        state.apply(&ConnectionEvent::Hello(hello(None)));
        assert_eq!(state.session_key(), DEFAULT_MAIN_SESSION_KEY);
    }

    #[test]
    fn close_disconnects() {
        let mut state = DashboardState::default();
        state.apply(&ConnectionEvent::Hello(hello(None)));
        state.apply(&ConnectionEvent::Closed {
            code: 1006,
            reason: "abnormal".into(),
        });
        assert_eq!(state.status, ConnectionStatus::Disconnected);
        assert_eq!(state.diagnostics.last().unwrap().kind, DiagnosticKind::Closed);
    }

    #[test]
    fn error_survives_reconnect_attempt() {
        let mut state = DashboardState::default();
        state.apply(&ConnectionEvent::Error("connection refused".into()));
        state.apply(&ConnectionEvent::Reconnecting {
            attempt: 2,
            delay: std::time::Duration::from_millis(800),
        });
        state.apply(&ConnectionEvent::StateChanged(ConnectionStatus::Connecting));
        assert_eq!(state.status, ConnectionStatus::Error);
        assert_eq!(state.error.as_deref(), Some("connection refused"));
        assert_eq!(state.reconnect_attempts, 2);
    }

    #[test]
    fn connected_status_waits_for_hello() {
        let mut state = DashboardState::default();
        state.apply(&ConnectionEvent::StateChanged(ConnectionStatus::Connecting));
        state.apply(&ConnectionEvent::StateChanged(ConnectionStatus::Connected));
        assert_eq!(state.status, ConnectionStatus::Connecting);
    }

    #[test]
    fn push_events_reach_chat_and_counters() {
        let mut state = DashboardState::default();
        state.apply(&ConnectionEvent::Event(GatewayEvent::Chat(ChatEvent {
            run_id: "r1".into(),
            role: ChatRole::Assistant,
            text: "hi".into(),
            state: StreamState::Delta,
            session_key: None,
        })));
        assert_eq!(state.chat.messages.len(), 1);

        for clients in 1..=2 {
            state.apply(&ConnectionEvent::Event(GatewayEvent::Other(EventFrame::new(
                "presence",
                json!({"clients": clients}),
            ))));
        }
        state.apply(&ConnectionEvent::Event(GatewayEvent::Ignored {
            event: "chat".into(),
        }));
        assert_eq!(state.other_events.get("presence"), Some(&2));
        assert_eq!(
            state.last_events["presence"].payload,
            Some(json!({"clients": 2}))
        );
        assert!(!state.last_events.contains_key("chat"));
        assert_eq!(state.chat.messages.len(), 1);
    }

    #[test]
    fn request_failure_is_recorded() {
        let mut state = DashboardState::default();
        state.record_request_failure("cron.list", "boom");
        let last = state.diagnostics.last().unwrap();
        assert_eq!(last.context, "cron.list");
        assert_eq!(last.message, "boom");
    }
}
