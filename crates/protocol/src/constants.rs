use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Gateway protocol version spoken by this client (sent as both bounds).
pub const PROTOCOL_VERSION: u32 = 3;

/// Close code the client uses when the `connect` request fails.
///
/// Signals "handshake failed, retry with a fresh connection".
pub const CONNECT_FAILED_CLOSE_CODE: u16 = 4008;

/// Close reason sent alongside [`CONNECT_FAILED_CLOSE_CODE`].
pub const CONNECT_FAILED_REASON: &str = "connect failed";

/// How long to wait for a `connect.challenge` before sending `connect` anyway.
pub const CONNECT_DEBOUNCE: Duration = Duration::from_millis(750);

/// Maximum inbound message size in bytes (16 MB).
///
/// Chat history with inline attachments is the largest payload in practice.
pub const WS_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Session key used when the gateway does not advertise a main session.
pub const DEFAULT_MAIN_SESSION_KEY: &str = "agent:main:main";

/// Number of messages requested by `chat.history`.
pub const CHAT_HISTORY_LIMIT: u32 = 50;

/// Number of run log entries requested by `cron.runs`.
pub const CRON_RUNS_LIMIT: u32 = 50;

/// Role requested in the connect handshake.
pub const OPERATOR_ROLE: &str = "operator";

/// Capability scopes requested in the connect handshake.
pub const OPERATOR_SCOPES: [&str; 3] = ["operator.admin", "operator.approvals", "operator.pairing"];

/// Push event names with dedicated handling.
pub mod event_names {
    pub const CONNECT_CHALLENGE: &str = "connect.challenge";
    pub const CHAT: &str = "chat";
    pub const TOOL: &str = "tool";
    pub const THINKING: &str = "thinking";
}

/// Gateway request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    // Handshake
    #[serde(rename = "connect")]
    Connect,

    // Cron
    #[serde(rename = "cron.status")]
    CronStatus,
    #[serde(rename = "cron.list")]
    CronList,
    #[serde(rename = "cron.add")]
    CronAdd,
    #[serde(rename = "cron.update")]
    CronUpdate,
    #[serde(rename = "cron.remove")]
    CronRemove,
    #[serde(rename = "cron.run")]
    CronRun,
    #[serde(rename = "cron.runs")]
    CronRuns,

    // Config
    #[serde(rename = "config.get")]
    ConfigGet,
    #[serde(rename = "config.apply")]
    ConfigApply,

    // Agents, channels, sessions
    #[serde(rename = "agents.list")]
    AgentsList,
    #[serde(rename = "agents.create")]
    AgentsCreate,
    #[serde(rename = "agents.update")]
    AgentsUpdate,
    #[serde(rename = "channels.status")]
    ChannelsStatus,
    #[serde(rename = "sessions.list")]
    SessionsList,

    // Skills
    #[serde(rename = "skills.status")]
    SkillsStatus,
    #[serde(rename = "skills.install")]
    SkillsInstall,
    #[serde(rename = "skills.update")]
    SkillsUpdate,

    // Chat
    #[serde(rename = "chat.history")]
    ChatHistory,
    #[serde(rename = "chat.send")]
    ChatSend,
}

impl Method {
    /// Wire name of the method.
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Connect => "connect",
            Method::CronStatus => "cron.status",
            Method::CronList => "cron.list",
            Method::CronAdd => "cron.add",
            Method::CronUpdate => "cron.update",
            Method::CronRemove => "cron.remove",
            Method::CronRun => "cron.run",
            Method::CronRuns => "cron.runs",
            Method::ConfigGet => "config.get",
            Method::ConfigApply => "config.apply",
            Method::AgentsList => "agents.list",
            Method::AgentsCreate => "agents.create",
            Method::AgentsUpdate => "agents.update",
            Method::ChannelsStatus => "channels.status",
            Method::SessionsList => "sessions.list",
            Method::SkillsStatus => "skills.status",
            Method::SkillsInstall => "skills.install",
            Method::SkillsUpdate => "skills.update",
            Method::ChatHistory => "chat.history",
            Method::ChatSend => "chat.send",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_serialization_matches_as_str() {
        for method in [
            Method::Connect,
            Method::CronRuns,
            Method::ConfigApply,
            Method::AgentsUpdate,
            Method::SkillsInstall,
            Method::ChatSend,
        ] {
            let json = serde_json::to_string(&method).unwrap();
            assert_eq!(json, format!("\"{}\"", method.as_str()));
        }
    }

    #[test]
    fn method_deserialization() {
        let m: Method = serde_json::from_str("\"channels.status\"").unwrap();
        assert_eq!(m, Method::ChannelsStatus);
    }

    #[test]
    fn operator_scopes() {
        assert_eq!(OPERATOR_SCOPES.len(), 3);
        assert!(OPERATOR_SCOPES.contains(&"operator.admin"));
    }
}
