//! Domain snapshots returned by the gateway's load methods.
//!
//! Every field is lenient: unknown fields are ignored and missing fields
//! take their default, so a newer gateway never breaks a load.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Cron
// ---------------------------------------------------------------------------

/// When a cron job fires.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CronSchedule {
    /// One-shot at an ISO-8601 timestamp.
    At { at: String },
    #[serde(rename_all = "camelCase")]
    Every {
        every_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        anchor_ms: Option<i64>,
    },
    Cron {
        expr: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tz: Option<String>,
    },
    #[default]
    #[serde(other)]
    Unknown,
}

/// What a cron job does when it fires.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CronPayload {
    SystemEvent { text: String },
    #[serde(rename_all = "camelCase")]
    AgentTurn {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thinking: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_seconds: Option<u64>,
    },
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CronSessionTarget {
    #[default]
    Main,
    Isolated,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CronWakeMode {
    #[default]
    NextHeartbeat,
    Now,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    #[default]
    None,
    Announce,
    Webhook,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronDelivery {
    #[serde(default)]
    pub mode: DeliveryMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_effort: Option<bool>,
}

/// Outcome of a single cron run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Ok,
    Error,
    Skipped,
    #[default]
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
            Self::Skipped => "skipped",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronJobState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run_at_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running_at_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_at_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_status: Option<RunStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consecutive_errors: Option<u32>,
}

/// A scheduled job as reported by `cron.list`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronJob {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_after_run: Option<bool>,
    #[serde(default)]
    pub created_at_ms: i64,
    #[serde(default)]
    pub updated_at_ms: i64,
    #[serde(default)]
    pub schedule: CronSchedule,
    #[serde(default)]
    pub session_target: CronSessionTarget,
    #[serde(default)]
    pub wake_mode: CronWakeMode,
    #[serde(default)]
    pub payload: CronPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery: Option<CronDelivery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<CronJobState>,
}

/// Scheduler summary from `cron.status`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronStatus {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub jobs: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_wake_at_ms: Option<i64>,
}

/// One entry of a job's run log (`cron.runs`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronRunLogEntry {
    #[serde(default)]
    pub ts: i64,
    #[serde(default)]
    pub job_id: String,
    #[serde(default)]
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigSnapshotIssue {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub message: String,
}

/// Gateway configuration file as returned by `config.get`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exists: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issues: Option<Vec<ConfigSnapshotIssue>>,
}

// ---------------------------------------------------------------------------
// Agents, channels, sessions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentIdentity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentRow {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<AgentIdentity>,
}

impl AgentRow {
    /// Best display name: identity name, then row name, then id.
    pub fn display_name(&self) -> &str {
        self.identity
            .as_ref()
            .and_then(|i| i.name.as_deref())
            .or(self.name.as_deref())
            .unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentsListResult {
    #[serde(default)]
    pub default_id: String,
    #[serde(default)]
    pub main_key: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub agents: Vec<AgentRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelAccountSnapshot {
    #[serde(default)]
    pub account_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configured: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_connected_at: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsStatusSnapshot {
    #[serde(default)]
    pub ts: i64,
    #[serde(default)]
    pub channel_order: Vec<String>,
    #[serde(default)]
    pub channel_labels: HashMap<String, String>,
    #[serde(default)]
    pub channels: HashMap<String, Value>,
    #[serde(default)]
    pub channel_accounts: HashMap<String, Vec<ChannelAccountSnapshot>>,
}

impl ChannelsStatusSnapshot {
    /// Label for a channel id, falling back to the id itself.
    pub fn label<'a>(&'a self, id: &'a str) -> &'a str {
        self.channel_labels.get(id).map(String::as_str).unwrap_or(id)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Direct,
    Group,
    Global,
    #[default]
    #[serde(other)]
    Unknown,
}

impl SessionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Group => "group",
            Self::Global => "global",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRow {
    pub key: String,
    #[serde(default)]
    pub kind: SessionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionsListResult {
    #[serde(default)]
    pub ts: i64,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub sessions: Vec<SessionRow>,
}

// ---------------------------------------------------------------------------
// Skills
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallKind {
    Brew,
    Node,
    Go,
    Uv,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkillInstallOption {
    pub id: String,
    #[serde(default)]
    pub kind: InstallKind,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub bins: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkillConfigCheck {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub satisfied: bool,
}

/// Requirement lists, used both for what a skill needs and what is missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkillRequirements {
    #[serde(default)]
    pub bins: Vec<String>,
    #[serde(default)]
    pub env: Vec<String>,
    #[serde(default)]
    pub config: Vec<String>,
    #[serde(default)]
    pub os: Vec<String>,
}

impl SkillRequirements {
    pub fn is_empty(&self) -> bool {
        self.bins.is_empty() && self.env.is_empty() && self.config.is_empty() && self.os.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillStatusEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub file_path: String,
    #[serde(default)]
    pub base_dir: String,
    #[serde(default)]
    pub skill_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(default)]
    pub always: bool,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub blocked_by_allowlist: bool,
    #[serde(default)]
    pub eligible: bool,
    #[serde(default)]
    pub requirements: SkillRequirements,
    #[serde(default)]
    pub missing: SkillRequirements,
    #[serde(default)]
    pub config_checks: Vec<SkillConfigCheck>,
    #[serde(default)]
    pub install: Vec<SkillInstallOption>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillStatusReport {
    #[serde(default)]
    pub workspace_dir: String,
    #[serde(default)]
    pub managed_skills_dir: String,
    #[serde(default)]
    pub skills: Vec<SkillStatusEntry>,
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// An attachment queued for, or shown with, a chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatAttachment {
    pub id: String,
    /// `data:<mime>;base64,<body>` URL.
    pub data_url: String,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatAttachment {
    /// Base64 body of the data URL (everything after the first comma).
    pub fn base64_body(&self) -> &str {
        self.data_url
            .split_once(',')
            .map(|(_, body)| body)
            .unwrap_or(&self.data_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cron_job_full() {
        let job: CronJob = serde_json::from_value(json!({
            "id": "j1",
            "name": "Morning brief",
            "enabled": true,
            "createdAtMs": 1700000000000i64,
            "updatedAtMs": 1700000001000i64,
            "schedule": {"kind": "cron", "expr": "0 7 * * *", "tz": "UTC"},
            "sessionTarget": "isolated",
            "wakeMode": "now",
            "payload": {"kind": "agentTurn", "message": "summarize", "timeoutSeconds": 60},
            "delivery": {"mode": "announce", "channel": "slack"},
            "state": {"lastStatus": "ok", "lastDurationMs": 1200}
        }))
        .unwrap();
        assert_eq!(
            job.schedule,
            CronSchedule::Cron {
                expr: "0 7 * * *".into(),
                tz: Some("UTC".into())
            }
        );
        assert_eq!(job.session_target, CronSessionTarget::Isolated);
        assert_eq!(job.wake_mode, CronWakeMode::Now);
        assert!(matches!(
            job.payload,
            CronPayload::AgentTurn {
                timeout_seconds: Some(60),
                ..
            }
        ));
        assert_eq!(job.delivery.unwrap().mode, DeliveryMode::Announce);
        assert_eq!(job.state.unwrap().last_status, Some(RunStatus::Ok));
    }

    #[test]
    fn cron_job_tolerates_missing_and_unknown_fields() {
        let job: CronJob = serde_json::from_value(json!({
            "id": "j2",
            "schedule": {"kind": "lunar", "phase": "full"},
            "payload": {"kind": "webhook"},
            "sessionTarget": "elsewhere",
            "extra": true
        }))
        .unwrap();
        assert_eq!(job.schedule, CronSchedule::Unknown);
        assert_eq!(job.payload, CronPayload::Unknown);
        assert_eq!(job.session_target, CronSessionTarget::Unknown);
        assert!(!job.enabled);
    }

    #[test]
    fn every_schedule_camel_case() {
        let schedule: CronSchedule =
            serde_json::from_value(json!({"kind": "every", "everyMs": 60000})).unwrap();
        assert_eq!(
            schedule,
            CronSchedule::Every {
                every_ms: 60000,
                anchor_ms: None
            }
        );
    }

    #[test]
    fn cron_status_null_next_wake() {
        let status: CronStatus =
            serde_json::from_value(json!({"enabled": true, "jobs": 3, "nextWakeAtMs": null}))
                .unwrap();
        assert_eq!(status.jobs, 3);
        assert!(status.next_wake_at_ms.is_none());
    }

    #[test]
    fn channels_snapshot() {
        let snap: ChannelsStatusSnapshot = serde_json::from_value(json!({
            "ts": 1,
            "channelOrder": ["slack", "mail"],
            "channelLabels": {"slack": "Slack"},
            "channels": {"slack": {"ok": true}},
            "channelAccounts": {"slack": [{"accountId": "a1", "connected": true}]}
        }))
        .unwrap();
        assert_eq!(snap.label("slack"), "Slack");
        assert_eq!(snap.label("mail"), "mail");
        assert_eq!(snap.channel_accounts["slack"][0].connected, Some(true));
    }

    #[test]
    fn session_kind_fallback() {
        let row: SessionRow =
            serde_json::from_value(json!({"key": "k", "kind": "thread", "updatedAt": null}))
                .unwrap();
        assert_eq!(row.kind, SessionKind::Unknown);
        assert!(row.updated_at.is_none());
    }

    #[test]
    fn skills_report() {
        let report: SkillStatusReport = serde_json::from_value(json!({
            "workspaceDir": "/w",
            "managedSkillsDir": "/m",
            "skills": [{
                "name": "weather",
                "skillKey": "weather",
                "eligible": false,
                "missing": {"bins": ["curl"]},
                "install": [{"id": "brew-curl", "kind": "brew", "label": "Install curl", "bins": ["curl"]}]
            }]
        }))
        .unwrap();
        let skill = &report.skills[0];
        assert!(!skill.missing.is_empty());
        assert!(skill.requirements.is_empty());
        assert_eq!(skill.install[0].kind, InstallKind::Brew);
    }

    #[test]
    fn agent_display_name_precedence() {
        let row: AgentRow = serde_json::from_value(json!({
            "id": "ops", "name": "Ops", "identity": {"name": "Operator", "emoji": "🛠"}
        }))
        .unwrap();
        assert_eq!(row.display_name(), "Operator");
        let row: AgentRow = serde_json::from_value(json!({"id": "bare"})).unwrap();
        assert_eq!(row.display_name(), "bare");
    }

    #[test]
    fn attachment_body() {
        let att = ChatAttachment {
            id: "a1".into(),
            data_url: "data:image/png;base64,iVBORw0".into(),
            mime_type: "image/png".into(),
            name: None,
        };
        assert_eq!(att.base64_body(), "iVBORw0");
    }
}
