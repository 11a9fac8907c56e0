use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::constants::DEFAULT_MAIN_SESSION_KEY;

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

/// Params of the `connect` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    pub min_protocol: u32,
    pub max_protocol: u32,
    pub client: ClientInfo,
    pub role: String,
    pub scopes: Vec<String>,
    #[serde(default)]
    pub caps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<ConnectAuth>,
    pub user_agent: String,
    pub locale: String,
}

/// Client identity announced during the handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub id: String,
    pub version: String,
    pub platform: String,
    pub mode: String,
}

/// Shared-secret auth sent with `connect`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectAuth {
    pub token: String,
}

/// Server hello returned as the payload of a successful `connect`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HelloOk {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub protocol: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<HelloSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<HelloAuth>,
}

impl HelloOk {
    /// Main session key advertised by the gateway, or the conventional default.
    pub fn main_session_key(&self) -> &str {
        self.snapshot
            .as_ref()
            .and_then(|s| s.session_defaults.as_ref())
            .and_then(|d| d.main_session_key.as_deref())
            .filter(|k| !k.is_empty())
            .unwrap_or(DEFAULT_MAIN_SESSION_KEY)
    }
}

/// Server state snapshot included in the hello.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<HelloPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_mode: Option<AuthMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_defaults: Option<SessionDefaults>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tick_interval_ms: Option<u64>,
}

/// How the gateway authenticates operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMode {
    None,
    Token,
    Password,
    TrustedProxy,
    #[serde(other)]
    Unknown,
}

impl AuthMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Token => "token",
            Self::Password => "password",
            Self::TrustedProxy => "trusted-proxy",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDefaults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_session_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_agent_id: Option<String>,
}

/// Auth echo in the hello (device token, granted role and scopes).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloAuth {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

// ---------------------------------------------------------------------------
// Request params
// ---------------------------------------------------------------------------

/// Params addressing a single entity by id (`cron.remove`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdParams {
    pub id: String,
}

/// Params for patch-style updates (`cron.update`, `agents.update`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchParams {
    pub id: String,
    pub patch: Value,
}

/// Params for `cron.run`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CronRunParams {
    pub id: String,
    pub mode: String,
}

/// Params for `cron.runs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CronRunsParams {
    pub id: String,
    pub limit: u32,
}

/// Params for `config.apply`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigApplyParams {
    pub config: Value,
}

/// Params for `skills.install`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillInstallParams {
    pub name: String,
    pub install_id: String,
}

/// Patch for a skill's configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<HashMap<String, String>>,
}

/// Params for `skills.update`: the skill key plus the flattened patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillUpdateParams {
    pub skill_key: String,
    #[serde(flatten)]
    pub patch: SkillPatch,
}

/// Params for `chat.history`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatHistoryParams {
    pub session_key: String,
    pub limit: u32,
}

/// Params for `chat.send`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSendParams {
    pub session_key: String,
    pub message: String,
    /// Opaque to the client; interpreted by the gateway.
    pub deliver: bool,
    pub idempotency_key: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<OutboundAttachment>,
}

/// Attachment as sent with `chat.send`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundAttachment {
    pub name: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    /// Base64 body of the attachment.
    pub buffer: String,
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// Payload of `cron.list`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CronListResponse {
    #[serde(default)]
    pub jobs: Option<Vec<crate::types::CronJob>>,
}

/// Payload of `cron.runs`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CronRunsResponse {
    #[serde(default)]
    pub entries: Option<Vec<crate::types::CronRunLogEntry>>,
}

/// Payload of `chat.history`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatHistoryResponse {
    /// Entries that fail to decode are skipped.
    #[serde(default, deserialize_with = "lenient_history")]
    pub messages: Option<Vec<HistoryMessage>>,
}

/// One stored chat message; `content` is a string or an array of parts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Value,
    /// Unix ms. Floats and numeric strings are accepted; anything else is `None`.
    #[serde(
        default,
        deserialize_with = "lenient_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<i64>,
}

fn lenient_history<'de, D>(deserializer: D) -> Result<Option<Vec<HistoryMessage>>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = Option::<Vec<Value>>::deserialize(deserializer)?;
    Ok(entries.map(|entries| {
        entries
            .into_iter()
            .filter_map(|entry| serde_json::from_value(entry).ok())
            .collect()
    }))
}

fn lenient_millis<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(millis_from_value))
}

fn millis_from_value(value: &Value) -> Option<i64> {
    let float = match value {
        Value::Number(n) => {
            if let Some(ms) = n.as_i64() {
                return Some(ms);
            }
            n.as_f64()?
        }
        Value::String(s) => {
            let s = s.trim();
            if let Ok(ms) = s.parse::<i64>() {
                return Some(ms);
            }
            s.parse::<f64>().ok()?
        }
        _ => return None,
    };
    float.is_finite().then_some(float as i64)
}

impl HistoryMessage {
    /// Flattens `content` into plain text.
    ///
    /// Strings are taken verbatim; arrays are joined from their string
    /// elements and the `text` field of object elements.
    pub fn text(&self) -> String {
        content_text(&self.content)
    }
}

/// Extracts plain text from a message `content` value.
pub fn content_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .map(|part| match part {
                Value::String(s) => s.as_str(),
                Value::Object(obj) => obj.get("text").and_then(Value::as_str).unwrap_or(""),
                _ => "",
            })
            .collect(),
        _ => String::new(),
    }
}
