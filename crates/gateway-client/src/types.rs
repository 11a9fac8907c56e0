//! Public types for the gateway client.

use std::time::Duration;

use clawdeck_protocol::constants::{CONNECT_DEBOUNCE, OPERATOR_ROLE, OPERATOR_SCOPES, PROTOCOL_VERSION};
use clawdeck_protocol::messages::{ClientInfo, ConnectAuth, ConnectParams, HelloOk};
use clawdeck_protocol::GatewayEvent;

/// Lifecycle status of the gateway connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    /// Socket opening or handshake in progress.
    Connecting,
    /// Handshake completed.
    Connected,
    Error,
}

impl ConnectionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events emitted by the client, delivered in arrival order.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    StateChanged(ConnectionStatus),
    /// Handshake succeeded.
    Hello(HelloOk),
    /// The socket closed (graceful or not). A reconnect follows unless stopped.
    Closed { code: u16, reason: String },
    /// Transport or handshake failure.
    Error(String),
    /// A reconnect is scheduled after `delay`.
    Reconnecting { attempt: u32, delay: Duration },
    /// A push event other than the handshake challenge.
    Event(GatewayEvent),
}

/// Exponential backoff parameters for reconnects.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect.
    pub initial_delay: Duration,
    /// Backoff cap.
    pub max_delay: Duration,
    pub backoff_factor: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(800),
            max_delay: Duration::from_secs(15),
            backoff_factor: 1.7,
        }
    }
}

impl ReconnectConfig {
    /// Delay after `failures` consecutive failures:
    /// `min(initial * factor^failures, max)`.
    pub fn delay_after(&self, failures: u32) -> Duration {
        let exp = failures.min(63) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exp);
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }
}

/// Backoff state owned by the reconnect loop.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: ReconnectConfig,
    failures: u32,
}

impl Backoff {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            failures: 0,
        }
    }

    /// The delay the next reconnect would use.
    pub fn current(&self) -> Duration {
        self.config.delay_after(self.failures)
    }

    /// Returns the current delay and grows it for the following attempt.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current();
        self.failures = self.failures.saturating_add(1);
        delay
    }

    /// Back to the initial delay. Called after a successful handshake.
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}

/// Client identity announced in the `connect` request.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientIdentity {
    pub id: String,
    pub version: String,
    pub platform: String,
    pub mode: String,
}

impl Default for ClientIdentity {
    fn default() -> Self {
        Self {
            id: "openclaw-control-ui".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            platform: std::env::consts::OS.into(),
            mode: "ui".into(),
        }
    }
}

/// Everything a [`GatewayClient`](crate::GatewayClient) needs to connect.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// WebSocket URL, e.g. `ws://127.0.0.1:18789/ws`.
    pub url: String,
    /// Shared-secret token. Empty means no auth.
    pub token: Option<String>,
    pub identity: ClientIdentity,
    pub user_agent: String,
    pub locale: String,
    pub reconnect: ReconnectConfig,
    /// How long to wait for `connect.challenge` before sending `connect` anyway.
    pub connect_debounce: Duration,
}

impl ClientOptions {
    pub fn new(url: impl Into<String>) -> Self {
        let identity = ClientIdentity::default();
        Self {
            url: url.into(),
            token: None,
            user_agent: format!("clawdeck/{} ({})", identity.version, identity.platform),
            identity,
            locale: detect_locale(std::env::var("LANG").ok().as_deref()),
            reconnect: ReconnectConfig::default(),
            connect_debounce: CONNECT_DEBOUNCE,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.token = (!token.is_empty()).then_some(token);
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn with_connect_debounce(mut self, debounce: Duration) -> Self {
        self.connect_debounce = debounce;
        self
    }

    /// Params of the `connect` request built from these options.
    pub fn connect_params(&self) -> ConnectParams {
        ConnectParams {
            min_protocol: PROTOCOL_VERSION,
            max_protocol: PROTOCOL_VERSION,
            client: ClientInfo {
                id: self.identity.id.clone(),
                version: self.identity.version.clone(),
                platform: self.identity.platform.clone(),
                mode: self.identity.mode.clone(),
            },
            role: OPERATOR_ROLE.into(),
            scopes: OPERATOR_SCOPES.iter().map(|s| s.to_string()).collect(),
            caps: Vec::new(),
            auth: self
                .token
                .as_ref()
                .filter(|t| !t.is_empty())
                .map(|token| ConnectAuth {
                    token: token.clone(),
                }),
            user_agent: self.user_agent.clone(),
            locale: self.locale.clone(),
        }
    }
}

/// Maps a POSIX locale (`de_DE.UTF-8`) to a BCP 47 tag (`de-DE`).
fn detect_locale(lang: Option<&str>) -> String {
    let tag = lang
        .and_then(|l| l.split(['.', '@']).next())
        .filter(|l| !l.is_empty() && *l != "C" && *l != "POSIX")
        .map(|l| l.replace('_', "-"));
    tag.unwrap_or_else(|| "en-US".to_string())
}
