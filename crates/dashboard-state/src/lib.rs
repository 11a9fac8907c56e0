//! Application state for the clawdeck gateway client.
//!
//! [`GatewayStore`] drives a [`clawdeck_gateway::GatewayClient`], folds its
//! push events into a [`DashboardState`], and runs the gateway operations
//! (cron, config, agents, channels, sessions, skills, chat).

pub mod chat;
pub mod diagnostics;
pub mod settings;
pub mod state;
pub mod store;

pub use chat::{ChatMessage, ChatState, ToolCall, ToolStatus};
pub use diagnostics::{Diagnostic, DiagnosticKind, DiagnosticLog};
pub use settings::{ConfigError, Settings, SettingsPatch, Theme};
pub use state::DashboardState;
pub use store::GatewayStore;

pub use clawdeck_gateway::{ConnectionStatus, GatewayError};
