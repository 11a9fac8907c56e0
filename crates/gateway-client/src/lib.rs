//! WebSocket client for the clawdeck gateway.
//!
//! Connects over a single persistent socket, performs the challenge/connect
//! handshake, multiplexes concurrent requests by correlation id, forwards
//! push events, and reconnects with exponential backoff.

pub mod client;
mod error;
mod handshake;
mod pending;
pub(crate) mod reconnection;
pub mod types;

mod pumps {
    pub(crate) mod read;
    pub(crate) mod write;
}

pub use client::{EVENT_BUFFER, GatewayClient};
pub use error::GatewayError;
pub use types::{
    Backoff, ClientIdentity, ClientOptions, ConnectionEvent, ConnectionStatus, ReconnectConfig,
};
