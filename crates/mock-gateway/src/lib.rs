//! In-process gateway for integration tests.
//!
//! Speaks the gateway wire protocol over a real loopback WebSocket so the
//! client's handshake, multiplexing, and reconnect paths run end to end.

mod handler;
mod server;

pub use handler::{EmptyResponder, Reply, Responder};
pub use server::{MockConfig, MockGateway, RecordedRequest};

/// Errors produced by the mock gateway.
#[derive(Debug, thiserror::Error)]
pub enum MockError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
