use tokio_tungstenite::tungstenite;

/// Errors returned by [`GatewayClient`](crate::GatewayClient) requests.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// No handshaken socket is available. Requests are never queued.
    #[error("gateway not connected")]
    NotConnected,

    #[error("gateway client stopped")]
    Stopped,

    /// The socket closed while the request was in flight.
    #[error("connection lost ({code}): {reason}")]
    ConnectionLost { code: u16, reason: String },

    /// The gateway answered with `ok: false`.
    #[error("{message}")]
    Rejected {
        code: Option<String>,
        message: String,
    },

    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GatewayError {
    pub(crate) fn connection_lost(code: u16, reason: impl Into<String>) -> Self {
        Self::ConnectionLost {
            code,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_displays_server_message() {
        let err = GatewayError::Rejected {
            code: Some("INVALID_REQUEST".into()),
            message: "bad params".into(),
        };
        assert_eq!(err.to_string(), "bad params");
    }

    #[test]
    fn connection_lost_display() {
        let err = GatewayError::connection_lost(1006, "stream ended");
        assert_eq!(err.to_string(), "connection lost (1006): stream ended");
    }
}
