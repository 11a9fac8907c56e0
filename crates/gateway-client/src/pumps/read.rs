//! WebSocket read pump: drives the handshake and dispatches inbound frames.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use clawdeck_protocol::constants::{
    CONNECT_FAILED_CLOSE_CODE, CONNECT_FAILED_REASON, WS_MAX_MESSAGE_SIZE,
};
use clawdeck_protocol::messages::HelloOk;
use clawdeck_protocol::{EventFrame, Frame, GatewayEvent, Method, RequestFrame, ResponseFrame};

use crate::handshake::Handshake;
use crate::pending::PendingRequests;
use crate::types::{Backoff, ClientOptions, ConnectionEvent, ConnectionStatus};

/// Close code reported when the socket dropped without a close frame.
pub(crate) const ABNORMAL_CLOSE_CODE: u16 = 1006;

/// Sender handed to request callers once the handshake completes.
pub(crate) type SharedWriter = Arc<Mutex<Option<mpsc::Sender<tungstenite::Message>>>>;

/// Everything the read pump needs for one socket.
pub(crate) struct SocketContext {
    pub(crate) options: Arc<ClientOptions>,
    pub(crate) pending: PendingRequests,
    pub(crate) writer: SharedWriter,
    pub(crate) events_tx: mpsc::Sender<ConnectionEvent>,
    pub(crate) write_tx: mpsc::Sender<tungstenite::Message>,
}

/// Why the read pump returned.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SocketExit {
    Closed { code: u16, reason: String },
    /// `connect` was rejected; the socket was closed with 4008.
    HandshakeFailed { message: String },
    Cancelled,
}

impl SocketExit {
    pub(crate) fn close_info(&self) -> (u16, String) {
        match self {
            Self::Closed { code, reason } => (*code, reason.clone()),
            Self::HandshakeFailed { .. } => {
                (CONNECT_FAILED_CLOSE_CODE, CONNECT_FAILED_REASON.to_string())
            }
            Self::Cancelled => (1000, "client stopped".to_string()),
        }
    }
}

/// Classified inbound text frame.
#[derive(Debug, PartialEq)]
pub(crate) enum Inbound {
    Response(ResponseFrame),
    Challenge(String),
    Event(GatewayEvent),
    Dropped,
}

/// Parses and classifies one text frame. Malformed frames are dropped.
pub(crate) fn route_text(text: &str) -> Inbound {
    if text.len() > WS_MAX_MESSAGE_SIZE {
        warn!("message too large ({} bytes), dropping", text.len());
        return Inbound::Dropped;
    }
    match Frame::parse(text) {
        Ok(Frame::Res(res)) => Inbound::Response(res),
        Ok(Frame::Event(evt)) => classify_event(evt),
        Ok(Frame::Req(req)) => {
            debug!(method = %req.method, "ignoring request frame from gateway");
            Inbound::Dropped
        }
        Err(e) => {
            debug!("dropping malformed frame: {e}");
            Inbound::Dropped
        }
    }
}

fn classify_event(frame: EventFrame) -> Inbound {
    match GatewayEvent::classify(frame) {
        GatewayEvent::Challenge { nonce } => Inbound::Challenge(nonce),
        GatewayEvent::Ignored { event } => {
            trace!(event = %event, "ignoring event with unusable payload");
            Inbound::Dropped
        }
        other => Inbound::Event(other),
    }
}

/// Delivers `event` in order, waiting for room in the channel.
///
/// A full channel holds the caller back, which stops the socket from being
/// read until the consumer catches up. Only cancellation gives up on an
/// event that cannot be queued.
pub(crate) async fn emit(
    events_tx: &mpsc::Sender<ConnectionEvent>,
    cancel: &CancellationToken,
    event: ConnectionEvent,
) {
    tokio::select! {
        biased;

        sent = events_tx.send(event) => {
            if sent.is_err() {
                trace!("event receiver gone");
            }
        }
        _ = cancel.cancelled() => debug!("client stopping, event not delivered"),
    }
}

/// Reads frames for one socket until it closes, fails its handshake, or is
/// cancelled.
///
/// On open the handshake waits for `connect.challenge` or the debounce
/// timer, sends `connect` once, and on success publishes the write channel
/// through `ctx.writer` so requests can flow.
pub(crate) async fn read_pump<S>(
    mut read: S,
    ctx: SocketContext,
    backoff: &mut Backoff,
    cancel: CancellationToken,
) -> SocketExit
where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    let mut handshake = Handshake::new();
    handshake.on_open();
    let mut connect_id: Option<String> = None;

    let debounce = tokio::time::sleep(ctx.options.connect_debounce);
    tokio::pin!(debounce);
    let mut debounce_armed = true;

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => return SocketExit::Cancelled,

            () = &mut debounce, if debounce_armed => {
                debounce_armed = false;
                if handshake.on_debounce_elapsed() {
                    debug!("no challenge within debounce, sending connect");
                    match send_connect(&ctx).await {
                        Some(id) => connect_id = Some(id),
                        None => return closed_by_writer(),
                    }
                }
            }

            msg = read.next() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        warn!("WebSocket read error: {e}");
                        return SocketExit::Closed {
                            code: ABNORMAL_CLOSE_CODE,
                            reason: e.to_string(),
                        };
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        return SocketExit::Closed {
                            code: ABNORMAL_CLOSE_CODE,
                            reason: "stream ended".into(),
                        };
                    }
                };

                match msg {
                    tungstenite::Message::Text(text) => match route_text(&text) {
                        Inbound::Challenge(nonce) => {
                            debug!(nonce = %nonce, "received connect challenge");
                            if handshake.on_challenge(nonce) {
                                debounce_armed = false;
                                match send_connect(&ctx).await {
                                    Some(id) => connect_id = Some(id),
                                    None => return closed_by_writer(),
                                }
                            }
                        }
                        Inbound::Response(res) if connect_id.as_deref() == Some(res.id.as_str()) => {
                            connect_id = None;
                            if res.ok {
                                handshake.on_connect_ok();
                                let hello = res
                                    .payload
                                    .and_then(|p| serde_json::from_value::<HelloOk>(p).ok())
                                    .unwrap_or_default();
                                backoff.reset();
                                *ctx.writer.lock().await = Some(ctx.write_tx.clone());
                                info!(
                                    protocol = hello.protocol,
                                    nonce = ?handshake.nonce(),
                                    "gateway handshake complete"
                                );
                                emit(&ctx.events_tx, &cancel, ConnectionEvent::StateChanged(ConnectionStatus::Connected)).await;
                                emit(&ctx.events_tx, &cancel, ConnectionEvent::Hello(hello)).await;
                            } else {
                                handshake.on_connect_failed();
                                let message = res.error_message();
                                warn!(code = ?res.error_code(), "connect rejected: {message}");
                                let close = CloseFrame {
                                    code: CloseCode::from(CONNECT_FAILED_CLOSE_CODE),
                                    reason: CONNECT_FAILED_REASON.into(),
                                };
                                let _ = ctx.write_tx.send(tungstenite::Message::Close(Some(close))).await;
                                return SocketExit::HandshakeFailed { message };
                            }
                        }
                        Inbound::Response(res) => {
                            let id = res.id.clone();
                            if ctx.pending.resolve(res).await {
                                trace!(%id, "response delivered");
                            } else {
                                debug!(%id, "dropping response for unknown request");
                            }
                        }
                        Inbound::Event(event) => {
                            trace!(event = %event.name(), phase = ?handshake.phase(), "push event");
                            emit(&ctx.events_tx, &cancel, ConnectionEvent::Event(event)).await;
                        }
                        Inbound::Dropped => {}
                    },
                    tungstenite::Message::Ping(data) => {
                        trace!("received ping, sending pong");
                        let _ = ctx.write_tx.send(tungstenite::Message::Pong(data)).await;
                    }
                    tungstenite::Message::Close(frame) => {
                        let (code, reason) = frame
                            .map(|f| (u16::from(f.code), f.reason.as_str().to_string()))
                            .unwrap_or((1005, String::new()));
                        debug!(code, reason = %reason, "received close frame");
                        return SocketExit::Closed { code, reason };
                    }
                    _ => {} // Binary and Pong
                }
            }
        }
    }
}

/// Queues the `connect` request. Returns its id, or `None` if the writer is gone.
async fn send_connect(ctx: &SocketContext) -> Option<String> {
    let id = uuid::Uuid::new_v4().to_string();
    let params = match serde_json::to_value(ctx.options.connect_params()) {
        Ok(params) => params,
        Err(e) => {
            warn!("failed to encode connect params: {e}");
            return None;
        }
    };
    let frame = Frame::Req(RequestFrame::new(id.clone(), Method::Connect.as_str(), params));
    let json = match frame.to_json() {
        Ok(json) => json,
        Err(e) => {
            warn!("failed to encode connect request: {e}");
            return None;
        }
    };
    ctx.write_tx
        .send(tungstenite::Message::Text(json.into()))
        .await
        .ok()?;
    debug!(%id, "connect sent");
    Some(id)
}

fn closed_by_writer() -> SocketExit {
    SocketExit::Closed {
        code: ABNORMAL_CLOSE_CODE,
        reason: "writer closed".into(),
    }
}
