//! Connection supervisor: one socket at a time, reconnect with backoff.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use clawdeck_protocol::constants::WS_MAX_MESSAGE_SIZE;

use crate::error::GatewayError;
use crate::pending::PendingRequests;
use crate::pumps::read::{SharedWriter, SocketContext, SocketExit, emit, read_pump};
use crate::pumps::write::write_pump;
use crate::types::{Backoff, ClientOptions, ConnectionEvent, ConnectionStatus};

/// Outbound queue depth per socket.
const WRITE_BUFFER: usize = 256;

/// How long a closing socket may take to flush its close frame.
const WRITE_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Shared state handed from the client to its supervisor task.
#[derive(Clone)]
pub(crate) struct WsContext {
    pub(crate) options: Arc<ClientOptions>,
    pub(crate) pending: PendingRequests,
    pub(crate) writer: SharedWriter,
    pub(crate) events_tx: mpsc::Sender<ConnectionEvent>,
}

/// Runs the connect / read / reconnect cycle until `cancel` fires.
///
/// Socket construction errors and closes of any kind schedule a reconnect
/// after the current backoff delay. The backoff is reset by the read pump
/// once a handshake succeeds.
pub(crate) async fn supervise(ctx: WsContext, cancel: CancellationToken) {
    let mut backoff = Backoff::new(ctx.options.reconnect.clone());

    loop {
        emit(
            &ctx.events_tx,
            &cancel,
            ConnectionEvent::StateChanged(ConnectionStatus::Connecting),
        )
        .await;
        info!(url = %ctx.options.url, "connecting to gateway");

        let connect = tokio_tungstenite::connect_async_with_config(
            ctx.options.url.as_str(),
            Some(ws_config()),
            false,
        );
        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = connect => result,
        };

        match result {
            Ok((ws, _)) => {
                if run_socket(ws, &ctx, &mut backoff, &cancel).await == SocketExit::Cancelled {
                    break;
                }
            }
            Err(e) => {
                warn!(url = %ctx.options.url, error = %e, "gateway connection failed");
                emit(&ctx.events_tx, &cancel, ConnectionEvent::Error(e.to_string())).await;
            }
        }

        if cancel.is_cancelled() {
            break;
        }

        let delay = backoff.next_delay();
        let attempt = backoff.failures();
        info!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            "reconnecting"
        );
        emit(
            &ctx.events_tx,
            &cancel,
            ConnectionEvent::Reconnecting { attempt, delay },
        )
        .await;

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    debug!("gateway supervisor exited");
}

fn ws_config() -> WebSocketConfig {
    let mut config = WebSocketConfig::default();
    config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
    config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);
    config
}

/// Drives one open socket to completion and tears it down.
///
/// Nothing from this socket survives the return: the writer is cleared and
/// every in-flight request is failed.
async fn run_socket(
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    ctx: &WsContext,
    backoff: &mut Backoff,
    cancel: &CancellationToken,
) -> SocketExit {
    let (write, read) = ws.split();
    let (write_tx, write_rx) = mpsc::channel(WRITE_BUFFER);
    let mut write_handle = tokio::spawn(write_pump(write, write_rx));

    let socket = SocketContext {
        options: ctx.options.clone(),
        pending: ctx.pending.clone(),
        writer: ctx.writer.clone(),
        events_tx: ctx.events_tx.clone(),
        write_tx,
    };
    let exit = read_pump(read, socket, backoff, cancel.clone()).await;

    ctx.writer.lock().await.take();
    let (code, reason) = exit.close_info();
    let failed = if exit == SocketExit::Cancelled {
        ctx.pending.fail_all(|| GatewayError::Stopped).await
    } else {
        ctx.pending
            .fail_all(|| GatewayError::connection_lost(code, reason.clone()))
            .await
    };
    if failed > 0 {
        debug!(failed, "failed in-flight requests on socket close");
    }

    // All senders are gone now, so the write pump drains and closes.
    if tokio::time::timeout(WRITE_DRAIN_TIMEOUT, &mut write_handle)
        .await
        .is_err()
    {
        write_handle.abort();
    }

    match &exit {
        SocketExit::Cancelled => {}
        SocketExit::HandshakeFailed { message } => {
            emit(
                &ctx.events_tx,
                cancel,
                ConnectionEvent::Error(format!("connect failed: {message}")),
            )
            .await;
            emit(&ctx.events_tx, cancel, ConnectionEvent::Closed { code, reason }).await;
        }
        SocketExit::Closed { .. } => {
            info!(code, reason = %reason, "gateway socket closed");
            emit(&ctx.events_tx, cancel, ConnectionEvent::Closed { code, reason }).await;
        }
    }

    exit
}
