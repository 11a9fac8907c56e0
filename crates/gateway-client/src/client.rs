//! Gateway client handle.
//!
//! Owns the supervisor task, the pending request table, and the event
//! channel. Requests go out over whichever socket is currently handshaken.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use clawdeck_protocol::{Frame, Method, RequestFrame};

use crate::error::GatewayError;
use crate::pending::PendingRequests;
use crate::pumps::read::{ABNORMAL_CLOSE_CODE, SharedWriter};
use crate::reconnection::{WsContext, supervise};
use crate::types::{ClientOptions, ConnectionEvent, ConnectionStatus};

/// Capacity of the connection event channel. When it is full the socket
/// stops being read until the consumer catches up.
pub const EVENT_BUFFER: usize = 256;

/// How long `stop` waits for the supervisor before aborting it.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// WebSocket client for one gateway.
///
/// Call [`start`](Self::start) to connect, [`take_events`](Self::take_events)
/// to consume connection events, and [`request`](Self::request) once a
/// [`ConnectionEvent::Hello`] has arrived.
pub struct GatewayClient {
    options: Arc<ClientOptions>,
    pending: PendingRequests,
    writer: SharedWriter,
    events_tx: mpsc::Sender<ConnectionEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<ConnectionEvent>>>,
    supervisor: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
    stopped: AtomicBool,
}

impl GatewayClient {
    pub fn new(options: ClientOptions) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        Self {
            options: Arc::new(options),
            pending: PendingRequests::new(),
            writer: Arc::new(Mutex::new(None)),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            supervisor: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Takes the event receiver. Can only be called once.
    pub async fn take_events(&self) -> Option<mpsc::Receiver<ConnectionEvent>> {
        self.events_rx.lock().await.take()
    }

    /// Starts the connection loop. No-op while a loop is already running.
    pub async fn start(&self) {
        let mut supervisor = self.supervisor.lock().await;
        if let Some((_, handle)) = supervisor.as_ref()
            && !handle.is_finished()
        {
            debug!("gateway client already running");
            return;
        }

        self.stopped.store(false, Ordering::SeqCst);
        let cancel = CancellationToken::new();
        let ctx = WsContext {
            options: self.options.clone(),
            pending: self.pending.clone(),
            writer: self.writer.clone(),
            events_tx: self.events_tx.clone(),
        };
        let handle = tokio::spawn(supervise(ctx, cancel.clone()));
        *supervisor = Some((cancel, handle));
    }

    /// Stops the connection loop, closes the socket, and fails every
    /// in-flight request with [`GatewayError::Stopped`].
    pub async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);

        let supervisor = self.supervisor.lock().await.take();
        if let Some((cancel, mut handle)) = supervisor {
            cancel.cancel();
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut handle)
                .await
                .is_err()
            {
                handle.abort();
            }
        }

        self.writer.lock().await.take();
        let failed = self.pending.fail_all(|| GatewayError::Stopped).await;
        if failed > 0 {
            debug!(failed, "failed in-flight requests on stop");
        }

        let disconnected = ConnectionEvent::StateChanged(ConnectionStatus::Disconnected);
        if tokio::time::timeout(SHUTDOWN_GRACE, self.events_tx.send(disconnected))
            .await
            .is_err()
        {
            debug!("event channel full on stop, disconnected event not delivered");
        }
        info!("gateway client stopped");
    }

    /// `true` once [`stop`](Self::stop) has been called and not followed by a new start.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// `true` while a handshaken socket is available for requests.
    pub async fn is_connected(&self) -> bool {
        self.writer.lock().await.is_some()
    }

    /// Number of requests awaiting a response.
    pub async fn pending_requests(&self) -> usize {
        self.pending.len().await
    }

    /// Sends `method` with raw JSON params and waits for the response payload.
    ///
    /// Fails immediately with [`GatewayError::NotConnected`] when no
    /// handshaken socket is open. There is no timeout: the request completes
    /// when its response arrives or the socket goes away.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, GatewayError> {
        let rx = {
            let writer = self.writer.lock().await;
            let Some(tx) = writer.as_ref() else {
                return Err(GatewayError::NotConnected);
            };

            let id = uuid::Uuid::new_v4().to_string();
            let json = Frame::Req(RequestFrame::new(id.clone(), method, params)).to_json()?;
            let rx = self.pending.register(id.clone()).await;

            if tx
                .send(tungstenite::Message::Text(json.into()))
                .await
                .is_err()
            {
                self.pending.remove(&id).await;
                return Err(GatewayError::connection_lost(
                    ABNORMAL_CLOSE_CODE,
                    "socket closed",
                ));
            }
            debug!(%id, method, "request sent");
            rx
        };

        rx.await.unwrap_or_else(|_| {
            Err(GatewayError::connection_lost(
                ABNORMAL_CLOSE_CODE,
                "socket closed",
            ))
        })
    }

    /// Sends a typed request and returns the raw payload.
    pub async fn request<P: Serialize + ?Sized>(
        &self,
        method: Method,
        params: &P,
    ) -> Result<Value, GatewayError> {
        let params = serde_json::to_value(params)?;
        self.call(method.as_str(), params).await
    }

    /// Sends a typed request and deserializes the payload into `T`.
    ///
    /// A missing payload deserializes from JSON `null`.
    pub async fn request_as<T, P>(&self, method: Method, params: &P) -> Result<T, GatewayError>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        let payload = self.request(method, params).await?;
        Ok(serde_json::from_value(payload)?)
    }
}

impl Drop for GatewayClient {
    fn drop(&mut self) {
        if let Ok(mut supervisor) = self.supervisor.try_lock()
            && let Some((cancel, _)) = supervisor.take()
        {
            cancel.cancel();
        }
    }
}
