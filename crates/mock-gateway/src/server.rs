//! Loopback gateway server.
//!
//! Listens on an OS-assigned port, upgrades every TCP connection to a
//! WebSocket, optionally sends `connect.challenge`, answers `connect` with a
//! hello (or a rejection), and routes other requests to a [`Responder`].
//! Connections, requests, and close codes are recorded for assertions.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use clawdeck_protocol::constants::event_names;
use clawdeck_protocol::{EventFrame, Frame, Method, RequestFrame, ResponseFrame};

use crate::MockError;
use crate::handler::{EmptyResponder, Reply, Responder};

/// Handshake behaviour of the mock gateway.
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Send `connect.challenge` right after the upgrade.
    pub send_challenge: bool,
    /// Answer `connect` with `ok: false`.
    pub reject_connect: bool,
    /// Payload of a successful `connect`.
    pub hello: Value,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            send_challenge: true,
            reject_connect: false,
            hello: json!({
                "type": "hello-ok",
                "protocol": 3,
                "snapshot": {
                    "uptimeMs": 1000,
                    "policy": {"tickIntervalMs": 30000},
                    "authMode": "token",
                    "sessionDefaults": {"mainSessionKey": "agent:main:main", "defaultAgentId": "main"}
                }
            }),
        }
    }
}

/// A request received by the mock, tagged with the connection it came on.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// 1-based connection number.
    pub connection: usize,
    pub frame: RequestFrame,
}

enum Command {
    Send(Message),
    Drop,
}

struct Shared {
    config: Mutex<MockConfig>,
    responder: Mutex<Arc<dyn Responder>>,
    requests: Mutex<Vec<RecordedRequest>>,
    close_codes: Mutex<Vec<u16>>,
    connections: AtomicUsize,
    active: Mutex<Option<mpsc::UnboundedSender<Command>>>,
}

/// Handle to a running mock gateway. Dropping it shuts the server down.
pub struct MockGateway {
    addr: SocketAddr,
    shared: Arc<Shared>,
    cancel: CancellationToken,
}

impl MockGateway {
    /// Binds `127.0.0.1:0` and starts accepting connections.
    pub async fn start(config: MockConfig) -> Result<Self, MockError> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let addr = listener.local_addr()?;
        let shared = Arc::new(Shared {
            config: Mutex::new(config),
            responder: Mutex::new(Arc::new(EmptyResponder)),
            requests: Mutex::new(Vec::new()),
            close_codes: Mutex::new(Vec::new()),
            connections: AtomicUsize::new(0),
            active: Mutex::new(None),
        });
        let cancel = CancellationToken::new();
        tokio::spawn(accept_loop(listener, shared.clone(), cancel.clone()));
        tracing::debug!(%addr, "mock gateway listening");
        Ok(Self {
            addr,
            shared,
            cancel,
        })
    }

    pub fn url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub async fn set_responder(&self, responder: impl Responder) {
        *self.shared.responder.lock().await = Arc::new(responder);
    }

    /// Changes handshake behaviour for subsequent connections.
    pub async fn set_config(&self, config: MockConfig) {
        *self.shared.config.lock().await = config;
    }

    /// Number of WebSocket connections accepted so far.
    pub fn connection_count(&self) -> usize {
        self.shared.connections.load(Ordering::SeqCst)
    }

    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.shared.requests.lock().await.clone()
    }

    pub async fn requests_for(&self, method: &str) -> Vec<RecordedRequest> {
        self.shared
            .requests
            .lock()
            .await
            .iter()
            .filter(|r| r.frame.method == method)
            .cloned()
            .collect()
    }

    /// Close codes sent by the client, in order.
    pub async fn close_codes(&self) -> Vec<u16> {
        self.shared.close_codes.lock().await.clone()
    }

    /// Pushes an event to the current connection. Returns `false` if none.
    pub async fn push_event(&self, event: &str, payload: Value) -> bool {
        let frame = Frame::Event(EventFrame::new(event, payload));
        match frame.to_json() {
            Ok(json) => self.send(Message::Text(json.into())).await,
            Err(_) => false,
        }
    }

    /// Sends a raw text frame to the current connection.
    pub async fn push_raw(&self, text: &str) -> bool {
        self.send(Message::Text(text.to_string().into())).await
    }

    /// Drops the current connection without a close handshake.
    pub async fn drop_connection(&self) -> bool {
        match self.shared.active.lock().await.take() {
            Some(tx) => tx.send(Command::Drop).is_ok(),
            None => false,
        }
    }

    /// Polls until `method` has been received `count` times or `timeout` elapses.
    pub async fn wait_for_requests(&self, method: &str, count: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, || async move { self.requests_for(method).await.len() >= count })
            .await
    }

    /// Polls until `count` connections were accepted or `timeout` elapses.
    pub async fn wait_for_connections(&self, count: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, || async move { self.connection_count() >= count })
            .await
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    async fn send(&self, msg: Message) -> bool {
        match self.shared.active.lock().await.as_ref() {
            Some(tx) => tx.send(Command::Send(msg)).is_ok(),
            None => false,
        }
    }

    async fn wait_until<F, Fut>(&self, timeout: Duration, mut check: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if check().await {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Drop for MockGateway {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            result = listener.accept() => match result {
                Ok((stream, peer)) => {
                    let shared = shared.clone();
                    let cancel = cancel.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, shared, cancel).await {
                            tracing::debug!(%peer, "mock connection error: {e}");
                        }
                    });
                }
                Err(e) => tracing::warn!("mock accept error: {e}"),
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    shared: Arc<Shared>,
    cancel: CancellationToken,
) -> Result<(), MockError> {
    let ws = accept_async(stream).await?;
    let (mut write, mut read) = ws.split();

    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel();
    *shared.active.lock().await = Some(cmd_tx);
    let connection = shared.connections.fetch_add(1, Ordering::SeqCst) + 1;

    let config = shared.config.lock().await.clone();
    if config.send_challenge {
        let challenge = EventFrame::new(
            event_names::CONNECT_CHALLENGE,
            json!({"nonce": format!("nonce-{connection}"), "ts": 0}),
        );
        write
            .send(Message::Text(Frame::Event(challenge).to_json()?.into()))
            .await?;
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            cmd = cmd_rx.recv() => match cmd {
                Some(Command::Send(msg)) => write.send(msg).await?,
                Some(Command::Drop) | None => break,
            },
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let Ok(Frame::Req(req)) = Frame::parse(text.as_str()) else {
                        continue;
                    };
                    shared.requests.lock().await.push(RecordedRequest {
                        connection,
                        frame: req.clone(),
                    });
                    if let Some(res) = answer(&shared, &config, &req).await {
                        write.send(Message::Text(Frame::Res(res).to_json()?.into())).await?;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    if let Some(frame) = frame {
                        shared.close_codes.lock().await.push(u16::from(frame.code));
                    }
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(_)) | None => break,
            },
        }
    }

    Ok(())
}

async fn answer(shared: &Shared, config: &MockConfig, req: &RequestFrame) -> Option<ResponseFrame> {
    if req.method == Method::Connect.as_str() {
        return Some(if config.reject_connect {
            ResponseFrame::err(&req.id, "UNAUTHORIZED", "invalid token")
        } else {
            ResponseFrame::ok(&req.id, config.hello.clone())
        });
    }
    let responder = shared.responder.lock().await.clone();
    match responder.respond(&req.method, &req.params) {
        Reply::Ok(payload) => Some(ResponseFrame::ok(&req.id, payload)),
        Reply::Err { code, message } => Some(ResponseFrame::err(&req.id, code, message)),
        Reply::Silent => None,
    }
}
