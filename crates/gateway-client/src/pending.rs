//! In-flight request table keyed by correlation id.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{Mutex, oneshot};

use clawdeck_protocol::ResponseFrame;

use crate::error::GatewayError;

type Completion = oneshot::Sender<Result<Value, GatewayError>>;

/// Shared map of parked request completions.
#[derive(Clone, Default)]
pub(crate) struct PendingRequests {
    inner: Arc<Mutex<HashMap<String, Completion>>>,
}

impl PendingRequests {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Parks a completion handle under `id`.
    pub(crate) async fn register(&self, id: String) -> oneshot::Receiver<Result<Value, GatewayError>> {
        let (tx, rx) = oneshot::channel();
        self.inner.lock().await.insert(id, tx);
        rx
    }

    /// Completes the request matching `res.id`.
    ///
    /// Returns `false` when no request with that id is pending.
    pub(crate) async fn resolve(&self, res: ResponseFrame) -> bool {
        let Some(tx) = self.inner.lock().await.remove(&res.id) else {
            return false;
        };
        let result = if res.ok {
            Ok(res.payload.unwrap_or(Value::Null))
        } else {
            Err(GatewayError::Rejected {
                code: res.error_code(),
                message: res.error_message(),
            })
        };
        // The caller may have given up on the request.
        let _ = tx.send(result);
        true
    }

    pub(crate) async fn remove(&self, id: &str) -> bool {
        self.inner.lock().await.remove(id).is_some()
    }

    /// Rejects every parked request and clears the table.
    pub(crate) async fn fail_all(&self, make_error: impl Fn() -> GatewayError) -> usize {
        let drained: Vec<_> = self.inner.lock().await.drain().collect();
        let count = drained.len();
        for (_, tx) in drained {
            let _ = tx.send(Err(make_error()));
        }
        count
    }

    pub(crate) async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}
