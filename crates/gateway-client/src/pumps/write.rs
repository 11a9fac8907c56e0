//! WebSocket write pump: serialises outbound frames for one socket.

use futures_util::SinkExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tracing::{debug, warn};

/// Writes queued messages until every sender is dropped, then closes the socket.
pub(crate) async fn write_pump<S>(mut write: S, mut write_rx: mpsc::Receiver<tungstenite::Message>)
where
    S: SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    while let Some(msg) = write_rx.recv().await {
        let closing = matches!(msg, tungstenite::Message::Close(_));
        if let Err(e) = write.send(msg).await {
            warn!("WebSocket write error: {e}");
            return;
        }
        if closing {
            debug!("close frame sent");
            return;
        }
    }

    let _ = write.send(tungstenite::Message::Close(None)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::sink;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

    fn channel_sink(
        tx: mpsc::Sender<tungstenite::Message>,
    ) -> impl SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin {
        Box::pin(sink::unfold(tx, |tx, msg: tungstenite::Message| async move {
            let _ = tx.send(msg).await;
            Ok::<_, tungstenite::Error>(tx)
        }))
    }

    #[tokio::test]
    async fn write_pump_forwards_then_closes_when_senders_drop() {
        let (sink_tx, mut sink_rx) = mpsc::channel(16);
        let (write_tx, write_rx) = mpsc::channel(16);

        let handle = tokio::spawn(write_pump(channel_sink(sink_tx), write_rx));
        write_tx
            .send(tungstenite::Message::Text("hello".into()))
            .await
            .unwrap();
        drop(write_tx);

        tokio::time::timeout(std::time::Duration::from_secs(2), handle)
            .await
            .expect("should stop")
            .expect("no panic");

        assert!(matches!(
            sink_rx.recv().await,
            Some(tungstenite::Message::Text(t)) if t.as_str() == "hello"
        ));
        assert!(matches!(
            sink_rx.recv().await,
            Some(tungstenite::Message::Close(None))
        ));
    }

    #[tokio::test]
    async fn write_pump_stops_after_explicit_close() {
        let (sink_tx, mut sink_rx) = mpsc::channel(16);
        let (write_tx, write_rx) = mpsc::channel(16);

        let handle = tokio::spawn(write_pump(channel_sink(sink_tx), write_rx));
        write_tx
            .send(tungstenite::Message::Close(Some(CloseFrame {
                code: CloseCode::from(4008),
                reason: "connect failed".into(),
            })))
            .await
            .unwrap();

        // Returns even though a sender is still alive.
        tokio::time::timeout(std::time::Duration::from_secs(2), handle)
            .await
            .expect("should stop")
            .expect("no panic");

        match sink_rx.recv().await {
            Some(tungstenite::Message::Close(Some(frame))) => {
                assert_eq!(u16::from(frame.code), 4008);
            }
            other => panic!("expected close frame, got {other:?}"),
        }
        assert!(sink_rx.try_recv().is_err());
        drop(write_tx);
    }
}
