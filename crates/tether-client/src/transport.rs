//! Transport seam between the connection state machine and the wire.
//!
//! The state machine never touches `tokio-tungstenite` directly; it talks to
//! a [`Transport`] that yields a send handle plus an event stream. Production
//! code uses [`WsTransport`]; tests drive the machine with scripted fakes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use crate::errors::ClientError;

/// Events surfaced by an established transport.
#[derive(Clone, Debug)]
pub enum TransportEvent {
    /// A text frame arrived.
    Message(String),
    /// The transport closed (close frame, EOF, or read failure).
    Closed {
        /// Close code, when the peer sent one.
        code: Option<u16>,
    },
    /// A transport-level error. The subsequent `Closed` event, not this one,
    /// drives reconnection.
    Error(String),
}

/// Send half of an established transport.
pub trait TransportSink: Send + Sync {
    /// Enqueue a text frame. Returns `false` if the transport is no longer
    /// writable.
    fn send(&self, text: String) -> bool;

    /// Whether the transport is still open for writing.
    fn is_open(&self) -> bool;

    /// Close the transport. Idempotent.
    fn close(&self);
}

/// Factory establishing transports for connection attempts.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a transport to `url`.
    ///
    /// A successful return means the transport is open; the receiver yields
    /// frames until the transport closes.
    async fn connect(
        &self,
        url: &str,
    ) -> Result<(Arc<dyn TransportSink>, mpsc::Receiver<TransportEvent>), ClientError>;
}

/// Capacity of the per-connection read/write channels.
const CHANNEL_CAPACITY: usize = 64;

enum WriteCommand {
    Text(String),
    Close,
}

struct WsSink {
    tx: mpsc::Sender<WriteCommand>,
    open: Arc<AtomicBool>,
}

impl TransportSink for WsSink {
    fn send(&self, text: String) -> bool {
        if !self.open.load(Ordering::Relaxed) {
            return false;
        }
        self.tx.try_send(WriteCommand::Text(text)).is_ok()
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed) && !self.tx.is_closed()
    }

    fn close(&self) {
        self.open.store(false, Ordering::Relaxed);
        let _ = self.tx.try_send(WriteCommand::Close);
    }
}

/// Production transport over `tokio-tungstenite`.
pub struct WsTransport;

#[async_trait]
impl Transport for WsTransport {
    async fn connect(
        &self,
        url: &str,
    ) -> Result<(Arc<dyn TransportSink>, mpsc::Receiver<TransportEvent>), ClientError> {
        let (stream, _response) =
            connect_async(url).await.map_err(|e| ClientError::ConnectFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        debug!(url, "websocket established");

        let (mut write, mut read) = stream.split();
        let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (write_tx, mut write_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let open = Arc::new(AtomicBool::new(true));

        let write_open = Arc::clone(&open);
        let _ = tokio::spawn(async move {
            while let Some(command) = write_rx.recv().await {
                match command {
                    WriteCommand::Text(text) => {
                        if write.send(Message::Text(text.into())).await.is_err() {
                            write_open.store(false, Ordering::Relaxed);
                            return;
                        }
                    }
                    WriteCommand::Close => {
                        let _ = write.send(Message::Close(None)).await;
                        write_open.store(false, Ordering::Relaxed);
                        return;
                    }
                }
            }
        });

        let read_open = Arc::clone(&open);
        let _ = tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        if event_tx
                            .send(TransportEvent::Message(text.to_string()))
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                    Ok(Message::Close(close_frame)) => {
                        read_open.store(false, Ordering::Relaxed);
                        let code = close_frame.map(|f| u16::from(f.code));
                        let _ = event_tx.send(TransportEvent::Closed { code }).await;
                        return;
                    }
                    // Ping/pong are answered by tungstenite; binary frames are
                    // not part of the protocol.
                    Ok(_) => {}
                    Err(e) => {
                        read_open.store(false, Ordering::Relaxed);
                        let _ = event_tx.send(TransportEvent::Error(e.to_string())).await;
                        let _ = event_tx.send(TransportEvent::Closed { code: None }).await;
                        return;
                    }
                }
            }
            // EOF without a close frame.
            read_open.store(false, Ordering::Relaxed);
            let _ = event_tx.send(TransportEvent::Closed { code: None }).await;
        });

        Ok((Arc::new(WsSink { tx: write_tx, open }), event_rx))
    }
}
