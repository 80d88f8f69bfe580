//! Live event stream connection.
//!
//! One `WebSocket` per session. The reader runs on its own task and hands
//! parsed [`StreamMessage`]s to the session driver over an `mpsc` channel,
//! so the driver's `select!` only ever awaits a cancel-safe `recv()`.
//!
//! Text frames carry JSON messages. Pings are answered, binary frames are
//! ignored, and unparseable text is dropped with a warning while the
//! connection stays up. Reconnecting is left to the caller.

use floorcast_types::StreamMessage;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::ClientError;

/// What the reader task delivers: a message, or the reason the stream
/// ended (always the last item).
pub type StreamItem = Result<StreamMessage, ClientError>;

/// An open live stream.
pub struct StreamConnection {
    url: String,
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl core::fmt::Debug for StreamConnection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StreamConnection")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl StreamConnection {
    /// Open the stream at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ConnectionLost`] if the handshake fails.
    pub async fn connect(url: &str) -> Result<Self, ClientError> {
        let (socket, response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| ClientError::ConnectionLost {
                reason: format!("connect to {url} failed: {e}"),
            })?;
        info!(url, status = %response.status(), "live stream connected");
        Ok(Self {
            url: url.to_owned(),
            socket,
        })
    }

    /// Start the reader task. The returned receiver yields every parsed
    /// message in arrival order, then one `Err(ConnectionLost)` when the
    /// stream ends, then closes.
    pub fn spawn(self, buffer: usize) -> mpsc::Receiver<StreamItem> {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        tokio::spawn(self.read_loop(tx));
        rx
    }

    async fn read_loop(mut self, tx: mpsc::Sender<StreamItem>) {
        let reason = loop {
            let Some(frame) = self.socket.next().await else {
                break "stream ended".to_owned();
            };
            match frame {
                Ok(Message::Text(text)) => match parse_frame(&text) {
                    Ok(message) => {
                        debug!(kind = message.kind(), "stream message");
                        if tx.send(Ok(message)).await.is_err() {
                            debug!("session driver gone, closing stream reader");
                            return;
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, len = text.len(), "dropping malformed stream message");
                    }
                },
                Ok(Message::Ping(data)) => {
                    if let Err(e) = self.socket.send(Message::Pong(data)).await {
                        break format!("pong failed: {e}");
                    }
                }
                Ok(Message::Close(frame)) => {
                    break frame.map_or_else(
                        || "closed by server".to_owned(),
                        |f| format!("closed by server: {} {}", f.code, f.reason),
                    );
                }
                Ok(_) => {
                    // Binary, pong and raw frames carry nothing for us.
                }
                Err(e) => break format!("read error: {e}"),
            }
        };
        info!(url = %self.url, %reason, "live stream disconnected");
        let _ = tx.send(Err(ClientError::ConnectionLost { reason })).await;
    }
}

/// Parse one text frame.
///
/// # Errors
///
/// Returns [`ClientError::MalformedMessage`] for invalid JSON or unknown
/// message kinds.
pub fn parse_frame(text: &str) -> Result<StreamMessage, ClientError> {
    Ok(StreamMessage::parse(text)?)
}
