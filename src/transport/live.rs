//! Real websocket connections over `tokio-tungstenite`

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use super::{CloseReason, EventHub, EventKind, Listener, Socket, SocketEvent};
use crate::cassette::Payload;
use crate::{Result, VcrError};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Open a live websocket to `url`
///
/// Suitable as the connect function handed to
/// [`SessionController::connect`](crate::session::SessionController::connect).
///
/// # Errors
///
/// Returns error if the handshake fails
pub async fn connect(url: String) -> Result<WsSocket> {
    WsSocket::connect(&url).await
}

/// A websocket connection driven by two background tasks
///
/// Outbound payloads are queued to a writer task; a reader task turns
/// inbound frames into [`SocketEvent`]s. Must be created inside a tokio
/// runtime.
pub struct WsSocket {
    url: String,
    outbound: mpsc::UnboundedSender<Message>,
    hub: Arc<EventHub>,
    closing: AtomicBool,
}

impl WsSocket {
    /// Connect to a websocket endpoint
    ///
    /// # Errors
    ///
    /// Returns error if connection fails
    pub async fn connect(url: &str) -> Result<Self> {
        let (stream, _) = connect_async(url)
            .await
            .map_err(|e| VcrError::Transport(format!("WebSocket connect to {url} failed: {e}")))?;
        debug!("Connected to {}", url);

        let (sink, stream) = stream.split();
        let (outbound, rx) = mpsc::unbounded_channel();
        let hub = Arc::new(EventHub::new());
        let closed = Arc::new(AtomicBool::new(false));

        hub.emit(SocketEvent::Open);
        tokio::spawn(write_loop(sink, rx, Arc::clone(&hub)));
        tokio::spawn(read_loop(stream, Arc::clone(&hub), closed));

        Ok(Self {
            url: url.to_string(),
            outbound,
            hub,
            closing: AtomicBool::new(false),
        })
    }

    /// Endpoint this socket is connected to
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Socket for WsSocket {
    fn send(&self, payload: Payload) -> Result<()> {
        if self.closing.load(Ordering::Acquire) {
            return Err(VcrError::Transport(format!(
                "Connection to {} is closing",
                self.url
            )));
        }

        self.outbound
            .send(payload_to_message(payload))
            .map_err(|_| VcrError::Transport(format!("Connection to {} is closed", self.url)))
    }

    fn subscribe(&self, kind: EventKind, listener: Listener) {
        self.hub.subscribe(kind, listener);
    }

    fn close(&self) -> Result<()> {
        if self.closing.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        debug!("Closing connection to {}", self.url);
        // Writer already gone means the connection is down
        let _ = self.outbound.send(Message::Close(None));
        Ok(())
    }
}

impl std::fmt::Debug for WsSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsSocket").field("url", &self.url).finish()
    }
}

async fn write_loop(
    mut sink: WsSink,
    mut rx: mpsc::UnboundedReceiver<Message>,
    hub: Arc<EventHub>,
) {
    while let Some(msg) = rx.recv().await {
        let closing = msg.is_close();
        if let Err(e) = sink.send(msg).await {
            warn!("Failed to send to server: {e}");
            hub.emit(SocketEvent::Error(e.to_string()));
            break;
        }
        if closing {
            break;
        }
    }
}

async fn read_loop(mut stream: WsStream, hub: Arc<EventHub>, closed: Arc<AtomicBool>) {
    let emit_close = |reason: Option<CloseReason>| {
        if !closed.swap(true, Ordering::AcqRel) {
            hub.emit(SocketEvent::Close(reason));
        }
    };

    while let Some(msg_result) = stream.next().await {
        match msg_result {
            Ok(Message::Close(frame)) => {
                debug!("Server closed connection");
                emit_close(frame.map(close_reason));
                return;
            }
            Ok(msg) => {
                if let Some(payload) = message_to_payload(msg) {
                    hub.emit(SocketEvent::Message(payload));
                }
            }
            Err(e) => {
                warn!("Server error: {e}");
                hub.emit(SocketEvent::Error(e.to_string()));
                break;
            }
        }
    }

    emit_close(None);
}

fn close_reason(frame: CloseFrame<'_>) -> CloseReason {
    CloseReason {
        code: frame.code.into(),
        reason: frame.reason.into_owned(),
    }
}

/// Convert a payload to a websocket data message
#[must_use]
pub fn payload_to_message(payload: Payload) -> Message {
    match payload {
        Payload::Text(text) => Message::Text(text),
        Payload::Binary(data) => Message::Binary(data),
    }
}

/// Extract the payload of a data message
///
/// Control frames carry no recordable payload and yield `None`.
#[must_use]
pub fn message_to_payload(msg: Message) -> Option<Payload> {
    match msg {
        Message::Text(text) => Some(Payload::Text(text)),
        Message::Binary(data) => Some(Payload::Binary(data)),
        Message::Ping(_) | Message::Pong(_) | Message::Close(_) | Message::Frame(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_to_payload() {
        assert_eq!(
            message_to_payload(Message::Text("hello".to_string())),
            Some(Payload::from("hello"))
        );
        assert_eq!(
            message_to_payload(Message::Binary(vec![1, 2, 3])),
            Some(Payload::from(vec![1u8, 2, 3]))
        );
        assert_eq!(message_to_payload(Message::Ping(vec![])), None);
        assert_eq!(message_to_payload(Message::Pong(vec![])), None);
        assert_eq!(message_to_payload(Message::Close(None)), None);
    }

    #[test]
    fn test_payload_to_message() {
        assert_eq!(
            payload_to_message(Payload::from("hi")),
            Message::Text("hi".to_string())
        );
        assert_eq!(
            payload_to_message(Payload::from(vec![7u8])),
            Message::Binary(vec![7])
        );
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let result = WsSocket::connect("ws://127.0.0.1:1/socket").await;
        assert!(matches!(result, Err(VcrError::Transport(_))));
    }
}
