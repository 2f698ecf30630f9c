//! Socket capability shared by real transports and intercepting clients
//!
//! Callers talk to a [`Socket`]: they `send` payloads and subscribe to
//! `open`, `message`, `close` and `error` events. A live websocket, an
//! in-memory loopback and an [`InterceptionClient`] all expose the same
//! surface, so test code needs no branching to work against any of them.
//!
//! [`InterceptionClient`]: crate::client::InterceptionClient

mod hub;
pub mod live;
pub mod loopback;

use std::sync::Arc;

pub use hub::EventHub;
pub use live::WsSocket;
pub use loopback::LoopbackSocket;

use crate::cassette::Payload;
use crate::Result;

/// Close frame details reported by the peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    /// Close status code
    pub code: u16,
    /// Close reason text
    pub reason: String,
}

/// Event delivered to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// Connection established
    Open,
    /// Inbound message
    Message(Payload),
    /// Connection closed
    Close(Option<CloseReason>),
    /// Transport or playback failure
    Error(String),
}

impl SocketEvent {
    /// Kind used for subscription routing
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Open => EventKind::Open,
            Self::Message(_) => EventKind::Message,
            Self::Close(_) => EventKind::Close,
            Self::Error(_) => EventKind::Error,
        }
    }
}

/// Event categories a listener can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// `open`
    Open,
    /// `message`
    Message,
    /// `close`
    Close,
    /// `error`
    Error,
}

/// Event callback
///
/// Listeners may run on the transport's own task, not the caller's.
pub type Listener = Arc<dyn Fn(&SocketEvent) + Send + Sync>;

/// A websocket-like connection
pub trait Socket: Send + Sync {
    /// Queue a payload for the peer
    ///
    /// # Errors
    ///
    /// Returns error if the connection can no longer carry messages
    fn send(&self, payload: Payload) -> Result<()>;

    /// Register a listener for one kind of event
    fn subscribe(&self, kind: EventKind, listener: Listener);

    /// Close the connection
    ///
    /// # Errors
    ///
    /// Returns error if the close frame cannot be queued
    fn close(&self) -> Result<()>;

    /// Subscribe to `open`
    fn on_open<F>(&self, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
        Self: Sized,
    {
        self.subscribe(EventKind::Open, Arc::new(move |_: &SocketEvent| handler()));
    }

    /// Subscribe to `message`
    fn on_message<F>(&self, handler: F)
    where
        F: Fn(&Payload) + Send + Sync + 'static,
        Self: Sized,
    {
        self.subscribe(
            EventKind::Message,
            Arc::new(move |event: &SocketEvent| {
                if let SocketEvent::Message(payload) = event {
                    handler(payload);
                }
            }),
        );
    }

    /// Subscribe to `close`
    fn on_close<F>(&self, handler: F)
    where
        F: Fn(Option<&CloseReason>) + Send + Sync + 'static,
        Self: Sized,
    {
        self.subscribe(
            EventKind::Close,
            Arc::new(move |event: &SocketEvent| {
                if let SocketEvent::Close(reason) = event {
                    handler(reason.as_ref());
                }
            }),
        );
    }

    /// Subscribe to `error`
    fn on_error<F>(&self, handler: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
        Self: Sized,
    {
        self.subscribe(
            EventKind::Error,
            Arc::new(move |event: &SocketEvent| {
                if let SocketEvent::Error(message) = event {
                    handler(message);
                }
            }),
        );
    }
}
