//! In-memory socket whose peer is driven by test code

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::{CloseReason, EventHub, EventKind, Listener, Socket, SocketEvent};
use crate::cassette::Payload;
use crate::{Result, VcrError};

#[derive(Debug, Default)]
struct Inner {
    hub: EventHub,
    sent: Mutex<Vec<Payload>>,
    closed: AtomicBool,
    refuse_sends: AtomicBool,
}

/// A socket with no network behind it
///
/// Clones share the same connection: hand one to the code under test and
/// keep another to play the server, pushing inbound messages with
/// [`deliver`](LoopbackSocket::deliver) and inspecting what was sent.
/// The connection reports `open` as soon as it is created.
#[derive(Debug, Clone)]
pub struct LoopbackSocket {
    inner: Arc<Inner>,
}

impl LoopbackSocket {
    /// Create an open loopback connection
    #[must_use]
    pub fn new() -> Self {
        let inner = Arc::new(Inner::default());
        inner.hub.emit(SocketEvent::Open);
        Self { inner }
    }

    /// Connect function for use with the session controller
    ///
    /// # Errors
    ///
    /// Never fails; the signature matches other connect functions
    #[allow(clippy::unused_async)]
    pub async fn connect(_url: String) -> Result<Self> {
        Ok(Self::new())
    }

    /// Peer sends a message to the caller
    pub fn deliver(&self, payload: impl Into<Payload>) {
        self.inner.hub.emit(SocketEvent::Message(payload.into()));
    }

    /// Peer reports a transport failure
    pub fn fail(&self, message: &str) {
        self.inner.hub.emit(SocketEvent::Error(message.to_string()));
    }

    /// Peer closes the connection
    pub fn hang_up(&self, reason: Option<CloseReason>) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            self.inner.hub.emit(SocketEvent::Close(reason));
        }
    }

    /// Make subsequent sends fail as if the connection dropped
    pub fn refuse_sends(&self, refuse: bool) {
        self.inner.refuse_sends.store(refuse, Ordering::Release);
    }

    /// Payloads the caller has sent, in order
    #[must_use]
    pub fn sent(&self) -> Vec<Payload> {
        self.inner
            .sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether either side closed the connection
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl Default for LoopbackSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl Socket for LoopbackSocket {
    fn send(&self, payload: Payload) -> Result<()> {
        if self.is_closed() {
            return Err(VcrError::Transport("Loopback connection is closed".to_string()));
        }
        if self.inner.refuse_sends.load(Ordering::Acquire) {
            return Err(VcrError::Transport("Loopback connection refused send".to_string()));
        }

        self.inner
            .sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(payload);
        Ok(())
    }

    fn subscribe(&self, kind: EventKind, listener: Listener) {
        self.inner.hub.subscribe(kind, listener);
    }

    fn close(&self) -> Result<()> {
        self.hang_up(None);
        Ok(())
    }
}
