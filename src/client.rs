//! Interception client: record from a live socket or replay from a cassette

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::cassette::{self, Direction, Frame, Mode, Payload, SharedCassette};
use crate::config::ReplayScheduling;
use crate::transport::{EventHub, EventKind, Listener, Socket, SocketEvent};
use crate::{Result, VcrError};

/// Socket stand-in handed to code under test
///
/// While recording it wraps a real socket: sends are logged and forwarded,
/// with a send the socket rejects withdrawn again, and inbound messages are
/// logged and then passed on. While replaying
/// there is no socket at all; recorded inbound messages are delivered in
/// their original order and sends go nowhere.
pub struct InterceptionClient<S> {
    cassette: SharedCassette,
    name: String,
    mode: Mode,
    socket: Option<S>,
    hub: Arc<EventHub>,
    strict_sends: bool,
    closed: AtomicBool,
}

impl<S: Socket> InterceptionClient<S> {
    /// Wrap a live socket and record its traffic into `cassette`
    ///
    /// # Errors
    ///
    /// Returns error if the cassette is not recording
    pub fn recording(cassette: SharedCassette, socket: S) -> Result<Self> {
        let (name, mode) = describe(&cassette)?;
        if !mode.is_recording() {
            return Err(VcrError::WrongMode {
                name,
                operation: "record to",
                mode: mode.as_str(),
            });
        }

        let hub = Arc::new(EventHub::new());
        socket.subscribe(EventKind::Message, record_inbound(&cassette, &hub));
        for kind in [EventKind::Open, EventKind::Close, EventKind::Error] {
            let forward = Arc::clone(&hub);
            socket.subscribe(
                kind,
                Arc::new(move |event: &SocketEvent| forward.emit(event.clone())),
            );
        }

        debug!("Recording client attached to cassette '{}'", name);
        Ok(Self {
            cassette,
            name,
            mode,
            socket: Some(socket),
            hub,
            strict_sends: false,
            closed: AtomicBool::new(false),
        })
    }

    /// Replay `cassette` with no connection behind it
    ///
    /// `open` is emitted immediately. With [`ReplayScheduling::Eager`] every
    /// recorded inbound message follows, then `close`.
    ///
    /// # Errors
    ///
    /// Returns error if the cassette is not replaying, or if strict send
    /// checking is asked of eager replay, which has already walked past every
    /// recorded send by the time the caller can send
    pub fn replaying(
        cassette: SharedCassette,
        scheduling: ReplayScheduling,
        strict_sends: bool,
    ) -> Result<Self> {
        let (name, mode) = describe(&cassette)?;
        if !mode.is_replaying() {
            return Err(VcrError::WrongMode {
                name,
                operation: "replay from",
                mode: mode.as_str(),
            });
        }
        if strict_sends && scheduling == ReplayScheduling::Eager {
            return Err(VcrError::ConfigError(format!(
                "Strict sends on cassette '{name}' need lazy replay"
            )));
        }

        let client = Self {
            cassette,
            name,
            mode,
            socket: None,
            hub: Arc::new(EventHub::new()),
            strict_sends,
            closed: AtomicBool::new(false),
        };

        client.hub.emit(SocketEvent::Open);
        match scheduling {
            ReplayScheduling::Eager => {
                client.deliver_all()?;
            }
            ReplayScheduling::Lazy => client.close_if_drained()?,
        }

        debug!(
            "Replaying client attached to cassette '{}' ({:?})",
            client.name, scheduling
        );
        Ok(client)
    }

    /// Cassette this client reads or writes
    #[must_use]
    pub fn cassette_name(&self) -> &str {
        &self.name
    }

    /// Mode of the underlying cassette
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// True when a real connection is behind this client
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.socket.is_some()
    }

    /// Deliver the next recorded inbound message to `message` listeners
    ///
    /// Emits `close` once no inbound messages remain.
    ///
    /// # Errors
    ///
    /// Returns `VcrError::CassetteExhausted` when nothing is left to replay,
    /// and `VcrError::WrongMode` while recording. Playback errors are also
    /// reported on the `error` channel.
    pub fn deliver_next(&self) -> Result<Payload> {
        let next = cassette::lock(&self.cassette)?.next(Direction::Received);

        match next {
            Ok(payload) => {
                self.hub.emit(SocketEvent::Message(payload.clone()));
                self.close_if_drained()?;
                Ok(payload)
            }
            Err(e) => Err(self.report(e)),
        }
    }

    /// Deliver every remaining recorded inbound message, then `close`
    ///
    /// Returns the number of messages delivered.
    ///
    /// # Errors
    ///
    /// Returns error if the cassette is not replaying
    pub fn deliver_all(&self) -> Result<usize> {
        if !self.mode.is_replaying() {
            return Err(VcrError::WrongMode {
                name: self.name.clone(),
                operation: "replay from",
                mode: self.mode.as_str(),
            });
        }

        let mut delivered = 0;
        while cassette::lock(&self.cassette)?.has_pending(Direction::Received) {
            self.deliver_next()?;
            delivered += 1;
        }
        self.close_if_drained()?;
        Ok(delivered)
    }

    fn close_if_drained(&self) -> Result<()> {
        if !cassette::lock(&self.cassette)?.has_pending(Direction::Received) {
            self.emit_close();
        }
        Ok(())
    }

    fn emit_close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("Replay of '{}' closed", self.name);
            self.hub.emit(SocketEvent::Close(None));
        }
    }

    fn report(&self, err: VcrError) -> VcrError {
        if err.is_playback() {
            self.hub.emit(SocketEvent::Error(err.to_string()));
        }
        err
    }

    fn check_replayed_send(&self, payload: &Payload) -> Result<()> {
        let mut guard = cassette::lock(&self.cassette)?;
        let position = guard.cursor();
        let recorded = guard.next(Direction::Sent)?;

        if &recorded != payload {
            return Err(VcrError::CassetteMismatch {
                name: self.name.clone(),
                position,
                expected: format!("send of {payload}"),
                actual: format!("send of {recorded}"),
            });
        }
        Ok(())
    }
}

impl<S: Socket> Socket for InterceptionClient<S> {
    fn send(&self, payload: Payload) -> Result<()> {
        match (&self.mode, &self.socket) {
            (Mode::Recording, Some(socket)) => {
                // Take the slot before forwarding so a fast reply lands after it
                let slot = {
                    let mut guard = cassette::lock(&self.cassette)?;
                    guard.record(Direction::Sent, payload.clone())?;
                    guard.len() - 1
                };

                // A send the transport rejects is never logged
                if let Err(e) = socket.send(payload.clone()) {
                    let frame = Frame::new(Direction::Sent, payload);
                    cassette::lock(&self.cassette)?.retract(slot, &frame)?;
                    return Err(e);
                }
                Ok(())
            }
            (Mode::Recording, None) => Err(VcrError::Transport(format!(
                "No live socket for recording cassette '{}'",
                self.name
            ))),
            (Mode::Replaying, _) => {
                if self.strict_sends {
                    self.check_replayed_send(&payload)
                        .map_err(|e| self.report(e))?;
                }
                debug!(
                    "Replay of '{}' dropped outbound {} bytes",
                    self.name,
                    payload.len()
                );
                Ok(())
            }
        }
    }

    fn subscribe(&self, kind: EventKind, listener: Listener) {
        self.hub.subscribe(kind, listener);
    }

    fn close(&self) -> Result<()> {
        match &self.socket {
            Some(socket) => socket.close(),
            None => {
                self.emit_close();
                Ok(())
            }
        }
    }
}

impl<S> std::fmt::Debug for InterceptionClient<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptionClient")
            .field("cassette", &self.name)
            .field("mode", &self.mode)
            .field("live", &self.socket.is_some())
            .finish_non_exhaustive()
    }
}

fn describe(cassette: &SharedCassette) -> Result<(String, Mode)> {
    let guard = cassette::lock(cassette)?;
    Ok((guard.name().to_string(), guard.mode()))
}

/// Listener that logs an inbound message, then passes it on
fn record_inbound(shared: &SharedCassette, hub: &Arc<EventHub>) -> Listener {
    let shared = Arc::clone(shared);
    let hub = Arc::clone(hub);

    Arc::new(move |event: &SocketEvent| {
        if let SocketEvent::Message(payload) = event {
            let recorded = cassette::lock(&shared)
                .and_then(|mut guard| guard.record(Direction::Received, payload.clone()));
            if let Err(e) = recorded {
                warn!("Failed to record inbound message: {e}");
                hub.emit(SocketEvent::Error(format!(
                    "Inbound message not recorded: {e}"
                )));
            }
        }
        hub.emit(event.clone());
    })
}
