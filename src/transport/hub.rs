//! Listener registry with an ordered backlog

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use super::{EventKind, Listener, SocketEvent};

#[derive(Default)]
struct HubState {
    listeners: HashMap<EventKind, Vec<Listener>>,
    /// Accepted events awaiting dispatch, in emission order
    queue: VecDeque<SocketEvent>,
    /// Events nobody could take yet, in emission order
    held: VecDeque<SocketEvent>,
    /// Held `message`/`close` events; anything emitted after one waits too
    held_stream: usize,
    dispatching: bool,
}

impl HubState {
    fn hold(&mut self, event: SocketEvent) {
        if is_stream(&event) {
            self.held_stream += 1;
        }
        self.held.push_back(event);
    }

    /// Put held events back at the head of the dispatch queue
    fn release_held(&mut self) {
        let mut released = std::mem::take(&mut self.held);
        released.append(&mut self.queue);
        self.queue = released;
        self.held_stream = 0;
    }
}

/// `message` and `close` must reach callers in the order they happened
fn is_stream(event: &SocketEvent) -> bool {
    matches!(event, SocketEvent::Message(_) | SocketEvent::Close(_))
}

/// Fans events out to subscribed listeners
///
/// Events nobody can take yet are held back and released, in emission
/// order, once a matching listener registers. A held `message` or `close`
/// also holds everything emitted after it, so `close` never overtakes an
/// undelivered message whatever order the caller subscribes in. `open` and
/// `error` never hold up other events.
///
/// Dispatch is serialized: one caller at a time drains the queue while
/// concurrent or reentrant emitters only enqueue. Listeners are invoked
/// without the registry lock held, so a listener may subscribe, send or
/// emit on the same hub.
#[derive(Default)]
pub struct EventHub {
    state: Mutex<HubState>,
}

impl EventHub {
    /// Create an empty hub
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an event, or hold it until it can be delivered in order
    pub fn emit(&self, event: SocketEvent) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.queue.push_back(event);
        if state.dispatching {
            return;
        }
        state.dispatching = true;
        drop(state);

        self.dispatch();
    }

    /// Register a listener and release any held events it unblocks
    pub fn subscribe(&self, kind: EventKind, listener: Listener) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.listeners.entry(kind).or_default().push(listener);
        state.release_held();
        if state.dispatching {
            return;
        }
        state.dispatching = true;
        drop(state);

        self.dispatch();
    }

    /// Number of events of `kind` held back
    #[must_use]
    pub fn pending(&self, kind: EventKind) -> usize {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state
            .held
            .iter()
            .filter(|event| event.kind() == kind)
            .count()
    }

    fn dispatch(&self) {
        loop {
            let (event, listeners) = {
                let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
                let Some(event) = state.queue.pop_front() else {
                    state.dispatching = false;
                    return;
                };

                let listeners = state
                    .listeners
                    .get(&event.kind())
                    .cloned()
                    .unwrap_or_default();
                if listeners.is_empty() || state.held_stream > 0 {
                    state.hold(event);
                    continue;
                }
                (event, listeners)
            };

            for listener in listeners {
                listener(&event);
            }
        }
    }
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHub").finish_non_exhaustive()
    }
}
