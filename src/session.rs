//! Session controller: decides per connection whether to intercept

use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use tracing::{debug, info, warn};

use crate::cassette::{self, naming, Cassette, Mode, Payload, SharedCassette};
use crate::client::InterceptionClient;
use crate::config::Config;
use crate::transport::{EventKind, Listener, Socket};
use crate::{Result, VcrError};

/// What [`SessionController::connect`] handed back
///
/// Both variants implement [`Socket`], so callers can use the result
/// without caring whether it was intercepted.
#[derive(Debug)]
pub enum Connection<S> {
    /// Routed through the active cassette
    Intercepted(InterceptionClient<S>),
    /// URL not hooked; the real socket, untouched
    PassThrough(S),
}

impl<S> Connection<S> {
    /// Whether the connection goes through a cassette
    #[must_use]
    pub fn is_intercepted(&self) -> bool {
        matches!(self, Self::Intercepted(_))
    }

    /// The interception client, if intercepted
    #[must_use]
    pub fn as_client(&self) -> Option<&InterceptionClient<S>> {
        match self {
            Self::Intercepted(client) => Some(client),
            Self::PassThrough(_) => None,
        }
    }
}

impl<S: Socket> Socket for Connection<S> {
    fn send(&self, payload: Payload) -> Result<()> {
        match self {
            Self::Intercepted(client) => client.send(payload),
            Self::PassThrough(socket) => socket.send(payload),
        }
    }

    fn subscribe(&self, kind: EventKind, listener: Listener) {
        match self {
            Self::Intercepted(client) => client.subscribe(kind, listener),
            Self::PassThrough(socket) => socket.subscribe(kind, listener),
        }
    }

    fn close(&self) -> Result<()> {
        match self {
            Self::Intercepted(client) => client.close(),
            Self::PassThrough(socket) => socket.close(),
        }
    }
}

/// Owns the one active cassette for a test
///
/// Sessions run one at a time per controller. Tests that run concurrently
/// should each own their own controller.
///
/// A recording cassette is only written once a hooked connection went
/// through it; sessions that only passed traffic through leave no file.
/// Dropping a controller mid-recording still saves what was captured.
#[derive(Debug)]
pub struct SessionController {
    config: Config,
    active: Option<SharedCassette>,
    intercepted: AtomicBool,
}

impl SessionController {
    /// Create a controller with no active session
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            active: None,
            intercepted: AtomicBool::new(false),
        }
    }

    /// Configuration in use
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Storage path the cassette `name` resolves to
    ///
    /// # Errors
    ///
    /// Returns error if the name is invalid
    pub fn cassette_path(&self, name: &str) -> Result<PathBuf> {
        naming::resolve(&self.config.cassette_dir, name)
    }

    /// True while a session is active
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// True while a session is active and recording
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.active_mode() == Some(Mode::Recording)
    }

    /// Mode of the active cassette
    #[must_use]
    pub fn active_mode(&self) -> Option<Mode> {
        let active = self.active.as_ref()?;
        cassette::lock(active).ok().map(|guard| guard.mode())
    }

    /// Start a session on the cassette `name`
    ///
    /// # Errors
    ///
    /// Returns `VcrError::SessionActive` if a session is already running, or
    /// any error from opening the cassette
    pub fn begin(&mut self, name: &str) -> Result<Mode> {
        if let Some(active) = &self.active {
            let current = cassette::lock(active)?.name().to_string();
            return Err(VcrError::SessionActive(current));
        }

        let cassette = Cassette::open(&self.config.cassette_dir, name)?;
        let mode = cassette.mode();
        info!("Session '{}' started ({})", name, mode.as_str());

        self.active = Some(Arc::new(Mutex::new(cassette)));
        self.intercepted.store(false, Ordering::Release);
        Ok(mode)
    }

    /// Open a connection to `url`, intercepting it if hooked
    ///
    /// Unhooked URLs (or any URL while interception is disabled) go straight
    /// to `connect_fn`. Hooked URLs use the active cassette: recording calls
    /// `connect_fn` and wraps the real socket, replaying never calls it.
    ///
    /// # Errors
    ///
    /// Returns `VcrError::NoActiveSession` for a hooked URL with no session,
    /// or any error from `connect_fn`
    pub async fn connect<S, F, Fut>(&self, url: &str, connect_fn: F) -> Result<Connection<S>>
    where
        S: Socket,
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<S>>,
    {
        if !self.config.should_intercept(url) {
            debug!("Passing through connection to {}", url);
            return Ok(Connection::PassThrough(connect_fn(url.to_string()).await?));
        }

        let shared = self
            .active
            .clone()
            .ok_or_else(|| VcrError::NoActiveSession(url.to_string()))?;
        let mode = cassette::lock(&shared)?.mode();

        let client = match mode {
            Mode::Recording => {
                debug!("Intercepting {} (recording)", url);
                let socket = connect_fn(url.to_string()).await?;
                InterceptionClient::recording(shared, socket)?
            }
            Mode::Replaying => {
                debug!("Intercepting {} (replaying)", url);
                InterceptionClient::replaying(
                    shared,
                    self.config.replay,
                    self.config.strict_sends,
                )?
            }
        };

        self.intercepted.store(true, Ordering::Release);
        Ok(Connection::Intercepted(client))
    }

    /// End the active session
    ///
    /// A recording cassette that intercepted a connection is saved, with
    /// whatever frames it holds. The session is cleared even if saving
    /// fails. Returns the saved path.
    ///
    /// # Errors
    ///
    /// Returns error if saving fails
    pub fn end(&mut self) -> Result<Option<PathBuf>> {
        let Some(active) = self.active.take() else {
            return Ok(None);
        };

        let guard = cassette::lock(&active)?;
        info!("Session '{}' ended", guard.name());
        let intercepted = self.intercepted.swap(false, Ordering::AcqRel);
        let saved = if !guard.is_recording() {
            Ok(None)
        } else if intercepted {
            guard.save().map(Some)
        } else {
            debug!("Cassette '{}' intercepted nothing; not saved", guard.name());
            Ok(None)
        };
        drop(guard);
        saved
    }

    /// Run `f` inside a session on the cassette `name`
    ///
    /// The session is ended afterwards whether or not `f` succeeds, so a
    /// failing test still leaves a partial cassette behind.
    ///
    /// # Errors
    ///
    /// Returns the error from `f`, or from starting or ending the session
    pub async fn use_cassette<T, F>(&mut self, name: &str, f: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a SessionController) -> BoxFuture<'a, Result<T>>,
    {
        self.begin(name)?;
        let outcome = f(&*self).await;
        let ended = self.end();

        match (outcome, ended) {
            (Ok(value), Ok(_)) => Ok(value),
            (Err(e), Ok(_)) | (Ok(_), Err(e)) => Err(e),
            (Err(e), Err(save_err)) => {
                warn!("Failed to save cassette '{}': {save_err}", name);
                Err(e)
            }
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if self.active.is_some() {
            if let Err(e) = self.end() {
                warn!("Failed to save cassette on drop: {e}");
            }
        }
    }
}
