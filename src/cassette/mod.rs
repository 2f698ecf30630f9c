//! Persistent, ordered frame logs

mod engine;
pub mod format;
pub mod naming;

use std::sync::{Arc, Mutex, MutexGuard};

pub use engine::Cassette;
pub use format::{Direction, Frame, Payload};

use crate::{Result, VcrError};

/// Whether a cassette is being written or read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Frames are appended from a live connection
    Recording,
    /// Frames are played back with no connection
    Replaying,
}

impl Mode {
    /// Check if mode is Recording
    #[must_use]
    pub fn is_recording(&self) -> bool {
        matches!(self, Mode::Recording)
    }

    /// Check if mode is Replaying
    #[must_use]
    pub fn is_replaying(&self) -> bool {
        matches!(self, Mode::Replaying)
    }

    /// Lowercase name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Recording => "recording",
            Mode::Replaying => "replaying",
        }
    }
}

/// Cassette shared between the session controller and its clients
///
/// Inbound frames are appended from the transport's reader task while sends
/// are appended from the caller, so every access goes through the lock.
pub type SharedCassette = Arc<Mutex<Cassette>>;

/// Lock a shared cassette
///
/// # Errors
///
/// Returns error if a previous holder panicked
pub fn lock(cassette: &SharedCassette) -> Result<MutexGuard<'_, Cassette>> {
    cassette
        .lock()
        .map_err(|_| VcrError::Other("Cassette lock poisoned".to_string()))
}
