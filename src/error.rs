//! Error types for wsvcr

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::cassette::Direction;

/// Result type for wsvcr operations
pub type Result<T> = std::result::Result<T, VcrError>;

/// Errors that can occur while recording or replaying a cassette
#[derive(Debug, Error)]
pub enum VcrError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Cassette file exists but cannot be understood
    #[error("Cassette {path} is unreadable: {reason}")]
    Storage {
        /// Resolved cassette path
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// Replay asked for a frame past the end of the recorded log
    #[error("Cassette '{name}' exhausted at frame {position}: no more recorded frames")]
    CassetteExhausted {
        /// Cassette name
        name: String,
        /// Cursor position at the time of the request
        position: usize,
    },

    /// The recorded frame at the cursor has a different direction or payload
    #[error(
        "Cassette '{name}' mismatch at frame {position}: expected {expected}, recorded {actual}"
    )]
    CassetteMismatch {
        /// Cassette name
        name: String,
        /// Cursor position of the offending frame
        position: usize,
        /// What the caller asked for
        expected: String,
        /// What the cassette holds
        actual: String,
    },

    /// Operation not allowed for the cassette's mode
    #[error("Cannot {operation} cassette '{name}' while {mode}")]
    WrongMode {
        /// Cassette name
        name: String,
        /// Attempted operation
        operation: &'static str,
        /// Current mode, human readable
        mode: &'static str,
    },

    /// Invalid cassette name
    #[error("Invalid cassette name: {0}")]
    InvalidCassetteName(String),

    /// A session is already active on this controller
    #[error("Session '{0}' is already active; end it before starting another")]
    SessionActive(String),

    /// A hooked URL was opened with no cassette in use
    #[error("No cassette in use for intercepted connection to {0}")]
    NoActiveSession(String),

    /// Real socket failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl VcrError {
    pub(crate) fn mismatch(
        name: &str,
        position: usize,
        expected: Direction,
        actual: Direction,
    ) -> Self {
        Self::CassetteMismatch {
            name: name.to_string(),
            position,
            expected: format!("a {expected} frame"),
            actual: format!("a {actual} frame"),
        }
    }

    /// True for errors raised by replay playback rather than setup or I/O
    #[must_use]
    pub fn is_playback(&self) -> bool {
        matches!(
            self,
            Self::CassetteExhausted { .. } | Self::CassetteMismatch { .. }
        )
    }
}
