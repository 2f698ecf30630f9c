//! wsvcr - record and replay websocket traffic for deterministic tests
//!
//! Connections to hooked URLs are intercepted. With no cassette on disk the
//! real socket is used and every message is recorded; with a cassette on disk
//! the recorded messages are replayed and no network connection is opened.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::multiple_crate_versions
)]

pub mod cassette;
pub mod client;
pub mod config;
pub mod error;
pub mod session;
pub mod transport;

pub use cassette::{Cassette, Direction, Frame, Payload};
pub use client::InterceptionClient;
pub use config::{Config, ReplayScheduling};
pub use error::{Result, VcrError};
pub use session::{Connection, SessionController};
pub use transport::{EventKind, Socket, SocketEvent};
