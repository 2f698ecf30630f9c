//! On-disk cassette document
//!
//! A cassette is a pretty-printed JSON document:
//!
//! ```json
//! {
//!   "name": "ping",
//!   "frames": [
//!     { "direction": "sent", "payload": "ping" },
//!     { "direction": "received", "payload": "00ff", "encoding": "hex" }
//!   ]
//! }
//! ```
//!
//! Text frames carry their payload verbatim. Binary frames are hex encoded
//! and tagged with `"encoding": "hex"`. Decoding is strict: a document that
//! does not parse, or any frame missing `direction` or `payload`, fails.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Result, VcrError};

/// Which way a frame travelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Caller to server
    Sent,
    /// Server to caller
    Received,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sent => f.write_str("sent"),
            Self::Received => f.write_str("received"),
        }
    }
}

/// Message content, kept exactly as it crossed the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Text message
    Text(String),
    /// Binary message
    Binary(Vec<u8>),
}

impl Payload {
    /// Text content, if this is a text payload
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(_) => None,
        }
    }

    /// Raw bytes of the payload
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(data) => data,
        }
    }

    /// Payload length in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// True for an empty payload
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Binary(data) => write!(f, "<{} bytes: {}>", data.len(), hex::encode(data)),
        }
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(data: Vec<u8>) -> Self {
        Self::Binary(data)
    }
}

impl From<&[u8]> for Payload {
    fn from(data: &[u8]) -> Self {
        Self::Binary(data.to_vec())
    }
}

/// One recorded message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Which way it travelled
    pub direction: Direction,
    /// What it carried
    pub payload: Payload,
}

impl Frame {
    /// Create a frame
    pub fn new(direction: Direction, payload: impl Into<Payload>) -> Self {
        Self {
            direction,
            payload: payload.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Encoding {
    Hex,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct FrameRecord {
    direction: Direction,
    payload: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    encoding: Option<Encoding>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct CassetteDocument {
    #[serde(default)]
    name: String,
    frames: Vec<FrameRecord>,
}

impl From<&Frame> for FrameRecord {
    fn from(frame: &Frame) -> Self {
        match &frame.payload {
            Payload::Text(text) => Self {
                direction: frame.direction,
                payload: text.clone(),
                encoding: None,
            },
            Payload::Binary(data) => Self {
                direction: frame.direction,
                payload: hex::encode(data),
                encoding: Some(Encoding::Hex),
            },
        }
    }
}

/// Serialize frames into a cassette document
///
/// The output depends only on `name` and `frames`, so encoding the same
/// cassette twice yields identical bytes.
///
/// # Errors
///
/// Returns error if serialization fails
pub fn encode(name: &str, frames: &[Frame]) -> Result<String> {
    let document = CassetteDocument {
        name: name.to_string(),
        frames: frames.iter().map(FrameRecord::from).collect(),
    };

    let mut json = serde_json::to_string_pretty(&document)
        .map_err(|e| VcrError::Other(format!("Failed to serialize cassette '{name}': {e}")))?;
    json.push('\n');
    Ok(json)
}

/// Parse a cassette document
///
/// # Errors
///
/// Returns `VcrError::Storage` if the document or any frame is malformed
pub fn decode(path: &Path, content: &str) -> Result<Vec<Frame>> {
    let storage_error = |reason: String| VcrError::Storage {
        path: path.to_path_buf(),
        reason,
    };

    let document: CassetteDocument =
        serde_json::from_str(content).map_err(|e| storage_error(e.to_string()))?;

    document
        .frames
        .into_iter()
        .enumerate()
        .map(|(i, record)| {
            let payload = match record.encoding {
                None => Payload::Text(record.payload),
                Some(Encoding::Hex) => Payload::Binary(
                    hex::decode(&record.payload)
                        .map_err(|e| storage_error(format!("frame {i}: bad hex payload: {e}")))?,
                ),
            };
            Ok(Frame {
                direction: record.direction,
                payload,
            })
        })
        .collect()
}
