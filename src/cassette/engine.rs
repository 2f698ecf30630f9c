//! Cassette record/replay state machine

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::{Result, VcrError};

use super::format::{self, Direction, Frame, Payload};
use super::naming;
use super::Mode;

/// Ordered interaction log for one named session
///
/// The mode is decided once by [`Cassette::open`] and never changes: a
/// recording cassette only grows, a replaying cassette is only read.
#[derive(Debug)]
pub struct Cassette {
    name: String,
    path: PathBuf,
    mode: Mode,
    entries: Vec<Frame>,
    cursor: usize,
}

impl Cassette {
    /// Open the cassette `name` under `dir`
    ///
    /// An existing file is loaded for replay; otherwise an empty recording
    /// cassette is returned and nothing touches the disk until [`save`].
    ///
    /// # Errors
    ///
    /// Returns error if the name is invalid or the file exists but cannot
    /// be read or parsed
    ///
    /// [`save`]: Cassette::save
    pub fn open(dir: &Path, name: &str) -> Result<Self> {
        let path = naming::resolve(dir, name)?;

        if !path.exists() {
            info!("Recording new cassette '{}' -> {}", name, path.display());
            return Ok(Self {
                name: name.to_string(),
                path,
                mode: Mode::Recording,
                entries: Vec::new(),
                cursor: 0,
            });
        }

        let content = std::fs::read_to_string(&path).map_err(|e| VcrError::Storage {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        let entries = format::decode(&path, &content)?;

        info!(
            "Replaying cassette '{}' ({} frames) from {}",
            name,
            entries.len(),
            path.display()
        );

        Ok(Self {
            name: name.to_string(),
            path,
            mode: Mode::Replaying,
            entries,
            cursor: 0,
        })
    }

    /// Cassette name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolved storage path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Mode fixed at open
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// True iff the cassette is recording
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.mode.is_recording()
    }

    /// Recorded frames in chronological order
    #[must_use]
    pub fn entries(&self) -> &[Frame] {
        &self.entries
    }

    /// Number of frames in the log
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the log holds no frames
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replay position
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Frames not yet replayed
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.entries.len().saturating_sub(self.cursor)
    }

    /// Whether any frame in `direction` is still ahead of the cursor
    #[must_use]
    pub fn has_pending(&self, direction: Direction) -> bool {
        self.entries[self.cursor.min(self.entries.len())..]
            .iter()
            .any(|frame| frame.direction == direction)
    }

    /// Frame at the cursor, without consuming it
    #[must_use]
    pub fn peek(&self) -> Option<&Frame> {
        self.entries.get(self.cursor)
    }

    /// Append a frame to a recording cassette
    ///
    /// # Errors
    ///
    /// Returns `VcrError::WrongMode` if the cassette is replaying
    pub fn record(&mut self, direction: Direction, payload: impl Into<Payload>) -> Result<()> {
        self.require(Mode::Recording, "record to")?;

        let frame = Frame::new(direction, payload);
        debug!(
            "Recorded {} frame #{} ({} bytes) on '{}'",
            frame.direction,
            self.entries.len(),
            frame.payload.len(),
            self.name
        );
        self.entries.push(frame);
        Ok(())
    }

    /// Withdraw `frame`, recorded at or before `index`, from a recording cassette
    ///
    /// Used to drop a send whose slot was taken before the transport rejected
    /// it. Retractions elsewhere may have shifted the frame towards the
    /// front, never past `index`. Later frames keep their relative order.
    ///
    /// # Errors
    ///
    /// Returns `VcrError::WrongMode` if the cassette is replaying
    pub fn retract(&mut self, index: usize, frame: &Frame) -> Result<bool> {
        self.require(Mode::Recording, "retract from")?;

        let end = index.saturating_add(1).min(self.entries.len());
        let Some(found) = self.entries[..end].iter().rposition(|f| f == frame) else {
            return Ok(false);
        };
        self.entries.remove(found);
        debug!(
            "Retracted {} frame #{} on '{}'",
            frame.direction, found, self.name
        );
        Ok(true)
    }

    /// Replay the next frame in `direction`
    ///
    /// Frames are served strictly in recorded order. Recorded sends ahead of
    /// the cursor are consumed when a received frame is requested, since
    /// replay does not gate outbound traffic. Asking for a send while a
    /// received frame is next is a mismatch and leaves the cursor in place.
    ///
    /// # Errors
    ///
    /// Returns `VcrError::CassetteExhausted` past the end of the log,
    /// `VcrError::CassetteMismatch` on a direction mismatch and
    /// `VcrError::WrongMode` on a recording cassette
    pub fn next(&mut self, direction: Direction) -> Result<Payload> {
        self.require(Mode::Replaying, "replay from")?;

        loop {
            let Some(frame) = self.entries.get(self.cursor) else {
                warn!(
                    "Cassette '{}' exhausted: {} frame requested at {}",
                    self.name, direction, self.cursor
                );
                return Err(VcrError::CassetteExhausted {
                    name: self.name.clone(),
                    position: self.cursor,
                });
            };

            if frame.direction == direction {
                let payload = frame.payload.clone();
                self.cursor += 1;
                return Ok(payload);
            }

            match (direction, frame.direction) {
                (Direction::Received, Direction::Sent) => {
                    debug!(
                        "Skipping recorded send #{} on '{}'",
                        self.cursor, self.name
                    );
                    self.cursor += 1;
                }
                (expected, actual) => {
                    warn!(
                        "Cassette '{}' mismatch at {}: wanted {}, recorded {}",
                        self.name, self.cursor, expected, actual
                    );
                    return Err(VcrError::mismatch(
                        &self.name,
                        self.cursor,
                        expected,
                        actual,
                    ));
                }
            }
        }
    }

    /// Replay the frame at the cursor regardless of direction
    ///
    /// # Errors
    ///
    /// Returns `VcrError::CassetteExhausted` past the end of the log and
    /// `VcrError::WrongMode` on a recording cassette
    pub fn next_frame(&mut self) -> Result<Frame> {
        self.require(Mode::Replaying, "replay from")?;

        let frame = self
            .entries
            .get(self.cursor)
            .cloned()
            .ok_or_else(|| VcrError::CassetteExhausted {
                name: self.name.clone(),
                position: self.cursor,
            })?;
        self.cursor += 1;
        Ok(frame)
    }

    /// Persist a recording cassette, creating parent directories as needed
    ///
    /// Saving again without further recording rewrites identical bytes.
    ///
    /// # Errors
    ///
    /// Returns error if the cassette is replaying or the write fails
    pub fn save(&self) -> Result<PathBuf> {
        self.require(Mode::Recording, "save")?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = format::encode(&self.name, &self.entries)?;
        std::fs::write(&self.path, content)?;

        info!(
            "Saved cassette '{}' ({} frames) to {}",
            self.name,
            self.entries.len(),
            self.path.display()
        );
        Ok(self.path.clone())
    }

    fn require(&self, mode: Mode, operation: &'static str) -> Result<()> {
        if self.mode == mode {
            Ok(())
        } else {
            Err(VcrError::WrongMode {
                name: self.name.clone(),
                operation,
                mode: self.mode.as_str(),
            })
        }
    }
}
