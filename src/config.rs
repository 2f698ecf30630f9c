//! Configuration types for wsvcr

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{Result, VcrError};

/// When a replaying client delivers recorded messages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayScheduling {
    /// Queue every recorded message at construction
    #[default]
    Eager,
    /// Deliver messages only when the caller pumps the client
    Lazy,
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory cassette files are stored under
    pub cassette_dir: PathBuf,
    /// URL substrings that trigger interception
    #[serde(default)]
    pub hook_uris: Vec<String>,
    /// Turn interception off globally
    #[serde(default)]
    pub disabled: bool,
    /// Replay delivery scheduling
    #[serde(default)]
    pub replay: ReplayScheduling,
    /// Check outbound sends against the recorded log during replay
    ///
    /// Requires lazy replay: eager replay walks past recorded sends while
    /// queueing inbound messages, leaving nothing to check against.
    #[serde(default)]
    pub strict_sends: bool,
}

impl Config {
    /// Create a configuration with default options
    pub fn new(cassette_dir: impl Into<PathBuf>, hook_uris: &[&str]) -> Self {
        Self {
            cassette_dir: cassette_dir.into(),
            hook_uris: hook_uris.iter().map(ToString::to_string).collect(),
            disabled: false,
            replay: ReplayScheduling::default(),
            strict_sends: false,
        }
    }

    /// Set replay scheduling
    #[must_use]
    pub fn with_replay(mut self, replay: ReplayScheduling) -> Self {
        self.replay = replay;
        self
    }

    /// Enable or disable strict send checking
    #[must_use]
    pub fn with_strict_sends(mut self, strict: bool) -> Self {
        self.strict_sends = strict;
        self
    }

    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| VcrError::ConfigError(format!("Failed to read config file: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| VcrError::ConfigError(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<()> {
        if self.cassette_dir.as_os_str().is_empty() {
            return Err(VcrError::ConfigError(
                "cassette_dir cannot be empty".to_string(),
            ));
        }

        // An empty hook would match every URL
        for (i, hook) in self.hook_uris.iter().enumerate() {
            if hook.is_empty() {
                return Err(VcrError::ConfigError(format!(
                    "hook_uris[{i}] cannot be empty"
                )));
            }
        }

        if self.strict_sends && self.replay == ReplayScheduling::Eager {
            return Err(VcrError::ConfigError(
                "strict_sends requires replay = \"lazy\"".to_string(),
            ));
        }

        Ok(())
    }

    /// Whether a connection to `url` should go through a cassette
    #[must_use]
    pub fn should_intercept(&self, url: &str) -> bool {
        !self.disabled && self.hook_uris.iter().any(|hook| url.contains(hook.as_str()))
    }
}
