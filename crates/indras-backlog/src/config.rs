//! Sequence configuration
//!
//! Two layers:
//!
//! - [`SequenceConfig`]: a plain serde description with millisecond fields,
//!   suitable for embedding in a larger application config file.
//! - [`SequenceOptions`]: the validated runtime form consumed by
//!   [`Sequence`](crate::Sequence), built either from a config or through
//!   [`SequenceOptionsBuilder`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BacklogError, BacklogResult, ConfigError};
use crate::jitter::Jitter;
use crate::waiter::{DEFAULT_POLL_INTERVAL, PollingWaiter};

/// Directory name used under the system temp dir for auto-named snapshots
pub const DEFAULT_SCRATCH_DIR_NAME: &str = "indras-backlog";

/// Default scratch directory for auto-named snapshots
pub fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir().join(DEFAULT_SCRATCH_DIR_NAME)
}

/// Serializable sequence configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceConfig {
    /// Candidate back-off delays; each pull sleeps for a value drawn
    /// uniformly from `[min, max]` of this list
    pub back_off_delay_ms: Option<Vec<u64>>,

    /// How long an exhausted pull polls for new values before finishing
    /// the sequence. `None` finishes immediately.
    pub max_delay_ms: Option<u64>,

    /// Spacing between growth checks while polling
    pub poll_interval_ms: u64,

    /// Where auto-named snapshots live (defaults to the system temp dir)
    pub scratch_dir: Option<PathBuf>,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            back_off_delay_ms: None,
            max_delay_ms: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            scratch_dir: None,
        }
    }
}

impl SequenceConfig {
    /// No back-off, no polling: the sequence finishes as soon as it drains
    pub fn immediate() -> Self {
        Self::default()
    }

    /// Poll for up to `max_delay_ms` after draining
    pub fn patient(max_delay_ms: u64) -> Self {
        Self {
            max_delay_ms: Some(max_delay_ms),
            ..Default::default()
        }
    }

    /// Parse a JSON document
    pub fn from_json(json: &str) -> BacklogResult<Self> {
        serde_json::from_str(json).map_err(|e| BacklogError::deserialization(e.to_string()))
    }

    /// Validate and convert into runtime options
    pub fn into_options(self) -> Result<SequenceOptions, ConfigError> {
        let mut builder =
            SequenceOptions::builder().poll_interval(Duration::from_millis(self.poll_interval_ms));

        if let Some(delays) = self.back_off_delay_ms {
            builder = builder.back_off_delay(delays);
        }
        if let Some(ms) = self.max_delay_ms {
            builder = builder.max_delay(Duration::from_millis(ms));
        }
        if let Some(dir) = self.scratch_dir {
            builder = builder.scratch_dir(dir);
        }

        builder.build()
    }
}

impl TryFrom<SequenceConfig> for SequenceOptions {
    type Error = ConfigError;

    fn try_from(config: SequenceConfig) -> Result<Self, Self::Error> {
        config.into_options()
    }
}

/// Validated runtime options for a sequence
#[derive(Debug, Clone)]
pub struct SequenceOptions {
    back_off_delay: Option<Jitter>,
    max_delay: Option<Duration>,
    poll_interval: Duration,
    scratch_dir: PathBuf,
}

impl Default for SequenceOptions {
    fn default() -> Self {
        Self {
            back_off_delay: None,
            max_delay: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            scratch_dir: default_scratch_dir(),
        }
    }
}

impl SequenceOptions {
    /// Start building options
    pub fn builder() -> SequenceOptionsBuilder {
        SequenceOptionsBuilder::new()
    }

    /// Back-off jitter applied before each pull, if any
    pub fn back_off_delay(&self) -> Option<&Jitter> {
        self.back_off_delay.as_ref()
    }

    /// Polling budget for an exhausted pull
    pub fn max_delay(&self) -> Option<Duration> {
        self.max_delay
    }

    /// Spacing between growth checks
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Directory for auto-named snapshots
    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Waiter configured from these options
    pub fn waiter(&self) -> PollingWaiter {
        PollingWaiter::new(self.max_delay).with_interval(self.poll_interval)
    }
}

/// Builder for [`SequenceOptions`]
#[derive(Debug, Default)]
pub struct SequenceOptionsBuilder {
    back_off_delay: Option<Vec<u64>>,
    max_delay: Option<Duration>,
    poll_interval: Option<Duration>,
    scratch_dir: Option<PathBuf>,
}

impl SequenceOptionsBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set candidate back-off delays in milliseconds
    pub fn back_off_delay(mut self, delays: impl IntoIterator<Item = u64>) -> Self {
        self.back_off_delay = Some(delays.into_iter().collect());
        self
    }

    /// Set the polling budget
    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Set the polling budget in milliseconds
    pub fn max_delay_ms(self, ms: u64) -> Self {
        self.max_delay(Duration::from_millis(ms))
    }

    /// Set the polling interval
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Set the scratch directory for auto-named snapshots
    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    /// Validate and build the options
    pub fn build(self) -> Result<SequenceOptions, ConfigError> {
        let mut options = SequenceOptions::default();

        if let Some(delays) = self.back_off_delay {
            options.back_off_delay = Some(Jitter::from_delays(&delays)?);
        }
        if let Some(max_delay) = self.max_delay {
            if max_delay < Duration::from_millis(1) {
                return Err(ConfigError::InvalidMaxDelay(max_delay));
            }
            options.max_delay = Some(max_delay);
        }
        if let Some(interval) = self.poll_interval {
            if interval.is_zero() {
                return Err(ConfigError::InvalidPollInterval);
            }
            options.poll_interval = interval;
        }
        if let Some(dir) = self.scratch_dir {
            options.scratch_dir = dir;
        }

        Ok(options)
    }
}
