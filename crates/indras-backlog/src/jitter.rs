//! Random back-off jitter
//!
//! Each pull may be preceded by a delay drawn uniformly from an inclusive
//! millisecond range. The sampling distribution is built on first use and
//! cached for the lifetime of the sequence.

use std::sync::OnceLock;
use std::time::Duration;

use rand::distr::{Distribution, Uniform};

use crate::error::ConfigError;

/// Uniform delay sampler over `[min, max]` milliseconds
#[derive(Debug, Clone)]
pub struct Jitter {
    min: u64,
    max: u64,
    range: OnceLock<Option<Uniform<u64>>>,
}

impl Jitter {
    /// Create a sampler over `[min, max]`; bounds are swapped if reversed
    pub fn new(min: u64, max: u64) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self {
            min,
            max,
            range: OnceLock::new(),
        }
    }

    /// Build a sampler spanning the smallest and largest of `delays`
    ///
    /// A single value yields a fixed delay.
    pub fn from_delays(delays: &[u64]) -> Result<Self, ConfigError> {
        let min = delays.iter().copied().min();
        let max = delays.iter().copied().max();
        match (min, max) {
            (Some(min), Some(max)) => Ok(Self::new(min, max)),
            _ => Err(ConfigError::EmptyBackOffDelay),
        }
    }

    /// Lower bound in milliseconds
    pub fn min(&self) -> u64 {
        self.min
    }

    /// Upper bound in milliseconds
    pub fn max(&self) -> u64 {
        self.max
    }

    /// Draw a delay in milliseconds
    pub fn sample_millis(&self) -> u64 {
        let range = self
            .range
            .get_or_init(|| Uniform::new_inclusive(self.min, self.max).ok());

        match range {
            Some(dist) => dist.sample(&mut rand::rng()),
            None => self.min,
        }
    }

    /// Draw a delay
    pub fn sample(&self) -> Duration {
        Duration::from_millis(self.sample_millis())
    }
}
