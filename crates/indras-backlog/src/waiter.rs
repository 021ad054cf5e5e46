//! Polling waiter
//!
//! When a consumer catches up with the end of the backlog it parks here. The
//! waiter ticks on a fixed interval and asks whether a record is readable at
//! the cursor. There is no wake channel: producers simply append (or a load
//! swaps in a new backlog), and the next tick notices.

use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::debug;

/// Default spacing between growth checks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How a wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A record became readable while waiting
    Grew,
    /// The polling budget ran out (or none was configured)
    TimedOut,
    /// The sequence was stopped while waiting
    Stopped,
}

impl WaitOutcome {
    /// True only for [`WaitOutcome::Grew`]
    pub fn grew(self) -> bool {
        matches!(self, WaitOutcome::Grew)
    }
}

/// Bounded, interval-based wait for backlog growth
#[derive(Debug, Clone, Copy)]
pub struct PollingWaiter {
    max_delay: Option<Duration>,
    interval: Duration,
}

impl PollingWaiter {
    /// Create a waiter with the given budget and the default interval
    ///
    /// `None` (or a zero budget) means "do not wait at all".
    pub fn new(max_delay: Option<Duration>) -> Self {
        Self {
            max_delay,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the polling interval. Must be non-zero.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Total time budget for a single wait
    pub fn max_delay(&self) -> Option<Duration> {
        self.max_delay
    }

    /// Spacing between ticks
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until `ready()` reports a readable record, the budget elapses,
    /// or `stopped()` reports true.
    ///
    /// Every wait with a budget performs at least one tick, even when the
    /// budget is shorter than the interval. Readiness is checked before the
    /// deadline on each tick.
    pub async fn wait_for_growth<R, S>(&self, ready: R, stopped: S) -> WaitOutcome
    where
        R: Fn() -> bool,
        S: Fn() -> bool,
    {
        let max_delay = match self.max_delay {
            Some(d) if !d.is_zero() => d,
            _ => return WaitOutcome::TimedOut,
        };

        let start = Instant::now();
        let mut ticker = interval_at(start + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!(
            max_delay_ms = max_delay.as_millis() as u64,
            interval_ms = self.interval.as_millis() as u64,
            "Waiting for backlog growth"
        );

        loop {
            ticker.tick().await;

            if ready() {
                debug!(
                    waited_ms = start.elapsed().as_millis() as u64,
                    "Backlog grew"
                );
                return WaitOutcome::Grew;
            }
            if stopped() {
                return WaitOutcome::Stopped;
            }
            if start.elapsed() >= max_delay {
                debug!(
                    waited_ms = start.elapsed().as_millis() as u64,
                    "Wait budget exhausted"
                );
                return WaitOutcome::TimedOut;
            }
        }
    }
}
