//! # Indras Backlog
//!
//! A growable, asynchronously consumed sequence for Indras Network.
//!
//! Producers append values to a backlog at any time; consumers pull them one
//! at a time in append order. A consumer that catches up with the end of the
//! backlog polls for new values until a configurable budget runs out, at which
//! point the sequence finishes and every further pull returns `None`.
//!
//! ## Features
//!
//! - **Sequence**: shared handle with `get`, `update`, `stop` and a `Stream`
//!   adapter; concurrent pulls never receive the same value
//! - **Back-off jitter**: optional random delay before each pull
//! - **Polling waiter**: bounded wait for backlog growth
//! - **Snapshots**: `freeze`/`load` the backlog (with consumed markers) to JSON
//!   so a later process can resume where this one stopped
//!
//! ## Example
//!
//! ```rust,ignore
//! use indras_backlog::{LoadMode, Sequence, SequenceOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = SequenceOptions::builder().max_delay_ms(100).build()?;
//!     let seq = Sequence::new(vec![1, 2], options)?;
//!
//!     assert_eq!(seq.get().await, Some(1));
//!     seq.update([3]);
//!     assert_eq!(seq.get().await, Some(2));
//!
//!     // Hand the remainder over to a future process
//!     let path = seq.freeze(None).await?;
//!
//!     let resumed = Sequence::new(vec![0], SequenceOptions::default())?;
//!     resumed.load(Some(&path), LoadMode::Replace).await?;
//!     assert_eq!(resumed.get().await, Some(3));
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod jitter;
pub mod record;
pub mod scratch;
pub mod sequence;
pub mod snapshot;
pub mod store;
pub mod waiter;

// Re-exports
pub use config::{SequenceConfig, SequenceOptions, SequenceOptionsBuilder};
pub use error::{BacklogError, BacklogResult, ConfigError};
pub use jitter::Jitter;
pub use record::Record;
pub use scratch::{FsScratchDir, ScratchDir};
pub use sequence::{FilterFn, Sequence};
pub use snapshot::{LoadMode, LoadSummary, SnapshotCodec};
pub use store::BacklogStore;
pub use waiter::{PollingWaiter, WaitOutcome};

#[cfg(test)]
mod tests {
    use super::*;

    /// ScratchDir must stay object-safe
    fn _assert_object_safe(_: &dyn ScratchDir) {}

    fn _assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_sequence_is_send_sync() {
        _assert_send_sync::<Sequence<String>>();
        _assert_send_sync::<SequenceOptions>();
    }

    #[tokio::test]
    async fn test_sequence_shared_across_tasks() {
        let seq = Sequence::new(vec![1u32, 2, 3], SequenceOptions::default()).unwrap();
        let consumer = seq.clone();
        let handle = tokio::spawn(async move { consumer.get().await });
        assert_eq!(handle.await.unwrap(), Some(1));
        assert_eq!(seq.index(), 1);
    }
}
