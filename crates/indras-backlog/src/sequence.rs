//! Pull state machine
//!
//! A [`Sequence`] owns a backlog, a cursor into it and a terminal flag. Each
//! call to [`Sequence::get`] optionally backs off, then runs a read-or-wait
//! loop:
//!
//! 1. read the record at the cursor; if present, mark it consumed, advance
//!    the cursor and return it
//! 2. otherwise park on the [`PollingWaiter`] until a record is readable at
//!    the cursor (go to 1), the sequence is stopped (return `None`), or the
//!    wait budget runs out (finish the sequence, return `None`)
//!
//! The cursor read-and-advance happens under a lock that is never held across
//! an `.await`, so any number of cloned handles can pull concurrently without
//! two of them ever receiving the same record.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;
use parking_lot::Mutex;
use tracing::{debug, info, trace};

use crate::config::SequenceOptions;
use crate::error::ConfigError;
use crate::record::Record;
use crate::store::BacklogStore;
use crate::waiter::{PollingWaiter, WaitOutcome};

/// Hook applied to incoming records on [`Sequence::update`]
///
/// Receives the current backlog and the freshly wrapped records and returns
/// the records that should actually be appended.
pub type FilterFn<T> = Arc<dyn Fn(&[Record<T>], Vec<Record<T>>) -> Vec<Record<T>> + Send + Sync>;

struct State<T> {
    store: BacklogStore<T>,
    cursor: usize,
    done: bool,
    filter: Option<FilterFn<T>>,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    options: SequenceOptions,
    waiter: PollingWaiter,
}

enum Pull<T> {
    Ready(Record<T>),
    Exhausted,
    Done,
}

/// A growable, asynchronously consumed sequence of values
///
/// Cloning a `Sequence` yields another handle to the same backlog.
pub struct Sequence<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Sequence<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for Sequence<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Sequence")
            .field("len", &state.store.len())
            .field("cursor", &state.cursor)
            .field("done", &state.done)
            .field("filtered", &state.filter.is_some())
            .finish_non_exhaustive()
    }
}

impl<T> Sequence<T> {
    pub(crate) fn from_parts(store: BacklogStore<T>, cursor: usize, options: SequenceOptions) -> Self {
        let waiter = options.waiter();
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    cursor: cursor.min(store.len()),
                    store,
                    done: false,
                    filter: None,
                }),
                options,
                waiter,
            }),
        }
    }

    /// Create a sequence over `values`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyBacklog`] if `values` is empty.
    pub fn new(
        values: impl IntoIterator<Item = T>,
        options: SequenceOptions,
    ) -> Result<Self, ConfigError> {
        let store = BacklogStore::from_values(values);
        if store.is_empty() {
            return Err(ConfigError::EmptyBacklog);
        }
        debug!(len = store.len(), "Created sequence");
        Ok(Self::from_parts(store, 0, options))
    }

    /// Create a sequence holding a single value
    pub fn from_value(value: T, options: SequenceOptions) -> Self {
        Self::from_parts(BacklogStore::from_values([value]), 0, options)
    }

    /// Install a filter applied to every subsequent [`update`](Self::update)
    pub fn set_filter<F>(&self, filter: F)
    where
        F: Fn(&[Record<T>], Vec<Record<T>>) -> Vec<Record<T>> + Send + Sync + 'static,
    {
        self.shared.state.lock().filter = Some(Arc::new(filter));
    }

    /// Builder-style [`set_filter`](Self::set_filter)
    pub fn with_filter<F>(self, filter: F) -> Self
    where
        F: Fn(&[Record<T>], Vec<Record<T>>) -> Vec<Record<T>> + Send + Sync + 'static,
    {
        self.set_filter(filter);
        self
    }

    /// Remove any installed filter
    pub fn clear_filter(&self) {
        self.shared.state.lock().filter = None;
    }

    /// Append values to the backlog, returning how many were added
    ///
    /// Ignored once the sequence has finished. The filter, if any, runs while
    /// the backlog is locked and must not call back into this sequence.
    pub fn update(&self, values: impl IntoIterator<Item = T>) -> usize {
        let mut state = self.shared.state.lock();
        if state.done {
            debug!("Ignoring update on finished sequence");
            return 0;
        }

        let incoming: Vec<Record<T>> = values.into_iter().map(Record::new).collect();
        let offered = incoming.len();
        let incoming = match state.filter.clone() {
            Some(filter) => filter(state.store.records(), incoming),
            None => incoming,
        };

        let appended = state.store.append_records(incoming);
        debug!(
            offered = offered,
            appended = appended,
            len = state.store.len(),
            "Updated backlog"
        );
        appended
    }

    /// Append a single value
    pub fn update_one(&self, value: T) -> usize {
        self.update(std::iter::once(value))
    }

    /// Finish the sequence. Idempotent.
    ///
    /// Pending and future pulls return `None`; future updates are ignored.
    /// A back-off delay already in progress still runs to completion.
    pub fn stop(&self) {
        let mut state = self.shared.state.lock();
        if !state.done {
            state.done = true;
            info!(cursor = state.cursor, len = state.store.len(), "Sequence stopped");
        }
    }

    /// Whether the sequence has finished
    pub fn is_done(&self) -> bool {
        self.shared.state.lock().done
    }

    /// Cursor position (index of the next record to hand out)
    pub fn index(&self) -> usize {
        self.shared.state.lock().cursor
    }

    /// Number of records in the backlog, consumed or not
    pub fn len(&self) -> usize {
        self.shared.state.lock().store.len()
    }

    /// Whether the backlog holds no records
    pub fn is_empty(&self) -> bool {
        self.shared.state.lock().store.is_empty()
    }

    /// Number of records not yet handed out
    pub fn remaining(&self) -> usize {
        let state = self.shared.state.lock();
        state.store.len().saturating_sub(state.cursor)
    }

    /// Options this sequence was built with
    pub fn options(&self) -> &SequenceOptions {
        &self.shared.options
    }

    fn try_pull(&self) -> Pull<T>
    where
        T: Clone,
    {
        let mut state = self.shared.state.lock();
        if state.done {
            return Pull::Done;
        }

        let cursor = state.cursor;
        match state.store.consume_at(cursor).cloned() {
            Some(record) => {
                state.cursor += 1;
                trace!(cursor = cursor, "Pulled record");
                Pull::Ready(record)
            }
            None => Pull::Exhausted,
        }
    }

    fn finish(&self) {
        let mut state = self.shared.state.lock();
        if !state.done {
            state.done = true;
            info!(
                cursor = state.cursor,
                len = state.store.len(),
                "Backlog drained, sequence finished"
            );
        }
    }

    /// Stop the sequence and copy out every record
    pub(crate) fn halt_and_collect(&self) -> (Vec<Record<T>>, usize)
    where
        T: Clone,
    {
        let mut state = self.shared.state.lock();
        state.done = true;
        (state.store.records().to_vec(), state.cursor)
    }

    /// Swap in a whole new backlog, resuming at its first unconsumed record
    pub(crate) fn replace(&self, records: Vec<Record<T>>) -> usize {
        let mut state = self.shared.state.lock();
        let store = BacklogStore::from_records(records);
        state.cursor = store.resume_index();
        state.store = store;
        state.done = false;
        state.cursor
    }

    /// Append loaded records at the tail; `None` if the sequence has finished
    pub(crate) fn append_loaded(&self, records: Vec<Record<T>>) -> Option<usize> {
        let mut state = self.shared.state.lock();
        if state.done {
            return None;
        }
        Some(state.store.append_records(records))
    }
}

impl<T: Clone> Sequence<T> {
    /// Copy of the whole backlog, in append order
    pub fn arr(&self) -> Vec<Record<T>> {
        self.shared.state.lock().store.records().to_vec()
    }

    /// Values not yet handed out, in the order they will be pulled
    pub fn pending(&self) -> Vec<T> {
        let state = self.shared.state.lock();
        state
            .store
            .tail_from(state.cursor)
            .iter()
            .map(|r| r.value().clone())
            .collect()
    }
}

impl<T: Clone + Send + 'static> Sequence<T> {
    /// Pull the next value
    ///
    /// Returns `None` once the sequence has finished: either it was stopped,
    /// or the backlog stayed exhausted for the whole polling budget.
    pub async fn get(&self) -> Option<T> {
        self.get_record().await.map(Record::into_value)
    }

    /// Pull the next record (always flagged consumed)
    pub async fn get_record(&self) -> Option<Record<T>> {
        if self.is_done() {
            trace!("Pull on finished sequence");
            return None;
        }

        if let Some(jitter) = self.shared.options.back_off_delay() {
            let delay = jitter.sample();
            trace!(delay_ms = delay.as_millis() as u64, "Backing off before pull");
            tokio::time::sleep(delay).await;
        }

        loop {
            match self.try_pull() {
                Pull::Ready(record) => return Some(record),
                Pull::Done => return None,
                Pull::Exhausted => {}
            }

            let outcome = self
                .shared
                .waiter
                .wait_for_growth(|| self.remaining() > 0, || self.is_done())
                .await;

            match outcome {
                WaitOutcome::Grew => {}
                WaitOutcome::Stopped => return None,
                WaitOutcome::TimedOut => {
                    self.finish();
                    return None;
                }
            }
        }
    }

    /// Stream of values, ending when the sequence finishes
    pub fn stream(&self) -> Pin<Box<dyn Stream<Item = T> + Send>> {
        let sequence = self.clone();
        Box::pin(async_stream::stream! {
            while let Some(value) = sequence.get().await {
                yield value;
            }
        })
    }
}
