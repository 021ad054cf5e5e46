//! Backlog records
//!
//! A [`Record`] pairs a caller-supplied value with a flag recording whether it
//! has already been handed out. Snapshots serialize records as
//! `{ "consumed": bool, "value": T }`.

use serde::{Deserialize, Serialize};

/// A single backlog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record<T> {
    consumed: bool,
    value: T,
}

impl<T> Record<T> {
    /// Wrap a value as a fresh, unconsumed record
    pub fn new(value: T) -> Self {
        Self {
            consumed: false,
            value,
        }
    }

    /// Whether this record has been yielded by a successful pull
    pub fn is_consumed(&self) -> bool {
        self.consumed
    }

    /// Borrow the payload
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Take the payload
    pub fn into_value(self) -> T {
        self.value
    }

    /// Flag the record as consumed. There is no way back.
    pub(crate) fn mark_consumed(&mut self) {
        self.consumed = true;
    }
}

impl<T> From<T> for Record<T> {
    fn from(value: T) -> Self {
        Record::new(value)
    }
}
