//! Append-only backlog store
//!
//! Holds the ordered records of a sequence. Records are only ever added at
//! the tail; the single exception is a replace-mode snapshot load, which swaps
//! out the whole sequence at once.

use crate::record::Record;

/// Ordered, append-only collection of backlog records
#[derive(Debug, Clone)]
pub struct BacklogStore<T> {
    records: Vec<Record<T>>,
}

impl<T> Default for BacklogStore<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
        }
    }
}

impl<T> BacklogStore<T> {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding the given values, all unconsumed
    pub fn from_values(values: impl IntoIterator<Item = T>) -> Self {
        Self {
            records: values.into_iter().map(Record::new).collect(),
        }
    }

    /// Create a store from already-wrapped records (e.g. a decoded snapshot)
    pub fn from_records(records: Vec<Record<T>>) -> Self {
        Self { records }
    }

    /// Wrap and append values at the tail, returning how many were added
    pub fn append(&mut self, values: impl IntoIterator<Item = T>) -> usize {
        self.append_records(values.into_iter().map(Record::new))
    }

    /// Append pre-wrapped records at the tail, returning how many were added
    pub fn append_records(&mut self, records: impl IntoIterator<Item = Record<T>>) -> usize {
        let before = self.records.len();
        self.records.extend(records);
        self.records.len() - before
    }

    /// Record at `index`, if any
    pub fn read_at(&self, index: usize) -> Option<&Record<T>> {
        self.records.get(index)
    }

    /// Mark the record at `index` consumed and return it
    pub(crate) fn consume_at(&mut self, index: usize) -> Option<&Record<T>> {
        let record = self.records.get_mut(index)?;
        record.mark_consumed();
        Some(record)
    }

    /// Number of records ever appended
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records in append order
    pub fn records(&self) -> &[Record<T>] {
        &self.records
    }

    /// Records from `index` to the tail
    pub fn tail_from(&self, index: usize) -> &[Record<T>] {
        self.records.get(index..).unwrap_or(&[])
    }

    /// Position of the first unconsumed record, or `len()` if none remain
    pub fn resume_index(&self) -> usize {
        resume_index(&self.records)
    }

    /// Consume the store, returning its records
    pub fn into_records(self) -> Vec<Record<T>> {
        self.records
    }
}

/// Position of the first unconsumed record in `records`
pub fn resume_index<T>(records: &[Record<T>]) -> usize {
    records
        .iter()
        .position(|r| !r.is_consumed())
        .unwrap_or(records.len())
}
