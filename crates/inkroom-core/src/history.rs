//! Bounded, ordered log of drawing operations.

use crate::config::DEFAULT_HISTORY_CAPACITY;
use crate::operation::{Geometry, Operation};
use std::collections::VecDeque;

/// Ordered sequence of operations with FIFO eviction.
///
/// Entries are addressed by position only. `len() <= capacity()` holds after
/// every mutation.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    entries: VecDeque<Operation>,
    capacity: usize,
}

impl Default for HistoryLog {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl HistoryLog {
    /// Create an empty log. A capacity of zero is bumped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Operation> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.entries.iter()
    }

    /// Append, evicting from the front to stay within capacity.
    /// Returns the number of evicted entries.
    pub fn push(&mut self, op: Operation) -> usize {
        self.entries.push_back(op);
        self.enforce_capacity()
    }

    /// Replace the whole log. When `ops` exceeds capacity only the most recent
    /// entries are kept. Returns how many were dropped.
    pub fn replace_all(&mut self, ops: Vec<Operation>) -> usize {
        self.entries = ops.into();
        let dropped = self.enforce_capacity();
        if dropped > 0 {
            log::warn!("Snapshot exceeded capacity, dropped {} oldest entries", dropped);
        }
        dropped
    }

    /// Reset to a single `Clear` sentinel.
    pub fn reset_to_clear(&mut self, sentinel: Operation) {
        self.entries.clear();
        self.entries.push_back(sentinel);
    }

    /// Overwrite the geometry at `index`. Returns false when the index is
    /// absent or the entry is a `Clear`.
    pub fn apply_geometry(&mut self, index: usize, geometry: Geometry) -> bool {
        self.entries
            .get_mut(index)
            .is_some_and(|op| op.set_geometry(geometry))
    }

    /// Remove the given indices, highest first so earlier removals do not
    /// shift later ones. Absent indices and duplicates are skipped.
    /// Returns the indices actually removed, in descending order.
    pub fn remove_indices(&mut self, indices: &[usize]) -> Vec<usize> {
        let mut sorted: Vec<usize> = indices.to_vec();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        sorted.dedup();

        let mut removed = Vec::with_capacity(sorted.len());
        for index in sorted {
            if self.entries.remove(index).is_some() {
                removed.push(index);
            } else {
                log::debug!("Skipping removal of absent index {}", index);
            }
        }
        removed
    }

    /// Deep copy of every entry, in order.
    pub fn snapshot(&self) -> Vec<Operation> {
        self.entries.iter().cloned().collect()
    }

    fn enforce_capacity(&mut self) -> usize {
        let excess = self.entries.len().saturating_sub(self.capacity);
        if excess > 0 {
            self.entries.drain(..excess);
        }
        excess
    }
}
