use crate::types::ActionRecord;
use std::collections::VecDeque;

/// Default number of records fed back into the prompt.
pub const DEFAULT_HISTORY_CAPACITY: usize = 5;

/// Fixed-capacity FIFO of the most recent action records.
#[derive(Debug, Clone)]
pub struct ActionHistory {
    records: VecDeque<ActionRecord>,
    capacity: usize,
}

impl Default for ActionHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl ActionHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Append a record, evicting the oldest once over capacity.
    pub fn push(&mut self, record: ActionRecord) {
        self.records.push_back(record);
        while self.records.len() > self.capacity {
            self.records.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn last(&self) -> Option<&ActionRecord> {
        self.records.back()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &ActionRecord> {
        self.records.iter()
    }

    pub fn messages_most_recent_first(&self) -> Vec<&str> {
        self.records.iter().rev().map(|r| r.message.as_str()).collect()
    }
}
