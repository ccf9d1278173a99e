//! Bounded log of recent searches, newest first.

use chrono::Utc;
use std::collections::VecDeque;

use crate::models::SearchHistoryEntry;

pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

#[derive(Debug, Clone)]
pub struct SearchHistory {
    entries: VecDeque<SearchHistoryEntry>,
    capacity: usize,
}

impl Default for SearchHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl SearchHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Rebuild from persisted entries (newest first), dropping any beyond
    /// capacity.
    pub fn from_entries(entries: Vec<SearchHistoryEntry>, capacity: usize) -> Self {
        let mut history = Self::new(capacity);
        history.entries.extend(entries.into_iter().take(history.capacity));
        history
    }

    /// Record a search at the front, evicting the oldest entry when full.
    pub fn record(&mut self, query: &str, result_count: usize) {
        self.entries.push_front(SearchHistoryEntry {
            query: query.to_string(),
            result_count,
            timestamp: Utc::now(),
        });
        self.entries.truncate(self.capacity);
    }

    /// Up to `limit` entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<SearchHistoryEntry> {
        self.entries.iter().take(limit).cloned().collect()
    }

    pub fn entries(&self) -> Vec<SearchHistoryEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
