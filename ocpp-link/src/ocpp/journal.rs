//! Traffic journal
//!
//! Keeps the most recent transmitted and received frames for diagnostics.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

/// Default number of frames kept per direction
pub const DEFAULT_JOURNAL_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Tx,
    Rx,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    pub direction: Direction,
    pub at: DateTime<Utc>,
    /// Action, error code or `CallResult`
    pub label: String,
    pub correlation_id: String,
    pub frame: String,
}

/// Two bounded rings, one per direction
#[derive(Debug, Clone)]
pub struct Journal {
    tx: VecDeque<JournalEntry>,
    rx: VecDeque<JournalEntry>,
    capacity: usize,
}

impl Default for Journal {
    fn default() -> Self {
        Self::new(DEFAULT_JOURNAL_CAPACITY)
    }
}

impl Journal {
    pub fn new(capacity: usize) -> Self {
        Self {
            tx: VecDeque::with_capacity(capacity),
            rx: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(
        &mut self,
        direction: Direction,
        label: impl Into<String>,
        correlation_id: impl Into<String>,
        frame: &[u8],
    ) {
        if self.capacity == 0 {
            return;
        }

        let ring = match direction {
            Direction::Tx => &mut self.tx,
            Direction::Rx => &mut self.rx,
        };
        if ring.len() == self.capacity {
            ring.pop_front();
        }
        ring.push_back(JournalEntry {
            direction,
            at: Utc::now(),
            label: label.into(),
            correlation_id: correlation_id.into(),
            frame: String::from_utf8_lossy(frame).into_owned(),
        });
    }

    /// Transmitted frames, oldest first
    pub fn transmitted(&self) -> impl Iterator<Item = &JournalEntry> {
        self.tx.iter()
    }

    /// Received frames, oldest first
    pub fn received(&self) -> impl Iterator<Item = &JournalEntry> {
        self.rx.iter()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
