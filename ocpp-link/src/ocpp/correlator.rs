//! Call correlation
//!
//! Tracks every request that is waiting for an answer and matches inbound
//! CALLRESULT/CALLERROR frames back to it. Each id moves
//! `Pending -> Responded | Errored | Abandoned` exactly once; released ids
//! stay in a bounded tombstone ring so late frames can be told apart from
//! frames nobody asked for.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::{Duration, Instant};

use super::descriptor::{CallKind, MessageDescriptor};
use crate::error::OcppError;

/// Default number of released ids remembered
pub const DEFAULT_TOMBSTONES: usize = 1024;

/// Lifecycle of one correlation id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrelationState {
    Pending,
    Responded,
    Errored,
    Abandoned,
}

impl fmt::Display for CorrelationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CorrelationState::Pending => "pending",
            CorrelationState::Responded => "responded",
            CorrelationState::Errored => "errored",
            CorrelationState::Abandoned => "abandoned",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
struct PendingCall {
    descriptor: MessageDescriptor,
    created: Instant,
}

/// Pending request table plus tombstones
#[derive(Debug)]
pub struct Correlator {
    pending: HashMap<String, PendingCall>,
    released: HashMap<String, CorrelationState>,
    released_order: VecDeque<String>,
    tombstone_capacity: usize,
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new(DEFAULT_TOMBSTONES)
    }
}

impl Correlator {
    pub fn new(tombstone_capacity: usize) -> Self {
        Self {
            pending: HashMap::new(),
            released: HashMap::new(),
            released_order: VecDeque::new(),
            tombstone_capacity,
        }
    }

    /// Register `id` as pending for `descriptor`.
    ///
    /// Returns false, leaving the table untouched, if `id` is already pending.
    pub fn register(&mut self, id: &str, descriptor: MessageDescriptor) -> bool {
        if self.pending.contains_key(id) {
            return false;
        }
        self.released.remove(id);
        self.pending.insert(
            id.to_string(),
            PendingCall {
                descriptor,
                created: Instant::now(),
            },
        );
        true
    }

    /// Settle `id` with an inbound frame of `kind`.
    ///
    /// Returns the descriptor of the request being answered.
    pub fn settle(&mut self, id: &str, kind: CallKind) -> Result<MessageDescriptor, OcppError> {
        if let Some(call) = self.pending.remove(id) {
            let state = match kind {
                CallKind::Error => CorrelationState::Errored,
                _ => CorrelationState::Responded,
            };
            self.tombstone(id.to_string(), state);
            return Ok(call.descriptor);
        }

        match self.released.get(id) {
            Some(&state) => Err(OcppError::StaleCorrelation {
                correlation_id: id.to_string(),
                state,
            }),
            None => Err(OcppError::UnsolicitedResponse {
                correlation_id: id.to_string(),
                kind,
            }),
        }
    }

    /// Give up on a single pending id
    pub fn abandon(&mut self, id: &str) -> bool {
        if self.pending.remove(id).is_some() {
            self.tombstone(id.to_string(), CorrelationState::Abandoned);
            true
        } else {
            false
        }
    }

    /// Give up on every pending id, oldest first
    pub fn abandon_all(&mut self) -> Vec<String> {
        let mut calls: Vec<_> = self.pending.drain().collect();
        calls.sort_by_key(|(_, call)| call.created);

        let ids: Vec<String> = calls.into_iter().map(|(id, _)| id).collect();
        for id in &ids {
            self.tombstone(id.clone(), CorrelationState::Abandoned);
        }
        ids
    }

    /// Pending ids created at least `age` ago, oldest first
    pub fn pending_older_than(&self, age: Duration) -> Vec<String> {
        let mut stale: Vec<_> = self
            .pending
            .iter()
            .filter(|(_, call)| call.created.elapsed() >= age)
            .collect();
        stale.sort_by_key(|(_, call)| call.created);
        stale.into_iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn state(&self, id: &str) -> Option<CorrelationState> {
        if self.pending.contains_key(id) {
            Some(CorrelationState::Pending)
        } else {
            self.released.get(id).copied()
        }
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }

    pub fn pending_descriptor(&self, id: &str) -> Option<MessageDescriptor> {
        self.pending.get(id).map(|call| call.descriptor)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn tombstones(&self) -> usize {
        self.released.len()
    }

    fn tombstone(&mut self, id: String, state: CorrelationState) {
        if self.tombstone_capacity == 0 {
            return;
        }
        while self.released_order.len() >= self.tombstone_capacity {
            if let Some(oldest) = self.released_order.pop_front() {
                self.released.remove(&oldest);
            }
        }
        self.released.insert(id.clone(), state);
        self.released_order.push_back(id);
    }
}
