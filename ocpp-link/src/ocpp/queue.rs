//! Outbound queue
//!
//! Messages wait here in arrival order until the connection drains them.
//! The queue itself does no locking; the owning connection guards it.

use std::collections::VecDeque;

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::Value;

use super::descriptor::{CallKind, MessageDescriptor, OcppMessage};
use super::messages::{encode_parts, Envelope};
use crate::error::OcppError;

/// Length of generated correlation ids
pub const CORRELATION_ID_LEN: usize = 20;

/// Random alphanumeric correlation id
pub fn generate_correlation_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(CORRELATION_ID_LEN)
        .map(char::from)
        .collect()
}

/// A message waiting to be transmitted
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub correlation_id: String,
    pub descriptor: MessageDescriptor,
    pub payload: Value,
}

impl OutboundMessage {
    pub fn new(descriptor: MessageDescriptor, correlation_id: impl Into<String>, payload: Value) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            descriptor,
            payload,
        }
    }

    /// Wrap a typed message under a fresh correlation id
    pub fn from_message<M: OcppMessage>(message: &M) -> Result<Self, OcppError> {
        Self::with_id(message, generate_correlation_id())
    }

    /// Wrap a typed message under a caller-chosen correlation id
    pub fn with_id<M: OcppMessage>(
        message: &M,
        correlation_id: impl Into<String>,
    ) -> Result<Self, OcppError> {
        Ok(Self::new(
            M::DESCRIPTOR,
            correlation_id,
            serde_json::to_value(message)?,
        ))
    }

    /// Whether the peer is expected to answer this message
    pub fn expects_reply(&self) -> bool {
        self.descriptor.kind == CallKind::Request
    }

    pub fn regenerate_id(&mut self) {
        self.correlation_id = generate_correlation_id();
    }

    pub fn encode(&self) -> Result<Envelope, OcppError> {
        encode_parts(self.descriptor, &self.correlation_id, self.payload.clone())
    }
}

/// FIFO of not-yet-sent messages
#[derive(Debug, Default)]
pub struct OutboundQueue {
    items: VecDeque<OutboundMessage>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append at the tail
    pub fn push(&mut self, message: OutboundMessage) {
        self.items.push_back(message);
    }

    /// Remove the head
    pub fn pop(&mut self) -> Option<OutboundMessage> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, correlation_id: &str) -> bool {
        self.items.iter().any(|m| m.correlation_id == correlation_id)
    }

    /// Remove everything, head first
    pub fn clear(&mut self) -> Vec<OutboundMessage> {
        self.items.drain(..).collect()
    }
}
