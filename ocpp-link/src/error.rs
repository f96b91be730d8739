//! Error types for the OCPP link
//!
//! Every failure in the framing, correlation and dispatch core surfaces as an
//! [`OcppError`]. None of them are fatal to the connection.

use thiserror::Error;

use crate::ocpp::descriptor::{CallKind, MessageDescriptor};
use crate::ocpp::correlator::CorrelationState;

/// A wire string that is not a member of a closed value set.
///
/// The display form is `Unexpected <EnumName>: <value>`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unexpected {enum_name}: {value}")]
pub struct EnumDecodeError {
    pub enum_name: &'static str,
    pub value: String,
}

impl EnumDecodeError {
    pub fn new(enum_name: &'static str, value: impl Into<String>) -> Self {
        Self {
            enum_name,
            value: value.into(),
        }
    }
}

/// Failures reported by a [`Transport`](crate::ocpp::transport::Transport)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("transport is not connected")]
    NotConnected,

    #[error("outbound buffer is full")]
    Backpressure,

    #[error("transport I/O error: {0}")]
    Io(String),
}

/// Errors in OCPP message handling
#[derive(Debug, Error)]
pub enum OcppError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("No descriptor registered for {descriptor} ({kind})", kind = .descriptor.kind)]
    DescriptorMissing { descriptor: MessageDescriptor },

    #[error("Unknown message kind: {0}")]
    UnknownMessageKind(String),

    #[error("Unsolicited {kind} for correlation id {correlation_id}")]
    UnsolicitedResponse {
        correlation_id: String,
        kind: CallKind,
    },

    #[error("Correlation id {correlation_id} is already {state}")]
    StaleCorrelation {
        correlation_id: String,
        state: CorrelationState,
    },

    #[error("Invalid {descriptor} payload: {reason}")]
    InvalidResponsePayload {
        descriptor: MessageDescriptor,
        reason: String,
    },

    #[error("Invalid {action} request payload: {reason}")]
    InvalidRequestPayload { action: String, reason: String },

    #[error(transparent)]
    EnumDecode(#[from] EnumDecodeError),

    #[error("Transmit of batch message {index} ({correlation_id}) failed: {source}")]
    TransmitFailed {
        index: usize,
        correlation_id: String,
        #[source]
        source: Box<OcppError>,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Connection closed")]
    ConnectionClosed,
}
