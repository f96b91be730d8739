//! OCPP 1.6 JSON frame encoding
//!
//! Every frame is a JSON array whose first element is the call kind:
//! - CALL: [2, messageId, action, payload]
//! - CALLRESULT: [3, messageId, payload]
//! - CALLERROR: [4, messageId, errorCode, errorDescription, errorDetails]
//!
//! A CALLRESULT does not name its action, so it can only be resolved against
//! the request it answers (see [`Envelope::decode_response`]).

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::catalog;
use super::descriptor::{CallKind, MessageDescriptor, OcppMessage};
use super::types::ErrorCode;
use crate::error::OcppError;

/// One OCPP frame, payload still untyped
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Call {
        correlation_id: String,
        action: String,
        payload: Value,
    },
    CallResult {
        correlation_id: String,
        payload: Value,
    },
    CallError {
        correlation_id: String,
        error_code: String,
        error_description: String,
        error_details: Value,
    },
}

impl Envelope {
    /// CALLERROR frame with empty details
    pub fn call_error(
        correlation_id: impl Into<String>,
        error_code: ErrorCode,
        error_description: impl Into<String>,
    ) -> Self {
        Envelope::CallError {
            correlation_id: correlation_id.into(),
            error_code: error_code.as_str().to_string(),
            error_description: error_description.into(),
            error_details: empty_object(),
        }
    }

    pub fn kind(&self) -> CallKind {
        match self {
            Envelope::Call { .. } => CallKind::Request,
            Envelope::CallResult { .. } => CallKind::Response,
            Envelope::CallError { .. } => CallKind::Error,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Envelope::Call { correlation_id, .. }
            | Envelope::CallResult { correlation_id, .. }
            | Envelope::CallError { correlation_id, .. } => correlation_id,
        }
    }

    /// Action name for CALL frames, error code for CALLERROR frames
    pub fn label(&self) -> &str {
        match self {
            Envelope::Call { action, .. } => action,
            Envelope::CallResult { .. } => "CallResult",
            Envelope::CallError { error_code, .. } => error_code,
        }
    }

    /// The frame as a JSON array
    pub fn to_value(&self) -> Value {
        match self {
            Envelope::Call {
                correlation_id,
                action,
                payload,
            } => serde_json::json!([CallKind::Request.as_i64(), correlation_id, action, payload]),
            Envelope::CallResult {
                correlation_id,
                payload,
            } => serde_json::json!([CallKind::Response.as_i64(), correlation_id, payload]),
            Envelope::CallError {
                correlation_id,
                error_code,
                error_description,
                error_details,
            } => serde_json::json!([
                CallKind::Error.as_i64(),
                correlation_id,
                error_code,
                error_description,
                error_details
            ]),
        }
    }

    /// Serialize to the wire format
    pub fn to_bytes(&self) -> Result<Vec<u8>, OcppError> {
        Ok(serde_json::to_vec(&self.to_value())?)
    }

    /// Parse a frame from JSON bytes.
    ///
    /// Shape problems (not an array, wrong arity, wrong element types) are
    /// `MalformedFrame`; a call kind other than 2, 3 or 4 is
    /// `UnknownMessageKind`.
    pub fn parse(bytes: &[u8]) -> Result<Self, OcppError> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| OcppError::MalformedFrame(format!("invalid JSON: {}", e)))?;

        let Value::Array(mut array) = value else {
            return Err(OcppError::MalformedFrame("frame is not a JSON array".into()));
        };

        let Some(first) = array.first() else {
            return Err(OcppError::MalformedFrame("frame is empty".into()));
        };

        let kind = first
            .as_i64()
            .and_then(CallKind::from_i64)
            .ok_or_else(|| OcppError::UnknownMessageKind(first.to_string()))?;

        let expected = match kind {
            CallKind::Request => 4,
            CallKind::Response => 3,
            CallKind::Error => 5,
        };
        if array.len() != expected {
            return Err(OcppError::MalformedFrame(format!(
                "{} frame must have {} elements, got {}",
                kind,
                expected,
                array.len()
            )));
        }

        let correlation_id = string_at(&array, 1, "message id")?;

        match kind {
            CallKind::Request => {
                let action = string_at(&array, 2, "action")?;
                Ok(Envelope::Call {
                    correlation_id,
                    action,
                    payload: array.swap_remove(3),
                })
            }
            CallKind::Response => Ok(Envelope::CallResult {
                correlation_id,
                payload: array.swap_remove(2),
            }),
            CallKind::Error => {
                let error_code = string_at(&array, 2, "error code")?;
                let error_description = string_at(&array, 3, "error description")?;
                Ok(Envelope::CallError {
                    correlation_id,
                    error_code,
                    error_description,
                    error_details: array.swap_remove(4),
                })
            }
        }
    }

    /// Resolve a CALL or CALLERROR frame to its descriptor and payload.
    ///
    /// CALLERROR payloads are rebuilt as a [`ProtocolError`] object.
    pub fn decode(&self) -> Result<(MessageDescriptor, Value), OcppError> {
        match self {
            Envelope::Call {
                action, payload, ..
            } => {
                let entry = catalog::lookup(action, CallKind::Request)
                    .ok_or_else(|| OcppError::UnknownMessageKind(action.clone()))?;
                Ok((entry.descriptor, payload.clone()))
            }
            Envelope::CallError {
                error_code,
                error_description,
                error_details,
                ..
            } => {
                let error_code: ErrorCode = error_code
                    .parse()
                    .map_err(|_| OcppError::UnknownMessageKind(error_code.clone()))?;
                let error = ProtocolError {
                    error_code,
                    error_description: error_description.clone(),
                    error_details: error_details.clone(),
                };
                Ok((MessageDescriptor::CALL_ERROR, serde_json::to_value(error)?))
            }
            Envelope::CallResult { correlation_id, .. } => Err(OcppError::MalformedFrame(format!(
                "CALLRESULT {} carries no action and must be decoded against its request",
                correlation_id
            ))),
        }
    }

    /// Resolve a CALLRESULT or CALLERROR frame answering `request`
    pub fn decode_response(
        &self,
        request: MessageDescriptor,
    ) -> Result<(MessageDescriptor, Value), OcppError> {
        match self {
            Envelope::CallResult { payload, .. } => {
                let descriptor = request.response_descriptor();
                if !catalog::is_registered(&descriptor) {
                    return Err(OcppError::DescriptorMissing { descriptor });
                }
                Ok((descriptor, payload.clone()))
            }
            Envelope::CallError { .. } => self.decode(),
            Envelope::Call { correlation_id, .. } => Err(OcppError::MalformedFrame(format!(
                "CALL {} is not a response",
                correlation_id
            ))),
        }
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} [{}]", self.kind(), self.label(), self.correlation_id())
    }
}

/// Structured CALLERROR content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolError {
    pub error_code: ErrorCode,
    pub error_description: String,
    #[serde(default = "empty_object")]
    pub error_details: Value,
}

impl ProtocolError {
    pub fn new(error_code: ErrorCode, error_description: impl Into<String>) -> Self {
        Self {
            error_code,
            error_description: error_description.into(),
            error_details: empty_object(),
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error_code, self.error_description)
    }
}

/// Wrap a typed message in a frame.
///
/// Fails with `DescriptorMissing` if the type is not in the catalog.
pub fn encode<M: OcppMessage>(message: &M, correlation_id: &str) -> Result<Envelope, OcppError> {
    encode_parts(M::DESCRIPTOR, correlation_id, serde_json::to_value(message)?)
}

/// Wrap an already serialized payload in a frame
pub fn encode_parts(
    descriptor: MessageDescriptor,
    correlation_id: &str,
    payload: Value,
) -> Result<Envelope, OcppError> {
    if !catalog::is_registered(&descriptor) {
        return Err(OcppError::DescriptorMissing { descriptor });
    }

    let correlation_id = correlation_id.to_string();
    Ok(match descriptor.kind {
        CallKind::Request => Envelope::Call {
            correlation_id,
            action: descriptor.action.to_string(),
            payload,
        },
        CallKind::Response => Envelope::CallResult {
            correlation_id,
            payload,
        },
        CallKind::Error => {
            let error: ProtocolError = serde_json::from_value(payload)?;
            Envelope::CallError {
                correlation_id,
                error_code: error.error_code.as_str().to_string(),
                error_description: error.error_description,
                error_details: error.error_details,
            }
        }
    })
}

/// Best-effort look at a frame that failed to parse.
///
/// Returns the message id when the frame could be a CALL (kind 2 or an
/// unrecognised kind) so the sender can be answered with a CALLERROR.
/// Frames that claim to be responses never get a reply.
pub(crate) fn reply_target(bytes: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(bytes).ok()?;
    let array = value.as_array()?;
    let id = array.get(1)?.as_str()?;

    match array.first().and_then(Value::as_i64) {
        Some(3) | Some(4) => None,
        _ => Some(id.to_string()),
    }
}

fn string_at(array: &[Value], index: usize, what: &str) -> Result<String, OcppError> {
    array[index]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| OcppError::MalformedFrame(format!("{} must be a string", what)))
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}
