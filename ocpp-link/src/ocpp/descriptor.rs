//! Message descriptors
//!
//! Each concrete OCPP message type is bound to exactly one
//! [`MessageDescriptor`] through the [`OcppMessage::DESCRIPTOR`] associated
//! constant. Requests additionally name the response type the CSMS (or the
//! charge point) answers with, so a pending call always knows how to decode
//! its reply.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Role of a frame on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Request = 2,
    Response = 3,
    Error = 4,
}

impl CallKind {
    /// Wire number of this call kind
    pub fn as_i64(self) -> i64 {
        self as i64
    }

    /// Map a wire number back to a call kind
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            2 => Some(CallKind::Request),
            3 => Some(CallKind::Response),
            4 => Some(CallKind::Error),
            _ => None,
        }
    }
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallKind::Request => write!(f, "CALL"),
            CallKind::Response => write!(f, "CALLRESULT"),
            CallKind::Error => write!(f, "CALLERROR"),
        }
    }
}

/// Static metadata bound to a message type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageDescriptor {
    /// OCPP action name, shared by a request and its response
    pub action: &'static str,
    pub kind: CallKind,
}

impl MessageDescriptor {
    /// Descriptor of every CALLERROR payload
    pub const CALL_ERROR: Self = Self {
        action: "CallError",
        kind: CallKind::Error,
    };

    pub const fn request(action: &'static str) -> Self {
        Self {
            action,
            kind: CallKind::Request,
        }
    }

    pub const fn response(action: &'static str) -> Self {
        Self {
            action,
            kind: CallKind::Response,
        }
    }

    /// Descriptor of the response that answers this request
    pub const fn response_descriptor(&self) -> Self {
        Self::response(self.action)
    }
}

impl fmt::Display for MessageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            CallKind::Request => write!(f, "{}", self.action),
            CallKind::Response => write!(f, "{}Response", self.action),
            CallKind::Error => write!(f, "{}", self.action),
        }
    }
}

/// A message type that can travel inside an OCPP frame
pub trait OcppMessage: Serialize + DeserializeOwned + Send + Sync + 'static {
    const DESCRIPTOR: MessageDescriptor;
}

/// A request message and the response type that settles it
pub trait OcppRequest: OcppMessage {
    type Response: OcppMessage;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_kind_numbers() {
        assert_eq!(CallKind::Request.as_i64(), 2);
        assert_eq!(CallKind::Response.as_i64(), 3);
        assert_eq!(CallKind::Error.as_i64(), 4);

        assert_eq!(CallKind::from_i64(3), Some(CallKind::Response));
        assert_eq!(CallKind::from_i64(5), None);
        assert_eq!(CallKind::from_i64(1), None);
    }

    #[test]
    fn test_descriptor_display() {
        let request = MessageDescriptor::request("Authorize");
        assert_eq!(request.to_string(), "Authorize");
        assert_eq!(request.response_descriptor().to_string(), "AuthorizeResponse");
        assert_eq!(MessageDescriptor::CALL_ERROR.to_string(), "CallError");
    }
}
