//! OCPP 1.6 JSON protocol core
//!
//! - `descriptor`: per message type metadata (action, call kind)
//! - `types`: closed value sets and composite payload types
//! - `catalog`: concrete request/response messages and the descriptor table
//! - `messages`: frame encoding (CALL, CALLRESULT, CALLERROR)
//! - `queue`: outbound FIFO
//! - `correlator`: pending request tracking
//! - `observer`: typed per message subscriptions
//! - `journal`: recent traffic
//! - `transport`: the frame sink seam
//! - `connection`: the dispatcher tying the above together
//! - `session`: registration and clock state
//! - `client`: WebSocket driver

pub mod catalog;
pub mod client;
pub mod connection;
pub mod correlator;
pub mod descriptor;
pub mod journal;
pub mod messages;
pub mod observer;
pub mod queue;
pub mod session;
pub mod transport;
pub mod types;

pub use catalog::*;
pub use client::{build_ocpp_url, OcppClient, OCPP_SUBPROTOCOL};
pub use connection::{CloseReport, Connection, ConnectionOptions, Dispatched};
pub use correlator::{CorrelationState, Correlator};
pub use descriptor::{CallKind, MessageDescriptor, OcppMessage, OcppRequest};
pub use journal::{Direction, Journal, JournalEntry};
pub use messages::{encode, Envelope, ProtocolError};
pub use observer::{MessageObserved, Observer, ObserverRegistry, SubscriptionId};
pub use queue::{OutboundMessage, OutboundQueue};
pub use session::{Session, SessionEvent, SessionState};
pub use transport::{ChannelTransport, Transport};
pub use types::*;
