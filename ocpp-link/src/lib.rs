//! # OCPP Link
//!
//! Client side OCPP 1.6 JSON protocol layer for a simulated charge point.
//!
//! The crate covers the framing, call correlation and dispatch core of an
//! OCPP connection: typed requests are queued in order, encoded as OCPP-J
//! frames and handed to a [`Transport`](ocpp::Transport); inbound frames are
//! matched back to the request that caused them and fanned out to typed
//! observers.
//!
//! ## Architecture
//!
//! ```text
//! charge point logic
//!       │ send::<R>()            ▲ Observer<M>
//!       ▼                        │
//! ┌──────────────────────────────────────┐
//! │ Connection                           │
//! │  OutboundQueue  Correlator  Journal  │
//! │  ObserverRegistry                    │
//! └──────┬───────────────────────▲───────┘
//!        │ Transport::send       │ on_inbound_frame
//!        ▼                       │
//! ┌──────────────────────────────────────┐
//! │ OcppClient (WebSocket, ocpp1.6)      │
//! └──────────────────────────────────────┘
//!        │
//!        ▼
//!   OCPP CSMS
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use ocpp_link::{ClientConfig, OcppClient};
//! use ocpp_link::ocpp::{AuthorizeResponse, MessageObserved};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::new(
//!         "CP-001",
//!         "ws://localhost:8180/steve/websocket/CentralSystemService",
//!     )
//!     .with_id_tag("TAG-0001");
//!
//!     let client = OcppClient::new(config);
//!     client.connection().observers().subscribe(
//!         |response: &AuthorizeResponse, _: &MessageObserved| {
//!             println!("idTag status: {}", response.id_tag_info.status);
//!         },
//!     );
//!
//!     client.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod ocpp;

pub use config::ClientConfig;
pub use error::{EnumDecodeError, OcppError, TransportError};

// Re-export key types
pub use ocpp::{
    CallKind, Connection, ConnectionOptions, Envelope, MessageDescriptor, MessageObserved,
    OcppClient, OcppMessage, OcppRequest, ObserverRegistry, Transport,
};
