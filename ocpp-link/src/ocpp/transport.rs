//! Transport seam
//!
//! The connection core never touches a socket. It hands encoded frames to a
//! [`Transport`] and expects an immediate yes or no.

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::TransportError;

/// Synchronous frame sink
pub trait Transport: Send + Sync {
    /// Hand one encoded frame to the wire. Must not block on I/O.
    fn send(&self, frame: &[u8]) -> Result<(), TransportError>;
}

/// Transport backed by a bounded channel to a socket writer task.
///
/// The writer end is attached while a socket is up and detached when it
/// goes away; sending while detached fails with `NotConnected`.
#[derive(Debug, Default)]
pub struct ChannelTransport {
    sender: Mutex<Option<mpsc::Sender<String>>>,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fresh channel, attach its sending half and return the
    /// receiving half
    pub fn attach(&self, capacity: usize) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(capacity);
        *self.sender.lock() = Some(tx);
        rx
    }

    pub fn detach(&self) {
        self.sender.lock().take();
    }

    pub fn is_attached(&self) -> bool {
        self.sender
            .lock()
            .as_ref()
            .map_or(false, |tx| !tx.is_closed())
    }
}

impl Transport for ChannelTransport {
    fn send(&self, frame: &[u8]) -> Result<(), TransportError> {
        let text = std::str::from_utf8(frame)
            .map_err(|e| TransportError::Io(format!("frame is not UTF-8: {}", e)))?
            .to_string();

        let guard = self.sender.lock();
        let sender = guard.as_ref().ok_or(TransportError::NotConnected)?;
        sender.try_send(text).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TransportError::Backpressure,
            mpsc::error::TrySendError::Closed(_) => TransportError::NotConnected,
        })
    }
}
