//! Per-connection dispatcher
//!
//! A [`Connection`] owns the outbound queue, the correlator and the traffic
//! journal behind one shared-state lock, plus the observer registry. The
//! transport lifecycle enters through `on_open`, `on_inbound_frame`,
//! `on_close` and `on_transport_error`.
//!
//! Locking:
//! - `shared` guards queue, correlator and journal. It is never held across
//!   a transport send or an observer callback.
//! - `drain_guard` admits one drain (or pop) at a time.
//! - `inbound_guard` admits one inbound frame at a time.
//!
//! Observers may call `send`, `respond` and `drain_all` from inside a
//! callback. They must not feed frames back into `on_inbound_frame`.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::catalog;
use super::correlator::{CorrelationState, Correlator, DEFAULT_TOMBSTONES};
use super::descriptor::{CallKind, MessageDescriptor, OcppMessage, OcppRequest};
use super::journal::{Direction, Journal, DEFAULT_JOURNAL_CAPACITY};
use super::messages::{reply_target, Envelope, ProtocolError};
use super::observer::{MessageObserved, ObserverRegistry};
use super::queue::{OutboundMessage, OutboundQueue};
use super::transport::Transport;
use super::types::ErrorCode;
use crate::error::{OcppError, TransportError};

/// Tunables for a [`Connection`]
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// Released correlation ids remembered for stale detection
    pub tombstones: usize,
    /// Frames kept per direction in the journal
    pub journal_capacity: usize,
    /// Answer CSMS calls nobody observes with a NotSupported CALLERROR
    pub reject_unobserved_calls: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            tombstones: DEFAULT_TOMBSTONES,
            journal_capacity: DEFAULT_JOURNAL_CAPACITY,
            reject_unobserved_calls: true,
        }
    }
}

impl ConnectionOptions {
    pub fn with_tombstones(mut self, tombstones: usize) -> Self {
        self.tombstones = tombstones;
        self
    }

    pub fn with_journal_capacity(mut self, capacity: usize) -> Self {
        self.journal_capacity = capacity;
        self
    }

    pub fn with_reject_unobserved_calls(mut self, reject: bool) -> Self {
        self.reject_unobserved_calls = reject;
        self
    }
}

/// Outcome of a successfully dispatched inbound frame
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched {
    pub descriptor: MessageDescriptor,
    pub correlation_id: String,
    /// Observers notified
    pub notified: usize,
}

/// What a close threw away
#[derive(Debug, Default)]
pub struct CloseReport {
    /// Correlation ids that were pending, oldest first
    pub abandoned: Vec<String>,
    /// Queued messages that were never transmitted, in queue order
    pub discarded: Vec<OutboundMessage>,
}

struct Shared {
    queue: OutboundQueue,
    correlator: Correlator,
    journal: Journal,
    open: bool,
}

/// One OCPP connection
pub struct Connection {
    transport: Arc<dyn Transport>,
    shared: Mutex<Shared>,
    drain_guard: Mutex<()>,
    inbound_guard: Mutex<()>,
    observers: ObserverRegistry,
    options: ConnectionOptions,
}

impl Connection {
    pub fn new(transport: Arc<dyn Transport>, options: ConnectionOptions) -> Self {
        Self {
            transport,
            shared: Mutex::new(Shared {
                queue: OutboundQueue::new(),
                correlator: Correlator::new(options.tombstones),
                journal: Journal::new(options.journal_capacity),
                open: true,
            }),
            drain_guard: Mutex::new(()),
            inbound_guard: Mutex::new(()),
            observers: ObserverRegistry::new(),
            options,
        }
    }

    pub fn observers(&self) -> &ObserverRegistry {
        &self.observers
    }

    // ------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------

    /// Enqueue a request under a fresh correlation id and return the id
    pub fn send<R: OcppRequest>(&self, request: &R) -> Result<String, OcppError> {
        self.enqueue_request(OutboundMessage::from_message(request)?)
    }

    /// Enqueue a request under `correlation_id`.
    ///
    /// If that id is already pending a fresh one is generated; the id
    /// actually used is returned.
    pub fn send_with_id<R: OcppRequest>(
        &self,
        request: &R,
        correlation_id: impl Into<String>,
    ) -> Result<String, OcppError> {
        self.enqueue_request(OutboundMessage::with_id(request, correlation_id)?)
    }

    /// Enqueue the CALLRESULT answering an inbound call
    pub fn respond<M: OcppMessage>(&self, correlation_id: &str, response: &M) -> Result<(), OcppError> {
        let message = registered(OutboundMessage::with_id(response, correlation_id)?)?;
        self.shared.lock().queue.push(message);
        Ok(())
    }

    /// Enqueue a CALLERROR answering an inbound call
    pub fn respond_error(
        &self,
        correlation_id: &str,
        code: ErrorCode,
        description: impl Into<String>,
    ) -> Result<(), OcppError> {
        self.respond(correlation_id, &ProtocolError::new(code, description))
    }

    fn enqueue_request(&self, message: OutboundMessage) -> Result<String, OcppError> {
        let mut message = registered(message)?;
        let mut shared = self.shared.lock();
        while !shared
            .correlator
            .register(&message.correlation_id, message.descriptor)
        {
            let taken = message.correlation_id.clone();
            message.regenerate_id();
            warn!(
                "Correlation id {} already pending, using {} for {}",
                taken, message.correlation_id, message.descriptor
            );
        }

        let id = message.correlation_id.clone();
        debug!("Queued {} [{}]", message.descriptor, id);
        shared.queue.push(message);
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.shared.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.lock().queue.is_empty()
    }

    /// Transmit the head of the queue.
    ///
    /// Returns the correlation id sent, or `None` if the queue was empty.
    pub fn pop(&self) -> Result<Option<String>, OcppError> {
        let _drain = self.drain_guard.lock();
        match self.next_outbound()? {
            Some(message) => {
                self.transmit_or_release(message, 0).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Transmit every queued message in order.
    ///
    /// Stops at the first failure; the failing message is dropped and its
    /// correlation released, everything behind it stays queued.
    pub fn drain_all(&self) -> Result<usize, OcppError> {
        let _drain = self.drain_guard.lock();
        let mut sent = 0;
        while let Some(message) = self.next_outbound()? {
            self.transmit_or_release(message, sent)?;
            sent += 1;
        }
        if sent > 0 {
            debug!("Drained {} message(s)", sent);
        }
        Ok(sent)
    }

    fn next_outbound(&self) -> Result<Option<OutboundMessage>, OcppError> {
        let mut shared = self.shared.lock();
        if !shared.open {
            return Err(OcppError::ConnectionClosed);
        }
        Ok(shared.queue.pop())
    }

    fn transmit_or_release(&self, message: OutboundMessage, index: usize) -> Result<String, OcppError> {
        match self.transmit(&message) {
            Ok(()) => Ok(message.correlation_id),
            Err(source) => {
                if message.expects_reply() {
                    self.shared.lock().correlator.abandon(&message.correlation_id);
                }
                warn!(
                    "Failed to transmit {} [{}]: {}",
                    message.descriptor, message.correlation_id, source
                );
                Err(OcppError::TransmitFailed {
                    index,
                    correlation_id: message.correlation_id,
                    source: Box::new(source),
                })
            }
        }
    }

    fn transmit(&self, message: &OutboundMessage) -> Result<(), OcppError> {
        let envelope = message.encode()?;
        let bytes = envelope.to_bytes()?;
        self.transport.send(&bytes)?;

        debug!("-> {}", envelope);
        self.shared.lock().journal.record(
            Direction::Tx,
            envelope.label(),
            envelope.correlation_id(),
            &bytes,
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    pub fn on_open(&self) {
        self.shared.lock().open = true;
        info!("Connection open");
    }

    pub fn is_open(&self) -> bool {
        self.shared.lock().open
    }

    /// Decode one inbound frame, settle its correlation and notify observers
    pub fn on_inbound_frame(&self, bytes: &[u8]) -> Result<Dispatched, OcppError> {
        let _inbound = self.inbound_guard.lock();

        let envelope = match Envelope::parse(bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Rejected inbound frame: {}", e);
                self.reject_unparsable(bytes, &e);
                return Err(e);
            }
        };

        debug!("<- {}", envelope);
        self.shared.lock().journal.record(
            Direction::Rx,
            envelope.label(),
            envelope.correlation_id(),
            bytes,
        );

        match envelope.kind() {
            CallKind::Request => self.dispatch_call(&envelope),
            CallKind::Response | CallKind::Error => self.dispatch_reply(&envelope),
        }
    }

    fn dispatch_reply(&self, envelope: &Envelope) -> Result<Dispatched, OcppError> {
        let correlation_id = envelope.correlation_id();

        let request = self
            .shared
            .lock()
            .correlator
            .settle(correlation_id, envelope.kind())
            .map_err(|e| {
                warn!("{}", e);
                e
            })?;

        let (descriptor, payload) = envelope.decode_response(request)?;
        let observed = MessageObserved::new(descriptor, correlation_id);
        let notified = publish(&self.observers, descriptor, payload, &observed)?;

        if descriptor == MessageDescriptor::CALL_ERROR {
            warn!("{} [{}] answered with {}", request, correlation_id, envelope.label());
        }

        Ok(Dispatched {
            descriptor,
            correlation_id: correlation_id.to_string(),
            notified,
        })
    }

    fn dispatch_call(&self, envelope: &Envelope) -> Result<Dispatched, OcppError> {
        let correlation_id = envelope.correlation_id();

        let (descriptor, payload) = match envelope.decode() {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!("Unsupported action {} [{}]", envelope.label(), correlation_id);
                self.reply_error(correlation_id, ErrorCode::NotSupported, "Unsupported action");
                return Err(e);
            }
        };

        let observed = MessageObserved::new(descriptor, correlation_id);
        let notified = match publish(&self.observers, descriptor, payload, &observed) {
            Ok(notified) => notified,
            Err(e) => {
                warn!("{}", e);
                self.reply_error(correlation_id, ErrorCode::FormatViolation, e.to_string());
                return Err(e);
            }
        };

        if notified == 0 && self.options.reject_unobserved_calls {
            info!("No observer for {} [{}], rejecting", descriptor, correlation_id);
            self.reply_error(
                correlation_id,
                ErrorCode::NotSupported,
                format!("{} is not supported", descriptor),
            );
        }

        Ok(Dispatched {
            descriptor,
            correlation_id: correlation_id.to_string(),
            notified,
        })
    }

    fn reject_unparsable(&self, bytes: &[u8], error: &OcppError) {
        let Some(correlation_id) = reply_target(bytes) else {
            return;
        };
        let code = match error {
            OcppError::UnknownMessageKind(_) => ErrorCode::PropertyConstraintViolation,
            _ => ErrorCode::FormatViolation,
        };
        self.reply_error(&correlation_id, code, error.to_string());
    }

    fn reply_error(&self, correlation_id: &str, code: ErrorCode, description: impl Into<String>) {
        if let Err(e) = self.respond_error(correlation_id, code, description) {
            error!("Failed to queue {} reply for {}: {}", code, correlation_id, e);
        }
    }

    /// Abandon pending requests and discard everything still queued
    pub fn on_close(&self, code: Option<u16>, reason: &str) -> CloseReport {
        let mut shared = self.shared.lock();
        shared.open = false;

        let report = CloseReport {
            abandoned: shared.correlator.abandon_all(),
            discarded: shared.queue.clear(),
        };
        drop(shared);

        info!(
            "Connection closed (code {:?}, reason {:?}): {} pending abandoned, {} queued discarded",
            code,
            reason,
            report.abandoned.len(),
            report.discarded.len()
        );
        for message in &report.discarded {
            warn!("Discarded unsent {} [{}]", message.descriptor, message.correlation_id);
        }
        report
    }

    pub fn on_transport_error(&self, err: &TransportError) {
        error!("Transport error: {}", err);
    }

    // ------------------------------------------------------------------
    // Correlation
    // ------------------------------------------------------------------

    /// Give up on one pending request
    pub fn abandon(&self, correlation_id: &str) -> bool {
        let abandoned = self.shared.lock().correlator.abandon(correlation_id);
        if abandoned {
            info!("Abandoned pending request {}", correlation_id);
        }
        abandoned
    }

    pub fn pending_older_than(&self, age: Duration) -> Vec<String> {
        self.shared.lock().correlator.pending_older_than(age)
    }

    /// Whether a message under `correlation_id` is still waiting to be sent
    pub fn is_queued(&self, correlation_id: &str) -> bool {
        self.shared.lock().queue.contains(correlation_id)
    }

    pub fn correlation_state(&self, correlation_id: &str) -> Option<CorrelationState> {
        self.shared.lock().correlator.state(correlation_id)
    }

    pub fn pending_len(&self) -> usize {
        self.shared.lock().correlator.pending_len()
    }

    /// Snapshot of the traffic journal
    pub fn journal(&self) -> Journal {
        self.shared.lock().journal.clone()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = self.shared.lock();
        f.debug_struct("Connection")
            .field("open", &shared.open)
            .field("queued", &shared.queue.len())
            .field("pending", &shared.correlator.pending_len())
            .field("observers", &self.observers)
            .finish()
    }
}

/// Unregistered types are refused before they reach the queue
fn registered(message: OutboundMessage) -> Result<OutboundMessage, OcppError> {
    if catalog::is_registered(&message.descriptor) {
        Ok(message)
    } else {
        Err(OcppError::DescriptorMissing {
            descriptor: message.descriptor,
        })
    }
}

fn publish(
    observers: &ObserverRegistry,
    descriptor: MessageDescriptor,
    payload: serde_json::Value,
    observed: &MessageObserved,
) -> Result<usize, OcppError> {
    let entry = catalog::lookup(descriptor.action, descriptor.kind)
        .ok_or(OcppError::DescriptorMissing { descriptor })?;
    entry.publish(observers, payload, observed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocpp::catalog::*;
    use crate::ocpp::types::{AuthorizationStatus, AvailabilityStatus, AvailabilityType};
    use serde_json::{json, Value};

    /// Records frames; fails the nth send (zero-based) when asked to
    #[derive(Default)]
    struct RecordingTransport {
        frames: Mutex<Vec<Value>>,
        fail_at: Mutex<Option<usize>>,
        attempts: Mutex<usize>,
    }

    impl RecordingTransport {
        fn failing_at(n: usize) -> Self {
            let transport = Self::default();
            *transport.fail_at.lock() = Some(n);
            transport
        }

        fn frames(&self) -> Vec<Value> {
            self.frames.lock().clone()
        }
    }

    impl Transport for RecordingTransport {
        fn send(&self, frame: &[u8]) -> Result<(), TransportError> {
            let mut attempts = self.attempts.lock();
            let attempt = *attempts;
            *attempts += 1;
            if *self.fail_at.lock() == Some(attempt) {
                return Err(TransportError::NotConnected);
            }
            self.frames.lock().push(serde_json::from_slice(frame).unwrap());
            Ok(())
        }
    }

    fn connection() -> (Arc<RecordingTransport>, Connection) {
        let transport = Arc::new(RecordingTransport::default());
        let conn = Connection::new(transport.clone(), ConnectionOptions::default());
        (transport, conn)
    }

    fn counter<M: OcppMessage>(conn: &Connection) -> Arc<Mutex<Vec<M>>>
    where
        M: Clone,
    {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        conn.observers()
            .subscribe(move |message: &M, _: &MessageObserved| sink.lock().push(message.clone()));
        seen
    }

    #[test]
    fn test_empty_after_construction_and_drain() {
        let (_, conn) = connection();
        assert!(conn.is_empty());
        assert_eq!(conn.len(), 0);

        conn.send(&Heartbeat::default()).unwrap();
        assert!(!conn.is_empty());
        assert_eq!(conn.drain_all().unwrap(), 1);
        assert!(conn.is_empty());
    }

    #[test]
    fn test_authorize_settles_and_publishes_once() {
        let (transport, conn) = connection();
        let seen = counter::<AuthorizeResponse>(&conn);

        let id = conn.send_with_id(&Authorize::new("TAG-1"), "abc-1").unwrap();
        assert_eq!(id, "abc-1");
        conn.drain_all().unwrap();
        assert_eq!(
            transport.frames(),
            vec![json!([2, "abc-1", "Authorize", {"idTag": "TAG-1"}])]
        );

        let dispatched = conn
            .on_inbound_frame(br#"[3,"abc-1",{"idTagInfo":{"status":"Accepted"}}]"#)
            .unwrap();
        assert_eq!(dispatched.descriptor, AuthorizeResponse::DESCRIPTOR);
        assert_eq!(dispatched.notified, 1);

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].id_tag_info.status, AuthorizationStatus::Accepted);
        assert_eq!(conn.correlation_state("abc-1"), Some(CorrelationState::Responded));
    }

    #[test]
    fn test_unknown_id_is_unsolicited() {
        let (_, conn) = connection();
        let seen = counter::<AuthorizeResponse>(&conn);

        let err = conn.on_inbound_frame(br#"[3, "unknown-id", {}]"#).unwrap_err();
        assert!(matches!(err, OcppError::UnsolicitedResponse { .. }));
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_late_response_after_close_is_stale() {
        let (_, conn) = connection();
        let seen = counter::<AuthorizeResponse>(&conn);

        conn.send_with_id(&Authorize::new("T"), "abc-1").unwrap();
        conn.drain_all().unwrap();

        let report = conn.on_close(Some(1006), "gone");
        assert_eq!(report.abandoned, vec!["abc-1"]);
        assert!(report.discarded.is_empty());

        let err = conn
            .on_inbound_frame(br#"[3,"abc-1",{"idTagInfo":{"status":"Accepted"}}]"#)
            .unwrap_err();
        assert!(matches!(
            err,
            OcppError::StaleCorrelation { state: CorrelationState::Abandoned, .. }
        ));
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_close_discards_queue_and_refuses_drain() {
        let (transport, conn) = connection();
        conn.send(&Heartbeat::default()).unwrap();
        conn.send(&Authorize::new("T")).unwrap();

        let report = conn.on_close(None, "");
        assert_eq!(report.discarded.len(), 2);
        assert_eq!(report.abandoned.len(), 2);
        assert!(conn.is_empty());

        conn.send(&Heartbeat::default()).unwrap();
        assert!(matches!(conn.drain_all(), Err(OcppError::ConnectionClosed)));
        assert_eq!(conn.len(), 1);

        conn.on_open();
        assert_eq!(conn.drain_all().unwrap(), 1);
        assert_eq!(transport.frames().len(), 1);
    }

    #[test]
    fn test_fifo_drain() {
        let (transport, conn) = connection();
        for n in 0..5 {
            conn.send_with_id(&Authorize::new(format!("T{}", n)), format!("id-{}", n))
                .unwrap();
        }
        assert_eq!(conn.drain_all().unwrap(), 5);

        let ids: Vec<_> = transport.frames().iter().map(|f| f[1].clone()).collect();
        assert_eq!(ids, vec!["id-0", "id-1", "id-2", "id-3", "id-4"]);
    }

    #[test]
    fn test_drain_failure_reports_index_and_keeps_tail() {
        let transport = Arc::new(RecordingTransport::failing_at(1));
        let conn = Connection::new(transport.clone(), ConnectionOptions::default());
        for id in ["a", "b", "c"] {
            conn.send_with_id(&Heartbeat::default(), id).unwrap();
        }

        let err = conn.drain_all().unwrap_err();
        match err {
            OcppError::TransmitFailed { index, correlation_id, .. } => {
                assert_eq!(index, 1);
                assert_eq!(correlation_id, "b");
            }
            other => panic!("unexpected {other}"),
        }
        assert_eq!(transport.frames().len(), 1);
        assert_eq!(conn.len(), 1);
        assert_eq!(conn.correlation_state("b"), Some(CorrelationState::Abandoned));

        assert_eq!(conn.drain_all().unwrap(), 1);
        assert_eq!(transport.frames()[1][1], "c");
    }

    #[test]
    fn test_duplicate_pending_id_is_regenerated() {
        let (_, conn) = connection();
        conn.send_with_id(&Heartbeat::default(), "same").unwrap();
        let second = conn.send_with_id(&Heartbeat::default(), "same").unwrap();
        assert_ne!(second, "same");
        assert_eq!(conn.pending_len(), 2);
    }

    #[test]
    fn test_pop_transmits_head() {
        let (transport, conn) = connection();
        assert_eq!(conn.pop().unwrap(), None);

        conn.send_with_id(&Heartbeat::default(), "h1").unwrap();
        conn.send_with_id(&Heartbeat::default(), "h2").unwrap();
        assert_eq!(conn.pop().unwrap().as_deref(), Some("h1"));
        assert_eq!(conn.len(), 1);
        assert_eq!(transport.frames()[0][1], "h1");
    }

    #[test]
    fn test_call_error_settles_request() {
        let (_, conn) = connection();
        let errors = counter::<ProtocolError>(&conn);
        conn.send_with_id(&Authorize::new("T"), "e-1").unwrap();

        let dispatched = conn
            .on_inbound_frame(br#"[4,"e-1","InternalError","boom",{}]"#)
            .unwrap();
        assert_eq!(dispatched.descriptor, MessageDescriptor::CALL_ERROR);
        assert_eq!(errors.lock()[0].error_code, ErrorCode::InternalError);
        assert_eq!(conn.correlation_state("e-1"), Some(CorrelationState::Errored));
    }

    #[test]
    fn test_invalid_response_payload_reaches_nobody() {
        let (_, conn) = connection();
        let seen = counter::<AuthorizeResponse>(&conn);
        conn.send_with_id(&Authorize::new("T"), "p-1").unwrap();

        let err = conn.on_inbound_frame(br#"[3,"p-1",[1,2,3]]"#).unwrap_err();
        assert!(matches!(err, OcppError::InvalidResponsePayload { .. }));
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_inbound_call_reaches_observer_and_is_answered() {
        let (transport, conn) = connection();
        let conn = Arc::new(conn);
        let weak = Arc::downgrade(&conn);

        conn.observers().subscribe(move |request: &ChangeAvailability, observed: &MessageObserved| {
            assert_eq!(request.availability, AvailabilityType::Inoperative);
            if let Some(conn) = weak.upgrade() {
                conn.respond(
                    &observed.correlation_id,
                    &ChangeAvailabilityResponse {
                        status: AvailabilityStatus::Accepted,
                    },
                )
                .unwrap();
            }
        });

        let dispatched = conn
            .on_inbound_frame(br#"[2,"cs-1","ChangeAvailability",{"connectorId":0,"type":"Inoperative"}]"#)
            .unwrap();
        assert_eq!(dispatched.notified, 1);

        conn.drain_all().unwrap();
        assert_eq!(
            transport.frames(),
            vec![json!([3, "cs-1", {"status": "Accepted"}])]
        );
        assert_eq!(conn.pending_len(), 0);
    }

    #[test]
    fn test_unknown_action_replies_not_supported() {
        let (transport, conn) = connection();
        let err = conn.on_inbound_frame(br#"[2,"cs-2","Reset",{"type":"Soft"}]"#).unwrap_err();
        assert!(matches!(err, OcppError::UnknownMessageKind(_)));

        conn.drain_all().unwrap();
        assert_eq!(
            transport.frames(),
            vec![json!([4, "cs-2", "NotSupported", "Unsupported action", {}])]
        );
    }

    #[test]
    fn test_unobserved_call_is_rejected() {
        let (transport, conn) = connection();
        let dispatched = conn
            .on_inbound_frame(br#"[2,"cs-3","TriggerMessage",{"requestedMessage":"Heartbeat"}]"#)
            .unwrap();
        assert_eq!(dispatched.notified, 0);

        conn.drain_all().unwrap();
        assert_eq!(transport.frames()[0][2], "NotSupported");
    }

    #[test]
    fn test_bad_request_payload_replies_format_violation() {
        let (transport, conn) = connection();
        let err = conn
            .on_inbound_frame(br#"[2,"cs-4","ChangeAvailability",{"connectorId":0,"type":"Sideways"}]"#)
            .unwrap_err();
        assert!(matches!(err, OcppError::InvalidRequestPayload { .. }));

        conn.drain_all().unwrap();
        assert_eq!(transport.frames()[0][2], "FormatViolation");
    }

    #[test]
    fn test_malformed_frames_get_replies() {
        let (transport, conn) = connection();
        assert!(matches!(
            conn.on_inbound_frame(br#"[2,"m-1","Heartbeat"]"#),
            Err(OcppError::MalformedFrame(_))
        ));
        assert!(matches!(
            conn.on_inbound_frame(br#"[7,"m-2",{}]"#),
            Err(OcppError::UnknownMessageKind(_))
        ));
        assert!(conn.on_inbound_frame(br#"[3,"m-3"]"#).is_err());

        conn.drain_all().unwrap();
        let frames = transport.frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0][2], "FormatViolation");
        assert_eq!(frames[1][2], "PropertyConstraintViolation");
    }

    #[test]
    fn test_timeouts_are_caller_driven() {
        let (_, conn) = connection();
        let id = conn.send(&Heartbeat::default()).unwrap();
        assert_eq!(conn.pending_older_than(Duration::ZERO), vec![id.clone()]);

        assert!(conn.abandon(&id));
        assert!(conn.pending_older_than(Duration::ZERO).is_empty());
        assert!(matches!(
            conn.on_inbound_frame(format!(r#"[3,"{}",{{"currentTime":"2026-01-20T12:00:00Z"}}]"#, id).as_bytes()),
            Err(OcppError::StaleCorrelation { .. })
        ));
    }

    #[test]
    fn test_journal_records_both_directions() {
        let (_, conn) = connection();
        conn.send_with_id(&Heartbeat::default(), "j-1").unwrap();
        conn.drain_all().unwrap();
        conn.on_inbound_frame(br#"[3,"j-1",{"currentTime":"2026-01-20T12:00:00Z"}]"#)
            .unwrap();

        let journal = conn.journal();
        let tx: Vec<_> = journal.transmitted().collect();
        let rx: Vec<_> = journal.received().collect();
        assert_eq!(tx.len(), 1);
        assert_eq!(tx[0].label, "Heartbeat");
        assert_eq!(rx.len(), 1);
        assert_eq!(rx[0].correlation_id, "j-1");
    }

    #[test]
    fn test_unregistered_type_refused_at_send() {
        #[derive(serde::Serialize, serde::Deserialize)]
        struct Reset {}

        impl OcppMessage for Reset {
            const DESCRIPTOR: MessageDescriptor = MessageDescriptor::request("Reset");
        }

        impl OcppRequest for Reset {
            type Response = HeartbeatResponse;
        }

        let (transport, conn) = connection();
        conn.send(&Heartbeat::default()).unwrap();

        let err = conn.send(&Reset {}).unwrap_err();
        assert!(matches!(err, OcppError::DescriptorMissing { .. }));
        let err = conn.respond("cs-9", &Reset {}).unwrap_err();
        assert!(matches!(err, OcppError::DescriptorMissing { .. }));

        assert_eq!(conn.len(), 1);
        assert_eq!(conn.pending_len(), 1);
        assert_eq!(conn.drain_all().unwrap(), 1);
        assert_eq!(transport.frames()[0][2], "Heartbeat");
    }

    #[test]
    fn test_is_queued_until_transmitted() {
        let (_, conn) = connection();
        let id = conn.send(&Heartbeat::default()).unwrap();
        assert!(conn.is_queued(&id));

        conn.drain_all().unwrap();
        assert!(!conn.is_queued(&id));
        assert_eq!(conn.correlation_state(&id), Some(CorrelationState::Pending));
    }

    #[test]
    fn test_concurrent_producers_and_drain() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::thread;

        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 250;

        let transport = Arc::new(RecordingTransport::default());
        let conn = Arc::new(Connection::new(transport.clone(), ConnectionOptions::default()));
        let done = Arc::new(AtomicBool::new(false));

        let drainer = {
            let conn = conn.clone();
            let done = done.clone();
            thread::spawn(move || loop {
                conn.drain_all().unwrap();
                if done.load(Ordering::Acquire) && conn.is_empty() {
                    break;
                }
                thread::yield_now();
            })
        };

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let conn = conn.clone();
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        let id = conn
                            .send_with_id(&Heartbeat::default(), format!("p{}-{}", p, i))
                            .unwrap();
                        assert_eq!(id, format!("p{}-{}", p, i));
                    }
                })
            })
            .collect();

        for producer in producers {
            producer.join().unwrap();
        }
        done.store(true, Ordering::Release);
        drainer.join().unwrap();

        let frames = transport.frames();
        assert_eq!(frames.len(), PRODUCERS * PER_PRODUCER);
        assert_eq!(conn.pending_len(), PRODUCERS * PER_PRODUCER);

        let mut next = vec![0usize; PRODUCERS];
        for frame in &frames {
            let id = frame[1].as_str().unwrap();
            let (producer, seq) = id[1..].split_once('-').unwrap();
            let producer: usize = producer.parse().unwrap();
            let seq: usize = seq.parse().unwrap();
            assert_eq!(seq, next[producer], "producer {} out of order at {}", producer, id);
            next[producer] += 1;
        }
        assert!(next.iter().all(|&n| n == PER_PRODUCER));
    }

    #[test]
    fn test_connection_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Connection>();
    }
}
