//! Property tests for the outbound path
//!
//! - FIFO: drain transmits in push order
//! - Drain failure: names the failing index and leaves the tail queued
//! - Correlation: every queued request is pending exactly once

use std::sync::Arc;

use ocpp_link::ocpp::{
    Authorize, ChannelTransport, Connection, ConnectionOptions, CorrelationState, Heartbeat,
};
use ocpp_link::OcppError;
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

#[derive(Debug, Clone)]
enum Outbound {
    Authorize(String),
    Heartbeat,
}

fn outbound() -> impl Strategy<Value = Outbound> {
    prop_oneof![
        "[A-Z0-9]{1,20}".prop_map(Outbound::Authorize),
        Just(Outbound::Heartbeat),
    ]
}

fn connection(capacity: usize) -> (Arc<ChannelTransport>, tokio::sync::mpsc::Receiver<String>, Connection) {
    let transport = Arc::new(ChannelTransport::new());
    let rx = transport.attach(capacity);
    let conn = Connection::new(transport.clone(), ConnectionOptions::default());
    (transport, rx, conn)
}

fn enqueue(conn: &Connection, message: &Outbound) -> String {
    match message {
        Outbound::Authorize(tag) => conn.send(&Authorize::new(tag.clone())).unwrap(),
        Outbound::Heartbeat => conn.send(&Heartbeat::default()).unwrap(),
    }
}

fn frame_id(frame: &str) -> String {
    let value: serde_json::Value = serde_json::from_str(frame).unwrap();
    value[1].as_str().unwrap().to_string()
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// Frames leave in exactly the order they were queued
    #[test]
    fn drain_is_fifo(messages in prop::collection::vec(outbound(), 0..40)) {
        let (_transport, mut rx, conn) = connection(64);
        prop_assert!(conn.is_empty());

        let ids: Vec<String> = messages.iter().map(|m| enqueue(&conn, m)).collect();
        prop_assert_eq!(conn.len(), ids.len());

        let sent = conn.drain_all().unwrap();
        prop_assert_eq!(sent, ids.len());
        prop_assert!(conn.is_empty());

        let transmitted: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|frame| frame_id(&frame))
            .collect();
        prop_assert_eq!(transmitted, ids);
    }

    /// A full outbound channel stops the drain at the first message that
    /// does not fit
    #[test]
    fn drain_failure_names_index(
        messages in prop::collection::vec(outbound(), 2..30),
        capacity in 1usize..10,
    ) {
        prop_assume!(capacity < messages.len());
        let (_transport, _rx, conn) = connection(capacity);
        let ids: Vec<String> = messages.iter().map(|m| enqueue(&conn, m)).collect();

        match conn.drain_all() {
            Err(OcppError::TransmitFailed { index, correlation_id, .. }) => {
                prop_assert_eq!(index, capacity);
                prop_assert_eq!(&correlation_id, &ids[capacity]);
                prop_assert_eq!(
                    conn.correlation_state(&correlation_id),
                    Some(CorrelationState::Abandoned)
                );
            }
            other => prop_assert!(false, "expected TransmitFailed, got {:?}", other),
        }
        prop_assert_eq!(conn.len(), messages.len() - capacity - 1);
    }

    /// Every queued request is pending until answered or abandoned
    #[test]
    fn queued_requests_are_pending(messages in prop::collection::vec(outbound(), 1..30)) {
        let (_transport, _rx, conn) = connection(64);
        let ids: Vec<String> = messages.iter().map(|m| enqueue(&conn, m)).collect();

        prop_assert_eq!(conn.pending_len(), ids.len());
        for id in &ids {
            prop_assert_eq!(conn.correlation_state(id), Some(CorrelationState::Pending));
        }

        let report = conn.on_close(Some(1000), "done");
        prop_assert_eq!(report.abandoned.len(), ids.len());
        prop_assert_eq!(report.discarded.len(), ids.len());
        prop_assert_eq!(conn.pending_len(), 0);
    }
}
