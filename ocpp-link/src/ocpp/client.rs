//! OCPP WebSocket client
//!
//! Drives one [`Connection`] over a WebSocket to the CSMS:
//! - WebSocket connection with the `ocpp1.6` subprotocol
//! - Automatic reconnection with exponential backoff
//! - Periodic queue drain, boot and heartbeat scheduling
//! - Caller-side request timeouts

use std::sync::Arc;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio_tungstenite::{
    connect_async_with_config,
    tungstenite::{
        client::IntoClientRequest,
        http::{header, HeaderValue},
        protocol::WebSocketConfig,
        Message,
    },
};
use tracing::{debug, error, info, warn};

use super::catalog::{Authorize, Heartbeat};
use super::connection::Connection;
use super::session::{self, Session, SessionEvent};
use super::transport::ChannelTransport;
use crate::config::ClientConfig;
use crate::error::{OcppError, TransportError};

/// OCPP 1.6 JSON WebSocket subprotocol
pub const OCPP_SUBPROTOCOL: &str = "ocpp1.6";

/// How one socket session ended
#[derive(Debug, Default)]
struct CloseInfo {
    code: Option<u16>,
    reason: String,
}

/// OCPP WebSocket client for one charge point
pub struct OcppClient {
    config: ClientConfig,
    transport: Arc<ChannelTransport>,
    connection: Arc<Connection>,
    session: Arc<Mutex<Session>>,
    boot_id: Mutex<Option<String>>,
    /// Correlation id of the Authorize sent on this socket
    authorize_id: Mutex<Option<String>>,
}

impl OcppClient {
    pub fn new(config: ClientConfig) -> Self {
        let transport = Arc::new(ChannelTransport::new());
        let connection = Arc::new(Connection::new(transport.clone(), config.connection.clone()));

        let session = Arc::new(Mutex::new(Session::new(
            config.station_id.clone(),
            config.heartbeat_interval,
        )));
        session::track(session.clone(), connection.observers());

        Self {
            config,
            transport,
            connection,
            session,
            boot_id: Mutex::new(None),
            authorize_id: Mutex::new(None),
        }
    }

    /// The dispatcher; subscribe observers and enqueue messages through it
    pub fn connection(&self) -> Arc<Connection> {
        self.connection.clone()
    }

    pub fn session(&self) -> Arc<Mutex<Session>> {
        self.session.clone()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Run the client connection loop
    pub async fn run(&self) -> Result<(), OcppError> {
        let mut reconnect_delay = self.config.reconnect_delay;

        loop {
            info!("Connecting to CSMS: {}", self.config.csms_url);

            match self.connect_and_run(&mut reconnect_delay).await {
                Ok(()) => {
                    info!("Connection closed gracefully");
                    break Ok(());
                }
                Err(e) => {
                    error!("Connection error: {}", e);

                    // Exponential backoff
                    info!("Reconnecting in {:?}", reconnect_delay);
                    tokio::time::sleep(reconnect_delay).await;
                    reconnect_delay =
                        std::cmp::min(reconnect_delay * 2, self.config.max_reconnect_delay);
                }
            }
        }
    }

    /// Connect and run until disconnection
    async fn connect_and_run(
        &self,
        reconnect_delay: &mut std::time::Duration,
    ) -> Result<(), OcppError> {
        let url = build_ocpp_url(&self.config.csms_url, &self.config.station_id);

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Io(format!("invalid CSMS URL {}: {}", url, e)))?;
        request.headers_mut().insert(
            header::SEC_WEBSOCKET_PROTOCOL,
            HeaderValue::from_static(OCPP_SUBPROTOCOL),
        );

        let ws_config = WebSocketConfig {
            max_message_size: Some(64 * 1024),
            max_frame_size: Some(16 * 1024),
            ..Default::default()
        };

        let (ws_stream, response) = connect_async_with_config(request, Some(ws_config), false)
            .await
            .map_err(|e| TransportError::Io(format!("WebSocket connection failed: {}", e)))?;

        // Verify subprotocol
        let accepted_protocol = response
            .headers()
            .get(header::SEC_WEBSOCKET_PROTOCOL)
            .and_then(|v| v.to_str().ok());

        if accepted_protocol != Some(OCPP_SUBPROTOCOL) {
            warn!(
                "CSMS did not accept OCPP 1.6 subprotocol, got: {:?}",
                accepted_protocol
            );
        }

        info!("WebSocket connected to {}", url);
        *reconnect_delay = self.config.reconnect_delay;

        let (mut ws_tx, mut ws_rx) = ws_stream.split();
        let mut outbound_rx = self.transport.attach(self.config.outbound_buffer);

        self.connection.on_open();
        self.session.lock().handle_event(SessionEvent::Connected);
        *self.authorize_id.lock() = None;

        // Socket writer
        let writer = tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                    error!("Failed to send WebSocket message: {}", e);
                    break;
                }
            }
        });

        let mut ticker = tokio::time::interval(self.config.drain_interval);
        let mut close = CloseInfo::default();

        let outcome = loop {
            tokio::select! {
                msg = ws_rx.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Err(e) = self.connection.on_inbound_frame(text.as_bytes()) {
                                debug!("Inbound frame not dispatched: {}", e);
                            }
                            self.drain();
                        }
                        Some(Ok(Message::Binary(_))) => {
                            warn!("Ignoring binary frame, OCPP-J is text only");
                        }
                        Some(Ok(Message::Close(frame))) => {
                            if let Some(frame) = frame {
                                close.code = Some(u16::from(frame.code));
                                close.reason = frame.reason.to_string();
                            }
                            info!("WebSocket closed by server");
                            break Ok(());
                        }
                        Some(Err(e)) => {
                            let err = TransportError::Io(e.to_string());
                            self.connection.on_transport_error(&err);
                            close.reason = err.to_string();
                            break Err(OcppError::from(err));
                        }
                        None => {
                            info!("WebSocket stream ended");
                            break Err(OcppError::ConnectionClosed);
                        }
                        _ => {}
                    }
                }

                _ = ticker.tick() => {
                    self.tick();
                    self.drain();
                }
            }
        };

        writer.abort();
        self.transport.detach();
        self.connection.on_close(close.code, &close.reason);
        self.session.lock().handle_event(SessionEvent::Disconnected);
        *self.boot_id.lock() = None;

        outcome
    }

    /// Schedule boot, heartbeat and authorization, and expire old requests
    fn tick(&self) {
        let now = Utc::now();
        let (boot_due, heartbeat_due, registered) = {
            let session = self.session.lock();
            (session.boot_due(now), session.heartbeat_due(now), session.is_registered())
        };

        if boot_due {
            match self.connection.send(&self.config.boot_notification()) {
                Ok(id) => {
                    info!("Sending BootNotification [{}]", id);
                    *self.boot_id.lock() = Some(id);
                    self.session.lock().handle_event(SessionEvent::BootSent);
                }
                Err(e) => error!("Failed to queue BootNotification: {}", e),
            }
        }

        if heartbeat_due {
            match self.connection.send(&Heartbeat::default()) {
                Ok(_) => self.session.lock().handle_event(SessionEvent::HeartbeatSent),
                Err(e) => error!("Failed to queue Heartbeat: {}", e),
            }
        }

        if registered {
            self.authorize_once();
        }

        // Only requests already on the wire can time out
        for id in self.connection.pending_older_than(self.config.request_timeout) {
            if self.connection.is_queued(&id) {
                continue;
            }
            if !self.connection.abandon(&id) {
                continue;
            }
            warn!("Request {} timed out after {:?}", id, self.config.request_timeout);

            let mut boot_id = self.boot_id.lock();
            if boot_id.as_deref() == Some(id.as_str()) {
                *boot_id = None;
                self.session.lock().handle_event(SessionEvent::BootTimedOut);
            }
        }
    }

    fn authorize_once(&self) {
        let Some(id_tag) = self.config.id_tag.as_deref() else {
            return;
        };

        let mut authorize_id = self.authorize_id.lock();
        if authorize_id.is_some() {
            return;
        }
        match self.connection.send(&Authorize::new(id_tag)) {
            Ok(id) => {
                info!("Authorizing idTag {} [{}]", id_tag, id);
                *authorize_id = Some(id);
            }
            Err(e) => error!("Failed to queue Authorize: {}", e),
        }
    }

    fn drain(&self) {
        match self.connection.drain_all() {
            Ok(_) => {}
            Err(OcppError::ConnectionClosed) => {}
            Err(e) => {
                warn!("Drain stopped: {}", e);
                if let OcppError::TransmitFailed { correlation_id, .. } = &e {
                    self.on_transmit_failed(correlation_id);
                }
            }
        }
    }

    /// A dropped request is never answered, so schedule it again
    fn on_transmit_failed(&self, correlation_id: &str) {
        let mut boot_id = self.boot_id.lock();
        if boot_id.as_deref() == Some(correlation_id) {
            *boot_id = None;
            self.session.lock().handle_event(SessionEvent::BootFailed);
        }

        let mut authorize_id = self.authorize_id.lock();
        if authorize_id.as_deref() == Some(correlation_id) {
            *authorize_id = None;
        }
    }
}

/// Build the full OCPP WebSocket URL
pub fn build_ocpp_url(base_url: &str, station_id: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), station_id)
}
