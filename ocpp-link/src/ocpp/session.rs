//! Charge point session state
//!
//! Registration and clock state of one charge point:
//! - Boot sequence (BootNotification -> Registered / Pending / Rejected)
//! - Heartbeat scheduling
//! - Clock offset to the CSMS, taken from every time-bearing response
//!
//! The session never reads frames itself; [`track`] subscribes it to the
//! connection's observer registry.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::catalog::{BootNotificationResponse, HeartbeatResponse};
use super::observer::{MessageObserved, ObserverRegistry, SubscriptionId};
use super::types::RegistrationStatus;

/// Session state in the OCPP connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Initial state, waiting to connect
    Disconnected,
    /// Connected but not registered
    Connected,
    /// BootNotification sent or answered Pending
    BootPending,
    /// Registered with CSMS
    Registered,
    /// Registration rejected, will retry
    Rejected,
}

/// Events that drive the session
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// WebSocket connected
    Connected,
    /// WebSocket disconnected
    Disconnected,
    /// BootNotification queued
    BootSent,
    /// BootNotification went unanswered
    BootTimedOut,
    /// BootNotification never reached the transport
    BootFailed,
    /// BootNotificationResponse received
    BootAnswered {
        status: RegistrationStatus,
        interval: i32,
        current_time: DateTime<Utc>,
    },
    /// Heartbeat queued
    HeartbeatSent,
    /// HeartbeatResponse received
    HeartbeatAnswered { current_time: DateTime<Utc> },
}

/// Registration and clock state
#[derive(Debug, Clone)]
pub struct Session {
    pub station_id: String,

    pub state: SessionState,
    pub registered_at: Option<DateTime<Utc>>,

    /// Interval assigned by the CSMS, or the default until one is assigned
    pub heartbeat_interval: Duration,
    default_heartbeat_interval: Duration,
    pub last_heartbeat: Option<DateTime<Utc>>,

    /// Earliest time to resend BootNotification while not registered
    pub boot_retry_at: Option<DateTime<Utc>>,

    /// CSMS time minus local time
    clock_offset: chrono::Duration,
}

impl Session {
    pub fn new(station_id: impl Into<String>, default_heartbeat_interval: Duration) -> Self {
        Self {
            station_id: station_id.into(),
            state: SessionState::Disconnected,
            registered_at: None,
            heartbeat_interval: default_heartbeat_interval,
            default_heartbeat_interval,
            last_heartbeat: None,
            boot_retry_at: None,
            clock_offset: chrono::Duration::zero(),
        }
    }

    /// Handle a session event
    pub fn handle_event(&mut self, event: SessionEvent) {
        debug!("Session event: {:?}", event);

        match event {
            SessionEvent::Connected => {
                self.state = SessionState::Connected;
                info!("Session connected, will send BootNotification");
            }

            SessionEvent::Disconnected => {
                self.state = SessionState::Disconnected;
                self.registered_at = None;
                self.boot_retry_at = None;
                warn!("Session disconnected");
            }

            SessionEvent::BootSent => {
                if self.state != SessionState::Registered {
                    self.state = SessionState::BootPending;
                }
                self.boot_retry_at = None;
            }

            SessionEvent::BootTimedOut => {
                if self.state == SessionState::BootPending {
                    self.state = SessionState::Connected;
                    warn!("BootNotification timed out, retrying");
                }
            }

            SessionEvent::BootFailed => {
                if self.state == SessionState::BootPending {
                    self.state = SessionState::Connected;
                    warn!("BootNotification was not transmitted, retrying");
                }
            }

            SessionEvent::BootAnswered {
                status,
                interval,
                current_time,
            } => self.on_boot_answered(status, interval, current_time),

            SessionEvent::HeartbeatSent => {
                self.last_heartbeat = Some(Utc::now());
            }

            SessionEvent::HeartbeatAnswered { current_time } => {
                self.synchronize(current_time);
            }
        }
    }

    fn on_boot_answered(&mut self, status: RegistrationStatus, interval: i32, current_time: DateTime<Utc>) {
        let interval = self.interval_or_default(interval);

        match status {
            RegistrationStatus::Accepted => {
                self.state = SessionState::Registered;
                self.registered_at = Some(Utc::now());
                self.heartbeat_interval = interval;
                self.boot_retry_at = None;
                self.synchronize(current_time);
                info!(
                    "Session {} registered, heartbeat interval: {}s",
                    self.station_id,
                    interval.as_secs()
                );
            }

            RegistrationStatus::Pending => {
                self.state = SessionState::BootPending;
                self.boot_retry_at = Some(Utc::now() + to_chrono(interval));
                info!("Boot pending, will retry in {}s", interval.as_secs());
            }

            RegistrationStatus::Rejected => {
                self.state = SessionState::Rejected;
                self.boot_retry_at = Some(Utc::now() + to_chrono(interval));
                warn!("Boot rejected by CSMS, will retry in {}s", interval.as_secs());
            }
        }
    }

    fn interval_or_default(&self, interval: i32) -> Duration {
        match interval {
            i if i > 0 => Duration::from_secs(i as u64),
            0 => self.default_heartbeat_interval,
            i => {
                warn!("Ignoring negative interval {} from CSMS", i);
                self.default_heartbeat_interval
            }
        }
    }

    fn synchronize(&mut self, csms_time: DateTime<Utc>) {
        self.clock_offset = csms_time.signed_duration_since(Utc::now());
        debug!("Clock offset to CSMS: {}ms", self.clock_offset.num_milliseconds());
    }

    /// Check if a heartbeat is due at `now`
    pub fn heartbeat_due(&self, now: DateTime<Utc>) -> bool {
        if self.state != SessionState::Registered {
            return false;
        }

        match self.last_heartbeat {
            None => true,
            Some(last) => now.signed_duration_since(last) >= to_chrono(self.heartbeat_interval),
        }
    }

    /// Check if BootNotification should be sent at `now`
    pub fn boot_due(&self, now: DateTime<Utc>) -> bool {
        match self.state {
            SessionState::Connected => true,
            SessionState::BootPending | SessionState::Rejected => {
                self.boot_retry_at.map_or(false, |at| now >= at)
            }
            _ => false,
        }
    }

    pub fn is_registered(&self) -> bool {
        self.state == SessionState::Registered
    }

    pub fn clock_offset(&self) -> chrono::Duration {
        self.clock_offset
    }

    /// `time` shifted onto the CSMS clock
    pub fn synchronized(&self, time: DateTime<Utc>) -> DateTime<Utc> {
        time + self.clock_offset
    }

    /// Current time on the CSMS clock
    pub fn synchronized_now(&self) -> DateTime<Utc> {
        self.synchronized(Utc::now())
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::weeks(52 * 100))
}

/// Feed `session` from BootNotification and Heartbeat responses
pub fn track(session: Arc<Mutex<Session>>, observers: &ObserverRegistry) -> [SubscriptionId; 2] {
    let boot = {
        let session = session.clone();
        observers.subscribe(move |response: &BootNotificationResponse, _: &MessageObserved| {
            session.lock().handle_event(SessionEvent::BootAnswered {
                status: response.status,
                interval: response.interval,
                current_time: response.current_time,
            });
        })
    };

    let heartbeat = observers.subscribe(move |response: &HeartbeatResponse, _: &MessageObserved| {
        session.lock().handle_event(SessionEvent::HeartbeatAnswered {
            current_time: response.current_time,
        });
    });

    [boot, heartbeat]
}
