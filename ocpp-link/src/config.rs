//! Configuration for the OCPP link client
//!
//! Station identity reported in BootNotification, CSMS endpoint and timing.

use std::time::Duration;

use crate::ocpp::catalog::BootNotification;
use crate::ocpp::connection::ConnectionOptions;

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// CSMS WebSocket URL (without station ID)
    pub csms_url: String,

    /// Station ID (appended to URL)
    pub station_id: String,

    /// BootNotification identity
    pub vendor: String,
    pub model: String,
    pub charge_point_serial_number: Option<String>,
    pub charge_box_serial_number: Option<String>,
    pub firmware_version: Option<String>,
    pub iccid: Option<String>,
    pub imsi: Option<String>,
    pub meter_type: Option<String>,
    pub meter_serial_number: Option<String>,

    /// idTag to authorize once registered; `None` skips the Authorize
    pub id_tag: Option<String>,

    /// Heartbeat interval used until the CSMS assigns one
    pub heartbeat_interval: Duration,

    /// Initial reconnect delay
    pub reconnect_delay: Duration,

    /// Maximum reconnect delay (exponential backoff cap)
    pub max_reconnect_delay: Duration,

    /// Pending requests older than this are abandoned
    pub request_timeout: Duration,

    /// How often the outbound queue is drained
    pub drain_interval: Duration,

    /// Capacity of the channel between the queue and the socket writer
    pub outbound_buffer: usize,

    pub connection: ConnectionOptions,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            csms_url: "ws://localhost:8180/steve/websocket/CentralSystemService".to_string(),
            station_id: "CP-001".to_string(),
            vendor: "SimulareVendor".to_string(),
            model: "ModelForPSUCapstone".to_string(),
            charge_point_serial_number: Some("CPSN123456789012345".to_string()),
            charge_box_serial_number: Some("CBSN123456789012345".to_string()),
            firmware_version: Some("FW_1.0.0_Version_2024".to_string()),
            iccid: Some("ICCID1234567890123".to_string()),
            imsi: Some("IMSI1234567890123".to_string()),
            meter_type: Some("MeterType123".to_string()),
            meter_serial_number: Some("MSN123456789012345".to_string()),
            id_tag: None,
            heartbeat_interval: Duration::from_secs(240),
            reconnect_delay: Duration::from_secs(5),
            max_reconnect_delay: Duration::from_secs(300),
            request_timeout: Duration::from_secs(30),
            drain_interval: Duration::from_millis(100),
            outbound_buffer: 64,
            connection: ConnectionOptions::default(),
        }
    }
}

impl ClientConfig {
    /// Create config with basic parameters
    pub fn new(station_id: impl Into<String>, csms_url: impl Into<String>) -> Self {
        Self {
            station_id: station_id.into(),
            csms_url: csms_url.into(),
            ..Default::default()
        }
    }

    /// Set vendor info
    pub fn with_vendor(mut self, vendor: impl Into<String>, model: impl Into<String>) -> Self {
        self.vendor = vendor.into();
        self.model = model.into();
        self
    }

    /// Set firmware version
    pub fn with_firmware(mut self, version: impl Into<String>) -> Self {
        self.firmware_version = Some(version.into());
        self
    }

    /// Set charge point serial number
    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.charge_point_serial_number = Some(serial.into());
        self
    }

    pub fn with_id_tag(mut self, id_tag: impl Into<String>) -> Self {
        self.id_tag = Some(id_tag.into());
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_connection_options(mut self, options: ConnectionOptions) -> Self {
        self.connection = options;
        self
    }

    /// BootNotification announcing this station
    pub fn boot_notification(&self) -> BootNotification {
        BootNotification {
            charge_point_serial_number: self.charge_point_serial_number.clone(),
            charge_box_serial_number: self.charge_box_serial_number.clone(),
            firmware_version: self.firmware_version.clone(),
            iccid: self.iccid.clone(),
            imsi: self.imsi.clone(),
            meter_type: self.meter_type.clone(),
            meter_serial_number: self.meter_serial_number.clone(),
            ..BootNotification::new(self.vendor.clone(), self.model.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ClientConfig::new("CS001", "ws://localhost:8180/ocpp")
            .with_vendor("EK", "EK3")
            .with_serial("SN001")
            .with_id_tag("TAG-1")
            .with_heartbeat_interval(Duration::from_secs(60));

        assert_eq!(config.station_id, "CS001");
        assert_eq!(config.vendor, "EK");
        assert_eq!(config.model, "EK3");
        assert_eq!(config.id_tag.as_deref(), Some("TAG-1"));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_boot_notification_from_defaults() {
        let boot = ClientConfig::default().boot_notification();
        assert_eq!(boot.charge_point_vendor, "SimulareVendor");
        assert_eq!(boot.charge_point_model, "ModelForPSUCapstone");
        assert_eq!(boot.firmware_version.as_deref(), Some("FW_1.0.0_Version_2024"));
        assert_eq!(boot.meter_serial_number.as_deref(), Some("MSN123456789012345"));
    }
}
