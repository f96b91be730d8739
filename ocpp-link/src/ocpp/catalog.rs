//! OCPP 1.6 message catalog
//!
//! Concrete request/response payloads and the static table that maps a
//! `(action, call kind)` pair to its descriptor. The table is the only place
//! inbound frames are resolved against; a type that implements
//! [`OcppMessage`] but is missing here cannot be encoded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::descriptor::{CallKind, MessageDescriptor, OcppMessage, OcppRequest};
use super::messages::ProtocolError;
use super::observer::{MessageObserved, ObserverRegistry};
use super::types::*;
use crate::error::OcppError;

/// Binds a request type and its response type to one action name.
macro_rules! ocpp_action {
    ($action:literal: $request:ty => $response:ty) => {
        impl OcppMessage for $request {
            const DESCRIPTOR: MessageDescriptor = MessageDescriptor::request($action);
        }

        impl OcppMessage for $response {
            const DESCRIPTOR: MessageDescriptor = MessageDescriptor::response($action);
        }

        impl OcppRequest for $request {
            type Response = $response;
        }
    };
}

// ============================================================================
// Charge point initiated
// ============================================================================

/// Authorize request (CP -> CSMS)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authorize {
    pub id_tag: String,
}

impl Authorize {
    pub fn new(id_tag: impl Into<String>) -> Self {
        Self {
            id_tag: id_tag.into(),
        }
    }

    /// Authorize a freshly generated idTag
    pub fn generated() -> Self {
        Self::new(generate_id_tag())
    }
}

/// Random 20 character idTag (a v4 UUID without hyphens, truncated)
pub fn generate_id_tag() -> String {
    let mut tag = uuid::Uuid::new_v4().simple().to_string();
    tag.truncate(20);
    tag
}

/// Authorize response (CSMS -> CP)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeResponse {
    pub id_tag_info: IdTagInfo,
}

ocpp_action!("Authorize": Authorize => AuthorizeResponse);

/// BootNotification request (CP -> CSMS)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootNotification {
    pub charge_point_vendor: String,
    pub charge_point_model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charge_point_serial_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charge_box_serial_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iccid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imsi: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meter_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meter_serial_number: Option<String>,
}

impl BootNotification {
    pub fn new(vendor: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            charge_point_vendor: vendor.into(),
            charge_point_model: model.into(),
            charge_point_serial_number: None,
            charge_box_serial_number: None,
            firmware_version: None,
            iccid: None,
            imsi: None,
            meter_type: None,
            meter_serial_number: None,
        }
    }
}

/// BootNotification response (CSMS -> CP)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootNotificationResponse {
    pub status: RegistrationStatus,
    pub current_time: DateTime<Utc>,
    pub interval: i32,
}

ocpp_action!("BootNotification": BootNotification => BootNotificationResponse);

/// Heartbeat request (CP -> CSMS)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {}

/// Heartbeat response (CSMS -> CP)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResponse {
    pub current_time: DateTime<Utc>,
}

ocpp_action!("Heartbeat": Heartbeat => HeartbeatResponse);

/// StatusNotification request (CP -> CSMS)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusNotification {
    pub connector_id: i32,
    pub error_code: ChargePointErrorCode,
    pub status: ChargePointStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_error_code: Option<String>,
}

impl StatusNotification {
    pub fn new(connector_id: i32, status: ChargePointStatus) -> Self {
        Self {
            connector_id,
            error_code: ChargePointErrorCode::NoError,
            status,
            timestamp: Some(Utc::now()),
            info: None,
            vendor_id: None,
            vendor_error_code: None,
        }
    }
}

/// StatusNotification response (CSMS -> CP)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusNotificationResponse {}

ocpp_action!("StatusNotification": StatusNotification => StatusNotificationResponse);

/// MeterValues request (CP -> CSMS)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterValues {
    pub connector_id: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<i32>,
    pub meter_value: Vec<MeterValue>,
}

/// MeterValues response (CSMS -> CP)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeterValuesResponse {}

ocpp_action!("MeterValues": MeterValues => MeterValuesResponse);

/// StartTransaction request (CP -> CSMS)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTransaction {
    pub connector_id: i32,
    pub id_tag: String,
    pub meter_start: i32,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reservation_id: Option<i32>,
}

/// StartTransaction response (CSMS -> CP)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTransactionResponse {
    pub transaction_id: i32,
    pub id_tag_info: IdTagInfo,
}

ocpp_action!("StartTransaction": StartTransaction => StartTransactionResponse);

/// StopTransaction request (CP -> CSMS)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopTransaction {
    pub transaction_id: i32,
    pub meter_stop: i32,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<Reason>,
}

/// StopTransaction response (CSMS -> CP)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopTransactionResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_tag_info: Option<IdTagInfo>,
}

ocpp_action!("StopTransaction": StopTransaction => StopTransactionResponse);

// ============================================================================
// Central system initiated
// ============================================================================

/// ChangeAvailability request (CSMS -> CP)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeAvailability {
    pub connector_id: i32,
    #[serde(rename = "type")]
    pub availability: AvailabilityType,
}

/// ChangeAvailability response (CP -> CSMS)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeAvailabilityResponse {
    pub status: AvailabilityStatus,
}

ocpp_action!("ChangeAvailability": ChangeAvailability => ChangeAvailabilityResponse);

/// ChangeConfiguration request (CSMS -> CP)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeConfiguration {
    pub key: String,
    pub value: String,
}

/// ChangeConfiguration response (CP -> CSMS)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeConfigurationResponse {
    pub status: ConfigurationStatus,
}

ocpp_action!("ChangeConfiguration": ChangeConfiguration => ChangeConfigurationResponse);

/// GetConfiguration request (CSMS -> CP)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<Vec<String>>,
}

/// GetConfiguration response (CP -> CSMS)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetConfigurationResponse {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub configuration_key: Vec<KeyValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unknown_key: Vec<String>,
}

ocpp_action!("GetConfiguration": GetConfiguration => GetConfigurationResponse);

/// RemoteStartTransaction request (CSMS -> CP)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStartTransaction {
    pub id_tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connector_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charging_profile: Option<ChargingProfile>,
}

/// RemoteStartTransaction response (CP -> CSMS)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteStartTransactionResponse {
    pub status: RemoteStartStopStatus,
}

ocpp_action!("RemoteStartTransaction": RemoteStartTransaction => RemoteStartTransactionResponse);

/// RemoteStopTransaction request (CSMS -> CP)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStopTransaction {
    pub transaction_id: i32,
}

/// RemoteStopTransaction response (CP -> CSMS)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteStopTransactionResponse {
    pub status: RemoteStartStopStatus,
}

ocpp_action!("RemoteStopTransaction": RemoteStopTransaction => RemoteStopTransactionResponse);

/// SetChargingProfile request (CSMS -> CP)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetChargingProfile {
    pub connector_id: i32,
    pub cs_charging_profiles: ChargingProfile,
}

/// SetChargingProfile response (CP -> CSMS)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetChargingProfileResponse {
    pub status: ChargingProfileStatus,
}

ocpp_action!("SetChargingProfile": SetChargingProfile => SetChargingProfileResponse);

/// ClearChargingProfile request (CSMS -> CP)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearChargingProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connector_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charging_profile_purpose: Option<ChargingProfilePurpose>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_level: Option<i32>,
}

/// ClearChargingProfile response (CP -> CSMS)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClearChargingProfileResponse {
    pub status: ClearChargingProfileStatus,
}

ocpp_action!("ClearChargingProfile": ClearChargingProfile => ClearChargingProfileResponse);

/// TriggerMessage request (CSMS -> CP)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerMessage {
    pub requested_message: MessageTrigger,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connector_id: Option<i32>,
}

/// TriggerMessage response (CP -> CSMS)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerMessageResponse {
    pub status: TriggerMessageStatus,
}

ocpp_action!("TriggerMessage": TriggerMessage => TriggerMessageResponse);

impl OcppMessage for ProtocolError {
    const DESCRIPTOR: MessageDescriptor = MessageDescriptor::CALL_ERROR;
}

// ============================================================================
// Registry
// ============================================================================

/// Decodes a payload into its typed message and fans it out to observers.
pub(crate) type PublishFn =
    fn(&ObserverRegistry, Value, &MessageObserved) -> Result<usize, OcppError>;

/// One registered message type
pub struct CatalogEntry {
    pub descriptor: MessageDescriptor,
    publish: PublishFn,
}

impl CatalogEntry {
    /// Decode `payload` as this entry's type and notify its observers
    pub fn publish(
        &self,
        registry: &ObserverRegistry,
        payload: Value,
        observed: &MessageObserved,
    ) -> Result<usize, OcppError> {
        (self.publish)(registry, payload, observed)
    }
}

impl std::fmt::Debug for CatalogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogEntry")
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

macro_rules! entry {
    ($ty:ty) => {
        CatalogEntry {
            descriptor: <$ty as OcppMessage>::DESCRIPTOR,
            publish: publish_as::<$ty>,
        }
    };
}

static CATALOG: &[CatalogEntry] = &[
    entry!(Authorize),
    entry!(AuthorizeResponse),
    entry!(BootNotification),
    entry!(BootNotificationResponse),
    entry!(Heartbeat),
    entry!(HeartbeatResponse),
    entry!(StatusNotification),
    entry!(StatusNotificationResponse),
    entry!(MeterValues),
    entry!(MeterValuesResponse),
    entry!(StartTransaction),
    entry!(StartTransactionResponse),
    entry!(StopTransaction),
    entry!(StopTransactionResponse),
    entry!(ChangeAvailability),
    entry!(ChangeAvailabilityResponse),
    entry!(ChangeConfiguration),
    entry!(ChangeConfigurationResponse),
    entry!(GetConfiguration),
    entry!(GetConfigurationResponse),
    entry!(RemoteStartTransaction),
    entry!(RemoteStartTransactionResponse),
    entry!(RemoteStopTransaction),
    entry!(RemoteStopTransactionResponse),
    entry!(SetChargingProfile),
    entry!(SetChargingProfileResponse),
    entry!(ClearChargingProfile),
    entry!(ClearChargingProfileResponse),
    entry!(TriggerMessage),
    entry!(TriggerMessageResponse),
    entry!(ProtocolError),
];

/// Every registered message type
pub fn entries() -> &'static [CatalogEntry] {
    CATALOG
}

/// Find the entry registered for an action and call kind
pub fn lookup(action: &str, kind: CallKind) -> Option<&'static CatalogEntry> {
    CATALOG
        .iter()
        .find(|entry| entry.descriptor.kind == kind && entry.descriptor.action == action)
}

/// Whether `descriptor` belongs to a registered message type
pub fn is_registered(descriptor: &MessageDescriptor) -> bool {
    lookup(descriptor.action, descriptor.kind).is_some()
}

/// Decode a payload into `M`.
///
/// Only JSON objects are accepted; unknown fields are ignored.
pub fn decode_payload<M: OcppMessage>(payload: Value) -> Result<M, OcppError> {
    let descriptor = M::DESCRIPTOR;
    let invalid = |reason: String| match descriptor.kind {
        CallKind::Request => OcppError::InvalidRequestPayload {
            action: descriptor.action.to_string(),
            reason,
        },
        _ => OcppError::InvalidResponsePayload { descriptor, reason },
    };

    if !payload.is_object() {
        return Err(invalid(format!("expected a JSON object, got {}", payload)));
    }

    serde_json::from_value(payload).map_err(|e| invalid(e.to_string()))
}

fn publish_as<M: OcppMessage>(
    registry: &ObserverRegistry,
    payload: Value,
    observed: &MessageObserved,
) -> Result<usize, OcppError> {
    let message = decode_payload::<M>(payload)?;
    registry.publish(Some(&message), observed)
}
