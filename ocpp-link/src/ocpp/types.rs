//! OCPP 1.6 data types
//!
//! Closed value sets and the composite structures carried inside message
//! payloads. Every value set parses from its wire string through `FromStr`
//! (case-insensitive) and fails with
//! `Unexpected <EnumName>: <value>` for anything outside the set.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EnumDecodeError;

/// Declares a closed value set with its wire strings.
///
/// Optional `| "alias"` entries are accepted when decoding but never emitted.
macro_rules! value_set {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $variant:ident => $wire:literal $(| $alias:literal)* ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $wire $(, alias = $alias)*)]
                $variant,
            )+
        }

        impl $name {
            /// Every member of the set, in declaration order
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Wire string of this value
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = EnumDecodeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $(
                    if s.eq_ignore_ascii_case($wire) $(|| s.eq_ignore_ascii_case($alias))* {
                        return Ok($name::$variant);
                    }
                )+
                Err(EnumDecodeError::new(stringify!($name), s))
            }
        }
    };
}

// ============================================================================
// Enumerations
// ============================================================================

value_set! {
    /// CALLERROR error codes
    pub enum ErrorCode {
        NotImplemented => "NotImplemented",
        NotSupported => "NotSupported",
        InternalError => "InternalError",
        ProtocolError => "ProtocolError",
        SecurityError => "SecurityError",
        FormatViolation => "FormatViolation" | "FormationViolation",
        PropertyConstraintViolation => "PropertyConstraintViolation",
        OccurrenceConstraintViolation => "OccurenceConstraintViolation" | "OccurrenceConstraintViolation",
        TypeConstraintViolation => "TypeConstraintViolation",
        GenericError => "GenericError",
    }
}

value_set! {
    /// Status of an idTag as reported by the CSMS
    pub enum AuthorizationStatus {
        Accepted => "Accepted",
        Blocked => "Blocked",
        Expired => "Expired",
        Invalid => "Invalid",
        ConcurrentTx => "ConcurrentTx",
    }
}

value_set! {
    /// Registration status for BootNotification
    pub enum RegistrationStatus {
        Accepted => "Accepted",
        Pending => "Pending",
        Rejected => "Rejected",
    }
}

value_set! {
    /// Connector status reported in StatusNotification
    pub enum ChargePointStatus {
        Available => "Available",
        Preparing => "Preparing",
        Charging => "Charging",
        SuspendedEvse => "SuspendedEVSE",
        SuspendedEv => "SuspendedEV",
        Finishing => "Finishing",
        Reserved => "Reserved",
        Unavailable => "Unavailable",
        Faulted => "Faulted",
    }
}

value_set! {
    /// Connector error code reported in StatusNotification
    pub enum ChargePointErrorCode {
        ConnectorLockFailure => "ConnectorLockFailure",
        EvCommunicationError => "EVCommunicationError",
        GroundFailure => "GroundFailure",
        HighTemperature => "HighTemperature",
        InternalError => "InternalError",
        LocalListConflict => "LocalListConflict",
        NoError => "NoError",
        OtherError => "OtherError",
        OverCurrentFailure => "OverCurrentFailure",
        OverVoltage => "OverVoltage",
        PowerMeterFailure => "PowerMeterFailure",
        PowerSwitchFailure => "PowerSwitchFailure",
        ReaderFailure => "ReaderFailure",
        ResetFailure => "ResetFailure",
        UnderVoltage => "UnderVoltage",
        WeakSignal => "WeakSignal",
    }
}

value_set! {
    /// Requested availability in ChangeAvailability
    pub enum AvailabilityType {
        Operative => "Operative",
        Inoperative => "Inoperative",
    }
}

value_set! {
    /// Outcome of ChangeAvailability
    pub enum AvailabilityStatus {
        Accepted => "Accepted",
        Rejected => "Rejected",
        Scheduled => "Scheduled",
    }
}

value_set! {
    /// Outcome of ChangeConfiguration
    pub enum ConfigurationStatus {
        Accepted => "Accepted",
        Rejected => "Rejected",
        RebootRequired => "RebootRequired",
        NotSupported => "NotSupported",
    }
}

value_set! {
    /// Outcome of RemoteStartTransaction / RemoteStopTransaction
    pub enum RemoteStartStopStatus {
        Accepted => "Accepted",
        Rejected => "Rejected",
    }
}

value_set! {
    /// Outcome of SetChargingProfile
    pub enum ChargingProfileStatus {
        Accepted => "Accepted",
        Rejected => "Rejected",
        NotSupported => "NotSupported",
    }
}

value_set! {
    /// Outcome of ClearChargingProfile
    pub enum ClearChargingProfileStatus {
        Accepted => "Accepted",
        Unknown => "Unknown",
    }
}

value_set! {
    /// Outcome of TriggerMessage
    pub enum TriggerMessageStatus {
        Accepted => "Accepted",
        Rejected => "Rejected",
        NotImplemented => "NotImplemented",
    }
}

value_set! {
    /// Message the CSMS may ask the charge point to send
    pub enum MessageTrigger {
        BootNotification => "BootNotification",
        DiagnosticsStatusNotification => "DiagnosticsStatusNotification",
        FirmwareStatusNotification => "FirmwareStatusNotification",
        Heartbeat => "Heartbeat",
        MeterValues => "MeterValues",
        StatusNotification => "StatusNotification",
    }
}

value_set! {
    /// Reason a transaction was stopped
    pub enum Reason {
        DeAuthorized => "DeAuthorized",
        EmergencyStop => "EmergencyStop",
        EvDisconnected => "EVDisconnected",
        HardReset => "HardReset",
        Local => "Local",
        Other => "Other",
        PowerLoss => "PowerLoss",
        Reboot => "Reboot",
        Remote => "Remote",
        SoftReset => "SoftReset",
        UnlockCommand => "UnlockCommand",
    }
}

value_set! {
    /// Charging profile purpose
    pub enum ChargingProfilePurpose {
        ChargePointMaxProfile => "ChargePointMaxProfile",
        TxDefaultProfile => "TxDefaultProfile",
        TxProfile => "TxProfile",
    }
}

value_set! {
    /// Charging profile kind
    pub enum ChargingProfileKind {
        Absolute => "Absolute",
        Recurring => "Recurring",
        Relative => "Relative",
    }
}

value_set! {
    /// Recurrency kind for recurring profiles
    pub enum RecurrencyKind {
        Daily => "Daily",
        Weekly => "Weekly",
    }
}

value_set! {
    /// Charging rate unit
    pub enum ChargingRateUnit {
        W => "W",
        A => "A",
    }
}

value_set! {
    /// Reading context for sampled values
    pub enum ReadingContext {
        InterruptionBegin => "Interruption.Begin",
        InterruptionEnd => "Interruption.End",
        Other => "Other",
        SampleClock => "Sample.Clock",
        SamplePeriodic => "Sample.Periodic",
        TransactionBegin => "Transaction.Begin",
        TransactionEnd => "Transaction.End",
        Trigger => "Trigger",
    }
}

value_set! {
    /// Measurand types for meter values
    pub enum Measurand {
        CurrentImport => "Current.Import",
        CurrentOffered => "Current.Offered",
        EnergyActiveImportRegister => "Energy.Active.Import.Register",
        PowerActiveImport => "Power.Active.Import",
        PowerOffered => "Power.Offered",
        SoC => "SoC",
        Temperature => "Temperature",
        Voltage => "Voltage",
    }
}

value_set! {
    /// Unit of measure for sampled values
    pub enum UnitOfMeasure {
        Wh => "Wh",
        KWh => "kWh",
        W => "W",
        KW => "kW",
        A => "A",
        V => "V",
        Celsius => "Celsius",
        Percent => "Percent",
    }
}

// ============================================================================
// Complex Types
// ============================================================================

/// Authorization details for an idTag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdTagInfo {
    pub status: AuthorizationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id_tag: Option<String>,
}

impl IdTagInfo {
    pub fn new(status: AuthorizationStatus) -> Self {
        Self {
            status,
            expiry_date: None,
            parent_id_tag: None,
        }
    }
}

/// Charging schedule period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargingSchedulePeriod {
    pub start_period: i32,
    pub limit: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number_phases: Option<i32>,
}

/// Charging schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargingSchedule {
    pub charging_rate_unit: ChargingRateUnit,
    pub charging_schedule_period: Vec<ChargingSchedulePeriod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_schedule: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_charging_rate: Option<f64>,
}

/// Charging profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargingProfile {
    pub charging_profile_id: i32,
    pub stack_level: i32,
    pub charging_profile_purpose: ChargingProfilePurpose,
    pub charging_profile_kind: ChargingProfileKind,
    pub charging_schedule: ChargingSchedule,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrency_kind: Option<RecurrencyKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<DateTime<Utc>>,
}

/// Sampled value for meter readings
///
/// OCPP 1.6 carries the reading as a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampledValue {
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ReadingContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measurand: Option<Measurand>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<UnitOfMeasure>,
}

/// Meter value with timestamp and samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterValue {
    pub timestamp: DateTime<Utc>,
    pub sampled_value: Vec<SampledValue>,
}

/// One configuration key reported by GetConfiguration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyValue {
    pub key: String,
    pub readonly: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_string_accepts_members() {
        assert_eq!(
            "Accepted".parse::<AvailabilityStatus>().unwrap(),
            AvailabilityStatus::Accepted
        );
        assert_eq!(
            "Scheduled".parse::<AvailabilityStatus>().unwrap(),
            AvailabilityStatus::Scheduled
        );
        assert_eq!(
            "operative".parse::<AvailabilityType>().unwrap(),
            AvailabilityType::Operative
        );
        assert_eq!(
            "SuspendedEVSE".parse::<ChargePointStatus>().unwrap(),
            ChargePointStatus::SuspendedEvse
        );
    }

    #[test]
    fn test_from_string_rejects_outsiders() {
        let err = "ABC".parse::<AvailabilityStatus>().unwrap_err();
        assert_eq!(err.to_string(), "Unexpected AvailabilityStatus: ABC");

        let err = "ABC".parse::<AvailabilityType>().unwrap_err();
        assert_eq!(err.to_string(), "Unexpected AvailabilityType: ABC");

        let err = "".parse::<RegistrationStatus>().unwrap_err();
        assert_eq!(err.to_string(), "Unexpected RegistrationStatus: ");
    }

    #[test]
    fn test_error_code_aliases() {
        assert_eq!(
            "FormationViolation".parse::<ErrorCode>().unwrap(),
            ErrorCode::FormatViolation
        );
        assert_eq!(
            ErrorCode::OccurrenceConstraintViolation.as_str(),
            "OccurenceConstraintViolation"
        );

        let parsed: ErrorCode = serde_json::from_str("\"OccurrenceConstraintViolation\"").unwrap();
        assert_eq!(parsed, ErrorCode::OccurrenceConstraintViolation);
    }

    #[test]
    fn test_serde_uses_wire_strings() {
        let json = serde_json::to_string(&ReadingContext::SamplePeriodic).unwrap();
        assert_eq!(json, "\"Sample.Periodic\"");

        let unit: UnitOfMeasure = serde_json::from_str("\"kWh\"").unwrap();
        assert_eq!(unit, UnitOfMeasure::KWh);
    }

    #[test]
    fn test_charging_profile_serialization() {
        let profile = ChargingProfile {
            charging_profile_id: 1,
            stack_level: 0,
            charging_profile_purpose: ChargingProfilePurpose::TxDefaultProfile,
            charging_profile_kind: ChargingProfileKind::Absolute,
            charging_schedule: ChargingSchedule {
                charging_rate_unit: ChargingRateUnit::W,
                charging_schedule_period: vec![ChargingSchedulePeriod {
                    start_period: 0,
                    limit: 22000.0,
                    number_phases: Some(3),
                }],
                duration: None,
                start_schedule: None,
                min_charging_rate: None,
            },
            transaction_id: None,
            recurrency_kind: None,
            valid_from: None,
            valid_to: None,
        };

        let json = serde_json::to_string(&profile).unwrap();
        assert!(json.contains("\"chargingProfileId\":1"));
        assert!(json.contains("TxDefaultProfile"));
        assert!(json.contains("22000"));
        assert!(!json.contains("validFrom"));
    }
}
