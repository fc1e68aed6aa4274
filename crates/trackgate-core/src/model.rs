//! Canonical telemetry model types.
//!
//! Every protocol plugin, whatever its wire format, produces
//! [`PositionRecord`] values. Fields carry canonical units (knots for speed,
//! meters for altitude, decimal degrees for coordinates) regardless of what
//! the device sent; conversion happens in the plugin at extraction time so a
//! record is always self-consistent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Well-known attribute bag keys.
///
/// Plugins are free to add protocol-specific keys, but anything that has a
/// shared meaning across protocols goes under one of these names so
/// downstream consumers see a uniform vocabulary.
pub mod keys {
    pub const INDEX: &str = "index";
    pub const HDOP: &str = "hdop";
    /// Satellites in use.
    pub const SATELLITES: &str = "sat";
    pub const RSSI: &str = "rssi";
    pub const EVENT: &str = "event";
    pub const ALARM: &str = "alarm";
    pub const STATUS: &str = "status";
    /// Meters.
    pub const ODOMETER: &str = "odometer";
    pub const IGNITION: &str = "ignition";
    /// Volts.
    pub const POWER: &str = "power";
    /// Volts.
    pub const BATTERY: &str = "battery";
    /// Percentage.
    pub const BATTERY_LEVEL: &str = "batteryLevel";
    pub const CHARGE: &str = "charge";
    pub const BLOCKED: &str = "blocked";
    pub const DOOR: &str = "door";
    /// Liters.
    pub const FUEL_LEVEL: &str = "fuel";
    pub const VERSION_FW: &str = "versionFw";
    pub const TYPE: &str = "type";
    pub const ARCHIVE: &str = "archive";
    pub const DRIVER_UNIQUE_ID: &str = "driverUniqueId";

    /// Key for the n-th ADC reading ("adc1", "adc2", ...).
    pub fn adc(index: usize) -> String {
        format!("adc{index}")
    }

    /// Key for the n-th digital input/output ("io1", "io2", ...).
    pub fn io(index: usize) -> String {
        format!("io{index}")
    }

    /// Key for the n-th temperature sensor ("temp1", "temp2", ...).
    pub fn temp(index: usize) -> String {
        format!("temp{index}")
    }
}

/// A typed value in the open attribute bag.
///
/// Keeping the tag explicit (rather than stuffing everything into strings)
/// lets the storage layer index numeric attributes without re-parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<u32> for AttributeValue {
    fn from(value: u32) -> Self {
        AttributeValue::Int(value as i64)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Float(value)
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

/// Serving cell tower observed by the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellTower {
    /// Mobile country code
    #[serde(rename = "mobileCountryCode")]
    pub mcc: u16,

    /// Mobile network code
    #[serde(rename = "mobileNetworkCode")]
    pub mnc: u16,

    /// Location area code
    #[serde(rename = "locationAreaCode")]
    pub lac: u32,

    /// Cell identifier
    #[serde(rename = "cellId")]
    pub cid: u64,

    /// Signal strength, if reported
    #[serde(rename = "signalStrength", skip_serializing_if = "Option::is_none")]
    pub rssi: Option<i32>,
}

impl CellTower {
    /// Cell tower from lac/cid only; country and network codes unknown.
    pub fn from_lac_cid(lac: u32, cid: u64) -> Self {
        Self {
            mcc: 0,
            mnc: 0,
            lac,
            cid,
            rssi: None,
        }
    }

    pub fn new(mcc: u16, mnc: u16, lac: u32, cid: u64) -> Self {
        Self {
            mcc,
            mnc,
            lac,
            cid,
            rssi: None,
        }
    }
}

/// Radio network information attached to a position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Network {
    #[serde(rename = "cellTowers", skip_serializing_if = "Vec::is_empty", default)]
    pub cell_towers: Vec<CellTower>,
}

impl Network {
    pub fn single(tower: CellTower) -> Self {
        Self {
            cell_towers: vec![tower],
        }
    }
}

/// One normalized telemetry fix.
///
/// Created once per decoded frame (or once per sub-record for protocols that
/// batch several fixes in one frame), owned by the producing plugin until it
/// is handed to the emit sink, immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    /// Internal device id resolved via the device directory
    #[serde(rename = "deviceId")]
    pub device_id: u64,

    /// Name of the protocol that produced this record
    pub protocol: String,

    /// When the GNSS fix was taken
    #[serde(rename = "fixTime")]
    pub fix_time: DateTime<Utc>,

    /// Device clock at send time; may differ from fix time for buffered
    /// (archive) records
    #[serde(rename = "deviceTime")]
    pub device_time: DateTime<Utc>,

    /// Degrees, [-90, 90]
    pub latitude: f64,

    /// Degrees, [-180, 180]
    pub longitude: f64,

    /// Meters above WGS84
    pub altitude: f64,

    /// Knots
    pub speed: f64,

    /// Degrees, [0, 360)
    pub course: f64,

    /// GNSS fix validity as reported by the device
    pub valid: bool,

    /// Estimated accuracy in meters, if reported
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,

    /// Cell network info, if reported
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<Network>,

    /// Open attribute bag; keys unique, insertion order irrelevant
    pub attributes: HashMap<String, AttributeValue>,
}

impl PositionRecord {
    /// Create an empty record for a device, timestamps defaulting to now.
    ///
    /// Plugins overwrite `fix_time`/`device_time` from the wire; the default
    /// only stands for protocols that carry no clock at all.
    pub fn new(protocol: &str, device_id: u64) -> Self {
        let now = Utc::now();
        Self {
            device_id,
            protocol: protocol.to_string(),
            fix_time: now,
            device_time: now,
            latitude: 0.0,
            longitude: 0.0,
            altitude: 0.0,
            speed: 0.0,
            course: 0.0,
            valid: false,
            accuracy: None,
            network: None,
            attributes: HashMap::new(),
        }
    }

    /// Set both fix and device time to the same instant.
    pub fn set_time(&mut self, time: DateTime<Utc>) {
        self.fix_time = time;
        self.device_time = time;
    }

    /// Insert a typed attribute, replacing any previous value for the key.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        self.attributes.insert(key.into(), value.into());
    }

    /// Read back an attribute, mostly useful in tests.
    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }
}

/// Well-known command types understood by `ProtocolPlugin::encode`.
pub mod command_types {
    pub const CUSTOM: &str = "custom";
    pub const POSITION_SINGLE: &str = "positionSingle";
    pub const POSITION_PERIODIC: &str = "positionPeriodic";
    pub const ENGINE_STOP: &str = "engineStop";
    pub const ENGINE_RESUME: &str = "engineResume";
    pub const ALARM_ARM: &str = "alarmArm";
    pub const ALARM_DISARM: &str = "alarmDisarm";
}

/// An outbound command destined for a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Internal device id of the target
    #[serde(rename = "deviceId")]
    pub device_id: u64,

    /// Command type, one of [`command_types`] or a protocol-specific name
    #[serde(rename = "type")]
    pub command_type: String,

    /// Command parameters (frequency, custom data, ...)
    pub attributes: HashMap<String, AttributeValue>,
}

impl Command {
    pub fn new(device_id: u64, command_type: &str) -> Self {
        Self {
            device_id,
            command_type: command_type.to_string(),
            attributes: HashMap::new(),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.attributes.get(key) {
            Some(AttributeValue::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.attributes.get(key) {
            Some(AttributeValue::Int(v)) => Some(*v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_attribute_bag() {
        let mut position = PositionRecord::new("gt06", 42);
        position.set(keys::IGNITION, true);
        position.set(keys::POWER, 12.4);
        position.set(keys::SATELLITES, 9_i64);
        position.set(keys::adc(1), 512_i64);

        assert_eq!(position.get(keys::IGNITION), Some(&AttributeValue::Bool(true)));
        assert_eq!(position.get("adc1"), Some(&AttributeValue::Int(512)));
        assert_eq!(position.get("missing"), None);
    }

    #[test]
    fn test_attribute_overwrite_keeps_keys_unique() {
        let mut position = PositionRecord::new("test", 1);
        position.set(keys::BATTERY, 3.7);
        position.set(keys::BATTERY, 3.9);

        assert_eq!(position.attributes.len(), 1);
        assert_eq!(position.get(keys::BATTERY), Some(&AttributeValue::Float(3.9)));
    }

    #[test]
    fn test_position_serialize() {
        let mut position = PositionRecord::new("gps103", 7);
        position.set_time(Utc.with_ymd_and_hms(2017, 5, 19, 11, 5, 40).unwrap());
        position.latitude = 49.2742;
        position.longitude = -123.1234;
        position.valid = true;
        position.set(keys::ALARM, "sos");

        let json = serde_json::to_string(&position).unwrap();
        assert!(json.contains("\"deviceId\":7"));
        assert!(json.contains("\"protocol\":\"gps103\""));
        assert!(json.contains("\"alarm\":\"sos\""));
        // No accuracy reported, so the field is absent entirely
        assert!(!json.contains("accuracy"));
    }

    #[test]
    fn test_cell_tower_serialize() {
        let network = Network::single(CellTower::new(460, 0, 0x2793, 0x0e23));
        let json = serde_json::to_string(&network).unwrap();
        assert!(json.contains("\"mobileCountryCode\":460"));
        assert!(json.contains("\"cellId\":3619"));
    }

    #[test]
    fn test_command_accessors() {
        let mut command = Command::new(5, command_types::POSITION_PERIODIC);
        command.set("frequency", 30_i64);
        command.set("data", "ping");

        assert_eq!(command.get_int("frequency"), Some(30));
        assert_eq!(command.get_string("data"), Some("ping"));
        assert_eq!(command.get_string("frequency"), None);
    }
}
