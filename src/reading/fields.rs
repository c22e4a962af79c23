use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Blood pressure pair, carried on the wire as `"systolic/diastolic"`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BloodPressure {
    pub systolic: u32,
    pub diastolic: u32,
}

impl BloodPressure {
    pub fn new(systolic: u32, diastolic: u32) -> Self {
        Self {
            systolic,
            diastolic,
        }
    }
}

impl fmt::Display for BloodPressure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.systolic, self.diastolic)
    }
}

impl FromStr for BloodPressure {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (sys, dia) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| format!("blood pressure '{}' is not 'systolic/diastolic'", s))?;
        let systolic = parse_whole(sys).ok_or_else(|| format!("invalid systolic '{}'", sys))?;
        let diastolic = parse_whole(dia).ok_or_else(|| format!("invalid diastolic '{}'", dia))?;
        Ok(Self::new(systolic, diastolic))
    }
}

fn parse_whole(s: &str) -> Option<u32> {
    let v: f64 = s.trim().parse().ok()?;
    (v.is_finite() && v >= 0.0).then(|| v.round() as u32)
}

impl Serialize for BloodPressure {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BloodPressure {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        blood_pressure_from_value(&value)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid blood pressure: {}", value)))
    }
}

/// The fixed set of telemetry fields plus an open extension map.
///
/// All fields are optional: a hardware node reports whatever sensors it has,
/// and the vitals and environment generators fill disjoint subsets.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingFields {
    /// Degrees Celsius
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    /// Relative humidity, percent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub motion: Option<bool>,

    /// Beats per minute
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heart_rate: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub blood_pressure: Option<BloodPressure>,

    /// SpO2, percent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oxygen_saturation: Option<f64>,

    /// Proximity sensor distance, centimetres
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,

    /// Lux
    #[serde(skip_serializing_if = "Option::is_none")]
    pub light_level: Option<f64>,

    /// Battery charge, percent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery: Option<f64>,

    /// Derived from the proximity sensor
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_bed: Option<bool>,

    /// Anything else the node reported
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Keys that may carry the entity id in a hardware payload, in priority order.
const ENTITY_KEYS: &[&str] = &["entityId", "entity_id", "roomId", "room_id", "deviceId", "device_id"];

/// Keys dropped from the payload rather than kept as extension fields.
/// Hardware clocks are untrusted, so any caller-supplied timestamp is discarded.
const IGNORED_KEYS: &[&str] = &["timestamp", "capturedAt", "captured_at", "source"];

impl ReadingFields {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Build fields from an arbitrary JSON payload without ever failing.
    ///
    /// Non-object payloads produce empty fields. Recognised keys accept
    /// camelCase, snake_case and a few short aliases; values that cannot be
    /// coerced are dropped. Unrecognised keys go to `extra`.
    pub fn from_payload(payload: &Value) -> Self {
        let mut fields = Self::default();
        let Some(object) = payload.as_object() else {
            return fields;
        };

        for (key, value) in object {
            if ENTITY_KEYS.contains(&key.as_str()) || IGNORED_KEYS.contains(&key.as_str()) {
                continue;
            }
            match key.as_str() {
                "temperature" | "temp" => fields.temperature = as_number(value),
                "humidity" => fields.humidity = as_number(value),
                "motion" | "motionDetected" | "motion_detected" => fields.motion = as_bool(value),
                "heartRate" | "heart_rate" | "hr" => fields.heart_rate = as_number(value),
                "bloodPressure" | "blood_pressure" | "bp" => {
                    fields.blood_pressure = blood_pressure_from_value(value)
                }
                "oxygenSaturation" | "oxygen_saturation" | "spo2" | "spO2" => {
                    fields.oxygen_saturation = as_number(value)
                }
                "distance" => fields.distance = as_number(value),
                "lightLevel" | "light_level" | "light" => fields.light_level = as_number(value),
                "battery" | "batteryLevel" | "battery_level" => fields.battery = as_number(value),
                "inBed" | "in_bed" => fields.in_bed = as_bool(value),
                _ => {
                    fields.extra.insert(key.clone(), value.clone());
                }
            }
        }

        fields
    }
}

/// Pull the entity id out of a hardware payload, if it names one.
pub(crate) fn entity_id_from_payload(payload: &Value) -> Option<String> {
    let object = payload.as_object()?;
    ENTITY_KEYS.iter().find_map(|key| match object.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn as_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|v| v != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn blood_pressure_from_value(value: &Value) -> Option<BloodPressure> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Object(o) => {
            let systolic = as_number(o.get("systolic")?)?;
            let diastolic = as_number(o.get("diastolic")?)?;
            if systolic < 0.0 || diastolic < 0.0 {
                return None;
            }
            Some(BloodPressure::new(systolic.round() as u32, diastolic.round() as u32))
        }
        _ => None,
    }
}
