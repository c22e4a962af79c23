use crate::reading::Reading;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Socket message type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Server → Client, sent once when a connection is registered
    Connection,
    /// Server → Client, one ingested reading
    HardwareUpdate,
    /// Either direction
    Error,
    /// Anything this build does not know about
    #[serde(other)]
    Unknown,
}

/// The one JSON envelope used in both directions:
/// `{type, data?, message?, timestamp}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: MessageKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    pub fn connected(timestamp: DateTime<Utc>) -> Self {
        Self {
            kind: MessageKind::Connection,
            data: None,
            message: Some("Connected to hardware relay".to_string()),
            timestamp,
        }
    }

    pub fn hardware_update(reading: &Reading) -> Self {
        Self {
            kind: MessageKind::HardwareUpdate,
            data: serde_json::to_value(reading).ok(),
            message: None,
            timestamp: reading.captured_at,
        }
    }

    pub fn error(message: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind: MessageKind::Error,
            data: None,
            message: Some(message.into()),
            timestamp,
        }
    }

    /// The reading carried by a `hardware_update`, if this is one and it parses.
    pub fn reading(&self) -> Option<Reading> {
        if self.kind != MessageKind::HardwareUpdate {
            return None;
        }
        serde_json::from_value(self.data.clone()?).ok()
    }

    pub fn to_json(&self) -> String {
        // Envelope holds only strings, timestamps and JSON values.
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::ReadingFields;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_connected_envelope_shape() {
        let at = Utc.with_ymd_and_hms(2024, 2, 1, 9, 30, 0).unwrap();
        let value = serde_json::to_value(Envelope::connected(at)).unwrap();
        assert_eq!(value["type"], json!("connection"));
        assert!(value.get("data").is_none());
        assert_eq!(value["timestamp"], json!("2024-02-01T09:30:00Z"));
    }

    #[test]
    fn test_hardware_update_carries_reading() {
        let at = Utc.with_ymd_and_hms(2024, 2, 1, 9, 30, 0).unwrap();
        let fields = ReadingFields {
            temperature: Some(21.5),
            ..Default::default()
        };
        let reading = Reading::live("room-101", fields, at);
        let envelope = Envelope::hardware_update(&reading);

        let text = envelope.to_json();
        assert!(text.contains("\"type\":\"hardware_update\""));

        let parsed: Envelope = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.reading(), Some(reading));
    }

    #[test]
    fn test_unknown_type_parses() {
        let parsed: Envelope =
            serde_json::from_str(r#"{"type":"metrics_update","timestamp":"2024-02-01T09:30:00Z"}"#)
                .unwrap();
        assert_eq!(parsed.kind, MessageKind::Unknown);
        assert_eq!(parsed.reading(), None);
    }
}
