use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub(crate) mod fields;

pub use fields::{BloodPressure, ReadingFields};

/// Where a reading came from.
///
/// Consumers branch UI treatment ("Live" vs "Sim" badge) on this tag alone,
/// never on which fields happen to be present.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Hardware push or database change feed
    Live,
    /// Random-walk fallback generator
    Synthetic,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Live => "live",
            Source::Synthetic => "synthetic",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reading is one immutable, provenance-tagged measurement for an entity.
///
/// Every value crossing a component boundary (relay, stream client, arbiter)
/// travels as a Reading. Fields from different sources are never merged into
/// one Reading.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    /// Tracked subject (room or patient id, opaque)
    pub entity_id: String,

    /// Measured values
    pub fields: ReadingFields,

    /// Capture time (relay receipt time for hardware pushes)
    pub captured_at: DateTime<Utc>,

    /// Provenance tag
    pub source: Source,
}

impl Reading {
    pub fn live(entity_id: impl Into<String>, fields: ReadingFields, captured_at: DateTime<Utc>) -> Self {
        Self {
            entity_id: entity_id.into(),
            fields,
            captured_at,
            source: Source::Live,
        }
    }

    pub fn synthetic(
        entity_id: impl Into<String>,
        fields: ReadingFields,
        captured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            fields,
            captured_at,
            source: Source::Synthetic,
        }
    }

    pub fn is_live(&self) -> bool {
        self.source == Source::Live
    }
}
