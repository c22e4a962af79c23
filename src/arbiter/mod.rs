// Freshness arbitration
//
// Per tracked entity, the arbiter merges a live channel (hardware push via the
// stream client, or a database change feed) with the synthetic generator.
// Live data wins while it is fresh; once an entity's live data is older than
// the staleness threshold, every tick publishes a synthetic sample instead.

mod bridge;
mod engine;
mod observation;
mod track;


pub use bridge::{attach_change_feed, attach_stream_client, pump_change_feed, BroadcastChangeFeed, ChangeFeed};
pub use engine::{run_arbiter, FreshnessArbiter, TickOutcome};
pub use observation::Observation;

use crate::config::TrackConfig;
use crate::reading::{Reading, ReadingFields};
use crate::synthetic::TrackKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Arbiter settings for one instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ArbiterConfig {
    pub kind: TrackKind,
    pub tick_interval: Duration,
    pub staleness_threshold: Duration,
    /// When false, stale entities keep their last live value and entities
    /// never seen live publish nothing.
    pub synthesis_enabled: bool,
    pub seed: Option<u64>,
}

impl ArbiterConfig {
    pub fn from_track(kind: TrackKind, track: &TrackConfig) -> Self {
        Self {
            kind,
            tick_interval: track.tick_interval(),
            staleness_threshold: track.staleness_threshold(),
            synthesis_enabled: track.synthesis_enabled,
            seed: track.seed,
        }
    }

    pub fn vitals() -> Self {
        Self::from_track(TrackKind::Vitals, &TrackConfig::vitals())
    }

    pub fn environment() -> Self {
        Self::from_track(TrackKind::Environment, &TrackConfig::environment())
    }
}

/// One update on the live channel.
///
/// This is also the change-feed event shape: `{entityId, fields, recordedAt}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveEvent {
    pub entity_id: String,
    pub fields: ReadingFields,
    pub recorded_at: DateTime<Utc>,
}

impl From<Reading> for LiveEvent {
    fn from(reading: Reading) -> Self {
        Self {
            entity_id: reading.entity_id,
            fields: reading.fields,
            recorded_at: reading.captured_at,
        }
    }
}
