use crate::reading::{Reading, ReadingFields};
use crate::synthetic::{Category, GeneratorState, Metric, TrackKind};
use chrono::{DateTime, Duration, Utc};

/// Per-entity arbitration state.
#[derive(Debug, Clone)]
pub(crate) struct EntityTrack {
    pub category: Category,

    /// Distinguishes this track from earlier ones for the same id
    pub epoch: u64,

    /// Observations currently referencing this entity
    pub refs: usize,

    /// Last live reading and when the arbiter received it
    pub last_live: Option<(Reading, DateTime<Utc>)>,

    pub last_synthetic: Option<Reading>,

    /// What consumers currently see
    pub current: Option<Reading>,
}

impl EntityTrack {
    pub fn new(category: Category, epoch: u64) -> Self {
        Self {
            category,
            epoch,
            refs: 0,
            last_live: None,
            last_synthetic: None,
            current: None,
        }
    }

    /// Stale when never seen live, or when the last live arrival is strictly
    /// older than the threshold.
    pub fn is_stale(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        match &self.last_live {
            None => true,
            Some((_, arrived)) => now - *arrived > threshold,
        }
    }
}

/// Continue the synthetic walk from the last live values so a fallback
/// period starts near where the real signal left off.
pub(crate) fn seed_from_live(kind: TrackKind, state: &mut GeneratorState, fields: &ReadingFields) {
    let temperature_metric = match kind {
        TrackKind::Vitals => Metric::BodyTemperature,
        TrackKind::Environment => Metric::RoomTemperature,
    };
    let pairs = [
        (Metric::HeartRate, fields.heart_rate),
        (Metric::OxygenSaturation, fields.oxygen_saturation),
        (temperature_metric, fields.temperature),
        (Metric::Humidity, fields.humidity),
        (Metric::Distance, fields.distance),
        (Metric::Light, fields.light_level),
        (Metric::Battery, fields.battery),
        (Metric::Systolic, fields.blood_pressure.map(|bp| bp.systolic as f64)),
        (Metric::Diastolic, fields.blood_pressure.map(|bp| bp.diastolic as f64)),
    ];
    for (metric, value) in pairs {
        if let Some(value) = value {
            state.seed(metric, value);
        }
    }
}
