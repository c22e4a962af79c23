// Synthetic fallback readings
//
// Each generator is a pure function of explicit per-entity state: the caller
// hands in the previous GeneratorState and gets back a Reading plus the next
// state. GeneratorStore keeps that state keyed by entity for one owner.

pub mod bands;
mod environment;
mod store;
mod trigger;
mod vitals;


pub use environment::EnvironmentGenerator;
pub use store::GeneratorStore;
pub use trigger::{Trigger, TriggerSpec};
pub use vitals::VitalsGenerator;

use crate::reading::Reading;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Clinical severity band used to parameterize vitals synthesis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[default]
    Stable,
    Moderate,
    Critical,
}

impl Category {
    /// Parse a free-form label. Unknown or missing labels fall back to the
    /// most permissive band.
    pub fn parse(label: Option<&str>) -> Self {
        match label.map(|l| l.trim().to_ascii_lowercase()).as_deref() {
            Some("moderate") => Category::Moderate,
            Some("critical") => Category::Critical,
            _ => Category::Stable,
        }
    }
}

/// Which family of entity a track synthesizes for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    /// Patient vitals
    Vitals,
    /// Room sensors
    Environment,
}

/// Numeric fields whose previous value drives the random walk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Metric {
    HeartRate,
    Systolic,
    Diastolic,
    BodyTemperature,
    OxygenSaturation,
    RoomTemperature,
    Humidity,
    Distance,
    Light,
    Battery,
}

/// Per-entity generator memory.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GeneratorState {
    /// Last emitted value per field
    pub previous: HashMap<Metric, f64>,

    /// Motion window
    pub motion: Trigger,

    /// Occupancy window ("in bed")
    pub in_bed: Trigger,

    /// Samples emitted so far
    pub samples: u64,
}

impl GeneratorState {
    pub fn previous(&self, metric: Metric) -> Option<f64> {
        self.previous.get(&metric).copied()
    }

    /// Seed the walk with a known value, e.g. the last live reading.
    pub fn seed(&mut self, metric: Metric, value: f64) {
        self.previous.insert(metric, value);
    }
}

/// `next_sample(entity_id, category, previous_state) -> (Reading, new_state)`.
///
/// `now` is the only time source; all randomness comes from `rng`.
pub trait SyntheticGenerator: Send + Sync {
    fn next_sample(
        &self,
        entity_id: &str,
        category: Category,
        previous: &GeneratorState,
        now: DateTime<Utc>,
        rng: &mut dyn RngCore,
    ) -> (Reading, GeneratorState);
}

pub fn generator_for(kind: TrackKind) -> Box<dyn SyntheticGenerator> {
    match kind {
        TrackKind::Vitals => Box::new(VitalsGenerator),
        TrackKind::Environment => Box::new(EnvironmentGenerator::default()),
    }
}
