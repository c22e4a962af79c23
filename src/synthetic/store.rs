use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::RngCore;

use super::{Category, GeneratorState, SyntheticGenerator};
use crate::reading::Reading;

/// Per-entity generator state, owned by one arbiter (or test) instance.
pub struct GeneratorStore {
    states: DashMap<String, GeneratorState>,
}

impl GeneratorStore {
    pub fn new() -> Self {
        Self {
            states: DashMap::new(),
        }
    }

    /// Produce the next sample for `entity_id` and remember the new state.
    pub fn sample(
        &self,
        generator: &dyn SyntheticGenerator,
        entity_id: &str,
        category: Category,
        now: DateTime<Utc>,
        rng: &mut dyn RngCore,
    ) -> Reading {
        let mut state = self.states.entry(entity_id.to_string()).or_default();
        let (reading, next) = generator.next_sample(entity_id, category, &state, now, rng);
        *state = next;
        reading
    }

    pub fn get(&self, entity_id: &str) -> Option<GeneratorState> {
        self.states.get(entity_id).map(|s| s.clone())
    }

    /// Replace an entity's state, e.g. to continue the walk from a live value.
    pub fn insert(&self, entity_id: &str, state: GeneratorState) {
        self.states.insert(entity_id.to_string(), state);
    }

    pub fn remove(&self, entity_id: &str) -> Option<GeneratorState> {
        self.states.remove(entity_id).map(|(_, state)| state)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

impl Default for GeneratorStore {
    fn default() -> Self {
        Self::new()
    }
}
