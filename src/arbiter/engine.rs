use crate::arbiter::observation::Observation;
use crate::arbiter::track::{seed_from_live, EntityTrack};
use crate::arbiter::{ArbiterConfig, LiveEvent};
use crate::clock::SharedClock;
use crate::reading::{Reading, Source};
use crate::synthetic::{generator_for, Category, GeneratorStore, SyntheticGenerator};
use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Counts from one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub live: usize,
    pub synthesized: usize,
    /// Stale entities left as-is because synthesis is disabled
    pub stale: usize,
}

/// Merges live and synthetic readings per entity.
pub struct FreshnessArbiter {
    config: ArbiterConfig,
    clock: SharedClock,
    generator: Box<dyn SyntheticGenerator>,

    /// Generator memory, keyed by entity; lifecycle mirrors `tracks`
    store: GeneratorStore,

    /// Lock-free concurrent map of tracked entities
    tracks: DashMap<String, EntityTrack>,

    rng: Mutex<StdRng>,

    /// Source of track epochs
    next_epoch: AtomicU64,

    /// Externally visible `entity_id -> Reading` map
    published: watch::Sender<HashMap<String, Reading>>,
}

impl FreshnessArbiter {
    pub fn new(config: ArbiterConfig, clock: SharedClock) -> Arc<Self> {
        let generator = generator_for(config.kind);
        Self::with_generator(config, clock, generator)
    }

    pub fn with_generator(
        config: ArbiterConfig,
        clock: SharedClock,
        generator: Box<dyn SyntheticGenerator>,
    ) -> Arc<Self> {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let (published, _) = watch::channel(HashMap::new());
        Arc::new(Self {
            config,
            clock,
            generator,
            store: GeneratorStore::new(),
            tracks: DashMap::new(),
            rng: Mutex::new(rng),
            next_epoch: AtomicU64::new(0),
            published,
        })
    }

    pub fn config(&self) -> &ArbiterConfig {
        &self.config
    }

    /// Start tracking `entity_ids` for one consumer.
    ///
    /// `categories` maps entity id to a severity label; ids without one keep
    /// their existing category (or the default for new tracks). The returned
    /// handle releases its references when dropped.
    pub fn observe<I, S>(self: &Arc<Self>, entity_ids: I, categories: &HashMap<String, String>) -> Observation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let ids: Vec<String> = entity_ids
            .into_iter()
            .map(Into::into)
            .filter(|id: &String| seen.insert(id.clone()))
            .collect();

        let now = self.clock.now();
        let mut leases = Vec::with_capacity(ids.len());
        for id in &ids {
            let label = categories.get(id).map(String::as_str);
            let mut track = self.tracks.entry(id.clone()).or_insert_with(|| {
                let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);
                EntityTrack::new(Category::parse(label), epoch)
            });
            track.refs += 1;
            leases.push(track.epoch);
            if label.is_some() {
                track.category = Category::parse(label);
            }

            // Brand new track: show something right away.
            if track.current.is_none() && track.last_live.is_none() && self.config.synthesis_enabled {
                let reading = self.synthesize(id, track.category, now);
                track.last_synthetic = Some(reading.clone());
                track.current = Some(reading);
            }
            debug!(entity_id = %id, refs = track.refs, "Observing entity");
        }
        self.publish();

        Observation::new(Arc::clone(self), ids, leases, self.published.subscribe())
    }

    /// Drop one reference per id; the last reference tears the entity down.
    ///
    /// `epochs[i]` is the epoch of the track `entity_ids[i]` was observed
    /// on. A reference into a track that has since been torn down and
    /// recreated is ignored.
    pub(crate) fn release(&self, entity_ids: &[String], epochs: &[u64]) {
        let mut removed = false;
        for (id, &epoch) in entity_ids.iter().zip(epochs) {
            let gone = self
                .tracks
                .remove_if_mut(id, |_, track| {
                    if track.epoch != epoch {
                        return false;
                    }
                    track.refs = track.refs.saturating_sub(1);
                    track.refs == 0
                })
                .is_some();
            if gone {
                self.store.remove(id);
                removed = true;
                debug!(entity_id = %id, "Entity track released");
            }
        }
        if removed {
            self.publish();
        }
    }

    /// Drop an entity's track and generator state regardless of references.
    /// Returns false if it was not tracked.
    pub fn teardown(&self, entity_id: &str) -> bool {
        let removed = self.tracks.remove(entity_id).is_some();
        self.store.remove(entity_id);
        if removed {
            info!(entity_id = %entity_id, "Entity track torn down");
            self.publish();
        }
        removed
    }

    /// Record a live update and publish it immediately.
    ///
    /// Events for entities nobody observes are ignored.
    pub fn on_live(&self, event: LiveEvent) -> bool {
        let now = self.clock.now();
        {
            let Some(mut track) = self.tracks.get_mut(&event.entity_id) else {
                debug!(entity_id = %event.entity_id, "Live event for untracked entity, ignoring");
                return false;
            };

            if track.current.as_ref().is_some_and(|r| r.source == Source::Synthetic) {
                debug!(entity_id = %event.entity_id, "Live data resumed");
            }

            let mut state = self.store.get(&event.entity_id).unwrap_or_default();
            seed_from_live(self.config.kind, &mut state, &event.fields);
            self.store.insert(&event.entity_id, state);

            let reading = Reading::live(event.entity_id.clone(), event.fields, event.recorded_at);
            track.last_live = Some((reading.clone(), now));
            track.current = Some(reading);
        }
        self.publish();
        true
    }

    /// Re-evaluate every tracked entity against the staleness threshold.
    pub fn tick(&self) -> TickOutcome {
        let now = self.clock.now();
        let threshold = chrono::Duration::from_std(self.config.staleness_threshold)
            .unwrap_or_else(|_| chrono::Duration::weeks(52 * 100));
        let mut outcome = TickOutcome::default();

        for mut entry in self.tracks.iter_mut() {
            let (id, track) = entry.pair_mut();
            if !track.is_stale(now, threshold) {
                outcome.live += 1;
                continue;
            }
            if !self.config.synthesis_enabled {
                outcome.stale += 1;
                continue;
            }

            if track.current.as_ref().is_some_and(|r| r.source == Source::Live) {
                debug!(entity_id = %id, "Live data stale, switching to synthetic");
            }
            let reading = self.synthesize(id, track.category, now);
            track.last_synthetic = Some(reading.clone());
            track.current = Some(reading);
            outcome.synthesized += 1;
        }

        self.publish();
        outcome
    }

    /// Current published map
    pub fn snapshot(&self) -> HashMap<String, Reading> {
        self.published.borrow().clone()
    }

    pub fn get(&self, entity_id: &str) -> Option<Reading> {
        self.published.borrow().get(entity_id).cloned()
    }

    pub fn is_tracked(&self, entity_id: &str) -> bool {
        self.tracks.contains_key(entity_id)
    }

    pub fn tracked_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn has_generator_state(&self, entity_id: &str) -> bool {
        self.store.get(entity_id).is_some()
    }

    pub fn generator_samples(&self, entity_id: &str) -> u64 {
        self.store.get(entity_id).map(|s| s.samples).unwrap_or(0)
    }

    fn synthesize(&self, entity_id: &str, category: Category, now: chrono::DateTime<chrono::Utc>) -> Reading {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        self.store
            .sample(self.generator.as_ref(), entity_id, category, now, &mut *rng)
    }

    fn publish(&self) {
        let map: HashMap<String, Reading> = self
            .tracks
            .iter()
            .filter_map(|t| t.current.clone().map(|r| (t.key().clone(), r)))
            .collect();
        self.published.send_replace(map);
    }
}

/// Event loop: live events and ticks for one arbiter.
///
/// Live events are always handled before a tick that is due at the same
/// moment. Runs until the arbiter is dropped; a closed live channel only
/// stops live input.
pub async fn run_arbiter(arbiter: Weak<FreshnessArbiter>, mut live_rx: mpsc::Receiver<LiveEvent>) {
    let tick_interval = match arbiter.upgrade() {
        Some(a) => a.config.tick_interval,
        None => return,
    };
    let mut ticker = interval(tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut live_open = true;

    loop {
        tokio::select! {
            biased;

            event = live_rx.recv(), if live_open => {
                let Some(arbiter) = arbiter.upgrade() else { break };
                match event {
                    Some(event) => {
                        arbiter.on_live(event);
                    }
                    None => {
                        debug!("Live channel closed, continuing with ticks only");
                        live_open = false;
                    }
                }
            }

            _ = ticker.tick() => {
                let Some(arbiter) = arbiter.upgrade() else { break };
                let outcome = arbiter.tick();
                debug!(
                    live = outcome.live,
                    synthesized = outcome.synthesized,
                    stale = outcome.stale,
                    "Arbiter tick"
                );
            }
        }
    }
    debug!("Arbiter loop stopped");
}

impl FreshnessArbiter {
    /// Spawn the event loop; returns the live channel sender.
    pub fn spawn(self: &Arc<Self>, buffer: usize) -> (mpsc::Sender<LiveEvent>, tokio::task::JoinHandle<()>) {
        let (live_tx, live_rx) = mpsc::channel(buffer.max(1));
        let handle = tokio::spawn(run_arbiter(Arc::downgrade(self), live_rx));
        (live_tx, handle)
    }
}
