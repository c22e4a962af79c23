use crate::arbiter::FreshnessArbiter;
use crate::reading::Reading;
use futures::Stream;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt;

/// One consumer's view of a set of entities.
///
/// Poll with `snapshot`/`get`, or wait for pushes with `changed`/`updates`.
/// Dropping the handle releases its entity references; the last release for
/// an entity drops its track and generator state.
pub struct Observation {
    arbiter: Arc<FreshnessArbiter>,
    entity_ids: Vec<String>,
    /// Track epoch each id was observed on, parallel to `entity_ids`
    epochs: Vec<u64>,
    rx: watch::Receiver<HashMap<String, Reading>>,
}

impl Observation {
    pub(crate) fn new(
        arbiter: Arc<FreshnessArbiter>,
        entity_ids: Vec<String>,
        epochs: Vec<u64>,
        rx: watch::Receiver<HashMap<String, Reading>>,
    ) -> Self {
        Self {
            arbiter,
            entity_ids,
            epochs,
            rx,
        }
    }

    pub fn entity_ids(&self) -> &[String] {
        &self.entity_ids
    }

    /// Current readings for this observation's entities. Entities with no
    /// data yet are absent.
    pub fn snapshot(&self) -> HashMap<String, Reading> {
        filter(&self.rx.borrow(), &self.entity_ids)
    }

    pub fn get(&self, entity_id: &str) -> Option<Reading> {
        if !self.entity_ids.iter().any(|id| id == entity_id) {
            return None;
        }
        self.rx.borrow().get(entity_id).cloned()
    }

    /// Wait for the next publish. Returns false if the arbiter is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    /// Stream of maps for this observation's entities, one per publish.
    /// Yields the current map first.
    pub fn updates(&self) -> impl Stream<Item = HashMap<String, Reading>> + Send + 'static {
        let ids = self.entity_ids.clone();
        WatchStream::new(self.rx.clone()).map(move |all| filter(&all, &ids))
    }
}

impl Drop for Observation {
    fn drop(&mut self) {
        self.arbiter.release(&self.entity_ids, &self.epochs);
    }
}

fn filter(all: &HashMap<String, Reading>, ids: &[String]) -> HashMap<String, Reading> {
    ids.iter()
        .filter_map(|id| all.get(id).map(|r| (id.clone(), r.clone())))
        .collect()
}
