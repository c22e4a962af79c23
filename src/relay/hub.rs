use crate::clock::SharedClock;
use crate::config::RelayConfig;
use crate::reading::{fields::entity_id_from_payload, Reading, ReadingFields};
use crate::relay::connection::{self, Connection, Frame, SendError, Subscriber};
use crate::subscription::Envelope;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result of accepting one hardware push.
#[derive(Debug, Clone)]
pub struct IngestReceipt {
    pub success: bool,
    pub timestamp: DateTime<Utc>,
    pub reading: Reading,
}

/// Synchronous health snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub connected_clients: usize,
    pub total_ingested: u64,
    pub dropped_connections: u64,
}

/// Outcome of one fan-out pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    pub delivered: usize,
    pub dropped: usize,
}

/// Ingest/broadcast relay: turns hardware pushes into socket fan-out.
///
/// Ingest never waits on broadcast. Accepted readings go onto an ordered
/// queue drained by `run_broadcaster`, so receipt order is preserved for every
/// connection. Nothing is persisted or retried.
pub struct RelayHub {
    /// Concurrent connection set, keyed by connection id
    connections: DashMap<Uuid, Arc<Connection>>,

    /// Accepted readings awaiting fan-out
    queue_tx: mpsc::UnboundedSender<Reading>,

    clock: SharedClock,
    default_entity_id: String,
    connection_buffer: usize,

    total_ingested: AtomicU64,
    dropped_connections: AtomicU64,
}

impl RelayHub {
    /// Build a hub and the receiving end of its broadcast queue. The caller
    /// drives the queue with `run_broadcaster`; see `RelayHub::spawn`.
    pub fn new(config: &RelayConfig, clock: SharedClock) -> (Arc<Self>, mpsc::UnboundedReceiver<Reading>) {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let hub = Arc::new(Self {
            connections: DashMap::new(),
            queue_tx,
            clock,
            default_entity_id: config.default_entity_id.clone(),
            connection_buffer: config.connection_buffer,
            total_ingested: AtomicU64::new(0),
            dropped_connections: AtomicU64::new(0),
        });
        (hub, queue_rx)
    }

    /// Build a hub and spawn its broadcaster on the current runtime.
    pub fn spawn(config: &RelayConfig, clock: SharedClock) -> Arc<Self> {
        let (hub, queue_rx) = Self::new(config, clock);
        tokio::spawn(run_broadcaster(Arc::downgrade(&hub), queue_rx));
        hub
    }

    /// Accept a pushed reading.
    ///
    /// The relay's receipt time replaces any caller timestamp. Payloads that
    /// are not JSON objects still succeed with empty fields.
    pub fn ingest(&self, payload: &Value) -> IngestReceipt {
        let timestamp = self.clock.now();
        let entity_id =
            entity_id_from_payload(payload).unwrap_or_else(|| self.default_entity_id.clone());
        let reading = Reading::live(entity_id, ReadingFields::from_payload(payload), timestamp);

        self.total_ingested.fetch_add(1, Ordering::Relaxed);

        info!(
            entity_id = %reading.entity_id,
            empty = reading.fields.is_empty(),
            "Ingested hardware reading"
        );

        if self.queue_tx.send(reading.clone()).is_err() {
            // Broadcaster gone (shutdown); ingest stays best-effort.
            debug!("Broadcast queue closed, reading not fanned out");
        }

        IngestReceipt {
            success: true,
            timestamp,
            reading,
        }
    }

    /// Register a new broadcast target. The connection's first frame is the
    /// one-time `connection` notice.
    pub fn subscribe(&self) -> Subscriber {
        let (connection, subscriber) = connection::pair(self.connection_buffer);
        let notice: Frame = Envelope::connected(self.clock.now()).to_json().into();
        // Fresh queue with capacity >= 1 always has room for the notice.
        let _ = connection.try_send(notice);

        self.connections.insert(connection.id(), connection);
        info!(
            connection_id = %subscriber.id(),
            connected = self.connected_count(),
            "Client connected"
        );
        subscriber
    }

    /// Remove a connection from the fan-out set. Safe to call repeatedly.
    pub fn unsubscribe(&self, id: Uuid) -> bool {
        match self.connections.remove(&id) {
            Some((_, connection)) => {
                connection.close();
                info!(connection_id = %id, "Client disconnected");
                true
            }
            None => false,
        }
    }

    /// Write one `hardware_update` to every open connection.
    ///
    /// The set is snapshotted before writing so concurrent subscribe and
    /// unsubscribe never race the iteration. A connection that is closed or
    /// whose queue is full is dropped; others are unaffected.
    pub fn broadcast(&self, reading: &Reading) -> BroadcastOutcome {
        let frame: Frame = Envelope::hardware_update(reading).to_json().into();
        let targets: Vec<Arc<Connection>> =
            self.connections.iter().map(|c| Arc::clone(c.value())).collect();

        let mut outcome = BroadcastOutcome::default();
        for connection in targets {
            match connection.try_send(Arc::clone(&frame)) {
                Ok(()) => outcome.delivered += 1,
                Err(e) => {
                    if self.connections.remove(&connection.id()).is_some() {
                        self.dropped_connections.fetch_add(1, Ordering::Relaxed);
                        outcome.dropped += 1;
                        match e {
                            SendError::Full => warn!(
                                connection_id = %connection.id(),
                                "Dropping slow client, outbound queue full"
                            ),
                            SendError::Closed => debug!(
                                connection_id = %connection.id(),
                                "Pruned closed client"
                            ),
                        }
                    }
                }
            }
        }

        debug!(
            entity_id = %reading.entity_id,
            delivered = outcome.delivered,
            dropped = outcome.dropped,
            "Broadcast hardware update"
        );
        outcome
    }

    /// Number of currently open connections
    pub fn connected_count(&self) -> usize {
        self.connections.iter().filter(|c| c.value().is_open()).count()
    }

    pub fn health(&self) -> HealthReport {
        HealthReport {
            status: "ok".to_string(),
            timestamp: self.clock.now(),
            connected_clients: self.connected_count(),
            total_ingested: self.total_ingested.load(Ordering::Relaxed),
            dropped_connections: self.dropped_connections.load(Ordering::Relaxed),
        }
    }
}

/// Drain the broadcast queue in receipt order until the hub is dropped.
pub async fn run_broadcaster(hub: Weak<RelayHub>, mut queue_rx: mpsc::UnboundedReceiver<Reading>) {
    while let Some(reading) = queue_rx.recv().await {
        let Some(hub) = hub.upgrade() else {
            break;
        };
        hub.broadcast(&reading);
    }
    debug!("Relay broadcaster stopped");
}
