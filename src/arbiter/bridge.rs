use crate::arbiter::LiveEvent;
use crate::stream::{HandlerId, StreamClient};
use anyhow::anyhow;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Feed live hardware updates from a stream client into an arbiter's live
/// channel. Non-update messages are ignored.
///
/// A full live channel surfaces as a handler error, which the client logs;
/// the arbiter then falls back to synthetic data on its next tick if the
/// gap lasts.
pub fn attach_stream_client(client: &StreamClient, live_tx: mpsc::Sender<LiveEvent>) -> HandlerId {
    client.subscribe(move |envelope| {
        let Some(reading) = envelope.reading() else {
            return Ok(());
        };
        live_tx
            .try_send(LiveEvent::from(reading))
            .map_err(|e| anyhow!("live channel rejected update: {e}"))
    })
}

/// A source of per-entity change events, such as a database change feed.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Subscribe to changes for the given entities. The receiver closes when
    /// the feed shuts down.
    async fn subscribe(&self, entity_ids: &[String]) -> anyhow::Result<mpsc::Receiver<LiveEvent>>;
}

/// In-process change feed over a tokio broadcast channel.
pub struct BroadcastChangeFeed {
    tx: broadcast::Sender<LiveEvent>,
    buffer: usize,
}

impl BroadcastChangeFeed {
    pub fn new(buffer: usize) -> Self {
        let buffer = buffer.max(1);
        let (tx, _) = broadcast::channel(buffer);
        Self { tx, buffer }
    }

    /// Live forwarding tasks, one per open subscription
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publish one change; returns how many subscriptions received it.
    pub fn publish(&self, event: LiveEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }
}

#[async_trait]
impl ChangeFeed for BroadcastChangeFeed {
    async fn subscribe(&self, entity_ids: &[String]) -> anyhow::Result<mpsc::Receiver<LiveEvent>> {
        let wanted: HashSet<String> = entity_ids.iter().cloned().collect();
        let mut source = self.tx.subscribe();
        let (tx, rx) = mpsc::channel(self.buffer);

        tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    // Subscriber went away on a quiet feed
                    _ = tx.closed() => break,
                    received = source.recv() => received,
                };
                match received {
                    Ok(event) => {
                        if !wanted.contains(&event.entity_id) {
                            continue;
                        }
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Change feed subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("Change feed forwarder stopped");
        });

        Ok(rx)
    }
}

/// Forward change events into a live channel until either side closes.
/// Returns the number of events forwarded.
pub async fn pump_change_feed(mut changes: mpsc::Receiver<LiveEvent>, live_tx: mpsc::Sender<LiveEvent>) -> usize {
    let mut forwarded = 0;
    while let Some(event) = changes.recv().await {
        if live_tx.send(event).await.is_err() {
            debug!("Live channel closed, stopping change feed pump");
            break;
        }
        forwarded += 1;
    }
    forwarded
}

/// Subscribe to `feed` for `entity_ids` and pump its events into `live_tx`
/// on a background task.
pub async fn attach_change_feed(
    feed: Arc<dyn ChangeFeed>,
    entity_ids: &[String],
    live_tx: mpsc::Sender<LiveEvent>,
) -> anyhow::Result<JoinHandle<usize>> {
    let changes = feed.subscribe(entity_ids).await?;
    Ok(tokio::spawn(pump_change_feed(changes, live_tx)))
}
