use super::*;
use crate::clock::{Clock, ManualClock, SharedClock};
use crate::config::RelayConfig;
use crate::reading::Source;
use crate::subscription::{Envelope, MessageKind};
use chrono::{Duration, TimeZone, Utc};
use serde_json::json;
use std::sync::Arc;

fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap()))
}

fn config(buffer: usize) -> RelayConfig {
    RelayConfig {
        connection_buffer: buffer,
        ..RelayConfig::default()
    }
}

fn parse(frame: &Frame) -> Envelope {
    serde_json::from_str(frame).unwrap()
}

#[test]
fn test_ingest_with_no_connections() {
    let (hub, _queue) = RelayHub::new(&RelayConfig::default(), manual_clock());

    let receipt = hub.ingest(&json!({"temperature": 21.5, "humidity": 48}));
    assert!(receipt.success);
    assert_eq!(receipt.reading.fields.temperature, Some(21.5));
    assert_eq!(receipt.reading.fields.humidity, Some(48.0));

    let health = hub.health();
    assert_eq!(health.status, "ok");
    assert_eq!(health.connected_clients, 0);
    assert_eq!(health.total_ingested, 1);
}

#[test]
fn test_ingest_stamps_receipt_time() {
    let clock = manual_clock();
    let (hub, _queue) = RelayHub::new(&RelayConfig::default(), clock.clone() as SharedClock);
    clock.advance(Duration::seconds(5));

    let receipt = hub.ingest(&json!({"temperature": 22.0, "timestamp": "1970-01-01T00:00:00Z"}));
    assert_eq!(receipt.timestamp, clock.now());
    assert_eq!(receipt.reading.captured_at, clock.now());
    assert_eq!(receipt.reading.source, Source::Live);
}

#[test]
fn test_malformed_payload_still_succeeds() {
    let (hub, _queue) = RelayHub::new(&RelayConfig::default(), manual_clock());

    let receipt = hub.ingest(&json!("not an object"));
    assert!(receipt.success);
    assert!(receipt.reading.fields.is_empty());
    assert_eq!(receipt.reading.entity_id, RelayConfig::default().default_entity_id);
}

#[test]
fn test_ingest_uses_payload_entity_id() {
    let (hub, _queue) = RelayHub::new(&RelayConfig::default(), manual_clock());
    let receipt = hub.ingest(&json!({"roomId": "room-101", "motion": true}));
    assert_eq!(receipt.reading.entity_id, "room-101");
    assert_eq!(receipt.reading.fields.motion, Some(true));
}

#[test]
fn test_subscribe_sends_connected_notice_first() {
    let (hub, _queue) = RelayHub::new(&RelayConfig::default(), manual_clock());
    let mut subscriber = hub.subscribe();

    let notice = parse(&subscriber.try_recv().unwrap());
    assert_eq!(notice.kind, MessageKind::Connection);
    assert!(subscriber.try_recv().is_none());
    assert_eq!(hub.connected_count(), 1);
}

#[test]
fn test_broadcast_reaches_every_open_connection() {
    let (hub, _queue) = RelayHub::new(&RelayConfig::default(), manual_clock());
    let mut subscribers: Vec<Subscriber> = (0..3).map(|_| hub.subscribe()).collect();

    let receipt = hub.ingest(&json!({"temperature": 21.5}));
    let outcome = hub.broadcast(&receipt.reading);
    assert_eq!(outcome, BroadcastOutcome { delivered: 3, dropped: 0 });

    for subscriber in &mut subscribers {
        let _notice = subscriber.try_recv().unwrap();
        let update = parse(&subscriber.try_recv().unwrap());
        assert_eq!(update.kind, MessageKind::HardwareUpdate);
        assert_eq!(update.reading(), Some(receipt.reading.clone()));
    }
}

#[test]
fn test_closed_connection_pruned_on_next_broadcast() {
    let (hub, _queue) = RelayHub::new(&RelayConfig::default(), manual_clock());
    let mut kept = hub.subscribe();
    let gone = hub.subscribe();
    drop(gone);

    assert_eq!(hub.connected_count(), 1);

    let receipt = hub.ingest(&json!({"humidity": 50}));
    let outcome = hub.broadcast(&receipt.reading);
    assert_eq!(outcome, BroadcastOutcome { delivered: 1, dropped: 1 });
    assert_eq!(hub.health().dropped_connections, 1);

    let _notice = kept.try_recv().unwrap();
    assert!(kept.try_recv().is_some());

    // Second pass has nothing left to prune
    let outcome = hub.broadcast(&receipt.reading);
    assert_eq!(outcome, BroadcastOutcome { delivered: 1, dropped: 0 });
}

#[test]
fn test_slow_consumer_dropped_without_blocking_others() {
    let (hub, _queue) = RelayHub::new(&config(2), manual_clock());
    let mut slow = hub.subscribe();
    let mut fast = hub.subscribe();

    let receipt = hub.ingest(&json!({"temperature": 20.0}));
    // Queue of 2 holds the notice and one update
    hub.broadcast(&receipt.reading);
    let _ = fast.try_recv();
    let _ = fast.try_recv();

    let outcome = hub.broadcast(&receipt.reading);
    assert_eq!(outcome, BroadcastOutcome { delivered: 1, dropped: 1 });
    assert!(!slow.is_open());

    // Slow consumer drains what it had, then sees the end of the stream
    assert!(slow.try_recv().is_some());
    assert!(slow.try_recv().is_some());
    assert!(slow.try_recv().is_none());
    assert!(fast.try_recv().is_some());
}

#[test]
fn test_unsubscribe_is_idempotent() {
    let (hub, _queue) = RelayHub::new(&RelayConfig::default(), manual_clock());
    let subscriber = hub.subscribe();
    let id = subscriber.id();

    assert!(hub.unsubscribe(id));
    assert!(!hub.unsubscribe(id));
    assert!(!subscriber.is_open());
    assert_eq!(hub.connected_count(), 0);
}

#[tokio::test]
async fn test_spawned_broadcaster_preserves_receipt_order() {
    let hub = RelayHub::spawn(&RelayConfig::default(), manual_clock());
    let mut subscriber = hub.subscribe();
    let _notice = subscriber.recv().await.unwrap();

    for i in 0..20 {
        hub.ingest(&json!({"roomId": "room-1", "distance": i}));
    }

    for i in 0..20 {
        let update = parse(&subscriber.recv().await.unwrap());
        let reading = update.reading().unwrap();
        assert_eq!(reading.fields.distance, Some(i as f64));
    }
}

#[tokio::test]
async fn test_broadcaster_stops_when_hub_dropped() {
    let (hub, queue) = RelayHub::new(&RelayConfig::default(), manual_clock());
    let task = tokio::spawn(run_broadcaster(Arc::downgrade(&hub), queue));
    drop(hub);
    task.await.unwrap();
}
