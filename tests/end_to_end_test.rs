// Loopback end-to-end test: relay bound on an ephemeral port, real stream
// client over tokio-tungstenite, arbiter fed through the stream bridge.

use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use wardlink::{
    api::create_app,
    arbiter::{attach_stream_client, ArbiterConfig, FreshnessArbiter},
    clock::system_clock,
    config::{RelayConfig, StreamConfig},
    reading::Source,
    relay::RelayHub,
    stream::{ConnectionState, StreamClient},
    subscription::{Envelope, MessageKind},
};

async fn start_relay() -> (Arc<RelayHub>, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let clock = system_clock();
    let hub = RelayHub::spawn(&RelayConfig::default(), clock.clone());
    let app = create_app(Arc::clone(&hub), clock);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (hub, addr)
}

fn stream_config(addr: SocketAddr) -> StreamConfig {
    StreamConfig {
        address: format!("ws://{addr}/ws"),
        reconnect_delay_ms: 200,
        max_reconnect_attempts: 3,
    }
}

/// Poll `check` until it holds or five seconds pass.
async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

async fn next_envelope(rx: &mut mpsc::UnboundedReceiver<Envelope>) -> Envelope {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for envelope")
        .expect("handler channel closed")
}

#[tokio::test]
async fn test_push_reaches_stream_client() {
    let (hub, addr) = start_relay().await;
    let config = stream_config(addr);
    let client = StreamClient::new(&config);

    let (tx, mut rx) = mpsc::unbounded_channel();
    client.subscribe(move |envelope| {
        tx.send(envelope.clone())?;
        Ok(())
    });

    client.connect(&config.address).await.unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);

    let notice = next_envelope(&mut rx).await;
    assert_eq!(notice.kind, MessageKind::Connection);
    assert_eq!(hub.connected_count(), 1);

    let receipt = hub.ingest(&json!({"roomId": "room-101", "temperature": 22.5, "motion": "true"}));
    let update = next_envelope(&mut rx).await;
    assert_eq!(update.kind, MessageKind::HardwareUpdate);

    let reading = update.reading().unwrap();
    assert_eq!(reading.entity_id, "room-101");
    assert_eq!(reading.source, Source::Live);
    assert_eq!(reading.fields.temperature, Some(22.5));
    assert_eq!(reading.fields.motion, Some(true));
    assert_eq!(reading.captured_at, receipt.timestamp);
    assert_eq!(client.latest().unwrap().entity_id, "room-101");

    client.disconnect();
    assert!(eventually(|| hub.connected_count() == 0).await);
}

#[tokio::test]
async fn test_stream_client_feeds_arbiter() {
    let (hub, addr) = start_relay().await;
    let config = stream_config(addr);
    let client = StreamClient::new(&config);

    let arbiter = FreshnessArbiter::new(
        ArbiterConfig {
            seed: Some(3),
            ..ArbiterConfig::vitals()
        },
        system_clock(),
    );
    let _observation = arbiter.observe(["patient-7"], &HashMap::new());
    assert_eq!(arbiter.get("patient-7").unwrap().source, Source::Synthetic);

    let (live_tx, _loop) = arbiter.spawn(32);
    attach_stream_client(&client, live_tx);
    client.connect(&config.address).await.unwrap();
    assert!(eventually(|| hub.connected_count() == 1).await);

    hub.ingest(&json!({"entityId": "patient-7", "heartRate": 77, "bp": "118/76"}));

    assert!(
        eventually(|| {
            arbiter
                .get("patient-7")
                .is_some_and(|r| r.source == Source::Live)
        })
        .await
    );

    let reading = arbiter.get("patient-7").unwrap();
    assert_eq!(reading.fields.heart_rate, Some(77.0));
    let bp = reading.fields.blood_pressure.unwrap();
    assert_eq!((bp.systolic, bp.diastolic), (118, 76));
}

#[tokio::test]
async fn test_connect_to_closed_port_fails() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = StreamClient::new(&StreamConfig {
        max_reconnect_attempts: 1,
        ..stream_config(addr)
    });
    assert!(client.connect(&format!("ws://{addr}/ws")).await.is_err());
    assert!(!client.is_connected());
}
