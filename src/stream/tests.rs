use super::*;
use crate::config::StreamConfig;
use crate::reading::{Reading, ReadingFields};
use crate::subscription::{Envelope, MessageKind};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Scripted connector: each attempt pops the next outcome. An exhausted
/// script refuses every further attempt.
struct ScriptedConnector {
    script: Mutex<VecDeque<Option<mpsc::UnboundedReceiver<String>>>>,
    attempts: AtomicU32,
}

impl ScriptedConnector {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            attempts: AtomicU32::new(0),
        })
    }

    /// Next attempt succeeds; returns the sender feeding that socket.
    fn accept_next(&self) -> mpsc::UnboundedSender<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.script.lock().unwrap().push_back(Some(rx));
        tx
    }

    fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

struct ChannelStream(mpsc::UnboundedReceiver<String>);

#[async_trait]
impl MessageStream for ChannelStream {
    async fn next_text(&mut self) -> Option<Result<String, StreamError>> {
        self.0.recv().await.map(Ok)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, _address: &str) -> Result<Box<dyn MessageStream>, StreamError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().unwrap().pop_front().flatten() {
            Some(rx) => Ok(Box::new(ChannelStream(rx))),
            None => Err(StreamError::ConnectFailed("connection refused".to_string())),
        }
    }
}

fn config(max_attempts: u32) -> StreamConfig {
    StreamConfig {
        address: "ws://relay.test/ws".to_string(),
        reconnect_delay_ms: 3000,
        max_reconnect_attempts: max_attempts,
    }
}

fn update_frame(entity_id: &str, heart_rate: f64) -> String {
    let fields = ReadingFields {
        heart_rate: Some(heart_rate),
        ..Default::default()
    };
    let at = Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap();
    Envelope::hardware_update(&Reading::live(entity_id, fields, at)).to_json()
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn test_connect_delivers_to_handlers_in_order() {
    let connector = ScriptedConnector::new();
    let socket = connector.accept_next();
    let client = StreamClient::with_connector(&config(3), connector.clone());

    let seen = Arc::new(Mutex::new(Vec::new()));
    for n in 1..=3 {
        let seen = Arc::clone(&seen);
        client.subscribe(move |envelope| {
            assert_eq!(envelope.kind, MessageKind::HardwareUpdate);
            seen.lock().unwrap().push(n);
            Ok(())
        });
    }

    client.connect("ws://relay.test/ws").await.unwrap();
    assert!(client.is_connected());

    socket.send(update_frame("room-101", 80.0)).unwrap();
    settle().await;

    assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    assert_eq!(client.latest().unwrap().fields.heart_rate, Some(80.0));
}

#[tokio::test(start_paused = true)]
async fn test_failing_handlers_are_isolated() {
    let connector = ScriptedConnector::new();
    let socket = connector.accept_next();
    let client = StreamClient::with_connector(&config(3), connector.clone());

    let delivered = Arc::new(AtomicU32::new(0));
    client.subscribe(|_| Err(anyhow::anyhow!("handler exploded")));
    client.subscribe(|_| panic!("handler panicked"));
    let counter = Arc::clone(&delivered);
    client.subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    client.connect("ws://relay.test/ws").await.unwrap();
    socket.send(update_frame("room-1", 70.0)).unwrap();
    socket.send(update_frame("room-1", 71.0)).unwrap();
    settle().await;

    assert_eq!(delivered.load(Ordering::SeqCst), 2);
    assert!(client.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_unparseable_frames_are_skipped() {
    let connector = ScriptedConnector::new();
    let socket = connector.accept_next();
    let client = StreamClient::with_connector(&config(3), connector.clone());

    let kinds = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&kinds);
    client.subscribe(move |envelope| {
        sink.lock().unwrap().push(envelope.kind);
        Ok(())
    });

    client.connect("ws://relay.test/ws").await.unwrap();
    socket.send("not json".to_string()).unwrap();
    socket
        .send(Envelope::connected(Utc::now()).to_json())
        .unwrap();
    settle().await;

    assert_eq!(*kinds.lock().unwrap(), vec![MessageKind::Connection]);
    assert!(client.latest().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_stops_after_max_attempts() {
    let connector = ScriptedConnector::new();
    let client = StreamClient::with_connector(&config(3), connector.clone());

    let result = client.connect("ws://relay.test/ws").await;
    assert!(matches!(result, Err(StreamError::ConnectFailed(_))));

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.attempts(), 3);
    assert_eq!(client.state(), ConnectionState::Disconnected);

    // Explicit connect starts a fresh round
    let _ = client.connect("ws://relay.test/ws").await;
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.attempts(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_reconnects_after_socket_close() {
    let connector = ScriptedConnector::new();
    let first = connector.accept_next();
    let second = connector.accept_next();
    let client = StreamClient::with_connector(&config(2), connector.clone());

    let seen = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&seen);
    client.subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    client.connect("ws://relay.test/ws").await.unwrap();
    drop(first);
    settle().await;
    assert_eq!(client.state(), ConnectionState::Reconnecting);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(client.is_connected());
    assert_eq!(connector.attempts(), 2);

    second.send(update_frame("patient-7", 90.0)).unwrap();
    settle().await;
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_zero_attempt_cap_still_reconnects_after_close() {
    let connector = ScriptedConnector::new();
    let first = connector.accept_next();
    let _second = connector.accept_next();
    let client = StreamClient::with_connector(&config(0), connector.clone());

    client.connect("ws://relay.test/ws").await.unwrap();
    drop(first);
    settle().await;
    assert_eq!(client.state(), ConnectionState::Reconnecting);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(client.is_connected());
    assert_eq!(connector.attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_pending_retry() {
    let connector = ScriptedConnector::new();
    let client = StreamClient::with_connector(&config(5), connector.clone());

    let _ = client.connect("ws://relay.test/ws").await;
    settle().await;
    assert_eq!(client.state(), ConnectionState::Reconnecting);

    client.disconnect();
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(connector.attempts(), 1);
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_and_unsubscribe_are_idempotent() {
    let connector = ScriptedConnector::new();
    let _socket = connector.accept_next();
    let client = StreamClient::with_connector(&config(3), connector.clone());

    let id = client.subscribe(|_| Ok(()));
    client.subscribe(|_| Ok(()));
    assert!(client.unsubscribe(id));
    assert!(!client.unsubscribe(id));
    assert_eq!(client.handler_count(), 1);

    client.connect("ws://relay.test/ws").await.unwrap();
    client.disconnect();
    client.disconnect();

    assert!(!client.is_connected());
    assert_eq!(client.handler_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_state_changes_observable() {
    let connector = ScriptedConnector::new();
    let _socket = connector.accept_next();
    let client = StreamClient::with_connector(&config(3), connector.clone());
    let mut states = client.state_changes();
    assert_eq!(*states.borrow(), ConnectionState::Disconnected);

    client.connect("ws://relay.test/ws").await.unwrap();
    states.changed().await.unwrap();
    assert_eq!(*states.borrow_and_update(), ConnectionState::Connected);
}
