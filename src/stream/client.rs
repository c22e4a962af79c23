use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::transport::{Connector, MessageStream, TungsteniteConnector};
use super::StreamError;
use crate::config::StreamConfig;
use crate::reading::Reading;
use crate::subscription::Envelope;

/// Disconnected → Connecting → Connected → Disconnected → Reconnecting → Connecting …
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Waiting out the fixed delay before the next attempt
    Reconnecting,
}

/// Token returned by `subscribe`, used to unregister a handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandlerId(Uuid);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

type Handler = Arc<dyn Fn(&Envelope) -> anyhow::Result<()> + Send + Sync>;

/// State shared between the client handle and its supervisor task.
struct Shared {
    handlers: RwLock<Vec<(HandlerId, Handler)>>,
    latest: RwLock<Option<Reading>>,
    state_tx: watch::Sender<ConnectionState>,
    /// Bumped by every connect/disconnect; stale supervisors stop writing state
    generation: AtomicU64,
}

impl Shared {
    fn set_state(&self, generation: u64, state: ConnectionState) {
        if self.generation.load(Ordering::Acquire) == generation {
            self.state_tx.send_replace(state);
        }
    }

    /// Parse one inbound frame and deliver it to every handler in
    /// registration order. A failing handler is logged and skipped.
    fn dispatch(&self, text: &str) {
        let envelope: Envelope = match serde_json::from_str(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Dropping unparseable stream message");
                return;
            }
        };

        if let Some(reading) = envelope.reading() {
            *self.latest.write().unwrap_or_else(|e| e.into_inner()) = Some(reading);
        }

        // Snapshot so handlers may subscribe/unsubscribe while being called.
        let handlers: Vec<(HandlerId, Handler)> = self
            .handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        for (id, handler) in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(&envelope))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(handler_id = %id, error = %e, "Stream handler failed"),
                Err(_) => error!(handler_id = %id, "Stream handler panicked"),
            }
        }
    }
}

/// Resilient client for the relay socket.
pub struct StreamClient {
    connector: Arc<dyn Connector>,
    reconnect_delay: Duration,
    max_attempts: u32,
    shared: Arc<Shared>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl StreamClient {
    pub fn new(config: &StreamConfig) -> Self {
        Self::with_connector(config, Arc::new(TungsteniteConnector))
    }

    pub fn with_connector(config: &StreamConfig, connector: Arc<dyn Connector>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            connector,
            reconnect_delay: config.reconnect_delay(),
            // A cap of zero would stop reconnects after every clean close
            max_attempts: config.max_reconnect_attempts.max(1),
            shared: Arc::new(Shared {
                handlers: RwLock::new(Vec::new()),
                latest: RwLock::new(None),
                state_tx,
                generation: AtomicU64::new(0),
            }),
            supervisor: Mutex::new(None),
        }
    }

    /// Connect to `address`, replacing any existing session.
    ///
    /// Suspends until the first attempt opens or fails. A failed first
    /// attempt still leaves the reconnect loop running in the background
    /// until the attempt cap is reached.
    pub async fn connect(&self, address: &str) -> Result<(), StreamError> {
        let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let (first_tx, first_rx) = oneshot::channel();

        let task = tokio::spawn(supervise(
            Arc::clone(&self.connector),
            Arc::clone(&self.shared),
            address.to_string(),
            self.reconnect_delay,
            self.max_attempts,
            generation,
            first_tx,
        ));

        let previous = self
            .supervisor
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }

        first_rx.await.unwrap_or(Err(StreamError::Cancelled))
    }

    /// Register a handler for every parsed inbound envelope.
    pub fn subscribe<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&Envelope) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = HandlerId(Uuid::new_v4());
        self.shared
            .handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: HandlerId) -> bool {
        let mut handlers = self.shared.handlers.write().unwrap_or_else(|e| e.into_inner());
        let before = handlers.len();
        handlers.retain(|(h, _)| *h != id);
        handlers.len() != before
    }

    pub fn handler_count(&self) -> usize {
        self.shared.handlers.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state_tx.borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Most recent reading received, if any.
    pub fn latest(&self) -> Option<Reading> {
        self.shared.latest.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Close the socket, cancel any pending retry and clear all handlers.
    /// Idempotent.
    pub fn disconnect(&self) {
        self.shared.generation.fetch_add(1, Ordering::AcqRel);
        if let Some(task) = self.supervisor.lock().unwrap_or_else(|e| e.into_inner()).take() {
            task.abort();
            info!("Stream client disconnected");
        }
        self.shared.handlers.write().unwrap_or_else(|e| e.into_inner()).clear();
        self.shared.state_tx.send_replace(ConnectionState::Disconnected);
    }
}

impl Drop for StreamClient {
    fn drop(&mut self) {
        if let Some(task) = self.supervisor.get_mut().unwrap_or_else(|e| e.into_inner()).take() {
            task.abort();
        }
    }
}

/// Connect, pump messages until the socket closes, wait, retry.
async fn supervise(
    connector: Arc<dyn Connector>,
    shared: Arc<Shared>,
    address: String,
    delay: Duration,
    max_attempts: u32,
    generation: u64,
    first_tx: oneshot::Sender<Result<(), StreamError>>,
) {
    let mut first = Some(first_tx);
    let mut failures: u32 = 0;

    loop {
        shared.set_state(generation, ConnectionState::Connecting);

        match connector.connect(&address).await {
            Ok(mut stream) => {
                failures = 0;
                shared.set_state(generation, ConnectionState::Connected);
                info!(address = %address, "Stream connected");
                if let Some(tx) = first.take() {
                    let _ = tx.send(Ok(()));
                }

                pump(&shared, stream.as_mut()).await;

                shared.set_state(generation, ConnectionState::Disconnected);
                info!(address = %address, "Stream closed");
            }
            Err(e) => {
                failures += 1;
                shared.set_state(generation, ConnectionState::Disconnected);
                warn!(address = %address, attempt = failures, error = %e, "Stream connection failed");
                if let Some(tx) = first.take() {
                    let _ = tx.send(Err(e));
                }
            }
        }

        if failures >= max_attempts {
            warn!(
                address = %address,
                attempts = failures,
                "Giving up on stream until connect is called again"
            );
            break;
        }

        shared.set_state(generation, ConnectionState::Reconnecting);
        info!(delay_ms = delay.as_millis() as u64, "Scheduling stream reconnect");
        tokio::time::sleep(delay).await;
    }
}

async fn pump(shared: &Shared, stream: &mut dyn MessageStream) {
    while let Some(frame) = stream.next_text().await {
        match frame {
            Ok(text) => shared.dispatch(&text),
            Err(e) => {
                warn!(error = %e, "Stream read failed");
                break;
            }
        }
    }
    debug!("Stream pump finished");
}
