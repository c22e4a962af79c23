use crate::clock::SharedClock;
use crate::relay::{RelayHub, Subscriber};
use crate::subscription::protocol::{Envelope, MessageKind};
use axum::extract::ws::{Message, WebSocket};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Drives one WebSocket between the relay's fan-out queue and the socket.
pub struct ConnectionManager {
    hub: Arc<RelayHub>,
    clock: SharedClock,
}

impl ConnectionManager {
    pub fn new(hub: Arc<RelayHub>, clock: SharedClock) -> Self {
        Self { hub, clock }
    }

    /// Handle WebSocket connection lifecycle
    pub async fn handle(self, mut socket: WebSocket) {
        let mut subscriber = self.hub.subscribe();
        let connection_id = subscriber.id();

        loop {
            tokio::select! {
                // Frames queued by the relay (connection notice, updates)
                frame = subscriber.recv() => {
                    match frame {
                        Some(frame) => {
                            if let Err(e) = socket.send(Message::Text(frame.to_string())).await {
                                warn!(connection_id = %connection_id, error = %e, "Socket write failed");
                                break;
                            }
                        }
                        None => {
                            info!(connection_id = %connection_id, "Relay dropped connection");
                            break;
                        }
                    }
                }

                // Incoming client frames
                msg = socket.recv() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Err(e) = self.handle_client_message(&mut socket, &subscriber, &text).await {
                                error!(connection_id = %connection_id, error = %e, "Failed to answer client message");
                                break;
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = socket.send(Message::Pong(data)).await {
                                error!(error = %e, "Failed to send pong");
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            info!(connection_id = %connection_id, "WebSocket client disconnected");
                            break;
                        }
                        Some(Ok(_)) => {
                            // Ignore binary, pong messages
                        }
                        Some(Err(e)) => {
                            warn!(connection_id = %connection_id, error = %e, "WebSocket error");
                            break;
                        }
                    }
                }
            }
        }

        subscriber.close();
        self.hub.unsubscribe(connection_id);
    }

    /// Client frames are informational. Errors are logged; anything that is
    /// not an envelope gets an `error` reply and the connection stays up.
    async fn handle_client_message(
        &self,
        socket: &mut WebSocket,
        subscriber: &Subscriber,
        text: &str,
    ) -> anyhow::Result<()> {
        match serde_json::from_str::<Envelope>(text) {
            Ok(envelope) if envelope.kind == MessageKind::Error => {
                warn!(
                    connection_id = %subscriber.id(),
                    message = envelope.message.as_deref().unwrap_or(""),
                    "Client reported error"
                );
            }
            Ok(_) => {}
            Err(e) => {
                let reply = Envelope::error(format!("invalid message: {}", e), self.clock.now());
                socket.send(Message::Text(reply.to_json())).await?;
            }
        }
        Ok(())
    }
}
