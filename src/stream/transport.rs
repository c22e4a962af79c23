use async_trait::async_trait;
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use super::StreamError;

/// Opens socket connections for the stream client.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Suspends until the socket is open or the attempt fails.
    async fn connect(&self, address: &str) -> Result<Box<dyn MessageStream>, StreamError>;
}

/// Inbound side of one open socket.
#[async_trait]
pub trait MessageStream: Send {
    /// Next text frame. `None` once the socket is closed.
    async fn next_text(&mut self) -> Option<Result<String, StreamError>>;
}

/// WebSocket transport over tokio-tungstenite
#[derive(Clone, Copy, Debug, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, address: &str) -> Result<Box<dyn MessageStream>, StreamError> {
        let (socket, response) = connect_async(address)
            .await
            .map_err(|e| StreamError::ConnectFailed(e.to_string()))?;
        debug!(address = %address, status = %response.status(), "WebSocket handshake complete");
        Ok(Box::new(TungsteniteStream { socket }))
    }
}

struct TungsteniteStream {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl MessageStream for TungsteniteStream {
    async fn next_text(&mut self) -> Option<Result<String, StreamError>> {
        loop {
            match self.socket.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Close(_)) => return None,
                // Pings are answered by tungstenite on the next read
                Ok(_) => continue,
                Err(e) => return Some(Err(StreamError::Protocol(e.to_string()))),
            }
        }
    }
}
