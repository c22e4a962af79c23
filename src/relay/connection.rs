use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Pre-serialized outbound frame, shared across the fan-out.
pub type Frame = Arc<str>;

/// Why a write to a connection did not go through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// Connection already observed closed
    Closed,
    /// Outbound queue is full: the consumer is too slow
    Full,
}

/// Relay-side handle to one socket.
///
/// A connection is Open until closed by either side or a write fails;
/// Closed is terminal.
#[derive(Debug)]
pub struct Connection {
    id: Uuid,
    open: Arc<AtomicBool>,
    tx: mpsc::Sender<Frame>,
}

/// Create a connection and the subscriber that drains it.
pub(crate) fn pair(buffer: usize) -> (Arc<Connection>, Subscriber) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    let id = Uuid::new_v4();
    let open = Arc::new(AtomicBool::new(true));
    let connection = Arc::new(Connection {
        id,
        open: Arc::clone(&open),
        tx,
    });
    (connection, Subscriber { id, open, rx })
}

impl Connection {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.tx.is_closed()
    }

    /// Mark closed. Returns true only for the call that performed the transition.
    pub fn close(&self) -> bool {
        self.open.swap(false, Ordering::AcqRel)
    }

    /// Queue a frame without waiting. Any failure closes the connection.
    pub fn try_send(&self, frame: Frame) -> Result<(), SendError> {
        if !self.is_open() {
            self.close();
            return Err(SendError::Closed);
        }
        match self.tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.close();
                Err(SendError::Full)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.close();
                Err(SendError::Closed)
            }
        }
    }
}

/// Consumer side of a registered connection.
///
/// Dropping it closes the connection; the relay prunes it on the next
/// broadcast.
#[derive(Debug)]
pub struct Subscriber {
    id: Uuid,
    open: Arc<AtomicBool>,
    rx: mpsc::Receiver<Frame>,
}

impl Subscriber {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Next outbound frame, or None once the relay has dropped this connection
    /// and the queue is drained.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Frame> {
        self.rx.try_recv().ok()
    }

    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.close();
    }
}
