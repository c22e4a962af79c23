// Resilient stream client
//
// One socket per dashboard session. Inbound envelopes fan out to registered
// handlers; closed or refused sockets are retried on a fixed delay up to a
// bounded number of consecutive failures.

mod client;
mod transport;

#[cfg(test)]
mod tests;

pub use client::{ConnectionState, HandlerId, StreamClient};
pub use transport::{Connector, MessageStream, TungsteniteConnector};

use std::fmt;

/// Transport-level failures. Consumers only ever see these as a
/// connection-state flag or the result of `connect`.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamError {
    ConnectFailed(String),
    Protocol(String),
    /// The attempt was cancelled by `disconnect` or a newer `connect`
    Cancelled,
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::ConnectFailed(msg) => write!(f, "connection failed: {}", msg),
            StreamError::Protocol(msg) => write!(f, "protocol error: {}", msg),
            StreamError::Cancelled => write!(f, "connection attempt cancelled"),
        }
    }
}

impl std::error::Error for StreamError {}
