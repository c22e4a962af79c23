// Ingest/broadcast relay

mod connection;
mod hub;

pub use connection::{Connection, Frame, SendError, Subscriber};
pub use hub::{run_broadcaster, BroadcastOutcome, HealthReport, IngestReceipt, RelayHub};

#[cfg(test)]
mod tests;
