// Socket protocol and per-connection loop

pub mod manager;
pub mod protocol;

pub use manager::ConnectionManager;
pub use protocol::{Envelope, MessageKind};
