// Provenance-tagged readings and payload parsing
pub mod reading;

// Injectable wall clock
pub mod clock;

// Random-walk fallback data
pub mod synthetic;

// Hardware ingest and socket fan-out
pub mod relay;

// Socket protocol and per-connection loop
pub mod subscription;

// HTTP and WebSocket APIs
pub mod api;

// Resilient socket client
pub mod stream;

// Live vs synthetic arbitration
pub mod arbiter;

// Configuration
pub mod config;
