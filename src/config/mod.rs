use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Complete wardlink configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WardlinkConfig {
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default = "TrackConfig::vitals", deserialize_with = "vitals_section")]
    pub vitals: TrackConfig,
    #[serde(default = "TrackConfig::environment", deserialize_with = "environment_section")]
    pub environment: TrackConfig,
}

/// Ingest/broadcast relay configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Address the HTTP/WebSocket server binds to
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Entity id for pushes that do not name one
    #[serde(default = "default_entity_id")]
    pub default_entity_id: String,
    /// Outbound frames queued per connection before it counts as slow
    #[serde(default = "default_connection_buffer")]
    pub connection_buffer: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_entity_id() -> String {
    "hardware".to_string()
}

fn default_connection_buffer() -> usize {
    64
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            default_entity_id: default_entity_id(),
            connection_buffer: default_connection_buffer(),
        }
    }
}

/// Stream client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// Relay socket address
    #[serde(default = "default_stream_address")]
    pub address: String,
    /// Fixed delay before each reconnect attempt (milliseconds)
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Consecutive failed attempts before giving up
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
}

fn default_stream_address() -> String {
    "ws://localhost:3001/ws".to_string()
}

fn default_reconnect_delay_ms() -> u64 {
    3000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

impl StreamConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            address: default_stream_address(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
        }
    }
}

/// Freshness arbiter settings for one class of entity.
///
/// Tick interval and staleness threshold are independent; nothing requires
/// the threshold to be a multiple of the tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackConfig {
    /// How often stale entities are re-synthesized (milliseconds)
    pub tick_interval_ms: u64,
    /// Age after which live data counts as stale (milliseconds)
    pub staleness_threshold_ms: u64,
    /// Publish synthetic readings for stale entities
    pub synthesis_enabled: bool,
    /// Fixed RNG seed for reproducible synthesis
    pub seed: Option<u64>,
}

/// A `[vitals]` or `[environment]` table as written. Missing keys fall back
/// to that track's defaults.
#[derive(Debug, Default, Deserialize)]
struct TrackSection {
    tick_interval_ms: Option<u64>,
    staleness_threshold_ms: Option<u64>,
    synthesis_enabled: Option<bool>,
    seed: Option<u64>,
}

impl TrackSection {
    fn over(self, base: TrackConfig) -> TrackConfig {
        TrackConfig {
            tick_interval_ms: self.tick_interval_ms.unwrap_or(base.tick_interval_ms),
            staleness_threshold_ms: self.staleness_threshold_ms.unwrap_or(base.staleness_threshold_ms),
            synthesis_enabled: self.synthesis_enabled.unwrap_or(base.synthesis_enabled),
            seed: self.seed.or(base.seed),
        }
    }
}

fn vitals_section<'de, D: Deserializer<'de>>(deserializer: D) -> Result<TrackConfig, D::Error> {
    Ok(TrackSection::deserialize(deserializer)?.over(TrackConfig::vitals()))
}

fn environment_section<'de, D: Deserializer<'de>>(deserializer: D) -> Result<TrackConfig, D::Error> {
    Ok(TrackSection::deserialize(deserializer)?.over(TrackConfig::environment()))
}

fn default_staleness_threshold_ms() -> u64 {
    10_000
}

fn default_synthesis_enabled() -> bool {
    true
}

impl TrackConfig {
    pub fn vitals() -> Self {
        Self {
            tick_interval_ms: 3000,
            staleness_threshold_ms: default_staleness_threshold_ms(),
            synthesis_enabled: default_synthesis_enabled(),
            seed: None,
        }
    }

    pub fn environment() -> Self {
        Self {
            tick_interval_ms: 2000,
            ..Self::vitals()
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn staleness_threshold(&self) -> Duration {
        Duration::from_millis(self.staleness_threshold_ms)
    }
}

impl Default for WardlinkConfig {
    fn default() -> Self {
        Self {
            relay: RelayConfig::default(),
            stream: StreamConfig::default(),
            vitals: TrackConfig::vitals(),
            environment: TrackConfig::environment(),
        }
    }
}

impl WardlinkConfig {
    /// Apply `WARDLINK_*` environment overrides on top of file values.
    pub fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("WARDLINK_BIND_ADDR") {
            self.relay.bind_addr = v;
        }
        if let Ok(v) = std::env::var("WARDLINK_STREAM_ADDRESS") {
            self.stream.address = v;
        }
        if let Ok(v) = std::env::var("WARDLINK_STALENESS_MS") {
            match v.parse::<u64>() {
                Ok(ms) => {
                    self.vitals.staleness_threshold_ms = ms;
                    self.environment.staleness_threshold_ms = ms;
                }
                Err(e) => warn!(value = %v, error = %e, "Ignoring invalid WARDLINK_STALENESS_MS"),
            }
        }
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> Result<WardlinkConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: WardlinkConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}

/// Resolve configuration: optional file, then env overrides.
pub fn resolve_config(path: Option<&str>) -> Result<WardlinkConfig> {
    let mut config = match path {
        Some(p) if Path::new(p).exists() => load_config(p)?,
        Some(p) => {
            warn!(path = %p, "Config file not found, using defaults");
            WardlinkConfig::default()
        }
        None => WardlinkConfig::default(),
    };
    config.apply_env();
    Ok(config)
}
