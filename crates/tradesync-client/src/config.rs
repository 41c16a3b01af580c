//! Client configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (TRADESYNC_*)
//! - TOML configuration file (`TRADESYNC_CONFIG` or the default search paths)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tradesync_core::JitterConfig;
use tradesync_protocol::FrameDecoder;
use tradesync_transport::{endpoint_from_origin, WebSocketConfig};

use crate::session::SessionConfig;

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Origin of the page the client is embedded in.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Jitter simulator configuration.
    #[serde(default)]
    pub jitter: JitterSettings,

    /// Tracked markers.
    #[serde(default)]
    pub markers: MarkersConfig,

    /// Status endpoint configuration.
    #[serde(default)]
    pub status: StatusConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Path of the event stream on the origin host.
    #[serde(default = "default_stream_path")]
    pub path: String,

    /// Maximum frame size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Handshake timeout in milliseconds. Unset waits indefinitely.
    #[serde(default)]
    pub handshake_timeout_ms: Option<u64>,
}

/// Jitter simulator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JitterSettings {
    /// Tick interval in milliseconds.
    #[serde(default = "default_jitter_interval")]
    pub interval_ms: u64,

    /// Maximum offset per axis per tick.
    #[serde(default = "default_max_offset")]
    pub max_offset: f64,

    /// Lower clamp bound.
    #[serde(default = "default_clamp_min")]
    pub clamp_min: f64,

    /// Upper clamp bound.
    #[serde(default = "default_clamp_max")]
    pub clamp_max: f64,

    /// Lower bound for seeded positions.
    #[serde(default = "default_seed_min")]
    pub seed_min: f64,

    /// Upper bound for seeded positions.
    #[serde(default = "default_seed_max")]
    pub seed_max: f64,

    /// Fixed RNG seed. Unset seeds from entropy.
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

/// Markers to track when no view layer supplies them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarkersConfig {
    /// Marker ids.
    #[serde(default)]
    pub ids: Vec<String>,
}

/// Status endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    /// Serve the status endpoint.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Host to bind to.
    #[serde(default = "default_status_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_status_port")]
    pub port: u16,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// Clamp bounds are out of order or outside the viewport.
    #[error("Invalid clamp bounds [{0}, {1}]")]
    ClampBounds(f64, f64),

    /// Seed range is inverted or outside the viewport.
    #[error("Invalid seed range [{0}, {1}]")]
    SeedRange(f64, f64),

    /// Jitter offset is negative or wider than the clamp range.
    #[error("Invalid max offset {0}")]
    MaxOffset(f64),

    /// Zero tick interval.
    #[error("Jitter interval must be positive")]
    Interval,

    /// Zero frame size limit.
    #[error("Max message size must be positive")]
    MaxMessageSize,
}

// Default value functions
fn default_origin() -> String {
    std::env::var("TRADESYNC_ORIGIN").unwrap_or_else(|_| "http://127.0.0.1:8080".to_string())
}

fn default_stream_path() -> String {
    tradesync_transport::DEFAULT_STREAM_PATH.to_string()
}

fn default_max_message_size() -> usize {
    tradesync_protocol::codec::DEFAULT_MAX_FRAME_SIZE
}

fn default_jitter_interval() -> u64 {
    5_000 // 5 seconds
}

fn default_max_offset() -> f64 {
    2.0
}

fn default_clamp_min() -> f64 {
    5.0
}

fn default_clamp_max() -> f64 {
    85.0
}

fn default_seed_min() -> f64 {
    10.0
}

fn default_seed_max() -> f64 {
    70.0
}

fn default_true() -> bool {
    true
}

fn default_status_host() -> String {
    std::env::var("TRADESYNC_STATUS_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn default_status_port() -> u16 {
    std::env::var("TRADESYNC_STATUS_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8090)
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            transport: TransportConfig::default(),
            jitter: JitterSettings::default(),
            markers: MarkersConfig::default(),
            status: StatusConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            path: default_stream_path(),
            max_message_size: default_max_message_size(),
            handshake_timeout_ms: None,
        }
    }
}

impl Default for JitterSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_jitter_interval(),
            max_offset: default_max_offset(),
            clamp_min: default_clamp_min(),
            clamp_max: default_clamp_max(),
            seed_min: default_seed_min(),
            seed_max: default_seed_max(),
            rng_seed: None,
        }
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_status_host(),
            port: default_status_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from file or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var("TRADESYNC_CONFIG") {
            let expanded = shellexpand::tilde(&path);
            return Self::from_file(expanded.as_ref());
        }

        let config_paths = [
            "tradesync.toml",
            "/etc/tradesync/tradesync.toml",
            "~/.config/tradesync/tradesync.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        // Fall back to defaults with environment overrides
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let j = &self.jitter;

        if !(0.0..=100.0).contains(&j.clamp_min)
            || !(0.0..=100.0).contains(&j.clamp_max)
            || j.clamp_min >= j.clamp_max
        {
            return Err(ConfigError::ClampBounds(j.clamp_min, j.clamp_max));
        }
        if !(0.0..=100.0).contains(&j.seed_min)
            || !(0.0..=100.0).contains(&j.seed_max)
            || j.seed_min > j.seed_max
        {
            return Err(ConfigError::SeedRange(j.seed_min, j.seed_max));
        }
        // Offset is bounded by the width of the clamp range
        if !(0.0..=j.clamp_max - j.clamp_min).contains(&j.max_offset) {
            return Err(ConfigError::MaxOffset(j.max_offset));
        }
        if j.interval_ms == 0 {
            return Err(ConfigError::Interval);
        }
        if self.transport.max_message_size == 0 {
            return Err(ConfigError::MaxMessageSize);
        }

        Ok(())
    }

    /// WebSocket transport settings.
    #[must_use]
    pub fn websocket_config(&self) -> WebSocketConfig {
        WebSocketConfig {
            handshake_timeout: self.transport.handshake_timeout_ms.map(Duration::from_millis),
        }
    }

    /// Jitter simulator settings.
    #[must_use]
    pub fn jitter_config(&self) -> JitterConfig {
        JitterConfig {
            interval: Duration::from_millis(self.jitter.interval_ms),
            max_offset: self.jitter.max_offset,
            clamp_min: self.jitter.clamp_min,
            clamp_max: self.jitter.clamp_max,
            seed_min: self.jitter.seed_min,
            seed_max: self.jitter.seed_max,
        }
    }

    /// Build the session settings, deriving the stream endpoint from the origin.
    ///
    /// # Errors
    ///
    /// Returns an error if the origin is not a valid http(s) origin.
    pub fn session_config(&self) -> Result<SessionConfig> {
        let endpoint = endpoint_from_origin(&self.origin, &self.transport.path)
            .with_context(|| format!("Cannot derive stream endpoint from {}", self.origin))?;

        Ok(SessionConfig {
            endpoint,
            decoder: FrameDecoder::with_max_frame_size(self.transport.max_message_size),
            jitter: self.jitter_config(),
            rng_seed: self.jitter.rng_seed,
        })
    }

    /// Status endpoint bind address.
    #[must_use]
    pub fn status_addr(&self) -> String {
        format!("{}:{}", self.status.host, self.status.port)
    }
}
