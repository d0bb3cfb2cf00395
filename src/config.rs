//! Configuration parsing for the Spillway load driver.
//!
//! Supports:
//! - CLI arguments via clap
//! - Environment variable overrides
//! - Sensible defaults for quick start

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::batcher::BatchConfig;
use crate::load::LoadProfile;

/// Log output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Spillway: drive a size-or-time write batcher with a steady stream of writes.
#[derive(Parser, Debug, Clone)]
#[command(name = "spillway")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Number of writes that triggers an immediate flush
    #[arg(short, long, env = "SPILLWAY_BATCH_SIZE", default_value_t = 10)]
    pub batch_size: usize,

    /// Maximum time a non-empty batch waits before it is flushed (ms)
    #[arg(long, env = "SPILLWAY_FLUSH_PERIOD_MS", default_value_t = 3000)]
    pub flush_period_ms: u64,

    /// Capacity of the inbound write queue (backpressure control)
    #[arg(long, env = "SPILLWAY_QUEUE_CAPACITY", default_value_t = 1000)]
    pub queue_capacity: usize,

    /// Data directory for the SQLite store; in-memory store when unset
    #[arg(short, long, env = "SPILLWAY_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Size of the SQLite reader connection pool
    #[arg(long, env = "SPILLWAY_READER_POOL_SIZE", default_value_t = 4)]
    pub reader_pool_size: u32,

    /// Number of writes the producer submits
    #[arg(short, long, env = "SPILLWAY_WRITES", default_value_t = 100)]
    pub writes: u64,

    /// Delay between producer writes (ms)
    #[arg(long, env = "SPILLWAY_WRITE_INTERVAL_MS", default_value_t = 150)]
    pub write_interval_ms: u64,

    /// Prefix for generated keys and values
    #[arg(long, env = "SPILLWAY_KEY_PREFIX", default_value = "key")]
    pub key_prefix: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, env = "SPILLWAY_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Print final stats as JSON
    #[arg(long)]
    pub json: bool,

    /// OpenTelemetry collector endpoint for metrics export (optional)
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otel_endpoint: Option<String>,
}

impl Config {
    /// Parse configuration from CLI arguments and environment.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Batcher settings derived from this config.
    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig::from_config(self.batch_size, self.flush_period_ms, self.queue_capacity)
    }

    /// Producer settings derived from this config.
    pub fn load_profile(&self) -> LoadProfile {
        LoadProfile::from_config(self.writes, self.write_interval_ms, &self.key_prefix)
    }

    /// Create a default configuration for testing.
    #[cfg(test)]
    pub fn test_config() -> Self {
        Self {
            batch_size: 4,
            flush_period_ms: 50,
            queue_capacity: 16,
            writes: 10,
            write_interval_ms: 0,
            log_level: "debug".into(),
            ..Self::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            batch_size: 10,
            flush_period_ms: 3000,
            queue_capacity: 1000,
            data_dir: None,
            reader_pool_size: 4,
            writes: 100,
            write_interval_ms: 150,
            key_prefix: "key".into(),
            log_level: "info".into(),
            log_format: LogFormat::Text,
            json: false,
            otel_endpoint: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.batch_config().flush_period, Duration::from_secs(3));
        assert!(config.data_dir.is_none());
    }

    #[test]
    fn test_parse_flags() {
        let config = Config::try_parse_from([
            "spillway",
            "--batch-size",
            "25",
            "--flush-period-ms",
            "500",
            "--log-format",
            "json",
            "--data-dir",
            "/tmp/spill",
        ])
        .unwrap();

        assert_eq!(config.batch_size, 25);
        assert_eq!(config.flush_period_ms, 500);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/spill")));
        assert!(config.batch_config().validate().is_ok());
    }

    #[test]
    fn test_zero_batch_size_fails_validation() {
        let config = Config::try_parse_from(["spillway", "--batch-size", "0"]).unwrap();
        assert!(config.batch_config().validate().is_err());
    }

    #[test]
    fn test_test_config_is_small() {
        let config = Config::test_config();
        assert_eq!(config.load_profile().writes, 10);
        assert_eq!(config.batch_config().max_batch_size, 4);
    }
}
