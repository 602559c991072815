//! Configuration for bcstatus.

use crate::network::NetworkType;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    /// Network served.
    #[serde(default)]
    pub network: NetworkType,

    /// Daemon RPC base URL.
    #[serde(default = "default_daemon_url")]
    pub daemon_url: String,

    /// Keep submitted transactions in the daemon's pool without relaying.
    #[serde(default)]
    pub do_not_relay: bool,

    /// Address that receives import payments (standard address string).
    #[serde(default)]
    pub import_payment_address: Option<String>,

    /// Private view key of the import address, hex.
    #[serde(default)]
    pub import_payment_viewkey: Option<String>,

    /// Seconds between height/mempool refreshes.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Search worker configuration.
    #[serde(default)]
    pub search: SearchConfig,

    /// Payment search configuration.
    #[serde(default)]
    pub payment: PaymentSearchConfig,
}

/// Per-account search worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Wait between tip checks once caught up, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// A ping left unacknowledged for longer than this marks the worker
    /// unresponsive.
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout_secs: u64,

    /// Consecutive block-fetch failures tolerated before the worker gives
    /// up. `None` retries forever.
    #[serde(default)]
    pub max_fetch_retries: Option<u32>,
}

/// Payment search configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSearchConfig {
    /// Confirmed blocks below the cached height to walk after the mempool.
    /// Zero walks from genesis.
    #[serde(default = "default_blocks_to_search")]
    pub blocks_to_search: u64,

    /// Capacity of the confirmed-match cache.
    #[serde(default = "default_payment_cache_capacity")]
    pub cache_capacity: usize,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            network: NetworkType::default(),
            daemon_url: default_daemon_url(),
            do_not_relay: false,
            import_payment_address: None,
            import_payment_viewkey: None,
            refresh_interval_secs: default_refresh_interval(),
            log_level: default_log_level(),
            search: SearchConfig::default(),
            payment: PaymentSearchConfig::default(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            ping_timeout_secs: default_ping_timeout(),
            max_fetch_retries: None,
        }
    }
}

impl Default for PaymentSearchConfig {
    fn default() -> Self {
        Self {
            blocks_to_search: default_blocks_to_search(),
            cache_capacity: default_payment_cache_capacity(),
        }
    }
}

impl SearchConfig {
    /// Caught-up polling interval, at least one millisecond.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Ping acknowledgement deadline.
    #[must_use]
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_secs)
    }
}

fn default_daemon_url() -> String {
    "http://127.0.0.1:18081".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

const fn default_refresh_interval() -> u64 {
    10
}

const fn default_poll_interval_ms() -> u64 {
    1_000
}

const fn default_ping_timeout() -> u64 {
    60
}

const fn default_blocks_to_search() -> u64 {
    10
}

const fn default_payment_cache_capacity() -> usize {
    1_000
}

/// Default location of the configuration file.
#[must_use]
pub fn default_config_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "bcstatus")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("bcstatus.toml"))
}

impl StatusConfig {
    /// Refresh loop interval.
    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &std::path::Path) -> crate::Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| crate::Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: StatusConfig = toml::from_str("").expect("parse empty config");
        assert_eq!(config.network, NetworkType::Mainnet);
        assert_eq!(config.payment.blocks_to_search, 10);
        assert_eq!(config.search.max_fetch_retries, None);
        assert_eq!(config.search.poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_partial_file() {
        let raw = r#"
            network = "stagenet"
            do_not_relay = true

            [search]
            max_fetch_retries = 5
        "#;
        let config: StatusConfig = toml::from_str(raw).expect("parse config");
        assert_eq!(config.network, NetworkType::Stagenet);
        assert!(config.do_not_relay);
        assert_eq!(config.search.max_fetch_retries, Some(5));
        assert_eq!(config.search.ping_timeout_secs, 60);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");

        let config = StatusConfig {
            network: NetworkType::Testnet,
            import_payment_address: Some("9tzmPMTViHYM3z6NAgQni1Qm1Emzxy5hQFibPgWD3LVTAz91yok5Eni1pH6zKhBHzpTU15GZooPHSGHXFvFuXEdmEG2sWAZ".into()),
            ..StatusConfig::default()
        };
        config.to_file(&path).expect("write config");

        let loaded = StatusConfig::from_file(&path).expect("read config");
        assert_eq!(loaded.network, NetworkType::Testnet);
        assert_eq!(loaded.import_payment_address, config.import_payment_address);
    }

    #[test]
    fn test_zero_intervals_clamped() {
        let config: StatusConfig = toml::from_str(
            "refresh_interval_secs = 0\n[search]\npoll_interval_ms = 0\n",
        )
        .expect("parse config");

        assert_eq!(config.refresh_interval(), Duration::from_secs(1));
        assert_eq!(config.search.poll_interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = StatusConfig::from_file(std::path::Path::new("/nonexistent/bcstatus.toml"))
            .expect_err("missing file");
        assert!(matches!(err, crate::Error::Io(_)));
    }
}
