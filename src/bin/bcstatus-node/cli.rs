//! Command-line interface definition.

use bcstatus::config::{default_config_path, StatusConfig};
use bcstatus::NetworkType;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Chain status and account search service for a CryptoNote daemon.
#[derive(Parser, Debug)]
#[command(name = "bcstatus-node")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Network the daemon runs on.
    #[arg(long, value_enum, env = "BCSTATUS_NETWORK")]
    pub network: Option<CliNetwork>,

    /// Daemon RPC base URL.
    #[arg(long, env = "BCSTATUS_DAEMON_URL")]
    pub daemon_url: Option<String>,

    /// Keep submitted transactions in the daemon's pool without relaying.
    #[arg(long, env = "BCSTATUS_DO_NOT_RELAY")]
    pub do_not_relay: bool,

    /// Seconds between height and mempool refreshes.
    #[arg(long, env = "BCSTATUS_REFRESH_INTERVAL")]
    pub refresh_interval: Option<u64>,

    /// Address receiving import payments.
    #[arg(long, env = "BCSTATUS_IMPORT_ADDRESS")]
    pub import_address: Option<String>,

    /// Private view key of the import address, hex.
    #[arg(long, env = "BCSTATUS_IMPORT_VIEWKEY", hide_env_values = true)]
    pub import_viewkey: Option<String>,

    /// Log level.
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,

    /// Path to configuration file.
    #[arg(long, short)]
    pub config: Option<PathBuf>,
}

/// Network CLI enum.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliNetwork {
    /// Main network.
    Mainnet,
    /// Test network.
    Testnet,
    /// Stage network.
    Stagenet,
}

impl Cli {
    /// Convert CLI arguments into a `StatusConfig`.
    ///
    /// An explicit `--config` must exist. Without it the default path is
    /// read when present.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file cannot be loaded.
    pub fn into_config(self) -> color_eyre::Result<StatusConfig> {
        let mut config = match self.config {
            Some(ref path) => StatusConfig::from_file(path)?,
            None => {
                let path = default_config_path();
                if path.exists() {
                    StatusConfig::from_file(&path)?
                } else {
                    StatusConfig::default()
                }
            }
        };

        if let Some(network) = self.network {
            config.network = network.into();
        }
        if let Some(url) = self.daemon_url {
            config.daemon_url = url;
        }
        if let Some(secs) = self.refresh_interval {
            config.refresh_interval_secs = secs;
        }
        if self.import_address.is_some() {
            config.import_payment_address = self.import_address;
        }
        if self.import_viewkey.is_some() {
            config.import_payment_viewkey = self.import_viewkey;
        }
        config.do_not_relay |= self.do_not_relay;
        config.log_level = self.log_level;

        Ok(config)
    }
}

impl From<CliNetwork> for NetworkType {
    fn from(n: CliNetwork) -> Self {
        match n {
            CliNetwork::Mainnet => Self::Mainnet,
            CliNetwork::Testnet => Self::Testnet,
            CliNetwork::Stagenet => Self::Stagenet,
        }
    }
}
