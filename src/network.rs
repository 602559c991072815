//! Network selection and the consensus constants the core needs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unlock leeway before the v2 hard fork (one 60 s block).
pub const LOCKED_TX_ALLOWED_DELTA_SECONDS_V1: u64 = 60;

/// Unlock leeway from the v2 hard fork on (one 120 s block).
pub const LOCKED_TX_ALLOWED_DELTA_SECONDS_V2: u64 = 120;

/// Network the backend serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    /// Main network.
    #[default]
    Mainnet,
    /// Public test network.
    Testnet,
    /// Staging network.
    Stagenet,
}

impl NetworkType {
    /// Height at which the 120 s block target (hard fork v2) activated.
    #[must_use]
    pub const fn v2_height(self) -> u64 {
        match self {
            Self::Mainnet => 1_009_827,
            Self::Testnet => 624_634,
            Self::Stagenet => 32_000,
        }
    }

    /// Grace window, in seconds, granted to timestamp-based unlock times.
    ///
    /// Equals one block target at `height`.
    #[must_use]
    pub const fn unlock_leeway(self, height: u64) -> u64 {
        if height < self.v2_height() {
            LOCKED_TX_ALLOWED_DELTA_SECONDS_V1
        } else {
            LOCKED_TX_ALLOWED_DELTA_SECONDS_V2
        }
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Mainnet => "mainnet",
            Self::Testnet => "testnet",
            Self::Stagenet => "stagenet",
        };
        f.write_str(name)
    }
}
