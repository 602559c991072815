//! Domain types shared by the cache, the searchers and the node interface.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

macro_rules! hex_bytes {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            /// Length in bytes.
            pub const LEN: usize = $len;

            /// Borrow the raw bytes.
            #[must_use]
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Lowercase hex encoding.
            #[must_use]
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let mut bytes = [0u8; $len];
                hex::decode_to_slice(s, &mut bytes).map_err(|e| {
                    Error::InvalidInput(format!(
                        "{} must be {} hex characters: {e}",
                        stringify!($name),
                        $len * 2
                    ))
                })?;
                Ok(Self(bytes))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }
    };
}

hex_bytes!(
    /// 32-byte transaction or block hash.
    Hash,
    32
);

hex_bytes!(
    /// 32-byte one-time output public key.
    PublicKey,
    32
);

hex_bytes!(
    /// 32-byte output commitment mask (RingCT).
    Commitment,
    32
);

hex_bytes!(
    /// 32-byte key image of a spent input.
    KeyImage,
    32
);

hex_bytes!(
    /// Short (8-byte) payment identifier, as carried encrypted in tx extra.
    PaymentId,
    8
);

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({self})")
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({self})")
    }
}

impl fmt::Debug for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Commitment({self})")
    }
}

impl fmt::Debug for KeyImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyImage({self})")
    }
}

impl fmt::Debug for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PaymentId({self})")
    }
}

/// Private view key of a watched account.
///
/// Never printed: `Debug` is redacted.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewKey(pub [u8; 32]);

impl FromStr for ViewKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| Error::InvalidInput(format!("view key must be 64 hex characters: {e}")))?;
        Ok(Self(bytes))
    }
}

impl fmt::Debug for ViewKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ViewKey(<redacted>)")
    }
}

/// Input of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    /// Input amount (zero for RingCT inputs).
    pub amount: u64,
    /// Key image spent by this input.
    pub key_image: KeyImage,
}

/// Output of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    /// Output amount in atomic units (zero for RingCT outputs).
    pub amount: u64,
    /// One-time output public key.
    pub key: PublicKey,
}

/// A decoded transaction.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction format version.
    pub version: u8,
    /// Block height or unix timestamp before which outputs are locked.
    pub unlock_time: u64,
    /// True for the miner (coinbase) transaction of a block.
    pub coinbase: bool,
    /// Spent inputs.
    pub inputs: Vec<TxInput>,
    /// Created outputs.
    pub outputs: Vec<TxOutput>,
    /// Raw extra field (tx public key, encrypted payment id, ...).
    pub extra: Vec<u8>,
}

/// A confirmed block.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Block {
    /// Height of the block.
    pub height: u64,
    /// Block hash.
    pub hash: Hash,
    /// Block timestamp (unix seconds).
    pub timestamp: u64,
    /// Miner transaction.
    pub miner_tx: Transaction,
    /// Hash of the miner transaction.
    pub miner_tx_hash: Hash,
    /// Hashes of the non-coinbase transactions in the block.
    pub tx_hashes: Vec<Hash>,
}

/// Raw mempool entry as returned by the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MempoolEntry {
    /// Serialized transaction.
    pub blob: bytes::Bytes,
}

/// A decoded mempool transaction with its hash.
pub type MempoolTx = (Hash, Transaction);

/// Output located by amount and global index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputInfo {
    /// One-time output public key.
    pub key: PublicKey,
    /// RingCT commitment.
    pub mask: Commitment,
    /// Whether the output is currently spendable.
    pub unlocked: bool,
    /// Height of the block containing the output.
    pub height: u64,
    /// Hash of the transaction that created the output.
    pub tx_hash: Hash,
}

/// A decoy candidate drawn from the outputs of one amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RandomOutput {
    /// Amount-specific global index.
    pub global_index: u64,
    /// One-time output public key.
    pub key: PublicKey,
}

/// Random outputs drawn for a single amount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutsForAmount {
    /// Amount the outputs were drawn from.
    pub amount: u64,
    /// Drawn outputs, at most the requested count.
    pub outs: Vec<RandomOutput>,
}

/// Output key to local output index within its transaction.
pub type KnownOutputs = HashMap<PublicKey, u64>;

/// An account being watched for incoming outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Standard address string; also the registry key.
    pub address: String,
    /// Private view key.
    pub view_key: ViewKey,
    /// Last block height already accounted for; scanning resumes above it.
    pub start_height: u64,
}

impl Account {
    /// Create an account watched from `start_height` upwards.
    #[must_use]
    pub fn new(address: impl Into<String>, view_key: ViewKey, start_height: u64) -> Self {
        Self {
            address: address.into(),
            view_key,
            start_height,
        }
    }
}
