//! Transaction blob decoding.
//!
//! The node hands out transactions as opaque blobs (mempool entries,
//! `/get_transactions` hex). A [`TransactionDecoder`] turns a blob into a
//! domain [`Transaction`] and its hash. [`MsgPackDecoder`] is the bundled
//! format: a MessagePack body hashed with SHA-256.

use crate::types::{Hash, Transaction};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// A blob that is not a valid transaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Zero-length blob.
    #[error("empty transaction blob")]
    Empty,

    /// The blob does not parse.
    #[error("malformed transaction blob: {0}")]
    Malformed(String),

    /// Bytes left over after the transaction.
    #[error("{0} trailing bytes after transaction")]
    TrailingBytes(usize),
}

/// Turns serialized transactions into domain objects.
pub trait TransactionDecoder: Send + Sync {
    /// Decode `blob`, returning the transaction hash and the transaction.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] if the blob is empty, truncated or corrupt.
    fn decode(&self, blob: &[u8]) -> Result<(Hash, Transaction), DecodeError>;
}

/// MessagePack transaction format.
#[derive(Debug, Default, Clone, Copy)]
pub struct MsgPackDecoder;

impl MsgPackDecoder {
    /// Serialize `tx` into a blob this decoder accepts.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Malformed`] if serialization fails.
    pub fn encode(tx: &Transaction) -> Result<Vec<u8>, DecodeError> {
        rmp_serde::to_vec(tx).map_err(|e| DecodeError::Malformed(e.to_string()))
    }

    /// Hash of a serialized transaction.
    #[must_use]
    pub fn blob_hash(blob: &[u8]) -> Hash {
        Hash(Sha256::digest(blob).into())
    }
}

impl TransactionDecoder for MsgPackDecoder {
    fn decode(&self, blob: &[u8]) -> Result<(Hash, Transaction), DecodeError> {
        if blob.is_empty() {
            return Err(DecodeError::Empty);
        }

        let mut reader = blob;
        let tx: Transaction = rmp_serde::from_read(&mut reader)
            .map_err(|e| DecodeError::Malformed(e.to_string()))?;

        if !reader.is_empty() {
            return Err(DecodeError::TrailingBytes(reader.len()));
        }

        Ok((Self::blob_hash(blob), tx))
    }
}
