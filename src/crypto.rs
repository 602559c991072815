//! Cryptographic and address-encoding collaborators.
//!
//! Key derivation, output-ownership checks, payment-id decryption and
//! address formatting all live outside this crate. The core reaches them
//! through these two traits.

use crate::network::NetworkType;
use crate::types::{Account, PaymentId, PublicKey, Transaction};

/// An output that belongs to the account under watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnedOutput {
    /// One-time output public key.
    pub key: PublicKey,
    /// Position of the output within its transaction.
    pub index: u64,
    /// Decoded amount in atomic units.
    pub amount: u64,
}

/// View-key based output detection.
pub trait OutputScanner: Send + Sync {
    /// Outputs of `tx` addressed to `account`. Empty if none.
    fn owned_outputs(&self, account: &Account, tx: &Transaction) -> Vec<OwnedOutput>;

    /// Decrypted short payment id carried by `tx`, if any.
    fn decrypt_payment_id(&self, account: &Account, tx: &Transaction) -> Option<PaymentId>;
}

/// Address string formatting.
pub trait AddressEncoder: Send + Sync {
    /// Integrated address for `address` and `payment_id`, or `None` if
    /// `address` is not a valid standard address on `network`.
    fn integrated_address(
        &self,
        network: NetworkType,
        address: &str,
        payment_id: &PaymentId,
    ) -> Option<String>;
}
