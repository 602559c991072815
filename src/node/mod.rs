//! Narrow interfaces to the full node.
//!
//! The core never touches chain storage directly. Everything it needs from
//! the node goes through [`NodeInterface`] (read-only queries) and
//! [`TransactionSubmitter`] (relaying a signed transaction). Both report
//! failures as [`NodeError`], which separates the expected "not found"
//! answer from operational failures.

mod rpc;

pub use rpc::{RpcNodeClient, RpcNodeConfig};

use crate::types::{Block, Hash, MempoolEntry, OutputInfo, OutsForAmount, Transaction};
use async_trait::async_trait;
use thiserror::Error;

/// Failure reported by the node interface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeError {
    /// The requested block, transaction or output does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The node could not be reached or answered with an error.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The node's answer could not be understood.
    #[error("malformed response: {0}")]
    Parse(String),
}

impl NodeError {
    /// True for the expected negative answer.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result of a node call.
pub type NodeResult<T> = std::result::Result<T, NodeError>;

/// Transactions found by hash, plus the hashes the node does not know.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxLookup {
    /// Found transactions, in request order.
    pub found: Vec<(Hash, Transaction)>,
    /// Requested hashes with no matching transaction.
    pub missed: Vec<Hash>,
}

/// Read-only queries against the full node.
#[async_trait]
pub trait NodeInterface: Send + Sync {
    /// Number of blocks in the chain (top block height + 1).
    async fn current_height(&self) -> NodeResult<u64>;

    /// Block at `height`.
    async fn block_at_height(&self, height: u64) -> NodeResult<Block>;

    /// Blocks in `start..=end`.
    async fn blocks_in_range(&self, start: u64, end: u64) -> NodeResult<Vec<Block>>;

    /// Transactions by hash. An empty `found` is not an error.
    async fn transactions_by_hash(&self, hashes: &[Hash]) -> NodeResult<TxLookup>;

    /// Whether the node knows a confirmed transaction with this hash.
    async fn tx_exists(&self, hash: &Hash) -> NodeResult<bool>;

    /// Global, amount-specific output indices of a transaction's outputs.
    async fn tx_amount_output_indices(&self, hash: &Hash) -> NodeResult<Vec<u64>>;

    /// Transaction and local output index of the output with this amount
    /// and global index.
    async fn output_tx_and_index(&self, amount: u64, global_index: u64) -> NodeResult<(Hash, u64)>;

    /// Outputs addressed by `(amount, global index)` pairs, in request order.
    async fn outputs_by_amount_and_index(&self, requests: &[(u64, u64)]) -> NodeResult<Vec<OutputInfo>>;

    /// Up to `outs_count` random unlocked outputs for each of `amounts`,
    /// one entry per amount in request order.
    async fn random_outputs_for_amounts(&self, amounts: &[u64], outs_count: u64) -> NodeResult<Vec<OutsForAmount>>;

    /// Raw transactions currently in the mempool, in node order.
    async fn mempool_entries(&self) -> NodeResult<Vec<MempoolEntry>>;

    /// Per-kB fee estimate valid for the next `grace_blocks` blocks.
    async fn fee_estimate(&self, grace_blocks: u64) -> NodeResult<u64>;
}

/// Relays signed transactions to the network.
#[async_trait]
pub trait TransactionSubmitter: Send + Sync {
    /// Submit `blob`. With `do_not_relay` the node keeps it in its own pool.
    ///
    /// A rejection is reported as [`NodeError::Transport`] carrying the
    /// node's reason.
    async fn submit_transaction(&self, blob: &[u8], do_not_relay: bool) -> NodeResult<()>;
}
