//! Cached chain height and mempool snapshot.
//!
//! Readers never block on a refresh: the height lives in an atomic and the
//! mempool snapshot is an `Arc` swapped under a short write lock once a
//! refresh has fully succeeded.

use crate::codec::TransactionDecoder;
use crate::node::NodeInterface;
use crate::types::MempoolTx;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Last known chain height and mempool contents.
pub struct ChainCache {
    node: Arc<dyn NodeInterface>,
    decoder: Arc<dyn TransactionDecoder>,
    height: AtomicU64,
    mempool: RwLock<Arc<[MempoolTx]>>,
}

impl ChainCache {
    /// Empty cache (height 0, no mempool) reading from `node`.
    #[must_use]
    pub fn new(node: Arc<dyn NodeInterface>, decoder: Arc<dyn TransactionDecoder>) -> Self {
        Self {
            node,
            decoder,
            height: AtomicU64::new(0),
            mempool: RwLock::new(Arc::from(Vec::new())),
        }
    }

    /// Fetch the chain tip and store `tip - 1`, the last fully confirmed height.
    ///
    /// On node failure the previous value is kept and returned.
    pub async fn refresh_height(&self) -> u64 {
        match self.node.current_height().await {
            Ok(tip) => {
                let height = tip.saturating_sub(1);
                self.height.store(height, Ordering::Release);
                debug!("Chain height updated to {height}");
                height
            }
            Err(e) => {
                let height = self.current_height();
                warn!("Failed to fetch chain height, keeping {height}: {e}");
                height
            }
        }
    }

    /// Cached height.
    #[must_use]
    pub fn current_height(&self) -> u64 {
        self.height.load(Ordering::Acquire)
    }

    /// Re-read the node's mempool.
    ///
    /// All entries must decode; otherwise the previous snapshot stays in
    /// place and `false` is returned.
    pub async fn refresh_mempool(&self) -> bool {
        let entries = match self.node.mempool_entries().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to fetch mempool: {e}");
                return false;
            }
        };

        let mut decoded = Vec::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            match self.decoder.decode(&entry.blob) {
                Ok(tx) => decoded.push(tx),
                Err(e) => {
                    warn!(
                        "Mempool entry {i} of {} failed to decode, keeping previous snapshot: {e}",
                        entries.len()
                    );
                    return false;
                }
            }
        }

        let count = decoded.len();
        *self.mempool.write() = Arc::from(decoded);
        debug!("Mempool snapshot replaced ({count} transactions)");
        true
    }

    /// Last committed mempool snapshot, in node order.
    #[must_use]
    pub fn current_snapshot(&self) -> Arc<[MempoolTx]> {
        Arc::clone(&self.mempool.read())
    }
}
