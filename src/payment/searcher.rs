//! Mempool-then-blocks payment search.

use super::cache::FoundPaymentCache;
use crate::chain::ChainCache;
use crate::config::PaymentSearchConfig;
use crate::crypto::OutputScanner;
use crate::node::{NodeError, NodeInterface, NodeResult};
use crate::types::{Account, Hash, PaymentId, Transaction};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Blocks fetched per range request during the confirmed walk.
const BLOCK_BATCH: u64 = 100;

/// Finds the transaction that paid an import fee.
pub struct PaymentSearcher {
    node: Arc<dyn NodeInterface>,
    chain: Arc<ChainCache>,
    scanner: Arc<dyn OutputScanner>,
    account: Account,
    blocks_to_search: u64,
    cache: FoundPaymentCache,
}

impl PaymentSearcher {
    /// Searcher crediting payments to `account` (the import address).
    #[must_use]
    pub fn new(
        node: Arc<dyn NodeInterface>,
        chain: Arc<ChainCache>,
        scanner: Arc<dyn OutputScanner>,
        account: Account,
        config: &PaymentSearchConfig,
    ) -> Self {
        Self {
            node,
            chain,
            scanner,
            account,
            blocks_to_search: config.blocks_to_search,
            cache: FoundPaymentCache::with_capacity(config.cache_capacity),
        }
    }

    /// Account payments are credited to.
    #[must_use]
    pub fn account(&self) -> &Account {
        &self.account
    }

    /// Confirmed-match cache.
    #[must_use]
    pub fn cache(&self) -> &FoundPaymentCache {
        &self.cache
    }

    /// Search the mempool, then the configured window of recent blocks up
    /// to the cached height.
    pub async fn find(&self, payment_id: &PaymentId, expected_amount: u64) -> Option<Hash> {
        let end = self.chain.current_height();
        let start = if self.blocks_to_search == 0 {
            0
        } else {
            end.saturating_sub(self.blocks_to_search)
        };
        self.find_in_range(payment_id, expected_amount, start, end).await
    }

    /// Search the mempool, then blocks `start..=end` in ascending order.
    ///
    /// Returns the first transaction carrying `payment_id` that pays at
    /// least `expected_amount`. A node failure during the block walk ends
    /// the search with `None`.
    pub async fn find_in_range(
        &self,
        payment_id: &PaymentId,
        expected_amount: u64,
        start: u64,
        end: u64,
    ) -> Option<Hash> {
        if let Some(hash) = self.cache.get(payment_id, expected_amount, &(start..=end)) {
            debug!("Payment {payment_id} served from cache: {hash}");
            return Some(hash);
        }

        let snapshot = self.chain.current_snapshot();
        if let Some((hash, _)) = snapshot
            .iter()
            .find(|(_, tx)| self.pays(tx, payment_id, expected_amount))
        {
            info!("Payment {payment_id} found in mempool: {hash}");
            return Some(*hash);
        }

        match self.walk_blocks(payment_id, expected_amount, start, end).await {
            Ok(Some((hash, height))) => {
                info!("Payment {payment_id} found in block {height}: {hash}");
                self.cache.insert(*payment_id, expected_amount, hash, height);
                Some(hash)
            }
            Ok(None) => {
                debug!("Payment {payment_id} not found in blocks {start}..={end}");
                None
            }
            Err(e) => {
                warn!("Payment search for {payment_id} aborted: {e}");
                None
            }
        }
    }

    async fn walk_blocks(
        &self,
        payment_id: &PaymentId,
        expected_amount: u64,
        start: u64,
        end: u64,
    ) -> NodeResult<Option<(Hash, u64)>> {
        let mut batch_start = start;
        while batch_start <= end {
            let batch_end = batch_start.saturating_add(BLOCK_BATCH - 1).min(end);
            let blocks = self.node.blocks_in_range(batch_start, batch_end).await?;

            for block in blocks {
                if block.tx_hashes.is_empty() {
                    continue;
                }
                let lookup = self.node.transactions_by_hash(&block.tx_hashes).await?;
                if !lookup.missed.is_empty() {
                    return Err(NodeError::NotFound(format!(
                        "{} transactions of block {}",
                        lookup.missed.len(),
                        block.height
                    )));
                }
                if let Some((hash, _)) = lookup
                    .found
                    .iter()
                    .find(|(_, tx)| self.pays(tx, payment_id, expected_amount))
                {
                    return Ok(Some((*hash, block.height)));
                }
            }

            if batch_end == u64::MAX {
                break;
            }
            batch_start = batch_end + 1;
        }
        Ok(None)
    }

    fn pays(&self, tx: &Transaction, payment_id: &PaymentId, expected_amount: u64) -> bool {
        if tx.coinbase {
            return false;
        }
        if self.scanner.decrypt_payment_id(&self.account, tx).as_ref() != Some(payment_id) {
            return false;
        }
        let received = self
            .scanner
            .owned_outputs(&self.account, tx)
            .iter()
            .fold(0u64, |sum, output| sum.saturating_add(output.amount));
        received >= expected_amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MsgPackDecoder;
    use crate::mock::{account, tx_hash, tx_paying, tx_to, MockNode, MockScanner, IMPORT_ADDRESS};

    const PID: PaymentId = PaymentId([0xab; 8]);

    async fn searcher_for(node: &Arc<MockNode>, blocks_to_search: u64) -> PaymentSearcher {
        let node_dyn = Arc::clone(node) as Arc<dyn NodeInterface>;
        let chain = Arc::new(ChainCache::new(Arc::clone(&node_dyn), Arc::new(MsgPackDecoder)));
        chain.refresh_height().await;
        chain.refresh_mempool().await;
        PaymentSearcher::new(
            node_dyn,
            chain,
            Arc::new(MockScanner),
            account(IMPORT_ADDRESS, 0),
            &PaymentSearchConfig {
                blocks_to_search,
                cache_capacity: 16,
            },
        )
    }

    #[tokio::test]
    async fn test_mempool_match_on_amount() {
        let node = Arc::new(MockNode::with_blocks(3));
        let hash = node.push_mempool_tx(&tx_paying(100, Some(PID)));
        let searcher = searcher_for(&node, 10).await;

        assert_eq!(searcher.find(&PID, 100).await, Some(hash));
        assert_eq!(searcher.find(&PID, 200).await, None);
    }

    #[tokio::test]
    async fn test_amount_boundaries() {
        let node = Arc::new(MockNode::with_blocks(1));
        node.push_mempool_tx(&tx_paying(99, Some(PID)));
        let searcher = searcher_for(&node, 10).await;
        assert_eq!(searcher.find(&PID, 100).await, None);

        let node = Arc::new(MockNode::with_blocks(1));
        let over = node.push_mempool_tx(&tx_paying(101, Some(PID)));
        let searcher = searcher_for(&node, 10).await;
        assert_eq!(searcher.find(&PID, 100).await, Some(over));
    }

    #[tokio::test]
    async fn test_first_sufficient_payment_wins() {
        let node = Arc::new(MockNode::with_blocks(1));
        node.push_mempool_tx(&tx_paying(50, Some(PID)));
        let second = node.push_mempool_tx(&tx_paying(100, Some(PID)));
        node.push_mempool_tx(&tx_paying(500, Some(PID)));
        let searcher = searcher_for(&node, 10).await;

        assert_eq!(searcher.find(&PID, 100).await, Some(second));
    }

    #[tokio::test]
    async fn test_payment_to_other_address_ignored() {
        let node = Arc::new(MockNode::with_blocks(1));
        node.push_mempool_tx(&tx_to("someone-else", 1_000, Some(PID)));
        let searcher = searcher_for(&node, 10).await;

        assert_eq!(searcher.find(&PID, 100).await, None);
    }

    #[tokio::test]
    async fn test_finds_confirmed_payment_and_caches_it() {
        let node = Arc::new(MockNode::with_blocks(5));
        let paid = tx_paying(100, Some(PID));
        node.add_block(vec![tx_paying(100, None), paid.clone()]);
        node.add_block(Vec::new());
        let searcher = searcher_for(&node, 10).await;

        assert_eq!(searcher.find(&PID, 100).await, Some(tx_hash(&paid)));
        let calls = node.block_calls();

        assert_eq!(searcher.find(&PID, 100).await, Some(tx_hash(&paid)));
        assert_eq!(node.block_calls(), calls);
        assert_eq!(searcher.cache().stats().hits, 1);
    }

    #[tokio::test]
    async fn test_cached_match_outside_range_not_returned() {
        let node = Arc::new(MockNode::with_blocks(3));
        let paid = tx_paying(100, Some(PID));
        node.add_block(vec![paid.clone()]);
        for _ in 0..20 {
            node.add_block(Vec::new());
        }
        let searcher = searcher_for(&node, 10).await;

        assert_eq!(searcher.find_in_range(&PID, 100, 10, 20).await, None);
        assert_eq!(searcher.find_in_range(&PID, 100, 0, 5).await, Some(tx_hash(&paid)));
        assert_eq!(searcher.cache().len(), 1);

        assert_eq!(searcher.find_in_range(&PID, 100, 10, 20).await, None);
        assert_eq!(searcher.find(&PID, 100).await, None);
        assert_eq!(searcher.find_in_range(&PID, 100, 3, 3).await, Some(tx_hash(&paid)));
    }

    #[tokio::test]
    async fn test_mempool_matches_not_cached() {
        let node = Arc::new(MockNode::with_blocks(1));
        node.push_mempool_tx(&tx_paying(100, Some(PID)));
        let searcher = searcher_for(&node, 10).await;

        assert!(searcher.find(&PID, 100).await.is_some());
        assert!(searcher.cache().is_empty());
    }

    #[tokio::test]
    async fn test_window_excludes_old_blocks() {
        let node = Arc::new(MockNode::new());
        let paid = tx_paying(100, Some(PID));
        node.add_block(vec![paid.clone()]);
        for _ in 0..20 {
            node.add_block(Vec::new());
        }
        let searcher = searcher_for(&node, 10).await;
        assert_eq!(searcher.find(&PID, 100).await, None);

        let genesis_walk = searcher_for(&node, 0).await;
        assert_eq!(genesis_walk.find(&PID, 100).await, Some(tx_hash(&paid)));
    }

    #[tokio::test]
    async fn test_explicit_range_spans_batches() {
        let node = Arc::new(MockNode::with_blocks(250));
        let paid = tx_paying(7, Some(PID));
        node.add_block(vec![paid.clone()]);
        let searcher = searcher_for(&node, 10).await;

        assert_eq!(searcher.find_in_range(&PID, 7, 0, 250).await, Some(tx_hash(&paid)));
        assert_eq!(node.block_calls(), 251);
    }

    #[tokio::test]
    async fn test_coinbase_never_matches() {
        let node = Arc::new(MockNode::new());
        let mut miner_tx = tx_paying(1_000, Some(PID));
        miner_tx.coinbase = true;
        node.add_block_with_miner(miner_tx.clone(), Vec::new());
        node.add_block(Vec::new());
        node.push_mempool_tx(&miner_tx);
        let searcher = searcher_for(&node, 0).await;

        assert_eq!(searcher.find(&PID, 1).await, None);
    }

    #[tokio::test]
    async fn test_node_failure_aborts_search() {
        let node = Arc::new(MockNode::with_blocks(3));
        node.add_block(vec![tx_paying(100, Some(PID))]);
        let searcher = searcher_for(&node, 10).await;

        node.fail_blocks(Some(NodeError::Transport("down".into())));
        assert_eq!(searcher.find(&PID, 100).await, None);
        assert_eq!(node.block_calls(), 1);

        node.fail_blocks(None);
        node.fail_transactions(Some(NodeError::Transport("down".into())));
        assert_eq!(searcher.find(&PID, 100).await, None);
    }

    #[tokio::test]
    async fn test_missed_transactions_abort_search() {
        let node = Arc::new(MockNode::with_blocks(1));
        let block = node.add_block(vec![tx_paying(1, None), tx_paying(100, Some(PID))]);
        node.hide_transaction(block.tx_hashes[0]);
        let searcher = searcher_for(&node, 10).await;

        assert_eq!(searcher.find(&PID, 100).await, None);
    }
}
