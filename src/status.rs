//! Query facade over the node, the chain cache, the payment searcher and the
//! search registry.
//!
//! Request handlers talk only to [`StatusFacade`]. Node lookups are
//! forwarded as-is; a "not found" answer and an operational failure both
//! come back as `None`/`false`, with the failure logged. Nothing here
//! retries.

use crate::chain::ChainCache;
use crate::codec::{MsgPackDecoder, TransactionDecoder};
use crate::config::{SearchConfig, StatusConfig};
use crate::crypto::{AddressEncoder, OutputScanner};
use crate::error::{Error, Result};
use crate::network::NetworkType;
use crate::node::{NodeInterface, NodeResult, TransactionSubmitter, TxLookup};
use crate::payment::PaymentSearcher;
use crate::search::{SearchWorker, WorkerRegistry};
use crate::types::{
    Account, Block, Hash, KnownOutputs, MempoolTx, OutputInfo, OutsForAmount, PaymentId,
    Transaction, ViewKey,
};
use crate::unlock::{Clock, SystemClock, UnlockEvaluator};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Grace blocks passed to the node's fee estimator.
pub const FEE_ESTIMATE_GRACE_BLOCKS: u64 = 10;

/// Builder for [`StatusFacade`].
pub struct StatusFacadeBuilder {
    config: StatusConfig,
    node: Arc<dyn NodeInterface>,
    submitter: Option<Arc<dyn TransactionSubmitter>>,
    decoder: Arc<dyn TransactionDecoder>,
    scanner: Option<Arc<dyn OutputScanner>>,
    encoder: Option<Arc<dyn AddressEncoder>>,
    clock: Arc<dyn Clock>,
}

impl StatusFacadeBuilder {
    /// Start from `config`, reading the chain through `node`.
    #[must_use]
    pub fn new(config: StatusConfig, node: Arc<dyn NodeInterface>) -> Self {
        Self {
            config,
            node,
            submitter: None,
            decoder: Arc::new(MsgPackDecoder),
            scanner: None,
            encoder: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Relay transactions through `submitter`.
    #[must_use]
    pub fn with_submitter(mut self, submitter: Arc<dyn TransactionSubmitter>) -> Self {
        self.submitter = Some(submitter);
        self
    }

    /// Decode mempool blobs with `decoder` instead of [`MsgPackDecoder`].
    #[must_use]
    pub fn with_decoder(mut self, decoder: Arc<dyn TransactionDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// Detect owned outputs and payment ids with `scanner`.
    ///
    /// Without one, account searches and payment searches are disabled.
    #[must_use]
    pub fn with_scanner(mut self, scanner: Arc<dyn OutputScanner>) -> Self {
        self.scanner = Some(scanner);
        self
    }

    /// Format integrated addresses with `encoder`.
    #[must_use]
    pub fn with_encoder(mut self, encoder: Arc<dyn AddressEncoder>) -> Self {
        self.encoder = Some(encoder);
        self
    }

    /// Read the time from `clock` instead of the system clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Build the facade.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if only one of the import address and
    /// view key is set, or the view key is not 64 hex characters.
    pub fn build(self) -> Result<StatusFacade> {
        let import_account = import_account(&self.config)?;
        let chain = Arc::new(ChainCache::new(Arc::clone(&self.node), self.decoder));

        let payments = match (&import_account, &self.scanner) {
            (Some(account), Some(scanner)) => Some(PaymentSearcher::new(
                Arc::clone(&self.node),
                Arc::clone(&chain),
                Arc::clone(scanner),
                account.clone(),
                &self.config.payment,
            )),
            (Some(_), None) => {
                warn!("Import address configured but no output scanner, payment search disabled");
                None
            }
            (None, _) => None,
        };

        info!(
            "Status facade ready on {} (import payments {})",
            self.config.network,
            if payments.is_some() { "enabled" } else { "disabled" }
        );

        Ok(StatusFacade {
            network: self.config.network,
            do_not_relay: self.config.do_not_relay,
            search_config: self.config.search,
            node: self.node,
            submitter: self.submitter,
            scanner: self.scanner,
            encoder: self.encoder,
            clock: self.clock,
            unlock: UnlockEvaluator::new(self.config.network),
            chain,
            registry: WorkerRegistry::new(),
            payments,
            import_account,
        })
    }
}

fn import_account(config: &StatusConfig) -> Result<Option<Account>> {
    match (&config.import_payment_address, &config.import_payment_viewkey) {
        (Some(address), Some(view_key)) => {
            let view_key: ViewKey = view_key
                .parse()
                .map_err(|e| Error::Config(format!("import_payment_viewkey: {e}")))?;
            Ok(Some(Account::new(address.clone(), view_key, 0)))
        }
        (None, None) => Ok(None),
        _ => Err(Error::Config(
            "import_payment_address and import_payment_viewkey must be set together".into(),
        )),
    }
}

/// Single entry point for chain, mempool, payment and search queries.
pub struct StatusFacade {
    network: NetworkType,
    do_not_relay: bool,
    search_config: SearchConfig,
    node: Arc<dyn NodeInterface>,
    submitter: Option<Arc<dyn TransactionSubmitter>>,
    scanner: Option<Arc<dyn OutputScanner>>,
    encoder: Option<Arc<dyn AddressEncoder>>,
    clock: Arc<dyn Clock>,
    unlock: UnlockEvaluator,
    chain: Arc<ChainCache>,
    registry: WorkerRegistry,
    payments: Option<PaymentSearcher>,
    import_account: Option<Account>,
}

/// Fold a node answer into an `Option`, logging anything but "not found".
fn found<T>(what: &str, result: NodeResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) if e.is_not_found() => {
            debug!("{what}: {e}");
            None
        }
        Err(e) => {
            warn!("{what} failed: {e}");
            None
        }
    }
}

impl StatusFacade {
    /// Network served.
    #[must_use]
    pub fn network(&self) -> NetworkType {
        self.network
    }

    /// Shared chain cache.
    #[must_use]
    pub fn chain(&self) -> &Arc<ChainCache> {
        &self.chain
    }

    /// Account search registry.
    #[must_use]
    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    /// Import payment account, if configured.
    #[must_use]
    pub fn import_account(&self) -> Option<&Account> {
        self.import_account.as_ref()
    }

    // Chain height

    /// Refresh and return the cached height (tip minus one).
    pub async fn update_current_height(&self) -> u64 {
        self.chain.refresh_height().await
    }

    /// Cached height.
    #[must_use]
    pub fn current_height(&self) -> u64 {
        self.chain.current_height()
    }

    // Blocks and transactions

    /// Block at `height`.
    pub async fn get_block(&self, height: u64) -> Option<Block> {
        found(&format!("block {height}"), self.node.block_at_height(height).await)
    }

    /// Blocks `start..=end`.
    pub async fn get_blocks_range(&self, start: u64, end: u64) -> Option<Vec<Block>> {
        if start > end {
            return None;
        }
        found(
            &format!("blocks {start}..={end}"),
            self.node.blocks_in_range(start, end).await,
        )
    }

    /// Non-coinbase transactions of `block`, with any hashes the node missed.
    pub async fn get_block_txs(&self, block: &Block) -> Option<TxLookup> {
        self.get_txs(&block.tx_hashes).await
    }

    /// Transactions by hash, with any hashes the node missed.
    pub async fn get_txs(&self, hashes: &[Hash]) -> Option<TxLookup> {
        if hashes.is_empty() {
            return Some(TxLookup::default());
        }
        found("transaction lookup", self.node.transactions_by_hash(hashes).await)
    }

    /// Single transaction by hash.
    pub async fn get_tx(&self, hash: &Hash) -> Option<Transaction> {
        let lookup = self.get_txs(std::slice::from_ref(hash)).await?;
        lookup.found.into_iter().next().map(|(_, tx)| tx)
    }

    /// Whether a confirmed transaction with `hash` exists.
    pub async fn tx_exists(&self, hash: &Hash) -> bool {
        found(&format!("tx {hash}"), self.node.tx_exists(hash).await).unwrap_or(false)
    }

    /// [`tx_exists`](Self::tx_exists) for a hex hash. Malformed hex is `false`.
    pub async fn tx_exists_hex(&self, hash: &str) -> bool {
        match hash.parse::<Hash>() {
            Ok(hash) => self.tx_exists(&hash).await,
            Err(e) => {
                debug!("tx_exists_hex: {e}");
                false
            }
        }
    }

    /// Transaction holding the output with `amount` and global index
    /// `output_index`, and the output's position in it.
    pub async fn get_tx_with_output(&self, output_index: u64, amount: u64) -> Option<(Transaction, u64)> {
        let (hash, local_index) = found(
            &format!("output {amount}/{output_index}"),
            self.node.output_tx_and_index(amount, output_index).await,
        )?;
        let tx = self.get_tx(&hash).await?;
        Some((tx, local_index))
    }

    /// Outputs of `amount` at the given global indices, in order.
    pub async fn get_output_keys(&self, amount: u64, absolute_offsets: &[u64]) -> Option<Vec<OutputInfo>> {
        let requests: Vec<_> = absolute_offsets.iter().map(|&index| (amount, index)).collect();
        found(
            &format!("{} outputs of amount {amount}", requests.len()),
            self.node.outputs_by_amount_and_index(&requests).await,
        )
    }

    /// Output of `amount` at `global_index`.
    pub async fn get_output(&self, amount: u64, global_index: u64) -> Option<OutputInfo> {
        self.get_output_keys(amount, &[global_index])
            .await?
            .into_iter()
            .next()
    }

    /// Amount-specific global indices of the outputs of `tx_hash`.
    pub async fn get_amount_specific_indices(&self, tx_hash: &Hash) -> Option<Vec<u64>> {
        found(
            &format!("output indices of {tx_hash}"),
            self.node.tx_amount_output_indices(tx_hash).await,
        )
    }

    /// Up to `outs_count` random outputs for each of `amounts`, for use as
    /// ring decoys.
    pub async fn get_random_outputs(&self, amounts: &[u64], outs_count: u64) -> Option<Vec<OutsForAmount>> {
        found(
            &format!("{outs_count} random outputs for {} amounts", amounts.len()),
            self.node.random_outputs_for_amounts(amounts, outs_count).await,
        )
    }

    /// Per-kB fee estimate.
    pub async fn get_dynamic_fee_estimate(&self) -> Option<u64> {
        found(
            "fee estimate",
            self.node.fee_estimate(FEE_ESTIMATE_GRACE_BLOCKS).await,
        )
    }

    /// Relay a signed transaction, honouring the configured `do_not_relay`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Submit`] if no submitter is configured, or
    /// [`Error::Node`] carrying the node's reason if it rejects the
    /// transaction.
    pub async fn commit_tx(&self, blob: &[u8]) -> Result<()> {
        let submitter = self
            .submitter
            .as_ref()
            .ok_or_else(|| Error::Submit("no transaction submitter configured".into()))?;
        submitter
            .submit_transaction(blob, self.do_not_relay)
            .await?;
        info!("Submitted transaction of {} bytes", blob.len());
        Ok(())
    }

    // Mempool

    /// Re-read the mempool. `false` leaves the previous snapshot in place.
    pub async fn refresh_mempool(&self) -> bool {
        self.chain.refresh_mempool().await
    }

    /// Last good mempool snapshot.
    #[must_use]
    pub fn mempool_txs(&self) -> Arc<[MempoolTx]> {
        self.chain.current_snapshot()
    }

    // Unlock checks

    /// Whether outputs with `unlock_time` are spendable at the cached height.
    #[must_use]
    pub fn is_tx_unlocked(&self, unlock_time: u64) -> bool {
        self.is_tx_unlocked_with_clock(unlock_time, self.clock.as_ref())
    }

    /// [`is_tx_unlocked`](Self::is_tx_unlocked) against an explicit clock.
    #[must_use]
    pub fn is_tx_unlocked_with_clock(&self, unlock_time: u64, clock: &dyn Clock) -> bool {
        self.unlock
            .is_unlocked(unlock_time, self.chain.current_height(), clock)
    }

    // Import payments

    /// Hash of the transaction paying at least `amount` under `payment_id`
    /// to the import address.
    pub async fn search_if_payment_made(&self, payment_id: &PaymentId, amount: u64) -> Option<Hash> {
        let Some(payments) = &self.payments else {
            warn!("Payment search requested but import payments are disabled");
            return None;
        };
        payments.find(payment_id, amount).await
    }

    /// [`search_if_payment_made`](Self::search_if_payment_made) for a hex
    /// payment id. Malformed hex is `None`.
    pub async fn search_if_payment_made_hex(&self, payment_id: &str, amount: u64) -> Option<Hash> {
        match payment_id.parse::<PaymentId>() {
            Ok(payment_id) => self.search_if_payment_made(&payment_id, amount).await,
            Err(e) => {
                debug!("search_if_payment_made_hex: {e}");
                None
            }
        }
    }

    /// Import address with `payment_id` folded in.
    #[must_use]
    pub fn integrated_address(&self, payment_id: &PaymentId) -> Option<String> {
        let encoder = self.encoder.as_ref()?;
        let account = self.import_account.as_ref()?;
        encoder.integrated_address(self.network, &account.address, payment_id)
    }

    /// [`integrated_address`](Self::integrated_address) for a hex payment id.
    #[must_use]
    pub fn integrated_address_hex(&self, payment_id: &str) -> Option<String> {
        let payment_id = payment_id.parse::<PaymentId>().ok()?;
        self.integrated_address(&payment_id)
    }

    // Account searches

    /// Start searching for `account`'s outputs unless a search for its
    /// address is already registered.
    pub fn start_search(&self, account: Account) -> bool {
        let Some(scanner) = &self.scanner else {
            warn!("Cannot search for {}: no output scanner configured", account.address);
            return false;
        };
        if self.registry.still_exists(&account.address) {
            return true;
        }
        let worker = SearchWorker::new(
            account,
            Arc::clone(&self.node),
            Arc::clone(scanner),
            self.search_config.clone(),
        );
        self.registry.start_search(Arc::new(worker))
    }

    /// Ping the search for `address`.
    pub fn ping_search(&self, address: &str) -> bool {
        self.registry.ping(address)
    }

    /// Whether a search for `address` is registered.
    #[must_use]
    pub fn search_exists(&self, address: &str) -> bool {
        self.registry.still_exists(address)
    }

    /// Whether the search for `address` answered its last ping in time.
    #[must_use]
    pub fn search_is_responsive(&self, address: &str) -> Option<bool> {
        self.registry.is_responsive(address)
    }

    /// Ask the search for `address` to stop.
    pub fn stop_search(&self, address: &str) -> bool {
        self.registry.stop(address)
    }

    /// Reap finished searches.
    pub fn cleanup_searches(&self) -> usize {
        self.registry.cleanup()
    }

    /// Highest height scanned for `address`.
    #[must_use]
    pub fn searched_height(&self, address: &str) -> Option<u64> {
        self.registry.searched_height(address)
    }

    /// Outputs found for `address`.
    #[must_use]
    pub fn known_outputs(&self, address: &str) -> Option<KnownOutputs> {
        self.registry.known_outputs(address)
    }

    /// Address and view key of the search for `address`.
    #[must_use]
    pub fn account_view_key(&self, address: &str) -> Option<(String, ViewKey)> {
        self.registry.account_view_key(address)
    }

    /// Stop every search.
    pub fn shutdown_searches(&self) {
        self.registry.shutdown();
    }
}
