//! In-memory test doubles for the node, crypto and search interfaces.
//!
//! These implement the same traits the production collaborators do, so the
//! cache, searchers and facade can be exercised without a daemon. Output
//! ownership in [`MockScanner`] is keyed on the address: an output belongs
//! to an account when the first half of its key equals the first half of
//! `sha256(address)`.

use crate::codec::MsgPackDecoder;
use crate::crypto::{AddressEncoder, OutputScanner, OwnedOutput};
use crate::network::NetworkType;
use crate::node::{NodeError, NodeInterface, NodeResult, TransactionSubmitter, TxLookup};
use crate::search::Search;
use crate::types::{
    Account, Block, Commitment, Hash, KnownOutputs, MempoolEntry, OutputInfo, OutsForAmount,
    PaymentId, PublicKey, RandomOutput, Transaction, TxOutput, ViewKey,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::watch;

/// Address that receives import payments in tests.
pub const IMPORT_ADDRESS: &str = "import-payment-address";

/// Extra-field tag carrying a plain 8-byte payment id.
const PAYMENT_ID_TAG: u8 = 0x01;

static NEXT_OUTPUT: AtomicU64 = AtomicU64::new(1);

fn address_prefix(address: &str) -> [u8; 16] {
    let digest = Sha256::digest(address.as_bytes());
    let mut prefix = [0u8; 16];
    prefix.copy_from_slice(&digest[..16]);
    prefix
}

/// An output key owned by `address`, made unique by `n`.
#[must_use]
pub fn owned_key(address: &str, n: u64) -> PublicKey {
    let mut key = [0u8; 32];
    key[..16].copy_from_slice(&address_prefix(address));
    key[16..24].copy_from_slice(&n.to_le_bytes());
    PublicKey(key)
}

/// An output of `amount` owned by `address`.
#[must_use]
pub fn owned_output(address: &str, amount: u64, n: u64) -> TxOutput {
    TxOutput {
        amount,
        key: owned_key(address, n),
    }
}

/// Transaction paying `amount` to `address`, optionally tagged with `payment_id`.
///
/// Every call produces a distinct output key, and therefore a distinct hash.
#[must_use]
pub fn tx_to(address: &str, amount: u64, payment_id: Option<PaymentId>) -> Transaction {
    let n = NEXT_OUTPUT.fetch_add(1, Ordering::Relaxed);
    let mut extra = Vec::new();
    if let Some(pid) = payment_id {
        extra.push(PAYMENT_ID_TAG);
        extra.extend_from_slice(pid.as_bytes());
    }
    Transaction {
        version: 2,
        unlock_time: 0,
        coinbase: false,
        inputs: Vec::new(),
        outputs: vec![owned_output(address, amount, n)],
        extra,
    }
}

/// Transaction paying `amount` to [`IMPORT_ADDRESS`].
#[must_use]
pub fn tx_paying(amount: u64, payment_id: Option<PaymentId>) -> Transaction {
    tx_to(IMPORT_ADDRESS, amount, payment_id)
}

/// Account for `address` with a zero view key.
#[must_use]
pub fn account(address: &str, start_height: u64) -> Account {
    Account::new(address, ViewKey([0u8; 32]), start_height)
}

/// Hash of `tx` as [`MsgPackDecoder`] computes it.
///
/// # Panics
///
/// Panics if `tx` cannot be serialized.
#[must_use]
#[allow(clippy::expect_used)]
pub fn tx_hash(tx: &Transaction) -> Hash {
    MsgPackDecoder::blob_hash(&MsgPackDecoder::encode(tx).expect("serializable tx"))
}

struct IndexedOutput {
    info: OutputInfo,
    local_index: u64,
}

#[derive(Default)]
struct NodeState {
    blocks: Vec<Block>,
    height_override: Option<u64>,
    txs: HashMap<Hash, Transaction>,
    hidden: HashSet<Hash>,
    amount_indices: HashMap<Hash, Vec<u64>>,
    outputs: HashMap<(u64, u64), IndexedOutput>,
    next_global: HashMap<u64, u64>,
    mempool: Vec<MempoolEntry>,
    fee: u64,
    fail_height: Option<NodeError>,
    fail_blocks: Option<NodeError>,
    fail_next_blocks: u32,
    fail_transactions: Option<NodeError>,
    fail_mempool: Option<NodeError>,
    fail_random_outputs: Option<NodeError>,
    reject_submit: Option<String>,
    submitted: Vec<(Vec<u8>, bool)>,
    block_calls: u64,
}

/// In-memory chain implementing [`NodeInterface`] and [`TransactionSubmitter`].
pub struct MockNode {
    state: Mutex<NodeState>,
}

impl Default for MockNode {
    fn default() -> Self {
        Self::new()
    }
}

impl MockNode {
    /// Empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(NodeState {
                fee: 20_000,
                ..NodeState::default()
            }),
        }
    }

    /// Chain of `count` blocks holding only miner transactions.
    #[must_use]
    pub fn with_blocks(count: u64) -> Self {
        let node = Self::new();
        for _ in 0..count {
            node.add_block(Vec::new());
        }
        node
    }

    /// Append a block holding `txs` and a miner transaction paying nobody.
    pub fn add_block(&self, txs: Vec<Transaction>) -> Block {
        let miner_tx = Transaction {
            version: 2,
            coinbase: true,
            outputs: vec![owned_output("miner", 600_000_000_000, NEXT_OUTPUT.fetch_add(1, Ordering::Relaxed))],
            ..Transaction::default()
        };
        self.add_block_with_miner(miner_tx, txs)
    }

    /// Append a block with an explicit miner transaction.
    pub fn add_block_with_miner(&self, miner_tx: Transaction, txs: Vec<Transaction>) -> Block {
        let mut state = self.state.lock();
        let height = state.blocks.len() as u64;

        let miner_tx_hash = tx_hash(&miner_tx);
        state.index_outputs(height, miner_tx_hash, &miner_tx);
        state.txs.insert(miner_tx_hash, miner_tx.clone());

        let mut tx_hashes = Vec::with_capacity(txs.len());
        for tx in txs {
            let hash = tx_hash(&tx);
            state.index_outputs(height, hash, &tx);
            state.txs.insert(hash, tx);
            tx_hashes.push(hash);
        }

        let block = Block {
            height,
            hash: Hash(Sha256::digest(height.to_le_bytes()).into()),
            timestamp: 1_600_000_000 + height * 120,
            miner_tx,
            miner_tx_hash,
            tx_hashes,
        };
        state.blocks.push(block.clone());
        block
    }

    /// Report `count` as the chain's block count regardless of stored blocks.
    pub fn set_height(&self, count: u64) {
        self.state.lock().height_override = Some(count);
    }

    /// Make `current_height` fail with `error` until cleared.
    pub fn fail_height(&self, error: Option<NodeError>) {
        self.state.lock().fail_height = error;
    }

    /// Make every block fetch fail with `error` until cleared.
    pub fn fail_blocks(&self, error: Option<NodeError>) {
        self.state.lock().fail_blocks = error;
    }

    /// Make the next `count` block fetches fail with a transport error.
    pub fn fail_next_blocks(&self, count: u32) {
        self.state.lock().fail_next_blocks = count;
    }

    /// Make transaction lookups fail with `error` until cleared.
    pub fn fail_transactions(&self, error: Option<NodeError>) {
        self.state.lock().fail_transactions = error;
    }

    /// Make the mempool fetch fail with `error` until cleared.
    pub fn fail_mempool(&self, error: Option<NodeError>) {
        self.state.lock().fail_mempool = error;
    }

    /// Make random output draws fail with `error` until cleared.
    pub fn fail_random_outputs(&self, error: Option<NodeError>) {
        self.state.lock().fail_random_outputs = error;
    }

    /// Report `hash` as missed in transaction lookups.
    pub fn hide_transaction(&self, hash: Hash) {
        self.state.lock().hidden.insert(hash);
    }

    /// Queue `tx` in the mempool.
    ///
    /// # Panics
    ///
    /// Panics if `tx` cannot be serialized.
    #[allow(clippy::expect_used)]
    pub fn push_mempool_tx(&self, tx: &Transaction) -> Hash {
        let blob = MsgPackDecoder::encode(tx).expect("serializable tx");
        let hash = MsgPackDecoder::blob_hash(&blob);
        self.push_mempool_blob(blob);
        hash
    }

    /// Queue a raw blob in the mempool.
    pub fn push_mempool_blob(&self, blob: Vec<u8>) {
        self.state.lock().mempool.push(MempoolEntry { blob: blob.into() });
    }

    /// Drop every mempool entry.
    pub fn clear_mempool(&self) {
        self.state.lock().mempool.clear();
    }

    /// Set the fee estimate.
    pub fn set_fee(&self, fee: u64) {
        self.state.lock().fee = fee;
    }

    /// Reject submissions with `reason` until cleared.
    pub fn reject_submissions(&self, reason: Option<String>) {
        self.state.lock().reject_submit = reason;
    }

    /// Accepted submissions, in order.
    #[must_use]
    pub fn submitted(&self) -> Vec<(Vec<u8>, bool)> {
        self.state.lock().submitted.clone()
    }

    /// Number of block fetches served or failed so far.
    #[must_use]
    pub fn block_calls(&self) -> u64 {
        self.state.lock().block_calls
    }
}

impl NodeState {
    fn index_outputs(&mut self, height: u64, tx_hash: Hash, tx: &Transaction) {
        let mut indices = Vec::with_capacity(tx.outputs.len());
        for (local_index, output) in tx.outputs.iter().enumerate() {
            let next = self.next_global.entry(output.amount).or_insert(0);
            let global = *next;
            *next += 1;
            indices.push(global);
            self.outputs.insert(
                (output.amount, global),
                IndexedOutput {
                    info: OutputInfo {
                        key: output.key,
                        mask: Commitment::default(),
                        unlocked: true,
                        height,
                        tx_hash,
                    },
                    local_index: local_index as u64,
                },
            );
        }
        self.amount_indices.insert(tx_hash, indices);
    }

    fn block(&mut self, height: u64) -> NodeResult<Block> {
        self.block_calls += 1;
        if let Some(e) = &self.fail_blocks {
            return Err(e.clone());
        }
        if self.fail_next_blocks > 0 {
            self.fail_next_blocks -= 1;
            return Err(NodeError::Transport("injected block failure".into()));
        }
        usize::try_from(height)
            .ok()
            .and_then(|h| self.blocks.get(h))
            .cloned()
            .ok_or_else(|| NodeError::NotFound(format!("block {height}")))
    }
}

#[async_trait]
impl NodeInterface for MockNode {
    async fn current_height(&self) -> NodeResult<u64> {
        let state = self.state.lock();
        if let Some(e) = &state.fail_height {
            return Err(e.clone());
        }
        Ok(state.height_override.unwrap_or(state.blocks.len() as u64))
    }

    async fn block_at_height(&self, height: u64) -> NodeResult<Block> {
        self.state.lock().block(height)
    }

    async fn blocks_in_range(&self, start: u64, end: u64) -> NodeResult<Vec<Block>> {
        let mut state = self.state.lock();
        (start..=end).map(|h| state.block(h)).collect()
    }

    async fn transactions_by_hash(&self, hashes: &[Hash]) -> NodeResult<TxLookup> {
        let state = self.state.lock();
        if let Some(e) = &state.fail_transactions {
            return Err(e.clone());
        }
        let mut lookup = TxLookup::default();
        for hash in hashes {
            match state.txs.get(hash) {
                Some(tx) if !state.hidden.contains(hash) => lookup.found.push((*hash, tx.clone())),
                _ => lookup.missed.push(*hash),
            }
        }
        Ok(lookup)
    }

    async fn tx_exists(&self, hash: &Hash) -> NodeResult<bool> {
        let state = self.state.lock();
        Ok(state.txs.contains_key(hash) && !state.hidden.contains(hash))
    }

    async fn tx_amount_output_indices(&self, hash: &Hash) -> NodeResult<Vec<u64>> {
        self.state
            .lock()
            .amount_indices
            .get(hash)
            .cloned()
            .ok_or_else(|| NodeError::NotFound(format!("tx {hash}")))
    }

    async fn output_tx_and_index(&self, amount: u64, global_index: u64) -> NodeResult<(Hash, u64)> {
        self.state
            .lock()
            .outputs
            .get(&(amount, global_index))
            .map(|o| (o.info.tx_hash, o.local_index))
            .ok_or_else(|| NodeError::NotFound(format!("output {amount}/{global_index}")))
    }

    async fn outputs_by_amount_and_index(&self, requests: &[(u64, u64)]) -> NodeResult<Vec<OutputInfo>> {
        let state = self.state.lock();
        requests
            .iter()
            .map(|key| {
                state
                    .outputs
                    .get(key)
                    .map(|o| o.info)
                    .ok_or_else(|| NodeError::NotFound(format!("output {}/{}", key.0, key.1)))
            })
            .collect()
    }

    /// Draws are deterministic: the lowest global indices of each amount.
    async fn random_outputs_for_amounts(&self, amounts: &[u64], outs_count: u64) -> NodeResult<Vec<OutsForAmount>> {
        let state = self.state.lock();
        if let Some(e) = &state.fail_random_outputs {
            return Err(e.clone());
        }
        Ok(amounts
            .iter()
            .map(|&amount| {
                let available = state.next_global.get(&amount).copied().unwrap_or(0);
                let outs = (0..available.min(outs_count))
                    .filter_map(|global_index| {
                        state.outputs.get(&(amount, global_index)).map(|o| RandomOutput {
                            global_index,
                            key: o.info.key,
                        })
                    })
                    .collect();
                OutsForAmount { amount, outs }
            })
            .collect())
    }

    async fn mempool_entries(&self) -> NodeResult<Vec<MempoolEntry>> {
        let state = self.state.lock();
        if let Some(e) = &state.fail_mempool {
            return Err(e.clone());
        }
        Ok(state.mempool.clone())
    }

    async fn fee_estimate(&self, _grace_blocks: u64) -> NodeResult<u64> {
        Ok(self.state.lock().fee)
    }
}

#[async_trait]
impl TransactionSubmitter for MockNode {
    async fn submit_transaction(&self, blob: &[u8], do_not_relay: bool) -> NodeResult<()> {
        let mut state = self.state.lock();
        if let Some(reason) = &state.reject_submit {
            return Err(NodeError::Transport(reason.clone()));
        }
        state.submitted.push((blob.to_vec(), do_not_relay));
        Ok(())
    }
}

/// Ownership detection keyed on the account address.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockScanner;

impl OutputScanner for MockScanner {
    fn owned_outputs(&self, account: &Account, tx: &Transaction) -> Vec<OwnedOutput> {
        let prefix = address_prefix(&account.address);
        tx.outputs
            .iter()
            .enumerate()
            .filter(|(_, out)| out.key.0[..16] == prefix)
            .map(|(i, out)| OwnedOutput {
                key: out.key,
                index: i as u64,
                amount: out.amount,
            })
            .collect()
    }

    fn decrypt_payment_id(&self, _account: &Account, tx: &Transaction) -> Option<PaymentId> {
        match tx.extra.as_slice() {
            [PAYMENT_ID_TAG, rest @ ..] if rest.len() >= PaymentId::LEN => {
                let mut pid = [0u8; PaymentId::LEN];
                pid.copy_from_slice(&rest[..PaymentId::LEN]);
                Some(PaymentId(pid))
            }
            _ => None,
        }
    }
}

/// Integrated addresses rendered as `address:payment_id`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockEncoder;

impl AddressEncoder for MockEncoder {
    fn integrated_address(
        &self,
        network: NetworkType,
        address: &str,
        payment_id: &PaymentId,
    ) -> Option<String> {
        if address.is_empty() {
            return None;
        }
        Some(format!("{network}:{address}:{payment_id}"))
    }
}

/// A [`Search`] whose progress is set by the test.
///
/// `run` parks until [`Search::stop`] or [`ScriptedSearch::finish`] is
/// called, unless built with [`ScriptedSearch::finished_on_run`].
pub struct ScriptedSearch {
    account: Account,
    searching: AtomicBool,
    responsive: AtomicBool,
    exit_on_run: bool,
    height: AtomicU64,
    outputs: Mutex<KnownOutputs>,
    pings: AtomicU64,
    runs: AtomicU64,
    stop_tx: watch::Sender<bool>,
}

impl ScriptedSearch {
    /// Search for `address` that runs until stopped.
    #[must_use]
    pub fn new(address: &str) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            account: account(address, 0),
            searching: AtomicBool::new(true),
            responsive: AtomicBool::new(true),
            exit_on_run: false,
            height: AtomicU64::new(0),
            outputs: Mutex::new(KnownOutputs::new()),
            pings: AtomicU64::new(0),
            runs: AtomicU64::new(0),
            stop_tx,
        }
    }

    /// Search whose run returns immediately, as if already caught up.
    #[must_use]
    pub fn finished_on_run(address: &str) -> Self {
        Self {
            exit_on_run: true,
            ..Self::new(address)
        }
    }

    /// Report `height` as scanned.
    pub fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::Release);
    }

    /// Record a found output.
    pub fn add_output(&self, key: PublicKey, index: u64) {
        self.outputs.lock().insert(key, index);
    }

    /// Override the responsiveness report.
    pub fn set_responsive(&self, responsive: bool) {
        self.responsive.store(responsive, Ordering::Release);
    }

    /// End the run loop.
    pub fn finish(&self) {
        self.stop();
    }

    /// Pings received.
    #[must_use]
    pub fn pings(&self) -> u64 {
        self.pings.load(Ordering::Acquire)
    }

    /// Times `run` was entered.
    #[must_use]
    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Search for ScriptedSearch {
    fn account(&self) -> &Account {
        &self.account
    }

    async fn run(&self) {
        self.runs.fetch_add(1, Ordering::AcqRel);
        if !self.exit_on_run {
            let mut stop_rx = self.stop_tx.subscribe();
            let _ = stop_rx.wait_for(|stop| *stop).await;
        }
        self.searching.store(false, Ordering::Release);
    }

    fn ping(&self) {
        self.pings.fetch_add(1, Ordering::AcqRel);
    }

    fn still_searching(&self) -> bool {
        self.searching.load(Ordering::Acquire)
    }

    fn is_responsive(&self) -> bool {
        self.responsive.load(Ordering::Acquire)
    }

    fn searched_height(&self) -> u64 {
        self.height.load(Ordering::Acquire)
    }

    fn known_outputs(&self) -> KnownOutputs {
        self.outputs.lock().clone()
    }

    fn stop(&self) {
        self.stop_tx.send_replace(true);
    }
}
