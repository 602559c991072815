//! Block-by-block output scanner for a single account.

use super::Search;
use crate::config::SearchConfig;
use crate::crypto::OutputScanner;
use crate::node::{NodeError, NodeInterface, NodeResult};
use crate::types::{Account, KnownOutputs, Transaction};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};

/// Lifecycle of a [`SearchWorker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Built, loop not entered yet.
    Created,
    /// Loop running.
    Scanning,
    /// Loop exited. Terminal.
    Stopped,
}

#[derive(Debug, Default)]
struct Liveness {
    pending_since: Option<Instant>,
    last_ack: Option<Instant>,
}

enum Step {
    Advanced { height: u64, found: usize },
    CaughtUp,
    TargetReached(u64),
}

#[derive(Debug)]
enum Exit {
    Stopped,
    TargetReached(u64),
    RetriesExhausted(u32),
}

/// Scans blocks above the account's start height for outputs it owns.
///
/// The cursor starts at `account.start_height`, which counts as already
/// scanned. A block is counted only after every transaction in it,
/// the miner transaction included, has been checked.
pub struct SearchWorker {
    account: Account,
    node: Arc<dyn NodeInterface>,
    scanner: Arc<dyn OutputScanner>,
    config: SearchConfig,
    target_height: Option<u64>,
    cursor: AtomicU64,
    known_outputs: Mutex<KnownOutputs>,
    state: Mutex<WorkerState>,
    liveness: Mutex<Liveness>,
    wake: Notify,
    stop_tx: watch::Sender<bool>,
}

impl SearchWorker {
    /// Create a worker for `account`. Nothing runs until [`Search::run`].
    #[must_use]
    pub fn new(
        account: Account,
        node: Arc<dyn NodeInterface>,
        scanner: Arc<dyn OutputScanner>,
        config: SearchConfig,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            cursor: AtomicU64::new(account.start_height),
            account,
            node,
            scanner,
            config,
            target_height: None,
            known_outputs: Mutex::new(KnownOutputs::new()),
            state: Mutex::new(WorkerState::Created),
            liveness: Mutex::new(Liveness::default()),
            wake: Notify::new(),
            stop_tx,
        }
    }

    /// Finish once `height` has been scanned instead of following the tip.
    #[must_use]
    pub fn with_target_height(mut self, height: u64) -> Self {
        self.target_height = Some(height);
        self
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> WorkerState {
        *self.state.lock()
    }

    /// When the last ping was acknowledged.
    #[must_use]
    pub fn last_ping_ack(&self) -> Option<Instant> {
        self.liveness.lock().last_ack
    }

    fn acknowledge_ping(&self) {
        let mut liveness = self.liveness.lock();
        if liveness.pending_since.take().is_some() {
            liveness.last_ack = Some(Instant::now());
        }
    }

    async fn scan_loop(&self, stop_rx: &mut watch::Receiver<bool>) -> Exit {
        let mut failures: u32 = 0;

        loop {
            if *stop_rx.borrow_and_update() {
                return Exit::Stopped;
            }
            self.acknowledge_ping();

            match self.step().await {
                Ok(Step::Advanced { height, found }) => {
                    failures = 0;
                    if found > 0 {
                        info!("Found {found} outputs for {} in block {height}", self.account.address);
                    } else {
                        debug!("Scanned block {height} for {}", self.account.address);
                    }
                    tokio::task::yield_now().await;
                    continue;
                }
                Ok(Step::CaughtUp) => failures = 0,
                Ok(Step::TargetReached(height)) => return Exit::TargetReached(height),
                Err(e) => {
                    failures = failures.saturating_add(1);
                    warn!(
                        "Search for {} failed at height {} (attempt {failures}): {e}",
                        self.account.address,
                        self.searched_height() + 1
                    );
                    if self.config.max_fetch_retries.is_some_and(|max| failures > max) {
                        return Exit::RetriesExhausted(failures);
                    }
                }
            }

            tokio::select! {
                _ = stop_rx.changed() => {}
                () = self.wake.notified() => {}
                () = tokio::time::sleep(self.config.poll_interval()) => {}
            }
        }
    }

    async fn step(&self) -> NodeResult<Step> {
        let tip = self.node.current_height().await?.saturating_sub(1);
        let cursor = self.cursor.load(Ordering::Acquire);

        if let Some(target) = self.target_height {
            if cursor >= target {
                return Ok(Step::TargetReached(cursor));
            }
        }
        let limit = self.target_height.map_or(tip, |target| target.min(tip));
        if cursor >= limit {
            return Ok(Step::CaughtUp);
        }

        let height = cursor + 1;
        let block = self.node.block_at_height(height).await?;
        let mut txs: Vec<Transaction> = Vec::with_capacity(block.tx_hashes.len() + 1);
        txs.push(block.miner_tx);

        if !block.tx_hashes.is_empty() {
            let lookup = self.node.transactions_by_hash(&block.tx_hashes).await?;
            if !lookup.missed.is_empty() {
                return Err(NodeError::NotFound(format!(
                    "{} transactions of block {height}",
                    lookup.missed.len()
                )));
            }
            txs.extend(lookup.found.into_iter().map(|(_, tx)| tx));
        }

        let owned: Vec<_> = txs
            .iter()
            .flat_map(|tx| self.scanner.owned_outputs(&self.account, tx))
            .collect();

        let mut found = 0;
        {
            let mut known = self.known_outputs.lock();
            for output in owned {
                if let Entry::Vacant(slot) = known.entry(output.key) {
                    slot.insert(output.index);
                    found += 1;
                }
            }
        }

        self.cursor.store(height, Ordering::Release);
        Ok(Step::Advanced { height, found })
    }
}

#[async_trait]
impl Search for SearchWorker {
    fn account(&self) -> &Account {
        &self.account
    }

    async fn run(&self) {
        {
            let mut state = self.state.lock();
            if *state != WorkerState::Created {
                warn!("Search for {} already started", self.account.address);
                return;
            }
            *state = WorkerState::Scanning;
        }
        info!(
            "Search for {} started above height {}",
            self.account.address,
            self.searched_height()
        );

        let mut stop_rx = self.stop_tx.subscribe();
        let exit = self.scan_loop(&mut stop_rx).await;
        *self.state.lock() = WorkerState::Stopped;

        match exit {
            Exit::Stopped => info!("Search for {} stopped", self.account.address),
            Exit::TargetReached(height) => {
                info!("Search for {} reached target height {height}", self.account.address);
            }
            Exit::RetriesExhausted(failures) => warn!(
                "Search for {} gave up after {failures} consecutive failures",
                self.account.address
            ),
        }
    }

    fn ping(&self) {
        self.liveness.lock().pending_since.get_or_insert_with(Instant::now);
        self.wake.notify_one();
    }

    fn still_searching(&self) -> bool {
        self.state() != WorkerState::Stopped
    }

    fn is_responsive(&self) -> bool {
        match self.liveness.lock().pending_since {
            Some(since) => since.elapsed() <= self.config.ping_timeout(),
            None => true,
        }
    }

    fn searched_height(&self) -> u64 {
        self.cursor.load(Ordering::Acquire)
    }

    fn known_outputs(&self) -> KnownOutputs {
        self.known_outputs.lock().clone()
    }

    fn stop(&self) {
        self.stop_tx.send_replace(true);
        self.wake.notify_one();
    }
}
