//! Per-account output search.
//!
//! Each watched account gets one [`Search`] running as its own tokio task.
//! The [`WorkerRegistry`] owns the handles, keyed by account address, and
//! guarantees at most one per account.
//!
//! ```text
//! start_search(account) ──► WorkerRegistry ──spawn──► SearchWorker::run
//!                              │                         │
//!          ping / stop ────────┤                         ├─ block_at_height(cursor + 1)
//!          searched_height ◄───┤◄── atomics / mutex ─────┤─ OutputScanner::owned_outputs
//!          cleanup() ──────────┘  (reaps stopped)        └─ sleep when caught up
//! ```

mod registry;
mod worker;

pub use registry::WorkerRegistry;
pub use worker::{SearchWorker, WorkerState};

use crate::types::{Account, KnownOutputs};
use async_trait::async_trait;

/// A long-running scan for one account's outputs.
#[async_trait]
pub trait Search: Send + Sync {
    /// Account being searched; its address is the registry key.
    fn account(&self) -> &Account;

    /// Run the scan loop until it finishes or is stopped.
    async fn run(&self);

    /// Ask the search to acknowledge that it is alive.
    fn ping(&self);

    /// False once the scan loop has exited and the search can be reaped.
    fn still_searching(&self) -> bool;

    /// False if a ping has gone unacknowledged past its deadline.
    fn is_responsive(&self) -> bool;

    /// Highest block height fully scanned.
    fn searched_height(&self) -> u64;

    /// Outputs found so far (output key to local index).
    fn known_outputs(&self) -> KnownOutputs;

    /// Request the scan loop to exit at its next check.
    fn stop(&self);
}
