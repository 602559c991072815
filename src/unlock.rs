//! Spend-time unlock evaluation.
//!
//! A transaction's `unlock_time` carries one of two encodings:
//!
//! ```text
//! unlock_time < UNLOCK_HEIGHT_THRESHOLD  -> block height
//! unlock_time >= UNLOCK_HEIGHT_THRESHOLD -> unix timestamp
//! ```
//!
//! Timestamps get a network-dependent leeway of one block target to absorb
//! block-time variance.

use crate::network::NetworkType;
use std::sync::atomic::{AtomicU64, Ordering};

/// Values below this are block heights, values at or above are timestamps.
pub const UNLOCK_HEIGHT_THRESHOLD: u64 = 500_000_000;

/// Source of the current unix time.
pub trait Clock: Send + Sync {
    /// Current unix timestamp in seconds.
    fn now(&self) -> u64;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
    }
}

/// Clock pinned to a settable instant.
#[derive(Debug, Default)]
pub struct FixedClock(AtomicU64);

impl FixedClock {
    /// Clock reporting `now` until changed.
    #[must_use]
    pub fn new(now: u64) -> Self {
        Self(AtomicU64::new(now))
    }

    /// Move the clock.
    pub fn set(&self, now: u64) {
        self.0.store(now, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Answers "is an output with this unlock time spendable now".
#[derive(Debug, Clone, Copy)]
pub struct UnlockEvaluator {
    network: NetworkType,
}

impl UnlockEvaluator {
    /// Evaluator using `network`'s leeway rules.
    #[must_use]
    pub const fn new(network: NetworkType) -> Self {
        Self { network }
    }

    /// Network whose leeway is applied.
    #[must_use]
    pub const fn network(&self) -> NetworkType {
        self.network
    }

    /// Whether `unlock_time` has passed at `current_height` / `clock.now()`.
    #[must_use]
    pub fn is_unlocked(&self, unlock_time: u64, current_height: u64, clock: &dyn Clock) -> bool {
        if unlock_time < UNLOCK_HEIGHT_THRESHOLD {
            return current_height >= unlock_time;
        }

        let leeway = self.network.unlock_leeway(current_height);
        clock.now() >= unlock_time.saturating_sub(leeway)
    }
}
