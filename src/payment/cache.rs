//! LRU cache of confirmed payment matches.
//!
//! Only matches found in confirmed blocks are stored. A mempool match can
//! still be dropped or replaced, so it is looked up again every time.
//! Each entry remembers the height it was confirmed at, and a lookup only
//! hits when that height lies inside the caller's block range.

use crate::types::{Hash, PaymentId};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::ops::RangeInclusive;
use std::sync::Arc;

/// Default cache capacity.
const DEFAULT_CACHE_CAPACITY: usize = 1_000;

type PaymentKey = (PaymentId, u64);

/// Matching transaction and the height of its block.
type ConfirmedAt = (Hash, u64);

/// Confirmed payments keyed by payment id and requested amount.
#[derive(Clone)]
pub struct FoundPaymentCache {
    inner: Arc<Mutex<LruCache<PaymentKey, ConfirmedAt>>>,
    stats: Arc<Mutex<CacheStats>>,
}

/// Cache statistics.
#[derive(Debug, Default, Clone)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that fell through to a search.
    pub misses: u64,
    /// Matches stored.
    pub additions: u64,
}

impl CacheStats {
    /// Hit rate as a percentage.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

impl FoundPaymentCache {
    /// Cache with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    /// Cache holding at most `capacity` matches (minimum one).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(Mutex::new(LruCache::new(cap))),
            stats: Arc::new(Mutex::new(CacheStats::default())),
        }
    }

    /// Transaction previously found paying `amount` under `payment_id` in a
    /// block within `heights`.
    ///
    /// An entry confirmed outside `heights` counts as a miss.
    pub fn get(&self, payment_id: &PaymentId, amount: u64, heights: &RangeInclusive<u64>) -> Option<Hash> {
        let found = self
            .inner
            .lock()
            .get(&(*payment_id, amount))
            .filter(|(_, height)| heights.contains(height))
            .map(|(hash, _)| *hash);

        let mut stats = self.stats.lock();
        if found.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
        found
    }

    /// Remember a match confirmed in the block at `height`.
    pub fn insert(&self, payment_id: PaymentId, amount: u64, tx_hash: Hash, height: u64) {
        self.inner.lock().put((payment_id, amount), (tx_hash, height));
        self.stats.lock().additions += 1;
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.stats.lock().clone()
    }

    /// Number of cached matches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl Default for FoundPaymentCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PID: PaymentId = PaymentId([1u8; 8]);
    const ALL: RangeInclusive<u64> = 0..=u64::MAX;

    #[test]
    fn test_keyed_by_id_and_amount() {
        let cache = FoundPaymentCache::new();
        cache.insert(PID, 100, Hash([9u8; 32]), 5);

        assert_eq!(cache.get(&PID, 100, &ALL), Some(Hash([9u8; 32])));
        assert_eq!(cache.get(&PID, 200, &ALL), None);
        assert_eq!(cache.get(&PaymentId([2u8; 8]), 100, &ALL), None);
    }

    #[test]
    fn test_hit_only_within_heights() {
        let cache = FoundPaymentCache::new();
        cache.insert(PID, 100, Hash([9u8; 32]), 3);

        assert_eq!(cache.get(&PID, 100, &(10..=20)), None);
        assert_eq!(cache.get(&PID, 100, &(0..=2)), None);
        assert_eq!(cache.get(&PID, 100, &(3..=3)), Some(Hash([9u8; 32])));
        assert_eq!(cache.get(&PID, 100, &(0..=5)), Some(Hash([9u8; 32])));

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 2);
    }

    #[test]
    fn test_stats() {
        let cache = FoundPaymentCache::new();
        assert!(cache.get(&PID, 1, &ALL).is_none());
        cache.insert(PID, 1, Hash::default(), 0);
        assert!(cache.get(&PID, 1, &ALL).is_some());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.additions, 1);
        assert!((stats.hit_rate() - 50.0).abs() < 0.01);
    }

    #[test]
    fn test_lru_eviction() {
        let cache = FoundPaymentCache::with_capacity(2);
        cache.insert(PID, 1, Hash([1u8; 32]), 1);
        cache.insert(PID, 2, Hash([2u8; 32]), 2);
        cache.insert(PID, 3, Hash([3u8; 32]), 3);

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&PID, 1, &ALL).is_none());
        assert!(cache.get(&PID, 3, &ALL).is_some());
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let cache = FoundPaymentCache::with_capacity(0);
        cache.insert(PID, 1, Hash::default(), 0);
        assert_eq!(cache.len(), 1);
    }
}
