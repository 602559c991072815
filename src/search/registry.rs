//! Account-keyed registry of running searches.

use super::Search;
use crate::types::{KnownOutputs, ViewKey};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

/// Owns every running [`Search`], at most one per account address.
///
/// The map lock covers insert, lookup and removal only. Reads of a search's
/// progress clone its handle out of the map and happen after the lock is
/// released, so a slow scan never holds up bookkeeping.
#[derive(Default)]
pub struct WorkerRegistry {
    workers: Mutex<HashMap<String, Arc<dyn Search>>>,
}

impl WorkerRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, address: &str) -> Option<Arc<dyn Search>> {
        self.workers.lock().get(address).cloned()
    }

    /// Register `search` under its account address and spawn its loop on
    /// the current tokio runtime.
    ///
    /// Returns `true` if a search for that address is already registered,
    /// in which case `search` is dropped unstarted. Returns `false` only
    /// when called outside a runtime.
    pub fn start_search(&self, search: Arc<dyn Search>) -> bool {
        let address = search.account().address.clone();

        let mut workers = self.workers.lock();
        if workers.contains_key(&address) {
            debug!("Search for {address} already registered");
            return true;
        }

        let Ok(runtime) = Handle::try_current() else {
            warn!("Cannot start search for {address}: no tokio runtime");
            return false;
        };

        let task = Arc::clone(&search);
        runtime.spawn(async move { task.run().await });
        workers.insert(address.clone(), search);
        drop(workers);

        info!("Started search for {address}");
        true
    }

    /// Forward a ping. `false` if no search is registered for `address`.
    pub fn ping(&self, address: &str) -> bool {
        let Some(search) = self.get(address) else {
            return false;
        };
        search.ping();
        true
    }

    /// Whether a search is registered for `address`, running or not.
    #[must_use]
    pub fn still_exists(&self, address: &str) -> bool {
        self.workers.lock().contains_key(address)
    }

    /// Remove every search whose loop has exited. Returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let mut workers = self.workers.lock();
        let before = workers.len();
        workers.retain(|address, search| {
            let keep = search.still_searching();
            if !keep {
                debug!("Reaping finished search for {address}");
            }
            keep
        });
        before - workers.len()
    }

    /// Highest height scanned for `address`.
    #[must_use]
    pub fn searched_height(&self, address: &str) -> Option<u64> {
        self.get(address).map(|search| search.searched_height())
    }

    /// Outputs found for `address`.
    #[must_use]
    pub fn known_outputs(&self, address: &str) -> Option<KnownOutputs> {
        self.get(address).map(|search| search.known_outputs())
    }

    /// Address and view key of the account searched under `address`.
    #[must_use]
    pub fn account_view_key(&self, address: &str) -> Option<(String, ViewKey)> {
        self.get(address).map(|search| {
            let account = search.account();
            (account.address.clone(), account.view_key)
        })
    }

    /// Whether the search for `address` answered its last ping in time.
    #[must_use]
    pub fn is_responsive(&self, address: &str) -> Option<bool> {
        self.get(address).map(|search| search.is_responsive())
    }

    /// Ask the search for `address` to exit. It stays registered until
    /// [`cleanup`](Self::cleanup).
    pub fn stop(&self, address: &str) -> bool {
        let Some(search) = self.get(address) else {
            return false;
        };
        search.stop();
        true
    }

    /// Stop every registered search.
    pub fn shutdown(&self) {
        let searches: Vec<_> = self.workers.lock().values().cloned().collect();
        info!("Stopping {} searches", searches.len());
        for search in searches {
            search.stop();
        }
    }

    /// Number of registered searches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.workers.lock().len()
    }

    /// Whether no searches are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workers.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{owned_key, ScriptedSearch};
    use std::time::Duration;

    async fn settle(check: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("condition never held");
    }

    #[tokio::test]
    async fn test_ping_and_start_on_empty_registry() {
        let registry = WorkerRegistry::new();
        assert!(!registry.ping("X"));
        assert!(!registry.still_exists("X"));

        assert!(registry.start_search(Arc::new(ScriptedSearch::new("X"))));
        assert!(registry.start_search(Arc::new(ScriptedSearch::new("X"))));
        assert!(registry.still_exists("X"));
        assert!(registry.ping("X"));
        assert_eq!(registry.len(), 1);

        registry.shutdown();
    }

    #[tokio::test]
    async fn test_second_start_leaves_first_search_in_place() {
        let registry = WorkerRegistry::new();
        let first = Arc::new(ScriptedSearch::new("X"));
        let second = Arc::new(ScriptedSearch::new("X"));

        assert!(registry.start_search(Arc::clone(&first) as Arc<dyn Search>));
        assert!(registry.start_search(Arc::clone(&second) as Arc<dyn Search>));
        registry.ping("X");

        settle(|| first.runs() == 1).await;
        assert_eq!(first.pings(), 1);
        assert_eq!(second.runs(), 0);
        assert_eq!(second.pings(), 0);

        registry.shutdown();
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let registry = WorkerRegistry::new();
        assert!(!registry.start_search(Arc::new(ScriptedSearch::new("X"))));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_reaps_only_finished() {
        let registry = WorkerRegistry::new();
        let done = Arc::new(ScriptedSearch::finished_on_run("done"));
        let busy = Arc::new(ScriptedSearch::new("busy"));
        registry.start_search(Arc::clone(&done) as Arc<dyn Search>);
        registry.start_search(Arc::clone(&busy) as Arc<dyn Search>);

        settle(|| !done.still_searching()).await;
        assert!(registry.still_exists("done"));

        assert_eq!(registry.cleanup(), 1);
        assert!(!registry.still_exists("done"));
        assert!(registry.still_exists("busy"));

        registry.shutdown();
    }

    #[tokio::test]
    async fn test_stopped_search_readable_until_cleanup() {
        let registry = WorkerRegistry::new();
        let search = Arc::new(ScriptedSearch::new("X"));
        search.set_height(42);
        search.add_output(owned_key("X", 1), 0);
        registry.start_search(Arc::clone(&search) as Arc<dyn Search>);

        assert!(registry.stop("X"));
        settle(|| !search.still_searching()).await;

        assert_eq!(registry.searched_height("X"), Some(42));
        assert_eq!(registry.known_outputs("X").map(|o| o.len()), Some(1));

        registry.cleanup();
        assert_eq!(registry.searched_height("X"), None);
        assert_eq!(registry.known_outputs("X"), None);
        assert_eq!(registry.account_view_key("X"), None);
        assert!(!registry.ping("X"));
    }

    #[tokio::test]
    async fn test_accessors_for_unknown_account() {
        let registry = WorkerRegistry::new();
        assert_eq!(registry.searched_height("nobody"), None);
        assert_eq!(registry.known_outputs("nobody"), None);
        assert_eq!(registry.account_view_key("nobody"), None);
        assert_eq!(registry.is_responsive("nobody"), None);
        assert!(!registry.stop("nobody"));
    }

    #[tokio::test]
    async fn test_account_view_key() {
        let registry = WorkerRegistry::new();
        registry.start_search(Arc::new(ScriptedSearch::new("X")));

        let (address, key) = registry.account_view_key("X").expect("registered");
        assert_eq!(address, "X");
        assert_eq!(key, ViewKey([0u8; 32]));

        registry.shutdown();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_starts_register_once() {
        let registry = Arc::new(WorkerRegistry::new());
        let searches: Vec<_> = (0..16).map(|_| Arc::new(ScriptedSearch::new("X"))).collect();

        let tasks: Vec<_> = searches
            .iter()
            .map(|search| {
                let registry = Arc::clone(&registry);
                let search = Arc::clone(search) as Arc<dyn Search>;
                tokio::spawn(async move { registry.start_search(search) })
            })
            .collect();
        for task in tasks {
            assert!(task.await.expect("start task"));
        }

        assert_eq!(registry.len(), 1);
        settle(|| searches.iter().map(|s| s.runs()).sum::<u64>() == 1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(searches.iter().map(|s| s.runs()).sum::<u64>(), 1);

        registry.shutdown();
    }
}
