//! Refresh service event system.

use tokio::sync::broadcast;

/// Events emitted by the refresh service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    /// Service has started.
    Started,

    /// Cached height refreshed.
    HeightUpdated {
        /// New cached height (tip minus one).
        height: u64,
    },

    /// Mempool snapshot replaced.
    MempoolRefreshed {
        /// Transactions in the new snapshot.
        count: usize,
    },

    /// Mempool refresh failed; the previous snapshot is still served.
    MempoolRefreshFailed,

    /// Finished searches removed from the registry.
    SearchesReaped {
        /// Number removed.
        count: usize,
    },

    /// Service is shutting down.
    ShuttingDown,
}

/// Channel for receiving status events.
pub type StatusEventsChannel = broadcast::Receiver<StatusEvent>;

/// Sender for status events.
pub type StatusEventsSender = broadcast::Sender<StatusEvent>;

/// Create a new event channel pair.
#[must_use]
pub fn create_event_channel() -> (StatusEventsSender, StatusEventsChannel) {
    broadcast::channel(256)
}
