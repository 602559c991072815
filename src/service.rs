//! Background refresh loop around a [`StatusFacade`].
//!
//! The facade never refreshes itself. This service ticks on a fixed
//! interval, refreshing the cached height and mempool and reaping finished
//! searches, until shutdown is requested or Ctrl-C is received.

use crate::error::Result;
use crate::event::{create_event_channel, StatusEvent, StatusEventsChannel, StatusEventsSender};
use crate::status::StatusFacade;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Builder for the refresh service.
pub struct StatusServiceBuilder {
    facade: Arc<StatusFacade>,
    refresh_interval: Duration,
}

impl StatusServiceBuilder {
    /// Refresh `facade` every `refresh_interval`.
    #[must_use]
    pub fn new(facade: Arc<StatusFacade>, refresh_interval: Duration) -> Self {
        Self {
            facade,
            refresh_interval,
        }
    }

    /// Build the service. Nothing runs until [`RunningService::run`].
    #[must_use]
    pub fn build(self) -> RunningService {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (events_tx, events_rx) = create_event_channel();

        RunningService {
            facade: self.facade,
            refresh_interval: self.refresh_interval,
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
            events_tx,
            events_rx: Some(events_rx),
        }
    }
}

/// Cloneable handle that stops a [`RunningService`].
#[derive(Clone)]
pub struct ShutdownHandle(Arc<watch::Sender<bool>>);

impl ShutdownHandle {
    /// Request shutdown.
    pub fn shutdown(&self) {
        self.0.send_replace(true);
    }
}

/// The refresh service.
pub struct RunningService {
    facade: Arc<StatusFacade>,
    refresh_interval: Duration,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
    events_tx: StatusEventsSender,
    events_rx: Option<StatusEventsChannel>,
}

impl RunningService {
    /// The facade being refreshed.
    #[must_use]
    pub fn facade(&self) -> &Arc<StatusFacade> {
        &self.facade
    }

    /// Get a receiver for status events.
    ///
    /// Note: Can only be called once. Subsequent calls return None.
    pub fn events(&mut self) -> Option<StatusEventsChannel> {
        self.events_rx.take()
    }

    /// Subscribe to status events.
    #[must_use]
    pub fn subscribe_events(&self) -> StatusEventsChannel {
        self.events_tx.subscribe()
    }

    /// Handle for stopping the service from another task.
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(Arc::clone(&self.shutdown_tx))
    }

    /// Request the service to shut down.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// One refresh pass: height, mempool, then reaping.
    pub async fn refresh_once(&self) {
        let height = self.facade.update_current_height().await;
        let _ = self.events_tx.send(StatusEvent::HeightUpdated { height });

        if self.facade.refresh_mempool().await {
            let count = self.facade.mempool_txs().len();
            debug!("Mempool holds {count} transactions");
            let _ = self.events_tx.send(StatusEvent::MempoolRefreshed { count });
        } else {
            let _ = self.events_tx.send(StatusEvent::MempoolRefreshFailed);
        }

        let reaped = self.facade.cleanup_searches();
        if reaped > 0 {
            info!("Reaped {reaped} finished searches");
            let _ = self.events_tx.send(StatusEvent::SearchesReaped { count: reaped });
        }
    }

    /// Run until shutdown is requested.
    ///
    /// Every registered search is stopped on the way out.
    ///
    /// # Errors
    ///
    /// Currently infallible; the signature leaves room for fatal failures.
    pub async fn run(&mut self) -> Result<()> {
        info!(
            "Starting refresh loop every {:?} on {}",
            self.refresh_interval,
            self.facade.network()
        );
        let _ = self.events_tx.send(StatusEvent::Started);

        let mut ticker = tokio::time::interval(self.refresh_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        info!("Shutdown signal received");
                        break;
                    }
                }
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        warn!("Failed to listen for Ctrl-C: {e}");
                    }
                    info!("Ctrl-C received, initiating shutdown");
                    self.shutdown();
                    break;
                }
                _ = ticker.tick() => self.refresh_once().await,
            }
        }

        let _ = self.events_tx.send(StatusEvent::ShuttingDown);
        self.facade.shutdown_searches();
        info!("Refresh loop stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StatusConfig;
    use crate::mock::{account, tx_paying, MockNode, MockScanner};
    use crate::node::NodeInterface;
    use crate::status::StatusFacadeBuilder;

    fn service(node: &Arc<MockNode>) -> RunningService {
        let facade = StatusFacadeBuilder::new(StatusConfig::default(), Arc::clone(node) as Arc<dyn NodeInterface>)
            .with_scanner(Arc::new(MockScanner))
            .build()
            .expect("build facade");
        StatusServiceBuilder::new(Arc::new(facade), Duration::from_millis(10)).build()
    }

    #[tokio::test]
    async fn test_refresh_once_updates_cache() {
        let node = Arc::new(MockNode::with_blocks(8));
        node.push_mempool_tx(&tx_paying(1, None));
        let mut service = service(&node);
        let mut events = service.events().expect("first events call");
        assert!(service.events().is_none());

        service.refresh_once().await;

        assert_eq!(service.facade().current_height(), 7);
        assert_eq!(service.facade().mempool_txs().len(), 1);
        assert_eq!(events.recv().await.expect("event"), StatusEvent::HeightUpdated { height: 7 });
        assert_eq!(events.recv().await.expect("event"), StatusEvent::MempoolRefreshed { count: 1 });
    }

    #[tokio::test]
    async fn test_failed_mempool_refresh_reported() {
        let node = Arc::new(MockNode::with_blocks(2));
        node.push_mempool_blob(vec![0xff]);
        let service = service(&node);
        let mut events = service.subscribe_events();

        service.refresh_once().await;

        assert_eq!(events.recv().await.expect("event"), StatusEvent::HeightUpdated { height: 1 });
        assert_eq!(events.recv().await.expect("event"), StatusEvent::MempoolRefreshFailed);
    }

    #[tokio::test]
    async fn test_run_until_shutdown_stops_searches() {
        let node = Arc::new(MockNode::with_blocks(3));
        let mut service = service(&node);
        let mut events = service.subscribe_events();
        let handle = service.shutdown_handle();
        let facade = Arc::clone(service.facade());
        assert!(facade.start_search(account("alice", 0)));

        let task = tokio::spawn(async move { service.run().await });
        assert_eq!(events.recv().await.expect("event"), StatusEvent::Started);
        assert!(matches!(events.recv().await.expect("event"), StatusEvent::HeightUpdated { .. }));

        handle.shutdown();
        task.await.expect("service task").expect("service result");

        tokio::time::timeout(Duration::from_secs(5), async {
            while facade.registry().cleanup() == 0 {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("search stopped");
        assert!(!facade.search_exists("alice"));
    }
}
