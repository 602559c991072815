//! Facade wired to a [`MockNode`] with the mock crypto collaborators.

use bcstatus::mock::{MockEncoder, MockNode, MockScanner, IMPORT_ADDRESS};
use bcstatus::node::{NodeInterface, TransactionSubmitter};
use bcstatus::types::PaymentId;
use bcstatus::{StatusConfig, StatusFacade, StatusFacadeBuilder};
use std::sync::Arc;
use std::time::Duration;

const IMPORT_VIEW_KEY: &str = "0202020202020202020202020202020202020202020202020202020202020202";

/// A facade plus handles on the node behind it.
pub struct StatusHarness {
    /// Node double backing the facade.
    pub node: Arc<MockNode>,
    /// Facade under test.
    pub status: StatusFacade,
}

impl StatusHarness {
    /// Facade over a chain of `blocks` empty blocks, with import payments
    /// enabled and fast search polling.
    pub fn with_blocks(blocks: u64) -> Self {
        let mut config = StatusConfig {
            import_payment_address: Some(IMPORT_ADDRESS.into()),
            import_payment_viewkey: Some(IMPORT_VIEW_KEY.into()),
            ..StatusConfig::default()
        };
        config.search.poll_interval_ms = 5;
        Self::with_config(blocks, config)
    }

    /// Facade built from `config`.
    pub fn with_config(blocks: u64, config: StatusConfig) -> Self {
        let node = Arc::new(MockNode::with_blocks(blocks));
        let status = StatusFacadeBuilder::new(config, Arc::clone(&node) as Arc<dyn NodeInterface>)
            .with_submitter(Arc::clone(&node) as Arc<dyn TransactionSubmitter>)
            .with_scanner(Arc::new(MockScanner))
            .with_encoder(Arc::new(MockEncoder))
            .build()
            .expect("build facade");
        Self { node, status }
    }

    /// Refresh height and mempool the way the service does.
    pub async fn refresh(&self) -> bool {
        self.status.update_current_height().await;
        self.status.refresh_mempool().await
    }

    /// Poll `check` until it holds or five seconds pass.
    pub async fn wait_for(&self, what: &str, check: impl Fn(&StatusFacade) -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !check(&self.status) {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
    }
}

/// Random payment id.
pub fn random_payment_id() -> PaymentId {
    PaymentId(rand::random())
}
