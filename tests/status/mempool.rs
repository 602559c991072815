//! Mempool refresh scenarios.

use super::StatusHarness;
use bcstatus::mock::tx_paying;
use bcstatus::node::NodeError;

#[tokio::test]
async fn test_three_good_blobs_replace_snapshot() {
    let h = StatusHarness::with_blocks(4);
    for amount in [10, 20, 30] {
        h.node.push_mempool_tx(&tx_paying(amount, None));
    }

    assert!(h.refresh().await);
    assert_eq!(h.status.mempool_txs().len(), 3);
    assert_eq!(h.status.current_height(), 3);
}

#[tokio::test]
async fn test_corrupt_blob_rejects_first_refresh() {
    let h = StatusHarness::with_blocks(4);
    h.node.push_mempool_tx(&tx_paying(10, None));
    h.node.push_mempool_blob(vec![0x95, 0x02, 0x00]);
    h.node.push_mempool_tx(&tx_paying(30, None));

    assert!(!h.refresh().await);
    assert!(h.status.mempool_txs().is_empty());
}

#[tokio::test]
async fn test_corrupt_blob_keeps_previous_snapshot() {
    let h = StatusHarness::with_blocks(4);
    let first = h.node.push_mempool_tx(&tx_paying(10, None));
    assert!(h.refresh().await);

    h.node.push_mempool_blob(b"truncated".to_vec());
    assert!(!h.refresh().await);

    let snapshot = h.status.mempool_txs();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].0, first);
}

#[tokio::test]
async fn test_node_outage_keeps_height_and_snapshot() {
    let h = StatusHarness::with_blocks(12);
    h.node.push_mempool_tx(&tx_paying(10, None));
    assert!(h.refresh().await);

    h.node.fail_height(Some(NodeError::Transport("connection refused".into())));
    h.node.fail_mempool(Some(NodeError::Transport("connection refused".into())));
    h.node.add_block(Vec::new());

    assert!(!h.refresh().await);
    assert_eq!(h.status.current_height(), 11);
    assert_eq!(h.status.mempool_txs().len(), 1);
}
