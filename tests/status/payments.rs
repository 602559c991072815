//! Import payment scenarios.

use super::harness::random_payment_id;
use super::StatusHarness;
use bcstatus::mock::{tx_hash, tx_paying, tx_to};
use tokio_test::assert_ok;

#[tokio::test]
async fn test_mempool_payment_of_100() {
    let h = StatusHarness::with_blocks(6);
    let pid = random_payment_id();
    let hash = h.node.push_mempool_tx(&tx_paying(100, Some(pid)));
    assert!(h.refresh().await);

    assert_eq!(h.status.search_if_payment_made(&pid, 100).await, Some(hash));
    assert_eq!(h.status.search_if_payment_made(&pid, 200).await, None);
}

#[tokio::test]
async fn test_exact_short_and_over_payments() {
    for (paid, matches) in [(1_000, true), (999, false), (1_001, true)] {
        let h = StatusHarness::with_blocks(3);
        let pid = random_payment_id();
        h.node.add_block(vec![tx_paying(paid, Some(pid))]);
        h.refresh().await;

        assert_eq!(
            h.status.search_if_payment_made(&pid, 1_000).await.is_some(),
            matches,
            "paid {paid}"
        );
    }
}

#[tokio::test]
async fn test_mempool_searched_before_blocks() {
    let h = StatusHarness::with_blocks(2);
    let pid = random_payment_id();
    h.node.add_block(vec![tx_paying(500, Some(pid))]);
    let pending = h.node.push_mempool_tx(&tx_paying(500, Some(pid)));
    h.refresh().await;

    assert_eq!(h.status.search_if_payment_made(&pid, 500).await, Some(pending));
}

#[tokio::test]
async fn test_confirmed_payment_survives_mempool_drop() {
    let h = StatusHarness::with_blocks(2);
    let pid = random_payment_id();
    let tx = tx_paying(300, Some(pid));
    h.node.push_mempool_tx(&tx);
    h.refresh().await;
    assert!(h.status.search_if_payment_made(&pid, 300).await.is_some());

    h.node.clear_mempool();
    h.node.add_block(vec![tx.clone()]);
    h.refresh().await;

    assert_eq!(h.status.search_if_payment_made(&pid, 300).await, Some(tx_hash(&tx)));
}

#[tokio::test]
async fn test_duplicate_ids_resolve_to_first_sufficient() {
    let h = StatusHarness::with_blocks(1);
    let pid = random_payment_id();
    h.node.add_block(vec![tx_paying(10, Some(pid))]);
    let sufficient = tx_paying(100, Some(pid));
    h.node.add_block(vec![tx_to("elsewhere", 100, Some(pid)), sufficient.clone()]);
    h.refresh().await;

    assert_eq!(
        h.status.search_if_payment_made(&pid, 100).await,
        Some(tx_hash(&sufficient))
    );
}

#[tokio::test]
async fn test_integrated_address_and_commit() {
    let h = StatusHarness::with_blocks(1);
    let pid = random_payment_id();

    let address = h.status.integrated_address(&pid).expect("encoder configured");
    assert!(address.ends_with(&pid.to_hex()));

    assert_ok!(h.status.commit_tx(b"signed-tx").await);
    assert_eq!(h.node.submitted().len(), 1);
}
