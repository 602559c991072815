//! Account search lifecycle scenarios.

use super::StatusHarness;
use bcstatus::mock::{account, tx_to};
use bcstatus::StatusConfig;

#[tokio::test]
async fn test_ping_start_restart_exists() {
    let h = StatusHarness::with_blocks(3);

    assert!(!h.status.ping_search("X"));
    assert!(h.status.start_search(account("X", 0)));
    assert!(h.status.start_search(account("X", 0)));
    assert!(h.status.search_exists("X"));
    assert!(h.status.ping_search("X"));
    assert_eq!(h.status.registry().len(), 1);

    h.status.shutdown_searches();
}

#[tokio::test]
async fn test_search_collects_outputs_as_chain_grows() {
    let h = StatusHarness::with_blocks(2);
    h.node.add_block(vec![tx_to("alice", 5, None), tx_to("bob", 7, None)]);

    assert!(h.status.start_search(account("alice", 0)));
    h.wait_for("first scan", |s| s.searched_height("alice") == Some(2)).await;
    assert_eq!(h.status.known_outputs("alice").map(|o| o.len()), Some(1));

    h.node.add_block(vec![tx_to("alice", 9, None)]);
    h.wait_for("new block", |s| s.searched_height("alice") == Some(3)).await;
    assert_eq!(h.status.known_outputs("alice").map(|o| o.len()), Some(2));
    assert_eq!(h.status.search_is_responsive("alice"), Some(true));

    h.status.shutdown_searches();
}

#[tokio::test]
async fn test_accounts_scan_independently() {
    let h = StatusHarness::with_blocks(1);
    h.node.add_block(vec![tx_to("alice", 1, None)]);
    h.node.add_block(vec![tx_to("bob", 1, None), tx_to("bob", 2, None)]);

    assert!(h.status.start_search(account("alice", 0)));
    assert!(h.status.start_search(account("bob", 1)));
    h.wait_for("alice", |s| s.searched_height("alice") == Some(2)).await;
    h.wait_for("bob", |s| s.searched_height("bob") == Some(2)).await;

    assert_eq!(h.status.known_outputs("alice").map(|o| o.len()), Some(1));
    assert_eq!(h.status.known_outputs("bob").map(|o| o.len()), Some(2));

    h.status.shutdown_searches();
}

#[tokio::test]
async fn test_stopped_search_readable_until_cleanup() {
    let h = StatusHarness::with_blocks(1);
    h.node.add_block(vec![tx_to("alice", 1, None)]);
    assert!(h.status.start_search(account("alice", 0)));
    h.wait_for("scan", |s| s.searched_height("alice") == Some(1)).await;

    assert!(h.status.stop_search("alice"));
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(h.status.searched_height("alice"), Some(1));
    assert_eq!(h.status.known_outputs("alice").map(|o| o.len()), Some(1));

    let (address, _) = h.status.account_view_key("alice").expect("still registered");
    assert_eq!(address, "alice");

    h.wait_for("reap", |s| {
        s.cleanup_searches();
        !s.search_exists("alice")
    })
    .await;
    assert_eq!(h.status.searched_height("alice"), None);
    assert_eq!(h.status.known_outputs("alice"), None);
    assert_eq!(h.status.account_view_key("alice"), None);
    assert!(!h.status.ping_search("alice"));
}

#[tokio::test]
async fn test_bounded_retries_end_search() {
    let mut config = StatusConfig::default();
    config.search.poll_interval_ms = 1;
    config.search.max_fetch_retries = Some(3);
    let h = StatusHarness::with_config(4, config);
    h.node.fail_next_blocks(u32::MAX);

    assert!(h.status.start_search(account("alice", 0)));
    h.wait_for("give up", |s| {
        s.cleanup_searches();
        !s.search_exists("alice")
    })
    .await;
}

#[tokio::test]
async fn test_cursor_never_decreases() {
    let h = StatusHarness::with_blocks(60);
    h.node.fail_next_blocks(4);
    assert!(h.status.start_search(account("alice", 0)));

    let mut last = 0;
    while last < 59 {
        let now = h.status.searched_height("alice").expect("registered");
        assert!(now >= last, "cursor moved back from {last} to {now}");
        last = now;
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
    }

    h.status.shutdown_searches();
}
