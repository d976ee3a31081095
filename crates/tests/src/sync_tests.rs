//! Integration tests for windowed sync and range scans over real HTTP.

use crate::mock_infrastructure::{fast_settings, http_explorer, RpcMockBuilder};
use explorer_core::{
    cache::{ScanStop, SyncOutcome},
    BlockId, BlockRange, Network,
};

#[tokio::test]
async fn test_first_sync_covers_the_window_then_advances() {
    let mut node = RpcMockBuilder::new().await;
    node.mock_status(1_000).mock_chain_segment(991, 1_000, 2);

    let (explorer, _) = http_explorer(&[node.url().as_str()], fast_settings());

    let outcome = explorer.sync_recent().await.unwrap();
    let SyncOutcome::Synced { report, cursor } = outcome else {
        panic!("expected a synced outcome, got {outcome:?}");
    };
    assert_eq!(report.range, BlockRange::new(991, 1_000));
    assert_eq!(report.scanned, 10);
    assert_eq!(report.transactions.len(), 20);
    assert!(report.is_complete());
    assert_eq!(cursor, Some(1_000));
    assert!(node.verify_all_called());

    let newest: Vec<u64> =
        explorer.recent_transactions(3).iter().map(|tx| tx.block_height).collect();
    assert_eq!(newest, vec![1_000, 1_000, 999]);

    // Only the new heights are fetched on the next pass.
    node.mock_status(1_002).mock_chain_segment(1_001, 1_002, 1);
    let outcome = explorer.sync_recent().await.unwrap();
    let SyncOutcome::Synced { report, cursor } = outcome else {
        panic!("expected a synced outcome, got {outcome:?}");
    };
    assert_eq!(report.range, BlockRange::new(1_001, 1_002));
    assert_eq!(report.transactions.len(), 2);
    assert_eq!(cursor, Some(1_002));
    assert_eq!(explorer.recent_transactions(usize::MAX).len(), 22);

    assert!(matches!(
        explorer.sync_recent().await.unwrap(),
        SyncOutcome::UpToDate { cursor: Some(1_002) }
    ));
}

#[tokio::test]
async fn test_failed_height_holds_the_cursor() {
    let mut node = RpcMockBuilder::new().await;
    node.mock_status(100)
        .mock_chain_segment(91, 94, 1)
        .mock_block_failure(95, 502)
        .mock_chain_segment(96, 100, 1);

    let (explorer, _) = http_explorer(&[node.url().as_str()], fast_settings());

    let SyncOutcome::Synced { report, cursor } = explorer.sync_recent().await.unwrap() else {
        panic!("expected a synced outcome");
    };
    assert_eq!(report.failed_heights, vec![95]);
    assert_eq!(report.stop, ScanStop::Completed);
    assert!(!report.is_complete());
    assert_eq!(report.transactions.len(), 9);
    assert_eq!(cursor, Some(94));
}

#[tokio::test]
async fn test_range_scan_is_independent_of_the_cursor() {
    let mut node = RpcMockBuilder::new().await;
    node.mock_chain_segment(50, 52, 3);

    let (explorer, _) = http_explorer(&[node.url().as_str()], fast_settings());

    let report = explorer.get_transactions_in_range(BlockRange::new(50, 52)).await.unwrap();
    assert!(report.is_complete());
    assert_eq!(report.transactions.len(), 9);
    let heights: Vec<u64> = report.transactions.iter().map(|tx| tx.block_height).collect();
    assert!(heights.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(explorer.sync().cursor().last_processed_height(), None);

    // Blocks fetched by the scan are served from cache afterwards.
    let block = explorer.get_block(&BlockId::Height(51)).await.unwrap();
    assert_eq!(block.hash, "block-51");
    let (blocks, transactions) = explorer.cache_stats();
    assert_eq!(blocks.entries, 3);
    assert_eq!(transactions.entries, 9);
}

#[tokio::test]
async fn test_skipped_heights_count_as_scanned() {
    let mut node = RpcMockBuilder::new().await;
    node.mock_chain_segment(10, 10, 1).mock_unknown_block(11).mock_chain_segment(12, 12, 1);

    let (explorer, _) = http_explorer(&[node.url().as_str()], fast_settings());

    let report = explorer.get_transactions_in_range(BlockRange::new(10, 12)).await.unwrap();
    assert!(report.is_complete());
    assert_eq!(report.scanned, 3);
    assert_eq!(report.transactions.len(), 2);
    assert!(node.verify_all_called());

    // The node answered, so a skipped height is not a provider failure.
    let (blocks, _) = explorer.cache_stats();
    assert_eq!(blocks.entries, 2);
}

#[tokio::test]
async fn test_latest_block_updates_the_tip() {
    let mut node = RpcMockBuilder::new().await;
    node.mock_final_block(777);

    let (explorer, _) = http_explorer(&[node.url().as_str()], fast_settings());

    let block = explorer.get_latest_block().await.unwrap();
    assert_eq!(block.height, 777);
    assert_eq!(explorer.chain_state().current_tip(), 777);
}

#[tokio::test]
async fn test_network_switch_clears_synced_state() {
    let mut node = RpcMockBuilder::new().await;
    node.mock_status(20).mock_chain_segment(11, 20, 1);

    let (explorer, _) = http_explorer(&[node.url().as_str()], fast_settings());
    explorer.sync_recent().await.unwrap();
    assert_eq!(explorer.recent_transactions(usize::MAX).len(), 10);

    assert!(explorer.set_network(Network::Mainnet).unwrap());
    assert!(explorer.recent_transactions(usize::MAX).is_empty());
    assert_eq!(explorer.sync().cursor().last_processed_height(), None);
    assert_eq!(explorer.chain_state().current_tip(), 0);

    // Custom providers stay registered under their own network.
    assert_eq!(explorer.providers(Network::Custom).len(), 1);
    assert!(explorer.enabled_providers().iter().all(|p| p.network == Network::Mainnet));
}
