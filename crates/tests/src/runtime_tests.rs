//! Integration tests for the runtime assembled from a configuration file.
//!
//! The runtime is built the way the CLI builds it: `AppConfig::from_file`, the default
//! `FileStore`, and the reqwest transport (here forwarded through a mock proxy).

use crate::mock_infrastructure::RpcMockBuilder;
use explorer_core::{
    config::AppConfig,
    runtime::{ExplorerRuntime, RuntimeError},
    Network,
};
use serial_test::serial;
use std::time::Duration;
use tokio::time::{sleep, timeout};

fn write_config(dir: &std::path::Path, proxy_url: &str) -> std::path::PathBuf {
    let storage = dir.join("state");
    let path = dir.join("explorer.toml");
    let contents = format!(
        r#"
[registry]
storage_dir = "{}"
default_network = "mainnet"

[transport]
proxy_url = "{proxy_url}"

[failover]
max_attempts = 2
initial_backoff_ms = 1

[health]
enabled = false

[sync]
window = 5
batch_delay_ms = 0
poll_interval_ms = 50
"#,
        storage.display()
    );
    std::fs::write(&path, contents).unwrap();
    path
}

#[tokio::test]
#[serial]
async fn test_sync_poller_follows_the_chain() {
    let mut proxy = RpcMockBuilder::new().await;
    proxy.mock_status(30).mock_chain_segment(26, 30, 1);

    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig::from_file(write_config(dir.path(), proxy.url().as_str())).unwrap();
    assert_eq!(config.sync.window, 5);

    let runtime = ExplorerRuntime::builder().with_config(config).build().unwrap();
    assert!(!runtime.has_health_checker());
    assert!(runtime.has_sync_poller());

    let explorer = runtime.explorer().clone();
    assert_eq!(explorer.network(), Network::Mainnet);

    timeout(Duration::from_secs(10), async {
        while explorer.sync().cursor().last_processed_height() != Some(30) {
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("poller did not reach the tip");

    assert_eq!(explorer.chain_state().current_tip(), 30);
    assert_eq!(explorer.recent_transactions(usize::MAX).len(), 5);

    // The chain moves; the poller picks up only the new heights.
    proxy.mock_status(32).mock_chain_segment(31, 32, 1);
    timeout(Duration::from_secs(10), async {
        while explorer.sync().cursor().last_processed_height() != Some(32) {
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("poller did not follow the tip");
    assert_eq!(explorer.recent_transactions(usize::MAX).len(), 7);

    let token = runtime.shutdown_token();
    runtime.shutdown().await;
    assert!(token.is_cancelled());
    assert!(dir.path().join("state").join("explorer_providers.json").exists());
}

#[tokio::test]
#[serial]
async fn test_invalid_file_is_rejected_by_the_builder() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("explorer.toml");
    std::fs::write(&path, "[sync]\nwindow = 0\n").unwrap();

    let config = AppConfig::from_file(&path).unwrap();
    let result = ExplorerRuntime::builder().with_config(config).build();
    assert!(matches!(result, Err(RuntimeError::ConfigValidation(_))));
}

#[tokio::test]
#[serial]
async fn test_provider_changes_persist_across_runtimes() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(dir.path(), "http://127.0.0.1:9");

    let build = || {
        let config = AppConfig::from_file(&config_path).unwrap();
        ExplorerRuntime::builder()
            .with_config(config)
            .disable_health_checker()
            .disable_sync_poller()
            .build()
            .unwrap()
    };

    let runtime = build();
    let custom = runtime
        .explorer()
        .add_custom_provider("Archive", "https://archive.example.com", Network::Mainnet)
        .unwrap();
    runtime.explorer().set_network(Network::Testnet).unwrap();
    runtime.shutdown().await;

    let runtime = build();
    let explorer = runtime.explorer();
    assert_eq!(explorer.network(), Network::Testnet);
    assert!(explorer.providers(Network::Mainnet).iter().any(|p| p.id == custom.id));
    runtime.shutdown().await;
}
