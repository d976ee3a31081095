//! Integration tests for durable provider registry state.
//!
//! Each test opens the registry on a `FileStore` in a temporary directory, mutates it, and
//! reopens it as a fresh process would.

use explorer_core::{
    provider::{FileStore, MoveDirection, ProviderRegistry, RegistryError},
    Network,
};
use std::sync::Arc;

const STORE_FILE: &str = "explorer_providers.json";

fn open(dir: &std::path::Path) -> ProviderRegistry {
    ProviderRegistry::open(Arc::new(FileStore::new(dir)), Network::Testnet).unwrap()
}

#[test]
fn test_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();

    let custom = {
        let registry = open(dir.path());
        assert!(dir.path().join(STORE_FILE).exists());

        let custom = registry
            .add_custom_provider("My node", "https://my-node.example.com", Network::Mainnet)
            .unwrap();
        registry.set_selected_network(Network::Mainnet).unwrap();
        assert!(!registry.toggle_provider("near-mainnet").unwrap());
        assert!(registry.move_provider(&custom.id, MoveDirection::Up).unwrap());
        custom
    };

    let registry = open(dir.path());
    assert_eq!(registry.selected_network(), Network::Mainnet);

    let mainnet = registry.get_all_providers(Network::Mainnet);
    let ids: Vec<&str> = mainnet.iter().map(|p| p.id.as_str()).collect();
    let custom_at = ids.iter().position(|id| *id == custom.id).unwrap();
    assert_eq!(custom_at, mainnet.len() - 2);
    assert!(mainnet.iter().all(|p| p.network == Network::Mainnet));
    let priorities: Vec<u32> = mainnet.iter().map(|p| p.priority).collect();
    assert_eq!(priorities, (1..=mainnet.len() as u32).collect::<Vec<_>>());

    let enabled: Vec<String> =
        registry.get_enabled_providers(Network::Mainnet).into_iter().map(|p| p.id).collect();
    assert!(!enabled.contains(&"near-mainnet".to_string()));
    assert!(enabled.contains(&custom.id));
}

#[test]
fn test_corrupt_store_is_reseeded() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(STORE_FILE), "{ definitely not json").unwrap();

    let registry = open(dir.path());
    assert_eq!(registry.selected_network(), Network::Testnet);
    assert_eq!(registry.get_enabled_providers(Network::Testnet)[0].id, "near-testnet");

    let rewritten = std::fs::read_to_string(dir.path().join(STORE_FILE)).unwrap();
    let blob: serde_json::Value = serde_json::from_str(&rewritten).unwrap();
    assert!(blob.get("version").is_some());
}

#[test]
fn test_old_schema_is_reseeded() {
    let dir = tempfile::tempdir().unwrap();
    let stale = serde_json::json!({
        "version": 1,
        "selected_network": "mainnet",
        "providers": [],
        "custom_providers": [],
        "enabled_ids": []
    });
    std::fs::write(dir.path().join(STORE_FILE), stale.to_string()).unwrap();

    let registry = open(dir.path());
    assert_eq!(registry.selected_network(), Network::Testnet);
    assert!(!registry.get_all_providers(Network::Mainnet).is_empty());
}

#[test]
fn test_reset_drops_custom_providers_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    {
        let registry = open(dir.path());
        registry
            .add_custom_provider("Local", "http://localhost:3030", Network::Localnet)
            .unwrap();
        registry.reset_to_defaults().unwrap();
    }

    let registry = open(dir.path());
    assert!(registry.get_all_providers(Network::Localnet).iter().all(|p| !p.is_custom));
}

#[test]
fn test_duplicate_url_is_rejected_per_network() {
    let dir = tempfile::tempdir().unwrap();
    let registry = open(dir.path());

    let err = registry
        .add_custom_provider("Dup", "https://rpc.testnet.near.org", Network::Testnet)
        .unwrap_err();
    assert!(matches!(err, RegistryError::Validation(_)));

    // The same URL under another network is a different provider.
    registry
        .add_custom_provider("Elsewhere", "https://rpc.testnet.near.org", Network::Custom)
        .unwrap();
}
