//! Built-in provider catalog.

use crate::{provider::registry::Provider, types::Network};

/// `(id, name, url)` per network, in default priority order.
const CATALOG: &[(Network, &[(&str, &str, &str)])] = &[
    (
        Network::Mainnet,
        &[
            ("near-mainnet", "NEAR (official)", "https://rpc.mainnet.near.org"),
            ("fastnear-mainnet", "FastNEAR", "https://free.rpc.fastnear.com"),
            ("lava-mainnet", "Lava", "https://near.lava.build"),
            ("drpc-mainnet", "dRPC", "https://near.drpc.org"),
        ],
    ),
    (
        Network::Testnet,
        &[
            ("near-testnet", "NEAR (official)", "https://rpc.testnet.near.org"),
            ("fastnear-testnet", "FastNEAR", "https://test.rpc.fastnear.com"),
            ("lava-testnet", "Lava", "https://neart.lava.build"),
        ],
    ),
    (Network::Localnet, &[("localnet", "Local node", "http://127.0.0.1:3030")]),
];

/// Fresh copies of every built-in provider, enabled, with priorities starting at 1.
#[must_use]
pub fn builtin_providers() -> Vec<Provider> {
    CATALOG
        .iter()
        .flat_map(|(network, entries)| {
            entries.iter().zip(1u32..).map(move |((id, name, url), priority)| Provider {
                id: (*id).to_string(),
                name: (*name).to_string(),
                url: (*url).to_string(),
                network: *network,
                enabled: true,
                priority,
                is_custom: false,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_builtin_ids_unique() {
        let providers = builtin_providers();
        let ids: HashSet<_> = providers.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids.len(), providers.len());
    }

    #[test]
    fn test_builtins_are_enabled_and_not_custom() {
        for provider in builtin_providers() {
            assert!(provider.enabled);
            assert!(!provider.is_custom);
            assert!(provider.url.starts_with("http://") || provider.url.starts_with("https://"));
            assert_ne!(provider.network, Network::Custom);
        }
    }

    #[test]
    fn test_priorities_start_at_one_per_network() {
        let providers = builtin_providers();
        let first_testnet = providers.iter().find(|p| p.network == Network::Testnet).unwrap();
        assert_eq!(first_testnet.priority, 1);
        assert_eq!(first_testnet.id, "near-testnet");
    }
}
