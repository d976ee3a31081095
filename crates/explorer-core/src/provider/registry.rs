//! Network-partitioned provider registry.
//!
//! Holds every known endpoint (built-in and user-added), the selected network, and a
//! generation counter bumped by every mutation. State is persisted as one versioned JSON
//! document in a [`KeyValueStore`]; a document with a different schema version, or one
//! that cannot be parsed, is discarded and the registry is reseeded from the built-in
//! catalog.
//!
//! Every mutation is applied to a copy of the state under a single write lock and persisted;
//! only a successful write commits the copy, which is then announced synchronously to
//! listeners through the registry's [`EventBus`].

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, sync::Arc};
use tracing::{debug, error, info, warn};

use crate::{
    events::{EventBus, Subscription},
    provider::{
        defaults::builtin_providers,
        errors::{RegistryError, StorageError},
        storage::KeyValueStore,
    },
    types::Network,
};

/// Storage key of the persisted registry document.
pub const STORAGE_KEY: &str = "explorer.providers";

/// Schema version of the persisted registry document.
pub const SCHEMA_VERSION: u32 = 3;

/// One RPC endpoint.
///
/// Only `enabled` and `priority` change after creation; changing `url` or `network`
/// requires removing and re-adding the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub id: String,
    pub name: String,
    pub url: String,
    pub network: Network,
    pub enabled: bool,
    /// Lower is tried first.
    pub priority: u32,
    pub is_custom: bool,
}

/// Direction for [`ProviderRegistry::move_provider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    Up,
    Down,
}

/// What changed in the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryChange {
    Toggled { id: String, enabled: bool },
    NetworkToggled { network: Network, enabled: bool },
    Moved { id: String, direction: MoveDirection },
    Added { id: String, network: Network },
    Removed { id: String, network: Network },
    NetworkChanged { from: Network, to: Network },
    Reset,
}

/// Change notification carrying the generation produced by the change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEvent {
    pub generation: u64,
    pub change: RegistryChange,
}

/// Consistent view of the routing-relevant registry state.
#[derive(Debug, Clone)]
pub struct RegistrySnapshot {
    pub generation: u64,
    pub network: Network,
    /// Enabled providers of `network` in priority order.
    pub providers: Vec<Provider>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedRegistry {
    version: u32,
    selected_network: Network,
    providers: Vec<Provider>,
    custom_providers: Vec<Provider>,
    enabled_ids: Vec<String>,
}

#[derive(Debug, Clone)]
struct RegistryState {
    providers: Vec<Provider>,
    selected: Network,
    generation: u64,
}

impl RegistryState {
    fn seeded(selected: Network) -> Self {
        Self { providers: builtin_providers(), selected, generation: 0 }
    }

    fn sorted_in(&self, network: Network) -> Vec<Provider> {
        let mut providers: Vec<Provider> =
            self.providers.iter().filter(|p| p.network == network).cloned().collect();
        providers.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
        providers
    }

    fn position(&self, network: Network, id: &str) -> Option<usize> {
        self.providers.iter().position(|p| p.network == network && p.id == id)
    }

    fn to_persisted(&self) -> PersistedRegistry {
        let (custom_providers, providers): (Vec<_>, Vec<_>) =
            self.providers.iter().cloned().partition(|p| p.is_custom);
        PersistedRegistry {
            version: SCHEMA_VERSION,
            selected_network: self.selected,
            providers,
            custom_providers,
            enabled_ids: self
                .providers
                .iter()
                .filter(|p| p.enabled)
                .map(|p| p.id.clone())
                .collect(),
        }
    }

    fn from_persisted(persisted: PersistedRegistry) -> Self {
        let enabled: HashSet<String> = persisted.enabled_ids.into_iter().collect();
        let builtins = persisted.providers.into_iter().map(|p| Provider { is_custom: false, ..p });
        let customs =
            persisted.custom_providers.into_iter().map(|p| Provider { is_custom: true, ..p });
        let providers = builtins
            .chain(customs)
            .map(|p| Provider { enabled: enabled.contains(&p.id), ..p })
            .collect();
        Self { providers, selected: persisted.selected_network, generation: 0 }
    }
}

/// Registry of RPC providers, partitioned by network.
pub struct ProviderRegistry {
    state: RwLock<RegistryState>,
    store: Arc<dyn KeyValueStore>,
    events: EventBus<RegistryEvent>,
}

impl ProviderRegistry {
    /// Loads the registry from `store`, seeding it when nothing usable is persisted.
    ///
    /// `default_network` is only used when seeding.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Storage`] if the store cannot be read or the seeded state
    /// cannot be written.
    pub fn open(
        store: Arc<dyn KeyValueStore>,
        default_network: Network,
    ) -> Result<Self, RegistryError> {
        let state = match store.get(STORAGE_KEY)? {
            None => {
                debug!("no persisted provider registry found, seeding defaults");
                None
            }
            Some(blob) => match serde_json::from_str::<PersistedRegistry>(&blob) {
                Ok(persisted) if persisted.version == SCHEMA_VERSION => {
                    Some(RegistryState::from_persisted(persisted))
                }
                Ok(persisted) => {
                    warn!(
                        found = persisted.version,
                        expected = SCHEMA_VERSION,
                        "provider registry schema mismatch, reseeding defaults"
                    );
                    None
                }
                Err(e) => {
                    warn!(error = %e, "persisted provider registry unreadable, reseeding defaults");
                    None
                }
            },
        };

        let registry = match state {
            Some(state) => {
                info!(
                    providers = state.providers.len(),
                    network = %state.selected,
                    "loaded provider registry"
                );
                Self::with_state(store, state)
            }
            None => {
                let registry = Self::with_state(store, RegistryState::seeded(default_network));
                registry.persist()?;
                registry
            }
        };

        Ok(registry)
    }

    fn with_state(store: Arc<dyn KeyValueStore>, state: RegistryState) -> Self {
        Self { state: RwLock::new(state), store, events: EventBus::new() }
    }

    /// Writes the current state to the store.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the store write fails.
    pub fn persist(&self) -> Result<(), StorageError> {
        let state = self.state.read();
        Self::write_state(self.store.as_ref(), &state)
    }

    fn write_state(store: &dyn KeyValueStore, state: &RegistryState) -> Result<(), StorageError> {
        let blob = serde_json::to_string(&state.to_persisted())?;
        store.set(STORAGE_KEY, &blob)
    }

    /// Applies `mutate` to a copy of the state under the write lock, persists the copy, and
    /// commits and announces it only if the write succeeded.
    ///
    /// `mutate` returns `Ok(None)` when nothing changed; no event is emitted then. A failed
    /// write leaves the in-memory state untouched and returns [`RegistryError::Storage`].
    fn mutate<T>(
        &self,
        mutate: impl FnOnce(
            &mut RegistryState,
        ) -> Result<Option<(T, RegistryChange)>, RegistryError>,
    ) -> Result<Option<T>, RegistryError> {
        let event = {
            let mut state = self.state.write();
            let mut next = state.clone();
            let Some((value, change)) = mutate(&mut next)? else {
                return Ok(None);
            };
            next.generation += 1;

            if let Err(e) = Self::write_state(self.store.as_ref(), &next) {
                error!(error = %e, change = ?change, "failed to persist provider registry");
                return Err(e.into());
            }

            *state = next;
            (value, RegistryEvent { generation: state.generation, change })
        };

        let (value, event) = event;
        debug!(generation = event.generation, change = ?event.change, "provider registry changed");
        self.events.emit(event);
        Ok(Some(value))
    }

    /// Built-in and custom providers of `network`, priority ascending.
    #[must_use]
    pub fn get_all_providers(&self, network: Network) -> Vec<Provider> {
        self.state.read().sorted_in(network)
    }

    /// Enabled providers of `network`, priority ascending. Empty when none are enabled.
    #[must_use]
    pub fn get_enabled_providers(&self, network: Network) -> Vec<Provider> {
        let mut providers = self.get_all_providers(network);
        providers.retain(|p| p.enabled);
        providers
    }

    #[must_use]
    pub fn selected_network(&self) -> Network {
        self.state.read().selected
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.state.read().generation
    }

    /// Generation, selected network, and its enabled providers, read under one lock.
    #[must_use]
    pub fn snapshot(&self) -> RegistrySnapshot {
        let state = self.state.read();
        let mut providers = state.sorted_in(state.selected);
        providers.retain(|p| p.enabled);
        RegistrySnapshot { generation: state.generation, network: state.selected, providers }
    }

    /// Finds a provider by id, preferring the selected network.
    #[must_use]
    pub fn find(&self, id: &str) -> Option<Provider> {
        let state = self.state.read();
        state
            .position(state.selected, id)
            .or_else(|| state.providers.iter().position(|p| p.id == id))
            .map(|index| state.providers[index].clone())
    }

    /// Flips `enabled` for a provider of the selected network and returns the new value.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if the selected network has no such provider.
    pub fn toggle_provider(&self, id: &str) -> Result<bool, RegistryError> {
        self.mutate(|state| {
            let index = state
                .position(state.selected, id)
                .ok_or_else(|| RegistryError::NotFound(id.into()))?;
            let provider = &mut state.providers[index];
            provider.enabled = !provider.enabled;
            let enabled = provider.enabled;
            info!(id = %id, enabled = enabled, "toggled provider");
            Ok(Some((enabled, RegistryChange::Toggled { id: id.to_string(), enabled })))
        })
        .map(|enabled| enabled.unwrap_or_default())
    }

    /// Enables every provider of the selected network. Returns how many changed.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Storage`] if the change cannot be persisted.
    pub fn enable_all_in_network(&self) -> Result<usize, RegistryError> {
        self.set_all_enabled(true)
    }

    /// Disables every provider of the selected network. Returns how many changed.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Storage`] if the change cannot be persisted.
    pub fn disable_all_in_network(&self) -> Result<usize, RegistryError> {
        self.set_all_enabled(false)
    }

    fn set_all_enabled(&self, enabled: bool) -> Result<usize, RegistryError> {
        self.mutate(|state| {
            let network = state.selected;
            let mut changed = 0;
            for provider in state.providers.iter_mut().filter(|p| p.network == network) {
                if provider.enabled != enabled {
                    provider.enabled = enabled;
                    changed += 1;
                }
            }
            if changed == 0 {
                return Ok(None);
            }
            info!(network = %network, enabled = enabled, changed = changed, "updated providers");
            Ok(Some((changed, RegistryChange::NetworkToggled { network, enabled })))
        })
        .map(Option::unwrap_or_default)
    }

    /// Swaps a provider of the selected network with its neighbour in priority order.
    ///
    /// Returns `false` when the provider is already first (`Up`) or last (`Down`).
    /// Priorities of the network are renumbered `1..=n` as a side effect.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if the selected network has no such provider.
    pub fn move_provider(&self, id: &str, direction: MoveDirection) -> Result<bool, RegistryError> {
        self.mutate(|state| {
            let network = state.selected;
            let ordered: Vec<String> = state.sorted_in(network).into_iter().map(|p| p.id).collect();
            let from = ordered
                .iter()
                .position(|p| p == id)
                .ok_or_else(|| RegistryError::NotFound(id.into()))?;
            let to = match direction {
                MoveDirection::Up if from > 0 => from - 1,
                MoveDirection::Down if from + 1 < ordered.len() => from + 1,
                _ => return Ok(None),
            };

            let mut ordered = ordered;
            ordered.swap(from, to);
            for provider in state.providers.iter_mut().filter(|p| p.network == network) {
                if let Some(rank) = ordered.iter().position(|p| *p == provider.id) {
                    provider.priority = u32::try_from(rank + 1).unwrap_or(u32::MAX);
                }
            }
            info!(id = %id, direction = ?direction, "moved provider");
            Ok(Some((true, RegistryChange::Moved { id: id.to_string(), direction })))
        })
        .map(Option::unwrap_or_default)
    }

    /// Adds a user-defined provider after every existing provider of `network`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Validation`] before any state change when the name is empty,
    /// the URL does not start with `http://` or `https://`, the URL does not parse, or the
    /// network already has a provider with that URL.
    pub fn add_custom_provider(
        &self,
        name: &str,
        url: &str,
        network: Network,
    ) -> Result<Provider, RegistryError> {
        let name = name.trim();
        let url = url.trim();
        validate_custom_provider(name, url)?;

        self.mutate(|state| {
            if state.providers.iter().any(|p| p.network == network && p.url == url) {
                return Err(RegistryError::Validation(format!(
                    "a {network} provider with URL '{url}' already exists"
                )));
            }

            let priority = state
                .providers
                .iter()
                .filter(|p| p.network == network)
                .map(|p| p.priority)
                .max()
                .map_or(1, |max| max.saturating_add(1));

            let provider = Provider {
                id: format!("custom-{}", uuid::Uuid::new_v4().simple()),
                name: name.to_string(),
                url: url.to_string(),
                network,
                enabled: true,
                priority,
                is_custom: true,
            };
            state.providers.push(provider.clone());

            info!(id = %provider.id, network = %network, url = %url, "added custom provider");
            let change = RegistryChange::Added { id: provider.id.clone(), network };
            Ok(Some((provider, change)))
        })?
        .ok_or_else(|| RegistryError::Validation("provider was not added".to_string()))
    }

    /// Removes a user-defined provider.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for unknown ids and [`RegistryError::Validation`]
    /// for built-in providers, which can only be disabled.
    pub fn remove_custom_provider(&self, id: &str) -> Result<Provider, RegistryError> {
        self.mutate(|state| {
            let index = state
                .position(state.selected, id)
                .or_else(|| state.providers.iter().position(|p| p.id == id))
                .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
            if !state.providers[index].is_custom {
                return Err(RegistryError::Validation(format!(
                    "'{id}' is a built-in provider and can only be disabled"
                )));
            }
            let removed = state.providers.remove(index);
            info!(id = %id, network = %removed.network, "removed custom provider");
            let change =
                RegistryChange::Removed { id: removed.id.clone(), network: removed.network };
            Ok(Some((removed, change)))
        })?
        .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// Switches the active network. Returns `false` when it was already selected.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Storage`] if the change cannot be persisted.
    pub fn set_selected_network(&self, network: Network) -> Result<bool, RegistryError> {
        self.mutate(|state| {
            let from = state.selected;
            if from == network {
                return Ok(None);
            }
            state.selected = network;
            info!(from = %from, to = %network, "selected network changed");
            Ok(Some((true, RegistryChange::NetworkChanged { from, to: network })))
        })
        .map(Option::unwrap_or_default)
    }

    /// Discards custom providers and priority changes, keeping the selected network.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Storage`] if the change cannot be persisted.
    pub fn reset_to_defaults(&self) -> Result<(), RegistryError> {
        self.mutate(|state| {
            state.providers = builtin_providers();
            info!("provider registry reset to defaults");
            Ok(Some(((), RegistryChange::Reset)))
        })
        .map(|_| ())
    }

    /// Registers a synchronous change listener.
    #[must_use = "dropping the subscription detaches the listener immediately"]
    pub fn on_change<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&RegistryEvent) + Send + Sync + 'static,
    {
        self.events.listen(listener)
    }

    /// Broadcast receiver of registry changes.
    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }
}

fn validate_custom_provider(name: &str, url: &str) -> Result<(), RegistryError> {
    if name.is_empty() {
        return Err(RegistryError::Validation("provider name must not be empty".to_string()));
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(RegistryError::Validation(format!(
            "provider URL '{url}' must start with http:// or https://"
        )));
    }
    url::Url::parse(url)
        .map_err(|e| RegistryError::Validation(format!("provider URL '{url}' is invalid: {e}")))?;
    Ok(())
}
