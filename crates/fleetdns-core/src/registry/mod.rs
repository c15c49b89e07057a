//! Plugin-based provider registry
//!
//! The registry allows DNS providers and state stores to be registered
//! dynamically at runtime, avoiding hardcoded if-else chains.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fleetdns_core::registry::{ProviderRegistry, ProviderSet};
//!
//! // Create a registry with the bundled state stores
//! let registry = ProviderRegistry::with_builtin_stores();
//!
//! // Register providers
//! fleetdns_provider_cloudflare::register(&registry);
//!
//! // One provider per configured account
//! let providers = ProviderSet::build(&registry, &config.providers, timeout)?;
//! let provider = providers.get("cloudflare-main")?;
//! ```
//!
//! ## Registration
//!
//! Implementations should register themselves during initialization:
//!
//! ```rust,ignore
//! // In fleetdns-provider-cloudflare crate
//! pub fn register(registry: &ProviderRegistry) {
//!     registry.register_provider("cloudflare", Box::new(CloudflareFactory));
//! }
//! ```

use crate::config::{ProviderAccount, ProviderConfig, StateStoreConfig};
use crate::error::{Error, Result};
use crate::state::{FileStateStoreFactory, MemoryStateStoreFactory};
use crate::traits::{BoundedProvider, DnsProvider, StateStore};
use crate::traits::{DnsProviderFactory, StateStoreFactory};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// Provider registry for plugin-based DNS provider creation
///
/// The registry maintains a map of provider type names to factory objects,
/// allowing dynamic instantiation of providers based on configuration.
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct ProviderRegistry {
    /// Registered DNS provider factories
    providers: RwLock<HashMap<String, Box<dyn DnsProviderFactory>>>,

    /// Registered state store factories
    state_stores: RwLock<HashMap<String, Arc<dyn StateStoreFactory>>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the `memory` and `file` state stores registered
    pub fn with_builtin_stores() -> Self {
        let registry = Self::new();
        registry.register_state_store("memory", Box::new(MemoryStateStoreFactory));
        registry.register_state_store("file", Box::new(FileStateStoreFactory));
        registry
    }

    /// Register a DNS provider factory
    ///
    /// # Parameters
    ///
    /// - `name`: Provider type name (e.g., "cloudflare", "route53")
    /// - `factory`: Factory object for creating provider instances
    pub fn register_provider(&self, name: impl Into<String>, factory: Box<dyn DnsProviderFactory>) {
        let name = name.into();
        let mut providers = self.providers.write().unwrap_or_else(PoisonError::into_inner);
        providers.insert(name, factory);
    }

    /// Register a state store factory
    ///
    /// # Parameters
    ///
    /// - `name`: State store type name (e.g., "file", "memory")
    /// - `factory`: Factory object for creating state store instances
    pub fn register_state_store(
        &self,
        name: impl Into<String>,
        factory: Box<dyn StateStoreFactory>,
    ) {
        let name = name.into();
        let mut stores = self.state_stores.write().unwrap_or_else(PoisonError::into_inner);
        stores.insert(name, Arc::from(factory));
    }

    /// Create a DNS provider from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Arc<dyn DnsProvider>)`: Created provider instance
    /// - `Err(Error)`: If provider type is not registered or creation fails
    pub fn create_provider(&self, config: &ProviderConfig) -> Result<Arc<dyn DnsProvider>> {
        let provider_type = config.type_name();
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);

        let factory = providers
            .get(provider_type)
            .ok_or_else(|| Error::config(format!("Unknown provider type: {}", provider_type)))?;

        factory.create(config)
    }

    /// Create a state store from configuration
    pub async fn create_state_store(
        &self,
        config: &StateStoreConfig,
    ) -> Result<Arc<dyn StateStore>> {
        let store_type = config.type_name();

        // Release the lock before calling async create
        let factory = {
            let stores = self.state_stores.read().unwrap_or_else(PoisonError::into_inner);
            stores
                .get(store_type)
                .ok_or_else(|| {
                    Error::config(format!("Unknown state store type: {}", store_type))
                })?
                .clone()
        };

        factory.create(config).await
    }

    /// List all registered provider types
    pub fn list_providers(&self) -> Vec<String> {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        providers.keys().cloned().collect()
    }

    /// List all registered state store types
    pub fn list_state_stores(&self) -> Vec<String> {
        let stores = self.state_stores.read().unwrap_or_else(PoisonError::into_inner);
        stores.keys().cloned().collect()
    }

    /// Check if a provider type is registered
    pub fn has_provider(&self, name: &str) -> bool {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        providers.contains_key(name)
    }

    /// Check if a state store type is registered
    pub fn has_state_store(&self, name: &str) -> bool {
        let stores = self.state_stores.read().unwrap_or_else(PoisonError::into_inner);
        stores.contains_key(name)
    }
}

/// Live provider instances keyed by account name
///
/// Every provider in the set is wrapped in a [`BoundedProvider`].
#[derive(Clone, Default)]
pub struct ProviderSet {
    accounts: BTreeMap<String, Arc<dyn DnsProvider>>,
    timeout: Option<Duration>,
}

impl ProviderSet {
    /// Empty set whose providers are bounded by `timeout`
    pub fn new(timeout: Duration) -> Self {
        Self {
            accounts: BTreeMap::new(),
            timeout: Some(timeout),
        }
    }

    /// Build one provider per configured account
    pub fn build(
        registry: &ProviderRegistry,
        accounts: &[ProviderAccount],
        timeout: Duration,
    ) -> Result<Self> {
        let mut set = Self::new(timeout);
        for account in accounts {
            let provider = registry.create_provider(&account.provider)?;
            tracing::debug!(
                account = %account.name,
                provider = provider.provider_name(),
                "Provider account ready"
            );
            set.insert(account.name.clone(), provider);
        }
        Ok(set)
    }

    /// Add or replace an account
    pub fn insert(&mut self, account: impl Into<String>, provider: Arc<dyn DnsProvider>) {
        let provider: Arc<dyn DnsProvider> = match self.timeout {
            Some(timeout) => Arc::new(BoundedProvider::new(provider, timeout)),
            None => provider,
        };
        self.accounts.insert(account.into(), provider);
    }

    /// Provider serving an account
    pub fn get(&self, account: &str) -> Result<Arc<dyn DnsProvider>> {
        self.accounts
            .get(account)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("provider account '{}'", account)))
    }

    /// Configured account names
    pub fn accounts(&self) -> Vec<String> {
        self.accounts.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}
