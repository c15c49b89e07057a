//! Configuration types for the fleetdns control plane
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::model::{RecordSpec, RecordType};
use crate::service::PoolRequest;
use crate::traits::{Group, Machine};

/// Main control-plane configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetDnsConfig {
    /// Named DNS provider accounts
    #[serde(default)]
    pub providers: Vec<ProviderAccount>,

    /// State store configuration
    #[serde(default)]
    pub state_store: StateStoreConfig,

    /// Where machine and group data comes from
    #[serde(default)]
    pub fleet: FleetSourceConfig,

    /// Domains to register on startup
    #[serde(default)]
    pub domains: Vec<DomainConfig>,

    /// Rotation loop settings
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Reconcile worker settings
    #[serde(default)]
    pub reconcile: ReconcileConfig,
}

impl FleetDnsConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, crate::Error> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::Error::config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            crate::Error::config(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        let mut accounts = HashSet::new();
        for account in &self.providers {
            if account.name.trim().is_empty() {
                return Err(crate::Error::config("Provider account name cannot be empty"));
            }
            if !accounts.insert(account.name.as_str()) {
                return Err(crate::Error::config(format!(
                    "Provider account '{}' defined twice",
                    account.name
                )));
            }
            account.provider.validate()?;
        }

        for domain in &self.domains {
            if domain.name.trim().is_empty() {
                return Err(crate::Error::config("Domain name cannot be empty"));
            }
            if !accounts.contains(domain.provider.as_str()) {
                return Err(crate::Error::config(format!(
                    "Domain '{}' references unknown provider account '{}'",
                    domain.name, domain.provider
                )));
            }

            let mut bound = HashSet::new();
            for pool in &domain.record_pools {
                if !bound.insert((pool.record.to_ascii_lowercase(), pool.record_type)) {
                    return Err(crate::Error::config(format!(
                        "Domain '{}' declares two pools for record {} {}",
                        domain.name, pool.record, pool.record_type
                    )));
                }
                pool.pool.settings().map_err(|e| {
                    crate::Error::config(format!(
                        "Domain '{}' pool for {}: {}",
                        domain.name, pool.record, e
                    ))
                })?;
            }
            if let Some(pool) = &domain.wildcard_pool {
                pool.pool.settings().map_err(|e| {
                    crate::Error::config(format!("Domain '{}' wildcard pool: {}", domain.name, e))
                })?;
            }
        }

        self.fleet.validate()?;
        self.scheduler.validate()?;
        self.reconcile.validate()?;

        Ok(())
    }
}

/// A named provider account (one credential set)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderAccount {
    /// Account name referenced by domains
    pub name: String,

    /// Provider backend and its settings
    #[serde(flatten)]
    pub provider: ProviderConfig,
}

/// DNS provider configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Cloudflare provider
    Cloudflare {
        /// Cloudflare API token
        api_token: String,
        /// Zone ID (optional, looked up by name when absent)
        #[serde(default)]
        zone_id: Option<String>,
        /// Account ID (optional)
        #[serde(default)]
        account_id: Option<String>,
    },

    /// Custom provider
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl ProviderConfig {
    /// Validate the provider configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ProviderConfig::Cloudflare { api_token, .. } => {
                if api_token.is_empty() {
                    return Err(crate::Error::config("Cloudflare API token cannot be empty"));
                }
                Ok(())
            }
            ProviderConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config(
                        "Custom provider factory cannot be empty",
                    ));
                }
                if config.is_null() {
                    return Err(crate::Error::config(
                        "Custom provider config cannot be null",
                    ));
                }
                Ok(())
            }
        }
    }

    /// Get the provider type name
    pub fn type_name(&self) -> &str {
        match self {
            ProviderConfig::Cloudflare { .. } => "cloudflare",
            ProviderConfig::Custom { factory, .. } => factory,
        }
    }
}

// Keep API tokens out of logs
impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderConfig::Cloudflare {
                zone_id,
                account_id,
                ..
            } => f
                .debug_struct("Cloudflare")
                .field("api_token", &"<redacted>")
                .field("zone_id", zone_id)
                .field("account_id", account_id)
                .finish(),
            ProviderConfig::Custom { factory, .. } => f
                .debug_struct("Custom")
                .field("factory", factory)
                .finish_non_exhaustive(),
        }
    }
}

/// State store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateStoreConfig {
    /// File-based state store
    File {
        /// Path to the state file
        path: String,
    },

    /// In-memory state store (not persistent)
    #[default]
    Memory,

    /// Custom state store
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl StateStoreConfig {
    /// Registry key for this store type
    pub fn type_name(&self) -> &str {
        match self {
            StateStoreConfig::File { .. } => "file",
            StateStoreConfig::Memory => "memory",
            StateStoreConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Source of machine and group data
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FleetSourceConfig {
    /// JSON snapshot re-read on every lookup
    File {
        /// Path to the snapshot
        path: String,
    },

    /// Fixed machines and groups from the config itself
    Inline {
        #[serde(default)]
        machines: Vec<Machine>,
        #[serde(default)]
        groups: Vec<Group>,
    },
}

impl Default for FleetSourceConfig {
    fn default() -> Self {
        FleetSourceConfig::Inline {
            machines: Vec::new(),
            groups: Vec::new(),
        }
    }
}

impl FleetSourceConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            FleetSourceConfig::File { path } if path.trim().is_empty() => {
                Err(crate::Error::config("Fleet snapshot path cannot be empty"))
            }
            _ => Ok(()),
        }
    }
}

/// A domain declared in configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    /// Zone apex (e.g., "example.com")
    pub name: String,

    /// Name of the provider account serving this zone
    pub provider: String,

    /// Records to declare on startup
    #[serde(default)]
    pub records: Vec<RecordSpec>,

    /// Pools rotating one of this domain's records
    #[serde(default)]
    pub record_pools: Vec<DeclaredRecordPool>,

    /// Pool rotating the domain's `*` (and optionally `@`) records
    #[serde(default)]
    pub wildcard_pool: Option<DeclaredWildcardPool>,
}

/// A record pool declared in configuration, bound by record name and type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeclaredRecordPool {
    /// Relative name of the bound record
    pub record: String,

    #[serde(default = "default_pool_record_type")]
    pub record_type: RecordType,

    #[serde(flatten)]
    pub pool: PoolRequest,
}

/// A wildcard pool declared in configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeclaredWildcardPool {
    #[serde(default)]
    pub include_root: bool,

    #[serde(flatten)]
    pub pool: PoolRequest,
}

/// Rotation engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between rotation ticks
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,

    /// A machine is online if its last heartbeat is at most this old
    #[serde(default = "default_health_freshness_secs")]
    pub health_freshness_secs: u64,

    /// A scheduled pool that rotated within this window is not due again
    ///
    /// Must cover at least one tick so a schedule minute fires only once.
    #[serde(default = "default_schedule_debounce_secs")]
    pub schedule_debounce_secs: u64,

    /// TTL for records a wildcard rotation has to create
    #[serde(default = "default_record_ttl")]
    pub default_ttl: u32,

    /// Capacity of the engine event channel
    ///
    /// When full, events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            health_freshness_secs: default_health_freshness_secs(),
            schedule_debounce_secs: default_schedule_debounce_secs(),
            default_ttl: default_record_ttl(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.tick_interval_secs == 0 {
            return Err(crate::Error::config("Scheduler tick interval must be > 0"));
        }
        if self.health_freshness_secs == 0 {
            return Err(crate::Error::config("Health freshness window must be > 0"));
        }
        if self.default_ttl == 0 {
            return Err(crate::Error::config("Default TTL must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn health_freshness(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.health_freshness_secs as i64)
    }

    pub fn schedule_debounce(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.schedule_debounce_secs as i64)
    }
}

/// Reconcile worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Upper bound for any single provider call
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,

    /// Seconds between periodic pushes of pending records
    #[serde(default = "default_pass_interval_secs")]
    pub pass_interval_secs: u64,

    /// Queue an immediate push after every rotation
    #[serde(default = "default_push_on_rotate")]
    pub push_on_rotate: bool,

    /// Capacity of the rotation push queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            provider_timeout_secs: default_provider_timeout_secs(),
            pass_interval_secs: default_pass_interval_secs(),
            push_on_rotate: default_push_on_rotate(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl ReconcileConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.provider_timeout_secs == 0 {
            return Err(crate::Error::config("Provider timeout must be > 0"));
        }
        if self.pass_interval_secs == 0 {
            return Err(crate::Error::config("Reconcile pass interval must be > 0"));
        }
        if self.queue_capacity == 0 {
            return Err(crate::Error::config("Reconcile queue capacity must be > 0"));
        }
        Ok(())
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    pub fn pass_interval(&self) -> Duration {
        Duration::from_secs(self.pass_interval_secs)
    }
}

fn default_tick_interval_secs() -> u64 {
    60
}

fn default_health_freshness_secs() -> u64 {
    300
}

fn default_schedule_debounce_secs() -> u64 {
    120
}

fn default_record_ttl() -> u32 {
    300
}

fn default_event_channel_capacity() -> usize {
    1000
}

fn default_pool_record_type() -> RecordType {
    RecordType::A
}

fn default_provider_timeout_secs() -> u64 {
    30
}

fn default_pass_interval_secs() -> u64 {
    300
}

fn default_push_on_rotate() -> bool {
    true
}

fn default_queue_capacity() -> usize {
    256
}
