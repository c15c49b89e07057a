// # State Store Trait
//
// Defines the interface for persistent control-plane state.
//
// ## Purpose
//
// The state store holds everything operators declare and everything the
// rotation engine decides:
// - Domains and their provider account
// - Desired records, keyed uniquely by (domain, name, type)
// - Rotation pools, their explicit members and their current target
// - The append-only rotation history
//
// ## Implementations
//
// - Memory: `state::MemoryStateStore`
// - File-based JSON with atomic writes: `state::FileStateStore`
//
// ## Usage
//
// ```rust,ignore
// use fleetdns_core::StateStore;
// use fleetdns_core::model::{RecordSpec, RecordType};
//
// let store = /* StateStore implementation */;
// let domain = store.insert_domain("example.com", "cloudflare-main").await?;
// let record = store
//     .upsert_record(domain.id, &RecordSpec::new("www", RecordType::A, "1.2.3.4"))
//     .await?;
// assert_eq!(record.sync_status, SyncStatus::Pending);
// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::{
    DesiredRecord, Domain, DomainId, MachineId, MemberInput, NewHistory, PoolBinding, PoolId,
    PoolMember, PoolSettings, ProviderRecord, RecordId, RecordKey, RecordSpec, RetiredRecord,
    RotationHistory, RotationPool,
};

/// A record change produced by a rotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordWrite {
    /// Replace the value of a known record (record pools)
    Existing { record_id: RecordId, value: String },
    /// Set the value of `(domain, name, type)`, creating it with `spec` if
    /// absent; an existing record keeps its TTL and flags (wildcard pools)
    Upsert { domain_id: DomainId, spec: RecordSpec },
    /// Drop a record the new target makes stale; once pushed, it is kept as
    /// a [`RetiredRecord`] until the provider copy is deleted
    Retire { record_id: RecordId },
}

/// Everything a real rotation changes, applied atomically
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationCommit {
    pub pool_id: PoolId,
    /// Pool version the decision was based on
    pub expected_version: u64,
    pub machine_id: MachineId,
    pub address: String,
    pub index: usize,
    pub at: DateTime<Utc>,
    pub writes: Vec<RecordWrite>,
    pub history: NewHistory,
}

/// Result of a successful [`StateStore::commit_rotation`]
#[derive(Debug, Clone)]
pub struct CommittedRotation {
    pub pool: RotationPool,
    pub records: Vec<DesiredRecord>,
    pub history: RotationHistory,
}

/// Trait for state store implementations
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently from multiple tasks.
///
/// # Trust Level: Trusted (Core Component)
///
/// ## Allowed Capabilities
/// - ✅ Perform I/O for persistent storage (files, databases, etc.)
/// - ✅ Implement locking for atomic multi-row writes
///
/// ## Forbidden Capabilities
/// - ❌ Decide rotations or reconcile (owned by the engine and reconciler)
/// - ❌ Call DNS providers
///
/// ## Consistency
///
/// Every pool mutation that follows a read-decide-write cycle
/// (`update_pool`, `commit_rotation`, `stamp_rotation`) takes the version the
/// caller read. A mismatch must fail with `Error::RaceCondition` and leave
/// all state untouched.
#[async_trait]
pub trait StateStore: Send + Sync {
    // ── Domains ──

    /// Register a domain; names are unique
    async fn insert_domain(&self, name: &str, provider_account: &str) -> Result<Domain>;

    async fn get_domain(&self, id: DomainId) -> Result<Option<Domain>>;

    async fn find_domain(&self, name: &str) -> Result<Option<Domain>>;

    async fn list_domains(&self) -> Result<Vec<Domain>>;

    // ── Desired records ──

    /// Create or update the record at `(domain, name, type)` and mark it pending
    async fn upsert_record(&self, domain_id: DomainId, spec: &RecordSpec) -> Result<DesiredRecord>;

    async fn get_record(&self, id: RecordId) -> Result<Option<DesiredRecord>>;

    async fn find_record(&self, domain_id: DomainId, key: &RecordKey) -> Result<Option<DesiredRecord>>;

    async fn list_records(&self, domain_id: DomainId) -> Result<Vec<DesiredRecord>>;

    /// Delete a record; refused while a record pool is bound to it
    async fn delete_record(&self, id: RecordId) -> Result<()>;

    /// Record a successful push of `pushed`
    ///
    /// The remote id is always kept. The status only moves to synced when the
    /// record still holds `pushed`; returns whether it did.
    async fn mark_synced(
        &self,
        id: RecordId,
        pushed: &RecordSpec,
        remote_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Record a failed push of `pushed`; ignored if the record changed since
    async fn mark_sync_error(
        &self,
        id: RecordId,
        pushed: &RecordSpec,
        message: &str,
    ) -> Result<bool>;

    /// Records retired by rotations whose provider copy still exists
    async fn list_retired(&self, domain_id: DomainId) -> Result<Vec<RetiredRecord>>;

    /// Forget a retired record once the provider copy is gone
    async fn clear_retired(&self, id: RecordId) -> Result<()>;

    /// Adopt a remote record as desired state, already in sync
    async fn import_record(
        &self,
        domain_id: DomainId,
        record: &ProviderRecord,
        at: DateTime<Utc>,
    ) -> Result<DesiredRecord>;

    // ── Pools ──

    /// Insert a pool with its explicit members; bindings are unique
    async fn insert_pool(&self, pool: RotationPool, members: &[MemberInput]) -> Result<RotationPool>;

    /// Replace a pool's binding, settings and members
    async fn update_pool(
        &self,
        id: PoolId,
        expected_version: u64,
        binding: PoolBinding,
        settings: PoolSettings,
        members: &[MemberInput],
    ) -> Result<RotationPool>;

    async fn get_pool(&self, id: PoolId) -> Result<Option<RotationPool>>;

    async fn list_pools(&self) -> Result<Vec<RotationPool>>;

    /// Delete a pool and its members; its history is kept
    async fn delete_pool(&self, id: PoolId) -> Result<()>;

    /// Explicit members ordered by priority, then member id
    async fn list_members(&self, pool_id: PoolId) -> Result<Vec<PoolMember>>;

    async fn set_paused(&self, id: PoolId, paused: bool) -> Result<RotationPool>;

    /// Set or clear the pool's last-error indicator
    async fn set_pool_error(&self, id: PoolId, error: Option<String>) -> Result<()>;

    // ── Rotation ──

    /// Apply record writes, pool target update and history append atomically
    async fn commit_rotation(&self, commit: RotationCommit) -> Result<CommittedRotation>;

    /// Record a due rotation that kept the same target: stamps
    /// `last_rotated_at` and the index without touching records or history
    async fn stamp_rotation(
        &self,
        id: PoolId,
        expected_version: u64,
        index: usize,
        at: DateTime<Utc>,
    ) -> Result<RotationPool>;

    /// Most recent history rows for a pool, newest first
    async fn list_history(&self, pool_id: PoolId, limit: usize) -> Result<Vec<RotationHistory>>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<()>;
}

/// Helper trait for constructing state stores from configuration
#[async_trait]
pub trait StateStoreFactory: Send + Sync {
    async fn create(
        &self,
        config: &crate::config::StateStoreConfig,
    ) -> Result<std::sync::Arc<dyn StateStore>>;
}
