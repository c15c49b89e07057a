// # Memory State Store
//
// In-memory implementation of StateStore.
//
// ## Purpose
//
// Provides a simple, fast state store that doesn't persist across restarts.
// Useful for testing and for embedding the control plane in a process that
// re-declares its domains and pools on startup.
//
// ## Crash Behavior
//
// - All state is lost on restart/crash
// - Rotation pools start over with no current target
// - Records re-declared after a restart are pushed again on the next pass

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::model::{
    DesiredRecord, Domain, DomainId, MemberInput, PoolBinding, PoolId, PoolMember, PoolSettings,
    ProviderRecord, RecordId, RecordKey, RecordSpec, RetiredRecord, RotationHistory, RotationPool,
};
use crate::state::tables::Tables;
use crate::traits::state_store::{
    CommittedRotation, RotationCommit, StateStore, StateStoreFactory,
};

/// In-memory state store implementation
///
/// All tables live behind a single RwLock, so every multi-row write
/// (notably [`StateStore::commit_rotation`]) is atomic.
///
/// # Example
///
/// ```rust,no_run
/// use fleetdns_core::state::MemoryStateStore;
/// use fleetdns_core::traits::StateStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryStateStore::new();
///     let domain = store.insert_domain("example.com", "main").await?;
///     assert_eq!(store.list_domains().await?, vec![domain]);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    inner: Arc<RwLock<Tables>>,
}

impl MemoryStateStore {
    /// Create a new empty memory state store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of desired records across all domains
    pub async fn len(&self) -> usize {
        self.inner.read().await.record_count()
    }

    /// Check if the store holds no records
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn insert_domain(&self, name: &str, provider_account: &str) -> Result<Domain> {
        self.inner.write().await.insert_domain(name, provider_account)
    }

    async fn get_domain(&self, id: DomainId) -> Result<Option<Domain>> {
        Ok(self.inner.read().await.get_domain(id))
    }

    async fn find_domain(&self, name: &str) -> Result<Option<Domain>> {
        Ok(self.inner.read().await.find_domain(name))
    }

    async fn list_domains(&self) -> Result<Vec<Domain>> {
        Ok(self.inner.read().await.list_domains())
    }

    async fn upsert_record(&self, domain_id: DomainId, spec: &RecordSpec) -> Result<DesiredRecord> {
        self.inner
            .write()
            .await
            .upsert_record(domain_id, spec, Utc::now())
    }

    async fn get_record(&self, id: RecordId) -> Result<Option<DesiredRecord>> {
        Ok(self.inner.read().await.get_record(id))
    }

    async fn find_record(&self, domain_id: DomainId, key: &RecordKey) -> Result<Option<DesiredRecord>> {
        Ok(self.inner.read().await.find_record(domain_id, key))
    }

    async fn list_records(&self, domain_id: DomainId) -> Result<Vec<DesiredRecord>> {
        Ok(self.inner.read().await.list_records(domain_id))
    }

    async fn delete_record(&self, id: RecordId) -> Result<()> {
        self.inner.write().await.delete_record(id)
    }

    async fn mark_synced(
        &self,
        id: RecordId,
        pushed: &RecordSpec,
        remote_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        self.inner.write().await.mark_synced(id, pushed, remote_id, at)
    }

    async fn mark_sync_error(
        &self,
        id: RecordId,
        pushed: &RecordSpec,
        message: &str,
    ) -> Result<bool> {
        self.inner.write().await.mark_sync_error(id, pushed, message)
    }

    async fn list_retired(&self, domain_id: DomainId) -> Result<Vec<RetiredRecord>> {
        Ok(self.inner.read().await.list_retired(domain_id))
    }

    async fn clear_retired(&self, id: RecordId) -> Result<()> {
        self.inner.write().await.clear_retired(id);
        Ok(())
    }

    async fn import_record(
        &self,
        domain_id: DomainId,
        record: &ProviderRecord,
        at: DateTime<Utc>,
    ) -> Result<DesiredRecord> {
        self.inner.write().await.import_record(domain_id, record, at)
    }

    async fn insert_pool(&self, pool: RotationPool, members: &[MemberInput]) -> Result<RotationPool> {
        self.inner
            .write()
            .await
            .insert_pool(pool, members, Utc::now())
    }

    async fn update_pool(
        &self,
        id: PoolId,
        expected_version: u64,
        binding: PoolBinding,
        settings: PoolSettings,
        members: &[MemberInput],
    ) -> Result<RotationPool> {
        self.inner.write().await.update_pool(
            id,
            expected_version,
            binding,
            settings,
            members,
            Utc::now(),
        )
    }

    async fn get_pool(&self, id: PoolId) -> Result<Option<RotationPool>> {
        Ok(self.inner.read().await.get_pool(id))
    }

    async fn list_pools(&self) -> Result<Vec<RotationPool>> {
        Ok(self.inner.read().await.list_pools())
    }

    async fn delete_pool(&self, id: PoolId) -> Result<()> {
        self.inner.write().await.delete_pool(id)
    }

    async fn list_members(&self, pool_id: PoolId) -> Result<Vec<PoolMember>> {
        Ok(self.inner.read().await.list_members(pool_id))
    }

    async fn set_paused(&self, id: PoolId, paused: bool) -> Result<RotationPool> {
        self.inner.write().await.set_paused(id, paused, Utc::now())
    }

    async fn set_pool_error(&self, id: PoolId, error: Option<String>) -> Result<()> {
        self.inner.write().await.set_pool_error(id, error)
    }

    async fn commit_rotation(&self, commit: RotationCommit) -> Result<CommittedRotation> {
        self.inner.write().await.commit_rotation(commit)
    }

    async fn stamp_rotation(
        &self,
        id: PoolId,
        expected_version: u64,
        index: usize,
        at: DateTime<Utc>,
    ) -> Result<RotationPool> {
        self.inner
            .write()
            .await
            .stamp_rotation(id, expected_version, index, at)
    }

    async fn list_history(&self, pool_id: PoolId, limit: usize) -> Result<Vec<RotationHistory>> {
        Ok(self.inner.read().await.list_history(pool_id, limit))
    }

    async fn flush(&self) -> Result<()> {
        // No-op for memory store (everything is already "persisted")
        Ok(())
    }
}

/// Factory for [`MemoryStateStore`]
pub struct MemoryStateStoreFactory;

#[async_trait]
impl StateStoreFactory for MemoryStateStoreFactory {
    async fn create(
        &self,
        _config: &crate::config::StateStoreConfig,
    ) -> Result<Arc<dyn StateStore>> {
        Ok(Arc::new(MemoryStateStore::new()))
    }
}
