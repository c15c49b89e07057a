// # File State Store
//
// File-based implementation of StateStore with crash recovery.
//
// ## Purpose
//
// Provides persistent state storage across daemon restarts and crashes.
// Pools keep their current target and version, records keep their sync
// status, and rotation history survives restarts.
//
// ## Crash Recovery
//
// - Atomic writes: Uses write-then-rename for atomicity
// - Corruption detection: Validates JSON on load
// - Automatic backup: Keeps .backup of last known good state
// - Recovery: Falls back to backup if corruption detected
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "tables": {
//     "next_id": 3,
//     "domains": { "1": { "id": 1, "name": "example.com", "provider_account": "main" } },
//     "records": { "2": { "id": 2, "domain_id": 1, "name": "www", ... } },
//     "pools": {},
//     "members": {},
//     "history": []
//   }
// }
// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::model::{
    DesiredRecord, Domain, DomainId, MemberInput, PoolBinding, PoolId, PoolMember, PoolSettings,
    ProviderRecord, RecordId, RecordKey, RecordSpec, RetiredRecord, RotationHistory, RotationPool,
};
use crate::state::tables::Tables;
use crate::traits::state_store::{
    CommittedRotation, RotationCommit, StateStore, StateStoreFactory,
};

/// State file format version
/// Used for future migration if format changes
const STATE_FILE_VERSION: &str = "1.0";

/// File-based state store with crash recovery
///
/// Every mutation is written through to disk before the call returns.
///
/// # Crash Recovery
///
/// - **Atomic writes**: New state written to temporary file, then renamed
/// - **Backup**: Last known good state kept in `.backup` file
/// - **Corruption detection**: JSON validation on load
/// - **Automatic recovery**: Falls back to backup if main file corrupted
///
/// # Example
///
/// ```rust,no_run
/// use fleetdns_core::state::FileStateStore;
/// use fleetdns_core::traits::StateStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileStateStore::new("/var/lib/fleetdns/state.json").await?;
///
///     // Atomically written to disk
///     store.insert_domain("example.com", "main").await?;
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
    state: Arc<RwLock<FileState>>,
}

/// Internal state for file-based store
#[derive(Debug)]
struct FileState {
    tables: Tables,
    dirty: bool,
}

/// Serializable state file format
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct StateFileFormat {
    version: String,
    tables: Tables,
}

/// Why a state file could not be loaded
enum LoadError {
    /// The file exists but is not a valid state document
    Corrupted(String),
    /// The file could not be read at all
    Unreadable(Error),
}

impl FileStateStore {
    /// Create or load a file state store
    ///
    /// This will:
    /// 1. Try to load existing state file
    /// 2. If corruption detected, try to load from backup
    /// 3. If both fail, start with empty state
    /// 4. Create parent directories if needed
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::config(format!(
                        "Failed to create state directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let tables = Self::load_state_with_recovery(&path).await?;

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(FileState {
                tables,
                dirty: false,
            })),
        })
    }

    /// Load state from file with automatic recovery
    ///
    /// Recovery strategy:
    /// 1. Try to load main state file
    /// 2. If it does not parse, try loading backup
    /// 3. If backup also fails, start with empty state
    async fn load_state_with_recovery(path: &Path) -> Result<Tables> {
        let reason = match Self::load_state(path).await {
            Ok(tables) => {
                tracing::debug!(
                    "Loaded state from file: {} records",
                    tables.record_count()
                );
                return Ok(tables);
            }
            Err(LoadError::Unreadable(e)) => return Err(e),
            Err(LoadError::Corrupted(reason)) => reason,
        };

        tracing::warn!(
            "State file appears corrupted: {}. Attempting recovery from backup.",
            reason
        );

        let backup_path = Self::backup_path(path);
        if !backup_path.exists() {
            tracing::warn!("No backup file found. Starting with empty state.");
            return Ok(Tables::default());
        }

        match Self::load_state(&backup_path).await {
            Ok(tables) => {
                tracing::info!(
                    "Recovered state from backup: {} records",
                    tables.record_count()
                );

                if let Err(restore_err) = Self::restore_from_backup(path, &backup_path).await {
                    tracing::error!(
                        "Failed to restore state file from backup: {}",
                        restore_err
                    );
                }

                Ok(tables)
            }
            Err(LoadError::Corrupted(backup_reason)) => {
                tracing::error!(
                    "Backup also corrupted: {}. Starting with empty state.",
                    backup_reason
                );
                Ok(Tables::default())
            }
            Err(LoadError::Unreadable(e)) => {
                tracing::error!("Backup unreadable: {}. Starting with empty state.", e);
                Ok(Tables::default())
            }
        }
    }

    /// Load state from file
    async fn load_state(path: &Path) -> std::result::Result<Tables, LoadError> {
        if !path.exists() {
            tracing::debug!("State file does not exist: {}", path.display());
            return Ok(Tables::default());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            LoadError::Unreadable(Error::state_store(format!(
                "Failed to read state file {}: {}",
                path.display(),
                e
            )))
        })?;

        let state_file: StateFileFormat = serde_json::from_str(&content)
            .map_err(|e| LoadError::Corrupted(format!("{}: {}", path.display(), e)))?;

        if state_file.version != STATE_FILE_VERSION {
            tracing::warn!(
                "State file version mismatch: expected {}, got {}. \
                Attempting to load anyway.",
                STATE_FILE_VERSION,
                state_file.version
            );
        }

        Ok(state_file.tables)
    }

    /// Write state to file atomically
    async fn write_state(&self) -> Result<()> {
        let mut state_guard = self.state.write().await;
        self.write_locked(&mut state_guard).await
    }

    /// Write the guarded state to disk
    ///
    /// The caller holds the write lock for the whole serialize, write and
    /// rename sequence, so the temp file has one writer and the file on disk
    /// never goes back to an older snapshot.
    async fn write_locked(&self, state: &mut FileState) -> Result<()> {
        let state_file = StateFileFormat {
            version: STATE_FILE_VERSION.to_string(),
            tables: state.tables.clone(),
        };
        let json = serde_json::to_string_pretty(&state_file)
            .map_err(|e| Error::state_store(format!("Failed to serialize state: {}", e)))?;

        // Write to temporary file first
        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to write to temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.flush().await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        // Keep the previous good state as backup
        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::state_store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        state.dirty = false;

        tracing::trace!("State written to file: {}", self.path.display());
        Ok(())
    }

    /// Run a mutation and write it through to disk under one write lock
    async fn mutate<T>(&self, op: impl FnOnce(&mut Tables) -> Result<T>) -> Result<T> {
        let mut state_guard = self.state.write().await;
        let value = op(&mut state_guard.tables)?;
        state_guard.dirty = true;

        self.write_locked(&mut state_guard).await?;
        Ok(value)
    }

    /// Restore state file from backup
    async fn restore_from_backup(path: &Path, backup_path: &Path) -> Result<()> {
        fs::copy(backup_path, path).await.map_err(|e| {
            Error::state_store(format!(
                "Failed to restore from backup {} to {}: {}",
                backup_path.display(),
                path.display(),
                e
            ))
        })?;

        tracing::info!("Restored state file from backup");
        Ok(())
    }

    /// Get path to temporary file for atomic writes
    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    /// Get path to backup file
    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }

    /// Force immediate write to disk
    pub async fn sync(&self) -> Result<()> {
        self.write_state().await
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn insert_domain(&self, name: &str, provider_account: &str) -> Result<Domain> {
        self.mutate(|t| t.insert_domain(name, provider_account)).await
    }

    async fn get_domain(&self, id: DomainId) -> Result<Option<Domain>> {
        Ok(self.state.read().await.tables.get_domain(id))
    }

    async fn find_domain(&self, name: &str) -> Result<Option<Domain>> {
        Ok(self.state.read().await.tables.find_domain(name))
    }

    async fn list_domains(&self) -> Result<Vec<Domain>> {
        Ok(self.state.read().await.tables.list_domains())
    }

    async fn upsert_record(&self, domain_id: DomainId, spec: &RecordSpec) -> Result<DesiredRecord> {
        self.mutate(|t| t.upsert_record(domain_id, spec, Utc::now()))
            .await
    }

    async fn get_record(&self, id: RecordId) -> Result<Option<DesiredRecord>> {
        Ok(self.state.read().await.tables.get_record(id))
    }

    async fn find_record(&self, domain_id: DomainId, key: &RecordKey) -> Result<Option<DesiredRecord>> {
        Ok(self.state.read().await.tables.find_record(domain_id, key))
    }

    async fn list_records(&self, domain_id: DomainId) -> Result<Vec<DesiredRecord>> {
        Ok(self.state.read().await.tables.list_records(domain_id))
    }

    async fn delete_record(&self, id: RecordId) -> Result<()> {
        self.mutate(|t| t.delete_record(id)).await
    }

    async fn mark_synced(
        &self,
        id: RecordId,
        pushed: &RecordSpec,
        remote_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        self.mutate(|t| t.mark_synced(id, pushed, remote_id, at)).await
    }

    async fn mark_sync_error(
        &self,
        id: RecordId,
        pushed: &RecordSpec,
        message: &str,
    ) -> Result<bool> {
        self.mutate(|t| t.mark_sync_error(id, pushed, message)).await
    }

    async fn list_retired(&self, domain_id: DomainId) -> Result<Vec<RetiredRecord>> {
        Ok(self.state.read().await.tables.list_retired(domain_id))
    }

    async fn clear_retired(&self, id: RecordId) -> Result<()> {
        self.mutate(|t| {
            t.clear_retired(id);
            Ok(())
        })
        .await
    }

    async fn import_record(
        &self,
        domain_id: DomainId,
        record: &ProviderRecord,
        at: DateTime<Utc>,
    ) -> Result<DesiredRecord> {
        self.mutate(|t| t.import_record(domain_id, record, at)).await
    }

    async fn insert_pool(&self, pool: RotationPool, members: &[MemberInput]) -> Result<RotationPool> {
        self.mutate(|t| t.insert_pool(pool, members, Utc::now()))
            .await
    }

    async fn update_pool(
        &self,
        id: PoolId,
        expected_version: u64,
        binding: PoolBinding,
        settings: PoolSettings,
        members: &[MemberInput],
    ) -> Result<RotationPool> {
        self.mutate(|t| {
            t.update_pool(id, expected_version, binding, settings, members, Utc::now())
        })
        .await
    }

    async fn get_pool(&self, id: PoolId) -> Result<Option<RotationPool>> {
        Ok(self.state.read().await.tables.get_pool(id))
    }

    async fn list_pools(&self) -> Result<Vec<RotationPool>> {
        Ok(self.state.read().await.tables.list_pools())
    }

    async fn delete_pool(&self, id: PoolId) -> Result<()> {
        self.mutate(|t| t.delete_pool(id)).await
    }

    async fn list_members(&self, pool_id: PoolId) -> Result<Vec<PoolMember>> {
        Ok(self.state.read().await.tables.list_members(pool_id))
    }

    async fn set_paused(&self, id: PoolId, paused: bool) -> Result<RotationPool> {
        self.mutate(|t| t.set_paused(id, paused, Utc::now())).await
    }

    async fn set_pool_error(&self, id: PoolId, error: Option<String>) -> Result<()> {
        self.mutate(|t| t.set_pool_error(id, error)).await
    }

    async fn commit_rotation(&self, commit: RotationCommit) -> Result<CommittedRotation> {
        self.mutate(|t| t.commit_rotation(commit)).await
    }

    async fn stamp_rotation(
        &self,
        id: PoolId,
        expected_version: u64,
        index: usize,
        at: DateTime<Utc>,
    ) -> Result<RotationPool> {
        self.mutate(|t| t.stamp_rotation(id, expected_version, index, at))
            .await
    }

    async fn list_history(&self, pool_id: PoolId, limit: usize) -> Result<Vec<RotationHistory>> {
        Ok(self.state.read().await.tables.list_history(pool_id, limit))
    }

    async fn flush(&self) -> Result<()> {
        let mut state_guard = self.state.write().await;
        if state_guard.dirty {
            self.write_locked(&mut state_guard).await
        } else {
            Ok(())
        }
    }
}

/// Factory for [`FileStateStore`]
pub struct FileStateStoreFactory;

#[async_trait]
impl StateStoreFactory for FileStateStoreFactory {
    async fn create(
        &self,
        config: &crate::config::StateStoreConfig,
    ) -> Result<Arc<dyn StateStore>> {
        match config {
            crate::config::StateStoreConfig::File { path } => {
                Ok(Arc::new(FileStateStore::new(path).await?))
            }
            _ => Err(Error::config("file state store requires a File config")),
        }
    }
}
