// # State Tables
//
// The serializable tables behind every bundled `StateStore`. All invariants
// (unique keys, unique pool bindings, version checks, atomic rotation
// commits) live here so the memory and file stores only add locking and
// persistence around them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::error::{Error, Result};
use crate::model::{
    DesiredRecord, Domain, DomainId, MemberId, MemberInput, PoolBinding, PoolId, PoolMember,
    PoolSettings, ProviderRecord, RecordId, RecordKey, RecordSpec, RetiredRecord, RotationHistory,
    RotationPool, SyncStatus, normalize_domain, normalize_name,
};
use crate::traits::state_store::{CommittedRotation, RecordWrite, RotationCommit};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct Tables {
    #[serde(default)]
    next_id: u64,
    #[serde(default)]
    domains: BTreeMap<DomainId, Domain>,
    #[serde(default)]
    records: BTreeMap<RecordId, DesiredRecord>,
    #[serde(default)]
    pools: BTreeMap<PoolId, RotationPool>,
    #[serde(default)]
    members: BTreeMap<MemberId, PoolMember>,
    #[serde(default)]
    history: Vec<RotationHistory>,
    #[serde(default)]
    retired: BTreeMap<RecordId, RetiredRecord>,
}

impl Tables {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub(crate) fn record_count(&self) -> usize {
        self.records.len()
    }

    // ── Domains ──

    pub(crate) fn insert_domain(&mut self, name: &str, provider_account: &str) -> Result<Domain> {
        let name = normalize_domain(name);
        if name.is_empty() {
            return Err(Error::validation("domain name cannot be empty"));
        }
        if provider_account.trim().is_empty() {
            return Err(Error::validation(format!(
                "domain {name} needs a provider account"
            )));
        }

        if let Some(existing) = self.find_domain(&name) {
            if existing.provider_account == provider_account {
                return Ok(existing);
            }
            return Err(Error::validation(format!(
                "domain {name} is already registered with account {}",
                existing.provider_account
            )));
        }

        let domain = Domain {
            id: self.allocate_id(),
            name,
            provider_account: provider_account.to_string(),
        };
        self.domains.insert(domain.id, domain.clone());
        Ok(domain)
    }

    pub(crate) fn get_domain(&self, id: DomainId) -> Option<Domain> {
        self.domains.get(&id).cloned()
    }

    pub(crate) fn find_domain(&self, name: &str) -> Option<Domain> {
        let name = normalize_domain(name);
        self.domains.values().find(|d| d.name == name).cloned()
    }

    pub(crate) fn list_domains(&self) -> Vec<Domain> {
        self.domains.values().cloned().collect()
    }

    fn require_domain(&self, id: DomainId) -> Result<&Domain> {
        self.domains
            .get(&id)
            .ok_or_else(|| Error::not_found(format!("domain {id}")))
    }

    // ── Records ──

    fn find_record_id(&self, domain_id: DomainId, key: &RecordKey) -> Option<RecordId> {
        self.records
            .values()
            .find(|r| r.domain_id == domain_id && r.key() == *key)
            .map(|r| r.id)
    }

    /// A key managed again no longer has a provider copy to delete
    fn revive(&mut self, domain_id: DomainId, key: &RecordKey) {
        self.retired
            .retain(|_, r| !(r.domain_id == domain_id && r.key == *key));
    }

    fn bound_pool(&self, record_id: RecordId) -> Option<&RotationPool> {
        self.pools
            .values()
            .find(|p| p.binding == PoolBinding::Record { record_id })
    }

    pub(crate) fn upsert_record(
        &mut self,
        domain_id: DomainId,
        spec: &RecordSpec,
        now: DateTime<Utc>,
    ) -> Result<DesiredRecord> {
        let mut spec = spec.clone();
        spec.name = normalize_name(&spec.name);
        spec.validate()?;
        self.require_domain(domain_id)?;
        self.revive(domain_id, &spec.key());

        let id = match self.find_record_id(domain_id, &spec.key()) {
            Some(id) => id,
            None => {
                let id = self.allocate_id();
                self.records.insert(
                    id,
                    DesiredRecord {
                        id,
                        domain_id,
                        spec: spec.clone(),
                        sync_status: SyncStatus::Pending,
                        sync_error: None,
                        remote_id: None,
                        last_synced_at: None,
                        updated_at: now,
                    },
                );
                id
            }
        };

        let record = self
            .records
            .get_mut(&id)
            .ok_or_else(|| Error::not_found(format!("record {id}")))?;
        record.spec = spec;
        record.sync_status = SyncStatus::Pending;
        record.sync_error = None;
        record.updated_at = now;
        Ok(record.clone())
    }

    pub(crate) fn get_record(&self, id: RecordId) -> Option<DesiredRecord> {
        self.records.get(&id).cloned()
    }

    pub(crate) fn find_record(&self, domain_id: DomainId, key: &RecordKey) -> Option<DesiredRecord> {
        self.find_record_id(domain_id, key)
            .and_then(|id| self.get_record(id))
    }

    pub(crate) fn list_records(&self, domain_id: DomainId) -> Vec<DesiredRecord> {
        self.records
            .values()
            .filter(|r| r.domain_id == domain_id)
            .cloned()
            .collect()
    }

    pub(crate) fn delete_record(&mut self, id: RecordId) -> Result<()> {
        if !self.records.contains_key(&id) {
            return Err(Error::not_found(format!("record {id}")));
        }
        if let Some(pool) = self.bound_pool(id) {
            return Err(Error::validation(format!(
                "record {id} is bound to pool {}; delete the pool first",
                pool.id
            )));
        }
        self.records.remove(&id);
        Ok(())
    }

    /// Record a push of `pushed`; a record rewritten since keeps its status
    pub(crate) fn mark_synced(
        &mut self,
        id: RecordId,
        pushed: &RecordSpec,
        remote_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let record = self
            .records
            .get_mut(&id)
            .ok_or_else(|| Error::not_found(format!("record {id}")))?;
        record.remote_id = Some(remote_id.to_string());
        if record.spec != *pushed {
            return Ok(false);
        }
        record.sync_status = SyncStatus::Synced;
        record.sync_error = None;
        record.last_synced_at = Some(at);
        Ok(true)
    }

    pub(crate) fn mark_sync_error(
        &mut self,
        id: RecordId,
        pushed: &RecordSpec,
        message: &str,
    ) -> Result<bool> {
        let record = self
            .records
            .get_mut(&id)
            .ok_or_else(|| Error::not_found(format!("record {id}")))?;
        if record.spec != *pushed {
            return Ok(false);
        }
        record.sync_status = SyncStatus::Error;
        record.sync_error = Some(message.to_string());
        Ok(true)
    }

    pub(crate) fn list_retired(&self, domain_id: DomainId) -> Vec<RetiredRecord> {
        self.retired
            .values()
            .filter(|r| r.domain_id == domain_id)
            .cloned()
            .collect()
    }

    pub(crate) fn clear_retired(&mut self, id: RecordId) {
        self.retired.remove(&id);
    }

    pub(crate) fn import_record(
        &mut self,
        domain_id: DomainId,
        remote: &ProviderRecord,
        at: DateTime<Utc>,
    ) -> Result<DesiredRecord> {
        self.require_domain(domain_id)?;
        let mut spec = remote.spec.clone();
        spec.name = normalize_name(&spec.name);
        self.revive(domain_id, &spec.key());

        let id = match self.find_record_id(domain_id, &spec.key()) {
            Some(id) => id,
            None => self.allocate_id(),
        };
        let record = DesiredRecord {
            id,
            domain_id,
            spec,
            sync_status: SyncStatus::Synced,
            sync_error: None,
            remote_id: Some(remote.id.clone()),
            last_synced_at: Some(at),
            updated_at: at,
        };
        self.records.insert(id, record.clone());
        Ok(record)
    }

    // ── Pools ──

    fn check_binding(&self, binding: &PoolBinding, exclude: Option<PoolId>) -> Result<()> {
        match binding {
            PoolBinding::Record { record_id } => {
                if !self.records.contains_key(record_id) {
                    return Err(Error::not_found(format!("record {record_id}")));
                }
            }
            PoolBinding::Wildcard { domain_id, .. } => {
                self.require_domain(*domain_id)?;
            }
        }

        let taken = self.pools.values().find(|p| {
            Some(p.id) != exclude
                && match (&p.binding, binding) {
                    (PoolBinding::Record { record_id: a }, PoolBinding::Record { record_id: b }) => {
                        a == b
                    }
                    (
                        PoolBinding::Wildcard { domain_id: a, .. },
                        PoolBinding::Wildcard { domain_id: b, .. },
                    ) => a == b,
                    _ => false,
                }
        });
        match taken {
            Some(pool) => Err(Error::validation(format!(
                "target is already rotated by pool {}",
                pool.id
            ))),
            None => Ok(()),
        }
    }

    fn check_members(members: &[MemberInput]) -> Result<()> {
        let mut seen = HashSet::new();
        for member in members {
            if !seen.insert(member.machine_id) {
                return Err(Error::validation(format!(
                    "machine {} listed twice",
                    member.machine_id
                )));
            }
        }
        Ok(())
    }

    fn replace_members(&mut self, pool_id: PoolId, members: &[MemberInput]) {
        self.members.retain(|_, m| m.pool_id != pool_id);
        for input in members {
            let id = self.allocate_id();
            self.members.insert(
                id,
                PoolMember {
                    id,
                    pool_id,
                    machine_id: input.machine_id,
                    priority: input.priority,
                    enabled: input.enabled,
                },
            );
        }
    }

    pub(crate) fn insert_pool(
        &mut self,
        mut pool: RotationPool,
        members: &[MemberInput],
        now: DateTime<Utc>,
    ) -> Result<RotationPool> {
        pool.settings.validate()?;
        Self::check_members(members)?;
        self.check_binding(&pool.binding, None)?;

        pool.id = self.allocate_id();
        pool.version = 0;
        pool.created_at = now;
        pool.updated_at = now;
        self.replace_members(pool.id, members);
        self.pools.insert(pool.id, pool.clone());
        Ok(pool)
    }

    fn check_version(&self, id: PoolId, expected_version: u64) -> Result<&RotationPool> {
        let pool = self
            .pools
            .get(&id)
            .ok_or_else(|| Error::not_found(format!("pool {id}")))?;
        if pool.version != expected_version {
            return Err(Error::RaceCondition(id));
        }
        Ok(pool)
    }

    fn pool_mut(&mut self, id: PoolId) -> Result<&mut RotationPool> {
        self.pools
            .get_mut(&id)
            .ok_or_else(|| Error::not_found(format!("pool {id}")))
    }

    pub(crate) fn update_pool(
        &mut self,
        id: PoolId,
        expected_version: u64,
        binding: PoolBinding,
        settings: PoolSettings,
        members: &[MemberInput],
        now: DateTime<Utc>,
    ) -> Result<RotationPool> {
        let current_kind = self.check_version(id, expected_version)?.kind();
        if binding.kind() != current_kind {
            return Err(Error::validation(format!(
                "pool {id} is a {current_kind} pool and cannot change kind"
            )));
        }
        settings.validate()?;
        Self::check_members(members)?;
        self.check_binding(&binding, Some(id))?;

        self.replace_members(id, members);
        let pool = self.pool_mut(id)?;
        pool.binding = binding;
        pool.settings = settings;
        pool.version += 1;
        pool.updated_at = now;
        Ok(pool.clone())
    }

    pub(crate) fn get_pool(&self, id: PoolId) -> Option<RotationPool> {
        self.pools.get(&id).cloned()
    }

    pub(crate) fn list_pools(&self) -> Vec<RotationPool> {
        self.pools.values().cloned().collect()
    }

    pub(crate) fn delete_pool(&mut self, id: PoolId) -> Result<()> {
        if self.pools.remove(&id).is_none() {
            return Err(Error::not_found(format!("pool {id}")));
        }
        self.members.retain(|_, m| m.pool_id != id);
        Ok(())
    }

    pub(crate) fn list_members(&self, pool_id: PoolId) -> Vec<PoolMember> {
        let mut members: Vec<PoolMember> = self
            .members
            .values()
            .filter(|m| m.pool_id == pool_id)
            .cloned()
            .collect();
        members.sort_by_key(|m| (m.priority, m.id));
        members
    }

    pub(crate) fn set_paused(
        &mut self,
        id: PoolId,
        paused: bool,
        now: DateTime<Utc>,
    ) -> Result<RotationPool> {
        let pool = self.pool_mut(id)?;
        pool.paused = paused;
        pool.updated_at = now;
        Ok(pool.clone())
    }

    pub(crate) fn set_pool_error(&mut self, id: PoolId, error: Option<String>) -> Result<()> {
        self.pool_mut(id)?.last_error = error;
        Ok(())
    }

    // ── Rotation ──

    pub(crate) fn commit_rotation(&mut self, commit: RotationCommit) -> Result<CommittedRotation> {
        self.check_version(commit.pool_id, commit.expected_version)?;

        // Validate every write before touching anything
        for write in &commit.writes {
            match write {
                RecordWrite::Existing { record_id, .. } => {
                    if !self.records.contains_key(record_id) {
                        return Err(Error::not_found(format!("record {record_id}")));
                    }
                }
                RecordWrite::Upsert { domain_id, spec } => {
                    self.require_domain(*domain_id)?;
                    spec.validate()?;
                }
                RecordWrite::Retire { record_id } => {
                    if !self.records.contains_key(record_id) {
                        return Err(Error::not_found(format!("record {record_id}")));
                    }
                    if let Some(pool) = self.bound_pool(*record_id) {
                        return Err(Error::validation(format!(
                            "record {record_id} is bound to pool {} and cannot be retired",
                            pool.id
                        )));
                    }
                }
            }
        }

        let mut written = Vec::with_capacity(commit.writes.len());
        for write in commit.writes {
            let id = match write {
                RecordWrite::Existing { record_id, value } => {
                    if let Some(record) = self.records.get_mut(&record_id) {
                        record.spec.value = value;
                    }
                    record_id
                }
                RecordWrite::Retire { record_id } => {
                    let remote = self
                        .records
                        .remove(&record_id)
                        .and_then(|r| r.remote_id.clone().map(|remote_id| (r, remote_id)));
                    if let Some((record, remote_id)) = remote {
                        self.retired.insert(
                            record_id,
                            RetiredRecord {
                                id: record_id,
                                domain_id: record.domain_id,
                                key: record.key(),
                                remote_id,
                                retired_at: commit.at,
                            },
                        );
                    }
                    continue;
                }
                RecordWrite::Upsert { domain_id, spec } => {
                    self.revive(domain_id, &spec.key());
                    match self.find_record_id(domain_id, &spec.key()) {
                        Some(id) => {
                            if let Some(record) = self.records.get_mut(&id) {
                                record.spec.value = spec.value;
                            }
                            id
                        }
                        None => {
                            let id = self.allocate_id();
                            self.records.insert(
                                id,
                                DesiredRecord {
                                    id,
                                    domain_id,
                                    spec,
                                    sync_status: SyncStatus::Pending,
                                    sync_error: None,
                                    remote_id: None,
                                    last_synced_at: None,
                                    updated_at: commit.at,
                                },
                            );
                            id
                        }
                    }
                }
            };
            if let Some(record) = self.records.get_mut(&id) {
                record.sync_status = SyncStatus::Pending;
                record.sync_error = None;
                record.updated_at = commit.at;
                written.push(record.clone());
            }
        }

        let history = commit.history.into_history(self.allocate_id());
        self.history.push(history.clone());

        let pool = self.pool_mut(commit.pool_id)?;
        pool.current_machine_id = Some(commit.machine_id);
        pool.current_address = Some(commit.address);
        pool.current_index = commit.index;
        pool.last_rotated_at = Some(commit.at);
        pool.last_error = None;
        pool.version += 1;
        pool.updated_at = commit.at;

        Ok(CommittedRotation {
            pool: pool.clone(),
            records: written,
            history,
        })
    }

    pub(crate) fn stamp_rotation(
        &mut self,
        id: PoolId,
        expected_version: u64,
        index: usize,
        at: DateTime<Utc>,
    ) -> Result<RotationPool> {
        self.check_version(id, expected_version)?;
        let pool = self.pool_mut(id)?;
        pool.current_index = index;
        pool.last_rotated_at = Some(at);
        pool.last_error = None;
        pool.version += 1;
        pool.updated_at = at;
        Ok(pool.clone())
    }

    pub(crate) fn list_history(&self, pool_id: PoolId, limit: usize) -> Vec<RotationHistory> {
        self.history
            .iter()
            .rev()
            .filter(|h| h.pool_id == pool_id)
            .take(limit)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewHistory, PoolKind, RecordType, RotationTrigger};

    fn seeded() -> (Tables, Domain, DesiredRecord) {
        let mut tables = Tables::default();
        let domain = tables.insert_domain("Example.com.", "main").unwrap();
        let record = tables
            .upsert_record(
                domain.id,
                &RecordSpec::new("app", RecordType::A, "10.0.0.1"),
                Utc::now(),
            )
            .unwrap();
        (tables, domain, record)
    }

    fn commit_for(pool: &RotationPool, record_id: RecordId, address: &str) -> RotationCommit {
        let at = Utc::now();
        RotationCommit {
            pool_id: pool.id,
            expected_version: pool.version,
            machine_id: 2,
            address: address.to_string(),
            index: 1,
            at,
            writes: vec![RecordWrite::Existing {
                record_id,
                value: address.to_string(),
            }],
            history: NewHistory {
                pool_kind: PoolKind::Record,
                pool_id: pool.id,
                domain: Some("example.com".to_string()),
                record: Some("app".to_string()),
                from_machine_id: None,
                from_address: None,
                to_machine_id: 2,
                to_address: address.to_string(),
                trigger: RotationTrigger::Manual,
                created_at: at,
            },
        }
    }

    #[test]
    fn test_domain_names_are_unique() {
        let (mut tables, domain, _) = seeded();
        assert_eq!(domain.name, "example.com");

        let again = tables.insert_domain("EXAMPLE.COM", "main").unwrap();
        assert_eq!(again.id, domain.id);

        assert!(matches!(
            tables.insert_domain("example.com", "other"),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_upsert_keeps_one_record_per_key() {
        let (mut tables, domain, record) = seeded();
        tables.mark_synced(record.id, &record.spec, "r-1", Utc::now()).unwrap();

        let updated = tables
            .upsert_record(
                domain.id,
                &RecordSpec::new("APP", RecordType::A, "10.0.0.9"),
                Utc::now(),
            )
            .unwrap();

        assert_eq!(updated.id, record.id);
        assert_eq!(updated.spec.value, "10.0.0.9");
        assert_eq!(updated.sync_status, SyncStatus::Pending);
        assert_eq!(updated.remote_id.as_deref(), Some("r-1"));
        assert_eq!(tables.record_count(), 1);
    }

    #[test]
    fn test_push_of_stale_value_does_not_mark_synced() {
        let (mut tables, domain, record) = seeded();
        let pushed = record.spec.clone();
        tables
            .upsert_record(
                domain.id,
                &RecordSpec::new("app", RecordType::A, "10.0.0.9"),
                Utc::now(),
            )
            .unwrap();

        assert!(!tables.mark_synced(record.id, &pushed, "r-1", Utc::now()).unwrap());
        assert!(!tables.mark_sync_error(record.id, &pushed, "boom").unwrap());

        let current = tables.get_record(record.id).unwrap();
        assert_eq!(current.sync_status, SyncStatus::Pending);
        assert_eq!(current.remote_id.as_deref(), Some("r-1"));
        assert!(current.sync_error.is_none());
        assert!(current.last_synced_at.is_none());
    }

    #[test]
    fn test_record_pool_binding_rules() {
        let (mut tables, _, record) = seeded();
        let binding = PoolBinding::Record { record_id: record.id };

        let pool = tables
            .insert_pool(
                RotationPool::new(binding.clone(), PoolSettings::default()),
                &[MemberInput::new(1, 0)],
                Utc::now(),
            )
            .unwrap();

        let duplicate = tables.insert_pool(
            RotationPool::new(binding, PoolSettings::default()),
            &[],
            Utc::now(),
        );
        assert!(matches!(duplicate, Err(Error::Validation(_))));

        assert!(matches!(
            tables.delete_record(record.id),
            Err(Error::Validation(_))
        ));

        tables.delete_pool(pool.id).unwrap();
        assert!(tables.list_members(pool.id).is_empty());
        tables.delete_record(record.id).unwrap();
    }

    #[test]
    fn test_duplicate_members_rejected() {
        let (mut tables, _, record) = seeded();
        let result = tables.insert_pool(
            RotationPool::new(
                PoolBinding::Record { record_id: record.id },
                PoolSettings::default(),
            ),
            &[MemberInput::new(1, 0), MemberInput::new(1, 5)],
            Utc::now(),
        );
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_commit_rotation_is_all_or_nothing() {
        let (mut tables, _, record) = seeded();
        tables.mark_synced(record.id, &record.spec, "r-1", Utc::now()).unwrap();
        let pool = tables
            .insert_pool(
                RotationPool::new(
                    PoolBinding::Record { record_id: record.id },
                    PoolSettings::default(),
                ),
                &[],
                Utc::now(),
            )
            .unwrap();

        // Stale version: nothing changes
        let mut stale = commit_for(&pool, record.id, "10.0.0.2");
        stale.expected_version = pool.version + 1;
        assert!(matches!(
            tables.commit_rotation(stale),
            Err(Error::RaceCondition(_))
        ));
        assert_eq!(tables.get_record(record.id).unwrap().spec.value, "10.0.0.1");
        assert!(tables.list_history(pool.id, 10).is_empty());

        let committed = tables
            .commit_rotation(commit_for(&pool, record.id, "10.0.0.2"))
            .unwrap();
        assert_eq!(committed.pool.version, pool.version + 1);
        assert_eq!(committed.pool.current_machine_id, Some(2));
        assert_eq!(committed.records[0].spec.value, "10.0.0.2");
        assert_eq!(committed.records[0].sync_status, SyncStatus::Pending);
        assert_eq!(tables.list_history(pool.id, 10).len(), 1);

        // The same decision cannot be committed twice
        assert!(matches!(
            tables.commit_rotation(commit_for(&pool, record.id, "10.0.0.3")),
            Err(Error::RaceCondition(_))
        ));
    }

    #[test]
    fn test_retired_record_kept_until_cleared() {
        let (mut tables, domain, record) = seeded();
        tables.mark_synced(record.id, &record.spec, "r-1", Utc::now()).unwrap();
        let pool = tables
            .insert_pool(
                RotationPool::new(
                    PoolBinding::Wildcard {
                        domain_id: domain.id,
                        include_root: false,
                    },
                    PoolSettings::default(),
                ),
                &[],
                Utc::now(),
            )
            .unwrap();

        let mut commit = commit_for(&pool, record.id, "2001:db8::2");
        commit.writes = vec![
            RecordWrite::Upsert {
                domain_id: domain.id,
                spec: RecordSpec::new("app", RecordType::Aaaa, "2001:db8::2"),
            },
            RecordWrite::Retire { record_id: record.id },
        ];
        let committed = tables.commit_rotation(commit).unwrap();
        assert_eq!(committed.records.len(), 1);
        assert!(tables.get_record(record.id).is_none());

        let retired = tables.list_retired(domain.id);
        assert_eq!(retired.len(), 1);
        assert_eq!(retired[0].remote_id, "r-1");
        assert_eq!(retired[0].key, record.key());

        // Managing the key again keeps the provider copy
        tables.upsert_record(domain.id, &record.spec, Utc::now()).unwrap();
        assert!(tables.list_retired(domain.id).is_empty());
    }

    #[test]
    fn test_bound_record_cannot_be_retired() {
        let (mut tables, domain, record) = seeded();
        let pool = tables
            .insert_pool(
                RotationPool::new(
                    PoolBinding::Record { record_id: record.id },
                    PoolSettings::default(),
                ),
                &[],
                Utc::now(),
            )
            .unwrap();

        let mut commit = commit_for(&pool, record.id, "10.0.0.2");
        commit.writes = vec![RecordWrite::Retire { record_id: record.id }];
        assert!(matches!(
            tables.commit_rotation(commit),
            Err(Error::Validation(_))
        ));
        assert!(tables.get_record(record.id).is_some());
        assert!(tables.list_retired(domain.id).is_empty());
    }

    #[test]
    fn test_history_newest_first() {
        let (mut tables, _, record) = seeded();
        let mut pool = tables
            .insert_pool(
                RotationPool::new(
                    PoolBinding::Record { record_id: record.id },
                    PoolSettings::default(),
                ),
                &[],
                Utc::now(),
            )
            .unwrap();

        for last in 2..5 {
            let address = format!("10.0.0.{last}");
            pool = tables
                .commit_rotation(commit_for(&pool, record.id, &address))
                .unwrap()
                .pool;
        }

        let history = tables.list_history(pool.id, 2);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].to_address, "10.0.0.4");
        assert_eq!(history[1].to_address, "10.0.0.3");
    }

    #[test]
    fn test_import_marks_synced() {
        let (mut tables, domain, _) = seeded();
        let remote = ProviderRecord::new(
            "cf-9",
            RecordSpec::new("mail", RecordType::Mx, "mx.example.com").with_priority(10),
        );
        let imported = tables.import_record(domain.id, &remote, Utc::now()).unwrap();
        assert_eq!(imported.sync_status, SyncStatus::Synced);
        assert_eq!(imported.remote_id.as_deref(), Some("cf-9"));
    }
}
