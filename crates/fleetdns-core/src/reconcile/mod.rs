// # Reconciliation
//
// Converges a domain's desired records with what its DNS provider serves.
//
// ## Layers
//
// - `compare`: pure diff keyed by `(name, type)`
// - `apply_to_remote`: executes a diff against a provider, best effort
// - `import_from_remote`: read-through of the provider's record set
// - `Reconciler`: the store-aware service that marks sync statuses
// - `ReconcileWorker`: background pushes after rotations and on a timer
//
// ## Multi-value records
//
// A `(name, type)` key maps to a single value. When a provider returns
// several records for one key, the first participates in the diff and the
// rest are reported as `ambiguous` and never modified.

pub mod worker;

use chrono::Utc;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::model::{
    DesiredRecord, Domain, DomainId, ProviderRecord, RecordKey, RecordSpec, SyncStatus,
};
use crate::registry::ProviderSet;
use crate::traits::{DnsProvider, StateStore};

pub use worker::{ReconcileHandle, ReconcileWorker};

/// Same key on both sides, different value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordConflict {
    pub desired: RecordSpec,
    pub remote: ProviderRecord,
}

impl RecordConflict {
    pub fn key(&self) -> RecordKey {
        self.desired.key()
    }
}

/// Outcome of [`compare`]
///
/// Every key present on either side lands in exactly one of `created`,
/// `conflicts`, `deleted` or `matched`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecordDiff {
    /// Desired only
    pub created: Vec<RecordSpec>,
    /// Both sides, values differ
    pub conflicts: Vec<RecordConflict>,
    /// Remote only
    pub deleted: Vec<ProviderRecord>,
    /// Both sides, values equal (remote side)
    pub matched: Vec<ProviderRecord>,
    /// Extra remote records sharing a key with an earlier one
    pub ambiguous: Vec<ProviderRecord>,
}

impl RecordDiff {
    /// Whether applying this diff would change nothing
    pub fn is_in_sync(&self) -> bool {
        self.created.is_empty() && self.conflicts.is_empty() && self.deleted.is_empty()
    }

    /// Diagnostic label for a key
    pub fn status_of(&self, key: &RecordKey) -> Option<SyncStatus> {
        if self.created.iter().any(|r| r.key() == *key) {
            Some(SyncStatus::LocalOnly)
        } else if self.conflicts.iter().any(|c| c.key() == *key) {
            Some(SyncStatus::Conflict)
        } else if self.deleted.iter().any(|r| r.key() == *key) {
            Some(SyncStatus::RemoteOnly)
        } else if self.matched.iter().any(|r| r.key() == *key) {
            Some(SyncStatus::Synced)
        } else {
            None
        }
    }
}

/// Diff desired records against remote records
pub fn compare(desired: &[RecordSpec], remote: &[ProviderRecord]) -> RecordDiff {
    let mut diff = RecordDiff::default();

    let mut remote_by_key: HashMap<RecordKey, &ProviderRecord> = HashMap::new();
    for record in remote {
        let key = record.key();
        if remote_by_key.contains_key(&key) {
            diff.ambiguous.push(record.clone());
        } else {
            remote_by_key.insert(key, record);
        }
    }

    let mut desired_keys = HashSet::new();
    for spec in desired {
        let key = spec.key();
        if !desired_keys.insert(key.clone()) {
            continue;
        }
        match remote_by_key.get(&key) {
            None => diff.created.push(spec.clone()),
            Some(remote) if remote.spec.value != spec.value => {
                diff.conflicts.push(RecordConflict {
                    desired: spec.clone(),
                    remote: (*remote).clone(),
                });
            }
            Some(remote) => diff.matched.push((*remote).clone()),
        }
    }

    // Remote order, first occurrence per key
    let mut emitted = HashSet::new();
    for record in remote {
        let key = record.key();
        if !desired_keys.contains(&key) && emitted.insert(key) {
            diff.deleted.push(record.clone());
        }
    }

    diff
}

/// Which provider call an apply entry made
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyAction {
    Create,
    Update,
    Delete,
}

/// A single failed provider call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyError {
    pub key: RecordKey,
    pub action: ApplyAction,
    pub message: String,
}

/// Outcome of [`apply_to_remote`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub created: Vec<ProviderRecord>,
    pub updated: Vec<ProviderRecord>,
    pub deleted: Vec<ProviderRecord>,
    pub errors: Vec<ApplyError>,
}

impl ApplyReport {
    pub fn is_in_sync(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of provider writes that succeeded
    pub fn changes(&self) -> usize {
        self.created.len() + self.updated.len() + self.deleted.len()
    }
}

/// Execute a diff; `delete` controls whether remote-only records are removed
async fn execute(
    provider: &dyn DnsProvider,
    domain: &str,
    diff: &RecordDiff,
    delete: bool,
) -> ApplyReport {
    let mut report = ApplyReport::default();

    for spec in &diff.created {
        match provider.create_record(domain, spec).await {
            Ok(record) => report.created.push(record),
            Err(e) => report.errors.push(ApplyError {
                key: spec.key(),
                action: ApplyAction::Create,
                message: e.to_string(),
            }),
        }
    }

    for conflict in &diff.conflicts {
        match provider
            .update_record(domain, &conflict.remote.id, &conflict.desired)
            .await
        {
            Ok(record) => report.updated.push(record),
            Err(e) => report.errors.push(ApplyError {
                key: conflict.key(),
                action: ApplyAction::Update,
                message: e.to_string(),
            }),
        }
    }

    if delete {
        for record in &diff.deleted {
            match provider.delete_record(domain, &record.id).await {
                Ok(()) => report.deleted.push(record.clone()),
                Err(e) => report.errors.push(ApplyError {
                    key: record.key(),
                    action: ApplyAction::Delete,
                    message: e.to_string(),
                }),
            }
        }
    }

    report
}

/// Make the provider match `desired`: create, update and delete
///
/// Failures are collected per record and never abort the remaining work.
pub async fn apply_to_remote(
    provider: &dyn DnsProvider,
    domain: &str,
    desired: &[RecordSpec],
    remote: &[ProviderRecord],
) -> ApplyReport {
    let diff = compare(desired, remote);
    execute(provider, domain, &diff, true).await
}

/// Read the provider's current record set
pub async fn import_from_remote(
    provider: &dyn DnsProvider,
    domain: &str,
) -> Result<Vec<ProviderRecord>> {
    provider.list_records(domain).await
}

/// One key of a domain comparison
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordComparison {
    pub key: RecordKey,
    pub local: Option<DesiredRecord>,
    pub remote: Option<ProviderRecord>,
    pub status: SyncStatus,
}

/// Read-only comparison of a domain's desired and remote state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainComparison {
    pub domain: Domain,
    pub diff: RecordDiff,
    pub records: Vec<RecordComparison>,
}

/// Store-aware reconciliation service
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn StateStore>,
    providers: ProviderSet,
}

impl Reconciler {
    pub fn new(store: Arc<dyn StateStore>, providers: ProviderSet) -> Self {
        Self { store, providers }
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    pub fn providers(&self) -> &ProviderSet {
        &self.providers
    }

    async fn context(&self, domain_id: DomainId) -> Result<(Domain, Arc<dyn DnsProvider>)> {
        let domain = self
            .store
            .get_domain(domain_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("domain {domain_id}")))?;
        let provider = self.providers.get(&domain.provider_account)?;
        Ok((domain, provider))
    }

    /// Compare without writing anything
    pub async fn compare_domain(&self, domain_id: DomainId) -> Result<DomainComparison> {
        let (domain, provider) = self.context(domain_id).await?;
        let desired = self.store.list_records(domain_id).await?;
        let remote = import_from_remote(provider.as_ref(), &domain.name).await?;

        let specs: Vec<RecordSpec> = desired.iter().map(|r| r.spec.clone()).collect();
        let diff = compare(&specs, &remote);

        let remote_by_key: HashMap<RecordKey, &ProviderRecord> =
            remote.iter().rev().map(|r| (r.key(), r)).collect();
        let mut records: Vec<RecordComparison> = desired
            .iter()
            .map(|local| {
                let key = local.key();
                RecordComparison {
                    status: diff.status_of(&key).unwrap_or(local.sync_status),
                    remote: remote_by_key.get(&key).map(|r| (*r).clone()),
                    local: Some(local.clone()),
                    key,
                }
            })
            .collect();
        records.extend(diff.deleted.iter().map(|remote| RecordComparison {
            key: remote.key(),
            local: None,
            remote: Some(remote.clone()),
            status: SyncStatus::RemoteOnly,
        }));

        Ok(DomainComparison {
            domain,
            diff,
            records,
        })
    }

    /// Full convergence: create, update and delete, then mark statuses
    pub async fn sync_domain(&self, domain_id: DomainId) -> Result<ApplyReport> {
        let (domain, provider) = self.context(domain_id).await?;
        let desired = self.store.list_records(domain_id).await?;
        let remote = import_from_remote(provider.as_ref(), &domain.name).await?;

        let specs: Vec<RecordSpec> = desired.iter().map(|r| r.spec.clone()).collect();
        let diff = compare(&specs, &remote);
        let report = execute(provider.as_ref(), &domain.name, &diff, true).await;

        self.record_outcome(&desired, &diff.matched, &report).await?;

        // A full sync removes every remote-only record, retired ones included
        for retired in self.store.list_retired(domain_id).await? {
            let gone = report.deleted.iter().any(|r| r.id == retired.remote_id)
                || !remote.iter().any(|r| r.id == retired.remote_id);
            if gone {
                self.store.clear_retired(retired.id).await?;
            }
        }

        tracing::info!(
            domain = %domain.name,
            created = report.created.len(),
            updated = report.updated.len(),
            deleted = report.deleted.len(),
            errors = report.errors.len(),
            "Domain synced"
        );
        Ok(report)
    }

    /// Push records marked pending or error; never deletes remote records
    pub async fn push_pending(&self, domain_id: DomainId) -> Result<ApplyReport> {
        let (domain, provider) = self.context(domain_id).await?;
        let pending: Vec<DesiredRecord> = self
            .store
            .list_records(domain_id)
            .await?
            .into_iter()
            .filter(|r| r.sync_status.needs_push())
            .collect();

        if pending.is_empty() {
            return Ok(ApplyReport::default());
        }

        let remote = import_from_remote(provider.as_ref(), &domain.name).await?;
        let specs: Vec<RecordSpec> = pending.iter().map(|r| r.spec.clone()).collect();
        let diff = compare(&specs, &remote);
        let report = execute(provider.as_ref(), &domain.name, &diff, false).await;

        self.record_outcome(&pending, &diff.matched, &report).await?;

        if report.is_in_sync() {
            tracing::debug!(
                domain = %domain.name,
                pushed = report.changes(),
                "Pending records pushed"
            );
        } else {
            tracing::warn!(
                domain = %domain.name,
                pushed = report.changes(),
                errors = report.errors.len(),
                "Some pending records could not be pushed"
            );
        }
        Ok(report)
    }

    /// Delete provider copies of records a rotation replaced
    ///
    /// Only records the store has retired are touched; a record already
    /// gone at the provider counts as deleted. Returns how many were removed.
    pub async fn purge_retired(&self, domain_id: DomainId) -> Result<usize> {
        let retired = self.store.list_retired(domain_id).await?;
        if retired.is_empty() {
            return Ok(0);
        }

        let (domain, provider) = self.context(domain_id).await?;
        let mut purged = 0;
        for record in retired {
            match provider.delete_record(&domain.name, &record.remote_id).await {
                Ok(()) | Err(Error::NotFound(_)) => {
                    self.store.clear_retired(record.id).await?;
                    purged += 1;
                    tracing::info!(
                        domain = %domain.name,
                        record = %record.key,
                        "Retired record removed from provider"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        domain = %domain.name,
                        record = %record.key,
                        error = %e,
                        "Failed to remove retired record, will retry"
                    );
                }
            }
        }
        Ok(purged)
    }

    /// Adopt the provider's records as desired state
    pub async fn import_domain(&self, domain_id: DomainId) -> Result<Vec<DesiredRecord>> {
        let (domain, provider) = self.context(domain_id).await?;
        let remote = import_from_remote(provider.as_ref(), &domain.name).await?;
        let now = Utc::now();

        let mut seen = HashSet::new();
        let mut imported = Vec::with_capacity(remote.len());
        for record in &remote {
            if !seen.insert(record.key()) {
                tracing::warn!(
                    domain = %domain.name,
                    record = %record.key(),
                    "Skipping additional record with the same name and type"
                );
                continue;
            }
            imported.push(self.store.import_record(domain_id, record, now).await?);
        }

        tracing::info!(domain = %domain.name, imported = imported.len(), "Domain imported");
        Ok(imported)
    }

    async fn record_outcome(
        &self,
        desired: &[DesiredRecord],
        matched: &[ProviderRecord],
        report: &ApplyReport,
    ) -> Result<()> {
        let by_key: HashMap<RecordKey, &DesiredRecord> =
            desired.iter().map(|r| (r.key(), r)).collect();
        let now = Utc::now();

        let synced = report
            .created
            .iter()
            .chain(report.updated.iter())
            .chain(matched.iter());
        for remote in synced {
            if let Some(local) = by_key.get(&remote.key()) {
                let marked = self
                    .store
                    .mark_synced(local.id, &local.spec, &remote.id, now)
                    .await;
                if !tolerate_missing(marked)?.unwrap_or(true) {
                    tracing::debug!(
                        record = %local.key(),
                        "Record changed while its push was in flight; left pending"
                    );
                }
            }
        }

        for error in &report.errors {
            if error.action == ApplyAction::Delete {
                continue;
            }
            if let Some(local) = by_key.get(&error.key) {
                let marked = self
                    .store
                    .mark_sync_error(local.id, &local.spec, &error.message)
                    .await;
                tolerate_missing(marked)?;
            }
        }
        Ok(())
    }
}

/// A record deleted while its push was in flight is not an error
fn tolerate_missing<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(Error::NotFound(what)) => {
            tracing::debug!(%what, "Record vanished during reconcile");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
