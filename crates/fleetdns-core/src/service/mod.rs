//! Control plane API
//!
//! The operator-facing surface: domain and record management, pool
//! configuration, manual rotation, reconciliation and delegation checks.
//! Front ends (HTTP, CLI) sit on top of [`ControlPlane`] and add nothing
//! but transport.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::DomainConfig;
use crate::engine::{RotationEngine, RotationOutcome};
use crate::error::{Error, Result};
use crate::membership::ResolvedMembership;
use crate::model::{
    DesiredRecord, Domain, DomainId, GroupId, MemberInput, PoolBinding, PoolId, PoolKind,
    PoolMember, PoolSettings, RecordId, RecordKey, RecordSpec, RotationHistory, RotationMode,
    RotationPool, RotationStrategy, normalize_name, parse_schedule_time,
};
use crate::nameserver::{NameserverReport, NameserverValidator};
use crate::reconcile::{ApplyReport, DomainComparison, Reconciler};
use crate::traits::StateStore;

/// Settings shared by both pool request kinds
///
/// Strategy, mode and schedule arrive as strings and are parsed here so
/// that every front end gets the same validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolRequest {
    #[serde(default)]
    pub target_address: Option<String>,
    #[serde(default)]
    pub target_port: Option<u16>,
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// `HH:MM` entries, UTC
    #[serde(default)]
    pub schedule: Vec<String>,
    #[serde(default)]
    pub health_check: bool,
    #[serde(default)]
    pub members: Vec<MemberInput>,
    #[serde(default)]
    pub group_ids: Vec<GroupId>,
}

impl Default for PoolRequest {
    fn default() -> Self {
        Self {
            target_address: None,
            target_port: None,
            strategy: default_strategy(),
            mode: default_mode(),
            interval_secs: default_interval_secs(),
            schedule: Vec::new(),
            health_check: false,
            members: Vec::new(),
            group_ids: Vec::new(),
        }
    }
}

impl PoolRequest {
    /// Parse and validate into store settings
    pub fn settings(&self) -> Result<PoolSettings> {
        let strategy: RotationStrategy = self.strategy.parse()?;
        let mode: RotationMode = self.mode.parse()?;
        let schedule = self
            .schedule
            .iter()
            .map(|s| parse_schedule_time(s))
            .collect::<Result<Vec<_>>>()?;

        if self.members.is_empty() && self.group_ids.is_empty() {
            return Err(Error::validation(
                "pool needs at least one member or group",
            ));
        }

        let settings = PoolSettings {
            target_address: self.target_address.clone(),
            target_port: self.target_port,
            strategy,
            mode,
            interval_secs: self.interval_secs,
            schedule,
            health_check: self.health_check,
            group_ids: self.group_ids.clone(),
        };
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordPoolRequest {
    pub record_id: RecordId,
    #[serde(flatten)]
    pub pool: PoolRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WildcardPoolRequest {
    pub domain_id: DomainId,
    #[serde(default)]
    pub include_root: bool,
    #[serde(flatten)]
    pub pool: PoolRequest,
}

/// A pool with its explicit members and live membership
#[derive(Debug, Clone, Serialize)]
pub struct PoolView {
    pub pool: RotationPool,
    pub members: Vec<PoolMember>,
    pub membership: ResolvedMembership,
}

/// Library-level API over the store, engine and reconciler
#[derive(Clone)]
pub struct ControlPlane {
    store: Arc<dyn StateStore>,
    engine: Arc<RotationEngine>,
    reconciler: Arc<Reconciler>,
    nameservers: NameserverValidator,
}

impl ControlPlane {
    pub fn new(
        engine: Arc<RotationEngine>,
        reconciler: Arc<Reconciler>,
        nameservers: NameserverValidator,
    ) -> Self {
        Self {
            store: Arc::clone(engine.store()),
            engine,
            reconciler,
            nameservers,
        }
    }

    pub fn engine(&self) -> &Arc<RotationEngine> {
        &self.engine
    }

    // Domains and records

    /// Register a zone served by a configured provider account
    pub async fn register_domain(&self, name: &str, provider_account: &str) -> Result<Domain> {
        if self.reconciler.providers().get(provider_account).is_err() {
            return Err(Error::validation(format!(
                "unknown provider account: {provider_account}"
            )));
        }
        let domain = self.store.insert_domain(name, provider_account).await?;
        tracing::info!(domain = %domain.name, account = provider_account, "Domain registered");
        Ok(domain)
    }

    /// Bring a configured domain, its records and its pools into the store
    ///
    /// Safe to repeat: existing pools are updated in place and records a
    /// pool writes to are left to the pool.
    pub async fn declare_domain(&self, config: &DomainConfig) -> Result<Domain> {
        let domain = self.register_domain(&config.name, &config.provider).await?;
        let pools = self.store.list_pools().await?;

        for spec in &config.records {
            let mut wanted = spec.clone();
            wanted.name = normalize_name(&spec.name);
            let existing = self.store.find_record(domain.id, &wanted.key()).await?;
            if let Some(existing) = existing {
                let bound = pools
                    .iter()
                    .any(|p| p.binding == PoolBinding::Record { record_id: existing.id });
                if bound || existing.spec == wanted {
                    continue;
                }
            }
            self.upsert_record(domain.id, wanted).await?;
        }

        for declared in &config.record_pools {
            let key = RecordKey {
                name: normalize_name(&declared.record),
                record_type: declared.record_type,
            };
            let record = self
                .store
                .find_record(domain.id, &key)
                .await?
                .ok_or_else(|| {
                    Error::validation(format!(
                        "pool in {} references undeclared record {key}",
                        domain.name
                    ))
                })?;
            let req = RecordPoolRequest {
                record_id: record.id,
                pool: declared.pool.clone(),
            };
            let binding = PoolBinding::Record { record_id: record.id };
            match pools.iter().find(|p| p.binding == binding) {
                Some(pool) => self.update_record_pool(pool.id, req).await?,
                None => self.create_record_pool(req).await?,
            };
        }

        if let Some(declared) = &config.wildcard_pool {
            let req = WildcardPoolRequest {
                domain_id: domain.id,
                include_root: declared.include_root,
                pool: declared.pool.clone(),
            };
            let existing = pools.iter().find(|p| {
                matches!(p.binding, PoolBinding::Wildcard { domain_id, .. } if domain_id == domain.id)
            });
            match existing {
                Some(pool) => self.update_wildcard_pool(pool.id, req).await?,
                None => self.create_wildcard_pool(req).await?,
            };
        }

        Ok(domain)
    }

    pub async fn list_domains(&self) -> Result<Vec<Domain>> {
        self.store.list_domains().await
    }

    /// Create or replace a desired record; it is pushed on the next pass
    pub async fn upsert_record(&self, domain_id: DomainId, spec: RecordSpec) -> Result<DesiredRecord> {
        self.store.upsert_record(domain_id, &spec).await
    }

    /// Remove a desired record locally; refused while a pool writes to it
    ///
    /// The remote copy stays until the next full apply.
    pub async fn delete_record(&self, id: RecordId) -> Result<()> {
        self.store.delete_record(id).await
    }

    pub async fn list_records(&self, domain_id: DomainId) -> Result<Vec<DesiredRecord>> {
        self.require_domain(domain_id).await?;
        self.store.list_records(domain_id).await
    }

    // Pools

    pub async fn create_record_pool(&self, req: RecordPoolRequest) -> Result<RotationPool> {
        let settings = req.pool.settings()?;
        let binding = PoolBinding::Record {
            record_id: req.record_id,
        };
        let pool = self
            .store
            .insert_pool(RotationPool::new(binding, settings), &req.pool.members)
            .await?;
        tracing::info!(pool_id = pool.id, record_id = req.record_id, "Record pool created");
        Ok(pool)
    }

    pub async fn update_record_pool(&self, id: PoolId, req: RecordPoolRequest) -> Result<RotationPool> {
        let settings = req.pool.settings()?;
        let current = self.require_pool(id, PoolKind::Record).await?;
        let binding = PoolBinding::Record {
            record_id: req.record_id,
        };
        let pool = self
            .store
            .update_pool(id, current.version, binding, settings, &req.pool.members)
            .await?;
        tracing::info!(pool_id = id, "Record pool updated");
        Ok(pool)
    }

    pub async fn create_wildcard_pool(&self, req: WildcardPoolRequest) -> Result<RotationPool> {
        let settings = req.pool.settings()?;
        let binding = PoolBinding::Wildcard {
            domain_id: req.domain_id,
            include_root: req.include_root,
        };
        let pool = self
            .store
            .insert_pool(RotationPool::new(binding, settings), &req.pool.members)
            .await?;
        tracing::info!(pool_id = pool.id, domain_id = req.domain_id, "Wildcard pool created");
        Ok(pool)
    }

    pub async fn update_wildcard_pool(
        &self,
        id: PoolId,
        req: WildcardPoolRequest,
    ) -> Result<RotationPool> {
        let settings = req.pool.settings()?;
        let current = self.require_pool(id, PoolKind::Wildcard).await?;
        let binding = PoolBinding::Wildcard {
            domain_id: req.domain_id,
            include_root: req.include_root,
        };
        let pool = self
            .store
            .update_pool(id, current.version, binding, settings, &req.pool.members)
            .await?;
        tracing::info!(pool_id = id, "Wildcard pool updated");
        Ok(pool)
    }

    /// Delete a pool and its members; history and DNS records are kept
    pub async fn delete_pool(&self, id: PoolId) -> Result<()> {
        self.store.delete_pool(id).await?;
        tracing::info!(pool_id = id, "Pool deleted");
        Ok(())
    }

    /// Pool plus its membership as the next rotation would see it
    pub async fn get_pool(&self, id: PoolId) -> Result<PoolView> {
        let pool = self
            .store
            .get_pool(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("pool {id}")))?;
        let members = self.store.list_members(id).await?;
        let membership = self
            .engine
            .resolver()
            .resolve(&pool, &members, Utc::now())
            .await?;
        Ok(PoolView {
            pool,
            members,
            membership,
        })
    }

    pub async fn list_pools(&self) -> Result<Vec<RotationPool>> {
        self.store.list_pools().await
    }

    /// Rotate now, skipping the due check
    pub async fn rotate_pool(&self, id: PoolId) -> Result<RotationOutcome> {
        self.engine.manual_rotate(id).await
    }

    pub async fn pause_pool(&self, id: PoolId) -> Result<RotationPool> {
        self.engine.pause(id).await
    }

    pub async fn resume_pool(&self, id: PoolId) -> Result<RotationPool> {
        self.engine.resume(id).await
    }

    /// Rotation log, newest first
    pub async fn pool_history(&self, id: PoolId, limit: usize) -> Result<Vec<RotationHistory>> {
        self.store.list_history(id, limit).await
    }

    // Reconciliation

    pub async fn compare_domain(&self, id: DomainId) -> Result<DomainComparison> {
        self.reconciler.compare_domain(id).await
    }

    /// Converge the provider onto the desired set, deleting extras
    pub async fn apply_domain(&self, id: DomainId) -> Result<ApplyReport> {
        self.reconciler.sync_domain(id).await
    }

    /// Adopt the provider's records as the desired set
    pub async fn import_domain(&self, id: DomainId) -> Result<Vec<DesiredRecord>> {
        self.reconciler.import_domain(id).await
    }

    /// Delegation check against the domain's provider account
    pub async fn check_nameservers(&self, id: DomainId) -> Result<NameserverReport> {
        let domain = self.require_domain(id).await?;
        let provider = self.reconciler.providers().get(&domain.provider_account)?;
        Ok(self.nameservers.check(&domain.name, provider.as_ref()).await)
    }

    async fn require_domain(&self, id: DomainId) -> Result<Domain> {
        self.store
            .get_domain(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("domain {id}")))
    }

    async fn require_pool(&self, id: PoolId, kind: PoolKind) -> Result<RotationPool> {
        let pool = self
            .store
            .get_pool(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("pool {id}")))?;
        if pool.kind() != kind {
            return Err(Error::validation(format!(
                "pool {id} is a {} pool, not a {kind} pool",
                pool.kind()
            )));
        }
        Ok(pool)
    }
}

fn default_strategy() -> String {
    "round_robin".to_string()
}

fn default_mode() -> String {
    "interval".to_string()
}

fn default_interval_secs() -> u64 {
    3600
}
