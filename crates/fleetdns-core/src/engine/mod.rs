//! Rotation engine
//!
//! The RotationEngine is responsible for:
//! - Deciding, on every tick, which pools are due
//! - Resolving each pool's current membership
//! - Selecting the next target and committing the rotation
//! - Handing affected domains to the reconcile worker
//!
//! ## Architecture
//!
//! ```text
//!   interval tick ──┐        manual rotate ──┐
//!                   ▼                        │
//!            ┌─────────────┐                 │
//!            │  due check  │                 │
//!            └─────────────┘                 │
//!                   │                        │
//!                   ▼                        ▼
//!            ┌──────────────────────────────────┐
//!            │ resolve → select → commit (CAS)  │
//!            └──────────────────────────────────┘
//!                   │                        │
//!         ┌─────────┴──────────┐             │
//!         ▼                    ▼             ▼
//! ┌──────────────┐     ┌───────────────┐  ┌────────┐
//! │  StateStore  │     │ReconcileHandle│  │ Events │
//! │ (records,    │     │ (push queue)  │  │        │
//! │  history)    │     └───────────────┘  └────────┘
//! └──────────────┘
//! ```
//!
//! ## Decision Flow
//!
//! 1. Skip paused pools
//! 2. Check whether the pool is due (or its current target went offline)
//! 3. Resolve membership; an empty list fails with `NoEligibleMembers`
//! 4. Select the next index by strategy
//! 5. Same target with its records already in place: stamp `last_rotated_at` only
//! 6. Otherwise: commit record writes, pool update and history at once
//! 7. Queue the domain for a provider push

pub mod schedule;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::error::{Error, Result};
use crate::membership::MembershipResolver;
use crate::model::{
    DomainId, MachineId, NewHistory, PoolBinding, PoolId, RecordId, RecordKey, RecordSpec,
    RecordType, RotationHistory, RotationPool, RotationTrigger, APEX, WILDCARD,
};
use crate::reconcile::ReconcileHandle;
use crate::traits::{Machine, RecordWrite, RotationCommit, StateStore};

/// Events emitted by the RotationEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Engine started
    Started { pools: usize },

    /// A pool moved to a new target
    Rotated {
        pool_id: PoolId,
        from_machine_id: Option<MachineId>,
        to_machine_id: MachineId,
        to_address: String,
        trigger: RotationTrigger,
    },

    /// A pool was due but kept its target
    Unchanged { pool_id: PoolId },

    /// A rotation attempt failed
    RotationFailed { pool_id: PoolId, error: String },

    /// A tick finished
    TickCompleted { report: TickReport },

    /// Engine stopped
    Stopped { reason: String },
}

/// What a single rotation attempt did
#[derive(Debug, Clone)]
pub enum RotationOutcome {
    /// New target written and logged
    Rotated {
        pool: RotationPool,
        history: RotationHistory,
    },
    /// Selection landed on the current target; only the timestamp moved
    Unchanged { pool: RotationPool },
}

impl RotationOutcome {
    pub fn pool(&self) -> &RotationPool {
        match self {
            RotationOutcome::Rotated { pool, .. } | RotationOutcome::Unchanged { pool } => pool,
        }
    }

    pub fn is_rotated(&self) -> bool {
        matches!(self, RotationOutcome::Rotated { .. })
    }
}

/// Per-tick counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub evaluated: usize,
    pub rotated: usize,
    pub unchanged: usize,
    pub not_due: usize,
    pub paused: usize,
    pub failed: usize,
}

/// Fleet rotation engine
///
/// ## Lifecycle
///
/// 1. Create with [`RotationEngine::new()`]
/// 2. Optionally attach a reconcile queue with [`RotationEngine::with_reconcile()`]
/// 3. Start with [`RotationEngine::run()`]
/// 4. Engine runs until shutdown signal received
///
/// ## Concurrency
///
/// Pools are processed sequentially within a tick. Manual rotations may run
/// concurrently with a tick; the store's version check makes the loser of a
/// race fail with `RaceCondition` instead of overwriting the winner.
pub struct RotationEngine {
    store: Arc<dyn StateStore>,
    resolver: MembershipResolver,
    reconcile: Option<ReconcileHandle>,
    tick_interval: Duration,
    debounce: chrono::Duration,
    default_ttl: u32,
    event_tx: mpsc::Sender<EngineEvent>,
}

impl RotationEngine {
    /// Create a new rotation engine
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        store: Arc<dyn StateStore>,
        resolver: MembershipResolver,
        config: &SchedulerConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let engine = Self {
            store,
            resolver,
            reconcile: None,
            tick_interval: config.tick_interval(),
            debounce: config.schedule_debounce(),
            default_ttl: config.default_ttl,
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Queue affected domains for an immediate push after each rotation
    pub fn with_reconcile(mut self, handle: ReconcileHandle) -> Self {
        self.reconcile = Some(handle);
        self
    }

    /// Override the tick period
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    pub fn resolver(&self) -> &MembershipResolver {
        &self.resolver
    }

    /// Run the engine until SIGINT
    pub async fn run(&self) -> Result<()> {
        self.run_internal(None).await
    }

    /// Run the engine until `shutdown_rx` fires
    ///
    /// With `None` this behaves like [`RotationEngine::run()`]. Embedders
    /// that manage their own signals pass a receiver.
    pub async fn run_with_shutdown(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        self.run_internal(shutdown_rx).await
    }

    async fn run_internal(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        let pools = self.store.list_pools().await?.len();
        info!(
            pools,
            tick_secs = self.tick_interval.as_secs(),
            "Rotation engine started"
        );
        self.emit_event(EngineEvent::Started { pools });

        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let shutdown = async move {
            match shutdown_rx {
                Some(rx) => {
                    let _ = rx.await;
                }
                None => {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!("Failed to listen for shutdown signal: {}", e);
                    }
                }
            }
        };
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.tick().await {
                        Ok(report) => {
                            debug!(?report, "Tick completed");
                            self.emit_event(EngineEvent::TickCompleted { report });
                        }
                        Err(e) => error!("Tick failed: {}", e),
                    }
                }

                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    self.emit_event(EngineEvent::Stopped {
                        reason: "Shutdown signal".to_string(),
                    });
                    break;
                }
            }
        }

        // Flush state before exiting
        self.store.flush().await?;
        info!("State flushed, engine stopped");

        Ok(())
    }

    /// Evaluate every pool once against the current time
    pub async fn tick(&self) -> Result<TickReport> {
        self.tick_at(Utc::now()).await
    }

    /// Evaluate every pool once against `now`
    ///
    /// A failure on one pool is logged, recorded on the pool and counted; it
    /// never stops the remaining pools.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> Result<TickReport> {
        let mut report = TickReport::default();

        for pool in self.store.list_pools().await? {
            report.evaluated += 1;

            if pool.paused {
                report.paused += 1;
                continue;
            }

            let trigger = if schedule::is_due(&pool, now, self.debounce) {
                RotationTrigger::Scheduled
            } else {
                match self.current_target_offline(&pool, now).await {
                    Ok(true) => RotationTrigger::Health,
                    Ok(false) => {
                        report.not_due += 1;
                        continue;
                    }
                    Err(e) => {
                        warn!(pool_id = pool.id, error = %e, "Health check failed");
                        report.not_due += 1;
                        continue;
                    }
                }
            };

            match self.rotate_and_record(pool, trigger, now).await {
                Ok(RotationOutcome::Rotated { .. }) => report.rotated += 1,
                Ok(RotationOutcome::Unchanged { .. }) => report.unchanged += 1,
                Err(_) => report.failed += 1,
            }
        }

        Ok(report)
    }

    /// Rotate a pool now, regardless of schedule or pause state
    pub async fn manual_rotate(&self, pool_id: PoolId) -> Result<RotationOutcome> {
        let pool = self
            .store
            .get_pool(pool_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("pool {pool_id}")))?;
        self.rotate_and_record(pool, RotationTrigger::Manual, Utc::now())
            .await
    }

    /// Stop scheduled rotations for a pool; DNS is left as is
    pub async fn pause(&self, pool_id: PoolId) -> Result<RotationPool> {
        let pool = self.store.set_paused(pool_id, true).await?;
        info!(pool_id, "Pool paused");
        Ok(pool)
    }

    pub async fn resume(&self, pool_id: PoolId) -> Result<RotationPool> {
        let pool = self.store.set_paused(pool_id, false).await?;
        info!(pool_id, "Pool resumed");
        Ok(pool)
    }

    /// Whether a health-checked pool's current target has dropped out
    ///
    /// Only a definite answer counts: no current target, an empty
    /// membership, or a health fallback all yield `false`.
    async fn current_target_offline(&self, pool: &RotationPool, now: DateTime<Utc>) -> Result<bool> {
        let Some(current) = pool.current_machine_id else {
            return Ok(false);
        };
        if !pool.settings.health_check {
            return Ok(false);
        }

        let members = self.store.list_members(pool.id).await?;
        let resolved = self.resolver.resolve(pool, &members, now).await?;
        Ok(!resolved.fell_back && !resolved.is_empty() && resolved.position(current).is_none())
    }

    /// Run a rotation and keep the pool's error indicator in step
    async fn rotate_and_record(
        &self,
        pool: RotationPool,
        trigger: RotationTrigger,
        now: DateTime<Utc>,
    ) -> Result<RotationOutcome> {
        let pool_id = pool.id;
        match self.rotate(pool, trigger, now).await {
            Ok(outcome) => Ok(outcome),
            Err(Error::RaceCondition(id)) => {
                warn!(pool_id = id, %trigger, "Pool changed during rotation; will retry");
                Err(Error::RaceCondition(id))
            }
            Err(e) => {
                error!(pool_id, %trigger, error = %e, "Rotation failed");
                if let Err(store_err) = self.store.set_pool_error(pool_id, Some(e.to_string())).await {
                    warn!(pool_id, error = %store_err, "Could not record pool error");
                }
                self.emit_event(EngineEvent::RotationFailed {
                    pool_id,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Resolve, select and commit
    ///
    /// The single decision path shared by ticks and manual triggers.
    async fn rotate(
        &self,
        pool: RotationPool,
        trigger: RotationTrigger,
        now: DateTime<Utc>,
    ) -> Result<RotationOutcome> {
        let members = self.store.list_members(pool.id).await?;
        let resolved = self.resolver.resolve(&pool, &members, now).await?;
        if resolved.is_empty() {
            return Err(Error::NoEligibleMembers(pool.id));
        }

        let index = schedule::select_index(&pool, resolved.eligible.len());
        let target = &resolved.eligible[index];

        let plan = self.plan_writes(&pool, target).await?;

        // A binding change (e.g. an added apex) still needs its records written
        let same_target = pool.current_machine_id == Some(target.id)
            && pool.current_address.as_deref() == Some(target.address.as_str())
            && self.already_written(&plan).await?;
        if same_target {
            let pool = self
                .store
                .stamp_rotation(pool.id, pool.version, index, now)
                .await?;
            debug!(pool_id = pool.id, machine_id = target.id, "Target unchanged");
            self.emit_event(EngineEvent::Unchanged { pool_id: pool.id });
            return Ok(RotationOutcome::Unchanged { pool });
        }

        let commit = RotationCommit {
            pool_id: pool.id,
            expected_version: pool.version,
            machine_id: target.id,
            address: target.address.clone(),
            index,
            at: now,
            writes: plan.writes,
            history: NewHistory {
                pool_kind: pool.kind(),
                pool_id: pool.id,
                domain: Some(plan.domain_name),
                record: Some(plan.record_name),
                from_machine_id: pool.current_machine_id,
                from_address: pool.current_address.clone(),
                to_machine_id: target.id,
                to_address: target.address.clone(),
                trigger,
                created_at: now,
            },
        };

        let committed = self.store.commit_rotation(commit).await?;

        info!(
            pool_id = pool.id,
            %trigger,
            from = pool.current_address.as_deref().unwrap_or("-"),
            to = %target.address,
            records = committed.records.len(),
            "Pool rotated"
        );
        self.emit_event(EngineEvent::Rotated {
            pool_id: pool.id,
            from_machine_id: pool.current_machine_id,
            to_machine_id: target.id,
            to_address: target.address.clone(),
            trigger,
        });

        if let Some(handle) = &self.reconcile {
            handle.enqueue(plan.domain_id);
        }

        Ok(RotationOutcome::Rotated {
            pool: committed.pool,
            history: committed.history,
        })
    }

    /// Whether the store already holds every value a plan would write
    async fn already_written(&self, plan: &WritePlan) -> Result<bool> {
        for write in &plan.writes {
            let written = match write {
                RecordWrite::Existing { record_id, value } => self
                    .store
                    .get_record(*record_id)
                    .await?
                    .is_some_and(|r| r.spec.value == *value),
                RecordWrite::Upsert { domain_id, spec } => self
                    .store
                    .find_record(*domain_id, &spec.key())
                    .await?
                    .is_some_and(|r| r.spec.value == spec.value),
                RecordWrite::Retire { .. } => false,
            };
            if !written {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Record writes for moving `pool` onto `target`
    async fn plan_writes(&self, pool: &RotationPool, target: &Machine) -> Result<WritePlan> {
        match &pool.binding {
            PoolBinding::Record { record_id } => {
                let record = self
                    .store
                    .get_record(*record_id)
                    .await?
                    .ok_or_else(|| Error::not_found(format!("record {record_id}")))?;
                let domain = self
                    .store
                    .get_domain(record.domain_id)
                    .await?
                    .ok_or_else(|| Error::not_found(format!("domain {}", record.domain_id)))?;

                // The bound record keeps its type; the address must fit it
                let mut next = record.spec.clone();
                next.value = target.address.clone();
                next.validate()?;

                Ok(WritePlan {
                    domain_id: domain.id,
                    domain_name: domain.name,
                    record_name: record.spec.name,
                    writes: vec![RecordWrite::Existing {
                        record_id: *record_id,
                        value: target.address.clone(),
                    }],
                })
            }
            PoolBinding::Wildcard {
                domain_id,
                include_root,
            } => {
                let domain = self
                    .store
                    .get_domain(*domain_id)
                    .await?
                    .ok_or_else(|| Error::not_found(format!("domain {domain_id}")))?;

                let record_type = RecordType::for_address(&target.address);
                if *include_root && record_type == RecordType::Cname {
                    return Err(Error::validation(format!(
                        "machine {} has hostname address {}, which cannot be a CNAME at the apex of {}",
                        target.id, target.address, domain.name
                    )));
                }

                let mut names = vec![WILDCARD];
                if *include_root {
                    names.push(APEX);
                }
                let mut writes: Vec<RecordWrite> = names
                    .iter()
                    .map(|name| RecordWrite::Upsert {
                        domain_id: *domain_id,
                        spec: RecordSpec::new(*name, record_type, target.address.clone())
                            .with_ttl(self.default_ttl),
                    })
                    .collect();

                // Records of the previous address family at the same names go away
                let bound: Vec<RecordId> = self
                    .store
                    .list_pools()
                    .await?
                    .into_iter()
                    .filter_map(|p| match p.binding {
                        PoolBinding::Record { record_id } => Some(record_id),
                        PoolBinding::Wildcard { .. } => None,
                    })
                    .collect();
                for name in &names {
                    for other in ADDRESS_TYPES {
                        if other == record_type {
                            continue;
                        }
                        let key = RecordKey {
                            name: name.to_string(),
                            record_type: other,
                        };
                        let stale = self.store.find_record(*domain_id, &key).await?;
                        if let Some(stale) = stale.filter(|r| !bound.contains(&r.id)) {
                            writes.push(RecordWrite::Retire {
                                record_id: stale.id,
                            });
                        }
                    }
                }

                Ok(WritePlan {
                    domain_id: *domain_id,
                    domain_name: domain.name,
                    record_name: WILDCARD.to_string(),
                    writes,
                })
            }
        }
    }

    /// Emit an engine event
    fn emit_event(&self, event: EngineEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                // Slow observers lose events; the engine never blocks on them
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

/// Types a wildcard rotation may write
const ADDRESS_TYPES: [RecordType; 3] = [RecordType::A, RecordType::Aaaa, RecordType::Cname];

struct WritePlan {
    domain_id: DomainId,
    domain_name: String,
    record_name: String,
    writes: Vec<RecordWrite>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_event_equality() {
        let event = EngineEvent::Rotated {
            pool_id: 1,
            from_machine_id: None,
            to_machine_id: 2,
            to_address: "10.0.0.2".to_string(),
            trigger: RotationTrigger::Manual,
        };
        assert_eq!(event.clone(), event);
    }

    #[test]
    fn test_outcome_accessors() {
        let pool = RotationPool::new(
            PoolBinding::Record { record_id: 1 },
            crate::model::PoolSettings::default(),
        );
        let outcome = RotationOutcome::Unchanged { pool: pool.clone() };
        assert!(!outcome.is_rotated());
        assert_eq!(outcome.pool(), &pool);
    }
}
