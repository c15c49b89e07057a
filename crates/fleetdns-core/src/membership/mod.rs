//! Fleet membership resolution
//!
//! Turns a pool's explicit members and group references into the ordered
//! list of machines a rotation may pick from. Resolution always goes to the
//! fleet registries, so group changes and heartbeats are seen on the very
//! next decision.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::Result;
use crate::model::{GroupId, MachineId, PoolMember, RotationPool};
use crate::traits::{GroupRegistry, Machine, MachineRegistry};

/// Where a candidate came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "group_id", rename_all = "snake_case")]
pub enum MemberSource {
    Explicit,
    Group(GroupId),
}

/// A resolved machine with its health annotation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub machine: Machine,
    pub source: MemberSource,
    pub online: bool,
}

/// Result of resolving a pool's membership
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolvedMembership {
    /// Every resolved machine, in selection order
    pub candidates: Vec<Candidate>,
    /// The list selection draws from
    pub eligible: Vec<Machine>,
    /// Health filtering removed everyone, so all candidates are eligible
    pub fell_back: bool,
}

impl ResolvedMembership {
    pub fn is_empty(&self) -> bool {
        self.eligible.is_empty()
    }

    /// Position of a machine in the eligible list
    pub fn position(&self, machine_id: MachineId) -> Option<usize> {
        self.eligible.iter().position(|m| m.id == machine_id)
    }
}

/// Resolves pool membership against the fleet registries
#[derive(Clone)]
pub struct MembershipResolver {
    machines: Arc<dyn MachineRegistry>,
    groups: Arc<dyn GroupRegistry>,
    freshness: chrono::Duration,
}

impl MembershipResolver {
    pub fn new(
        machines: Arc<dyn MachineRegistry>,
        groups: Arc<dyn GroupRegistry>,
        freshness: chrono::Duration,
    ) -> Self {
        Self {
            machines,
            groups,
            freshness,
        }
    }

    /// Resolve the pool's membership as of `now`
    ///
    /// `members` must be the pool's explicit members; disabled entries are
    /// ignored here. Unknown machines, machines without an address and
    /// failing group lookups are skipped with a warning.
    pub async fn resolve(
        &self,
        pool: &RotationPool,
        members: &[PoolMember],
        now: DateTime<Utc>,
    ) -> Result<ResolvedMembership> {
        let mut explicit: Vec<&PoolMember> = members.iter().filter(|m| m.enabled).collect();
        explicit.sort_by_key(|m| (m.priority, m.id));

        let mut ordered: Vec<(MachineId, MemberSource)> = explicit
            .iter()
            .map(|m| (m.machine_id, MemberSource::Explicit))
            .collect();

        for group_id in &pool.settings.group_ids {
            match self.groups.group_members(*group_id).await {
                Ok(mut ids) => {
                    ids.sort_unstable();
                    ordered.extend(ids.into_iter().map(|id| (id, MemberSource::Group(*group_id))));
                }
                Err(e) => {
                    tracing::warn!(
                        pool_id = pool.id,
                        group_id = *group_id,
                        error = %e,
                        "Skipping group that could not be resolved"
                    );
                }
            }
        }

        let mut seen = HashSet::new();
        let mut candidates = Vec::with_capacity(ordered.len());
        for (machine_id, source) in ordered {
            if !seen.insert(machine_id) {
                continue;
            }

            let machine = match self.machines.machine(machine_id).await {
                Ok(Some(machine)) => machine,
                Ok(None) => {
                    tracing::warn!(pool_id = pool.id, machine_id, "Skipping unknown machine");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(
                        pool_id = pool.id,
                        machine_id,
                        error = %e,
                        "Skipping machine that could not be looked up"
                    );
                    continue;
                }
            };

            if machine.address.trim().is_empty() {
                tracing::warn!(pool_id = pool.id, machine_id, "Skipping machine without an address");
                continue;
            }

            let online = machine.is_fresh(now, self.freshness);
            candidates.push(Candidate {
                machine,
                source,
                online,
            });
        }

        let all: Vec<Machine> = candidates.iter().map(|c| c.machine.clone()).collect();
        let (eligible, fell_back) = if pool.settings.health_check {
            let healthy: Vec<Machine> = candidates
                .iter()
                .filter(|c| c.online)
                .map(|c| c.machine.clone())
                .collect();
            if healthy.is_empty() && !all.is_empty() {
                tracing::warn!(
                    pool_id = pool.id,
                    candidates = all.len(),
                    "No healthy members; falling back to all candidates"
                );
                (all, true)
            } else {
                (healthy, false)
            }
        } else {
            (all, false)
        };

        Ok(ResolvedMembership {
            candidates,
            eligible,
            fell_back,
        })
    }
}
