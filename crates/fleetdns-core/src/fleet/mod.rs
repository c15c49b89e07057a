// # Fleet Registries
//
// Bundled implementations of `MachineRegistry` and `GroupRegistry`.
//
// - `StaticFleet`: in-memory and mutable, for tests and for embedding the
//   control plane next to whatever ingests heartbeats
// - `FileFleet`: a JSON snapshot maintained by an external process

pub mod file;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::error::{Error, Result};
use crate::model::{GroupId, MachineId};
use crate::traits::{Group, GroupRegistry, Machine, MachineRegistry};

pub use file::FileFleet;

/// Machines and groups as one serializable document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetSnapshot {
    #[serde(default)]
    pub machines: Vec<Machine>,
    #[serde(default)]
    pub groups: Vec<Group>,
}

/// In-memory fleet view
#[derive(Debug, Default)]
pub struct StaticFleet {
    machines: RwLock<HashMap<MachineId, Machine>>,
    groups: RwLock<HashMap<GroupId, Group>>,
}

impl StaticFleet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: FleetSnapshot) -> Self {
        let fleet = Self::new();
        for machine in snapshot.machines {
            fleet.upsert_machine(machine);
        }
        for group in snapshot.groups {
            fleet.upsert_group(group);
        }
        fleet
    }

    pub fn upsert_machine(&self, machine: Machine) {
        self.machines
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(machine.id, machine);
    }

    pub fn remove_machine(&self, id: MachineId) {
        self.machines
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    /// Record a heartbeat; unknown machines are ignored
    pub fn heartbeat(&self, id: MachineId, at: DateTime<Utc>) {
        if let Some(machine) = self
            .machines
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&id)
        {
            machine.last_heartbeat = Some(at);
        }
    }

    pub fn upsert_group(&self, group: Group) {
        self.groups
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(group.id, group);
    }

    /// Replace a group's machine list
    pub fn set_group_members(&self, id: GroupId, machine_ids: Vec<MachineId>) {
        let mut groups = self.groups.write().unwrap_or_else(PoisonError::into_inner);
        groups
            .entry(id)
            .or_insert_with(|| Group {
                id,
                name: String::new(),
                machine_ids: Vec::new(),
            })
            .machine_ids = machine_ids;
    }
}

#[async_trait]
impl MachineRegistry for StaticFleet {
    async fn machine(&self, id: MachineId) -> Result<Option<Machine>> {
        Ok(self
            .machines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned())
    }
}

#[async_trait]
impl GroupRegistry for StaticFleet {
    async fn group_members(&self, id: GroupId) -> Result<Vec<MachineId>> {
        self.groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .map(|g| g.machine_ids.clone())
            .ok_or_else(|| Error::not_found(format!("group {id}")))
    }
}
