// # Fleet Collaborator Traits
//
// The control plane does not own machine enrollment or heartbeats. It reads
// them through these two narrow interfaces at decision time.
//
// ## Implementations
//
// - `fleet::StaticFleet`: in-memory, mutable (tests, embedding)
// - `fleet::FileFleet`: JSON snapshot re-read on every query (daemon)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{GroupId, MachineId};

/// A managed machine as seen by the control plane
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
    pub id: MachineId,
    #[serde(default)]
    pub name: String,
    /// Address written into DNS when this machine is selected
    pub address: String,
    #[serde(default)]
    pub last_heartbeat: Option<DateTime<Utc>>,
}

impl Machine {
    pub fn new(id: MachineId, name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            address: address.into(),
            last_heartbeat: None,
        }
    }

    pub fn with_heartbeat(mut self, at: DateTime<Utc>) -> Self {
        self.last_heartbeat = Some(at);
        self
    }

    /// Whether the last heartbeat falls inside the freshness window
    pub fn is_fresh(&self, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        self.last_heartbeat
            .is_some_and(|seen| now.signed_duration_since(seen) <= window)
    }
}

/// A named, dynamic set of machines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub machine_ids: Vec<MachineId>,
}

/// Resolves machine ids to addresses and heartbeat state
///
/// # Trust Level: Semi-Trusted
///
/// Implementations perform read-only lookups. They must not cache on behalf
/// of the caller: the membership resolver relies on every call returning the
/// current view.
#[async_trait]
pub trait MachineRegistry: Send + Sync {
    /// Look up a machine
    ///
    /// # Returns
    ///
    /// - `Ok(Some(Machine))`: The machine exists
    /// - `Ok(None)`: Unknown machine id
    /// - `Err(Error)`: The registry could not be read
    async fn machine(&self, id: MachineId) -> Result<Option<Machine>>;
}

/// Resolves group ids to their current member machine ids
#[async_trait]
pub trait GroupRegistry: Send + Sync {
    /// Current members of a group; an unknown group yields `NotFound`
    async fn group_members(&self, id: GroupId) -> Result<Vec<MachineId>>;
}
