//! Append-only rotation log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{HistoryId, MachineId, PoolId, PoolKind};

/// Why a rotation happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationTrigger {
    Scheduled,
    Manual,
    Health,
}

impl fmt::Display for RotationTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RotationTrigger::Scheduled => f.write_str("scheduled"),
            RotationTrigger::Manual => f.write_str("manual"),
            RotationTrigger::Health => f.write_str("health"),
        }
    }
}

/// One rotation event; never mutated once written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationHistory {
    pub id: HistoryId,
    pub pool_kind: PoolKind,
    pub pool_id: PoolId,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub record: Option<String>,
    #[serde(default)]
    pub from_machine_id: Option<MachineId>,
    #[serde(default)]
    pub from_address: Option<String>,
    pub to_machine_id: MachineId,
    pub to_address: String,
    pub trigger: RotationTrigger,
    pub created_at: DateTime<Utc>,
}

/// History row before the store assigns an id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHistory {
    pub pool_kind: PoolKind,
    pub pool_id: PoolId,
    pub domain: Option<String>,
    pub record: Option<String>,
    pub from_machine_id: Option<MachineId>,
    pub from_address: Option<String>,
    pub to_machine_id: MachineId,
    pub to_address: String,
    pub trigger: RotationTrigger,
    pub created_at: DateTime<Utc>,
}

impl NewHistory {
    pub(crate) fn into_history(self, id: HistoryId) -> RotationHistory {
        RotationHistory {
            id,
            pool_kind: self.pool_kind,
            pool_id: self.pool_id,
            domain: self.domain,
            record: self.record,
            from_machine_id: self.from_machine_id,
            from_address: self.from_address,
            to_machine_id: self.to_machine_id,
            to_address: self.to_address,
            trigger: self.trigger,
            created_at: self.created_at,
        }
    }
}
