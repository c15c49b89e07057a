//! Data model shared by the store, the reconciler and the rotation engine

pub mod history;
pub mod pool;
pub mod record;

use serde::{Deserialize, Serialize};

pub use history::{NewHistory, RotationHistory, RotationTrigger};
pub use pool::{
    MemberInput, PoolBinding, PoolKind, PoolMember, PoolSettings, RotationMode, RotationPool,
    RotationStrategy, parse_schedule_time,
};
pub use record::{
    APEX, DesiredRecord, ProviderRecord, RecordKey, RecordSpec, RecordType, RetiredRecord,
    SyncStatus, WILDCARD, normalize_name,
};

pub type DomainId = u64;
pub type RecordId = u64;
pub type PoolId = u64;
pub type MemberId = u64;
pub type HistoryId = u64;
pub type MachineId = u64;
pub type GroupId = u64;

/// A managed zone and the provider account that serves it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    pub id: DomainId,
    /// Zone apex, lowercase, e.g. `example.com`
    pub name: String,
    /// Key into the configured provider accounts
    pub provider_account: String,
}

/// Lowercase a zone name and strip the trailing dot
pub fn normalize_domain(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}
