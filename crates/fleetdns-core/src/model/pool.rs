//! Rotation pools and their explicit members

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{DomainId, GroupId, MachineId, MemberId, PoolId, RecordId};
use crate::error::Error;

/// How the next target is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationStrategy {
    #[default]
    RoundRobin,
    Random,
}

impl FromStr for RotationStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "round_robin" | "round-robin" => Ok(RotationStrategy::RoundRobin),
            "random" => Ok(RotationStrategy::Random),
            other => Err(Error::validation(format!("unknown rotation strategy: {other}"))),
        }
    }
}

/// When a pool becomes due
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationMode {
    #[default]
    Interval,
    Scheduled,
}

impl FromStr for RotationMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "interval" => Ok(RotationMode::Interval),
            "scheduled" => Ok(RotationMode::Scheduled),
            other => Err(Error::validation(format!("unknown rotation mode: {other}"))),
        }
    }
}

/// Record pool vs wildcard pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolKind {
    Record,
    Wildcard,
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolKind::Record => f.write_str("record"),
            PoolKind::Wildcard => f.write_str("wildcard"),
        }
    }
}

/// What a pool writes to when it rotates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PoolBinding {
    /// A single desired record
    Record { record_id: RecordId },
    /// The `*` record of a domain, and `@` when `include_root` is set
    Wildcard {
        domain_id: DomainId,
        include_root: bool,
    },
}

impl PoolBinding {
    pub fn kind(&self) -> PoolKind {
        match self {
            PoolBinding::Record { .. } => PoolKind::Record,
            PoolBinding::Wildcard { .. } => PoolKind::Wildcard,
        }
    }
}

/// Operator-controlled pool settings, shared by both pool kinds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSettings {
    #[serde(default)]
    pub target_address: Option<String>,
    #[serde(default)]
    pub target_port: Option<u16>,
    #[serde(default)]
    pub strategy: RotationStrategy,
    #[serde(default)]
    pub mode: RotationMode,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Times of day (UTC) at which a scheduled pool rotates
    #[serde(default)]
    pub schedule: Vec<NaiveTime>,
    #[serde(default)]
    pub health_check: bool,
    #[serde(default)]
    pub group_ids: Vec<GroupId>,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            target_address: None,
            target_port: None,
            strategy: RotationStrategy::default(),
            mode: RotationMode::default(),
            interval_secs: default_interval_secs(),
            schedule: Vec::new(),
            health_check: false,
            group_ids: Vec::new(),
        }
    }
}

impl PoolSettings {
    /// Validate mode-specific requirements
    pub fn validate(&self) -> Result<(), Error> {
        match self.mode {
            RotationMode::Interval if self.interval_secs == 0 => {
                return Err(Error::validation("interval mode requires interval_secs > 0"));
            }
            RotationMode::Scheduled if self.schedule.is_empty() => {
                return Err(Error::validation(
                    "scheduled mode requires at least one schedule time",
                ));
            }
            _ => {}
        }
        if self.target_port == Some(0) {
            return Err(Error::validation("target port must be between 1 and 65535"));
        }
        Ok(())
    }
}

/// A named set of candidate machines plus the policy for choosing one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotationPool {
    pub id: PoolId,
    pub binding: PoolBinding,
    #[serde(flatten)]
    pub settings: PoolSettings,
    #[serde(default)]
    pub current_machine_id: Option<MachineId>,
    #[serde(default)]
    pub current_address: Option<String>,
    #[serde(default)]
    pub current_index: usize,
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub last_rotated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<String>,
    /// Bumped by every rotation or config write; guards read-decide-write
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RotationPool {
    /// Build a fresh, never-rotated pool; the store assigns `id`
    pub fn new(binding: PoolBinding, settings: PoolSettings) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            binding,
            settings,
            current_machine_id: None,
            current_address: None,
            current_index: 0,
            paused: false,
            last_rotated_at: None,
            last_error: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn kind(&self) -> PoolKind {
        self.binding.kind()
    }
}

/// Explicit pool membership entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolMember {
    /// Store-assigned; doubles as the ordering tiebreaker
    pub id: MemberId,
    pub pool_id: PoolId,
    pub machine_id: MachineId,
    pub priority: i32,
    pub enabled: bool,
}

/// Member entry as supplied by an operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInput {
    pub machine_id: MachineId,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl MemberInput {
    pub fn new(machine_id: MachineId, priority: i32) -> Self {
        Self {
            machine_id,
            priority,
            enabled: true,
        }
    }
}

/// Parse an `HH:MM` schedule entry
pub fn parse_schedule_time(value: &str) -> Result<NaiveTime, Error> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| Error::validation(format!("invalid schedule time (expected HH:MM): {value}")))
}

fn default_interval_secs() -> u64 {
    3600
}

fn default_enabled() -> bool {
    true
}
