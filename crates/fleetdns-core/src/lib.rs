// # fleetdns-core
//
// Core library for DNS reconciliation and fleet-driven record rotation.
//
// ## Architecture Overview
//
// - **DnsProvider**: Trait for reading and writing records at a DNS vendor
// - **StateStore**: Trait for persisting domains, records, pools and history
// - **MachineRegistry / GroupRegistry**: Traits for the fleet view
// - **Reconciler**: Diffs desired against remote records and converges them
// - **RotationEngine**: Periodic loop that moves pools between machines
// - **ControlPlane**: Operator API over all of the above
// - **ProviderRegistry**: Plugin-based registry for providers and stores
//
// ## Design Principles
//
// 1. **Decisions stay local**: Rotations only write desired state; provider
//    calls happen on the reconcile worker
// 2. **Plugin-Based**: Providers are registered by name, no hard-coded if-else
// 3. **Library-First**: The daemon is a thin wrapper around this crate
// 4. **Optimistic writes**: Every pool write presents the version it read

pub mod config;
pub mod engine;
pub mod error;
pub mod fleet;
pub mod membership;
pub mod model;
pub mod nameserver;
pub mod reconcile;
pub mod registry;
pub mod service;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use config::{FleetDnsConfig, ProviderConfig, StateStoreConfig};
pub use engine::{EngineEvent, RotationEngine, RotationOutcome, TickReport};
pub use error::{Error, Result};
pub use fleet::{FileFleet, StaticFleet};
pub use membership::MembershipResolver;
pub use reconcile::{Reconciler, ReconcileHandle, ReconcileWorker};
pub use registry::{ProviderRegistry, ProviderSet};
pub use service::ControlPlane;
pub use state::{FileStateStore, MemoryStateStore};
pub use traits::{DnsProvider, GroupRegistry, MachineRegistry, StateStore};
