//! Core traits for the control plane
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`DnsProvider`]: Record CRUD against a DNS vendor
//! - [`MachineRegistry`] / [`GroupRegistry`]: Read-only fleet view
//! - [`StateStore`]: Persistent desired state, pools and history

pub mod dns_provider;
pub mod fleet;
pub mod state_store;

pub use dns_provider::{BoundedProvider, DnsProvider, DnsProviderFactory};
pub use fleet::{Group, GroupRegistry, Machine, MachineRegistry};
pub use state_store::{
    CommittedRotation, RecordWrite, RotationCommit, StateStore, StateStoreFactory,
};
