// # State Store Implementations
//
// This module provides implementations of the StateStore trait for
// different persistence strategies. Both share the same table logic.

pub mod file;
pub mod memory;
mod tables;

pub use file::{FileStateStore, FileStateStoreFactory};
pub use memory::{MemoryStateStore, MemoryStateStoreFactory};
