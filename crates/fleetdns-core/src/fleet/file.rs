//! Fleet view backed by a JSON snapshot file
//!
//! The file is read on every lookup. Whatever process ingests heartbeats can
//! rewrite it at any time and the next rotation decision sees the change.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

use super::FleetSnapshot;
use crate::error::{Error, Result};
use crate::model::{GroupId, MachineId};
use crate::traits::{GroupRegistry, Machine, MachineRegistry};

#[derive(Debug, Clone)]
pub struct FileFleet {
    path: PathBuf,
}

impl FileFleet {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    async fn snapshot(&self) -> Result<FleetSnapshot> {
        let content = fs::read_to_string(&self.path).await.map_err(|e| {
            Error::Other(format!(
                "Failed to read fleet snapshot {}: {}",
                self.path.display(),
                e
            ))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            Error::Other(format!(
                "Failed to parse fleet snapshot {}: {}",
                self.path.display(),
                e
            ))
        })
    }
}

#[async_trait]
impl MachineRegistry for FileFleet {
    async fn machine(&self, id: MachineId) -> Result<Option<Machine>> {
        Ok(self
            .snapshot()
            .await?
            .machines
            .into_iter()
            .find(|m| m.id == id))
    }
}

#[async_trait]
impl GroupRegistry for FileFleet {
    async fn group_members(&self, id: GroupId) -> Result<Vec<MachineId>> {
        self.snapshot()
            .await?
            .groups
            .into_iter()
            .find(|g| g.id == id)
            .map(|g| g.machine_ids)
            .ok_or_else(|| Error::not_found(format!("group {id}")))
    }
}
