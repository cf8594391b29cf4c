//! Whole-store snapshots as pretty JSON

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{StoreError, StoreResult};
use crate::audit::AuditRecord;
use crate::types::{Agent, SupervisionSession};

/// Serializable copy of a governance store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub taken_at: DateTime<Utc>,
    pub agents: Vec<Agent>,
    pub sessions: Vec<SupervisionSession>,
    pub audit: Vec<AuditRecord>,
}

/// Save a snapshot to a JSON file
pub fn save_snapshot(snapshot: &StoreSnapshot, path: &Path) -> StoreResult<()> {
    let json = serde_json::to_string_pretty(snapshot)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, json)?;
    Ok(())
}

/// Load a snapshot from a JSON file. `Ok(None)` if the file does not exist.
pub fn load_snapshot(path: &Path) -> StoreResult<Option<StoreSnapshot>> {
    if !path.exists() {
        return Ok(None);
    }

    let json = std::fs::read_to_string(path)?;
    let snapshot: StoreSnapshot =
        serde_json::from_str(&json).map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(Some(snapshot))
}
