//! File-based persistence for the route table.
//!
//! Every committed mutation serializes the whole table to a JSON file. The
//! file is written atomically: first to a `.tmp` sibling, then renamed over
//! the final path, so a crash mid-write never corrupts the stored state.
//!
//! Unlike the request log, a failed write here fails the mutation: the
//! in-memory table is only changed once the file holds the new state.

use bridge_core::error::{BridgeError, Result};
use bridge_core::service::{Service, ServiceId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The shape serialized to / deserialized from the state file.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PersistedState {
    /// Next id to hand out; kept so ids are never reused after a restart.
    #[serde(default)]
    pub next_id: ServiceId,
    #[serde(default)]
    pub services: Vec<Service>,
}

/// Location of the route table on disk.
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `state` atomically.
    pub fn save(&self, state: &PersistedState) -> Result<()> {
        let json = serde_json::to_string_pretty(state)?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                BridgeError::Store(format!("create {}: {e}", parent.display()))
            })?;
        }

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)
            .map_err(|e| BridgeError::Store(format!("write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| BridgeError::Store(format!("rename onto {}: {e}", self.path.display())))?;

        tracing::debug!(path = %self.path.display(), services = state.services.len(), "persist: state saved");
        Ok(())
    }

    /// Load a previously saved state.
    ///
    /// * File missing   → `Ok(None)` (first run).
    /// * File malformed → `Err`, so a bad file is never silently overwritten.
    pub fn load(&self) -> Result<Option<PersistedState>> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "persist: no state file found, starting fresh");
            return Ok(None);
        }

        let data = std::fs::read_to_string(&self.path)
            .map_err(|e| BridgeError::Store(format!("read {}: {e}", self.path.display())))?;
        let state: PersistedState = serde_json::from_str(&data).map_err(|e| {
            BridgeError::Store(format!("state file {} is malformed: {e}", self.path.display()))
        })?;

        tracing::info!(
            services = state.services.len(),
            path = %self.path.display(),
            "persist: state restored from file"
        );
        Ok(Some(state))
    }

    /// Reachability check used by the health endpoint.
    pub fn check_writable(&self) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let meta = std::fs::metadata(dir)
            .map_err(|e| BridgeError::Store(format!("state dir {}: {e}", dir.display())))?;
        if meta.permissions().readonly() {
            return Err(BridgeError::Store(format!("state dir {} is read-only", dir.display())));
        }
        Ok(())
    }
}
