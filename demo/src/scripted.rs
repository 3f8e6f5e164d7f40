//! A snapshot provider that replays a scripted sequence of snapshots.
//!
//! Perception is outside TACTUS, so the demo stands in for it with a JSON
//! file: snapshots are handed out in order and the last one repeats forever.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;

use tactus_contracts::{
    error::{TactusError, TactusResult},
    snapshot::Snapshot,
};
use tactus_core::traits::SnapshotProvider;

pub struct ScriptedSnapshots {
    state: Mutex<Script>,
}

struct Script {
    queue: VecDeque<Snapshot>,
    last: Snapshot,
}

impl ScriptedSnapshots {
    /// Returns `ConfigError` for an empty script.
    pub fn new(snapshots: Vec<Snapshot>) -> TactusResult<Self> {
        let last = snapshots.last().cloned().ok_or_else(|| TactusError::ConfigError {
            reason: "snapshot script is empty".to_string(),
        })?;
        Ok(Self {
            state: Mutex::new(Script {
                queue: snapshots.into(),
                last,
            }),
        })
    }

    pub fn from_json_str(s: &str) -> TactusResult<Self> {
        let snapshots: Vec<Snapshot> = serde_json::from_str(s).map_err(|e| TactusError::ConfigError {
            reason: format!("failed to parse snapshot script: {}", e),
        })?;
        Self::new(snapshots)
    }

    pub fn from_file(path: &Path) -> TactusResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| TactusError::ConfigError {
            reason: format!("failed to read snapshot script '{}': {}", path.display(), e),
        })?;
        Self::from_json_str(&contents)
    }
}

impl SnapshotProvider for ScriptedSnapshots {
    fn snapshot(&self) -> TactusResult<Snapshot> {
        let mut script = self.state.lock().map_err(|e| TactusError::SnapshotUnavailable {
            reason: format!("snapshot script lock poisoned: {}", e),
        })?;
        if let Some(next) = script.queue.pop_front() {
            script.last = next;
        }
        Ok(script.last.clone())
    }
}
