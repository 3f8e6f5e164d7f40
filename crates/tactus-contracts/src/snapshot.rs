//! Perceived client state, produced by the external perception layer.
//!
//! A `Snapshot` is a point-in-time, read-only value. The engine compares the
//! snapshot taken before an action with the one taken after it, but never
//! writes to either.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geometry::Region;

/// Game client window state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientState {
    pub focused: bool,
    pub bounds: Region,
}

/// A UI element located by perception.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiElement {
    pub id: String,
    pub bounds: Region,
    /// Free-form state, e.g. `visible`, `occluded`, `blocked`.
    #[serde(default)]
    pub state: String,
}

impl UiElement {
    pub fn is_occluded(&self) -> bool {
        let state = self.state.to_lowercase();
        state.contains("occluded") || state.contains("blocked")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiState {
    #[serde(default = "none_string")]
    pub open_interface: String,
    #[serde(default)]
    pub hover_text: String,
    #[serde(default)]
    pub cursor_state: String,
    #[serde(default)]
    pub elements: Vec<UiElement>,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            open_interface: none_string(),
            hover_text: String::new(),
            cursor_state: String::new(),
            elements: Vec::new(),
        }
    }
}

/// Visual cues: animation, modal, and highlight state plus any other cue the
/// perception layer reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cues {
    #[serde(default = "none_string")]
    pub animation_state: String,
    #[serde(default = "none_string")]
    pub modal_state: String,
    #[serde(default = "none_string")]
    pub highlight_state: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl Default for Cues {
    fn default() -> Self {
        Self {
            animation_state: none_string(),
            modal_state: none_string(),
            highlight_state: none_string(),
            extra: BTreeMap::new(),
        }
    }
}

impl Cues {
    /// Look up a cue by name, covering both the named fields and `extra`.
    pub fn get(&self, name: &str) -> Option<&str> {
        match name {
            "animation_state" => Some(self.animation_state.as_str()),
            "modal_state" => Some(self.modal_state.as_str()),
            "highlight_state" => Some(self.highlight_state.as_str()),
            other => self.extra.get(other).map(String::as_str),
        }
    }
}

fn none_string() -> String {
    "none".to_string()
}

/// The perceived state of the game client at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub client: ClientState,
    #[serde(default)]
    pub ui: UiState,
    #[serde(default)]
    pub cues: Cues,
    #[serde(default)]
    pub chat: Vec<String>,
    /// Set by perception when the capture is older than its freshness budget.
    #[serde(default)]
    pub stale: bool,
}

impl Snapshot {
    /// A focused client with the given bounds and nothing else going on.
    pub fn focused(timestamp: DateTime<Utc>, bounds: Region) -> Self {
        Self {
            timestamp,
            client: ClientState { focused: true, bounds },
            ui: UiState::default(),
            cues: Cues::default(),
            chat: Vec::new(),
            stale: false,
        }
    }

    pub fn element(&self, id: &str) -> Option<&UiElement> {
        self.ui.elements.iter().find(|e| e.id == id)
    }

    /// A compact reference stored in traces instead of the whole snapshot.
    pub fn reference(&self) -> SnapshotRef {
        SnapshotRef {
            timestamp: self.timestamp,
            focused: self.client.focused,
            open_interface: self.ui.open_interface.clone(),
            modal_state: self.cues.modal_state.clone(),
            hover_text: self.ui.hover_text.clone(),
            stale: self.stale,
        }
    }
}

/// The parts of a snapshot an auditor needs to reconstruct a gating decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRef {
    pub timestamp: DateTime<Utc>,
    pub focused: bool,
    pub open_interface: String,
    pub modal_state: String,
    pub hover_text: String,
    pub stale: bool,
}
