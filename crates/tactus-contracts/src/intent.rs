//! Action intents: declarative requests for one primitive action.
//!
//! Intents are produced by the external decision component and handed to the
//! execution loop as an ordered batch. The engine never mutates an intent; a
//! retry re-executes the same intent under the same `intent_id`.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geometry::{Point, Region};

/// The primitive action families the engine knows how to humanize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Move,
    Click,
    Drag,
    Type,
    Scroll,
    Camera,
}

impl ActionType {
    pub const ALL: [ActionType; 6] = [
        ActionType::Move,
        ActionType::Click,
        ActionType::Drag,
        ActionType::Type,
        ActionType::Scroll,
        ActionType::Camera,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Move => "move",
            ActionType::Click => "click",
            ActionType::Drag => "drag",
            ActionType::Type => "type",
            ActionType::Scroll => "scroll",
            ActionType::Camera => "camera",
        }
    }

    /// True for actions that steer the cursor to a target before acting.
    pub fn is_pointer(&self) -> bool {
        matches!(self, ActionType::Move | ActionType::Click)
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an action should land.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Target {
    /// An exact screen coordinate.
    Point { x: f64, y: f64 },
    /// A bounded hit area; the aim point is chosen inside it.
    Region {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },
    /// A UI element reported by perception, resolved against the Snapshot.
    Element { element_id: String },
    /// No positional target (typing, scrolling in place, key-driven camera).
    None,
}

impl Default for Target {
    fn default() -> Self {
        Target::None
    }
}

impl Target {
    pub fn point(x: f64, y: f64) -> Self {
        Target::Point { x, y }
    }

    pub fn region(r: Region) -> Self {
        Target::Region {
            x: r.x,
            y: r.y,
            width: r.width,
            height: r.height,
        }
    }

    pub fn element(id: impl Into<String>) -> Self {
        Target::Element { element_id: id.into() }
    }
}

/// Mouse button for click actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
}

/// Camera request: either a yaw rotation performed as a middle-drag, or a
/// held arrow key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CameraRequest {
    Rotate { yaw_deg: f64 },
    Key { key: String, hold_ms: Option<f64> },
}

/// Per-intent gating overrides.
///
/// Every recognized option is a typed field. Keys the engine does not know
/// are kept in `extra` so they survive a round trip, but they are never
/// interpreted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatingOverrides {
    /// Overrides the profile's `gates.require_focus` default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_focus: Option<bool>,
    /// Hover text that must be visible before acting (same as a
    /// `hover_text:` cue).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_hover_text: Option<String>,
    /// The interface that must be open before acting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_open_interface: Option<String>,
    /// Interface expected to be open after a successful action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect_open_interface: Option<String>,
    /// Cursor state expected after a successful action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect_cursor_state: Option<String>,
    /// Forces the irreversible-action double check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub irreversible: Option<bool>,
    /// Adjacent intents sharing a group label may be executed in any order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_group: Option<String>,
    /// After this instant an unmet cue is an abort, not a skip.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    /// Extra panic keywords for this intent only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub abort_conditions: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Action-specific fields and per-intent timing/retry overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntentPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll_amount: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drag_start: Option<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drag_end: Option<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button: Option<MouseButton>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera: Option<CameraRequest>,
    /// Game-level label such as `drop`, `alch`, or `trade`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_label: Option<String>,
    /// Aim bias inside a region target: `center`, `text_center`, `icon_center`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_bias: Option<String>,
    /// Soft hover expectation, spot-checked with the profile's probability.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_hover_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    /// Fixed reaction delay replacing the sampled one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reaction_ms: Option<f64>,
    /// Presses per click; 2 is a double-click.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub click_count: Option<u32>,
    /// Hold the button for the profile's long-press duration.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub long_press: bool,
    /// Named click rhythm from `timing.click_cadence` (`banking`, `skilling`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cadence_context: Option<String>,
    /// A named key to press instead of typing `text`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A declarative request for one primitive action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionIntent {
    pub intent_id: String,
    pub action_type: ActionType,
    #[serde(default)]
    pub target: Target,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub required_cues: Vec<String>,
    #[serde(default)]
    pub gating: GatingOverrides,
    #[serde(default)]
    pub payload: IntentPayload,
}

fn default_confidence() -> f64 {
    1.0
}

impl ActionIntent {
    /// Minimal intent with full confidence and no cues or overrides.
    pub fn new(intent_id: impl Into<String>, action_type: ActionType, target: Target) -> Self {
        Self {
            intent_id: intent_id.into(),
            action_type,
            target,
            confidence: 1.0,
            required_cues: Vec::new(),
            gating: GatingOverrides::default(),
            payload: IntentPayload::default(),
        }
    }

    /// The hover text this intent requires, from either a `hover_text:` cue
    /// or the `require_hover_text` override.
    pub fn required_hover_text(&self) -> Option<&str> {
        self.required_cues
            .iter()
            .find_map(|cue| cue.strip_prefix("hover_text:"))
            .map(str::trim)
            .or(self.gating.require_hover_text.as_deref())
    }

    /// Required cues other than hover text.
    pub fn state_cues(&self) -> impl Iterator<Item = &str> {
        self.required_cues
            .iter()
            .map(String::as_str)
            .filter(|cue| !cue.starts_with("hover_text:"))
    }
}
