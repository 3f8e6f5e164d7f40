//! Action policy configuration schema.
//!
//! A `PolicyConfig` is deserialized from TOML. Only action types listed in
//! `allowed_actions` may run; everything else is denied by default.
//!
//! Example:
//! ```toml
//! allowed_actions = ["move", "click", "type", "scroll", "camera"]
//! blocked_labels = ["trade"]
//! denylist = ["report", "mod"]
//!
//! [[rate_limits]]
//! id = "clicks-per-minute"
//! action = "click"
//! max_actions = 80
//! window_secs = 60
//!
//! [approval]
//! require_approval = true
//! unsafe_actions = ["drag", "type", "camera"]
//! approver_role = "operator"
//! ```

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use tactus_contracts::intent::ActionType;

/// A rolling-window cap on how many allowed actions may run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimit {
    /// Stable identifier used in denial reasons and logs.
    pub id: String,

    /// Action type this limit counts, or `"*"` for every action.
    #[serde(default = "wildcard")]
    pub action: String,

    /// Maximum actions permitted inside one window.
    pub max_actions: u32,

    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

fn wildcard() -> String {
    "*".to_string()
}

fn default_window_secs() -> u64 {
    60
}

impl RateLimit {
    /// Return true if this limit counts actions of `action_type`.
    pub fn matches(&self, action_type: ActionType) -> bool {
        self.action == "*" || self.action == action_type.as_str()
    }

    /// The window length, or `None` when `window_secs` does not fit a
    /// `TimeDelta`.
    pub fn window(&self) -> Option<TimeDelta> {
        i64::try_from(self.window_secs).ok().and_then(TimeDelta::try_seconds)
    }
}

/// Which allowed actions still need a human to sign off.
///
/// With `require_approval` off (the default) nothing is ever held back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalPolicy {
    #[serde(default)]
    pub require_approval: bool,

    #[serde(default = "default_unsafe_actions")]
    pub unsafe_actions: Vec<ActionType>,

    /// Exempt from approval even when listed as unsafe.
    #[serde(default)]
    pub auto_approve_actions: Vec<ActionType>,

    /// Role named in the verdict so the caller knows whom to ask.
    #[serde(default = "default_approver_role")]
    pub approver_role: String,
}

fn default_unsafe_actions() -> Vec<ActionType> {
    vec![ActionType::Drag, ActionType::Type, ActionType::Camera]
}

fn default_approver_role() -> String {
    "operator".to_string()
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self {
            require_approval: false,
            unsafe_actions: default_unsafe_actions(),
            auto_approve_actions: Vec::new(),
            approver_role: default_approver_role(),
        }
    }
}

impl ApprovalPolicy {
    pub fn needs_approval(&self, action_type: ActionType) -> bool {
        self.require_approval
            && !self.auto_approve_actions.contains(&action_type)
            && self.unsafe_actions.contains(&action_type)
    }
}

/// The top-level structure deserialized from a TOML policy file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Action types that may run at all. Empty denies everything.
    #[serde(default)]
    pub allowed_actions: Vec<ActionType>,

    /// Intent labels that are never executed (matched case-insensitively).
    #[serde(default)]
    pub blocked_labels: Vec<String>,

    #[serde(default)]
    pub rate_limits: Vec<RateLimit>,

    /// Extra panic keywords handed to the gating engine.
    #[serde(default)]
    pub denylist: Vec<String>,

    #[serde(default)]
    pub approval: ApprovalPolicy,
}

impl PolicyConfig {
    pub fn allows_type(&self, action_type: ActionType) -> bool {
        self.allowed_actions.contains(&action_type)
    }

    pub fn blocks_label(&self, label: &str) -> bool {
        self.blocked_labels.iter().any(|b| b.eq_ignore_ascii_case(label))
    }
}
