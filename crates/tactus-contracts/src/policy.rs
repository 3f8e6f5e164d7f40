//! Policy verdict and evaluation context types.
//!
//! The policy engine consumes a `PolicyContext` and produces a `PolicyVerdict`.
//! A denial is terminal for the intent: it is recorded as `PolicyDenied` and
//! never retried. An action that needs approval is suspended until an
//! approver grants an `ApprovalRequest`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::intent::ActionType;

/// The decision emitted by the policy engine for one intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyVerdict {
    /// The action is permitted.
    Allow,

    /// The action type, label, or rate is not permitted.
    Deny {
        /// Human-readable explanation, written to the trace.
        reason: String,
    },

    /// The action may only run once a human approves it.
    ///
    /// The executor asks its approver, if it has one. Without a grant the
    /// intent ends as `AwaitingApproval` and no input is issued.
    RequireApproval {
        /// Why approval is required.
        reason: String,
        /// The role that must approve (e.g. "operator").
        approver_role: String,
    },
}

/// Everything the policy engine needs to make a decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyContext {
    pub session_id: String,
    pub intent_id: String,
    pub action_type: ActionType,
    /// The intent's game-level label (`drop`, `trade`, ...), if any.
    pub action_label: Option<String>,
    /// Session clock time; rate-limit windows are measured against it.
    pub now: DateTime<Utc>,
}

/// What an approver is asked to grant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub session_id: String,
    pub intent_id: String,
    pub action_type: ActionType,
    pub action_label: Option<String>,
    pub reason: String,
    pub approver_role: String,
}
