//! Shipped `Approver` implementations.

use std::sync::{Arc, Mutex};

use tracing::info;

use tactus_contracts::{error::TactusResult, policy::ApprovalRequest};

use crate::traits::Approver;

/// Answers every request the same way and remembers what it was asked.
///
/// `granting()` stands in for an operator who pre-approved the run;
/// `refusing()` keeps every gated action suspended.
#[derive(Debug, Clone)]
pub struct StaticApprover {
    grant: bool,
    requests: Arc<Mutex<Vec<ApprovalRequest>>>,
}

impl StaticApprover {
    pub fn granting() -> Self {
        Self {
            grant: true,
            requests: Arc::default(),
        }
    }

    pub fn refusing() -> Self {
        Self {
            grant: false,
            ..Self::granting()
        }
    }

    /// Requests seen so far, oldest first.
    pub fn requests(&self) -> Vec<ApprovalRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl Approver for StaticApprover {
    fn approve(&self, request: &ApprovalRequest) -> TactusResult<bool> {
        info!(
            intent_id = %request.intent_id,
            action = %request.action_type,
            role = %request.approver_role,
            granted = self.grant,
            "approval requested"
        );
        if let Ok(mut seen) = self.requests.lock() {
            seen.push(request.clone());
        }
        Ok(self.grant)
    }
}
