//! # tactus-core
//!
//! The policy-bound, humanized execution runtime for TACTUS.
//!
//! This crate provides:
//! - The six trait seams (`InputSink`, `SnapshotProvider`, `PolicyEngine`,
//!   `Approver`, `AuditWriter`, `Clock`)
//! - The `Session` that carries the PRNG, pacing state, and interrupt flag
//! - The `ActionExecutor` that runs one intent in the correct trust order
//! - The `ExecutionLoop` that runs a batch with human pacing and idle actions
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tactus_core::{run_loop, ActionExecutor, sink::LoggingSink};
//!
//! let executor = ActionExecutor::new(Box::new(LoggingSink), snapshots, policy, audit);
//! let summary = run_loop(&executor, &intents, profile, None, Some(42), true)?;
//! ```

pub mod approval;
pub mod clock;
pub mod executor;
pub mod retry;
pub mod runner;
pub mod session;
pub mod sink;
pub mod traits;

#[cfg(test)]
mod testkit;

pub use approval::StaticApprover;
pub use clock::{ManualClock, SystemClock};
pub use executor::ActionExecutor;
pub use retry::{Backoff, RetryDecision, RetryPolicy, RetryState};
pub use runner::{plan_order, run_loop, ExecutionLoop};
pub use session::{AbortFlag, Session};
