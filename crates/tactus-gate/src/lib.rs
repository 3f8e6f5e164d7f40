//! # tactus-gate
//!
//! Safety gating for the TACTUS engine.
//!
//! - [`engine`]: the [`GatingEngine`] pre-action checks (focus, panic
//!   triggers, cues, confidence, irreversible actions) and post-action checks
//!   (UI drift, occlusion, expectations)
//! - [`matcher`]: fuzzy hover-text matching and keyword scanning
//! - [`schema`]: JSON Schema plus semantic validation of decision batches
//!
//! The engine only decides. Waiting, re-fetching snapshots, and recovery
//! actions are carried out by the executor in tactus-core.

pub mod engine;
pub mod matcher;
pub mod schema;

pub use engine::{ConfirmKind, GateConfig, GateContext, GatingEngine, PostGate, PreGate};
pub use schema::{decode_batch, decode_batch_str, validate_intent};
