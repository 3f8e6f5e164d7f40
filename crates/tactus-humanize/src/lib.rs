//! # tactus-humanize
//!
//! Seeded sampling models that make input look like a person produced it.
//!
//! - [`timing`]: reaction delays, dwells, fatigue-drifted pacing, burst rhythm
//! - [`motion`]: curved eased paths, acceleration, overshoot, tremor, drags,
//!   camera swipes
//! - [`errors`]: near-miss clicks and corrections
//! - [`keyboard`]: typing plans with typos, rollover, and shift timing
//! - [`idle`]: filler actions between intents
//! - [`registry`]: loading and selecting `HumanizationProfile`s from TOML
//!
//! Every function takes the session's [`SessionRng`] explicitly, so a seeded
//! session replays bit-for-bit.

pub mod errors;
pub mod idle;
pub mod keyboard;
pub mod motion;
pub mod registry;
pub mod rng;
pub mod timing;

pub use registry::ProfileRegistry;
pub use rng::SessionRng;
