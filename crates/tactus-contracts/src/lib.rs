//! # tactus-contracts
//!
//! Shared types, schemas, and contracts for the TACTUS action execution
//! engine.
//!
//! All crates in the workspace import from here. No business logic lives in
//! this crate, only data definitions and the error type.

pub mod error;
pub mod execution;
pub mod geometry;
pub mod intent;
pub mod policy;
pub mod profile;
pub mod snapshot;
