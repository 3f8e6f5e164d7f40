//! Runtime error types for the TACTUS execution pipeline.
//!
//! All fallible operations return `TactusResult<T>`. Gating outcomes are not
//! errors: they are classified into an `ExecutionResult`. These variants cover
//! configuration problems and resource failures.

use thiserror::Error;

/// The unified error type for the TACTUS engine.
#[derive(Debug, Error)]
pub enum TactusError {
    /// The input sink could not deliver an event. Continuing is unsafe.
    #[error("input sink unavailable: {reason}")]
    SinkUnavailable { reason: String },

    /// The snapshot provider could not produce a fresh snapshot.
    #[error("snapshot unavailable: {reason}")]
    SnapshotUnavailable { reason: String },

    /// The audit writer could not persist a record.
    ///
    /// This is fatal: an attempt that cannot be audited cannot proceed.
    #[error("audit write failed: {reason}")]
    AuditWriteFailed { reason: String },

    /// The global abort signal fired at a suspension point.
    #[error("execution interrupted")]
    Interrupted,

    /// A second execution of an intent started while the first was running.
    #[error("intent '{intent_id}' is already in flight")]
    IntentInFlight { intent_id: String },

    /// An intent is structurally unusable.
    #[error("invalid intent '{intent_id}': {reason}")]
    InvalidIntent { intent_id: String, reason: String },

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    /// No profile with the requested name is loaded.
    #[error("humanization profile '{name}' not found")]
    ProfileNotFound { name: String },

    /// A profile parsed but its parameters are inconsistent.
    #[error("humanization profile '{name}' is invalid: {reason}")]
    InvalidProfile { name: String, reason: String },

    /// A decision payload failed JSON Schema or semantic validation.
    #[error("schema validation error: {reason}")]
    SchemaValidation { reason: String },
}

/// Convenience alias used throughout the TACTUS crates.
pub type TactusResult<T> = Result<T, TactusError>;
