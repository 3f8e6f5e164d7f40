//! Validation and decoding of decision batches.
//!
//! The decision component hands over `{"actions": [...]}` (a bare array is
//! accepted too). Validation runs in two phases, and every failure is
//! collected before returning:
//!
//! 1. **Structural**: the payload is checked against a JSON Schema using the
//!    `jsonschema` crate.
//! 2. **Semantic**: each decoded intent is checked for things a schema cannot
//!    express (pointer actions need a target, ids are unique, ...).

use std::collections::HashSet;

use serde_json::{json, Value};
use tracing::{debug, warn};

use tactus_contracts::{
    error::{TactusError, TactusResult},
    intent::{ActionIntent, ActionType, CameraRequest, Target},
};

/// Upper bound for caller-supplied reaction delays and key holds.
pub const MAX_FIXED_DELAY_MS: f64 = 10_000.0;
/// Most presses a single click intent may ask for.
pub const MAX_CLICK_COUNT: u32 = 3;

/// JSON Schema for a decision batch.
pub fn decision_schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "type": "object",
        "required": ["actions"],
        "properties": {
            "actions": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["intent_id", "action_type"],
                    "properties": {
                        "intent_id": { "type": "string", "minLength": 1 },
                        "action_type": { "enum": ["move", "click", "drag", "type", "scroll", "camera"] },
                        "target": {
                            "type": "object",
                            "required": ["kind"],
                            "properties": {
                                "kind": { "enum": ["point", "region", "element", "none"] }
                            }
                        },
                        "confidence": { "type": "number", "minimum": 0, "maximum": 1 },
                        "required_cues": { "type": "array", "items": { "type": "string" } },
                        "gating": { "type": "object" },
                        "payload": {
                            "type": "object",
                            "properties": {
                                "reaction_ms": { "type": "number", "minimum": 0, "maximum": MAX_FIXED_DELAY_MS },
                                "click_count": { "type": "integer", "minimum": 1, "maximum": MAX_CLICK_COUNT }
                            }
                        }
                    }
                }
            }
        }
    })
}

/// Semantic problems with a single intent. Empty when the intent is usable.
pub fn validate_intent(intent: &ActionIntent) -> Vec<String> {
    let mut problems = Vec::new();
    let id = &intent.intent_id;

    if id.trim().is_empty() {
        problems.push("intent_id must not be empty".to_string());
    }
    if !(0.0..=1.0).contains(&intent.confidence) {
        problems.push(format!("{}: confidence {} is outside [0, 1]", id, intent.confidence));
    }
    if let Target::Region { width, height, .. } = intent.target {
        if width <= 0.0 || height <= 0.0 {
            problems.push(format!("{}: region target must have a positive size", id));
        }
    }

    let payload = &intent.payload;
    if let Some(ms) = payload.reaction_ms {
        check_fixed_delay(&mut problems, id, "payload.reaction_ms", ms);
    }
    if let Some(CameraRequest::Key { hold_ms: Some(ms), .. }) = payload.camera {
        check_fixed_delay(&mut problems, id, "payload.camera.hold_ms", ms);
    }
    if let Some(CameraRequest::Rotate { yaw_deg }) = payload.camera {
        if !yaw_deg.is_finite() {
            problems.push(format!("{}: payload.camera.yaw_deg must be finite", id));
        }
    }
    if let Some(n) = payload.click_count {
        if n == 0 || n > MAX_CLICK_COUNT {
            problems.push(format!("{}: payload.click_count {} is outside [1, {}]", id, n, MAX_CLICK_COUNT));
        }
        if intent.action_type != ActionType::Click {
            problems.push(format!("{}: payload.click_count only applies to click", id));
        }
    }
    if payload.long_press && payload.click_count.is_some_and(|n| n > 1) {
        problems.push(format!("{}: a long press cannot be a multi-click", id));
    }
    if payload.key.as_deref().is_some_and(|k| k.trim().is_empty()) {
        problems.push(format!("{}: payload.key must not be empty", id));
    }

    match intent.action_type {
        ActionType::Move | ActionType::Click if intent.target == Target::None => {
            problems.push(format!("{}: {} needs a target", id, intent.action_type));
        }
        ActionType::Drag if intent.payload.drag_end.is_none() && intent.target == Target::None => {
            problems.push(format!("{}: drag needs payload.drag_end or a target", id));
        }
        ActionType::Type
            if payload.text.as_deref().map_or(true, str::is_empty) && payload.key.is_none() =>
        {
            problems.push(format!("{}: type needs non-empty payload.text or payload.key", id));
        }
        ActionType::Type if payload.text.is_some() && payload.key.is_some() => {
            problems.push(format!("{}: type takes payload.text or payload.key, not both", id));
        }
        ActionType::Camera if intent.payload.camera.is_none() => {
            problems.push(format!("{}: camera needs payload.camera", id));
        }
        _ => {}
    }
    problems
}

fn check_fixed_delay(problems: &mut Vec<String>, id: &str, field: &str, ms: f64) {
    if !ms.is_finite() || !(0.0..=MAX_FIXED_DELAY_MS).contains(&ms) {
        problems.push(format!("{}: {} {} is outside [0, {}] ms", id, field, ms, MAX_FIXED_DELAY_MS));
    }
}

/// Validate and decode a decision batch into intents, in order.
///
/// Returns `TactusError::SchemaValidation` listing every failure found.
pub fn decode_batch(payload: &Value) -> TactusResult<Vec<ActionIntent>> {
    let wrapped;
    let payload = if payload.is_array() {
        wrapped = json!({ "actions": payload });
        &wrapped
    } else {
        payload
    };

    let mut failures: Vec<String> = Vec::new();

    // ── Phase 1: JSON Schema structural validation ───────────────────────────
    let validator = jsonschema::validator_for(&decision_schema()).map_err(|e| TactusError::SchemaValidation {
        reason: format!("invalid decision schema: {}", e),
    })?;
    for error in validator.iter_errors(payload) {
        let message = format!("at {}: {}", error.instance_path, error);
        warn!(%message, "decision batch structural failure");
        failures.push(message);
    }
    if !failures.is_empty() {
        return Err(TactusError::SchemaValidation {
            reason: failures.join("; "),
        });
    }

    // ── Phase 2: decode and semantic checks ──────────────────────────────────
    let items = payload
        .get("actions")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let mut intents = Vec::with_capacity(items.len());
    let mut seen = HashSet::new();
    for (idx, item) in items.into_iter().enumerate() {
        match serde_json::from_value::<ActionIntent>(item) {
            Ok(intent) => {
                if !seen.insert(intent.intent_id.clone()) {
                    failures.push(format!("duplicate intent_id '{}'", intent.intent_id));
                }
                failures.extend(validate_intent(&intent));
                intents.push(intent);
            }
            Err(e) => failures.push(format!("actions[{}]: {}", idx, e)),
        }
    }

    if !failures.is_empty() {
        warn!(count = failures.len(), "decision batch rejected");
        return Err(TactusError::SchemaValidation {
            reason: failures.join("; "),
        });
    }

    debug!(count = intents.len(), "decision batch decoded");
    Ok(intents)
}

pub fn decode_batch_str(s: &str) -> TactusResult<Vec<ActionIntent>> {
    let value: Value = serde_json::from_str(s).map_err(|e| TactusError::SchemaValidation {
        reason: format!("decision batch is not JSON: {}", e),
    })?;
    decode_batch(&value)
}
