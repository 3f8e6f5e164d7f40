//! Shipped `InputSink` implementations and event dispatch.
//!
//! - `RecordingSink` captures every event and can be switched into a failing
//!   state, for tests and for replaying what a run would have done.
//! - `LoggingSink` only emits `tracing` events.

use std::sync::{Arc, Mutex};

use tracing::info;

use tactus_contracts::{
    error::{TactusError, TactusResult},
    execution::{CameraInput, InputEvent, ModifierHold},
    geometry::PathPoint,
    intent::MouseButton,
};

use crate::traits::InputSink;

/// Deliver one recorded `InputEvent` to `sink`.
pub fn dispatch(sink: &dyn InputSink, event: &InputEvent) -> TactusResult<()> {
    match event {
        InputEvent::Move { x, y } => sink.move_to(*x, *y),
        InputEvent::Click { button, down_ms, up_ms } => sink.click(*button, *down_ms, *up_ms),
        InputEvent::Drag { path } => sink.drag(path),
        InputEvent::Type {
            text,
            per_char_delay_ms,
            overlap_ms,
            modifier,
        } => sink.type_text(text, *per_char_delay_ms, *overlap_ms, modifier.as_ref()),
        InputEvent::Key { key, hold_ms } => sink.key(key, *hold_ms),
        InputEvent::Scroll { amount } => sink.scroll(*amount),
        InputEvent::Camera { input } => sink.camera(input),
    }
}

#[derive(Debug, Default)]
struct RecordingState {
    events: Vec<InputEvent>,
    fail_reason: Option<String>,
}

/// A sink that stores events in memory.
///
/// Clones share storage, so a test can keep a handle while the executor owns
/// the boxed sink.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    state: Arc<Mutex<RecordingState>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `reason`.
    pub fn fail_with(&self, reason: impl Into<String>) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_reason = Some(reason.into());
        }
    }

    pub fn events(&self) -> Vec<InputEvent> {
        self.state.lock().map(|s| s.events.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.events.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn record(&self, event: InputEvent) -> TactusResult<()> {
        let mut state = self.state.lock().map_err(|e| TactusError::SinkUnavailable {
            reason: format!("recording sink lock poisoned: {}", e),
        })?;
        if let Some(reason) = &state.fail_reason {
            return Err(TactusError::SinkUnavailable { reason: reason.clone() });
        }
        state.events.push(event);
        Ok(())
    }
}

impl InputSink for RecordingSink {
    fn move_to(&self, x: f64, y: f64) -> TactusResult<()> {
        self.record(InputEvent::Move { x, y })
    }

    fn click(&self, button: MouseButton, down_ms: f64, up_ms: f64) -> TactusResult<()> {
        self.record(InputEvent::Click { button, down_ms, up_ms })
    }

    fn drag(&self, path: &[PathPoint]) -> TactusResult<()> {
        self.record(InputEvent::Drag { path: path.to_vec() })
    }

    fn type_text(
        &self,
        text: &str,
        per_char_delay_ms: f64,
        overlap_ms: f64,
        modifier: Option<&ModifierHold>,
    ) -> TactusResult<()> {
        self.record(InputEvent::Type {
            text: text.to_string(),
            per_char_delay_ms,
            overlap_ms,
            modifier: modifier.cloned(),
        })
    }

    fn key(&self, key: &str, hold_ms: f64) -> TactusResult<()> {
        self.record(InputEvent::Key {
            key: key.to_string(),
            hold_ms,
        })
    }

    fn scroll(&self, amount: i32) -> TactusResult<()> {
        self.record(InputEvent::Scroll { amount })
    }

    fn camera(&self, input: &CameraInput) -> TactusResult<()> {
        self.record(InputEvent::Camera { input: input.clone() })
    }
}

/// A sink that logs each event at `info` and delivers nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingSink;

impl InputSink for LoggingSink {
    fn move_to(&self, x: f64, y: f64) -> TactusResult<()> {
        info!(x, y, "move_to");
        Ok(())
    }

    fn click(&self, button: MouseButton, down_ms: f64, up_ms: f64) -> TactusResult<()> {
        info!(?button, down_ms, up_ms, "click");
        Ok(())
    }

    fn drag(&self, path: &[PathPoint]) -> TactusResult<()> {
        info!(points = path.len(), "drag");
        Ok(())
    }

    fn type_text(
        &self,
        text: &str,
        per_char_delay_ms: f64,
        overlap_ms: f64,
        modifier: Option<&ModifierHold>,
    ) -> TactusResult<()> {
        info!(
            chars = text.chars().count(),
            per_char_delay_ms,
            overlap_ms,
            modifier = modifier.map(|m| m.key.as_str()),
            "type_text"
        );
        Ok(())
    }

    fn key(&self, key: &str, hold_ms: f64) -> TactusResult<()> {
        info!(%key, hold_ms, "key");
        Ok(())
    }

    fn scroll(&self, amount: i32) -> TactusResult<()> {
        info!(amount, "scroll");
        Ok(())
    }

    fn camera(&self, input: &CameraInput) -> TactusResult<()> {
        match input {
            CameraInput::Drag { path } => info!(points = path.len(), "camera drag"),
            CameraInput::Key { key, hold_ms } => info!(%key, hold_ms, "camera key"),
        }
        Ok(())
    }
}
