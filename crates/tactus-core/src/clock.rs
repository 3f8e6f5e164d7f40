//! `Clock` implementations: the real one and a virtual one for tests and
//! fast dry runs.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::traits::Clock;

/// Wall-clock time; `sleep` blocks the thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, ms: f64) {
        if ms > 0.0 {
            // Durations past what `Duration` can hold are not slept at all.
            if let Ok(d) = Duration::try_from_secs_f64(ms / 1_000.0) {
                std::thread::sleep(d);
            }
        }
    }
}

/// Virtual time that only moves when someone sleeps.
///
/// Clones share the same timeline, so a test can hold one handle and inspect
/// how much time the engine spent waiting.
#[derive(Debug, Clone)]
pub struct ManualClock {
    inner: Arc<Mutex<ManualState>>,
}

#[derive(Debug)]
struct ManualState {
    now: DateTime<Utc>,
    slept_ms: f64,
}

impl ManualClock {
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ManualState { now: start, slept_ms: 0.0 })),
        }
    }

    /// Total virtual time spent in `sleep`.
    pub fn slept_ms(&self) -> f64 {
        self.inner.lock().map(|s| s.slept_ms).unwrap_or_default()
    }

    /// Move virtual time forward. The clock saturates at the latest
    /// representable instant instead of overflowing.
    pub fn advance(&self, ms: f64) {
        if let Ok(mut state) = self.inner.lock() {
            let ms = if ms.is_nan() { 0.0 } else { ms.max(0.0) };
            let micros = (ms * 1_000.0).round() as i64;
            state.now = state
                .now
                .checked_add_signed(TimeDelta::microseconds(micros))
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            state.slept_ms += ms;
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::starting_at(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.inner.lock().map(|s| s.now).unwrap_or_else(|_| Utc::now())
    }

    fn sleep(&self, ms: f64) {
        self.advance(ms);
    }
}
