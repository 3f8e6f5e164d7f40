//! Per-session execution state.
//!
//! A `Session` owns everything that must stay consistent across the intents
//! of one run: the active profile, the PRNG stream, pacing counters, the
//! believed cursor position, and the global interrupt flag. The engine is
//! strictly sequential, so none of it is behind a lock except the interrupt
//! flag, which another thread (an abort hotkey, a signal handler) may set.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use tactus_contracts::{
    error::{TactusError, TactusResult},
    geometry::Point,
    profile::HumanizationProfile,
};
use tactus_humanize::{timing::SessionState, SessionRng};

use crate::traits::Clock;

/// The global interrupt signal. Clones share one flag.
#[derive(Debug, Clone, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// State shared by every intent executed in one run.
pub struct Session {
    session_id: String,
    profile: Arc<HumanizationProfile>,
    rng: SessionRng,
    state: SessionState,
    cursor: Point,
    dry_run: bool,
    clock: Arc<dyn Clock>,
    abort: AbortFlag,
    in_flight: HashSet<String>,
}

impl Session {
    /// Start a session. The PRNG is seeded from the profile's `seed` when it
    /// has one and from OS entropy otherwise.
    pub fn new(profile: Arc<HumanizationProfile>, clock: Arc<dyn Clock>) -> Self {
        let rng = match profile.seed {
            Some(seed) => SessionRng::seeded(seed),
            None => SessionRng::from_entropy(),
        };
        let session_id = Uuid::new_v4().to_string();
        info!(
            session_id = %session_id,
            profile = %profile.profile_id,
            seed = rng.seed(),
            "session started"
        );
        Self {
            session_id,
            profile,
            rng,
            state: SessionState::default(),
            cursor: Point::default(),
            dry_run: false,
            clock,
            abort: AbortFlag::new(),
            in_flight: HashSet::new(),
        }
    }

    /// Replace the PRNG with one seeded from `seed`.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = SessionRng::seeded(seed);
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_cursor(mut self, cursor: Point) -> Self {
        self.cursor = cursor;
        self
    }

    /// Share an externally owned interrupt flag.
    pub fn with_abort_flag(mut self, abort: AbortFlag) -> Self {
        self.abort = abort;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn profile(&self) -> &Arc<HumanizationProfile> {
        &self.profile
    }

    pub fn seed(&self) -> u64 {
        self.rng.seed()
    }

    pub fn rng_mut(&mut self) -> &mut SessionRng {
        &mut self.rng
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut SessionState {
        &mut self.state
    }

    pub fn cursor(&self) -> Point {
        self.cursor
    }

    pub fn set_cursor(&mut self, cursor: Point) {
        self.cursor = cursor;
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn abort_flag(&self) -> &AbortFlag {
        &self.abort
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Switch profiles between intents.
    ///
    /// Refused with `ConfigError` while any intent is executing: a profile
    /// never changes in the middle of an intent.
    pub fn reselect_profile(&mut self, profile: Arc<HumanizationProfile>) -> TactusResult<()> {
        if !self.in_flight.is_empty() {
            return Err(TactusError::ConfigError {
                reason: format!(
                    "cannot switch to profile '{}' while an intent is executing",
                    profile.profile_id
                ),
            });
        }
        info!(
            session_id = %self.session_id,
            from = %self.profile.profile_id,
            to = %profile.profile_id,
            "profile reselected"
        );
        self.profile = profile;
        Ok(())
    }

    /// Return `Interrupted` if the abort flag is set.
    pub fn check_interrupt(&self) -> TactusResult<()> {
        if self.abort.is_triggered() {
            warn!(session_id = %self.session_id, "interrupt signal observed");
            return Err(TactusError::Interrupted);
        }
        Ok(())
    }

    /// A suspension point: wait `ms` on the session clock.
    ///
    /// The interrupt flag is checked both before and after the wait.
    pub fn pause(&self, ms: f64) -> TactusResult<()> {
        self.check_interrupt()?;
        if ms > 0.0 {
            self.clock.sleep(ms);
        }
        self.check_interrupt()
    }

    /// Count one completed action toward fatigue drift.
    pub fn record_action(&mut self) {
        self.state.actions_completed += 1;
    }

    /// Mark `intent_id` as executing.
    pub(crate) fn begin(&mut self, intent_id: &str) -> TactusResult<()> {
        if !self.in_flight.insert(intent_id.to_string()) {
            return Err(TactusError::IntentInFlight {
                intent_id: intent_id.to_string(),
            });
        }
        debug!(intent_id, "intent in flight");
        Ok(())
    }

    pub(crate) fn finish(&mut self, intent_id: &str) {
        self.in_flight.remove(intent_id);
    }
}
