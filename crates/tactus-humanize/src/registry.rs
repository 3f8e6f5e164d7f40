//! Loading and selecting humanization profiles.
//!
//! Profiles live in a TOML file keyed by name:
//!
//! ```toml
//! version = 1
//!
//! [profiles.default]
//! seed = 1234
//!
//! [profiles.default.timing]
//! reaction = [200, 60, 80, 500]
//!
//! [profiles.tired.session]
//! fatigue_drift_rate = 0.01
//! ```
//!
//! A profile's `profile_id` defaults to its table key. A local override file
//! may be layered on top with `with_overrides`: profiles it names replace the
//! base definitions wholesale.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info};

use tactus_contracts::{
    error::{TactusError, TactusResult},
    profile::{Distribution, HumanizationProfile},
};

pub const DEFAULT_PROFILE: &str = "default";

#[derive(Debug, Deserialize)]
struct ProfileFile {
    #[serde(default = "default_file_version")]
    version: u32,
    #[serde(default)]
    profiles: BTreeMap<String, toml::Table>,
}

fn default_file_version() -> u32 {
    1
}

/// Named profiles available to a session.
#[derive(Debug, Clone)]
pub struct ProfileRegistry {
    version: u32,
    profiles: BTreeMap<String, HumanizationProfile>,
}

impl Default for ProfileRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileRegistry {
    /// A registry holding only the built-in `default` profile.
    pub fn new() -> Self {
        let mut profiles = BTreeMap::new();
        profiles.insert(DEFAULT_PROFILE.to_string(), HumanizationProfile::named(DEFAULT_PROFILE));
        Self { version: 1, profiles }
    }

    /// Parse a profile file. The built-in `default` is kept unless the file
    /// redefines it.
    ///
    /// Returns `TactusError::ConfigError` for malformed TOML and
    /// `TactusError::InvalidProfile` for a profile that fails validation.
    pub fn from_toml_str(s: &str) -> TactusResult<Self> {
        let file: ProfileFile = toml::from_str(s).map_err(|e| TactusError::ConfigError {
            reason: format!("failed to parse profile TOML: {}", e),
        })?;

        let mut registry = Self::new();
        registry.version = file.version;
        for (name, mut table) in file.profiles {
            table
                .entry("profile_id")
                .or_insert(toml::Value::String(name.clone()));
            let profile: HumanizationProfile =
                toml::Value::Table(table)
                    .try_into()
                    .map_err(|e: toml::de::Error| TactusError::InvalidProfile {
                        name: name.clone(),
                        reason: e.to_string(),
                    })?;
            validate(&profile).map_err(|reason| TactusError::InvalidProfile {
                name: name.clone(),
                reason,
            })?;
            debug!(profile = %name, version = profile.version, "profile loaded");
            registry.profiles.insert(name, profile);
        }

        info!(count = registry.profiles.len(), version = registry.version, "profile registry loaded");
        Ok(registry)
    }

    pub fn from_file(path: &Path) -> TactusResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| TactusError::ConfigError {
            reason: format!("failed to read profile file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Layer `overrides` on top of this registry. Profiles present in both
    /// are taken from `overrides`.
    pub fn with_overrides(mut self, overrides: ProfileRegistry) -> Self {
        for (name, profile) in overrides.profiles {
            if name == DEFAULT_PROFILE && profile == HumanizationProfile::named(DEFAULT_PROFILE) {
                // The override file didn't mention `default`; keep ours.
                continue;
            }
            debug!(profile = %name, "profile overridden");
            self.profiles.insert(name, profile);
        }
        self.version = self.version.max(overrides.version);
        self
    }

    /// Add or replace a profile after validating it.
    pub fn insert(&mut self, profile: HumanizationProfile) -> TactusResult<()> {
        validate(&profile).map_err(|reason| TactusError::InvalidProfile {
            name: profile.profile_id.clone(),
            reason,
        })?;
        self.profiles.insert(profile.profile_id.clone(), profile);
        Ok(())
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&HumanizationProfile> {
        self.profiles.get(name)
    }

    /// Fetch a profile for use by a session. The returned handle is shared
    /// and immutable.
    pub fn select(&self, name: &str) -> TactusResult<Arc<HumanizationProfile>> {
        self.profiles
            .get(name)
            .cloned()
            .map(Arc::new)
            .ok_or_else(|| TactusError::ProfileNotFound { name: name.to_string() })
    }
}

fn check_dist(problems: &mut Vec<String>, name: &str, dist: &Distribution) {
    if let Some(p) = dist.problem() {
        problems.push(format!("{}: {}", name, p));
    }
}

fn check_finite(problems: &mut Vec<String>, name: &str, value: f64) {
    if !value.is_finite() {
        problems.push(format!("{}: {} is not finite", name, value));
    }
}

fn check_rate(problems: &mut Vec<String>, name: &str, rate: f64) {
    if !(0.0..=1.0).contains(&rate) {
        problems.push(format!("{}: {} is not a probability", name, rate));
    }
}

/// Check every distribution and rate in `profile`, collecting all problems.
pub fn validate(profile: &HumanizationProfile) -> Result<(), String> {
    let mut problems = Vec::new();
    let t = &profile.timing;
    for (name, dist) in [
        ("timing.reaction", &t.reaction),
        ("timing.hover_dwell", &t.hover_dwell),
        ("timing.click_down_up", &t.click_down_up),
        ("timing.confirmation_dwell", &t.confirmation_dwell),
        ("timing.settle", &t.settle),
        ("timing.inter_action", &t.inter_action),
        ("timing.confirmation_pause", &t.confirmation_pause),
        ("timing.correction_delay", &t.correction_delay),
        ("timing.drag_hesitation", &t.drag_hesitation),
        ("timing.drag_hold", &t.drag_hold),
        ("timing.key_delay", &t.key_delay),
        ("timing.scroll_pause", &t.scroll_pause),
        ("timing.interrupt_pause", &t.interrupt_pause),
        ("timing.occlusion_wait", &t.occlusion_wait),
        ("timing.release", &t.release),
        ("timing.long_press", &t.long_press),
        ("timing.double_click_gap", &t.double_click_gap),
        ("typing.backspace", &profile.typing.backspace),
        ("typing.key_overlap", &profile.typing.key_overlap),
        ("typing.modifier_lead", &profile.typing.modifier_lead),
        ("idle.edge_pause", &profile.idle.edge_pause),
        ("session.burst_len", &profile.session.burst_len),
        ("session.rest", &profile.session.rest),
        ("session.typing_burst_chars", &profile.session.typing_burst_chars),
        ("session.scroll_ticks", &profile.session.scroll_ticks),
        ("device.polling_jitter", &profile.device.polling_jitter),
        ("device.frame_time_variance", &profile.device.frame_time_variance),
    ] {
        check_dist(&mut problems, name, dist);
    }
    for (context, dist) in &t.click_cadence {
        check_dist(&mut problems, &format!("timing.click_cadence.{}", context), dist);
    }

    let m = &profile.motion;
    let s = &profile.session;
    let i = &profile.idle;
    for (name, value) in [
        ("motion.curve_strength", m.curve_strength),
        ("motion.micro_jitter_px", m.micro_jitter_px),
        ("motion.tremor_px", m.tremor_px),
        ("motion.tremor_speed_threshold", m.tremor_speed_threshold),
        ("motion.edge_margin_px", m.edge_margin_px),
        ("motion.step_interval_ms", m.step_interval_ms),
        ("motion.start_jitter_px", m.start_jitter_px),
        ("motion.camera_nudge_deg", m.camera_nudge_deg),
        ("motion.camera_overrotate_deg", m.camera_overrotate_deg),
        ("motion.camera_slip_deg", m.camera_slip_deg),
        ("motion.camera_px_per_deg", m.camera_px_per_deg),
        ("errors.default_hit_radius_px", profile.errors.default_hit_radius_px),
        ("session.fatigue_drift_rate", s.fatigue_drift_rate),
        ("session.fatigue_cap", s.fatigue_cap),
        ("session.cooldown_ms", s.cooldown_ms.unwrap_or(0.0)),
        ("idle.hover_weight", i.hover_weight),
        ("idle.camera_glance_weight", i.camera_glance_weight),
        ("idle.inventory_check_weight", i.inventory_check_weight),
        ("idle.edge_margin_px", i.edge_margin_px),
        ("idle.glance_max_deg", i.glance_max_deg),
    ] {
        check_finite(&mut problems, name, value);
    }

    check_rate(&mut problems, "motion.overshoot_rate", profile.motion.overshoot_rate);
    check_rate(&mut problems, "errors.misclick_rate", profile.errors.misclick_rate);
    check_rate(&mut problems, "errors.correction_rate", profile.errors.correction_rate);
    check_rate(&mut problems, "errors.max_offset_fraction", profile.errors.max_offset_fraction);
    check_rate(&mut problems, "session.order_variability", profile.session.order_variability);
    check_rate(&mut problems, "gates.hover_check_probability", profile.gates.hover_check_probability);
    check_rate(&mut problems, "typing.typo_rate", profile.typing.typo_rate);
    check_rate(&mut problems, "idle.idle_rate", profile.idle.idle_rate);

    if profile.session.fatigue_cap < 1.0 {
        problems.push(format!("session.fatigue_cap: {} is below 1", profile.session.fatigue_cap));
    }
    if profile.session.fatigue_drift_rate < 0.0 {
        problems.push("session.fatigue_drift_rate: must not be negative".to_string());
    }
    if profile.motion.step_interval_ms <= 0.0 {
        problems.push("motion.step_interval_ms: must be positive".to_string());
    }
    if profile.motion.curve_strength < 0.0 {
        problems.push("motion.curve_strength: must not be negative".to_string());
    }
    if matches!(profile.session.cooldown_ms, Some(ms) if ms < 0.0) {
        problems.push("session.cooldown_ms: must not be negative".to_string());
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(problems.join("; "))
    }
}
