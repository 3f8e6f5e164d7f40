//! Humanization profile types.
//!
//! A `HumanizationProfile` is the named, versioned parameter bundle that the
//! timing, motion, and error models sample from. Every section has defaults,
//! so a profile file only needs to list what it changes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A clamped normal distribution, in milliseconds unless stated otherwise.
///
/// Accepts either a table (`{ mean = 200, stdev = 60, min = 80, max = 500 }`)
/// or a four-element array (`[200, 60, 80, 500]`) when deserialized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "DistributionRepr")]
pub struct Distribution {
    pub mean: f64,
    pub stdev: f64,
    pub min: f64,
    pub max: f64,
}

impl Distribution {
    pub const fn new(mean: f64, stdev: f64, min: f64, max: f64) -> Self {
        Self { mean, stdev, min, max }
    }

    /// A distribution that always yields `value`.
    pub const fn fixed(value: f64) -> Self {
        Self::new(value, 0.0, value, value)
    }

    /// Return a problem description if the bounds are inconsistent.
    pub fn problem(&self) -> Option<String> {
        if !(self.mean.is_finite() && self.stdev.is_finite() && self.min.is_finite() && self.max.is_finite()) {
            return Some("all parameters must be finite".to_string());
        }
        if self.stdev < 0.0 {
            return Some(format!("stdev {} is negative", self.stdev));
        }
        if self.min < 0.0 {
            return Some(format!("min {} is negative", self.min));
        }
        if self.min > self.max {
            return Some(format!("min {} exceeds max {}", self.min, self.max));
        }
        None
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DistributionRepr {
    Table { mean: f64, stdev: f64, min: f64, max: f64 },
    Array([f64; 4]),
}

impl From<DistributionRepr> for Distribution {
    fn from(repr: DistributionRepr) -> Self {
        match repr {
            DistributionRepr::Table { mean, stdev, min, max } => Distribution::new(mean, stdev, min, max),
            DistributionRepr::Array([mean, stdev, min, max]) => Distribution::new(mean, stdev, min, max),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingProfile {
    pub reaction: Distribution,
    pub hover_dwell: Distribution,
    pub click_down_up: Distribution,
    pub confirmation_dwell: Distribution,
    pub settle: Distribution,
    pub inter_action: Distribution,
    pub confirmation_pause: Distribution,
    pub correction_delay: Distribution,
    pub drag_hesitation: Distribution,
    pub drag_hold: Distribution,
    pub key_delay: Distribution,
    pub scroll_pause: Distribution,
    pub interrupt_pause: Distribution,
    pub occlusion_wait: Distribution,
    /// Wait after the button comes back up.
    pub release: Distribution,
    /// Button hold for long-press clicks.
    pub long_press: Distribution,
    /// Gap between the presses of a multi-click.
    pub double_click_gap: Distribution,
    /// Named click rhythms. One draw paces the hover, the press, and the
    /// gap between presses of an intent that names the context.
    pub click_cadence: BTreeMap<String, Distribution>,
}

impl Default for TimingProfile {
    fn default() -> Self {
        Self {
            reaction: Distribution::new(200.0, 60.0, 80.0, 500.0),
            hover_dwell: Distribution::new(120.0, 35.0, 40.0, 260.0),
            click_down_up: Distribution::new(90.0, 25.0, 30.0, 220.0),
            confirmation_dwell: Distribution::new(140.0, 40.0, 50.0, 320.0),
            settle: Distribution::new(60.0, 20.0, 20.0, 140.0),
            inter_action: Distribution::new(180.0, 60.0, 60.0, 420.0),
            confirmation_pause: Distribution::new(150.0, 50.0, 60.0, 400.0),
            correction_delay: Distribution::new(120.0, 40.0, 40.0, 260.0),
            drag_hesitation: Distribution::new(80.0, 25.0, 20.0, 200.0),
            drag_hold: Distribution::new(160.0, 45.0, 60.0, 320.0),
            key_delay: Distribution::new(85.0, 30.0, 30.0, 180.0),
            scroll_pause: Distribution::new(120.0, 40.0, 40.0, 300.0),
            interrupt_pause: Distribution::new(180.0, 60.0, 80.0, 420.0),
            occlusion_wait: Distribution::new(250.0, 80.0, 100.0, 600.0),
            release: Distribution::new(45.0, 15.0, 15.0, 120.0),
            long_press: Distribution::new(350.0, 80.0, 200.0, 800.0),
            double_click_gap: Distribution::new(120.0, 35.0, 50.0, 260.0),
            click_cadence: BTreeMap::from([
                ("banking".to_string(), Distribution::new(110.0, 30.0, 40.0, 220.0)),
                ("skilling".to_string(), Distribution::new(160.0, 45.0, 60.0, 320.0)),
            ]),
        }
    }
}

/// Speed-ramp easing applied to path progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EasingMode {
    Linear,
    EaseIn,
    EaseOut,
    #[default]
    EaseInOut,
}

/// Pointer acceleration curve applied on top of easing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccelPreset {
    #[default]
    Linear,
    WindowsDefault,
    Low,
    High,
}

impl AccelPreset {
    /// Progress is raised to this power.
    pub fn exponent(self) -> f64 {
        match self {
            AccelPreset::Linear => 1.0,
            AccelPreset::WindowsDefault => 1.2,
            AccelPreset::Low => 0.9,
            AccelPreset::High => 1.4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionProfile {
    /// Bend magnitude as a fraction of the straight-line length.
    pub curve_strength: f64,
    pub easing: EasingMode,
    pub acceleration: AccelPreset,
    /// Probability of overshooting the target and correcting back.
    pub overshoot_rate: f64,
    /// Bound on per-point jitter for interior path points, in pixels.
    pub micro_jitter_px: f64,
    /// Sub-pixel tremor amplitude applied to slow segments.
    pub tremor_px: f64,
    /// Segments slower than this (px/ms) receive tremor.
    pub tremor_speed_threshold: f64,
    /// Minimum distance kept from the client boundary.
    pub edge_margin_px: f64,
    /// Base time between consecutive path points.
    pub step_interval_ms: f64,
    /// Random offset applied to the start of a drag.
    pub start_jitter_px: f64,
    pub camera_nudge_deg: f64,
    pub camera_overrotate_deg: f64,
    pub camera_slip_deg: f64,
    pub camera_px_per_deg: f64,
}

impl Default for MotionProfile {
    fn default() -> Self {
        Self {
            curve_strength: 0.15,
            easing: EasingMode::EaseInOut,
            acceleration: AccelPreset::Linear,
            overshoot_rate: 0.1,
            micro_jitter_px: 0.6,
            tremor_px: 0.4,
            tremor_speed_threshold: 0.15,
            edge_margin_px: 8.0,
            step_interval_ms: 8.0,
            start_jitter_px: 2.0,
            camera_nudge_deg: 4.0,
            camera_overrotate_deg: 2.0,
            camera_slip_deg: 0.8,
            camera_px_per_deg: 2.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorProfile {
    pub misclick_rate: f64,
    /// Probability that a misclick is followed by a corrective click.
    pub correction_rate: f64,
    /// Near-miss offset bound as a fraction of half the hit area's smaller side.
    pub max_offset_fraction: f64,
    /// Hit radius assumed for point targets with no known area.
    pub default_hit_radius_px: f64,
}

impl Default for ErrorProfile {
    fn default() -> Self {
        Self {
            misclick_rate: 0.02,
            correction_rate: 1.0,
            max_offset_fraction: 0.35,
            default_hit_radius_px: 12.0,
        }
    }
}

/// Keyboard habits beyond the per-key delay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypingProfile {
    /// Per-character probability of hitting a neighbouring key first.
    pub typo_rate: f64,
    /// Hold time of the backspace that erases a typo.
    pub backspace: Distribution,
    pub key_overlap: Distribution,
    /// Shift goes down this long before a shifted run.
    pub modifier_lead: Distribution,
}

impl Default for TypingProfile {
    fn default() -> Self {
        Self {
            typo_rate: 0.03,
            backspace: Distribution::new(90.0, 25.0, 30.0, 200.0),
            key_overlap: Distribution::new(15.0, 6.0, 5.0, 40.0),
            modifier_lead: Distribution::new(35.0, 12.0, 10.0, 90.0),
        }
    }
}

/// Unprompted filler actions between intents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdleProfile {
    /// Chance of one idle action after each inter-action pause. Zero
    /// disables idling.
    pub idle_rate: f64,
    pub hover_weight: f64,
    pub camera_glance_weight: f64,
    pub inventory_check_weight: f64,
    /// Linger after drifting to a screen edge.
    pub edge_pause: Distribution,
    /// Distance kept inside the client edge when drifting to it.
    pub edge_margin_px: f64,
    /// Largest yaw of a camera glance, either direction.
    pub glance_max_deg: f64,
    /// Hotkeys an inventory check may press.
    pub tab_keys: Vec<String>,
}

impl Default for IdleProfile {
    fn default() -> Self {
        Self {
            idle_rate: 0.0,
            hover_weight: 0.4,
            camera_glance_weight: 0.2,
            inventory_check_weight: 0.4,
            edge_pause: Distribution::new(800.0, 200.0, 400.0, 1200.0),
            edge_margin_px: 6.0,
            glance_max_deg: 35.0,
            tab_keys: vec!["escape".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionProfile {
    /// Actions per burst before a longer rest.
    pub burst_len: Distribution,
    pub rest: Distribution,
    /// Fractional increase of the inter-action mean per completed action.
    pub fatigue_drift_rate: f64,
    /// Upper bound on the fatigue multiplier.
    pub fatigue_cap: f64,
    /// Fixed wait after every action, on top of pacing.
    pub cooldown_ms: Option<f64>,
    /// Probability that an order-equivalent group is shuffled.
    pub order_variability: f64,
    pub typing_burst_chars: Distribution,
    pub scroll_ticks: Distribution,
}

impl Default for SessionProfile {
    fn default() -> Self {
        Self {
            burst_len: Distribution::new(6.0, 2.0, 2.0, 12.0),
            rest: Distribution::new(900.0, 250.0, 300.0, 2000.0),
            fatigue_drift_rate: 0.005,
            fatigue_cap: 1.5,
            cooldown_ms: None,
            order_variability: 0.2,
            typing_burst_chars: Distribution::new(6.0, 2.0, 2.0, 12.0),
            scroll_ticks: Distribution::new(3.0, 1.0, 1.0, 6.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceProfile {
    pub polling_jitter: Distribution,
    pub frame_time_variance: Distribution,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            polling_jitter: Distribution::new(1.2, 0.6, 0.2, 4.0),
            frame_time_variance: Distribution::new(2.0, 0.8, 0.5, 6.0),
        }
    }
}

/// Default safety gate toggles; intents may override `require_focus`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateDefaults {
    pub require_focus: bool,
    pub interrupts_enabled: bool,
    pub hover_check_probability: f64,
    pub focus_recovery: bool,
}

impl Default for GateDefaults {
    fn default() -> Self {
        Self {
            require_focus: true,
            interrupts_enabled: true,
            hover_check_probability: 0.6,
            focus_recovery: true,
        }
    }
}

/// A named, versioned humanization parameter bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumanizationProfile {
    pub profile_id: String,
    #[serde(default = "default_version")]
    pub version: u32,
    /// Deterministic seed for reproducible sampling; random when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub timing: TimingProfile,
    #[serde(default)]
    pub motion: MotionProfile,
    #[serde(default)]
    pub errors: ErrorProfile,
    #[serde(default)]
    pub typing: TypingProfile,
    #[serde(default)]
    pub session: SessionProfile,
    #[serde(default)]
    pub idle: IdleProfile,
    #[serde(default)]
    pub device: DeviceProfile,
    #[serde(default)]
    pub gates: GateDefaults,
    /// Unrecognized keys, preserved but never interpreted.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

fn default_version() -> u32 {
    1
}

impl HumanizationProfile {
    /// The built-in profile with every section at its default.
    pub fn named(profile_id: impl Into<String>) -> Self {
        Self {
            profile_id: profile_id.into(),
            version: 1,
            seed: None,
            timing: TimingProfile::default(),
            motion: MotionProfile::default(),
            errors: ErrorProfile::default(),
            typing: TypingProfile::default(),
            session: SessionProfile::default(),
            idle: IdleProfile::default(),
            device: DeviceProfile::default(),
            gates: GateDefaults::default(),
            extra: BTreeMap::new(),
        }
    }
}
