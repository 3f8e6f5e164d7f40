//! Error model: occasional near-miss clicks and their corrections.

use tactus_contracts::{
    geometry::{Point, Region},
    profile::HumanizationProfile,
};

use crate::rng::SessionRng;

/// Where a click will actually land, and whether a correction follows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AimPlan {
    pub target: Point,
    pub aim: Point,
    pub misclick: bool,
    /// A corrective click at `target` follows the miss.
    pub correct: bool,
    pub offset_px: f64,
}

impl AimPlan {
    fn on_target(target: Point) -> Self {
        Self {
            target,
            aim: target,
            misclick: false,
            correct: false,
            offset_px: 0.0,
        }
    }
}

/// Largest near-miss offset allowed for a hit area.
pub fn max_near_miss_offset(hit_area: Option<&Region>, profile: &HumanizationProfile) -> f64 {
    let e = &profile.errors;
    let radius = match hit_area {
        Some(r) => r.width.min(r.height) / 2.0,
        None => e.default_hit_radius_px,
    };
    (e.max_offset_fraction * radius).max(0.0)
}

/// Decide whether this click misses, and by how much.
///
/// A miss is offset in a random direction by between 40% and 100% of the
/// allowed maximum, and never by less than one pixel unless the maximum
/// itself is smaller.
pub fn plan_click(
    target: Point,
    hit_area: Option<&Region>,
    profile: &HumanizationProfile,
    rng: &mut SessionRng,
) -> AimPlan {
    if !rng.chance(profile.errors.misclick_rate) {
        return AimPlan::on_target(target);
    }
    let max = max_near_miss_offset(hit_area, profile);
    let low = (max * 0.4).max(1.0).min(max);
    let magnitude = rng.uniform(low, max);
    let angle = rng.uniform(0.0, std::f64::consts::TAU);
    let correct = rng.chance(profile.errors.correction_rate);

    AimPlan {
        target,
        aim: target.offset(angle.cos() * magnitude, angle.sin() * magnitude),
        misclick: true,
        correct,
        offset_px: magnitude,
    }
}
