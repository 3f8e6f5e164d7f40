//! Idle model: small unprompted actions between intents.
//!
//! After an inter-action pause the loop may slip in one idle action: a
//! drift toward a screen edge, a short camera glance, or a tab hotkey
//! press. Which one is a weighted draw from the profile's `idle` section.

use tactus_contracts::{
    geometry::{Point, Region},
    profile::HumanizationProfile,
};

use crate::{
    rng::SessionRng,
    timing::{sample_delay, Delay},
};

/// Smallest yaw of a camera glance, either direction.
const MIN_GLANCE_DEG: f64 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleKind {
    Hover,
    CameraGlance,
    InventoryCheck,
}

impl IdleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdleKind::Hover => "hover",
            IdleKind::CameraGlance => "camera_glance",
            IdleKind::InventoryCheck => "inventory_check",
        }
    }
}

/// A concrete idle action.
#[derive(Debug, Clone, PartialEq)]
pub enum IdleAction {
    /// Drift to `point` near a client edge and linger there.
    Hover { point: Point, linger_ms: f64 },
    CameraGlance { yaw_deg: f64 },
    InventoryCheck { key: String },
}

impl IdleAction {
    pub fn kind(&self) -> IdleKind {
        match self {
            IdleAction::Hover { .. } => IdleKind::Hover,
            IdleAction::CameraGlance { .. } => IdleKind::CameraGlance,
            IdleAction::InventoryCheck { .. } => IdleKind::InventoryCheck,
        }
    }
}

/// Whether to idle after this pause.
pub fn should_idle(profile: &HumanizationProfile, rng: &mut SessionRng) -> bool {
    rng.chance(profile.idle.idle_rate)
}

/// Weighted choice between the idle kinds. Non-positive weights never win;
/// with no positive weight the choice is `Hover`.
pub fn choose_idle_kind(profile: &HumanizationProfile, rng: &mut SessionRng) -> IdleKind {
    let i = &profile.idle;
    let weights = [
        (IdleKind::Hover, i.hover_weight.max(0.0)),
        (IdleKind::CameraGlance, i.camera_glance_weight.max(0.0)),
        (IdleKind::InventoryCheck, i.inventory_check_weight.max(0.0)),
    ];
    let total: f64 = weights.iter().map(|(_, w)| w).sum();
    if total <= 0.0 {
        return IdleKind::Hover;
    }
    let pick = rng.unit() * total;
    let mut acc = 0.0;
    for (kind, weight) in weights {
        acc += weight;
        if weight > 0.0 && pick < acc {
            return kind;
        }
    }
    weights
        .iter()
        .rev()
        .find(|(_, w)| *w > 0.0)
        .map_or(IdleKind::Hover, |(k, _)| *k)
}

/// A point `margin` inside the midpoint of a randomly chosen client edge.
pub fn screen_edge_point(bounds: &Region, margin: f64, rng: &mut SessionRng) -> Point {
    let c = bounds.center();
    let raw = match rng.range_inclusive(0, 3) {
        0 => Point::new(bounds.x, c.y),
        1 => Point::new(bounds.x + bounds.width, c.y),
        2 => Point::new(c.x, bounds.y),
        _ => Point::new(c.x, bounds.y + bounds.height),
    };
    bounds.clamp_inside(&raw, margin.max(0.0))
}

/// Plan one idle action. A hover needs client bounds; without them the
/// draw falls back to a camera glance.
pub fn plan_idle(profile: &HumanizationProfile, bounds: Option<&Region>, rng: &mut SessionRng) -> IdleAction {
    let i = &profile.idle;
    let kind = match choose_idle_kind(profile, rng) {
        IdleKind::Hover if bounds.is_none() => IdleKind::CameraGlance,
        IdleKind::InventoryCheck if i.tab_keys.is_empty() => IdleKind::CameraGlance,
        kind => kind,
    };
    match (kind, bounds) {
        (IdleKind::Hover, Some(b)) => IdleAction::Hover {
            point: screen_edge_point(b, i.edge_margin_px, rng),
            linger_ms: sample_delay(profile, Delay::EdgePause, rng),
        },
        (IdleKind::InventoryCheck, _) => {
            let idx = rng.range_inclusive(0, i.tab_keys.len().saturating_sub(1) as u32) as usize;
            IdleAction::InventoryCheck {
                key: i.tab_keys.get(idx).cloned().unwrap_or_default(),
            }
        }
        _ => {
            let max = i.glance_max_deg.max(MIN_GLANCE_DEG);
            IdleAction::CameraGlance {
                yaw_deg: rng.sign() * rng.uniform(MIN_GLANCE_DEG, max),
            }
        }
    }
}
