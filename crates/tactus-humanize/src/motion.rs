//! Motion model: cursor paths, overshoot, tremor, drags, and camera swipes.
//!
//! Paths are quadratic Bézier curves bent to one side of the straight line,
//! walked with an easing curve so speed ramps up and down. Every point
//! carries a `t_ms` offset built from the step interval plus device polling
//! jitter. Endpoints are always exact; only interior points are perturbed.

use std::collections::BTreeMap;

use tactus_contracts::{
    geometry::{PathPoint, Point, Region},
    profile::{AccelPreset, EasingMode, HumanizationProfile},
};

use crate::{
    rng::SessionRng,
    timing::{sample_delay, Delay},
};

const PX_PER_STEP: f64 = 12.0;
const MIN_STEPS: usize = 6;
const MAX_STEPS: usize = 32;
const OVERSHOOT_MIN_DISTANCE: f64 = 24.0;
const OVERSHOOT_MIN_PX: f64 = 6.0;
/// Random drift applied to a biased aim point.
const AIM_DRIFT_PX: f64 = 2.0;

/// Map linear progress `t` in `[0, 1]` onto the configured speed ramp.
pub fn ease(t: f64, mode: EasingMode) -> f64 {
    let t = t.clamp(0.0, 1.0);
    match mode {
        EasingMode::Linear => t,
        EasingMode::EaseIn => t * t,
        EasingMode::EaseOut => t * (2.0 - t),
        EasingMode::EaseInOut => 0.5 * ((t - 0.5) * std::f64::consts::PI).sin() + 0.5,
    }
}

/// Apply a pointer acceleration preset to eased progress. Endpoints stay fixed.
pub fn accelerate(progress: f64, preset: AccelPreset) -> f64 {
    if progress <= 0.0 {
        return 0.0;
    }
    if progress >= 1.0 {
        return 1.0;
    }
    match preset {
        AccelPreset::Linear => progress,
        other => progress.powf(other.exponent()),
    }
}

/// Number of points for a path of `distance` pixels.
pub fn step_count(distance: f64) -> usize {
    ((distance / PX_PER_STEP) as usize).clamp(MIN_STEPS, MAX_STEPS)
}

/// Distance from `p` to the nearest edge of `bounds`; negative when outside.
fn edge_distance(p: &Point, bounds: &Region) -> f64 {
    (p.x - bounds.x)
        .min(bounds.right() - p.x)
        .min(p.y - bounds.y)
        .min(bounds.bottom() - p.y)
}

fn bezier(start: &Point, control: &Point, end: &Point, t: f64) -> Point {
    let u = 1.0 - t;
    Point::new(
        u * u * start.x + 2.0 * u * t * control.x + t * t * end.x,
        u * u * start.y + 2.0 * u * t * control.y + t * t * end.y,
    )
}

fn next_t(t_ms: f64, profile: &HumanizationProfile, rng: &mut SessionRng) -> f64 {
    t_ms + profile.motion.step_interval_ms.max(0.0) + sample_delay(profile, Delay::PollingJitter, rng)
}

/// Generate a curved, eased cursor path from `start` to `end`.
///
/// When `bounds` is given and any point of the bent curve would come within
/// `edge_margin_px` of the client edge, the bend is flipped toward the client
/// centre, and interior points are clamped inside the margin.
pub fn generate_path(
    start: Point,
    end: Point,
    bounds: Option<&Region>,
    profile: &HumanizationProfile,
    rng: &mut SessionRng,
) -> Vec<PathPoint> {
    let m = &profile.motion;
    let distance = start.distance_to(&end);
    if distance < 1.0 {
        let t = next_t(0.0, profile, rng);
        return vec![PathPoint::new(start.x, start.y, 0.0), PathPoint::new(end.x, end.y, t)];
    }

    let (dx, dy) = (end.x - start.x, end.y - start.y);
    let normal = (-dy / distance, dx / distance);
    let mid = Point::new(start.x + dx / 2.0, start.y + dy / 2.0);
    let mut bend = m.curve_strength.max(0.0) * distance * rng.sign() * rng.uniform(0.75, 1.25);

    if let Some(b) = bounds {
        let margin = m.edge_margin_px.max(0.0);
        let control = mid.offset(normal.0 * bend, normal.1 * bend);
        let apex = bezier(&start, &control, &end, 0.5);
        if edge_distance(&apex, b) < margin || edge_distance(&control, b) < margin {
            let centre = b.center();
            let toward = (centre.x - mid.x) * normal.0 + (centre.y - mid.y) * normal.1;
            if toward * bend < 0.0 {
                bend = -bend;
            }
        }
    }
    let control = mid.offset(normal.0 * bend, normal.1 * bend);

    let steps = step_count(distance);
    let mut path = Vec::with_capacity(steps);
    let mut t_ms = 0.0;
    for i in 0..steps {
        if i > 0 {
            t_ms = next_t(t_ms, profile, rng);
        }
        let point = if i == 0 {
            start
        } else if i == steps - 1 {
            end
        } else {
            let progress = accelerate(ease(i as f64 / (steps - 1) as f64, m.easing), m.acceleration);
            let raw = bezier(&start, &control, &end, progress)
                .offset(rng.symmetric(m.micro_jitter_px), rng.symmetric(m.micro_jitter_px));
            match bounds {
                Some(b) => b.clamp_inside(&raw, m.edge_margin_px.max(0.0)),
                None => raw,
            }
        };
        path.push(PathPoint::new(point.x, point.y, t_ms));
    }
    path
}

/// Outcome of `apply_overshoot`.
#[derive(Debug, Clone, PartialEq)]
pub struct Overshoot {
    pub path: Vec<PathPoint>,
    /// Distance travelled past the target; `None` when no overshoot happened.
    pub overshoot_px: Option<f64>,
    pub corrections: u32,
}

/// With probability `overshoot_rate`, carry the path past its target and
/// return with one to three small corrective moves.
///
/// Paths shorter than 24 px are never overshot. The corrected path still ends
/// exactly at the original target.
pub fn apply_overshoot(path: Vec<PathPoint>, profile: &HumanizationProfile, rng: &mut SessionRng) -> Overshoot {
    let unchanged = |path: Vec<PathPoint>| Overshoot {
        path,
        overshoot_px: None,
        corrections: 0,
    };
    if path.len() < 2 {
        return unchanged(path);
    }
    let (first, last) = (path[0].point(), path[path.len() - 1]);
    let target = last.point();
    let distance = first.distance_to(&target);
    if distance <= OVERSHOOT_MIN_DISTANCE || !rng.chance(profile.motion.overshoot_rate) {
        return unchanged(path);
    }

    let overshoot_px = (distance * rng.uniform(0.04, 0.12)).max(OVERSHOOT_MIN_PX);
    let dir = ((target.x - first.x) / distance, (target.y - first.y) / distance);
    let peak = target.offset(dir.0 * overshoot_px, dir.1 * overshoot_px);

    let mut out = path;
    out.pop();
    let mut t_ms = last.t_ms;
    let near = target.offset(dir.0 * overshoot_px * 0.6, dir.1 * overshoot_px * 0.6);
    out.push(PathPoint::new(near.x, near.y, t_ms));
    t_ms = next_t(t_ms, profile, rng);
    out.push(PathPoint::new(peak.x, peak.y, t_ms));

    let corrections = rng.range_inclusive(1, 3);
    let step = profile.motion.step_interval_ms.max(1.0);
    for k in 1..=corrections {
        t_ms += step * rng.uniform(1.5, 3.0);
        let p = if k == corrections {
            target
        } else {
            let frac = k as f64 / corrections as f64;
            Point::new(
                peak.x + (target.x - peak.x) * frac + rng.symmetric(profile.motion.micro_jitter_px),
                peak.y + (target.y - peak.y) * frac + rng.symmetric(profile.motion.micro_jitter_px),
            )
        };
        out.push(PathPoint::new(p.x, p.y, t_ms));
    }

    Overshoot {
        path: out,
        overshoot_px: Some(overshoot_px),
        corrections,
    }
}

/// Add sub-pixel tremor to interior points reached by a slow segment.
///
/// Returns the number of points perturbed. Endpoints are never touched.
pub fn apply_tremor(path: &mut [PathPoint], profile: &HumanizationProfile, rng: &mut SessionRng) -> usize {
    let m = &profile.motion;
    let amplitude = m.tremor_px.clamp(0.0, 0.99);
    if amplitude == 0.0 || path.len() < 3 {
        return 0;
    }
    let mut touched = 0;
    for i in 1..path.len() - 1 {
        let (prev, cur) = (path[i - 1], path[i]);
        let dt = cur.t_ms - prev.t_ms;
        if dt <= 0.0 {
            continue;
        }
        let speed = prev.point().distance_to(&cur.point()) / dt;
        if speed < m.tremor_speed_threshold {
            path[i].x += rng.symmetric(amplitude);
            path[i].y += rng.symmetric(amplitude);
            touched += 1;
        }
    }
    touched
}

/// A humanized drag: hesitation before pressing, a jittered start, and a
/// path that lands slightly off and corrects onto the literal end point.
#[derive(Debug, Clone, PartialEq)]
pub struct DragPlan {
    pub hesitation_ms: f64,
    pub hold_ms: f64,
    pub start: Point,
    pub end_offset: (f64, f64),
    pub path: Vec<PathPoint>,
}

pub fn generate_drag_path(
    start: Point,
    end: Point,
    bounds: Option<&Region>,
    profile: &HumanizationProfile,
    rng: &mut SessionRng,
) -> DragPlan {
    let m = &profile.motion;
    let hesitation_ms = sample_delay(profile, Delay::DragHesitation, rng);
    let hold_ms = sample_delay(profile, Delay::DragHold, rng);
    let jittered = start.offset(rng.symmetric(m.start_jitter_px), rng.symmetric(m.start_jitter_px));
    let start = match bounds {
        Some(b) if b.contains(&start) => b.clamp_inside(&jittered, 0.0),
        _ => jittered,
    };

    let spread = m.micro_jitter_px * 2.0 + 1.0;
    let end_offset = (rng.symmetric(spread), rng.symmetric(spread));
    let landing = end.offset(end_offset.0, end_offset.1);
    let mut path = generate_path(start, landing, bounds, profile, rng);
    let t_ms = path.last().map_or(0.0, |p| p.t_ms);
    let t_ms = next_t(t_ms, profile, rng);
    path.push(PathPoint::new(end.x, end.y, t_ms));

    DragPlan {
        hesitation_ms,
        hold_ms,
        start,
        end_offset,
        path,
    }
}

/// A camera rotation performed as a horizontal drag.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraPlan {
    pub path: Vec<PathPoint>,
    /// Degrees the final position differs from the request.
    pub slip_deg: f64,
    /// Degrees travelled past the final position before settling back.
    pub overrotate_deg: f64,
    /// Idle glance applied when no rotation was requested.
    pub nudge_deg: f64,
    pub total_deg: f64,
}

impl CameraPlan {
    pub fn motion_fields(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("camera_slip_deg".to_string(), self.slip_deg),
            ("camera_overrotate_deg".to_string(), self.overrotate_deg),
            ("camera_nudge_deg".to_string(), self.nudge_deg),
            ("camera_total_deg".to_string(), self.total_deg),
        ])
    }
}

/// Plan a camera drag starting at `origin`.
///
/// A zero yaw becomes a small random nudge. Otherwise the drag travels past
/// the requested angle by up to `camera_overrotate_deg`, then settles back to
/// the request plus a small slip.
pub fn camera_drag(origin: Point, yaw_deg: f64, profile: &HumanizationProfile, rng: &mut SessionRng) -> CameraPlan {
    let m = &profile.motion;
    let (nudge_deg, base) = if yaw_deg == 0.0 {
        let n = rng.symmetric(m.camera_nudge_deg);
        (n, n)
    } else {
        (0.0, yaw_deg)
    };
    let slip_deg = rng.symmetric(m.camera_slip_deg);
    let overrotate_deg = rng.uniform(0.0, m.camera_overrotate_deg.max(0.0));
    let total_deg = base + slip_deg;
    let direction = if base < 0.0 { -1.0 } else { 1.0 };

    let ppd = m.camera_px_per_deg;
    let settle = origin.offset(total_deg * ppd, rng.symmetric(2.0));
    let peak = settle.offset(direction * overrotate_deg * ppd, 0.0);
    let mut path = generate_path(origin, peak, None, profile, rng);
    if overrotate_deg > 0.0 {
        let t_ms = path.last().map_or(0.0, |p| p.t_ms);
        let t_ms = next_t(t_ms, profile, rng);
        path.push(PathPoint::new(settle.x, settle.y, t_ms));
    }

    CameraPlan {
        path,
        slip_deg,
        overrotate_deg,
        nudge_deg,
        total_deg,
    }
}

/// Choose where inside `region` to aim.
///
/// `text_center` sits a little right of centre, `icon_center` a little left,
/// anything else aims at the centre. A small drift is added and the result is
/// kept away from the region's edges.
pub fn aim_point(region: &Region, bias: Option<&str>, rng: &mut SessionRng) -> Point {
    let x_frac = match bias {
        Some("text_center") => 0.55,
        Some("icon_center") => 0.45,
        _ => 0.5,
    };
    let base = Point::new(region.x + region.width * x_frac, region.y + region.height / 2.0);
    let drifted = base.offset(rng.symmetric(AIM_DRIFT_PX), rng.symmetric(AIM_DRIFT_PX));
    let margin = region.width.min(region.height) * 0.15;
    region.clamp_inside(&drifted, margin)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> HumanizationProfile {
        HumanizationProfile::named("motion")
    }

    fn max_deviation(path: &[PathPoint], a: &Point, b: &Point) -> f64 {
        let len = a.distance_to(b);
        path.iter()
            .map(|p| ((b.x - a.x) * (a.y - p.y) - (a.x - p.x) * (b.y - a.y)).abs() / len)
            .fold(0.0, f64::max)
    }

    #[test]
    fn easing_curves_fix_endpoints() {
        for mode in [EasingMode::Linear, EasingMode::EaseIn, EasingMode::EaseOut, EasingMode::EaseInOut] {
            assert!((ease(0.0, mode)).abs() < 1e-12);
            assert!((ease(1.0, mode) - 1.0).abs() < 1e-12);
        }
        assert!(ease(0.25, EasingMode::EaseIn) < 0.25);
        assert!(ease(0.25, EasingMode::EaseOut) > 0.25);
    }

    #[test]
    fn acceleration_presets_bend_progress() {
        for preset in [AccelPreset::Linear, AccelPreset::WindowsDefault, AccelPreset::Low, AccelPreset::High] {
            assert_eq!(accelerate(0.0, preset), 0.0);
            assert_eq!(accelerate(1.0, preset), 1.0);
            assert_eq!(accelerate(-0.5, preset), 0.0);
            assert_eq!(accelerate(1.5, preset), 1.0);
        }
        assert_eq!(accelerate(0.5, AccelPreset::Linear), 0.5);
        assert!(accelerate(0.5, AccelPreset::High) < accelerate(0.5, AccelPreset::WindowsDefault));
        assert!(accelerate(0.5, AccelPreset::WindowsDefault) < 0.5);
        assert!(accelerate(0.5, AccelPreset::Low) > 0.5);
    }

    #[test]
    fn high_acceleration_path_starts_slower() {
        let mut p = profile();
        p.motion.curve_strength = 0.0;
        p.motion.micro_jitter_px = 0.0;
        p.motion.easing = EasingMode::Linear;
        let (a, b) = (Point::new(0.0, 100.0), Point::new(300.0, 100.0));

        let linear = generate_path(a, b, None, &p, &mut SessionRng::seeded(6));
        p.motion.acceleration = AccelPreset::High;
        let high = generate_path(a, b, None, &p, &mut SessionRng::seeded(6));

        assert_eq!(linear.len(), high.len());
        assert_eq!(high.last().map(|p| p.point()), Some(b));
        for (l, h) in linear.iter().zip(&high).skip(1).take(linear.len() - 2) {
            assert!(h.x < l.x, "accelerated point {} should trail {}", h.x, l.x);
        }
    }

    #[test]
    fn step_count_is_clamped() {
        assert_eq!(step_count(10.0), 6);
        assert_eq!(step_count(240.0), 20);
        assert_eq!(step_count(5_000.0), 32);
    }

    #[test]
    fn path_endpoints_exact_and_time_increasing() {
        let p = profile();
        let mut rng = SessionRng::seeded(4);
        let (a, b) = (Point::new(100.0, 100.0), Point::new(400.0, 260.0));
        let path = generate_path(a, b, None, &p, &mut rng);

        assert_eq!(path.first().map(|p| p.point()), Some(a));
        assert_eq!(path.last().map(|p| p.point()), Some(b));
        assert_eq!(path[0].t_ms, 0.0);
        assert!(path.windows(2).all(|w| w[1].t_ms > w[0].t_ms));
        assert_eq!(path.len(), step_count(a.distance_to(&b)));
    }

    #[test]
    fn curved_when_curve_strength_positive() {
        let mut p = profile();
        p.motion.micro_jitter_px = 0.0;
        let mut rng = SessionRng::seeded(12);
        let (a, b) = (Point::new(0.0, 0.0), Point::new(300.0, 0.0));
        let path = generate_path(a, b, None, &p, &mut rng);
        assert!(max_deviation(&path, &a, &b) > 1.0);

        p.motion.curve_strength = 0.0;
        let straight = generate_path(a, b, None, &p, &mut rng);
        assert!(max_deviation(&straight, &a, &b) < 1e-9);
    }

    #[test]
    fn paths_near_edges_stay_inside_margin() {
        let p = profile();
        let bounds = Region::new(0.0, 0.0, 800.0, 600.0);
        let (a, b) = (Point::new(20.0, 12.0), Point::new(700.0, 12.0));
        for seed in 0..50 {
            let mut rng = SessionRng::seeded(seed);
            let path = generate_path(a, b, Some(&bounds), &p, &mut rng);
            for pt in &path[1..path.len() - 1] {
                assert!(pt.y >= p.motion.edge_margin_px - 1e-9, "seed {seed}: {pt:?} crossed the margin");
            }
        }
    }

    #[test]
    fn seeded_paths_are_reproducible() {
        let p = profile();
        let (a, b) = (Point::new(10.0, 10.0), Point::new(500.0, 300.0));
        let one = generate_path(a, b, None, &p, &mut SessionRng::seeded(77));
        let two = generate_path(a, b, None, &p, &mut SessionRng::seeded(77));
        assert_eq!(one, two);
    }

    #[test]
    fn overshoot_always_returns_to_target() {
        let mut p = profile();
        p.motion.overshoot_rate = 1.0;
        let (a, b) = (Point::new(0.0, 0.0), Point::new(200.0, 0.0));
        for seed in 0..20 {
            let mut rng = SessionRng::seeded(seed);
            let path = generate_path(a, b, None, &p, &mut rng);
            let out = apply_overshoot(path, &p, &mut rng);

            let px = out.overshoot_px.unwrap();
            assert!(px >= OVERSHOOT_MIN_PX && px <= 200.0 * 0.12 + 1e-9);
            assert!((1..=3).contains(&out.corrections));
            assert_eq!(out.path.last().map(|p| p.point()), Some(b));
            assert!(out.path.iter().any(|p| p.x > 200.0));
            assert!(out.path.windows(2).all(|w| w[1].t_ms >= w[0].t_ms));
        }
    }

    #[test]
    fn short_moves_never_overshoot() {
        let mut p = profile();
        p.motion.overshoot_rate = 1.0;
        let mut rng = SessionRng::seeded(1);
        let path = generate_path(Point::new(0.0, 0.0), Point::new(20.0, 0.0), None, &p, &mut rng);
        let before = path.clone();
        let out = apply_overshoot(path, &p, &mut rng);
        assert_eq!(out.overshoot_px, None);
        assert_eq!(out.path, before);
    }

    #[test]
    fn tremor_only_touches_slow_interior_points() {
        let p = profile();
        let mut path = vec![
            PathPoint::new(0.0, 0.0, 0.0),
            PathPoint::new(100.0, 0.0, 10.0), // fast: 10 px/ms
            PathPoint::new(100.5, 0.0, 20.0), // slow: 0.05 px/ms
            PathPoint::new(200.0, 0.0, 30.0),
        ];
        let original = path.clone();
        let mut rng = SessionRng::seeded(9);
        let touched = apply_tremor(&mut path, &p, &mut rng);

        assert_eq!(touched, 1);
        assert_eq!(path[0], original[0]);
        assert_eq!(path[1], original[1]);
        assert_eq!(path[3], original[3]);
        assert!((path[2].x - original[2].x).abs() < 1.0);
    }

    #[test]
    fn drag_ends_on_literal_target() {
        let p = profile();
        let mut rng = SessionRng::seeded(21);
        let end = Point::new(420.0, 310.0);
        let plan = generate_drag_path(Point::new(100.0, 100.0), end, None, &p, &mut rng);

        assert_eq!(plan.path.last().map(|p| p.point()), Some(end));
        assert!(plan.hesitation_ms >= p.timing.drag_hesitation.min);
        assert!(plan.start.distance_to(&Point::new(100.0, 100.0)) <= p.motion.start_jitter_px * 2f64.sqrt());
    }

    #[test]
    fn camera_drag_settles_near_request() {
        let p = profile();
        let mut rng = SessionRng::seeded(3);
        let origin = Point::new(400.0, 300.0);
        let plan = camera_drag(origin, 30.0, &p, &mut rng);

        let end = plan.path.last().map(|p| p.point()).unwrap();
        let expected = origin.x + 30.0 * p.motion.camera_px_per_deg;
        let slack = (p.motion.camera_slip_deg) * p.motion.camera_px_per_deg + 1e-9;
        assert!((end.x - expected).abs() <= slack);
        assert_eq!(plan.nudge_deg, 0.0);

        let idle = camera_drag(origin, 0.0, &p, &mut rng);
        assert!(idle.nudge_deg.abs() <= p.motion.camera_nudge_deg);
    }

    #[test]
    fn aim_point_stays_inside_region() {
        let region = Region::new(50.0, 50.0, 40.0, 20.0);
        let mut rng = SessionRng::seeded(6);
        for bias in [None, Some("text_center"), Some("icon_center")] {
            for _ in 0..200 {
                let p = aim_point(&region, bias, &mut rng);
                assert!(region.contains(&p));
            }
        }
    }
}
