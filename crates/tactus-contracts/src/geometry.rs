//! Screen-space geometry shared by intents, snapshots, and traces.
//!
//! All coordinates are absolute screen pixels as `f64`. Rounding to integer
//! pixels is left to the `InputSink` implementation.

use serde::{Deserialize, Serialize};

/// A screen-space coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance_to(&self, other: &Point) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    /// Return this point shifted by `(dx, dy)`.
    pub fn offset(&self, dx: f64, dy: f64) -> Point {
        Point::new(self.x + dx, self.y + dy)
    }
}

/// An axis-aligned rectangle: a UI element's hit area or the client bounds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Region {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Region {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn contains(&self, p: &Point) -> bool {
        p.x >= self.x && p.x <= self.right() && p.y >= self.y && p.y <= self.bottom()
    }

    /// Clamp `p` into this region shrunk by `margin` on every side.
    ///
    /// When the margin exceeds half the region's size the centre is returned.
    pub fn clamp_inside(&self, p: &Point, margin: f64) -> Point {
        let (left, right) = (self.x + margin, self.right() - margin);
        let (top, bottom) = (self.y + margin, self.bottom() - margin);
        let c = self.center();
        let x = if left > right { c.x } else { p.x.clamp(left, right) };
        let y = if top > bottom { c.y } else { p.y.clamp(top, bottom) };
        Point::new(x, y)
    }
}

/// One point of a generated cursor path together with its time offset (ms)
/// from the start of the movement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathPoint {
    pub x: f64,
    pub y: f64,
    pub t_ms: f64,
}

impl PathPoint {
    pub fn new(x: f64, y: f64, t_ms: f64) -> Self {
        Self { x, y, t_ms }
    }

    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }
}
