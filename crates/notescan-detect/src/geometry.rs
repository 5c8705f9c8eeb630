//! Axis-aligned boxes and overlap math.

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle with `x1 <= x2`, `y1 <= y2`.
///
/// Coordinates are normalized `[0, 1]` model space until the coordinate
/// mapper rescales them into frame pixels; the math is unit-agnostic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl Rect {
    /// Build from two corner points, reordering so the invariant holds.
    pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
        }
    }

    /// Build from center + size (the model's native box encoding).
    pub fn from_center_size(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self::from_corners(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0)
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Clamp both corners into `[0, max_x] × [0, max_y]`.
    pub fn clamp(&self, max_x: f32, max_y: f32) -> Self {
        Self {
            x1: self.x1.clamp(0.0, max_x),
            y1: self.y1.clamp(0.0, max_y),
            x2: self.x2.clamp(0.0, max_x),
            y2: self.y2.clamp(0.0, max_y),
        }
    }

    /// Intersection over union.
    ///
    /// Degenerate zero-area boxes never divide by zero: an empty union
    /// yields 0.0.
    pub fn iou(&self, other: &Rect) -> f32 {
        let ix = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let iy = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let inter = ix * iy;
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}
