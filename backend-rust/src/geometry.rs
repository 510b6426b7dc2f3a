//! Planar coordinates for robots and missiles (SPEC_FULL.md §4.2).

use std::ops::Sub;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::{ARENA_HEIGHT, ARENA_WIDTH};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// A uniformly random position within the arena bounds.
    pub fn random(rng: &mut impl Rng) -> Self {
        Self {
            x: rng.gen_range(0.0..ARENA_WIDTH),
            y: rng.gen_range(0.0..ARENA_HEIGHT),
        }
    }

    /// Clips this position into `[margin, W-margin] x [margin, H-margin]`.
    /// Returns whether the coordinates were changed.
    pub fn clip(&mut self, margin: f64) -> bool {
        let new_x = self.x.max(margin).min(ARENA_WIDTH - margin);
        let new_y = self.y.max(margin).min(ARENA_HEIGHT - margin);
        if (new_x, new_y) != (self.x, self.y) {
            self.x = new_x;
            self.y = new_y;
            true
        } else {
            false
        }
    }

    /// True if this position has left the arena rectangle entirely (used
    /// for missile removal, which uses hard 0/W bounds rather than a
    /// radius margin).
    pub fn outside_arena(&self) -> bool {
        self.x <= 0.0 || self.x >= ARENA_WIDTH || self.y <= 0.0 || self.y >= ARENA_HEIGHT
    }
}

impl Sub for Position {
    type Output = Delta;

    fn sub(self, other: Position) -> Delta {
        Delta {
            dx: self.x - other.x,
            dy: self.y - other.y,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Delta {
    pub dx: f64,
    pub dy: f64,
}

impl Delta {
    pub fn magnitude(&self) -> f64 {
        (self.dx * self.dx + self.dy * self.dy).sqrt()
    }

    /// Signed bearing in degrees, in `(-180, 180]`.
    pub fn angle(&self) -> f64 {
        self.dy.atan2(self.dx).to_degrees()
    }
}

/// Normalizes an angle in degrees to `[0, 360)`.
pub fn normalize_angle(angle: f64) -> f64 {
    let a = angle % 360.0;
    if a < 0.0 {
        a + 360.0
    } else {
        a
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_reports_change() {
        let mut p = Position::new(-5.0, 500.0);
        assert!(p.clip(20.0));
        assert_eq!(p.x, 20.0);
        let mut q = Position::new(500.0, 500.0);
        assert!(!q.clip(20.0));
    }

    #[test]
    fn delta_angle_and_magnitude() {
        let d = Position::new(600.0, 500.0) - Position::new(500.0, 500.0);
        assert_eq!(d.magnitude(), 100.0);
        assert_eq!(d.angle(), 0.0);
    }

    #[test]
    fn normalize_wraps_negative() {
        assert_eq!(normalize_angle(-10.0), 350.0);
        assert_eq!(normalize_angle(370.0), 10.0);
    }
}
