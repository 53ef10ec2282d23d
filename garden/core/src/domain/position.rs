// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Arena Positions
//!
//! [`Position`] is an immutable point in the square arena `[0, ARENA_SIZE]²`.
//! Movement is a straight line at constant velocity; there is no pathfinding.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Side length of the square arena, in arena units.
pub const ARENA_SIZE: f64 = 1000.0;

/// Point in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Uniformly random position inside the arena.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            x: rng.random_range(0.0..=ARENA_SIZE),
            y: rng.random_range(0.0..=ARENA_SIZE),
        }
    }

    /// Euclidean distance to `other`.
    pub fn distance_to(&self, other: &Position) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    /// Advance towards `target` by at most `velocity` units.
    ///
    /// Never overshoots: when the remaining distance is no larger than
    /// `velocity` the result is exactly `target`.
    pub fn step_towards(&self, target: &Position, velocity: f64) -> Position {
        let remaining = self.distance_to(target);
        if remaining <= velocity || remaining == 0.0 {
            return *target;
        }
        let scale = velocity / remaining;
        Position {
            x: self.x + (target.x - self.x) * scale,
            y: self.y + (target.y - self.y) * scale,
        }
    }

    pub fn is_inside_arena(&self) -> bool {
        (0.0..=ARENA_SIZE).contains(&self.x) && (0.0..=ARENA_SIZE).contains(&self.y)
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.1}, {:.1})", self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance() {
        let a = Position::new(0.0, 0.0);
        let b = Position::new(3.0, 4.0);
        assert_eq!(a.distance_to(&b), 5.0);
        assert_eq!(b.distance_to(&a), 5.0);
    }

    #[test]
    fn test_step_lands_exactly_on_close_target() {
        let start = Position::new(0.0, 0.0);
        let target = Position::new(5.0, 0.0);
        assert_eq!(start.step_towards(&target, 10.0), target);
    }

    #[test]
    fn test_step_moves_velocity_units() {
        let start = Position::new(0.0, 0.0);
        let target = Position::new(30.0, 40.0);
        let next = start.step_towards(&target, 10.0);
        assert!((next.x - 6.0).abs() < 1e-9);
        assert!((next.y - 8.0).abs() < 1e-9);
        assert!((start.distance_to(&next) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_step_on_target_stays_put() {
        let p = Position::new(12.0, 7.0);
        assert_eq!(p.step_towards(&p, 10.0), p);
    }

    #[test]
    fn test_random_is_inside_arena() {
        let mut rng = rand::rng();
        for _ in 0..100 {
            assert!(Position::random(&mut rng).is_inside_arena());
        }
    }
}
