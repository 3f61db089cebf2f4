//! Rational Divider/Multiplier Ratios
//!
//! A `Ratio` describes how many sub-pulses occur per master pulse (or vice
//! versa) as an exact p/q pair, so divider schedules can count whole periods
//! without accumulating float error.

use serde::{Deserialize, Serialize};

/// Immutable rational multiplier, copied by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ratio {
    pub p: i32,
    pub q: i32,
}

impl Ratio {
    pub const UNITY: Ratio = Ratio { p: 1, q: 1 };

    pub const fn new(p: i32, q: i32) -> Self {
        Self { p, q }
    }

    #[inline]
    pub fn to_f32(self) -> f32 {
        self.p as f32 / self.q as f32
    }

    /// Remove common factors of `N` from numerator and denominator.
    pub fn simplify<const N: i32>(&mut self) {
        while self.p % N == 0 && self.q % N == 0 {
            self.p /= N;
            self.q /= N;
        }
    }
}

impl Default for Ratio {
    fn default() -> Self {
        Ratio::UNITY
    }
}
