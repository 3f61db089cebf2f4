//! Gate Edge Classification
//!
//! Converts a raw boolean clock/gate signal into per-sample edge-tagged
//! flags. Downstream components (the ramp extractor, the pattern recorder)
//! only ever look at these flags, never at the raw comparator state.

use serde::{Deserialize, Serialize};

/// Per-sample gate state, encoded as a small bitfield.
///
/// `HIGH` reflects the level, `RISING`/`FALLING` tag the transition that
/// happened on this exact sample. A constant input stream never re-asserts
/// an edge bit after the first sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GateFlags(u8);

impl GateFlags {
    pub const LOW: GateFlags = GateFlags(0);
    pub const HIGH: GateFlags = GateFlags(1);
    pub const RISING: GateFlags = GateFlags(2);
    pub const FALLING: GateFlags = GateFlags(4);

    /// Classify the current boolean level against the previous flags.
    ///
    /// Pure function: the only output is the new flag value.
    #[inline]
    pub fn classify(previous: GateFlags, current: bool) -> GateFlags {
        if current {
            if previous.is_high() {
                GateFlags::HIGH
            } else {
                GateFlags(GateFlags::HIGH.0 | GateFlags::RISING.0)
            }
        } else if previous.is_high() {
            GateFlags::FALLING
        } else {
            GateFlags::LOW
        }
    }

    #[inline]
    pub fn is_high(self) -> bool {
        self.0 & GateFlags::HIGH.0 != 0
    }

    #[inline]
    pub fn is_rising(self) -> bool {
        self.0 & GateFlags::RISING.0 != 0
    }

    #[inline]
    pub fn is_falling(self) -> bool {
        self.0 & GateFlags::FALLING.0 != 0
    }
}

/// Streaming classifier carrying the previous sample's state across blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct GateEdgeClassifier {
    previous: GateFlags,
}

impl GateEdgeClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify one sample.
    #[inline]
    pub fn step(&mut self, level: bool) -> GateFlags {
        self.previous = GateFlags::classify(self.previous, level);
        self.previous
    }

    /// Classify a whole block of raw levels into `flags`.
    ///
    /// Panics if the slices differ in length.
    pub fn scan(&mut self, levels: &[bool], flags: &mut [GateFlags]) {
        assert_eq!(levels.len(), flags.len());
        for (level, flag) in levels.iter().zip(flags.iter_mut()) {
            *flag = self.step(*level);
        }
    }

    pub fn reset(&mut self) {
        self.previous = GateFlags::LOW;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rising_edge_once() {
        let mut c = GateEdgeClassifier::new();
        let first = c.step(true);
        assert!(first.is_rising());
        assert!(first.is_high());

        // Constant high stream must never re-assert RISING.
        for _ in 0..100 {
            let f = c.step(true);
            assert!(f.is_high());
            assert!(!f.is_rising());
            assert!(!f.is_falling());
        }
    }

    #[test]
    fn test_falling_edge_once() {
        let mut c = GateEdgeClassifier::new();
        c.step(true);
        let f = c.step(false);
        assert!(f.is_falling());
        assert!(!f.is_high());

        for _ in 0..100 {
            let f = c.step(false);
            assert_eq!(f, GateFlags::LOW);
        }
    }

    #[test]
    fn test_classify_is_pure() {
        let a = GateFlags::classify(GateFlags::LOW, true);
        let b = GateFlags::classify(GateFlags::LOW, true);
        assert_eq!(a, b);
        assert!(a.is_rising());
    }

    #[test]
    fn test_scan_block() {
        let mut c = GateEdgeClassifier::new();
        let levels = [false, true, true, false, true];
        let mut flags = [GateFlags::LOW; 5];
        c.scan(&levels, &mut flags);
        assert!(!flags[0].is_high());
        assert!(flags[1].is_rising());
        assert!(flags[2].is_high() && !flags[2].is_rising());
        assert!(flags[3].is_falling());
        assert!(flags[4].is_rising());
    }
}
