//! Shared test scaffolding: a scripted clock source and a ramp validity
//! checker. Compiled only for tests.

use crate::gate::{GateEdgeClassifier, GateFlags};

/// Plays back a scripted sequence of clock pulses as gate flags.
pub struct PulseGenerator {
    pulses: Vec<(u32, u32)>,
    index: usize,
    position: u32,
    classifier: GateEdgeClassifier,
}

impl PulseGenerator {
    pub fn new() -> Self {
        Self {
            pulses: Vec::new(),
            index: 0,
            position: 0,
            classifier: GateEdgeClassifier::new(),
        }
    }

    /// Queue `count` pulses of `total` samples with the gate high for the
    /// first `on` samples of each.
    pub fn add_pulses(&mut self, total: u32, on: u32, count: usize) {
        assert!(on < total);
        for _ in 0..count {
            self.pulses.push((total, on));
        }
    }

    /// The script loops when exhausted.
    pub fn render(&mut self, flags: &mut [GateFlags]) {
        for slot in flags.iter_mut() {
            let (total, on) = self.pulses[self.index];
            let level = self.position < on;
            *slot = self.classifier.step(level);
            self.position += 1;
            if self.position >= total {
                self.position = 0;
                self.index = (self.index + 1) % self.pulses.len();
            }
        }
    }
}

/// Asserts block-by-block that a ramp stays finite, stays in [0, 1), only
/// moves backwards by wrapping, and never stalls near zero.
pub struct RampChecker {
    previous: f32,
    primed: bool,
    flat_samples: u32,
}

impl RampChecker {
    pub fn new() -> Self {
        Self {
            previous: 0.0,
            primed: false,
            flat_samples: 0,
        }
    }

    pub fn check(&mut self, ramp: &[f32]) {
        for &value in ramp {
            assert!(value.is_finite(), "ramp produced a non-finite value");
            assert!(
                (0.0..=1.0).contains(&value),
                "ramp value {} out of range",
                value
            );
            if self.primed {
                let delta = value - self.previous;
                // Backwards motion is only legal as a wrap to (near) zero.
                assert!(
                    delta >= 0.0 || value < 0.3,
                    "ramp moved backwards without wrapping: {} -> {}",
                    self.previous,
                    value
                );
                if delta == 0.0 && value < 0.01 {
                    self.flat_samples += 1;
                    assert!(self.flat_samples < 40, "ramp stalled near zero");
                } else {
                    self.flat_samples = 0;
                }
            }
            self.previous = value;
            self.primed = true;
        }
    }
}
