//! Ramp Division
//!
//! Derives a divided (or multiplied) phase ramp from an already-recovered
//! master ramp, without re-running clock extraction. The divider measures
//! the master's per-sample increment directly and counts master wraps to
//! stay locked to the p/q schedule.

use crate::ramp_extractor::MAX_RAMP_VALUE;
use crate::ratio::Ratio;

#[derive(Debug, Clone)]
pub struct RampDivider {
    previous_phase: f32,
    train_phase: f32,
    max_train_phase: f32,
    f_ratio: f32,
    reset_counter: i32,
}

impl RampDivider {
    pub fn new() -> Self {
        let mut divider = Self {
            previous_phase: 0.0,
            train_phase: 0.0,
            max_train_phase: 0.999,
            f_ratio: 1.0,
            reset_counter: 1,
        };
        divider.reset();
        divider
    }

    pub fn reset(&mut self) {
        self.previous_phase = 0.0;
        self.train_phase = 0.0;
        self.max_train_phase = 0.999;
        self.f_ratio = 1.0;
        self.reset_counter = 1;
    }

    /// Follow `master` and write the divided ramp into `out`. A ratio
    /// change takes effect at the next scheduled reset point, so the
    /// output never jumps mid-cycle.
    pub fn process(&mut self, ratio: Ratio, master: &[f32], out: &mut [f32]) {
        assert_eq!(master.len(), out.len());
        for (&input, output) in master.iter().zip(out.iter_mut()) {
            let mut frequency = input - self.previous_phase;
            if frequency < 0.0 {
                // Master wrapped: one full master period elapsed.
                frequency += 1.0;
                self.reset_counter -= 1;
                if self.reset_counter <= 0 {
                    self.train_phase = 0.0;
                    self.max_train_phase = ratio.q as f32;
                    self.f_ratio = ratio.to_f32() * MAX_RAMP_VALUE;
                    self.reset_counter = ratio.q;
                    frequency = 0.0;
                }
            }
            self.train_phase += frequency;
            if self.train_phase > self.max_train_phase {
                self.train_phase = self.max_train_phase;
            }
            let phase = self.train_phase * self.f_ratio;
            *output = phase - (phase as i32) as f32;
            self.previous_phase = input;
        }
    }
}

impl Default for RampDivider {
    fn default() -> Self {
        Self::new()
    }
}
