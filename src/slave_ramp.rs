//! Slave Ramps
//!
//! A slave ramp turns per-tick scheduling decisions into a smooth phase and
//! a gate. It is re-armed on every master tick, in one of two modes:
//!
//! - divided: emit a fixed number of evenly spaced pulses per master cycle,
//! - bernoulli: either fire now, or glide toward the next expected fire.
//!
//! When a gate is still high at re-arm time, the ramp finishes the pulse
//! before accepting the new schedule, so gate lengths are never truncated.

use crate::ratio::Ratio;

/// Gate duration, in samples, of a zero-width (trigger style) pulse.
const TRIGGER_DURATION: u32 = 32;

#[derive(Debug, Clone)]
pub struct SlaveRamp {
    bernoulli: bool,
    phase: f32,
    target: f32,
    ratio: f32,
    pulse_width: f32,
    pulse_length: u32,
    must_complete: bool,
    gate: bool,
}

impl SlaveRamp {
    pub fn new() -> Self {
        Self {
            bernoulli: false,
            phase: 0.0,
            target: 0.0,
            ratio: 1.0,
            pulse_width: 0.0,
            pulse_length: TRIGGER_DURATION,
            must_complete: false,
            gate: false,
        }
    }

    /// Park the ramp: no pulses until the next re-arm.
    pub fn stop(&mut self) {
        self.bernoulli = false;
        self.ratio = 0.0;
        self.target = f32::MAX;
        self.must_complete = false;
    }

    /// Re-arm in divided mode for one master cycle.
    pub fn init_divided(&mut self, ratio: Ratio, pulse_width: f32) {
        self.bernoulli = false;
        self.must_complete = self.gate;
        if !self.must_complete {
            self.phase = 0.0;
            self.target = 0.0;
        }
        self.ratio = ratio.to_f32();
        self.pulse_width = pulse_width;
    }

    /// Re-arm in bernoulli mode. `expected_value` is the firing probability,
    /// used to pace the ramp between actual fires.
    pub fn init_bernoulli(&mut self, fire: bool, pulse_width: f32, expected_value: f32) {
        self.bernoulli = true;
        self.must_complete = self.gate;
        if fire {
            self.phase = 0.0;
            self.ratio = expected_value.max(0.01);
            self.pulse_width = pulse_width;
            self.pulse_length = 0;
            self.gate = true;
        } else if self.must_complete {
            // Finish the in-flight pulse within this master cycle.
            self.ratio = 1.0 - self.phase;
        } else {
            self.ratio = (1.0 - self.phase) * expected_value.max(0.01);
        }
    }

    /// Advance by one sample. `frequency` is the master's per-sample phase
    /// increment.
    pub fn process(&mut self, frequency: f32, ramp: &mut f32, gate: &mut bool) {
        self.phase += frequency * self.ratio;

        let pulse_phase;
        if self.bernoulli {
            if self.phase > 1.0 {
                self.phase = 1.0;
            }
            pulse_phase = self.phase;
            *ramp = self.phase;
        } else {
            if self.phase >= self.target {
                // Integer boundary: start the next sub-pulse.
                self.pulse_length = 0;
                self.target += 1.0;
            }
            pulse_phase = self.phase - (self.target - 1.0);
            *ramp = self.phase - libm::floorf(self.phase);
        }

        self.gate = if self.pulse_width > 0.0 {
            (0.0..self.pulse_width).contains(&pulse_phase)
        } else {
            // A trigger ends early if the pulse is half over already.
            self.pulse_length < TRIGGER_DURATION && pulse_phase <= 0.5
        };
        self.pulse_length = self.pulse_length.saturating_add(1);
        if !self.gate {
            self.must_complete = false;
        }
        *gate = self.gate;
    }
}

impl Default for SlaveRamp {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(ramp: &mut SlaveRamp, frequency: f32, samples: usize) -> (Vec<f32>, Vec<bool>) {
        let mut phases = Vec::with_capacity(samples);
        let mut gates = Vec::with_capacity(samples);
        for _ in 0..samples {
            let mut p = 0.0;
            let mut g = false;
            ramp.process(frequency, &mut p, &mut g);
            phases.push(p);
            gates.push(g);
        }
        (phases, gates)
    }

    fn count_gate_onsets(gates: &[bool]) -> usize {
        let mut count = 0;
        let mut previous = false;
        for &g in gates {
            if g && !previous {
                count += 1;
            }
            previous = g;
        }
        count
    }

    #[test]
    fn test_divided_pulse_count() {
        let mut ramp = SlaveRamp::new();
        // Three pulses per master cycle of 900 samples. Stop just short of
        // the cycle end so the next cycle's first pulse is not counted.
        ramp.init_divided(Ratio::new(3, 1), 0.5);
        let (_, gates) = run(&mut ramp, 1.0 / 900.0, 890);
        assert_eq!(count_gate_onsets(&gates), 3);
    }

    #[test]
    fn test_bernoulli_fire_reaches_top() {
        let mut ramp = SlaveRamp::new();
        ramp.init_bernoulli(true, 0.5, 0.5);
        let (phases, gates) = run(&mut ramp, 1.0 / 100.0, 400);
        // Rate 0.5 of the master: full ramp in 200 samples, then hold.
        assert!(phases[0] < 0.02);
        assert!((phases[210] - 1.0).abs() < 1e-6);
        // Gate spans half the ramp.
        let high = gates.iter().filter(|&&g| g).count();
        assert!((95..=105).contains(&high), "gate high for {} samples", high);
    }

    #[test]
    fn test_zero_width_is_fixed_trigger() {
        let mut ramp = SlaveRamp::new();
        ramp.init_bernoulli(true, 0.0, 0.5);
        let (_, gates) = run(&mut ramp, 1.0 / 4000.0, 200);
        let high = gates.iter().filter(|&&g| g).count();
        assert_eq!(high, TRIGGER_DURATION as usize);
    }

    #[test]
    fn test_stopped_ramp_stays_silent() {
        let mut ramp = SlaveRamp::new();
        ramp.init_divided(Ratio::new(4, 1), 0.2);
        ramp.stop();
        let (_, gates) = run(&mut ramp, 1.0 / 500.0, 2000);
        assert_eq!(count_gate_onsets(&gates), 0);
    }
}
