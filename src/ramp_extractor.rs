//! Clock Ramp Extraction
//!
//! Recovers a stable 0..1 phase ramp from a noisy, possibly intermittent
//! gate clock by predicting when the next edge will occur. Prediction
//! strategies (see [`crate::predictor`]):
//!
//! - moving averages of previous intervals,
//! - a bigram model on quantized intervals,
//! - periodic rhythmic pattern detectors,
//! - and, when the pulse width is steady, deducing the period from the on
//!   time and the duty cycle.
//!
//! The extractor also applies a rational divider/multiplier ratio to the
//! recovered ramp, glides through moderate tempo changes, and treats clock
//! dropout as a recoverable condition: the ramp free-runs at the stale
//! tempo, then restarts cleanly on the next edge.

use crate::gate::GateFlags;
use crate::predictor::{PeriodPredictorBank, Pulse, HISTORY_SIZE};
use crate::ratio::Ratio;
use crate::ring::Ring;

/// Ramp values approach but never reach 1.0.
pub const MAX_RAMP_VALUE: f32 = 0.9995;

/// Growth factor of the duration bucket thresholds (4^(1/8)): every eighth
/// bucket quadruples the duration class.
const LOG_ONE_FOURTH: f32 = 1.189_207_1;

const PULSE_WIDTH_TOLERANCE: f32 = 0.05;

#[inline]
fn is_within_tolerance(x: f32, y: f32, error: f32) -> bool {
    x >= y * (1.0 - error) && x <= y * (1.0 + error)
}

/// The core phase-tracking estimator.
#[derive(Debug, Clone)]
pub struct RampExtractor {
    sample_rate: f32,
    max_frequency: f32,

    audio_rate_period: f32,
    audio_rate_period_hysteresis: f32,
    audio_rate: bool,

    train_phase: f32,
    target_frequency: f32,
    frequency: f32,
    lp_coefficient: f32,

    max_train_phase: f32,
    next_max_train_phase: f32,
    f_ratio: f32,
    next_f_ratio: f32,

    reset_counter: i32,
    reset_frequency: f32,
    reset_interval: u32,

    history: Ring<Pulse, HISTORY_SIZE>,
    next_bucket: f32,
    average_pulse_width: f32,

    predictor: PeriodPredictorBank,
}

impl RampExtractor {
    /// `max_frequency` is the per-sample phase increment ceiling (e.g.
    /// `1000.0 / sample_rate` for a 1 kHz cap).
    pub fn new(sample_rate: f32, max_frequency: f32) -> Self {
        let mut extractor = Self {
            sample_rate,
            max_frequency,
            // Pulses shorter than 1/100 s are treated as audio-rate.
            audio_rate_period: sample_rate / 100.0,
            audio_rate_period_hysteresis: sample_rate / 100.0,
            audio_rate: false,
            train_phase: 0.0,
            target_frequency: 0.0001,
            frequency: 0.0001,
            lp_coefficient: 0.5,
            max_train_phase: 0.999,
            next_max_train_phase: 0.999,
            f_ratio: 1.0,
            next_f_ratio: 1.0,
            reset_counter: 1,
            reset_frequency: 0.0,
            reset_interval: 0,
            history: Ring::filled(Pulse::default()),
            next_bucket: 48.0,
            average_pulse_width: 0.0,
            predictor: PeriodPredictorBank::new(),
        };
        extractor.reset();
        extractor
    }

    /// Forget all tracking state (history, predictors, phase).
    pub fn reset(&mut self) {
        self.audio_rate = false;
        self.audio_rate_period_hysteresis = self.audio_rate_period;
        self.train_phase = 0.0;
        self.target_frequency = 0.0001;
        self.frequency = 0.0001;
        self.lp_coefficient = 0.5;
        self.max_train_phase = 0.999;
        self.next_max_train_phase = 0.999;
        self.f_ratio = 1.0;
        self.next_f_ratio = 1.0;
        self.reset_counter = 1;
        self.reset_frequency = 0.0;
        self.reset_interval = (self.sample_rate * 3.0) as u32;
        self.history.reset(Pulse::default());
        self.next_bucket = 48.0;
        self.average_pulse_width = 0.0;
        self.predictor.reset(4000.0);
    }

    /// Unwrapped phase accumulator, in [0, max_train_phase].
    pub fn train_phase(&self) -> f32 {
        self.train_phase
    }

    /// Current clock-loss timeout, in samples.
    pub fn reset_interval(&self) -> u32 {
        self.reset_interval
    }

    /// Current per-sample phase increment.
    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    /// Consensus pulse width, or 0.0 when the history disagrees.
    pub fn average_pulse_width(&self) -> f32 {
        self.average_pulse_width
    }

    /// Pulse width averaged over the history, but only if every entry agrees
    /// with the current one within `tolerance`. Disagreement returns 0,
    /// which disables mid-pulse correction.
    fn compute_average_pulse_width(&self, tolerance: f32) -> f32 {
        let reference = self.history.current().pulse_width;
        let mut sum = 0.0;
        for pulse in self.history.iter() {
            if !is_within_tolerance(pulse.pulse_width, reference, tolerance) {
                return 0.0;
            }
            sum += pulse.pulse_width;
        }
        sum / HISTORY_SIZE as f32
    }

    fn on_rising_edge(&mut self, ratio: Ratio, always_ramp_to_maximum: bool) {
        let completed = *self.history.current();
        let record_pulse = completed.total_duration < self.reset_interval;

        if !record_pulse {
            // Quite a long pause: the clock has probably been stopped and
            // restarted. Start fresh, and widen the timeout so a slow
            // restart does not retrigger the reset.
            self.reset_frequency = 0.0;
            self.train_phase = 0.0;
            self.reset_counter = ratio.q;
            self.reset_interval = completed.total_duration.saturating_mul(4);
            *self.history.current_mut() = Pulse {
                on_duration: 0,
                total_duration: 0,
                bucket: 0,
                pulse_width: completed.pulse_width,
            };
        } else {
            let period = completed.total_duration as f32;
            if period <= self.audio_rate_period_hysteresis {
                self.audio_rate = true;
                self.audio_rate_period_hysteresis = self.audio_rate_period * 1.1;
                self.average_pulse_width = 0.0;

                let mut no_glide = self.f_ratio != ratio.to_f32();
                self.f_ratio = ratio.to_f32();

                let clock_frequency = 1.0 / period;
                self.target_frequency =
                    (self.f_ratio * clock_frequency).min(self.max_frequency);
                let up_tolerance = (1.02 + 2.0 * clock_frequency) * self.frequency;
                let down_tolerance = (0.98 - 2.0 * clock_frequency) * self.frequency;
                no_glide |= self.target_frequency > up_tolerance
                    || self.target_frequency < down_tolerance;
                self.lp_coefficient = if no_glide {
                    1.0
                } else {
                    period * 0.32 / self.sample_rate
                };
                self.reset_interval = (4.0 / self.target_frequency)
                    .max(self.sample_rate * 3.0) as u32;
            } else {
                self.audio_rate = false;
                self.audio_rate_period_hysteresis = self.audio_rate_period;

                // Compute the pulse width of the previous pulse, and check
                // if it has been consistent over the past pulses.
                self.history.current_mut().pulse_width =
                    completed.on_duration as f32 / period;
                self.average_pulse_width =
                    self.compute_average_pulse_width(PULSE_WIDTH_TOLERANCE);
                if completed.on_duration < 32 {
                    self.average_pulse_width = 0.0;
                }

                let prediction = self.predictor.predict(&self.history);
                self.frequency = 1.0 / prediction.period.max(1.0);

                self.reset_counter -= 1;
                if self.reset_counter == 0 {
                    self.next_f_ratio = ratio.to_f32() * MAX_RAMP_VALUE;
                    self.next_max_train_phase = ratio.q as f32;
                    if always_ramp_to_maximum && self.train_phase < self.max_train_phase {
                        // Schedule a corrective ramp so the output still
                        // reaches 1.0 smoothly instead of snapping.
                        self.reset_frequency =
                            (0.01 + self.max_train_phase - self.train_phase) * 0.0625;
                    } else {
                        self.reset_frequency = 0.0;
                        self.train_phase = 0.0;
                        self.f_ratio = self.next_f_ratio;
                        self.max_train_phase = self.next_max_train_phase;
                    }
                    self.reset_counter = ratio.q;
                } else {
                    // Warp the next segment to catch the phase back up to
                    // the divider schedule.
                    let expected = self.max_train_phase - self.reset_counter as f32;
                    let warp = expected - self.train_phase + 1.0;
                    self.frequency *= warp.max(0.01);
                }
                self.reset_interval =
                    (4.0 / self.frequency).max(self.sample_rate * 3.0) as u32;
            }
            let stale_width = self.history.current().pulse_width;
            self.history.push(Pulse {
                on_duration: 0,
                total_duration: 0,
                bucket: 0,
                pulse_width: stale_width,
            });
        }
        self.next_bucket = 48.0;
    }

    /// Process one block of gate flags into `ramp`. The slices must have
    /// equal lengths.
    pub fn process(
        &mut self,
        ratio: Ratio,
        always_ramp_to_maximum: bool,
        gate_flags: &[GateFlags],
        ramp: &mut [f32],
    ) {
        assert_eq!(gate_flags.len(), ramp.len());
        for (&flags, out) in gate_flags.iter().zip(ramp.iter_mut()) {
            if flags.is_rising() {
                self.on_rising_edge(ratio, always_ramp_to_maximum);
            }

            // Update the in-progress pulse.
            {
                let current = self.history.current_mut();
                current.total_duration += 1;
                if flags.is_high() {
                    current.on_duration += 1;
                }
                if current.total_duration as f32 >= self.next_bucket {
                    current.bucket += 1;
                    self.next_bucket *= LOG_ONE_FOURTH;
                }
            }

            // If the pulse width is steady and a falling edge arrives,
            // re-derive the period from the on time and the duty cycle,
            // bypassing drift in the interval predictors.
            if flags.is_falling() && self.average_pulse_width > 0.0 {
                let t_on = self.history.current().on_duration as f32;
                let next = self.max_train_phase - self.reset_counter as f32 + 1.0;
                let pw = self.average_pulse_width;
                self.frequency =
                    (next - self.train_phase).max(0.0) * pw / ((1.0 - pw) * t_on);
            }

            if self.audio_rate {
                self.frequency +=
                    self.lp_coefficient * (self.target_frequency - self.frequency);
                self.train_phase += self.frequency;
                if self.train_phase >= 1.0 {
                    self.train_phase -= 1.0;
                }
                *out = self.train_phase;
            } else {
                if self.reset_frequency > 0.0 {
                    self.train_phase += self.reset_frequency;
                    if self.train_phase >= self.max_train_phase {
                        self.train_phase = 0.0;
                        self.reset_frequency = 0.0;
                        self.f_ratio = self.next_f_ratio;
                        self.max_train_phase = self.next_max_train_phase;
                    }
                } else {
                    self.train_phase += self.frequency;
                    if self.train_phase >= self.max_train_phase {
                        if self.frequency == self.max_frequency {
                            self.train_phase -= self.max_train_phase;
                        } else {
                            self.train_phase = self.max_train_phase;
                        }
                    }
                }

                let output_phase = self.train_phase * self.f_ratio;
                *out = output_phase - (output_phase as i32) as f32;
            }
        }
    }
}
