//! Period Predictor Bank
//!
//! Thirteen competing predictors of the next inter-pulse period, each scored
//! continuously for accuracy against what actually arrived:
//!
//! - slow and fast one-pole moving averages of the observed period,
//! - a hashed bigram model over log-quantized duration buckets,
//! - ten fixed-lag periodicity detectors (predictor k replays the duration
//!   observed k pulses ago).
//!
//! Every predictor is rescored and updated on every pulse, whether or not it
//! was selected last time, so the accuracy comparison always works from
//! current scores.

use crate::ring::Ring;

/// Size of the pulse history ring.
pub const HISTORY_SIZE: usize = 16;

/// Slots in the bigram hash table.
pub const HASH_TABLE_SIZE: usize = 256;

/// Number of fixed-lag periodicity detectors.
const NUM_LAG_DETECTORS: usize = 10;

/// Total predictor count: 2 moving averages + 1 bigram + 10 lags.
pub const NUM_PREDICTORS: usize = 3 + NUM_LAG_DETECTORS;

const FAST_MOVING_AVERAGE: usize = 0;
const SLOW_MOVING_AVERAGE: usize = 1;
const HASH: usize = 2;
const FIRST_LAG: usize = 3;

/// One completed (or in-progress) pulse of the input clock.
#[derive(Debug, Clone, Copy)]
pub struct Pulse {
    pub on_duration: u32,
    pub total_duration: u32,
    /// Log-quantized duration class, used as a bigram hash key.
    pub bucket: u32,
    pub pulse_width: f32,
}

impl Default for Pulse {
    fn default() -> Self {
        // A plausible medium-tempo pulse, so cold-start predictions are sane.
        Self {
            on_duration: 2000,
            total_duration: 4000,
            bucket: 1,
            pulse_width: 0.5,
        }
    }
}

/// Best-effort prediction of the next period, with an advisory confidence.
#[derive(Debug, Clone, Copy)]
pub struct Prediction {
    pub period: f32,
    /// Smoothed accuracy of the winning predictor, in [0, 1].
    pub accuracy: f32,
}

#[inline]
fn one_pole(state: &mut f32, input: f32, coefficient: f32) {
    *state += coefficient * (input - *state);
}

/// Asymmetric leaky integrator: slowly trust improvements, quickly demote
/// predictors that make errors.
#[inline]
fn slope(state: &mut f32, input: f32, up: f32, down: f32) {
    let coefficient = if input > *state { up } else { down };
    *state += coefficient * (input - *state);
}

/// The bank of competing period predictors.
#[derive(Debug, Clone)]
pub struct PeriodPredictorBank {
    predicted_period: [f32; NUM_PREDICTORS],
    accuracy: [f32; NUM_PREDICTORS],
    hash_table: [f32; HASH_TABLE_SIZE],
}

impl Default for PeriodPredictorBank {
    fn default() -> Self {
        let mut bank = Self {
            predicted_period: [0.0; NUM_PREDICTORS],
            accuracy: [0.0; NUM_PREDICTORS],
            hash_table: [0.0; HASH_TABLE_SIZE],
        };
        bank.reset(4000.0);
        bank
    }
}

impl PeriodPredictorBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything and seed all predictors with `initial_period`.
    pub fn reset(&mut self, initial_period: f32) {
        self.predicted_period = [initial_period; NUM_PREDICTORS];
        self.accuracy = [0.0; NUM_PREDICTORS];
        self.hash_table = [0.0; HASH_TABLE_SIZE];
    }

    /// Score all predictors against the just-completed pulse (the current
    /// entry of `history`), update each model, and return the winner.
    ///
    /// Ties go to the lowest-index predictor, i.e. the fast moving average.
    pub fn predict(&mut self, history: &Ring<Pulse, HISTORY_SIZE>) -> Prediction {
        let last_period = history.current().total_duration as f32;

        let mut best = FAST_MOVING_AVERAGE;
        for i in 0..NUM_PREDICTORS {
            let error = (self.predicted_period[i] - last_period) / (last_period + 0.01);
            // Scoring function: 10% error is half as good as 0% error.
            let accuracy = 1.0 / (1.0 + 100.0 * error * error);
            slope(&mut self.accuracy[i], accuracy, 0.1, 0.5);

            match i {
                FAST_MOVING_AVERAGE => {
                    one_pole(&mut self.predicted_period[i], last_period, 0.5);
                }
                SLOW_MOVING_AVERAGE => {
                    one_pole(&mut self.predicted_period[i], last_period, 0.1);
                }
                HASH => {
                    // Learn: the bigram ending one pulse ago led to this
                    // period. Predict: look up the bigram ending now.
                    let learn_key = bigram(history.at(1).bucket, history.at(2).bucket);
                    one_pole(&mut self.hash_table[learn_key], last_period, 0.5);

                    let predict_key = bigram(history.at(0).bucket, history.at(1).bucket);
                    self.predicted_period[i] = self.hash_table[predict_key];
                    if self.predicted_period[i] == 0.0 {
                        self.predicted_period[i] = last_period;
                    }
                }
                _ => {
                    // Periodicity detector: replay the duration observed
                    // `lag` pulses ago.
                    let lag = i - FIRST_LAG + 1;
                    self.predicted_period[i] = history.at(lag - 1).total_duration as f32;
                }
            }

            if self.accuracy[i] > self.accuracy[best] {
                best = i;
            }
        }

        Prediction {
            period: self.predicted_period[best],
            accuracy: self.accuracy[best],
        }
    }
}

#[inline]
fn bigram(b0: u32, b1: u32) -> usize {
    (b0.wrapping_add(b1.wrapping_mul(17)) as usize) % HASH_TABLE_SIZE
}
