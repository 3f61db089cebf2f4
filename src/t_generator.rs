//! T Channel Gate Generation
//!
//! Drives the two random gate outputs. A master ramp, clocked internally or
//! recovered from an external clock, wraps once per tick; each wrap draws a
//! [`RandomVector`] from the deja vu sequence and asks the selected model
//! which channels should fire. Firing decisions are turned into pulse
//! schedules on two [`SlaveRamp`]s, so gates have controlled widths and the
//! divider models can place several pulses per tick.
//!
//! Models:
//! - complementary / independent Bernoulli coin tosses,
//! - three states (a shared draw picks: none, channel 1, or channel 2),
//! - drums (18 fixed 8-step patterns, pattern picked per bar),
//! - Markov (logit rules over a 32-tick history),
//! - clusters and fixed divider patterns (rational ratios per channel).

use serde::{Deserialize, Serialize};

use crate::distributions::{beta_sample, fast_beta_sample, logistic, semitones_to_ratio};
use crate::gate::GateFlags;
use crate::quantizer::HysteresisQuantizer;
use crate::ramp_extractor::RampExtractor;
use crate::ratio::Ratio;
use crate::rng::RandomStream;
use crate::sequence::{RandomSequence, RandomVector};
use crate::slave_ramp::SlaveRamp;

pub const NUM_T_CHANNELS: usize = 2;

const MARKOV_HISTORY_SIZE: usize = 32;
const DRUM_PATTERN_SIZE: usize = 8;
const NUM_DRUM_PATTERNS: usize = 18;
const NUM_DIVIDER_PATTERNS: usize = 17;
const NUM_INPUT_DIVIDER_RATIOS: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TGeneratorModel {
    #[default]
    ComplementaryBernoulli,
    IndependentBernoulli,
    ThreeStates,
    Drums,
    Markov,
    Clusters,
    Divider,
}

/// Tempo range: quarter, unity or four times the base rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TGeneratorRange {
    QuarterX,
    #[default]
    OneX,
    FourX,
}

#[derive(Debug, Clone, Copy)]
struct DividerPattern {
    ratios: [Ratio; NUM_T_CHANNELS],
    length: i32,
}

const fn pattern(p0: i32, q0: i32, p1: i32, q1: i32, length: i32) -> DividerPattern {
    DividerPattern {
        ratios: [Ratio::new(p0, q0), Ratio::new(p1, q1)],
        length,
    }
}

/// Cluster patterns, ordered from plain to busy.
static DIVIDER_PATTERNS: [DividerPattern; NUM_DIVIDER_PATTERNS] = [
    pattern(1, 1, 1, 1, 1),
    pattern(1, 1, 2, 1, 1),
    pattern(1, 2, 1, 1, 2),
    pattern(1, 1, 4, 1, 1),
    pattern(1, 2, 2, 1, 2),
    pattern(1, 1, 3, 2, 2),
    pattern(1, 4, 4, 1, 4),
    pattern(1, 4, 2, 1, 4),
    pattern(1, 2, 3, 2, 2),
    pattern(1, 1, 8, 1, 1),
    pattern(1, 1, 3, 1, 1),
    pattern(1, 3, 1, 1, 3),
    pattern(1, 1, 5, 4, 4),
    pattern(1, 2, 5, 4, 4),
    pattern(1, 1, 6, 1, 1),
    pattern(1, 3, 2, 1, 3),
    pattern(1, 1, 16, 1, 1),
];

/// Symmetric division/multiplication pairs, unity in the middle, for the
/// divider model's bias sweep.
static FIXED_DIVIDER_PATTERNS: [DividerPattern; NUM_DIVIDER_PATTERNS] = [
    pattern(8, 1, 1, 8, 8),
    pattern(6, 1, 1, 6, 6),
    pattern(4, 1, 1, 4, 4),
    pattern(3, 1, 1, 3, 3),
    pattern(2, 1, 1, 2, 2),
    pattern(3, 2, 2, 3, 6),
    pattern(4, 3, 3, 4, 12),
    pattern(5, 4, 4, 5, 20),
    pattern(1, 1, 1, 1, 1),
    pattern(4, 5, 5, 4, 20),
    pattern(3, 4, 4, 3, 12),
    pattern(2, 2, 3, 2, 6),
    pattern(1, 2, 2, 1, 2),
    pattern(1, 3, 3, 1, 3),
    pattern(1, 4, 4, 1, 4),
    pattern(1, 6, 6, 1, 6),
    pattern(1, 8, 8, 1, 8),
];

static INPUT_DIVIDER_RATIOS: [Ratio; NUM_INPUT_DIVIDER_RATIOS] = [
    Ratio::new(1, 4),
    Ratio::new(1, 3),
    Ratio::new(1, 2),
    Ratio::new(2, 3),
    Ratio::new(1, 1),
    Ratio::new(3, 2),
    Ratio::new(2, 1),
    Ratio::new(3, 1),
    Ratio::new(4, 1),
];

/// 1 = channel 1, 2 = channel 2, used directly as a firing bitmask.
static DRUM_PATTERNS: [[u8; DRUM_PATTERN_SIZE]; NUM_DRUM_PATTERNS] = [
    [1, 0, 0, 0, 2, 0, 0, 0],
    [0, 0, 1, 0, 2, 0, 0, 0],
    [1, 0, 1, 0, 2, 0, 0, 0],
    [0, 0, 1, 0, 2, 0, 0, 2],
    [1, 0, 1, 0, 2, 0, 1, 0],
    [0, 2, 1, 0, 2, 0, 0, 2],
    [1, 0, 0, 0, 2, 0, 1, 0],
    [0, 2, 1, 0, 2, 0, 1, 2],
    [1, 0, 0, 1, 2, 0, 0, 0],
    [0, 2, 1, 1, 2, 0, 1, 2],
    [1, 0, 0, 1, 2, 0, 1, 0],
    [0, 2, 1, 1, 2, 2, 1, 2],
    [1, 0, 0, 1, 2, 0, 1, 2],
    [0, 2, 0, 1, 2, 0, 1, 2],
    [1, 0, 1, 1, 2, 0, 1, 2],
    [2, 0, 1, 2, 0, 1, 2, 0],
    [1, 2, 1, 1, 2, 0, 1, 2],
    [2, 0, 1, 2, 0, 1, 2, 2],
];

/// Output buffers for one processed block.
pub struct TRamps<'a> {
    /// The recovered (or mirrored internal) external-clock ramp.
    pub external: &'a mut [f32],
    /// The jittered master ramp driving the tick schedule.
    pub master: &'a mut [f32],
    /// One sub-ramp per T channel.
    pub slave: [&'a mut [f32]; NUM_T_CHANNELS],
}

pub struct TGenerator {
    pub model: TGeneratorModel,
    pub range: TGeneratorRange,
    /// Rate control in semitones around the 2 Hz base clock.
    pub rate: f32,
    pub bias: f32,
    pub jitter: f32,
    pub pulse_width_mean: f32,
    pub pulse_width_std: f32,

    one_hertz: f32,
    master_phase: f32,
    jitter_multiplier: f32,
    phase_difference: f32,
    previous_external_ramp_value: f32,

    divider_pattern_length: i32,
    streak_counter: [u32; NUM_T_CHANNELS],
    markov_history: [u8; MARKOV_HISTORY_SIZE],
    markov_history_ptr: usize,
    drum_pattern_step: usize,
    drum_pattern_index: usize,

    sequence: RandomSequence,
    ramp_extractor: RampExtractor,
    slave_ramp: [SlaveRamp; NUM_T_CHANNELS],
    bias_quantizer: HysteresisQuantizer,
    rate_quantizer: HysteresisQuantizer,
    use_external_clock: bool,
}

impl TGenerator {
    pub fn new(stream: &mut RandomStream, sample_rate: f32) -> Self {
        let mut sequence = RandomSequence::new();
        sequence.init(stream);
        Self {
            model: TGeneratorModel::default(),
            range: TGeneratorRange::default(),
            rate: 0.0,
            bias: 0.5,
            jitter: 0.0,
            pulse_width_mean: 0.0,
            pulse_width_std: 0.0,
            one_hertz: 1.0 / sample_rate,
            master_phase: 0.0,
            jitter_multiplier: 1.0,
            phase_difference: 0.0,
            previous_external_ramp_value: 0.0,
            divider_pattern_length: 0,
            streak_counter: [0; NUM_T_CHANNELS],
            markov_history: [0; MARKOV_HISTORY_SIZE],
            markov_history_ptr: 0,
            drum_pattern_step: 0,
            drum_pattern_index: 0,
            sequence,
            ramp_extractor: RampExtractor::new(sample_rate, 1000.0 / sample_rate),
            slave_ramp: [SlaveRamp::new(), SlaveRamp::new()],
            bias_quantizer: HysteresisQuantizer::new(),
            rate_quantizer: HysteresisQuantizer::new(),
            use_external_clock: false,
        }
    }

    /// The deja vu sequence feeding this generator's draws.
    pub fn sequence_mut(&mut self) -> &mut RandomSequence {
        &mut self.sequence
    }

    fn random_pulse_width(&self, u: f32) -> f32 {
        if self.pulse_width_mean <= 0.0 {
            // Zero mean: fixed-length triggers.
            0.0
        } else {
            beta_sample(u, self.pulse_width_std, self.pulse_width_mean)
        }
    }

    fn generate_complementary_bernoulli(&self, x: &RandomVector) -> u32 {
        let mut bitmask = 0;
        for i in 0..NUM_T_CHANNELS {
            if (x.u[i >> 1] > self.bias) ^ (i & 1 == 1) {
                bitmask |= 1 << i;
            }
        }
        bitmask
    }

    fn generate_independent_bernoulli(&self, x: &RandomVector) -> u32 {
        let mut bitmask = 0;
        for i in 0..NUM_T_CHANNELS {
            if (x.u[i] > self.bias) ^ (i & 1 == 1) {
                bitmask |= 1 << i;
            }
        }
        bitmask
    }

    fn generate_three_states(&self, x: &RandomVector) -> u32 {
        let mut bitmask = 0;
        let p_none = 0.75 - (self.bias - 0.5).abs();
        let threshold = p_none + (1.0 - p_none) * (0.25 + self.bias * 0.5);
        for i in 0..NUM_T_CHANNELS {
            let u = x.u[i >> 1];
            if u > p_none && ((u > threshold) ^ (i & 1 == 1)) {
                bitmask |= 1 << i;
            }
        }
        bitmask
    }

    fn generate_drums(&mut self, x: &RandomVector) -> u32 {
        self.drum_pattern_step += 1;
        if self.drum_pattern_step >= DRUM_PATTERN_SIZE {
            self.drum_pattern_step = 0;
            let u = x.u[0] * 2.0 * (self.bias - 0.5).abs();
            self.drum_pattern_index =
                ((NUM_DRUM_PATTERNS as f32 * u) as usize).min(NUM_DRUM_PATTERNS - 1);
            if self.bias <= 0.5 {
                // The low half of the sweep sticks to the plainer variant
                // of each pattern pair.
                self.drum_pattern_index -= self.drum_pattern_index % 2;
            }
        }
        DRUM_PATTERNS[self.drum_pattern_index][self.drum_pattern_step] as u32
    }

    fn generate_markov(&mut self, x: &RandomVector) -> u32 {
        let mut bitmask: u32 = 0;
        let b = 1.5 * self.bias - 0.5;
        let p = self.markov_history_ptr;
        self.markov_history[p] = 0;
        for i in 0..NUM_T_CHANNELS {
            let mask = 1u8 << i;
            // 4 rules:
            // * favor repeating what was played 8 ticks ago,
            // * do not favor pulses on both channels at once,
            // * favor sparse patterns (no consecutive hits),
            // * favor one channel echoing the other, 4 ticks later.
            let periodic = self.markov_history[(p + 8) % MARKOV_HISTORY_SIZE] & mask != 0;
            let simultaneous = self.markov_history[(p + 8) % MARKOV_HISTORY_SIZE] & !mask != 0;
            let dense = self.markov_history[(p + 1) % MARKOV_HISTORY_SIZE] & mask != 0;
            let alternate = self.markov_history[(p + 4) % MARKOV_HISTORY_SIZE] & !mask != 0;

            let mut logit = -1.5;
            if self.streak_counter[i] > 24 {
                // Streak breaker: a silent channel eventually fires.
                logit += 10.0;
            }
            logit += 8.0 * b.abs() * if periodic { b } else { -b };
            logit -= 2.0 * if simultaneous { b } else { -b };
            logit -= if dense { b } else { 0.0 };
            logit += if alternate { b } else { 0.0 };
            let probability = logistic(logit);
            let mut state = x.u[i] < probability;

            if self.sequence.deja_vu() >= x.p {
                // Deja vu override: replay the loop-length-old decision.
                state = self.markov_history[(p + self.sequence.length()) % MARKOV_HISTORY_SIZE]
                    & mask
                    != 0;
            }
            if state {
                bitmask |= mask as u32;
                self.streak_counter[i] = 0;
            } else {
                self.streak_counter[i] += 1;
            }
        }
        self.markov_history[p] |= bitmask as u8;
        self.markov_history_ptr = (p + MARKOV_HISTORY_SIZE - 1) % MARKOV_HISTORY_SIZE;
        bitmask
    }

    fn schedule_output_pulses(&mut self, x: &RandomVector, bitmask: u32) {
        for i in 0..NUM_T_CHANNELS {
            let pulse_width = self.random_pulse_width(x.pulse_width[i]);
            self.slave_ramp[i].init_bernoulli(bitmask & (1 << i) != 0, pulse_width, 0.5);
        }
    }

    fn configure_slave_ramps(&mut self, x: &RandomVector) {
        match self.model {
            TGeneratorModel::ComplementaryBernoulli => {
                let bitmask = self.generate_complementary_bernoulli(x);
                self.schedule_output_pulses(x, bitmask);
            }
            TGeneratorModel::IndependentBernoulli => {
                let bitmask = self.generate_independent_bernoulli(x);
                self.schedule_output_pulses(x, bitmask);
            }
            TGeneratorModel::ThreeStates => {
                let bitmask = self.generate_three_states(x);
                self.schedule_output_pulses(x, bitmask);
            }
            TGeneratorModel::Drums => {
                let bitmask = self.generate_drums(x);
                self.schedule_output_pulses(x, bitmask);
            }
            TGeneratorModel::Markov => {
                let bitmask = self.generate_markov(x);
                self.schedule_output_pulses(x, bitmask);
            }
            TGeneratorModel::Clusters | TGeneratorModel::Divider => {
                self.divider_pattern_length -= 1;
                if self.divider_pattern_length <= 0 {
                    let pattern = if self.model == TGeneratorModel::Divider {
                        *self
                            .bias_quantizer
                            .lookup(&FIXED_DIVIDER_PATTERNS, self.bias)
                    } else {
                        let strength = (self.bias - 0.5).abs() * 2.0;
                        let mut u = x.u[0];
                        u *= u + strength * strength * (1.0 - u);
                        u *= strength;
                        let index = ((u * NUM_DIVIDER_PATTERNS as f32) as usize)
                            .min(NUM_DIVIDER_PATTERNS - 1);
                        let mut p = DIVIDER_PATTERNS[index];
                        if self.bias < 0.5 {
                            p.ratios.swap(0, 1);
                        }
                        p
                    };
                    for i in 0..NUM_T_CHANNELS {
                        let pulse_width = self.random_pulse_width(x.pulse_width[i]);
                        self.slave_ramp[i].init_divided(pattern.ratios[i], pulse_width);
                    }
                    self.divider_pattern_length = pattern.length;
                }
            }
        }
    }

    /// Render one block. `gate` is interleaved, two entries per sample.
    pub fn process(
        &mut self,
        stream: &mut RandomStream,
        use_external_clock: bool,
        external_clock: &[GateFlags],
        ramps: &mut TRamps<'_>,
        gate: &mut [bool],
    ) {
        let size = ramps.master.len();
        assert_eq!(gate.len(), size * NUM_T_CHANNELS);

        let internal_frequency;
        if use_external_clock {
            if !self.use_external_clock {
                self.ramp_extractor.reset();
            }
            let mut ratio = *self.rate_quantizer.lookup(
                &INPUT_DIVIDER_RATIOS,
                1.05 * self.rate / 96.0 + 0.5,
            );
            match self.range {
                TGeneratorRange::QuarterX => ratio.q *= 4,
                TGeneratorRange::FourX => ratio.p *= 4,
                TGeneratorRange::OneX => {}
            }
            ratio.simplify::<2>();
            self.ramp_extractor
                .process(ratio, true, external_clock, ramps.external);
            internal_frequency = 0.0;
        } else {
            let rate = match self.range {
                TGeneratorRange::FourX => 8.0,
                TGeneratorRange::QuarterX => 0.5,
                TGeneratorRange::OneX => 2.0,
            };
            internal_frequency = rate * self.one_hertz * semitones_to_ratio(self.rate);
        }
        self.use_external_clock = use_external_clock;

        for i in 0..size {
            let mut frequency = if use_external_clock {
                ramps.external[i] - self.previous_external_ramp_value
            } else {
                internal_frequency
            };
            if frequency < 0.0 {
                frequency += 1.0;
            }

            let jittery_frequency = frequency * self.jitter_multiplier;
            self.master_phase += jittery_frequency;
            self.phase_difference += frequency - jittery_frequency;

            if self.master_phase > 1.0 {
                self.master_phase -= 1.0;

                let random_vector = self.sequence.next_vector(stream);

                let jitter_amount = self.jitter * self.jitter * self.jitter * self.jitter * 36.0;
                let x = fast_beta_sample(random_vector.jitter);
                let mut multiplier = semitones_to_ratio((x * 2.0 - 1.0) * jitter_amount);

                // The larger the accumulated difference with the straight
                // clock, the harder the jittered clock is pulled back, so
                // it never drifts more than a beat away.
                multiplier *= if self.phase_difference > 0.0 {
                    1.0 + self.phase_difference
                } else {
                    1.0 / (1.0 - self.phase_difference)
                };

                self.jitter_multiplier = multiplier;
                self.configure_slave_ramps(&random_vector);
            }

            if internal_frequency != 0.0 {
                ramps.external[i] = self.master_phase;
            }
            self.previous_external_ramp_value = ramps.external[i];
            ramps.master[i] = self.master_phase;

            for j in 0..NUM_T_CHANNELS {
                self.slave_ramp[j].process(
                    frequency * self.jitter_multiplier,
                    &mut ramps.slave[j][i],
                    &mut gate[i * NUM_T_CHANNELS + j],
                );
            }
        }
    }
}
