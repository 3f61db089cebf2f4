//! Whole-System Engine
//!
//! Owns the T gate generator, the X/Y voltage generator, the shared random
//! stream, and the glue between them: clock edge classification, the deja
//! vu knob deadband, loop length selection, the Y divider table, and the
//! two sample gate delay that keeps gates aligned with the voltages after
//! DAC latency.
//!
//! The caller hands in raw boolean clocks and parameter values once per
//! block and receives interleaved voltages (X1, X2, X3, Y) plus three gate
//! streams (T1, master clock, T3).

use serde::{Deserialize, Serialize};

use crate::gate::{GateEdgeClassifier, GateFlags};
use crate::output_channel::VoltageRange;
use crate::quantizer::{HysteresisQuantizer, Scale, ScaleError};
use crate::ratio::Ratio;
use crate::rng::RandomStream;
use crate::t_generator::{TGenerator, TGeneratorModel, TGeneratorRange, TRamps, NUM_T_CHANNELS};
use crate::x_y_generator::{
    ClockSource, ControlMode, GroupSettings, XYClocks, XYGenerator, NUM_XY_CHANNELS,
};

pub use crate::x_y_generator::MAX_BLOCK_SIZE;

/// Gate outputs lag the voltages by this many samples.
pub const GATE_DELAY: usize = 2;

/// T1 gate, master clock square, T3 gate.
pub const NUM_GATE_OUTPUTS: usize = 3;

static Y_DIVIDER_RATIOS: [Ratio; 12] = [
    Ratio::new(1, 64),
    Ratio::new(1, 48),
    Ratio::new(1, 32),
    Ratio::new(1, 24),
    Ratio::new(1, 16),
    Ratio::new(1, 12),
    Ratio::new(1, 8),
    Ratio::new(1, 6),
    Ratio::new(1, 4),
    Ratio::new(1, 3),
    Ratio::new(1, 2),
    Ratio::new(1, 1),
];

/// Musically useful loop lengths, with plateau widths proportional to how
/// often each length is wanted.
static LOOP_LENGTH: [usize; 74] = [
    1, //
    2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, //
    3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, //
    4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, //
    5, 5, 5, 5, //
    6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, //
    7, 7, //
    8, 8, 8, 8, 8, 8, 8, 8, 8, //
    10, 10, 10, //
    12, 12, 12, 12, 12, 12, 12, //
    14, //
    16,
];

/// Snap the deja vu knob: a deadband around the center maps to exactly 0.5
/// (pure randomness), and the live ranges on either side are rescaled to
/// stay continuous.
pub fn deja_vu_deadband(raw: f32) -> f32 {
    if raw < 0.47 {
        raw * 1.063_829_8
    } else if raw > 0.53 {
        0.5 + (raw - 0.53) * 1.063_829_8
    } else {
        0.5
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EngineParameters {
    pub t_model: TGeneratorModel,
    pub t_range: TGeneratorRange,
    /// Semitones around the 2 Hz base clock.
    pub t_rate: f32,
    pub t_bias: f32,
    pub t_jitter: f32,
    pub t_deja_vu: bool,
    pub t_pulse_width_mean: f32,
    pub t_pulse_width_std: f32,
    pub use_external_t_clock: bool,

    /// Shared deja vu amount, before the deadband.
    pub deja_vu: f32,
    /// Shared loop length control in [0, 1].
    pub deja_vu_length: f32,

    pub x_control_mode: ControlMode,
    pub x_voltage_range: VoltageRange,
    pub x_register_mode: bool,
    pub x_register_value: f32,
    pub x_spread: f32,
    pub x_bias: f32,
    pub x_steps: f32,
    pub x_deja_vu: bool,
    pub x_scale_index: usize,
    pub xy_clock_source: ClockSource,

    pub y_voltage_range: VoltageRange,
    pub y_spread: f32,
    pub y_bias: f32,
    pub y_steps: f32,
    /// Y clock division control in [0, 1].
    pub y_divider: f32,
}

impl Default for EngineParameters {
    fn default() -> Self {
        Self {
            t_model: TGeneratorModel::default(),
            t_range: TGeneratorRange::default(),
            t_rate: 0.0,
            t_bias: 0.5,
            t_jitter: 0.0,
            t_deja_vu: false,
            t_pulse_width_mean: 0.0,
            t_pulse_width_std: 0.0,
            use_external_t_clock: false,
            deja_vu: 0.5,
            deja_vu_length: 0.5,
            x_control_mode: ControlMode::Identical,
            x_voltage_range: VoltageRange::Positive,
            x_register_mode: false,
            x_register_value: 0.0,
            x_spread: 0.5,
            x_bias: 0.5,
            x_steps: 0.5,
            x_deja_vu: false,
            x_scale_index: 0,
            xy_clock_source: ClockSource::InternalT1T2T3,
            y_voltage_range: VoltageRange::Full,
            y_spread: 0.5,
            y_bias: 0.5,
            y_steps: 0.5,
            y_divider: 1.0,
        }
    }
}

/// Caller-owned output buffers for one block.
pub struct EngineOutputs<'a> {
    /// Interleaved X1, X2, X3, Y; `4 * size` entries.
    pub voltages: &'a mut [f32],
    /// Interleaved T1, master clock, T3; `3 * size` entries.
    pub gates: &'a mut [bool],
}

pub struct Engine {
    stream: RandomStream,
    t_generator: TGenerator,
    xy_generator: XYGenerator,
    t_clock_classifier: GateEdgeClassifier,
    xy_clock_classifier: GateEdgeClassifier,
    deja_vu_length_quantizer: HysteresisQuantizer,
    y_divider_quantizer: HysteresisQuantizer,
    gate_delay_tail: [[bool; GATE_DELAY]; NUM_GATE_OUTPUTS],

    ramp_buffer: [[f32; MAX_BLOCK_SIZE]; 4],
    t_flags: [GateFlags; MAX_BLOCK_SIZE],
    xy_flags: [GateFlags; MAX_BLOCK_SIZE],
    t_gates: [bool; MAX_BLOCK_SIZE * NUM_T_CHANNELS],
}

impl Engine {
    pub fn new(seed: u64, sample_rate: f32) -> Self {
        let mut stream = RandomStream::new(seed);
        let t_generator = TGenerator::new(&mut stream, sample_rate);
        let xy_generator = XYGenerator::new(&mut stream, sample_rate);
        Self {
            stream,
            t_generator,
            xy_generator,
            t_clock_classifier: GateEdgeClassifier::new(),
            xy_clock_classifier: GateEdgeClassifier::new(),
            deja_vu_length_quantizer: HysteresisQuantizer::new(),
            y_divider_quantizer: HysteresisQuantizer::new(),
            gate_delay_tail: [[false; GATE_DELAY]; NUM_GATE_OUTPUTS],
            ramp_buffer: [[0.0; MAX_BLOCK_SIZE]; 4],
            t_flags: [GateFlags::LOW; MAX_BLOCK_SIZE],
            xy_flags: [GateFlags::LOW; MAX_BLOCK_SIZE],
            t_gates: [false; MAX_BLOCK_SIZE * NUM_T_CHANNELS],
        }
    }

    /// Install a scale in one of the X/Y scale slots.
    pub fn load_scale(&mut self, index: usize, scale: &Scale) -> Result<(), ScaleError> {
        self.xy_generator.load_scale(index, scale)
    }

    /// Render one block. `t_clock` and `xy_clock` are raw gate levels of
    /// equal length (at most [`MAX_BLOCK_SIZE`]).
    pub fn process(
        &mut self,
        parameters: &EngineParameters,
        t_clock: &[bool],
        xy_clock: &[bool],
        outputs: &mut EngineOutputs<'_>,
    ) {
        let size = t_clock.len();
        assert!(size <= MAX_BLOCK_SIZE && size >= GATE_DELAY);
        assert_eq!(xy_clock.len(), size);
        assert_eq!(outputs.voltages.len(), size * NUM_XY_CHANNELS);
        assert_eq!(outputs.gates.len(), size * NUM_GATE_OUTPUTS);

        self.t_clock_classifier
            .scan(t_clock, &mut self.t_flags[..size]);
        self.xy_clock_classifier
            .scan(xy_clock, &mut self.xy_flags[..size]);

        let deja_vu = deja_vu_deadband(parameters.deja_vu);
        let deja_vu_length = *self
            .deja_vu_length_quantizer
            .lookup(&LOOP_LENGTH, parameters.deja_vu_length);

        let t = &mut self.t_generator;
        t.model = parameters.t_model;
        t.range = parameters.t_range;
        t.rate = parameters.t_rate;
        t.bias = parameters.t_bias;
        t.jitter = parameters.t_jitter;
        t.pulse_width_mean = parameters.t_pulse_width_mean;
        t.pulse_width_std = parameters.t_pulse_width_std;
        t.sequence_mut().set_deja_vu(
            if parameters.t_deja_vu { deja_vu } else { 0.0 },
            deja_vu_length,
        );

        let [external, master, slave0, slave1] = &mut self.ramp_buffer;
        {
            let mut ramps = TRamps {
                external: &mut external[..size],
                master: &mut master[..size],
                slave: [&mut slave0[..size], &mut slave1[..size]],
            };
            t.process(
                &mut self.stream,
                parameters.use_external_t_clock,
                &self.t_flags[..size],
                &mut ramps,
                &mut self.t_gates[..size * NUM_T_CHANNELS],
            );
        }

        let x = GroupSettings {
            control_mode: parameters.x_control_mode,
            voltage_range: parameters.x_voltage_range,
            register_mode: parameters.x_register_mode,
            register_value: parameters.x_register_value,
            spread: parameters.x_spread,
            bias: parameters.x_bias,
            steps: parameters.x_steps,
            deja_vu: if parameters.x_deja_vu { deja_vu } else { 0.0 },
            length: deja_vu_length,
            ratio: Ratio::UNITY,
            scale_index: parameters.x_scale_index,
        };
        let y = GroupSettings {
            control_mode: ControlMode::Identical,
            voltage_range: parameters.y_voltage_range,
            register_mode: false,
            register_value: 0.0,
            spread: parameters.y_spread,
            bias: parameters.y_bias,
            steps: parameters.y_steps,
            deja_vu: 0.0,
            length: 1,
            ratio: *self
                .y_divider_quantizer
                .lookup(&Y_DIVIDER_RATIOS, parameters.y_divider),
            scale_index: parameters.x_scale_index,
        };

        let clocks = XYClocks {
            external: &self.xy_flags[..size],
            t1: &slave0[..size],
            master: &master[..size],
            t3: &slave1[..size],
        };
        self.xy_generator.process(
            &mut self.stream,
            parameters.xy_clock_source,
            &x,
            &y,
            &clocks,
            outputs.voltages,
        );

        // Gates leave two samples late so they line up with the settled
        // voltages; the tail carries the delayed samples across blocks.
        for (channel, tail) in self.gate_delay_tail.iter_mut().enumerate() {
            for i in 0..size {
                let current = match channel {
                    0 => self.t_gates[i * NUM_T_CHANNELS],
                    1 => master[i] < 0.5,
                    _ => self.t_gates[i * NUM_T_CHANNELS + 1],
                };
                outputs.gates[i * NUM_GATE_OUTPUTS + channel] = if i < GATE_DELAY {
                    tail[i]
                } else {
                    match channel {
                        0 => self.t_gates[(i - GATE_DELAY) * NUM_T_CHANNELS],
                        1 => master[i - GATE_DELAY] < 0.5,
                        _ => self.t_gates[(i - GATE_DELAY) * NUM_T_CHANNELS + 1],
                    }
                };
                // Keep the last GATE_DELAY raw values for the next block.
                if i >= size - GATE_DELAY {
                    tail[i - (size - GATE_DELAY)] = current;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: f32 = 32000.0;
    const BLOCK: usize = 32;

    fn run(parameters: &EngineParameters, seed: u64, samples: usize) -> (Vec<f32>, Vec<bool>) {
        let mut engine = Engine::new(seed, SAMPLE_RATE);
        let mut voltages_out = Vec::new();
        let mut gates_out = Vec::new();
        let t_clock = [false; BLOCK];
        let xy_clock = [false; BLOCK];
        let mut voltages = [0.0f32; BLOCK * NUM_XY_CHANNELS];
        let mut gates = [false; BLOCK * NUM_GATE_OUTPUTS];
        for _ in 0..samples / BLOCK {
            let mut outputs = EngineOutputs {
                voltages: &mut voltages,
                gates: &mut gates,
            };
            engine.process(parameters, &t_clock, &xy_clock, &mut outputs);
            voltages_out.extend_from_slice(&voltages);
            gates_out.extend_from_slice(&gates);
        }
        (voltages_out, gates_out)
    }

    #[test]
    fn test_deja_vu_deadband() {
        assert_eq!(deja_vu_deadband(0.5), 0.5);
        assert_eq!(deja_vu_deadband(0.48), 0.5);
        assert_eq!(deja_vu_deadband(0.52), 0.5);
        assert_eq!(deja_vu_deadband(0.0), 0.0);
        assert!((deja_vu_deadband(1.0) - 1.0).abs() < 1e-3);
        // Continuous at the deadband edges.
        assert!((deja_vu_deadband(0.4699) - 0.5).abs() < 1e-3);
        assert!((deja_vu_deadband(0.5301) - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_default_clock_routing() {
        // Each X channel rides its own T ramp out of the box.
        let parameters = EngineParameters::default();
        assert_eq!(parameters.xy_clock_source, ClockSource::InternalT1T2T3);
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_parameters_json_round_trip() {
        let parameters = EngineParameters {
            t_model: TGeneratorModel::Markov,
            x_voltage_range: VoltageRange::Full,
            xy_clock_source: ClockSource::External,
            ..EngineParameters::default()
        };
        let json = serde_json::to_string(&parameters).expect("serialization failed");
        let parsed: EngineParameters = serde_json::from_str(&json).expect("parse failed");
        assert_eq!(parsed.t_model, parameters.t_model);
        assert_eq!(parsed.x_voltage_range, parameters.x_voltage_range);
        assert_eq!(parsed.xy_clock_source, parameters.xy_clock_source);
        assert!((parsed.t_bias - parameters.t_bias).abs() < 1e-6);
    }

    #[test]
    fn test_end_to_end_bounded() {
        let parameters = EngineParameters {
            t_rate: 24.0,
            ..EngineParameters::default()
        };
        let (voltages, gates) = run(&parameters, 1, 64_000);
        for &v in &voltages {
            assert!(v.is_finite());
            assert!((-5.0 - 1e-4..=5.0 + 1e-4).contains(&v), "{} out of range", v);
        }
        // The master clock square must actually toggle.
        let master: Vec<bool> = gates
            .chunks(NUM_GATE_OUTPUTS)
            .map(|chunk| chunk[1])
            .collect();
        let toggles = master.windows(2).filter(|w| w[0] != w[1]).count();
        assert!(toggles > 10, "master clock only toggled {} times", toggles);
    }

    #[test]
    fn test_gates_fire_on_t_channels() {
        let parameters = EngineParameters {
            t_rate: 24.0,
            t_bias: 0.5,
            ..EngineParameters::default()
        };
        let (_, gates) = run(&parameters, 2, 64_000);
        let t1_high = gates
            .chunks(NUM_GATE_OUTPUTS)
            .filter(|chunk| chunk[0])
            .count();
        let t3_high = gates
            .chunks(NUM_GATE_OUTPUTS)
            .filter(|chunk| chunk[2])
            .count();
        // A complementary coin toss at bias 0.5 keeps both channels active.
        assert!(t1_high > 0);
        assert!(t3_high > 0);
    }

    #[test]
    fn test_determinism_per_seed() {
        let parameters = EngineParameters {
            t_rate: 24.0,
            ..EngineParameters::default()
        };
        let a = run(&parameters, 7, 16_000);
        let b = run(&parameters, 7, 16_000);
        assert_eq!(a.0, b.0);
        assert_eq!(a.1, b.1);
    }

    #[test]
    fn test_external_t_clock() {
        let mut engine = Engine::new(9, SAMPLE_RATE);
        let parameters = EngineParameters {
            use_external_t_clock: true,
            ..EngineParameters::default()
        };
        let mut voltages = [0.0f32; BLOCK * NUM_XY_CHANNELS];
        let mut gates = [false; BLOCK * NUM_GATE_OUTPUTS];
        let xy_clock = [false; BLOCK];
        let mut n = 0usize;
        for _ in 0..64_000 / BLOCK {
            let mut t_clock = [false; BLOCK];
            for (i, slot) in t_clock.iter_mut().enumerate() {
                // 2000-sample external clock, 25% duty.
                *slot = (n + i) % 2000 < 500;
            }
            n += BLOCK;
            let mut outputs = EngineOutputs {
                voltages: &mut voltages,
                gates: &mut gates,
            };
            engine.process(&parameters, &t_clock, &xy_clock, &mut outputs);
            for &v in voltages.iter() {
                assert!(v.is_finite());
            }
        }
    }
}
