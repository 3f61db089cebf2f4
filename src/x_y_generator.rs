//! X/Y Voltage Generation
//!
//! Coordinates the four voltage channels: three correlated X channels and
//! one slow Y channel. X1 draws live from the shared deja vu sequence and
//! records its output; X2 and X3 replay that history (time shifted and
//! hash scrambled respectively), so the three channels are correlated but
//! never identical, and lock together when deja vu is engaged.
//!
//! The X clock comes either from an external gate input through a dedicated
//! [`RampExtractor`], or from the T section's ramps (each X channel riding
//! its own T channel, or all three on one). Y runs at a rational division of
//! the master clock through a [`RampDivider`].

use serde::{Deserialize, Serialize};

use crate::gate::GateFlags;
use crate::output_channel::{OutputChannel, VoltageRange, NUM_SCALES};
use crate::quantizer::{Scale, ScaleError};
use crate::ramp_divider::RampDivider;
use crate::ramp_extractor::RampExtractor;
use crate::ratio::Ratio;
use crate::rng::RandomStream;
use crate::sequence::RandomSequence;

/// Largest block the generators are sized for.
pub const MAX_BLOCK_SIZE: usize = 96;

pub const NUM_X_CHANNELS: usize = 3;
/// X1, X2, X3, Y.
pub const NUM_XY_CHANNELS: usize = 4;

const X2_REPLAY_SHIFT: usize = 1;
const X3_REPLAY_SEED: u32 = 0x636f_9b1d;

/// How the group bias/spread controls fan out over the three X channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ControlMode {
    /// All channels share the group settings.
    #[default]
    Identical,
    /// The middle channel mirrors the bias of the outer two.
    Bump,
    /// The bias sweeps low to high across the three channels.
    Tilt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClockSource {
    External,
    /// X1, X2, X3 ride T1, the master clock, and T3 respectively.
    InternalT1T2T3,
    InternalT1,
    InternalT2,
    InternalT3,
}

/// Parameter set for the X group or the Y channel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GroupSettings {
    pub control_mode: ControlMode,
    pub voltage_range: VoltageRange,
    pub register_mode: bool,
    pub register_value: f32,
    pub spread: f32,
    pub bias: f32,
    pub steps: f32,
    pub deja_vu: f32,
    pub length: usize,
    pub ratio: Ratio,
    pub scale_index: usize,
}

impl Default for GroupSettings {
    fn default() -> Self {
        Self {
            control_mode: ControlMode::Identical,
            voltage_range: VoltageRange::Positive,
            register_mode: false,
            register_value: 0.0,
            spread: 0.5,
            bias: 0.5,
            steps: 0.5,
            deja_vu: 0.5,
            length: 8,
            ratio: Ratio::UNITY,
            scale_index: 0,
        }
    }
}

/// Read-only view of the T section's ramps for internally clocked X.
pub struct XYClocks<'a> {
    pub external: &'a [GateFlags],
    pub t1: &'a [f32],
    pub master: &'a [f32],
    pub t3: &'a [f32],
}

pub struct XYGenerator {
    channels: [OutputChannel; NUM_XY_CHANNELS],
    x_sequence: RandomSequence,
    y_sequence: RandomSequence,
    ramp_extractor: RampExtractor,
    ramp_divider: RampDivider,
    external_ramp: [f32; MAX_BLOCK_SIZE],
    y_ramp: [f32; MAX_BLOCK_SIZE],
}

impl XYGenerator {
    pub fn new(stream: &mut RandomStream, sample_rate: f32) -> Self {
        let mut x_sequence = RandomSequence::new();
        x_sequence.init(stream);
        let mut y_sequence = RandomSequence::new();
        y_sequence.init(stream);
        Self {
            channels: [
                OutputChannel::new(),
                OutputChannel::new(),
                OutputChannel::new(),
                OutputChannel::new(),
            ],
            x_sequence,
            y_sequence,
            ramp_extractor: RampExtractor::new(sample_rate, 1000.0 / sample_rate),
            ramp_divider: RampDivider::new(),
            external_ramp: [0.0; MAX_BLOCK_SIZE],
            y_ramp: [0.0; MAX_BLOCK_SIZE],
        }
    }

    /// Install a scale in one of the six slots, on all four channels.
    pub fn load_scale(&mut self, index: usize, scale: &Scale) -> Result<(), ScaleError> {
        scale.validate()?;
        for channel in self.channels.iter_mut() {
            channel.load_scale(index % NUM_SCALES, scale)?;
        }
        Ok(())
    }

    fn channel_bias(control_mode: ControlMode, bias: f32, channel: usize) -> f32 {
        match control_mode {
            ControlMode::Identical => bias,
            ControlMode::Bump => {
                if channel == 1 {
                    1.0 - bias
                } else {
                    bias
                }
            }
            ControlMode::Tilt => match channel {
                0 => 1.0 - bias,
                1 => 0.5,
                _ => bias,
            },
        }
    }

    /// Render one block of interleaved voltages (X1, X2, X3, Y per sample).
    pub fn process(
        &mut self,
        stream: &mut RandomStream,
        clock_source: ClockSource,
        x: &GroupSettings,
        y: &GroupSettings,
        clocks: &XYClocks<'_>,
        output: &mut [f32],
    ) {
        let size = clocks.master.len();
        assert!(size <= MAX_BLOCK_SIZE);
        assert_eq!(output.len(), size * NUM_XY_CHANNELS);

        let Self {
            channels,
            x_sequence,
            y_sequence,
            ramp_extractor,
            ramp_divider,
            external_ramp,
            y_ramp,
        } = self;

        if clock_source == ClockSource::External {
            ramp_extractor.process(
                x.ratio,
                false,
                clocks.external,
                &mut external_ramp[..size],
            );
        }

        x_sequence.set_deja_vu(x.deja_vu, x.length);
        y_sequence.set_deja_vu(y.deja_vu, y.length);

        for (i, channel) in channels.iter_mut().take(NUM_X_CHANNELS).enumerate() {
            channel.spread = x.spread;
            channel.bias = Self::channel_bias(x.control_mode, x.bias, i);
            channel.steps = x.steps;
            channel.register_mode = x.register_mode;
            channel.register_value = x.register_value;
            channel.voltage_range = x.voltage_range;
            channel.scale_index = x.scale_index;

            let ramp: &[f32] = match clock_source {
                ClockSource::External => &external_ramp[..size],
                ClockSource::InternalT1T2T3 => match i {
                    0 => clocks.t1,
                    1 => clocks.master,
                    _ => clocks.t3,
                },
                ClockSource::InternalT1 => clocks.t1,
                ClockSource::InternalT2 => clocks.master,
                ClockSource::InternalT3 => clocks.t3,
            };

            match i {
                0 => x_sequence.record(),
                1 => x_sequence.replay_shifted(X2_REPLAY_SHIFT),
                _ => x_sequence.replay_pseudo_random(X3_REPLAY_SEED),
            }
            channel.process(stream, x_sequence, ramp, output, i, NUM_XY_CHANNELS);
        }
        x_sequence.record();

        // Y follows a division of whatever clocks the X group.
        let y_master: &[f32] = if clock_source == ClockSource::External {
            &external_ramp[..size]
        } else {
            clocks.master
        };
        ramp_divider.process(y.ratio, y_master, &mut y_ramp[..size]);

        let y_channel = &mut channels[NUM_X_CHANNELS];
        y_channel.spread = y.spread;
        y_channel.bias = y.bias;
        y_channel.steps = y.steps;
        y_channel.register_mode = false;
        y_channel.voltage_range = y.voltage_range;
        y_channel.scale_index = y.scale_index;
        y_channel.process(
            stream,
            y_sequence,
            &y_ramp[..size],
            output,
            NUM_X_CHANNELS,
            NUM_XY_CHANNELS,
        );
    }
}
