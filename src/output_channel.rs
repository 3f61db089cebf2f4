//! Output Voltage Channels
//!
//! One X or Y channel: on every master ramp wrap it draws from a (possibly
//! replayed) [`RandomSequence`], shapes the draw through the beta
//! distribution, maps it to a voltage range, optionally quantizes it to a
//! scale, and renders the transition over the following cycle.
//!
//! The `steps` control packs two behaviors:
//! - below 0.5: continuous output, with glide time growing toward 0 (a full
//!   cycle of smoothstep lag at 0, an instant step at 0.5),
//! - above 0.5: stepped output with progressive scale quantization, feeding
//!   the quantized result back into the sequence loop so a locked loop
//!   replays what was actually played.

use serde::{Deserialize, Serialize};

use crate::distributions::beta_sample;
use crate::quantizer::{Quantizer, Scale, ScaleError};
use crate::rng::RandomStream;
use crate::sequence::RandomSequence;

/// Scale slots selectable per channel.
pub const NUM_SCALES: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VoltageRange {
    /// 0 V to 2 V.
    Narrow,
    /// 0 V to 5 V.
    #[default]
    Positive,
    /// -5 V to +5 V.
    Full,
}

impl VoltageRange {
    #[inline]
    fn to_volts(self, unit: f32) -> f32 {
        match self {
            VoltageRange::Narrow => 2.0 * unit,
            VoltageRange::Positive => 5.0 * unit,
            VoltageRange::Full => 10.0 * (unit - 0.5),
        }
    }

    #[inline]
    fn to_unit(self, volts: f32) -> f32 {
        match self {
            VoltageRange::Narrow => volts / 2.0,
            VoltageRange::Positive => volts / 5.0,
            VoltageRange::Full => volts / 10.0 + 0.5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutputChannel {
    pub spread: f32,
    pub bias: f32,
    pub steps: f32,
    pub register_mode: bool,
    pub register_value: f32,
    pub voltage_range: VoltageRange,
    pub scale_index: usize,

    quantizers: [Quantizer; NUM_SCALES],
    previous_phase: f32,
    previous_voltage: f32,
    target_voltage: f32,
}

impl OutputChannel {
    pub fn new() -> Self {
        let mut channel = Self {
            spread: 0.5,
            bias: 0.5,
            steps: 0.5,
            register_mode: false,
            register_value: 0.0,
            voltage_range: VoltageRange::default(),
            scale_index: 0,
            quantizers: [
                Quantizer::new(),
                Quantizer::new(),
                Quantizer::new(),
                Quantizer::new(),
                Quantizer::new(),
                Quantizer::new(),
            ],
            previous_phase: 0.0,
            previous_voltage: 0.0,
            target_voltage: 0.0,
        };
        channel.quantizers[0].init(&Scale::major());
        channel
    }

    /// Install a scale in one of the six slots.
    pub fn load_scale(&mut self, index: usize, scale: &Scale) -> Result<(), ScaleError> {
        scale.validate()?;
        self.quantizers[index % NUM_SCALES].init(scale);
        Ok(())
    }

    fn quantization_amount(&self) -> f32 {
        ((self.steps - 0.5) * 2.0).clamp(0.0, 1.0)
    }

    fn smoothness(&self) -> f32 {
        (1.0 - 2.0 * self.steps).clamp(0.0, 1.0)
    }

    fn draw_target(&mut self, stream: &mut RandomStream, sequence: &mut RandomSequence) {
        self.previous_voltage = self.target_voltage;

        let unit = if self.register_mode {
            sequence.next_value(stream, true, self.register_value)
        } else {
            let u = sequence.next_value(stream, false, 0.0);
            beta_sample(u, self.spread, self.bias)
        };
        let mut voltage = self.voltage_range.to_volts(unit);

        let amount = self.quantization_amount();
        if amount > 0.0 {
            voltage =
                self.quantizers[self.scale_index % NUM_SCALES].process(voltage, amount, false);
            // Store the played note, not the raw draw, so a locked loop
            // replays the audible sequence.
            sequence.rewrite_value(self.voltage_range.to_unit(voltage));
        }
        self.target_voltage = voltage;
    }

    /// Render one block. `phase` is the master ramp; the output is written
    /// every `stride` samples starting at `offset`, for interleaved
    /// multi-channel buffers.
    pub fn process(
        &mut self,
        stream: &mut RandomStream,
        sequence: &mut RandomSequence,
        phase: &[f32],
        output: &mut [f32],
        offset: usize,
        stride: usize,
    ) {
        let smoothness = self.smoothness();
        for (i, &p) in phase.iter().enumerate() {
            if p < self.previous_phase {
                self.draw_target(stream, sequence);
            }
            self.previous_phase = p;

            let value = if smoothness > 0.001 {
                let t = (p / smoothness).min(1.0);
                let s = t * t * (3.0 - 2.0 * t);
                self.previous_voltage + (self.target_voltage - self.previous_voltage) * s
            } else {
                self.target_voltage
            };
            output[offset + i * stride] = value;
        }
    }
}

impl Default for OutputChannel {
    fn default() -> Self {
        Self::new()
    }
}
