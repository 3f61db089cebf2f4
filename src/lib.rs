//! # Rampgen: Clock Ramp Recovery and Random Gate/Voltage Generation
//!
//! `rampgen` is a Rust library for modular-synthesis clock utilities: it
//! recovers a stable phase ramp from a noisy external clock and drives a
//! bank of randomized gate and voltage generators from it.
//!
//! ## Architecture
//!
//! The library is organized in three layers:
//!
//! - **Ramp layer** - gate edge classification, multi-strategy period
//!   prediction, the [`ramp_extractor::RampExtractor`] state machine, and
//!   the rational dividers and slave ramps derived from it
//! - **Random layer** - a seeded deterministic stream, the deja vu looping
//!   [`sequence::RandomSequence`], and the distribution shaping tools
//! - **Generation layer** - the T gate models, the X/Y voltage channels
//!   with scale quantization, and the [`engine::Engine`] tying both to a
//!   block-based caller interface
//!
//! ## Quick Start
//!
//! ```rust
//! use rampgen::prelude::*;
//!
//! // Create an engine at 32 kHz with a fixed random seed.
//! let mut engine = Engine::new(0xfeed, 32000.0);
//!
//! let parameters = EngineParameters {
//!     t_rate: 24.0, // 8 Hz internal clock
//!     ..EngineParameters::default()
//! };
//!
//! // Process one 32-sample block with unpatched clock inputs.
//! let t_clock = [false; 32];
//! let xy_clock = [false; 32];
//! let mut voltages = [0.0f32; 32 * 4];
//! let mut gates = [false; 32 * 3];
//! let mut outputs = EngineOutputs {
//!     voltages: &mut voltages,
//!     gates: &mut gates,
//! };
//! engine.process(&parameters, &t_clock, &xy_clock, &mut outputs);
//! ```

pub mod distributions;
pub mod engine;
pub mod gate;
pub mod output_channel;
pub mod predictor;
pub mod quantizer;
pub mod ramp_divider;
pub mod ramp_extractor;
pub mod ratio;
pub mod ring;
pub mod rng;
pub mod sequence;
pub mod slave_ramp;
pub mod t_generator;
pub mod x_y_generator;

#[cfg(test)]
mod fixtures;

/// Prelude module for convenient imports
pub mod prelude {
    // Ramp layer
    pub use crate::gate::{GateEdgeClassifier, GateFlags};
    pub use crate::predictor::{PeriodPredictorBank, Prediction, Pulse};
    pub use crate::ramp_divider::RampDivider;
    pub use crate::ramp_extractor::RampExtractor;
    pub use crate::ratio::Ratio;
    pub use crate::slave_ramp::SlaveRamp;

    // Random layer
    pub use crate::distributions::{beta_sample, fast_beta_sample, DiscreteDistribution, Token};
    pub use crate::rng::{RandomStream, Rng};
    pub use crate::sequence::{RandomSequence, RandomVector};

    // Generation layer
    pub use crate::engine::{
        deja_vu_deadband, Engine, EngineOutputs, EngineParameters, GATE_DELAY, MAX_BLOCK_SIZE,
    };
    pub use crate::output_channel::{OutputChannel, VoltageRange};
    pub use crate::quantizer::{
        Degree, DiscreteDistributionQuantizer, HysteresisQuantizer, Quantizer, Scale, ScaleError,
    };
    pub use crate::t_generator::{TGenerator, TGeneratorModel, TGeneratorRange, TRamps};
    pub use crate::x_y_generator::{
        ClockSource, ControlMode, GroupSettings, XYClocks, XYGenerator,
    };
}
