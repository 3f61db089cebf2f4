//! Scale Quantization
//!
//! Three quantizers share the [`Scale`] description:
//!
//! - [`Quantizer`]: projects a voltage onto the nearest scale degree, with a
//!   continuous crossfade from passthrough to full snap and an optional
//!   hysteresis margin against boundary chatter.
//! - [`DiscreteDistributionQuantizer`]: samples a degree from the weighted
//!   distribution instead of snapping, for probabilistic note generation.
//! - [`HysteresisQuantizer`]: maps a continuous control to a table index
//!   without chattering at cell boundaries. Used for pattern and ratio
//!   tables, not for pitch.
//!
//! Scales come from the host. Validation happens at configuration time via
//! [`Scale::validate`]; the audio path never returns errors and treats an
//! invalid scale as "no quantization".

use std::error::Error;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::distributions::DiscreteDistribution;

/// Maximum number of degrees per scale.
pub const MAX_DEGREES: usize = 16;

/// One step of a scale: a voltage offset within the base interval, and a
/// weight expressing how structurally important the degree is (255 = root).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Degree {
    pub voltage: f32,
    pub weight: u8,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Scale {
    /// Repetition interval in volts, 1.0 for an octave.
    pub base_interval: f32,
    pub degrees: [Degree; MAX_DEGREES],
    pub num_degrees: usize,
}

/// Why a host-supplied scale was rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum ScaleError {
    NoDegrees,
    TooManyDegrees(usize),
    NonPositiveInterval(f32),
    UnsortedDegrees(usize),
    DegreeOutOfRange(usize),
}

impl fmt::Display for ScaleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScaleError::NoDegrees => write!(f, "scale has no degrees"),
            ScaleError::TooManyDegrees(n) => {
                write!(f, "scale has {} degrees, maximum is {}", n, MAX_DEGREES)
            }
            ScaleError::NonPositiveInterval(v) => {
                write!(f, "scale base interval {} is not positive", v)
            }
            ScaleError::UnsortedDegrees(i) => {
                write!(f, "scale degree {} is not in ascending order", i)
            }
            ScaleError::DegreeOutOfRange(i) => {
                write!(f, "scale degree {} lies outside the base interval", i)
            }
        }
    }
}

impl Error for ScaleError {}

impl Scale {
    /// Build a scale from `(voltage, weight)` pairs. Extra pairs beyond
    /// [`MAX_DEGREES`] are dropped.
    pub fn new(base_interval: f32, pairs: &[(f32, u8)]) -> Self {
        let mut degrees = [Degree::default(); MAX_DEGREES];
        let num_degrees = pairs.len().min(MAX_DEGREES);
        for (slot, &(voltage, weight)) in degrees.iter_mut().zip(pairs) {
            *slot = Degree { voltage, weight };
        }
        Self {
            base_interval,
            degrees,
            num_degrees,
        }
    }

    fn from_semitones(pairs: &[(u8, u8)]) -> Self {
        let mut volts = [(0.0f32, 0u8); MAX_DEGREES];
        for (slot, &(semitone, weight)) in volts.iter_mut().zip(pairs) {
            *slot = (semitone as f32 / 12.0, weight);
        }
        Scale::new(1.0, &volts[..pairs.len().min(MAX_DEGREES)])
    }

    pub fn validate(&self) -> Result<(), ScaleError> {
        if self.num_degrees == 0 {
            return Err(ScaleError::NoDegrees);
        }
        if self.num_degrees > MAX_DEGREES {
            return Err(ScaleError::TooManyDegrees(self.num_degrees));
        }
        if self.base_interval <= 0.0 {
            return Err(ScaleError::NonPositiveInterval(self.base_interval));
        }
        for i in 0..self.num_degrees {
            let degree = self.degrees[i];
            if !(0.0..self.base_interval).contains(&degree.voltage) {
                return Err(ScaleError::DegreeOutOfRange(i));
            }
            if i > 0 && degree.voltage <= self.degrees[i - 1].voltage {
                return Err(ScaleError::UnsortedDegrees(i));
            }
        }
        Ok(())
    }

    pub fn major() -> Self {
        Scale::from_semitones(&[
            (0, 255),
            (2, 64),
            (4, 128),
            (5, 64),
            (7, 192),
            (9, 64),
            (11, 32),
        ])
    }

    pub fn minor() -> Self {
        Scale::from_semitones(&[
            (0, 255),
            (2, 64),
            (3, 128),
            (5, 64),
            (7, 192),
            (8, 32),
            (10, 64),
        ])
    }

    pub fn pentatonic() -> Self {
        Scale::from_semitones(&[(0, 255), (2, 96), (4, 128), (7, 192), (9, 96)])
    }

    /// Pelog-flavored five tone scale.
    pub fn gamelan() -> Self {
        Scale::from_semitones(&[(0, 255), (1, 96), (3, 64), (7, 192), (8, 96)])
    }

    pub fn whole_tone() -> Self {
        Scale::from_semitones(&[
            (0, 255),
            (2, 64),
            (4, 128),
            (6, 64),
            (8, 128),
            (10, 64),
        ])
    }

    pub fn chromatic() -> Self {
        Scale::from_semitones(&[
            (0, 255),
            (1, 16),
            (2, 64),
            (3, 96),
            (4, 128),
            (5, 96),
            (6, 16),
            (7, 192),
            (8, 64),
            (9, 96),
            (10, 64),
            (11, 16),
        ])
    }
}

#[cfg(feature = "json")]
impl Scale {
    /// Serialize the scale definition to a JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse a scale definition from JSON. The result still needs
    /// [`Scale::validate`] before being handed to a quantizer.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl Default for Scale {
    fn default() -> Self {
        Scale::major()
    }
}

/// Continuous [0, 1] control to table index, moving only when the scaled
/// value has left the current cell by a clear margin.
#[derive(Debug, Clone, Copy, Default)]
pub struct HysteresisQuantizer {
    index: i32,
}

impl HysteresisQuantizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.index = 0;
    }

    pub fn quantize(&mut self, value: f32, num_steps: usize) -> usize {
        let scaled = value.clamp(0.0, 1.0) * (num_steps - 1) as f32;
        if (scaled - self.index as f32).abs() > 0.5 + 0.25 {
            self.index = (scaled + 0.5) as i32;
        }
        self.index = self.index.clamp(0, num_steps as i32 - 1);
        self.index as usize
    }

    /// Quantize straight into a static table.
    pub fn lookup<'a, T>(&mut self, table: &'a [T], value: f32) -> &'a T {
        &table[self.quantize(value, table.len())]
    }
}

/// Deterministic nearest-degree quantizer.
#[derive(Debug, Clone)]
pub struct Quantizer {
    scale: Scale,
    valid: bool,
    previous_degree: Option<(i32, usize)>,
}

impl Quantizer {
    pub fn new() -> Self {
        Self {
            scale: Scale::default(),
            valid: false,
            previous_degree: None,
        }
    }

    /// Adopt a scale. An invalid scale leaves the quantizer inert.
    pub fn init(&mut self, scale: &Scale) {
        self.valid = scale.validate().is_ok();
        if self.valid {
            self.scale = *scale;
        }
        self.previous_degree = None;
    }

    /// Quantize `voltage`. `amount` crossfades from passthrough (0) to full
    /// snap (1); it also gates degrees in by weight, so light quantization
    /// pulls only toward the structurally important notes.
    pub fn process(&mut self, voltage: f32, amount: f32, hysteresis: bool) -> f32 {
        if !self.valid || amount <= 0.0 {
            return voltage;
        }
        let interval = self.scale.base_interval;
        let octave = libm::floorf(voltage / interval);
        let fraction = voltage - octave * interval;

        let threshold = 255.0 * (1.0 - amount);
        let max_weight_index = (0..self.scale.num_degrees)
            .max_by_key(|&i| self.scale.degrees[i].weight)
            .unwrap_or(0);

        let mut best_index = max_weight_index;
        let mut best_distance = f32::MAX;
        for i in 0..self.scale.num_degrees {
            let degree = self.scale.degrees[i];
            if (degree.weight as f32) < threshold && i != max_weight_index {
                continue;
            }
            // Consider the degree in this interval and its neighbors, so
            // a value near the top still sees the next interval's root.
            for offset in [-interval, 0.0, interval] {
                let distance = (fraction - (degree.voltage + offset)).abs();
                if distance < best_distance {
                    best_distance = distance;
                    best_index = i;
                }
            }
        }

        if hysteresis {
            if let Some((previous_octave, previous_index)) = self.previous_degree {
                let previous_voltage = previous_octave as f32 * interval
                    + self.scale.degrees[previous_index].voltage;
                let margin = 0.05 * interval;
                if (voltage - previous_voltage).abs() < best_distance + margin {
                    // Stay put: the new candidate is not clearly closer.
                    return voltage + (previous_voltage - voltage) * amount;
                }
            }
        }

        let degree_voltage = self.scale.degrees[best_index].voltage;
        // Re-fold the chosen degree around the input.
        let mut quantized = octave * interval + degree_voltage;
        if (voltage - (quantized + interval)).abs() < (voltage - quantized).abs() {
            quantized += interval;
        } else if (voltage - (quantized - interval)).abs() < (voltage - quantized).abs() {
            quantized -= interval;
        }
        self.previous_degree = Some((
            libm::floorf(quantized / interval) as i32,
            best_index,
        ));
        voltage + (quantized - voltage) * amount
    }
}

impl Default for Quantizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Samples a degree from the weighted distribution instead of snapping:
/// `value` doubles as the random variate.
#[derive(Debug, Clone)]
pub struct DiscreteDistributionQuantizer {
    scale: Scale,
    valid: bool,
}

impl DiscreteDistributionQuantizer {
    pub fn new() -> Self {
        Self {
            scale: Scale::default(),
            valid: false,
        }
    }

    /// Adopt a scale; silently no-ops on an invalid one, leaving the
    /// quantizer as a passthrough.
    pub fn init(&mut self, scale: &Scale) {
        self.valid = scale.validate().is_ok();
        if self.valid {
            self.scale = *scale;
        }
    }

    /// Map a unit-interval variate to a voltage in the base interval.
    /// Cell widths blend from uniform (amount 0) to weight-proportional
    /// (amount 1), and the output blends from the continuous position
    /// to the cell's degree voltage.
    pub fn process(&mut self, value: f32, amount: f32) -> f32 {
        let continuous = value * if self.valid {
            self.scale.base_interval
        } else {
            1.0
        };
        if !self.valid || amount <= 0.0 {
            return continuous;
        }

        let n = self.scale.num_degrees;
        let mut total_weight = 0.0f32;
        for i in 0..n {
            total_weight += self.scale.degrees[i].weight as f32;
        }
        if total_weight <= 0.0 {
            return continuous;
        }

        let mut distribution = DiscreteDistribution::new();
        let uniform = 1.0 / n as f32;
        for i in 0..n {
            let weighted = self.scale.degrees[i].weight as f32 / total_weight;
            distribution.add_token(i, uniform + (weighted - uniform) * amount);
        }
        let token = distribution.sample(value);
        let degree_voltage = self.scale.degrees[token.token_id].voltage;
        continuous + (degree_voltage - continuous) * amount
    }
}

impl Default for DiscreteDistributionQuantizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_scale_validation() {
        assert!(Scale::major().validate().is_ok());
        assert!(Scale::chromatic().validate().is_ok());

        let empty = Scale::new(1.0, &[]);
        assert_eq!(empty.validate(), Err(ScaleError::NoDegrees));

        let bad_interval = Scale::new(0.0, &[(0.0, 255)]);
        assert!(matches!(
            bad_interval.validate(),
            Err(ScaleError::NonPositiveInterval(_))
        ));

        let unsorted = Scale::new(1.0, &[(0.5, 255), (0.25, 64)]);
        assert_eq!(unsorted.validate(), Err(ScaleError::UnsortedDegrees(1)));

        let out_of_range = Scale::new(1.0, &[(0.0, 255), (1.5, 64)]);
        assert_eq!(out_of_range.validate(), Err(ScaleError::DegreeOutOfRange(1)));
    }

    #[test]
    fn test_full_snap_chromatic() {
        let mut quantizer = Quantizer::new();
        quantizer.init(&Scale::chromatic());
        // 3.3 semitones snaps to 3.
        let v = quantizer.process(3.3 / 12.0, 1.0, false);
        assert_abs_diff_eq!(v, 3.0 / 12.0, epsilon = 1e-5);
        // Works across octaves.
        let v = quantizer.process(2.0 + 6.6 / 12.0, 1.0, false);
        assert_abs_diff_eq!(v, 2.0 + 7.0 / 12.0, epsilon = 1e-5);
    }

    #[test]
    fn test_zero_amount_is_passthrough() {
        let mut quantizer = Quantizer::new();
        quantizer.init(&Scale::major());
        assert_eq!(quantizer.process(0.123, 0.0, false), 0.123);
    }

    #[test]
    fn test_invalid_scale_is_passthrough() {
        let mut quantizer = Quantizer::new();
        quantizer.init(&Scale::new(1.0, &[]));
        assert_eq!(quantizer.process(0.777, 1.0, false), 0.777);
    }

    #[test]
    fn test_light_amount_prefers_strong_degrees() {
        let mut quantizer = Quantizer::new();
        quantizer.init(&Scale::major());
        // At amount 0.3 only weights >= 178.5 participate: root and fifth.
        // 0.25 (a major third) gets pulled toward the fifth rather than
        // toward the third.
        let v = quantizer.process(4.2 / 12.0, 0.3, false);
        let toward_fifth = (v - 4.2 / 12.0) * (7.0 / 12.0 - 4.2 / 12.0);
        assert!(toward_fifth > 0.0);
    }

    #[test]
    fn test_hysteresis_suppresses_boundary_chatter() {
        let mut quantizer = Quantizer::new();
        quantizer.init(&Scale::chromatic());
        // Jitter around the midpoint between semitones 4 and 5.
        let boundary = 4.5 / 12.0;
        let first = quantizer.process(boundary - 0.001, 1.0, true);
        for i in 0..50 {
            let wiggle = if i % 2 == 0 { 0.002 } else { -0.002 };
            let v = quantizer.process(boundary + wiggle, 1.0, true);
            assert_abs_diff_eq!(v, first, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_table_lookup_hysteresis() {
        let table = [10, 20, 30, 40];
        let mut q = HysteresisQuantizer::new();
        assert_eq!(*q.lookup(&table, 0.0), 10);
        // Small wobble around a cell center must not change the index.
        assert_eq!(*q.lookup(&table, 0.35), 20);
        assert_eq!(*q.lookup(&table, 0.28), 20);
        assert_eq!(*q.lookup(&table, 0.42), 20);
        // A decisive move does.
        assert_eq!(*q.lookup(&table, 1.0), 40);
    }

    #[test]
    fn test_distribution_quantizer_passthrough_and_bounds() {
        let mut q = DiscreteDistributionQuantizer::new();
        q.init(&Scale::new(1.0, &[]));
        assert_eq!(q.process(0.4, 1.0), 0.4);

        let mut q = DiscreteDistributionQuantizer::new();
        q.init(&Scale::pentatonic());
        for i in 0..100 {
            let u = i as f32 / 100.0;
            let v = q.process(u, 1.0);
            // Full amount: output is exactly one of the degree voltages.
            let on_degree = (0..5).any(|d| {
                (v - Scale::pentatonic().degrees[d].voltage).abs() < 1e-5
            });
            assert!(on_degree, "{} not on a degree", v);
        }
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_scale_json_round_trip() {
        let scale = Scale::pentatonic();
        let json = scale.to_json().expect("serialization failed");
        let parsed = Scale::from_json(&json).expect("parse failed");
        assert!(parsed.validate().is_ok());
        assert_eq!(parsed.num_degrees, scale.num_degrees);
        for i in 0..scale.num_degrees {
            assert_eq!(parsed.degrees[i].weight, scale.degrees[i].weight);
        }
    }
}
