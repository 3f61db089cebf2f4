//! Looping Random Sequences
//!
//! The deja vu mechanism: every draw either replays a slot from a short
//! loop buffer or creates a fresh random value (which enters the loop,
//! evicting the oldest slot). The deja vu amount steers the blend:
//!
//! - 0.5: always fresh values, plain randomness,
//! - 0.0: the loop replays in order, a locked repeating sequence,
//! - 1.0: the loop replays in random order.
//!
//! In between, the replay probability is (2 deja_vu - 1)^2, so the control
//! sweeps continuously from locked, through random, back to locked.
//!
//! Every produced value is also pushed into a history ring so that other
//! channels can replay this sequence, either shifted in time or scrambled
//! through a hash, without consuming their own randomness.

use crate::ring::Ring;
use crate::rng::RandomStream;

/// Number of slots in the deja vu loop.
pub const LOOP_SIZE: usize = 16;

const HISTORY: usize = 16;

/// One tick's worth of random decisions for the gate generator: a uniform
/// draw and a pulse width per channel, plus shared jitter and probability
/// draws. Always consumes six values from the sequence so the deja vu loop
/// stays aligned across ticks.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomVector {
    pub u: [f32; 2],
    pub pulse_width: [f32; 2],
    pub jitter: f32,
    pub p: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReplayMode {
    Record,
    Shifted(usize),
    PseudoRandom(u32),
}

/// What the last draw did, so `rewrite_value` can patch it afterwards.
#[derive(Debug, Clone, Copy)]
enum LastDraw {
    None,
    Wrote(usize),
    Replayed,
}

#[derive(Debug, Clone)]
pub struct RandomSequence {
    loop_values: [f32; LOOP_SIZE],
    history: Ring<f32, HISTORY>,
    length: usize,
    step: usize,
    deja_vu: f32,
    replay_mode: ReplayMode,
    last_draw: LastDraw,
}

impl RandomSequence {
    pub fn new() -> Self {
        Self {
            loop_values: [0.5; LOOP_SIZE],
            history: Ring::filled(0.5),
            length: 8,
            step: 0,
            deja_vu: 0.5,
            replay_mode: ReplayMode::Record,
            last_draw: LastDraw::None,
        }
    }

    /// Seed the loop buffer from the stream so a freshly locked loop plays
    /// something other than a constant.
    pub fn init(&mut self, stream: &mut RandomStream) {
        for slot in self.loop_values.iter_mut() {
            *slot = stream.next_float();
        }
        self.step = 0;
        self.last_draw = LastDraw::None;
    }

    pub fn set_deja_vu(&mut self, deja_vu: f32, length: usize) {
        self.deja_vu = deja_vu.clamp(0.0, 1.0);
        let length = length.clamp(1, LOOP_SIZE);
        if length != self.length {
            self.length = length;
            self.step %= length;
        }
    }

    pub fn deja_vu(&self) -> f32 {
        self.deja_vu
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Produce values normally and record them into the history ring.
    pub fn record(&mut self) {
        self.replay_mode = ReplayMode::Record;
    }

    /// Replay the recorded history, `shift` draws behind the live output.
    pub fn replay_shifted(&mut self, shift: usize) {
        self.replay_mode = ReplayMode::Shifted(shift.min(HISTORY - 1));
    }

    /// Replay a deterministic scramble of the live output: same loop
    /// structure, different values per seed.
    pub fn replay_pseudo_random(&mut self, seed: u32) {
        self.replay_mode = ReplayMode::PseudoRandom(seed);
    }

    /// A deterministic consumer only trusts replayed history that matches
    /// its own value; disagreement yields the neutral midpoint.
    fn confirm(replayed: f32, value: f32) -> f32 {
        if (replayed - value.rem_euclid(1.0)).abs() < 1e-4 {
            replayed
        } else {
            0.5
        }
    }

    /// Draw the next value. With `deterministic` set, fresh values come from
    /// `value` (wrapped into [0, 1)) instead of the stream, the deja vu
    /// replay structure still applies, and replayed history is returned only
    /// when it agrees with `value`.
    pub fn next_value(&mut self, stream: &mut RandomStream, deterministic: bool, value: f32) -> f32 {
        match self.replay_mode {
            ReplayMode::Shifted(shift) => {
                self.last_draw = LastDraw::Replayed;
                let replayed = *self.history.at(shift);
                return if deterministic {
                    Self::confirm(replayed, value)
                } else {
                    replayed
                };
            }
            ReplayMode::PseudoRandom(seed) => {
                self.last_draw = LastDraw::Replayed;
                let bits = self.history.at(0).to_bits() ^ seed;
                let scrambled = bits.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                let replayed = (scrambled >> 8) as f32 / 16_777_216.0;
                return if deterministic {
                    Self::confirm(replayed, value)
                } else {
                    replayed
                };
            }
            ReplayMode::Record => {}
        }

        let deviation = 2.0 * self.deja_vu - 1.0;
        let replay_probability = deviation * deviation;
        let replay = stream.next_float() < replay_probability;

        let output;
        if replay {
            if self.deja_vu > 0.5 && stream.next_float() < replay_probability {
                // Locked high side: jump anywhere within the loop.
                self.step = (stream.next_float() * self.length as f32) as usize % self.length;
            } else {
                self.step = (self.step + 1) % self.length;
            }
            output = self.loop_values[self.step];
            self.last_draw = LastDraw::Replayed;
        } else {
            self.step = (self.step + 1) % self.length;
            output = if deterministic {
                value.rem_euclid(1.0)
            } else {
                stream.next_float()
            };
            self.loop_values[self.step] = output;
            self.last_draw = LastDraw::Wrote(self.step);
        }
        self.history.push(output);
        output
    }

    /// Draw the six values of one tick's [`RandomVector`].
    pub fn next_vector(&mut self, stream: &mut RandomStream) -> RandomVector {
        RandomVector {
            u: [
                self.next_value(stream, false, 0.0),
                self.next_value(stream, false, 0.0),
            ],
            pulse_width: [
                self.next_value(stream, false, 0.0),
                self.next_value(stream, false, 0.0),
            ],
            jitter: self.next_value(stream, false, 0.0),
            p: self.next_value(stream, false, 0.0),
        }
    }

    /// Patch the most recent draw, if it created a fresh value, so the loop
    /// remembers the post-processed (e.g. quantized) version. Replayed draws
    /// are left untouched. Returns the value now committed for that draw.
    pub fn rewrite_value(&mut self, value: f32) -> f32 {
        match self.last_draw {
            LastDraw::Wrote(index) => {
                let wrapped = value.rem_euclid(1.0);
                self.loop_values[index] = wrapped;
                *self.history.current_mut() = wrapped;
                wrapped
            }
            LastDraw::Replayed => *self.history.current(),
            LastDraw::None => value.rem_euclid(1.0),
        }
    }
}

impl Default for RandomSequence {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locked_low_replays_in_order() {
        let mut stream = RandomStream::new(123);
        let mut sequence = RandomSequence::new();
        sequence.init(&mut stream);
        sequence.set_deja_vu(0.0, 4);

        let first_cycle: Vec<f32> = (0..4)
            .map(|_| sequence.next_value(&mut stream, false, 0.0))
            .collect();
        for _ in 0..3 {
            for &expected in &first_cycle {
                assert_eq!(sequence.next_value(&mut stream, false, 0.0), expected);
            }
        }
    }

    #[test]
    fn test_unlocked_produces_fresh_values() {
        let mut stream = RandomStream::new(7);
        let mut sequence = RandomSequence::new();
        sequence.init(&mut stream);
        sequence.set_deja_vu(0.5, 8);

        let values: Vec<f32> = (0..32)
            .map(|_| sequence.next_value(&mut stream, false, 0.0))
            .collect();
        // 32 fresh uniform draws never all coincide with an 8-long loop.
        let repeats = values
            .windows(9)
            .filter(|w| w[0] == w[8])
            .count();
        assert_eq!(repeats, 0);
    }

    #[test]
    fn test_deterministic_passthrough() {
        let mut stream = RandomStream::new(99);
        let mut sequence = RandomSequence::new();
        sequence.init(&mut stream);
        sequence.set_deja_vu(0.5, 8);

        let out = sequence.next_value(&mut stream, true, 1.7);
        assert!((out - 0.7).abs() < 1e-6);
        let out = sequence.next_value(&mut stream, true, -0.25);
        assert!((out - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_rewrite_patches_fresh_draw() {
        let mut stream = RandomStream::new(5);
        let mut sequence = RandomSequence::new();
        sequence.init(&mut stream);
        sequence.set_deja_vu(0.5, 1);

        sequence.next_value(&mut stream, false, 0.0);
        assert_eq!(sequence.rewrite_value(0.25), 0.25);
        sequence.set_deja_vu(0.0, 1);
        assert_eq!(sequence.next_value(&mut stream, false, 0.0), 0.25);
    }

    #[test]
    fn test_rewrite_ignores_replayed_draw() {
        let mut stream = RandomStream::new(5);
        let mut sequence = RandomSequence::new();
        sequence.init(&mut stream);
        sequence.set_deja_vu(0.0, 2);

        let first = sequence.next_value(&mut stream, false, 0.0);
        // The rewrite reports the replayed value it left in place.
        assert_eq!(sequence.rewrite_value(0.9), first);
        // Two more steps wrap back to the same slot, still unpatched.
        sequence.next_value(&mut stream, false, 0.0);
        assert_eq!(sequence.next_value(&mut stream, false, 0.0), first);
    }

    #[test]
    fn test_replay_shifted_follows_history() {
        let mut stream = RandomStream::new(21);
        let mut sequence = RandomSequence::new();
        sequence.init(&mut stream);
        sequence.set_deja_vu(0.5, 8);

        let mut outputs = Vec::new();
        for _ in 0..5 {
            outputs.push(sequence.next_value(&mut stream, false, 0.0));
        }
        sequence.replay_shifted(0);
        assert_eq!(sequence.next_value(&mut stream, false, 0.0), outputs[4]);
        sequence.replay_shifted(2);
        assert_eq!(sequence.next_value(&mut stream, false, 0.0), outputs[2]);
        sequence.record();
    }

    #[test]
    fn test_deterministic_replay_confirms_history() {
        let mut stream = RandomStream::new(11);
        let mut sequence = RandomSequence::new();
        sequence.init(&mut stream);
        sequence.set_deja_vu(0.5, 8);

        // Prime the history with a steady deterministic value.
        for _ in 0..8 {
            sequence.next_value(&mut stream, true, 0.7);
        }
        sequence.replay_shifted(0);
        // Consistent history: the replayed value passes through.
        let agree = sequence.next_value(&mut stream, true, 0.7);
        assert!((agree - 0.7).abs() < 1e-6);
        // A value the history never held yields the neutral midpoint.
        let disagree = sequence.next_value(&mut stream, true, 0.2);
        assert_eq!(disagree, 0.5);
        sequence.record();
    }

    #[test]
    fn test_replay_pseudo_random_is_seed_stable() {
        let mut stream = RandomStream::new(4);
        let mut sequence = RandomSequence::new();
        sequence.init(&mut stream);
        sequence.set_deja_vu(0.5, 8);
        sequence.next_value(&mut stream, false, 0.0);

        sequence.replay_pseudo_random(0xdead_beef);
        let a = sequence.next_value(&mut stream, false, 0.0);
        let b = sequence.next_value(&mut stream, false, 0.0);
        assert_eq!(a, b);
        assert!((0.0..1.0).contains(&a));

        sequence.replay_pseudo_random(0x1234_5678);
        let c = sequence.next_value(&mut stream, false, 0.0);
        assert_ne!(a, c);
    }
}
