//! Seedable Random Number Generation
//!
//! Xorshift128+ generator feeding a small [`RandomStream`] faucet that the
//! sequence/generator layer draws from. The stream is owned by the caller
//! and passed down by `&mut` reference, so two engines with the same seed
//! produce identical output sample for sample.

/// A seedable random number generator using Xorshift128+.
///
/// Fast, period 2^128 - 1, good enough for control-rate randomness. Not a
/// cryptographic generator.
#[derive(Debug, Clone, Copy)]
pub struct Rng {
    s0: u64,
    s1: u64,
}

impl Rng {
    /// Create a new RNG with the given state words.
    ///
    /// The words should not both be zero.
    #[inline]
    pub const fn new(s0: u64, s1: u64) -> Self {
        let s0 = if s0 == 0 && s1 == 0 { 1 } else { s0 };
        Self { s0, s1 }
    }

    /// Create a new RNG from a single 64-bit seed via splitmix64.
    #[inline]
    pub fn from_seed(seed: u64) -> Self {
        let s0 = splitmix64(seed);
        let s1 = splitmix64(seed.wrapping_add(0x9e37_79b9_7f4a_7c15));
        Self::new(s0, s1)
    }

    /// Generate the next u64 value.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let s0 = self.s0;
        let mut s1 = self.s1;
        let result = s0.wrapping_add(s1);

        s1 ^= s0;
        self.s0 = s0.rotate_left(24) ^ s1 ^ (s1 << 16);
        self.s1 = s1.rotate_left(37);

        result
    }

    /// Generate a random u32 word.
    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    /// Generate a random f32 in [0.0, 1.0).
    #[inline]
    pub fn next_f32(&mut self) -> f32 {
        // Upper 24 bits for the mantissa.
        (self.next_u64() >> 40) as f32 * (1.0 / (1u32 << 24) as f32)
    }
}

impl Default for Rng {
    fn default() -> Self {
        Self::new(0x853c_49e6_748f_ea9b, 0xda3e_39cb_94b9_5bdb)
    }
}

/// Splitmix64 mixing function for deriving state from seeds.
#[inline]
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

/// The entropy faucet consumed by the random-sequence layer.
///
/// Thin wrapper today, but it is the one seam through which all draws pass,
/// which keeps the generators deterministic under a fixed seed and lets the
/// tests substitute a known stream.
#[derive(Debug, Clone)]
pub struct RandomStream {
    rng: Rng,
}

impl RandomStream {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Rng::from_seed(seed),
        }
    }

    #[inline]
    pub fn next_float(&mut self) -> f32 {
        self.rng.next_f32()
    }

    #[inline]
    pub fn next_word(&mut self) -> u32 {
        self.rng.next_u32()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rng_deterministic() {
        let mut a = Rng::from_seed(12345);
        let mut b = Rng::from_seed(12345);
        for _ in 0..100 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn test_rng_different_seeds() {
        let mut a = Rng::from_seed(12345);
        let mut b = Rng::from_seed(54321);
        assert_ne!(a.next_u64(), b.next_u64());
    }

    #[test]
    fn test_f32_range() {
        let mut rng = Rng::from_seed(42);
        for _ in 0..1000 {
            let v = rng.next_f32();
            assert!((0.0..1.0).contains(&v), "value {} out of range", v);
        }
    }

    #[test]
    fn test_f32_mean() {
        let mut rng = Rng::from_seed(42);
        let count = 10000;
        let sum: f32 = (0..count).map(|_| rng.next_f32()).sum();
        let mean = sum / count as f32;
        assert!((mean - 0.5).abs() < 0.02, "mean {} too far from 0.5", mean);
    }

    #[test]
    fn test_zero_seed_handling() {
        let mut rng = Rng::new(0, 0);
        let v = rng.next_f32();
        assert!((0.0..1.0).contains(&v));
    }

    #[test]
    fn test_stream_determinism() {
        let mut a = RandomStream::new(7);
        let mut b = RandomStream::new(7);
        for _ in 0..64 {
            assert_eq!(a.next_float(), b.next_float());
            assert_eq!(a.next_word(), b.next_word());
        }
    }
}
