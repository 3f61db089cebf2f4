//! Value Distributions and Shaping Kernels
//!
//! Small numeric kernels shared by the generators: a weighted discrete
//! distribution for probabilistic note selection, a quantile-warp sampler
//! that shapes uniform draws by spread/bias, and the pitch-ratio and
//! logistic helpers used by the clock and Markov models.

/// Maximum number of tokens a [`DiscreteDistribution`] can hold.
pub const MAX_TOKENS: usize = 16;

/// One sampled outcome: which token, and where inside its cell the draw fell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Token {
    pub token_id: usize,
    /// Position of the draw within the token's cell, in [0, 1).
    pub fraction: f32,
}

/// Cumulative-weight token table sampled with a uniform draw.
///
/// Built per call by the quantizer layer; fixed capacity, no allocation.
#[derive(Debug, Clone)]
pub struct DiscreteDistribution {
    ids: [usize; MAX_TOKENS],
    widths: [f32; MAX_TOKENS],
    num_tokens: usize,
    total_width: f32,
}

impl Default for DiscreteDistribution {
    fn default() -> Self {
        Self::new()
    }
}

impl DiscreteDistribution {
    pub fn new() -> Self {
        Self {
            ids: [0; MAX_TOKENS],
            widths: [0.0; MAX_TOKENS],
            num_tokens: 0,
            total_width: 0.0,
        }
    }

    /// Add a token with the given cell width. Zero or negative widths are
    /// ignored; so are tokens past capacity.
    pub fn add_token(&mut self, token_id: usize, width: f32) {
        if width <= 0.0 || self.num_tokens >= MAX_TOKENS {
            return;
        }
        self.ids[self.num_tokens] = token_id;
        self.widths[self.num_tokens] = width;
        self.num_tokens += 1;
        self.total_width += width;
    }

    pub fn is_empty(&self) -> bool {
        self.num_tokens == 0
    }

    /// Map a uniform draw `u` in [0, 1) to a token.
    ///
    /// Always returns a token that was actually added (the last one absorbs
    /// rounding slack at u close to 1).
    pub fn sample(&self, u: f32) -> Token {
        debug_assert!(self.num_tokens > 0);
        let target = u.clamp(0.0, 0.9999999) * self.total_width;
        let mut accumulated = 0.0;
        for i in 0..self.num_tokens {
            let width = self.widths[i];
            if target < accumulated + width || i == self.num_tokens - 1 {
                let fraction = ((target - accumulated) / width).clamp(0.0, 0.9999999);
                return Token {
                    token_id: self.ids[i],
                    fraction,
                };
            }
            accumulated += width;
        }
        unreachable!()
    }
}

/// Shape a uniform draw by `spread` and `bias`.
///
/// `spread` interpolates the distribution from a narrow peak at `bias`
/// (spread = 0) through roughly uniform (spread = 0.5) to bimodal extremes
/// (spread = 1). The median of the output tracks `bias`.
pub fn beta_sample(u: f32, spread: f32, bias: f32) -> f32 {
    let u = u.clamp(0.0, 1.0);
    let spread = spread.clamp(0.0, 1.0);
    let bias = bias.clamp(0.02, 0.98);

    // Symmetric shape warp: k < 1 concentrates around the median,
    // k > 1 pushes mass to the extremes.
    let k = if spread < 0.5 {
        1.0 / (1.0 + (0.5 - spread) * 16.0)
    } else {
        1.0 + (spread - 0.5) * 8.0
    };
    let a = libm::powf(u, k);
    let b = libm::powf(1.0 - u, k);
    let warped = if a + b > 0.0 { a / (a + b) } else { u };

    // Median shift: with w uniform, w^m has median 0.5^m = bias.
    let m = libm::logf(bias) / libm::logf(0.5);
    libm::powf(warped, m).clamp(0.0, 1.0)
}

/// Cheap bell-shaped sample around 0.5, used for clock jitter.
#[inline]
pub fn fast_beta_sample(u: f32) -> f32 {
    let centered = u.clamp(0.0, 1.0) - 0.5;
    0.5 + 4.0 * centered * centered * centered
}

/// Logistic sigmoid with the logit clamped to +/-10.
#[inline]
pub fn logistic(logit: f32) -> f32 {
    let x = logit.clamp(-10.0, 10.0);
    1.0 / (1.0 + libm::expf(-x))
}

/// Equal-temperament pitch ratio: 2^(semitones / 12).
#[inline]
pub fn semitones_to_ratio(semitones: f32) -> f32 {
    libm::exp2f(semitones / 12.0)
}
