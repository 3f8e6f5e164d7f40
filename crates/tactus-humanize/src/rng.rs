//! The per-session pseudo-random source.
//!
//! Every stochastic decision in a session draws from one `SessionRng`, so a
//! fixed seed reproduces every delay, path, and error exactly. The generator
//! is owned by the session and passed down by `&mut`; nothing here is global.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Seeded ChaCha8 generator with the sampling helpers the models need.
#[derive(Debug, Clone)]
pub struct SessionRng {
    inner: ChaCha8Rng,
    seed: u64,
}

impl SessionRng {
    pub fn seeded(seed: u64) -> Self {
        Self {
            inner: ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }

    /// Draw a fresh seed from the OS and remember it, so an unseeded session
    /// can still be replayed from its trace.
    pub fn from_entropy() -> Self {
        Self::seeded(rand::random::<u64>())
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Uniform in `[0, 1)`.
    pub fn unit(&mut self) -> f64 {
        self.inner.gen::<f64>()
    }

    /// Uniform in `[lo, hi)`; returns `lo` for an empty range.
    pub fn uniform(&mut self, lo: f64, hi: f64) -> f64 {
        if hi <= lo {
            return lo;
        }
        self.inner.gen_range(lo..hi)
    }

    /// Uniform in `[-bound, bound)`.
    pub fn symmetric(&mut self, bound: f64) -> f64 {
        if bound <= 0.0 {
            return 0.0;
        }
        self.uniform(-bound, bound)
    }

    /// Bernoulli trial. Probabilities at or outside `[0, 1]` consume nothing.
    pub fn chance(&mut self, p: f64) -> bool {
        if p <= 0.0 {
            return false;
        }
        if p >= 1.0 {
            return true;
        }
        self.unit() < p
    }

    /// `1.0` or `-1.0` with equal probability.
    pub fn sign(&mut self) -> f64 {
        if self.inner.gen::<bool>() {
            1.0
        } else {
            -1.0
        }
    }

    /// Uniform integer in `[lo, hi]`.
    pub fn range_inclusive(&mut self, lo: u32, hi: u32) -> u32 {
        if hi <= lo {
            return lo;
        }
        self.inner.gen_range(lo..=hi)
    }

    /// Normal deviate via the Box–Muller transform.
    pub fn gaussian(&mut self, mean: f64, stdev: f64) -> f64 {
        // 1 - U keeps u1 in (0, 1] so ln never sees zero.
        let u1 = 1.0 - self.unit();
        let u2 = self.unit();
        let z = (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos();
        mean + stdev * z
    }

    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        items.shuffle(&mut self.inner);
    }
}
