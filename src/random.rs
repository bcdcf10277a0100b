//! Deterministic frame RNG.
//!
//! Both eyes reseed from the same frame time so particle jitter and other
//! random effects match between the two views.

/// xorshift32 generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeededRandom {
    state: u32,
}

impl SeededRandom {
    /// Seed of 0 is treated as 1 to avoid the all-zero sequence.
    pub fn new(seed: u32) -> Self {
        Self {
            state: if seed == 0 { 1 } else { seed },
        }
    }

    /// Seed from a frame time in seconds, at millisecond resolution.
    pub fn from_time(time: f64) -> Self {
        Self::new(Self::time_seed(time))
    }

    pub fn time_seed(time: f64) -> u32 {
        (time * 1000.0) as u32
    }

    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }

    /// Float in [0, 1).
    pub fn next(&mut self) -> f32 {
        (self.next_u32() >> 8) as f32 / (1u32 << 24) as f32
    }

    pub fn next_range(&mut self, min: f32, max: f32) -> f32 {
        min + self.next() * (max - min)
    }

    pub fn seed(&self) -> u32 {
        self.state
    }
}

impl Default for SeededRandom {
    fn default() -> Self {
        Self::new(1)
    }
}
