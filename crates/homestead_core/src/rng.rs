//! Deterministic PRNG for simulation use (waypoint jitter).
//!
//! Uses the SplitMix64 algorithm: fast, 8 bytes of state, good
//! statistical properties, and trivially serializable for save files.
//! Every random draw in the engine goes through this generator, so a
//! saved game resumes the exact same sequence.

use serde::{Deserialize, Serialize};

/// SplitMix64 pseudo-random number generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimRng {
    state: u64,
}

impl SimRng {
    /// Create a new RNG with the given seed.
    ///
    /// Seeding with a previously captured [`state`](Self::state) resumes
    /// the sequence exactly where it left off.
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Generate the next `u64` in the sequence.
    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Uniform value in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        // 53 mantissa bits of the raw draw
        (self.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Uniform value in `[-half_range, half_range]`.
    pub fn jitter(&mut self, half_range: f64) -> f64 {
        (self.next_f64() * 2.0 - 1.0) * half_range
    }

    /// Get the internal state (for hashing/serialization).
    #[must_use]
    pub const fn state(&self) -> u64 {
        self.state
    }
}
