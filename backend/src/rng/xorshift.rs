//! xorshift64* random number generator
//!
//! A small 64-bit state PRNG. It is not cryptographic; it only has to make
//! request patterns and payload bytes look random while staying reproducible.
//!
//! Same seed → same request vectors → same grant sequence.

use serde::{Deserialize, Serialize};

/// Deterministic random number generator using xorshift64*
///
/// # Example
/// ```
/// use bus_arbiter_core::RngManager;
///
/// let mut rng = RngManager::new(12345);
/// let requesting = rng.chance(0.5);
/// let payload = rng.payload_byte();
/// assert!(payload >= 1);
/// # let _ = requesting;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RngManager {
    state: u64,
}

impl RngManager {
    /// Create a new RNG with given seed. A zero seed is replaced by 1 since
    /// xorshift never leaves the all-zero state.
    pub fn new(seed: u64) -> Self {
        let state = if seed == 0 { 1 } else { seed };
        Self { state }
    }

    /// Generate next random u64 value
    pub fn next(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    /// Generate random value in range [min, max)
    ///
    /// # Panics
    /// Panics if min >= max
    pub fn range(&mut self, min: i64, max: i64) -> i64 {
        assert!(min < max, "min must be less than max");

        let value = self.next();
        let range_size = (max - min) as u64;
        min + (value % range_size) as i64
    }

    /// Generate random f64 in range [0.0, 1.0)
    pub fn next_f64(&mut self) -> f64 {
        let value = self.next();
        (value >> 11) as f64 * (1.0 / ((1u64 << 53) as f64))
    }

    /// Returns true with the given probability.
    ///
    /// Probabilities at or below 0.0 never fire, at or above 1.0 always fire.
    pub fn chance(&mut self, probability: f64) -> bool {
        if probability <= 0.0 {
            return false;
        }
        if probability >= 1.0 {
            return true;
        }
        self.next_f64() < probability
    }

    /// Draw a data payload byte in [1, 255].
    pub fn payload_byte(&mut self) -> u8 {
        self.range(1, 256) as u8
    }

    /// Get current RNG state (for snapshots/replay)
    pub fn get_state(&self) -> u64 {
        self.state
    }
}
