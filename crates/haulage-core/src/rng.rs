//! Deterministic PRNG for simulation use (travel-time jitter).
//!
//! Uses the SplitMix64 algorithm: fast, 8 bytes of state, and trivially
//! serializable so a restored snapshot continues the same sequence.

use crate::time::SimDuration;

/// SplitMix64 pseudo-random number generator.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SimRng {
    state: u64,
}

impl SimRng {
    pub fn new(seed: u64) -> Self {
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

    /// Uniform value in `0..=max`. Uses 128-bit widening multiply instead of
    /// modulo so small ranges carry no measurable bias.
    pub fn up_to(&mut self, max: u64) -> u64 {
        if max == 0 {
            return 0;
        }
        let Some(span) = max.checked_add(1) else {
            return self.next_u64();
        };
        ((self.next_u64() as u128 * span as u128) >> 64) as u64
    }

    /// A random extra duration in `0..=max`. Draws nothing when `max` is zero,
    /// so a jitter-free configuration leaves the sequence untouched.
    pub fn jitter(&mut self, max: SimDuration) -> SimDuration {
        if max == SimDuration::ZERO {
            return SimDuration::ZERO;
        }
        SimDuration::from_secs(self.up_to(max.as_secs()))
    }

    /// Get the internal state (for hashing).
    pub fn state(&self) -> u64 {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        let mut a = SimRng::new(42);
        let mut b = SimRng::new(42);
        for _ in 0..100 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn different_seeds_differ() {
        let mut a = SimRng::new(1);
        let mut b = SimRng::new(2);
        assert_ne!(a.next_u64(), b.next_u64());
    }

    #[test]
    fn up_to_stays_in_range() {
        let mut rng = SimRng::new(7);
        for _ in 0..1_000 {
            assert!(rng.up_to(10) <= 10);
        }
        assert_eq!(rng.up_to(0), 0);
    }

    #[test]
    fn up_to_covers_both_ends() {
        let mut rng = SimRng::new(99);
        let draws: Vec<u64> = (0..500).map(|_| rng.up_to(3)).collect();
        assert!(draws.contains(&0));
        assert!(draws.contains(&3));
    }

    #[test]
    fn zero_jitter_consumes_nothing() {
        let mut rng = SimRng::new(5);
        let before = rng.state();
        assert_eq!(rng.jitter(SimDuration::ZERO), SimDuration::ZERO);
        assert_eq!(rng.state(), before);
    }

    #[test]
    fn jitter_bounded_by_max() {
        let mut rng = SimRng::new(11);
        let max = SimDuration::from_minutes(45);
        for _ in 0..200 {
            assert!(rng.jitter(max) <= max);
        }
    }

    #[test]
    fn serialization_round_trip() {
        let mut rng = SimRng::new(42);
        for _ in 0..50 {
            rng.next_u64();
        }

        let json = serde_json::to_string(&rng).unwrap();
        let mut restored: SimRng = serde_json::from_str(&json).unwrap();
        assert_eq!(rng, restored);

        for _ in 0..10 {
            assert_eq!(rng.next_u64(), restored.next_u64());
        }
    }
}
