//! Deterministic Random Number Generator
//!
//! Uses Xorshift128+ algorithm for fast, high-quality, deterministic randomness.
//! Given the same seed, produces identical sequence on all platforms, so any
//! worker (or a client replaying a game) can recompute bot names, join delays
//! and mission layouts without coordination.

use serde::{Serialize, Deserialize};

/// Alphabet used by [`DeterministicRng::next_id`].
const ID_ALPHABET: &[u8; 62] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Length of generated identifiers.
pub const ID_LENGTH: usize = 8;

/// Deterministic PRNG using Xorshift128+ algorithm.
///
/// # Determinism Guarantee
///
/// Given the same seed, this RNG will produce the exact same sequence
/// of random numbers on any platform (x86, ARM, WASM).
///
/// # Example
///
/// ```
/// use geoconflict::core::rng::DeterministicRng;
///
/// let mut rng = DeterministicRng::new(12345);
/// let value = rng.next_u64();
/// assert_eq!(value, 6233086606872742541); // Always the same!
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeterministicRng {
    state: [u64; 2],
}

impl Default for DeterministicRng {
    fn default() -> Self {
        Self::new(0)
    }
}

impl DeterministicRng {
    /// Create a new RNG from a 32-bit seed.
    ///
    /// The seed is widened to 64 bits and run through SplitMix64 to
    /// initialize the internal state, ensuring good distribution even
    /// from sequential seeds like `hash + join_index`.
    pub fn new(seed: u32) -> Self {
        let mut s = seed as u64;
        let state0 = splitmix64(&mut s);
        let state1 = splitmix64(&mut s);

        // Ensure state is never all zeros
        let state = if state0 == 0 && state1 == 0 {
            [1, 1]
        } else {
            [state0, state1]
        };

        Self { state }
    }

    /// Generate the next 64-bit random value.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let s0 = self.state[0];
        let mut s1 = self.state[1];
        let result = s0.wrapping_add(s1);

        s1 ^= s0;
        self.state[0] = s0.rotate_left(24) ^ s1 ^ (s1 << 16);
        self.state[1] = s1.rotate_left(37);

        result
    }

    /// Generate a random u32.
    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        self.next_u64() as u32
    }

    /// Generate a random index in range [0, max).
    #[inline]
    pub fn next_index(&mut self, max: usize) -> usize {
        if max == 0 {
            return 0;
        }
        // Simple modulo - slight bias for very large max, but acceptable
        (self.next_u64() % max as u64) as usize
    }

    /// Generate a random integer in range [min, max_exclusive).
    ///
    /// Returns `min` when the range is empty.
    #[inline]
    pub fn next_int(&mut self, min: i64, max_exclusive: i64) -> i64 {
        if max_exclusive <= min {
            return min;
        }
        let range = max_exclusive.abs_diff(min);
        min.wrapping_add((self.next_u64() % range) as i64)
    }

    /// Shuffle a slice in place using Fisher-Yates algorithm.
    pub fn shuffle<T>(&mut self, slice: &mut [T]) {
        let len = slice.len();
        for i in (1..len).rev() {
            let j = self.next_index(i + 1);
            slice.swap(i, j);
        }
    }

    /// Consume a vector and return it shuffled.
    ///
    /// Same draw sequence as [`shuffle`](Self::shuffle).
    pub fn shuffled<T>(&mut self, mut items: Vec<T>) -> Vec<T> {
        self.shuffle(&mut items);
        items
    }

    /// Generate an 8-character alphanumeric identifier.
    pub fn next_id(&mut self) -> String {
        (0..ID_LENGTH)
            .map(|_| ID_ALPHABET[self.next_index(ID_ALPHABET.len())] as char)
            .collect()
    }

    /// Get current state (for checkpointing/debugging).
    pub fn state(&self) -> [u64; 2] {
        self.state
    }

    /// Restore from saved state.
    pub fn set_state(&mut self, state: [u64; 2]) {
        self.state = state;
    }
}

/// SplitMix64 for seed initialization.
/// Produces well-distributed values from sequential seeds.
#[inline]
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rng_determinism() {
        // Same seed must produce same sequence
        let mut rng1 = DeterministicRng::new(12345);
        let mut rng2 = DeterministicRng::new(12345);

        for _ in 0..1000 {
            assert_eq!(rng1.next_u64(), rng2.next_u64());
        }
    }

    #[test]
    fn test_rng_different_seeds() {
        let mut rng1 = DeterministicRng::new(12345);
        let mut rng2 = DeterministicRng::new(54321);

        // Very unlikely to match
        assert_ne!(rng1.next_u64(), rng2.next_u64());
    }

    #[test]
    fn test_rng_known_values() {
        // Verify specific output for regression testing
        let mut rng = DeterministicRng::new(42);
        let val1 = rng.next_u64();
        let val2 = rng.next_u64();
        let val3 = rng.next_u64();

        // These values must never change!
        // If they do, bot names and missions stop being reproducible.
        assert_eq!(val1, 16629283624882167704);
        assert_eq!(val2, 1420492921613871959);
        assert_eq!(val3, 9768315062676884790);
    }

    #[test]
    fn test_next_int() {
        let mut rng = DeterministicRng::new(1234);

        for _ in 0..1000 {
            let val = rng.next_int(-10, 10);
            assert!((-10..10).contains(&val));
        }

        // Empty and inverted ranges collapse to min
        assert_eq!(rng.next_int(5, 5), 5);
        assert_eq!(rng.next_int(7, 3), 7);

        // Single value range
        assert_eq!(rng.next_int(9, 10), 9);
    }

    #[test]
    fn test_next_index_edges() {
        let mut rng = DeterministicRng::new(77);
        assert_eq!(rng.next_index(0), 0);
        assert_eq!(rng.next_index(1), 0);
    }

    #[test]
    fn test_shuffle_determinism() {
        let mut rng1 = DeterministicRng::new(1111);
        let mut rng2 = DeterministicRng::new(1111);

        let mut arr1 = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10];
        let mut arr2 = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10];

        rng1.shuffle(&mut arr1);
        rng2.shuffle(&mut arr2);

        assert_eq!(arr1, arr2);
    }

    #[test]
    fn test_shuffled_matches_in_place() {
        let mut rng1 = DeterministicRng::new(2024);
        let mut rng2 = DeterministicRng::new(2024);

        let mut in_place: Vec<u32> = (0..32).collect();
        rng1.shuffle(&mut in_place);
        let pure = rng2.shuffled((0..32).collect::<Vec<u32>>());

        assert_eq!(in_place, pure);

        let mut sorted = pure.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..32).collect::<Vec<u32>>());
    }

    #[test]
    fn test_next_id_shape() {
        let mut rng = DeterministicRng::new(99);
        let id = rng.next_id();
        assert_eq!(id.len(), ID_LENGTH);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));

        let mut again = DeterministicRng::new(99);
        assert_eq!(again.next_id(), id);
    }

    #[test]
    fn test_state_checkpoint() {
        let mut rng = DeterministicRng::new(5555);

        for _ in 0..50 {
            rng.next_u64();
        }

        let saved_state = rng.state();
        let next_values: Vec<u64> = (0..10).map(|_| rng.next_u64()).collect();

        rng.set_state(saved_state);

        for expected in next_values {
            assert_eq!(rng.next_u64(), expected);
        }
    }
}
