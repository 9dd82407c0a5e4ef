//! # RandomNumberGenerator
//!
//! The `RandomNumberGenerator` struct wraps the `rand` crate's `StdRng` and provides the
//! handful of draws the refinement loop needs: Bernoulli trials for parent sampling,
//! uniform subsets for memory retrieval, and child generators for worker tasks.
//!
//! ## Example
//!
//! ```rust
//! use lineage::rng::RandomNumberGenerator;
//!
//! let mut rng = RandomNumberGenerator::from_seed(7);
//! let picked = rng.sample_indices(10, 3);
//! assert_eq!(picked.len(), 3);
//! ```
//!
//! ## Worker tasks
//!
//! Tasks running on the worker pool never share a generator. The orchestrator calls
//! [`RandomNumberGenerator::fork`] once per task, on its own thread, so a seeded run
//! produces the same draws regardless of how tasks are scheduled.

use rand::{rngs::StdRng, seq::index, Rng, SeedableRng};

/// A wrapper around the `rand` crate's `StdRng`.
#[derive(Clone, Debug)]
pub struct RandomNumberGenerator {
    pub rng: StdRng,
}

impl RandomNumberGenerator {
    /// Creates a new `RandomNumberGenerator` instance seeded from the system entropy.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Creates a new `RandomNumberGenerator` instance with a specific seed.
    ///
    /// This is useful for reproducible runs and tests.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Derives an independent child generator.
    pub fn fork(&mut self) -> Self {
        Self::from_seed(self.rng.gen())
    }

    /// Runs one Bernoulli trial with success probability `p` (clamped to `[0, 1]`).
    pub fn gen_bool(&mut self, p: f64) -> bool {
        let p = if p.is_finite() { p.clamp(0.0, 1.0) } else { 0.0 };
        self.rng.gen_bool(p)
    }

    /// Draws `amount` distinct indices uniformly from `0..length`, in random order.
    ///
    /// `amount` is capped at `length`.
    pub fn sample_indices(&mut self, length: usize, amount: usize) -> Vec<usize> {
        index::sample(&mut self.rng, length, amount.min(length)).into_vec()
    }
}

impl Default for RandomNumberGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_clone() {
        let mut rng1 = RandomNumberGenerator::from_seed(42);
        let mut rng2 = rng1.clone();

        // Both RNGs should generate the same sequence after cloning
        let nums1 = rng1.sample_indices(100, 5);
        let nums2 = rng2.sample_indices(100, 5);

        assert_eq!(nums1, nums2);
    }

    #[test]
    fn test_fork_is_deterministic_for_seeded_parent() {
        let mut a = RandomNumberGenerator::from_seed(9);
        let mut b = RandomNumberGenerator::from_seed(9);

        let mut child_a = a.fork();
        let mut child_b = b.fork();

        assert_eq!(child_a.sample_indices(50, 4), child_b.sample_indices(50, 4));
    }

    #[test]
    fn test_sample_indices_are_distinct_and_capped() {
        let mut rng = RandomNumberGenerator::from_seed(1);

        let picked = rng.sample_indices(10, 4);
        let unique: HashSet<_> = picked.iter().collect();
        assert_eq!(unique.len(), 4);
        assert!(picked.iter().all(|&i| i < 10));

        assert_eq!(rng.sample_indices(3, 8).len(), 3);
        assert!(rng.sample_indices(0, 2).is_empty());
    }

    #[test]
    fn test_gen_bool_extremes() {
        let mut rng = RandomNumberGenerator::from_seed(3);
        assert!((0..100).all(|_| rng.gen_bool(1.0)));
        assert!((0..100).all(|_| !rng.gen_bool(0.0)));
        assert!(!rng.gen_bool(f64::NAN));
    }
}
