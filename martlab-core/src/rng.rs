//! Deterministic RNG hierarchy.
//!
//! A master seed generates deterministic sub-seeds for each `(label, trial)`
//! pair. Sub-seeds are derived via BLAKE3 hashing, independently of thread
//! scheduling order, so parallel runs match sequential ones trial for trial.

use rand::rngs::StdRng;
use rand::SeedableRng;

/// Deterministic RNG hierarchy.
///
/// The master seed is expanded into per-(label, trial) sub-seeds. Because
/// derivation is hash-based (not order-dependent), the same master seed
/// produces identical sub-seeds regardless of the order trials are run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RngHierarchy {
    master_seed: u64,
}

impl RngHierarchy {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// Derive a deterministic sub-seed for a `(label, trial)` pair.
    pub fn sub_seed(&self, label: &str, trial: u64) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.master_seed.to_le_bytes());
        hasher.update(label.as_bytes());
        hasher.update(&trial.to_le_bytes());
        let hash = hasher.finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(head)
    }

    /// Create a seeded StdRng for a `(label, trial)` pair.
    pub fn rng_for(&self, label: &str, trial: u64) -> StdRng {
        StdRng::seed_from_u64(self.sub_seed(label, trial))
    }
}
