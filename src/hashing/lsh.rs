//! Random hyperplane projections (classic LSH for dense vectors).
//!
//! Each bit of the code is the sign of the input's dot product with one
//! random hyperplane. Similar vectors land on the same side of most
//! hyperplanes and therefore share most bits.
//!
//! # References
//!
//! - Charikar (2002): "Similarity estimation techniques from rounding
//!   algorithms"

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::HashCode;

/// Seed used when the caller does not configure one. Fixed so databases
/// rebuilt from a persisted config hash identically.
pub(crate) const DEFAULT_SEED: u64 = 12345;

/// A bank of seeded random hyperplanes.
#[derive(Debug, Clone)]
pub struct RandomHyperplanes {
    /// `num_bits` hyperplanes of `dimension` components each.
    hyperplanes: Vec<Vec<f32>>,
    dimension: usize,
    seed: u64,
}

impl RandomHyperplanes {
    /// Generate `num_bits` hyperplanes with components uniform in [-1, 1).
    pub fn new(dimension: usize, num_bits: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let hyperplanes = (0..num_bits)
            .map(|_| {
                (0..dimension)
                    .map(|_| rng.gen::<f32>() * 2.0 - 1.0)
                    .collect()
            })
            .collect();
        Self {
            hyperplanes,
            dimension,
            seed,
        }
    }

    /// One sign bit per hyperplane.
    pub fn hash(&self, vector: &[f32]) -> HashCode {
        debug_assert_eq!(vector.len(), self.dimension);
        let mut bits = 0u64;
        for (i, plane) in self.hyperplanes.iter().enumerate() {
            let dot: f32 = plane.iter().zip(vector.iter()).map(|(p, v)| p * v).sum();
            if dot > 0.0 {
                bits |= 1u64 << i;
            }
        }
        HashCode::new(bits, self.hyperplanes.len())
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn num_bits(&self) -> usize {
        self.hyperplanes.len()
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}
