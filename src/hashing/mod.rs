//! Hashing schemes: vectors to compact bit codes.
//!
//! Three schemes share one uniform surface:
//!
//! - **LSH**: seeded random hyperplane projections, no training.
//! - **PCA**: projection onto the top principal components of a training
//!   set, sign-thresholded.
//! - **SH**: spectral-hashing-style codes, PCA projections thresholded
//!   against per-component mid-range bounds from the training set.
//!
//! Trainable schemes fit lazily: the factory drains the supplied training
//! vector iterator exactly once, accumulating streaming statistics, unless
//! precomputed parameters (projection/mean/bounds) are supplied to skip
//! training. Hashing is deterministic given identical configuration and
//! input.

mod lsh;
mod pca;

pub use lsh::RandomHyperplanes;
pub use pca::{CovarianceAccumulator, PcaProjection, SpectralHashing};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};

/// Largest supported code length: one u64 payload, one bit per projection.
pub const MAX_BITS: usize = 64;

/// A compact bit code derived from a vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HashCode {
    bits: u64,
    num_bits: usize,
}

impl HashCode {
    pub fn new(bits: u64, num_bits: usize) -> Self {
        debug_assert!(num_bits <= MAX_BITS);
        Self { bits, num_bits }
    }

    /// Bucket key for index backends.
    pub fn as_key(&self) -> u64 {
        self.bits
    }

    pub fn num_bits(&self) -> usize {
        self.num_bits
    }

    /// Number of differing bits between two codes.
    pub fn hamming_distance(&self, other: &HashCode) -> usize {
        (self.bits ^ other.bits).count_ones() as usize
    }
}

/// Which hashing scheme a database uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashMethod {
    /// Random hyperplane projections.
    Lsh,
    /// Principal component projections.
    Pca,
    /// Spectral hashing (thresholded PCA codes).
    Sh,
}

impl std::fmt::Display for HashMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HashMethod::Lsh => write!(f, "LSH"),
            HashMethod::Pca => write!(f, "PCA"),
            HashMethod::Sh => write!(f, "SH"),
        }
    }
}

impl std::str::FromStr for HashMethod {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "LSH" => Ok(HashMethod::Lsh),
            "PCA" => Ok(HashMethod::Pca),
            "SH" => Ok(HashMethod::Sh),
            other => Err(SearchError::Config(format!(
                "unknown hashing method: {other}"
            ))),
        }
    }
}

/// Scheme parameters, either precomputed (skipping training) or exported
/// from a trained scheme for persistence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HashingParams {
    /// Seed for the LSH hyperplane generator.
    pub seed: Option<u64>,
    /// Projection matrix, `num_bits` rows of `dimension` components.
    pub projection: Option<Vec<Vec<f32>>>,
    /// Training-set mean (PCA centering).
    pub mean: Option<Vec<f32>>,
    /// Per-component thresholds (SH).
    pub bounds: Option<Vec<f32>>,
}

/// A configured hashing scheme. One variant per method; training-specific
/// state lives only inside the PCA/SH variants.
#[derive(Debug, Clone)]
pub enum HashingScheme {
    Lsh(RandomHyperplanes),
    Pca(PcaProjection),
    Sh(SpectralHashing),
}

impl HashingScheme {
    /// Hash a vector into a bit code. Deterministic for fixed configuration.
    pub fn hash(&self, vector: &[f32]) -> HashCode {
        match self {
            HashingScheme::Lsh(s) => s.hash(vector),
            HashingScheme::Pca(s) => s.hash(vector),
            HashingScheme::Sh(s) => s.hash(vector),
        }
    }

    pub fn dimension(&self) -> usize {
        match self {
            HashingScheme::Lsh(s) => s.dimension(),
            HashingScheme::Pca(s) => s.dimension(),
            HashingScheme::Sh(s) => s.dimension(),
        }
    }

    pub fn num_bits(&self) -> usize {
        match self {
            HashingScheme::Lsh(s) => s.num_bits(),
            HashingScheme::Pca(s) => s.num_bits(),
            HashingScheme::Sh(s) => s.num_bits(),
        }
    }

    pub fn method(&self) -> HashMethod {
        match self {
            HashingScheme::Lsh(_) => HashMethod::Lsh,
            HashingScheme::Pca(_) => HashMethod::Pca,
            HashingScheme::Sh(_) => HashMethod::Sh,
        }
    }

    /// Export the trained parameters so a persisted database can rebuild an
    /// identical scheme without retraining.
    pub fn params(&self) -> HashingParams {
        match self {
            HashingScheme::Lsh(s) => HashingParams {
                seed: Some(s.seed()),
                ..Default::default()
            },
            HashingScheme::Pca(s) => HashingParams {
                projection: Some(s.components().to_vec()),
                mean: Some(s.mean().to_vec()),
                ..Default::default()
            },
            HashingScheme::Sh(s) => HashingParams {
                projection: Some(s.pca().components().to_vec()),
                mean: Some(s.pca().mean().to_vec()),
                bounds: Some(s.bounds().to_vec()),
                ..Default::default()
            },
        }
    }
}

fn validate(dimension: usize, num_bits: usize) -> Result<()> {
    if dimension == 0 {
        return Err(SearchError::Config("vector dimension must be > 0".into()));
    }
    if num_bits == 0 || num_bits > MAX_BITS {
        return Err(SearchError::Config(format!(
            "num_bits must be in 1..={MAX_BITS}, got {num_bits}"
        )));
    }
    if num_bits > dimension {
        return Err(SearchError::Config(format!(
            "num_bits ({num_bits}) exceeds vector dimension ({dimension})"
        )));
    }
    Ok(())
}

/// Create and, where needed, train a hashing scheme.
///
/// `trainset` is drained exactly once when a trainable method is requested
/// without precomputed parameters. LSH never trains; PCA needs a projection
/// (or training); SH additionally needs bounds.
pub fn create(
    method: HashMethod,
    dimension: usize,
    num_bits: usize,
    params: HashingParams,
    trainset: Option<&mut dyn Iterator<Item = Vec<f32>>>,
) -> Result<HashingScheme> {
    validate(dimension, num_bits)?;

    match method {
        HashMethod::Lsh => {
            let seed = params.seed.unwrap_or(lsh::DEFAULT_SEED);
            Ok(HashingScheme::Lsh(RandomHyperplanes::new(
                dimension, num_bits, seed,
            )))
        }
        HashMethod::Pca => {
            if let (Some(projection), Some(mean)) = (params.projection, params.mean) {
                let pca = PcaProjection::from_parts(dimension, num_bits, projection, mean)?;
                return Ok(HashingScheme::Pca(pca));
            }
            let vectors = drain_trainset(method, trainset)?;
            let pca = pca::fit_pca(&vectors, dimension, num_bits)?;
            Ok(HashingScheme::Pca(pca))
        }
        HashMethod::Sh => {
            if let (Some(projection), Some(mean), Some(bounds)) =
                (params.projection.clone(), params.mean.clone(), params.bounds)
            {
                let pca = PcaProjection::from_parts(dimension, num_bits, projection, mean)?;
                let sh = SpectralHashing::from_parts(pca, bounds)?;
                return Ok(HashingScheme::Sh(sh));
            }
            let vectors = drain_trainset(method, trainset)?;
            let pca = pca::fit_pca(&vectors, dimension, num_bits)?;
            let sh = pca::fit_bounds(pca, &vectors);
            Ok(HashingScheme::Sh(sh))
        }
    }
}

fn drain_trainset(
    method: HashMethod,
    trainset: Option<&mut dyn Iterator<Item = Vec<f32>>>,
) -> Result<Vec<Vec<f32>>> {
    let Some(iter) = trainset else {
        return Err(SearchError::Config(format!(
            "{method} requires a training set or precomputed parameters"
        )));
    };
    let vectors: Vec<Vec<f32>> = iter.collect();
    if vectors.is_empty() {
        return Err(SearchError::Config(format!(
            "{method} training set produced no vectors"
        )));
    }
    Ok(vectors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_code_key_and_hamming() {
        let a = HashCode::new(0b1010, 4);
        let b = HashCode::new(0b0110, 4);
        assert_eq!(a.as_key(), 0b1010);
        assert_eq!(a.hamming_distance(&b), 2);
    }

    #[test]
    fn method_text_round_trip() {
        for method in [HashMethod::Lsh, HashMethod::Pca, HashMethod::Sh] {
            let parsed: HashMethod = method.to_string().parse().unwrap();
            assert_eq!(parsed, method);
        }
        assert!("KLSH".parse::<HashMethod>().is_err());
    }

    #[test]
    fn lsh_needs_no_training() {
        let scheme = create(HashMethod::Lsh, 16, 8, HashingParams::default(), None).unwrap();
        assert_eq!(scheme.num_bits(), 8);
        assert_eq!(scheme.method(), HashMethod::Lsh);
    }

    #[test]
    fn trainable_without_trainset_or_params_fails() {
        let err = create(HashMethod::Pca, 16, 8, HashingParams::default(), None);
        assert!(matches!(err, Err(SearchError::Config(_))));
        let err = create(HashMethod::Sh, 16, 8, HashingParams::default(), None);
        assert!(matches!(err, Err(SearchError::Config(_))));
    }

    #[test]
    fn num_bits_bounds_are_enforced() {
        assert!(create(HashMethod::Lsh, 16, 0, HashingParams::default(), None).is_err());
        assert!(create(HashMethod::Lsh, 16, 32, HashingParams::default(), None).is_err());
        assert!(create(HashMethod::Lsh, 128, 65, HashingParams::default(), None).is_err());
    }

    #[test]
    fn hashing_is_deterministic() {
        let scheme = create(HashMethod::Lsh, 8, 6, HashingParams::default(), None).unwrap();
        let v = vec![0.3, -0.1, 0.7, 0.0, -0.5, 0.2, 0.9, -0.8];
        assert_eq!(scheme.hash(&v), scheme.hash(&v));
    }

    #[test]
    fn trained_params_rebuild_an_identical_scheme() {
        let train: Vec<Vec<f32>> = (0..32)
            .map(|i| (0..6).map(|j| ((i * 7 + j * 3) % 11) as f32 - 5.0).collect())
            .collect();
        let mut it = train.clone().into_iter();
        let scheme = create(HashMethod::Sh, 6, 4, HashingParams::default(), Some(&mut it)).unwrap();

        let rebuilt = create(HashMethod::Sh, 6, 4, scheme.params(), None).unwrap();
        for v in &train {
            assert_eq!(scheme.hash(v), rebuilt.hash(v));
        }
    }
}
