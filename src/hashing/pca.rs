//! PCA-based hashing: principal component projections and spectral codes.
//!
//! Training accumulates a streaming mean and covariance over the training
//! vectors, then eigendecomposes the symmetric covariance with cyclic
//! Jacobi rotations. The top `num_bits` eigenvectors become the projection;
//! PCA thresholds each projection at zero, SH thresholds against the
//! mid-range of the training projections instead.
//!
//! The eigensolver is hand-rolled: patch vectors are small (a few hundred
//! components) and the crate carries no linear-algebra dependency.

use serde::{Deserialize, Serialize};

use super::HashCode;
use crate::error::{Result, SearchError};

/// Streaming mean and covariance over a stream of vectors.
///
/// Accumulates sums and outer-product sums in f64; one pass is enough,
/// which is what lets the factory drain a training generator exactly once.
#[derive(Debug, Clone)]
pub struct CovarianceAccumulator {
    dimension: usize,
    count: usize,
    sum: Vec<f64>,
    /// Upper triangle of the outer-product sum, row-major `dim * dim`.
    outer: Vec<f64>,
}

impl CovarianceAccumulator {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            count: 0,
            sum: vec![0.0; dimension],
            outer: vec![0.0; dimension * dimension],
        }
    }

    pub fn add(&mut self, vector: &[f32]) {
        debug_assert_eq!(vector.len(), self.dimension);
        self.count += 1;
        for (i, &vi) in vector.iter().enumerate() {
            self.sum[i] += vi as f64;
            for (j, &vj) in vector.iter().enumerate().skip(i) {
                self.outer[i * self.dimension + j] += vi as f64 * vj as f64;
            }
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn mean(&self) -> Vec<f64> {
        let n = self.count.max(1) as f64;
        self.sum.iter().map(|s| s / n).collect()
    }

    /// Finalize into a full symmetric covariance matrix (row-major).
    pub fn covariance(&self) -> Vec<f64> {
        let d = self.dimension;
        let n = self.count.max(1) as f64;
        let mean = self.mean();
        let mut cov = vec![0.0; d * d];
        for i in 0..d {
            for j in i..d {
                let c = self.outer[i * d + j] / n - mean[i] * mean[j];
                cov[i * d + j] = c;
                cov[j * d + i] = c;
            }
        }
        cov
    }
}

/// Eigendecomposition of a symmetric matrix by cyclic Jacobi sweeps.
///
/// Returns `(eigenvalues, eigenvectors)` sorted by descending eigenvalue;
/// `eigenvectors[k]` is the unit eigenvector for `eigenvalues[k]`.
pub(crate) fn symmetric_eigen(matrix: &[f64], n: usize) -> (Vec<f64>, Vec<Vec<f64>>) {
    let mut a = matrix.to_vec();
    // Eigenvector matrix, starts as identity; columns track rotations.
    let mut v = vec![0.0; n * n];
    for i in 0..n {
        v[i * n + i] = 1.0;
    }

    const MAX_SWEEPS: usize = 64;
    const EPS: f64 = 1e-12;

    for _sweep in 0..MAX_SWEEPS {
        let mut off: f64 = 0.0;
        for p in 0..n {
            for q in (p + 1)..n {
                off += a[p * n + q] * a[p * n + q];
            }
        }
        if off.sqrt() < EPS {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[p * n + q];
                if apq.abs() < EPS {
                    continue;
                }
                let app = a[p * n + p];
                let aqq = a[q * n + q];
                let theta = (aqq - app) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for i in 0..n {
                    let aip = a[i * n + p];
                    let aiq = a[i * n + q];
                    a[i * n + p] = c * aip - s * aiq;
                    a[i * n + q] = s * aip + c * aiq;
                }
                for j in 0..n {
                    let apj = a[p * n + j];
                    let aqj = a[q * n + j];
                    a[p * n + j] = c * apj - s * aqj;
                    a[q * n + j] = s * apj + c * aqj;
                }
                for i in 0..n {
                    let vip = v[i * n + p];
                    let viq = v[i * n + q];
                    v[i * n + p] = c * vip - s * viq;
                    v[i * n + q] = s * vip + c * viq;
                }
            }
        }
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| {
        a[j * n + j]
            .partial_cmp(&a[i * n + i])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let eigenvalues: Vec<f64> = order.iter().map(|&k| a[k * n + k]).collect();
    let eigenvectors: Vec<Vec<f64>> = order
        .iter()
        .map(|&k| {
            let mut col: Vec<f64> = (0..n).map(|i| v[i * n + k]).collect();
            // Fix the sign so the decomposition is deterministic: the
            // largest-magnitude component is made positive.
            let pivot = col
                .iter()
                .cloned()
                .fold(0.0_f64, |m, x| if x.abs() > m.abs() { x } else { m });
            if pivot < 0.0 {
                for x in &mut col {
                    *x = -*x;
                }
            }
            col
        })
        .collect();

    (eigenvalues, eigenvectors)
}

/// Mean-centered projection onto top principal components, sign-thresholded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PcaProjection {
    /// `num_bits` rows of `dimension` components each.
    components: Vec<Vec<f32>>,
    mean: Vec<f32>,
}

impl PcaProjection {
    /// Build from precomputed parts, validating shapes.
    pub fn from_parts(
        dimension: usize,
        num_bits: usize,
        components: Vec<Vec<f32>>,
        mean: Vec<f32>,
    ) -> Result<Self> {
        if components.len() != num_bits {
            return Err(SearchError::Config(format!(
                "projection has {} rows, expected num_bits = {}",
                components.len(),
                num_bits
            )));
        }
        if mean.len() != dimension || components.iter().any(|c| c.len() != dimension) {
            return Err(SearchError::Config(format!(
                "projection components must have {dimension} values each"
            )));
        }
        Ok(Self { components, mean })
    }

    /// Projection of `vector` onto each retained component.
    pub fn project(&self, vector: &[f32]) -> Vec<f32> {
        debug_assert_eq!(vector.len(), self.mean.len());
        self.components
            .iter()
            .map(|comp| {
                comp.iter()
                    .zip(vector.iter().zip(self.mean.iter()))
                    .map(|(c, (v, m))| c * (v - m))
                    .sum()
            })
            .collect()
    }

    pub fn hash(&self, vector: &[f32]) -> HashCode {
        let mut bits = 0u64;
        for (i, z) in self.project(vector).into_iter().enumerate() {
            if z > 0.0 {
                bits |= 1u64 << i;
            }
        }
        HashCode::new(bits, self.components.len())
    }

    pub fn dimension(&self) -> usize {
        self.mean.len()
    }

    pub fn num_bits(&self) -> usize {
        self.components.len()
    }

    pub fn components(&self) -> &[Vec<f32>] {
        &self.components
    }

    pub fn mean(&self) -> &[f32] {
        &self.mean
    }
}

/// Spectral-hashing-style codes: PCA projections thresholded against
/// per-component mid-range bounds instead of zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpectralHashing {
    pca: PcaProjection,
    /// Threshold per component, the mid-range of the training projections.
    bounds: Vec<f32>,
}

impl SpectralHashing {
    pub fn from_parts(pca: PcaProjection, bounds: Vec<f32>) -> Result<Self> {
        if bounds.len() != pca.num_bits() {
            return Err(SearchError::Config(format!(
                "SH bounds have {} values, expected num_bits = {}",
                bounds.len(),
                pca.num_bits()
            )));
        }
        Ok(Self { pca, bounds })
    }

    pub fn hash(&self, vector: &[f32]) -> HashCode {
        let mut bits = 0u64;
        for (i, z) in self.pca.project(vector).into_iter().enumerate() {
            if z > self.bounds[i] {
                bits |= 1u64 << i;
            }
        }
        HashCode::new(bits, self.pca.num_bits())
    }

    pub fn dimension(&self) -> usize {
        self.pca.dimension()
    }

    pub fn num_bits(&self) -> usize {
        self.pca.num_bits()
    }

    pub fn pca(&self) -> &PcaProjection {
        &self.pca
    }

    pub fn bounds(&self) -> &[f32] {
        &self.bounds
    }
}

/// Fit a PCA projection: one covariance pass, then Jacobi eigensolve.
pub(crate) fn fit_pca(
    vectors: &[Vec<f32>],
    dimension: usize,
    num_bits: usize,
) -> Result<PcaProjection> {
    let mut acc = CovarianceAccumulator::new(dimension);
    for v in vectors {
        if v.len() != dimension {
            return Err(SearchError::Config(format!(
                "training vector has {} components, expected {}",
                v.len(),
                dimension
            )));
        }
        acc.add(v);
    }

    let cov = acc.covariance();
    let (_eigenvalues, eigenvectors) = symmetric_eigen(&cov, dimension);

    let components = eigenvectors
        .into_iter()
        .take(num_bits)
        .map(|col| col.into_iter().map(|x| x as f32).collect())
        .collect();
    let mean = acc.mean().into_iter().map(|x| x as f32).collect();
    PcaProjection::from_parts(dimension, num_bits, components, mean)
}

/// Learn SH thresholds: mid-range of each component's training projections.
pub(crate) fn fit_bounds(pca: PcaProjection, vectors: &[Vec<f32>]) -> SpectralHashing {
    let bits = pca.num_bits();
    let mut lo = vec![f32::INFINITY; bits];
    let mut hi = vec![f32::NEG_INFINITY; bits];
    for v in vectors {
        for (i, z) in pca.project(v).into_iter().enumerate() {
            lo[i] = lo[i].min(z);
            hi[i] = hi[i].max(z);
        }
    }
    let bounds = lo
        .iter()
        .zip(hi.iter())
        .map(|(l, h)| if l.is_finite() { (l + h) / 2.0 } else { 0.0 })
        .collect();
    SpectralHashing { pca, bounds }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulator_matches_direct_covariance() {
        let data = [
            vec![1.0_f32, 2.0],
            vec![3.0, 4.0],
            vec![5.0, 0.0],
            vec![7.0, 2.0],
        ];
        let mut acc = CovarianceAccumulator::new(2);
        for v in &data {
            acc.add(v);
        }
        let mean = acc.mean();
        assert!((mean[0] - 4.0).abs() < 1e-9);
        assert!((mean[1] - 2.0).abs() < 1e-9);

        let cov = acc.covariance();
        // Direct computation: var(x) = mean of squared deviations.
        assert!((cov[0] - 5.0).abs() < 1e-9);
        assert!((cov[3] - 2.0).abs() < 1e-9);
        assert_eq!(cov[1], cov[2]);
    }

    #[test]
    fn jacobi_recovers_known_spectrum() {
        // [[2, 1], [1, 2]] has eigenvalues 3 and 1.
        let m = vec![2.0, 1.0, 1.0, 2.0];
        let (vals, vecs) = symmetric_eigen(&m, 2);
        assert!((vals[0] - 3.0).abs() < 1e-9);
        assert!((vals[1] - 1.0).abs() < 1e-9);
        // Leading eigenvector is (1,1)/sqrt(2) up to sign.
        let v0 = &vecs[0];
        assert!((v0[0].abs() - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-9);
        assert!((v0[0] - v0[1]).abs() < 1e-9);
    }

    #[test]
    fn pca_first_component_follows_dominant_variance() {
        // Points spread along the x axis with small y jitter.
        let vectors: Vec<Vec<f32>> = (0..50)
            .map(|i| vec![i as f32, (i % 3) as f32 * 0.01])
            .collect();
        let pca = fit_pca(&vectors, 2, 1).unwrap();
        let c = &pca.components()[0];
        assert!(c[0].abs() > 0.99, "dominant axis not found: {:?}", c);
    }

    #[test]
    fn pca_code_splits_points_around_the_mean() {
        let vectors: Vec<Vec<f32>> = (0..20).map(|i| vec![i as f32, 0.0]).collect();
        let pca = fit_pca(&vectors, 2, 1).unwrap();
        let low = pca.hash(&[0.0, 0.0]);
        let high = pca.hash(&[19.0, 0.0]);
        assert_ne!(low.as_key(), high.as_key());
    }

    #[test]
    fn sh_bounds_shift_the_threshold() {
        let vectors: Vec<Vec<f32>> = (0..20).map(|i| vec![i as f32, 0.0]).collect();
        let pca = fit_pca(&vectors, 2, 1).unwrap();
        let sh = fit_bounds(pca, &vectors);
        // Mid-range split: roughly half the training set on each side.
        let ones = vectors.iter().filter(|v| sh.hash(v).as_key() == 1).count();
        assert!(ones >= 8 && ones <= 12, "unbalanced split: {ones}");
    }

    #[test]
    fn mismatched_training_vector_is_a_config_error() {
        let vectors = vec![vec![1.0_f32, 2.0, 3.0]];
        assert!(fit_pca(&vectors, 2, 1).is_err());
    }
}
