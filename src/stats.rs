//! Voxel-level statistics: from neighbor vote counts to anomaly maps.
//!
//! For each voxel of a queried volume we accumulate how many retrieved
//! neighbors voted "positive" (pathological) versus "negative" (control),
//! with a vote covering every voxel of the originating patch's region.
//! Three estimators turn a (positives, negatives) pair into a scalar, and
//! each has a whole-volume elementwise variant producing a map with the
//! source scan's geometry.
//!
//! Numerical edge cases are policy, not exceptions: a zero-neighbor voxel
//! is 0 for the raw proportion, and NaN for the z-score (callers guard it
//! explicitly when they care).

use crate::patch::PatchShape;
use crate::volume::Volume;

/// Volume-shaped array of per-voxel vote counts (or derived statistics).
#[derive(Debug, Clone)]
pub struct CountMap {
    data: Vec<f32>,
    shape: [usize; 3],
}

impl CountMap {
    pub fn zeros(shape: [usize; 3]) -> Self {
        Self {
            data: vec![0.0; shape[0] * shape[1] * shape[2]],
            shape,
        }
    }

    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    fn offset(&self, pos: [usize; 3]) -> usize {
        (pos[0] * self.shape[1] + pos[1]) * self.shape[2] + pos[2]
    }

    #[inline]
    pub fn get(&self, pos: [usize; 3]) -> f32 {
        self.data[self.offset(pos)]
    }

    #[inline]
    pub fn add(&mut self, pos: [usize; 3], value: f32) {
        let off = self.offset(pos);
        self.data[off] += value;
    }

    /// Wrap this map as a [`Volume`] carrying the source scan's affine.
    pub fn into_volume(self, affine: [[f32; 4]; 4]) -> Volume {
        // Shape and data length agree by construction.
        Volume::new(self.data, self.shape, affine, None)
            .expect("count map data matches its shape")
    }
}

/// Per-voxel running positive/negative vote counts for one volume.
///
/// Reset per volume; votes from one volume's patches never leak into
/// another's accumulator.
#[derive(Debug, Clone)]
pub struct VoxelAccumulator {
    positives: CountMap,
    negatives: CountMap,
}

impl VoxelAccumulator {
    pub fn new(volume_shape: [usize; 3]) -> Self {
        Self {
            positives: CountMap::zeros(volume_shape),
            negatives: CountMap::zeros(volume_shape),
        }
    }

    /// Record one neighbor's vote over the whole region of the patch it was
    /// retrieved for. Only voxels inside that region are touched.
    pub fn add_vote(
        &mut self,
        position: [usize; 3],
        shape: PatchShape,
        positive: bool,
        weight: f32,
    ) {
        let dims = shape.dims();
        let target = if positive {
            &mut self.positives
        } else {
            &mut self.negatives
        };
        for x in 0..dims[0] {
            for y in 0..dims[1] {
                for z in 0..dims[2] {
                    target.add([position[0] + x, position[1] + y, position[2] + z], weight);
                }
            }
        }
    }

    pub fn positives(&self) -> &CountMap {
        &self.positives
    }

    pub fn negatives(&self) -> &CountMap {
        &self.negatives
    }
}

/// Raw vote proportion `p / (p + n)`, defined as 0 when there are no votes.
pub fn proportion(positives: f32, negatives: f32) -> f32 {
    let n = positives + negatives;
    if n == 0.0 {
        0.0
    } else {
        positives / n
    }
}

/// One-sample proportion test against the population prior `ratio_pos`.
///
/// Treats the voxel's vote proportion as a binomial sample proportion with
/// expected probability `ratio_pos`: `(p/N - P) / sqrt(P(1-P)/N)`.
///
/// With `N = 0` (or a degenerate prior of 0 or 1) this is NaN; that is the
/// documented policy, not an error, and callers guard it when needed.
pub fn proportion_z_score(positives: f32, negatives: f32, ratio_pos: f32) -> f32 {
    let p = ratio_pos;
    let n = positives + negatives;
    let std = (p * (1.0 - p) / n).sqrt();
    (positives / n - p) / std
}

/// Ratio-normalized anomaly score in [0, 1].
///
/// Built from add-one-smoothed reciprocals of each class's vote count,
/// each scaled by the complementary class prior, differenced, divided by
/// the vote total, then renormalized by the matching prior and mapped
/// through `(m + 1) / 2`. Voxels whose vote mix diverges most from the
/// prior-weighted expectation land near 0 or 1; a prior-matching mix lands
/// near 0.5. The smoothing keeps a zero count in either class finite.
///
/// The final `(m + 1) / 2` rescale is a carried-over heuristic with no
/// published derivation; treat absolute values as relative scores only.
pub fn anomaly_score(positives: f32, negatives: f32, ratio_pos: f32) -> f32 {
    let ratio_neg = 1.0 - ratio_pos;
    let n = positives + negatives;

    // Binary classification assumed: one reciprocal per class.
    let nb_pos = 1.0 / (1.0 + positives);
    let nb_neg = 1.0 / (1.0 + negatives);

    let mut m = (nb_pos * ratio_neg - nb_neg * ratio_pos) / n;
    if m > 0.0 {
        m /= ratio_neg;
    } else {
        m /= ratio_pos;
    }
    (m + 1.0) / 2.0
}

fn elementwise(
    positives: &CountMap,
    negatives: &CountMap,
    f: impl Fn(f32, f32) -> f32,
) -> CountMap {
    debug_assert_eq!(positives.shape(), negatives.shape());
    CountMap {
        data: positives
            .data
            .iter()
            .zip(negatives.data.iter())
            .map(|(&p, &n)| f(p, n))
            .collect(),
        shape: positives.shape,
    }
}

/// [`proportion`] over whole-volume count maps.
pub fn proportion_map(positives: &CountMap, negatives: &CountMap) -> CountMap {
    elementwise(positives, negatives, proportion)
}

/// [`proportion_z_score`] over whole-volume count maps. Zero-vote voxels
/// are NaN in the output.
pub fn proportion_z_score_map(
    positives: &CountMap,
    negatives: &CountMap,
    ratio_pos: f32,
) -> CountMap {
    elementwise(positives, negatives, |p, n| {
        proportion_z_score(p, n, ratio_pos)
    })
}

/// [`anomaly_score`] over whole-volume count maps.
pub fn anomaly_score_map(positives: &CountMap, negatives: &CountMap, ratio_pos: f32) -> CountMap {
    elementwise(positives, negatives, |p, n| anomaly_score(p, n, ratio_pos))
}
