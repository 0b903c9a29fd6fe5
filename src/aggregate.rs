//! Neighbor aggregation: from raw per-vector query results to per-patch
//! and per-brain decisions.
//!
//! Classification is by majority vote over the labels of retrieved
//! neighbors: the elementwise mean of the candidates' one-hot (or
//! multi-class) label vectors, arg-maxed. The weighted variant scales each
//! label vector by `exp(-distance)` first, an exponentially decaying
//! confidence by proximity.

use std::time::Duration;

use crate::index::NeighborRecord;

/// Arg-max with ties resolved by the first occurrence (ascending-index scan).
pub(crate) fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

fn mean_label(candidates: &[NeighborRecord], weight: impl Fn(&NeighborRecord) -> f32) -> Vec<f32> {
    let mut sum: Vec<f32> = Vec::new();
    let mut count = 0usize;
    for record in candidates {
        let Some(label) = record.provenance.label.as_deref() else {
            continue;
        };
        if sum.is_empty() {
            sum = vec![0.0; label.len()];
        }
        let w = weight(record);
        for (s, &l) in sum.iter_mut().zip(label.iter()) {
            *s += w * l;
        }
        count += 1;
    }
    if count > 0 {
        for s in &mut sum {
            *s /= count as f32;
        }
    }
    sum
}

/// Predicted class from the mean of candidate label vectors.
///
/// Returns `None` when no candidate carries a label.
pub fn majority_vote(candidates: &[NeighborRecord]) -> Option<usize> {
    let mean = mean_label(candidates, |_| 1.0);
    argmax(&mean)
}

/// Majority vote with each label weighted by `exp(-distance)`.
pub fn weighted_majority_vote(candidates: &[NeighborRecord]) -> Option<usize> {
    let mean = mean_label(candidates, |r| (-r.distance).exp());
    argmax(&mean)
}

/// All of one brain's neighbors, flattened from its per-patch lists.
#[derive(Debug, Clone, Default)]
pub struct BrainNeighbors {
    pub neighbors: Vec<NeighborRecord>,
    /// Patches queried for this brain (including ones with no neighbors).
    pub num_patches: usize,
}

impl BrainNeighbors {
    /// Flatten the list-of-lists of per-patch results into one combined
    /// list for whole-scan classification.
    pub fn from_patch_results(per_patch: Vec<Vec<NeighborRecord>>) -> Self {
        let num_patches = per_patch.len();
        let neighbors = per_patch.into_iter().flatten().collect();
        Self {
            neighbors,
            num_patches,
        }
    }

    pub fn num_neighbors(&self) -> usize {
        self.neighbors.len()
    }
}

/// Totals from classifying a cohort against a database.
#[derive(Debug, Clone, Default)]
pub struct EvalSummary {
    pub num_brains: usize,
    pub num_patches: usize,
    pub num_neighbors: usize,
    /// Correctly classified brains.
    pub num_successes: usize,
    /// Subjects skipped on data errors.
    pub num_failures: usize,
    pub elapsed: Duration,
}

impl EvalSummary {
    /// Classification error rate over the brains actually evaluated.
    pub fn error_rate(&self) -> f32 {
        if self.num_brains == 0 {
            return 0.0;
        }
        1.0 - self.num_successes as f32 / self.num_brains as f32
    }
}
