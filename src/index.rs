//! The ANN index boundary: capability trait plus an in-memory backend.
//!
//! The core treats the index engine as a collaborator with three
//! capabilities: insert a (code, vector, provenance) entry, retrieve ranked
//! neighbors for a query vector, and select a distance metric. The bundled
//! [`MemoryIndex`] is a bucketed implementation: entries hash into buckets
//! keyed by their code, and queries rank the query bucket's candidates by
//! the configured metric. Backends with different storage live behind the
//! same trait.

use smallvec::SmallVec;
use std::collections::HashMap;

use crate::error::{Result, SearchError};
use crate::hashing::HashCode;
use crate::vector::Provenance;

/// Distance metric used to rank candidates. Fixed per query call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceMetric {
    /// Euclidean (L2) distance.
    Euclidean,
}

/// Euclidean distance between two vectors.
///
/// Mismatched dimensions return `f32::INFINITY` so the pair can never rank
/// as a nearest neighbor.
#[inline]
#[must_use]
pub fn euclidean(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

impl DistanceMetric {
    #[inline]
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::Euclidean => euclidean(a, b),
        }
    }
}

/// One retrieved neighbor: provenance plus distance to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborRecord {
    pub provenance: Provenance,
    pub distance: f32,
}

/// Capability trait for ANN index backends.
pub trait AnnIndex {
    /// Insert an entry under its hash code.
    fn index(&mut self, code: HashCode, vector: Vec<f32>, provenance: Provenance) -> Result<()>;

    /// Retrieve up to `k` neighbors for `vector`, candidates drawn from the
    /// bucket of `code`, ranked ascending by distance. When `radius` is
    /// given, candidates beyond it are dropped before the `k` cut.
    ///
    /// Errors if no distance metric has been selected.
    fn query(
        &self,
        code: HashCode,
        vector: &[f32],
        k: usize,
        radius: Option<f32>,
    ) -> Result<Vec<NeighborRecord>>;

    /// Select the metric used by subsequent queries.
    fn set_distance_metric(&mut self, metric: DistanceMetric);

    /// Metric currently selected, if any.
    fn distance_metric(&self) -> Option<DistanceMetric>;

    /// Number of indexed entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An indexed entry: the stored vector plus its provenance.
#[derive(Debug, Clone)]
struct Entry {
    vector: Vec<f32>,
    provenance: Provenance,
}

/// In-memory bucketed index keyed by hash code.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    /// Bucket key -> entry ids, in insertion order.
    buckets: HashMap<u64, SmallVec<[u32; 8]>>,
    entries: Vec<Entry>,
    metric: Option<DistanceMetric>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AnnIndex for MemoryIndex {
    fn index(&mut self, code: HashCode, vector: Vec<f32>, provenance: Provenance) -> Result<()> {
        let id = self.entries.len() as u32;
        self.entries.push(Entry { vector, provenance });
        self.buckets.entry(code.as_key()).or_default().push(id);
        Ok(())
    }

    fn query(
        &self,
        code: HashCode,
        vector: &[f32],
        k: usize,
        radius: Option<f32>,
    ) -> Result<Vec<NeighborRecord>> {
        let Some(metric) = self.metric else {
            return Err(SearchError::Config(
                "no distance metric set; call set_distance_metric before querying".into(),
            ));
        };

        let Some(ids) = self.buckets.get(&code.as_key()) else {
            return Ok(Vec::new());
        };

        let mut records: Vec<NeighborRecord> = ids
            .iter()
            .map(|&id| {
                let entry = &self.entries[id as usize];
                NeighborRecord {
                    provenance: entry.provenance.clone(),
                    distance: metric.distance(vector, &entry.vector),
                }
            })
            .filter(|r| match radius {
                Some(rad) => r.distance <= rad,
                None => true,
            })
            .collect();

        // Stable sort: ties keep insertion order, the core never re-sorts.
        records.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        records.truncate(k);
        Ok(records)
    }

    fn set_distance_metric(&mut self, metric: DistanceMetric) {
        self.metric = Some(metric);
    }

    fn distance_metric(&self) -> Option<DistanceMetric> {
        self.metric
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
