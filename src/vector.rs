//! Vector construction: flattening patches with optional spatial weighting.
//!
//! A patch becomes a flat f32 vector in the same row-major order the
//! extractor produced. When a spatial weight is configured, the patch's
//! voxel-space position (scaled by the weight) is appended as three extra
//! components, so spatial proximity influences hash-code similarity
//! proportionally to the weight.

use serde::{Deserialize, Serialize};

use crate::patch::{Patch, PatchShape};

/// Where a vector came from: subject, voxel position, and class label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub volume_id: u32,
    pub position: [usize; 3],
    /// One-hot class label of the originating subject, when known.
    pub label: Option<Vec<f32>>,
}

/// A patch flattened to a fixed-length vector, plus its provenance.
#[derive(Debug, Clone)]
pub struct PatchVector {
    pub values: Vec<f32>,
    pub provenance: Provenance,
}

/// Vector length for a given patch shape and spatial weight.
///
/// Databases fix this at init time; every vector they see must match.
pub fn vector_dimension(shape: PatchShape, spatial_weight: f32) -> usize {
    if spatial_weight > 0.0 {
        shape.len() + 3
    } else {
        shape.len()
    }
}

/// Flatten `patch` into a vector, appending the weighted position when
/// `spatial_weight > 0`.
pub fn build(patch: &Patch, spatial_weight: f32, label: Option<Vec<f32>>) -> PatchVector {
    let mut values = patch.values.clone();
    if spatial_weight > 0.0 {
        values.extend(patch.position.iter().map(|&p| p as f32 * spatial_weight));
    }
    PatchVector {
        values,
        provenance: Provenance {
            volume_id: patch.volume_id,
            position: patch.position,
            label,
        },
    }
}
