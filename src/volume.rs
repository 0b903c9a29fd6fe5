//! Volumetric scans and the sources that supply them.
//!
//! A [`Volume`] is a dense 3-D intensity array stored flat in row-major
//! order, paired with a 4x4 affine transform mapping voxel indices to
//! scanner space and an optional one-hot class label. Loading from on-disk
//! scan formats lives behind the [`VolumeSource`] trait; the core only
//! consumes volumes as an ordered, restartable sequence.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};

/// Identity affine, used when a source carries no spatial registration.
pub const IDENTITY_AFFINE: [[f32; 4]; 4] = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// A 3-D intensity volume with spatial registration and an optional label.
#[derive(Debug, Clone)]
pub struct Volume {
    data: Vec<f32>,
    shape: [usize; 3],
    affine: [[f32; 4]; 4],
    /// One-hot class label, when the subject is labelled.
    label: Option<Vec<f32>>,
}

impl Volume {
    /// Create a volume from flat row-major data.
    ///
    /// Errors if `data.len()` does not match `prod(shape)`.
    pub fn new(
        data: Vec<f32>,
        shape: [usize; 3],
        affine: [[f32; 4]; 4],
        label: Option<Vec<f32>>,
    ) -> Result<Self> {
        let expected = shape[0] * shape[1] * shape[2];
        if data.len() != expected {
            return Err(SearchError::Data(format!(
                "volume data has {} values, shape {:?} requires {}",
                data.len(),
                shape,
                expected
            )));
        }
        Ok(Self {
            data,
            shape,
            affine,
            label,
        })
    }

    /// Volume filled with a constant value (mostly for tests and synthesis).
    pub fn filled(value: f32, shape: [usize; 3]) -> Self {
        Self {
            data: vec![value; shape[0] * shape[1] * shape[2]],
            shape,
            affine: IDENTITY_AFFINE,
            label: None,
        }
    }

    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn affine(&self) -> &[[f32; 4]; 4] {
        &self.affine
    }

    pub fn label(&self) -> Option<&[f32]> {
        self.label.as_deref()
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Flat index of voxel `[x, y, z]` (row-major over the three axes).
    #[inline]
    pub fn offset(&self, pos: [usize; 3]) -> usize {
        (pos[0] * self.shape[1] + pos[1]) * self.shape[2] + pos[2]
    }

    /// Intensity at voxel `[x, y, z]`.
    #[inline]
    pub fn get(&self, pos: [usize; 3]) -> f32 {
        self.data[self.offset(pos)]
    }

    /// Set the one-hot label for this volume.
    pub fn with_label(mut self, label: Vec<f32>) -> Self {
        self.label = Some(label);
        self
    }
}

/// One-hot encoding of class `index` out of `num_classes`.
pub fn one_hot(index: usize, num_classes: usize) -> Vec<f32> {
    let mut label = vec![0.0; num_classes];
    if index < num_classes {
        label[index] = 1.0;
    }
    label
}

/// An ordered, restartable sequence of volumes.
///
/// This is the boundary to the scan-loading collaborator: implementations
/// read whatever on-disk format the cohort uses and surface per-subject
/// failures as [`SearchError::Data`] so batch drivers can skip and tally.
pub trait VolumeSource {
    /// Number of subjects in the cohort.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over `(subject_id, volume)` pairs from the start.
    ///
    /// Calling this again restarts the sequence; sources must not carry
    /// iteration state across calls.
    fn volumes(&self) -> Box<dyn Iterator<Item = Result<(u32, Volume)>> + '_>;
}

/// In-memory cohort, the backing source for training and tests.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    subjects: Vec<(u32, Volume)>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, id: u32, volume: Volume) {
        self.subjects.push((id, volume));
    }
}

impl VolumeSource for MemorySource {
    fn len(&self) -> usize {
        self.subjects.len()
    }

    fn volumes(&self) -> Box<dyn Iterator<Item = Result<(u32, Volume)>> + '_> {
        Box::new(self.subjects.iter().map(|(id, v)| Ok((*id, v.clone()))))
    }
}

/// One subject in a cohort config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectEntry {
    /// Path to the scan file, resolved by the loading collaborator.
    pub path: String,
    /// Human-readable subject name.
    pub name: String,
    /// Numeric subject id.
    pub id: u32,
    /// Class index (0 = control).
    pub label: usize,
}

/// Cohort descriptor, the JSON handshake format with the scan loader.
///
/// ```json
/// {
///   "name": "parkinson-cohort",
///   "type": "nifti",
///   "sources": [{"path": "...", "name": "control_07", "id": 7, "label": 0}]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub sources: Vec<SubjectEntry>,
}

impl DataConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Number of distinct classes across the cohort.
    pub fn num_classes(&self) -> usize {
        self.sources
            .iter()
            .map(|s| s.label + 1)
            .max()
            .unwrap_or(0)
    }

    /// Fraction of subjects whose class index is nonzero.
    ///
    /// This is the population prior `ratio_pos` used by the voxel statistics
    /// when the reference cohort is binary (control vs. positive).
    pub fn positive_ratio(&self) -> f32 {
        if self.sources.is_empty() {
            return 0.0;
        }
        let positives = self.sources.iter().filter(|s| s.label != 0).count();
        positives as f32 / self.sources.len() as f32
    }
}
