//! Patch extraction: slicing a volume into fixed-shape sub-volumes.
//!
//! Volumes are tiled non-overlapping (stride = patch shape) from the origin;
//! partial patches at the boundary are discarded. An optional non-empty
//! threshold drops mostly-background patches so the index is not flooded
//! with empty tissue.

use crate::error::{Result, SearchError};
use crate::volume::Volume;

/// Fixed 3-D patch dimensions, immutable once a database is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchShape {
    dims: [usize; 3],
}

impl PatchShape {
    pub fn new(dims: [usize; 3]) -> Result<Self> {
        if dims.iter().any(|&d| d == 0) {
            return Err(SearchError::Config(format!(
                "patch shape {:?} has a zero dimension",
                dims
            )));
        }
        Ok(Self { dims })
    }

    /// Parse the `"X,Y,Z"` text form used by database init surfaces.
    pub fn parse(text: &str) -> Result<Self> {
        let dims: Vec<usize> = text
            .split(',')
            .map(|part| {
                part.trim()
                    .parse::<usize>()
                    .map_err(|_| SearchError::Config(format!("invalid patch shape: {text:?}")))
            })
            .collect::<Result<_>>()?;
        if dims.len() != 3 {
            return Err(SearchError::Config(format!(
                "patch shape {text:?} must have exactly 3 dimensions"
            )));
        }
        Self::new([dims[0], dims[1], dims[2]])
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// Number of voxels per patch.
    pub fn len(&self) -> usize {
        self.dims[0] * self.dims[1] * self.dims[2]
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

impl std::fmt::Display for PatchShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{},{}", self.dims[0], self.dims[1], self.dims[2])
    }
}

/// Minimum non-background content required to keep a patch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MinNonempty {
    /// Fraction of the patch volume, in `[0, 1]`.
    Fraction(f32),
    /// Absolute count of non-zero voxels.
    Count(usize),
}

impl MinNonempty {
    /// Original surfaces take one number: values below 1 are fractions,
    /// values at or above 1 are absolute counts.
    pub fn from_value(value: f32) -> Self {
        if value < 1.0 {
            MinNonempty::Fraction(value)
        } else {
            MinNonempty::Count(value as usize)
        }
    }

    fn threshold(&self, shape: PatchShape) -> usize {
        match *self {
            MinNonempty::Fraction(f) => (f * shape.len() as f32).ceil() as usize,
            MinNonempty::Count(n) => n,
        }
    }
}

/// A fixed-shape sub-volume plus where it came from.
#[derive(Debug, Clone)]
pub struct Patch {
    /// Patch intensities, flat row-major, `shape.len()` values.
    pub values: Vec<f32>,
    /// Voxel-space position of the patch's top-left corner.
    pub position: [usize; 3],
    /// Id of the originating volume.
    pub volume_id: u32,
}

impl Patch {
    /// Count of non-zero (non-background) voxels.
    pub fn nonempty_voxels(&self) -> usize {
        self.values.iter().filter(|&&v| v != 0.0).count()
    }
}

/// Lazily extract patches from `volume` at every disjoint tiling position.
///
/// Errors immediately if any patch dimension exceeds the corresponding
/// volume dimension. The returned iterator is restartable by calling
/// `extract` again on the same volume.
pub fn extract<'a>(
    volume: &'a Volume,
    volume_id: u32,
    shape: PatchShape,
    min_nonempty: Option<MinNonempty>,
) -> Result<PatchIter<'a>> {
    let vol_shape = volume.shape();
    let dims = shape.dims();
    for axis in 0..3 {
        if dims[axis] > vol_shape[axis] {
            return Err(SearchError::Config(format!(
                "patch shape {} exceeds volume shape {:?} on axis {}",
                shape, vol_shape, axis
            )));
        }
    }
    Ok(PatchIter {
        volume,
        volume_id,
        shape,
        threshold: min_nonempty.map(|m| m.threshold(shape)),
        cursor: Some([0, 0, 0]),
    })
}

/// Number of disjoint tiling positions for `shape` inside `volume`.
pub fn tiling_count(volume: &Volume, shape: PatchShape) -> usize {
    let vol = volume.shape();
    let dims = shape.dims();
    (vol[0] / dims[0]) * (vol[1] / dims[1]) * (vol[2] / dims[2])
}

/// Iterator over a volume's patches. See [`extract`].
pub struct PatchIter<'a> {
    volume: &'a Volume,
    volume_id: u32,
    shape: PatchShape,
    threshold: Option<usize>,
    /// Next top-left corner, `None` when the tiling is exhausted.
    cursor: Option<[usize; 3]>,
}

impl<'a> PatchIter<'a> {
    fn advance(&mut self) {
        let Some(mut pos) = self.cursor else { return };
        let vol = self.volume.shape();
        let dims = self.shape.dims();

        pos[2] += dims[2];
        if pos[2] + dims[2] > vol[2] {
            pos[2] = 0;
            pos[1] += dims[1];
            if pos[1] + dims[1] > vol[1] {
                pos[1] = 0;
                pos[0] += dims[0];
                if pos[0] + dims[0] > vol[0] {
                    self.cursor = None;
                    return;
                }
            }
        }
        self.cursor = Some(pos);
    }

    fn slice_at(&self, pos: [usize; 3]) -> Patch {
        let dims = self.shape.dims();
        let mut values = Vec::with_capacity(self.shape.len());
        for x in 0..dims[0] {
            for y in 0..dims[1] {
                for z in 0..dims[2] {
                    values.push(self.volume.get([pos[0] + x, pos[1] + y, pos[2] + z]));
                }
            }
        }
        Patch {
            values,
            position: pos,
            volume_id: self.volume_id,
        }
    }
}

impl<'a> Iterator for PatchIter<'a> {
    type Item = Patch;

    fn next(&mut self) -> Option<Patch> {
        loop {
            let pos = self.cursor?;
            // Degenerate volumes smaller than one patch produce nothing.
            let vol = self.volume.shape();
            let dims = self.shape.dims();
            if pos[0] + dims[0] > vol[0] {
                self.cursor = None;
                return None;
            }
            let patch = self.slice_at(pos);
            self.advance();

            match self.threshold {
                Some(t) if patch.nonempty_voxels() < t => continue,
                _ => return Some(patch),
            }
        }
    }
}
