//! Batch drivers: whole-cohort build, evaluation, and map creation.
//!
//! Each driver processes one volume fully (extract, vectorize, query)
//! before the next, since classifications and statistical maps are
//! per-subject. Subjects that fail to load or produce no valid patches are
//! skipped and tallied; everything else is surfaced through the returned
//! summary structs rather than logged.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Instant;

use crate::aggregate::{argmax, majority_vote, weighted_majority_vote, BrainNeighbors, EvalSummary};
use crate::database::{BrainDatabase, DatabaseConfig, DatabaseManager, DatabaseReport};
use crate::error::{Result, SearchError};
use crate::hashing;
use crate::index::DistanceMetric;
use crate::patch::{extract, MinNonempty, Patch, PatchShape};
use crate::stats::{
    anomaly_score_map, proportion_map, proportion_z_score_map, VoxelAccumulator,
};
use crate::vector::{self, PatchVector};
use crate::volume::{Volume, VolumeSource};

/// How per-brain neighbor lists are turned into a class prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Voting {
    Majority,
    /// Labels weighted by `exp(-distance)`.
    WeightedMajority,
}

impl Voting {
    fn vote(self, brain: &BrainNeighbors) -> Option<usize> {
        match self {
            Voting::Majority => majority_vote(&brain.neighbors),
            Voting::WeightedMajority => weighted_majority_vote(&brain.neighbors),
        }
    }
}

/// Totals from building a database out of a cohort.
#[derive(Debug, Clone, Default)]
pub struct BuildSummary {
    pub num_brains: usize,
    pub num_patches: usize,
    /// Subjects skipped on data errors.
    pub num_failures: usize,
    pub elapsed: std::time::Duration,
}

/// Receives finished per-volume statistical maps.
///
/// The volumetric file writer implements this; [`MemorySink`] backs tests.
pub trait MapSink {
    fn accept(&mut self, name: &str, map: Volume) -> Result<()>;
}

/// Map sink that keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub maps: Vec<(String, Volume)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find(&self, name: &str) -> Option<&Volume> {
        self.maps.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

impl MapSink for MemorySink {
    fn accept(&mut self, name: &str, map: Volume) -> Result<()> {
        self.maps.push((name.to_string(), map));
        Ok(())
    }
}

fn subject_vectors(
    volume: &Volume,
    volume_id: u32,
    shape: PatchShape,
    spatial_weight: f32,
    min_nonempty: Option<MinNonempty>,
) -> Result<Vec<PatchVector>> {
    let label = volume.label().map(|l| l.to_vec());
    let vectors: Vec<PatchVector> = extract(volume, volume_id, shape, min_nonempty)?
        .map(|patch| vector::build(&patch, spatial_weight, label.clone()))
        .collect();
    if vectors.is_empty() {
        return Err(SearchError::Data(format!(
            "brain #{volume_id} produced no valid patches"
        )));
    }
    Ok(vectors)
}

/// Create a database from a cohort: train the hashing scheme if the method
/// needs it, persist the configuration, then index every subject's patches.
///
/// Training drains the cohort's patch vectors once; the trained parameters
/// are stored in the manifest so reopening never retrains.
pub fn build_database(
    manager: &DatabaseManager,
    mut config: DatabaseConfig,
    source: &dyn VolumeSource,
    min_nonempty: Option<MinNonempty>,
) -> Result<(BrainDatabase, BuildSummary)> {
    let start = Instant::now();
    let shape = config.shape()?;
    let dimension = config.vector_dimension()?;

    let needs_training = matches!(
        config.method,
        hashing::HashMethod::Pca | hashing::HashMethod::Sh
    ) && config.params.projection.is_none();

    if needs_training {
        let mut training: Vec<Vec<f32>> = Vec::new();
        for subject in source.volumes() {
            let (id, volume) = match subject {
                Ok(pair) => pair,
                Err(SearchError::Data(_)) => continue,
                Err(e) => return Err(e),
            };
            match subject_vectors(&volume, id, shape, config.spatial_weight, min_nonempty) {
                Ok(vectors) => training.extend(vectors.into_iter().map(|v| v.values)),
                Err(SearchError::Data(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        let mut it = training.into_iter();
        let scheme = hashing::create(
            config.method,
            dimension,
            config.num_bits,
            config.params.clone(),
            Some(&mut it),
        )?;
        config.params = scheme.params();
    }

    let mut db = manager.init(config)?;
    let mut summary = BuildSummary::default();

    for subject in source.volumes() {
        let (id, volume) = match subject {
            Ok(pair) => pair,
            Err(SearchError::Data(_)) => {
                summary.num_failures += 1;
                continue;
            }
            Err(e) => return Err(e),
        };
        match subject_vectors(&volume, id, shape, db.spatial_weight(), min_nonempty) {
            Ok(vectors) => {
                summary.num_patches += db.insert(vectors)?;
                summary.num_brains += 1;
            }
            Err(SearchError::Data(_)) => summary.num_failures += 1,
            Err(e) => return Err(e),
        }
    }

    summary.elapsed = start.elapsed();
    Ok((db, summary))
}

/// Classify every subject of a cohort against a database and report the
/// aggregate error rate.
pub fn evaluate(
    db: &mut BrainDatabase,
    source: &dyn VolumeSource,
    k: usize,
    min_nonempty: Option<MinNonempty>,
    voting: Voting,
) -> Result<EvalSummary> {
    let start = Instant::now();
    let shape = db.patch_shape()?;
    db.set_distance_metric(DistanceMetric::Euclidean);

    let mut summary = EvalSummary::default();
    for subject in source.volumes() {
        let (id, volume) = match subject {
            Ok(pair) => pair,
            Err(SearchError::Data(_)) => {
                summary.num_failures += 1;
                continue;
            }
            Err(e) => return Err(e),
        };
        let Some(truth) = volume.label().and_then(argmax) else {
            summary.num_failures += 1;
            continue;
        };
        let vectors =
            match subject_vectors(&volume, id, shape, db.spatial_weight(), min_nonempty) {
                Ok(v) => v,
                Err(SearchError::Data(_)) => {
                    summary.num_failures += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

        let per_patch = db.query(vectors, k, None)?;
        let brain = BrainNeighbors::from_patch_results(per_patch);

        summary.num_brains += 1;
        summary.num_patches += brain.num_patches;
        summary.num_neighbors += brain.num_neighbors();
        if voting.vote(&brain) == Some(truth) {
            summary.num_successes += 1;
        }
    }

    summary.elapsed = start.elapsed();
    Ok(summary)
}

/// Totals from a map-creation run.
#[derive(Debug, Clone, Default)]
pub struct MapSummary {
    pub num_brains: usize,
    pub num_patches: usize,
    pub num_neighbors: usize,
    pub num_failures: usize,
    pub elapsed: std::time::Duration,
}

/// Produce the three per-voxel statistical maps for every subject of a
/// cohort, handing each finished map to `sink`.
///
/// A neighbor's vote is positive when its label arg-max is a nonzero class
/// index; the vote covers the queried patch's whole region.
pub fn create_maps(
    db: &mut BrainDatabase,
    source: &dyn VolumeSource,
    k: usize,
    radius: Option<f32>,
    ratio_pos: f32,
    min_nonempty: Option<MinNonempty>,
    sink: &mut dyn MapSink,
) -> Result<MapSummary> {
    let start = Instant::now();
    let shape = db.patch_shape()?;
    db.set_distance_metric(DistanceMetric::Euclidean);

    let mut summary = MapSummary::default();
    for subject in source.volumes() {
        let (id, volume) = match subject {
            Ok(pair) => pair,
            Err(SearchError::Data(_)) => {
                summary.num_failures += 1;
                continue;
            }
            Err(e) => return Err(e),
        };
        let patches: Vec<Patch> =
            match extract(&volume, id, shape, min_nonempty)?.collect::<Vec<_>>() {
                p if p.is_empty() => {
                    summary.num_failures += 1;
                    continue;
                }
                p => p,
            };
        let vectors: Vec<PatchVector> = patches
            .iter()
            .map(|p| vector::build(p, db.spatial_weight(), None))
            .collect();
        let per_patch = db.query(vectors, k, radius)?;

        let mut acc = VoxelAccumulator::new(volume.shape());
        for (patch, neighbors) in patches.iter().zip(per_patch.iter()) {
            for neighbor in neighbors {
                let Some(class) = neighbor.provenance.label.as_deref().and_then(argmax) else {
                    continue;
                };
                acc.add_vote(patch.position, shape, class != 0, 1.0);
                summary.num_neighbors += 1;
            }
        }

        let affine = *volume.affine();
        let prop = proportion_map(acc.positives(), acc.negatives());
        let z = proportion_z_score_map(acc.positives(), acc.negatives(), ratio_pos);
        let anomaly = anomaly_score_map(acc.positives(), acc.negatives(), ratio_pos);
        sink.accept(&format!("brain{id}_proportion"), prop.into_volume(affine))?;
        sink.accept(&format!("brain{id}_zscore"), z.into_volume(affine))?;
        sink.accept(&format!("brain{id}_anomaly"), anomaly.into_volume(affine))?;

        summary.num_brains += 1;
        summary.num_patches += patches.len();
    }

    summary.elapsed = start.elapsed();
    Ok(summary)
}

/// Run integrity checks over stored databases. An empty `names` slice
/// checks everything the manager knows about.
pub fn check_databases(manager: &DatabaseManager, names: &[String]) -> Result<Vec<DatabaseReport>> {
    let names: Vec<String> = if names.is_empty() {
        manager.names()?
    } else {
        names.to_vec()
    };
    names
        .iter()
        .map(|name| Ok(manager.open(name)?.check()))
        .collect()
}

/// Stamp a uniform-intensity synthetic lesion into a copy of `volume`.
///
/// The lesion's top-left corner is drawn uniformly (seeded) from positions
/// whose patch region is mostly non-background (fewer than 5 zero voxels),
/// so lesions land in tissue rather than air. Optional Gaussian noise of
/// standard deviation `sigma` is added and values are clamped to [0, 1].
///
/// Returns the modified volume plus a 0/1 mask marking exactly the lesion
/// region, the ground truth for map-pipeline validation.
pub fn implant_patch(
    volume: &Volume,
    shape: PatchShape,
    value: f32,
    sigma: f32,
    seed: u64,
) -> Result<(Volume, Volume)> {
    let vol_shape = volume.shape();
    let dims = shape.dims();
    for axis in 0..3 {
        if dims[axis] > vol_shape[axis] {
            return Err(SearchError::Config(format!(
                "lesion shape {shape} exceeds volume shape {vol_shape:?}"
            )));
        }
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut position = None;
    for _attempt in 0..10_000 {
        let pos = [
            rng.gen_range(0..=vol_shape[0] - dims[0]),
            rng.gen_range(0..=vol_shape[1] - dims[1]),
            rng.gen_range(0..=vol_shape[2] - dims[2]),
        ];
        let mut zeros = 0;
        for x in 0..dims[0] {
            for y in 0..dims[1] {
                for z in 0..dims[2] {
                    if volume.get([pos[0] + x, pos[1] + y, pos[2] + z]) == 0.0 {
                        zeros += 1;
                    }
                }
            }
        }
        if zeros < 5 {
            position = Some(pos);
            break;
        }
    }
    let Some(pos) = position else {
        return Err(SearchError::Data(
            "no mostly-non-background position found for the lesion".into(),
        ));
    };

    let mut freak = volume.clone();
    let mut mask = Volume::filled(0.0, vol_shape);
    for x in 0..dims[0] {
        for y in 0..dims[1] {
            for z in 0..dims[2] {
                let voxel = [pos[0] + x, pos[1] + y, pos[2] + z];
                let noise = if sigma > 0.0 {
                    // Box-Muller transform; the crate carries no separate
                    // distributions dependency.
                    let u1: f32 = rng.gen::<f32>().max(f32::MIN_POSITIVE);
                    let u2: f32 = rng.gen();
                    sigma * (-2.0 * u1.ln()).sqrt() * (2.0 * std::f32::consts::PI * u2).cos()
                } else {
                    0.0
                };
                let off = freak.offset(voxel);
                freak.data_mut()[off] = (value + noise).clamp(0.0, 1.0);
                let moff = mask.offset(voxel);
                mask.data_mut()[moff] = 1.0;
            }
        }
    }
    Ok((freak, mask))
}
