//! End-to-end pipeline tests: build a database from a synthetic cohort,
//! then exercise self-query retrieval, whole-scan classification, and the
//! voxel-level anomaly maps against known ground truth.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use brainsearch::database::{DatabaseConfig, DatabaseManager};
use brainsearch::hashing::{HashMethod, HashingParams};
use brainsearch::pipeline::{self, MemorySink, Voting};
use brainsearch::volume::{MemorySource, Volume, IDENTITY_AFFINE};
use brainsearch::PatchShape;

fn lsh_config(name: &str, num_bits: usize) -> DatabaseConfig {
    DatabaseConfig {
        name: name.into(),
        patch_shape: [3, 3, 3],
        spatial_weight: 0.0,
        method: HashMethod::Lsh,
        num_bits,
        params: HashingParams::default(),
    }
}

/// Synthetic tissue: deterministic intensities in (0.3, 0.7), no background.
fn tissue_volume(seed: u64, shape: [usize; 3]) -> Volume {
    let mut rng = StdRng::seed_from_u64(seed);
    let n = shape[0] * shape[1] * shape[2];
    let data = (0..n).map(|_| 0.3 + 0.4 * rng.gen::<f32>()).collect();
    Volume::new(data, shape, IDENTITY_AFFINE, None).unwrap()
}

#[test]
fn self_query_returns_each_patch_at_distance_zero() {
    // A 9x9x9 volume tiles into exactly 27 3x3x3 patches; hashed with an
    // 8-bit LSH scheme and queried against itself with k = 1, every patch
    // must come back as its own nearest neighbor at distance 0.
    let dir = tempfile::TempDir::new().unwrap();
    let manager = DatabaseManager::new(dir.path(), false);

    let mut cohort = MemorySource::new();
    cohort.push(0, tissue_volume(1, [9, 9, 9]).with_label(vec![1.0, 0.0]));

    let (mut db, build) =
        pipeline::build_database(&manager, lsh_config("self", 8), &cohort, None).unwrap();
    assert_eq!(build.num_brains, 1);
    assert_eq!(build.num_patches, 27);
    assert_eq!(db.len(), 27);

    db.set_distance_metric(brainsearch::DistanceMetric::Euclidean);
    let shape = PatchShape::new([3, 3, 3]).unwrap();
    let volume = tissue_volume(1, [9, 9, 9]);
    let vectors: Vec<_> = brainsearch::patch::extract(&volume, 0, shape, None)
        .unwrap()
        .map(|p| brainsearch::vector::build(&p, 0.0, None))
        .collect();
    let expected: Vec<[usize; 3]> = vectors.iter().map(|v| v.provenance.position).collect();

    let results = db.query(vectors, 1, None).unwrap();
    assert_eq!(results.len(), 27);
    for (neighbors, position) in results.iter().zip(expected) {
        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors[0].distance, 0.0);
        assert_eq!(neighbors[0].provenance.position, position);
    }
}

#[test]
fn cohort_classifies_itself_perfectly_with_k1() {
    let dir = tempfile::TempDir::new().unwrap();
    let manager = DatabaseManager::new(dir.path(), false);

    let mut cohort = MemorySource::new();
    for id in 0..4u64 {
        let label = if id % 2 == 0 {
            vec![1.0, 0.0]
        } else {
            vec![0.0, 1.0]
        };
        cohort.push(id as u32, tissue_volume(id + 10, [9, 9, 9]).with_label(label));
    }

    let (mut db, build) =
        pipeline::build_database(&manager, lsh_config("eval", 8), &cohort, None).unwrap();
    assert_eq!(build.num_patches, 4 * 27);

    // Each patch's nearest neighbor is itself, so each brain's combined
    // neighbor labels are exactly its own label.
    let summary = pipeline::evaluate(&mut db, &cohort, 1, None, Voting::Majority).unwrap();
    assert_eq!(summary.num_brains, 4);
    assert_eq!(summary.num_successes, 4);
    assert_eq!(summary.error_rate(), 0.0);
    assert_eq!(summary.num_patches, 4 * 27);

    // Weighted voting agrees on distance-zero self matches.
    let weighted =
        pipeline::evaluate(&mut db, &cohort, 1, None, Voting::WeightedMajority).unwrap();
    assert_eq!(weighted.num_successes, 4);
}

#[test]
fn anomaly_maps_light_up_an_implanted_lesion() {
    let dir = tempfile::TempDir::new().unwrap();
    let manager = DatabaseManager::new(dir.path(), false);
    let shape = PatchShape::new([3, 3, 3]).unwrap();

    // Reference cohort: a control brain and a lesioned copy of it.
    let control = tissue_volume(42, [9, 9, 9]);
    let (lesioned, mask) = pipeline::implant_patch(&control, shape, 0.22, 0.0, 7).unwrap();

    let mut reference = MemorySource::new();
    reference.push(0, control.clone().with_label(vec![1.0, 0.0]));
    reference.push(1, lesioned.clone().with_label(vec![0.0, 1.0]));

    let (mut db, _) =
        pipeline::build_database(&manager, lsh_config("map", 8), &reference, None).unwrap();

    // Query the lesioned anatomy. Tissue patches tie with the control's
    // identical patches (inserted first, so they win at k = 1) while lesion
    // patches only match the lesioned exemplar.
    let mut query = MemorySource::new();
    query.push(7, lesioned.clone());

    let mut sink = MemorySink::new();
    let summary =
        pipeline::create_maps(&mut db, &query, 1, None, 0.5, None, &mut sink).unwrap();
    assert_eq!(summary.num_brains, 1);
    assert_eq!(summary.num_patches, 27);

    let proportion = sink.find("brain7_proportion").unwrap();
    let anomaly = sink.find("brain7_anomaly").unwrap();
    assert_eq!(proportion.shape(), [9, 9, 9]);

    // Every voxel of the implanted region sits in a patch whose only match
    // carries the positive label, so its positive-vote proportion is 1.
    let mut inside = Vec::new();
    let mut outside = Vec::new();
    for i in 0..mask.data().len() {
        if mask.data()[i] == 1.0 {
            assert_eq!(proportion.data()[i], 1.0);
            inside.push(anomaly.data()[i]);
        } else {
            outside.push(anomaly.data()[i]);
        }
    }
    let mean = |v: &[f32]| v.iter().sum::<f32>() / v.len() as f32;
    assert!(
        mean(&inside) < mean(&outside),
        "lesion voxels should diverge from the tissue baseline"
    );
}

#[test]
fn trained_sh_database_survives_a_reopen() {
    let dir = tempfile::TempDir::new().unwrap();
    let manager = DatabaseManager::new(dir.path(), false);

    let mut cohort = MemorySource::new();
    for id in 0..3u64 {
        cohort.push(
            id as u32,
            tissue_volume(id + 20, [6, 6, 6]).with_label(vec![1.0, 0.0]),
        );
    }

    let config = DatabaseConfig {
        name: "spectral".into(),
        patch_shape: [3, 3, 3],
        spatial_weight: 0.5,
        method: HashMethod::Sh,
        num_bits: 6,
        params: HashingParams::default(),
    };
    let (db, build) = pipeline::build_database(&manager, config, &cohort, None).unwrap();
    assert_eq!(build.num_patches, 3 * 8);
    drop(db);

    // The persisted manifest carries the trained projection and bounds, so
    // a readonly session reopens an identically-hashing database.
    let reader = DatabaseManager::new(dir.path(), true);
    let mut reopened = reader.open("spectral").unwrap();
    assert_eq!(reopened.config().method, HashMethod::Sh);
    assert!(reopened.config().params.projection.is_some());
    assert!(reopened.config().params.bounds.is_some());

    // Rebuild the index contents through a writable session and self-query.
    let writer = DatabaseManager::new(dir.path(), false);
    let mut writable = writer.open("spectral").unwrap();
    let shape = PatchShape::new([3, 3, 3]).unwrap();
    for subject in [0u32, 1, 2] {
        let volume = tissue_volume(subject as u64 + 20, [6, 6, 6]);
        let vectors: Vec<_> = brainsearch::patch::extract(&volume, subject, shape, None)
            .unwrap()
            .map(|p| brainsearch::vector::build(&p, 0.5, None))
            .collect();
        writable.insert(vectors).unwrap();
    }
    writable.set_distance_metric(brainsearch::DistanceMetric::Euclidean);

    let probe = tissue_volume(21, [6, 6, 6]);
    let vectors: Vec<_> = brainsearch::patch::extract(&probe, 1, shape, None)
        .unwrap()
        .map(|p| brainsearch::vector::build(&p, 0.5, None))
        .collect();
    let results = writable.query(vectors, 1, None).unwrap();
    for neighbors in &results {
        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors[0].distance, 0.0);
        assert_eq!(neighbors[0].provenance.volume_id, 1);
    }

    // The reopened readonly database refuses inserts.
    let volume = tissue_volume(20, [6, 6, 6]);
    let vectors: Vec<_> = brainsearch::patch::extract(&volume, 0, shape, None)
        .unwrap()
        .map(|p| brainsearch::vector::build(&p, 0.5, None))
        .collect();
    assert!(reopened.insert(vectors).is_err());
}

#[test]
fn check_reports_cover_all_stored_databases() {
    let dir = tempfile::TempDir::new().unwrap();
    let manager = DatabaseManager::new(dir.path(), false);
    manager.init(lsh_config("one", 4)).unwrap();
    manager.init(lsh_config("two", 4)).unwrap();

    let reports = pipeline::check_databases(&manager, &[]).unwrap();
    assert_eq!(reports.len(), 2);
    let names: Vec<&str> = reports.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["one", "two"]);
    // Freshly reopened databases have empty indexes; check flags that.
    assert!(reports.iter().all(|r| !r.issues.is_empty()));
}
