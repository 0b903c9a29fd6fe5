//! Property-based invariants over extraction, vectorization, hashing, and
//! the voxel statistics.

use proptest::prelude::*;

use brainsearch::hashing::{self, HashMethod, HashingParams};
use brainsearch::patch::{self, MinNonempty, PatchShape};
use brainsearch::stats;
use brainsearch::vector;
use brainsearch::volume::{Volume, IDENTITY_AFFINE};

/// Small volumes with a mix of background (zero) and tissue voxels.
fn arb_volume() -> impl Strategy<Value = Volume> {
    (2usize..=6, 2usize..=6, 2usize..=6).prop_flat_map(|(x, y, z)| {
        prop::collection::vec(
            prop_oneof![
                3 => Just(0.0f32),
                7 => 0.01f32..1.0,
            ],
            x * y * z,
        )
        .prop_map(move |data| Volume::new(data, [x, y, z], IDENTITY_AFFINE, None).unwrap())
    })
}

proptest! {
    /// Raising the non-empty threshold never admits more patches.
    #[test]
    fn min_nonempty_filtering_is_monotone(volume in arb_volume(), lo in 0.0f32..0.5, hi in 0.5f32..1.0) {
        let shape = PatchShape::new([2, 2, 2]).unwrap();
        prop_assume!(volume.shape().iter().all(|&d| d >= 2));

        let loose = patch::extract(&volume, 0, shape, Some(MinNonempty::Fraction(lo)))
            .unwrap()
            .count();
        let strict = patch::extract(&volume, 0, shape, Some(MinNonempty::Fraction(hi)))
            .unwrap()
            .count();
        prop_assert!(strict <= loose);

        let unfiltered = patch::extract(&volume, 0, shape, None).unwrap().count();
        prop_assert!(loose <= unfiltered);
        prop_assert_eq!(unfiltered, patch::tiling_count(&volume, shape));
    }

    /// A patch vector is exactly the flattened patch, plus a three-component
    /// spatial tail when the weight is positive.
    #[test]
    fn vector_length_is_shape_plus_spatial_tail(volume in arb_volume(), weight in 0.0f32..2.0) {
        let shape = PatchShape::new([2, 2, 2]).unwrap();
        prop_assume!(volume.shape().iter().all(|&d| d >= 2));

        let expected = vector::vector_dimension(shape, weight);
        for patch in patch::extract(&volume, 0, shape, None).unwrap() {
            let v = vector::build(&patch, weight, None);
            prop_assert_eq!(v.values.len(), expected);
            prop_assert_eq!(&v.values[..shape.len()], &patch.values[..]);
            if weight > 0.0 {
                let tail = &v.values[shape.len()..];
                prop_assert_eq!(tail[0], patch.position[0] as f32 * weight);
                prop_assert_eq!(tail[1], patch.position[1] as f32 * weight);
                prop_assert_eq!(tail[2], patch.position[2] as f32 * weight);
            }
        }
    }

    /// Schemes built from the same seed hash identically.
    #[test]
    fn lsh_codes_are_deterministic(
        vector in prop::collection::vec(-1.0f32..1.0, 8),
        seed in any::<u64>(),
    ) {
        let params = HashingParams { seed: Some(seed), ..HashingParams::default() };
        let a = hashing::create(HashMethod::Lsh, 8, 6, params.clone(), None).unwrap();
        let b = hashing::create(HashMethod::Lsh, 8, 6, params, None).unwrap();
        prop_assert_eq!(a.hash(&vector).as_key(), b.hash(&vector).as_key());
    }

    /// Swapping the positive and negative counts (and the class prior)
    /// mirrors the anomaly score around one half.
    #[test]
    fn anomaly_score_mirrors_under_class_swap(
        positives in 0.0f32..50.0,
        negatives in 0.0f32..50.0,
        ratio in 0.05f32..0.95,
    ) {
        prop_assume!(positives + negatives > 0.0);
        let a = stats::anomaly_score(positives, negatives, ratio);
        let b = stats::anomaly_score(negatives, positives, 1.0 - ratio);
        prop_assert!((a + b - 1.0).abs() < 1e-4);
    }

    /// The proportion stays in [0, 1] and is zero where no votes landed.
    #[test]
    fn proportion_stays_in_unit_interval(positives in 0.0f32..100.0, negatives in 0.0f32..100.0) {
        let p = stats::proportion(positives, negatives);
        prop_assert!((0.0..=1.0).contains(&p));
        prop_assert_eq!(stats::proportion(0.0, 0.0), 0.0);
    }
}
