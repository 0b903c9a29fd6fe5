//! brainsearch: content-based retrieval over volumetric brain scans.
//!
//! Volumes are decomposed into fixed-shape patches, each patch becomes a
//! fixed-length vector and a compact hash code, and an approximate
//! nearest-neighbor index built from a reference cohort retrieves
//! structurally similar patches from other subjects. Retrieved neighbors
//! feed two analyses:
//!
//! - **Classification**: majority vote over the labels of a whole scan's
//!   neighbors (`eval`).
//! - **Anomaly mapping**: per-voxel proportion tests comparing the mix of
//!   positive/negative neighbor votes against the expected population
//!   ratio, producing a spatial map of abnormal regions (`map`).
//!
//! # Pipeline
//!
//! ```text
//! Volume ─▶ patch::extract ─▶ vector::build ─▶ BrainDatabase
//!                                               │ insert (build time)
//!                                               │ query  (search time)
//!                                               ▼
//!                          per-patch neighbor lists
//!                         ┌──────────┴───────────┐
//!                         ▼                      ▼
//!                aggregate (vote)        stats (voxel maps)
//! ```
//!
//! The ANN engine, volume file I/O, and map output are collaborators
//! behind traits ([`index::AnnIndex`], [`volume::VolumeSource`],
//! [`pipeline::MapSink`]); in-memory implementations of each are bundled.
//!
//! # Example
//!
//! ```
//! use brainsearch::database::{DatabaseConfig, DatabaseManager};
//! use brainsearch::hashing::{HashMethod, HashingParams};
//! use brainsearch::pipeline::{self, Voting};
//! use brainsearch::volume::{MemorySource, Volume};
//!
//! # fn main() -> brainsearch::Result<()> {
//! let dir = std::env::temp_dir().join("brainsearch-doc");
//! let _ = std::fs::remove_dir_all(&dir);
//! let manager = DatabaseManager::new(&dir, false);
//!
//! let mut cohort = MemorySource::new();
//! cohort.push(0, Volume::filled(0.5, [9, 9, 9]).with_label(vec![1.0, 0.0]));
//!
//! let config = DatabaseConfig {
//!     name: "demo".into(),
//!     patch_shape: [3, 3, 3],
//!     spatial_weight: 0.0,
//!     method: HashMethod::Lsh,
//!     num_bits: 8,
//!     params: HashingParams::default(),
//! };
//! let (mut db, build) = pipeline::build_database(&manager, config, &cohort, None)?;
//! assert_eq!(build.num_patches, 27);
//!
//! let summary = pipeline::evaluate(&mut db, &cohort, 1, None, Voting::Majority)?;
//! assert_eq!(summary.error_rate(), 0.0);
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod database;
pub mod error;
pub mod hashing;
pub mod index;
pub mod patch;
pub mod pipeline;
pub mod stats;
pub mod vector;
pub mod volume;

pub use database::{BrainDatabase, DatabaseConfig, DatabaseManager};
pub use error::{Result, SearchError};
pub use hashing::{HashCode, HashMethod, HashingScheme};
pub use index::{AnnIndex, DistanceMetric, NeighborRecord};
pub use patch::{MinNonempty, Patch, PatchShape};
pub use vector::{PatchVector, Provenance};
pub use volume::{Volume, VolumeSource};
