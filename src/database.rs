//! Brain databases: a patch shape, a hashing scheme, and an index.
//!
//! A [`BrainDatabase`] binds one hashing scheme and one index instance to a
//! fixed patch shape. Its configuration (shape, method, trained parameters)
//! persists as a JSON manifest under the manager's storage directory, so a
//! database reopened later hashes identically without retraining. Index
//! contents themselves are backend-owned; the core treats their persistence
//! as opaque.
//!
//! The [`DatabaseManager`] is an explicit session value (storage directory +
//! readonly flag) passed into each operation; there is no global "current
//! database" state.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, SearchError};
use crate::hashing::{self, HashMethod, HashingParams, HashingScheme};
use crate::index::{AnnIndex, DistanceMetric, MemoryIndex, NeighborRecord};
use crate::patch::PatchShape;
use crate::vector::{vector_dimension, PatchVector};

const MANIFEST_FILE: &str = "manifest.json";

/// Everything needed to reopen a database: identity, geometry, and the
/// hashing scheme with its trained parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub name: String,
    pub patch_shape: [usize; 3],
    pub spatial_weight: f32,
    pub method: HashMethod,
    pub num_bits: usize,
    #[serde(default)]
    pub params: HashingParams,
}

impl DatabaseConfig {
    pub fn shape(&self) -> Result<PatchShape> {
        PatchShape::new(self.patch_shape)
    }

    /// Fixed vector length for this database.
    pub fn vector_dimension(&self) -> Result<usize> {
        Ok(vector_dimension(self.shape()?, self.spatial_weight))
    }
}

/// Diagnostic report from [`BrainDatabase::check`].
#[derive(Debug, Clone)]
pub struct DatabaseReport {
    pub name: String,
    pub patch_shape: [usize; 3],
    pub method: HashMethod,
    pub num_bits: usize,
    pub entries: usize,
    pub metric_set: bool,
    /// Integrity problems found; empty means the database checks out.
    pub issues: Vec<String>,
}

/// One brain database: configuration, hashing scheme, index instance.
pub struct BrainDatabase {
    config: DatabaseConfig,
    scheme: HashingScheme,
    index: Box<dyn AnnIndex>,
    readonly: bool,
}

impl BrainDatabase {
    /// Assemble a database from a config, rebuilding the scheme from the
    /// config's (possibly trained) parameters.
    pub fn from_config(config: DatabaseConfig, readonly: bool) -> Result<Self> {
        let dimension = config.vector_dimension()?;
        let scheme = hashing::create(
            config.method,
            dimension,
            config.num_bits,
            config.params.clone(),
            None,
        )?;
        Ok(Self {
            config,
            scheme,
            index: Box::new(MemoryIndex::new()),
            readonly,
        })
    }

    /// Swap in a different index backend (still bound to this database's
    /// shape and scheme).
    pub fn with_index(mut self, index: Box<dyn AnnIndex>) -> Self {
        self.index = index;
        self
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn patch_shape(&self) -> Result<PatchShape> {
        self.config.shape()
    }

    pub fn spatial_weight(&self) -> f32 {
        self.config.spatial_weight
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    fn expect_dimension(&self, vector: &PatchVector) -> Result<()> {
        let expected = self.scheme.dimension();
        if vector.values.len() != expected {
            return Err(SearchError::Config(format!(
                "vector has {} components, database {:?} expects {}",
                vector.values.len(),
                self.config.name,
                expected
            )));
        }
        Ok(())
    }

    /// Hash and index a stream of vectors, returning the count added.
    ///
    /// Not transactional: a failure partway leaves prior insertions
    /// committed.
    pub fn insert(&mut self, vectors: impl IntoIterator<Item = PatchVector>) -> Result<usize> {
        if self.readonly {
            return Err(SearchError::Config(format!(
                "database {:?} opened readonly",
                self.config.name
            )));
        }
        let mut added = 0;
        for vector in vectors {
            self.expect_dimension(&vector)?;
            let code = self.scheme.hash(&vector.values);
            self.index.index(code, vector.values, vector.provenance)?;
            added += 1;
        }
        Ok(added)
    }

    /// Select the distance metric used by subsequent queries. A database
    /// with no metric set is invalid for querying.
    pub fn set_distance_metric(&mut self, metric: DistanceMetric) {
        self.index.set_distance_metric(metric);
    }

    /// Query a stream of vectors: one neighbor list per input, each at most
    /// `k` records, optionally filtered to `radius` before the `k` cut.
    pub fn query(
        &self,
        vectors: impl IntoIterator<Item = PatchVector>,
        k: usize,
        radius: Option<f32>,
    ) -> Result<Vec<Vec<NeighborRecord>>> {
        let mut results = Vec::new();
        for vector in vectors {
            self.expect_dimension(&vector)?;
            let code = self.scheme.hash(&vector.values);
            results.push(self.index.query(code, &vector.values, k, radius)?);
        }
        Ok(results)
    }

    /// Validate index/metadata integrity. Operational only, not on the hot
    /// query path.
    pub fn check(&self) -> DatabaseReport {
        let mut issues = Vec::new();
        if self.index.is_empty() {
            issues.push("index is empty".to_string());
        }
        match self.config.vector_dimension() {
            Ok(dim) if dim != self.scheme.dimension() => issues.push(format!(
                "scheme dimension {} does not match configured vector length {}",
                self.scheme.dimension(),
                dim
            )),
            Err(e) => issues.push(format!("invalid patch shape: {e}")),
            _ => {}
        }
        if self.scheme.num_bits() != self.config.num_bits {
            issues.push(format!(
                "scheme has {} bits, config says {}",
                self.scheme.num_bits(),
                self.config.num_bits
            ));
        }
        DatabaseReport {
            name: self.config.name.clone(),
            patch_shape: self.config.patch_shape,
            method: self.config.method,
            num_bits: self.config.num_bits,
            entries: self.index.len(),
            metric_set: self.index.distance_metric().is_some(),
            issues,
        }
    }
}

/// Session value for database operations: storage directory + readonly flag.
#[derive(Debug, Clone)]
pub struct DatabaseManager {
    storage_dir: PathBuf,
    readonly: bool,
}

impl DatabaseManager {
    pub fn new(storage_dir: impl Into<PathBuf>, readonly: bool) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            readonly,
        }
    }

    pub fn readonly(&self) -> bool {
        self.readonly
    }

    fn database_dir(&self, name: &str) -> PathBuf {
        self.storage_dir.join(name)
    }

    fn manifest_path(&self, name: &str) -> PathBuf {
        self.database_dir(name).join(MANIFEST_FILE)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.manifest_path(name).is_file()
    }

    /// Names of all stored databases, sorted.
    pub fn names(&self) -> Result<Vec<String>> {
        if !self.storage_dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.storage_dir)? {
            let entry = entry?;
            if entry.path().join(MANIFEST_FILE).is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Create a new database, persisting its manifest. Errors if the name
    /// already exists or the session is readonly.
    pub fn init(&self, config: DatabaseConfig) -> Result<BrainDatabase> {
        if self.readonly {
            return Err(SearchError::Config("session is readonly".into()));
        }
        if self.exists(&config.name) {
            return Err(SearchError::Config(format!(
                "database {:?} already exists; clear it first",
                config.name
            )));
        }
        let db = BrainDatabase::from_config(config.clone(), false)?;
        fs::create_dir_all(self.database_dir(&config.name))?;
        let json = serde_json::to_string_pretty(&config)?;
        fs::write(self.manifest_path(&config.name), json)?;
        Ok(db)
    }

    /// Reopen a stored database from its manifest.
    pub fn open(&self, name: &str) -> Result<BrainDatabase> {
        if !self.exists(name) {
            return Err(SearchError::Config(format!(
                "nonexistent brain database: {name:?}"
            )));
        }
        let json = fs::read_to_string(self.manifest_path(name))?;
        let config: DatabaseConfig = serde_json::from_str(&json)?;
        BrainDatabase::from_config(config, self.readonly)
    }

    /// Delete stored databases wholesale. Without `force`, a directory with
    /// no manifest is left alone (it may not be ours).
    pub fn clear(&self, names: &[String], force: bool) -> Result<usize> {
        if self.readonly {
            return Err(SearchError::Config("session is readonly".into()));
        }
        let mut removed = 0;
        for name in names {
            let dir = self.database_dir(name);
            if !dir.is_dir() {
                return Err(SearchError::Config(format!(
                    "nonexistent brain database: {name:?}"
                )));
            }
            if !self.exists(name) && !force {
                return Err(SearchError::Config(format!(
                    "{name:?} has no manifest; pass force to remove it anyway"
                )));
            }
            fs::remove_dir_all(&dir)?;
            removed += 1;
        }
        Ok(removed)
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }
}
