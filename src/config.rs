//! Index configuration.
//!
//! [`IndexConfig`] carries every tunable of a build session. Defaults mirror
//! a 128-dimensional IVF512,PQ64 index flushed in blocks of 1024 vectors.
//! Configs deserialize from JSON with missing fields filled from the
//! defaults, so a file only needs the values it overrides:
//!
//! ```json
//! { "dimension": 512, "num_clusters": 1024, "root": "/var/lib/tiles" }
//! ```

use crate::error::{IndexError, Result};
use crate::persistence::layout::StorageLayout;
use crate::persistence::PersistenceError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default vector dimension.
pub const DEFAULT_DIMENSION: usize = 128;

/// Default number of IVF lists.
pub const DEFAULT_NUM_CLUSTERS: usize = 512;

/// Default number of vectors per shard.
pub const DEFAULT_BLOCK_SIZE: usize = 1024;

/// Default number of lists probed per query.
pub const DEFAULT_NPROBE: usize = 16;

/// Default number of PQ subspaces (one byte of code each).
pub const DEFAULT_NUM_CODEBOOKS: usize = 64;

/// Largest codebook addressable by a `u8` code.
pub const MAX_CODEBOOK_SIZE: usize = 256;

/// Default Lloyd iteration cap for k-means.
pub const DEFAULT_KMEANS_ITERATIONS: usize = 25;

/// Default storage root.
pub const DEFAULT_ROOT: &str = "./data_index";

/// Configuration for a [`BlockIndex`](crate::BlockIndex) session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Vector dimension `d`.
    pub dimension: usize,
    /// Number of inverted lists (coarse k-means clusters).
    pub num_clusters: usize,
    /// Vectors per block; a full block is flushed to one shard.
    pub block_size: usize,
    /// Storage root for the trained, shard, and merged files.
    pub root: PathBuf,
    /// Replace an existing trained/merged index instead of refusing.
    pub overwrite: bool,
    /// Inverted lists scanned per query.
    pub nprobe: usize,
    /// PQ subspaces. Must divide `dimension`.
    pub num_codebooks: usize,
    /// Codewords per subspace, at most 256.
    pub codebook_size: usize,
    /// Lloyd iteration cap for both coarse and PQ k-means.
    pub kmeans_iterations: usize,
    /// Seed for k-means++; `None` draws one from entropy.
    pub seed: Option<u64>,
    /// File name of the trained, empty index under `root`.
    pub trained_index_name: String,
    /// File name of the merged index under `root`.
    pub index_name: String,
    /// Directory for shard files under `root`.
    pub block_dir: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
            num_clusters: DEFAULT_NUM_CLUSTERS,
            block_size: DEFAULT_BLOCK_SIZE,
            root: PathBuf::from(DEFAULT_ROOT),
            overwrite: false,
            nprobe: DEFAULT_NPROBE,
            num_codebooks: DEFAULT_NUM_CODEBOOKS,
            codebook_size: MAX_CODEBOOK_SIZE,
            kmeans_iterations: DEFAULT_KMEANS_ITERATIONS,
            seed: None,
            trained_index_name: "trained_index.idx".to_string(),
            index_name: "index.idx".to_string(),
            block_dir: "block".to_string(),
        }
    }
}

impl IndexConfig {
    /// Config for `dimension` with every other field at its default.
    ///
    /// `num_codebooks` is lowered to the largest divisor of `dimension` not
    /// above the default so the result always validates.
    pub fn new(dimension: usize) -> Self {
        let num_codebooks = (1..=DEFAULT_NUM_CODEBOOKS.min(dimension.max(1)))
            .rev()
            .find(|m| dimension % m == 0)
            .unwrap_or(1);
        Self {
            dimension,
            num_codebooks,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    #[must_use]
    pub fn with_num_clusters(mut self, num_clusters: usize) -> Self {
        self.num_clusters = num_clusters;
        self
    }

    #[must_use]
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    #[must_use]
    pub fn with_nprobe(mut self, nprobe: usize) -> Self {
        self.nprobe = nprobe;
        self
    }

    #[must_use]
    pub fn with_pq(mut self, num_codebooks: usize, codebook_size: usize) -> Self {
        self.num_codebooks = num_codebooks;
        self.codebook_size = codebook_size;
        self
    }

    #[must_use]
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Configure a deterministic training seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Load a config from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read(path).map_err(PersistenceError::Io)?;
        let config: Self = serde_json::from_slice(&raw).map_err(|e| {
            PersistenceError::Deserialization(format!("config {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check parameter ranges and cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("dimension", self.dimension),
            ("num_clusters", self.num_clusters),
            ("block_size", self.block_size),
            ("nprobe", self.nprobe),
            ("num_codebooks", self.num_codebooks),
            ("codebook_size", self.codebook_size),
            ("kmeans_iterations", self.kmeans_iterations),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(IndexError::InvalidParameter(format!(
                    "{name} must be greater than 0"
                )));
            }
        }
        if self.dimension % self.num_codebooks != 0 {
            return Err(IndexError::InvalidParameter(format!(
                "dimension {} is not divisible by num_codebooks {}",
                self.dimension, self.num_codebooks
            )));
        }
        if self.codebook_size > MAX_CODEBOOK_SIZE {
            return Err(IndexError::InvalidParameter(format!(
                "codebook_size {} exceeds {MAX_CODEBOOK_SIZE}",
                self.codebook_size
            )));
        }
        for (name, value) in [
            ("trained_index_name", &self.trained_index_name),
            ("index_name", &self.index_name),
            ("block_dir", &self.block_dir),
        ] {
            if value.is_empty() {
                return Err(IndexError::InvalidParameter(format!(
                    "{name} must not be empty"
                )));
            }
        }
        if self.trained_index_name == self.index_name {
            return Err(IndexError::InvalidParameter(
                "trained_index_name and index_name must differ".to_string(),
            ));
        }
        Ok(())
    }

    /// Relative paths of the index files under `root`.
    pub fn layout(&self) -> StorageLayout {
        StorageLayout::new(
            self.trained_index_name.clone(),
            self.index_name.clone(),
            self.block_dir.clone(),
        )
    }
}
