//! The engine capability behind a block-journaled index.

use crate::config::IndexConfig;
use crate::error::Result;
use crate::VectorId;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// An approximate-index engine that can be trained, filled under explicit
/// identifiers, folded together, persisted, and searched.
///
/// The session layer never looks inside an engine: it trains one, persists
/// it empty, reloads copies to build shards, and merges the shards back into
/// a fresh copy. Any engine satisfying these operations can sit behind
/// [`BlockIndex`](crate::BlockIndex).
pub trait AnnEngine: Serialize + DeserializeOwned + Sized {
    /// Short algorithm name used in logs and stats.
    const ALGORITHM: &'static str;

    /// Build an untrained, empty engine from a session config.
    fn from_config(config: &IndexConfig) -> Result<Self>;

    /// Vector dimension.
    fn dimension(&self) -> usize;

    /// Whether the engine can accept inserts.
    fn is_trained(&self) -> bool;

    /// Learn the engine's internal structure from a row-major sample of
    /// `num_vectors` vectors. Leaves the engine empty.
    fn train(&mut self, vectors: &[f32], num_vectors: usize) -> Result<()>;

    /// Insert row-major `vectors` under the caller's `ids` (one id per row).
    fn add_with_ids(&mut self, vectors: &[f32], ids: &[VectorId]) -> Result<()>;

    /// Move every entry of `other` into `self`, keeping identifiers.
    ///
    /// Both engines must come from the same trained state.
    fn merge_from(&mut self, other: Self) -> Result<()>;

    /// Number of stored vectors.
    fn ntotal(&self) -> usize;

    /// Overwrite the stored-vector count.
    ///
    /// Used by the merger, which owns the authoritative total.
    fn set_ntotal(&mut self, ntotal: usize);

    /// The `k` nearest stored vectors to `query` as `(id, distance)`,
    /// nearest first.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(VectorId, f32)>>;

    /// Apply the session's query-time knobs to a loaded engine.
    ///
    /// Build-time structure is fixed by the stored file; only parameters
    /// that are safe to change after training are read from `config`.
    fn configure_search(&mut self, _config: &IndexConfig) {}

    /// Approximate in-memory size in bytes.
    fn size_bytes(&self) -> usize;

    /// Index statistics.
    fn stats(&self) -> EngineStats {
        EngineStats {
            num_vectors: self.ntotal(),
            dimension: self.dimension(),
            size_bytes: self.size_bytes(),
            algorithm: Self::ALGORITHM.to_string(),
            trained: self.is_trained(),
        }
    }
}

/// Statistics about an engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStats {
    pub num_vectors: usize,
    pub dimension: usize,
    pub size_bytes: usize,
    pub algorithm: String,
    pub trained: bool,
}
