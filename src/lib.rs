//! shardann: a block-journaled IVF-PQ vector index.
//!
//! Vectors stream in, get dense sequential identifiers, and are persisted in
//! fixed-size blocks, each written as an independent index shard. Saving
//! merges every shard into one searchable index.
//!
//! ```text
//! sample ──train──► trained_index.idx (empty)
//!                         │ reload per block
//! vectors ──add──► block ─┴─► block/shard_0.idx, shard_1.idx, ...
//!                                      │ save: merge in order
//!                                      ▼
//!                                  index.idx ──► search
//! ```
//!
//! - [`ivf_pq`]: coarse k-means lists plus product-quantized residuals.
//! - [`streaming`]: identifier assignment and block accumulation.
//! - [`persistence`]: storage backends, file format, shard writer and merger.
//! - [`index`]: the [`BlockIndex`] session state machine.
//!
//! # Critical Nuances
//!
//! ## Training sample size
//!
//! k-means needs roughly 39 points per centroid to place centroids well, and
//! PQ needs at least `codebook_size` residuals per subspace. Smaller samples
//! are accepted: the effective number of centroids shrinks to the number of
//! distinct sample points and a warning is logged.
//!
//! ## Distances
//!
//! All distances are squared L2. IVF-PQ distances are ADC estimates, exact
//! only when a stored residual coincides with its codewords.
//!
//! ## One writer per root
//!
//! Shard numbering lives in the session, not on disk. Two sessions writing
//! under one storage root corrupt each other's shards.

pub mod ann;
pub mod config;
pub mod distance;
pub mod error;
pub mod index;
pub mod ivf_pq;
pub mod partitioning;
pub mod persistence;
pub mod simd;
pub mod streaming;

/// Identifier of a stored vector, dense from 0 within one build session.
pub type VectorId = u64;

// Re-exports
pub use ann::{AnnEngine, EngineStats, FlatIndex};
pub use config::IndexConfig;
pub use error::{IndexError, Result};
pub use index::{BlockIndex, IndexStats, Neighbors, SessionState};
pub use ivf_pq::{IVFPQIndex, IVFPQParams};
pub use persistence::{Directory, FsDirectory, MemoryDirectory, PersistenceError};
