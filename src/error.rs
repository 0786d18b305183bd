//! Error types for shardann.

use crate::index::SessionState;
use crate::persistence::PersistenceError;
use thiserror::Error;

/// Errors that can occur during training, building, or searching.
///
/// None of these are retried internally. A persistence failure in the middle
/// of a build leaves identifier and shard counters out of step with storage,
/// so the session is aborted; discard the storage root and rebuild.
#[derive(Debug, Error)]
pub enum IndexError {
    /// A vector's length differs from the index dimension.
    #[error("dimension mismatch: index has {expected} dimensions, vector has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Insert or flush attempted before the quantizer was trained.
    #[error("index is not trained; call train() before adding vectors")]
    UntrainedState,

    /// Reading or writing a trained, shard, or merged index file failed.
    #[error("persistence failure: {0}")]
    PersistenceFailure(#[from] PersistenceError),

    /// The merge expected a shard file that is not in storage.
    #[error("missing shard {shard} at {path}")]
    MissingShard { shard: u64, path: String },

    /// Search attempted before the index was finalized or loaded.
    #[error("index is not searchable in state {state}")]
    NotSearchable { state: SessionState },

    /// Invalid parameter value.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Operation not allowed in the current session state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// An index file exists and overwriting is disabled.
    #[error("index already exists at {0} and overwrite is disabled")]
    IndexExists(String),

    /// A shard was not built from the same trained index as the merge target.
    #[error("incompatible shard: {0}")]
    IncompatibleShard(String),
}

impl IndexError {
    pub(crate) fn dimension(expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch { expected, actual }
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;
