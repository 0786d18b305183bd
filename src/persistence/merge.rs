//! Shard merger: folds every shard into the trained index.

use crate::ann::AnnEngine;
use crate::error::{IndexError, Result};
use crate::persistence::directory::Directory;
use crate::persistence::format::{self, FileKind};
use crate::persistence::layout::StorageLayout;
use std::sync::Arc;

/// Merges shards `0..shard_count` into a fresh copy of the trained index.
pub struct ShardMerger {
    directory: Arc<dyn Directory>,
    layout: StorageLayout,
}

impl ShardMerger {
    pub fn new(directory: Arc<dyn Directory>, layout: StorageLayout) -> Self {
        Self { directory, layout }
    }

    /// Load the trained index and merge every shard into it in ascending
    /// order, preserving identifiers.
    ///
    /// The total is summed from the shard headers in the same pass and set on
    /// the result as authoritative.
    pub fn merge<E: AnnEngine>(&self, shard_count: u64) -> Result<E> {
        let directory = self.directory.as_ref();
        let (_, mut target): (_, E) =
            format::read_index(directory, self.layout.trained(), FileKind::Trained)?;

        let mut total = 0usize;
        for shard in 0..shard_count {
            let path = self.layout.shard_path(shard);
            if !directory.exists(&path) {
                return Err(IndexError::MissingShard { shard, path });
            }
            let (header, engine): (_, E) = format::read_index(directory, &path, FileKind::Shard)?;
            if header.shard_number != Some(shard) {
                tracing::warn!(
                    shard,
                    recorded = ?header.shard_number,
                    "shard header disagrees with its file name"
                );
            }

            total += header.vector_count;
            target.merge_from(engine)?;
            tracing::debug!(shard, vectors = header.vector_count, "merged shard");
        }

        if target.ntotal() != total {
            tracing::warn!(
                engine = target.ntotal(),
                shards = total,
                "merged count disagrees with shard headers; using shard total"
            );
        }
        target.set_ntotal(total);
        Ok(target)
    }
}
