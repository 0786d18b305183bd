//! Disk persistence for block-journaled indexes.
//!
//! A build session writes three kinds of files through a [`Directory`]:
//! the trained empty index, one shard per flushed block, and the merged
//! index. All share the checksummed [`format`] and are replaced atomically.
//!
//! - [`ShardWriter`] turns blocks into shards.
//! - [`ShardMerger`] folds shards into the trained index.
//! - [`StorageLayout`] names the files.

pub mod directory;
pub mod error;
pub mod format;
pub mod layout;
pub mod merge;
pub mod shard;

pub use directory::{Directory, FsDirectory, MemoryDirectory};
pub use error::{PersistenceError, PersistenceResult};
pub use format::{FileHeader, FileKind};
pub use layout::StorageLayout;
pub use merge::ShardMerger;
pub use shard::ShardWriter;
