//! Relative paths of the files a build session writes.
//!
//! ```text
//! <root>/
//! ├── trained_index.idx      trained, empty index
//! ├── block/
//! │   ├── shard_0.idx        one shard per flushed block
//! │   └── shard_1.idx
//! └── index.idx              merged, searchable index
//! ```

/// File names under a storage root. All names are configurable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    trained: String,
    merged: String,
    block_dir: String,
}

impl StorageLayout {
    pub fn new(
        trained: impl Into<String>,
        merged: impl Into<String>,
        block_dir: impl Into<String>,
    ) -> Self {
        Self {
            trained: trained.into(),
            merged: merged.into(),
            block_dir: block_dir.into(),
        }
    }

    /// Path of the trained, empty index.
    pub fn trained(&self) -> &str {
        &self.trained
    }

    /// Path of the merged index.
    pub fn merged(&self) -> &str {
        &self.merged
    }

    /// Directory holding the shards.
    pub fn block_dir(&self) -> &str {
        &self.block_dir
    }

    /// Path of shard `n`.
    pub fn shard_path(&self, n: u64) -> String {
        format!("{}/shard_{n}.idx", self.block_dir)
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self::new("trained_index.idx", "index.idx", "block")
    }
}
