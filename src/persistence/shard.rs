//! Shard writer: turns a full (or final partial) block into a shard file.

use crate::ann::AnnEngine;
use crate::error::Result;
use crate::persistence::directory::Directory;
use crate::persistence::format::{self, FileHeader, FileKind};
use crate::persistence::layout::StorageLayout;
use crate::streaming::Block;
use std::sync::Arc;

/// Writes blocks as numbered shards under the block directory.
///
/// Each shard is the trained, empty index reloaded from storage with one
/// block inserted under its assigned identifiers. The shard counter only
/// advances after a successful write.
pub struct ShardWriter {
    directory: Arc<dyn Directory>,
    layout: StorageLayout,
    next_shard: u64,
}

impl ShardWriter {
    pub fn new(directory: Arc<dyn Directory>, layout: StorageLayout) -> Self {
        Self {
            directory,
            layout,
            next_shard: 0,
        }
    }

    /// Number of shards written so far.
    pub fn shard_count(&self) -> u64 {
        self.next_shard
    }

    /// Persist `block` as the next shard.
    ///
    /// Returns the shard path, or `None` for an empty block. The block
    /// directory is created either way.
    pub fn flush<E: AnnEngine>(&mut self, block: Block) -> Result<Option<String>> {
        self.directory.create_dir_all(self.layout.block_dir())?;
        if block.is_empty() {
            return Ok(None);
        }

        let (_, mut engine): (_, E) =
            format::read_index(self.directory.as_ref(), self.layout.trained(), FileKind::Trained)?;
        engine.add_with_ids(&block.vectors, &block.ids)?;

        let shard = self.next_shard;
        let path = self.layout.shard_path(shard);
        let header = FileHeader::shard(engine.dimension(), engine.ntotal(), shard);
        let bytes = format::write_index(self.directory.as_ref(), &path, &header, &engine)?;
        self.next_shard += 1;

        tracing::debug!(
            shard,
            vectors = block.len(),
            first_id = block.ids.first().copied(),
            bytes,
            "flushed block"
        );
        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ann::FlatIndex;
    use crate::persistence::directory::MemoryDirectory;
    use crate::streaming::BlockBuffer;

    fn setup(dim: usize) -> (Arc<MemoryDirectory>, ShardWriter) {
        let dir = Arc::new(MemoryDirectory::new());
        let layout = StorageLayout::default();
        let mut engine = FlatIndex::new(dim).unwrap();
        engine.train(&[], 0).unwrap();
        format::write_index(
            &*dir,
            layout.trained(),
            &FileHeader::trained(dim),
            &engine,
        )
        .unwrap();
        let writer = ShardWriter::new(dir.clone(), layout);
        (dir, writer)
    }

    #[test]
    fn empty_block_writes_nothing_but_creates_dir() {
        let (dir, mut writer) = setup(2);
        assert_eq!(writer.flush::<FlatIndex>(Block::default()).unwrap(), None);
        assert_eq!(writer.shard_count(), 0);
        assert!(dir.exists("block"));
        assert!(dir.list_dir("block").unwrap().is_empty());
    }

    #[test]
    fn shards_hold_their_block_under_assigned_ids() {
        let (dir, mut writer) = setup(2);
        let mut buffer = BlockBuffer::new(2, 2).unwrap();
        for i in 0..3 {
            buffer.push(&[i as f32, 1.0]).unwrap();
            if buffer.len() == 2 {
                writer.flush::<FlatIndex>(buffer.take()).unwrap();
            }
        }
        let last = writer.flush::<FlatIndex>(buffer.take()).unwrap();
        assert_eq!(last.as_deref(), Some("block/shard_1.idx"));
        assert_eq!(writer.shard_count(), 2);

        let (header, shard): (_, FlatIndex) =
            format::read_index(&*dir, "block/shard_1.idx", FileKind::Shard).unwrap();
        assert_eq!(header.shard_number, Some(1));
        assert_eq!(header.vector_count, 1);
        assert_eq!(shard.ids(), &[2]);
        assert_eq!(shard.vector(2), Some(&[2.0, 1.0][..]));
    }

    #[test]
    fn missing_trained_index_fails_without_advancing() {
        let dir = Arc::new(MemoryDirectory::new());
        let mut writer = ShardWriter::new(dir, StorageLayout::default());
        let mut buffer = BlockBuffer::new(1, 4).unwrap();
        buffer.push(&[1.0]).unwrap();
        assert!(writer.flush::<FlatIndex>(buffer.take()).is_err());
        assert_eq!(writer.shard_count(), 0);
    }
}
