//! Block-journaled index session.
//!
//! [`BlockIndex`] drives one build through its states:
//!
//! ```text
//! Uninitialized ──train──► Trained ──add──► Building ──save──► Finalized
//!       │                     └──────────save──────────────┘       │
//!       └────────────load──────────────► Loaded ◄──────load────────┘
//!
//! Building ──flush failure──► Aborted
//! ```
//!
//! Vectors are accepted into an in-memory block and get dense identifiers
//! starting at 0. Every full block becomes a shard on disk; `save()` flushes
//! the last partial block, merges all shards into the trained index, and
//! makes the result searchable.

use crate::ann::{AnnEngine, EngineStats};
use crate::config::IndexConfig;
use crate::error::{IndexError, Result};
use crate::ivf_pq::IVFPQIndex;
use crate::persistence::format::{self, FileHeader, FileKind};
use crate::persistence::{Directory, FsDirectory, ShardMerger, ShardWriter, StorageLayout};
use crate::streaming::{BlockBuffer, BlockStatus};
use crate::VectorId;
use std::fmt;
use std::sync::Arc;

/// Lifecycle state of a [`BlockIndex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing trained or loaded yet.
    Uninitialized,
    /// Trained index persisted; no vectors accepted yet.
    Trained,
    /// Accepting vectors.
    Building,
    /// Shards merged; searchable.
    Finalized,
    /// Merged index read from storage; searchable.
    Loaded,
    /// A flush or merge failed; storage no longer matches the counters.
    Aborted,
}

impl SessionState {
    pub fn is_searchable(self) -> bool {
        matches!(self, SessionState::Finalized | SessionState::Loaded)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Trained => "trained",
            SessionState::Building => "building",
            SessionState::Finalized => "finalized",
            SessionState::Loaded => "loaded",
            SessionState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Search results, one row per query, nearest first.
///
/// Rows hold `min(k, reachable)` entries; there is no sentinel padding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Neighbors {
    pub distances: Vec<Vec<f32>>,
    pub ids: Vec<Vec<VectorId>>,
}

impl Neighbors {
    /// Number of query rows.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// `(ids, distances)` of query `row`.
    pub fn row(&self, row: usize) -> Option<(&[VectorId], &[f32])> {
        Some((self.ids.get(row)?.as_slice(), self.distances.get(row)?.as_slice()))
    }
}

/// Snapshot of a session's counters.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexStats {
    pub state: SessionState,
    pub next_id: VectorId,
    pub shard_count: u64,
    pub buffered: usize,
    /// Statistics of the searchable index, once finalized or loaded.
    pub engine: Option<EngineStats>,
}

/// A block-journaled vector index.
///
/// # Example
///
/// ```rust
/// use shardann::{BlockIndex, IndexConfig, SessionState};
///
/// let root = tempfile::tempdir()?;
/// let config = IndexConfig::new(4)
///     .with_root(root.path())
///     .with_num_clusters(2)
///     .with_pq(2, 16)
///     .with_block_size(2)
///     .with_seed(3);
///
/// let sample: Vec<Vec<f32>> = (0..8).map(|i| vec![i as f32; 4]).collect();
/// let mut index: BlockIndex = BlockIndex::new(config)?;
/// index.train(&sample)?;
/// let ids = index.add(&sample[..3])?;
/// assert_eq!(ids, vec![0, 1, 2]);
/// index.save()?;
/// assert_eq!(index.state(), SessionState::Finalized);
///
/// let neighbors = index.search(&sample[..1], 1)?;
/// assert_eq!(neighbors.ids[0], vec![0]);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct BlockIndex<E: AnnEngine = IVFPQIndex> {
    config: IndexConfig,
    layout: StorageLayout,
    directory: Arc<dyn Directory>,
    state: SessionState,
    buffer: BlockBuffer,
    writer: ShardWriter,
    searchable: Option<E>,
}

impl<E: AnnEngine> BlockIndex<E> {
    /// Session rooted at `config.root` on the filesystem.
    pub fn new(config: IndexConfig) -> Result<Self> {
        let directory = Arc::new(FsDirectory::new(config.root.clone()));
        Self::with_directory(config, directory)
    }

    /// Session over an arbitrary storage backend.
    pub fn with_directory(config: IndexConfig, directory: Arc<dyn Directory>) -> Result<Self> {
        config.validate()?;
        let layout = config.layout();
        Ok(Self {
            buffer: BlockBuffer::new(config.dimension, config.block_size)?,
            writer: ShardWriter::new(directory.clone(), layout.clone()),
            config,
            layout,
            directory,
            state: SessionState::Uninitialized,
            searchable: None,
        })
    }

    /// Train the quantizer on `samples` and persist the trained, empty index.
    pub fn train(&mut self, samples: &[Vec<f32>]) -> Result<()> {
        if self.state != SessionState::Uninitialized {
            return Err(IndexError::InvalidState(format!(
                "cannot train in state {}",
                self.state
            )));
        }
        if samples.is_empty() {
            return Err(IndexError::InvalidParameter(
                "training sample is empty".to_string(),
            ));
        }
        for sample in samples {
            self.buffer.check_dimension(sample)?;
        }

        let trained_path = self.layout.trained();
        if self.config.overwrite {
            // Shards of a previous build would be merged into this one.
            self.directory.remove_dir_all(self.layout.block_dir())?;
        } else {
            for path in [trained_path, self.layout.merged()] {
                if self.directory.exists(path) {
                    return Err(IndexError::IndexExists(self.display_path(path)));
                }
            }
        }

        let flat: Vec<f32> = samples.iter().flatten().copied().collect();
        let mut engine = E::from_config(&self.config)?;
        engine.train(&flat, samples.len())?;

        let bytes = format::write_index(
            self.directory.as_ref(),
            trained_path,
            &FileHeader::trained(self.config.dimension),
            &engine,
        )?;
        self.state = SessionState::Trained;

        tracing::info!(
            algorithm = E::ALGORITHM,
            samples = samples.len(),
            dimension = self.config.dimension,
            bytes,
            "trained index"
        );
        Ok(())
    }

    /// Accept `vectors`, returning their identifiers in input order.
    ///
    /// The whole batch is validated first: one malformed vector rejects
    /// every vector in it and no identifier is consumed.
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<Vec<VectorId>> {
        let rows: Vec<&[f32]> = vectors.iter().map(Vec::as_slice).collect();
        self.accept(&rows)
    }

    /// Accept one vector.
    pub fn add_one(&mut self, vector: &[f32]) -> Result<VectorId> {
        let ids = self.accept(&[vector])?;
        ids.into_iter()
            .next()
            .ok_or_else(|| IndexError::InvalidState("no identifier assigned".to_string()))
    }

    fn accept(&mut self, rows: &[&[f32]]) -> Result<Vec<VectorId>> {
        match self.state {
            SessionState::Trained | SessionState::Building => {}
            SessionState::Uninitialized => return Err(IndexError::UntrainedState),
            state => {
                return Err(IndexError::InvalidState(format!(
                    "cannot add vectors in state {state}"
                )))
            }
        }
        for row in rows {
            self.buffer.check_dimension(row)?;
        }
        self.state = SessionState::Building;

        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            let (id, status) = self.buffer.push(row)?;
            ids.push(id);
            if status == BlockStatus::Full {
                self.flush()?;
            }
        }
        Ok(ids)
    }

    /// Write the buffered block as the next shard. Any failure aborts the
    /// session.
    fn flush(&mut self) -> Result<()> {
        let block = self.buffer.take();
        self.writer.flush::<E>(block).map(|_| ()).map_err(|e| self.abort(e))
    }

    fn abort(&mut self, error: IndexError) -> IndexError {
        tracing::error!(
            %error,
            next_id = self.buffer.next_id(),
            shards = self.writer.shard_count(),
            "aborting build session"
        );
        self.state = SessionState::Aborted;
        error
    }

    /// Flush the last block, merge every shard, persist the merged index and
    /// keep it in memory for search.
    pub fn save(&mut self) -> Result<()> {
        match self.state {
            SessionState::Trained | SessionState::Building => {}
            SessionState::Uninitialized => return Err(IndexError::UntrainedState),
            state => {
                return Err(IndexError::InvalidState(format!(
                    "cannot save in state {state}"
                )))
            }
        }

        let merged_path = self.layout.merged().to_string();
        if !self.config.overwrite && self.directory.exists(&merged_path) {
            return Err(IndexError::IndexExists(self.display_path(&merged_path)));
        }

        self.flush()?;

        let shard_count = self.writer.shard_count();
        let merged: E = ShardMerger::new(self.directory.clone(), self.layout.clone())
            .merge(shard_count)
            .map_err(|e| self.abort(e))?;

        let header = FileHeader::merged(merged.dimension(), merged.ntotal());
        let bytes = format::write_index(self.directory.as_ref(), &merged_path, &header, &merged)
            .map_err(|e| self.abort(e.into()))?;

        tracing::info!(
            shards = shard_count,
            vectors = merged.ntotal(),
            bytes,
            "saved merged index"
        );
        self.searchable = Some(merged);
        self.state = SessionState::Finalized;
        Ok(())
    }

    /// Read the merged index from storage and make it searchable.
    pub fn load(&mut self) -> Result<()> {
        if !matches!(
            self.state,
            SessionState::Uninitialized | SessionState::Finalized
        ) {
            return Err(IndexError::InvalidState(format!(
                "cannot load in state {}",
                self.state
            )));
        }

        let path = self.layout.merged();
        let (header, mut engine): (_, E) =
            format::read_index(self.directory.as_ref(), path, FileKind::Merged)?;
        if engine.dimension() != self.config.dimension {
            return Err(IndexError::dimension(
                self.config.dimension,
                engine.dimension(),
            ));
        }
        if engine.ntotal() != header.vector_count {
            tracing::warn!(
                engine = engine.ntotal(),
                header = header.vector_count,
                "stored count disagrees with file header; using header"
            );
            engine.set_ntotal(header.vector_count);
        }
        engine.configure_search(&self.config);

        tracing::info!(
            path = %self.display_path(path),
            vectors = engine.ntotal(),
            "loaded index"
        );
        self.searchable = Some(engine);
        self.state = SessionState::Loaded;
        Ok(())
    }

    /// The `k` nearest stored vectors to each query.
    pub fn search(&self, queries: &[Vec<f32>], k: usize) -> Result<Neighbors> {
        let engine = match &self.searchable {
            Some(engine) if self.state.is_searchable() => engine,
            _ => return Err(IndexError::NotSearchable { state: self.state }),
        };
        for query in queries {
            if query.len() != self.config.dimension {
                return Err(IndexError::dimension(self.config.dimension, query.len()));
            }
        }

        let mut neighbors = Neighbors {
            distances: Vec::with_capacity(queries.len()),
            ids: Vec::with_capacity(queries.len()),
        };
        for query in queries {
            let (ids, distances): (Vec<VectorId>, Vec<f32>) =
                engine.search(query, k)?.into_iter().unzip();
            neighbors.ids.push(ids);
            neighbors.distances.push(distances);
        }
        Ok(neighbors)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Identifier the next accepted vector will get.
    pub fn next_id(&self) -> VectorId {
        self.buffer.next_id()
    }

    /// Shards written by this session.
    pub fn shard_count(&self) -> u64 {
        self.writer.shard_count()
    }

    /// Vectors accepted but not yet flushed.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Vector count of the searchable index, 0 before save or load.
    pub fn ntotal(&self) -> usize {
        self.searchable.as_ref().map_or(0, AnnEngine::ntotal)
    }

    /// The searchable engine, once finalized or loaded.
    pub fn engine(&self) -> Option<&E> {
        self.searchable.as_ref()
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            state: self.state,
            next_id: self.next_id(),
            shard_count: self.shard_count(),
            buffered: self.buffered(),
            engine: self.searchable.as_ref().map(AnnEngine::stats),
        }
    }

    fn display_path(&self, path: &str) -> String {
        self.directory
            .file_path(path)
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| path.to_string())
    }
}

impl<E: AnnEngine> fmt::Debug for BlockIndex<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockIndex")
            .field("algorithm", &E::ALGORITHM)
            .field("state", &self.state)
            .field("dimension", &self.config.dimension)
            .field("next_id", &self.next_id())
            .field("shard_count", &self.shard_count())
            .field("buffered", &self.buffered())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ann::FlatIndex;
    use crate::persistence::{MemoryDirectory, PersistenceError, PersistenceResult};
    use std::io::Read;
    use std::path::PathBuf;

    fn config(dim: usize, block_size: usize) -> IndexConfig {
        IndexConfig::new(dim)
            .with_block_size(block_size)
            .with_num_clusters(2)
            .with_pq(1, 16)
            .with_seed(11)
    }

    fn flat(dim: usize, block_size: usize) -> (MemoryDirectory, BlockIndex<FlatIndex>) {
        let dir = MemoryDirectory::new();
        let index = BlockIndex::with_directory(config(dim, block_size), Arc::new(dir.clone()))
            .unwrap();
        (dir, index)
    }

    fn vectors(n: usize, dim: usize) -> Vec<Vec<f32>> {
        (0..n)
            .map(|i| (0..dim).map(|j| (i * dim + j) as f32).collect())
            .collect()
    }

    #[test]
    fn state_machine_happy_path() {
        let (dir, mut index) = flat(2, 2);
        assert_eq!(index.state(), SessionState::Uninitialized);

        index.train(&vectors(4, 2)).unwrap();
        assert_eq!(index.state(), SessionState::Trained);
        assert!(dir.exists("trained_index.idx"));

        let ids = index.add(&vectors(5, 2)).unwrap();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
        assert_eq!(index.state(), SessionState::Building);
        assert_eq!(index.shard_count(), 2);
        assert_eq!(index.buffered(), 1);

        index.save().unwrap();
        assert_eq!(index.state(), SessionState::Finalized);
        assert_eq!(index.shard_count(), 3);
        assert_eq!(index.ntotal(), 5);
        assert!(dir.exists("index.idx"));

        index.load().unwrap();
        assert_eq!(index.state(), SessionState::Loaded);
        assert_eq!(index.ntotal(), 5);
    }

    #[test]
    fn add_before_train_is_untrained() {
        let (_, mut index) = flat(2, 2);
        assert!(matches!(
            index.add(&vectors(1, 2)),
            Err(IndexError::UntrainedState)
        ));
        assert!(matches!(index.save(), Err(IndexError::UntrainedState)));
    }

    #[test]
    fn search_requires_finalized_or_loaded() {
        let (_, mut index) = flat(2, 2);
        index.train(&vectors(2, 2)).unwrap();
        index.add(&vectors(1, 2)).unwrap();
        assert!(matches!(
            index.search(&vectors(1, 2), 1),
            Err(IndexError::NotSearchable {
                state: SessionState::Building
            })
        ));
    }

    #[test]
    fn bad_batch_is_rejected_whole() {
        let (_, mut index) = flat(3, 4);
        index.train(&vectors(2, 3)).unwrap();
        let batch = vec![vec![1.0, 2.0, 3.0], vec![1.0, 2.0]];
        assert!(matches!(
            index.add(&batch),
            Err(IndexError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        ));
        assert_eq!(index.next_id(), 0);
        assert_eq!(index.buffered(), 0);
        assert_eq!(index.add_one(&[0.0, 0.0, 0.0]).unwrap(), 0);
    }

    #[test]
    fn save_right_after_train_is_empty() {
        let (dir, mut index) = flat(2, 2);
        index.train(&vectors(3, 2)).unwrap();
        index.save().unwrap();
        assert_eq!(index.ntotal(), 0);
        assert!(dir.list_dir("block").unwrap().is_empty());

        let neighbors = index.search(&vectors(2, 2), 3).unwrap();
        assert_eq!(neighbors.len(), 2);
        assert!(neighbors.ids.iter().all(Vec::is_empty));
    }

    #[test]
    fn training_twice_and_adding_after_save_are_invalid() {
        let (_, mut index) = flat(2, 2);
        index.train(&vectors(2, 2)).unwrap();
        assert!(matches!(
            index.train(&vectors(2, 2)),
            Err(IndexError::InvalidState(_))
        ));
        index.save().unwrap();
        assert!(matches!(
            index.add(&vectors(1, 2)),
            Err(IndexError::InvalidState(_))
        ));
        assert!(matches!(index.save(), Err(IndexError::InvalidState(_))));
    }

    #[test]
    fn k_zero_and_short_rows() {
        let (_, mut index) = flat(1, 10);
        index.train(&vectors(1, 1)).unwrap();
        index.add(&[vec![1.0], vec![5.0], vec![2.0]]).unwrap();
        index.save().unwrap();

        let none = index.search(&[vec![0.0]], 0).unwrap();
        assert_eq!(none.ids, vec![Vec::<VectorId>::new()]);

        let all = index.search(&[vec![0.0]], 10).unwrap();
        assert_eq!(all.ids[0], vec![0, 2, 1]);
        assert_eq!(all.distances[0], vec![1.0, 4.0, 25.0]);
        assert!(matches!(
            index.search(&[vec![0.0, 1.0]], 1),
            Err(IndexError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn overwrite_false_refuses_existing_files() {
        let (dir, mut first) = flat(2, 2);
        first.train(&vectors(2, 2)).unwrap();
        first.add(&vectors(3, 2)).unwrap();
        first.save().unwrap();
        let before = dir.read_file("index.idx").unwrap();

        let mut second: BlockIndex<FlatIndex> =
            BlockIndex::with_directory(config(2, 2), Arc::new(dir.clone())).unwrap();
        assert!(matches!(
            second.train(&vectors(2, 2)),
            Err(IndexError::IndexExists(_))
        ));
        assert_eq!(dir.read_file("index.idx").unwrap(), before);
        assert_eq!(dir.list_dir("block").unwrap().len(), 2);
    }

    #[test]
    fn leftover_merged_index_is_refused_before_any_shard() {
        let (dir, mut index) = flat(2, 1);
        dir.put("index.idx", b"stale".to_vec()).unwrap();

        assert!(matches!(
            index.train(&vectors(2, 2)),
            Err(IndexError::IndexExists(_))
        ));
        assert_eq!(index.state(), SessionState::Uninitialized);
        assert!(!dir.exists("trained_index.idx"));
        assert!(!dir.exists("block"));
    }

    #[test]
    fn overwrite_true_clears_stale_shards() {
        let (dir, mut first) = flat(2, 2);
        first.train(&vectors(2, 2)).unwrap();
        first.add(&vectors(6, 2)).unwrap();
        first.save().unwrap();
        assert_eq!(dir.list_dir("block").unwrap().len(), 3);

        let mut second: BlockIndex<FlatIndex> = BlockIndex::with_directory(
            config(2, 2).with_overwrite(true),
            Arc::new(dir.clone()),
        )
        .unwrap();
        second.train(&vectors(2, 2)).unwrap();
        second.add(&vectors(1, 2)).unwrap();
        second.save().unwrap();
        assert_eq!(second.ntotal(), 1);
        assert_eq!(dir.list_dir("block").unwrap(), vec!["shard_0.idx".to_string()]);
    }

    /// Memory directory that refuses to write shards.
    #[derive(Clone, Default)]
    struct ShardlessDirectory(MemoryDirectory);

    impl Directory for ShardlessDirectory {
        fn open_file(&self, path: &str) -> PersistenceResult<Box<dyn Read>> {
            self.0.open_file(path)
        }
        fn exists(&self, path: &str) -> bool {
            self.0.exists(path)
        }
        fn delete(&self, path: &str) -> PersistenceResult<()> {
            self.0.delete(path)
        }
        fn create_dir_all(&self, path: &str) -> PersistenceResult<()> {
            self.0.create_dir_all(path)
        }
        fn remove_dir_all(&self, path: &str) -> PersistenceResult<()> {
            self.0.remove_dir_all(path)
        }
        fn list_dir(&self, path: &str) -> PersistenceResult<Vec<String>> {
            self.0.list_dir(path)
        }
        fn atomic_write(&self, path: &str, data: &[u8]) -> PersistenceResult<()> {
            if path.starts_with("block/") {
                return Err(PersistenceError::Io(std::io::Error::other("disk full")));
            }
            self.0.atomic_write(path, data)
        }
        fn file_path(&self, _path: &str) -> Option<PathBuf> {
            None
        }
    }

    #[test]
    fn flush_failure_aborts_the_session() {
        let mut index: BlockIndex<FlatIndex> = BlockIndex::with_directory(
            config(1, 2),
            Arc::new(ShardlessDirectory::default()),
        )
        .unwrap();
        index.train(&vectors(2, 1)).unwrap();
        index.add(&vectors(1, 1)).unwrap();

        let err = index.add(&vectors(1, 1)).unwrap_err();
        assert!(matches!(err, IndexError::PersistenceFailure(_)));
        assert_eq!(index.state(), SessionState::Aborted);
        assert_eq!(index.shard_count(), 0);

        assert!(matches!(
            index.add(&vectors(1, 1)),
            Err(IndexError::InvalidState(_))
        ));
        assert!(matches!(index.save(), Err(IndexError::InvalidState(_))));
        assert!(matches!(
            index.search(&vectors(1, 1), 1),
            Err(IndexError::NotSearchable {
                state: SessionState::Aborted
            })
        ));
    }

    #[test]
    fn stats_track_counters() {
        let (_, mut index) = flat(2, 3);
        index.train(&vectors(2, 2)).unwrap();
        index.add(&vectors(4, 2)).unwrap();
        let stats = index.stats();
        assert_eq!(stats.next_id, 4);
        assert_eq!(stats.shard_count, 1);
        assert_eq!(stats.buffered, 1);
        assert!(stats.engine.is_none());

        index.save().unwrap();
        let engine = index.stats().engine.unwrap();
        assert_eq!(engine.num_vectors, 4);
        assert_eq!(engine.algorithm, "Flat");
    }
}
