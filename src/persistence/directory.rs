//! Storage backends for index files.
//!
//! Every persistence module goes through the [`Directory`] trait with paths
//! relative to a storage root (`"trained_index.idx"`, `"block/shard_3.idx"`).
//! [`FsDirectory`] maps them onto the filesystem; [`MemoryDirectory`] keeps
//! them in a shared map for tests.

use crate::persistence::error::{PersistenceError, PersistenceResult};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Filesystem-like directory abstraction for index persistence.
pub trait Directory: Send + Sync {
    fn open_file(&self, path: &str) -> PersistenceResult<Box<dyn Read>>;

    /// Read a whole file.
    fn read_file(&self, path: &str) -> PersistenceResult<Vec<u8>> {
        let mut reader = self.open_file(path)?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Whether a file or directory exists at `path`.
    fn exists(&self, path: &str) -> bool;

    fn delete(&self, path: &str) -> PersistenceResult<()>;

    fn create_dir_all(&self, path: &str) -> PersistenceResult<()>;

    /// Remove a directory and everything below it. Absent directories are fine.
    fn remove_dir_all(&self, path: &str) -> PersistenceResult<()>;

    /// Names of the direct children of `path`, sorted.
    fn list_dir(&self, path: &str) -> PersistenceResult<Vec<String>>;

    /// Replace `path` with `data` so readers see either the old or the new
    /// content, never a partial file. Parent directories are created.
    fn atomic_write(&self, path: &str, data: &[u8]) -> PersistenceResult<()>;

    /// Filesystem location of `path`, for backends that have one.
    fn file_path(&self, path: &str) -> Option<PathBuf>;
}

fn not_found(path: &str) -> PersistenceError {
    PersistenceError::NotFound(path.to_string())
}

fn io_or_not_found(e: io::Error, path: &str) -> PersistenceError {
    if e.kind() == io::ErrorKind::NotFound {
        not_found(path)
    } else {
        PersistenceError::Io(e)
    }
}

// -----------------------------------------------------------------------------
// Filesystem
// -----------------------------------------------------------------------------

/// Directory rooted at a filesystem path.
#[derive(Debug, Clone)]
pub struct FsDirectory {
    root: PathBuf,
}

impl FsDirectory {
    /// Nothing is created until the first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        if path.is_empty() {
            self.root.clone()
        } else {
            self.root.join(path)
        }
    }
}

impl Directory for FsDirectory {
    fn open_file(&self, path: &str) -> PersistenceResult<Box<dyn Read>> {
        let file = fs::File::open(self.resolve(path)).map_err(|e| io_or_not_found(e, path))?;
        Ok(Box::new(io::BufReader::new(file)))
    }

    fn read_file(&self, path: &str) -> PersistenceResult<Vec<u8>> {
        fs::read(self.resolve(path)).map_err(|e| io_or_not_found(e, path))
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).exists()
    }

    fn delete(&self, path: &str) -> PersistenceResult<()> {
        fs::remove_file(self.resolve(path)).map_err(|e| io_or_not_found(e, path))
    }

    fn create_dir_all(&self, path: &str) -> PersistenceResult<()> {
        fs::create_dir_all(self.resolve(path))?;
        Ok(())
    }

    fn remove_dir_all(&self, path: &str) -> PersistenceResult<()> {
        match fs::remove_dir_all(self.resolve(path)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    fn list_dir(&self, path: &str) -> PersistenceResult<Vec<String>> {
        let entries = fs::read_dir(self.resolve(path)).map_err(|e| io_or_not_found(e, path))?;
        let mut names = Vec::new();
        for entry in entries {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    fn atomic_write(&self, path: &str, data: &[u8]) -> PersistenceResult<()> {
        let target = self.resolve(path);
        let parent = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        fs::create_dir_all(&parent)?;

        let mut tmp_name = target.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);

        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(data)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &target)?;

        // Persist the rename itself.
        #[cfg(unix)]
        fs::File::open(&parent)?.sync_all()?;

        Ok(())
    }

    fn file_path(&self, path: &str) -> Option<PathBuf> {
        Some(self.resolve(path))
    }
}

// -----------------------------------------------------------------------------
// In-memory
// -----------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MemoryState {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
}

impl MemoryState {
    fn add_parents(&mut self, path: &str) {
        let mut current = path;
        while let Some((parent, _)) = current.rsplit_once('/') {
            self.dirs.insert(parent.to_string());
            current = parent;
        }
    }
}

/// In-memory directory. Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    state: Arc<RwLock<MemoryState>>,
}

fn normalize(path: &str) -> String {
    path.trim_start_matches("./").trim_matches('/').to_string()
}

fn poisoned() -> PersistenceError {
    PersistenceError::InvalidState("memory directory lock poisoned".to_string())
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a file in place, bypassing [`Directory::atomic_write`].
    ///
    /// Lets tests simulate on-disk corruption.
    pub fn put(&self, path: &str, data: Vec<u8>) -> PersistenceResult<()> {
        let path = normalize(path);
        let mut state = self.state.write().map_err(|_| poisoned())?;
        state.add_parents(&path);
        state.files.insert(path, data);
        Ok(())
    }
}

impl Directory for MemoryDirectory {
    fn open_file(&self, path: &str) -> PersistenceResult<Box<dyn Read>> {
        Ok(Box::new(Cursor::new(self.read_file(path)?)))
    }

    fn read_file(&self, path: &str) -> PersistenceResult<Vec<u8>> {
        let state = self.state.read().map_err(|_| poisoned())?;
        state
            .files
            .get(&normalize(path))
            .cloned()
            .ok_or_else(|| not_found(path))
    }

    fn exists(&self, path: &str) -> bool {
        let path = normalize(path);
        self.state
            .read()
            .map(|s| path.is_empty() || s.files.contains_key(&path) || s.dirs.contains(&path))
            .unwrap_or(false)
    }

    fn delete(&self, path: &str) -> PersistenceResult<()> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        state
            .files
            .remove(&normalize(path))
            .map(|_| ())
            .ok_or_else(|| not_found(path))
    }

    fn create_dir_all(&self, path: &str) -> PersistenceResult<()> {
        let path = normalize(path);
        if path.is_empty() {
            return Ok(());
        }
        let mut state = self.state.write().map_err(|_| poisoned())?;
        state.add_parents(&path);
        state.dirs.insert(path);
        Ok(())
    }

    fn remove_dir_all(&self, path: &str) -> PersistenceResult<()> {
        let path = normalize(path);
        let prefix = format!("{path}/");
        let mut state = self.state.write().map_err(|_| poisoned())?;
        state.files.retain(|p, _| !p.starts_with(&prefix));
        state.dirs.retain(|d| d != &path && !d.starts_with(&prefix));
        Ok(())
    }

    fn list_dir(&self, path: &str) -> PersistenceResult<Vec<String>> {
        let path = normalize(path);
        let state = self.state.read().map_err(|_| poisoned())?;
        if !path.is_empty() && !state.dirs.contains(&path) {
            return Err(not_found(&path));
        }
        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{path}/")
        };

        let children: BTreeSet<String> = state
            .files
            .keys()
            .chain(state.dirs.iter())
            .filter_map(|p| p.strip_prefix(&prefix))
            .filter(|rest| !rest.is_empty())
            .map(|rest| rest.split('/').next().unwrap_or(rest).to_string())
            .collect();
        Ok(children.into_iter().collect())
    }

    fn atomic_write(&self, path: &str, data: &[u8]) -> PersistenceResult<()> {
        self.put(path, data.to_vec())
    }

    fn file_path(&self, _path: &str) -> Option<PathBuf> {
        None
    }
}
