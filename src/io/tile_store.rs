use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::tile::{TileAddress, TileFormat};

/// Durable on-disk tile hierarchy rooted at a cache directory.
///
/// Layout: `{root}/{zoom}/{x}/{y}.{ext}`, one file per tile, directories
/// created on first write. The store has no eviction policy and no notion of
/// in-memory state; it only reads, writes and deletes files.
///
/// Writes go to a temporary sibling file that is renamed into place, so a
/// concurrent reader sees either the previous file or the complete new one.
///
/// A file that cannot be deleted right away (e.g. still open elsewhere on some
/// platforms) is remembered and retried by [`TileStore::purge_pending`] and
/// when the store is dropped.
pub struct TileStore {
    /// Root directory of the hierarchy
    root: PathBuf,
    /// Encoding of stored tiles (decides the file extension)
    format: TileFormat,
    /// Corrupt files whose deletion failed, each queued once
    pending_deletions: Mutex<HashSet<PathBuf>>,
}

impl TileStore {
    /// Create a store rooted at `root`. Nothing is created on disk yet.
    pub fn new(root: impl Into<PathBuf>, format: TileFormat) -> Self {
        Self {
            root: root.into(),
            format,
            pending_deletions: Mutex::new(HashSet::new()),
        }
    }

    /// Root directory of the hierarchy.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Encoding of stored tiles.
    pub fn format(&self) -> TileFormat {
        self.format
    }

    /// Deterministic file path of a tile.
    pub fn path_for(&self, address: &TileAddress) -> PathBuf {
        self.root
            .join(address.zoom.to_string())
            .join(address.x.to_string())
            .join(format!("{}.{}", address.y, self.format.extension()))
    }

    /// Whether a file exists for this tile.
    pub fn contains(&self, address: &TileAddress) -> bool {
        self.path_for(address).is_file()
    }

    /// Read a tile's bytes. Returns `Ok(None)` when no file exists.
    pub fn read(&self, address: &TileAddress) -> Result<Option<Bytes>, StoreError> {
        let path = self.path_for(address);
        match fs::read(&path) {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Read { path, source }),
        }
    }

    /// Persist a tile, creating the enclosing directories when needed.
    pub fn write(&self, address: &TileAddress, data: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(address);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let tmp = path.with_extension(format!("{}.part", self.format.extension()));
        let result = fs::write(&tmp, data).and_then(|_| fs::rename(&tmp, &path));
        if let Err(source) = result {
            let _ = fs::remove_file(&tmp);
            return Err(StoreError::Write { path, source });
        }

        debug!(address = %address, bytes = data.len(), "Stored tile on disk");
        Ok(())
    }

    /// Delete a tile file that failed to decode.
    ///
    /// If the file cannot be removed now it is queued for a later attempt.
    /// A path already in the queue is not queued again.
    pub fn remove_corrupt(&self, address: &TileAddress) {
        let path = self.path_for(address);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "Deleted corrupt tile");
                self.pending_deletions.lock().remove(&path);
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.pending_deletions.lock().remove(&path);
            }
            Err(e) => {
                let shown = path.display().to_string();
                if self.pending_deletions.lock().insert(path) {
                    warn!(
                        path = %shown,
                        error = %e,
                        "Could not delete corrupt tile, scheduling for later"
                    );
                } else {
                    debug!(path = %shown, error = %e, "Corrupt tile still undeletable");
                }
            }
        }
    }

    /// Retry queued deletions. Returns how many are still pending.
    pub fn purge_pending(&self) -> usize {
        let mut pending = self.pending_deletions.lock();
        pending.retain(|path| match fs::remove_file(path) {
            Ok(()) => false,
            Err(e) => e.kind() != ErrorKind::NotFound,
        });
        pending.len()
    }

    /// Paths still waiting to be deleted, sorted.
    pub fn pending_deletions(&self) -> Vec<PathBuf> {
        let mut paths: Vec<_> = self.pending_deletions.lock().iter().cloned().collect();
        paths.sort();
        paths
    }
}

impl Drop for TileStore {
    fn drop(&mut self) {
        let remaining = self.purge_pending();
        if remaining > 0 {
            warn!(count = remaining, "Corrupt tiles could not be deleted");
        }
    }
}

impl std::fmt::Debug for TileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileStore")
            .field("root", &self.root)
            .field("format", &self.format)
            .finish()
    }
}
