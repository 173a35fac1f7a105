//! Inventory store backed by a single JSON snapshot file.
//!
//! A transaction holds an exclusive advisory lock on a file next to the
//! snapshot for its whole lifetime. The operating system drops the lock when
//! the holder exits, so a crashed writer never blocks later runs. Commit
//! writes the staged snapshot to a temporary file, syncs it, and renames it
//! over the snapshot, so readers never observe a partially written inventory.

use super::{FileLocation, InventorySnapshot, InventoryStore, LogicalFile, StagedSnapshot, StoreTransaction};
use crate::{Error, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, ErrorKind, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        sibling(&self.path, "lock")
    }

    fn temp_path(&self) -> PathBuf {
        sibling(&self.path, "tmp")
    }
}

/// `inventory.json` -> `inventory.json.<suffix>`
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

impl InventoryStore for JsonFileStore {
    fn begin(&self) -> Result<Box<dyn StoreTransaction + '_>> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let lock_path = self.lock_path();
        let mut lock = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        if let Err(e) = FileExt::try_lock_exclusive(&lock) {
            if e.kind() != fs2::lock_contended_error().kind() {
                return Err(e.into());
            }
            let holder = fs::read_to_string(&lock_path).unwrap_or_default();
            return Err(Error::store(format!(
                "{} is locked by another writer (lock file {}, pid {})",
                self.path.display(),
                lock_path.display(),
                holder.trim()
            )));
        }

        // The pid is informational; the lock itself is what excludes writers.
        lock.set_len(0)?;
        lock.seek(SeekFrom::Start(0))?;
        writeln!(lock, "{}", std::process::id())?;

        let lock = LockGuard { file: lock, path: lock_path };
        let staged = StagedSnapshot::new(self.load()?);
        Ok(Box::new(JsonTransaction {
            store: self,
            staged,
            _lock: lock,
        }))
    }

    fn load(&self) -> Result<InventorySnapshot> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No snapshot at {}, starting empty", self.path.display());
                return Ok(InventorySnapshot::default());
            }
            Err(e) => return Err(e.into()),
        };

        let snapshot: InventorySnapshot = serde_json::from_reader(BufReader::new(file))?;
        if snapshot.version != super::SNAPSHOT_VERSION {
            return Err(Error::store(format!(
                "unsupported snapshot version {} in {}",
                snapshot.version,
                self.path.display()
            )));
        }
        Ok(snapshot)
    }
}

/// Releases the advisory lock when the transaction ends, committed or not.
///
/// The lock file itself stays in place; deleting it would let a second
/// writer lock a fresh inode while a third still holds the old one.
struct LockGuard {
    file: File,
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("Failed to release lock {}: {}", self.path.display(), e);
        }
    }
}

struct JsonTransaction<'a> {
    store: &'a JsonFileStore,
    staged: StagedSnapshot,
    _lock: LockGuard,
}

impl StoreTransaction for JsonTransaction<'_> {
    fn delete_all_logical_files(&mut self) -> Result<()> {
        self.staged.delete_all_logical_files();
        Ok(())
    }

    fn delete_all_file_locations(&mut self) -> Result<()> {
        self.staged.delete_all_file_locations();
        Ok(())
    }

    fn upsert_logical_file(&mut self, file: LogicalFile) -> Result<()> {
        self.staged.upsert_logical_file(file);
        Ok(())
    }

    fn add_file_location(&mut self, location: FileLocation) -> Result<()> {
        self.staged.add_file_location(location)
    }

    fn commit(self: Box<Self>) -> Result<()> {
        let temp_path = self.store.temp_path();
        let json = serde_json::to_vec_pretty(self.staged.snapshot())?;

        let mut file = File::create(&temp_path)?;
        file.write_all(&json)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, &self.store.path)?;
        debug!(
            "Committed {} logical files to {}",
            self.staged.snapshot().logical_files.len(),
            self.store.path.display()
        );
        Ok(())
    }
}
