//! In-memory backend for development and testing.

use super::{BackendKind, FileStat, StorageBackend};
use crate::hash::{self, ContentHash};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

#[derive(Debug, Clone)]
struct MemoryFile {
    data: Vec<u8>,
    modified: DateTime<Utc>,
}

/// Backend holding files in a map, with switches to simulate an unreachable
/// backend or per-file hash failures.
#[derive(Debug)]
pub struct MemoryBackend {
    name: String,
    files: RwLock<BTreeMap<String, MemoryFile>>,
    reachable: AtomicBool,
    failing_hashes: RwLock<HashSet<String>>,
}

impl MemoryBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            files: RwLock::new(BTreeMap::new()),
            reachable: AtomicBool::new(true),
            failing_hashes: RwLock::new(HashSet::new()),
        }
    }

    /// Builder-style insert
    pub fn with_file(self, path: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.insert(path, data);
        self
    }

    pub fn insert(&self, path: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.insert_with_modified(path, data, Utc::now());
    }

    pub fn insert_with_modified(
        &self,
        path: impl Into<String>,
        data: impl Into<Vec<u8>>,
        modified: DateTime<Utc>,
    ) {
        let file = MemoryFile {
            data: data.into(),
            modified,
        };
        self.files
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.into(), file);
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(path)
    }

    /// Make every call fail as if the backend could not be reached
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Make `hash` fail for one path while everything else keeps working
    pub fn fail_hash_for(&self, path: impl Into<String>) {
        self.failing_hashes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.into());
    }

    fn ensure_reachable(&self) -> Result<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::backend(&self.name, "backend unreachable"))
        }
    }

    fn read_file(&self, path: &str) -> Result<MemoryFile> {
        self.files
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .cloned()
            .ok_or_else(|| Error::backend(&self.name, format!("no such file: {}", path)))
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    fn normalize_root(&self, root: &str) -> String {
        root.trim_matches('/').to_string()
    }

    async fn list(&self, root: &str) -> Result<Vec<String>> {
        self.ensure_reachable()?;
        let prefix = if root.is_empty() {
            String::new()
        } else {
            format!("{}/", root.trim_end_matches('/'))
        };

        let files = self.files.read().unwrap_or_else(|e| e.into_inner());
        Ok(files
            .keys()
            .filter(|path| path.starts_with(&prefix))
            .cloned()
            .collect())
    }

    async fn stat(&self, path: &str) -> Result<FileStat> {
        self.ensure_reachable()?;
        let file = self.read_file(path)?;
        Ok(FileStat {
            size: Some(file.data.len() as u64),
            modified: Some(file.modified),
        })
    }

    async fn hash(&self, path: &str) -> Result<ContentHash> {
        self.ensure_reachable()?;
        let failing = self
            .failing_hashes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(path);
        if failing {
            return Err(Error::backend(&self.name, format!("read failed: {}", path)));
        }

        let file = self.read_file(path)?;
        Ok(hash::hash_bytes(&file.data))
    }

    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        self.ensure_reachable()?;
        let data = tokio::fs::read(local_path).await?;
        self.insert(remote_path, data);
        Ok(())
    }

    async fn download(&self, remote_path: &str, local_path: &Path) -> Result<()> {
        self.ensure_reachable()?;
        let file = self.read_file(remote_path)?;
        tokio::fs::write(local_path, &file.data).await?;
        Ok(())
    }

    async fn delete(&self, remote_path: &str) -> Result<()> {
        self.ensure_reachable()?;
        self.files
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(remote_path)
            .map(|_| ())
            .ok_or_else(|| Error::backend(&self.name, format!("no such file: {}", remote_path)))
    }
}
