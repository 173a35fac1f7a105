//! Storage backends.
//!
//! Every storage medium (local disk, Dropbox, FTP over TLS) implements the
//! same [`StorageBackend`] capability set so the collector can treat them
//! uniformly. All backends must report content hashes using the block
//! scheme in [`crate::hash`].

pub mod dropbox;
pub mod ftps;
pub mod local;
pub mod memory;

use crate::hash::ContentHash;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use dropbox::DropboxBackend;
pub use ftps::FtpsBackend;
pub use local::LocalBackend;
pub use memory::MemoryBackend;

/// Kind of storage medium behind a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    Local,
    CloudDrive,
    Ftps,
    Memory,
}

/// Best-effort file metadata; missing fields are filled in by the caller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileStat {
    pub size: Option<u64>,
    pub modified: Option<DateTime<Utc>>,
}

/// Uniform capability set over a storage medium
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name recorded on every observation this backend produces
    fn name(&self) -> &str;

    fn kind(&self) -> BackendKind;

    /// Map the configured inventory folder onto this backend's path syntax
    fn normalize_root(&self, root: &str) -> String {
        root.to_string()
    }

    /// Recursively enumerate regular files under `root`, never directories.
    ///
    /// An error means the backend is unreachable; the collector treats that
    /// as an empty listing.
    async fn list(&self, root: &str) -> Result<Vec<String>>;

    async fn stat(&self, path: &str) -> Result<FileStat>;

    /// Content hash of the file, computed with the block scheme
    async fn hash(&self, path: &str) -> Result<ContentHash>;

    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<()>;

    async fn download(&self, remote_path: &str, local_path: &Path) -> Result<()>;

    async fn delete(&self, remote_path: &str) -> Result<()>;
}

/// Final path component, accepting both separator styles
pub fn basename(path: &str) -> &str {
    path.trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(path)
}
