//! Local filesystem backend.

use super::{BackendKind, FileStat, StorageBackend};
use crate::hash::{self, ContentHash};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use walkdir::WalkDir;

/// Backend over a directory on the local disk.
///
/// Listed paths are full paths (`base_dir` joined with the inventory folder),
/// so they can be handed straight back to `stat`, `hash` and the transfer
/// operations.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    name: String,
    base_dir: PathBuf,
}

impl LocalBackend {
    pub fn new(name: impl Into<String>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    /// The folder always resolves under `base_dir`, even when written absolute
    fn normalize_root(&self, root: &str) -> String {
        self.base_dir
            .join(root.trim_start_matches(['/', '\\']))
            .to_string_lossy()
            .into_owned()
    }

    async fn list(&self, root: &str) -> Result<Vec<String>> {
        let root = PathBuf::from(root);
        debug!("Walking local directory: {}", root.display());

        tokio::task::spawn_blocking(move || -> Result<Vec<String>> {
            let mut files = Vec::new();
            for entry in WalkDir::new(&root).follow_links(false) {
                let entry = entry?;
                if entry.file_type().is_file() {
                    files.push(entry.path().to_string_lossy().into_owned());
                }
            }
            Ok(files)
        })
        .await?
    }

    async fn stat(&self, path: &str) -> Result<FileStat> {
        let metadata = fs::metadata(path).await?;
        let modified = metadata.modified().ok().map(DateTime::<Utc>::from);

        Ok(FileStat {
            size: Some(metadata.len()),
            modified,
        })
    }

    async fn hash(&self, path: &str) -> Result<ContentHash> {
        let path = PathBuf::from(path);
        let hash = tokio::task::spawn_blocking(move || hash::hash_file(&path)).await??;
        Ok(hash)
    }

    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        copy_creating_parents(local_path, Path::new(remote_path)).await
    }

    async fn download(&self, remote_path: &str, local_path: &Path) -> Result<()> {
        copy_creating_parents(Path::new(remote_path), local_path).await
    }

    async fn delete(&self, remote_path: &str) -> Result<()> {
        fs::remove_file(remote_path).await?;
        Ok(())
    }
}

async fn copy_creating_parents(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    fs::copy(from, to).await?;
    Ok(())
}
