//! Inventory collection across every configured backend.
//!
//! The collector is a pure gather step: it lists each backend, stats and
//! hashes every file, and returns one [`FileObservation`] per sighting. No
//! deduplication happens here.
//!
//! Failures degrade rather than abort:
//! - an unreachable backend contributes no observations,
//! - a failed `stat` falls back to size 0 and "now",
//! - a failed `hash` falls back to a pseudo-hash of the path string, tagged
//!   [`HashSource::PathFallback`].
//!
//! Backends are scanned concurrently, but the result is assembled in
//! configured backend order with each backend's paths sorted, so collection
//! order is deterministic for a given backend set.

use crate::backend::{basename, StorageBackend};
use crate::hash::ContentHash;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where an observation's content hash came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HashSource {
    /// Real block-scheme hash of the file bytes
    Content,
    /// Pseudo-hash of the path, used when the backend could not hash the file
    PathFallback,
}

/// One sighting of a file on one backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileObservation {
    pub content_hash: ContentHash,
    pub path: String,
    pub name: String,
    pub size_bytes: u64,
    pub last_modified: DateTime<Utc>,
    pub backend_name: String,
    pub hash_source: HashSource,
}

/// Output of one collection pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Collection {
    pub observations: Vec<FileObservation>,
    /// Backends whose listing failed and contributed nothing
    pub unreachable_backends: Vec<String>,
}

impl Collection {
    pub fn fallback_hashes(&self) -> usize {
        self.observations
            .iter()
            .filter(|o| o.hash_source == HashSource::PathFallback)
            .count()
    }
}

/// Walks every backend and gathers observations
pub struct InventoryCollector {
    backends: Vec<Arc<dyn StorageBackend>>,
    root: String,
}

impl InventoryCollector {
    /// `root` is the inventory folder; each backend normalizes it to its own
    /// path syntax.
    pub fn new(backends: Vec<Arc<dyn StorageBackend>>, root: impl Into<String>) -> Self {
        Self {
            backends,
            root: root.into(),
        }
    }

    pub fn backends(&self) -> &[Arc<dyn StorageBackend>] {
        &self.backends
    }

    pub async fn collect(&self) -> Collection {
        let scans = self
            .backends
            .iter()
            .map(|backend| collect_backend(backend.as_ref(), &self.root));
        let results = join_all(scans).await;

        let mut collection = Collection::default();
        for (backend, result) in self.backends.iter().zip(results) {
            match result {
                Some(mut observations) => collection.observations.append(&mut observations),
                None => collection
                    .unreachable_backends
                    .push(backend.name().to_string()),
            }
        }

        info!(
            "Collected {} observations from {} backends ({} unreachable, {} fallback hashes)",
            collection.observations.len(),
            self.backends.len(),
            collection.unreachable_backends.len(),
            collection.fallback_hashes()
        );
        collection
    }
}

/// Scan one backend; `None` when its listing fails
async fn collect_backend(backend: &dyn StorageBackend, root: &str) -> Option<Vec<FileObservation>> {
    let root = backend.normalize_root(root);
    let mut paths = match backend.list(&root).await {
        Ok(paths) => paths,
        Err(e) => {
            warn!(
                backend = backend.name(),
                "Backend unreachable, skipping: {}", e
            );
            return None;
        }
    };
    paths.sort();
    debug!("Backend {} listed {} files under '{}'", backend.name(), paths.len(), root);

    let mut observations = Vec::with_capacity(paths.len());
    for path in paths {
        observations.push(observe(backend, path).await);
    }
    Some(observations)
}

async fn observe(backend: &dyn StorageBackend, path: String) -> FileObservation {
    let stat = match backend.stat(&path).await {
        Ok(stat) => stat,
        Err(e) => {
            warn!(backend = backend.name(), path = %path, "Metadata unavailable: {}", e);
            Default::default()
        }
    };

    let (content_hash, hash_source) = match backend.hash(&path).await {
        Ok(hash) => (hash, HashSource::Content),
        Err(e) => {
            warn!(
                backend = backend.name(),
                path = %path,
                hash_source = "path-fallback",
                "Hash failed, using path pseudo-hash: {}", e
            );
            (ContentHash::from_path_fallback(&path), HashSource::PathFallback)
        }
    };

    FileObservation {
        content_hash,
        name: basename(&path).to_string(),
        size_bytes: stat.size.unwrap_or(0),
        last_modified: stat.modified.unwrap_or_else(Utc::now),
        backend_name: backend.name().to_string(),
        hash_source,
        path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::hash::hash_bytes;
    use pretty_assertions::assert_eq;

    fn backends(list: Vec<MemoryBackend>) -> Vec<Arc<dyn StorageBackend>> {
        list.into_iter()
            .map(|b| Arc::new(b) as Arc<dyn StorageBackend>)
            .collect()
    }

    #[tokio::test]
    async fn test_collects_in_backend_then_path_order() {
        let a = MemoryBackend::new("a")
            .with_file("HCS/z.txt", "z")
            .with_file("HCS/m.txt", "m");
        let b = MemoryBackend::new("b").with_file("HCS/a.txt", "a");

        let collector = InventoryCollector::new(backends(vec![a, b]), "HCS");
        let collection = collector.collect().await;

        let seen: Vec<(&str, &str)> = collection
            .observations
            .iter()
            .map(|o| (o.backend_name.as_str(), o.name.as_str()))
            .collect();
        assert_eq!(seen, vec![("a", "m.txt"), ("a", "z.txt"), ("b", "a.txt")]);
        assert!(collection.unreachable_backends.is_empty());
    }

    #[tokio::test]
    async fn test_observation_fields() {
        let modified = DateTime::parse_from_rfc3339("2024-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);
        let backend = MemoryBackend::new("mem");
        backend.insert_with_modified("HCS/docs/report.txt", "X", modified);

        let collector = InventoryCollector::new(backends(vec![backend]), "HCS");
        let collection = collector.collect().await;

        assert_eq!(
            collection.observations,
            vec![FileObservation {
                content_hash: hash_bytes(b"X"),
                path: "HCS/docs/report.txt".to_string(),
                name: "report.txt".to_string(),
                size_bytes: 1,
                last_modified: modified,
                backend_name: "mem".to_string(),
                hash_source: HashSource::Content,
            }]
        );
    }

    #[tokio::test]
    async fn test_unreachable_backend_contributes_nothing() {
        let up = MemoryBackend::new("up").with_file("HCS/a.txt", "a");
        let down = MemoryBackend::new("down").with_file("HCS/b.txt", "b");
        down.set_reachable(false);

        let collector = InventoryCollector::new(backends(vec![up, down]), "HCS");
        let collection = collector.collect().await;

        assert_eq!(collection.observations.len(), 1);
        assert_eq!(collection.unreachable_backends, vec!["down".to_string()]);
    }

    #[tokio::test]
    async fn test_hash_failure_falls_back_to_path() {
        let backend = MemoryBackend::new("mem")
            .with_file("HCS/ok.txt", "ok")
            .with_file("HCS/bad.txt", "bad");
        backend.fail_hash_for("HCS/bad.txt");

        let collector = InventoryCollector::new(backends(vec![backend]), "HCS");
        let collection = collector.collect().await;

        assert_eq!(collection.observations.len(), 2);
        assert_eq!(collection.fallback_hashes(), 1);

        let bad = &collection.observations[0];
        assert_eq!(bad.path, "HCS/bad.txt");
        assert_eq!(bad.hash_source, HashSource::PathFallback);
        assert_eq!(bad.content_hash, ContentHash::from_path_fallback("HCS/bad.txt"));
        assert_eq!(bad.size_bytes, 3);
    }
}
