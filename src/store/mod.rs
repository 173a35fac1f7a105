//! Persisted inventory: logical files and their locations.
//!
//! Stores expose a transaction whose staged changes become visible only on
//! [`StoreTransaction::commit`]. Dropping a transaction without committing
//! discards everything it staged, so readers always see either the previous
//! snapshot or the complete new one.

pub mod json;
pub mod memory;

use crate::classify::Sensitivity;
use crate::hash::ContentHash;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub use json::JsonFileStore;
pub use memory::MemoryStore;

/// Snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

/// Stable identifier for the logical file with this content.
///
/// UUID v5 in the OID namespace over the hex hash, so the same content maps
/// to the same id across independent runs.
pub fn uuid_from_hash(hash: &ContentHash) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, hash.as_str().as_bytes())
}

/// The deduplicated, persisted unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalFile {
    pub id: Uuid,
    pub content_hash: ContentHash,
    pub name: String,
    pub path: String,
    pub size_bytes: u64,
    pub last_modified: DateTime<Utc>,
    pub sensitivity: Sensitivity,
    pub backup_count: u32,
    pub updated_at: DateTime<Utc>,
}

/// A backend where a copy of a logical file was observed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileLocation {
    pub logical_file_id: Uuid,
    pub backend_name: String,
}

/// Full persisted state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySnapshot {
    pub version: u32,
    pub logical_files: Vec<LogicalFile>,
    pub locations: Vec<FileLocation>,
}

impl Default for InventorySnapshot {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            logical_files: Vec::new(),
            locations: Vec::new(),
        }
    }
}

/// A logical file joined with the backends holding it, for read-only listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalFileView {
    #[serde(flatten)]
    pub file: LogicalFile,
    pub locations: Vec<String>,
}

impl InventorySnapshot {
    pub fn find(&self, id: &Uuid) -> Option<&LogicalFile> {
        self.logical_files.iter().find(|f| f.id == *id)
    }

    pub fn locations_of(&self, id: &Uuid) -> Vec<String> {
        self.locations
            .iter()
            .filter(|l| l.logical_file_id == *id)
            .map(|l| l.backend_name.clone())
            .collect()
    }

    /// Every logical file joined with its locations, in stored order
    pub fn views(&self) -> Vec<LogicalFileView> {
        let mut by_file: HashMap<Uuid, Vec<String>> = HashMap::new();
        for location in &self.locations {
            by_file
                .entry(location.logical_file_id)
                .or_default()
                .push(location.backend_name.clone());
        }

        self.logical_files
            .iter()
            .map(|file| LogicalFileView {
                file: file.clone(),
                locations: by_file.remove(&file.id).unwrap_or_default(),
            })
            .collect()
    }
}

/// Working copy of a snapshot inside a transaction.
///
/// Keeps an id -> position index so upserts and the location foreign-key
/// check stay constant time.
#[derive(Debug, Clone, Default)]
pub(crate) struct StagedSnapshot {
    snapshot: InventorySnapshot,
    index: HashMap<Uuid, usize>,
}

impl StagedSnapshot {
    pub(crate) fn new(snapshot: InventorySnapshot) -> Self {
        let index = snapshot
            .logical_files
            .iter()
            .enumerate()
            .map(|(position, file)| (file.id, position))
            .collect();
        Self { snapshot, index }
    }

    pub(crate) fn snapshot(&self) -> &InventorySnapshot {
        &self.snapshot
    }

    pub(crate) fn into_snapshot(self) -> InventorySnapshot {
        self.snapshot
    }

    /// Removes every logical file and, by cascade, every location
    pub(crate) fn delete_all_logical_files(&mut self) {
        self.snapshot.logical_files.clear();
        self.snapshot.locations.clear();
        self.index.clear();
    }

    pub(crate) fn delete_all_file_locations(&mut self) {
        self.snapshot.locations.clear();
    }

    pub(crate) fn upsert_logical_file(&mut self, file: LogicalFile) {
        match self.index.get(&file.id) {
            Some(&position) => self.snapshot.logical_files[position] = file,
            None => {
                self.index.insert(file.id, self.snapshot.logical_files.len());
                self.snapshot.logical_files.push(file);
            }
        }
    }

    pub(crate) fn add_file_location(&mut self, location: FileLocation) -> Result<()> {
        if !self.index.contains_key(&location.logical_file_id) {
            return Err(Error::store(format!(
                "location references unknown logical file {}",
                location.logical_file_id
            )));
        }
        self.snapshot.locations.push(location);
        Ok(())
    }
}

/// Persistence collaborator for reconciliation
pub trait InventoryStore: Send + Sync {
    /// Start a transaction staged on top of the current snapshot
    fn begin(&self) -> Result<Box<dyn StoreTransaction + '_>>;

    /// Current committed snapshot
    fn load(&self) -> Result<InventorySnapshot>;
}

/// Atomic unit of work against an [`InventoryStore`]
pub trait StoreTransaction {
    fn delete_all_logical_files(&mut self) -> Result<()>;

    fn delete_all_file_locations(&mut self) -> Result<()>;

    fn upsert_logical_file(&mut self, file: LogicalFile) -> Result<()>;

    fn add_file_location(&mut self, location: FileLocation) -> Result<()>;

    /// Publish every staged change at once
    fn commit(self: Box<Self>) -> Result<()>;
}
