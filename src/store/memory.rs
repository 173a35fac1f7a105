//! In-process inventory store.

use super::{FileLocation, InventorySnapshot, InventoryStore, LogicalFile, StagedSnapshot, StoreTransaction};
use crate::Result;
use std::sync::RwLock;

/// Store keeping the committed snapshot in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    committed: RwLock<InventorySnapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: InventorySnapshot) -> Self {
        Self {
            committed: RwLock::new(snapshot),
        }
    }
}

impl InventoryStore for MemoryStore {
    fn begin(&self) -> Result<Box<dyn StoreTransaction + '_>> {
        let staged = StagedSnapshot::new(self.load()?);
        Ok(Box::new(MemoryTransaction {
            store: self,
            staged,
        }))
    }

    fn load(&self) -> Result<InventorySnapshot> {
        Ok(self
            .committed
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone())
    }
}

struct MemoryTransaction<'a> {
    store: &'a MemoryStore,
    staged: StagedSnapshot,
}

impl StoreTransaction for MemoryTransaction<'_> {
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
        let MemoryTransaction { store, staged } = *self;
        *store.committed.write().unwrap_or_else(|e| e.into_inner()) = staged.into_snapshot();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::logical_file;

    #[test]
    fn test_changes_invisible_until_commit() -> Result<()> {
        let store = MemoryStore::new();
        let file = logical_file(b"X", "x.txt");

        let mut tx = store.begin()?;
        tx.upsert_logical_file(file.clone())?;
        tx.add_file_location(FileLocation {
            logical_file_id: file.id,
            backend_name: "a".to_string(),
        })?;
        assert!(store.load()?.logical_files.is_empty());

        tx.commit()?;
        let snapshot = store.load()?;
        assert_eq!(snapshot.logical_files, vec![file]);
        assert_eq!(snapshot.locations.len(), 1);
        Ok(())
    }

    #[test]
    fn test_dropped_transaction_rolls_back() -> Result<()> {
        let file = logical_file(b"X", "x.txt");
        let store = MemoryStore::with_snapshot(InventorySnapshot {
            logical_files: vec![file.clone()],
            ..Default::default()
        });

        {
            let mut tx = store.begin()?;
            tx.delete_all_logical_files()?;
            tx.delete_all_file_locations()?;
        }

        assert_eq!(store.load()?.logical_files, vec![file]);
        Ok(())
    }
}
