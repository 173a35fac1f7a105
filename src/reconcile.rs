//! Reconciliation: collect, group, classify, and replace the persisted
//! inventory with the new snapshot.
//!
//! A run is cancellable up to the moment the store transaction begins. From
//! then on the delete-all and reinsert happen inside one transaction, so a
//! failure leaves the previous snapshot in place.

use crate::classify::{Classifier, Sensitivity};
use crate::dedupe::{compute_backup_counts, group_by_hash, HashGroup};
use crate::hash::ContentHash;
use crate::inventory::{Collection, InventoryCollector};
use crate::store::{uuid_from_hash, FileLocation, InventoryStore, LogicalFile, LogicalFileView};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Writes a full snapshot of logical files into a store
pub struct ReconciliationWriter<'a> {
    store: &'a dyn InventoryStore,
}

impl<'a> ReconciliationWriter<'a> {
    pub fn new(store: &'a dyn InventoryStore) -> Self {
        Self { store }
    }

    /// Replace the stored inventory with `groups`.
    ///
    /// Every group needs a backup count and a label. Returns the number of
    /// observations written as locations.
    pub fn write(
        &self,
        groups: &[HashGroup],
        backup_counts: &HashMap<ContentHash, u32>,
        labels: &HashMap<ContentHash, Sensitivity>,
        updated_at: DateTime<Utc>,
    ) -> Result<usize> {
        let mut tx = self.store.begin()?;
        tx.delete_all_logical_files()?;
        tx.delete_all_file_locations()?;

        let mut processed = 0;
        for group in groups {
            let representative = group.representative();
            let sensitivity = *labels.get(&group.content_hash).ok_or_else(|| Error::Classification {
                path: representative.path.clone(),
                reason: "no sensitivity label for group".to_string(),
            })?;
            let backup_count = backup_counts
                .get(&group.content_hash)
                .copied()
                .unwrap_or_else(|| group.backup_count());

            let id = uuid_from_hash(&group.content_hash);
            tx.upsert_logical_file(LogicalFile {
                id,
                content_hash: group.content_hash.clone(),
                name: representative.name.clone(),
                path: representative.path.clone(),
                size_bytes: representative.size_bytes,
                last_modified: representative.last_modified,
                sensitivity,
                backup_count,
                updated_at,
            })?;

            for observation in &group.observations {
                tx.add_file_location(FileLocation {
                    logical_file_id: id,
                    backend_name: observation.backend_name.clone(),
                })?;
                processed += 1;
            }
        }

        tx.commit()?;
        debug!("Wrote {} logical files, {} locations", groups.len(), processed);
        Ok(processed)
    }
}

/// Outcome of a successful run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Observations processed across all reachable backends
    pub observations: usize,
    pub logical_files: usize,
    pub fallback_hashes: usize,
    pub unreachable_backends: Vec<String>,
    pub started_at: DateTime<Utc>,
    /// Stamped on every logical file as `updated_at`
    pub written_at: DateTime<Utc>,
    /// Taken once the store commit returned
    pub finished_at: DateTime<Utc>,
}

/// Drives full reconciliation runs against one store.
///
/// Only one run may be in flight per reconciler; a second concurrent call
/// fails with [`Error::RunInProgress`] instead of racing on the delete-all.
pub struct Reconciler {
    collector: InventoryCollector,
    classifier: Arc<dyn Classifier>,
    store: Arc<dyn InventoryStore>,
    run_guard: Mutex<()>,
}

impl Reconciler {
    pub fn new(
        collector: InventoryCollector,
        classifier: Arc<dyn Classifier>,
        store: Arc<dyn InventoryStore>,
    ) -> Self {
        Self {
            collector,
            classifier,
            store,
            run_guard: Mutex::new(()),
        }
    }

    /// Gather observations without touching the store
    pub async fn scan(&self) -> Collection {
        self.collector.collect().await
    }

    /// Current persisted inventory, joined with locations
    pub fn list_files(&self) -> Result<Vec<LogicalFileView>> {
        Ok(self.store.load()?.views())
    }

    pub async fn run(&self) -> Result<RunReport> {
        self.run_with_cancel(&CancellationToken::new()).await
    }

    pub async fn run_with_cancel(&self, cancel: &CancellationToken) -> Result<RunReport> {
        let _guard = self.run_guard.try_lock().map_err(|_| Error::RunInProgress)?;
        let started_at = Utc::now();
        info!("Starting reconciliation run");

        let collection = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            collection = self.collector.collect() => collection,
        };
        let fallback_hashes = collection.fallback_hashes();
        let unreachable_backends = collection.unreachable_backends;

        let groups = group_by_hash(collection.observations);
        let backup_counts = compute_backup_counts(&groups);

        let labels = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            labels = self.classify_groups(&groups) => labels?,
        };

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        // Past this point the run is not cancellable.
        let written_at = Utc::now();
        let writer = ReconciliationWriter::new(self.store.as_ref());
        let observations = writer.write(&groups, &backup_counts, &labels, written_at)?;

        let report = RunReport {
            observations,
            logical_files: groups.len(),
            fallback_hashes,
            unreachable_backends,
            started_at,
            written_at,
            finished_at: Utc::now(),
        };
        info!(
            "Reconciliation finished: {} observations, {} logical files",
            report.observations, report.logical_files
        );
        Ok(report)
    }

    /// One classifier call per group, on the representative's path
    async fn classify_groups(&self, groups: &[HashGroup]) -> Result<HashMap<ContentHash, Sensitivity>> {
        let mut labels = HashMap::with_capacity(groups.len());
        for group in groups {
            let label = self.classifier.classify(&group.representative().path).await?;
            labels.insert(group.content_hash.clone(), label);
        }
        Ok(labels)
    }
}
