//! Grouping of observations by content hash.

use crate::hash::ContentHash;
use crate::inventory::FileObservation;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// All observations sharing one content hash: the copies of one logical file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashGroup {
    pub content_hash: ContentHash,
    /// Non-empty, in collection order
    pub observations: Vec<FileObservation>,
}

impl HashGroup {
    /// First observation in collection order; supplies display metadata and
    /// is the one handed to the classifier
    pub fn representative(&self) -> &FileObservation {
        &self.observations[0]
    }

    /// Copies beyond the first
    pub fn backup_count(&self) -> u32 {
        backup_count_for(self.observations.len())
    }
}

fn backup_count_for(group_size: usize) -> u32 {
    u32::try_from(group_size.saturating_sub(1)).unwrap_or(u32::MAX)
}

/// Group observations by content hash.
///
/// Groups come back in order of first appearance, and each group keeps its
/// observations in the order they were produced.
pub fn group_by_hash(observations: Vec<FileObservation>) -> Vec<HashGroup> {
    let mut index: HashMap<ContentHash, usize> = HashMap::new();
    let mut groups: Vec<HashGroup> = Vec::new();

    for observation in observations {
        match index.get(&observation.content_hash) {
            Some(&i) => groups[i].observations.push(observation),
            None => {
                index.insert(observation.content_hash.clone(), groups.len());
                groups.push(HashGroup {
                    content_hash: observation.content_hash.clone(),
                    observations: vec![observation],
                });
            }
        }
    }

    debug!("Grouped observations into {} logical files", groups.len());
    groups
}

/// Backup count per hash: `max(group size - 1, 0)`
pub fn compute_backup_counts(groups: &[HashGroup]) -> HashMap<ContentHash, u32> {
    groups
        .iter()
        .map(|group| (group.content_hash.clone(), group.backup_count()))
        .collect()
}
