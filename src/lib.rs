//! # nova-inventory
//!
//! Inventories files spread across independent storage backends (local disk,
//! Dropbox, FTP over TLS), finds byte-identical copies by content hash, and
//! maintains a deduplicated view of logical files with a backup count and a
//! sensitivity label.
//!
//! ## Features
//!
//! - **Backends**: one async capability set over every storage medium
//! - **Content hashing**: 4 MiB block SHA-256 scheme, identical on every backend
//! - **Deduplication**: observations grouped by hash into logical files
//! - **Reconciliation**: full-replace snapshot written in one transaction,
//!   with stable content-derived ids
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nova_inventory::backend::{LocalBackend, StorageBackend};
//! use nova_inventory::classify::{ClassifierConfig, KeywordClassifier};
//! use nova_inventory::inventory::InventoryCollector;
//! use nova_inventory::reconcile::Reconciler;
//! use nova_inventory::store::JsonFileStore;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> nova_inventory::Result<()> {
//! let backends: Vec<Arc<dyn StorageBackend>> = vec![Arc::new(LocalBackend::new("local", "."))];
//! let reconciler = Reconciler::new(
//!     InventoryCollector::new(backends, "HCS"),
//!     Arc::new(KeywordClassifier::new(&ClassifierConfig::default())?),
//!     Arc::new(JsonFileStore::new("inventory.json")),
//! );
//!
//! let report = reconciler.run().await?;
//! println!("Processed {} files", report.observations);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod classify;
pub mod cli;
pub mod config;
pub mod dedupe;
pub mod error;
pub mod hash;
pub mod inventory;
pub mod logging;
pub mod reconcile;
pub mod store;

// Re-export commonly used types
pub use backend::StorageBackend;
pub use classify::{Classifier, Sensitivity};
pub use config::InventoryConfig;
pub use error::{Error, Result};
pub use hash::{ContentHash, ContentHasher};
pub use inventory::{FileObservation, InventoryCollector};
pub use reconcile::{Reconciler, RunReport};
pub use store::{InventoryStore, LogicalFile};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
