//! Command-line interface for nova-inventory.
//!
//! Thin front door over the reconciliation engine: run a reconciliation,
//! list the persisted inventory, or dump a raw scan.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::classify::KeywordClassifier;
use crate::config::InventoryConfig;
use crate::inventory::InventoryCollector;
use crate::reconcile::Reconciler;
use crate::store::JsonFileStore;
use crate::Result;

pub mod files;
pub mod scan;
pub mod sync;

/// nova-inventory - Multi-backend file inventory and deduplication
#[derive(Parser)]
#[command(name = "nova-inventory")]
#[command(about = "Inventory files across storage backends and count their backups")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Config file (defaults to the user config dir, then the environment)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run a full reconciliation now
    Sync(sync::SyncArgs),
    /// List the persisted logical files and their locations
    Files(files::FilesArgs),
    /// Scan every backend and print raw observations without storing them
    Scan(scan::ScanArgs),
}

/// Resolve configuration: explicit file, then the default file, then the
/// environment. Environment credentials always win.
pub fn load_config(path: Option<&Path>) -> Result<InventoryConfig> {
    let mut config = match path {
        Some(path) => InventoryConfig::load(path)?,
        None => {
            let default_path = InventoryConfig::default_path()?;
            if default_path.exists() {
                InventoryConfig::load(&default_path)?
            } else {
                InventoryConfig::from_env()
            }
        }
    };
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

/// Wire the engine from configuration
pub fn build_reconciler(config: &InventoryConfig) -> Result<Reconciler> {
    let collector = InventoryCollector::new(config.build_backends()?, config.base_folder.clone());
    let classifier = KeywordClassifier::new(&config.classifier)?;
    let store = JsonFileStore::new(&config.store_path);

    Ok(Reconciler::new(
        collector,
        Arc::new(classifier),
        Arc::new(store),
    ))
}
