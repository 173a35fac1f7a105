//! Files command: read-only listing of the persisted inventory.

use clap::Args;

use crate::config::InventoryConfig;
use crate::classify::Sensitivity;
use crate::store::{InventoryStore, JsonFileStore};
use crate::Result;

/// Arguments for the files command
#[derive(Args)]
pub struct FilesArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Only show files labelled sensitive
    #[arg(long)]
    pub sensitive_only: bool,
}

/// Run the files command
pub async fn run(args: FilesArgs, config: &InventoryConfig) -> Result<()> {
    let store = JsonFileStore::new(&config.store_path);
    let mut files = store.load()?.views();

    if args.sensitive_only {
        files.retain(|f| f.file.sensitivity == Sensitivity::Sensitive);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&files)?);
        return Ok(());
    }

    if files.is_empty() {
        println!("Inventory is empty. Run `nova-inventory sync` first.");
        return Ok(());
    }

    println!("{} logical files:", files.len());
    for view in &files {
        let file = &view.file;
        println!(
            "  {} [{}] {} bytes, backups: {}",
            file.name, file.sensitivity, file.size_bytes, file.backup_count
        );
        println!("    id: {}", file.id);
        println!("    path: {}", file.path);
        println!("    locations: {}", view.locations.join(", "));
    }

    Ok(())
}
