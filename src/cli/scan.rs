//! Scan command: collect observations from every backend without
//! touching the stored inventory.

use clap::Args;
use std::path::PathBuf;

use crate::config::InventoryConfig;
use crate::dedupe::group_by_hash;
use crate::inventory::InventoryCollector;
use crate::Result;

/// Arguments for the scan command
#[derive(Args)]
pub struct ScanArgs {
    /// Write observations to a JSON file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Show duplicate groups found by content hash
    #[arg(long)]
    pub find_duplicates: bool,
}

/// Run the scan command
pub async fn run(args: ScanArgs, config: &InventoryConfig) -> Result<()> {
    let collector = InventoryCollector::new(config.build_backends()?, config.base_folder.clone());
    let collection = collector.collect().await;

    println!(
        "Scan completed: {} files across {} backends",
        collection.observations.len(),
        config.backends.len()
    );
    for backend in &collection.unreachable_backends {
        println!("  Unreachable: {}", backend);
    }

    if let Some(output_path) = &args.output {
        println!("Writing observations to: {}", output_path.display());
        let json_output = serde_json::to_string_pretty(&collection)?;
        tokio::fs::write(output_path, json_output).await?;
    } else if !args.find_duplicates {
        for observation in &collection.observations {
            println!(
                "  [{}] {} ({} bytes) {}",
                observation.backend_name,
                observation.path,
                observation.size_bytes,
                observation.content_hash
            );
        }
    }

    if args.find_duplicates {
        let groups = group_by_hash(collection.observations);
        let duplicates: Vec<_> = groups.iter().filter(|g| g.observations.len() > 1).collect();

        if duplicates.is_empty() {
            println!("No duplicate files found.");
        } else {
            println!("Found {} files with copies:", duplicates.len());
            for group in duplicates {
                println!("  {} ({} backups)", group.representative().name, group.backup_count());
                for observation in &group.observations {
                    println!("    - [{}] {}", observation.backend_name, observation.path);
                }
            }
        }
    }

    Ok(())
}
