//! Sync command: run reconciliation now.

use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::InventoryConfig;
use crate::Result;

/// Arguments for the sync command
#[derive(Args)]
pub struct SyncArgs {
    /// Print the full run report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Run the sync command
pub async fn run(args: SyncArgs, config: &InventoryConfig) -> Result<()> {
    let reconciler = super::build_reconciler(config)?;

    // Ctrl-C aborts the run as long as the store has not been touched yet.
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling reconciliation");
            on_signal.cancel();
        }
    });

    let report = reconciler.run_with_cancel(&cancel).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Reconciliation completed successfully!");
    println!("  Files processed: {}", report.observations);
    println!("  Logical files: {}", report.logical_files);
    if report.fallback_hashes > 0 {
        println!("  Files hashed by path (content unreadable): {}", report.fallback_hashes);
    }
    if !report.unreachable_backends.is_empty() {
        println!("  Unreachable backends: {}", report.unreachable_backends.join(", "));
    }

    Ok(())
}
