//! nova-inventory - Multi-backend file inventory
//!
//! Main binary entry point for the command-line interface.

use anyhow::Result;
use clap::Parser;
use nova_inventory::cli::{self, Cli, Commands};
use nova_inventory::logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.log_file {
        Some(path) => logging::init_file_logging(path, cli.verbose)?,
        None => logging::init_logging(cli.verbose)?,
    }

    let config = cli::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Sync(args) => cli::sync::run(args, &config).await?,
        Commands::Files(args) => cli::files::run(args, &config).await?,
        Commands::Scan(args) => cli::scan::run(args, &config).await?,
    }

    Ok(())
}
