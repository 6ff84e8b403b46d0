//! Command-line interface: argument parsing and the `sync` entrypoint.
//!
//! All business logic lives in the library modules; this is CLI glue
//! only. The async [`run`] function is separate from `main` so
//! integration tests can drive the CLI programmatically.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::client::GalleryClient;
use crate::load_config::load_config;
use crate::sync::synchronise;

/// Mirror a local media tree onto a remote gallery account.
#[derive(Parser)]
#[clap(
    name = "gallery-sync",
    version,
    about = "One-way sync of a local media tree into remote gallery collections"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upload everything new under the configured root, then apply the
    /// per-directory disposal policy.
    Sync {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Log what would happen without uploading or touching disk
        #[clap(long)]
        dry_run: bool,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Sync { config, dry_run } => {
            let mut config = load_config(config)?;
            config.dry_run = dry_run;

            tracing::info!(command = "sync", "Starting synchronisation");
            let client = GalleryClient::new(&config)
                .map_err(|e| anyhow::anyhow!("Failed to construct gallery client: {e}"))?;

            match synchronise(&config, &client).await {
                Ok(report) => {
                    tracing::info!(command = "sync", ?report, "Synchronisation complete");
                    for owner in &report.owners {
                        println!(
                            "{}: uploaded {}, already present {}, skipped {}, \
                             collections created {}, tag merges {}",
                            owner.owner,
                            owner.uploaded,
                            owner.already_present,
                            owner.skipped,
                            owner.collections_created,
                            owner.tags_merged,
                        );
                        for failure in &owner.failures {
                            eprintln!("  [failed] {failure}");
                        }
                    }
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(command = "sync", error = %e, "Synchronisation failed");
                    Err(e.into())
                }
            }
        }
    }
}
