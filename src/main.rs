// SPDX-License-Identifier: GPL-3.0-only
mod api;
mod backup;
mod config;
mod error;
mod logging;
mod snapshot;
mod store;
mod sync;

#[cfg(test)]
mod test_helpers;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use api::HttpServer;
use backup::{BackupClient, HttpBackupClient};
use config::Config;
use logging::setup_logging;
use store::{LocalStore, SqliteStore};
use sync::SyncOrchestrator;

#[derive(Parser)]
#[command(name = "garage-sync")]
#[command(version, about = "Local-first garage records store with remote backup", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the local API and the automatic sync timer (default)
    Serve,

    /// Write a dated snapshot file of the local store
    Export {
        /// Target directory (defaults to export_dir from the config)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Replace the local store with the contents of a snapshot file
    Import {
        /// Snapshot file to read
        file: PathBuf,
    },

    /// Copy per-collection JSON files into an empty store
    #[command(name = "migrate-legacy")]
    MigrateLegacy {
        /// Directory holding <collection>.json files
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    setup_logging(&config.log_level, config.log_json)?;

    info!("Starting GarageSyncDaemon v{}", env!("CARGO_PKG_VERSION"));

    // Initialize local store
    if let Some(parent) = config.store_db_path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let store: Arc<dyn LocalStore> = Arc::new(SqliteStore::new(&config.store_db_path).await?);
    info!("Store initialized at {}", config.store_db_path.display());

    // Initialize backup client
    let http_backup = HttpBackupClient::new(
        &config.backup_api_url,
        config.backup_api_key.clone(),
        config.backup_timeout(),
    )?;
    info!(endpoint = %http_backup.endpoint(), "Backup client initialized");
    let backup: Arc<dyn BackupClient> = Arc::new(http_backup);

    let orchestrator = Arc::new(SyncOrchestrator::new(
        Arc::clone(&store),
        backup,
        config.sync_interval(),
    ));

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config, orchestrator).await,
        Commands::Export { out } => {
            let dir = out.unwrap_or_else(|| config.export_dir.clone());
            let path = orchestrator
                .export_to_file(&dir, &config.export_file_prefix)
                .await?;
            info!(path = %path.display(), "Export written");
            Ok(())
        }
        Commands::Import { file } => {
            let summary = orchestrator.import_from_file(&file).await?;
            info!(records = summary.records_written, file = %file.display(), "Import complete");
            Ok(())
        }
        Commands::MigrateLegacy { dir } => {
            let report = store.migrate_from_legacy(&dir).await?;
            if report.skipped {
                warn!(dir = %dir.display(), "Store already holds data, legacy migration skipped");
            } else {
                for (name, count) in &report.migrated {
                    info!(collection = %name, records = count, "Migrated collection");
                }
            }
            Ok(())
        }
    }
}

async fn serve(config: Config, orchestrator: Arc<SyncOrchestrator>) -> anyhow::Result<()> {
    if config.auto_sync_enabled {
        orchestrator.toggle_sync(true).await;
    }

    // Start HTTP server
    let http_server = HttpServer::new(
        Arc::clone(&orchestrator),
        config.export_file_prefix.clone(),
        config.local_api_bind,
    );
    let http_task = tokio::spawn(async move {
        if let Err(e) = http_server.serve().await {
            error!(error = %e, "HTTP server error");
        }
    });

    info!("All services started. Waiting for shutdown signal...");

    // Wait for shutdown signal
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received shutdown signal (Ctrl+C)");
        }
        Err(err) => {
            error!(error = %err, "Unable to listen for shutdown signal");
        }
    }

    info!("Initiating graceful shutdown...");

    orchestrator.toggle_sync(false).await;
    http_task.abort();

    info!("Shutdown complete");
    Ok(())
}
