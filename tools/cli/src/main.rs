//! OmniDrive CLI - one storage pool over many quota-limited providers.
//!
//! Reads a JSON config file naming the providers, builds the aggregation
//! engine, and exposes its operations as subcommands.

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use omnidrive_common::ProviderId;
use omnidrive_engine::{Aggregator, BackupSource};
use omnidrive_provider::SearchOptions;

mod config;

use config::PoolConfig;

#[derive(Parser)]
#[command(name = "omnidrive")]
#[command(about = "OmniDrive - multi-provider storage aggregation")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Path to the config file (default: platform config dir).
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured providers.
    Providers,

    /// Show aggregate quota across all providers.
    Quota,

    /// List the unified catalog.
    List {
        /// Restrict to one provider.
        #[arg(short, long)]
        provider: Option<String>,
    },

    /// Search files by name across all providers.
    Search {
        /// Substring to look for.
        query: String,

        /// Restrict to one provider.
        #[arg(short, long)]
        provider: Option<String>,

        /// Maximum number of hits per provider.
        #[arg(short, long)]
        max: Option<usize>,
    },

    /// Upload a file into the pool.
    Upload {
        /// Source file on disk.
        source: PathBuf,

        /// Explicit target provider (otherwise the placement strategy decides).
        #[arg(short, long)]
        provider: Option<String>,

        /// MIME type to store the file with.
        #[arg(short, long, default_value = "application/octet-stream")]
        mime: String,
    },

    /// Back up an existing pool file to additional providers.
    Backup {
        /// Provider currently holding the file.
        #[arg(short, long)]
        source: String,

        /// Native file id on the source provider.
        #[arg(short, long)]
        file_id: String,

        /// Target providers to replicate to.
        #[arg(short, long, required = true, num_args = 1..)]
        targets: Vec<String>,
    },

    /// Move files off providers above the utilization threshold.
    Rebalance {
        /// Threshold override in percent (default from config, 80).
        #[arg(short, long)]
        threshold: Option<f64>,
    },

    /// Download a file from one provider.
    Download {
        /// Provider holding the file.
        #[arg(short, long)]
        provider: String,

        /// Native file id.
        #[arg(short, long)]
        file_id: String,

        /// Destination path on disk.
        #[arg(short, long)]
        dest: PathBuf,
    },

    /// Delete a file on one provider.
    Delete {
        #[arg(short, long)]
        provider: String,

        #[arg(short, long)]
        file_id: String,
    },

    /// Create a folder on one provider.
    Mkdir {
        #[arg(short, long)]
        provider: String,

        /// Folder name.
        name: String,

        /// Parent folder id (root if omitted).
        #[arg(long)]
        parent: Option<String>,
    },

    /// Move a file to a new parent folder on one provider.
    Move {
        #[arg(short, long)]
        provider: String,

        #[arg(short, long)]
        file_id: String,

        /// New parent folder id.
        #[arg(long)]
        parent: String,
    },

    /// Rename a file on one provider (download, re-upload, delete).
    Rename {
        #[arg(short, long)]
        provider: String,

        #[arg(short, long)]
        file_id: String,

        /// New file name.
        name: String,
    },
}

fn pid(s: &str) -> Result<ProviderId> {
    ProviderId::new(s).map_err(Into::into)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(aggregator: Aggregator, command: Commands) -> Result<()> {
    match command {
        Commands::Providers => {
            for id in aggregator.provider_ids().await {
                println!("{}", id);
            }
        }

        Commands::Quota => {
            let report = aggregator.quota().await;
            print_json(&report)?;
        }

        Commands::List { provider } => {
            let filter = provider.as_deref().map(pid).transpose()?;
            let report = aggregator.list_all(filter.as_ref()).await?;
            print_json(&report)?;
        }

        Commands::Search {
            query,
            provider,
            max,
        } => {
            let filter = provider.as_deref().map(pid).transpose()?;
            let options = SearchOptions {
                max_results: max,
                mime_type: None,
            };
            let report = aggregator.search(&query, &options, filter.as_ref()).await?;
            print_json(&report)?;
        }

        Commands::Upload {
            source,
            provider,
            mime,
        } => {
            let data = tokio::fs::read(&source)
                .await
                .with_context(|| format!("Cannot read {}", source.display()))?;
            let name = source
                .file_name()
                .context("Source path has no file name")?
                .to_string_lossy()
                .to_string();
            let preferred = provider.as_deref().map(pid).transpose()?;

            let receipt = aggregator
                .upload(Bytes::from(data), &name, &mime, preferred.as_ref())
                .await?;
            print_json(&receipt)?;
        }

        Commands::Backup {
            source,
            file_id,
            targets,
        } => {
            let targets: Vec<ProviderId> = targets
                .iter()
                .map(|t| pid(t))
                .collect::<Result<_>>()?;
            let outcomes = aggregator
                .backup(
                    BackupSource::Existing {
                        provider: pid(&source)?,
                        file_id,
                    },
                    &targets,
                )
                .await?;

            let succeeded = outcomes.iter().filter(|o| o.success).count();
            print_json(&outcomes)?;
            eprintln!("Backed up to {} of {} targets", succeeded, outcomes.len());
        }

        Commands::Rebalance { threshold } => {
            let report = aggregator.rebalance(threshold).await?;
            print_json(&report)?;
        }

        Commands::Download {
            provider,
            file_id,
            dest,
        } => {
            let data = aggregator.download(&pid(&provider)?, &file_id).await?;
            tokio::fs::write(&dest, &data)
                .await
                .with_context(|| format!("Cannot write {}", dest.display()))?;
            eprintln!("Wrote {} bytes to {}", data.len(), dest.display());
        }

        Commands::Delete { provider, file_id } => {
            let deleted = aggregator.delete_file(&pid(&provider)?, &file_id).await?;
            if !deleted {
                eprintln!("File {} was already absent", file_id);
            }
        }

        Commands::Mkdir {
            provider,
            name,
            parent,
        } => {
            let folder_id = aggregator
                .create_folder(&pid(&provider)?, &name, parent.as_deref())
                .await?;
            println!("{}", folder_id);
        }

        Commands::Move {
            provider,
            file_id,
            parent,
        } => {
            let moved = aggregator
                .move_file(&pid(&provider)?, &file_id, &parent)
                .await?;
            if !moved {
                anyhow::bail!("File or destination folder not found");
            }
        }

        Commands::Rename {
            provider,
            file_id,
            name,
        } => {
            let uploaded = aggregator
                .rename_file(&pid(&provider)?, &file_id, &name)
                .await?;
            print_json(&uploaded)?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = match cli.config {
        Some(path) => path,
        None => PoolConfig::default_path()?,
    };
    let config = PoolConfig::load(&config_path)?;
    let aggregator = config.build_aggregator().await?;

    run(aggregator, cli.command).await
}
