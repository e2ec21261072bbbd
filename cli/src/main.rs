//! Worklog Sync CLI - export, inspect, import and undo encrypted snapshots.
//!
//! The record store is a directory of JSON files (see [`json_store`]); the
//! container format and merge rules come from the `worklog-sync` engine.

mod commands;
mod config;
mod error;
mod json_store;

use crate::config::Config;
use crate::error::CliError;
use crate::json_store::JsonDirStore;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use worklog_sync::{Catalog, ImportMode, PassphraseCipher, SyncEngine};

#[derive(Parser)]
#[command(name = "worklog-sync")]
#[command(about = "Encrypted export, import and merge of Worklog data")]
#[command(version)]
struct Cli {
    /// Data directory (overrides WORKLOG_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Container password (overrides WORKLOG_SYNC_PASSWORD)
    #[arg(long, global = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt the store into a container file
    Export {
        /// Output file or directory
        #[arg(long, default_value = ".")]
        out: PathBuf,
        /// Include sensitive collections such as wellbeing
        #[arg(long, default_value_t = false)]
        include_sensitive: bool,
    },
    /// Decrypt a container and show what it holds, without importing
    Inspect {
        /// Container file
        file: PathBuf,
    },
    /// Import a container into the store
    Import {
        /// Container file
        file: PathBuf,
        /// merge or replace
        #[arg(long, default_value = "merge")]
        mode: ImportMode,
        /// Write the pre-import state here so it can be undone
        #[arg(long)]
        undo_file: Option<PathBuf>,
    },
    /// Restore the state saved by `import --undo-file`
    Undo {
        /// Safety snapshot file
        #[arg(long)]
        from: PathBuf,
    },
    /// Print everything the store holds
    Dump,
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing; stdout is reserved for command output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "worklog_sync=info,worklog_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    let password = cli.password.or(config.password.take());
    let require_password = || password.as_deref().ok_or(CliError::MissingPassword);

    let catalog = Catalog::default();
    let store = JsonDirStore::open(&config.data_dir, &catalog)
        .await
        .map_err(CliError::from)?;
    tracing::debug!(data_dir = %store.root().display(), "store opened");

    let sync_config = config.sync_config();
    let cipher = PassphraseCipher::new(sync_config.kdf);
    let engine = SyncEngine::new(store, cipher, catalog, sync_config);

    match cli.command {
        Commands::Export {
            out,
            include_sensitive,
        } => {
            let now = chrono::Local::now().naive_local();
            let report =
                commands::export(&engine, require_password()?, &out, include_sensitive, now)
                    .await?;
            print_json(&report)?;
        }
        Commands::Inspect { file } => {
            let summary = commands::inspect(&engine, require_password()?, &file).await?;
            print_json(&summary)?;
        }
        Commands::Import {
            file,
            mode,
            undo_file,
        } => {
            let report = commands::import(
                &engine,
                require_password()?,
                &file,
                mode,
                undo_file.as_deref(),
            )
            .await?;
            print_json(&report)?;
        }
        Commands::Undo { from } => {
            let report = commands::undo(&engine, &from).await?;
            print_json(&report)?;
        }
        Commands::Dump => {
            let dump = commands::dump(&engine).await?;
            print_json(&dump)?;
        }
    }

    Ok(())
}
