//! receipt-scan CLI entry point.
//!
//! Inspects and maintains the scan request snapshots kept in the local
//! database.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use receipt_scan::domain::ScanRequest;
use receipt_scan::infra::app_config::{self, ScanConfig};
use receipt_scan::infra::db::Database;
use receipt_scan::infra::snapshot::ScanPersistence;
use receipt_scan::store::{LifecycleAction, reduce};

#[derive(Parser, Debug)]
#[command(name = "receipt-scan")]
#[command(version)]
#[command(about = "Inspect pending receipt scan requests", long_about = None)]
struct Args {
    /// Database file (defaults to the configured or per-user data location)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show a user's pending request as it would be restored
    Status {
        #[arg(short, long)]
        user: String,
        /// Print the restored request as JSON
        #[arg(long)]
        json: bool,
    },

    /// List users with a pending request
    List,

    /// Drop a user's pending request
    Clear {
        #[arg(short, long)]
        user: String,
    },

    /// Print the effective configuration
    Config,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let config = app_config::load_config();

    match args.command {
        Commands::Status { user, json } => status(&open_db(args.db, &config)?, &user, json),
        Commands::List => list(&open_db(args.db, &config)?),
        Commands::Clear { user } => {
            let removed = open_db(args.db, &config)?.snapshot_repo().delete(&user)?;
            if removed == 0 {
                println!("No pending scan for {user}");
            } else {
                println!("Cleared pending scan for {user}");
            }
            Ok(())
        }
        Commands::Config => {
            println!("# {}", app_config::config_path().display());
            print!(
                "{}",
                toml::to_string_pretty(&config).context("serialize config")?
            );
            Ok(())
        }
    }
}

fn open_db(flag: Option<PathBuf>, config: &ScanConfig) -> Result<Database> {
    let path = flag
        .or_else(|| config.database_path.clone())
        .unwrap_or_else(Database::default_path);
    Database::open_at(path)
}

fn status(db: &Database, user: &str, json: bool) -> Result<()> {
    let persistence = ScanPersistence::new(Arc::new(db.snapshot_repo()));
    let Some(snapshot) = persistence.load(user) else {
        println!("No pending scan for {user}");
        return Ok(());
    };
    let restored = reduce(
        &ScanRequest::default(),
        LifecycleAction::Restore(Box::new(snapshot.state)).into(),
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&restored)?);
        return Ok(());
    }

    println!("user:       {user}");
    println!("saved:      {}", snapshot.persisted_at.to_rfc3339());
    println!(
        "request:    {}",
        restored.request_id.as_deref().unwrap_or("-")
    );
    println!("phase:      {}", restored.phase);
    println!("mode:       {}", restored.mode);
    println!("images:     {}", restored.images.len());
    println!("results:    {}", restored.results.len());
    println!(
        "credits:    {} ({} charged)",
        restored.credit_state, restored.credits_charged
    );
    if let Some(progress) = &restored.batch_progress {
        println!(
            "batch:      {}/{} settled, {} failed",
            progress.settled_count(),
            progress.total,
            progress.failed.len()
        );
    }
    if let Some(dialog) = &restored.active_dialog {
        println!("dialog:     {}", dialog.kind());
    }
    if let Some(error) = &restored.error {
        println!("error:      {error}");
    }
    Ok(())
}

fn list(db: &Database) -> Result<()> {
    let snapshots = db.snapshot_repo().list()?;
    if snapshots.is_empty() {
        println!("No pending scans");
        return Ok(());
    }
    for snapshot in snapshots {
        println!(
            "{}\t{}\t{}",
            snapshot.user_id,
            snapshot.phase,
            snapshot.persisted_at.to_rfc3339()
        );
    }
    Ok(())
}
