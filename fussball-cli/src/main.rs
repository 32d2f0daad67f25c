//! fussball CLI
//!
//! Runs the caching read API over fussball.de and inspects cache snapshots.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use colored::*;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use fussball_api::{ApiConfig, ApiServer, AppState};
use fussball_cache::{CacheConfig, PersistenceManager};

/// fussball - self-refreshing cache API for fussball.de
#[derive(Parser)]
#[command(name = "fussball")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8000")]
        port: u16,
        /// Bind address
        #[arg(short, long, default_value = "0.0.0.0")]
        bind: String,
    },

    /// Print the entries of a cache snapshot
    Inspect {
        /// Snapshot file (defaults to the configured one)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // Initialize logging
    let fallback = if cli.verbose {
        "debug".to_string()
    } else {
        std::env::var("LOG_LEVEL")
            .map(|level| level.to_lowercase())
            .unwrap_or_else(|_| "info".into())
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Serve { port, bind } => cmd_serve(port, &bind).await,
        Commands::Inspect { file } => cmd_inspect(file).await,
    }
}

/// Run the API server until Ctrl-C
async fn cmd_serve(port: u16, bind: &str) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", bind, port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", bind, port))?;

    let config = ApiConfig::from_env()
        .context("Invalid configuration")?
        .with_bind(addr);
    let snapshot_interval = config.cache.snapshot_interval;
    let retention = config.cache.stale_retention;

    let state = Arc::new(AppState::new(config).context("Failed to build server state")?);

    println!("{}", "Starting fussball API server...".cyan().bold());
    println!("   {} http://{}", "Listening on:".green(), addr);

    if let Some(persistence) = &state.persistence {
        let report = persistence.restore_into(state.store()).await;
        println!(
            "   {} {} entries ({} stale) from {}",
            "Restored:".green(),
            report.loaded,
            report.stale,
            persistence.path().display()
        );
    } else {
        println!("   {} memory only", "Persistence:".yellow());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut workers = Vec::new();

    match &state.scheduler {
        Some(scheduler) => {
            println!("   {} club {}", "Prewarming:".green(), scheduler.spec().club_id);
            workers.push(tokio::spawn(scheduler.clone().run(shutdown_rx.clone())));
        }
        None => info!("Cache prewarming disabled; set PREWARM_CLUB_ID to enable it"),
    }

    let periodic = match (&state.persistence, snapshot_interval) {
        (Some(persistence), Some(interval)) => {
            workers.push(tokio::spawn(persistence.clone().run_periodic(
                state.store().clone(),
                interval,
                retention,
                shutdown_rx.clone(),
            )));
            true
        }
        _ => false,
    };

    let server = ApiServer::new(state.clone());
    server
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
            info!("Shutdown requested");
        })
        .await
        .context("Server error")?;

    let _ = shutdown_tx.send(true);
    for worker in workers {
        if let Err(e) = worker.await {
            warn!(error = %e, "Background task ended abnormally");
        }
    }

    // The periodic writer saves once more on its own way out.
    if let (Some(persistence), false) = (&state.persistence, periodic) {
        persistence
            .save_store(state.store())
            .await
            .context("Failed to write final snapshot")?;
    }

    println!("{}", "Server stopped.".green().bold());
    Ok(())
}

/// Print the entries of a snapshot file
async fn cmd_inspect(file: Option<PathBuf>) -> Result<()> {
    let path = match file {
        Some(path) => path,
        None => CacheConfig::from_env()
            .context("Invalid configuration")?
            .snapshot_path
            .context("Persistence is disabled; pass --file")?,
    };

    let snapshot = PersistenceManager::new(&path)
        .try_load()
        .await
        .with_context(|| format!("Failed to read snapshot {}", path.display()))?;

    println!("{} {}", "Snapshot:".cyan().bold(), path.display());

    let now = Utc::now();
    let mut stale = 0;
    for (key, entry) in &snapshot.entries {
        let freshness = entry.freshness(now);
        let label = if freshness.is_stale() {
            stale += 1;
            "stale".yellow()
        } else {
            "fresh".green()
        };
        println!(
            "   {:<6} {:<16} {:<34} fetched {}  ttl {}s",
            label,
            key.kind.as_str(),
            key.id,
            entry.fetched_at.format("%Y-%m-%d %H:%M:%S"),
            entry.ttl.as_secs()
        );
    }

    println!(
        "\n{} {} entries, {} stale",
        "Total:".green().bold(),
        snapshot.len(),
        stale
    );
    Ok(())
}
