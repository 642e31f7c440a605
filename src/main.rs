//! CLI entry point. Subcommands: `serve` boots every scheduler as
//! background tasks; `backfill` runs historical discovery once and
//! exits; `migrate` runs pending migrations and exits; `stats` prints
//! `RelationalStore::stats()` as JSON and exits.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use newsfeed_core::config::PipelineConfig;
use newsfeed_pipeline_cli::Runtime;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Parser)]
#[command(name = "newsfeed", about = "News ingestion pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Boot every scheduler and run until SIGTERM/SIGINT.
    Serve,
    /// Run historical link discovery once for a date range and exit.
    Backfill {
        #[arg(long)]
        source: String,
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
    },
    /// Run pending database migrations and exit.
    Migrate,
    /// Print `RelationalStore::stats()` as JSON and exit.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let config = PipelineConfig::from_env()?;

    match cli.command {
        Command::Migrate => {
            let runtime = Runtime::bootstrap(config).await?;
            runtime.database.migrate().await?;
            tracing::info!("migrations applied");
        }
        Command::Stats => {
            let runtime = Runtime::bootstrap(config).await?;
            let stats = runtime.store.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Backfill { source, from, to } => {
            let runtime = Runtime::bootstrap(config).await?;
            let collector = runtime.historical_link_collector(&source)?;
            collector.run(from, to).await?;
        }
        Command::Serve => {
            let runtime = Runtime::bootstrap(config).await?;
            serve(runtime).await?;
        }
    }

    Ok(())
}

async fn serve(runtime: Runtime) -> anyhow::Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut handles = Vec::new();
    for collector in runtime.fresh_link_collectors() {
        handles.push(Arc::new(collector).spawn(shutdown_rx.clone()));
    }
    handles.push(Arc::new(runtime.dispatcher()).spawn(shutdown_rx.clone()));
    handles.push(Arc::new(runtime.embedding_scheduler().await?).spawn(shutdown_rx.clone()));

    tracing::info!(workers = handles.len(), "pipeline running, awaiting shutdown signal");
    wait_for_shutdown_signal().await;

    tracing::info!("shutdown signal received, stopping schedulers");
    shutdown_tx.send(true).ok();

    let grace = tokio::time::timeout(std::time::Duration::from_secs(10), futures::future::join_all(handles));
    if grace.await.is_err() {
        tracing::warn!("grace period elapsed before all workers finished, exiting anyway");
    }

    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();
}
