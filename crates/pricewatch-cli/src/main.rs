use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pricewatch_storage::PgStore;
use pricewatch_sync::{maybe_build_scheduler, pipeline_from_env, query, SyncConfig};
use tracing::info;
use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "pricewatch")]
#[command(about = "Retail catalog reconciler and price comparison API")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run every enabled source once.
    Sync,
    /// Apply pending database migrations.
    Migrate,
    /// Serve the JSON catalog API.
    Serve,
    /// Run the cron scheduler until interrupted.
    Schedule,
    /// Print the comparison view for one product.
    Compare { id: Uuid },
}

fn init_tracing(default_filter: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("info")?;
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Sync) {
        Commands::Sync => {
            let summary = pricewatch_sync::run_sync_once_from_env().await?;
            println!(
                "sync complete: run_id={} sources={} updated={} inserted={} failed={} report={}",
                summary.run_id,
                summary.enabled_sources,
                summary.updated(),
                summary.inserted(),
                summary.failed.len(),
                summary.report_path.as_deref().unwrap_or("-")
            );
        }
        Commands::Migrate => {
            let config = SyncConfig::from_env();
            let store = PgStore::connect(&config.database_url).await?;
            store.migrate().await?;
            println!("migrations applied");
        }
        Commands::Serve => pricewatch_web::serve_from_env().await?,
        Commands::Schedule => {
            let pipeline = Arc::new(pipeline_from_env().await?);
            let Some(sched) = maybe_build_scheduler(pipeline.clone()).await? else {
                anyhow::bail!("scheduler disabled; set PRICEWATCH_SCHEDULER_ENABLED=true");
            };
            sched.start().await.context("starting scheduler")?;
            info!(cron = %pipeline.config().sync_cron, "scheduler running");
            tokio::signal::ctrl_c().await?;
            info!("shutting down scheduler");
        }
        Commands::Compare { id } => {
            let config = SyncConfig::from_env();
            let store = PgStore::connect(&config.database_url).await?;
            match query::compare_product(&store, id).await? {
                Some(cmp) => println!("{}", serde_json::to_string_pretty(&cmp)?),
                None => anyhow::bail!("product {id} not found"),
            }
        }
    }

    Ok(())
}
