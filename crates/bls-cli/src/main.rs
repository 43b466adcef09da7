use std::sync::Arc;

use anyhow::Result;
use bls_storage::{connect_pool, HttpFetcher};
use bls_sync::{run_migrations, run_sync, SyncConfig, SyncContext};
use bls_web::AppState;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "bls-cli")]
#[command(about = "Broker listing sync command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one sync pass against the configured target URL
    Sync,
    /// Start the HTTP trigger endpoint
    Serve,
    /// Apply pending database migrations
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = SyncConfig::from_env();
    let pool = connect_pool(&config.database_url).await?;

    match cli.command.unwrap_or(Commands::Sync) {
        Commands::Sync => {
            let ctx = SyncContext {
                config,
                pool,
                fetcher: Arc::new(HttpFetcher::new()?),
            };
            let stats = run_sync(&ctx).await;
            println!(
                "sync complete: processed={} upserted={} broker={}",
                stats.processed,
                stats.upserted,
                stats
                    .broker_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "unresolved".to_string()),
            );
        }
        Commands::Serve => {
            let ctx = SyncContext {
                config,
                pool,
                fetcher: Arc::new(HttpFetcher::new()?),
            };
            bls_web::serve(AppState { ctx }).await?;
        }
        Commands::Migrate => {
            run_migrations(&pool).await?;
            println!("migrations applied");
        }
    }

    Ok(())
}
