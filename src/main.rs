mod api;
mod cli;
mod config;
mod db;
mod error;
mod models;
mod services;
mod utils;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::utils::{resolve_policy, SeasonPolicyArg};

#[derive(Parser)]
#[command(name = "gridsync")]
#[command(about = "Keeps an NFL stats store and static data files in sync with nflverse")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch weekly player stats and upsert them into the store
    Sync {
        /// Season to sync (defaults to the current one)
        #[arg(short, long)]
        season: Option<i32>,
        #[arg(long, value_enum, default_value = "september")]
        season_policy: SeasonPolicyArg,
        /// Custom season start as MM-DD, overrides --season-policy
        #[arg(long)]
        season_boundary: Option<String>,
        /// Skip the schedule join that adds game results
        #[arg(long)]
        no_results: bool,
        /// Plain inserts instead of upserts
        #[arg(long)]
        insert: bool,
        #[arg(short, long)]
        batch_size: Option<usize>,
    },
    /// Write teams, rosters and schedule as JavaScript modules
    Export {
        #[arg(short, long)]
        season: Option<i32>,
        #[arg(long, value_enum, default_value = "september")]
        season_policy: SeasonPolicyArg,
        /// Custom season start as MM-DD, overrides --season-policy
        #[arg(long)]
        season_boundary: Option<String>,
        #[arg(short, long, default_value = cli::DEFAULT_EXPORT_DIR)]
        out_dir: PathBuf,
        /// Minimum offensive snaps for a rostered player to be exported
        #[arg(long)]
        min_snaps: Option<i64>,
    },
    /// Print the current season
    Season {
        #[arg(long, value_enum, default_value = "september")]
        season_policy: SeasonPolicyArg,
        /// Custom season start as MM-DD, overrides --season-policy
        #[arg(long)]
        season_boundary: Option<String>,
    },
    /// Start the game log API server
    Serve {
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Sync { season, season_policy, season_boundary, no_results, insert, batch_size }) => {
            cli::run_sync(cli::SyncArgs {
                season,
                policy: resolve_policy(season_policy, season_boundary.as_deref())?,
                annotate_results: !no_results,
                insert,
                batch_size,
            })
            .await?;
        }
        Some(Commands::Export { season, season_policy, season_boundary, out_dir, min_snaps }) => {
            let policy = resolve_policy(season_policy, season_boundary.as_deref())?;
            cli::run_export(season, policy, out_dir, min_snaps).await?;
        }
        Some(Commands::Season { season_policy, season_boundary }) => {
            cli::print_season(resolve_policy(season_policy, season_boundary.as_deref())?);
        }
        Some(Commands::Serve { port }) => {
            tracing::info!("Starting gridsync API server on port {}", port);
            cli::serve(port).await?;
        }
        None => {
            // Default to a sync of the current season
            cli::run_sync(cli::SyncArgs::defaults()).await?;
        }
    }

    Ok(())
}
