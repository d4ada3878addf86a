use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::db::{self, StatStore};
use crate::models::{ExportReport, RunReport, SyncOutcome};
use crate::services::exporter::DEFAULT_MIN_SNAPS;
use crate::services::{NflverseFetcher, StaticExporter, SyncOptions, WeeklySync, WriteMode};
use crate::utils::{season_today, SeasonPolicy};

pub const DEFAULT_EXPORT_DIR: &str = "src/lib/data";

#[derive(Debug, Clone, Default)]
pub struct SyncArgs {
    pub season: Option<i32>,
    pub policy: SeasonPolicy,
    pub annotate_results: bool,
    pub insert: bool,
    pub batch_size: Option<usize>,
}

impl SyncArgs {
    pub fn defaults() -> Self {
        Self { annotate_results: true, ..Self::default() }
    }
}

fn resolve_season(season: Option<i32>, policy: SeasonPolicy) -> i32 {
    season.unwrap_or_else(|| season_today(policy))
}

pub async fn run_sync(args: SyncArgs) -> Result<()> {
    let config = Config::from_env().context("cannot start sync")?;
    let season = resolve_season(args.season, args.policy);

    println!("🏈 Syncing NFL weekly stats for the {} season...", season);

    let source = Arc::new(NflverseFetcher::new()?);
    let store: Option<Arc<dyn StatStore>> = match db::connect(&config).await {
        Ok(store) => Some(store),
        Err(e) => {
            tracing::warn!("Store unavailable: {}", e);
            None
        }
    };

    let mut options = SyncOptions::from_config(&config);
    options.annotate_results = args.annotate_results;
    if args.insert {
        options.mode = WriteMode::Insert;
    }
    if let Some(batch_size) = args.batch_size {
        anyhow::ensure!(batch_size > 0, "batch size must be greater than zero");
        options.batch_size = batch_size;
    }

    let report = WeeklySync::new(source, store, options)
        .run(season)
        .await
        .with_context(|| format!("sync of season {} failed", season))?;

    print_run(&report);
    Ok(())
}

fn print_run(report: &RunReport) {
    println!("📥 Fetched {} weekly records for the {} season (run {})", report.fetched, report.season, report.run_id);
    if !report.annotated {
        println!("⚠️  Game results were not added");
    }
    println!("💾 Backup: {}", report.backup.display());

    match &report.outcome {
        SyncOutcome::Synced(sync) => {
            println!(
                "✅ Upserted {} of {} records in {} batches",
                sync.upserted, sync.attempted, sync.batches
            );
            if !sync.failed_batches.is_empty() {
                println!("❌ Failed batches: {:?}", sync.failed_batches);
            }
        }
        SyncOutcome::Fallback { path, reason } => {
            println!("⚠️  Store unavailable ({}). Data saved to {}", reason, path.display());
        }
    }
}

pub async fn run_export(season: Option<i32>, policy: SeasonPolicy, out_dir: PathBuf, min_snaps: Option<i64>) -> Result<()> {
    let season = resolve_season(season, policy);
    println!("📦 Exporting static NFL data for the {} season to {}...", season, out_dir.display());

    let fetcher = NflverseFetcher::new()?;
    let exporter = StaticExporter {
        out_dir,
        min_snaps: min_snaps.unwrap_or(DEFAULT_MIN_SNAPS),
    };
    let report = exporter
        .export(&fetcher, season)
        .await
        .context("static export failed")?;

    print_export(&report);
    Ok(())
}

fn print_export(report: &ExportReport) {
    let count = |n: Option<usize>| n.map_or("skipped".to_string(), |n| format!("{} records", n));
    println!("   Teams:    {}", count(report.teams));
    println!("   Rosters:  {}", count(report.rosters));
    println!("   Schedule: {}", count(report.schedule));
    if report.rosters.is_some() && !report.snap_filter_applied {
        println!("⚠️  Snap counts unavailable; rosters include every offensive player");
    }
    for file in &report.files {
        println!("✅ {}", file.display());
    }
}

pub fn print_season(policy: SeasonPolicy) {
    println!("{}", season_today(policy));
}

pub async fn serve(port: u16) -> Result<()> {
    let config = Config::from_env().context("cannot start API server")?;
    crate::api::serve(&config, port).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_season_wins() {
        assert_eq!(resolve_season(Some(2019), SeasonPolicy::Kickoff), 2019);
    }

    #[test]
    fn test_default_args_annotate() {
        let args = SyncArgs::defaults();
        assert!(args.annotate_results);
        assert!(!args.insert);
        assert_eq!(args.policy, SeasonPolicy::September);
    }
}
