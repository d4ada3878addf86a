use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::Config;
use crate::db::StatStore;
use crate::error::{Result, SyncError};
use crate::models::{Frame, RunReport, ScheduleRecord, SyncOutcome};
use crate::services::data_fetcher::{acquire, StatsSource};
use crate::services::game_results::GameResults;
use crate::services::normalizer::{normalize, WEEKLY_SCHEMA};
use crate::services::synchronizer::{Synchronizer, WriteMode};

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Join the schedule to derive `game_result` before writing.
    pub annotate_results: bool,
    pub mode: WriteMode,
    pub batch_size: usize,
    pub table: String,
    pub artifact_dir: PathBuf,
}

impl SyncOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            annotate_results: true,
            mode: WriteMode::Upsert,
            batch_size: config.batch_size,
            table: config.table.clone(),
            artifact_dir: config.artifact_dir.clone(),
        }
    }
}

/// `nfl_weekly_{season}_{kind}.csv` under `dir`.
pub fn artifact_path(dir: &Path, season: i32, kind: &str) -> PathBuf {
    dir.join(format!("nfl_weekly_{}_{}.csv", season, kind))
}

/// The weekly stats sync: fetch, annotate, snapshot, normalize, write.
pub struct WeeklySync {
    source: Arc<dyn StatsSource>,
    store: Option<Arc<dyn StatStore>>,
    options: SyncOptions,
}

impl WeeklySync {
    pub fn new(source: Arc<dyn StatsSource>, store: Option<Arc<dyn StatStore>>, options: SyncOptions) -> Self {
        Self { source, store, options }
    }

    pub async fn run(&self, season: i32) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("sync", season, run_id = %run_id);
        self.run_season(season, run_id).instrument(span).await
    }

    async fn run_season(&self, season: i32, run_id: Uuid) -> Result<RunReport> {
        tracing::info!("Fetching NFL weekly data for {} season…", season);

        let mut weekly = acquire("weekly stats", self.source.weekly_stats(season))
            .await
            .ok_or_else(|| SyncError::acquisition("weekly stats", format!("no data for season {}", season)))?;
        weekly
            .validate()
            .map_err(|e| SyncError::acquisition("weekly stats", format!("malformed record set: {}", e)))?;
        tracing::info!("Found {} weekly records", weekly.len());

        let annotated = self.options.annotate_results && self.annotate(&mut weekly, season).await;

        let backup = artifact_path(&self.options.artifact_dir, season, "backup");
        weekly.write_csv_file(&backup)?;
        tracing::info!("Backup saved to {}", backup.display());

        let fetched = weekly.len();
        let report = |outcome| RunReport {
            run_id,
            season,
            fetched,
            annotated,
            backup: backup.clone(),
            outcome,
        };

        let store = match self.reachable_store().await {
            Ok(store) => store,
            Err(reason) => {
                let path = artifact_path(&self.options.artifact_dir, season, "fallback");
                weekly.write_csv_file(&path)?;
                tracing::warn!("Store unavailable ({}); data saved to {}", reason, path.display());
                return Ok(report(SyncOutcome::Fallback { path, reason }));
            }
        };

        let records = normalize(&weekly, WEEKLY_SCHEMA, season)
            .map_err(|e| SyncError::acquisition("weekly stats", format!("record set dropped: {}", e)))?;

        let sync = Synchronizer::new(&self.options.table, self.options.batch_size, self.options.mode);
        let summary = sync.apply(store.as_ref(), &records).await;

        Ok(report(SyncOutcome::Synced(summary)))
    }

    /// Adds `game_result` from the season schedule. Returns false, leaving
    /// the frame untouched, when the schedule cannot be used.
    async fn annotate(&self, weekly: &mut Frame, season: i32) -> bool {
        tracing::info!("Fetching schedule data for game results…");
        let Some(schedule) = acquire("schedule", self.source.schedules(season)).await else {
            tracing::warn!("No schedule data; continuing without game results");
            return false;
        };

        let mut games = match ScheduleRecord::from_frame(&schedule) {
            Ok(games) => games,
            Err(e) => {
                tracing::warn!("Unusable schedule ({}); continuing without game results", e);
                return false;
            }
        };

        games.retain(|game| game.season == 0 || game.season == i64::from(season));

        let results = GameResults::from_schedule(&games);
        tracing::info!("Created game results lookup with {} games", results.games());
        results.annotate(weekly);
        true
    }

    async fn reachable_store(&self) -> std::result::Result<Arc<dyn StatStore>, String> {
        let store = self.store.clone().ok_or_else(|| "no store configured".to_string())?;
        store
            .ping(&self.options.table)
            .await
            .map_err(|e| e.to_string())?;
        tracing::info!("Connected to {} store", store.name());
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use crate::services::data_fetcher::testing::{csv, FixedSource};
    use crate::services::normalizer::WEEKLY_KEY;
    use serde_json::json;
    use tempfile::TempDir;

    const WEEKLY: &str = "player_id,player_name,recent_team,season,week,opponent_team,passing_yards,fantasy_points\n\
                          00-0033873,P.Mahomes,KC,2024,1,BAL,291,20.3\n\
                          00-0033873,P.Mahomes,KC,2024,2,CIN,NA,NA\n";
    const SCHEDULE: &str = "season,week,home_team,away_team,home_score,away_score,result\n\
                            2024,1,KC,BAL,27,20,7\n\
                            2024,2,KC,CIN,,,\n";

    fn options(dir: &TempDir) -> SyncOptions {
        SyncOptions {
            annotate_results: true,
            mode: WriteMode::Upsert,
            batch_size: 100,
            table: "nfl".to_string(),
            artifact_dir: dir.path().to_path_buf(),
        }
    }

    fn source() -> FixedSource {
        FixedSource {
            weekly: Some(csv(WEEKLY)),
            schedule: Some(csv(SCHEDULE)),
            ..Default::default()
        }
    }

    async fn sqlite() -> Arc<SqliteStore> {
        let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
        store.ensure_table("nfl", WEEKLY_SCHEMA, WEEKLY_KEY).await.unwrap();
        Arc::new(store)
    }

    fn shared(store: &Arc<SqliteStore>) -> Option<Arc<dyn StatStore>> {
        Some(store.clone() as Arc<dyn StatStore>)
    }

    #[tokio::test]
    async fn test_syncs_annotated_rows() {
        let dir = TempDir::new().unwrap();
        let store = sqlite().await;
        let sync = WeeklySync::new(Arc::new(source()), shared(&store), options(&dir));

        let report = sync.run(2024).await.unwrap();

        assert_eq!(report.season, 2024);
        assert_eq!(report.fetched, 2);
        assert!(report.annotated);
        assert!(report.backup.exists());
        let SyncOutcome::Synced(summary) = report.outcome else {
            panic!("expected a synced run");
        };
        assert_eq!(summary.upserted, 2);

        let rows = store.player_rows("nfl", "00-0033873").await.unwrap();
        assert_eq!(rows[0]["game_result"], json!("W 27-20"));
        assert_eq!(rows[0]["team"], json!("KC"));
        assert_eq!(rows[1]["game_result"], json!("N/A"));
        assert_eq!(rows[1]["passing_yards"], json!(0));
    }

    #[tokio::test]
    async fn test_rerun_leaves_store_unchanged() {
        let dir = TempDir::new().unwrap();
        let store = sqlite().await;
        let sync = WeeklySync::new(Arc::new(source()), shared(&store), options(&dir));

        sync.run(2024).await.unwrap();
        let before = store.player_rows("nfl", "00-0033873").await.unwrap();
        sync.run(2024).await.unwrap();

        assert_eq!(store.count("nfl").await.unwrap(), 2);
        assert_eq!(store.player_rows("nfl", "00-0033873").await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_without_store_writes_fallback() {
        let dir = TempDir::new().unwrap();
        let sync = WeeklySync::new(Arc::new(source()), None, options(&dir));

        let report = sync.run(2024).await.unwrap();

        match report.outcome {
            SyncOutcome::Fallback { path, .. } => {
                assert_eq!(path, dir.path().join("nfl_weekly_2024_fallback.csv"));
                let saved = Frame::from_csv_reader(std::fs::File::open(&path).unwrap()).unwrap();
                assert_eq!(saved.len(), 2);
                assert!(saved.has_column("game_result"));
            }
            other => panic!("expected fallback, got {:?}", other),
        }
        assert_eq!(report.backup, dir.path().join("nfl_weekly_2024_backup.csv"));
    }

    #[tokio::test]
    async fn test_unreachable_store_writes_fallback() {
        let dir = TempDir::new().unwrap();
        // No table created, so the ping fails.
        let store = Arc::new(SqliteStore::connect("sqlite::memory:").await.unwrap());
        let sync = WeeklySync::new(Arc::new(source()), shared(&store), options(&dir));

        let report = sync.run(2024).await.unwrap();
        assert!(matches!(report.outcome, SyncOutcome::Fallback { .. }));
    }

    #[tokio::test]
    async fn test_missing_schedule_skips_annotation() {
        let dir = TempDir::new().unwrap();
        let source = FixedSource { schedule: None, ..source() };
        let sync = WeeklySync::new(Arc::new(source), None, options(&dir));

        let report = sync.run(2024).await.unwrap();
        assert!(!report.annotated);

        let backup = Frame::from_csv_reader(std::fs::File::open(&report.backup).unwrap()).unwrap();
        assert!(!backup.has_column("game_result"));
    }

    #[tokio::test]
    async fn test_annotation_can_be_disabled() {
        let dir = TempDir::new().unwrap();
        let sync = WeeklySync::new(
            Arc::new(source()),
            None,
            SyncOptions { annotate_results: false, ..options(&dir) },
        );
        assert!(!sync.run(2024).await.unwrap().annotated);
    }

    #[tokio::test]
    async fn test_missing_weekly_stats_is_fatal() {
        let dir = TempDir::new().unwrap();
        let source = FixedSource { weekly: None, ..source() };
        let sync = WeeklySync::new(Arc::new(source), None, options(&dir));

        let err = sync.run(2024).await.unwrap_err();
        assert!(matches!(err, SyncError::Acquisition { .. }));
        assert!(!dir.path().join("nfl_weekly_2024_backup.csv").exists());
    }
}
