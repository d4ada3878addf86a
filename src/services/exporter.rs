use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::error::{Result, SyncError};
use crate::models::{Cell, ExportReport, Frame, ISO_FORMAT};
use crate::services::data_fetcher::{acquire, standardize_rosters, StatsSource};

/// Franchise codes the team feed still lists after relocation.
pub const OBSOLETE_TEAMS: &[&str] = &["LA", "OAK", "SD", "STL"];
pub const OFFENSIVE_POSITIONS: &[&str] = &["QB", "RB", "WR", "TE"];
pub const DEFAULT_MIN_SNAPS: i64 = 50;

/// Drops the rows of relocated franchises so each team appears once.
pub fn dedup_teams(teams: &Frame) -> Frame {
    let kept = teams.filter(|row| {
        !row
            .get("team_abbr")
            .and_then(Cell::as_str)
            .is_some_and(|abbr| OBSOLETE_TEAMS.contains(&abbr))
    });
    tracing::info!("Deduplicated teams: {} -> {}", teams.len(), kept.len());
    kept
}

fn is_offensive(cell: Option<&Cell>) -> bool {
    cell.and_then(Cell::as_str)
        .is_some_and(|pos| OFFENSIVE_POSITIONS.contains(&pos))
}

pub fn filter_offensive(rosters: &Frame) -> Frame {
    rosters.filter(|row| is_offensive(row.get("position")))
}

/// Names of offensive players with at least `min_snaps` offensive snaps
/// summed over the season.
pub fn active_players(snaps: &Frame, min_snaps: i64) -> Result<HashSet<String>> {
    for required in ["player", "position", "offense_snaps"] {
        if !snaps.has_column(required) {
            return Err(SyncError::transform(format!("snap counts lack column '{}'", required)));
        }
    }

    let mut totals: HashMap<String, i64> = HashMap::new();
    for row in snaps.iter().filter(|row| is_offensive(row.get("position"))) {
        let Some(player) = row.get("player").and_then(Cell::key_text) else {
            continue;
        };
        let snaps = row.get("offense_snaps").and_then(Cell::as_i64).unwrap_or(0);
        *totals.entry(player).or_default() += snaps;
    }

    let active: HashSet<String> = totals
        .into_iter()
        .filter(|(_, total)| *total >= min_snaps)
        .map(|(player, _)| player)
        .collect();
    tracing::info!("Players with {}+ snaps: {}", min_snaps, active.len());
    Ok(active)
}

/// Makes a cell representable in JavaScript: NaN becomes null and
/// timestamps become ISO-8601 text, inside lists too.
pub fn sanitize(cell: &Cell) -> Cell {
    match cell {
        Cell::Float(f) if f.is_nan() => Cell::Null,
        Cell::Timestamp(ts) => Cell::Text(ts.format(ISO_FORMAT).to_string()),
        Cell::List(items) => Cell::List(items.iter().map(sanitize).collect()),
        other => other.clone(),
    }
}

/// `export const {name} = [...];` with one object per row, keys in column order.
pub fn render_module(name: &str, frame: &Frame) -> Result<String> {
    let records: Vec<Value> = frame
        .iter()
        .map(|row| {
            Value::Object(
                frame
                    .columns
                    .iter()
                    .zip(row.cells())
                    .map(|(column, cell)| (column.clone(), sanitize(cell).to_json()))
                    .collect(),
            )
        })
        .collect();
    Ok(format!("export const {} = {};", name, serde_json::to_string_pretty(&records)?))
}

/// Writes teams, rosters and schedule as static JavaScript modules.
pub struct StaticExporter {
    pub out_dir: PathBuf,
    pub min_snaps: i64,
}

impl StaticExporter {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self { out_dir: out_dir.into(), min_snaps: DEFAULT_MIN_SNAPS }
    }

    pub async fn export(&self, source: &dyn StatsSource, season: i32) -> Result<ExportReport> {
        std::fs::create_dir_all(&self.out_dir)?;
        tracing::info!("Saving static data to {}", self.out_dir.display());

        let mut report = ExportReport::default();

        match acquire("teams", source.teams()).await {
            Some(teams) => {
                let teams = dedup_teams(&teams);
                report.files.push(self.write("teams", &teams)?);
                report.teams = Some(teams.len());
            }
            None => tracing::warn!("Skipping teams.js"),
        }

        match acquire("rosters", source.rosters(season)).await {
            Some(rosters) => {
                let rosters = standardize_rosters(rosters);
                let (rosters, applied) = self.active_rosters(source, &rosters, season).await;
                report.files.push(self.write("rosters", &rosters)?);
                report.rosters = Some(rosters.len());
                report.snap_filter_applied = applied;
            }
            None => tracing::warn!("Skipping rosters.js"),
        }

        match acquire("schedule", source.schedules(season)).await {
            Some(schedule) => {
                report.files.push(self.write("schedule", &schedule)?);
                report.schedule = Some(schedule.len());
            }
            None => tracing::warn!("Skipping schedule.js"),
        }

        tracing::info!("Static data export finished: {} files", report.files.len());
        Ok(report)
    }

    /// Offensive players with enough snaps. Without usable snap counts the
    /// position filter alone applies, and the second value is false.
    async fn active_rosters(&self, source: &dyn StatsSource, rosters: &Frame, season: i32) -> (Frame, bool) {
        let offensive = filter_offensive(rosters);
        tracing::info!("Offensive roster entries: {} -> {}", rosters.len(), offensive.len());

        if !offensive.has_column("player_name") {
            tracing::warn!("Rosters carry no player_name column; exporting all offensive players");
            return (offensive, false);
        }

        let Some(snaps) = acquire("snap counts", source.snap_counts(season)).await else {
            tracing::warn!("No snap counts; exporting all offensive players");
            return (offensive, false);
        };

        match active_players(&snaps, self.min_snaps) {
            Ok(active) => {
                let kept = offensive.filter(|row| {
                    row.get("player_name")
                        .and_then(Cell::key_text)
                        .is_some_and(|name| active.contains(&name))
                });
                tracing::info!("Active offensive players: {} -> {}", offensive.len(), kept.len());
                (kept, true)
            }
            Err(e) => {
                tracing::warn!("Error filtering by snap counts ({}); exporting all offensive players", e);
                (offensive, false)
            }
        }
    }

    fn write(&self, name: &str, frame: &Frame) -> Result<PathBuf> {
        let path = module_path(&self.out_dir, name);
        std::fs::write(&path, render_module(name, frame)?)?;
        tracing::info!("Saved {} ({} records)", path.display(), frame.len());
        Ok(path)
    }
}

fn module_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.js", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::data_fetcher::testing::{csv, FixedSource};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    const TEAMS: &str = "team_abbr,team_name\nKC,Kansas City Chiefs\nLA,Los Angeles Rams\nLAR,Los Angeles Rams\nOAK,Oakland Raiders\nLV,Las Vegas Raiders\n";
    const ROSTERS: &str = "season,team,position,player_name,player_id\n\
                           2024,KC,QB,Patrick Mahomes,00-0033873\n\
                           2024,KC,TE,Travis Kelce,00-0030506\n\
                           2024,KC,WR,Skyy Moore,00-0037197\n\
                           2024,KC,K,Harrison Butker,00-0033107\n";
    const SNAPS: &str = "player,position,offense_snaps\n\
                         Patrick Mahomes,QB,70\n\
                         Travis Kelce,TE,30\n\
                         Travis Kelce,TE,25\n\
                         Skyy Moore,WR,12\n\
                         Harrison Butker,K,0\n";

    fn abbrs(frame: &Frame) -> Vec<String> {
        frame.iter().filter_map(|r| r.get("team_abbr").and_then(Cell::key_text)).collect()
    }

    #[test]
    fn test_dedup_teams() {
        let teams = csv(TEAMS);
        let once = dedup_teams(&teams);
        assert_eq!(abbrs(&once), vec!["KC", "LAR", "LV"]);
        assert_eq!(dedup_teams(&once), once);
    }

    #[test]
    fn test_active_players_sums_snaps() {
        let active = active_players(&csv(SNAPS), 50).unwrap();
        assert!(active.contains("Patrick Mahomes"));
        assert!(active.contains("Travis Kelce"));
        assert!(!active.contains("Skyy Moore"));
        assert!(!active.contains("Harrison Butker"));
    }

    #[test]
    fn test_active_players_requires_columns() {
        assert!(active_players(&csv("player,position\nA,QB\n"), 50).is_err());
    }

    #[test]
    fn test_sanitize() {
        let ts = NaiveDate::from_ymd_opt(2024, 9, 5).unwrap().and_hms_opt(20, 20, 0).unwrap();
        assert_eq!(sanitize(&Cell::Float(f64::NAN)), Cell::Null);
        assert_eq!(sanitize(&Cell::Timestamp(ts)), Cell::Text("2024-09-05T20:20:00".into()));
        assert_eq!(
            sanitize(&Cell::List(vec![Cell::Int(1), Cell::Float(f64::NAN)])),
            Cell::List(vec![Cell::Int(1), Cell::Null])
        );
        assert_eq!(sanitize(&Cell::Float(1.5)), Cell::Float(1.5));

        let gameday = Cell::parse("2024-09-05");
        assert_eq!(sanitize(&gameday).to_json(), serde_json::json!("2024-09-05"));
    }

    #[test]
    fn test_render_module() {
        let mut frame = Frame::new(["team_abbr", "team_name", "team_nfl_color"]);
        frame.push_row(vec![
            Cell::Text("KC".into()),
            Cell::Text("Kansas City Chiefs".into()),
            Cell::Float(f64::NAN),
        ]);
        let expected = "export const teams = [\n  {\n    \"team_abbr\": \"KC\",\n    \"team_name\": \"Kansas City Chiefs\",\n    \"team_nfl_color\": null\n  }\n];";
        assert_eq!(render_module("teams", &frame).unwrap(), expected);
        assert_eq!(render_module("teams", &Frame::new(["team_abbr"])).unwrap(), "export const teams = [];");
    }

    #[tokio::test]
    async fn test_export_writes_modules() {
        let dir = TempDir::new().unwrap();
        let source = FixedSource {
            teams: Some(csv(TEAMS)),
            rosters: Some(csv(ROSTERS)),
            snaps: Some(csv(SNAPS)),
            schedule: Some(csv("season,week,home_team,away_team\n2024,1,KC,BAL\n")),
            ..Default::default()
        };

        let report = StaticExporter::new(dir.path()).export(&source, 2024).await.unwrap();

        assert_eq!(report.teams, Some(3));
        assert_eq!(report.rosters, Some(2));
        assert_eq!(report.schedule, Some(1));
        assert!(report.snap_filter_applied);
        assert_eq!(report.files.len(), 3);

        let rosters = std::fs::read_to_string(dir.path().join("rosters.js")).unwrap();
        assert!(rosters.starts_with("export const rosters = ["));
        assert!(rosters.contains("Travis Kelce"));
        assert!(!rosters.contains("Skyy Moore"));
    }

    #[tokio::test]
    async fn test_export_raw_roster_headers() {
        let dir = TempDir::new().unwrap();
        let raw = "season,team,position,full_name,gsis_id\n\
                   2024,KC,QB,Patrick Mahomes,00-0033873\n\
                   2024,KC,TE,Travis Kelce,00-0030506\n\
                   2024,KC,K,Harrison Butker,00-0033107\n";
        let snaps = "player,position,offense_snaps\nPatrick Mahomes,QB,70\nTravis Kelce,TE,60\n";
        let source = FixedSource {
            rosters: Some(csv(raw)),
            snaps: Some(csv(snaps)),
            ..Default::default()
        };

        let report = StaticExporter::new(dir.path()).export(&source, 2024).await.unwrap();

        assert_eq!(report.rosters, Some(2));
        assert!(report.snap_filter_applied);
        let rosters = std::fs::read_to_string(dir.path().join("rosters.js")).unwrap();
        assert!(rosters.contains("\"player_name\": \"Patrick Mahomes\""));
        assert!(rosters.contains("\"player_id\": \"00-0030506\""));
    }

    #[tokio::test]
    async fn test_export_rosters_without_names_skips_snap_filter() {
        let dir = TempDir::new().unwrap();
        let source = FixedSource {
            rosters: Some(csv("season,team,position\n2024,KC,QB\n2024,KC,WR\n")),
            snaps: Some(csv(SNAPS)),
            ..Default::default()
        };

        let report = StaticExporter::new(dir.path()).export(&source, 2024).await.unwrap();

        assert_eq!(report.rosters, Some(2));
        assert!(!report.snap_filter_applied);
    }

    #[tokio::test]
    async fn test_export_keeps_schedule_dates() {
        let dir = TempDir::new().unwrap();
        let source = FixedSource {
            schedule: Some(csv("season,week,gameday,gametime,home_team,away_team\n2024,1,2024-09-05,20:20,KC,BAL\n")),
            ..Default::default()
        };

        StaticExporter::new(dir.path()).export(&source, 2024).await.unwrap();

        let schedule = std::fs::read_to_string(dir.path().join("schedule.js")).unwrap();
        assert!(schedule.contains("\"gameday\": \"2024-09-05\""));
        assert!(schedule.contains("\"gametime\": \"20:20\""));
    }

    #[tokio::test]
    async fn test_export_without_snap_counts_keeps_offense() {
        let dir = TempDir::new().unwrap();
        let source = FixedSource { rosters: Some(csv(ROSTERS)), ..Default::default() };

        let report = StaticExporter::new(dir.path()).export(&source, 2024).await.unwrap();

        assert_eq!(report.rosters, Some(3));
        assert!(!report.snap_filter_applied);
        assert_eq!(report.teams, None);
        assert!(!dir.path().join("teams.js").exists());
        assert!(!dir.path().join("schedule.js").exists());
    }
}
