use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::{Result, SyncError};

pub const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

// ── Cells ────────────────────────────────────────────────────────────────────

/// One value of an external record. The source schema is not under our
/// control, so values stay loosely typed until the normalizer pins them down.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(NaiveDateTime),
    /// Calendar date without a time of day, written back as `YYYY-MM-DD`.
    Date(NaiveDate),
    /// Nested values. CSV feeds never produce these; they come from
    /// structured sources and are sanitized element by element on export.
    List(Vec<Cell>),
}

impl Cell {
    /// Type a raw CSV field.
    pub fn parse(raw: &str) -> Self {
        let s = raw.trim();
        if s.is_empty() || s == "NA" {
            return Cell::Null;
        }
        if s == "NaN" {
            return Cell::Float(f64::NAN);
        }
        match s {
            "TRUE" | "true" | "True" => return Cell::Bool(true),
            "FALSE" | "false" | "False" => return Cell::Bool(false),
            _ => {}
        }
        if s.bytes().any(|b| b.is_ascii_digit()) {
            if let Ok(i) = s.parse::<i64>() {
                return Cell::Int(i);
            }
            if let Ok(f) = s.parse::<f64>() {
                return Cell::Float(f);
            }
            if let Ok(date) = NaiveDate::parse_from_str(s, DATE_FORMAT) {
                return Cell::Date(date);
            }
            if let Some(ts) = parse_timestamp(s) {
                return Cell::Timestamp(ts);
            }
        }
        Cell::Text(s.to_string())
    }

    /// Null or the NaN sentinel.
    pub fn is_missing(&self) -> bool {
        match self {
            Cell::Null => true,
            Cell::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    /// Integer view: floats truncate toward zero, numeric text is parsed.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Cell::Int(i) => Some(*i),
            Cell::Float(f) if f.is_finite() => Some(f.trunc() as i64),
            Cell::Bool(b) => Some(i64::from(*b)),
            Cell::Text(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Text used when a cell takes part in a key (team codes, player ids).
    pub fn key_text(&self) -> Option<String> {
        match self {
            Cell::Text(s) if !s.is_empty() => Some(s.clone()),
            Cell::Int(i) => Some(i.to_string()),
            _ => None,
        }
    }

    pub fn to_csv_field(&self) -> String {
        match self {
            Cell::Null => String::new(),
            Cell::Bool(b) => b.to_string(),
            Cell::Int(i) => i.to_string(),
            Cell::Float(f) if f.is_nan() => String::new(),
            Cell::Float(f) => f.to_string(),
            Cell::Text(s) => s.clone(),
            Cell::Timestamp(ts) => ts.format(ISO_FORMAT).to_string(),
            Cell::Date(date) => date.format(DATE_FORMAT).to_string(),
            Cell::List(_) => self.to_json().to_string(),
        }
    }

    /// JSON view. Non-finite floats have no JSON form and become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            Cell::Null => Value::Null,
            Cell::Bool(b) => Value::Bool(*b),
            Cell::Int(i) => Value::from(*i),
            Cell::Float(f) => serde_json::Number::from_f64(*f).map_or(Value::Null, Value::Number),
            Cell::Text(s) => Value::String(s.clone()),
            Cell::Timestamp(ts) => Value::String(ts.format(ISO_FORMAT).to_string()),
            Cell::Date(date) => Value::String(date.format(DATE_FORMAT).to_string()),
            Cell::List(items) => Value::Array(items.iter().map(Cell::to_json).collect()),
        }
    }
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    [ISO_FORMAT, "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

// ── Frames ───────────────────────────────────────────────────────────────────

/// A tabular record set: ordered column names plus one row of cells per record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

/// Borrowed view of one frame row, addressable by column name.
#[derive(Debug, Clone, Copy)]
pub struct RowRef<'a> {
    columns: &'a [String],
    cells: &'a [Cell],
}

impl<'a> RowRef<'a> {
    pub fn get(&self, column: &str) -> Option<&'a Cell> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.cells.get(i))
    }

    pub fn cells(&self) -> &'a [Cell] {
        self.cells
    }

    pub fn to_object(&self) -> serde_json::Map<String, serde_json::Value> {
        self.columns
            .iter()
            .zip(self.cells)
            .map(|(c, v)| (c.clone(), v.to_json()))
            .collect()
    }
}

impl Frame {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn push_row(&mut self, row: Vec<Cell>) {
        self.rows.push(row);
    }

    pub fn iter(&self) -> impl Iterator<Item = RowRef<'_>> {
        self.rows.iter().map(move |cells| RowRef { columns: &self.columns, cells })
    }

    /// Checks the frame shape: unique column names, one cell per column in every row.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for c in &self.columns {
            if !seen.insert(c.as_str()) {
                return Err(SyncError::transform(format!("duplicate column '{}'", c)));
            }
        }
        for (i, row) in self.rows.iter().enumerate() {
            if row.len() != self.columns.len() {
                return Err(SyncError::transform(format!(
                    "row {} has {} cells, expected {}",
                    i,
                    row.len(),
                    self.columns.len()
                )));
            }
        }
        Ok(())
    }

    /// Appends `name`, or overwrites it when already present. Missing values pad with `Null`.
    pub fn set_column(&mut self, name: &str, values: Vec<Cell>) {
        let mut values = values.into_iter();
        match self.column_index(name) {
            Some(idx) => {
                for row in &mut self.rows {
                    if let Some(slot) = row.get_mut(idx) {
                        *slot = values.next().unwrap_or(Cell::Null);
                    }
                }
            }
            None => {
                self.columns.push(name.to_string());
                for row in &mut self.rows {
                    row.push(values.next().unwrap_or(Cell::Null));
                }
            }
        }
    }

    /// Renames column `from` to `to`. Does nothing when `from` is absent or
    /// `to` already exists.
    pub fn rename_column(&mut self, from: &str, to: &str) {
        if self.has_column(to) {
            return;
        }
        if let Some(idx) = self.column_index(from) {
            self.columns[idx] = to.to_string();
        }
    }

    /// Rows for which `keep` holds, same columns.
    pub fn filter<F>(&self, mut keep: F) -> Frame
    where
        F: FnMut(RowRef<'_>) -> bool,
    {
        let rows = self
            .rows
            .iter()
            .filter(|cells| keep(RowRef { columns: &self.columns, cells }))
            .cloned()
            .collect();
        Frame { columns: self.columns.clone(), rows }
    }

    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Frame> {
        let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
        let columns: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();
        let mut frame = Frame { columns, rows: Vec::new() };
        for record in rdr.records() {
            let record = record?;
            frame.rows.push(record.iter().map(Cell::parse).collect());
        }
        Ok(frame)
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(&self.columns)?;
        for row in &self.rows {
            wtr.write_record(row.iter().map(Cell::to_csv_field))?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn write_csv_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = std::fs::File::create(path)?;
        self.write_csv(file)
    }
}

// ── Typed records ────────────────────────────────────────────────────────────

/// One game of the season schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleRecord {
    /// 0 when the feed carries no season column.
    pub season: i64,
    pub week: i64,
    pub home_team: String,
    pub away_team: String,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
    /// Point differential, home minus away.
    pub result: Option<i64>,
}

impl ScheduleRecord {
    /// Reads the typed schedule out of a raw schedule frame. Rows without a
    /// usable week or team code are skipped.
    pub fn from_frame(frame: &Frame) -> Result<Vec<ScheduleRecord>> {
        for required in ["week", "home_team", "away_team"] {
            if !frame.has_column(required) {
                return Err(SyncError::transform(format!("schedule is missing column '{}'", required)));
            }
        }
        frame.validate()?;

        let mut games = Vec::with_capacity(frame.len());
        for row in frame.iter() {
            let int = |c: &str| row.get(c).and_then(Cell::as_i64);
            let text = |c: &str| row.get(c).and_then(Cell::key_text);

            let (Some(week), Some(home_team), Some(away_team)) =
                (int("week"), text("home_team"), text("away_team"))
            else {
                tracing::debug!("Skipping schedule row without week/teams");
                continue;
            };

            let home_score = int("home_score");
            let away_score = int("away_score");
            let result = int("result").or(match (home_score, away_score) {
                (Some(h), Some(a)) => Some(h - a),
                _ => None,
            });

            games.push(ScheduleRecord {
                season: int("season").unwrap_or_default(),
                week,
                home_team,
                away_team,
                home_score,
                away_score,
                result,
            });
        }
        Ok(games)
    }
}

/// Identity of a stored weekly stat row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NaturalKey {
    pub player_id: String,
    pub team: String,
    pub week: i64,
    pub season: i64,
}

impl NaturalKey {
    pub fn from_row(row: RowRef<'_>) -> Option<Self> {
        Some(Self {
            player_id: row.get("player_id")?.key_text()?,
            team: row.get("team")?.key_text()?,
            week: row.get("week")?.as_i64()?,
            season: row.get("season")?.as_i64()?,
        })
    }
}

// ── Run reports ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub attempted: usize,
    pub upserted: usize,
    pub batches: usize,
    /// 1-based indexes of batches the store rejected.
    pub failed_batches: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    Synced(SyncReport),
    Fallback { path: PathBuf, reason: String },
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub season: i32,
    pub fetched: usize,
    pub annotated: bool,
    pub backup: PathBuf,
    pub outcome: SyncOutcome,
}

#[derive(Debug, Clone, Default)]
pub struct ExportReport {
    pub teams: Option<usize>,
    pub rosters: Option<usize>,
    pub schedule: Option<usize>,
    pub snap_filter_applied: bool,
    pub files: Vec<PathBuf>,
}

// ── API types ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameLog {
    pub week: i64,
    pub opponent: String,
    pub season: i64,
    pub season_type: String,
    pub game_result: String,
    pub completions: f64,
    pub attempts: f64,
    pub passing_yards: f64,
    pub passing_tds: f64,
    pub interceptions: f64,
    pub sacks: f64,
    pub carries: f64,
    pub rushing_yards: f64,
    pub rushing_tds: f64,
    pub receptions: f64,
    pub targets: f64,
    pub receiving_yards: f64,
    pub receiving_tds: f64,
    pub fantasy_points: f64,
    pub fantasy_points_ppr: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PropStats {
    pub high: f64,
    pub low: f64,
    pub average: f64,
    pub median: f64,
    pub total_games: usize,
    pub hit_rate: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameLogsResponse {
    pub player_id: String,
    pub season: i64,
    pub game_logs: Vec<GameLog>,
    pub prop_stats: serde_json::Map<String, serde_json::Value>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}
