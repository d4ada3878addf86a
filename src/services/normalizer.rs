use crate::error::Result;
use crate::models::{Cell, Frame};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Decimal,
    Text,
}

impl ColumnKind {
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnKind::Integer => "INTEGER",
            ColumnKind::Decimal => "REAL",
            ColumnKind::Text => "TEXT",
        }
    }
}

/// Maps one external column onto the stored schema.
#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub source: &'static str,
    pub target: &'static str,
    pub kind: ColumnKind,
}

const fn col(source: &'static str, target: &'static str, kind: ColumnKind) -> ColumnSpec {
    ColumnSpec { source, target, kind }
}

use ColumnKind::{Decimal, Integer, Text};

/// Stored layout of the weekly stats table, in column order.
pub const WEEKLY_SCHEMA: &[ColumnSpec] = &[
    col("player_id", "player_id", Text),
    col("player_name", "player_name", Text),
    col("player_display_name", "player_display_name", Text),
    col("position", "position", Text),
    col("position_group", "position_group", Text),
    col("recent_team", "team", Text),
    col("week", "week", Integer),
    col("season", "season", Integer),
    col("season_type", "season_type", Text),
    col("opponent_team", "opponent_team", Text),
    col("game_result", "game_result", Text),
    col("completions", "completions", Integer),
    col("attempts", "attempts", Integer),
    col("passing_yards", "passing_yards", Integer),
    col("passing_tds", "passing_tds", Integer),
    col("interceptions", "interceptions", Integer),
    col("sacks", "sacks", Integer),
    col("carries", "carries", Integer),
    col("rushing_yards", "rushing_yards", Integer),
    col("rushing_tds", "rushing_tds", Integer),
    col("receptions", "receptions", Integer),
    col("targets", "targets", Integer),
    col("receiving_yards", "receiving_yards", Integer),
    col("receiving_tds", "receiving_tds", Integer),
    col("fantasy_points", "fantasy_points", Decimal),
    col("fantasy_points_ppr", "fantasy_points_ppr", Decimal),
];

/// Natural key of the weekly stats table.
pub const WEEKLY_KEY: &[&str] = &["player_id", "team", "week", "season"];

/// Projects a raw frame onto `schema`.
///
/// Source columns the feed no longer carries are skipped, so the feed can
/// grow or shrink between seasons. Integer columns always come out as
/// integers (unparseable or missing values become 0); every other column
/// has missing values replaced by 0. A malformed frame is rejected whole.
pub fn normalize(raw: &Frame, schema: &[ColumnSpec], season: i32) -> Result<Frame> {
    raw.validate()?;

    let present: Vec<(usize, &ColumnSpec)> = schema
        .iter()
        .filter_map(|spec| raw.column_index(spec.source).map(|idx| (idx, spec)))
        .collect();

    let skipped: Vec<&str> = schema
        .iter()
        .filter(|spec| !raw.has_column(spec.source))
        .map(|spec| spec.source)
        .collect();
    if !skipped.is_empty() {
        tracing::debug!("Source lacks columns {:?}; skipping them", skipped);
    }

    let mut columns: Vec<String> = present.iter().map(|(_, spec)| spec.target.to_string()).collect();
    let inject_season = !columns.iter().any(|c| c == "season");
    if inject_season {
        columns.push("season".to_string());
    }

    let mut out = Frame { columns, rows: Vec::with_capacity(raw.len()) };
    for row in &raw.rows {
        let mut cells: Vec<Cell> = present
            .iter()
            .map(|(idx, spec)| coerce(&row[*idx], spec.kind))
            .collect();
        if inject_season {
            cells.push(Cell::Int(i64::from(season)));
        }
        out.rows.push(cells);
    }

    tracing::info!(
        "Normalized {} rows onto {} columns (season {})",
        out.len(),
        out.columns.len(),
        season
    );
    Ok(out)
}

fn coerce(cell: &Cell, kind: ColumnKind) -> Cell {
    match kind {
        ColumnKind::Integer => Cell::Int(cell.as_i64().unwrap_or(0)),
        _ if cell.is_missing() => Cell::Int(0),
        _ => cell.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;

    fn raw() -> Frame {
        let mut frame = Frame::new([
            "player_id",
            "recent_team",
            "week",
            "passing_yards",
            "fantasy_points",
            "headshot_url",
            "game_result",
        ]);
        frame.push_row(vec![
            Cell::Text("00-1".into()),
            Cell::Text("KC".into()),
            Cell::Int(1),
            Cell::Float(245.0),
            Cell::Float(18.4),
            Cell::Text("http://img".into()),
            Cell::Text("W 27-20".into()),
        ]);
        frame.push_row(vec![
            Cell::Text("00-2".into()),
            Cell::Text("KC".into()),
            Cell::Float(2.0),
            Cell::Text("n/a".into()),
            Cell::Float(f64::NAN),
            Cell::Null,
            Cell::Null,
        ]);
        frame
    }

    #[test]
    fn test_projection_and_rename() {
        let out = normalize(&raw(), WEEKLY_SCHEMA, 2024).unwrap();
        assert_eq!(
            out.columns,
            vec!["player_id", "team", "week", "game_result", "passing_yards", "fantasy_points", "season"]
        );
        assert_eq!(out.rows[0][1], Cell::Text("KC".into()));
        assert_eq!(out.rows[0][6], Cell::Int(2024));
    }

    #[test]
    fn test_integer_coercion() {
        let out = normalize(&raw(), WEEKLY_SCHEMA, 2024).unwrap();
        let week = out.column_index("week").unwrap();
        let yards = out.column_index("passing_yards").unwrap();
        assert_eq!(out.rows[0][yards], Cell::Int(245));
        assert_eq!(out.rows[1][week], Cell::Int(2));
        assert_eq!(out.rows[1][yards], Cell::Int(0));
    }

    #[test]
    fn test_schema_closure() {
        let out = normalize(&raw(), WEEKLY_SCHEMA, 2024).unwrap();
        for c in &out.columns {
            assert!(WEEKLY_SCHEMA.iter().any(|spec| spec.target == c.as_str()), "unexpected column {}", c);
        }
        for row in &out.rows {
            for (cell, column) in row.iter().zip(&out.columns) {
                assert!(!cell.is_missing(), "missing value in {}", column);
                let kind = WEEKLY_SCHEMA.iter().find(|spec| spec.target == column.as_str()).map(|spec| spec.kind);
                if kind == Some(ColumnKind::Integer) {
                    assert!(matches!(cell, Cell::Int(_)));
                }
            }
        }
        let fp = out.column_index("fantasy_points").unwrap();
        assert_eq!(out.rows[1][fp], Cell::Int(0));
    }

    #[test]
    fn test_existing_season_is_kept() {
        let mut frame = raw();
        frame.set_column("season", vec![Cell::Int(2023), Cell::Null]);
        let out = normalize(&frame, WEEKLY_SCHEMA, 2024).unwrap();
        let season = out.column_index("season").unwrap();
        assert_eq!(out.columns.iter().filter(|c| *c == "season").count(), 1);
        assert_eq!(out.rows[0][season], Cell::Int(2023));
        assert_eq!(out.rows[1][season], Cell::Int(0));
    }

    #[test]
    fn test_malformed_frame_is_rejected() {
        let mut frame = raw();
        frame.rows[1].pop();
        assert!(matches!(normalize(&frame, WEEKLY_SCHEMA, 2024), Err(SyncError::Transform(_))));
    }
}
