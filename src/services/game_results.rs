use std::collections::HashMap;

use crate::models::{Cell, Frame, ScheduleRecord};

pub const NO_RESULT: &str = "N/A";
pub const GAME_RESULT_COLUMN: &str = "game_result";

/// Outcome strings per (week, team, opponent), from each team's perspective.
#[derive(Debug, Clone, Default)]
pub struct GameResults {
    outcomes: HashMap<(i64, String, String), String>,
}

impl GameResults {
    /// Two entries per played game, one per side. Unplayed games are skipped.
    pub fn from_schedule(games: &[ScheduleRecord]) -> Self {
        let mut outcomes = HashMap::with_capacity(games.len() * 2);

        for game in games {
            let (Some(home), Some(away)) = (game.home_score, game.away_score) else {
                continue;
            };
            let diff = game.result.unwrap_or(home - away);

            let (home_result, away_result) = if diff > 0 {
                (format!("W {}-{}", home, away), format!("L {}-{}", away, home))
            } else if diff < 0 {
                (format!("L {}-{}", home, away), format!("W {}-{}", away, home))
            } else {
                let tie = format!("T {}-{}", home, away);
                (tie.clone(), tie)
            };

            outcomes.insert((game.week, game.home_team.clone(), game.away_team.clone()), home_result);
            outcomes.insert((game.week, game.away_team.clone(), game.home_team.clone()), away_result);
        }

        Self { outcomes }
    }

    /// Number of played games indexed.
    pub fn games(&self) -> usize {
        self.outcomes.len() / 2
    }

    pub fn lookup(&self, week: i64, team: &str, opponent: &str) -> &str {
        self.outcomes
            .get(&(week, team.to_string(), opponent.to_string()))
            .map_or(NO_RESULT, String::as_str)
    }

    /// Sets `game_result` on every row of a weekly frame. Rows whose week or
    /// team cells are unusable get `"N/A"` like any other unmatched row.
    pub fn annotate(&self, weekly: &mut Frame) {
        let values: Vec<Cell> = weekly
            .iter()
            .map(|row| {
                let week = row.get("week").and_then(Cell::as_i64);
                let team = row.get("recent_team").and_then(Cell::key_text);
                let opponent = row.get("opponent_team").and_then(Cell::key_text);
                let outcome = match (week, team, opponent) {
                    (Some(w), Some(t), Some(o)) => self.lookup(w, &t, &o),
                    _ => NO_RESULT,
                };
                Cell::Text(outcome.to_string())
            })
            .collect();

        weekly.set_column(GAME_RESULT_COLUMN, values);
    }
}
