use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;
use crate::db::{self, StatStore, StoreRow};
use crate::models::{ErrorBody, GameLog, GameLogsResponse, PropStats};
use crate::services::game_results::NO_RESULT;
use crate::utils::round1;

pub const DEFAULT_SEASON: i64 = 2024;

/// Props summarized for every player, in response order.
pub const PROPS: &[&str] = &[
    "passing_yards",
    "passing_td",
    "rushing_yards",
    "rushing_td",
    "completions",
    "attempts",
    "interceptions",
    "sacks",
    "receiving_yards",
    "receiving_td",
    "receptions",
    "targets",
    "total_yards",
    "total_td",
];

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn StatStore>,
    pub table: String,
}

pub async fn serve(config: &Config, port: u16) -> anyhow::Result<()> {
    let store = db::connect(config).await?;
    let state = AppState { store, table: config.table.clone() };

    let app = create_router().with_state(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    tracing::info!("gridsync API server listening on port {}", port);

    axum::serve(listener, app).await?;
    Ok(())
}

fn create_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/nfl/game-logs", get(game_logs_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

async fn health_check() -> Json<Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GameLogsQuery {
    player_id: Option<String>,
    season: Option<String>,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn api_error(status: StatusCode, message: &str) -> ApiError {
    (status, Json(ErrorBody { error: message.to_string() }))
}

// GET /api/nfl/game-logs?playerId=&season= - every stored game of a player
async fn game_logs_handler(
    State(state): State<AppState>,
    Query(params): Query<GameLogsQuery>,
) -> Result<Json<GameLogsResponse>, ApiError> {
    let Some(player_id) = params.player_id.filter(|id| !id.is_empty()) else {
        return Err(api_error(StatusCode::BAD_REQUEST, "playerId parameter is required"));
    };
    let season = params
        .season
        .and_then(|s| s.trim().parse::<i64>().ok())
        .unwrap_or(DEFAULT_SEASON);

    let rows = match state.store.player_rows(&state.table, &player_id).await {
        Ok(rows) => rows,
        Err(e) => {
            tracing::error!("Failed to fetch game logs for {}: {}", player_id, e);
            return Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch game logs"));
        }
    };

    let game_logs: Vec<GameLog> = rows.iter().map(game_log).collect();
    let prop_stats = all_prop_stats(&game_logs)
        .map_err(|_| api_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"))?;

    Ok(Json(GameLogsResponse {
        player_id,
        season,
        total: game_logs.len(),
        game_logs,
        prop_stats,
    }))
}

/// Stored row to API shape. Missing numbers read as 0.
pub fn game_log(row: &StoreRow) -> GameLog {
    let num = |key: &str| row.get(key).and_then(Value::as_f64).unwrap_or(0.0);
    let int = |key: &str| row.get(key).and_then(Value::as_i64).unwrap_or(0);
    let text = |key: &str| row.get(key).and_then(Value::as_str).unwrap_or_default().to_string();

    GameLog {
        week: int("week"),
        opponent: text("opponent_team"),
        season: int("season"),
        season_type: text("season_type"),
        game_result: row
            .get("game_result")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(NO_RESULT)
            .to_string(),
        completions: num("completions"),
        attempts: num("attempts"),
        passing_yards: num("passing_yards"),
        passing_tds: num("passing_tds"),
        interceptions: num("interceptions"),
        sacks: num("sacks"),
        carries: num("carries"),
        rushing_yards: num("rushing_yards"),
        rushing_tds: num("rushing_tds"),
        receptions: num("receptions"),
        targets: num("targets"),
        receiving_yards: num("receiving_yards"),
        receiving_tds: num("receiving_tds"),
        fantasy_points: num("fantasy_points"),
        fantasy_points_ppr: num("fantasy_points_ppr"),
    }
}

pub fn prop_value(log: &GameLog, prop: &str) -> f64 {
    match prop {
        "passing_yards" => log.passing_yards,
        "passing_td" => log.passing_tds,
        "rushing_yards" => log.rushing_yards,
        "rushing_td" => log.rushing_tds,
        "completions" => log.completions,
        "attempts" => log.attempts,
        "interceptions" => log.interceptions,
        "sacks" => log.sacks,
        "receiving_yards" => log.receiving_yards,
        "receiving_td" => log.receiving_tds,
        "receptions" => log.receptions,
        "targets" => log.targets,
        "total_yards" => log.passing_yards + log.rushing_yards,
        "total_td" => log.passing_tds + log.rushing_tds,
        _ => 0.0,
    }
}

/// Summary of one prop over the games where it was positive.
pub fn prop_stats(logs: &[GameLog], prop: &str) -> PropStats {
    let mut values: Vec<f64> = logs
        .iter()
        .map(|log| prop_value(log, prop))
        .filter(|v| *v > 0.0)
        .collect();

    if values.is_empty() {
        return PropStats::default();
    }

    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    let average = values.iter().sum::<f64>() / n as f64;

    PropStats {
        high: values[n - 1],
        low: values[0],
        average: round1(average),
        median: round1(values[n / 2]),
        total_games: n,
        // Flat until prop lines are stored alongside the logs.
        hit_rate: 50,
    }
}

fn all_prop_stats(logs: &[GameLog]) -> serde_json::Result<Map<String, Value>> {
    PROPS
        .iter()
        .map(|prop| Ok((prop.to_string(), serde_json::to_value(prop_stats(logs, prop))?)))
        .collect()
}
