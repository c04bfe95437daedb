use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::{GameSessionResult, StatisticsRecord, StatisticsSummary};
use crate::{
    leaderboard::{validate_game_mode, NewLeaderboardEntry, SubmittedEntry},
    shared::{AppError, AppState},
};

const DEFAULT_GAME_MODE: &str = "classic";

#[derive(Debug, Deserialize)]
pub struct SessionCompletionRequest {
    #[serde(flatten)]
    pub session: GameSessionResult,
    pub display_name: Option<String>,
    pub game_mode: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionCompletionResponse {
    pub statistics: StatisticsRecord,
    pub leaderboard: SubmittedEntry,
}

#[derive(Debug, Deserialize)]
pub struct AggregateRequest {
    pub user_ids: Vec<String>,
}

/// POST /users/:user_id/sessions
///
/// Records the finished game in the user's lifetime statistics and posts it
/// to the leaderboards. Callers must deliver each session at most once.
#[instrument(name = "record_session", skip(state, request))]
pub async fn record_session(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<SessionCompletionRequest>,
) -> Result<Json<SessionCompletionResponse>, AppError> {
    let game_mode = request
        .game_mode
        .unwrap_or_else(|| DEFAULT_GAME_MODE.to_string());
    validate_game_mode(&game_mode)?;

    let statistics = state
        .stats_service
        .record_session_completion(&user_id, &request.session)
        .await?;

    let leaderboard = state
        .leaderboard_service
        .submit_entry(NewLeaderboardEntry {
            user_id: user_id.clone(),
            display_name: request.display_name.unwrap_or_else(|| user_id.clone()),
            score: request.session.score,
            lines_cleared: request.session.lines_cleared,
            game_mode,
        })
        .await?;

    info!(
        user_id = %user_id,
        total_games = statistics.total_games,
        personal_best = leaderboard.personal_best_score,
        "Session completion processed"
    );

    Ok(Json(SessionCompletionResponse {
        statistics,
        leaderboard,
    }))
}

/// GET /users/:user_id/statistics
#[instrument(name = "get_statistics", skip(state))]
pub async fn get_statistics(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<StatisticsRecord>, AppError> {
    state
        .stats_service
        .get_user_statistics(&user_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No statistics for {}", user_id)))
}

/// GET /users/:user_id/statistics/summary
#[instrument(name = "get_statistics_summary", skip(state))]
pub async fn get_statistics_summary(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<StatisticsSummary>, AppError> {
    state
        .stats_service
        .get_user_statistics_summary(&user_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No statistics for {}", user_id)))
}

/// POST /users/:user_id/streak/reset
#[instrument(name = "reset_streak", skip(state))]
pub async fn reset_streak(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<StatisticsRecord>, AppError> {
    state
        .stats_service
        .reset_streak(&user_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No statistics for {}", user_id)))
}

/// POST /statistics/aggregate
#[instrument(name = "aggregate_statistics", skip(state, request))]
pub async fn aggregate_statistics(
    State(state): State<AppState>,
    Json(request): Json<AggregateRequest>,
) -> Result<Json<StatisticsRecord>, AppError> {
    let merged = state
        .stats_service
        .aggregate_users(&request.user_ids)
        .await?;
    Ok(Json(merged))
}
