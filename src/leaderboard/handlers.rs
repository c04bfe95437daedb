use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use tracing::{info, instrument};

use super::{LeaderboardPage, LeaderboardQuery, RankedEntry};
use crate::shared::{AppError, AppState};

#[derive(Debug, Default, Deserialize)]
pub struct LeaderboardParams {
    pub sort: Option<String>,
    pub period: Option<String>,
    pub game_mode: Option<String>,
    pub limit: Option<usize>,
}

impl LeaderboardParams {
    fn into_query(self) -> Result<LeaderboardQuery, AppError> {
        Ok(LeaderboardQuery::from_tokens(
            self.sort.as_deref(),
            self.period.as_deref(),
            self.game_mode.as_deref(),
            self.limit,
        )?)
    }
}

/// GET /leaderboard?sort=score&period=weekly&game_mode=classic&limit=10
#[instrument(name = "get_leaderboard", skip(state))]
pub async fn get_leaderboard(
    State(state): State<AppState>,
    Query(params): Query<LeaderboardParams>,
) -> Result<Json<LeaderboardPage>, AppError> {
    let query = params.into_query()?;
    let page = state.leaderboard_service.get_leaderboard(&query).await?;

    info!(
        total_entries = page.total_entries,
        returned = page.entries.len(),
        "Leaderboard served"
    );
    Ok(Json(page))
}

/// GET /leaderboard/users/:user_id with the same filters as the leaderboard
#[instrument(name = "get_user_standing", skip(state))]
pub async fn get_user_standing(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(params): Query<LeaderboardParams>,
) -> Result<Json<RankedEntry>, AppError> {
    let query = params.into_query()?;

    state
        .leaderboard_service
        .user_standing(&user_id, &query)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No leaderboard entry for {}", user_id)))
}
