use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::error;

use crate::leaderboard::{LeaderboardError, LeaderboardService};
use crate::stats::{StatsError, StatsService};

/// Shared application state containing all dependencies
#[derive(Clone)]
pub struct AppState {
    pub stats_service: Arc<StatsService>,
    pub leaderboard_service: Arc<LeaderboardService>,
}

impl AppState {
    pub fn new(
        stats_service: Arc<StatsService>,
        leaderboard_service: Arc<LeaderboardService>,
    ) -> Self {
        Self {
            stats_service,
            leaderboard_service,
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<StatsError> for AppError {
    fn from(err: StatsError) -> Self {
        match err {
            StatsError::Validation(msg) => AppError::BadRequest(msg),
            StatsError::TransientPersistence(_) | StatsError::RetryExhausted { .. } => {
                AppError::ServiceUnavailable(err.to_string())
            }
            StatsError::FatalPersistence(msg) => AppError::DatabaseError(msg),
        }
    }
}

impl From<LeaderboardError> for AppError {
    fn from(err: LeaderboardError) -> Self {
        match err {
            LeaderboardError::Validation(msg) => AppError::BadRequest(msg),
            LeaderboardError::Repository(msg) => AppError::DatabaseError(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ServiceUnavailable(msg) => {
                error!(error = %msg, "Statistics store unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, msg)
            }
            AppError::DatabaseError(msg) => {
                // Storage details stay in the logs
                error!(error = %msg, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": error_message
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_domain_errors_to_status_codes() {
        let cases = [
            (
                AppError::from(StatsError::Validation("duration".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::from(StatsError::RetryExhausted { attempts: 5 }),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                AppError::from(StatsError::TransientPersistence("deadlock".into())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                AppError::from(StatsError::FatalPersistence("schema".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                AppError::from(LeaderboardError::Validation("period".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::from(LeaderboardError::Repository("down".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (AppError::NotFound("user".into()), StatusCode::NOT_FOUND),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[tokio::test]
    async fn database_errors_hide_details() {
        let response = AppError::DatabaseError("relation missing".into()).into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"], "Internal server error");
    }
}
