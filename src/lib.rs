// Library crate for the block-stacking stats server
// This file exposes the public API for integration tests

pub mod config;
pub mod leaderboard;
pub mod shared;
pub mod stats;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

// Re-export commonly used types for easier access in tests
pub use config::AppConfig;
pub use leaderboard::{LeaderboardQuery, LeaderboardService, Period, RankedEntry, SortField};
pub use shared::{AppError, AppState};
pub use stats::{GameSessionResult, StatisticsRecord, StatsError, StatsService};

/// Builds the HTTP router over the given state
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "OK" }))
        .route("/leaderboard", get(leaderboard::handlers::get_leaderboard))
        .route(
            "/leaderboard/users/:user_id",
            get(leaderboard::handlers::get_user_standing),
        )
        .route("/users/:user_id/sessions", post(stats::handlers::record_session))
        .route("/users/:user_id/statistics", get(stats::handlers::get_statistics))
        .route(
            "/users/:user_id/statistics/summary",
            get(stats::handlers::get_statistics_summary),
        )
        .route("/users/:user_id/streak/reset", post(stats::handlers::reset_streak))
        .route(
            "/statistics/aggregate",
            post(stats::handlers::aggregate_statistics),
        )
        // Game clients call the API from the browser
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
