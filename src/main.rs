use std::sync::Arc;

use blockstats::{
    app,
    leaderboard::{
        InMemoryLeaderboardRepository, LeaderboardRepository, LeaderboardService,
        PostgresLeaderboardRepository,
    },
    stats::{
        InMemoryStatsRepository, PostgresStatsRepository, StatisticsAccumulator, StatsRepository,
        StatsService,
    },
    AppConfig, AppState,
};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "blockstats=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();
    info!(bind_addr = %config.bind_addr, "Starting block-stacking stats server");

    let (stats_repository, leaderboard_repository): (
        Arc<dyn StatsRepository>,
        Arc<dyn LeaderboardRepository>,
    ) = match &config.database_url {
        Some(database_url) => {
            let pool = match sqlx::PgPool::connect(database_url).await {
                Ok(pool) => pool,
                Err(e) => {
                    error!(error = %e, "Failed to connect to database");
                    std::process::exit(1);
                }
            };
            info!("Using PostgreSQL repositories");
            (
                Arc::new(PostgresStatsRepository::new(pool.clone(), config.lock_timeout)),
                Arc::new(PostgresLeaderboardRepository::new(pool)),
            )
        }
        None => {
            info!("DATABASE_URL not set, using in-memory repositories");
            (
                Arc::new(InMemoryStatsRepository::with_lock_timeout(config.lock_timeout)),
                Arc::new(InMemoryLeaderboardRepository::new()),
            )
        }
    };

    let stats_service = StatsService::builder(stats_repository)
        .with_accumulator(StatisticsAccumulator::new(config.rating_baseline))
        .with_retry_policy(config.retry_policy)
        .build();
    let leaderboard_service =
        LeaderboardService::new(leaderboard_repository, config.leaderboard_default_limit);

    let app_state = AppState::new(Arc::new(stats_service), Arc::new(leaderboard_service));

    let listener = match tokio::net::TcpListener::bind(&config.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, bind_addr = %config.bind_addr, "Failed to bind listener");
            std::process::exit(1);
        }
    };
    info!("Server running on http://{}", config.bind_addr);

    if let Err(e) = axum::serve(listener, app(app_state)).await {
        error!(error = %e, "Server error");
    }
}
