use std::sync::Arc;
use std::time::Duration;

use blockstats::{
    app,
    leaderboard::{InMemoryLeaderboardRepository, LeaderboardService},
    stats::{InMemoryStatsRepository, RetryPolicy, StatsRepository, StatsService},
    AppState,
};

// ============================================================================
// Test Setup Infrastructure
// ============================================================================

pub struct TestSetup {
    pub stats_repository: Arc<dyn StatsRepository>,
    pub leaderboard_repository: Arc<InMemoryLeaderboardRepository>,
    pub stats_service: Arc<StatsService>,
    pub leaderboard_service: Arc<LeaderboardService>,
}

impl TestSetup {
    pub fn state(&self) -> AppState {
        AppState::new(self.stats_service.clone(), self.leaderboard_service.clone())
    }

    pub fn router(&self) -> axum::Router {
        app(self.state())
    }
}

pub struct TestSetupBuilder {
    stats_repository: Option<Arc<dyn StatsRepository>>,
    retry_policy: RetryPolicy,
    lock_timeout: Duration,
}

impl TestSetupBuilder {
    pub fn new() -> Self {
        Self {
            stats_repository: None,
            retry_policy: RetryPolicy::immediate(5),
            lock_timeout: Duration::from_secs(2),
        }
    }

    pub fn with_stats_repository(mut self, repository: Arc<dyn StatsRepository>) -> Self {
        self.stats_repository = Some(repository);
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn build(self) -> TestSetup {
        let lock_timeout = self.lock_timeout;
        let stats_repository = self.stats_repository.unwrap_or_else(|| {
            Arc::new(InMemoryStatsRepository::with_lock_timeout(lock_timeout))
        });
        let leaderboard_repository = Arc::new(InMemoryLeaderboardRepository::new());

        let stats_service = Arc::new(
            StatsService::builder(stats_repository.clone())
                .with_retry_policy(self.retry_policy)
                .build(),
        );
        let leaderboard_service = Arc::new(LeaderboardService::new(
            leaderboard_repository.clone(),
            100,
        ));

        TestSetup {
            stats_repository,
            leaderboard_repository,
            stats_service,
            leaderboard_service,
        }
    }
}
