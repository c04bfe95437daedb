use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use strum::IntoEnumIterator;
use tracing::{debug, info, instrument};

use super::{
    ranking::{is_personal_best, rank_scope},
    repository::LeaderboardRepository,
    LeaderboardError, LeaderboardQuery, NewLeaderboardEntry, Period, RankedEntry, SortField,
};

/// Ranked slice of a leaderboard scope
#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardPage {
    pub sort_field: SortField,
    pub period: Option<Period>,
    pub game_mode: Option<String>,
    /// Size of the full scope before truncation
    pub total_entries: usize,
    pub entries: Vec<RankedEntry>,
}

/// Result of posting a finished game to the leaderboards
#[derive(Debug, Clone, Serialize)]
pub struct SubmittedEntry {
    pub entries: Vec<RankedEntry>,
    pub personal_best_score: bool,
    pub personal_best_lines: bool,
}

pub struct LeaderboardService {
    repository: Arc<dyn LeaderboardRepository>,
    default_limit: usize,
}

impl LeaderboardService {
    pub fn new(repository: Arc<dyn LeaderboardRepository>, default_limit: usize) -> Self {
        Self {
            repository,
            default_limit,
        }
    }

    /// Ranks the whole scope, then cuts it to the requested window so
    /// ranks reflect position in the full scope.
    #[instrument(skip(self))]
    pub async fn get_leaderboard(
        &self,
        query: &LeaderboardQuery,
    ) -> Result<LeaderboardPage, LeaderboardError> {
        let entries = self
            .repository
            .load_scoped_entries(query.period, query.game_mode.as_deref())
            .await?;

        let mut ranked = rank_scope(
            entries,
            query.sort_field,
            query.period,
            query.game_mode.as_deref(),
        );
        let total_entries = ranked.len();
        ranked.truncate(query.limit.unwrap_or(self.default_limit));

        debug!(
            total_entries,
            returned = ranked.len(),
            sort_field = %query.sort_field,
            "Leaderboard ranked"
        );

        Ok(LeaderboardPage {
            sort_field: query.sort_field,
            period: query.period,
            game_mode: query.game_mode.clone(),
            total_entries,
            entries: ranked,
        })
    }

    /// Posts one entry per period for a finished game
    #[instrument(skip(self, new_entry), fields(user_id = %new_entry.user_id))]
    pub async fn submit_entry(
        &self,
        new_entry: NewLeaderboardEntry,
    ) -> Result<SubmittedEntry, LeaderboardError> {
        new_entry.validate()?;

        let previous = self
            .repository
            .load_user_entries(
                &new_entry.user_id,
                Some(Period::AllTime),
                Some(&new_entry.game_mode),
            )
            .await?;

        let now = Utc::now();
        let entries: Vec<RankedEntry> = Period::iter()
            .map(|period| new_entry.clone().into_entry(period, now))
            .collect();
        self.repository.insert_entries(&entries).await?;

        let all_time = entries
            .iter()
            .find(|entry| entry.period == Period::AllTime)
            .ok_or_else(|| LeaderboardError::Repository("All-time entry missing".to_string()))?;
        let personal_best_score = is_personal_best(all_time, &previous, SortField::Score);
        let personal_best_lines = is_personal_best(all_time, &previous, SortField::LinesCleared);

        info!(
            score = new_entry.score,
            lines_cleared = new_entry.lines_cleared,
            game_mode = %new_entry.game_mode,
            personal_best_score,
            "Leaderboard entries submitted"
        );

        Ok(SubmittedEntry {
            entries,
            personal_best_score,
            personal_best_lines,
        })
    }

    /// The user's best placement in the scope, if they have any entry there
    #[instrument(skip(self))]
    pub async fn user_standing(
        &self,
        user_id: &str,
        query: &LeaderboardQuery,
    ) -> Result<Option<RankedEntry>, LeaderboardError> {
        let entries = self
            .repository
            .load_scoped_entries(query.period, query.game_mode.as_deref())
            .await?;

        Ok(rank_scope(
            entries,
            query.sort_field,
            query.period,
            query.game_mode.as_deref(),
        )
        .into_iter()
        .find(|entry| entry.user_id == user_id))
    }

    /// Recomputes and persists the stored rank column for one
    /// (period, game_mode) scope. Stored ranks are always score ranks.
    #[instrument(skip(self))]
    pub async fn refresh_ranks(
        &self,
        period: Period,
        game_mode: &str,
    ) -> Result<usize, LeaderboardError> {
        super::validate_game_mode(game_mode)?;

        let entries = self
            .repository
            .load_scoped_entries(Some(period), Some(game_mode))
            .await?;
        let ranked = rank_scope(entries, SortField::Score, Some(period), Some(game_mode));

        let ranks: Vec<_> = ranked.iter().map(|entry| (entry.id, entry.rank)).collect();
        self.repository.save_ranks(&ranks).await?;

        info!(period = %period, game_mode, updated = ranks.len(), "Ranks refreshed");
        Ok(ranks.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leaderboard::InMemoryLeaderboardRepository;
    use async_trait::async_trait;
    use uuid::Uuid;

    /// Stores nothing and rejects every batch, like a database aborting the insert
    struct RejectingRepository {
        inner: InMemoryLeaderboardRepository,
    }

    #[async_trait]
    impl LeaderboardRepository for RejectingRepository {
        async fn load_scoped_entries(
            &self,
            period: Option<Period>,
            game_mode: Option<&str>,
        ) -> Result<Vec<RankedEntry>, LeaderboardError> {
            self.inner.load_scoped_entries(period, game_mode).await
        }

        async fn load_user_entries(
            &self,
            user_id: &str,
            period: Option<Period>,
            game_mode: Option<&str>,
        ) -> Result<Vec<RankedEntry>, LeaderboardError> {
            self.inner.load_user_entries(user_id, period, game_mode).await
        }

        async fn insert_entries(&self, _: &[RankedEntry]) -> Result<(), LeaderboardError> {
            Err(LeaderboardError::Repository("connection reset".to_string()))
        }

        async fn save_ranks(&self, ranks: &[(Uuid, u32)]) -> Result<(), LeaderboardError> {
            self.inner.save_ranks(ranks).await
        }
    }

    fn new_entry(user: &str, score: i64, lines: i64) -> NewLeaderboardEntry {
        NewLeaderboardEntry {
            user_id: user.to_string(),
            display_name: user.to_uppercase(),
            score,
            lines_cleared: lines,
            game_mode: "classic".to_string(),
        }
    }

    fn service(repo: Arc<InMemoryLeaderboardRepository>) -> LeaderboardService {
        LeaderboardService::new(repo, 100)
    }

    #[tokio::test]
    async fn submit_creates_one_entry_per_period() {
        let repo = Arc::new(InMemoryLeaderboardRepository::new());
        let service = service(repo.clone());

        let submitted = service.submit_entry(new_entry("alice", 300, 6)).await.unwrap();

        assert_eq!(submitted.entries.len(), 3);
        assert!(submitted.personal_best_score);
        assert!(submitted.personal_best_lines);
        assert_eq!(repo.entry_count().await, 3);
    }

    #[tokio::test]
    async fn failed_submit_leaves_no_entries_behind() {
        let repo = Arc::new(RejectingRepository {
            inner: InMemoryLeaderboardRepository::new(),
        });
        let service = LeaderboardService::new(repo.clone(), 100);

        let result = service.submit_entry(new_entry("alice", 300, 6)).await;

        assert!(matches!(result, Err(LeaderboardError::Repository(_))));
        assert_eq!(repo.inner.entry_count().await, 0);
    }

    #[tokio::test]
    async fn submit_reports_personal_best_against_prior_games() {
        let repo = Arc::new(InMemoryLeaderboardRepository::new());
        let service = service(repo);

        service.submit_entry(new_entry("alice", 900, 3)).await.unwrap();
        let second = service.submit_entry(new_entry("alice", 400, 12)).await.unwrap();

        assert!(!second.personal_best_score);
        assert!(second.personal_best_lines);
    }

    #[tokio::test]
    async fn submit_rejects_invalid_game_mode() {
        let service = service(Arc::new(InMemoryLeaderboardRepository::new()));
        let mut entry = new_entry("alice", 1, 1);
        entry.game_mode = "Not A Mode".to_string();

        let result = service.submit_entry(entry).await;
        assert!(matches!(result, Err(LeaderboardError::Validation(_))));
    }

    #[tokio::test]
    async fn limit_truncates_after_ranking() {
        let service = service(Arc::new(InMemoryLeaderboardRepository::new()));
        for (user, score) in [("a", 100), ("b", 500), ("c", 300), ("d", 200)] {
            service.submit_entry(new_entry(user, score, 1)).await.unwrap();
        }

        let query = LeaderboardQuery::new(SortField::Score)
            .with_period(Period::Weekly)
            .with_limit(2);
        let page = service.get_leaderboard(&query).await.unwrap();

        assert_eq!(page.total_entries, 4);
        let top: Vec<(&str, u32)> = page
            .entries
            .iter()
            .map(|e| (e.user_id.as_str(), e.rank))
            .collect();
        assert_eq!(top, vec![("b", 1), ("c", 2)]);
    }

    #[tokio::test]
    async fn user_standing_reflects_full_scope() {
        let service = service(Arc::new(InMemoryLeaderboardRepository::new()));
        for (user, score) in [("a", 100), ("b", 500), ("c", 300)] {
            service.submit_entry(new_entry(user, score, 1)).await.unwrap();
        }

        let query = LeaderboardQuery::new(SortField::Score)
            .with_period(Period::Monthly)
            .with_limit(1);
        let standing = service.user_standing("a", &query).await.unwrap().unwrap();
        assert_eq!(standing.rank, 3);

        assert!(service.user_standing("zed", &query).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn refresh_ranks_persists_score_ranks() {
        let repo = Arc::new(InMemoryLeaderboardRepository::new());
        let service = service(repo.clone());
        service.submit_entry(new_entry("a", 100, 9)).await.unwrap();
        service.submit_entry(new_entry("b", 200, 1)).await.unwrap();

        let updated = service.refresh_ranks(Period::AllTime, "classic").await.unwrap();
        assert_eq!(updated, 2);

        let a = repo
            .load_user_entries("a", Some(Period::AllTime), None)
            .await
            .unwrap();
        assert_eq!(a[0].rank, 2);
        let weekly_a = repo
            .load_user_entries("a", Some(Period::Weekly), None)
            .await
            .unwrap();
        assert_eq!(weekly_a[0].rank, 0);
    }
}
