use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::{LeaderboardError, Period, RankedEntry};

/// Trait for leaderboard entry persistence
#[async_trait]
pub trait LeaderboardRepository: Send + Sync {
    /// Loads every entry in the scope; `None` filters match everything.
    /// Weekly and monthly entries submitted before their current window
    /// are left out. Entries come back in a stable order (oldest first).
    async fn load_scoped_entries(
        &self,
        period: Option<Period>,
        game_mode: Option<&str>,
    ) -> Result<Vec<RankedEntry>, LeaderboardError>;

    async fn load_user_entries(
        &self,
        user_id: &str,
        period: Option<Period>,
        game_mode: Option<&str>,
    ) -> Result<Vec<RankedEntry>, LeaderboardError>;

    /// Writes all entries or none of them
    async fn insert_entries(&self, entries: &[RankedEntry]) -> Result<(), LeaderboardError>;

    /// Persists previously computed ranks, keyed by entry id
    async fn save_ranks(&self, ranks: &[(Uuid, u32)]) -> Result<(), LeaderboardError>;
}

/// In-memory implementation of LeaderboardRepository for development and testing
#[derive(Debug, Default)]
pub struct InMemoryLeaderboardRepository {
    entries: Arc<RwLock<Vec<RankedEntry>>>,
}

impl InMemoryLeaderboardRepository {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Creates an in-memory repository with pre-populated entries
    pub fn with_entries(entries: Vec<RankedEntry>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(entries)),
        }
    }

    pub async fn entry_count(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl LeaderboardRepository for InMemoryLeaderboardRepository {
    #[instrument(skip(self))]
    async fn load_scoped_entries(
        &self,
        period: Option<Period>,
        game_mode: Option<&str>,
    ) -> Result<Vec<RankedEntry>, LeaderboardError> {
        let now = Utc::now();
        let entries = self.entries.read().await;
        let scoped: Vec<RankedEntry> = entries
            .iter()
            .filter(|entry| entry.in_scope(period, game_mode) && entry.is_current(now))
            .cloned()
            .collect();

        debug!(count = scoped.len(), "Loaded scoped entries from memory");
        Ok(scoped)
    }

    #[instrument(skip(self))]
    async fn load_user_entries(
        &self,
        user_id: &str,
        period: Option<Period>,
        game_mode: Option<&str>,
    ) -> Result<Vec<RankedEntry>, LeaderboardError> {
        let now = Utc::now();
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|entry| {
                entry.user_id == user_id
                    && entry.in_scope(period, game_mode)
                    && entry.is_current(now)
            })
            .cloned()
            .collect())
    }

    #[instrument(skip(self, batch), fields(count = batch.len()))]
    async fn insert_entries(&self, batch: &[RankedEntry]) -> Result<(), LeaderboardError> {
        let mut entries = self.entries.write().await;

        let mut seen: HashSet<Uuid> = entries.iter().map(|existing| existing.id).collect();
        if let Some(duplicate) = batch.iter().find(|entry| !seen.insert(entry.id)) {
            warn!(entry_id = %duplicate.id, "Entry already exists in memory");
            return Err(LeaderboardError::Repository(format!(
                "Entry {} already exists",
                duplicate.id
            )));
        }

        entries.extend(batch.iter().cloned());
        debug!(inserted = batch.len(), "Inserted entries in memory");
        Ok(())
    }

    #[instrument(skip(self, ranks))]
    async fn save_ranks(&self, ranks: &[(Uuid, u32)]) -> Result<(), LeaderboardError> {
        let mut entries = self.entries.write().await;
        let now = chrono::Utc::now();
        for (id, rank) in ranks {
            if let Some(entry) = entries.iter_mut().find(|entry| entry.id == *id) {
                entry.rank = *rank;
                entry.updated_at = now;
            }
        }

        debug!(updated = ranks.len(), "Saved ranks in memory");
        Ok(())
    }
}

/// PostgreSQL implementation of leaderboard repository
pub struct PostgresLeaderboardRepository {
    pool: PgPool,
}

impl PostgresLeaderboardRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn entry_from_row(row: &PgRow) -> Result<RankedEntry, LeaderboardError> {
        let period: String = row.try_get("period")?;
        let rank: i32 = row.try_get("rank")?;

        Ok(RankedEntry {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            display_name: row.try_get("display_name")?,
            score: row.try_get("score")?,
            lines_cleared: row.try_get("lines_cleared")?,
            game_mode: row.try_get("game_mode")?,
            period: Period::parse(&period)
                .map_err(|e| LeaderboardError::Repository(e.to_string()))?,
            rank: u32::try_from(rank).map_err(|_| {
                LeaderboardError::Repository(format!("Negative stored rank {}", rank))
            })?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

const ENTRY_COLUMNS: &str =
    "id, user_id, display_name, score, lines_cleared, game_mode, period, rank, created_at, updated_at";

/// SQL keeping weekly and monthly rows inside their current window. Binds the
/// weekly start at `$first` and the monthly start at `$first + 1`.
fn current_window_clause(first: usize) -> String {
    format!(
        "(period <> '{weekly}' OR created_at >= ${w}) AND (period <> '{monthly}' OR created_at >= ${m})",
        weekly = Period::Weekly,
        monthly = Period::Monthly,
        w = first,
        m = first + 1,
    )
}

fn window_starts(now: DateTime<Utc>) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    (
        Period::Weekly.window_start(now),
        Period::Monthly.window_start(now),
    )
}

fn stored_rank(rank: u32) -> Result<i32, LeaderboardError> {
    i32::try_from(rank).map_err(|_| {
        LeaderboardError::Repository(format!("Rank {} does not fit the rank column", rank))
    })
}

#[async_trait]
impl LeaderboardRepository for PostgresLeaderboardRepository {
    #[instrument(skip(self))]
    async fn load_scoped_entries(
        &self,
        period: Option<Period>,
        game_mode: Option<&str>,
    ) -> Result<Vec<RankedEntry>, LeaderboardError> {
        let query = format!(
            "SELECT {} FROM leaderboard_entries \
             WHERE ($1::TEXT IS NULL OR period = $1) AND ($2::TEXT IS NULL OR game_mode = $2) \
             AND {} \
             ORDER BY created_at ASC, id ASC",
            ENTRY_COLUMNS,
            current_window_clause(3)
        );
        let (weekly_start, monthly_start) = window_starts(Utc::now());

        let rows = sqlx::query(&query)
            .bind(period.map(|p| p.to_string()))
            .bind(game_mode)
            .bind(weekly_start)
            .bind(monthly_start)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to load scoped entries from database");
                LeaderboardError::from(e)
            })?;

        debug!(count = rows.len(), "Loaded scoped entries from database");
        rows.iter().map(Self::entry_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn load_user_entries(
        &self,
        user_id: &str,
        period: Option<Period>,
        game_mode: Option<&str>,
    ) -> Result<Vec<RankedEntry>, LeaderboardError> {
        let query = format!(
            "SELECT {} FROM leaderboard_entries \
             WHERE user_id = $1 AND ($2::TEXT IS NULL OR period = $2) AND ($3::TEXT IS NULL OR game_mode = $3) \
             AND {} \
             ORDER BY created_at ASC, id ASC",
            ENTRY_COLUMNS,
            current_window_clause(4)
        );
        let (weekly_start, monthly_start) = window_starts(Utc::now());

        let rows = sqlx::query(&query)
            .bind(user_id)
            .bind(period.map(|p| p.to_string()))
            .bind(game_mode)
            .bind(weekly_start)
            .bind(monthly_start)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                warn!(error = %e, user_id = %user_id, "Failed to load user entries from database");
                LeaderboardError::from(e)
            })?;

        rows.iter().map(Self::entry_from_row).collect()
    }

    #[instrument(skip(self, batch), fields(count = batch.len()))]
    async fn insert_entries(&self, batch: &[RankedEntry]) -> Result<(), LeaderboardError> {
        let mut tx = self.pool.begin().await?;

        for entry in batch {
            sqlx::query(&format!(
                "INSERT INTO leaderboard_entries ({}) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
                ENTRY_COLUMNS
            ))
            .bind(entry.id)
            .bind(&entry.user_id)
            .bind(&entry.display_name)
            .bind(entry.score)
            .bind(entry.lines_cleared)
            .bind(&entry.game_mode)
            .bind(entry.period.to_string())
            .bind(stored_rank(entry.rank)?)
            .bind(entry.created_at)
            .bind(entry.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                warn!(error = %e, entry_id = %entry.id, "Failed to insert entry in database");
                LeaderboardError::from(e)
            })?;
        }

        // Dropping the transaction on an early return rolls back the whole batch
        tx.commit().await?;
        debug!(inserted = batch.len(), "Inserted entries in database");
        Ok(())
    }

    #[instrument(skip(self, ranks))]
    async fn save_ranks(&self, ranks: &[(Uuid, u32)]) -> Result<(), LeaderboardError> {
        let ids: Vec<Uuid> = ranks.iter().map(|(id, _)| *id).collect();
        let values = ranks
            .iter()
            .map(|(_, rank)| stored_rank(*rank))
            .collect::<Result<Vec<i32>, _>>()?;

        let result = sqlx::query(
            "UPDATE leaderboard_entries AS e SET rank = r.rank, updated_at = NOW() \
             FROM UNNEST($1::UUID[], $2::INT[]) AS r(id, rank) WHERE e.id = r.id",
        )
        .bind(&ids)
        .bind(&values)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to save ranks in database");
            LeaderboardError::from(e)
        })?;

        debug!(rows_affected = result.rows_affected(), "Saved ranks in database");
        Ok(())
    }
}
