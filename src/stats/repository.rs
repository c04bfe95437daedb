use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Postgres, Row, Transaction};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, RwLock};
use tracing::{debug, instrument, warn};

use super::{StatisticsRecord, StatsError};

/// Persistence contract for lifetime statistics.
///
/// Writes only happen through a [`StatsTransaction`]; plain reads are
/// unlocked and may observe a slightly stale record.
#[async_trait]
pub trait StatsRepository: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StatsTransaction>, StatsError>;

    async fn load_statistics(&self, user_id: &str)
        -> Result<Option<StatisticsRecord>, StatsError>;

    /// Loads the records that exist among `user_ids`, one per user, ordered
    /// by user id. Missing users are skipped.
    async fn load_statistics_for(
        &self,
        user_ids: &[String],
    ) -> Result<Vec<StatisticsRecord>, StatsError>;
}

/// A unit of work holding exclusive row locks until commit or rollback.
/// Dropping it without committing discards every write.
#[async_trait]
pub trait StatsTransaction: Send {
    /// Takes the exclusive lock on the user's row and reads it
    async fn lock_statistics(
        &mut self,
        user_id: &str,
    ) -> Result<Option<StatisticsRecord>, StatsError>;

    async fn insert_statistics(&mut self, record: &StatisticsRecord) -> Result<(), StatsError>;

    async fn update_statistics(&mut self, record: &StatisticsRecord) -> Result<(), StatsError>;

    async fn commit(self: Box<Self>) -> Result<(), StatsError>;

    async fn rollback(self: Box<Self>) -> Result<(), StatsError>;
}

type RecordMap = Arc<RwLock<HashMap<String, StatisticsRecord>>>;
type RowLocks = Arc<RwLock<HashMap<String, Arc<AsyncMutex<()>>>>>;

/// Removes the mutexes of `user_ids` that only the map still references.
/// Anyone waiting on a lock holds a clone, so a busy lock is never removed.
fn prune_idle_locks(locks: &mut HashMap<String, Arc<AsyncMutex<()>>>, user_ids: &[String]) {
    for user_id in user_ids {
        if locks
            .get(user_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(user_id);
        }
    }
}

/// In-memory implementation of StatsRepository for development and testing.
///
/// Each user id gets its own async mutex standing in for a row lock, so
/// transactions on different users never wait on each other.
#[derive(Debug)]
pub struct InMemoryStatsRepository {
    records: RecordMap,
    row_locks: RowLocks,
    lock_timeout: Duration,
}

impl Default for InMemoryStatsRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStatsRepository {
    pub fn new() -> Self {
        Self::with_lock_timeout(Duration::from_secs(2))
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            row_locks: Arc::new(RwLock::new(HashMap::new())),
            lock_timeout,
        }
    }

    /// Creates an in-memory repository with pre-populated records
    pub fn with_records(records: Vec<StatisticsRecord>) -> Self {
        let map = records
            .into_iter()
            .map(|record| (record.user_id.clone(), record))
            .collect();

        Self {
            records: Arc::new(RwLock::new(map)),
            ..Self::new()
        }
    }

    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }

    /// Number of users with a live row lock entry
    pub async fn tracked_lock_count(&self) -> usize {
        self.row_locks.read().await.len()
    }
}

#[async_trait]
impl StatsRepository for InMemoryStatsRepository {
    async fn begin(&self) -> Result<Box<dyn StatsTransaction>, StatsError> {
        Ok(Box::new(InMemoryStatsTransaction {
            records: self.records.clone(),
            row_locks: self.row_locks.clone(),
            lock_timeout: self.lock_timeout,
            held: HashMap::new(),
            pending: HashMap::new(),
        }))
    }

    #[instrument(skip(self))]
    async fn load_statistics(
        &self,
        user_id: &str,
    ) -> Result<Option<StatisticsRecord>, StatsError> {
        let records = self.records.read().await;
        Ok(records.get(user_id).cloned())
    }

    #[instrument(skip(self))]
    async fn load_statistics_for(
        &self,
        user_ids: &[String],
    ) -> Result<Vec<StatisticsRecord>, StatsError> {
        let records = self.records.read().await;
        let requested: BTreeSet<&String> = user_ids.iter().collect();
        Ok(requested
            .into_iter()
            .filter_map(|user_id| records.get(user_id).cloned())
            .collect())
    }
}

enum PendingWrite {
    Insert(StatisticsRecord),
    Update(StatisticsRecord),
}

impl PendingWrite {
    fn record(&self) -> &StatisticsRecord {
        match self {
            PendingWrite::Insert(record) | PendingWrite::Update(record) => record,
        }
    }
}

pub struct InMemoryStatsTransaction {
    records: RecordMap,
    row_locks: RowLocks,
    lock_timeout: Duration,
    held: HashMap<String, OwnedMutexGuard<()>>,
    pending: HashMap<String, PendingWrite>,
}

impl InMemoryStatsTransaction {
    async fn row_lock(&self, user_id: &str) -> Arc<AsyncMutex<()>> {
        {
            let guard = self.row_locks.read().await;
            if let Some(lock) = guard.get(user_id) {
                return lock.clone();
            }
        }

        let mut guard = self.row_locks.write().await;
        guard
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Releases every held row lock and forgets the ones nobody is waiting on
    async fn release_row_locks(&mut self) {
        if self.held.is_empty() {
            return;
        }

        let user_ids: Vec<String> = self.held.keys().cloned().collect();
        self.held.clear();

        let mut locks = self.row_locks.write().await;
        prune_idle_locks(&mut locks, &user_ids);
    }

    fn ensure_locked(&self, user_id: &str) -> Result<(), StatsError> {
        if self.held.contains_key(user_id) {
            Ok(())
        } else {
            Err(StatsError::FatalPersistence(format!(
                "Write to statistics of {} without holding its lock",
                user_id
            )))
        }
    }
}

#[async_trait]
impl StatsTransaction for InMemoryStatsTransaction {
    #[instrument(skip(self))]
    async fn lock_statistics(
        &mut self,
        user_id: &str,
    ) -> Result<Option<StatisticsRecord>, StatsError> {
        if !self.held.contains_key(user_id) {
            let lock = self.row_lock(user_id).await;
            let guard = tokio::time::timeout(self.lock_timeout, lock.lock_owned())
                .await
                .map_err(|_| {
                    warn!(user_id = %user_id, "Timed out waiting for statistics row lock");
                    StatsError::TransientPersistence(format!(
                        "Lock wait timed out for {}",
                        user_id
                    ))
                })?;
            self.held.insert(user_id.to_string(), guard);
            debug!(user_id = %user_id, "Acquired statistics row lock");
        }

        if let Some(write) = self.pending.get(user_id) {
            return Ok(Some(write.record().clone()));
        }

        let records = self.records.read().await;
        Ok(records.get(user_id).cloned())
    }

    async fn insert_statistics(&mut self, record: &StatisticsRecord) -> Result<(), StatsError> {
        self.ensure_locked(&record.user_id)?;

        let exists = self.pending.contains_key(&record.user_id)
            || self.records.read().await.contains_key(&record.user_id);
        if exists {
            return Err(StatsError::TransientPersistence(format!(
                "Statistics for {} already exist",
                record.user_id
            )));
        }

        self.pending
            .insert(record.user_id.clone(), PendingWrite::Insert(record.clone()));
        Ok(())
    }

    async fn update_statistics(&mut self, record: &StatisticsRecord) -> Result<(), StatsError> {
        self.ensure_locked(&record.user_id)?;

        let stored = self.records.read().await.contains_key(&record.user_id);
        let next = match self.pending.get(&record.user_id) {
            Some(PendingWrite::Insert(_)) => PendingWrite::Insert(record.clone()),
            Some(PendingWrite::Update(_)) => PendingWrite::Update(record.clone()),
            None if stored => PendingWrite::Update(record.clone()),
            None => {
                return Err(StatsError::FatalPersistence(format!(
                    "No statistics row for {}",
                    record.user_id
                )))
            }
        };

        self.pending.insert(record.user_id.clone(), next);
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StatsError> {
        let pending = std::mem::take(&mut self.pending);

        let mut records = self.records.write().await;
        for (user_id, write) in pending {
            let record = match write {
                PendingWrite::Insert(record) | PendingWrite::Update(record) => record,
            };
            records.insert(user_id, record);
        }
        drop(records);

        self.release_row_locks().await;
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), StatsError> {
        debug!(discarded = self.pending.len(), "Rolling back statistics transaction");
        self.pending.clear();
        self.release_row_locks().await;
        Ok(())
    }
}

impl Drop for InMemoryStatsTransaction {
    fn drop(&mut self) {
        if self.held.is_empty() {
            return;
        }

        // Abandoned without commit or rollback. Pruning is skipped when the
        // map is contended; the next release of the same user cleans it up.
        let user_ids: Vec<String> = self.held.keys().cloned().collect();
        self.held.clear();
        if let Ok(mut locks) = self.row_locks.try_write() {
            prune_idle_locks(&mut locks, &user_ids);
        }
    }
}

const STATISTICS_COLUMNS: &str = "user_id, total_games, total_score, total_lines_cleared, \
    total_figures_placed, total_duration, total_moves, best_score, best_lines_cleared, \
    best_duration, current_games_streak, best_games_streak, avg_placement_efficiency, rating, \
    created_at, updated_at";

fn record_from_row(row: &PgRow) -> Result<StatisticsRecord, StatsError> {
    Ok(StatisticsRecord {
        user_id: row.try_get("user_id")?,
        total_games: row.try_get("total_games")?,
        total_score: row.try_get("total_score")?,
        total_lines_cleared: row.try_get("total_lines_cleared")?,
        total_figures_placed: row.try_get("total_figures_placed")?,
        total_duration: row.try_get("total_duration")?,
        total_moves: row.try_get("total_moves")?,
        best_score: row.try_get("best_score")?,
        best_lines_cleared: row.try_get("best_lines_cleared")?,
        best_duration: row.try_get("best_duration")?,
        current_games_streak: row.try_get("current_games_streak")?,
        best_games_streak: row.try_get("best_games_streak")?,
        avg_placement_efficiency: row.try_get("avg_placement_efficiency")?,
        rating: row.try_get("rating")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// PostgreSQL implementation of statistics repository
pub struct PostgresStatsRepository {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresStatsRepository {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }
}

#[async_trait]
impl StatsRepository for PostgresStatsRepository {
    #[instrument(skip(self))]
    async fn begin(&self) -> Result<Box<dyn StatsTransaction>, StatsError> {
        let mut tx = self.pool.begin().await?;

        // Lock waits surface as 55P03, which the retry loop treats as transient
        sqlx::query(&format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis()
        ))
        .execute(&mut *tx)
        .await?;

        Ok(Box::new(PostgresStatsTransaction { tx }))
    }

    #[instrument(skip(self))]
    async fn load_statistics(
        &self,
        user_id: &str,
    ) -> Result<Option<StatisticsRecord>, StatsError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM user_statistics WHERE user_id = $1",
            STATISTICS_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, user_id = %user_id, "Failed to fetch statistics from database");
            StatsError::from(e)
        })?;

        row.as_ref().map(record_from_row).transpose()
    }

    #[instrument(skip(self))]
    async fn load_statistics_for(
        &self,
        user_ids: &[String],
    ) -> Result<Vec<StatisticsRecord>, StatsError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM user_statistics WHERE user_id = ANY($1) ORDER BY user_id",
            STATISTICS_COLUMNS
        ))
        .bind(user_ids)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }
}

pub struct PostgresStatsTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StatsTransaction for PostgresStatsTransaction {
    #[instrument(skip(self))]
    async fn lock_statistics(
        &mut self,
        user_id: &str,
    ) -> Result<Option<StatisticsRecord>, StatsError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM user_statistics WHERE user_id = $1 FOR UPDATE",
            STATISTICS_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn insert_statistics(&mut self, record: &StatisticsRecord) -> Result<(), StatsError> {
        // A racing first insert fails with 23505 and the caller retries from a fresh read
        sqlx::query(&format!(
            "INSERT INTO user_statistics ({}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
            STATISTICS_COLUMNS
        ))
        .bind(&record.user_id)
        .bind(record.total_games)
        .bind(record.total_score)
        .bind(record.total_lines_cleared)
        .bind(record.total_figures_placed)
        .bind(record.total_duration)
        .bind(record.total_moves)
        .bind(record.best_score)
        .bind(record.best_lines_cleared)
        .bind(record.best_duration)
        .bind(record.current_games_streak)
        .bind(record.best_games_streak)
        .bind(record.avg_placement_efficiency)
        .bind(record.rating)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn update_statistics(&mut self, record: &StatisticsRecord) -> Result<(), StatsError> {
        let result = sqlx::query(
            "UPDATE user_statistics SET total_games = $2, total_score = $3, total_lines_cleared = $4, \
             total_figures_placed = $5, total_duration = $6, total_moves = $7, best_score = $8, \
             best_lines_cleared = $9, best_duration = $10, current_games_streak = $11, \
             best_games_streak = $12, avg_placement_efficiency = $13, rating = $14, updated_at = $15 \
             WHERE user_id = $1",
        )
        .bind(&record.user_id)
        .bind(record.total_games)
        .bind(record.total_score)
        .bind(record.total_lines_cleared)
        .bind(record.total_figures_placed)
        .bind(record.total_duration)
        .bind(record.total_moves)
        .bind(record.best_score)
        .bind(record.best_lines_cleared)
        .bind(record.best_duration)
        .bind(record.current_games_streak)
        .bind(record.best_games_streak)
        .bind(record.avg_placement_efficiency)
        .bind(record.rating)
        .bind(record.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StatsError::FatalPersistence(format!(
                "No statistics row for {}",
                record.user_id
            )));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StatsError> {
        let PostgresStatsTransaction { tx } = *self;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StatsError> {
        let PostgresStatsTransaction { tx } = *self;
        tx.rollback().await?;
        Ok(())
    }
}
