use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use blockstats::stats::{
    InMemoryStatsRepository, StatisticsRecord, StatsError, StatsRepository, StatsTransaction,
};

// ============================================================================
// Mock Infrastructure
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub enum FailureMode {
    Transient,
    Fatal,
}

impl FailureMode {
    fn error(self) -> StatsError {
        match self {
            FailureMode::Transient => {
                StatsError::TransientPersistence("could not serialize access".to_string())
            }
            FailureMode::Fatal => {
                StatsError::FatalPersistence("column \"rating\" does not exist".to_string())
            }
        }
    }
}

/// Wraps the in-memory repository and fails the next `failures` commits
/// after rolling them back, like a database aborting the transaction.
pub struct FlakyStatsRepository {
    inner: InMemoryStatsRepository,
    remaining_failures: Arc<AtomicU32>,
    mode: FailureMode,
    transactions_started: Arc<AtomicU32>,
}

impl FlakyStatsRepository {
    pub fn new(inner: InMemoryStatsRepository, failures: u32, mode: FailureMode) -> Self {
        Self {
            inner,
            remaining_failures: Arc::new(AtomicU32::new(failures)),
            mode,
            transactions_started: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn always_failing(mode: FailureMode) -> Self {
        Self::new(InMemoryStatsRepository::new(), u32::MAX, mode)
    }

    pub fn transactions_started(&self) -> u32 {
        self.transactions_started.load(Ordering::SeqCst)
    }

    pub fn remaining_failures(&self) -> u32 {
        self.remaining_failures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatsRepository for FlakyStatsRepository {
    async fn begin(&self) -> Result<Box<dyn StatsTransaction>, StatsError> {
        self.transactions_started.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FlakyTransaction {
            inner: self.inner.begin().await?,
            remaining_failures: self.remaining_failures.clone(),
            mode: self.mode,
        }))
    }

    async fn load_statistics(
        &self,
        user_id: &str,
    ) -> Result<Option<StatisticsRecord>, StatsError> {
        self.inner.load_statistics(user_id).await
    }

    async fn load_statistics_for(
        &self,
        user_ids: &[String],
    ) -> Result<Vec<StatisticsRecord>, StatsError> {
        self.inner.load_statistics_for(user_ids).await
    }
}

struct FlakyTransaction {
    inner: Box<dyn StatsTransaction>,
    remaining_failures: Arc<AtomicU32>,
    mode: FailureMode,
}

#[async_trait]
impl StatsTransaction for FlakyTransaction {
    async fn lock_statistics(
        &mut self,
        user_id: &str,
    ) -> Result<Option<StatisticsRecord>, StatsError> {
        self.inner.lock_statistics(user_id).await
    }

    async fn insert_statistics(&mut self, record: &StatisticsRecord) -> Result<(), StatsError> {
        self.inner.insert_statistics(record).await
    }

    async fn update_statistics(&mut self, record: &StatisticsRecord) -> Result<(), StatsError> {
        self.inner.update_statistics(record).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StatsError> {
        let should_fail = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        if should_fail {
            self.inner.rollback().await?;
            return Err(self.mode.error());
        }
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<(), StatsError> {
        self.inner.rollback().await
    }
}
