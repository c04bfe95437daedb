use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use super::{
    accumulator::StatisticsAccumulator, repository::StatsRepository, retry::RetryPolicy,
    GameSessionResult, StatisticsRecord, StatisticsSummary, StatsError, StatsTransaction,
};

/// Mutation applied to a user's record inside a locked transaction
enum StatsMutation<'a> {
    Session(&'a GameSessionResult),
    ResetStreak,
}

/// Owns every write to user statistics.
///
/// Each mutation runs as lock → read → compute → write → commit. A transient
/// failure anywhere restarts the whole sequence from a fresh read, up to the
/// retry policy's attempt budget.
pub struct StatsService {
    repository: Arc<dyn StatsRepository>,
    accumulator: StatisticsAccumulator,
    retry_policy: RetryPolicy,
}

impl StatsService {
    pub fn builder(repository: Arc<dyn StatsRepository>) -> StatsServiceBuilder {
        StatsServiceBuilder::new(repository)
    }

    pub fn accumulator(&self) -> &StatisticsAccumulator {
        &self.accumulator
    }

    /// Applies one completed session to the user's lifetime statistics.
    ///
    /// Not idempotent: calling twice for the same session counts it twice.
    #[instrument(skip(self, session))]
    pub async fn record_session_completion(
        &self,
        user_id: &str,
        session: &GameSessionResult,
    ) -> Result<StatisticsRecord, StatsError> {
        validate_user_id(user_id)?;
        session.validate()?;

        let record = self
            .with_retry(user_id, StatsMutation::Session(session))
            .await?
            .ok_or_else(|| {
                StatsError::FatalPersistence(format!("Session for {} produced no record", user_id))
            })?;

        info!(
            user_id = %user_id,
            total_games = record.total_games,
            rating = record.rating,
            "Session recorded"
        );
        Ok(record)
    }

    /// Ends the user's current streak. Returns `None` if the user has no statistics yet.
    #[instrument(skip(self))]
    pub async fn reset_streak(&self, user_id: &str) -> Result<Option<StatisticsRecord>, StatsError> {
        validate_user_id(user_id)?;
        self.with_retry(user_id, StatsMutation::ResetStreak).await
    }

    #[instrument(skip(self))]
    pub async fn get_user_statistics(
        &self,
        user_id: &str,
    ) -> Result<Option<StatisticsRecord>, StatsError> {
        validate_user_id(user_id)?;
        self.repository.load_statistics(user_id).await
    }

    #[instrument(skip(self))]
    pub async fn get_user_statistics_summary(
        &self,
        user_id: &str,
    ) -> Result<Option<StatisticsSummary>, StatsError> {
        Ok(self
            .get_user_statistics(user_id)
            .await?
            .map(StatisticsSummary::from))
    }

    /// Rolls several users' records into one. Users without statistics are
    /// ignored and a user listed twice is counted once.
    #[instrument(skip(self))]
    pub async fn aggregate_users(&self, user_ids: &[String]) -> Result<StatisticsRecord, StatsError> {
        for user_id in user_ids {
            validate_user_id(user_id)?;
        }

        let unique: Vec<String> = user_ids
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let records = self.repository.load_statistics_for(&unique).await?;
        debug!(requested = unique.len(), found = records.len(), "Aggregating statistics");
        Ok(self.accumulator.aggregate(&records))
    }

    async fn with_retry(
        &self,
        user_id: &str,
        mutation: StatsMutation<'_>,
    ) -> Result<Option<StatisticsRecord>, StatsError> {
        let max_attempts = self.retry_policy.max_attempts;

        for attempt in 1..=max_attempts {
            match self.attempt(user_id, &mutation).await {
                Ok(record) => return Ok(record),
                Err(err) if err.is_transient() => {
                    warn!(
                        user_id = %user_id,
                        attempt,
                        max_attempts,
                        error = %err,
                        "Transient failure updating statistics, retrying from a fresh read"
                    );
                    if attempt < max_attempts {
                        tokio::time::sleep(self.retry_policy.backoff(attempt)).await;
                    }
                }
                Err(err) => {
                    error!(user_id = %user_id, error = %err, "Statistics update failed");
                    return Err(err);
                }
            }
        }

        error!(user_id = %user_id, attempts = max_attempts, "Statistics update retries exhausted");
        Err(StatsError::RetryExhausted {
            attempts: max_attempts,
        })
    }

    async fn attempt(
        &self,
        user_id: &str,
        mutation: &StatsMutation<'_>,
    ) -> Result<Option<StatisticsRecord>, StatsError> {
        let mut tx = self.repository.begin().await?;

        match self.apply_locked(tx.as_mut(), user_id, mutation).await {
            Ok(record) => {
                tx.commit().await?;
                Ok(record)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(user_id = %user_id, error = %rollback_err, "Rollback failed");
                }
                Err(err)
            }
        }
    }

    async fn apply_locked(
        &self,
        tx: &mut dyn StatsTransaction,
        user_id: &str,
        mutation: &StatsMutation<'_>,
    ) -> Result<Option<StatisticsRecord>, StatsError> {
        let current = tx.lock_statistics(user_id).await?;

        match (mutation, current) {
            (StatsMutation::Session(session), Some(current)) => {
                let next = self.accumulator.apply_session(&current, session);
                tx.update_statistics(&next).await?;
                Ok(Some(next))
            }
            (StatsMutation::Session(session), None) => {
                debug!(user_id = %user_id, "Creating initial statistics record");
                let next = self.accumulator.initial_record(user_id, session);
                tx.insert_statistics(&next).await?;
                Ok(Some(next))
            }
            (StatsMutation::ResetStreak, Some(current)) => {
                let next = self.accumulator.reset_streak(&current);
                tx.update_statistics(&next).await?;
                Ok(Some(next))
            }
            (StatsMutation::ResetStreak, None) => Ok(None),
        }
    }
}

fn validate_user_id(user_id: &str) -> Result<(), StatsError> {
    if user_id.trim().is_empty() {
        return Err(StatsError::Validation("User ID cannot be empty".to_string()));
    }
    Ok(())
}

pub struct StatsServiceBuilder {
    repository: Arc<dyn StatsRepository>,
    accumulator: StatisticsAccumulator,
    retry_policy: RetryPolicy,
}

impl StatsServiceBuilder {
    fn new(repository: Arc<dyn StatsRepository>) -> Self {
        Self {
            repository,
            accumulator: StatisticsAccumulator::default(),
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_accumulator(mut self, accumulator: StatisticsAccumulator) -> Self {
        self.accumulator = accumulator;
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn build(self) -> StatsService {
        StatsService {
            repository: self.repository,
            accumulator: self.accumulator,
            retry_policy: self.retry_policy,
        }
    }
}
