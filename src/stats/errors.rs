use thiserror::Error;
use tracing::debug;

/// SQLSTATE codes worth retrying: serialization_failure, deadlock_detected,
/// lock_not_available, query_canceled (lock/statement timeout) and
/// unique_violation (two first-session inserts racing).
const TRANSIENT_SQLSTATES: &[&str] = &["40001", "40P01", "55P03", "57014", "23505"];

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Transient persistence failure: {0}")]
    TransientPersistence(String),

    #[error("Persistence failure: {0}")]
    FatalPersistence(String),

    #[error("Statistics update gave up after {attempts} attempts")]
    RetryExhausted { attempts: u32 },
}

impl StatsError {
    /// Whether the whole read-compute-write sequence may be retried
    pub fn is_transient(&self) -> bool {
        matches!(self, StatsError::TransientPersistence(_))
    }
}

impl From<sqlx::Error> for StatsError {
    fn from(err: sqlx::Error) -> Self {
        let transient = match &err {
            sqlx::Error::Database(db_err) => db_err
                .code()
                .map(|code| TRANSIENT_SQLSTATES.contains(&code.as_ref()))
                .unwrap_or(false),
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
            _ => false,
        };

        debug!(error = %err, transient, "Classified database error");

        if transient {
            StatsError::TransientPersistence(err.to_string())
        } else {
            StatsError::FatalPersistence(err.to_string())
        }
    }
}
