use thiserror::Error;

#[derive(Debug, Error)]
pub enum LeaderboardError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Repository error: {0}")]
    Repository(String),
}

impl From<sqlx::Error> for LeaderboardError {
    fn from(err: sqlx::Error) -> Self {
        LeaderboardError::Repository(err.to_string())
    }
}
