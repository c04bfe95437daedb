pub mod handlers;
pub mod models;
pub mod ranking;
pub mod repository;
pub mod service;

mod errors;

pub use errors::LeaderboardError;
pub use models::*;
pub use repository::{InMemoryLeaderboardRepository, LeaderboardRepository, PostgresLeaderboardRepository};
pub use service::{LeaderboardPage, LeaderboardService, SubmittedEntry};
