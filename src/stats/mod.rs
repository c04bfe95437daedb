pub mod accumulator;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod retry;
pub mod service;

mod errors;

pub use accumulator::{RatingDelta, StatisticsAccumulator};
pub use errors::StatsError;
pub use models::*;
pub use repository::{
    InMemoryStatsRepository, PostgresStatsRepository, StatsRepository, StatsTransaction,
};
pub use retry::RetryPolicy;
pub use service::{StatsService, StatsServiceBuilder};
