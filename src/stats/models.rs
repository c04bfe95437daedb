use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::StatsError;

/// Result of one completed game session, as reported by the client
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameSessionResult {
    pub score: i64,
    pub lines_cleared: i64,
    pub figures_placed: i64,
    /// Seconds
    pub duration: i64,
    pub moves_count: i64,
    /// Percentage in 0..=100
    pub placement_efficiency: f64,
    #[serde(default)]
    pub game_result: Option<String>,
}

impl GameSessionResult {
    pub fn validate(&self) -> Result<(), StatsError> {
        let counters = [
            ("score", self.score),
            ("lines_cleared", self.lines_cleared),
            ("figures_placed", self.figures_placed),
            ("duration", self.duration),
            ("moves_count", self.moves_count),
        ];
        if let Some((name, value)) = counters.iter().find(|(_, value)| *value < 0) {
            return Err(StatsError::Validation(format!(
                "{} must be non-negative, got {}",
                name, value
            )));
        }

        if !self.placement_efficiency.is_finite()
            || !(0.0..=100.0).contains(&self.placement_efficiency)
        {
            return Err(StatsError::Validation(format!(
                "placement_efficiency must be within 0..=100, got {}",
                self.placement_efficiency
            )));
        }

        Ok(())
    }
}

/// One user's lifetime aggregate.
///
/// `best_duration` uses 0 as "unset"; `rating` never drops below
/// [`super::accumulator::RATING_FLOOR`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsRecord {
    pub user_id: String,
    pub total_games: i64,
    pub total_score: i64,
    pub total_lines_cleared: i64,
    pub total_figures_placed: i64,
    pub total_duration: i64,
    pub total_moves: i64,
    pub best_score: i64,
    pub best_lines_cleared: i64,
    pub best_duration: i64,
    pub current_games_streak: i64,
    pub best_games_streak: i64,
    pub avg_placement_efficiency: f64,
    pub rating: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StatisticsRecord {
    /// A zeroed record carrying the given starting rating
    pub fn new(user_id: impl Into<String>, rating: f64) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            total_games: 0,
            total_score: 0,
            total_lines_cleared: 0,
            total_figures_placed: 0,
            total_duration: 0,
            total_moves: 0,
            best_score: 0,
            best_lines_cleared: 0,
            best_duration: 0,
            current_games_streak: 0,
            best_games_streak: 0,
            avg_placement_efficiency: 0.0,
            rating,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Read-side view of a record with per-game averages filled in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsSummary {
    #[serde(flatten)]
    pub record: StatisticsRecord,
    pub avg_score_per_game: f64,
    pub avg_lines_per_game: f64,
    pub avg_duration_per_game: f64,
    pub score_per_minute: f64,
}

impl From<StatisticsRecord> for StatisticsSummary {
    fn from(record: StatisticsRecord) -> Self {
        let per_game = |total: i64| ratio(total as f64, record.total_games as f64);

        let avg_score_per_game = per_game(record.total_score);
        let avg_lines_per_game = per_game(record.total_lines_cleared);
        let avg_duration_per_game = per_game(record.total_duration);
        let score_per_minute = ratio(record.total_score as f64 * 60.0, record.total_duration as f64);

        Self {
            record,
            avg_score_per_game,
            avg_lines_per_game,
            avg_duration_per_game,
            score_per_minute,
        }
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}
