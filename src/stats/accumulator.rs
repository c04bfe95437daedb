use chrono::Utc;
use serde::Serialize;

use super::{GameSessionResult, StatisticsRecord};

/// Lowest rating a record can hold
pub const RATING_FLOOR: f64 = 100.0;

/// Rating a brand new record starts from before its first session
pub const DEFAULT_BASELINE_RATING: f64 = 1000.0;

const SCORE_TERM_CAP: i64 = 20;
const LINES_TERM_CAP: f64 = 15.0;
const DURATION_TERM_CAP: f64 = 10.0;

/// Per-session rating bonus, each term capped independently
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RatingDelta {
    pub score_term: f64,
    pub lines_term: f64,
    pub efficiency_term: f64,
    pub duration_term: f64,
}

impl RatingDelta {
    pub fn for_session(session: &GameSessionResult) -> Self {
        let score_term = (session.score / 100).min(SCORE_TERM_CAP) as f64;
        let lines_term = (session.lines_cleared as f64 / 10.0).min(LINES_TERM_CAP);

        let efficiency_term = if session.placement_efficiency > 80.0 {
            10.0
        } else if session.placement_efficiency > 60.0 {
            5.0
        } else {
            0.0
        };

        // Bonus on score per minute
        let duration_term = if session.duration == 0 {
            0.0
        } else {
            let per_minute = session.score as f64 / session.duration as f64 * 60.0;
            (per_minute / 100.0).floor().min(DURATION_TERM_CAP)
        };

        Self {
            score_term,
            lines_term,
            efficiency_term,
            duration_term,
        }
    }

    pub fn total(&self) -> f64 {
        self.score_term + self.lines_term + self.efficiency_term + self.duration_term
    }
}

/// Pure statistics arithmetic: per-session updates, streak resets and
/// multi-record rollups. Holds only the starting rating for new records.
#[derive(Debug, Clone, Copy)]
pub struct StatisticsAccumulator {
    baseline_rating: f64,
}

impl Default for StatisticsAccumulator {
    fn default() -> Self {
        Self::new(DEFAULT_BASELINE_RATING)
    }
}

impl StatisticsAccumulator {
    pub fn new(baseline_rating: f64) -> Self {
        Self {
            baseline_rating: baseline_rating.max(RATING_FLOOR),
        }
    }

    pub fn baseline_rating(&self) -> f64 {
        self.baseline_rating
    }

    /// Record for a user's very first session: a fresh record at the
    /// baseline rating with the session applied on top.
    pub fn initial_record(&self, user_id: &str, session: &GameSessionResult) -> StatisticsRecord {
        self.apply_session(&StatisticsRecord::new(user_id, self.baseline_rating), session)
    }

    pub fn apply_session(
        &self,
        record: &StatisticsRecord,
        session: &GameSessionResult,
    ) -> StatisticsRecord {
        let mut next = record.clone();

        next.total_games = next.total_games.saturating_add(1);

        next.current_games_streak = next.current_games_streak.saturating_add(1);
        next.best_games_streak = next.best_games_streak.max(next.current_games_streak);

        next.total_score = next.total_score.saturating_add(session.score);
        next.best_score = next.best_score.max(session.score);

        next.total_lines_cleared = next.total_lines_cleared.saturating_add(session.lines_cleared);
        next.best_lines_cleared = next.best_lines_cleared.max(session.lines_cleared);

        next.total_figures_placed = next
            .total_figures_placed
            .saturating_add(session.figures_placed);

        next.total_duration = next.total_duration.saturating_add(session.duration);
        if next.best_duration == 0
            || (session.duration > 0 && session.duration < next.best_duration)
        {
            next.best_duration = session.duration;
        }

        next.total_moves = next.total_moves.saturating_add(session.moves_count);

        // total_games already counts this session
        let games = next.total_games as f64;
        next.avg_placement_efficiency = (record.avg_placement_efficiency * (games - 1.0)
            + session.placement_efficiency)
            / games;

        next.rating = self.rating_update(record, session);
        next.updated_at = Utc::now();

        next
    }

    pub fn rating_update(&self, record: &StatisticsRecord, session: &GameSessionResult) -> f64 {
        (record.rating + RatingDelta::for_session(session).total()).max(RATING_FLOOR)
    }

    pub fn reset_streak(&self, record: &StatisticsRecord) -> StatisticsRecord {
        StatisticsRecord {
            current_games_streak: 0,
            updated_at: Utc::now(),
            ..record.clone()
        }
    }

    /// Merges several records into one summary. Counters are summed,
    /// extremes take the best value, efficiency is weighted by games and
    /// rating is the rounded mean. The merged `user_id` is kept only when
    /// every input belongs to the same user.
    pub fn aggregate(&self, records: &[StatisticsRecord]) -> StatisticsRecord {
        let Some(first) = records.first() else {
            return StatisticsRecord::new("", 0.0);
        };

        let same_user = records.iter().all(|r| r.user_id == first.user_id);
        let mut merged = StatisticsRecord::new(
            if same_user { first.user_id.as_str() } else { "" },
            0.0,
        );
        merged.created_at = first.created_at;
        merged.updated_at = first.updated_at;

        let mut weighted_efficiency = 0.0;
        let mut rating_sum = 0.0;

        for record in records {
            merged.total_games = merged.total_games.saturating_add(record.total_games);
            merged.total_score = merged.total_score.saturating_add(record.total_score);
            merged.total_lines_cleared = merged
                .total_lines_cleared
                .saturating_add(record.total_lines_cleared);
            merged.total_figures_placed = merged
                .total_figures_placed
                .saturating_add(record.total_figures_placed);
            merged.total_duration = merged.total_duration.saturating_add(record.total_duration);
            merged.total_moves = merged.total_moves.saturating_add(record.total_moves);

            merged.best_score = merged.best_score.max(record.best_score);
            merged.best_lines_cleared = merged.best_lines_cleared.max(record.best_lines_cleared);
            merged.best_games_streak = merged.best_games_streak.max(record.best_games_streak);
            merged.current_games_streak = merged
                .current_games_streak
                .max(record.current_games_streak);

            if record.best_duration > 0
                && (merged.best_duration == 0 || record.best_duration < merged.best_duration)
            {
                merged.best_duration = record.best_duration;
            }

            weighted_efficiency += record.avg_placement_efficiency * record.total_games as f64;
            rating_sum += record.rating;

            merged.created_at = merged.created_at.min(record.created_at);
            merged.updated_at = merged.updated_at.max(record.updated_at);
        }

        merged.avg_placement_efficiency = if merged.total_games == 0 {
            0.0
        } else {
            weighted_efficiency / merged.total_games as f64
        };
        merged.rating = (rating_sum / records.len() as f64).round();

        merged
    }
}
