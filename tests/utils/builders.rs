use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use blockstats::{GameSessionResult, Period, RankedEntry};

// ============================================================================
// Session Builders
// ============================================================================

pub struct SessionBuilder {
    session: GameSessionResult,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self {
            session: GameSessionResult {
                score: 250,
                lines_cleared: 8,
                figures_placed: 40,
                duration: 120,
                moves_count: 200,
                placement_efficiency: 85.0,
                game_result: Some("game_over".to_string()),
            },
        }
    }

    pub fn score(mut self, score: i64) -> Self {
        self.session.score = score;
        self
    }

    pub fn lines(mut self, lines_cleared: i64) -> Self {
        self.session.lines_cleared = lines_cleared;
        self
    }

    pub fn duration(mut self, duration: i64) -> Self {
        self.session.duration = duration;
        self
    }

    pub fn efficiency(mut self, placement_efficiency: f64) -> Self {
        self.session.placement_efficiency = placement_efficiency;
        self
    }

    pub fn build(self) -> GameSessionResult {
        self.session
    }
}

// ============================================================================
// Leaderboard Entry Builders
// ============================================================================

/// Start of the narrowest window that is current now, so entries offset
/// from it stay on the weekly and monthly boards.
pub fn base_time() -> DateTime<Utc> {
    let now = Utc::now();
    [Period::Weekly, Period::Monthly]
        .into_iter()
        .filter_map(|period| period.window_start(now))
        .max()
        .unwrap_or(now)
}

pub struct EntryBuilder {
    entry: RankedEntry,
}

impl EntryBuilder {
    pub fn new(user_id: &str) -> Self {
        Self {
            entry: RankedEntry {
                id: Uuid::new_v4(),
                user_id: user_id.to_string(),
                display_name: user_id.to_string(),
                score: 0,
                lines_cleared: 0,
                game_mode: "classic".to_string(),
                period: Period::AllTime,
                rank: 0,
                created_at: base_time(),
                updated_at: base_time(),
            },
        }
    }

    pub fn score(mut self, score: i64) -> Self {
        self.entry.score = score;
        self
    }

    pub fn lines(mut self, lines_cleared: i64) -> Self {
        self.entry.lines_cleared = lines_cleared;
        self
    }

    pub fn game_mode(mut self, game_mode: &str) -> Self {
        self.entry.game_mode = game_mode.to_string();
        self
    }

    pub fn period(mut self, period: Period) -> Self {
        self.entry.period = period;
        self
    }

    /// Seconds after [`base_time`]
    pub fn at(mut self, offset_secs: i64) -> Self {
        self.entry.created_at = base_time() + Duration::seconds(offset_secs);
        self.entry.updated_at = self.entry.created_at;
        self
    }

    /// Submitted `days` before now
    pub fn days_ago(mut self, days: i64) -> Self {
        self.entry.created_at = Utc::now() - Duration::days(days);
        self.entry.updated_at = self.entry.created_at;
        self
    }

    pub fn build(self) -> RankedEntry {
        self.entry
    }
}
