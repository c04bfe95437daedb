use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};
use uuid::Uuid;

use super::LeaderboardError;

/// Maximum accepted length of a game mode token
pub const MAX_GAME_MODE_LEN: usize = 32;

/// Metric a leaderboard is ordered by
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SortField {
    Score,
    LinesCleared,
}

impl SortField {
    pub fn parse(token: &str) -> Result<Self, LeaderboardError> {
        token
            .parse()
            .map_err(|_| LeaderboardError::Validation(format!("Unknown sort field: {}", token)))
    }
}

/// Time window a leaderboard entry competes in
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Period {
    AllTime,
    Weekly,
    Monthly,
}

impl Period {
    pub fn parse(token: &str) -> Result<Self, LeaderboardError> {
        token
            .parse()
            .map_err(|_| LeaderboardError::Validation(format!("Unknown period: {}", token)))
    }

    /// Start of the window that is current at `now`, in UTC.
    /// Weeks start on Monday. `AllTime` has no start.
    pub fn window_start(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let today = now.date_naive();
        let first_day = match self {
            Period::AllTime => return None,
            Period::Weekly => {
                today - Duration::days(i64::from(today.weekday().num_days_from_monday()))
            }
            Period::Monthly => NaiveDate::from_ymd_opt(today.year(), today.month(), 1)?,
        };
        first_day
            .and_hms_opt(0, 0, 0)
            .map(|midnight| Utc.from_utc_datetime(&midnight))
    }
}

/// Game modes are free text but restricted to short lowercase tokens
/// such as `classic` or `challenge`.
pub fn validate_game_mode(game_mode: &str) -> Result<(), LeaderboardError> {
    let valid = !game_mode.is_empty()
        && game_mode.len() <= MAX_GAME_MODE_LEN
        && game_mode
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');

    if valid {
        Ok(())
    } else {
        Err(LeaderboardError::Validation(format!(
            "Unknown game mode: {:?}",
            game_mode
        )))
    }
}

/// One competitive data point on a leaderboard.
///
/// `rank` is 0 until computed, and is only meaningful for the
/// (period, game_mode, sort_field) scope it was computed in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub id: Uuid,
    pub user_id: String,
    pub display_name: String,
    pub score: i64,
    pub lines_cleared: i64,
    pub game_mode: String,
    pub period: Period,
    pub rank: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RankedEntry {
    pub fn metric(&self, sort_field: SortField) -> i64 {
        match sort_field {
            SortField::Score => self.score,
            SortField::LinesCleared => self.lines_cleared,
        }
    }

    pub fn in_scope(&self, period: Option<Period>, game_mode: Option<&str>) -> bool {
        period.map_or(true, |p| self.period == p)
            && game_mode.map_or(true, |mode| self.game_mode == mode)
    }

    /// Whether the entry was submitted inside its period's current window
    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        self.period
            .window_start(now)
            .map_or(true, |start| self.created_at >= start)
    }
}

/// A finished game about to be posted to the leaderboards
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLeaderboardEntry {
    pub user_id: String,
    pub display_name: String,
    pub score: i64,
    pub lines_cleared: i64,
    pub game_mode: String,
}

impl NewLeaderboardEntry {
    pub fn validate(&self) -> Result<(), LeaderboardError> {
        if self.user_id.trim().is_empty() {
            return Err(LeaderboardError::Validation(
                "User ID cannot be empty".to_string(),
            ));
        }
        if self.score < 0 || self.lines_cleared < 0 {
            return Err(LeaderboardError::Validation(
                "Score and lines cleared must be non-negative".to_string(),
            ));
        }
        validate_game_mode(&self.game_mode)
    }

    pub fn into_entry(self, period: Period, now: DateTime<Utc>) -> RankedEntry {
        RankedEntry {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            display_name: self.display_name,
            score: self.score,
            lines_cleared: self.lines_cleared,
            game_mode: self.game_mode,
            period,
            rank: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A validated leaderboard request
#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardQuery {
    pub sort_field: SortField,
    pub period: Option<Period>,
    pub game_mode: Option<String>,
    pub limit: Option<usize>,
}

impl LeaderboardQuery {
    pub fn new(sort_field: SortField) -> Self {
        Self {
            sort_field,
            period: None,
            game_mode: None,
            limit: None,
        }
    }

    pub fn with_period(mut self, period: Period) -> Self {
        self.period = Some(period);
        self
    }

    pub fn with_game_mode(mut self, game_mode: impl Into<String>) -> Self {
        self.game_mode = Some(game_mode.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Builds a query from raw request tokens, rejecting anything unrecognised
    pub fn from_tokens(
        sort_field: Option<&str>,
        period: Option<&str>,
        game_mode: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Self, LeaderboardError> {
        let sort_field = match sort_field {
            Some(token) => SortField::parse(token)?,
            None => SortField::Score,
        };
        let period = period.map(Period::parse).transpose()?;
        if let Some(mode) = game_mode {
            validate_game_mode(mode)?;
        }

        Ok(Self {
            sort_field,
            period,
            game_mode: game_mode.map(str::to_string),
            limit,
        })
    }
}
