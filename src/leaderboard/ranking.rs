use std::cmp::Ordering;

use super::models::{Period, RankedEntry, SortField};

/// Total order used for every leaderboard: primary metric descending,
/// the other metric descending, then earliest submission first.
pub fn compare(a: &RankedEntry, b: &RankedEntry, sort_field: SortField) -> Ordering {
    let secondary = match sort_field {
        SortField::Score => SortField::LinesCleared,
        SortField::LinesCleared => SortField::Score,
    };

    b.metric(sort_field)
        .cmp(&a.metric(sort_field))
        .then_with(|| b.metric(secondary).cmp(&a.metric(secondary)))
        .then_with(|| a.created_at.cmp(&b.created_at))
}

/// Filters `entries` to the requested scope, orders them and assigns dense
/// 1-based ranks by position.
///
/// The sort is stable, so entries that tie on every level keep their input
/// order and still receive consecutive ranks.
pub fn rank_scope(
    entries: impl IntoIterator<Item = RankedEntry>,
    sort_field: SortField,
    period: Option<Period>,
    game_mode: Option<&str>,
) -> Vec<RankedEntry> {
    let mut scoped: Vec<RankedEntry> = entries
        .into_iter()
        .filter(|entry| entry.in_scope(period, game_mode))
        .collect();

    scoped.sort_by(|a, b| compare(a, b, sort_field));

    for (rank, entry) in (1u32..).zip(scoped.iter_mut()) {
        entry.rank = rank;
    }

    scoped
}

pub fn is_in_top_n(entry: &RankedEntry, n: u32) -> bool {
    entry.rank >= 1 && entry.rank <= n
}

/// True unless another entry of the same user strictly beats `entry` on `sort_field`.
pub fn is_personal_best(
    entry: &RankedEntry,
    same_user_entries: &[RankedEntry],
    sort_field: SortField,
) -> bool {
    let value = entry.metric(sort_field);
    !same_user_entries
        .iter()
        .filter(|other| other.user_id == entry.user_id && other.id != entry.id)
        .any(|other| other.metric(sort_field) > value)
}
