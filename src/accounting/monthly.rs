//! Monthly running totals as an explicit state machine.
//!
//! A row is either absent (uninitialized) or accruing. The start-of-month
//! transition zeroes it. Everything here is pure so the ordering of "reset
//! first, then apply this cycle's deltas" can be checked without storage.
use crate::models::TrafficCounter;
use chrono::{Datelike, NaiveDateTime};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthlyState {
    pub totals: TrafficCounter,
    pub updated_at: NaiveDateTime,
}

impl MonthlyState {
    pub fn zeroed(now: NaiveDateTime) -> Self {
        Self {
            totals: TrafficCounter::default(),
            updated_at: now,
        }
    }
}

/// Which stored timestamp decides whether a month boundary was crossed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetPolicy {
    /// Every row is judged by its own `updated_at`.
    #[default]
    PerEntity,
    /// The most recently updated row decides for all rows (legacy behaviour).
    LatestRow,
}

/// Adds `delta` to the stored state, creating a zeroed row first if there is none.
pub fn accrue(
    stored: Option<MonthlyState>,
    delta: TrafficCounter,
    now: NaiveDateTime,
) -> MonthlyState {
    let base = stored.unwrap_or_else(|| MonthlyState::zeroed(now));
    MonthlyState {
        totals: TrafficCounter {
            rx_bytes: base.totals.rx_bytes.saturating_add(delta.rx_bytes),
            tx_bytes: base.totals.tx_bytes.saturating_add(delta.tx_bytes),
        },
        updated_at: now,
    }
}

pub fn same_calendar_month(a: NaiveDateTime, b: NaiveDateTime) -> bool {
    a.year() == b.year() && a.month() == b.month()
}

/// Start-of-month transition for one row. Returns the new state and whether
/// the reset fired.
pub fn roll_over(state: MonthlyState, now: NaiveDateTime) -> (MonthlyState, bool) {
    if same_calendar_month(state.updated_at, now) {
        (state, false)
    } else {
        (MonthlyState::zeroed(now), true)
    }
}

/// Ids of the rows that must be zeroed before this cycle's deltas are applied.
pub fn rows_due_for_reset<'a>(
    policy: ResetPolicy,
    rows: &'a [(String, MonthlyState)],
    now: NaiveDateTime,
) -> Vec<&'a str> {
    match policy {
        ResetPolicy::PerEntity => rows
            .iter()
            .filter(|(_, state)| roll_over(*state, now).1)
            .map(|(id, _)| id.as_str())
            .collect(),
        ResetPolicy::LatestRow => {
            let latest = rows.iter().map(|(_, state)| state.updated_at).max();
            match latest {
                Some(latest) if !same_calendar_month(latest, now) => {
                    rows.iter().map(|(id, _)| id.as_str()).collect()
                }
                _ => Vec::new(),
            }
        }
    }
}
