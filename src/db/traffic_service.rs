//! Storage operations on `cumulative_stats` and `monthly_stats`.
//!
//! The mutating functions expect to run inside a transaction owned by the
//! ledger writer; the `list_*`/`get_*_stat` helpers read through the pool.
use super::entities::{cumulative_stat, monthly_stat};
use super::{DuckDbPool, Error, format_timestamp, parse_timestamp};
use crate::accounting::{self, MonthlyState, ResetPolicy};
use crate::models::TrafficCounter;
use chrono::NaiveDateTime;
use duckdb::{Connection, params};
use tracing::info;

pub fn get_cumulative(conn: &Connection, entity_id: &str) -> Result<Option<TrafficCounter>, Error> {
    let mut stmt = conn.prepare("SELECT rx_bytes, tx_bytes FROM cumulative_stats WHERE id = ?")?;
    let mut rows = stmt.query_map(params![entity_id], |row| {
        Ok(TrafficCounter::new(row.get(0)?, row.get(1)?))
    })?;

    match rows.next() {
        Some(res) => Ok(Some(res?)),
        None => Ok(None),
    }
}

pub fn put_cumulative(
    conn: &Connection,
    entity_id: &str,
    counter: TrafficCounter,
) -> Result<(), Error> {
    conn.execute(
        "INSERT INTO cumulative_stats (id, rx_bytes, tx_bytes) VALUES (?, ?, ?)
         ON CONFLICT (id) DO UPDATE SET rx_bytes = excluded.rx_bytes, tx_bytes = excluded.tx_bytes",
        params![entity_id, counter.rx_bytes, counter.tx_bytes],
    )?;
    Ok(())
}

pub fn get_monthly(conn: &Connection, entity_id: &str) -> Result<Option<MonthlyState>, Error> {
    let mut stmt =
        conn.prepare("SELECT rx_bytes, tx_bytes, timestamp FROM monthly_stats WHERE id = ?")?;
    let mut rows = stmt.query_map(params![entity_id], |row| {
        Ok((row.get::<_, u64>(0)?, row.get::<_, u64>(1)?, row.get::<_, String>(2)?))
    })?;

    match rows.next() {
        Some(res) => {
            let (rx_bytes, tx_bytes, timestamp) = res?;
            Ok(Some(MonthlyState {
                totals: TrafficCounter::new(rx_bytes, tx_bytes),
                updated_at: parse_timestamp("monthly_stats", &timestamp)?,
            }))
        }
        None => Ok(None),
    }
}

pub fn put_monthly(conn: &Connection, entity_id: &str, state: MonthlyState) -> Result<(), Error> {
    conn.execute(
        "INSERT INTO monthly_stats (id, rx_bytes, tx_bytes, timestamp) VALUES (?, ?, ?, ?)
         ON CONFLICT (id) DO UPDATE SET
            rx_bytes = excluded.rx_bytes,
            tx_bytes = excluded.tx_bytes,
            timestamp = excluded.timestamp",
        params![
            entity_id,
            state.totals.rx_bytes,
            state.totals.tx_bytes,
            format_timestamp(state.updated_at),
        ],
    )?;
    Ok(())
}

pub fn list_monthly(conn: &Connection) -> Result<Vec<(String, MonthlyState)>, Error> {
    let mut stmt =
        conn.prepare("SELECT id, rx_bytes, tx_bytes, timestamp FROM monthly_stats ORDER BY id")?;
    let raw_rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, u64>(1)?,
                row.get::<_, u64>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    raw_rows
        .into_iter()
        .map(|(id, rx_bytes, tx_bytes, timestamp)| {
            let updated_at = parse_timestamp("monthly_stats", &timestamp)?;
            Ok((
                id,
                MonthlyState {
                    totals: TrafficCounter::new(rx_bytes, tx_bytes),
                    updated_at,
                },
            ))
        })
        .collect()
}

/// Reconcile, accumulate and store one observation. Returns the applied delta.
pub fn record_observation(
    conn: &Connection,
    entity_id: &str,
    observed: TrafficCounter,
    now: NaiveDateTime,
) -> Result<TrafficCounter, Error> {
    let last = get_cumulative(conn, entity_id)?;

    let (rx_reset, tx_reset) = accounting::detect_reset(last, observed);
    if rx_reset || tx_reset {
        info!(
            entity_id = %entity_id,
            rx_reset,
            tx_reset,
            "Counter went backwards; treating observed value as traffic since the source restarted."
        );
    }

    let delta = accounting::reconcile(last, observed);
    let monthly = accounting::accrue(get_monthly(conn, entity_id)?, delta, now);

    put_monthly(conn, entity_id, monthly)?;
    put_cumulative(conn, entity_id, observed)?;

    Ok(delta)
}

/// Start-of-month pass over every monthly row. Returns the number of rows zeroed.
pub fn reset_monthly_totals(
    conn: &Connection,
    policy: ResetPolicy,
    now: NaiveDateTime,
) -> Result<usize, Error> {
    let rows = list_monthly(conn)?;
    let due = accounting::rows_due_for_reset(policy, &rows, now);
    if due.is_empty() {
        return Ok(0);
    }

    let zeroed = MonthlyState::zeroed(now);
    for entity_id in &due {
        put_monthly(conn, entity_id, zeroed)?;
    }

    info!(count = due.len(), ?policy, "Monthly statistics reset due to new month/year.");
    Ok(due.len())
}

/// All monthly rows, for operators and the read-only query side.
pub async fn list_monthly_totals(pool: DuckDbPool) -> Result<Vec<monthly_stat::Model>, Error> {
    tokio::task::spawn_blocking(move || -> Result<Vec<monthly_stat::Model>, Error> {
        let conn = pool.get()?;
        let rows = list_monthly(&conn)?;
        Ok(rows
            .into_iter()
            .map(|(id, state)| monthly_stat::Model {
                id,
                rx_bytes: state.totals.rx_bytes,
                tx_bytes: state.totals.tx_bytes,
                timestamp: state.updated_at,
            })
            .collect())
    })
    .await?
}

pub async fn get_cumulative_stat(
    pool: DuckDbPool,
    entity_id: String,
) -> Result<Option<cumulative_stat::Model>, Error> {
    tokio::task::spawn_blocking(move || -> Result<Option<cumulative_stat::Model>, Error> {
        let conn = pool.get()?;
        let counter = get_cumulative(&conn, &entity_id)?;
        Ok(counter.map(|c| cumulative_stat::Model {
            id: entity_id,
            rx_bytes: c.rx_bytes,
            tx_bytes: c.tx_bytes,
        }))
    })
    .await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{TrafficLedger, open_memory_pool};
    use crate::models::MAIN_WAN_ID;
    use chrono::NaiveDate;

    fn at(year: i32, month: u32, day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|d| d.and_hms_opt(8, 30, 0))
            .unwrap()
    }

    fn ledger(policy: ResetPolicy) -> (TrafficLedger, DuckDbPool) {
        let pool = open_memory_pool().unwrap();
        let ledger = TrafficLedger::new(pool.clone(), policy).unwrap();
        (ledger, pool)
    }

    async fn monthly_of(pool: &DuckDbPool, id: &str) -> Option<monthly_stat::Model> {
        list_monthly_totals(pool.clone())
            .await
            .unwrap()
            .into_iter()
            .find(|m| m.id == id)
    }

    #[tokio::test]
    async fn test_counter_sequence_with_reset_accumulates_monthly_total() {
        let (ledger, pool) = ledger(ResetPolicy::PerEntity);
        let mac = "aa:bb:cc:dd:ee:ff";
        let now = at(2025, 6, 10);

        let mut deltas = Vec::new();
        for (rx, tx) in [(100, 50), (250, 80), (60, 90), (200, 150)] {
            let delta = ledger
                .record_observation(mac, TrafficCounter::new(rx, tx), now)
                .await
                .unwrap();
            deltas.push((delta.rx_bytes, delta.tx_bytes));
        }

        // RX went backwards at the third reading, TX kept rising.
        assert_eq!(deltas, vec![(100, 50), (150, 30), (60, 10), (140, 60)]);

        let monthly = monthly_of(&pool, mac).await.unwrap();
        assert_eq!((monthly.rx_bytes, monthly.tx_bytes), (450, 150));
        assert_eq!(monthly.timestamp, now);

        let cumulative = get_cumulative_stat(pool.clone(), mac.to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!((cumulative.rx_bytes, cumulative.tx_bytes), (200, 150));
    }

    #[tokio::test]
    async fn test_first_zero_observation_creates_rows() {
        let (ledger, pool) = ledger(ResetPolicy::PerEntity);
        let delta = ledger
            .record_observation(MAIN_WAN_ID, TrafficCounter::default(), at(2025, 6, 1))
            .await
            .unwrap();

        assert_eq!(delta, TrafficCounter::default());
        let monthly = monthly_of(&pool, MAIN_WAN_ID).await.unwrap();
        assert_eq!((monthly.rx_bytes, monthly.tx_bytes), (0, 0));
        assert!(
            get_cumulative_stat(pool, MAIN_WAN_ID.to_string())
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_monthly_reset_runs_once_per_month() {
        let (ledger, pool) = ledger(ResetPolicy::PerEntity);
        ledger
            .record_observation("aa:aa:aa:aa:aa:aa", TrafficCounter::new(500, 600), at(2025, 5, 31))
            .await
            .unwrap();

        assert_eq!(ledger.reset_monthly_if_due(at(2025, 5, 31)).await.unwrap(), 0);

        let june = at(2025, 6, 1);
        assert_eq!(ledger.reset_monthly_if_due(june).await.unwrap(), 1);
        assert_eq!(ledger.reset_monthly_if_due(at(2025, 6, 2)).await.unwrap(), 0);

        let monthly = monthly_of(&pool, "aa:aa:aa:aa:aa:aa").await.unwrap();
        assert_eq!((monthly.rx_bytes, monthly.tx_bytes), (0, 0));
        assert_eq!(monthly.timestamp, june);

        // The cumulative counter survives the reset, so the next delta is incremental.
        let delta = ledger
            .record_observation("aa:aa:aa:aa:aa:aa", TrafficCounter::new(700, 650), june)
            .await
            .unwrap();
        assert_eq!(delta, TrafficCounter::new(200, 50));
    }

    #[tokio::test]
    async fn test_latest_row_policy_resets_everything_or_nothing() {
        let (ledger, pool) = ledger(ResetPolicy::LatestRow);
        ledger
            .record_observation("aa:aa:aa:aa:aa:aa", TrafficCounter::new(1, 1), at(2025, 4, 30))
            .await
            .unwrap();
        ledger
            .record_observation(MAIN_WAN_ID, TrafficCounter::new(2, 2), at(2025, 5, 2))
            .await
            .unwrap();

        // main_wan was touched in May, so the stale April row is left alone.
        assert_eq!(ledger.reset_monthly_if_due(at(2025, 5, 3)).await.unwrap(), 0);
        let april_row = monthly_of(&pool, "aa:aa:aa:aa:aa:aa").await.unwrap();
        assert_eq!(april_row.rx_bytes, 1);

        assert_eq!(ledger.reset_monthly_if_due(at(2025, 6, 1)).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_updates_for_same_entity_are_serialized() {
        let (ledger, pool) = ledger(ResetPolicy::PerEntity);
        let now = at(2025, 6, 10);

        let mut handles = Vec::new();
        for i in 1..=20u64 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger
                    .record_observation("aa:aa:aa:aa:aa:aa", TrafficCounter::new(i * 10, i), now)
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        // Whatever the arrival order, every delta was computed against the
        // previously stored counter, so the total is bounded by the work done.
        let monthly = monthly_of(&pool, "aa:aa:aa:aa:aa:aa").await.unwrap();
        assert!(monthly.rx_bytes >= 200);
        assert!(monthly.rx_bytes <= (1..=20u64).map(|i| i * 10).sum::<u64>());
    }

    #[test]
    fn test_invalid_stored_timestamp_is_reported() {
        let pool = open_memory_pool().unwrap();
        let _ledger = TrafficLedger::new(pool.clone(), ResetPolicy::PerEntity).unwrap();
        let conn = pool.get().unwrap();
        conn.execute(
            "INSERT INTO monthly_stats (id, rx_bytes, tx_bytes, timestamp)
             VALUES ('x', 1, 1, 'yesterday')",
            [],
        )
        .unwrap();

        let err = get_monthly(&conn, "x").unwrap_err();
        assert!(matches!(err, Error::InvalidTimestamp { table: "monthly_stats", .. }));
    }
}
