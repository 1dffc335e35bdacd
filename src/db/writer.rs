use super::{Error, traffic_service};
use crate::accounting::ResetPolicy;
use crate::models::TrafficCounter;
use chrono::NaiveDateTime;
use duckdb::{Connection, DuckdbConnectionManager, Transaction};
use r2d2::PooledConnection;
use std::sync::mpsc;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

pub(super) enum LedgerCommand {
    Observe {
        entity_id: String,
        observed: TrafficCounter,
        now: NaiveDateTime,
        reply: oneshot::Sender<Result<TrafficCounter, Error>>,
    },
    MonthlyReset {
        now: NaiveDateTime,
        reply: oneshot::Sender<Result<usize, Error>>,
    },
}

/// Runs on a dedicated OS thread and applies ledger commands one at a time.
pub(super) fn ledger_writer_task(
    mut conn: PooledConnection<DuckdbConnectionManager>,
    policy: ResetPolicy,
    rx: mpsc::Receiver<LedgerCommand>,
) {
    info!(?policy, "Traffic ledger writer thread started.");

    // Ends once every TrafficLedger handle has been dropped.
    while let Ok(command) = rx.recv() {
        match command {
            LedgerCommand::Observe {
                entity_id,
                observed,
                now,
                reply,
            } => {
                let result = in_transaction(&mut conn, |txn| {
                    traffic_service::record_observation(txn, &entity_id, observed, now)
                });
                if let Err(e) = &result {
                    error!(entity_id = %entity_id, error = %e, "Traffic update rolled back.");
                }
                if reply.send(result).is_err() {
                    debug!(
                        entity_id = %entity_id,
                        "Caller went away before the traffic update finished."
                    );
                }
            }
            LedgerCommand::MonthlyReset { now, reply } => {
                let result = in_transaction(&mut conn, |txn| {
                    traffic_service::reset_monthly_totals(txn, policy, now)
                });
                if reply.send(result).is_err() {
                    warn!("Caller went away before the monthly reset finished.");
                }
            }
        }
    }

    info!("Traffic ledger channel closed. Writer thread finished.");
}

/// Commits when `f` succeeds; dropping the transaction otherwise rolls it back.
fn in_transaction<T>(
    conn: &mut Connection,
    f: impl FnOnce(&Transaction) -> Result<T, Error>,
) -> Result<T, Error> {
    let txn = conn.transaction()?;
    let value = f(&txn)?;
    txn.commit()?;
    Ok(value)
}
