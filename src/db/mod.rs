pub mod entities;
pub mod lease_service;
pub mod traffic_service;
pub mod writer;

use self::writer::{LedgerCommand, ledger_writer_task};
use crate::accounting::ResetPolicy;
use crate::models::TrafficCounter;
use chrono::NaiveDateTime;
use duckdb::{Connection, DuckdbConnectionManager};
use std::{path::Path, sync::mpsc, thread};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{error, info};

const TRAFFIC_MIGRATIONS: &str =
    include_str!("../../migrations/20250101000000_create_traffic_tables.sql");
const LEASE_MIGRATIONS: &str =
    include_str!("../../migrations/20250101000001_create_lease_tables.sql");

/// Text format of every `timestamp` column, kept stable for external readers.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    DuckDB(#[from] duckdb::Error),
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("Invalid timestamp '{value}' in {table}")]
    InvalidTimestamp { table: &'static str, value: String },
    #[error("Tokio join error: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("Traffic ledger writer is not running")]
    WriterClosed,
}

pub type DuckDbPool = r2d2::Pool<DuckdbConnectionManager>;

pub fn open_file_pool(path: &Path) -> Result<DuckDbPool, Error> {
    let manager = DuckdbConnectionManager::file(path)?;
    Ok(r2d2::Pool::new(manager)?)
}

/// In-process database, shared by every connection of the pool.
pub fn open_memory_pool() -> Result<DuckDbPool, Error> {
    let manager = DuckdbConnectionManager::memory()?;
    Ok(r2d2::Pool::builder().max_size(4).build(manager)?)
}

pub fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(table: &'static str, value: &str) -> Result<NaiveDateTime, Error> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).map_err(|_| Error::InvalidTimestamp {
        table,
        value: value.to_string(),
    })
}

fn run_migrations(conn: &Connection, name: &str, sql: &str) -> Result<(), Error> {
    info!(migration = name, "Running DuckDB migrations...");
    conn.execute_batch(sql).map_err(|e| {
        error!(migration = name, error = %e, "Failed to execute DuckDB migrations.");
        e
    })?;
    Ok(())
}

/// Handle to the single writer that owns `cumulative_stats` and `monthly_stats`.
///
/// Every mutation is a message executed in its own transaction on one
/// dedicated connection, so reconcile-then-accumulate for an entity never
/// interleaves with another update. Cheap to clone.
#[derive(Clone, Debug)]
pub struct TrafficLedger {
    command_sender: mpsc::Sender<LedgerCommand>,
}

impl TrafficLedger {
    pub fn new(pool: DuckDbPool, policy: ResetPolicy) -> Result<Self, Error> {
        let conn = pool.get()?;
        run_migrations(&conn, "traffic", TRAFFIC_MIGRATIONS)?;

        let (tx, rx) = mpsc::channel();

        // DuckDB calls block, so the writer gets its own OS thread.
        thread::Builder::new()
            .name("traffic-ledger".to_string())
            .spawn(move || ledger_writer_task(conn, policy, rx))
            .map_err(|e| {
                error!(error = %e, "Failed to spawn traffic ledger writer thread.");
                Error::WriterClosed
            })?;

        Ok(Self { command_sender: tx })
    }

    /// Reconciles `observed` against the stored counter and adds the delta to
    /// the monthly total. Returns the delta that was applied.
    pub async fn record_observation(
        &self,
        entity_id: &str,
        observed: TrafficCounter,
        now: NaiveDateTime,
    ) -> Result<TrafficCounter, Error> {
        let (reply, response) = oneshot::channel();
        self.command_sender
            .send(LedgerCommand::Observe {
                entity_id: entity_id.to_string(),
                observed,
                now,
                reply,
            })
            .map_err(|_| Error::WriterClosed)?;
        response.await.map_err(|_| Error::WriterClosed)?
    }

    /// Zeroes the monthly rows whose month has ended. Returns how many rows were reset.
    pub async fn reset_monthly_if_due(&self, now: NaiveDateTime) -> Result<usize, Error> {
        let (reply, response) = oneshot::channel();
        self.command_sender
            .send(LedgerCommand::MonthlyReset { now, reply })
            .map_err(|_| Error::WriterClosed)?;
        response.await.map_err(|_| Error::WriterClosed)?
    }
}
