use super::entities::dhcp_lease;
use super::{DuckDbPool, Error, LEASE_MIGRATIONS, format_timestamp, parse_timestamp, run_migrations};
use crate::models::DhcpLease;
use chrono::NaiveDateTime;
use duckdb::{Connection, params};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Writer for `dhcp_leases`. Batches from different routers are applied one
/// at a time, so the last batch to write a MAC wins.
#[derive(Clone)]
pub struct LeaseStore {
    pool: DuckDbPool,
    // DuckDB aborts one of two concurrent transactions touching the same row.
    write_lock: Arc<Mutex<()>>,
}

impl LeaseStore {
    pub fn new(pool: DuckDbPool) -> Result<Self, Error> {
        let conn = pool.get()?;
        run_migrations(&conn, "leases", LEASE_MIGRATIONS)?;
        Ok(Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Replaces or inserts every lease of the batch, all stamped with `now`.
    ///
    /// The batch commits as a whole or not at all. An empty batch never
    /// touches the database.
    pub async fn upsert_leases(
        &self,
        leases: Vec<DhcpLease>,
        now: NaiveDateTime,
    ) -> Result<usize, Error> {
        if leases.is_empty() {
            return Ok(0);
        }

        // Later lines for the same MAC win, matching replace-on-observe.
        let by_mac: BTreeMap<String, DhcpLease> = leases
            .into_iter()
            .map(|lease| (lease.mac_address.clone(), lease))
            .collect();

        let _guard = self.write_lock.lock().await;
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<usize, Error> {
            let mut conn = pool.get()?;
            let txn = conn.transaction()?;
            for lease in by_mac.values() {
                upsert_lease(&txn, lease, now)?;
            }
            txn.commit()?;
            debug!(count = by_mac.len(), "DHCP leases upserted.");
            Ok(by_mac.len())
        })
        .await?
    }

    pub async fn list_leases(&self) -> Result<Vec<dhcp_lease::Model>, Error> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<dhcp_lease::Model>, Error> {
            let conn = pool.get()?;
            list_leases(&conn)
        })
        .await?
    }
}

pub fn upsert_lease(conn: &Connection, lease: &DhcpLease, now: NaiveDateTime) -> Result<(), Error> {
    conn.execute(
        "INSERT INTO dhcp_leases
            (mac_address, lease_end_time, ip_address, hostname, client_id, timestamp)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT (mac_address) DO UPDATE SET
            lease_end_time = excluded.lease_end_time,
            ip_address = excluded.ip_address,
            hostname = excluded.hostname,
            client_id = excluded.client_id,
            timestamp = excluded.timestamp",
        params![
            lease.mac_address,
            lease.lease_end_time,
            lease.ip_address,
            lease.hostname,
            lease.client_id,
            format_timestamp(now),
        ],
    )?;
    Ok(())
}

fn list_leases(conn: &Connection) -> Result<Vec<dhcp_lease::Model>, Error> {
    let mut stmt = conn.prepare(
        "SELECT mac_address, lease_end_time, ip_address, hostname, client_id, timestamp
         FROM dhcp_leases ORDER BY mac_address",
    )?;
    let raw_rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    raw_rows
        .into_iter()
        .map(
            |(mac_address, lease_end_time, ip_address, hostname, client_id, timestamp)| {
                Ok(dhcp_lease::Model {
                    mac_address,
                    lease_end_time,
                    ip_address,
                    hostname,
                    client_id,
                    timestamp: parse_timestamp("dhcp_leases", &timestamp)?,
                })
            },
        )
        .collect()
}
