use super::CycleError;
use super::fetcher::{FetchOutcome, Fetcher};
use crate::config::{RouterConfig, RouterTable};
use crate::db::TrafficLedger;
use crate::db::lease_service::LeaseStore;
use crate::models::MAIN_WAN_ID;
use crate::parsers;
use chrono::NaiveDateTime;
use futures::future::join_all;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    ClientTraffic,
    WanTraffic,
    DhcpLeases,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Signal::ClientTraffic => "ap_stats",
            Signal::WanTraffic => "wan_stats",
            Signal::DhcpLeases => "dhcp_leases",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalFailure {
    pub router: String,
    /// `None` when the router task itself died.
    pub signal: Option<Signal>,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub sources_polled: usize,
    pub monthly_rows_reset: usize,
    pub entities_updated: usize,
    pub leases_written: usize,
    pub failures: Vec<SignalFailure>,
}

impl CycleReport {
    fn fail(&mut self, router: &str, signal: Option<Signal>, error: String) {
        self.failures.push(SignalFailure {
            router: router.to_string(),
            signal,
            error,
        });
    }

    fn absorb(&mut self, other: CycleReport) {
        self.sources_polled += other.sources_polled;
        self.monthly_rows_reset += other.monthly_rows_reset;
        self.entities_updated += other.entities_updated;
        self.leases_written += other.leases_written;
        self.failures.extend(other.failures);
    }
}

/// Everything a cycle needs, shared by the per-router tasks.
#[derive(Clone)]
pub struct Collector {
    fetcher: Arc<dyn Fetcher>,
    ledger: TrafficLedger,
    leases: LeaseStore,
}

impl Collector {
    pub fn new(fetcher: Arc<dyn Fetcher>, ledger: TrafficLedger, leases: LeaseStore) -> Self {
        Self {
            fetcher,
            ledger,
            leases,
        }
    }

    /// Runs one polling cycle. Every write of the cycle is stamped with `now`.
    ///
    /// Only a failed monthly reset aborts the cycle; per-router and
    /// per-signal failures end up in the report.
    pub async fn run_cycle(
        &self,
        routers: &RouterTable,
        now: NaiveDateTime,
    ) -> Result<CycleReport, CycleError> {
        let mut report = CycleReport::default();

        if routers.is_empty() {
            info!("No routers configured. Skipping this cycle.");
            return Ok(report);
        }

        // Must land before any delta of this cycle.
        report.monthly_rows_reset = self
            .ledger
            .reset_monthly_if_due(now)
            .await
            .map_err(CycleError::MonthlyReset)?;

        let tasks: Vec<_> = routers
            .iter()
            .map(|(name, router)| {
                let collector = self.clone();
                let task_name = name.clone();
                let router = router.clone();
                let handle = tokio::spawn(async move {
                    collector.poll_router(&task_name, &router, now).await
                });
                (name.clone(), handle)
            })
            .collect();

        let (names, handles): (Vec<String>, Vec<_>) = tasks.into_iter().unzip();
        for (name, result) in names.into_iter().zip(join_all(handles).await) {
            match result {
                Ok(router_report) => report.absorb(router_report),
                Err(e) => {
                    error!(router = %name, error = %e, "Router polling task failed.");
                    report.fail(&name, None, e.to_string());
                }
            }
        }

        info!(
            sources = report.sources_polled,
            entities = report.entities_updated,
            leases = report.leases_written,
            failures = report.failures.len(),
            "Data collection cycle complete."
        );
        Ok(report)
    }

    async fn poll_router(
        &self,
        name: &str,
        router: &RouterConfig,
        now: NaiveDateTime,
    ) -> CycleReport {
        info!(router = %name, "Processing router.");
        let mut report = CycleReport {
            sources_polled: 1,
            ..Default::default()
        };

        self.poll_clients(name, &router.ap_stats, now, &mut report).await;
        self.poll_wan(name, &router.wan_stats, now, &mut report).await;
        self.poll_leases(name, &router.dhcp_leases, now, &mut report).await;

        report
    }

    async fn fetch_signal(
        &self,
        router: &str,
        signal: Signal,
        url: &str,
        report: &mut CycleReport,
    ) -> Option<String> {
        match self.fetcher.fetch(url).await {
            Ok(FetchOutcome::Body(body)) => Some(body),
            Ok(FetchOutcome::Skipped) => {
                debug!(router = %router, %signal, "No URL configured. Skipping.");
                None
            }
            Err(e) => {
                warn!(router = %router, %signal, error = %e, "Fetch failed.");
                report.fail(router, Some(signal), e.to_string());
                None
            }
        }
    }

    async fn poll_clients(
        &self,
        router: &str,
        url: &str,
        now: NaiveDateTime,
        report: &mut CycleReport,
    ) {
        let signal = Signal::ClientTraffic;
        let Some(body) = self.fetch_signal(router, signal, url, report).await else {
            return;
        };

        let clients = parsers::parse_client_traffic(&body);
        if clients.is_empty() {
            info!(router = %router, "No WiFi client data found.");
            return;
        }

        for client in clients {
            match self
                .ledger
                .record_observation(&client.mac_address, client.counter, now)
                .await
            {
                Ok(_) => report.entities_updated += 1,
                Err(e) => {
                    error!(
                        router = %router,
                        entity_id = %client.mac_address,
                        error = %e,
                        "Failed to update traffic stats."
                    );
                    report.fail(router, Some(signal), e.to_string());
                }
            }
        }
    }

    async fn poll_wan(
        &self,
        router: &str,
        url: &str,
        now: NaiveDateTime,
        report: &mut CycleReport,
    ) {
        let signal = Signal::WanTraffic;
        let Some(body) = self.fetch_signal(router, signal, url, report).await else {
            return;
        };

        let counter = match parsers::parse_wan_traffic(&body) {
            Ok(Some(counter)) => counter,
            Ok(None) => {
                info!(router = %router, "No WAN data found.");
                return;
            }
            Err(e) => {
                warn!(router = %router, %signal, error = %e, "Failed to parse WAN stats.");
                report.fail(router, Some(signal), e.to_string());
                return;
            }
        };

        match self.ledger.record_observation(MAIN_WAN_ID, counter, now).await {
            Ok(_) => report.entities_updated += 1,
            Err(e) => {
                error!(
                    router = %router,
                    entity_id = MAIN_WAN_ID,
                    error = %e,
                    "Failed to update traffic stats."
                );
                report.fail(router, Some(signal), e.to_string());
            }
        }
    }

    async fn poll_leases(
        &self,
        router: &str,
        url: &str,
        now: NaiveDateTime,
        report: &mut CycleReport,
    ) {
        let signal = Signal::DhcpLeases;
        let Some(body) = self.fetch_signal(router, signal, url, report).await else {
            return;
        };

        let leases = parsers::parse_dhcp_leases(&body);
        if leases.is_empty() {
            info!(router = %router, "No DHCP lease data found.");
            return;
        }

        match self.leases.upsert_leases(leases, now).await {
            Ok(written) => report.leases_written += written,
            Err(e) => {
                error!(router = %router, error = %e, "Failed to upsert DHCP leases.");
                report.fail(router, Some(signal), e.to_string());
            }
        }
    }
}
