use chrono::Local;
use clap::Parser;
use netstat_collector::collector::{Collector, CycleError, CycleReport, Fetcher, HttpFetcher};
use netstat_collector::config::CollectorConfig;
use netstat_collector::db::{self, TrafficLedger, lease_service::LeaseStore};
use netstat_collector::logging::init_logging;
use netstat_collector::version::VERSION;
use std::sync::Arc;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Run a single collection cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Keep the plain one-line output for --version.
    if std::env::args().any(|arg| arg == "--version") {
        println!("netstat-collector version: {VERSION}");
        return Ok(());
    }

    let args = Args::parse();

    let config = match CollectorConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load collector configuration: {e}");
            return Err(e.into());
        }
    };

    init_logging(&config.log_dir);
    info!(version = VERSION, "Starting netstat collector.");

    let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(config.fetch_timeout())?);
    // Opened on the first cycle that has routers, reopened after a failure.
    let mut collector: Option<Collector> = None;

    if args.once {
        run_tick(&config, &fetcher, &mut collector).await;
        return Ok(());
    }

    let mut ticker = interval(config.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(interval = ?config.poll_interval(), "Polling loop started.");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_tick(&config, &fetcher, &mut collector).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received. Stopping collector.");
                break;
            }
        }
    }

    Ok(())
}

async fn run_tick(
    config: &CollectorConfig,
    fetcher: &Arc<dyn Fetcher>,
    collector: &mut Option<Collector>,
) {
    info!("Starting data collection cycle...");
    match collect_once(config, fetcher, collector).await {
        Ok(report) if !report.failures.is_empty() => {
            warn!(failures = report.failures.len(), "Cycle finished with failed signals.");
        }
        Ok(_) => {}
        Err(e) => {
            error!(error = %e, "Data collection cycle aborted. Retrying at the next interval.");
        }
    }
}

async fn collect_once(
    config: &CollectorConfig,
    fetcher: &Arc<dyn Fetcher>,
    collector: &mut Option<Collector>,
) -> Result<CycleReport, CycleError> {
    let routers = config.load_routers().map_err(CycleError::Config)?;
    if routers.is_empty() {
        info!("No routers configured. Exiting this cycle.");
        return Ok(CycleReport::default());
    }

    let active = match collector.take() {
        Some(active) => active,
        None => open_collector(config, fetcher.clone())?,
    };

    // One timestamp for every write of the cycle.
    let now = Local::now().naive_local();
    let result = active.run_cycle(&routers, now).await;

    if matches!(result, Err(CycleError::MonthlyReset(_))) {
        // Storage may be gone; reopen on the next tick.
        return result;
    }
    *collector = Some(active);
    result
}

fn open_collector(
    config: &CollectorConfig,
    fetcher: Arc<dyn Fetcher>,
) -> Result<Collector, CycleError> {
    std::fs::create_dir_all(&config.data_dir)?;

    let stats_path = config.stats_db_path();
    let stats_pool = db::open_file_pool(&stats_path).map_err(CycleError::Storage)?;
    let ledger = TrafficLedger::new(stats_pool, config.reset_policy).map_err(CycleError::Storage)?;

    let leases_path = config.leases_db_path();
    let lease_pool = db::open_file_pool(&leases_path).map_err(CycleError::Storage)?;
    let leases = LeaseStore::new(lease_pool).map_err(CycleError::Storage)?;

    info!(
        stats_db = %stats_path.display(),
        leases_db = %leases_path.display(),
        reset_policy = ?config.reset_policy,
        "Storage opened."
    );
    Ok(Collector::new(fetcher, ledger, leases))
}
