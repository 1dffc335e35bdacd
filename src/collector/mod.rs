//! Polling of the configured gateways.
//!
//! One cycle runs the month-boundary reset, then polls every router on its
//! own task. Each router has three independent signals (client traffic, WAN
//! traffic, DHCP leases); a failure in one of them is logged, recorded in the
//! [`CycleReport`] and never touches the others.
pub mod cycle;
pub mod fetcher;

pub use cycle::{Collector, CycleReport, Signal, SignalFailure};
pub use fetcher::{FetchError, FetchOutcome, Fetcher, HttpFetcher};

use crate::db;
use thiserror::Error;

/// Failures that abort a whole cycle. The next tick retries.
#[derive(Error, Debug)]
pub enum CycleError {
    #[error("Failed to load router configuration: {0}")]
    Config(String),
    #[error("Failed to prepare data directory: {0}")]
    DataDir(#[from] std::io::Error),
    #[error("Failed to open storage: {0}")]
    Storage(#[source] db::Error),
    #[error("Monthly reset failed: {0}")]
    MonthlyReset(#[source] db::Error),
}
