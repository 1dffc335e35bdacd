use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Row of `monthly_stats`. `timestamp` is stored as local wall-clock text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub timestamp: NaiveDateTime,
}
