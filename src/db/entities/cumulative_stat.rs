use serde::{Deserialize, Serialize};

/// Row of `cumulative_stats`: the last absolute counters seen for an entity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}
