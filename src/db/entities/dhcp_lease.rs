use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    pub mac_address: String,
    pub lease_end_time: i64,
    pub ip_address: String,
    pub hostname: String,
    pub client_id: String,
    pub timestamp: NaiveDateTime, // cycle in which the lease was last seen
}
