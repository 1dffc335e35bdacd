use serde::{Deserialize, Serialize};

/// Entity id of the uplink interface. Never a valid hardware address.
pub const MAIN_WAN_ID: &str = "main_wan";

/// A pair of byte counters as reported by a gateway, or a delta between two of them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficCounter {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

impl TrafficCounter {
    pub const fn new(rx_bytes: u64, tx_bytes: u64) -> Self {
        Self { rx_bytes, tx_bytes }
    }
}

/// One line of an access point's per-client traffic dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientTraffic {
    pub mac_address: String, // lowercased
    pub counter: TrafficCounter,
}

/// One line of a DHCP lease dump, before it is stamped with the cycle time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DhcpLease {
    pub mac_address: String, // lowercased
    pub lease_end_time: i64, // epoch seconds
    pub ip_address: String,
    pub hostname: String,
    pub client_id: String,
}
