use super::ParseError;
use crate::models::{ClientTraffic, MAIN_WAN_ID, TrafficCounter};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

static WAN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"wan:\s+([0-9]+)\s+([0-9]+)").expect("WAN pattern is valid"));

/// Longest prefix of an unmatched WAN dump kept in the error.
const EXCERPT_CHARS: usize = 64;

/// Parses an access point dump of `<mac> <rx_bytes> <tx_bytes>` lines.
///
/// Malformed lines are skipped with a warning. Empty input is not an error.
pub fn parse_client_traffic(data: &str) -> Vec<ClientTraffic> {
    let mut clients = Vec::new();

    for line in data.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        let [mac, rx, tx] = parts.as_slice() else {
            warn!(line = %line, "Skipping malformed client traffic line.");
            continue;
        };

        let mac_address = mac.to_lowercase();
        if mac_address == MAIN_WAN_ID {
            warn!(line = %line, "Skipping client traffic line using the reserved WAN id.");
            continue;
        }

        let rx_bytes = match rx.parse::<u64>() {
            Ok(v) => v,
            Err(e) => {
                warn!(line = %line, error = %e, "Error parsing RX bytes, skipping line.");
                continue;
            }
        };
        let tx_bytes = match tx.parse::<u64>() {
            Ok(v) => v,
            Err(e) => {
                warn!(line = %line, error = %e, "Error parsing TX bytes, skipping line.");
                continue;
            }
        };

        clients.push(ClientTraffic {
            mac_address,
            counter: TrafficCounter::new(rx_bytes, tx_bytes),
        });
    }

    clients
}

/// Extracts the uplink counters from the first `wan: <rx> <tx>` occurrence.
///
/// Returns `Ok(None)` for an empty dump. A non-empty dump without the
/// pattern is an error.
pub fn parse_wan_traffic(data: &str) -> Result<Option<TrafficCounter>, ParseError> {
    if data.trim().is_empty() {
        return Ok(None);
    }

    let captures = WAN_PATTERN
        .captures(data)
        .ok_or_else(|| ParseError::PatternNotFound {
            len: data.len(),
            excerpt: data.chars().take(EXCERPT_CHARS).collect(),
        })?;

    let rx_bytes = parse_counter("WAN RX bytes", &captures[1])?;
    let tx_bytes = parse_counter("WAN TX bytes", &captures[2])?;

    Ok(Some(TrafficCounter::new(rx_bytes, tx_bytes)))
}

fn parse_counter(field: &'static str, value: &str) -> Result<u64, ParseError> {
    value.parse::<u64>().map_err(|_| ParseError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}
