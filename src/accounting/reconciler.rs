use crate::models::TrafficCounter;

/// Turns two consecutive cumulative readings into the traffic between them.
///
/// Without a previous reading the whole observed value counts. A component
/// that went backwards means the gateway restarted its counters, so the
/// observed value is taken as the traffic since that restart. RX and TX are
/// decided independently. Traffic between the last poll and the restart is
/// never seen; that underestimate is accepted.
pub fn reconcile(last: Option<TrafficCounter>, observed: TrafficCounter) -> TrafficCounter {
    match last {
        None => observed,
        Some(last) => TrafficCounter {
            rx_bytes: component_delta(last.rx_bytes, observed.rx_bytes),
            tx_bytes: component_delta(last.tx_bytes, observed.tx_bytes),
        },
    }
}

/// Which components of `observed` went backwards relative to `last`.
pub fn detect_reset(last: Option<TrafficCounter>, observed: TrafficCounter) -> (bool, bool) {
    match last {
        None => (false, false),
        Some(last) => (
            observed.rx_bytes < last.rx_bytes,
            observed.tx_bytes < last.tx_bytes,
        ),
    }
}

fn component_delta(last: u64, observed: u64) -> u64 {
    if observed >= last {
        observed - last
    } else {
        observed // Counter reset
    }
}
