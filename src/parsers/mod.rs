//! Pure text parsers for the dumps served by the gateways.
//!
//! Nothing in here does I/O. Line-oriented parsers skip malformed lines one at
//! a time and log a warning, so a single bad line never costs the rest of the
//! dump.
pub mod lease;
pub mod traffic;

pub use lease::parse_dhcp_leases;
pub use traffic::{parse_client_traffic, parse_wan_traffic};

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("WAN stats pattern not found in {len} bytes of data starting '{excerpt}'")]
    PatternNotFound { len: usize, excerpt: String },
    #[error("Invalid {field} value '{value}'")]
    InvalidNumber { field: &'static str, value: String },
}
