use crate::models::DhcpLease;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

/// `<lease_end> <mac> <ip> <hostname...> <client_id>`; hostname may contain spaces.
static LEASE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9]+)\s+([0-9a-fA-F:]{17})\s+([0-9.]+)\s+(.*?)\s+([0-9a-fA-F:]+)$")
        .expect("lease pattern is valid")
});

const UNKNOWN_HOSTNAME: &str = "Unknown";

/// Parses a dnsmasq-style lease dump. Lines that do not match are skipped with
/// a warning.
pub fn parse_dhcp_leases(data: &str) -> Vec<DhcpLease> {
    let mut leases = Vec::new();

    for line in data.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let Some(caps) = LEASE_PATTERN.captures(line) else {
            warn!(line = %line, "Skipping malformed DHCP lease line.");
            continue;
        };

        let lease_end_time = match caps[1].parse::<i64>() {
            Ok(v) => v,
            Err(e) => {
                warn!(line = %line, error = %e, "Error parsing lease end time, skipping line.");
                continue;
            }
        };

        leases.push(DhcpLease {
            mac_address: caps[2].to_lowercase(),
            lease_end_time,
            ip_address: caps[3].to_string(),
            hostname: normalize_hostname(&caps[4]),
            client_id: caps[5].to_string(),
        });
    }

    leases
}

// "*" means the client sent no hostname; otherwise trailing annotations are dropped.
fn normalize_hostname(raw: &str) -> String {
    let hostname = raw.trim();
    if hostname == "*" {
        return UNKNOWN_HOSTNAME.to_string();
    }
    hostname
        .split_whitespace()
        .next()
        .unwrap_or(hostname)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lease_line() {
        let data = "1718000000 AA:BB:CC:DD:EE:FF 192.168.1.23 laptop 01:aa:bb:cc:dd:ee:ff\n";
        let leases = parse_dhcp_leases(data);

        assert_eq!(
            leases,
            vec![DhcpLease {
                mac_address: "aa:bb:cc:dd:ee:ff".to_string(),
                lease_end_time: 1718000000,
                ip_address: "192.168.1.23".to_string(),
                hostname: "laptop".to_string(),
                client_id: "01:aa:bb:cc:dd:ee:ff".to_string(),
            }]
        );
    }

    #[test]
    fn test_star_hostname_becomes_unknown() {
        let data = "1718000000 aa:bb:cc:dd:ee:ff 10.0.0.2 * 01:aa:bb:cc:dd:ee:ff";
        let leases = parse_dhcp_leases(data);

        assert_eq!(leases.len(), 1);
        assert_eq!(leases[0].hostname, "Unknown");
    }

    #[test]
    fn test_hostname_keeps_first_token_only() {
        let data = "1718000000 aa:bb:cc:dd:ee:ff 10.0.0.2 living-room tv (static) 01:aa";
        let leases = parse_dhcp_leases(data);

        assert_eq!(leases.len(), 1);
        assert_eq!(leases[0].hostname, "living-room");
        assert_eq!(leases[0].client_id, "01:aa");
    }

    #[test]
    fn test_malformed_lease_lines_do_not_abort_batch() {
        let data = "garbage line\n\
                    1718000000 aa:bb:cc 10.0.0.2 host 01:aa\n\
                    1718000001 11:22:33:44:55:66 10.0.0.3 printer 01:11:22:33:44:55:66\n\
                    1718000002 aa:bb:cc:dd:ee:ff 10.0.0.4 phone *\n";
        let leases = parse_dhcp_leases(data);

        assert_eq!(leases.len(), 1);
        assert_eq!(leases[0].mac_address, "11:22:33:44:55:66");
        assert_eq!(leases[0].hostname, "printer");
    }

    #[test]
    fn test_non_ascii_digits_in_ip_are_rejected() {
        let data = "1718000000 aa:bb:cc:dd:ee:ff 10.0.0.\u{0662} host 01:aa\n\
                    1718000001 11:22:33:44:55:66 10.0.0.3 printer 01:11";
        let leases = parse_dhcp_leases(data);

        assert_eq!(leases.len(), 1);
        assert_eq!(leases[0].ip_address, "10.0.0.3");
    }

    #[test]
    fn test_empty_lease_dump() {
        assert!(parse_dhcp_leases("").is_empty());
    }
}
