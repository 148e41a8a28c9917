use anyhow::{Result, anyhow};
use ipnet::IpNet;
use std::net::IpAddr;

/// Parses one trusted proxy entry.
/// A bare IP becomes a single-host network (`/32` or `/128`); otherwise the
/// entry must be CIDR notation.
pub fn parse_trusted_network(entry: &str) -> Result<IpNet> {
    let entry = entry.trim();

    // Try parsing as individual IP address first
    if let Ok(ip) = entry.parse::<IpAddr>() {
        let prefix_len = match ip {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        return IpNet::new(ip, prefix_len)
            .map_err(|e| anyhow!("Invalid trusted proxy address {entry}: {e}"));
    }

    entry
        .parse::<IpNet>()
        .map_err(|_| anyhow!("Invalid IP address or CIDR in trusted_proxies: {entry}"))
}

/// Parses the configured trusted proxy list, failing on the first bad entry.
pub fn parse_trusted_networks<S: AsRef<str>>(entries: &[S]) -> Result<Vec<IpNet>> {
    entries
        .iter()
        .map(|entry| parse_trusted_network(entry.as_ref()))
        .collect()
}
