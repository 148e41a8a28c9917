//! Trust resolution over the forwarded-address chain.
//!
//! Both policies walk the chain from its newest (rightmost) end, starting at
//! the socket peer, since each proxy appends the address it saw. Only hops
//! vouched for by the policy are consumed; everything left of the trusted
//! remote is kept as the residual chain, oldest first.

use ipnet::IpNet;
use std::net::IpAddr;
use tracing::debug;

use crate::error::TrustError;

/// Outcome of resolving one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustPartition {
    /// Nearest trusted proxy; `None` when the socket peer itself is not trusted.
    pub proxy_addr: Option<IpAddr>,
    /// Best estimate of the real client.
    pub trusted_remote_addr: IpAddr,
    /// Forwarded hops not consumed by resolution, in header order.
    pub residual_chain: Vec<IpAddr>,
}

/// Networks whose members are trusted to append honest `X-Forwarded-For`
/// entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CidrWhitelist {
    networks: Vec<IpNet>,
}

impl CidrWhitelist {
    #[must_use]
    pub fn new(networks: Vec<IpNet>) -> Self {
        Self { networks }
    }

    #[must_use]
    pub fn networks(&self) -> &[IpNet] {
        &self.networks
    }

    #[must_use]
    pub fn contains(&self, ip: IpAddr) -> bool {
        self.networks.iter().any(|net| net.contains(&ip))
    }

    /// Consumes the run of whitelisted hops that starts at the socket peer.
    /// The first address outside the whitelist, or the leftmost address
    /// once the chain runs out, is the trusted remote.
    #[must_use]
    pub fn resolve(&self, remote: IpAddr, mut forwarded: Vec<IpAddr>) -> TrustPartition {
        let mut candidate = remote;
        let mut proxy = None;

        while self.contains(candidate) {
            let Some(next) = forwarded.pop() else {
                break;
            };
            proxy = Some(candidate);
            candidate = next;
        }

        TrustPartition {
            proxy_addr: proxy,
            trusted_remote_addr: candidate,
            residual_chain: forwarded,
        }
    }
}

/// How far to trust the forwarded chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustPolicy {
    /// Trust consecutive hops inside the listed networks.
    CidrWhitelist(CidrWhitelist),
    /// Fixed topology: counting from the socket peer at the right end of
    /// `forwarded + [remote]`, skip `N` entries; the next one is the proxy
    /// and the one after it is the client.
    FixedOffset(usize),
}

impl TrustPolicy {
    #[must_use]
    pub fn cidr_whitelist(networks: Vec<IpNet>) -> Self {
        Self::CidrWhitelist(CidrWhitelist::new(networks))
    }

    #[must_use]
    pub const fn fixed_offset(offset: usize) -> Self {
        Self::FixedOffset(offset)
    }

    pub fn resolve(
        &self,
        remote: IpAddr,
        forwarded: Vec<IpAddr>,
    ) -> Result<TrustPartition, TrustError> {
        let partition = match self {
            Self::CidrWhitelist(whitelist) => whitelist.resolve(remote, forwarded),
            Self::FixedOffset(offset) => resolve_offset(*offset, remote, forwarded)?,
        };

        debug!(
            peer = %remote,
            proxy = ?partition.proxy_addr,
            trusted_remote = %partition.trusted_remote_addr,
            residual_hops = partition.residual_chain.len(),
            "Resolved forwarded chain"
        );
        Ok(partition)
    }
}

/// Resolves `forwarded` against the socket peer `remote` under `policy`.
pub fn resolve(
    remote: IpAddr,
    forwarded: Vec<IpAddr>,
    policy: &TrustPolicy,
) -> Result<TrustPartition, TrustError> {
    policy.resolve(remote, forwarded)
}

fn resolve_offset(
    offset: usize,
    remote: IpAddr,
    forwarded: Vec<IpAddr>,
) -> Result<TrustPartition, TrustError> {
    let mut ips = forwarded;
    ips.push(remote);
    let size = ips.len();

    // Needs room for both the proxy and the client left of the offset.
    let Some(remote_index) = size.checked_sub(offset).and_then(|n| n.checked_sub(2)) else {
        return Err(TrustError::ChainTooShort {
            offset,
            chain_len: size,
        });
    };

    let proxy = ips[remote_index + 1];
    let trusted_remote = ips[remote_index];
    ips.truncate(remote_index);

    Ok(TrustPartition {
        proxy_addr: Some(proxy),
        trusted_remote_addr: trusted_remote,
        residual_chain: ips,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn ips(list: &[&str]) -> Vec<IpAddr> {
        list.iter().map(|s| ip(s)).collect()
    }

    fn whitelist(nets: &[&str]) -> TrustPolicy {
        TrustPolicy::cidr_whitelist(nets.iter().map(|n| n.parse().unwrap()).collect())
    }

    mod cidr_whitelist {
        use super::*;

        #[test]
        fn stops_at_first_untrusted_hop() {
            let policy = whitelist(&["10.0.0.0/8"]);
            let partition = policy
                .resolve(ip("10.0.0.1"), ips(&["1.2.3.4", "10.0.0.2"]))
                .unwrap();

            assert_eq!(partition.trusted_remote_addr, ip("1.2.3.4"));
            assert_eq!(partition.proxy_addr, Some(ip("10.0.0.2")));
            assert!(partition.residual_chain.is_empty());
        }

        #[test]
        fn keeps_spoofed_entries_left_of_the_client() {
            let policy = whitelist(&["10.0.0.0/8"]);
            let partition = policy
                .resolve(
                    ip("10.0.0.1"),
                    ips(&["10.9.9.9", "6.6.6.6", "5.5.5.5", "10.0.0.2"]),
                )
                .unwrap();

            assert_eq!(partition.trusted_remote_addr, ip("5.5.5.5"));
            assert_eq!(partition.proxy_addr, Some(ip("10.0.0.2")));
            assert_eq!(partition.residual_chain, ips(&["10.9.9.9", "6.6.6.6"]));
        }

        #[test]
        fn untrusted_peer_is_the_client() {
            let policy = whitelist(&["10.0.0.0/8"]);
            let chain = ips(&["1.1.1.1", "10.0.0.5"]);
            let partition = policy.resolve(ip("8.8.8.8"), chain.clone()).unwrap();

            assert_eq!(partition.proxy_addr, None);
            assert_eq!(partition.trusted_remote_addr, ip("8.8.8.8"));
            assert_eq!(partition.residual_chain, chain);
        }

        #[test]
        fn fully_trusted_chain_ends_at_leftmost_entry() {
            let policy = whitelist(&["10.0.0.0/8"]);
            let partition = policy
                .resolve(ip("10.0.0.1"), ips(&["10.0.0.3", "10.0.0.2"]))
                .unwrap();

            assert_eq!(partition.trusted_remote_addr, ip("10.0.0.3"));
            assert_eq!(partition.proxy_addr, Some(ip("10.0.0.2")));
            assert!(partition.residual_chain.is_empty());
        }

        #[test]
        fn trusted_peer_without_chain_has_no_proxy() {
            let policy = whitelist(&["127.0.0.1/32"]);
            let partition = policy.resolve(ip("127.0.0.1"), Vec::new()).unwrap();

            assert_eq!(partition.proxy_addr, None);
            assert_eq!(partition.trusted_remote_addr, ip("127.0.0.1"));
            assert!(partition.residual_chain.is_empty());
        }

        #[test]
        fn empty_whitelist_never_trusts() {
            let policy = whitelist(&[]);
            let partition = policy
                .resolve(ip("10.0.0.1"), ips(&["1.2.3.4"]))
                .unwrap();

            assert_eq!(partition.proxy_addr, None);
            assert_eq!(partition.trusted_remote_addr, ip("10.0.0.1"));
            assert_eq!(partition.residual_chain, ips(&["1.2.3.4"]));
        }

        #[test]
        fn ipv4_mapped_addresses_do_not_match_v4_networks() {
            let policy = whitelist(&["10.0.0.0/8"]);
            let partition = policy
                .resolve(ip("::ffff:10.0.0.1"), ips(&["1.2.3.4"]))
                .unwrap();

            assert_eq!(partition.proxy_addr, None);
            assert_eq!(partition.trusted_remote_addr, ip("::ffff:10.0.0.1"));
        }

        #[test]
        fn mixes_v4_and_v6_networks() {
            let policy = whitelist(&["10.0.0.0/8", "fd00::/8"]);
            let partition = policy
                .resolve(ip("fd00::1"), ips(&["2001:db8::7", "10.2.3.4"]))
                .unwrap();

            assert_eq!(partition.proxy_addr, Some(ip("10.2.3.4")));
            assert_eq!(partition.trusted_remote_addr, ip("2001:db8::7"));
        }
    }

    mod fixed_offset {
        use super::*;

        #[test]
        fn offset_zero_uses_peer_as_proxy() {
            let partition = TrustPolicy::fixed_offset(0)
                .resolve(ip("9.9.9.9"), ips(&["1.1.1.1", "2.2.2.2"]))
                .unwrap();

            assert_eq!(partition.proxy_addr, Some(ip("9.9.9.9")));
            assert_eq!(partition.trusted_remote_addr, ip("2.2.2.2"));
            assert_eq!(partition.residual_chain, ips(&["1.1.1.1"]));
        }

        #[test]
        fn offset_skips_inner_hops() {
            let partition = TrustPolicy::fixed_offset(1)
                .resolve(ip("9.9.9.9"), ips(&["1.1.1.1", "2.2.2.2", "3.3.3.3"]))
                .unwrap();

            assert_eq!(partition.proxy_addr, Some(ip("3.3.3.3")));
            assert_eq!(partition.trusted_remote_addr, ip("2.2.2.2"));
            assert_eq!(partition.residual_chain, ips(&["1.1.1.1"]));
        }

        #[test]
        fn exact_fit_leaves_no_residual() {
            let partition = TrustPolicy::fixed_offset(1)
                .resolve(ip("9.9.9.9"), ips(&["1.1.1.1", "2.2.2.2"]))
                .unwrap();

            assert_eq!(partition.proxy_addr, Some(ip("2.2.2.2")));
            assert_eq!(partition.trusted_remote_addr, ip("1.1.1.1"));
            assert!(partition.residual_chain.is_empty());
        }

        #[test]
        fn short_chains_are_rejected() {
            let cases: [(usize, &[&str]); 4] = [
                (0, &[]),
                (1, &["1.1.1.1"]),
                (3, &["1.1.1.1", "2.2.2.2"]),
                (usize::MAX, &["1.1.1.1"]),
            ];

            for (offset, chain) in cases {
                let err = resolve(ip("9.9.9.9"), ips(chain), &TrustPolicy::fixed_offset(offset))
                    .unwrap_err();
                assert_eq!(
                    err,
                    TrustError::ChainTooShort {
                        offset,
                        chain_len: chain.len() + 1,
                    }
                );
            }
        }
    }
}
