use std::net::{IpAddr, SocketAddr};

use crate::error::TrustError;

/// Socket-level facts about the connection a request arrived on.
///
/// The host pipeline inserts this into the request extensions before the
/// trust layer runs. The trusted request carries a rewritten copy whose
/// `remote_addr` is the resolved client address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Peer address as reported by the listener, normally `host:port`.
    pub remote_addr: String,
    /// Whether the connection was TLS-secured.
    pub secure: bool,
}

impl ConnectionInfo {
    pub fn new(remote_addr: impl Into<String>, secure: bool) -> Self {
        Self {
            remote_addr: remote_addr.into(),
            secure,
        }
    }

    #[must_use]
    pub fn from_socket(addr: SocketAddr, secure: bool) -> Self {
        Self::new(addr.to_string(), secure)
    }

    /// Parses the peer IP out of `remote_addr`.
    pub fn peer_ip(&self) -> Result<IpAddr, TrustError> {
        parse_remote_addr(&self.remote_addr)
    }
}

/// Parses a peer address strictly.
///
/// Accepts an IP socket address (`10.0.0.1:443`, `[::1]:8080`) or a bare IP
/// literal. Host names and anything else are rejected.
pub fn parse_remote_addr(addr: &str) -> Result<IpAddr, TrustError> {
    addr.parse::<SocketAddr>()
        .map(|socket| socket.ip())
        .or_else(|_| addr.parse::<IpAddr>())
        .map_err(|_| TrustError::UnknownRemoteAddr {
            addr: addr.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_socket_addresses() {
        assert_eq!(
            parse_remote_addr("10.0.0.1:443").unwrap(),
            "10.0.0.1".parse::<IpAddr>().unwrap()
        );
        assert_eq!(
            parse_remote_addr("[2001:db8::1]:8080").unwrap(),
            "2001:db8::1".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn parses_bare_ip_literals() {
        assert_eq!(
            parse_remote_addr("192.168.1.1").unwrap(),
            "192.168.1.1".parse::<IpAddr>().unwrap()
        );
        assert_eq!(
            parse_remote_addr("::1").unwrap(),
            "::1".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn rejects_everything_else() {
        for bad in ["", "localhost:80", "example.com", "10.0.0.1:", "10.0.0.1:99999", "@"] {
            assert_eq!(
                parse_remote_addr(bad),
                Err(TrustError::UnknownRemoteAddr {
                    addr: bad.to_string()
                }),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn connection_info_round_trips_socket() {
        let info = ConnectionInfo::from_socket("127.0.0.1:9000".parse().unwrap(), true);
        assert_eq!(info.remote_addr, "127.0.0.1:9000");
        assert!(info.secure);
        assert_eq!(info.peer_ip().unwrap(), "127.0.0.1".parse::<IpAddr>().unwrap());
    }
}
