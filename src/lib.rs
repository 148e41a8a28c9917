//! Trusted Proxy Resolution
//!
//! Works out, for a request that may have crossed several reverse proxies, which
//! address is the real client, which is the nearest trusted proxy and which
//! forwarded hops remain unverified. On top of that it exposes the request as the
//! origin believes it (host, scheme, URL, client address) and can rebuild the
//! `X-Forwarded-*` headers before the request is forwarded again.

pub mod chain;
pub mod config;
pub mod connection;
pub mod error;
pub mod forward;
pub mod middleware;
pub mod resolver;
pub mod security;
pub mod view;

// Re-export commonly used types and functions
pub use chain::{
    X_FORWARDED_FOR, X_FORWARDED_HOST, X_FORWARDED_PROTO, X_REAL_IP, forwarded_for_chain,
};
pub use config::{Config, ForwardConfig, TrustConfig, load_config, load_config_from, parse_config};
pub use connection::{ConnectionInfo, parse_remote_addr};
pub use error::{ErrorKind, TrustError};
pub use middleware::{
    ErrorHandler, InternalServerError, Mode, TrustedProxy, TrustedProxyLayer, TrustedViewExt,
};
pub use resolver::{CidrWhitelist, TrustPartition, TrustPolicy, resolve};
pub use security::{parse_trusted_network, parse_trusted_networks};
pub use view::{Proto, TrustedView};
