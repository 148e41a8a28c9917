//! The request as the origin believes it, after trust resolution.
//!
//! A [`TrustedView`] owns a snapshot of the request head taken when it was
//! built, together with the [`TrustPartition`] for that request. Host,
//! protocol, URL and the rewritten request head are derived on first access
//! and cached in `OnceLock`s, so every accessor returns the same value for
//! the lifetime of the view, even when called from several threads.

use http::{
    HeaderValue, Request, Uri,
    header::HOST,
    request::Parts,
    uri::{Authority, PathAndQuery, Scheme},
};
use std::{fmt, net::IpAddr, sync::OnceLock};
use tracing::debug;

use crate::chain::{X_FORWARDED_FOR, X_FORWARDED_HOST, X_FORWARDED_PROTO, forwarded_for_chain};
use crate::connection::ConnectionInfo;
use crate::error::TrustError;
use crate::resolver::{TrustPartition, TrustPolicy};

/// Scheme the client used to reach the first proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Proto {
    Http,
    Https,
}

impl Proto {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }

    const fn from_tls(secure: bool) -> Self {
        if secure { Self::Https } else { Self::Http }
    }

    /// Maps an `X-Forwarded-Proto` value. Some proxies report the WebSocket
    /// scheme of an upgraded connection, so `ws`/`wss` count as `http`/`https`.
    fn from_forwarded(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "http" | "ws" => Some(Self::Http),
            "https" | "wss" => Some(Self::Https),
            _ => None,
        }
    }
}

impl fmt::Display for Proto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Proto> for Scheme {
    fn from(proto: Proto) -> Self {
        match proto {
            Proto::Http => Self::HTTP,
            Proto::Https => Self::HTTPS,
        }
    }
}

pub struct TrustedView {
    original: Parts,
    secure: bool,
    partition: TrustPartition,

    trusted_host: OnceLock<String>,
    trusted_proto: OnceLock<Proto>,
    trusted_uri: OnceLock<Uri>,
    trusted_parts: OnceLock<Parts>,
}

impl TrustedView {
    /// Builds a view over an already resolved request head.
    ///
    /// `secure` is the TLS flag of the socket the request arrived on.
    #[must_use]
    pub fn new(original: Parts, secure: bool, partition: TrustPartition) -> Self {
        Self {
            original,
            secure,
            partition,
            trusted_host: OnceLock::new(),
            trusted_proto: OnceLock::new(),
            trusted_uri: OnceLock::new(),
            trusted_parts: OnceLock::new(),
        }
    }

    /// Resolves the request head against `policy`.
    ///
    /// The socket peer and TLS flag come from the [`ConnectionInfo`]
    /// extension; a request without one cannot be resolved.
    pub fn resolve(parts: &Parts, policy: &TrustPolicy) -> Result<Self, TrustError> {
        let connection = parts.extensions.get::<ConnectionInfo>().ok_or_else(|| {
            TrustError::UnknownRemoteAddr {
                addr: String::new(),
            }
        })?;
        let peer = connection.peer_ip()?;
        let secure = connection.secure;

        let chain = forwarded_for_chain(&parts.headers);
        let partition = policy.resolve(peer, chain)?;

        Ok(Self::new(parts.clone(), secure, partition))
    }

    /// Convenience for [`TrustedView::resolve`] on a whole request.
    pub fn from_request<B>(request: &Request<B>, policy: &TrustPolicy) -> Result<Self, TrustError> {
        let mut head = Request::new(());
        *head.method_mut() = request.method().clone();
        *head.uri_mut() = request.uri().clone();
        *head.version_mut() = request.version();
        *head.headers_mut() = request.headers().clone();
        *head.extensions_mut() = request.extensions().clone();
        let (parts, ()) = head.into_parts();
        Self::resolve(&parts, policy)
    }

    /// Request head as it was when the view was built.
    #[must_use]
    pub fn original(&self) -> &Parts {
        &self.original
    }

    #[must_use]
    pub fn partition(&self) -> &TrustPartition {
        &self.partition
    }

    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.secure
    }

    #[must_use]
    pub fn is_behind_proxy(&self) -> bool {
        self.partition.proxy_addr.is_some()
    }

    #[must_use]
    pub fn proxy_addr(&self) -> Option<IpAddr> {
        self.partition.proxy_addr
    }

    #[must_use]
    pub fn trusted_remote_addr(&self) -> IpAddr {
        self.partition.trusted_remote_addr
    }

    #[must_use]
    pub fn residual_chain(&self) -> &[IpAddr] {
        &self.partition.residual_chain
    }

    /// `X-Forwarded-Host` when behind a trusted proxy and non-empty, otherwise
    /// the host the request itself declared.
    pub fn trusted_host(&self) -> &str {
        self.trusted_host.get_or_init(|| {
            if self.is_behind_proxy() {
                let forwarded = self
                    .original
                    .headers
                    .get(X_FORWARDED_HOST)
                    .and_then(|value| value.to_str().ok())
                    .filter(|host| !host.is_empty());
                if let Some(host) = forwarded {
                    return host.to_string();
                }
            }
            declared_host(&self.original)
        })
    }

    /// `X-Forwarded-Proto` when behind a trusted proxy and recognised,
    /// otherwise whatever the connection's TLS state says.
    pub fn trusted_proto(&self) -> Proto {
        *self.trusted_proto.get_or_init(|| {
            let default = Proto::from_tls(self.secure);
            if !self.is_behind_proxy() {
                return default;
            }
            self.original
                .headers
                .get(X_FORWARDED_PROTO)
                .and_then(|value| value.to_str().ok())
                .and_then(Proto::from_forwarded)
                .unwrap_or(default)
        })
    }

    /// Original URI with scheme and authority replaced by the trusted ones.
    pub fn trusted_uri(&self) -> &Uri {
        self.trusted_uri
            .get_or_init(|| rebuild_uri(&self.original.uri, self.trusted_host(), self.trusted_proto()))
    }

    /// Request head as seen by handlers behind this layer.
    ///
    /// Host and URI are the trusted ones and the [`ConnectionInfo`] remote
    /// address is the trusted client. `X-Forwarded-For` keeps only the
    /// nearest untrusted hop; with no such hop all `X-Forwarded-*` headers
    /// are removed.
    pub fn trusted_parts(&self) -> &Parts {
        self.trusted_parts.get_or_init(|| {
            let mut parts = self.original.clone();
            self.apply_trusted_target(&mut parts);
            parts.extensions.insert(ConnectionInfo::new(
                self.trusted_remote_addr().to_string(),
                self.secure,
            ));

            match self.residual_chain().first() {
                Some(hop) => {
                    if let Ok(value) = HeaderValue::from_str(&hop.to_string()) {
                        parts.headers.insert(X_FORWARDED_FOR, value);
                    }
                }
                None => {
                    parts.headers.remove(X_FORWARDED_FOR);
                    parts.headers.remove(X_FORWARDED_HOST);
                    parts.headers.remove(X_FORWARDED_PROTO);
                }
            }
            parts
        })
    }

    /// Pairs [`TrustedView::trusted_parts`] with a body.
    pub fn trusted_request<B>(&self, body: B) -> Request<B> {
        Request::from_parts(self.trusted_parts().clone(), body)
    }

    /// Sets the `Host` header and URI of `parts` to the trusted values.
    pub(crate) fn apply_trusted_target(&self, parts: &mut Parts) {
        match HeaderValue::from_str(self.trusted_host()) {
            Ok(host) if !host.is_empty() => {
                parts.headers.insert(HOST, host);
            }
            Ok(_) => {}
            Err(e) => debug!(host = %self.trusted_host(), error = %e, "Trusted host is not a valid header value"),
        }
        parts.uri = self.trusted_uri().clone();
    }
}

impl fmt::Debug for TrustedView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustedView")
            .field("uri", &self.original.uri)
            .field("secure", &self.secure)
            .field("partition", &self.partition)
            .finish_non_exhaustive()
    }
}

/// Host the request declared itself: the URI authority for absolute-form
/// targets (and HTTP/2), else the `Host` header.
fn declared_host(parts: &Parts) -> String {
    if let Some(authority) = parts.uri.authority() {
        return authority.as_str().to_string();
    }
    parts
        .headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn rebuild_uri(original: &Uri, host: &str, proto: Proto) -> Uri {
    let authority = match host.parse::<Authority>() {
        Ok(authority) => authority,
        Err(e) => {
            debug!(host = %host, error = %e, "Keeping original URI, host is not a valid authority");
            return original.clone();
        }
    };

    let mut parts = original.clone().into_parts();
    parts.scheme = Some(proto.into());
    parts.authority = Some(authority);
    if parts.path_and_query.is_none() {
        parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }

    Uri::from_parts(parts).unwrap_or_else(|e| {
        debug!(error = %e, "Keeping original URI, rebuilt URI is invalid");
        original.clone()
    })
}
