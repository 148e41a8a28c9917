use http::{HeaderMap, HeaderName};
use std::net::IpAddr;

pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
pub const X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");

/// Collects the address chain declared by every `X-Forwarded-For` header.
///
/// Header occurrences are read in order and each value is split on commas, so
/// `a, b` followed by a second header `c` yields `[a, b, c]`. Tokens that do
/// not parse as an IP address are dropped without leaving a gap.
#[must_use]
pub fn forwarded_for_chain(headers: &HeaderMap) -> Vec<IpAddr> {
    headers
        .get_all(X_FORWARDED_FOR)
        .iter()
        .flat_map(|value| {
            String::from_utf8_lossy(value.as_bytes())
                .split(',')
                .filter_map(|token| token.trim().parse::<IpAddr>().ok())
                .collect::<Vec<_>>()
        })
        .collect()
}
