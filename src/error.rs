use thiserror::Error;

/// Errors that stop trust resolution for a request.
///
/// Both are terminal: the request pipeline reports them once and never calls
/// the next stage. Malformed `X-Forwarded-For` tokens are not errors; they
/// are dropped during chain extraction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrustError {
    /// The socket peer could not be parsed as an IP address, or the request
    /// carried no connection information at all.
    #[error("unknown remote address: {addr:?}")]
    UnknownRemoteAddr { addr: String },

    /// The fixed-offset policy needs more hops than the request has.
    #[error("mis-configured proxy chain: offset {offset} needs at least {} addresses, got {chain_len}", .offset.saturating_add(2))]
    ChainTooShort { offset: usize, chain_len: usize },
}

/// Coarse category of a [`TrustError`], for error handlers that only care
/// which stage failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UnknownRemoteAddr,
    Resolver,
}

impl TrustError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownRemoteAddr { .. } => ErrorKind::UnknownRemoteAddr,
            Self::ChainTooShort { .. } => ErrorKind::Resolver,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_the_failing_stage() {
        let addr = TrustError::UnknownRemoteAddr {
            addr: "nope".to_string(),
        };
        let chain = TrustError::ChainTooShort {
            offset: 3,
            chain_len: 2,
        };
        assert_eq!(addr.kind(), ErrorKind::UnknownRemoteAddr);
        assert_eq!(chain.kind(), ErrorKind::Resolver);
    }

    #[test]
    fn chain_error_message_names_the_requirement() {
        let err = TrustError::ChainTooShort {
            offset: 1,
            chain_len: 2,
        };
        assert_eq!(
            err.to_string(),
            "mis-configured proxy chain: offset 1 needs at least 3 addresses, got 2"
        );
    }
}
