use http::{HeaderValue, Request, request::Parts};
use tracing::debug;

use crate::chain::{X_FORWARDED_FOR, X_FORWARDED_HOST, X_FORWARDED_PROTO, X_REAL_IP};
use crate::view::TrustedView;

impl TrustedView {
    /// Request head for re-forwarding to another server.
    ///
    /// Unlike [`TrustedView::trusted_parts`], every forwarding header is
    /// rebuilt from scratch: `X-Forwarded-For` lists the residual chain
    /// followed by the trusted client (or the client alone when
    /// `strip_forwarded_ips` is set), `X-Forwarded-Host` and
    /// `X-Forwarded-Proto` carry the trusted values and `X-Real-IP` is
    /// dropped. Each call returns a fresh copy.
    #[must_use]
    pub fn forward_parts(&self, strip_forwarded_ips: bool) -> Parts {
        let mut parts = self.original().clone();
        self.apply_trusted_target(&mut parts);

        let headers = &mut parts.headers;
        headers.remove(X_FORWARDED_FOR);
        headers.remove(X_FORWARDED_HOST);
        headers.remove(X_FORWARDED_PROTO);
        headers.remove(X_REAL_IP);

        let residual = if strip_forwarded_ips {
            &[][..]
        } else {
            self.residual_chain()
        };
        let forwarded_for = residual
            .iter()
            .chain(std::iter::once(&self.trusted_remote_addr()))
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");

        for (name, value) in [
            (X_FORWARDED_FOR, forwarded_for.as_str()),
            (X_FORWARDED_HOST, self.trusted_host()),
            (X_FORWARDED_PROTO, self.trusted_proto().as_str()),
        ] {
            match HeaderValue::from_str(value) {
                Ok(value) => {
                    headers.insert(name, value);
                }
                Err(e) => debug!(header = %name, error = %e, "Skipping invalid forwarding header"),
            }
        }

        parts
    }

    /// Pairs [`TrustedView::forward_parts`] with a body.
    pub fn build_forward_request<B>(&self, strip_forwarded_ips: bool, body: B) -> Request<B> {
        Request::from_parts(self.forward_parts(strip_forwarded_ips), body)
    }
}
