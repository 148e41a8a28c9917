//! Tower middleware that resolves every request before it reaches the
//! wrapped service.
//!
//! Resolution failures are answered here by an [`ErrorHandler`] and the
//! inner service is never called for that request.

use futures_util::future::{Either, Ready, ready};
use http::{Request, Response, StatusCode, request::Parts};
use std::{
    sync::Arc,
    task::{Context, Poll},
};
use tower::{Layer, Service};
use tracing::warn;

use crate::error::TrustError;
use crate::resolver::TrustPolicy;
use crate::view::TrustedView;

/// What the wrapped service receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// The original request, with the view in its extensions.
    Context,
    /// The view's trusted request, with the view in its extensions.
    #[default]
    Rewrite,
}

/// Turns a resolution failure into the response sent to the client.
pub trait ErrorHandler<B> {
    fn handle(&self, error: &TrustError, parts: &Parts) -> Response<B>;
}

impl<F, B> ErrorHandler<B> for F
where
    F: Fn(&TrustError, &Parts) -> Response<B>,
{
    fn handle(&self, error: &TrustError, parts: &Parts) -> Response<B> {
        self(error, parts)
    }
}

/// Answers every failure with an empty `500 Internal Server Error`.
#[derive(Debug, Clone, Copy, Default)]
pub struct InternalServerError;

impl<B: Default> ErrorHandler<B> for InternalServerError {
    fn handle(&self, _error: &TrustError, _parts: &Parts) -> Response<B> {
        let mut response = Response::new(B::default());
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response
    }
}

#[derive(Debug, Clone)]
pub struct TrustedProxyLayer<H = InternalServerError> {
    policy: Arc<TrustPolicy>,
    mode: Mode,
    error_handler: H,
}

impl TrustedProxyLayer {
    #[must_use]
    pub fn new(policy: TrustPolicy) -> Self {
        Self {
            policy: Arc::new(policy),
            mode: Mode::default(),
            error_handler: InternalServerError,
        }
    }
}

impl<H> TrustedProxyLayer<H> {
    #[must_use]
    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn error_handler<E>(self, error_handler: E) -> TrustedProxyLayer<E> {
        TrustedProxyLayer {
            policy: self.policy,
            mode: self.mode,
            error_handler,
        }
    }

    #[must_use]
    pub fn policy(&self) -> &TrustPolicy {
        &self.policy
    }
}

impl<S, H: Clone> Layer<S> for TrustedProxyLayer<H> {
    type Service = TrustedProxy<S, H>;

    fn layer(&self, inner: S) -> Self::Service {
        TrustedProxy {
            inner,
            policy: Arc::clone(&self.policy),
            mode: self.mode,
            error_handler: self.error_handler.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrustedProxy<S, H = InternalServerError> {
    inner: S,
    policy: Arc<TrustPolicy>,
    mode: Mode,
    error_handler: H,
}

impl<S, H, ReqBody, ResBody> Service<Request<ReqBody>> for TrustedProxy<S, H>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    H: ErrorHandler<ResBody>,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = Either<Ready<Result<Self::Response, Self::Error>>, S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let (mut parts, body) = request.into_parts();

        let view = match TrustedView::resolve(&parts, &self.policy) {
            Ok(view) => Arc::new(view),
            Err(e) => {
                warn!(
                    method = %parts.method,
                    uri = %parts.uri,
                    error = %e,
                    "Rejecting request, trust resolution failed"
                );
                return Either::Left(ready(Ok(self.error_handler.handle(&e, &parts))));
            }
        };

        let request = match self.mode {
            Mode::Context => {
                parts.extensions.insert(Arc::clone(&view));
                Request::from_parts(parts, body)
            }
            Mode::Rewrite => {
                let mut request = view.trusted_request(body);
                request.extensions_mut().insert(Arc::clone(&view));
                request
            }
        };

        Either::Right(self.inner.call(request))
    }
}

/// Access to the [`TrustedView`] attached by [`TrustedProxy`].
pub trait TrustedViewExt {
    fn trusted_view(&self) -> Option<&TrustedView>;
}

impl<B> TrustedViewExt for Request<B> {
    fn trusted_view(&self) -> Option<&TrustedView> {
        self.extensions().get::<Arc<TrustedView>>().map(AsRef::as_ref)
    }
}

impl TrustedViewExt for Parts {
    fn trusted_view(&self) -> Option<&TrustedView> {
        self.extensions.get::<Arc<TrustedView>>().map(AsRef::as_ref)
    }
}
