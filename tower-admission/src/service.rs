use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;

use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::Counter;
use pin_project_lite::pin_project;
use tower::BoxError;
use tower::Service;
use tracing::warn;

use admission_policy::RequestContext;

use crate::error::AdmissionError;
use crate::handler::Handler;

/// Requests that carry the [`RequestContext`] admission is decided on.
pub trait AdmissionRequest {
    /// `None` when the request cannot be evaluated; such requests are admitted.
    fn request_context(&self) -> Option<&RequestContext>;
}

impl AdmissionRequest for RequestContext {
    fn request_context(&self) -> Option<&RequestContext> {
        Some(self)
    }
}

impl AdmissionRequest for Arc<RequestContext> {
    fn request_context(&self) -> Option<&RequestContext> {
        Some(self)
    }
}

/// The context is read from the request extensions, where an earlier layer
/// stored it as an `Arc<RequestContext>`.
#[cfg(feature = "axum")]
impl<B> AdmissionRequest for http::Request<B> {
    fn request_context(&self) -> Option<&RequestContext> {
        self.extensions()
            .get::<Arc<RequestContext>>()
            .map(|ctx| ctx.as_ref())
    }
}

#[derive(Clone, Debug)]
struct AdmissionServiceMetrics {
    rejected: Counter<u64>,
    unevaluated: Counter<u64>,
}

#[derive(Debug)]
pub struct AdmissionService<H, S>
where
    H: ?Sized,
{
    inner: S,
    handler: Arc<H>,
    instruments: AdmissionServiceMetrics,
}

impl<H, S> Clone for AdmissionService<H, S>
where
    H: ?Sized,
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            handler: Arc::clone(&self.handler),
            instruments: self.instruments.clone(),
        }
    }
}

impl<H, S> AdmissionService<H, S>
where
    H: ?Sized,
{
    pub fn new(inner: S, handler: Arc<H>) -> Self {
        let meter = global::meter("admission_service");
        let instruments = AdmissionServiceMetrics {
            rejected: meter.u64_counter("rejected").build(),
            unevaluated: meter.u64_counter("unevaluated").build(),
        };

        Self {
            inner,
            handler,
            instruments,
        }
    }

    pub fn handler(&self) -> &Arc<H> {
        &self.handler
    }
}

pin_project! {
    /// Either the inner service's response, or an immediate rejection.
    #[project = ResponseFutureProj]
    pub enum ResponseFuture<F> {
        Admitted {
            #[pin]
            inner: F,
        },
        Rejected {
            error: AdmissionError,
        },
    }
}

impl<F, T, E> Future for ResponseFuture<F>
where
    F: Future<Output = Result<T, E>>,
    E: From<BoxError>,
{
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.project() {
            ResponseFutureProj::Admitted { inner } => inner.poll(cx),
            ResponseFutureProj::Rejected { error } => {
                Poll::Ready(Err(E::from(Box::new(error.clone()))))
            }
        }
    }
}

impl<H, S, Req> Service<Req> for AdmissionService<H, S>
where
    H: Handler + ?Sized,
    S: Service<Req, Error = BoxError>,
    Req: AdmissionRequest,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let Some(ctx) = req.request_context() else {
            warn!(handler = ?self.handler, "request carries no admission context; admitting");
            self.instruments.unevaluated.add(1, &[]);
            return ResponseFuture::Admitted {
                inner: self.inner.call(req),
            };
        };

        match self.handler.before(ctx) {
            Ok(()) => ResponseFuture::Admitted {
                inner: self.inner.call(req),
            },
            Err(error) => {
                let kind = match error {
                    AdmissionError::ThrottlingExceeded { .. } => "throttled",
                    AdmissionError::ServiceOverloaded { .. } => "overloaded",
                };
                self.instruments
                    .rejected
                    .add(1, &[KeyValue::new("reason", kind)]);
                ResponseFuture::Rejected { error }
            }
        }
    }
}
