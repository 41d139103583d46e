use std::sync::Arc;

use tower::Layer;

use crate::handler::Handler;
use crate::service::AdmissionService;

/// Runs a [`Handler`] before every request reaches the wrapped service.
#[derive(Debug)]
pub struct AdmissionLayer<H>
where
    H: ?Sized,
{
    handler: Arc<H>,
}

impl<H> Clone for AdmissionLayer<H>
where
    H: ?Sized,
{
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<H> AdmissionLayer<H>
where
    H: Handler + ?Sized,
{
    /// Create an AdmissionLayer
    ///
    /// Every service produced by the layer shares `handler`, and with it the
    /// handler's throttler state.
    pub fn new(handler: Arc<H>) -> Self {
        AdmissionLayer { handler }
    }
}

impl<H, S> Layer<S> for AdmissionLayer<H>
where
    H: ?Sized,
{
    type Service = AdmissionService<H, S>;

    fn layer(&self, service: S) -> Self::Service {
        AdmissionService::new(service, self.handler.clone())
    }
}
