use std::sync::Arc;

use tower::ServiceBuilder;
use tower::layer::util::Stack;

use crate::AdmissionLayer;
use crate::LoadShedHandler;
use crate::ThrottlingHandler;
use crate::handler::Handler;

/// Service Builder Extension with admission layers for tower::ServiceBuilder.
pub trait ServiceBuilderExt<L> {
    /// Add a throttling layer
    fn throttle(
        self,
        handler: Arc<ThrottlingHandler>,
    ) -> ServiceBuilder<Stack<AdmissionLayer<ThrottlingHandler>, L>>;

    /// Add a load shedding layer
    fn shed_load(
        self,
        handler: Arc<LoadShedHandler>,
    ) -> ServiceBuilder<Stack<AdmissionLayer<LoadShedHandler>, L>>;

    /// Add a layer running any handler
    fn admit(
        self,
        handler: Arc<dyn Handler>,
    ) -> ServiceBuilder<Stack<AdmissionLayer<dyn Handler>, L>>;
}

impl<L> ServiceBuilderExt<L> for ServiceBuilder<L> {
    fn throttle(
        self,
        handler: Arc<ThrottlingHandler>,
    ) -> ServiceBuilder<Stack<AdmissionLayer<ThrottlingHandler>, L>> {
        self.layer(AdmissionLayer::new(handler))
    }

    fn shed_load(
        self,
        handler: Arc<LoadShedHandler>,
    ) -> ServiceBuilder<Stack<AdmissionLayer<LoadShedHandler>, L>> {
        self.layer(AdmissionLayer::new(handler))
    }

    fn admit(
        self,
        handler: Arc<dyn Handler>,
    ) -> ServiceBuilder<Stack<AdmissionLayer<dyn Handler>, L>> {
        self.layer(AdmissionLayer::new(handler))
    }
}
